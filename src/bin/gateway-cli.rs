use clap::{Parser, Subcommand};
use serde_json::Value;

#[derive(Parser)]
#[command(name = "gateway-cli")]
#[command(about = "Operator CLI for the chain gateway", long_about = None)]
struct Cli {
    #[arg(short, long, default_value = "http://localhost:8000")]
    url: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Check gateway status and resolved binaries
    Health,
    /// Read the tail of the audit log
    Logs {
        /// Number of trailing records (0 or less for all)
        #[arg(short, long)]
        lines: Option<i64>,
        /// Case-insensitive substring filter
        #[arg(short, long)]
        keyword: Option<String>,
    },
    /// Truncate the audit log
    ClearLogs,
    /// Remove leftover transaction files from the scratch directory
    ClearArtifacts,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let client = reqwest::Client::new();
    let base = cli.url.trim_end_matches('/');

    let res = match cli.command {
        Commands::Health => client.get(format!("{base}/health")).send().await?,
        Commands::Logs { lines, keyword } => {
            let mut query: Vec<(&str, String)> = Vec::new();
            if let Some(lines) = lines {
                query.push(("lines", lines.to_string()));
            }
            if let Some(keyword) = keyword {
                query.push(("keyword", keyword));
            }
            client.get(format!("{base}/logs")).query(&query).send().await?
        }
        Commands::ClearLogs => client.delete(format!("{base}/logs/clear")).send().await?,
        Commands::ClearArtifacts => client.delete(format!("{base}/artifacts/clear")).send().await?,
    };

    print_response(res).await
}

async fn print_response(res: reqwest::Response) -> Result<(), Box<dyn std::error::Error>> {
    let status = res.status();
    if !status.is_success() {
        eprintln!("Error: gateway returned status {}", status);
        if let Ok(text) = res.text().await {
            eprintln!("Response: {}", text);
        }
        std::process::exit(1);
    }

    let json: Value = res.json().await?;
    println!("{}", serde_json::to_string_pretty(&json)?);
    Ok(())
}
