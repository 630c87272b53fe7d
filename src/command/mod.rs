//! Request → command-line translation.
//!
//! # Data Flow
//! ```text
//! POST /{binary}/{commandType}/{segments...}?q=v  (form fields, headers)
//!     → resolver.rs (binary name → executable path, allow-list first)
//!     → options.rs (form fields → recognised flags, positional checks)
//!     → headers.rs (typed multisig switches, signer list)
//!     → BaseCommand (program + argv, never a shell string)
//! ```
//!
//! # Security Constraints
//! - argv is handed to the OS as a vector; nothing is shell-interpreted
//! - Only flags declared in the option schema are forwarded
//! - Positional values may not start with `-`

pub mod headers;
pub mod options;
pub mod resolver;

use std::path::PathBuf;
use thiserror::Error;

pub use headers::{parse_bool, MultisigHeaders};
pub use options::{FlagKind, OptionSchema};
pub use resolver::{BinaryResolver, ResolveError};

/// Problems with the request itself, detected before any process runs.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RequestError {
    #[error("invalid boolean '{value}' for {name}")]
    InvalidBoolean { name: String, value: String },

    #[error("unrecognised option '{0}'")]
    UnknownOption(String),

    #[error("option '{0}' is managed by the gateway")]
    ReservedOption(String),

    #[error("positional argument '{0}' must not start with '-'")]
    UnsafePositional(String),

    #[error("header {0} is not valid UTF-8")]
    InvalidHeader(&'static str),

    #[error("invalid identity '{0}'")]
    InvalidIdentity(String),

    #[error("signer '{0}' listed more than once")]
    DuplicateSigner(String),

    #[error("multisig requested but no signers were given")]
    NoSigners,

    #[error("multisig requested but {0} is missing")]
    MissingField(&'static str),
}

/// The parts of an inbound execute request that shape the command line.
#[derive(Debug, Clone, Default)]
pub struct CommandRequest {
    pub binary: String,
    pub command_type: String,
    pub subpath: Vec<String>,
    pub query: Vec<(String, String)>,
    pub form: Vec<(String, String)>,
}

/// Resolved program plus its translated argument vector.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BaseCommand {
    pub program: PathBuf,
    pub args: Vec<String>,
}

/// Either failure mode of [`build_base_command`].
#[derive(Debug, Error)]
pub enum CommandError {
    #[error(transparent)]
    Resolve(#[from] ResolveError),

    #[error(transparent)]
    Request(#[from] RequestError),
}

/// Build the base command: binary, command type, sub-path segments, query
/// values as positionals, then recognised form flags.
///
/// The binary is resolved first so an unknown binary fails before any
/// argument is inspected.
pub fn build_base_command(
    resolver: &BinaryResolver,
    schema: &OptionSchema,
    request: &CommandRequest,
) -> Result<BaseCommand, CommandError> {
    let program = resolver.resolve(&request.binary)?;

    let positionals = std::iter::once(&request.command_type)
        .chain(request.subpath.iter())
        .chain(request.query.iter().map(|(_, v)| v));

    let mut args = Vec::new();
    for value in positionals {
        options::check_positional(value)?;
        args.push(value.clone());
    }
    args.extend(schema.translate(&request.command_type, &request.form)?);

    Ok(BaseCommand { program, args })
}

/// Split a wildcard path capture into non-empty segments.
pub fn split_subpath(path: Option<&str>) -> Vec<String> {
    path.map(|p| {
        p.split('/')
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect()
    })
    .unwrap_or_default()
}

/// Last value of a form field, if present and non-empty.
pub fn form_value<'a>(form: &'a [(String, String)], key: &str) -> Option<&'a str> {
    form.iter()
        .rev()
        .find(|(k, _)| k.eq_ignore_ascii_case(key))
        .map(|(_, v)| v.as_str())
        .filter(|v| !v.is_empty())
}
