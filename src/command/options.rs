//! Form field → CLI flag translation against an explicit option schema.

use std::collections::{HashMap, HashSet};

use crate::command::headers::parse_bool;
use crate::command::RequestError;
use crate::config::{OptionsConfig, UnknownOptionPolicy};

/// Flags the gateway appends itself; callers may never supply them.
pub const RESERVED_FLAGS: &[&str] = &["generate-only"];

/// How a recognised option is rendered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlagKind {
    /// `--key=value`
    Valued,
    /// bare `--key` (or `-y`) when truthy
    Boolean,
}

#[derive(Debug, Clone, Default)]
struct FlagSet {
    valued: HashSet<String>,
    boolean: HashSet<String>,
}

impl FlagSet {
    fn new(valued: &[String], boolean: &[String]) -> Self {
        Self {
            valued: valued.iter().map(|s| s.to_ascii_lowercase()).collect(),
            boolean: boolean.iter().map(|s| s.to_ascii_lowercase()).collect(),
        }
    }

    fn kind(&self, key: &str) -> Option<FlagKind> {
        if self.boolean.contains(key) {
            Some(FlagKind::Boolean)
        } else if self.valued.contains(key) {
            Some(FlagKind::Valued)
        } else {
            None
        }
    }
}

/// Recognised options: defaults shared by every command type plus
/// per-command-type extensions.
#[derive(Debug, Clone)]
pub struct OptionSchema {
    defaults: FlagSet,
    commands: HashMap<String, FlagSet>,
    unknown: UnknownOptionPolicy,
}

impl OptionSchema {
    pub fn from_config(config: &OptionsConfig) -> Self {
        let commands = config
            .commands
            .iter()
            .map(|(name, opts)| (name.clone(), FlagSet::new(&opts.value_flags, &opts.bool_flags)))
            .collect();
        Self {
            defaults: FlagSet::new(&config.value_flags, &config.bool_flags),
            commands,
            unknown: config.unknown,
        }
    }

    /// Kind of `key` for `command_type`, if it is recognised at all.
    pub fn kind(&self, command_type: &str, key: &str) -> Option<FlagKind> {
        let key = key.to_ascii_lowercase();
        self.commands
            .get(command_type)
            .and_then(|set| set.kind(&key))
            .or_else(|| self.defaults.kind(&key))
    }

    /// Translate form fields into flags, preserving field order.
    pub fn translate(
        &self,
        command_type: &str,
        form: &[(String, String)],
    ) -> Result<Vec<String>, RequestError> {
        let mut flags = Vec::with_capacity(form.len());
        for (key, value) in form {
            let name = key.to_ascii_lowercase();
            if RESERVED_FLAGS.contains(&name.as_str()) {
                return Err(RequestError::ReservedOption(key.clone()));
            }
            match self.kind(command_type, &name) {
                Some(FlagKind::Boolean) => {
                    let enabled = parse_bool(value).ok_or_else(|| RequestError::InvalidBoolean {
                        name: key.clone(),
                        value: value.clone(),
                    })?;
                    if enabled {
                        flags.push(render_bool_flag(&name));
                    }
                }
                Some(FlagKind::Valued) => {
                    if !value.is_empty() {
                        flags.push(format!("--{name}={value}"));
                    }
                }
                None => match self.unknown {
                    UnknownOptionPolicy::Reject => {
                        return Err(RequestError::UnknownOption(key.clone()));
                    }
                    UnknownOptionPolicy::Ignore => {
                        tracing::debug!(option = %key, command_type, "Ignoring unrecognised option");
                    }
                },
            }
        }
        Ok(flags)
    }
}

fn render_bool_flag(name: &str) -> String {
    if name.len() == 1 {
        format!("-{name}")
    } else {
        format!("--{name}")
    }
}

/// Flag names are restricted to `[A-Za-z0-9_-]`, not starting with `-`.
pub fn is_valid_flag_name(name: &str) -> bool {
    !name.is_empty()
        && !name.starts_with('-')
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
}

/// Positionals starting with `-` would be read as flags by the client.
pub fn check_positional(value: &str) -> Result<(), RequestError> {
    if value.starts_with('-') {
        Err(RequestError::UnsafePositional(value.to_string()))
    } else {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CommandOptions;

    fn fields(pairs: &[(&str, &str)]) -> Vec<(String, String)> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_valued_and_boolean_flags() {
        let schema = OptionSchema::from_config(&OptionsConfig::default());
        let flags = schema
            .translate(
                "tx",
                &fields(&[
                    ("from", "treasury"),
                    ("fees", ""),
                    ("y", "TRUE"),
                    ("no-validate", "0"),
                    ("unsafe", "yes"),
                ]),
            )
            .unwrap();
        assert_eq!(flags, vec!["--from=treasury", "-y", "--unsafe"]);
    }

    #[test]
    fn test_ambiguous_boolean_is_rejected() {
        let schema = OptionSchema::from_config(&OptionsConfig::default());
        let err = schema.translate("tx", &fields(&[("yes", "maybe")])).unwrap_err();
        assert_eq!(
            err,
            RequestError::InvalidBoolean {
                name: "yes".into(),
                value: "maybe".into()
            }
        );
    }

    #[test]
    fn test_unknown_policy() {
        let mut config = OptionsConfig::default();
        let form = fields(&[("exec", "rm -rf /"), ("node", "tcp://n:26657")]);

        let strict = OptionSchema::from_config(&config);
        assert_eq!(
            strict.translate("tx", &form),
            Err(RequestError::UnknownOption("exec".into()))
        );

        config.unknown = UnknownOptionPolicy::Ignore;
        let lenient = OptionSchema::from_config(&config);
        assert_eq!(lenient.translate("tx", &form).unwrap(), vec!["--node=tcp://n:26657"]);
    }

    #[test]
    fn test_generate_only_is_reserved() {
        let schema = OptionSchema::from_config(&OptionsConfig::default());
        assert_eq!(
            schema.translate("tx", &fields(&[("generate-only", "true")])),
            Err(RequestError::ReservedOption("generate-only".into()))
        );
    }

    #[test]
    fn test_per_command_extension() {
        let mut config = OptionsConfig::default();
        config.commands.insert(
            "tx".into(),
            CommandOptions {
                value_flags: vec!["fee-granter".into()],
                bool_flags: vec!["aux".into()],
            },
        );
        let schema = OptionSchema::from_config(&config);
        assert_eq!(schema.kind("tx", "Fee-Granter"), Some(FlagKind::Valued));
        assert_eq!(schema.kind("tx", "aux"), Some(FlagKind::Boolean));
        assert_eq!(schema.kind("query", "fee-granter"), None);
        assert_eq!(schema.kind("query", "chain-id"), Some(FlagKind::Valued));
    }

    #[test]
    fn test_flag_name_rules() {
        assert!(is_valid_flag_name("keyring-backend"));
        assert!(is_valid_flag_name("recover_interruption"));
        assert!(!is_valid_flag_name("--home"));
        assert!(!is_valid_flag_name("a=b"));
        assert!(!is_valid_flag_name(""));
    }
}
