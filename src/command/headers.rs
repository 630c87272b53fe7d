//! Typed parsing of the multisig control headers.

use axum::http::HeaderMap;
use std::collections::HashSet;

use crate::command::RequestError;

pub const X_ENV_USE_MULTISIG: &str = "x-env-use-multisig";
pub const X_USE_MULTISIG: &str = "x-use-multisig";
pub const X_MULTISIG_SIGNERS: &str = "x-multisig-signers";
pub const X_MULTISIG_NAME: &str = "x-multisig-name";

/// Parse a boolean switch. Returns `None` for anything ambiguous.
pub fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Some(true),
        "false" | "0" | "no" | "off" | "" => Some(false),
        _ => None,
    }
}

/// Signer identities and account names end up in argv and file names.
pub fn is_valid_identity(value: &str) -> bool {
    !value.is_empty()
        && !value.starts_with('-')
        && !value.starts_with('.')
        && value
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-' | '@'))
}

/// Multisig switches and inputs carried in request headers.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MultisigHeaders {
    /// Both the environment-level and per-request switches were true.
    pub enabled: bool,
    /// Signers in the order given.
    pub signers: Vec<String>,
    /// Multisig account name used by the merge stage.
    pub name: Option<String>,
}

impl MultisigHeaders {
    /// Parse the headers. Signer and name validation only applies when
    /// multisig is enabled.
    pub fn from_headers(headers: &HeaderMap) -> Result<Self, RequestError> {
        let env_switch = header_bool(headers, X_ENV_USE_MULTISIG)?;
        let request_switch = header_bool(headers, X_USE_MULTISIG)?;
        let enabled = env_switch && request_switch;

        if !enabled {
            return Ok(Self::default());
        }

        let raw_signers = header_str(headers, X_MULTISIG_SIGNERS)?.unwrap_or_default();
        let signers: Vec<String> = raw_signers
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect();
        if signers.is_empty() {
            return Err(RequestError::NoSigners);
        }
        let mut seen = HashSet::new();
        for signer in &signers {
            if !is_valid_identity(signer) {
                return Err(RequestError::InvalidIdentity(signer.clone()));
            }
            if !seen.insert(signer.as_str()) {
                return Err(RequestError::DuplicateSigner(signer.clone()));
            }
        }

        let name = header_str(headers, X_MULTISIG_NAME)?
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .ok_or(RequestError::MissingField(X_MULTISIG_NAME))?;
        if !is_valid_identity(name) {
            return Err(RequestError::InvalidIdentity(name.to_string()));
        }

        Ok(Self {
            enabled,
            signers,
            name: Some(name.to_string()),
        })
    }
}

fn header_str<'a>(headers: &'a HeaderMap, name: &'static str) -> Result<Option<&'a str>, RequestError> {
    headers
        .get(name)
        .map(|v| v.to_str().map_err(|_| RequestError::InvalidHeader(name)))
        .transpose()
}

fn header_bool(headers: &HeaderMap, name: &'static str) -> Result<bool, RequestError> {
    match header_str(headers, name)? {
        None => Ok(false),
        Some(raw) => parse_bool(raw).ok_or_else(|| RequestError::InvalidBoolean {
            name: name.to_string(),
            value: raw.to_string(),
        }),
    }
}
