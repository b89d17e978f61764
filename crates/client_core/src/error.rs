use std::fmt;

use shared::{domain::MemberKind, error::ErrorCode};
use thiserror::Error;

/// Failure talking to the groups authority or one of the directory services.
#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("invalid endpoint url `{url}`: {source}")]
    Url {
        url: String,
        #[source]
        source: url::ParseError,
    },
    #[error("request to {url} failed: {source}")]
    Transport {
        url: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("{url} answered {status} {reason}{}", message_suffix(.message))]
    Status {
        url: String,
        status: u16,
        reason: String,
        code: ErrorCode,
        message: Option<String>,
    },
    #[error("malformed response from {url}: {source}")]
    Decode {
        url: String,
        #[source]
        source: serde_json::Error,
    },
}

impl GatewayError {
    pub fn status(url: impl Into<String>, status: u16, reason: impl Into<String>) -> Self {
        GatewayError::Status {
            url: url.into(),
            status,
            reason: reason.into(),
            code: ErrorCode::from_status(status),
            message: None,
        }
    }

    pub fn code(&self) -> Option<ErrorCode> {
        match self {
            GatewayError::Status { code, .. } => Some(*code),
            _ => None,
        }
    }

    pub fn url(&self) -> &str {
        match self {
            GatewayError::Url { url, .. }
            | GatewayError::Transport { url, .. }
            | GatewayError::Status { url, .. }
            | GatewayError::Decode { url, .. } => url,
        }
    }

    pub fn detail(&self) -> String {
        match self {
            GatewayError::Status { status, reason, .. } => format!("Error: {status} - {reason}"),
            GatewayError::Transport { source, .. } => format!("Error: {source}"),
            GatewayError::Decode { source, .. } => format!("Error: malformed response ({source})"),
            GatewayError::Url { source, .. } => format!("Error: {source}"),
        }
    }
}

fn message_suffix(message: &Option<String>) -> String {
    message
        .as_deref()
        .map(|m| format!(": {m}"))
        .unwrap_or_default()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchTarget {
    Group,
    Members(MemberKind),
    Directory(MemberKind),
}

impl fmt::Display for FetchTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FetchTarget::Group => f.write_str("group"),
            FetchTarget::Members(kind) => write!(f, "group {kind}s"),
            FetchTarget::Directory(kind) => write!(f, "{kind} directory"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MutationAction {
    Assign,
    Unassign,
}

impl fmt::Display for MutationAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MutationAction::Assign => f.write_str("assign"),
            MutationAction::Unassign => f.write_str("unassign"),
        }
    }
}

#[derive(Debug, Error)]
pub enum MembershipError {
    #[error("failed to fetch {target}: {source}")]
    Fetch {
        target: FetchTarget,
        #[source]
        source: GatewayError,
    },
    #[error("failed to {action} {kind}(s): {source}")]
    Mutation {
        action: MutationAction,
        kind: MemberKind,
        #[source]
        source: GatewayError,
    },
    #[error("{0}")]
    Validation(String),
}

impl MembershipError {
    pub fn is_validation(&self) -> bool {
        matches!(self, MembershipError::Validation(_))
    }

    pub fn gateway(&self) -> Option<&GatewayError> {
        match self {
            MembershipError::Fetch { source, .. } | MembershipError::Mutation { source, .. } => {
                Some(source)
            }
            _ => None,
        }
    }
}
