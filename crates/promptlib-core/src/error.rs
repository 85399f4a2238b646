use std::fmt;

use crate::event::EventError;
use crate::model::{DraftError, PromptId};

/// Machine-readable error codes for scripted callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    ConfigMissing,
    ConfigParseError,
    TokenRequired,
    PromptNotFound,
    InvalidDraft,
    FeedUnavailable,
    FeedMalformed,
    WriteRejected,
    WriteUnreachable,
    LoadFailed,
    InternalUnexpected,
}

impl ErrorCode {
    /// Stable code identifier (`E####`) for machine parsing.
    #[must_use]
    pub const fn code(self) -> &'static str {
        match self {
            Self::ConfigMissing => "E1001",
            Self::ConfigParseError => "E1002",
            Self::TokenRequired => "E1003",
            Self::PromptNotFound => "E2001",
            Self::InvalidDraft => "E2002",
            Self::FeedUnavailable => "E3001",
            Self::FeedMalformed => "E3002",
            Self::WriteRejected => "E4001",
            Self::WriteUnreachable => "E4002",
            Self::LoadFailed => "E4003",
            Self::InternalUnexpected => "E9001",
        }
    }

    /// Short human-facing summary for logs and terminal output.
    #[must_use]
    pub const fn message(self) -> &'static str {
        match self {
            Self::ConfigMissing => "Store project not configured",
            Self::ConfigParseError => "Config file parse error",
            Self::TokenRequired => "API token required for writes",
            Self::PromptNotFound => "Prompt not found",
            Self::InvalidDraft => "Invalid prompt",
            Self::FeedUnavailable => "Change feed unavailable",
            Self::FeedMalformed => "Malformed change event",
            Self::WriteRejected => "Store rejected the write",
            Self::WriteUnreachable => "Store unreachable",
            Self::LoadFailed => "Initial load failed",
            Self::InternalUnexpected => "Internal unexpected error",
        }
    }

    /// Optional remediation hint for terminal output.
    #[must_use]
    pub const fn hint(self) -> Option<&'static str> {
        match self {
            Self::ConfigMissing => {
                Some("Set project_id in .promptlib/config.toml or export SANITY_PROJECT_ID.")
            }
            Self::ConfigParseError => Some("Fix syntax in .promptlib/config.toml and retry."),
            Self::TokenRequired => {
                Some("Set token in the config file or export SANITY_API_TOKEN.")
            }
            Self::PromptNotFound => Some("Run `pl list` to see available prompt ids."),
            Self::InvalidDraft => Some("Titles need 5 to 100 characters; body and use case are required."),
            Self::FeedUnavailable => Some("Live updates paused. Restart `pl watch` to reconnect."),
            Self::FeedMalformed => None,
            Self::WriteRejected => Some("Check the token's write permissions for this dataset."),
            Self::WriteUnreachable | Self::LoadFailed => {
                Some("Check network access to the store and retry.")
            }
            Self::InternalUnexpected => Some("Retry once. If persistent, report a bug with logs."),
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}

/// Subscription or stream failure on the change feed.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransportError {
    #[error("could not open change feed: {0}")]
    Connect(String),
    #[error("change feed interrupted: {0}")]
    Stream(String),
    #[error("change feed closed by the store")]
    Closed,
    #[error("store reported a channel error: {0}")]
    Channel(String),
    #[error(transparent)]
    Malformed(#[from] EventError),
}

/// Failure reported by a [`PromptStore`](crate::store::PromptStore) call.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StoreError {
    #[error("store request failed: {0}")]
    Transport(String),
    #[error("store rejected request ({status}): {message}")]
    Rejected { status: u16, message: String },
    #[error("document {0} does not exist in the store")]
    Missing(PromptId),
    #[error("unexpected store response: {0}")]
    Malformed(String),
    #[error("store not configured: {0}")]
    Config(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteOp {
    Create,
    Patch,
}

impl fmt::Display for WriteOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Create => "create",
            Self::Patch => "patch",
        })
    }
}

/// A create or patch that the store did not accept.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{op} failed: {source}")]
pub struct WriteError {
    pub op: WriteOp,
    pub id: Option<PromptId>,
    #[source]
    pub source: StoreError,
}

/// Errors surfaced by [`PromptLibrary`](crate::session::PromptLibrary).
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LibraryError {
    #[error("prompt {0} not found")]
    NotFound(PromptId),
    #[error("invalid prompt: {0}")]
    Draft(#[from] DraftError),
    #[error(transparent)]
    Write(#[from] WriteError),
    #[error(transparent)]
    Transport(#[from] TransportError),
    #[error("initial load failed: {0}")]
    Load(#[source] StoreError),
}

impl LibraryError {
    #[must_use]
    pub const fn code(&self) -> ErrorCode {
        match self {
            Self::NotFound(_) => ErrorCode::PromptNotFound,
            Self::Draft(_) => ErrorCode::InvalidDraft,
            Self::Write(write) => store_code(&write.source),
            Self::Transport(TransportError::Malformed(_)) => ErrorCode::FeedMalformed,
            Self::Transport(_) => ErrorCode::FeedUnavailable,
            Self::Load(StoreError::Config(_)) => ErrorCode::ConfigMissing,
            Self::Load(_) => ErrorCode::LoadFailed,
        }
    }
}

const fn store_code(error: &StoreError) -> ErrorCode {
    match error {
        StoreError::Rejected { .. } => ErrorCode::WriteRejected,
        StoreError::Transport(_) => ErrorCode::WriteUnreachable,
        StoreError::Missing(_) => ErrorCode::PromptNotFound,
        StoreError::Config(_) => ErrorCode::TokenRequired,
        StoreError::Malformed(_) => ErrorCode::InternalUnexpected,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn all_codes_are_unique() {
        let all = [
            ErrorCode::ConfigMissing,
            ErrorCode::ConfigParseError,
            ErrorCode::TokenRequired,
            ErrorCode::PromptNotFound,
            ErrorCode::InvalidDraft,
            ErrorCode::FeedUnavailable,
            ErrorCode::FeedMalformed,
            ErrorCode::WriteRejected,
            ErrorCode::WriteUnreachable,
            ErrorCode::LoadFailed,
            ErrorCode::InternalUnexpected,
        ];

        let mut seen = HashSet::new();
        for code in all {
            assert!(seen.insert(code.code()), "duplicate code {}", code.code());
            assert!(code.code().starts_with('E'));
            assert!(!code.message().is_empty());
        }
    }

    #[test]
    fn write_errors_map_to_codes() {
        let rejected = LibraryError::from(WriteError {
            op: WriteOp::Patch,
            id: Some(PromptId::new("a")),
            source: StoreError::Rejected {
                status: 403,
                message: "insufficient permissions".into(),
            },
        });
        assert_eq!(rejected.code(), ErrorCode::WriteRejected);
        assert_eq!(
            rejected.to_string(),
            "patch failed: store rejected request (403): insufficient permissions"
        );

        let no_token = LibraryError::from(WriteError {
            op: WriteOp::Create,
            id: None,
            source: StoreError::Config("missing token".into()),
        });
        assert_eq!(no_token.code(), ErrorCode::TokenRequired);
    }

    #[test]
    fn not_found_has_hint() {
        let err = LibraryError::NotFound(PromptId::new("ghost"));
        assert_eq!(err.code().code(), "E2001");
        assert!(err.code().hint().is_some());
    }
}
