//! Change feed events.
//!
//! The store's listen endpoint emits loosely shaped JSON messages
//! ([`RawChangeEvent`]). Before anything touches the cache they are
//! normalized into the closed [`ChangeEvent`] variant so the engine can
//! match exhaustively instead of probing for fields.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::model::{Prompt, PromptId, PromptPatch};

/// Wire shape of one listen message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawChangeEvent {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub document_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transaction_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transition: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

impl RawChangeEvent {
    fn signal(kind: EventKind) -> Self {
        Self {
            kind: kind.as_str().to_string(),
            document_id: None,
            transaction_id: None,
            transition: None,
            result: None,
            timestamp: None,
            reason: None,
        }
    }

    #[must_use]
    pub fn welcome() -> Self {
        Self::signal(EventKind::Welcome)
    }

    #[must_use]
    pub fn reconnect() -> Self {
        Self::signal(EventKind::Reconnect)
    }

    #[must_use]
    pub fn disconnect(reason: impl Into<String>) -> Self {
        Self {
            reason: Some(reason.into()),
            ..Self::signal(EventKind::Disconnect)
        }
    }

    /// A mutation message carrying the full stored document.
    ///
    /// # Errors
    ///
    /// Returns an error if the prompt cannot be serialized to JSON.
    pub fn mutation(
        prompt: &Prompt,
        transaction_id: impl Into<String>,
        transition: Transition,
    ) -> Result<Self, serde_json::Error> {
        Ok(Self {
            document_id: Some(prompt.id.to_string()),
            transaction_id: Some(transaction_id.into()),
            transition: Some(transition.as_str().to_string()),
            result: Some(serde_json::to_value(prompt)?),
            timestamp: prompt.updated_at,
            ..Self::signal(EventKind::Mutation)
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum EventKind {
    Welcome,
    Mutation,
    Reconnect,
    Disconnect,
}

impl EventKind {
    const fn as_str(self) -> &'static str {
        match self {
            Self::Welcome => "welcome",
            Self::Mutation => "mutation",
            Self::Reconnect => "reconnect",
            Self::Disconnect => "disconnect",
        }
    }
}

impl FromStr for EventKind {
    type Err = EventError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "welcome" => Ok(Self::Welcome),
            "mutation" => Ok(Self::Mutation),
            "reconnect" => Ok(Self::Reconnect),
            "disconnect" => Ok(Self::Disconnect),
            other => Err(EventError::UnknownKind(other.to_string())),
        }
    }
}

/// How a mutation affected the document's membership in the listened set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    Appear,
    Update,
    Disappear,
}

impl Transition {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Appear => "appear",
            Self::Update => "update",
            Self::Disappear => "disappear",
        }
    }
}

impl fmt::Display for Transition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Transition {
    type Err = EventError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "appear" => Ok(Self::Appear),
            "update" => Ok(Self::Update),
            "disappear" => Ok(Self::Disappear),
            other => Err(EventError::UnknownTransition(other.to_string())),
        }
    }
}

/// A raw message that could not be normalized.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EventError {
    #[error("unknown change event type '{0}'")]
    UnknownKind(String),
    #[error("unknown mutation transition '{0}'")]
    UnknownTransition(String),
    #[error("mutation event without a document id")]
    MissingDocumentId,
    #[error("unreadable snapshot for {id}: {reason}")]
    BadSnapshot { id: PromptId, reason: String },
    #[error("unreadable change event: {0}")]
    Decode(String),
}

/// A remote create or update.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MutationEvent {
    pub document_id: PromptId,
    pub transaction_id: Option<String>,
    pub transition: Transition,
    /// New document snapshot; `None` when the document left the set.
    pub result: Option<PromptPatch>,
    pub timestamp: Option<DateTime<Utc>>,
}

/// Normalized change feed event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChangeEvent {
    Mutation(MutationEvent),
    Welcome,
    Reconnect,
    Disconnect { reason: Option<String> },
}

impl ChangeEvent {
    /// Whether the event can change the cache at all.
    #[must_use]
    pub fn is_applicable(&self) -> bool {
        match self {
            Self::Mutation(mutation) => mutation.result.as_ref().is_some_and(|r| !r.is_empty()),
            Self::Welcome | Self::Reconnect | Self::Disconnect { .. } => false,
        }
    }

    #[must_use]
    pub fn document_id(&self) -> Option<&PromptId> {
        match self {
            Self::Mutation(mutation) => Some(&mutation.document_id),
            Self::Welcome | Self::Reconnect | Self::Disconnect { .. } => None,
        }
    }
}

impl TryFrom<RawChangeEvent> for ChangeEvent {
    type Error = EventError;

    fn try_from(raw: RawChangeEvent) -> Result<Self, Self::Error> {
        match raw.kind.parse::<EventKind>()? {
            EventKind::Welcome => Ok(Self::Welcome),
            EventKind::Reconnect => Ok(Self::Reconnect),
            EventKind::Disconnect => Ok(Self::Disconnect { reason: raw.reason }),
            EventKind::Mutation => {
                let document_id = raw
                    .document_id
                    .map(PromptId::from)
                    .ok_or(EventError::MissingDocumentId)?;
                let transition = raw
                    .transition
                    .as_deref()
                    .map_or(Ok(Transition::Update), str::parse)?;
                let result = match raw.result {
                    None | Some(serde_json::Value::Null) => None,
                    Some(value) => Some(serde_json::from_value::<PromptPatch>(value).map_err(
                        |e| EventError::BadSnapshot {
                            id: document_id.clone(),
                            reason: e.to_string(),
                        },
                    )?),
                };
                Ok(Self::Mutation(MutationEvent {
                    document_id,
                    transaction_id: raw.transaction_id,
                    transition,
                    result,
                    timestamp: raw.timestamp,
                }))
            }
        }
    }
}
