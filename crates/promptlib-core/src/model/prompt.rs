use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;

use super::stats::PromptStats;

/// Document identity assigned by the store.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PromptId(String);

impl PromptId {
    pub fn new(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Unpublished edits live under a `drafts.` prefix and never reach the list.
    #[must_use]
    pub fn is_draft(&self) -> bool {
        self.0.starts_with("drafts.")
    }
}

impl fmt::Display for PromptId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for PromptId {
    fn from(raw: &str) -> Self {
        Self::new(raw)
    }
}

impl From<String> for PromptId {
    fn from(raw: String) -> Self {
        Self(raw)
    }
}

/// One prompt record as stored remotely and mirrored locally.
///
/// Field names follow the store's document schema (`useCase`, `isFavorite`,
/// `_createdAt`, ...). Query projections return `null` for fields a document
/// never set, so every content field tolerates `null` and falls back to its
/// default.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Prompt {
    #[serde(rename = "_id")]
    pub id: PromptId,
    #[serde(default, deserialize_with = "null_as_default")]
    pub title: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub prompt: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub use_case: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub category: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub tags: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date_added: Option<DateTime<Utc>>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub is_favorite: bool,
    #[serde(default, deserialize_with = "null_as_default")]
    pub featured: bool,
    #[serde(rename = "_createdAt", default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(rename = "_updatedAt", default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
}

impl Prompt {
    /// Compare every content field, ignoring store metadata.
    #[must_use]
    pub fn same_content(&self, other: &Self) -> bool {
        self.id == other.id
            && self.title == other.title
            && self.prompt == other.prompt
            && self.use_case == other.use_case
            && self.category == other.category
            && self.tags == other.tags
            && self.date_added == other.date_added
            && self.is_favorite == other.is_favorite
            && self.featured == other.featured
    }

    /// Word and character counts for the prompt body.
    #[must_use]
    pub fn stats(&self) -> PromptStats {
        PromptStats::of(&self.prompt)
    }
}

fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

/// The content fields a local write can cover.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum PromptField {
    Title,
    Prompt,
    UseCase,
    Category,
    Tags,
    DateAdded,
    IsFavorite,
    Featured,
}

impl PromptField {
    pub const ALL: [Self; 8] = [
        Self::Title,
        Self::Prompt,
        Self::UseCase,
        Self::Category,
        Self::Tags,
        Self::DateAdded,
        Self::IsFavorite,
        Self::Featured,
    ];

    /// Field name as it appears in store documents.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Title => "title",
            Self::Prompt => "prompt",
            Self::UseCase => "useCase",
            Self::Category => "category",
            Self::Tags => "tags",
            Self::DateAdded => "dateAdded",
            Self::IsFavorite => "isFavorite",
            Self::Featured => "featured",
        }
    }
}

impl fmt::Display for PromptField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A snapshot could not be turned into a full prompt.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("snapshot for {id} is missing required fields: {}", .missing.join(", "))]
pub struct IncompleteSnapshot {
    pub id: PromptId,
    pub missing: Vec<&'static str>,
}

/// A possibly partial set of prompt fields.
///
/// Used three ways: as the `result` snapshot of a change event (often the
/// whole document, sometimes a subset), as the `set` body of a patch write,
/// and as the rollback value held by a pending mutation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PromptPatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prompt: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub use_case: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tags: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date_added: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_favorite: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub featured: Option<bool>,
    #[serde(rename = "_createdAt", default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(rename = "_updatedAt", default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
}

impl PromptPatch {
    #[must_use]
    pub fn favorite(is_favorite: bool) -> Self {
        Self {
            is_favorite: Some(is_favorite),
            ..Self::default()
        }
    }

    /// True when the patch carries neither content nor metadata.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.fields().is_empty() && self.created_at.is_none() && self.updated_at.is_none()
    }

    #[must_use]
    pub const fn has(&self, field: PromptField) -> bool {
        match field {
            PromptField::Title => self.title.is_some(),
            PromptField::Prompt => self.prompt.is_some(),
            PromptField::UseCase => self.use_case.is_some(),
            PromptField::Category => self.category.is_some(),
            PromptField::Tags => self.tags.is_some(),
            PromptField::DateAdded => self.date_added.is_some(),
            PromptField::IsFavorite => self.is_favorite.is_some(),
            PromptField::Featured => self.featured.is_some(),
        }
    }

    /// Content fields present in this patch, in declaration order.
    #[must_use]
    pub fn fields(&self) -> Vec<PromptField> {
        PromptField::ALL
            .into_iter()
            .filter(|field| self.has(*field))
            .collect()
    }

    /// Remove `field` from the patch, returning it as a single-field patch.
    pub fn take(&mut self, field: PromptField) -> Option<Self> {
        let mut single = Self::default();
        match field {
            PromptField::Title => single.title = Some(self.title.take()?),
            PromptField::Prompt => single.prompt = Some(self.prompt.take()?),
            PromptField::UseCase => single.use_case = Some(self.use_case.take()?),
            PromptField::Category => single.category = Some(self.category.take()?),
            PromptField::Tags => single.tags = Some(self.tags.take()?),
            PromptField::DateAdded => single.date_added = Some(self.date_added.take()?),
            PromptField::IsFavorite => single.is_favorite = Some(self.is_favorite.take()?),
            PromptField::Featured => single.featured = Some(self.featured.take()?),
        }
        Some(single)
    }

    /// Shallow-overwrite every present field onto `prompt`.
    ///
    /// Returns `true` if any content field changed. Metadata is written too
    /// but does not count as a change.
    pub fn apply_to(&self, prompt: &mut Prompt) -> bool {
        let mut changed = false;
        changed |= assign(&mut prompt.title, self.title.as_ref());
        changed |= assign(&mut prompt.prompt, self.prompt.as_ref());
        changed |= assign(&mut prompt.use_case, self.use_case.as_ref());
        changed |= assign(&mut prompt.category, self.category.as_ref());
        changed |= assign(&mut prompt.tags, self.tags.as_ref());
        if let Some(date_added) = self.date_added {
            changed |= prompt.date_added.replace(date_added) != Some(date_added);
        }
        changed |= assign(&mut prompt.is_favorite, self.is_favorite.as_ref());
        changed |= assign(&mut prompt.featured, self.featured.as_ref());
        if self.created_at.is_some() {
            prompt.created_at = self.created_at;
        }
        if self.updated_at.is_some() {
            prompt.updated_at = self.updated_at;
        }
        changed
    }

    /// Build a full prompt from a creation snapshot.
    ///
    /// Title, body, use case and category are required; the remaining
    /// fields fall back to their defaults.
    ///
    /// # Errors
    ///
    /// Returns [`IncompleteSnapshot`] naming every missing required field.
    pub fn into_prompt(self, id: PromptId) -> Result<Prompt, IncompleteSnapshot> {
        let mut missing = Vec::new();
        if self.title.is_none() {
            missing.push(PromptField::Title.as_str());
        }
        if self.prompt.is_none() {
            missing.push(PromptField::Prompt.as_str());
        }
        if self.use_case.is_none() {
            missing.push(PromptField::UseCase.as_str());
        }
        if self.category.is_none() {
            missing.push(PromptField::Category.as_str());
        }
        if !missing.is_empty() {
            return Err(IncompleteSnapshot { id, missing });
        }

        Ok(Prompt {
            id,
            title: self.title.unwrap_or_default(),
            prompt: self.prompt.unwrap_or_default(),
            use_case: self.use_case.unwrap_or_default(),
            category: self.category.unwrap_or_default(),
            tags: self.tags.unwrap_or_default(),
            date_added: self.date_added,
            is_favorite: self.is_favorite.unwrap_or(false),
            featured: self.featured.unwrap_or(false),
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

impl From<&Prompt> for PromptPatch {
    fn from(prompt: &Prompt) -> Self {
        Self {
            title: Some(prompt.title.clone()),
            prompt: Some(prompt.prompt.clone()),
            use_case: Some(prompt.use_case.clone()),
            category: Some(prompt.category.clone()),
            tags: Some(prompt.tags.clone()),
            date_added: prompt.date_added,
            is_favorite: Some(prompt.is_favorite),
            featured: Some(prompt.featured),
            created_at: prompt.created_at,
            updated_at: prompt.updated_at,
        }
    }
}

fn assign<T: PartialEq + Clone>(slot: &mut T, value: Option<&T>) -> bool {
    match value {
        Some(value) if slot != value => {
            *slot = value.clone();
            true
        }
        _ => false,
    }
}
