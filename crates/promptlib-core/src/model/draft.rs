use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::{fmt, str::FromStr};

use super::prompt::{Prompt, PromptId};

pub const TITLE_MIN_CHARS: usize = 5;
pub const TITLE_MAX_CHARS: usize = 100;

/// Prompt categories offered when adding a prompt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Category {
    Marketing,
    Coding,
    Writing,
    Business,
    Design,
}

impl Category {
    pub const ALL: [Self; 5] = [
        Self::Marketing,
        Self::Coding,
        Self::Writing,
        Self::Business,
        Self::Design,
    ];

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Marketing => "Marketing",
            Self::Coding => "Coding",
            Self::Writing => "Writing",
            Self::Business => "Business",
            Self::Design => "Design",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid category: '{got}' (expected one of Marketing, Coding, Writing, Business, Design)")]
pub struct ParseCategoryError {
    pub got: String,
}

impl FromStr for Category {
    type Err = ParseCategoryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_lowercase();
        Self::ALL
            .into_iter()
            .find(|category| category.as_str().eq_ignore_ascii_case(&normalized))
            .ok_or_else(|| ParseCategoryError { got: s.to_string() })
    }
}

/// Why a draft was refused before reaching the store.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DraftError {
    #[error("title must be {TITLE_MIN_CHARS} to {TITLE_MAX_CHARS} characters (got {0})")]
    TitleLength(usize),
    #[error("prompt text is required")]
    MissingBody,
    #[error("use case is required")]
    MissingUseCase,
}

/// A complete prompt without an id, ready for the store's create call.
///
/// Text fields are trimmed on the way in and tags are normalized to a
/// lowercase, order-preserving set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PromptDraft {
    pub title: String,
    pub prompt: String,
    pub use_case: String,
    pub category: Category,
    pub tags: Vec<String>,
    pub date_added: DateTime<Utc>,
    pub is_favorite: bool,
    pub featured: bool,
}

impl PromptDraft {
    pub fn new(
        title: impl AsRef<str>,
        prompt: impl AsRef<str>,
        use_case: impl AsRef<str>,
        category: Category,
    ) -> Self {
        Self {
            title: title.as_ref().trim().to_string(),
            prompt: prompt.as_ref().trim().to_string(),
            use_case: use_case.as_ref().trim().to_string(),
            category,
            tags: Vec::new(),
            date_added: Utc::now(),
            is_favorite: false,
            featured: false,
        }
    }

    #[must_use]
    pub fn with_tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.tags = normalize_tags(tags);
        self
    }

    #[must_use]
    pub const fn with_date_added(mut self, date_added: DateTime<Utc>) -> Self {
        self.date_added = date_added;
        self
    }

    #[must_use]
    pub const fn featured(mut self, featured: bool) -> Self {
        self.featured = featured;
        self
    }

    /// Check the draft against the document rules.
    ///
    /// # Errors
    ///
    /// Returns the first [`DraftError`] found, checking title, body and use
    /// case in that order.
    pub fn validate(&self) -> Result<(), DraftError> {
        let title_len = self.title.chars().count();
        if !(TITLE_MIN_CHARS..=TITLE_MAX_CHARS).contains(&title_len) {
            return Err(DraftError::TitleLength(title_len));
        }
        if self.prompt.is_empty() {
            return Err(DraftError::MissingBody);
        }
        if self.use_case.is_empty() {
            return Err(DraftError::MissingUseCase);
        }
        Ok(())
    }

    /// The stored form of this draft once the store has assigned an id.
    #[must_use]
    pub fn into_prompt(self, id: PromptId, stored_at: DateTime<Utc>) -> Prompt {
        Prompt {
            id,
            title: self.title,
            prompt: self.prompt,
            use_case: self.use_case,
            category: self.category.as_str().to_string(),
            tags: self.tags,
            date_added: Some(self.date_added),
            is_favorite: self.is_favorite,
            featured: self.featured,
            created_at: Some(stored_at),
            updated_at: Some(stored_at),
        }
    }
}

/// Trim, lowercase and dedupe tags, keeping first-seen order.
pub fn normalize_tags<I, S>(tags: I) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut out: Vec<String> = Vec::new();
    for tag in tags {
        let tag = tag.as_ref().trim().to_lowercase();
        if !tag.is_empty() && !out.contains(&tag) {
            out.push(tag);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valid() -> PromptDraft {
        PromptDraft::new(
            "  Blog Post Outline ",
            "Outline a post about {{topic}}",
            "Plan content",
            Category::Writing,
        )
    }

    #[test]
    fn trims_text_fields() {
        let draft = valid();
        assert_eq!(draft.title, "Blog Post Outline");
        assert!(draft.validate().is_ok());
        assert!(!draft.is_favorite);
        assert!(!draft.featured);
    }

    #[test]
    fn tags_are_normalized() {
        let draft = valid().with_tags([" SEO", "writing", "seo", "", "Blog "]);
        assert_eq!(draft.tags, vec!["seo", "writing", "blog"]);
    }

    #[test]
    fn title_bounds_are_enforced() {
        let short = PromptDraft::new("Tiny", "body", "use", Category::Coding);
        assert_eq!(short.validate(), Err(DraftError::TitleLength(4)));

        let long = PromptDraft::new("x".repeat(101), "body", "use", Category::Coding);
        assert_eq!(long.validate(), Err(DraftError::TitleLength(101)));

        let edge = PromptDraft::new("x".repeat(100), "body", "use", Category::Coding);
        assert!(edge.validate().is_ok());
    }

    #[test]
    fn body_and_use_case_are_required() {
        let no_body = PromptDraft::new("A fine title", "   ", "use", Category::Design);
        assert_eq!(no_body.validate(), Err(DraftError::MissingBody));

        let no_use = PromptDraft::new("A fine title", "body", "", Category::Design);
        assert_eq!(no_use.validate(), Err(DraftError::MissingUseCase));
    }

    #[test]
    fn category_parses_case_insensitively() {
        assert_eq!("coding".parse::<Category>(), Ok(Category::Coding));
        assert_eq!(" Marketing ".parse::<Category>(), Ok(Category::Marketing));
        assert!("cooking".parse::<Category>().is_err());
    }

    #[test]
    fn serializes_in_document_shape() {
        let at = "2024-03-01T00:00:00Z".parse().expect("timestamp");
        let json = serde_json::to_value(valid().with_date_added(at)).expect("serialize");
        assert_eq!(json["useCase"], "Plan content");
        assert_eq!(json["category"], "Writing");
        assert_eq!(json["isFavorite"], false);
        assert_eq!(json["dateAdded"], "2024-03-01T00:00:00Z");
    }
}
