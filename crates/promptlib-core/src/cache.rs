//! Ordered, id-indexed mirror of the remote prompt collection.
//!
//! The cache only expresses structure. Which write wins is decided by the
//! [`Reconciler`](crate::engine::Reconciler), which owns the only instance.

use std::collections::HashMap;

use crate::model::{Prompt, PromptId};

/// Prompts in newest-created-first order with an id index.
#[derive(Debug, Clone, Default)]
pub struct LocalCache {
    entries: Vec<Prompt>,
    index: HashMap<PromptId, usize>,
}

impl LocalCache {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a cache from an already ordered list, keeping the first entry
    /// for any repeated id.
    #[must_use]
    pub fn from_entries(entries: Vec<Prompt>) -> Self {
        let mut cache = Self::new();
        for prompt in entries {
            if !cache.index.contains_key(&prompt.id) {
                cache.index.insert(prompt.id.clone(), cache.entries.len());
                cache.entries.push(prompt);
            }
        }
        cache
    }

    #[must_use]
    pub fn find(&self, id: &PromptId) -> Option<&Prompt> {
        self.index.get(id).map(|&pos| &self.entries[pos])
    }

    #[must_use]
    pub fn contains(&self, id: &PromptId) -> bool {
        self.index.contains_key(id)
    }

    #[must_use]
    pub fn all(&self) -> &[Prompt] {
        &self.entries
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Replace the entry with the same id in place.
    ///
    /// Returns `false` and leaves the cache untouched when the id is absent.
    pub fn upsert(&mut self, prompt: Prompt) -> bool {
        match self.index.get(&prompt.id) {
            Some(&pos) => {
                self.entries[pos] = prompt;
                true
            }
            None => false,
        }
    }

    /// Insert at the front. Refuses an id that is already present.
    pub fn prepend(&mut self, prompt: Prompt) -> bool {
        if self.index.contains_key(&prompt.id) {
            return false;
        }
        self.entries.insert(0, prompt);
        self.reindex();
        true
    }

    pub fn remove(&mut self, id: &PromptId) -> Option<Prompt> {
        let pos = self.index.remove(id)?;
        let removed = self.entries.remove(pos);
        self.reindex();
        Some(removed)
    }

    fn reindex(&mut self) {
        self.index.clear();
        for (pos, prompt) in self.entries.iter().enumerate() {
            self.index.insert(prompt.id.clone(), pos);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn prompt(id: &str, title: &str) -> Prompt {
        Prompt {
            id: PromptId::new(id),
            title: title.into(),
            prompt: String::new(),
            use_case: String::new(),
            category: "Coding".into(),
            tags: Vec::new(),
            date_added: None,
            is_favorite: false,
            featured: false,
            created_at: None,
            updated_at: None,
        }
    }

    fn ids(cache: &LocalCache) -> Vec<&str> {
        cache.all().iter().map(|p| p.id.as_str()).collect()
    }

    #[test]
    fn prepend_puts_newest_first_and_refuses_duplicates() {
        let mut cache = LocalCache::new();
        assert!(cache.prepend(prompt("a", "first")));
        assert!(cache.prepend(prompt("b", "second")));
        assert!(!cache.prepend(prompt("a", "again")));
        assert_eq!(ids(&cache), vec!["b", "a"]);
        assert_eq!(cache.find(&PromptId::new("a")).map(|p| p.title.as_str()), Some("first"));
    }

    #[test]
    fn upsert_replaces_in_place() {
        let mut cache = LocalCache::from_entries(vec![prompt("a", "x"), prompt("b", "y")]);
        assert!(cache.upsert(prompt("b", "changed")));
        assert_eq!(ids(&cache), vec!["a", "b"]);
        assert_eq!(cache.all()[1].title, "changed");
    }

    #[test]
    fn upsert_of_absent_id_is_noop() {
        let mut cache = LocalCache::from_entries(vec![prompt("a", "x")]);
        assert!(!cache.upsert(prompt("z", "ghost")));
        assert_eq!(cache.len(), 1);
        assert!(!cache.contains(&PromptId::new("z")));
    }

    #[test]
    fn remove_keeps_index_consistent() {
        let mut cache =
            LocalCache::from_entries(vec![prompt("a", "1"), prompt("b", "2"), prompt("c", "3")]);
        assert_eq!(cache.remove(&PromptId::new("a")).map(|p| p.title), Some("1".into()));
        assert!(cache.remove(&PromptId::new("a")).is_none());
        assert_eq!(cache.find(&PromptId::new("c")).map(|p| p.title.as_str()), Some("3"));
        assert_eq!(ids(&cache), vec!["b", "c"]);
    }

    #[test]
    fn from_entries_drops_repeated_ids() {
        let cache = LocalCache::from_entries(vec![prompt("a", "keep"), prompt("a", "drop")]);
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.all()[0].title, "keep");
    }
}
