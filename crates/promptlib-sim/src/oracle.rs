//! Post-run checks over a drained [`SimulationResult`].

use std::collections::{BTreeMap, BTreeSet};

use anyhow::{Context, Result};
use promptlib_core::event::ChangeEvent;
use promptlib_core::model::{Prompt, PromptId};
use serde::{Deserialize, Serialize};

use crate::SimulationResult;

/// A property the drained client state failed to satisfy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "invariant", rename_all = "snake_case")]
pub enum InvariantViolation {
    /// The store holds `id` but the cache does not.
    Missing { id: String },
    /// The cache holds `id` but the store does not.
    Extra { id: String },
    /// Both hold `id` with different content.
    Diverged {
        id: String,
        local: String,
        remote: String,
    },
    DuplicateId { id: String },
    /// Writes still tracked after every response arrived.
    PendingLeft { count: usize },
    /// Replaying a delivered feed message changed the cache.
    NotIdempotent { index: usize, outcome: String },
}

impl std::fmt::Display for InvariantViolation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Missing { id } => write!(f, "Missing: {id} is in the store but not the cache"),
            Self::Extra { id } => write!(f, "Extra: {id} is in the cache but not the store"),
            Self::Diverged { id, local, remote } => {
                write!(f, "Diverged: {id} local={local} remote={remote}")
            }
            Self::DuplicateId { id } => write!(f, "DuplicateId: {id} appears more than once"),
            Self::PendingLeft { count } => write!(f, "PendingLeft: {count} writes never settled"),
            Self::NotIdempotent { index, outcome } => write!(
                f,
                "NotIdempotent: replaying feed message {index} changed the cache ({outcome})"
            ),
        }
    }
}

/// Result of [`check_all`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OracleResult {
    pub passed: bool,
    pub violations: Vec<InvariantViolation>,
}

impl OracleResult {
    fn from_violations(violations: Vec<InvariantViolation>) -> Self {
        Self {
            passed: violations.is_empty(),
            violations,
        }
    }
}

fn summary(prompt: &Prompt) -> String {
    format!(
        "{{title={:?} favorite={} tags={:?}}}",
        prompt.title, prompt.is_favorite, prompt.tags
    )
}

/// The cache holds exactly the store's documents, field for field.
#[must_use]
pub fn check_convergence(cache: &[Prompt], store: &[Prompt]) -> Vec<InvariantViolation> {
    let local: BTreeMap<&PromptId, &Prompt> = cache.iter().map(|p| (&p.id, p)).collect();
    let remote: BTreeMap<&PromptId, &Prompt> = store.iter().map(|p| (&p.id, p)).collect();
    let mut violations = Vec::new();

    for (id, remote_prompt) in &remote {
        match local.get(id) {
            None => violations.push(InvariantViolation::Missing { id: id.to_string() }),
            Some(local_prompt) if !local_prompt.same_content(remote_prompt) => {
                violations.push(InvariantViolation::Diverged {
                    id: id.to_string(),
                    local: summary(local_prompt),
                    remote: summary(remote_prompt),
                });
            }
            Some(_) => {}
        }
    }
    violations.extend(
        local
            .keys()
            .filter(|id| !remote.contains_key(*id))
            .map(|id| InvariantViolation::Extra { id: id.to_string() }),
    );
    violations
}

#[must_use]
pub fn check_unique_ids(cache: &[Prompt]) -> Vec<InvariantViolation> {
    let mut seen = BTreeSet::new();
    cache
        .iter()
        .filter(|p| !seen.insert(&p.id))
        .map(|p| InvariantViolation::DuplicateId {
            id: p.id.to_string(),
        })
        .collect()
}

/// Feed the whole delivered log through the engine again.
///
/// # Errors
///
/// Returns an error if a logged message no longer decodes.
pub fn check_replay(result: &mut SimulationResult) -> Result<Vec<InvariantViolation>> {
    let mut violations = Vec::new();
    for (index, raw) in result.feed_log.iter().enumerate() {
        let event = ChangeEvent::try_from(raw.clone())
            .with_context(|| format!("feed message {index} no longer decodes"))?;
        let before = result.engine.prompts().to_vec();
        let applied = result.engine.apply(&event);
        if result.engine.prompts() != before.as_slice() {
            violations.push(InvariantViolation::NotIdempotent {
                index,
                outcome: applied.as_str().to_string(),
            });
        }
    }
    Ok(violations)
}

/// Run every check. Replay runs last because it feeds the engine again.
///
/// # Errors
///
/// Returns an error if the feed log cannot be replayed.
pub fn check_all(result: &mut SimulationResult) -> Result<OracleResult> {
    let cache = result.engine.prompts();
    let mut violations = check_convergence(cache, &result.store);
    violations.extend(check_unique_ids(cache));
    let pending = result.engine.pending().len();
    if pending > 0 {
        violations.push(InvariantViolation::PendingLeft { count: pending });
    }
    violations.extend(check_replay(result)?);
    Ok(OracleResult::from_violations(violations))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn prompt(id: &str, favorite: bool) -> Prompt {
        Prompt {
            id: PromptId::new(id),
            title: format!("Prompt {id}"),
            prompt: "body".into(),
            use_case: "tests".into(),
            category: "Coding".into(),
            tags: Vec::new(),
            date_added: None,
            is_favorite: favorite,
            featured: false,
            created_at: None,
            updated_at: None,
        }
    }

    #[test]
    fn matching_sets_converge_regardless_of_order() {
        let cache = vec![prompt("a", true), prompt("b", false)];
        let store = vec![prompt("b", false), prompt("a", true)];
        assert!(check_convergence(&cache, &store).is_empty());
    }

    #[test]
    fn divergence_missing_and_extra_are_reported() {
        let cache = vec![prompt("a", true), prompt("c", false)];
        let store = vec![prompt("a", false), prompt("b", false)];
        let violations = check_convergence(&cache, &store);
        assert_eq!(violations.len(), 3);
        assert!(violations.iter().any(|v| matches!(v, InvariantViolation::Diverged { id, .. } if id == "a")));
        assert!(violations.contains(&InvariantViolation::Missing { id: "b".into() }));
        assert!(violations.contains(&InvariantViolation::Extra { id: "c".into() }));
    }

    #[test]
    fn duplicate_ids_are_reported_once_per_extra_copy() {
        let cache = vec![prompt("a", false), prompt("a", false), prompt("b", false)];
        assert_eq!(
            check_unique_ids(&cache),
            vec![InvariantViolation::DuplicateId { id: "a".into() }]
        );
    }

    #[test]
    fn violations_render_readably() {
        let text = InvariantViolation::PendingLeft { count: 2 }.to_string();
        assert!(text.starts_with("PendingLeft"));
        assert!(text.contains('2'));
    }
}
