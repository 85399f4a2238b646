//! Campaign runner: many seeds, one report.
//!
//! Each seed gets its own [`SimulationConfig`] built from the campaign's
//! shared knobs. The first failing seed is recorded so it can be replayed
//! alone with [`replay_seed`].

use std::ops::Range;

use anyhow::{Result, bail};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::network::FaultConfig;
use crate::oracle::{self, OracleResult};
use crate::{SimulationConfig, SimulationResult, Simulator};

/// Knobs shared by every seed in a campaign.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CampaignConfig {
    pub seed_range: Range<u64>,
    pub rounds: u64,
    pub initial_prompts: usize,
    pub local_toggle_percent: u8,
    pub local_create_percent: u8,
    pub remote_edit_percent: u8,
    pub remote_create_percent: u8,
    pub fault_max_delay: u8,
    pub fault_duplicate_percent: u8,
    pub fault_reorder_percent: u8,
    pub fault_reject_percent: u8,
}

impl Default for CampaignConfig {
    fn default() -> Self {
        let sim = SimulationConfig::default();
        Self {
            seed_range: 0..100,
            rounds: sim.rounds,
            initial_prompts: sim.initial_prompts,
            local_toggle_percent: sim.local_toggle_percent,
            local_create_percent: sim.local_create_percent,
            remote_edit_percent: sim.remote_edit_percent,
            remote_create_percent: sim.remote_create_percent,
            fault_max_delay: sim.fault.max_delay_rounds,
            fault_duplicate_percent: sim.fault.duplicate_rate_percent,
            fault_reorder_percent: sim.fault.reorder_rate_percent,
            fault_reject_percent: sim.fault.reject_rate_percent,
        }
    }
}

impl CampaignConfig {
    #[must_use]
    pub const fn sim_config_for_seed(&self, seed: u64) -> SimulationConfig {
        SimulationConfig {
            seed,
            rounds: self.rounds,
            initial_prompts: self.initial_prompts,
            local_toggle_percent: self.local_toggle_percent,
            local_create_percent: self.local_create_percent,
            remote_edit_percent: self.remote_edit_percent,
            remote_create_percent: self.remote_create_percent,
            fault: FaultConfig {
                max_delay_rounds: self.fault_max_delay,
                duplicate_rate_percent: self.fault_duplicate_percent,
                reorder_rate_percent: self.fault_reorder_percent,
                reject_rate_percent: self.fault_reject_percent,
            },
        }
    }

    /// # Errors
    ///
    /// Returns an error if the seed range is empty, there are no rounds, or
    /// a percentage exceeds 100.
    pub fn validate(&self) -> Result<()> {
        if self.seed_range.is_empty() {
            bail!("seed_range must not be empty");
        }
        if self.rounds == 0 {
            bail!("rounds must be > 0");
        }
        let percents = [
            ("local_toggle_percent", self.local_toggle_percent),
            ("local_create_percent", self.local_create_percent),
            ("remote_edit_percent", self.remote_edit_percent),
            ("remote_create_percent", self.remote_create_percent),
            ("fault_duplicate_percent", self.fault_duplicate_percent),
            ("fault_reorder_percent", self.fault_reorder_percent),
            ("fault_reject_percent", self.fault_reject_percent),
        ];
        if let Some((name, value)) = percents.iter().find(|(_, value)| *value > 100) {
            bail!("{name} must be at most 100 (got {value})");
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeedFailure {
    pub seed: u64,
    pub violations: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CampaignReport {
    pub seeds_run: usize,
    pub seeds_passed: usize,
    /// Lowest failing seed, for replay.
    pub first_failure: Option<u64>,
    pub failures: Vec<SeedFailure>,
    /// Seeds that hit a rollback, a stale snapshot or a held field.
    pub interesting_states_reached: usize,
}

impl CampaignReport {
    #[must_use]
    pub const fn all_passed(&self) -> bool {
        self.failures.is_empty()
    }
}

/// A single seed's run and verdict.
#[derive(Debug)]
pub struct SeedRun {
    pub result: SimulationResult,
    pub oracle: OracleResult,
    /// Taken before the oracle replays the feed.
    pub interesting: bool,
}

/// Run and check one seed.
///
/// # Errors
///
/// Returns an error if the simulation itself fails.
pub fn run_single_seed(seed: u64, config: &CampaignConfig) -> Result<SeedRun> {
    let mut result = Simulator::new(config.sim_config_for_seed(seed))?.run()?;
    let interesting = result.interesting_state_reached();
    let oracle = oracle::check_all(&mut result)?;
    Ok(SeedRun {
        result,
        oracle,
        interesting,
    })
}

/// Validate `config` and run one seed with full detail.
///
/// # Errors
///
/// Returns an error when validation or the simulation fails.
pub fn replay_seed(seed: u64, config: &CampaignConfig) -> Result<SeedRun> {
    config.validate()?;
    run_single_seed(seed, config)
}

/// Run every seed in the configured range.
///
/// # Errors
///
/// Returns an error if the config is invalid or a simulation fails.
pub fn run_campaign(config: &CampaignConfig) -> Result<CampaignReport> {
    config.validate()?;

    let mut report = CampaignReport {
        seeds_run: 0,
        seeds_passed: 0,
        first_failure: None,
        failures: Vec::new(),
        interesting_states_reached: 0,
    };

    for seed in config.seed_range.clone() {
        let run = run_single_seed(seed, config)?;
        report.seeds_run += 1;
        if run.interesting {
            report.interesting_states_reached += 1;
        }
        if run.oracle.passed {
            report.seeds_passed += 1;
        } else {
            warn!(seed, violations = run.oracle.violations.len(), "seed failed");
            report.first_failure.get_or_insert(seed);
            report.failures.push(SeedFailure {
                seed,
                violations: run
                    .oracle
                    .violations
                    .iter()
                    .map(ToString::to_string)
                    .collect(),
            });
        }
    }

    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        CampaignConfig::default().validate().expect("valid");
    }

    #[test]
    fn empty_seed_range_is_rejected() {
        let config = CampaignConfig {
            seed_range: 5..5,
            ..CampaignConfig::default()
        };
        let err = config.validate().expect_err("empty range");
        assert!(err.to_string().contains("seed_range"));
    }

    #[test]
    fn oversized_percent_is_rejected() {
        let config = CampaignConfig {
            fault_reject_percent: 101,
            ..CampaignConfig::default()
        };
        let err = config.validate().expect_err("percent");
        assert!(err.to_string().contains("fault_reject_percent"));
    }

    #[test]
    fn seed_config_carries_faults() {
        let config = CampaignConfig {
            fault_max_delay: 7,
            fault_reject_percent: 20,
            ..CampaignConfig::default()
        };
        let sim = config.sim_config_for_seed(42);
        assert_eq!(sim.seed, 42);
        assert_eq!(sim.fault.max_delay_rounds, 7);
        assert_eq!(sim.fault.reject_rate_percent, 20);
    }

    #[test]
    fn small_campaign_passes() {
        let config = CampaignConfig {
            seed_range: 0..10,
            ..CampaignConfig::default()
        };
        let report = run_campaign(&config).expect("campaign");
        assert_eq!(report.seeds_run, 10);
        assert!(report.all_passed(), "failures: {:?}", report.failures);
        assert_eq!(report.seeds_passed, 10);
        assert!(report.first_failure.is_none());
    }

    #[test]
    fn report_serializes_to_json() {
        let report = CampaignReport {
            seeds_run: 3,
            seeds_passed: 2,
            first_failure: Some(1),
            failures: vec![SeedFailure {
                seed: 1,
                violations: vec!["PendingLeft: 1 writes never settled".into()],
            }],
            interesting_states_reached: 2,
        };
        let json = serde_json::to_string(&report).expect("serialize");
        assert!(json.contains("\"seeds_run\":3"));
        assert!(json.contains("\"first_failure\":1"));
    }
}
