//! Campaign-level properties of the reconciliation engine under faults.

use promptlib_sim::campaign::{CampaignConfig, replay_seed, run_campaign};
use proptest::prelude::*;

#[test]
fn hundred_seeds_converge() {
    let report = run_campaign(&CampaignConfig::default()).expect("campaign");
    assert_eq!(report.seeds_run, 100);
    assert!(
        report.all_passed(),
        "first failure at seed {:?}: {:?}",
        report.first_failure,
        report.failures.first()
    );
}

#[test]
fn heavy_faults_still_converge_and_hit_hard_paths() {
    let config = CampaignConfig {
        seed_range: 0..60,
        rounds: 48,
        local_toggle_percent: 70,
        remote_edit_percent: 60,
        fault_max_delay: 6,
        fault_duplicate_percent: 25,
        fault_reorder_percent: 40,
        fault_reject_percent: 30,
        ..CampaignConfig::default()
    };
    let report = run_campaign(&config).expect("campaign");
    assert!(report.all_passed(), "failures: {:?}", report.failures);
    assert!(
        report.interesting_states_reached > 0,
        "expected rollbacks, stale snapshots or held fields"
    );
}

#[test]
fn replay_is_deterministic() {
    let config = CampaignConfig::default();
    let first = replay_seed(7, &config).expect("replay 1");
    let second = replay_seed(7, &config).expect("replay 2");
    assert_eq!(first.result.trace, second.result.trace);
    assert_eq!(first.result.store, second.result.store);
    assert_eq!(first.result.feed_log, second.result.feed_log);
    assert_eq!(first.oracle, second.oracle);
}

#[test]
fn replay_rejects_invalid_config() {
    let config = CampaignConfig {
        rounds: 0,
        ..CampaignConfig::default()
    };
    assert!(replay_seed(1, &config).is_err());
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(48))]

    #[test]
    fn any_seed_converges(
        seed in 0u64..u64::MAX,
        delay in 0u8..6,
        duplicate in 0u8..40,
        reject in 0u8..50,
    ) {
        let config = CampaignConfig {
            seed_range: seed..seed.saturating_add(1),
            fault_max_delay: delay,
            fault_duplicate_percent: duplicate,
            fault_reject_percent: reject,
            ..CampaignConfig::default()
        };
        let run = replay_seed(seed, &config).expect("simulation runs");
        prop_assert!(run.oracle.passed, "seed {seed}: {:?}", run.oracle.violations);
    }
}
