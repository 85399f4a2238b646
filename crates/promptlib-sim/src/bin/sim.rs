#![forbid(unsafe_code)]

use anyhow::{Context, Result, bail};
use promptlib_sim::campaign::{CampaignConfig, run_campaign};

/// `sim [FIRST_SEED] [COUNT]`
fn main() -> Result<()> {
    let mut args = std::env::args().skip(1);
    let first: u64 = args
        .next()
        .map(|raw| raw.parse().with_context(|| format!("bad first seed: {raw}")))
        .transpose()?
        .unwrap_or(0);
    let count: u64 = args
        .next()
        .map(|raw| raw.parse().with_context(|| format!("bad seed count: {raw}")))
        .transpose()?
        .unwrap_or(100);

    let config = CampaignConfig {
        seed_range: first..first.saturating_add(count),
        ..CampaignConfig::default()
    };
    let report = run_campaign(&config)?;
    println!("{}", serde_json::to_string_pretty(&report)?);

    if let Some(seed) = report.first_failure {
        bail!(
            "{} of {} seeds failed; replay with `sim {seed} 1`",
            report.failures.len(),
            report.seeds_run
        );
    }
    Ok(())
}
