//! Fault-injecting delivery between the simulated store and the client.
//!
//! Nothing is ever dropped: the feed has no replay, so a lost event would be
//! a lost update rather than a reconciliation bug. Faults are limited to
//! delay, duplication and reordering.

use serde::{Deserialize, Serialize};

use crate::rng::SimRng;

/// Fault injection knobs for one simulated link.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FaultConfig {
    /// Maximum rounds a message may sit in flight.
    pub max_delay_rounds: u8,
    /// Percentage of sends delivered twice. Applies only to links that allow it.
    pub duplicate_rate_percent: u8,
    /// Percentage chance that a round's ready batch is delivered reversed.
    pub reorder_rate_percent: u8,
    /// Percentage of write requests the store refuses.
    pub reject_rate_percent: u8,
}

impl Default for FaultConfig {
    fn default() -> Self {
        Self {
            max_delay_rounds: 3,
            duplicate_rate_percent: 5,
            reorder_rate_percent: 10,
            reject_rate_percent: 10,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct InFlight<T> {
    deliver_at: u64,
    message: T,
}

/// What happened to one send.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SendOutcome {
    pub delay_rounds: u8,
    pub duplicated: bool,
}

/// One-way link carrying messages of type `T`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Link<T> {
    in_flight: Vec<InFlight<T>>,
    fault: FaultConfig,
    duplicates: bool,
}

impl<T: Clone> Link<T> {
    /// A link that may deliver a message twice, like the change feed.
    #[must_use]
    pub const fn lossy(fault: FaultConfig) -> Self {
        Self {
            in_flight: Vec::new(),
            fault,
            duplicates: true,
        }
    }

    /// A link that delivers each message exactly once, like a response body.
    #[must_use]
    pub const fn exactly_once(fault: FaultConfig) -> Self {
        Self {
            in_flight: Vec::new(),
            fault,
            duplicates: false,
        }
    }

    #[must_use]
    pub fn in_flight(&self) -> usize {
        self.in_flight.len()
    }

    pub fn send(&mut self, message: T, round: u64, rng: &mut SimRng) -> SendOutcome {
        let bound = u64::from(self.fault.max_delay_rounds).saturating_add(1);
        let delay_rounds = u8::try_from(rng.below(bound)).unwrap_or(self.fault.max_delay_rounds);
        let deliver_at = round.saturating_add(u64::from(delay_rounds));

        let duplicated = self.duplicates && rng.chance(self.fault.duplicate_rate_percent);
        if duplicated {
            // The copy trails the original by up to the same delay bound.
            let lag = rng.below(bound);
            self.in_flight.push(InFlight {
                deliver_at: deliver_at.saturating_add(lag),
                message: message.clone(),
            });
        }
        self.in_flight.push(InFlight {
            deliver_at,
            message,
        });

        SendOutcome {
            delay_rounds,
            duplicated,
        }
    }

    /// Remove and return everything due by `round`.
    ///
    /// The second value is `true` when the batch was reversed.
    pub fn deliver_ready(&mut self, round: u64, rng: &mut SimRng) -> (Vec<T>, bool) {
        let (ready, later): (Vec<_>, Vec<_>) = self
            .in_flight
            .drain(..)
            .partition(|flight| flight.deliver_at <= round);
        self.in_flight = later;

        let mut ready: Vec<T> = ready.into_iter().map(|flight| flight.message).collect();
        let reordered = ready.len() > 1 && rng.chance(self.fault.reorder_rate_percent);
        if reordered {
            ready.reverse();
        }
        (ready, reordered)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn calm() -> FaultConfig {
        FaultConfig {
            max_delay_rounds: 0,
            duplicate_rate_percent: 0,
            reorder_rate_percent: 0,
            reject_rate_percent: 0,
        }
    }

    #[test]
    fn zero_delay_delivers_same_round_in_order() {
        let mut rng = SimRng::new(1);
        let mut link = Link::lossy(calm());
        let _ = link.send(1, 4, &mut rng);
        let _ = link.send(2, 4, &mut rng);
        let (ready, reordered) = link.deliver_ready(4, &mut rng);
        assert_eq!(ready, vec![1, 2]);
        assert!(!reordered);
        assert_eq!(link.in_flight(), 0);
    }

    #[test]
    fn delayed_messages_wait() {
        let mut rng = SimRng::new(1);
        let mut link = Link::exactly_once(FaultConfig {
            max_delay_rounds: 5,
            ..calm()
        });
        let outcome = link.send("x", 0, &mut rng);
        let due = u64::from(outcome.delay_rounds);
        if due > 0 {
            assert!(link.deliver_ready(due - 1, &mut rng).0.is_empty());
        }
        assert_eq!(link.deliver_ready(due, &mut rng).0, vec!["x"]);
    }

    #[test]
    fn exactly_once_link_never_duplicates() {
        let mut rng = SimRng::new(2);
        let mut link = Link::exactly_once(FaultConfig {
            duplicate_rate_percent: 100,
            ..calm()
        });
        let outcome = link.send(7, 0, &mut rng);
        assert!(!outcome.duplicated);
        assert_eq!(link.in_flight(), 1);
    }

    #[test]
    fn lossy_link_duplicates_when_forced() {
        let mut rng = SimRng::new(2);
        let mut link = Link::lossy(FaultConfig {
            duplicate_rate_percent: 100,
            ..calm()
        });
        let outcome = link.send(7, 0, &mut rng);
        assert!(outcome.duplicated);
        assert_eq!(link.deliver_ready(0, &mut rng).0, vec![7, 7]);
    }

    #[test]
    fn forced_reorder_reverses_batch() {
        let mut rng = SimRng::new(3);
        let mut link = Link::lossy(FaultConfig {
            reorder_rate_percent: 100,
            ..calm()
        });
        for n in 0..3 {
            let _ = link.send(n, 0, &mut rng);
        }
        let (ready, reordered) = link.deliver_ready(0, &mut rng);
        assert!(reordered);
        assert_eq!(ready, vec![2, 1, 0]);
    }
}
