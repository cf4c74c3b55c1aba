//! Cyclic polling on top of a `Proxy`: run a fixed batch of operations on
//! an interval, hand each cycle's outcomes to a process callback, and
//! back off exponentially while the transport keeps failing.

use std::time::Duration;

use tokio::time::sleep;

use crate::client::pipeline::Outcome;
use crate::client::proxy::Proxy;
use crate::error::CipError;

pub struct PollerConfig {
    pub parameters: Vec<String>,
    pub cycle: Duration,
    pub max_backoff: Duration,
    pub depth: usize,
    pub multiple_budget: usize,
}

impl Default for PollerConfig {
    fn default() -> Self {
        PollerConfig {
            parameters: Vec::new(),
            cycle: Duration::from_secs(1),
            max_backoff: Duration::from_secs(30),
            depth: 1,
            multiple_budget: 0,
        }
    }
}

/// Run the poll loop until `should_stop` returns true. `on_value` receives
/// every cycle's outcomes, one per configured operation in submission
/// order. `on_error` receives a fatal transport failure along with the
/// consecutive-failure count, which drives the back-off; a per-operation
/// service error (the device rejecting one tag) is never fatal and still
/// reaches `on_value` in its outcome slot, same as §7's error taxonomy.
pub async fn run<F, E, S>(proxy: &mut Proxy, config: &PollerConfig, mut on_value: F, mut on_error: E, mut should_stop: S)
where
    F: FnMut(&[Outcome]),
    E: FnMut(&CipError, u32),
    S: FnMut() -> bool,
{
    let mut consecutive_failures: u32 = 0;

    while !should_stop() {
        let outcomes = proxy.operate(&config.parameters, config.depth, config.multiple_budget).await;
        let transport_failure = outcomes.iter().find_map(|outcome| match &outcome.result {
            Err(error @ CipError::Io(_)) => Some(error),
            _ => None,
        });

        match transport_failure {
            None => {
                consecutive_failures = 0;
                on_value(&outcomes);
                sleep(config.cycle).await;
            }
            Some(error) => {
                consecutive_failures += 1;
                on_error(error, consecutive_failures);
                let _ = proxy.close_gateway().await;
                sleep(backoff_delay(consecutive_failures, config.max_backoff)).await;
            }
        }
    }
}

fn backoff_delay(consecutive_failures: u32, max: Duration) -> Duration {
    let exponent = consecutive_failures.min(10);
    let scaled = Duration::from_millis(250u64.saturating_mul(1u64 << exponent));
    scaled.min(max)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_grows_and_then_saturates_at_max() {
        let max = Duration::from_secs(10);
        let first = backoff_delay(1, max);
        let second = backoff_delay(2, max);
        assert!(second > first);
        assert_eq!(backoff_delay(20, max), max);
    }
}
