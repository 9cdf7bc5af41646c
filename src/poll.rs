//! Bounded retry for conditions that become true "soon".
//!
//! Module load and path discovery race against the host's own startup, so
//! the worker polls. Unlike a bare busy loop, every wait here carries an
//! explicit deadline and a stop flag; intervals back off geometrically up
//! to a cap so a slow condition does not get hammered at startup rate.

use log::debug;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::{Duration, Instant};
use thiserror::Error;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum PollError {
    #[error("timed out after {waited:?} waiting for {what}")]
    TimedOut { what: String, waited: Duration },

    #[error("cancelled while waiting for {what}")]
    Cancelled { what: String },
}

#[derive(Debug, Clone, Copy)]
pub struct PollOptions {
    /// First sleep between probes.
    pub initial_interval: Duration,
    /// Cap for the backed-off sleep.
    pub max_interval: Duration,
    /// Give up after this much wall time.
    pub deadline: Duration,
}

impl Default for PollOptions {
    fn default() -> Self {
        Self {
            initial_interval: Duration::from_millis(100),
            max_interval: Duration::from_secs(2),
            deadline: Duration::from_secs(120),
        }
    }
}

/// Probe until `probe` yields a value, the deadline passes, or `stop` is
/// raised.
///
/// The first probe runs immediately; a condition that already holds never
/// sleeps.
///
/// # Errors
/// [`PollError::TimedOut`] after the deadline, [`PollError::Cancelled`]
/// when the stop flag is raised between probes.
pub fn poll_until<T>(
    options: &PollOptions,
    what: &str,
    stop: &AtomicBool,
    mut probe: impl FnMut() -> Option<T>,
) -> Result<T, PollError> {
    let started = Instant::now();
    let mut interval = options.initial_interval;
    let mut attempts = 0u32;

    loop {
        if stop.load(Ordering::Relaxed) {
            return Err(PollError::Cancelled { what: what.to_string() });
        }

        if let Some(value) = probe() {
            debug!("{what} ready after {attempts} retries ({:?})", started.elapsed());
            return Ok(value);
        }
        attempts += 1;

        let waited = started.elapsed();
        if waited >= options.deadline {
            return Err(PollError::TimedOut { what: what.to_string(), waited });
        }

        thread::sleep(interval.min(options.deadline.saturating_sub(waited)));
        interval = (interval * 2).min(options.max_interval);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fast_options() -> PollOptions {
        PollOptions {
            initial_interval: Duration::from_millis(1),
            max_interval: Duration::from_millis(4),
            deadline: Duration::from_millis(50),
        }
    }

    #[test]
    fn test_ready_condition_returns_immediately() {
        let stop = AtomicBool::new(false);
        let result = poll_until(&fast_options(), "constant", &stop, || Some(42));
        assert_eq!(result.unwrap(), 42);
    }

    #[test]
    fn test_condition_becoming_true_is_observed() {
        let stop = AtomicBool::new(false);
        let mut remaining = 3;
        let result = poll_until(&fast_options(), "countdown", &stop, || {
            if remaining == 0 {
                Some("done")
            } else {
                remaining -= 1;
                None
            }
        });
        assert_eq!(result.unwrap(), "done");
    }

    #[test]
    fn test_deadline_is_enforced() {
        let stop = AtomicBool::new(false);
        let result: Result<(), _> = poll_until(&fast_options(), "never", &stop, || None);
        assert!(matches!(result, Err(PollError::TimedOut { .. })));
    }

    #[test]
    fn test_stop_flag_cancels() {
        let stop = AtomicBool::new(true);
        let result: Result<(), _> = poll_until(&fast_options(), "flagged", &stop, || None);
        assert_eq!(result, Err(PollError::Cancelled { what: "flagged".to_string() }));
    }
}
