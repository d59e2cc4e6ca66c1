//! Wait - Poll a remote object until it reaches a target state
//!
//! Remote operations such as provisioning a service complete asynchronously.
//! A [`StateChangeConf`] repeatedly calls a refresh function and classifies the
//! reported state as pending, target or unexpected.

use std::future::Future;
use std::time::Duration;

use tokio::time::{Instant, sleep};

/// Failure while waiting for a state change
#[derive(Debug, thiserror::Error)]
pub enum WaitError {
    #[error("unexpected state '{state}', wanted target '{}'", target.join(", "))]
    UnexpectedState { state: String, target: Vec<String> },

    #[error("{0}")]
    Refresh(String),

    #[error("timeout while waiting for state to become '{}' (last state: '{last_state}', timeout: {timeout:?})", target.join(", "))]
    Timeout {
        last_state: String,
        target: Vec<String>,
        timeout: Duration,
    },

    #[error("couldn't find resource ({checks} retries)")]
    NotFound { checks: usize },
}

/// Polling configuration for a state change
#[derive(Debug, Clone)]
pub struct StateChangeConf {
    pub pending: Vec<String>,
    pub target: Vec<String>,
    /// Wait before the first refresh
    pub delay: Duration,
    /// Wait between refreshes
    pub poll_interval: Duration,
    pub timeout: Duration,
    /// Refreshes that may report no object before giving up
    pub not_found_checks: usize,
}

impl Default for StateChangeConf {
    fn default() -> Self {
        Self {
            pending: Vec::new(),
            target: Vec::new(),
            delay: Duration::ZERO,
            poll_interval: Duration::from_secs(2),
            timeout: Duration::from_secs(20 * 60),
            not_found_checks: 20,
        }
    }
}

impl StateChangeConf {
    pub fn new(pending: &[&str], target: &[&str]) -> Self {
        Self {
            pending: pending.iter().map(|s| s.to_string()).collect(),
            target: target.iter().map(|s| s.to_string()).collect(),
            ..Default::default()
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Poll `refresh` until it reports a target state, returning the object it produced
    ///
    /// `refresh` yields `(object, state)`; `None` means the object does not
    /// exist (yet).
    pub async fn wait_for_state<T, F, Fut>(&self, mut refresh: F) -> Result<T, WaitError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<(Option<T>, String), String>>,
    {
        // None: the timeout is too large to be represented and never expires
        let deadline = Instant::now().checked_add(self.timeout);
        let mut last_state = String::new();
        let mut not_found = 0usize;

        if !self.delay.is_zero() {
            sleep(self.delay.min(self.timeout)).await;
        }

        loop {
            if deadline.is_some_and(|d| Instant::now() >= d) {
                return Err(WaitError::Timeout {
                    last_state,
                    target: self.target.clone(),
                    timeout: self.timeout,
                });
            }

            let (object, state) = refresh().await.map_err(WaitError::Refresh)?;
            match object {
                None => {
                    not_found += 1;
                    if not_found > self.not_found_checks {
                        return Err(WaitError::NotFound {
                            checks: self.not_found_checks,
                        });
                    }
                    log::debug!("object not found yet ({}/{})", not_found, self.not_found_checks);
                }
                Some(object) => {
                    not_found = 0;
                    if self.target.iter().any(|t| t == &state) {
                        return Ok(object);
                    }
                    if !self.pending.iter().any(|p| p == &state) {
                        return Err(WaitError::UnexpectedState {
                            state,
                            target: self.target.clone(),
                        });
                    }
                    log::debug!("state '{}' is pending, waiting", state);
                    last_state = state;
                }
            }

            let interval = match deadline {
                Some(d) => self.poll_interval.min(d.saturating_duration_since(Instant::now())),
                None => self.poll_interval,
            };
            sleep(interval).await;
        }
    }
}
