//! Waiting for a service to settle after create or update

use std::time::Duration;

use keel_core::wait::StateChangeConf;

use crate::client::{AivenApi, Service};

pub const STATE_RUNNING: &str = "RUNNING";
pub const STATE_REBALANCING: &str = "REBALANCING";
pub const STATE_REBUILDING: &str = "REBUILDING";

/// Operation a service change waiter is attached to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    Create,
    Update,
}

/// Intervals used by [`ServiceChangeWaiter`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WaitSettings {
    pub delay: Duration,
    pub poll_interval: Duration,
}

impl Default for WaitSettings {
    fn default() -> Self {
        Self {
            delay: Duration::from_secs(10),
            poll_interval: Duration::from_secs(2),
        }
    }
}

/// Polls a service until it reports `RUNNING`
pub struct ServiceChangeWaiter<'a> {
    pub api: &'a dyn AivenApi,
    pub project: &'a str,
    pub service_name: &'a str,
    pub operation: Operation,
}

impl<'a> ServiceChangeWaiter<'a> {
    pub fn new(
        api: &'a dyn AivenApi,
        project: &'a str,
        service_name: &'a str,
        operation: Operation,
    ) -> Self {
        Self {
            api,
            project,
            service_name,
            operation,
        }
    }

    /// State reported for a fetched service
    ///
    /// Plan and cloud migrations can keep a service rebuilding for a long
    /// time, so an update is done as soon as the service answers.
    fn observed_state(&self, service: &Service) -> String {
        match self.operation {
            Operation::Update => STATE_RUNNING.to_string(),
            Operation::Create => service.state.clone(),
        }
    }

    async fn refresh(&self) -> Result<(Option<Service>, String), String> {
        match self.api.get_service(self.project, self.service_name).await {
            Ok(service) => {
                let state = self.observed_state(&service);
                log::debug!(
                    "service {}/{} is {}",
                    self.project,
                    self.service_name,
                    state
                );
                Ok((Some(service), state))
            }
            Err(e) if e.is_not_found() => Ok((None, String::new())),
            Err(e) => Err(e.to_string()),
        }
    }

    /// Wait until the service is running, returning its last observed form
    pub async fn wait(&self, timeout: Duration, settings: WaitSettings) -> Result<Service, String> {
        let conf = StateChangeConf::new(&[STATE_REBALANCING, STATE_REBUILDING], &[STATE_RUNNING])
            .with_delay(settings.delay)
            .with_poll_interval(settings.poll_interval)
            .with_timeout(timeout);

        conf.wait_for_state(|| self.refresh())
            .await
            .map_err(|e| format!("error waiting for Aiven service to be RUNNING: {}", e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{MockApi, running_service};

    fn api(states: &[&str]) -> MockApi {
        MockApi::new()
            .with_service("acme", running_service("acme", "orders-db", "pg"))
            .with_state_script(states)
    }

    fn instant() -> WaitSettings {
        WaitSettings {
            delay: Duration::ZERO,
            poll_interval: Duration::from_millis(1),
        }
    }

    #[tokio::test]
    async fn create_waits_through_rebuilding() {
        let api = api(&["GONE", "REBUILDING", "REBALANCING"]);
        let waiter = ServiceChangeWaiter::new(&api, "acme", "orders-db", Operation::Create);
        let service = waiter.wait(Duration::from_secs(5), instant()).await.unwrap();
        assert_eq!(service.state, "RUNNING");
    }

    #[tokio::test]
    async fn update_accepts_rebuilding_service() {
        let api = api(&["REBUILDING"]);
        let waiter = ServiceChangeWaiter::new(&api, "acme", "orders-db", Operation::Update);
        let service = waiter.wait(Duration::from_secs(5), instant()).await.unwrap();
        assert_eq!(service.state, "REBUILDING");
    }

    #[tokio::test]
    async fn unexpected_state_is_reported() {
        let api = api(&["POWEROFF"]);
        let waiter = ServiceChangeWaiter::new(&api, "acme", "orders-db", Operation::Create);
        let err = waiter
            .wait(Duration::from_secs(5), instant())
            .await
            .unwrap_err();
        assert!(err.starts_with("error waiting for Aiven service to be RUNNING: "));
        assert!(err.contains("POWEROFF"));
    }

    #[tokio::test(start_paused = true)]
    async fn create_times_out() {
        let api = api(&["REBUILDING"; 64]);
        let waiter = ServiceChangeWaiter::new(&api, "acme", "orders-db", Operation::Create);
        let err = waiter
            .wait(Duration::from_secs(60), WaitSettings::default())
            .await
            .unwrap_err();
        assert!(err.contains("timeout"));
        assert!(err.contains("REBUILDING"));
    }
}
