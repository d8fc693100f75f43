//! Bounded wait for a session's transport to register

use std::future::Future;
use std::time::Duration;

use tracing::debug;

use crate::config::ReadinessSettings;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReadinessPolicy {
    /// Retries after the first failed check
    pub attempts: u32,
    pub delay: Duration,
}

impl Default for ReadinessPolicy {
    fn default() -> Self {
        Self::from(&ReadinessSettings::default())
    }
}

impl From<&ReadinessSettings> for ReadinessPolicy {
    fn from(settings: &ReadinessSettings) -> Self {
        Self {
            attempts: settings.attempts,
            delay: Duration::from_millis(settings.delay_ms),
        }
    }
}

impl ReadinessPolicy {
    pub fn new(attempts: u32, delay: Duration) -> Self {
        Self { attempts, delay }
    }

    /// Fail on the first miss
    pub fn immediate() -> Self {
        Self::new(0, Duration::ZERO)
    }

    /// Poll `check` until it yields a value or the retries run out
    pub async fn wait_for<T, F, Fut>(&self, mut check: F) -> Option<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Option<T>>,
    {
        if let Some(value) = check().await {
            return Some(value);
        }
        for attempt in 1..=self.attempts {
            tokio::time::sleep(self.delay).await;
            if let Some(value) = check().await {
                debug!("Transport became ready after {} retries", attempt);
                return Some(value);
            }
        }
        None
    }
}
