use crate::api::{Client, RateLimitProbe, Result};
use chrono::{DateTime, TimeZone, Utc};
use derive_more::Constructor;
use log::{debug, info, warn};
use std::sync::Arc;
use std::time::Duration;

/// Quota the orchestrator keeps in reserve before dispatching a repository.
pub const DISPATCH_MIN_REMAINING: u32 = 100;
/// Lower threshold checked again by each collector before it starts.
pub const COLLECT_MIN_REMAINING: u32 = 50;

const SAFETY_MARGIN: Duration = Duration::from_secs(5);
const UNKNOWN_RESET_WAIT_SECS: i64 = 60;

#[derive(Constructor, Debug, Clone, Copy, PartialEq, Eq)]
pub struct Quota {
    pub remaining: u32,
    pub reset: DateTime<Utc>,
}

impl Quota {
    /// Resolves the probe: `resources.core` first, then the top-level `rate`.
    /// A probe with neither reports zero remaining so the caller waits.
    pub fn from_probe(probe: &RateLimitProbe, now: DateTime<Utc>) -> Self {
        let core = probe.resources.as_ref().and_then(|r| r.core.as_ref());
        let remaining = core
            .and_then(|c| c.remaining)
            .or_else(|| probe.rate.as_ref().and_then(|r| r.remaining))
            .unwrap_or(0);
        let reset = core
            .and_then(|c| c.reset)
            .or_else(|| probe.rate.as_ref().and_then(|r| r.reset))
            .and_then(|reset| Utc.timestamp_opt(reset, 0).single())
            .unwrap_or_else(|| now + chrono::Duration::seconds(UNKNOWN_RESET_WAIT_SECS));
        Quota::new(remaining, reset)
    }

    fn time_to_reset(&self, now: DateTime<Utc>) -> Duration {
        (self.reset - now).to_std().unwrap_or_default()
    }
}

/// Sleeps until the quota resets whenever it falls below a threshold.
///
/// Every caller decides on its own; several workers may wait for the same reset at once.
pub struct RateLimitGuard<CLIENT: Client> {
    client: Arc<CLIENT>,
    safety_margin: Duration,
}

impl<CLIENT: Client> Clone for RateLimitGuard<CLIENT> {
    fn clone(&self) -> Self {
        RateLimitGuard {
            client: self.client.clone(),
            safety_margin: self.safety_margin,
        }
    }
}

impl<CLIENT: Client> RateLimitGuard<CLIENT> {
    pub fn new(client: Arc<CLIENT>) -> Self {
        RateLimitGuard {
            client,
            safety_margin: SAFETY_MARGIN,
        }
    }

    pub async fn quota(&self) -> Result<Quota> {
        let probe = self.client.rate_limit().await?;
        Ok(Quota::from_probe(&probe, Utc::now()))
    }

    pub async fn ensure_quota(&self, min_remaining: u32) -> Result<Quota> {
        let quota = self.quota().await?;
        if quota.remaining >= min_remaining {
            debug!("Remaining quota {}. Not waiting.", quota.remaining);
            return Ok(quota);
        }
        let delay = quota.time_to_reset(Utc::now()) + self.safety_margin;
        warn!(
            "Remaining quota {} below {}. Waiting {} sec for reset at {}.",
            quota.remaining,
            min_remaining,
            delay.as_secs(),
            quota.reset
        );
        tokio::time::sleep(delay).await;

        let refreshed = self.quota().await?;
        info!("Quota after reset: {} remaining.", refreshed.remaining);
        Ok(refreshed)
    }
}
