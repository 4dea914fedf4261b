use chrono::{DateTime, TimeZone, Utc};
use reqwest::header::HeaderMap;
use reqwest::StatusCode;
use std::str::FromStr;
use std::time::Duration;

/// Wait before retrying a request hit by the secondary (abuse) limit.
pub(crate) const SECONDARY_LIMIT_WAIT: Duration = Duration::from_secs(15);
/// Secondary limit hits tolerated for a single page before giving up.
pub(crate) const MAX_SECONDARY_RETRIES: u32 = 5;

const UNKNOWN_RESET_SECS: i64 = 60;

#[derive(Debug, PartialEq, Eq)]
pub(crate) enum Throttle {
    /// Short-lived limit; retry the same request after the delay.
    Secondary(Duration),
    /// Hourly quota exhausted until the reset time.
    Primary(DateTime<Utc>),
}

/// Tells a throttled response apart from other failures.
pub(crate) fn throttle(status: StatusCode, headers: &HeaderMap, body: &str) -> Option<Throttle> {
    if status != StatusCode::FORBIDDEN && status != StatusCode::TOO_MANY_REQUESTS {
        return None;
    }
    if body.to_lowercase().contains("secondary rate limit") {
        let wait = read_header::<u64>(headers, "retry-after")
            .map(Duration::from_secs)
            .unwrap_or(SECONDARY_LIMIT_WAIT);
        return Some(Throttle::Secondary(wait));
    }
    let exhausted = read_header::<u32>(headers, "x-ratelimit-remaining") == Some(0);
    if exhausted || status == StatusCode::TOO_MANY_REQUESTS {
        return Some(Throttle::Primary(reset_time(headers)));
    }
    None
}

fn reset_time(headers: &HeaderMap) -> DateTime<Utc> {
    read_header::<i64>(headers, "x-ratelimit-reset")
        .and_then(|reset| Utc.timestamp_opt(reset, 0).single())
        .unwrap_or_else(|| Utc::now() + chrono::Duration::seconds(UNKNOWN_RESET_SECS))
}

fn read_header<T: FromStr>(headers: &HeaderMap, header: &str) -> Option<T> {
    headers.get(header)?.to_str().ok()?.trim().parse::<T>().ok()
}
