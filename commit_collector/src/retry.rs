use crate::api::{Error, FailureKind};
use crate::collector::RepoOutcome;
use log::info;
use std::future::Future;

/// Anything that can tell whether it failed on an exhausted API quota.
pub trait QuotaClassified {
    fn is_quota_exceeded(&self) -> bool;
}

impl QuotaClassified for RepoOutcome {
    fn is_quota_exceeded(&self) -> bool {
        self.failure() == Some(FailureKind::QuotaExceeded)
    }
}

impl<T> QuotaClassified for Result<T, Error> {
    fn is_quota_exceeded(&self) -> bool {
        matches!(self, Err(err) if err.kind() == FailureKind::QuotaExceeded)
    }
}

/// Retries an attempt that ran out of quota, waiting before each retry.
/// Other failures are returned as they are.
#[derive(Debug, Clone, Copy)]
pub struct QuotaRetry {
    max_retries: u32,
}

impl Default for QuotaRetry {
    fn default() -> Self {
        QuotaRetry { max_retries: 1 }
    }
}

impl QuotaRetry {
    pub fn new(max_retries: u32) -> Self {
        QuotaRetry { max_retries }
    }

    pub async fn retry<T, WAIT, WAITFUT, ATTEMPT, ATTEMPTFUT>(&self, first: T, mut wait: WAIT, mut attempt: ATTEMPT) -> T
    where
        T: QuotaClassified,
        WAIT: FnMut() -> WAITFUT,
        WAITFUT: Future<Output = ()>,
        ATTEMPT: FnMut() -> ATTEMPTFUT,
        ATTEMPTFUT: Future<Output = T>,
    {
        let mut outcome = first;
        let mut retries = 0;
        while retries < self.max_retries && outcome.is_quota_exceeded() {
            retries += 1;
            info!("Quota exceeded, retry {} of {}", retries, self.max_retries);
            wait().await;
            outcome = attempt().await;
        }
        outcome
    }
}
