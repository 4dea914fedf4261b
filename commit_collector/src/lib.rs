//! Commit collection
//!
//! # Overview
//!
//! Collects commit metadata of every active repository of a GitHub organization within a
//! window of at most ten days and keeps it in an object store as one JSON document per
//! author and UTC day: `<prefix>/<author_key>/<YYYY-MM-DD>/commits.json`.
//!
//! Each repository is traversed branch by branch. A commit reachable from several branches is
//! kept once, automation accounts are left out, and the remaining commits are grouped by an
//! author key (`login:<login>`, `email:<address>` or `unknown:<hash>`).
//! Records are merged into what previous runs stored, so running the same window again adds
//! new commits without duplicating old ones.
//!
//! Repositories traversed completely leave an empty marker per day under
//! `<prefix>/_cache/v1/dt=<YYYY-MM-DD>/repo=<name>.done`; later runs skip repositories marked
//! for every day of their window unless told to reprocess.
//!
//! The API quota is probed before work is dispatched and again before each repository. Below
//! the threshold the caller sleeps until the quota resets. A repository failing on an exhausted
//! quota is retried once.

pub mod api;
pub mod model;
pub mod store;

#[cfg(feature = "pipeline")]
pub mod cache;
#[cfg(feature = "pipeline")]
pub mod collector;
#[cfg(feature = "pipeline")]
pub mod orchestrator;
#[cfg(feature = "pipeline")]
pub mod rate_limit;
#[cfg(feature = "pipeline")]
pub mod repos;
#[cfg(feature = "pipeline")]
pub mod retry;
#[cfg(feature = "pipeline")]
pub mod writer;

pub use api::{Client, Error, FailureKind, Result};
pub use model::{CommitRecord, Window};
pub use store::{MemoryStore, ObjectStore};

#[cfg(feature = "pipeline")]
pub use orchestrator::{Orchestrator, RunConfig, RunSummary};
#[cfg(feature = "pipeline")]
pub use repos::RepoSelection;
