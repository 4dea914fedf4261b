mod builder;
mod limiter;
mod payload;

pub use builder::GithubClientBuilder;

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use commit_collector::api::{Error, ForgeCommit, RateLimitProbe, RepoDescriptor, Result};
use limiter::{throttle, Throttle, MAX_SECONDARY_RETRIES};
use log::{debug, warn};
use payload::ApiMessage;
use reqwest::{Client, Response};
use serde::de::DeserializeOwned;
use url::Url;

const PER_PAGE: usize = 100;

pub struct GithubClient {
    client: Client,
    github_url: Url,
}

enum Checked {
    Page(Response),
    RetryAfter(std::time::Duration),
}

impl GithubClient {
    fn endpoint(&self, segments: &[&str]) -> Result<Url> {
        let mut url = self.github_url.clone();
        url.path_segments_mut()
            .map_err(|_| Error::Config(format!("API URL {} cannot take a path", self.github_url)))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    /// Reads every page of a listing, stopping at the first empty or short page.
    async fn paged<T: DeserializeOwned>(&self, url: Url, query: &[(&str, String)]) -> Result<Vec<T>> {
        let mut items = Vec::new();
        let mut page = 1;
        loop {
            let response = self.get_page(&url, query, page).await?;
            let batch = response.json::<Vec<T>>().await?;
            let len = batch.len();
            items.extend(batch);
            if len < PER_PAGE {
                debug!("{}: {} items in {} pages", url.path(), items.len(), page);
                return Ok(items);
            }
            page += 1;
        }
    }

    async fn get_page(&self, url: &Url, query: &[(&str, String)], page: usize) -> Result<Response> {
        let mut secondary_hits = 0;
        loop {
            let response = self
                .client
                .get(url.clone())
                .query(query)
                .query(&[("per_page", PER_PAGE), ("page", page)])
                .send()
                .await?;
            match checked(response).await? {
                Checked::Page(response) => return Ok(response),
                Checked::RetryAfter(_) if secondary_hits >= MAX_SECONDARY_RETRIES => {
                    return Err(Error::QuotaExceeded {
                        reset: Utc::now() + chrono::Duration::seconds(60),
                    })
                }
                Checked::RetryAfter(delay) => {
                    secondary_hits += 1;
                    warn!("Secondary rate limit on {}, waiting {} sec", url.path(), delay.as_secs());
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }
}

async fn checked(response: Response) -> Result<Checked> {
    let status = response.status();
    if status.is_success() {
        return Ok(Checked::Page(response));
    }
    let headers = response.headers().clone();
    let body = response.text().await.unwrap_or_default();
    match throttle(status, &headers, &body) {
        Some(Throttle::Secondary(delay)) => Ok(Checked::RetryAfter(delay)),
        Some(Throttle::Primary(reset)) => Err(Error::QuotaExceeded { reset }),
        None => {
            let message = serde_json::from_str::<ApiMessage>(&body)
                .map(|m| m.message)
                .unwrap_or(body);
            Err(Error::Api {
                status: status.as_u16(),
                message,
            })
        }
    }
}

#[async_trait]
impl commit_collector::api::Client for GithubClient {
    async fn org_repos(&self, org: &str) -> Result<Vec<RepoDescriptor>> {
        let url = self.endpoint(&["orgs", org, "repos"])?;
        let query = [("type", "all".to_string()), ("sort", "full_name".to_string())];
        let repos = self.paged::<payload::Repo>(url, &query).await?;
        Ok(repos.into_iter().map(RepoDescriptor::from).collect())
    }

    async fn branches(&self, org: &str, repo: &str) -> Result<Vec<String>> {
        let url = self.endpoint(&["repos", org, repo, "branches"])?;
        let branches = self.paged::<payload::Branch>(url, &[]).await?;
        Ok(branches.into_iter().map(|b| b.name).collect())
    }

    async fn commits(
        &self,
        org: &str,
        repo: &str,
        branch: &str,
        since: DateTime<Utc>,
        until: DateTime<Utc>,
    ) -> Result<Vec<ForgeCommit>> {
        let url = self.endpoint(&["repos", org, repo, "commits"])?;
        let query = [
            ("sha", branch.to_string()),
            ("since", since.to_rfc3339_opts(SecondsFormat::Secs, true)),
            ("until", until.to_rfc3339_opts(SecondsFormat::Secs, true)),
        ];
        match self.paged::<payload::Commit>(url, &query).await {
            Ok(commits) => Ok(commits.into_iter().map(ForgeCommit::from).collect()),
            // empty repository
            Err(Error::Api { status: 409, .. }) => Ok(Vec::new()),
            Err(err) => Err(err),
        }
    }

    async fn rate_limit(&self) -> Result<RateLimitProbe> {
        let url = self.endpoint(&["rate_limit"])?;
        let response = self.client.get(url).send().await?;
        match checked(response).await? {
            Checked::Page(response) => Ok(response.json::<RateLimitProbe>().await?),
            // the probe itself was throttled: report nothing left so the guard waits
            Checked::RetryAfter(_) => Ok(RateLimitProbe::default()),
        }
    }
}
