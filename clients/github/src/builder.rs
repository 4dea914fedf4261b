use crate::GithubClient;
use commit_collector::api::{Error, Result};
use reqwest::header;
use reqwest::header::HeaderMap;
use reqwest::header::HeaderName;
use reqwest::header::HeaderValue;
use reqwest::ClientBuilder;
use secrecy::ExposeSecret;
use std::time::Duration;
use url::Url;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

pub struct GithubClientBuilder {
    client_builder: ClientBuilder,
    github_url: String,
    headers: HeaderMap,
    insecure: bool,
}

impl Default for GithubClientBuilder {
    fn default() -> Self {
        let mut headers = HeaderMap::default();
        headers.insert(header::USER_AGENT, HeaderValue::from_static("commit-collector"));
        headers.insert(header::ACCEPT, HeaderValue::from_static("application/vnd.github+json"));
        headers.insert(
            HeaderName::from_static("x-github-api-version"),
            HeaderValue::from_static("2022-11-28"),
        );
        Self {
            client_builder: ClientBuilder::default().timeout(REQUEST_TIMEOUT),
            github_url: "https://api.github.com".to_string(),
            headers,
            insecure: false,
        }
    }
}

impl GithubClientBuilder {
    pub fn try_with_token(self, token: secrecy::SecretString) -> Result<GithubClientBuilder> {
        let mut builder = self.try_with_header(header::AUTHORIZATION, format!("Bearer {}", token.expose_secret()))?;
        if let Some(value) = builder.headers.get_mut(header::AUTHORIZATION) {
            value.set_sensitive(true);
        }
        Ok(builder)
    }

    pub fn try_with_user_agent<STR: AsRef<str>>(self, user_agent: STR) -> Result<GithubClientBuilder> {
        self.try_with_header(header::USER_AGENT, user_agent)
    }

    pub fn with_github_url<STR: AsRef<str>>(mut self, url: STR) -> GithubClientBuilder {
        self.github_url = url.as_ref().to_string();
        self
    }

    /// Skips TLS certificate verification. Off unless asked for.
    pub fn with_insecure_transport(mut self, insecure: bool) -> GithubClientBuilder {
        self.insecure = insecure;
        self
    }

    fn try_with_header(mut self, key: HeaderName, val: impl AsRef<str>) -> Result<GithubClientBuilder> {
        let val = HeaderValue::from_str(val.as_ref())
            .map_err(|err| Error::Config(format!("invalid {} header: {}", key, err)))?;
        self.headers.insert(key, val);
        Ok(self)
    }

    pub fn build(self) -> Result<GithubClient> {
        // a trailing slash keeps the last path segment when joining endpoints
        let github_url = Url::parse(&format!("{}/", self.github_url.trim_end_matches('/')))
            .map_err(|err| Error::Config(format!("invalid API URL {}: {}", self.github_url, err)))?;
        if self.insecure {
            log::warn!("TLS certificate verification is disabled");
        }
        let client = self
            .client_builder
            .default_headers(self.headers)
            .danger_accept_invalid_certs(self.insecure)
            .build()?;
        Ok(GithubClient { client, github_url })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use secrecy::SecretString;

    #[test]
    fn joins_endpoints_below_base_path() {
        let client = GithubClientBuilder::default()
            .with_github_url("https://ghe.example.com/api/v3/")
            .build()
            .unwrap();
        assert_eq!(
            client.endpoint(&["orgs", "acme", "repos"]).unwrap().as_str(),
            "https://ghe.example.com/api/v3/orgs/acme/repos"
        );
    }

    #[test]
    fn rejects_bad_url_and_token() {
        let bad_url = GithubClientBuilder::default().with_github_url("not a url").build();
        assert!(matches!(bad_url, Err(Error::Config(_))));

        let bad_token = GithubClientBuilder::default().try_with_token(SecretString::new("line\nbreak".to_string()));
        assert!(matches!(bad_token, Err(Error::Config(_))));
    }
}
