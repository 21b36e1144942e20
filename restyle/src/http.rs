//! Blocking HTTP client and the `Fetch` abstraction over it

use anyhow::{Context, Result};
use reqwest::blocking::Client;

use crate::config::Config;
use crate::data_url;

const USER_AGENT: &str = concat!("restyle/", env!("CARGO_PKG_VERSION"));

pub fn client(config: &Config) -> Result<Client> {
    Client::builder()
        .user_agent(USER_AGENT)
        .timeout(config.request_timeout())
        .build()
        .context("Failed to build HTTP client")
}

/// Source of remote bytes. `Sync` so fetches can fan out across rayon workers.
pub trait Fetch: Sync {
    fn fetch(&self, url: &str) -> Result<Vec<u8>>;
}

impl Fetch for Client {
    fn fetch(&self, url: &str) -> Result<Vec<u8>> {
        if data_url::is_data_url(url) {
            return data_url::parse(url).map(|d| d.data);
        }

        log::debug!("GET {url}");
        let bytes = self
            .get(url)
            .send()
            .with_context(|| format!("Request to {url} failed"))?
            .error_for_status()
            .with_context(|| format!("Request to {url} was rejected"))?
            .bytes()
            .with_context(|| format!("Failed to read response body from {url}"))?;

        Ok(bytes.to_vec())
    }
}

/// Fetcher for offline use: only `data:` URLs resolve
pub struct Offline;

impl Fetch for Offline {
    fn fetch(&self, url: &str) -> Result<Vec<u8>> {
        if data_url::is_data_url(url) {
            return data_url::parse(url).map(|d| d.data);
        }
        anyhow::bail!("Network access is disabled, cannot fetch {url}")
    }
}

#[test]
fn offline_resolves_data_urls_only() {
    let url = data_url::encode("image/png", b"abc");
    assert_eq!(Offline.fetch(&url).unwrap(), b"abc");
    assert!(Offline.fetch("https://example.com/a.png").is_err());
}

#[test]
fn client_builds_from_default_config() {
    assert!(client(&Config::default()).is_ok());
}
