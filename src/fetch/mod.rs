use std::time::Instant;

use chrono::{DateTime, Utc};
use reqwest::header::{HeaderValue, LAST_MODIFIED};
use reqwest::Client;
use tracing::{debug, info, instrument, warn};
use url::Url;

use crate::cache::{CacheEntry, CacheStore};
use crate::error::{Error, Result};

/// How to interpret the bytes of a remote file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FileFormat {
    /// TAB-separated text, potentially with ragged rows.
    Delimited,
    /// A workbook; one designated sheet, header at the given 0-based row.
    Spreadsheet { sheet: String, header_row: usize },
}

/// Everything needed to locate, cache and interpret one remote flat file.
#[derive(Debug, Clone)]
pub struct RemoteFileDescriptor {
    pub url: Url,
    pub format: FileFormat,
    pub cache_key: String,
}

impl RemoteFileDescriptor {
    pub fn new(url: Url, format: FileFormat, cache_key: impl Into<String>) -> Self {
        RemoteFileDescriptor {
            url,
            format,
            cache_key: cache_key.into(),
        }
    }
}

/// Decision of the freshness oracle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Freshness {
    Fetch,
    UseCached,
}

fn parse_http_date(value: &HeaderValue) -> Option<DateTime<Utc>> {
    let s = value.to_str().ok()?;
    DateTime::parse_from_rfc2822(s)
        .ok()
        .map(|t| t.with_timezone(&Utc))
}

/// Decide whether `descriptor` needs a content fetch, using a HEAD request
/// and the `Last-Modified` header as the sole freshness signal.
///
/// Read-only: never touches cache state. Fails open: when the cache entry is
/// absent, the remote timestamp cannot be determined, or the HEAD request
/// fails, the answer is `Fetch` -- stale data is worse than one extra
/// request.
pub async fn check_freshness(
    client: &Client,
    descriptor: &RemoteFileDescriptor,
    store: &CacheStore,
) -> Freshness {
    let cached = match store.entry(&descriptor.cache_key) {
        Some(CacheEntry {
            last_modified_remote: Some(t),
            ..
        }) => t,
        _ => return Freshness::Fetch,
    };

    let response = match client.head(descriptor.url.clone()).send().await {
        Ok(r) if r.status().is_success() => r,
        Ok(r) => {
            warn!(url = %descriptor.url, status = %r.status(), "HEAD request rejected; fetching");
            return Freshness::Fetch;
        }
        Err(e) => {
            warn!(url = %descriptor.url, error = %e, "HEAD request failed; fetching");
            return Freshness::Fetch;
        }
    };

    match response.headers().get(LAST_MODIFIED).and_then(parse_http_date) {
        Some(remote) if remote <= cached => {
            debug!(url = %descriptor.url, %remote, %cached, "cache is fresh");
            Freshness::UseCached
        }
        Some(remote) => {
            debug!(url = %descriptor.url, %remote, %cached, "remote is newer");
            Freshness::Fetch
        }
        None => {
            debug!(url = %descriptor.url, "no usable Last-Modified header");
            Freshness::Fetch
        }
    }
}

/// Outcome of a successful content fetch. `entry` is `None` when the
/// download itself succeeded but could not be persisted; in that case
/// `cache_warning` carries the reason and `bytes` is still served.
#[derive(Debug)]
pub struct Fetched {
    pub bytes: Vec<u8>,
    pub entry: Option<CacheEntry>,
    pub cache_warning: Option<String>,
    pub elapsed_ms: u64,
}

/// Download `descriptor` in full and install it in the cache. Callers hold
/// the store's per-key lock across this call so two fetches of the same key
/// never race.
#[instrument(level = "info", skip(client, store), fields(url = %descriptor.url))]
pub async fn fetch(
    client: &Client,
    descriptor: &RemoteFileDescriptor,
    store: &CacheStore,
) -> Result<Fetched> {
    let network = |source: reqwest::Error| Error::Network {
        url: descriptor.url.to_string(),
        source,
    };

    let started = Instant::now();
    let response = client
        .get(descriptor.url.clone())
        .send()
        .await
        .map_err(network)?
        .error_for_status()
        .map_err(network)?;

    let last_modified = response.headers().get(LAST_MODIFIED).and_then(parse_http_date);
    let content_length = response.content_length();
    let bytes = response.bytes().await.map_err(network)?.to_vec();
    let elapsed_ms = started.elapsed().as_millis() as u64;

    info!(
        size = bytes.len(),
        content_length,
        elapsed_ms,
        "downloaded {}",
        descriptor.url
    );

    match store.persist(&descriptor.cache_key, &bytes, last_modified) {
        Ok(entry) => Ok(Fetched {
            bytes,
            entry: Some(entry),
            cache_warning: None,
            elapsed_ms,
        }),
        Err(e) => {
            warn!(cache_key = %descriptor.cache_key, error = %e, "download kept in memory only");
            Ok(Fetched {
                bytes,
                entry: None,
                cache_warning: Some(e.to_string()),
                elapsed_ms,
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Result;
    use chrono::TimeZone;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const STAMP: &str = "Wed, 01 May 2024 12:00:00 GMT";

    fn stamp_utc() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap()
    }

    fn descriptor(server: &MockServer) -> RemoteFileDescriptor {
        RemoteFileDescriptor::new(
            Url::parse(&format!("{}/data.tsv", server.uri())).unwrap(),
            FileFormat::Delimited,
            "data",
        )
    }

    #[tokio::test]
    async fn fresh_cache_avoids_content_fetch() -> Result<()> {
        let server = MockServer::start().await;
        Mock::given(method("HEAD"))
            .and(path("/data.tsv"))
            .respond_with(ResponseTemplate::new(200).insert_header("Last-Modified", STAMP))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/data.tsv"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;

        let dir = tempfile::tempdir()?;
        let store = CacheStore::new(dir.path());
        store.persist("data", b"cached", Some(stamp_utc()))?;

        let client = Client::new();
        let freshness = check_freshness(&client, &descriptor(&server), &store).await;
        assert_eq!(freshness, Freshness::UseCached);
        Ok(())
    }

    #[tokio::test]
    async fn newer_remote_triggers_exactly_one_fetch() -> Result<()> {
        let server = MockServer::start().await;
        Mock::given(method("HEAD"))
            .and(path("/data.tsv"))
            .respond_with(ResponseTemplate::new(200).insert_header("Last-Modified", STAMP))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/data.tsv"))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("Last-Modified", STAMP)
                    .set_body_bytes(b"code\tname\n".to_vec()),
            )
            .expect(1)
            .mount(&server)
            .await;

        let dir = tempfile::tempdir()?;
        let store = CacheStore::new(dir.path());
        // Cached an hour before the remote timestamp.
        store.persist(
            "data",
            b"stale",
            Some(Utc.with_ymd_and_hms(2024, 5, 1, 11, 0, 0).unwrap()),
        )?;

        let client = Client::new();
        let desc = descriptor(&server);
        assert_eq!(
            check_freshness(&client, &desc, &store).await,
            Freshness::Fetch
        );

        let fetched = fetch(&client, &desc, &store).await?;
        assert_eq!(fetched.bytes, b"code\tname\n");
        let entry = fetched.entry.expect("entry persisted");
        assert_eq!(entry.last_modified_remote, Some(stamp_utc()));
        assert_eq!(store.read("data")?, b"code\tname\n");
        Ok(())
    }

    #[tokio::test]
    async fn no_cache_entry_means_fetch_without_head() -> Result<()> {
        let server = MockServer::start().await;
        Mock::given(method("HEAD"))
            .and(path("/data.tsv"))
            .respond_with(ResponseTemplate::new(200).insert_header("Last-Modified", STAMP))
            .expect(0)
            .mount(&server)
            .await;

        let dir = tempfile::tempdir()?;
        let store = CacheStore::new(dir.path());
        let client = Client::new();
        assert_eq!(
            check_freshness(&client, &descriptor(&server), &store).await,
            Freshness::Fetch
        );
        Ok(())
    }

    #[tokio::test]
    async fn failing_head_fails_open() -> Result<()> {
        let server = MockServer::start().await;
        Mock::given(method("HEAD"))
            .and(path("/data.tsv"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let dir = tempfile::tempdir()?;
        let store = CacheStore::new(dir.path());
        store.persist("data", b"cached", Some(stamp_utc()))?;

        let client = Client::new();
        assert_eq!(
            check_freshness(&client, &descriptor(&server), &store).await,
            Freshness::Fetch
        );
        Ok(())
    }

    #[tokio::test]
    async fn http_error_surfaces_as_network_error() -> Result<()> {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/data.tsv"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let dir = tempfile::tempdir()?;
        let store = CacheStore::new(dir.path());
        let client = Client::new();
        let err = fetch(&client, &descriptor(&server), &store)
            .await
            .expect_err("404 must fail");
        assert!(matches!(err, Error::Network { .. }));
        Ok(())
    }
}
