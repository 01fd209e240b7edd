use std::fs::{self, File};
use std::path::Path;
use std::thread;
use std::time::Duration;

use reqwest::blocking::Client;
use reqwest::header::{HeaderMap, HeaderValue, USER_AGENT};
use tracing::{debug, warn};

use crate::config::Settings;
use crate::error::PrepError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchOutcome {
    Downloaded,
    AlreadyPresent,
}

/// Raw transfer of one URL to one local path. The destination is always a
/// fresh path; skip logic lives in [`fetch_if_absent`].
pub trait Fetcher: Send + Sync {
    fn download(&self, url: &str, destination: &Path) -> Result<(), PrepError>;
}

/// Do-not-overwrite fetch. An existing destination counts as success and no
/// transfer happens. New data is staged next to the destination and renamed
/// into place, so an interrupted transfer never leaves a file behind.
pub fn fetch_if_absent(
    fetcher: &dyn Fetcher,
    url: &str,
    destination: &Path,
) -> Result<FetchOutcome, PrepError> {
    if destination.exists() {
        debug!(path = %destination.display(), "already present, skipping fetch");
        return Ok(FetchOutcome::AlreadyPresent);
    }

    let parent = destination
        .parent()
        .ok_or_else(|| PrepError::Filesystem("invalid destination path".to_string()))?;
    fs::create_dir_all(parent).map_err(|err| PrepError::Filesystem(err.to_string()))?;
    let temp = tempfile::Builder::new()
        .prefix(".wsprep-part")
        .tempfile_in(parent)
        .map_err(|err| PrepError::Filesystem(err.to_string()))?;

    // errors name the real destination, not the discarded part file
    fetcher
        .download(url, temp.path())
        .map_err(|err| match err {
            PrepError::Fetch { url, message, .. } => PrepError::Fetch {
                url,
                destination: destination.to_path_buf(),
                message,
            },
            other => other,
        })?;

    temp.persist(destination)
        .map_err(|err| PrepError::Filesystem(err.to_string()))?;
    Ok(FetchOutcome::Downloaded)
}

#[derive(Clone)]
pub struct HttpFetcher {
    client: Client,
    max_retries: usize,
}

impl HttpFetcher {
    pub fn new(settings: &Settings) -> Result<Self, PrepError> {
        let mut headers = HeaderMap::new();
        headers.insert(
            USER_AGENT,
            HeaderValue::from_str(&format!("wsprep/{}", env!("CARGO_PKG_VERSION")))
                .map_err(|err| PrepError::Filesystem(err.to_string()))?,
        );
        let client = Client::builder()
            .default_headers(headers)
            .timeout(settings.timeout())
            .build()
            .map_err(|err| PrepError::Filesystem(format!("http client: {err}")))?;
        Ok(Self {
            client,
            max_retries: settings.max_retries,
        })
    }

    fn send_with_retries(&self, url: &str) -> Result<reqwest::blocking::Response, String> {
        const BASE_DELAY_MS: u64 = 500;
        let mut attempt = 0usize;
        loop {
            match self.client.get(url).send() {
                Ok(resp) => {
                    let status = resp.status().as_u16();
                    if attempt < self.max_retries && is_retryable_status(status) {
                        warn!(url, status, attempt, "retrying fetch");
                        thread::sleep(Duration::from_millis(BASE_DELAY_MS * (attempt as u64 + 1)));
                        attempt += 1;
                        continue;
                    }
                    return Ok(resp);
                }
                Err(err) => {
                    if attempt < self.max_retries && is_retryable_error(&err) {
                        warn!(url, error = %err, attempt, "retrying fetch");
                        thread::sleep(Duration::from_millis(BASE_DELAY_MS * (attempt as u64 + 1)));
                        attempt += 1;
                        continue;
                    }
                    return Err(err.to_string());
                }
            }
        }
    }
}

impl Fetcher for HttpFetcher {
    fn download(&self, url: &str, destination: &Path) -> Result<(), PrepError> {
        let fetch_error = |message: String| PrepError::Fetch {
            url: url.to_string(),
            destination: destination.to_path_buf(),
            message,
        };

        let mut response = self.send_with_retries(url).map_err(fetch_error)?;
        if !response.status().is_success() {
            return Err(fetch_error(format!("server returned {}", response.status())));
        }

        let mut file =
            File::create(destination).map_err(|err| PrepError::Filesystem(err.to_string()))?;
        std::io::copy(&mut response, &mut file).map_err(|err| fetch_error(err.to_string()))?;
        Ok(())
    }
}

fn is_retryable_status(status: u16) -> bool {
    matches!(status, 429 | 500 | 502 | 503 | 504)
}

fn is_retryable_error(err: &reqwest::Error) -> bool {
    err.is_timeout() || err.is_connect() || err.is_request()
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use assert_matches::assert_matches;

    use super::*;

    #[derive(Default)]
    struct CountingFetcher {
        calls: Mutex<usize>,
    }

    impl Fetcher for CountingFetcher {
        fn download(&self, _url: &str, destination: &Path) -> Result<(), PrepError> {
            *self.calls.lock().unwrap() += 1;
            fs::write(destination, b"payload").map_err(|err| PrepError::Filesystem(err.to_string()))
        }
    }

    struct FailingFetcher;

    impl Fetcher for FailingFetcher {
        fn download(&self, url: &str, destination: &Path) -> Result<(), PrepError> {
            fs::write(destination, b"half").unwrap();
            Err(PrepError::Fetch {
                url: url.to_string(),
                destination: destination.to_path_buf(),
                message: "connection reset".to_string(),
            })
        }
    }

    #[test]
    fn existing_destination_skips_download() {
        let temp = tempfile::tempdir().unwrap();
        let dest = temp.path().join("flowdir11.tif");
        let fetcher = CountingFetcher::default();

        let first = fetch_if_absent(&fetcher, "http://x/flowdir11.tif", &dest).unwrap();
        let second = fetch_if_absent(&fetcher, "http://x/flowdir11.tif", &dest).unwrap();

        assert_eq!(first, FetchOutcome::Downloaded);
        assert_eq!(second, FetchOutcome::AlreadyPresent);
        assert_eq!(*fetcher.calls.lock().unwrap(), 1);
        assert_eq!(fs::read(&dest).unwrap(), b"payload");
    }

    #[test]
    fn failed_download_leaves_nothing_behind() {
        let temp = tempfile::tempdir().unwrap();
        let dest = temp.path().join("accum11.tif");

        let err = fetch_if_absent(&FailingFetcher, "http://x/accum11.tif", &dest).unwrap_err();

        assert_matches!(err, PrepError::Fetch { ref url, ref destination, .. } => {
            assert_eq!(url, "http://x/accum11.tif");
            assert_eq!(destination, &dest);
        });
        assert!(!dest.exists());
        assert_eq!(fs::read_dir(temp.path()).unwrap().count(), 0);
    }
}
