// src/channel/client.rs

//! Fetching channel indices and artifacts
//!
//! Channels are either `file://` directories (the local conda-build output)
//! or HTTP(S) URLs. Both are read through [`ChannelFetcher`], so the
//! reconciler never needs to know which one it is talking to.

use crate::error::{Error, Result};
use reqwest::StatusCode;
use reqwest::blocking::Client;
use std::fs::{self, File};
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info, warn};
use url::Url;

use super::repodata::{REPODATA_FILE, RepoData};

/// Maximum attempts for a request that fails in transit
const MAX_RETRIES: u32 = 3;

/// Retry delay in milliseconds (multiplied by the attempt number)
const RETRY_DELAY_MS: u64 = 1000;

/// Read access to channels
pub trait ChannelFetcher: Sync {
    /// Package listing of `<channel>/<platform>/`
    ///
    /// `Ok(None)` means the channel has never been populated: the local
    /// directory or the remote index does not exist (HTTP 404). Any other
    /// failure is an error.
    fn fetch_repodata(&self, channel_url: &str, platform: &str) -> Result<Option<RepoData>>;

    /// Copy `<channel>/<platform>/<filename>` to `dest`
    fn fetch_artifact(
        &self,
        channel_url: &str,
        platform: &str,
        filename: &str,
        dest: &Path,
    ) -> Result<()>;
}

/// Join `<channel>/<platform>/<file>`
pub fn platform_url(channel_url: &str, platform: &str, file: &str) -> Result<Url> {
    let base = Url::parse(channel_url)
        .map_err(|e| Error::ConfigError(format!("Invalid channel URL '{channel_url}': {e}")))?;
    base.join(&format!("{platform}/"))
        .and_then(|dir| dir.join(file))
        .map_err(|e| Error::ConfigError(format!("Invalid path below '{channel_url}': {e}")))
}

/// Local path of a `file://` channel location
pub fn local_path(url: &Url) -> Result<PathBuf> {
    url.to_file_path()
        .map_err(|_| Error::ConfigError(format!("'{url}' is not a usable local path")))
}

/// HTTP + `file://` channel client
pub struct ChannelClient {
    client: Client,
    max_retries: u32,
}

impl ChannelClient {
    pub fn new(timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| Error::InitError(format!("Failed to create HTTP client: {e}")))?;

        Ok(Self {
            client,
            max_retries: MAX_RETRIES,
        })
    }

    /// GET with retries on transport errors; HTTP status is left to the caller
    fn get(&self, url: &Url) -> Result<reqwest::blocking::Response> {
        let mut attempt = 0;
        loop {
            attempt += 1;
            match self.client.get(url.as_str()).send() {
                Ok(response) => return Ok(response),
                Err(e) => {
                    if attempt >= self.max_retries {
                        return Err(Error::DownloadError(format!(
                            "Failed to fetch {url} after {attempt} attempts: {e}"
                        )));
                    }
                    warn!("Fetch of {} failed (attempt {}): {}, retrying...", url, attempt, e);
                    std::thread::sleep(Duration::from_millis(RETRY_DELAY_MS * attempt as u64));
                }
            }
        }
    }
}

impl ChannelFetcher for ChannelClient {
    fn fetch_repodata(&self, channel_url: &str, platform: &str) -> Result<Option<RepoData>> {
        let url = platform_url(channel_url, platform, REPODATA_FILE)?;

        let bytes = if url.scheme() == "file" {
            let path = local_path(&url)?;
            match fs::read(&path) {
                Ok(bytes) => bytes,
                Err(e) if e.kind() == io::ErrorKind::NotFound => {
                    info!("{} not found, treating channel as empty", path.display());
                    return Ok(None);
                }
                Err(e) => {
                    return Err(Error::IoError(format!(
                        "Failed to read {}: {e}",
                        path.display()
                    )));
                }
            }
        } else {
            debug!("Fetching {}", url);
            let response = self.get(&url)?;
            if response.status() == StatusCode::NOT_FOUND {
                info!("{} returned 404, treating channel as uninitialized", url);
                return Ok(None);
            }
            if !response.status().is_success() {
                return Err(Error::DownloadError(format!(
                    "HTTP {} from {}",
                    response.status(),
                    url
                )));
            }
            response
                .bytes()
                .map_err(|e| Error::DownloadError(format!("Failed to read {url}: {e}")))?
                .to_vec()
        };

        let repodata = RepoData::parse(&bytes)
            .map_err(|e| Error::ParseError(format!("Invalid {url}: {e}")))?;
        Ok(Some(repodata))
    }

    fn fetch_artifact(
        &self,
        channel_url: &str,
        platform: &str,
        filename: &str,
        dest: &Path,
    ) -> Result<()> {
        let url = platform_url(channel_url, platform, filename)?;

        if url.scheme() == "file" {
            let path = local_path(&url)?;
            fs::copy(&path, dest).map_err(|e| {
                Error::IoError(format!("Failed to copy {}: {e}", path.display()))
            })?;
            return Ok(());
        }

        debug!("Downloading {}", url);
        let mut response = self.get(&url)?;
        if !response.status().is_success() {
            return Err(Error::DownloadError(format!(
                "HTTP {} from {}",
                response.status(),
                url
            )));
        }

        let mut file = File::create(dest).map_err(|e| {
            Error::IoError(format!("Failed to create {}: {e}", dest.display()))
        })?;
        io::copy(&mut response, &mut file)
            .map_err(|e| Error::DownloadError(format!("Failed to download {url}: {e}")))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn file_channel(dir: &Path) -> String {
        let mut url = Url::from_directory_path(dir).unwrap().to_string();
        if !url.ends_with('/') {
            url.push('/');
        }
        url
    }

    #[test]
    fn test_platform_url() {
        let url = platform_url("https://example.org/chan/", "linux-64", "repodata.json").unwrap();
        assert_eq!(url.as_str(), "https://example.org/chan/linux-64/repodata.json");
    }

    #[test]
    fn test_missing_local_channel_is_empty() {
        let dir = TempDir::new().unwrap();
        let client = ChannelClient::new(Duration::from_secs(5)).unwrap();
        let listing = client
            .fetch_repodata(&file_channel(dir.path()), "linux-64")
            .unwrap();
        assert!(listing.is_none());
    }

    #[test]
    fn test_local_channel_roundtrip() {
        let dir = TempDir::new().unwrap();
        let platform_dir = dir.path().join("linux-64");
        fs::create_dir_all(&platform_dir).unwrap();
        fs::write(
            platform_dir.join(REPODATA_FILE),
            r#"{"packages": {"a-1.0-0.tar.bz2": {"name": "a", "version": "1.0", "build_number": 0}}}"#,
        )
        .unwrap();
        fs::write(platform_dir.join("a-1.0-0.tar.bz2"), b"payload").unwrap();

        let client = ChannelClient::new(Duration::from_secs(5)).unwrap();
        let channel = file_channel(dir.path());

        let listing = client.fetch_repodata(&channel, "linux-64").unwrap().unwrap();
        assert_eq!(listing.len(), 1);

        let dest = dir.path().join("copy");
        client
            .fetch_artifact(&channel, "linux-64", "a-1.0-0.tar.bz2", &dest)
            .unwrap();
        assert_eq!(fs::read(dest).unwrap(), b"payload");
    }

    #[test]
    fn test_corrupt_index_is_an_error() {
        let dir = TempDir::new().unwrap();
        let platform_dir = dir.path().join("linux-64");
        fs::create_dir_all(&platform_dir).unwrap();
        fs::write(platform_dir.join(REPODATA_FILE), "not json").unwrap();

        let client = ChannelClient::new(Duration::from_secs(5)).unwrap();
        let err = client
            .fetch_repodata(&file_channel(dir.path()), "linux-64")
            .unwrap_err();
        assert!(matches!(err, Error::ParseError(_)));
    }

    #[test]
    fn test_unreadable_local_index_is_an_error() {
        let dir = TempDir::new().unwrap();
        // A directory where the index file should be: exists, but cannot be read
        fs::create_dir_all(dir.path().join("linux-64").join(REPODATA_FILE)).unwrap();

        let client = ChannelClient::new(Duration::from_secs(5)).unwrap();
        let err = client
            .fetch_repodata(&file_channel(dir.path()), "linux-64")
            .unwrap_err();
        assert!(matches!(err, Error::IoError(_)));
    }

    /// Answer one HTTP request with `status_line` on a local port
    fn serve_once(status_line: &'static str) -> String {
        use std::io::{Read, Write};
        use std::net::TcpListener;

        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        std::thread::spawn(move || {
            let (mut stream, _) = listener.accept().unwrap();
            let mut request = Vec::new();
            let mut buf = [0u8; 1024];
            while !request.windows(4).any(|w| w == b"\r\n\r\n") {
                let n = stream.read(&mut buf).unwrap();
                if n == 0 {
                    break;
                }
                request.extend_from_slice(&buf[..n]);
            }
            let response =
                format!("{status_line}\r\nContent-Length: 0\r\nConnection: close\r\n\r\n");
            stream.write_all(response.as_bytes()).unwrap();
        });
        format!("http://{addr}/channel/")
    }

    /// Direct connections, one attempt per request
    fn loopback_client() -> ChannelClient {
        ChannelClient {
            client: Client::builder()
                .no_proxy()
                .timeout(Duration::from_secs(5))
                .build()
                .unwrap(),
            max_retries: 1,
        }
    }

    #[test]
    fn test_remote_404_is_empty() {
        let url = serve_once("HTTP/1.1 404 Not Found");
        let client = loopback_client();
        assert!(client.fetch_repodata(&url, "linux-64").unwrap().is_none());
    }

    #[test]
    fn test_remote_server_error_is_fatal() {
        let url = serve_once("HTTP/1.1 500 Internal Server Error");
        let client = loopback_client();
        let err = client.fetch_repodata(&url, "linux-64").unwrap_err();
        assert!(matches!(err, Error::DownloadError(ref msg) if msg.contains("500")));
    }

    #[test]
    fn test_unreachable_channel_is_fatal() {
        // Bind and release a port so nothing listens on it
        let addr = std::net::TcpListener::bind("127.0.0.1:0")
            .unwrap()
            .local_addr()
            .unwrap();
        let err = loopback_client()
            .fetch_repodata(&format!("http://{addr}/channel/"), "linux-64")
            .unwrap_err();
        assert!(matches!(err, Error::DownloadError(_)));
    }
}
