//! Streaming asset downloader
//!
//! Streams a release asset into a temporary file with per-chunk progress,
//! follows redirects, and refuses to leave a partial file behind.

use std::path::Path;
use std::time::Duration;

use futures::StreamExt;
use reqwest::{redirect, Client};
use tokio::fs::File;
use tokio::io::AsyncWriteExt;

use crate::error::{ControlError, ControlResult};

/// User agent sent with every request; the release host rejects anonymous clients
pub const USER_AGENT: &str = concat!("Llama-Control-Center/", env!("CARGO_PKG_VERSION"));

/// Redirect hops followed before giving up
const MAX_REDIRECTS: usize = 10;

/// Whole-transfer timeout; release archives can be several hundred MB
const DOWNLOAD_TIMEOUT: Duration = Duration::from_secs(3600);

/// HTTP client used for asset downloads
pub fn build_client() -> ControlResult<Client> {
    Client::builder()
        .user_agent(USER_AGENT)
        .redirect(redirect::Policy::limited(MAX_REDIRECTS))
        .timeout(DOWNLOAD_TIMEOUT)
        .build()
        .map_err(|e| ControlError::Network(format!("failed to create HTTP client: {}", e)))
}

/// Whole percent of `received` over `expected`, capped at 100
pub fn percent(received: u64, expected: Option<u64>) -> u8 {
    match expected {
        Some(total) if total > 0 => ((received.saturating_mul(100)) / total).min(100) as u8,
        _ => 0,
    }
}

/// Download `url` into `dest` and return the number of bytes written.
///
/// `declared_size` is the catalog's size for the asset and is only used when
/// the final response carries no `Content-Length`. `on_progress` receives
/// the whole percent after every chunk. On any failure `dest` is removed.
pub async fn download_file<F>(
    client: &Client,
    url: &str,
    dest: &Path,
    declared_size: u64,
    on_progress: F,
) -> ControlResult<u64>
where
    F: FnMut(u8),
{
    tracing::info!("[Downloader] Starting download: {} -> {:?}", url, dest);

    if let Some(parent) = dest.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }

    let result = stream_to_file(client, url, dest, declared_size, on_progress).await;
    if let Err(e) = &result {
        tracing::warn!("[Downloader] Download of {} failed: {}", url, e);
        remove_partial(dest).await;
    }
    result
}

async fn stream_to_file<F>(
    client: &Client,
    url: &str,
    dest: &Path,
    declared_size: u64,
    mut on_progress: F,
) -> ControlResult<u64>
where
    F: FnMut(u8),
{
    let response = client
        .get(url)
        .send()
        .await
        .map_err(|e| ControlError::Network(e.to_string()))?;

    // Redirects are already resolved here; status and length are the final resource's
    let status = response.status();
    if !status.is_success() {
        return Err(ControlError::DownloadFailed {
            status: status.as_u16(),
        });
    }

    let expected = response
        .content_length()
        .or((declared_size > 0).then_some(declared_size));
    if response.url().as_str() != url {
        tracing::debug!("[Downloader] Redirected to {}", response.url());
    }

    let mut file = File::create(dest).await?;
    let mut received: u64 = 0;
    let start_time = std::time::Instant::now();
    let mut stream = response.bytes_stream();

    while let Some(chunk_result) = stream.next().await {
        let chunk = match chunk_result {
            Ok(chunk) => chunk,
            Err(e) => {
                // A body cut short of its declared length is a truncated transfer
                return match expected {
                    Some(expected) if received < expected => {
                        tracing::warn!("[Downloader] Stream broke after {} bytes: {}", received, e);
                        Err(ControlError::IncompleteDownload { received, expected })
                    }
                    _ => Err(ControlError::Network(e.to_string())),
                };
            }
        };

        file.write_all(&chunk).await?;
        received += chunk.len() as u64;
        on_progress(percent(received, expected));
    }

    file.flush().await?;
    drop(file);

    if let Some(expected) = expected {
        if received != expected {
            return Err(ControlError::IncompleteDownload { received, expected });
        }
    }

    tracing::info!(
        "[Downloader] Download complete: {} bytes in {:.1}s",
        received,
        start_time.elapsed().as_secs_f64()
    );

    Ok(received)
}

/// Best-effort removal of a temporary file
pub async fn remove_partial(path: &Path) {
    match tokio::fs::remove_file(path).await {
        Ok(()) => tracing::debug!("[Downloader] Removed {:?}", path),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => tracing::warn!("[Downloader] Could not remove {:?}: {}", path, e),
    }
}
