use std::path::{Path, PathBuf};

use futures_util::StreamExt;
use log::{debug, info};
use reqwest::StatusCode;
use reqwest::header::RANGE;
use tokio::fs;
use tokio::io::AsyncWriteExt;

use skylift_backend::{EventSink, TransferError, TransferOutcome};

/// Fetch `url` into `dest`, resuming a prior partial transfer when one is on
/// disk and reusing `dest` outright when it already matches `expected_size`.
///
/// The body streams into a `.part` sibling and only moves to its final name
/// after the size check passes, so a file sitting at `dest` is always a
/// complete artifact. A cached file with the wrong size is discarded and the
/// download starts over within the same call.
///
/// # Errors
/// Fails on request or filesystem errors, on an unexpected HTTP status, and
/// when the completed download does not match `expected_size`.
pub async fn download_resumable(
    client: &reqwest::Client,
    url: &str,
    dest: &Path,
    expected_size: Option<u64>,
    events: &EventSink,
) -> Result<TransferOutcome, TransferError> {
    if let Ok(existing) = fs::metadata(dest).await {
        match expected_size {
            Some(expected) if existing.len() != expected => {
                info!(
                    "cached file {} is {} bytes, expected {expected}; discarding",
                    dest.display(),
                    existing.len()
                );
                events.status("File corrupted, re-downloading...");
                fs::remove_file(dest).await.map_err(|error| {
                    TransferError::io_with_path("failed to remove corrupt cached file", dest, &error)
                })?;
            }
            _ => {
                debug!("reusing cached file {}", dest.display());
                return Ok(TransferOutcome::Cached);
            }
        }
    }

    let part = part_path(dest);
    let mut offset = match fs::metadata(&part).await {
        Ok(meta) => meta.len(),
        Err(_) => 0,
    };

    let mut request = client.get(url);
    if offset > 0 {
        debug!("resuming {url} from byte {offset}");
        request = request.header(RANGE, format!("bytes={offset}-"));
    }

    let response = request
        .send()
        .await
        .map_err(|error| TransferError::request(url, error))?;

    let append = match response.status() {
        StatusCode::PARTIAL_CONTENT => true,
        StatusCode::OK => {
            // Host ignored the range header; start over.
            offset = 0;
            false
        }
        status => return Err(TransferError::status(url, status)),
    };

    let total = expected_size.or_else(|| response.content_length().map(|len| len + offset));

    let mut file = if append {
        fs::OpenOptions::new()
            .append(true)
            .create(true)
            .open(&part)
            .await
    } else {
        fs::File::create(&part).await
    }
    .map_err(|error| {
        TransferError::io_with_path("failed to open partial download", &part, &error)
    })?;

    let mut written = offset;
    let mut stream = response.bytes_stream();
    while let Some(chunk) = stream.next().await {
        let chunk = chunk.map_err(|error| TransferError::request(url, error))?;
        file.write_all(&chunk).await.map_err(|error| {
            TransferError::io_with_path("failed to write download chunk", &part, &error)
        })?;
        written += chunk.len() as u64;
        match total {
            Some(total) if total > 0 => events.progress(percent_of(written, total)),
            _ => events.indeterminate(),
        }
    }

    file.flush().await.map_err(|error| {
        TransferError::io_with_path("failed to flush download", &part, &error)
    })?;
    file.sync_all().await.map_err(|error| {
        TransferError::io_with_path("failed to sync download", &part, &error)
    })?;
    drop(file);

    let actual = fs::metadata(&part)
        .await
        .map_err(|error| {
            TransferError::io_with_path("failed to stat completed download", &part, &error)
        })?
        .len();

    if let Some(expected) = expected_size
        && actual != expected
    {
        let _ = fs::remove_file(&part).await;
        return Err(TransferError::size_mismatch(url, expected, actual));
    }

    fs::rename(&part, dest).await.map_err(|error| {
        TransferError::io_with_path("failed to move download into place", &part, &error)
    })?;

    debug!("downloaded {url} -> {} ({actual} bytes)", dest.display());
    Ok(TransferOutcome::Downloaded { bytes: actual })
}

fn part_path(dest: &Path) -> PathBuf {
    let mut name = dest.as_os_str().to_owned();
    name.push(".part");
    PathBuf::from(name)
}

#[allow(clippy::cast_precision_loss)]
fn percent_of(done: u64, total: u64) -> f64 {
    (done as f64 / total as f64) * 100.0
}
