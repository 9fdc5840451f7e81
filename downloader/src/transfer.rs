/// Streamed, resumable download of a single lecture artifact.
///
/// The response body is streamed to disk through a fixed-size write buffer,
/// so memory use stays at one chunk regardless of the recording's size.
/// Nothing is deleted on failure: a partial file stays where it is, and the
/// next attempt resumes it with an HTTP range request when the server allows.
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use futures::StreamExt;
use reqwest::header::{CONTENT_RANGE, RANGE};
use reqwest::{StatusCode, Url};
use tokio::fs::OpenOptions;
use tokio::io::{AsyncWriteExt, BufWriter};
use tracing::{debug, info, warn};

use lectern_shared::auth::AuthSession;
use lectern_shared::config::{Config, DEFAULT_CHUNK_SIZE};
use lectern_shared::errors::TransferError;

use crate::progress::{self, Progress};

/// Performs one download into a destination directory.
#[async_trait]
pub trait Fetcher: Send + Sync {
    /// Download `link` into `destination_dir`, returning the written file's
    /// path. Only returns `Ok` once every byte is on disk.
    async fn fetch(&self, link: &str, destination_dir: &Path) -> Result<PathBuf, TransferError>;
}

/// Transfer tuning.
#[derive(Debug, Clone, Copy)]
pub struct TransferOptions {
    pub chunk_size: usize,
    pub resume_partial: bool,
    pub show_progress: bool,
}

impl Default for TransferOptions {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            resume_partial: true,
            show_progress: false,
        }
    }
}

impl TransferOptions {
    pub fn from_config(config: &Config) -> Self {
        Self {
            chunk_size: config.chunk_size,
            resume_partial: config.resume_partial,
            show_progress: true,
        }
    }
}

/// HTTP transfer engine over the run's authenticated session.
pub struct TransferEngine {
    session: AuthSession,
    options: TransferOptions,
}

impl TransferEngine {
    pub fn new(session: AuthSession, options: TransferOptions) -> Self {
        Self { session, options }
    }
}

#[async_trait]
impl Fetcher for TransferEngine {
    async fn fetch(&self, link: &str, destination_dir: &Path) -> Result<PathBuf, TransferError> {
        let file_name = artifact_file_name(link)?;
        let path = destination_dir.join(&file_name);

        let existing = if self.options.resume_partial {
            match tokio::fs::metadata(&path).await {
                Ok(meta) if meta.is_file() => meta.len(),
                _ => 0,
            }
        } else {
            0
        };

        let mut request = self.session.client().get(link);
        if existing > 0 {
            debug!("Resuming {:?} from byte {}", path, existing);
            request = request.header(RANGE, format!("bytes={}-", existing));
        }

        let response = request.send().await.map_err(|e| TransferError::Request {
            url: link.to_string(),
            message: e.to_string(),
        })?;

        let status = response.status();
        let offset = match status {
            StatusCode::PARTIAL_CONTENT if existing > 0 => existing,
            StatusCode::RANGE_NOT_SATISFIABLE if existing > 0 => {
                let total = response
                    .headers()
                    .get(CONTENT_RANGE)
                    .and_then(|v| v.to_str().ok())
                    .and_then(unsatisfied_range_total);
                if total == Some(existing) {
                    info!("{:?} is already complete ({} bytes)", path, existing);
                    return Ok(path);
                }
                warn!("Range request for {} rejected with total {:?}", link, total);
                return Err(TransferError::Status {
                    url: link.to_string(),
                    status: status.as_u16(),
                });
            }
            s if s.is_success() => {
                if existing > 0 {
                    debug!("Server ignored range for {}, restarting", link);
                }
                0
            }
            s => {
                return Err(TransferError::Status {
                    url: link.to_string(),
                    status: s.as_u16(),
                })
            }
        };

        let expected = response.content_length().map(|len| offset + len);
        let progress = Progress::transfer(self.options.show_progress, &file_name, expected, offset);

        match self.write_body(response, link, &path, offset, expected, &progress).await {
            Ok(received) => {
                progress.finish_ok(&file_name);
                info!("Saved {:?} ({} bytes)", path, received);
                Ok(path)
            }
            Err(e) => {
                progress.finish_err(failure_label(&e));
                Err(e)
            }
        }
    }
}

impl TransferEngine {
    /// Stream the response body into `path`, starting at byte `offset`.
    /// Returns the file's length once every byte is synced to disk.
    async fn write_body(
        &self,
        response: reqwest::Response,
        link: &str,
        path: &Path,
        offset: u64,
        expected: Option<u64>,
        progress: &Progress,
    ) -> Result<u64, TransferError> {
        let file = if offset > 0 {
            OpenOptions::new().append(true).open(path).await
        } else {
            OpenOptions::new().create(true).write(true).truncate(true).open(path).await
        }
        .map_err(|e| TransferError::io(path, e))?;
        let mut writer = BufWriter::with_capacity(self.options.chunk_size, file);

        let mut received = offset;
        let mut last_decile = progress::fraction(received, expected).map(|f| (f * 10.0) as u8);
        let mut stream = response.bytes_stream();

        while let Some(chunk) = stream.next().await {
            let chunk = match chunk {
                Ok(chunk) => chunk,
                Err(e) => {
                    // Keep what arrived so the next attempt can resume from it.
                    if let Err(flush) = writer.flush().await {
                        warn!("Could not flush partial file {:?}: {}", path, flush);
                    }
                    return Err(TransferError::Interrupted {
                        url: link.to_string(),
                        received,
                        message: e.to_string(),
                    });
                }
            };
            writer.write_all(&chunk).await.map_err(|e| TransferError::io(path, e))?;
            received += chunk.len() as u64;
            progress.inc(chunk.len() as u64);

            let decile = progress::fraction(received, expected).map(|f| (f * 10.0) as u8);
            if decile != last_decile {
                if let Some(d) = decile {
                    debug!("{:?}: {}%", path, u32::from(d) * 10);
                }
                last_decile = decile;
            }
        }

        writer.flush().await.map_err(|e| TransferError::io(path, e))?;
        writer
            .into_inner()
            .sync_all()
            .await
            .map_err(|e| TransferError::io(path, e))?;

        match expected {
            Some(expected) if received != expected => Err(TransferError::Incomplete {
                path: path.to_path_buf(),
                expected,
                received,
            }),
            _ => Ok(received),
        }
    }
}

/// Local file name for a download link.
///
/// Combines the third-from-last path segment (the recording's folder on
/// the media server) with the last one, so every fetch of the same remote
/// resource lands on the same name.
pub fn artifact_file_name(link: &str) -> Result<String, TransferError> {
    let invalid = || TransferError::InvalidLink(link.to_string());
    let url = Url::parse(link).map_err(|_| invalid())?;
    let segments: Vec<&str> = url
        .path_segments()
        .map(|s| s.filter(|seg| !seg.is_empty()).collect())
        .unwrap_or_default();

    let last = segments.last().ok_or_else(invalid)?;
    let raw = if segments.len() >= 3 {
        format!("{} {}", segments[segments.len() - 3], last)
    } else {
        last.to_string()
    };

    let name: String = raw
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_' | ' ' | '(' | ')') {
                c
            } else {
                '_'
            }
        })
        .collect();
    let name = name.trim_matches(|c| c == '.' || c == ' ').to_string();
    if name.is_empty() {
        return Err(invalid());
    }
    Ok(name)
}

fn failure_label(error: &TransferError) -> &'static str {
    match error {
        TransferError::Interrupted { .. } => "interrupted",
        TransferError::Incomplete { .. } => "incomplete",
        _ => "failed",
    }
}

/// Total length from a `Content-Range: bytes */<total>` header.
fn unsatisfied_range_total(header: &str) -> Option<u64> {
    header
        .trim()
        .strip_prefix("bytes */")
        .and_then(|total| total.trim().parse().ok())
}
