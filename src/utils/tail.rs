//! Follow a growing text file, `tail -f` style.

use std::io::SeekFrom;
use std::path::{Path, PathBuf};
use std::time::Duration;

use tokio::fs::File;
use tokio::io::{AsyncBufReadExt, AsyncSeekExt, BufReader};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::error::Result;
use crate::utils::retry::sleep_unless_cancelled;

/// Line follower over one file
pub struct LogTail {
    path: PathBuf,
    poll_interval: Duration,
    reader: Option<BufReader<File>>,
    pending: String,
}

impl LogTail {
    pub fn new(path: impl Into<PathBuf>, poll_interval: Duration) -> Self {
        Self {
            path: path.into(),
            poll_interval,
            reader: None,
            pending: String::new(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Wait for the file to exist, then position at its end so only lines
    /// written from now on are reported.
    ///
    /// Returns `Ok(false)` if cancelled while waiting.
    pub async fn open_at_end(&mut self, cancel: &CancellationToken) -> Result<bool> {
        loop {
            match File::open(&self.path).await {
                Ok(mut file) => {
                    file.seek(SeekFrom::End(0)).await?;
                    self.reader = Some(BufReader::new(file));
                    return Ok(true);
                }
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                    debug!(path = %self.path.display(), "Waiting for log file");
                    if !sleep_unless_cancelled(cancel, self.poll_interval).await {
                        return Ok(false);
                    }
                }
                Err(e) => return Err(e.into()),
            }
        }
    }

    /// Next complete line (without the newline), or `None` once cancelled.
    ///
    /// A line still being written is held back until its newline arrives.
    pub async fn next_line(&mut self, cancel: &CancellationToken) -> Result<Option<String>> {
        if self.reader.is_none() && !self.open_at_end(cancel).await? {
            return Ok(None);
        }

        loop {
            if cancel.is_cancelled() {
                return Ok(None);
            }
            let Some(reader) = self.reader.as_mut() else {
                return Ok(None);
            };

            let read = reader.read_line(&mut self.pending).await?;
            if read > 0 && self.pending.ends_with('\n') {
                let line = self.pending.trim_end_matches(['\r', '\n']).to_string();
                self.pending.clear();
                return Ok(Some(line));
            }

            if !sleep_unless_cancelled(cancel, self.poll_interval).await {
                return Ok(None);
            }
        }
    }
}
