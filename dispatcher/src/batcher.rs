//! Group input lines into fixed-size batches.

use std::{borrow::Cow, io, num::NonZeroUsize};
use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use tracing::warn;

/// An ordered group of phones submitted in one request.
pub type Batch = Vec<String>;

/// Reads phones (one per line) and yields them in batches of at most `capacity`.
///
/// Every batch but the last holds exactly `capacity` phones. Blank lines are skipped and
/// surrounding whitespace is trimmed. Lines are split on raw bytes, so a line that is not
/// valid UTF-8 is kept (with invalid sequences replaced) and never ends the input.
pub struct Batcher<R> {
    reader: R,
    line: Vec<u8>,
    capacity: NonZeroUsize,
    pending: Option<io::Error>,
    done: bool,
}

impl<R: AsyncBufRead + Unpin> Batcher<R> {
    /// Create a new [Batcher] over `reader`.
    pub fn new(reader: R, capacity: NonZeroUsize) -> Self {
        Self {
            reader,
            line: Vec::new(),
            capacity,
            pending: None,
            done: false,
        }
    }

    /// Read the next line, or `None` at the end of the input.
    async fn next_line(&mut self) -> io::Result<Option<String>> {
        self.line.clear();
        if self.reader.read_until(b'\n', &mut self.line).await? == 0 {
            return Ok(None);
        }
        let line = match String::from_utf8_lossy(&self.line) {
            Cow::Borrowed(line) => line.to_string(),
            Cow::Owned(line) => {
                warn!(line = line.trim(), "input line is not valid UTF-8");
                line
            }
        };
        Ok(Some(line))
    }

    /// Returns the next batch or `None` once the input is exhausted.
    ///
    /// If reading fails, the phones read so far are returned first and the error is
    /// returned by the following call. Once the input is exhausted (or has failed), all
    /// subsequent calls return `None`.
    pub async fn next_batch(&mut self) -> io::Result<Option<Batch>> {
        if let Some(err) = self.pending.take() {
            return Err(err);
        }
        if self.done {
            return Ok(None);
        }

        let mut batch = Vec::with_capacity(self.capacity.get());
        while batch.len() < self.capacity.get() {
            match self.next_line().await {
                Ok(Some(line)) => {
                    let phone = line.trim();
                    if phone.is_empty() {
                        continue;
                    }
                    batch.push(phone.to_string());
                }
                Ok(None) => {
                    self.done = true;
                    break;
                }
                Err(err) => {
                    self.done = true;
                    if batch.is_empty() {
                        return Err(err);
                    }
                    self.pending = Some(err);
                    break;
                }
            }
        }
        if batch.is_empty() {
            return Ok(None);
        }
        Ok(Some(batch))
    }
}
