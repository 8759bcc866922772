//! Line-oriented activity input.
//!
//! Each line names one activity (`pointer`, `key`, `scroll`, `focus`). Meant
//! for piping from an input watcher such as `libinput debug-events` filtered
//! through a small script.

use super::{ActivityError, ActivitySource};
use crate::domain::ActivityKind;
use async_trait::async_trait;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader, Stdin};
use tracing::{debug, trace};

/// Activity source reading one word per line.
pub struct LineSource<R> {
    reader: R,
    line: String,
}

impl<R> LineSource<R>
where
    R: AsyncBufRead + Unpin + Send,
{
    pub fn new(reader: R) -> Self {
        Self {
            reader,
            line: String::new(),
        }
    }
}

impl LineSource<BufReader<Stdin>> {
    /// Read activity from the process's stdin.
    pub fn stdin() -> Self {
        Self::new(BufReader::new(tokio::io::stdin()))
    }
}

#[async_trait]
impl<R> ActivitySource for LineSource<R>
where
    R: AsyncBufRead + Unpin + Send,
{
    async fn next_activity(&mut self) -> Result<Option<ActivityKind>, ActivityError> {
        loop {
            self.line.clear();
            if self.reader.read_line(&mut self.line).await? == 0 {
                return Ok(None);
            }

            let word = self.line.trim();
            if word.is_empty() {
                continue;
            }

            match word.parse::<ActivityKind>() {
                Ok(kind) => {
                    trace!("Input line: {}", kind);
                    return Ok(Some(kind));
                }
                Err(e) => debug!("Ignoring input line: {}", e),
            }
        }
    }
}
