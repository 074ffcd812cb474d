//! Newline-delimited JSON samples from a file or stdin
//!
//! Useful for replaying captured cAdvisor output. At end of input the source
//! keeps following the file, reporting "no sample" after each bounded wait.

use super::SampleSource;
use crate::error::{RebalancerError, Result};
use async_trait::async_trait;
use std::path::Path;
use std::time::Duration;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader};
use tracing::info;

pub struct LineSampleSource {
    reader: Box<dyn AsyncBufRead + Send + Unpin>,
    /// Bytes read past the last complete line
    pending: Vec<u8>,
}

impl LineSampleSource {
    pub fn new(reader: impl AsyncBufRead + Send + Unpin + 'static) -> Self {
        Self {
            reader: Box::new(reader),
            pending: Vec::new(),
        }
    }

    pub async fn open(path: &Path) -> Result<Self> {
        let file = tokio::fs::File::open(path).await.map_err(|e| {
            RebalancerError::transport(format!("cannot open {}: {}", path.display(), e))
        })?;
        info!(path = %path.display(), "Reading samples from file");
        Ok(Self::new(BufReader::new(file)))
    }

    pub fn stdin() -> Self {
        info!("Reading samples from stdin");
        Self::new(BufReader::new(tokio::io::stdin()))
    }

    /// Take the next non-blank complete line out of the pending bytes
    fn next_line(&mut self) -> Option<Vec<u8>> {
        while let Some(newline) = self.pending.iter().position(|&b| b == b'\n') {
            let line: Vec<u8> = self.pending.drain(..=newline).collect();
            let trimmed = trim_ascii(&line);
            if !trimmed.is_empty() {
                return Some(trimmed.to_vec());
            }
        }
        None
    }
}

fn trim_ascii(bytes: &[u8]) -> &[u8] {
    let start = bytes
        .iter()
        .position(|b| !b.is_ascii_whitespace())
        .unwrap_or(bytes.len());
    let end = bytes
        .iter()
        .rposition(|b| !b.is_ascii_whitespace())
        .map_or(start, |i| i + 1);
    &bytes[start..end]
}

#[async_trait]
impl SampleSource for LineSampleSource {
    async fn poll(&mut self, max_wait: Duration) -> Result<Option<Vec<u8>>> {
        loop {
            if let Some(line) = self.next_line() {
                return Ok(Some(line));
            }

            // Only the buffer fill is raced against the deadline; bytes of a
            // partial line are already in `pending` and survive a timeout.
            let filled = match tokio::time::timeout(max_wait, self.reader.fill_buf()).await {
                Err(_elapsed) => return Ok(None),
                Ok(Err(e)) => return Err(RebalancerError::TransportFatal(e.into())),
                Ok(Ok(chunk)) => {
                    self.pending.extend_from_slice(chunk);
                    chunk.len()
                }
            };

            if filled == 0 {
                // End of input for now
                tokio::time::sleep(max_wait).await;
                return Ok(None);
            }
            self.reader.consume(filled);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;
    use tokio::io::AsyncWriteExt;

    #[tokio::test]
    async fn test_reads_lines_and_skips_blanks() {
        let input: &[u8] = b"{\"a\":1}\n\n{\"b\":2}\n";
        let mut source = LineSampleSource::new(input);
        let wait = Duration::from_millis(10);

        assert_eq!(source.poll(wait).await.unwrap(), Some(b"{\"a\":1}".to_vec()));
        assert_eq!(source.poll(wait).await.unwrap(), Some(b"{\"b\":2}".to_vec()));
        assert_eq!(source.poll(wait).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_partial_line_survives_timeout() {
        let (mut writer, reader) = tokio::io::duplex(64);
        let mut source = LineSampleSource::new(BufReader::new(reader));
        let wait = Duration::from_millis(20);

        writer.write_all(b"{\"half\":").await.unwrap();
        assert_eq!(source.poll(wait).await.unwrap(), None);

        writer.write_all(b"1}\n").await.unwrap();
        assert_eq!(source.poll(wait).await.unwrap(), Some(b"{\"half\":1}".to_vec()));
    }

    #[tokio::test]
    async fn test_several_lines_in_one_chunk() {
        let (mut writer, reader) = tokio::io::duplex(64);
        let mut source = LineSampleSource::new(BufReader::new(reader));
        let wait = Duration::from_millis(20);

        writer.write_all(b"{\"a\":1}\r\n  \n{\"b\":2}\n{\"c\"").await.unwrap();
        assert_eq!(source.poll(wait).await.unwrap(), Some(b"{\"a\":1}".to_vec()));
        assert_eq!(source.poll(wait).await.unwrap(), Some(b"{\"b\":2}".to_vec()));
        assert_eq!(source.poll(wait).await.unwrap(), None);

        writer.write_all(b":3}\n").await.unwrap();
        assert_eq!(source.poll(wait).await.unwrap(), Some(b"{\"c\":3}".to_vec()));
    }

    #[tokio::test]
    async fn test_open_file() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "{{\"sample\":true}}").unwrap();

        let mut source = LineSampleSource::open(file.path()).await.unwrap();
        let polled = source.poll(Duration::from_millis(10)).await.unwrap();
        assert_eq!(polled, Some(b"{\"sample\":true}".to_vec()));
    }

    #[tokio::test]
    async fn test_missing_file_is_fatal() {
        let result = LineSampleSource::open(Path::new("/nonexistent/samples.jsonl")).await;
        assert!(matches!(result, Err(RebalancerError::TransportFatal(_))));
    }
}
