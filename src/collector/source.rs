//! Event source adapters
//!
//! The collector consumes a stream of raw JSON objects. Anything that can
//! produce [`SourceItem`]s works; this module provides a JSON-lines reader
//! (one object per line) and a channel-backed source for producers that
//! push events one at a time.

use std::io;

use futures::Stream;
use serde_json::Value;
use thiserror::Error;
use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;

/// One item delivered by an event source
pub type SourceItem = Result<Value, SourceError>;

#[derive(Debug, Error)]
pub enum SourceError {
    /// The producer delivered something that is not a JSON object; skipped
    #[error("malformed object: {0}")]
    Malformed(String),

    /// The producer itself broke; ends ingestion
    #[error("event source failed: {0}")]
    Io(#[from] io::Error),
}

impl SourceError {
    pub fn is_fatal(&self) -> bool {
        matches!(self, SourceError::Io(_))
    }
}

/// Read one JSON value per line; blank lines are ignored
pub fn json_lines<R>(reader: R) -> impl Stream<Item = SourceItem>
where
    R: AsyncBufRead + Unpin + Send + 'static,
{
    async_stream::stream! {
        let mut lines = reader.lines();
        loop {
            match lines.next_line().await {
                Ok(Some(line)) => {
                    let trimmed = line.trim();
                    if trimmed.is_empty() {
                        continue;
                    }
                    yield serde_json::from_str::<Value>(trimmed)
                        .map_err(|e| SourceError::Malformed(e.to_string()));
                }
                Ok(None) => break,
                Err(e) => {
                    yield Err(SourceError::Io(e));
                    break;
                }
            }
        }
    }
}

/// Channel-backed source; the stream ends when every sender is dropped
pub fn channel(capacity: usize) -> (mpsc::Sender<SourceItem>, ReceiverStream<SourceItem>) {
    let (tx, rx) = mpsc::channel(capacity);
    (tx, ReceiverStream::new(rx))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio_stream::StreamExt;

    #[tokio::test]
    async fn test_json_lines() {
        let input = b"{\"a\":1}\n\n not json\n{\"b\":2}\n".to_vec();
        let reader = tokio::io::BufReader::new(std::io::Cursor::new(input));
        let items: Vec<SourceItem> = json_lines(reader).collect().await;

        assert_eq!(items.len(), 3);
        assert_eq!(items[0].as_ref().unwrap()["a"], 1);
        assert!(matches!(items[1], Err(SourceError::Malformed(_))));
        assert!(!items[1].as_ref().unwrap_err().is_fatal());
        assert_eq!(items[2].as_ref().unwrap()["b"], 2);
    }

    #[tokio::test]
    async fn test_channel_source_ends_with_senders() {
        let (tx, mut stream) = channel(4);
        tx.send(Ok(serde_json::json!({"x": true}))).await.unwrap();
        drop(tx);

        assert!(stream.next().await.is_some());
        assert!(stream.next().await.is_none());
    }
}
