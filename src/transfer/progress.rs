use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::task::{Context, Poll};
use bytes::Bytes;
use futures::Stream;
use pin_project_lite::pin_project;
use tokio::sync::mpsc;

/// Byte-level progress for a single transfer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransferProgress {
    pub transferred: u64,
    pub total: u64,
}

impl TransferProgress {
    pub fn percentage(&self) -> u8 {
        if self.total == 0 {
            return 100;
        }
        ((self.transferred * 100) / self.total).min(100) as u8
    }
}

/// Progress sink shared between the chunk loop and in-flight body streams.
///
/// Keeps a high-water mark so that observers only ever see non-decreasing
/// values, even when a failed chunk is re-streamed from an earlier offset.
#[derive(Clone)]
pub struct ProgressSender {
    tx: mpsc::UnboundedSender<TransferProgress>,
    high_water: Arc<AtomicU64>,
    total: u64,
}

impl ProgressSender {
    pub fn channel(total: u64) -> (Self, mpsc::UnboundedReceiver<TransferProgress>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let sender = Self {
            tx,
            high_water: Arc::new(AtomicU64::new(0)),
            total,
        };
        (sender, rx)
    }

    /// Records an absolute transferred-byte count. Values at or below the
    /// current high-water mark are dropped.
    pub fn record(&self, transferred: u64) {
        let clamped = transferred.min(self.total);
        let previous = self.high_water.fetch_max(clamped, Ordering::Relaxed);
        if clamped > previous {
            let _ = self.tx.send(TransferProgress {
                transferred: clamped,
                total: self.total,
            });
        }
    }

    pub fn total(&self) -> u64 {
        self.total
    }
}

pin_project! {
    /// Wraps a request body stream and reports bytes as they are handed to
    /// the HTTP client, offset by the server-confirmed starting position.
    pub struct ProgressStream<S> {
        #[pin]
        inner: S,
        base_offset: u64,
        streamed: u64,
        sender: ProgressSender,
    }
}

impl<S> ProgressStream<S> {
    pub fn new(inner: S, base_offset: u64, sender: ProgressSender) -> Self {
        Self {
            inner,
            base_offset,
            streamed: 0,
            sender,
        }
    }
}

impl<S> Stream for ProgressStream<S>
where
    S: Stream<Item = std::io::Result<Bytes>>,
{
    type Item = std::io::Result<Bytes>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.project();

        match this.inner.poll_next(cx) {
            Poll::Ready(Some(Ok(chunk))) => {
                if !chunk.is_empty() {
                    *this.streamed += chunk.len() as u64;
                    this.sender.record(*this.base_offset + *this.streamed);
                }
                Poll::Ready(Some(Ok(chunk)))
            }
            other => other,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;

    #[test]
    fn test_percentage_is_clamped() {
        let progress = TransferProgress { transferred: 50, total: 200 };
        assert_eq!(progress.percentage(), 25);

        let over = TransferProgress { transferred: 300, total: 200 };
        assert_eq!(over.percentage(), 100);

        let empty = TransferProgress { transferred: 0, total: 0 };
        assert_eq!(empty.percentage(), 100);
    }

    #[tokio::test]
    async fn test_sender_drops_regressions() {
        let (sender, mut rx) = ProgressSender::channel(100);

        sender.record(30);
        sender.record(10);
        sender.record(30);
        sender.record(60);
        sender.record(250);

        drop(sender);

        let mut seen = Vec::new();
        while let Some(update) = rx.recv().await {
            seen.push(update.transferred);
        }

        assert_eq!(seen, vec![30, 60, 100]);
    }

    #[tokio::test]
    async fn test_stream_reports_offset_bytes() {
        let (sender, mut rx) = ProgressSender::channel(32);
        let chunks: Vec<std::io::Result<Bytes>> =
            vec![Ok(Bytes::from_static(b"abcd")), Ok(Bytes::from_static(b"efgh"))];
        let mut stream = ProgressStream::new(futures::stream::iter(chunks), 8, sender);

        while stream.next().await.is_some() {}

        assert_eq!(rx.recv().await.map(|p| p.transferred), Some(12));
        assert_eq!(rx.recv().await.map(|p| p.transferred), Some(16));
    }
}
