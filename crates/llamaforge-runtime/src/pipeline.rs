//! Classified log capture and broadcast.
//!
//! One pipeline instance lives as long as its supervisor. Reader tasks
//! attached to a managed process publish raw lines; the pipeline assigns
//! sequence numbers, classifies, keeps a bounded ring of recent events, and
//! fans out over a lossy broadcast channel. Slow or absent subscribers never
//! backpressure the readers.

use llamaforge_core::LogEvent;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tracing::debug;

/// Broadcast channel capacity for log events.
const CHANNEL_CAPACITY: usize = 1000;

/// Maximum number of recent events kept for snapshot retrieval.
const RECENT_CAPACITY: usize = 5000;

/// How long a subscriber waits for an event before yielding a heartbeat.
const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(1);

/// One item from a log subscription.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LogStreamEvent {
    /// A classified server output line.
    Line(LogEvent),
    /// Liveness keep-alive emitted when no event arrived within the poll
    /// interval. Not a data event; its wire payload is empty.
    Heartbeat,
}

impl LogStreamEvent {
    /// Wire form for server-push streaming: `category|text`, empty for a
    /// heartbeat.
    pub fn wire(&self) -> String {
        match self {
            Self::Line(event) => event.to_string(),
            Self::Heartbeat => String::new(),
        }
    }
}

/// Bounded-wait subscription to the log stream.
pub struct LogSubscriber {
    rx: broadcast::Receiver<LogEvent>,
    poll_interval: Duration,
}

impl LogSubscriber {
    /// Override the heartbeat poll interval.
    #[must_use]
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Next item, waiting at most the poll interval before yielding a
    /// heartbeat. Returns `None` once the pipeline is gone and all queued
    /// events are drained. Lag gaps (events dropped for this slow consumer)
    /// are skipped silently - at-most-once delivery is the contract.
    pub async fn next(&mut self) -> Option<LogStreamEvent> {
        loop {
            match timeout(self.poll_interval, self.rx.recv()).await {
                Ok(Ok(event)) => return Some(LogStreamEvent::Line(event)),
                Ok(Err(broadcast::error::RecvError::Lagged(missed))) => {
                    debug!(missed, "log subscriber lagged, skipping ahead");
                }
                Ok(Err(broadcast::error::RecvError::Closed)) => return None,
                Err(_) => return Some(LogStreamEvent::Heartbeat),
            }
        }
    }
}

/// Fan-out point between the process's output stream and its consumers.
pub struct LogPipeline {
    sender: broadcast::Sender<LogEvent>,
    recent: RwLock<VecDeque<LogEvent>>,
    next_seq: AtomicU64,
}

impl LogPipeline {
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(CHANNEL_CAPACITY);
        Self {
            sender,
            recent: RwLock::new(VecDeque::with_capacity(RECENT_CAPACITY)),
            next_seq: AtomicU64::new(0),
        }
    }

    /// Classify and publish one raw output line.
    pub fn publish(&self, line: &str) {
        let seq = self.next_seq.fetch_add(1, Ordering::SeqCst);
        let event = LogEvent::new(seq, line);

        {
            let mut recent = self.recent.write().unwrap_or_else(|e| e.into_inner());
            if recent.len() >= RECENT_CAPACITY {
                recent.pop_front();
            }
            recent.push_back(event.clone());
        }

        // Ignore the no-receivers case; readers must never block on consumers
        let _ = self.sender.send(event);
    }

    /// Subscribe with the default heartbeat poll interval.
    pub fn subscribe(&self) -> LogSubscriber {
        LogSubscriber {
            rx: self.sender.subscribe(),
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }

    /// Snapshot of recent events in publish order.
    pub fn recent(&self) -> Vec<LogEvent> {
        let recent = self.recent.read().unwrap_or_else(|e| e.into_inner());
        recent.iter().cloned().collect()
    }

    /// Clear the ring buffer and restart sequence numbering. Called on each
    /// fresh launch so sequence numbers match the new process's output.
    pub fn reset(&self) {
        let mut recent = self.recent.write().unwrap_or_else(|e| e.into_inner());
        recent.clear();
        self.next_seq.store(0, Ordering::SeqCst);
    }

    /// Number of live subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for LogPipeline {
    fn default() -> Self {
        Self::new()
    }
}

/// Attach a reader task that publishes lines from a child stream until
/// end-of-stream.
///
/// llama-server (like other C/C++ tooling) can emit non-UTF8 bytes, and
/// `BufReader::lines()` would kill the task on the first invalid sequence.
/// Reading raw bytes with lossy decoding keeps capture robust. The task
/// exits on its own once the stream closes, so stopping the process never
/// leaves it running.
pub(crate) fn spawn_stream_reader(
    stream: impl AsyncRead + Unpin + Send + 'static,
    pipeline: Arc<LogPipeline>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut reader = BufReader::new(stream);
        let mut buf: Vec<u8> = Vec::with_capacity(1024);

        loop {
            buf.clear();
            match reader.read_until(b'\n', &mut buf).await {
                Ok(0) => break, // EOF
                Ok(_) => {
                    if buf.last() == Some(&b'\n') {
                        buf.pop();
                        if buf.last() == Some(&b'\r') {
                            buf.pop();
                        }
                    }
                    let line = String::from_utf8_lossy(&buf);
                    pipeline.publish(&line);
                }
                Err(e) => {
                    debug!(error = %e, "log reader exiting on read error");
                    break;
                }
            }
        }

        debug!("log reader task exiting at end of stream");
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use llamaforge_core::LogCategory;

    #[tokio::test]
    async fn events_arrive_in_publish_order_with_sequence() {
        let pipeline = LogPipeline::new();
        let mut sub = pipeline.subscribe();

        pipeline.publish("server listening");
        pipeline.publish("warning: low vram");
        pipeline.publish("eval time = 120ms");

        for (expected_seq, expected_category) in [
            (0, LogCategory::Info),
            (1, LogCategory::Warning),
            (2, LogCategory::Metric),
        ] {
            match sub.next().await {
                Some(LogStreamEvent::Line(event)) => {
                    assert_eq!(event.seq, expected_seq);
                    assert_eq!(event.category, expected_category);
                }
                other => panic!("expected line, got {other:?}"),
            }
        }
    }

    #[tokio::test]
    async fn heartbeat_when_no_event_within_poll_interval() {
        let pipeline = LogPipeline::new();
        let mut sub = pipeline
            .subscribe()
            .with_poll_interval(Duration::from_millis(20));

        assert_eq!(sub.next().await, Some(LogStreamEvent::Heartbeat));
    }

    #[tokio::test]
    async fn heartbeat_wire_payload_is_empty() {
        assert_eq!(LogStreamEvent::Heartbeat.wire(), "");
        let line = LogStreamEvent::Line(LogEvent::new(0, "warning: low vram"));
        assert_eq!(line.wire(), "warning|warning: low vram");
    }

    #[tokio::test]
    async fn recent_snapshot_preserves_order_and_reset_clears() {
        let pipeline = LogPipeline::new();
        pipeline.publish("one");
        pipeline.publish("two");

        let recent = pipeline.recent();
        assert_eq!(recent.len(), 2);
        assert_eq!(recent[0].text, "one");
        assert_eq!(recent[1].text, "two");

        pipeline.reset();
        assert!(pipeline.recent().is_empty());

        pipeline.publish("three");
        assert_eq!(pipeline.recent()[0].seq, 0);
    }

    #[tokio::test]
    async fn slow_consumer_does_not_block_publisher() {
        let pipeline = LogPipeline::new();
        let mut sub = pipeline
            .subscribe()
            .with_poll_interval(Duration::from_millis(50));

        // Overflow the channel several times over; publishing must not
        // block or panic. The channel may round its capacity up, so the
        // overflow has to dwarf it for the gap to be guaranteed.
        for i in 0..(4 * CHANNEL_CAPACITY) {
            pipeline.publish(&format!("line {i}"));
        }

        // Subscriber skips the lag gap and still gets a live event
        match sub.next().await {
            Some(LogStreamEvent::Line(event)) => {
                assert!(
                    event.seq >= CHANNEL_CAPACITY as u64,
                    "expected a post-gap event, got seq {}",
                    event.seq
                );
            }
            other => panic!("expected line after lag, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn stream_reader_publishes_until_eof() {
        let pipeline = Arc::new(LogPipeline::new());
        let mut sub = pipeline.subscribe();

        let data: &[u8] = b"first line\nsecond: error happened\r\n";
        let handle = spawn_stream_reader(data, pipeline.clone());
        handle.await.unwrap();

        match sub.next().await {
            Some(LogStreamEvent::Line(event)) => assert_eq!(event.text, "first line"),
            other => panic!("unexpected {other:?}"),
        }
        match sub.next().await {
            Some(LogStreamEvent::Line(event)) => {
                assert_eq!(event.text, "second: error happened");
                assert_eq!(event.category, LogCategory::Error);
            }
            other => panic!("unexpected {other:?}"),
        }
    }
}
