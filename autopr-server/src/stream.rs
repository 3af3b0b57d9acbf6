//! NDJSON progress streaming.
//!
//! A run executes on a blocking thread and pushes frames into an unbounded
//! channel; the response body drains it. When the client disconnects the body
//! is dropped, sends start failing, and the run carries on without an
//! observer.

use std::convert::Infallible;

use axum::body::Body;
use tokio::sync::mpsc;

use autopr::progress::{ObserverGone, ProgressEvent, ProgressObserver};

pub const NDJSON_CONTENT_TYPE: &str = "application/x-ndjson";

/// Forwards each event as one serialized NDJSON frame.
pub struct ChannelObserver {
    tx: mpsc::UnboundedSender<String>,
}

impl ChannelObserver {
    pub fn new(tx: mpsc::UnboundedSender<String>) -> Self {
        Self { tx }
    }
}

impl ProgressObserver for ChannelObserver {
    fn deliver(&mut self, event: &ProgressEvent) -> Result<(), ObserverGone> {
        let line = event.to_ndjson_line().map_err(|_| ObserverGone)?;
        self.tx.send(line).map_err(|_| ObserverGone)
    }
}

/// Response body yielding frames until the sender side is dropped.
pub fn ndjson_body(mut rx: mpsc::UnboundedReceiver<String>) -> Body {
    let stream = async_stream::stream! {
        while let Some(line) = rx.recv().await {
            yield Ok::<_, Infallible>(line);
        }
    };
    Body::from_stream(stream)
}

#[cfg(test)]
mod tests {
    use super::*;
    use autopr::progress::Severity;

    #[test]
    fn observer_sends_one_line_per_event() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut observer = ChannelObserver::new(tx);
        observer
            .deliver(&ProgressEvent::info("Creating execution plan..."))
            .expect("deliver");
        let line = rx.try_recv().expect("line");
        assert!(line.ends_with('\n'));
        let event: ProgressEvent = serde_json::from_str(line.trim_end()).expect("parse");
        assert_eq!(event.severity, Severity::Info);
    }

    #[test]
    fn dropped_receiver_reports_observer_gone() {
        let (tx, rx) = mpsc::unbounded_channel();
        drop(rx);
        let mut observer = ChannelObserver::new(tx);
        assert_eq!(
            observer.deliver(&ProgressEvent::info("x")),
            Err(ObserverGone)
        );
    }
}
