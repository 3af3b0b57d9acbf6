//! Progress events and the per-run channel that delivers them.
//!
//! The orchestrator is the only producer. Each run owns one
//! [`ProgressChannel`] wrapping one [`ProgressObserver`]; the channel enforces
//! ordering, the single terminal event, and the "observer went away" policy.

use std::io::Write;
use std::sync::mpsc;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Info,
    Success,
    Warning,
    Error,
}

/// One immutable progress notification.
///
/// Serialized as `{"status": ..., "message": ..., "data": ...}`; `data` is
/// omitted when there is no payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgressEvent {
    #[serde(rename = "status")]
    pub severity: Severity,
    pub message: String,
    #[serde(rename = "data", default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<Value>,
}

impl ProgressEvent {
    pub fn new(severity: Severity, message: impl Into<String>, payload: Option<Value>) -> Self {
        Self {
            severity,
            message: message.into(),
            payload,
        }
    }

    pub fn info(message: impl Into<String>) -> Self {
        Self::new(Severity::Info, message, None)
    }

    pub fn success(message: impl Into<String>, payload: Option<Value>) -> Self {
        Self::new(Severity::Success, message, payload)
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self::new(Severity::Error, message, None)
    }

    /// One NDJSON frame, newline included.
    pub fn to_ndjson_line(&self) -> Result<String> {
        let mut line = serde_json::to_string(self).context("serialize progress event")?;
        line.push('\n');
        Ok(line)
    }
}

/// The observer is gone; nothing further can be delivered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ObserverGone;

/// Receives a run's events, in order.
///
/// `deliver` must not block indefinitely. Returning [`ObserverGone`] tells
/// the channel to stop delivering; the run itself carries on.
pub trait ProgressObserver {
    fn deliver(&mut self, event: &ProgressEvent) -> Result<(), ObserverGone>;
}

impl<T: ProgressObserver + ?Sized> ProgressObserver for &mut T {
    fn deliver(&mut self, event: &ProgressEvent) -> Result<(), ObserverGone> {
        (**self).deliver(event)
    }
}

impl ProgressObserver for mpsc::Sender<ProgressEvent> {
    fn deliver(&mut self, event: &ProgressEvent) -> Result<(), ObserverGone> {
        self.send(event.clone()).map_err(|_| ObserverGone)
    }
}

/// Writes each event as an NDJSON frame and flushes it immediately.
#[derive(Debug)]
pub struct NdjsonWriter<W> {
    writer: W,
}

impl<W: Write> NdjsonWriter<W> {
    pub fn new(writer: W) -> Self {
        Self { writer }
    }

    pub fn into_inner(self) -> W {
        self.writer
    }
}

impl<W: Write> ProgressObserver for NdjsonWriter<W> {
    fn deliver(&mut self, event: &ProgressEvent) -> Result<(), ObserverGone> {
        let line = event.to_ndjson_line().map_err(|_| ObserverGone)?;
        self.writer
            .write_all(line.as_bytes())
            .and_then(|()| self.writer.flush())
            .map_err(|_| ObserverGone)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ChannelState {
    Open,
    /// Observer went away; events are counted and dropped.
    Disconnected,
    /// Terminal event emitted; nothing more is accepted.
    Closed,
}

/// Ordered, append-only delivery of one run's events to one observer.
pub struct ProgressChannel<O> {
    observer: O,
    state: ChannelState,
    delivered: usize,
    dropped: usize,
}

impl<O: ProgressObserver> ProgressChannel<O> {
    pub fn open(observer: O) -> Self {
        Self {
            observer,
            state: ChannelState::Open,
            delivered: 0,
            dropped: 0,
        }
    }

    /// Deliver a non-terminal event. Ignored once the channel is closed.
    pub fn emit(&mut self, event: ProgressEvent) {
        self.push(event);
    }

    /// Deliver the run's final event and close the channel.
    pub fn emit_terminal(&mut self, event: ProgressEvent) {
        self.push(event);
        self.state = ChannelState::Closed;
    }

    #[cfg(test)]
    fn is_closed(&self) -> bool {
        self.state == ChannelState::Closed
    }

    /// False once the observer has gone away.
    #[cfg(test)]
    fn is_connected(&self) -> bool {
        self.state != ChannelState::Disconnected
    }

    pub(crate) fn delivered(&self) -> usize {
        self.delivered
    }

    pub(crate) fn dropped(&self) -> usize {
        self.dropped
    }

    /// Close the channel and hand back the observer.
    #[cfg(test)]
    fn close(mut self) -> O {
        self.state = ChannelState::Closed;
        self.observer
    }

    fn push(&mut self, event: ProgressEvent) {
        match self.state {
            ChannelState::Closed => {
                warn!(message = %event.message, "progress event after terminal event ignored");
            }
            ChannelState::Disconnected => {
                self.dropped += 1;
            }
            ChannelState::Open => {
                debug!(severity = ?event.severity, message = %event.message, "progress event");
                if self.observer.deliver(&event).is_ok() {
                    self.delivered += 1;
                } else {
                    warn!("progress observer disconnected, dropping further events");
                    self.state = ChannelState::Disconnected;
                    self.dropped += 1;
                }
            }
        }
    }
}
