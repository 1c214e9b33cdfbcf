//! Upload progress reporting

use std::sync::Arc;
use tokio::sync::watch;

/// Receives upload progress as a percentage in `0..=100`
pub trait ProgressSink: Send + Sync {
    fn on_progress(&self, percentage: u8);
}

impl<F> ProgressSink for F
where
    F: Fn(u8) + Send + Sync,
{
    fn on_progress(&self, percentage: u8) {
        self(percentage)
    }
}

/// Progress sink backed by a watch channel, for callers that prefer to
/// subscribe to progress instead of passing a callback
pub struct ProgressChannel {
    tx: watch::Sender<u8>,
}

impl ProgressChannel {
    pub fn new() -> (Self, watch::Receiver<u8>) {
        let (tx, rx) = watch::channel(0);
        (Self { tx }, rx)
    }
}

impl ProgressSink for ProgressChannel {
    fn on_progress(&self, percentage: u8) {
        self.tx.send_replace(percentage);
    }
}

/// Enforces the progress contract on top of a sink
///
/// Values never decrease, stay below 100 until [`ProgressReporter::finish`],
/// and stop entirely after [`ProgressReporter::fail`].
pub struct ProgressReporter {
    sink: Option<Arc<dyn ProgressSink>>,
    last: Option<u8>,
    failed: bool,
}

impl ProgressReporter {
    pub fn new(sink: Option<Arc<dyn ProgressSink>>) -> Self {
        Self {
            sink,
            last: None,
            failed: false,
        }
    }

    pub fn start(&mut self) {
        self.emit(0);
    }

    /// Report `sent` of `total` bytes transferred
    pub fn advance(&mut self, sent: u64, total: u64) {
        let percentage = if total == 0 {
            99
        } else {
            ((sent.min(total) * 100) / total).min(99) as u8
        };
        self.emit(percentage);
    }

    pub fn finish(&mut self) {
        self.emit(100);
    }

    pub fn fail(&mut self) {
        self.failed = true;
    }

    pub fn last(&self) -> Option<u8> {
        self.last
    }

    fn emit(&mut self, percentage: u8) {
        if self.failed {
            return;
        }
        if matches!(self.last, Some(last) if percentage <= last) {
            return;
        }
        self.last = Some(percentage);
        if let Some(sink) = &self.sink {
            sink.on_progress(percentage);
        }
    }
}
