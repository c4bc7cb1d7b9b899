//! Scoped fault channel for one generation attempt
//!
//! Generators can fail outside their normal return path: a background task
//! they spawned, or a child process that reports an error and still exits
//! cleanly. Each attempt gets its own channel; the runner drains it after the
//! generator returns and drops the observer, so reports that arrive later are
//! discarded instead of leaking into an unrelated build.

use tokio::sync::mpsc;
use tracing::debug;
use uuid::Uuid;

/// Sending half handed to the generator. Cheap to clone.
#[derive(Debug, Clone)]
pub struct FaultSink {
    attempt: Uuid,
    tx: mpsc::UnboundedSender<String>,
}

impl FaultSink {
    /// Report a fault for this attempt
    pub fn report(&self, message: impl Into<String>) {
        let message = message.into();
        if self.tx.send(message).is_err() {
            debug!("Discarding fault for finished attempt {}", self.attempt);
        }
    }

    /// Attempt this sink reports to
    pub fn attempt(&self) -> Uuid {
        self.attempt
    }
}

/// Receiving half owned by the runner for the duration of one attempt
#[derive(Debug)]
pub struct FaultObserver {
    attempt: Uuid,
    rx: mpsc::UnboundedReceiver<String>,
}

impl FaultObserver {
    pub fn attempt(&self) -> Uuid {
        self.attempt
    }

    /// Collect every fault reported so far
    pub fn drain(&mut self) -> Vec<String> {
        let mut faults = Vec::new();
        while let Ok(fault) = self.rx.try_recv() {
            faults.push(fault);
        }
        faults
    }
}

/// Open a fault channel tagged with a fresh attempt id
pub fn fault_channel() -> (FaultSink, FaultObserver) {
    let attempt = Uuid::new_v4();
    let (tx, rx) = mpsc::unbounded_channel();
    (FaultSink { attempt, tx }, FaultObserver { attempt, rx })
}
