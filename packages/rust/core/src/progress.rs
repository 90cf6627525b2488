//! Progress publisher: fan-out of progress events to any number of
//! subscribers, backpressure-safe.
//!
//! Each live audit owns a `tokio::sync::watch` channel. The watch primitive
//! gives exactly the contract the pipeline needs:
//! - `publish` never blocks the scheduler, however slow the subscribers;
//! - a subscriber that falls behind observes last-value-wins coalescing
//!   rather than an unbounded backlog;
//! - the terminal event is the channel's final value, so every subscriber
//!   that stays attached observes it.
//!
//! On subscribe, the stream first yields a snapshot — the channel's current
//! value, or one reconstructed from the audit's persisted state when no
//! live channel exists — then live events from that point, so a late joiner
//! always sees a monotonically consistent view.

use std::collections::HashMap;
use std::sync::Mutex;

use tokio::sync::watch;
use tracing::{debug, warn};

use seolens_shared::{AuditId, ProgressEvent};

/// Per-audit watch-channel registry.
#[derive(Default)]
pub struct ProgressPublisher {
    channels: Mutex<HashMap<String, watch::Sender<ProgressEvent>>>,
}

impl ProgressPublisher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Open the channel for an audit with its initial event. Called once by
    /// the facade before the pipeline task starts.
    pub fn register(&self, initial: ProgressEvent) {
        let key = initial.audit_id.to_string();
        let (tx, _rx) = watch::channel(initial);
        let mut channels = self.channels.lock().expect("publisher lock poisoned");
        channels.insert(key, tx);
    }

    /// Publish an event to the audit's subscribers. Non-blocking; a slow or
    /// absent subscriber never stalls the pipeline. Publishing a terminal
    /// event closes the channel once every subscriber has had a chance to
    /// observe it.
    pub fn publish(&self, event: ProgressEvent) {
        let key = event.audit_id.to_string();
        let terminal = event.terminal;

        let mut channels = self.channels.lock().expect("publisher lock poisoned");
        match channels.get(&key) {
            Some(tx) => {
                tx.send_replace(event);
                if terminal {
                    // Dropping the sender ends subscriber streams after they
                    // observe the final value.
                    channels.remove(&key);
                    debug!(audit_id = %key, "terminal event published, channel closed");
                }
            }
            None => {
                warn!(audit_id = %key, "progress event for unregistered audit dropped");
            }
        }
    }

    /// Subscribe to a live audit. Returns `None` when no channel exists
    /// (audit finished or never started); the caller falls back to a
    /// snapshot reconstructed from the store.
    pub fn subscribe(&self, audit_id: &AuditId) -> Option<ProgressStream> {
        let channels = self.channels.lock().expect("publisher lock poisoned");
        let tx = channels.get(&audit_id.to_string())?;
        let rx = tx.subscribe();
        // `subscribe()` marks the current value as seen, so read the
        // snapshot explicitly and queue it as the stream's first item.
        let snapshot = rx.borrow().clone();
        Some(ProgressStream {
            pending: Some(snapshot),
            rx: Some(rx),
            done: false,
        })
    }
}

/// An ordered stream of progress events for one audit. Finite: ends after a
/// terminal event or when the publisher goes away.
#[derive(Debug)]
pub struct ProgressStream {
    /// Snapshot queued for immediate delivery.
    pending: Option<ProgressEvent>,
    /// Live channel; `None` for snapshot-only streams.
    rx: Option<watch::Receiver<ProgressEvent>>,
    done: bool,
}

impl ProgressStream {
    /// A stream that yields one snapshot event and ends. Used for audits
    /// with no live pipeline (completed, failed, or not yet started).
    pub fn snapshot_only(snapshot: ProgressEvent) -> Self {
        Self {
            pending: Some(snapshot),
            rx: None,
            done: false,
        }
    }

    /// Receive the next event. `None` means the stream has ended.
    pub async fn recv(&mut self) -> Option<ProgressEvent> {
        if self.done {
            return None;
        }

        if let Some(event) = self.pending.take() {
            if event.terminal {
                self.done = true;
            }
            return Some(event);
        }

        let rx = match self.rx.as_mut() {
            Some(rx) => rx,
            None => {
                self.done = true;
                return None;
            }
        };

        match rx.changed().await {
            Ok(()) => {
                let event = rx.borrow_and_update().clone();
                if event.terminal {
                    self.done = true;
                }
                Some(event)
            }
            Err(_) => {
                // Sender dropped with no unseen value.
                self.done = true;
                None
            }
        }
    }
}
