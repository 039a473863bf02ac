//! Observability sinks: per-operation events and periodic state snapshots.
//!
//! Sinks are pure observers. Nothing they do feeds back into channel or
//! process behavior, and a slow sink only slows the thread that called it.

use parking_lot::Mutex;
use serde::Serialize;
use std::time::Duration;

use crate::process::{Role, Status};

/// Which channel operation an event describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Op {
  Send,
  Recv,
}

/// One completed channel operation, as seen by the process that issued it.
#[derive(Debug, Clone, Serialize)]
pub struct ChannelEvent {
  /// Elapsed time since the run started.
  pub at: Duration,
  /// The process that sent, when the event describes a send.
  pub from: Option<String>,
  /// The process that received, when the event describes a recv.
  pub to: Option<String>,
  pub channel: String,
  pub op: Op,
  /// The value, rendered for display.
  pub value: String,
  /// Whether the operation had to park before completing.
  pub blocked: bool,
}

/// Point-in-time state of one channel.
#[derive(Debug, Clone, Serialize)]
pub struct ChannelSnapshot {
  pub id: String,
  pub capacity: usize,
  pub depth: usize,
  pub waiting_senders: usize,
  pub waiting_receivers: usize,
  pub closed: bool,
}

/// Point-in-time state of one process.
#[derive(Debug, Clone, Serialize)]
pub struct ProcessSnapshot {
  pub id: String,
  pub role: Role,
  pub status: Status,
  pub sent: u64,
  pub received: u64,
}

/// Point-in-time state of a whole topology run.
#[derive(Debug, Clone, Serialize)]
pub struct Snapshot {
  pub at: Duration,
  pub channels: Vec<ChannelSnapshot>,
  pub processes: Vec<ProcessSnapshot>,
}

/// Receives one event per completed channel operation.
pub trait EventSink: Send + Sync {
  fn record(&self, event: &ChannelEvent);
}

/// Receives periodic topology snapshots.
pub trait SnapshotSink: Send + Sync {
  fn observe(&self, snapshot: &Snapshot);
}

/// Emits events and snapshots through `tracing`.
#[derive(Debug, Default)]
pub struct TracingSink;

impl EventSink for TracingSink {
  fn record(&self, event: &ChannelEvent) {
    tracing::debug!(
      at_ms = event.at.as_millis() as u64,
      from = event.from.as_deref().unwrap_or("-"),
      to = event.to.as_deref().unwrap_or("-"),
      channel = %event.channel,
      op = ?event.op,
      value = %event.value,
      blocked = event.blocked,
      "channel op"
    );
  }
}

impl SnapshotSink for TracingSink {
  fn observe(&self, snapshot: &Snapshot) {
    tracing::trace!(
      at_ms = snapshot.at.as_millis() as u64,
      channels = snapshot.channels.len(),
      processes = snapshot.processes.len(),
      "topology snapshot"
    );
  }
}

/// Collects everything in memory. Intended for tests and reports.
#[derive(Debug, Default)]
pub struct MemorySink {
  events: Mutex<Vec<ChannelEvent>>,
  snapshots: Mutex<Vec<Snapshot>>,
}

impl MemorySink {
  pub fn new() -> Self {
    Self::default()
  }

  /// All events recorded so far, in arrival order.
  pub fn events(&self) -> Vec<ChannelEvent> {
    self.events.lock().clone()
  }

  /// Events issued by the given process, in the order that process
  /// completed them.
  pub fn events_for(&self, process: &str) -> Vec<ChannelEvent> {
    self
      .events
      .lock()
      .iter()
      .filter(|e| {
        e.from.as_deref() == Some(process) || e.to.as_deref() == Some(process)
      })
      .cloned()
      .collect()
  }

  pub fn snapshots(&self) -> Vec<Snapshot> {
    self.snapshots.lock().clone()
  }
}

impl EventSink for MemorySink {
  fn record(&self, event: &ChannelEvent) {
    self.events.lock().push(event.clone());
  }
}

impl SnapshotSink for MemorySink {
  fn observe(&self, snapshot: &Snapshot) {
    self.snapshots.lock().push(snapshot.clone());
  }
}
