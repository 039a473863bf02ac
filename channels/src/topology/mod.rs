//! The coordinator: builds a named topology, owns every channel and process
//! handle, runs it to completion, and tears it down.
//!
//! There is no ambient registry of channels or processes; anything that
//! needs a handle gets it from the [`Coordinator`] that created it.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::io;
use std::str::FromStr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use thiserror::Error;

use crate::channel::Channel;
use crate::error::InvalidCapacity;
use crate::observer::{
  ChannelSnapshot, EventSink, ProcessSnapshot, Snapshot, SnapshotSink, TracingSink,
};
use crate::process::{snapshot_of, ProcessId, ProcessState, Role};

mod patterns;

// --- Messages ---

/// The payload carried over topology channels.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Payload {
  Num(i64),
  Text(&'static str),
}

impl fmt::Display for Payload {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      Payload::Num(n) => write!(f, "{n}"),
      Payload::Text(s) => f.write_str(s),
    }
  }
}

/// A tagged message: which process minted it, its sequence number within
/// that process, and the payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
  pub origin: ProcessId,
  pub seq: u64,
  pub payload: Payload,
}

impl Message {
  pub fn num(origin: ProcessId, seq: u64, n: i64) -> Self {
    Message {
      origin,
      seq,
      payload: Payload::Num(n),
    }
  }

  pub fn text(origin: ProcessId, seq: u64, s: &'static str) -> Self {
    Message {
      origin,
      seq,
      payload: Payload::Text(s),
    }
  }

  /// Applies `f` to numeric payloads; text passes through untouched.
  pub fn map_num(self, f: impl FnOnce(i64) -> i64) -> Self {
    let payload = match self.payload {
      Payload::Num(n) => Payload::Num(f(n)),
      text => text,
    };
    Message { payload, ..self }
  }
}

impl fmt::Display for Message {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}#{}={}", self.origin, self.seq, self.payload)
  }
}

// --- Configuration ---

/// The four wired-in topology shapes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Pattern {
  Pipeline,
  FanOut,
  FanIn,
  PingPong,
}

impl FromStr for Pattern {
  type Err = String;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    match s {
      "pipeline" => Ok(Pattern::Pipeline),
      "fan-out" | "fanout" => Ok(Pattern::FanOut),
      "fan-in" | "fanin" => Ok(Pattern::FanIn),
      "ping-pong" | "pingpong" => Ok(Pattern::PingPong),
      other => Err(format!("unknown pattern: {other}")),
    }
  }
}

impl fmt::Display for Pattern {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let s = match self {
      Pattern::Pipeline => "pipeline",
      Pattern::FanOut => "fan-out",
      Pattern::FanIn => "fan-in",
      Pattern::PingPong => "ping-pong",
    };
    f.write_str(s)
  }
}

fn default_branches() -> usize {
  3
}

/// External configuration for one run.
///
/// The capacity is carried as a raw `i64` because it arrives from outside
/// (flags, JSON, a form field); [`Coordinator::build`] rejects negative
/// values with [`InvalidCapacity`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TopologyConfig {
  pub pattern: Pattern,
  /// Channel buffer capacity; `0` means rendezvous. Ping-pong always runs
  /// at capacity 0 regardless of this value.
  #[serde(default)]
  pub capacity: i64,
  /// Total messages for the run (cycles, for ping-pong).
  pub messages: u64,
  /// Pipeline transform stages, or fan-out/fan-in branches. Ignored by
  /// ping-pong.
  #[serde(default = "default_branches")]
  pub branches: usize,
  /// Emit a snapshot to the observer every this many milliseconds.
  #[serde(default)]
  pub snapshot_interval_ms: Option<u64>,
}

impl TopologyConfig {
  pub fn new(pattern: Pattern, capacity: i64, messages: u64) -> Self {
    TopologyConfig {
      pattern,
      capacity,
      messages,
      branches: default_branches(),
      snapshot_interval_ms: None,
    }
  }

  pub fn with_branches(mut self, branches: usize) -> Self {
    self.branches = branches;
    self
  }
}

/// Errors from building or running a topology.
#[derive(Debug, Error)]
pub enum TopologyError {
  #[error(transparent)]
  Capacity(#[from] InvalidCapacity),
  #[error("a run needs at least one message")]
  NoMessages,
  #[error("a run needs at least one branch")]
  NoBranches,
  #[error("failed to spawn process thread: {0}")]
  Spawn(#[from] io::Error),
  #[error("process {0} panicked during the run")]
  ProcessPanicked(String),
}

// --- Observer wiring ---

/// The sinks a run reports into. Defaults to tracing-backed events and no
/// snapshots.
#[derive(Clone)]
pub struct Observer {
  pub events: Arc<dyn EventSink>,
  pub snapshots: Option<Arc<dyn SnapshotSink>>,
}

impl Default for Observer {
  fn default() -> Self {
    Observer {
      events: Arc::new(TracingSink),
      snapshots: None,
    }
  }
}

impl Observer {
  pub fn with_events(events: Arc<dyn EventSink>) -> Self {
    Observer {
      events,
      snapshots: None,
    }
  }

  pub fn with_snapshots(mut self, snapshots: Arc<dyn SnapshotSink>) -> Self {
    self.snapshots = Some(snapshots);
    self
  }
}

// --- Reports ---

/// Final numbers for one completed run.
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
  pub pattern: Pattern,
  pub elapsed: Duration,
  pub total_sent: u64,
  pub total_received: u64,
  /// How many channel operations had to park.
  pub blocked_ops: u64,
  /// High-water mark of any channel buffer.
  pub max_buffer_depth: usize,
  /// Mean wait between a party parking and its handoff completing.
  pub avg_handoff_latency: Duration,
  /// Received messages per second.
  pub throughput: f64,
  pub processes: Vec<ProcessSnapshot>,
  pub channels: Vec<ChannelSnapshot>,
}

// --- Coordinator ---

/// Owns the channels and processes of one topology run.
pub struct Coordinator {
  config: TopologyConfig,
  channels: Vec<Channel<Message>>,
}

impl Coordinator {
  /// Validates the configuration and creates the topology's channels.
  pub fn build(config: TopologyConfig) -> Result<Self, TopologyError> {
    if config.capacity < 0 {
      return Err(InvalidCapacity(config.capacity).into());
    }
    if config.messages == 0 {
      return Err(TopologyError::NoMessages);
    }
    if config.branches == 0 && config.pattern != Pattern::PingPong {
      return Err(TopologyError::NoBranches);
    }

    let channels = match config.pattern {
      // Stages sit between producer and consumer, so N stages need N+1
      // channels.
      Pattern::Pipeline => numbered_channels(config.branches + 1, config.capacity)?,
      Pattern::FanOut | Pattern::FanIn => numbered_channels(config.branches, config.capacity)?,
      // Any buffering would let a player run ahead and break the
      // alternation the pattern demonstrates.
      Pattern::PingPong => vec![Channel::new("ping", 0), Channel::new("pong", 0)],
    };

    Ok(Coordinator { config, channels })
  }

  pub fn config(&self) -> &TopologyConfig {
    &self.config
  }

  pub fn channels(&self) -> &[Channel<Message>] {
    &self.channels
  }

  pub fn channel(&self, id: &str) -> Option<&Channel<Message>> {
    self.channels.iter().find(|ch| ch.id().as_str() == id)
  }

  /// Runs the topology to completion: spawns every process, joins them,
  /// closes every channel, and reports.
  pub fn run(self, observer: &Observer) -> Result<RunReport, TopologyError> {
    let epoch = Instant::now();
    let events = Arc::clone(&observer.events);

    let handles = match self.config.pattern {
      Pattern::Pipeline => patterns::spawn_pipeline(&self.config, &self.channels, &events, epoch),
      Pattern::FanOut => patterns::spawn_fanout(&self.config, &self.channels, &events, epoch),
      Pattern::FanIn => patterns::spawn_fanin(&self.config, &self.channels, &events, epoch),
      Pattern::PingPong => patterns::spawn_pingpong(&self.config, &self.channels, &events, epoch),
    }?;

    let meta: Vec<(ProcessId, Role, Arc<ProcessState>)> = handles
      .iter()
      .map(|h| (h.id().clone(), h.role(), Arc::clone(h.state())))
      .collect();

    // Optional snapshot ticker, stopped once the run is over.
    let stop = Arc::new(AtomicBool::new(false));
    let ticker = match (&observer.snapshots, self.config.snapshot_interval_ms) {
      (Some(sink), Some(interval_ms)) => {
        let sink = Arc::clone(sink);
        let stop = Arc::clone(&stop);
        let channels = self.channels.clone();
        let meta = meta.clone();
        let interval = Duration::from_millis(interval_ms.max(1));
        Some(thread::spawn(move || {
          while !stop.load(Ordering::Acquire) {
            sink.observe(&take_snapshot(&channels, &meta, epoch.elapsed()));
            thread::sleep(interval);
          }
        }))
      }
      _ => None,
    };

    let mut panicked: Option<String> = None;
    for handle in handles {
      let id = handle.id().to_string();
      if handle.join().is_err() {
        panicked.get_or_insert(id);
      }
    }

    // Teardown: every channel ends the run closed, whether or not its
    // script got there.
    for ch in &self.channels {
      ch.close();
    }

    stop.store(true, Ordering::Release);
    if let Some(ticker) = ticker {
      let _ = ticker.join();
    }

    let elapsed = epoch.elapsed();
    if let Some(sink) = &observer.snapshots {
      sink.observe(&take_snapshot(&self.channels, &meta, elapsed));
    }

    if let Some(id) = panicked {
      return Err(TopologyError::ProcessPanicked(id));
    }

    Ok(self.report(&meta, elapsed))
  }

  /// Point-in-time state of every channel and process.
  pub fn snapshot(&self) -> Snapshot {
    take_snapshot(&self.channels, &[], Duration::ZERO)
  }

  fn report(
    &self,
    meta: &[(ProcessId, Role, Arc<ProcessState>)],
    elapsed: Duration,
  ) -> RunReport {
    let processes: Vec<ProcessSnapshot> = meta
      .iter()
      .map(|(id, role, state)| snapshot_of(id, *role, state))
      .collect();
    let total_sent = processes.iter().map(|p| p.sent).sum();
    let total_received: u64 = processes.iter().map(|p| p.received).sum();

    let mut blocked_ops = 0;
    let mut max_buffer_depth = 0;
    let mut latency = Duration::ZERO;
    let mut samples = 0;
    for ch in &self.channels {
      let stats = ch.stats();
      blocked_ops += stats.blocked_ops;
      max_buffer_depth = max_buffer_depth.max(stats.max_depth);
      latency += stats.handoff_latency;
      samples += stats.latency_samples;
    }
    let avg_handoff_latency = if samples == 0 {
      Duration::ZERO
    } else {
      latency / samples as u32
    };
    let throughput = if elapsed.is_zero() {
      0.0
    } else {
      total_received as f64 / elapsed.as_secs_f64()
    };

    RunReport {
      pattern: self.config.pattern,
      elapsed,
      total_sent,
      total_received,
      blocked_ops,
      max_buffer_depth,
      avg_handoff_latency,
      throughput,
      processes,
      channels: self.channels.iter().map(channel_snapshot).collect(),
    }
  }
}

fn numbered_channels(count: usize, capacity: i64) -> Result<Vec<Channel<Message>>, InvalidCapacity> {
  (1..=count)
    .map(|i| Channel::checked(format!("ch{i}"), capacity))
    .collect()
}

fn channel_snapshot(ch: &Channel<Message>) -> ChannelSnapshot {
  ChannelSnapshot {
    id: ch.id().to_string(),
    capacity: ch.capacity(),
    depth: ch.len(),
    waiting_senders: ch.waiting_senders(),
    waiting_receivers: ch.waiting_receivers(),
    closed: ch.is_closed(),
  }
}

fn take_snapshot(
  channels: &[Channel<Message>],
  meta: &[(ProcessId, Role, Arc<ProcessState>)],
  at: Duration,
) -> Snapshot {
  Snapshot {
    at,
    channels: channels.iter().map(channel_snapshot).collect(),
    processes: meta
      .iter()
      .map(|(id, role, state)| snapshot_of(id, *role, state))
      .collect(),
  }
}
