//! The process runtime: one logical thread of control per process.
//!
//! A process is an OS thread (named after its id) running a script against a
//! [`ProcessCtx`]. The context wraps the channel operations so that every
//! completed op updates the process's status and counters and emits one
//! observability event. A blocked process truly parks inside the channel; it
//! never polls.

use serde::Serialize;
use std::fmt;
use std::io;
use std::sync::atomic::{AtomicU64, AtomicU8, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Instant;

use crate::channel::{Channel, SelectOk, Selector};
use crate::error::{RecvError, SelectError, SendError, TryRecvError, TrySendError};
use crate::observer::{ChannelEvent, EventSink, Op, ProcessSnapshot};

/// A cheap, cloneable process name.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct ProcessId(Arc<str>);

impl ProcessId {
  pub fn as_str(&self) -> &str {
    &self.0
  }
}

impl From<&str> for ProcessId {
  fn from(s: &str) -> Self {
    ProcessId(Arc::from(s))
  }
}

impl From<String> for ProcessId {
  fn from(s: String) -> Self {
    ProcessId(Arc::from(s.as_str()))
  }
}

impl fmt::Display for ProcessId {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(&self.0)
  }
}

impl fmt::Debug for ProcessId {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "ProcessId({})", self.0)
  }
}

/// What a process does in its topology.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
  Producer,
  Consumer,
  Transformer,
  Collector,
  /// One side of a ping-pong pair; both sends and receives every cycle.
  Player,
}

/// The lifecycle state of a process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
#[repr(u8)]
pub enum Status {
  Initializing = 0,
  Idle = 1,
  Sending = 2,
  Receiving = 3,
  Blocked = 4,
  Complete = 5,
}

impl Status {
  fn from_u8(v: u8) -> Status {
    match v {
      0 => Status::Initializing,
      1 => Status::Idle,
      2 => Status::Sending,
      3 => Status::Receiving,
      4 => Status::Blocked,
      _ => Status::Complete,
    }
  }
}

/// Shared, lock-free view of a process's status and counters. The process
/// itself is the only writer; observers only read.
#[derive(Debug)]
pub struct ProcessState {
  status: AtomicU8,
  sent: AtomicU64,
  received: AtomicU64,
}

impl ProcessState {
  fn new() -> Self {
    Self {
      status: AtomicU8::new(Status::Initializing as u8),
      sent: AtomicU64::new(0),
      received: AtomicU64::new(0),
    }
  }

  pub fn status(&self) -> Status {
    Status::from_u8(self.status.load(Ordering::Acquire))
  }

  pub fn sent(&self) -> u64 {
    self.sent.load(Ordering::Relaxed)
  }

  pub fn received(&self) -> u64 {
    self.received.load(Ordering::Relaxed)
  }

  fn set_status(&self, status: Status) {
    self.status.store(status as u8, Ordering::Release);
  }
}

/// The execution context handed to a process script. All channel traffic
/// goes through here so status, counters, and events stay consistent.
pub struct ProcessCtx {
  id: ProcessId,
  state: Arc<ProcessState>,
  events: Arc<dyn EventSink>,
  epoch: Instant,
}

impl ProcessCtx {
  pub fn id(&self) -> &ProcessId {
    &self.id
  }

  /// Sends a value, parking if the channel is full. The emitted event's
  /// `blocked` flag records whether the fast path failed first.
  pub fn send<T>(&self, channel: &Channel<T>, value: T) -> Result<(), SendError>
  where
    T: Send + fmt::Display,
  {
    self.state.set_status(Status::Sending);
    let rendered = value.to_string();

    let mut blocked = false;
    let result = match channel.try_send(value) {
      Ok(()) => Ok(()),
      Err(TrySendError::Closed(_)) => Err(SendError::Closed),
      Err(TrySendError::Full(v)) => {
        blocked = true;
        self.state.set_status(Status::Blocked);
        channel.send(v)
      }
    };

    if result.is_ok() {
      self.state.sent.fetch_add(1, Ordering::Relaxed);
      self.events.record(&ChannelEvent {
        at: self.epoch.elapsed(),
        from: Some(self.id.to_string()),
        to: None,
        channel: channel.id().to_string(),
        op: Op::Send,
        value: rendered,
        blocked,
      });
    }
    self.state.set_status(Status::Idle);
    result
  }

  /// Receives a value, parking if nothing is ready.
  pub fn recv<T>(&self, channel: &Channel<T>) -> Result<T, RecvError>
  where
    T: Send + fmt::Display,
  {
    self.state.set_status(Status::Receiving);

    let mut blocked = false;
    let result = match channel.try_recv() {
      Ok(v) => Ok(v),
      Err(TryRecvError::Closed) => Err(RecvError::Closed),
      Err(TryRecvError::Empty) => {
        blocked = true;
        self.state.set_status(Status::Blocked);
        channel.recv()
      }
    };

    if let Ok(value) = &result {
      self.state.received.fetch_add(1, Ordering::Relaxed);
      self.events.record(&ChannelEvent {
        at: self.epoch.elapsed(),
        from: None,
        to: Some(self.id.to_string()),
        channel: channel.id().to_string(),
        op: Op::Recv,
        value: value.to_string(),
        blocked,
      });
    }
    self.state.set_status(Status::Idle);
    result
  }

  /// Waits on the selector until one of its channels delivers.
  pub fn select<T>(&self, selector: &mut Selector<T>) -> Result<SelectOk<T>, SelectError>
  where
    T: Send + fmt::Display,
  {
    self.state.set_status(Status::Receiving);

    let mut blocked = false;
    let result = match selector.try_select() {
      Ok(Some(ok)) => Ok(ok),
      Err(e) => Err(e),
      Ok(None) => {
        blocked = true;
        self.state.set_status(Status::Blocked);
        selector.select()
      }
    };

    if let Ok(ok) = &result {
      self.state.received.fetch_add(1, Ordering::Relaxed);
      self.events.record(&ChannelEvent {
        at: self.epoch.elapsed(),
        from: None,
        to: Some(self.id.to_string()),
        channel: ok.channel.to_string(),
        op: Op::Recv,
        value: ok.value.to_string(),
        blocked,
      });
    }
    self.state.set_status(Status::Idle);
    result
  }
}

/// A spawned process: id, role, shared state, and the thread to join.
pub struct ProcessHandle {
  id: ProcessId,
  role: Role,
  state: Arc<ProcessState>,
  join: JoinHandle<()>,
}

impl ProcessHandle {
  pub fn id(&self) -> &ProcessId {
    &self.id
  }

  pub fn role(&self) -> Role {
    self.role
  }

  pub fn state(&self) -> &Arc<ProcessState> {
    &self.state
  }

  pub fn snapshot(&self) -> ProcessSnapshot {
    snapshot_of(&self.id, self.role, &self.state)
  }

  /// Waits for the process to finish its script.
  pub fn join(self) -> thread::Result<()> {
    self.join.join()
  }
}

pub(crate) fn snapshot_of(id: &ProcessId, role: Role, state: &ProcessState) -> ProcessSnapshot {
  ProcessSnapshot {
    id: id.to_string(),
    role,
    status: state.status(),
    sent: state.sent(),
    received: state.received(),
  }
}

/// Spawns a process thread running `script`. The status moves Initializing →
/// Idle before the script runs and lands on Complete when it returns.
pub fn spawn_process<F>(
  id: ProcessId,
  role: Role,
  events: Arc<dyn EventSink>,
  epoch: Instant,
  script: F,
) -> io::Result<ProcessHandle>
where
  F: FnOnce(&ProcessCtx) + Send + 'static,
{
  let state = Arc::new(ProcessState::new());
  let ctx = ProcessCtx {
    id: id.clone(),
    state: Arc::clone(&state),
    events,
    epoch,
  };

  let join = thread::Builder::new()
    .name(id.to_string())
    .spawn(move || {
      ctx.state.set_status(Status::Idle);
      script(&ctx);
      ctx.state.set_status(Status::Complete);
    })?;

  Ok(ProcessHandle {
    id,
    role,
    state,
    join,
  })
}
