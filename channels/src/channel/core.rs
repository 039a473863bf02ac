//! The shared core of a channel: buffer, waiter queues, and matching logic.
//!
//! All state lives behind a single `parking_lot::Mutex`. Waiters are plain
//! `Arc` nodes holding a parked thread plus a handoff slot; they are pushed
//! and popped strictly FIFO, so the longest-waiting sender or receiver is
//! always matched first. A waiter is only ever mutated by the party that
//! popped it from its queue while holding the channel lock, which is what
//! makes a match atomic: no two wakers can pop the same node.
//!
//! Lock order: channel mutex, then a waiter's slot mutex. Unparks happen
//! after the channel lock is released wherever the popped node is the only
//! thing left to touch.

use crate::error::{RecvError, SendError, TryRecvError, TrySendError};

use parking_lot::Mutex;
use serde::Serialize;
use std::collections::VecDeque;
use std::mem;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread::{self, Thread};
use std::time::{Duration, Instant};

use super::ChannelId;

// --- Waiter nodes ---

pub(crate) enum SendSlot<T> {
  /// The value is still waiting to be taken by a receiver.
  Pending(T),
  /// A receiver took the value; the send succeeded.
  Delivered,
  /// The channel closed under the parked sender; the value was dropped.
  Closed,
}

/// A parked sender. The value travels inside the node so the matching
/// receiver can take it directly.
pub(crate) struct SendWaiter<T> {
  thread: Thread,
  done: AtomicBool,
  slot: Mutex<SendSlot<T>>,
  pub(crate) enqueued_at: Instant,
}

impl<T> SendWaiter<T> {
  fn new(value: T) -> Self {
    Self {
      thread: thread::current(),
      done: AtomicBool::new(false),
      slot: Mutex::new(SendSlot::Pending(value)),
      enqueued_at: Instant::now(),
    }
  }

  /// Takes the pending value. Only the party that popped this node from the
  /// channel's queue may call this, and only once.
  fn take(&self) -> T {
    match mem::replace(&mut *self.slot.lock(), SendSlot::Delivered) {
      SendSlot::Pending(v) => v,
      _ => unreachable!("send waiter matched twice"),
    }
  }

  fn complete(&self) {
    self.done.store(true, Ordering::Release);
    self.thread.unpark();
  }

  /// Fails the parked sender because the channel closed. Drops the value.
  fn fail_closed(&self) {
    *self.slot.lock() = SendSlot::Closed;
    self.complete();
  }

  fn park_until_done(&self) {
    // park() can return spuriously; the done flag is the source of truth.
    while !self.done.load(Ordering::Acquire) {
      thread::park();
    }
  }

  fn outcome(&self) -> Result<(), SendError> {
    match &*self.slot.lock() {
      SendSlot::Delivered => Ok(()),
      SendSlot::Closed => Err(SendError::Closed),
      SendSlot::Pending(_) => unreachable!("send waiter woken without outcome"),
    }
  }
}

pub(crate) enum RecvSlot<T> {
  Waiting,
  /// A sender handed a value directly to this receiver.
  Value(T),
  Closed,
}

/// A parked receiver.
pub(crate) struct RecvWaiter<T> {
  thread: Thread,
  done: AtomicBool,
  slot: Mutex<RecvSlot<T>>,
  pub(crate) enqueued_at: Instant,
}

impl<T> RecvWaiter<T> {
  fn new() -> Self {
    Self {
      thread: thread::current(),
      done: AtomicBool::new(false),
      slot: Mutex::new(RecvSlot::Waiting),
      enqueued_at: Instant::now(),
    }
  }

  /// Hands a value to the parked receiver and wakes it. Only the party that
  /// popped this node may call this.
  fn fulfill(&self, value: T) {
    *self.slot.lock() = RecvSlot::Value(value);
    self.complete();
  }

  fn fail_closed(&self) {
    *self.slot.lock() = RecvSlot::Closed;
    self.complete();
  }

  fn complete(&self) {
    self.done.store(true, Ordering::Release);
    self.thread.unpark();
  }

  fn park_until_done(&self) {
    while !self.done.load(Ordering::Acquire) {
      thread::park();
    }
  }

  fn outcome(&self) -> Result<T, RecvError> {
    match mem::replace(&mut *self.slot.lock(), RecvSlot::Waiting) {
      RecvSlot::Value(v) => Ok(v),
      RecvSlot::Closed => Err(RecvError::Closed),
      RecvSlot::Waiting => unreachable!("recv waiter woken without outcome"),
    }
  }
}

// --- Select watchers ---

/// A one-shot wake handle registered by a `Selector` on every channel it
/// watches. Firing an already-fired watcher is a no-op, so channels drain
/// and fire their whole watcher list on any event that makes them
/// receive-ready.
pub(crate) struct Watcher {
  thread: Thread,
  fired: AtomicBool,
}

impl Watcher {
  pub(crate) fn new() -> Self {
    Self {
      thread: thread::current(),
      fired: AtomicBool::new(false),
    }
  }

  pub(crate) fn fire(&self) {
    if !self.fired.swap(true, Ordering::AcqRel) {
      self.thread.unpark();
    }
  }

  pub(crate) fn wait(&self) {
    while !self.fired.load(Ordering::Acquire) {
      thread::park();
    }
  }
}

// --- Metrics ---

/// Per-channel observational counters. These never feed back into channel
/// behavior.
#[derive(Debug, Default)]
pub(crate) struct Metrics {
  blocked_ops: AtomicU64,
  max_depth: AtomicUsize,
  latency_ns: AtomicU64,
  latency_samples: AtomicU64,
}

impl Metrics {
  fn note_blocked(&self) {
    self.blocked_ops.fetch_add(1, Ordering::Relaxed);
  }

  fn note_depth(&self, depth: usize) {
    self.max_depth.fetch_max(depth, Ordering::Relaxed);
  }

  fn record_latency(&self, waited: Duration) {
    self
      .latency_ns
      .fetch_add(waited.as_nanos() as u64, Ordering::Relaxed);
    self.latency_samples.fetch_add(1, Ordering::Relaxed);
  }

  fn snapshot(&self) -> ChannelStats {
    ChannelStats {
      blocked_ops: self.blocked_ops.load(Ordering::Relaxed),
      max_depth: self.max_depth.load(Ordering::Relaxed),
      handoff_latency: Duration::from_nanos(self.latency_ns.load(Ordering::Relaxed)),
      latency_samples: self.latency_samples.load(Ordering::Relaxed),
    }
  }
}

/// A point-in-time copy of a channel's observational counters.
#[derive(Debug, Clone, Serialize)]
pub struct ChannelStats {
  /// How many send/recv calls had to park.
  pub blocked_ops: u64,
  /// High-water mark of the buffer depth.
  pub max_depth: usize,
  /// Total time matched counterparts spent waiting before handoff.
  pub handoff_latency: Duration,
  /// Number of handoffs that contributed to `handoff_latency`.
  pub latency_samples: u64,
}

impl ChannelStats {
  /// Mean wait before handoff, or zero when nothing was measured.
  pub fn avg_latency(&self) -> Duration {
    if self.latency_samples == 0 {
      Duration::ZERO
    } else {
      self.handoff_latency / self.latency_samples as u32
    }
  }
}

// --- Channel core ---

struct Buffered<T> {
  value: T,
  enqueued_at: Instant,
}

struct State<T> {
  buffer: VecDeque<Buffered<T>>,
  send_waiters: VecDeque<Arc<SendWaiter<T>>>,
  recv_waiters: VecDeque<Arc<RecvWaiter<T>>>,
  watchers: Vec<Arc<Watcher>>,
  closed: bool,
}

impl<T> State<T> {
  fn take_watchers(&mut self) -> Vec<Arc<Watcher>> {
    mem::take(&mut self.watchers)
  }
}

fn fire_all(watchers: Vec<Arc<Watcher>>) {
  for w in watchers {
    w.fire();
  }
}

/// The shared owner of a channel's state, wrapped in an `Arc` by the public
/// `Channel` handle.
pub(crate) struct ChanCore<T> {
  pub(crate) id: ChannelId,
  pub(crate) capacity: usize,
  state: Mutex<State<T>>,
  metrics: Metrics,
}

impl<T: Send> ChanCore<T> {
  pub(crate) fn new(id: ChannelId, capacity: usize) -> Self {
    Self {
      id,
      capacity,
      state: Mutex::new(State {
        buffer: VecDeque::with_capacity(capacity),
        send_waiters: VecDeque::new(),
        recv_waiters: VecDeque::new(),
        watchers: Vec::new(),
        closed: false,
      }),
      metrics: Metrics::default(),
    }
  }

  /// The blocking send. In order: fail if closed, hand off to the oldest
  /// parked receiver, push to the buffer if there is room, otherwise park
  /// until matched or the channel closes.
  pub(crate) fn send(&self, value: T) -> Result<(), SendError> {
    let mut state = self.state.lock();

    if state.closed {
      return Err(SendError::Closed);
    }

    // --- Priority 1: direct rendezvous with the oldest parked receiver ---
    if let Some(rx) = state.recv_waiters.pop_front() {
      self.metrics.record_latency(rx.enqueued_at.elapsed());
      drop(state);
      rx.fulfill(value);
      return Ok(());
    }

    // --- Priority 2: buffer space (capacity 0 never buffers) ---
    if self.capacity > 0 && state.buffer.len() < self.capacity {
      state.buffer.push_back(Buffered {
        value,
        enqueued_at: Instant::now(),
      });
      self.metrics.note_depth(state.buffer.len());
      let watchers = state.take_watchers();
      drop(state);
      fire_all(watchers);
      return Ok(());
    }

    // --- Fallback: park until a recv or close settles our fate ---
    let waiter = Arc::new(SendWaiter::new(value));
    state.send_waiters.push_back(Arc::clone(&waiter));
    self.metrics.note_blocked();
    // A parked sender makes the channel receive-ready.
    let watchers = state.take_watchers();
    drop(state);
    fire_all(watchers);

    waiter.park_until_done();
    waiter.outcome()
  }

  /// The non-blocking send probe.
  pub(crate) fn try_send(&self, value: T) -> Result<(), TrySendError<T>> {
    let mut state = self.state.lock();

    if state.closed {
      return Err(TrySendError::Closed(value));
    }

    if let Some(rx) = state.recv_waiters.pop_front() {
      self.metrics.record_latency(rx.enqueued_at.elapsed());
      drop(state);
      rx.fulfill(value);
      return Ok(());
    }

    if self.capacity > 0 && state.buffer.len() < self.capacity {
      state.buffer.push_back(Buffered {
        value,
        enqueued_at: Instant::now(),
      });
      self.metrics.note_depth(state.buffer.len());
      let watchers = state.take_watchers();
      drop(state);
      fire_all(watchers);
      return Ok(());
    }

    Err(TrySendError::Full(value))
  }

  /// The blocking receive. In order: pop the oldest buffered value (and
  /// backfill from the oldest parked sender to keep the buffer bounded and
  /// FIFO), take directly from a parked rendezvous sender, fail if closed,
  /// otherwise park.
  pub(crate) fn recv(&self) -> Result<T, RecvError> {
    match self.recv_ready() {
      Ok(value) => return Ok(value),
      Err(TryRecvError::Closed) => return Err(RecvError::Closed),
      Err(TryRecvError::Empty) => {}
    }

    // Slow path: re-check under the lock, then commit to parking. The
    // re-check prevents a lost wakeup between the probe and the enqueue.
    loop {
      let mut state = self.state.lock();

      if !state.buffer.is_empty() || !state.send_waiters.is_empty() {
        drop(state);
        match self.recv_ready() {
          Ok(value) => return Ok(value),
          Err(TryRecvError::Closed) => return Err(RecvError::Closed),
          Err(TryRecvError::Empty) => continue,
        }
      }

      if state.closed {
        return Err(RecvError::Closed);
      }

      let waiter = Arc::new(RecvWaiter::new());
      state.recv_waiters.push_back(Arc::clone(&waiter));
      self.metrics.note_blocked();
      drop(state);

      waiter.park_until_done();
      return waiter.outcome();
    }
  }

  /// The non-blocking receive probe.
  pub(crate) fn try_recv(&self) -> Result<T, TryRecvError> {
    self.recv_ready()
  }

  /// Takes a value if one is ready right now: buffered first, then a parked
  /// sender. Reports `Closed` only once the channel is closed *and* drained.
  fn recv_ready(&self) -> Result<T, TryRecvError> {
    let mut state = self.state.lock();

    // --- Priority 1: the buffer, backfilled from the oldest parked sender ---
    if let Some(item) = state.buffer.pop_front() {
      self.metrics.record_latency(item.enqueued_at.elapsed());
      let backfilled = if let Some(tx) = state.send_waiters.pop_front() {
        let value = tx.take();
        state.buffer.push_back(Buffered {
          value,
          enqueued_at: Instant::now(),
        });
        self.metrics.note_depth(state.buffer.len());
        Some(tx)
      } else {
        None
      };
      drop(state);
      if let Some(tx) = backfilled {
        tx.complete();
      }
      return Ok(item.value);
    }

    // --- Priority 2: direct take from the oldest parked sender ---
    if let Some(tx) = state.send_waiters.pop_front() {
      self.metrics.record_latency(tx.enqueued_at.elapsed());
      let value = tx.take();
      drop(state);
      tx.complete();
      return Ok(value);
    }

    if state.closed {
      return Err(TryRecvError::Closed);
    }
    Err(TryRecvError::Empty)
  }

  /// Closes the channel. Irreversible and idempotent.
  ///
  /// Every currently parked sender and receiver is failed immediately, even
  /// if buffer capacity remains. Values buffered before the close stay
  /// drainable through `recv`/`try_recv`.
  pub(crate) fn close(&self) {
    let mut state = self.state.lock();
    if state.closed {
      return;
    }
    state.closed = true;

    let senders: Vec<_> = state.send_waiters.drain(..).collect();
    let receivers: Vec<_> = state.recv_waiters.drain(..).collect();
    let watchers = state.take_watchers();
    drop(state);

    for tx in senders {
      tx.fail_closed();
    }
    for rx in receivers {
      rx.fail_closed();
    }
    fire_all(watchers);
  }

  /// Registers a select watcher. Skipped when the channel can never become
  /// ready again (closed and fully drained); the selector's re-scan will
  /// observe the closure instead.
  pub(crate) fn register_watcher(&self, watcher: &Arc<Watcher>) {
    let mut state = self.state.lock();
    if state.closed && state.buffer.is_empty() && state.send_waiters.is_empty() {
      return;
    }
    state.watchers.push(Arc::clone(watcher));
  }

  // --- Introspection ---

  pub(crate) fn len(&self) -> usize {
    self.state.lock().buffer.len()
  }

  pub(crate) fn is_closed(&self) -> bool {
    self.state.lock().closed
  }

  pub(crate) fn waiting_senders(&self) -> usize {
    self.state.lock().send_waiters.len()
  }

  pub(crate) fn waiting_receivers(&self) -> usize {
    self.state.lock().recv_waiters.len()
  }

  pub(crate) fn stats(&self) -> ChannelStats {
    self.metrics.snapshot()
  }
}
