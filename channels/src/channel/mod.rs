//! The channel primitive: rendezvous and bounded-buffer channels with
//! blocking send/recv, strict FIFO waiter service, and irreversible close.
//!
//! A capacity of `0` creates a pure rendezvous channel: a `send` completes
//! only in the same logical instant as a matching `recv`, and nothing is
//! ever buffered. A capacity of `N > 0` creates a bounded queue: sends
//! complete without blocking until `N` values are in flight, after which the
//! next sender parks until a receiver frees a slot.
//!
//! Unlike a sender/receiver-pair channel, a [`Channel`] is a single cloneable
//! handle. Shutdown is explicit via [`Channel::close`], which is idempotent:
//! sends fail immediately afterwards, while values buffered before the close
//! remain drainable.

use crate::error::{InvalidCapacity, RecvError, SendError, TryRecvError, TrySendError};

use std::fmt;
use std::sync::Arc;

mod core;
mod select;

pub use self::core::ChannelStats;
pub use self::select::{SelectOk, Selector};

pub(crate) use self::core::Watcher;

use self::core::ChanCore;

#[cfg(test)]
mod channel_tests;

/// A cheap, cloneable channel name. Topologies use names like `ch1` or
/// `ping`.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct ChannelId(Arc<str>);

impl ChannelId {
  pub fn as_str(&self) -> &str {
    &self.0
  }
}

impl From<&str> for ChannelId {
  fn from(s: &str) -> Self {
    ChannelId(Arc::from(s))
  }
}

impl From<String> for ChannelId {
  fn from(s: String) -> Self {
    ChannelId(Arc::from(s.as_str()))
  }
}

impl fmt::Display for ChannelId {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(&self.0)
  }
}

impl fmt::Debug for ChannelId {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "ChannelId({})", self.0)
  }
}

/// A named CSP channel. Clones share the same underlying state.
pub struct Channel<T> {
  core: Arc<ChanCore<T>>,
}

impl<T> Clone for Channel<T> {
  fn clone(&self) -> Self {
    Channel {
      core: Arc::clone(&self.core),
    }
  }
}

impl<T: Send> Channel<T> {
  /// Creates a channel with the given capacity. `0` is a rendezvous channel.
  pub fn new(id: impl Into<ChannelId>, capacity: usize) -> Self {
    Channel {
      core: Arc::new(ChanCore::new(id.into(), capacity)),
    }
  }

  /// Creates a channel from an externally supplied capacity, rejecting
  /// negative values with [`InvalidCapacity`].
  pub fn checked(id: impl Into<ChannelId>, capacity: i64) -> Result<Self, InvalidCapacity> {
    if capacity < 0 {
      return Err(InvalidCapacity(capacity));
    }
    Ok(Channel::new(id, capacity as usize))
  }

  /// Sends a value, parking the current thread until it is handed off.
  ///
  /// Fails immediately (without blocking) if the channel is closed, and
  /// fails after waking if the channel closes while this sender is parked.
  pub fn send(&self, value: T) -> Result<(), SendError> {
    self.core.send(value)
  }

  /// Attempts to send without blocking.
  pub fn try_send(&self, value: T) -> Result<(), TrySendError<T>> {
    self.core.try_send(value)
  }

  /// Receives a value, parking the current thread until one is available.
  ///
  /// Fails once the channel is closed and its buffer is drained.
  pub fn recv(&self) -> Result<T, RecvError> {
    self.core.recv()
  }

  /// Attempts to receive without blocking.
  pub fn try_recv(&self) -> Result<T, TryRecvError> {
    self.core.try_recv()
  }

  /// Closes the channel: fails every currently parked sender and receiver,
  /// leaves buffered values drainable. Idempotent; never reverts.
  pub fn close(&self) {
    self.core.close()
  }

  pub fn id(&self) -> &ChannelId {
    &self.core.id
  }

  /// The configured capacity. `0` means rendezvous.
  pub fn capacity(&self) -> usize {
    self.core.capacity
  }

  /// The number of values currently buffered.
  pub fn len(&self) -> usize {
    self.core.len()
  }

  pub fn is_empty(&self) -> bool {
    self.len() == 0
  }

  pub fn is_full(&self) -> bool {
    self.len() == self.capacity()
  }

  pub fn is_closed(&self) -> bool {
    self.core.is_closed()
  }

  /// How many senders are currently parked on this channel.
  pub fn waiting_senders(&self) -> usize {
    self.core.waiting_senders()
  }

  /// How many receivers are currently parked on this channel.
  pub fn waiting_receivers(&self) -> usize {
    self.core.waiting_receivers()
  }

  /// Observational counters (blocked ops, buffer high-water mark, handoff
  /// latency). Never feeds back into channel behavior.
  pub fn stats(&self) -> ChannelStats {
    self.core.stats()
  }

  pub(crate) fn register_watcher(&self, watcher: &Arc<Watcher>) {
    self.core.register_watcher(watcher)
  }
}

impl<T: Send> fmt::Debug for Channel<T> {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("Channel")
      .field("id", &self.core.id)
      .field("capacity", &self.core.capacity)
      .field("len", &self.len())
      .field("closed", &self.is_closed())
      .finish()
  }
}
