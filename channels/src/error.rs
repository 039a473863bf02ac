//! Error types for channel, select, and topology operations.
//!
//! All errors here are terminal and synchronous: the primitives never retry
//! or recover internally. Retry policy, if any, belongs to the calling
//! process.

use thiserror::Error;

/// Error returned by a blocking `send`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum SendError {
  /// The channel was closed before the value could be handed off.
  ///
  /// A send on a closed channel fails immediately and never blocks. The
  /// value is dropped.
  #[error("send on closed channel")]
  Closed,
}

/// Error returned by a blocking `recv`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum RecvError {
  /// The channel is closed and its buffer is fully drained.
  #[error("recv on closed channel")]
  Closed,
}

/// Error returned by a non-blocking `try_send`.
///
/// Ownership of the value is handed back to the caller so it can retry or
/// fall through to a blocking `send`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum TrySendError<T> {
  /// The buffer is full (or the channel is a rendezvous with no receiver
  /// currently parked).
  #[error("channel full")]
  Full(T),
  /// The channel is closed.
  #[error("send on closed channel")]
  Closed(T),
}

impl<T> TrySendError<T> {
  /// Returns the value that could not be sent.
  pub fn into_inner(self) -> T {
    match self {
      TrySendError::Full(v) | TrySendError::Closed(v) => v,
    }
  }
}

/// Error returned by a non-blocking `try_recv`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum TryRecvError {
  /// No value is ready right now.
  #[error("channel empty")]
  Empty,
  /// The channel is closed and its buffer is fully drained.
  #[error("recv on closed channel")]
  Closed,
}

/// Error returned by `Selector::select`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum SelectError {
  /// Every channel in the selector is closed and drained.
  #[error("all channels closed")]
  AllClosed,
}

/// A channel capacity supplied from external configuration was rejected.
///
/// Capacities are carried as raw `i64` at the configuration boundary; anything
/// negative is refused here before a channel is ever created.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("invalid channel capacity {0}: must be a non-negative integer")]
pub struct InvalidCapacity(pub i64);
