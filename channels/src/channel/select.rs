//! Multi-channel wait with a starvation-free pick policy.
//!
//! A [`Selector`] blocks until at least one of its channels is ready, then
//! receives from one ready channel. The pick is round-robin over the
//! currently-ready set: each scan starts one past the index served last, so
//! sustained load on an early channel can never starve a later one the way a
//! fixed-order scan would.

use crate::error::{SelectError, TryRecvError};

use std::sync::Arc;

use super::core::Watcher;
use super::{Channel, ChannelId};

/// A successful select: which channel won, and the value it delivered.
#[derive(Debug)]
pub struct SelectOk<T> {
  /// Index of the winning channel in the selector's list.
  pub index: usize,
  pub channel: ChannelId,
  pub value: T,
}

/// Waits on a fixed set of channels and receives from whichever is ready.
///
/// The selector keeps its rotation cursor across calls, so a collector that
/// loops on [`Selector::select`] serves its channels fairly for the whole
/// run.
pub struct Selector<T> {
  channels: Vec<Channel<T>>,
  cursor: usize,
}

impl<T: Send> Selector<T> {
  pub fn new(channels: Vec<Channel<T>>) -> Self {
    Selector {
      channels,
      cursor: 0,
    }
  }

  pub fn channels(&self) -> &[Channel<T>] {
    &self.channels
  }

  /// Blocks until one of the channels is ready, then receives from it.
  ///
  /// Fails with [`SelectError::AllClosed`] once every channel is closed and
  /// drained.
  pub fn select(&mut self) -> Result<SelectOk<T>, SelectError> {
    if self.channels.is_empty() {
      return Err(SelectError::AllClosed);
    }

    loop {
      if let Some(ok) = self.scan()? {
        return Ok(ok);
      }

      // Nothing ready: register a one-shot watcher on every channel, then
      // re-scan once before parking so a send that landed in between cannot
      // be lost.
      let watcher = Arc::new(Watcher::new());
      for ch in &self.channels {
        ch.register_watcher(&watcher);
      }

      if let Some(ok) = self.scan()? {
        return Ok(ok);
      }

      watcher.wait();
    }
  }

  /// One non-blocking pass over the channels. `Ok(None)` means nothing was
  /// ready but at least one channel may still deliver.
  pub fn try_select(&mut self) -> Result<Option<SelectOk<T>>, SelectError> {
    self.scan()
  }

  fn scan(&mut self) -> Result<Option<SelectOk<T>>, SelectError> {
    let n = self.channels.len();
    let mut closed = 0;

    for offset in 0..n {
      let index = (self.cursor + offset) % n;
      match self.channels[index].try_recv() {
        Ok(value) => {
          self.cursor = (index + 1) % n;
          return Ok(Some(SelectOk {
            index,
            channel: self.channels[index].id().clone(),
            value,
          }));
        }
        Err(TryRecvError::Empty) => {}
        Err(TryRecvError::Closed) => closed += 1,
      }
    }

    if closed == n {
      Err(SelectError::AllClosed)
    } else {
      Ok(None)
    }
  }
}
