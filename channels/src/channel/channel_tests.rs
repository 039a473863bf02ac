use super::*;
use crate::error::{InvalidCapacity, RecvError, SendError, TryRecvError, TrySendError};
use std::thread;
use std::time::Duration;

#[test]
fn checked_rejects_negative_capacity() {
  let err = Channel::<i32>::checked("bad", -1).unwrap_err();
  assert_eq!(err, InvalidCapacity(-1));
  assert!(Channel::<i32>::checked("ok", 0).is_ok());
}

#[test]
fn buffered_send_recv() {
  let ch = Channel::new("ch1", 2);
  ch.send(1).unwrap();
  ch.send(2).unwrap();
  assert!(ch.is_full());
  assert_eq!(ch.recv().unwrap(), 1);
  assert_eq!(ch.recv().unwrap(), 2);
  assert!(ch.is_empty());
}

#[test]
fn try_send_full_returns_value() {
  let ch = Channel::new("ch1", 1);
  ch.try_send(10).unwrap();
  assert_eq!(ch.try_send(20), Err(TrySendError::Full(20)));
  ch.close();
  assert_eq!(ch.try_send(30), Err(TrySendError::Closed(30)));
}

#[test]
fn try_recv_empty_then_value() {
  let ch = Channel::new("ch1", 1);
  assert_eq!(ch.try_recv(), Err(TryRecvError::Empty));
  ch.send(7).unwrap();
  assert_eq!(ch.try_recv(), Ok(7));
  assert_eq!(ch.try_recv(), Err(TryRecvError::Empty));
}

#[test]
fn rendezvous_never_buffers() {
  let ch = Channel::<i32>::new("rdv", 0);
  assert_eq!(ch.capacity(), 0);
  assert_eq!(ch.try_send(1), Err(TrySendError::Full(1)));
  assert_eq!(ch.len(), 0);
}

#[test]
fn close_is_idempotent_and_irreversible() {
  let ch = Channel::new("ch1", 2);
  ch.send(1).unwrap();
  ch.close();
  ch.close();
  assert!(ch.is_closed());
  assert_eq!(ch.send(2), Err(SendError::Closed));
  // Values buffered before the close stay drainable.
  assert_eq!(ch.recv().unwrap(), 1);
  assert_eq!(ch.recv(), Err(RecvError::Closed));
}

#[test]
fn recv_backfills_buffer_from_oldest_waiting_sender() {
  let ch = Channel::new("ch1", 1);
  ch.send(1).unwrap();

  let ch2 = ch.clone();
  let blocked = thread::spawn(move || ch2.send(2));
  // Let the second sender park on the full buffer.
  while ch.waiting_senders() == 0 {
    thread::yield_now();
  }

  // Popping 1 must immediately promote the parked sender's 2 into the
  // buffer, keeping FIFO order and the capacity bound.
  assert_eq!(ch.recv().unwrap(), 1);
  blocked.join().unwrap().unwrap();
  assert_eq!(ch.len(), 1);
  assert_eq!(ch.recv().unwrap(), 2);
}

#[test]
fn stats_track_blocking_and_depth() {
  let ch = Channel::new("ch1", 2);
  ch.send(1).unwrap();
  ch.send(2).unwrap();
  assert_eq!(ch.stats().max_depth, 2);

  let ch2 = ch.clone();
  let blocked = thread::spawn(move || ch2.send(3));
  while ch.waiting_senders() == 0 {
    thread::yield_now();
  }
  ch.recv().unwrap();
  blocked.join().unwrap().unwrap();

  let stats = ch.stats();
  assert_eq!(stats.blocked_ops, 1);
  assert!(stats.latency_samples >= 1);
}

#[test]
fn close_wakes_parked_sender_even_with_free_capacity_elsewhere() {
  // A parked rendezvous sender must fail on close, never succeed late.
  let ch = Channel::new("rdv", 0);
  let ch2 = ch.clone();
  let parked = thread::spawn(move || ch2.send(1));
  while ch.waiting_senders() == 0 {
    thread::yield_now();
  }
  ch.close();
  assert_eq!(parked.join().unwrap(), Err(SendError::Closed));
}

#[test]
fn debug_formats_show_state() {
  let ch = Channel::<i32>::new("ch1", 4);
  let s = format!("{ch:?}");
  assert!(s.contains("ch1"));
  assert!(!ch.is_closed());
  thread::sleep(Duration::from_millis(1));
  assert!(ch.stats().handoff_latency == Duration::ZERO);
}
