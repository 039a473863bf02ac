mod common;
use common::*;

use strand::{Channel, RecvError, SendError};

use std::sync::mpsc;
use std::thread;

#[test]
fn rendezvous_send_blocks_until_recv() {
  let ch = Channel::new("rdv", 0);

  let ch2 = ch.clone();
  let send_handle = thread::spawn(move || {
    ch2.send(42).unwrap();
  });

  thread::sleep(SETTLE);
  assert!(!send_handle.is_finished(), "send should have blocked");
  assert_eq!(ch.len(), 0, "rendezvous must never buffer");

  assert_eq!(ch.recv().unwrap(), 42);
  send_handle.join().expect("send thread panicked");
}

#[test]
fn rendezvous_recv_blocks_until_send() {
  let ch = Channel::new("rdv", 0);

  let ch2 = ch.clone();
  let recv_handle = thread::spawn(move || ch2.recv().unwrap());

  thread::sleep(SETTLE);
  assert!(!recv_handle.is_finished(), "recv should have blocked");

  ch.send("hello").unwrap();
  assert_eq!(recv_handle.join().unwrap(), "hello");
}

#[test]
fn rendezvous_delivers_each_value_exactly_once() {
  let ch = Channel::new("rdv", 0);
  let items = ITEMS_MEDIUM;

  let ch2 = ch.clone();
  let producer = thread::spawn(move || {
    for i in 0..items {
      ch2.send(i).unwrap();
    }
  });

  let mut seen = Vec::with_capacity(items);
  for _ in 0..items {
    seen.push(ch.recv().unwrap());
  }
  producer.join().unwrap();

  // Nothing dropped, nothing duplicated, order preserved.
  assert_eq!(seen, (0..items).collect::<Vec<_>>());
}

#[test]
fn bounded_blocks_only_past_capacity() {
  let cap = 3;
  let ch = Channel::new("ch1", cap);

  for i in 0..cap {
    ch.send(i).unwrap(); // Fills without blocking.
  }
  assert!(ch.is_full());

  let ch2 = ch.clone();
  let overflow = thread::spawn(move || ch2.send(99));
  thread::sleep(SETTLE);
  assert!(
    !overflow.is_finished(),
    "the {}th send should block",
    cap + 1
  );

  assert_eq!(ch.recv().unwrap(), 0);
  overflow.join().unwrap().unwrap();
  assert_eq!(ch.len(), cap, "backfill must restore the bound");
}

#[test]
fn receivers_are_served_fifo() {
  let ch = Channel::<u32>::new("rdv", 0);
  let (order_tx, order_rx) = mpsc::channel();

  // R1 parks first.
  let ch1 = ch.clone();
  let tx1 = order_tx.clone();
  let r1 = thread::spawn(move || {
    let v = ch1.recv().unwrap();
    tx1.send(("r1", v)).unwrap();
  });
  while ch.waiting_receivers() < 1 {
    thread::yield_now();
  }

  // R2 parks second.
  let ch2 = ch.clone();
  let tx2 = order_tx;
  let r2 = thread::spawn(move || {
    let v = ch2.recv().unwrap();
    tx2.send(("r2", v)).unwrap();
  });
  while ch.waiting_receivers() < 2 {
    thread::yield_now();
  }

  ch.send(1).unwrap();
  ch.send(2).unwrap();
  r1.join().unwrap();
  r2.join().unwrap();

  let mut got = vec![order_rx.recv().unwrap(), order_rx.recv().unwrap()];
  got.sort();
  // The longest-waiting receiver got the first value.
  assert!(got.contains(&("r1", 1)), "r1 must receive the first value");
  assert!(got.contains(&("r2", 2)), "r2 must receive the second value");
}

#[test]
fn close_drains_exactly_the_buffered_values() {
  let ch = Channel::new("ch1", 4);
  ch.send(10).unwrap();
  ch.send(20).unwrap();
  ch.send(30).unwrap();

  ch.close();

  assert_eq!(ch.send(40), Err(SendError::Closed));
  assert_eq!(ch.recv().unwrap(), 10);
  assert_eq!(ch.recv().unwrap(), 20);
  assert_eq!(ch.recv().unwrap(), 30);
  assert_eq!(ch.recv(), Err(RecvError::Closed));
  assert_eq!(ch.recv(), Err(RecvError::Closed));
}

#[test]
fn close_fails_parked_receivers() {
  let ch = Channel::<i32>::new("ch1", 1);

  let ch2 = ch.clone();
  let parked = thread::spawn(move || ch2.recv());
  while ch.waiting_receivers() == 0 {
    thread::yield_now();
  }

  ch.close();
  assert_eq!(parked.join().unwrap(), Err(RecvError::Closed));
}

#[test]
fn close_fails_parked_senders() {
  let ch = Channel::new("ch1", 1);
  ch.send(1).unwrap();

  let ch2 = ch.clone();
  let parked = thread::spawn(move || ch2.send(2));
  while ch.waiting_senders() == 0 {
    thread::yield_now();
  }

  ch.close();
  assert_eq!(parked.join().unwrap(), Err(SendError::Closed));
  // The parked sender's value never lands in the buffer.
  assert_eq!(ch.recv().unwrap(), 1);
  assert_eq!(ch.recv(), Err(RecvError::Closed));
}

#[test]
fn bounded_pipeline_of_threads_preserves_order() {
  let ch = Channel::new("ch1", 2);
  let items = ITEMS_LOW;

  let ch2 = ch.clone();
  let producer = thread::spawn(move || {
    for i in 0..items {
      ch2.send(i).unwrap();
    }
    ch2.close();
  });

  let mut seen = Vec::new();
  while let Ok(v) = ch.recv() {
    seen.push(v);
  }
  producer.join().unwrap();

  assert_eq!(seen, (0..items).collect::<Vec<_>>());
}
