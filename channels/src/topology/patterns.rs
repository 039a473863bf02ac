//! Per-pattern process scripts.
//!
//! Each function spawns the processes for one topology, wired to the
//! channels the coordinator created. Scripts only ever touch channels
//! through their `ProcessCtx`, and each script closes the channels it is
//! the last writer of, which is what lets downstream readers terminate.

use std::io;
use std::sync::Arc;
use std::time::Instant;

use crate::channel::{Channel, Selector};
use crate::error::SelectError;
use crate::observer::EventSink;
use crate::process::{spawn_process, ProcessHandle, Role};

use super::{Message, TopologyConfig};

type Spawned = io::Result<Vec<ProcessHandle>>;

fn sink(events: &Arc<dyn EventSink>) -> Arc<dyn EventSink> {
  Arc::clone(events)
}

/// Producer → ch1 → stage1 → … → stageN → ch(N+1) → consumer. Every stage
/// doubles numeric payloads on the way through.
pub(super) fn spawn_pipeline(
  cfg: &TopologyConfig,
  channels: &[Channel<Message>],
  events: &Arc<dyn EventSink>,
  epoch: Instant,
) -> Spawned {
  let mut handles = Vec::new();
  let messages = cfg.messages;

  let first = channels[0].clone();
  handles.push(spawn_process(
    "producer".into(),
    Role::Producer,
    sink(events),
    epoch,
    move |ctx| {
      for seq in 1..=messages {
        let msg = Message::num(ctx.id().clone(), seq, seq as i64);
        if ctx.send(&first, msg).is_err() {
          break;
        }
      }
      first.close();
    },
  )?);

  for stage in 1..channels.len() {
    let upstream = channels[stage - 1].clone();
    let downstream = channels[stage].clone();
    handles.push(spawn_process(
      format!("stage{stage}").into(),
      Role::Transformer,
      sink(events),
      epoch,
      move |ctx| {
        while let Ok(msg) = ctx.recv(&upstream) {
          if ctx.send(&downstream, msg.map_num(|n| n * 2)).is_err() {
            break;
          }
        }
        downstream.close();
      },
    )?);
  }

  let last = channels[channels.len() - 1].clone();
  handles.push(spawn_process(
    "consumer".into(),
    Role::Consumer,
    sink(events),
    epoch,
    move |ctx| while ctx.recv(&last).is_ok() {},
  )?);

  Ok(handles)
}

/// One producer round-robins messages over one channel per worker.
pub(super) fn spawn_fanout(
  cfg: &TopologyConfig,
  channels: &[Channel<Message>],
  events: &Arc<dyn EventSink>,
  epoch: Instant,
) -> Spawned {
  let mut handles = Vec::new();
  let messages = cfg.messages;

  let outs: Vec<_> = channels.to_vec();
  handles.push(spawn_process(
    "producer".into(),
    Role::Producer,
    sink(events),
    epoch,
    move |ctx| {
      for seq in 1..=messages {
        let lane = ((seq - 1) as usize) % outs.len();
        let msg = Message::num(ctx.id().clone(), seq, seq as i64);
        if ctx.send(&outs[lane], msg).is_err() {
          break;
        }
      }
      for ch in &outs {
        ch.close();
      }
    },
  )?);

  for (i, ch) in channels.iter().enumerate() {
    let inbound = ch.clone();
    handles.push(spawn_process(
      format!("worker{}", i + 1).into(),
      Role::Consumer,
      sink(events),
      epoch,
      move |ctx| while ctx.recv(&inbound).is_ok() {},
    )?);
  }

  Ok(handles)
}

/// Each producer owns a channel; one collector selects over all of them
/// until every channel is closed and drained.
pub(super) fn spawn_fanin(
  cfg: &TopologyConfig,
  channels: &[Channel<Message>],
  events: &Arc<dyn EventSink>,
  epoch: Instant,
) -> Spawned {
  let mut handles = Vec::new();
  let branches = channels.len() as u64;
  let base = cfg.messages / branches;
  let remainder = cfg.messages % branches;

  for (i, ch) in channels.iter().enumerate() {
    // Spread the remainder over the first few producers so quotas sum to
    // the configured message count.
    let quota = base + if (i as u64) < remainder { 1 } else { 0 };
    let outbound = ch.clone();
    handles.push(spawn_process(
      format!("producer{}", i + 1).into(),
      Role::Producer,
      sink(events),
      epoch,
      move |ctx| {
        for seq in 1..=quota {
          let msg = Message::num(ctx.id().clone(), seq, seq as i64);
          if ctx.send(&outbound, msg).is_err() {
            break;
          }
        }
        outbound.close();
      },
    )?);
  }

  let inbound: Vec<_> = channels.to_vec();
  handles.push(spawn_process(
    "collector".into(),
    Role::Collector,
    sink(events),
    epoch,
    move |ctx| {
      let mut selector = Selector::new(inbound);
      loop {
        match ctx.select(&mut selector) {
          Ok(_) => {}
          Err(SelectError::AllClosed) => break,
        }
      }
    },
  )?);

  Ok(handles)
}

/// Two players in strict alternation over a pair of rendezvous channels.
pub(super) fn spawn_pingpong(
  cfg: &TopologyConfig,
  channels: &[Channel<Message>],
  events: &Arc<dyn EventSink>,
  epoch: Instant,
) -> Spawned {
  let mut handles = Vec::new();
  let cycles = cfg.messages;

  let ping = channels[0].clone();
  let pong = channels[1].clone();
  handles.push(spawn_process(
    "player1".into(),
    Role::Player,
    sink(events),
    epoch,
    move |ctx| {
      for cycle in 1..=cycles {
        let msg = Message::text(ctx.id().clone(), cycle, "ping");
        if ctx.send(&ping, msg).is_err() || ctx.recv(&pong).is_err() {
          break;
        }
      }
      ping.close();
    },
  )?);

  let ping = channels[0].clone();
  let pong = channels[1].clone();
  handles.push(spawn_process(
    "player2".into(),
    Role::Player,
    sink(events),
    epoch,
    move |ctx| {
      while let Ok(msg) = ctx.recv(&ping) {
        let reply = Message::text(ctx.id().clone(), msg.seq, "pong");
        if ctx.send(&pong, reply).is_err() {
          break;
        }
      }
      pong.close();
    },
  )?);

  Ok(handles)
}
