//! CSP-style channels and process topologies for Rust.
//!
//! Strand provides a single synchronization primitive — the [`Channel`],
//! supporting rendezvous (capacity 0) and bounded-buffer operation with
//! blocking send/recv, strict FIFO waiter service, and irreversible close —
//! plus a starvation-free [`Selector`] for multi-channel waits, a process
//! runtime, and a [`topology::Coordinator`] that wires the pieces into
//! pipeline, fan-out, fan-in, and ping-pong runs.

pub mod channel;
pub mod error;
pub mod observer;
pub mod process;
pub mod topology;

// Public re-exports for convenience.
pub use channel::{Channel, ChannelId, ChannelStats, SelectOk, Selector};
pub use error::{
  InvalidCapacity, RecvError, SelectError, SendError, TryRecvError, TrySendError,
};
