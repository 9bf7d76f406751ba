//! Eventually-consistent replicated key-value store.
//!
//! Every node keeps a full replica of a string-to-string map, accepts writes
//! locally, and gossips its whole operation log to every peer on a fixed
//! heartbeat. Replicas converge without a coordinator: each key carries a
//! vector-clock version, causally newer writes replace older ones, and
//! concurrent writes are settled by a value order every node agrees on.
//!
//! # Modules
//!
//! - [`clock`]: vector clocks and the dominance relation between them
//! - [`operation`]: the mutation record exchanged between nodes
//! - [`store`]: replica state and the rules for accepting operations
//! - [`node`]: the lock-guarded node service used by handlers and gossip
//! - [`broadcast`]: the periodic anti-entropy push to peers
//! - [`api`]: the HTTP routes (`/change`, `/sync`, `/values`, `/state_dump`)
//! - [`config`]: the static cluster file
//! - [`error`]: errors returned to HTTP callers

pub mod api;
pub mod broadcast;
pub mod clock;
pub mod config;
pub mod error;
pub mod node;
pub mod operation;
pub mod store;
