//! Live odds mirror.
//!
//! Polls an odds provider on a fixed period, keeps the latest full row set in
//! memory and pushes snapshot/delta frames to any number of subscribers.
//!
//! ```text
//!  timer ─► Provider::fetch ─► index ─► diff vs. previous ─► Frame
//!                                          │                  │
//!                                     StateStore         BroadcastHub ─► SSE / WS
//! ```

pub mod config;
pub mod error;
pub mod feed;
pub mod http;
pub mod source;
pub mod stats;
pub mod types;
