//! Core domain types shared by every handler: the vector clock, the wire
//! codec, identifiers, configuration, and the bookkeeping structures
//! (send history, hold-back queue) the causal-order layer needs.

pub mod config;
pub mod error;
pub mod history;
pub mod holdback;
pub mod identifier;
pub mod packet;
pub mod vector;
