//! chunkdrive - file service over the chunkstore engine
//!
//! This library provides:
//! - `http`: axum router translating requests into store calls
//! - `serve`: server lifecycle (bind, graceful shutdown)
//! - `commands`: local CLI operations against a storage directory
//! - `logging`: tracing subscriber setup

pub mod commands;
pub mod http;
pub mod logging;
pub mod serve;
