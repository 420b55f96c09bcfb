//! Library entry for skynet components used by the binary and tests.

pub mod chat;
pub mod config;
pub mod metrics;
pub mod storage;
