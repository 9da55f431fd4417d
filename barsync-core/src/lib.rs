//! Barsync Core — bar data types, providers, storage and quality checks.
//!
//! This crate holds everything that touches bars directly:
//! - Domain types (bars, intervals, series specs)
//! - The `DataProvider` seam with TradingView and Yahoo implementations
//! - CSV bar files, timestamp-keyed merging, monthly partitioning
//! - The quality checker and its plain-text report format
//!
//! Orchestration (configuration, run logs, the fetch and check jobs) lives
//! in `barsync-runner`.

pub mod data;
pub mod domain;
pub mod quality;
