//! # restic Exporter
//!
//! A Prometheus metrics exporter for restic backup repositories.
//!
//! ## Overview
//!
//! On a fixed interval the exporter runs read-only restic sub-commands
//! against one repository, normalizes their output and publishes a gauge
//! snapshot covering:
//!
//! - Repository integrity (`restic check`) and lock count
//! - Repository size, blob count and compression ratio
//! - Per-backup-group timestamp, snapshot count, file and size totals
//! - The local restic version
//!
//! ## Quick Start
//!
//! ```no_run
//! use restic_exporter::{
//!     client::ResticClient, collector::Collector, config::Settings,
//!     scheduler::Scheduler, server::start_server,
//! };
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let settings = Settings::load(Some("config/default.toml"))?;
//!
//!     let client = ResticClient::from_config(&settings.restic)?;
//!     let collector = Collector::from_config(client, &settings.collector);
//!     let scheduler = Scheduler::new(
//!         collector,
//!         Arc::default(),
//!         settings.collector.refresh_interval(),
//!         settings.collector.exit_on_error,
//!     );
//!
//!     let published = scheduler.published();
//!     tokio::spawn(async move { scheduler.run(std::future::pending()).await });
//!     start_server(&settings.exporter.listen_address, published).await?;
//!
//!     Ok(())
//! }
//! ```
//!
//! ## Configuration
//!
//! The exporter can be configured via:
//! - TOML configuration file
//! - Environment variables (with `RESTIC_EXPORTER__` prefix)
//! - restic's own `RESTIC_REPOSITORY` / `RESTIC_PASSWORD*` variables
//!
//! See [`config::Settings`] for details.
//!
//! ## Modules
//!
//! - [`client`] - restic sub-commands used by the exporter
//! - [`collector`] - One collection cycle
//! - [`config`] - Configuration management
//! - [`error`] - Error types and handling
//! - [`identity`] - Stable client and backup-group hashes
//! - [`metrics`] - Metric set, aggregation and Prometheus encoding
//! - [`model`] - Normalized records
//! - [`parse`] - restic JSON output parsers
//! - [`runner`] - Subprocess execution
//! - [`scheduler`] - Collection interval and published metric set
//! - [`server`] - HTTP server for exposing metrics
//! - [`version`] - restic version parsing and probing

pub mod client;
pub mod collector;
pub mod config;
pub mod error;
pub mod identity;
pub mod metrics;
pub mod model;
pub mod parse;
pub mod runner;
pub mod scheduler;
pub mod server;
pub mod version;

pub use error::{ExporterError, Result};
