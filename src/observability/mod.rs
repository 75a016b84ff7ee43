//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! All subsystems produce:
//!     → logging.rs (structured log events via tracing)
//!     → metrics.rs (counters, gauges, histograms via metrics facade)
//!
//! Consumers:
//!     → Log output (stdout, filtered by RUST_LOG)
//!     → Metrics endpoint (Prometheus scrape, demo binary only)
//! ```
//!
//! # Design Decisions
//! - Request ID and round ID flow through log fields
//! - Metrics are cheap (atomic increments)

pub mod logging;
pub mod metrics;
