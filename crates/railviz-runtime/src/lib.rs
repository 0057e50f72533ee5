//! `railviz-runtime` – the client's execution layer.
//!
//! Sits on top of the session plumbing in `railviz-middleware` and the pure
//! hazard maths in `railviz-perception`.
//!
//! # Modules
//!
//! - [`viewer`] – [`Viewer`][viewer::Viewer]: waits on the session's
//!   snapshot channel, scores every detection and hands a
//!   [`FrameView`][viewer::FrameView] to a
//!   [`SnapshotConsumer`][viewer::SnapshotConsumer].
//!   [`LogConsumer`][viewer::LogConsumer] is the headless surface used by
//!   the CLI.
//! - [`telemetry`] – [`init_tracing`][telemetry::init_tracing]:
//!   initialises the global `tracing` subscriber with an optional OTLP span
//!   exporter.  Set `OTEL_EXPORTER_OTLP_ENDPOINT` to enable live trace export.

pub mod telemetry;
pub mod viewer;

pub use telemetry::{TracerProviderGuard, init_tracing};
pub use viewer::{FrameView, LogConsumer, ScoredDetection, SnapshotConsumer, Viewer, ViewerReport};
