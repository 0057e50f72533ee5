//! `railviz-middleware` – stream plumbing between the sensor pipeline and
//! the renderer.
//!
//! Decodes the multiplexed WebSocket stream, reconciles it into one
//! current-frame view and carries control intents back upstream.
//!
//! # Modules
//!
//! - [`decoder`] – Channel Decoder: one inbound text frame → one typed
//!   [`StreamEvent`][railviz_types::StreamEvent].
//! - [`reconciler`] – [`Reconciler`]: last-write-wins (or opt-in strict,
//!   frame-gated) fold of events into a [`StreamState`] snapshot.
//! - [`emitter`] – [`CommandEmitter`]: fire-and-forget control intents,
//!   guarded by the channel's ready state.
//! - [`session`] – [`connect`]: WebSocket client actor that owns one
//!   reconciler per connection and publishes snapshots on a watch channel.

pub mod decoder;
pub mod emitter;
pub mod reconciler;
pub mod session;

pub use emitter::{CommandEmitter, ControlChannel, EmitOutcome};
pub use reconciler::{ConsistencyMode, Reconciler, ReconcilerStats, StreamState};
pub use session::{SessionConfig, SessionHandle, SessionSummary, connect};
