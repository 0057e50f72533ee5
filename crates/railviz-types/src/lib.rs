//! `railviz-types` – shared vocabulary of the railviz stream client.
//!
//! Everything that crosses a crate boundary lives here: the wire payloads
//! (points, detections, image slots, frame counters), the typed
//! [`StreamEvent`] produced by the decoder, the outbound [`ControlIntent`],
//! and the two error enums.

use std::fmt;

use base64::{Engine, engine::general_purpose::STANDARD as BASE64};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// MIME header prepended to an image payload before display.
pub const IMAGE_DATA_URL_PREFIX: &str = "data:image/png;base64,";

/// Authoritative "current frame" counter.
pub type FrameIndex = u64;

// ────────────────────────────────────────────────────────────────────────────
// Geometry payloads
// ────────────────────────────────────────────────────────────────────────────

/// One sampled surface point, in the sensor's coordinate frame.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Point3 {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

impl Point3 {
    pub fn new(x: f32, y: f32, z: f32) -> Self {
        Self { x, y, z }
    }
}

/// Velocity of a detection at the moment it was reported.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Velocity3 {
    pub vx: f32,
    pub vy: f32,
    pub vz: f32,
}

impl Velocity3 {
    pub fn new(vx: f32, vy: f32, vz: f32) -> Self {
        Self { vx, vy, vz }
    }
}

/// Point cloud for a single frame.  Replaced wholesale on every `point`
/// message; there is no incremental delta.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PointCloud(pub Vec<Point3>);

impl PointCloud {
    pub fn new(points: Vec<Point3>) -> Self {
        Self(points)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn points(&self) -> &[Point3] {
        &self.0
    }

    /// Interleaved `[x0, y0, z0, x1, ...]` buffer ready for a GPU vertex
    /// upload (stride 3).
    ///
    /// Returns `None` for an empty cloud: the renderer should draw nothing
    /// rather than an empty primitive.
    pub fn flat_positions(&self) -> Option<Vec<f32>> {
        if self.0.is_empty() {
            return None;
        }
        Some(self.0.iter().flat_map(|p| [p.x, p.y, p.z]).collect())
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Detections
// ────────────────────────────────────────────────────────────────────────────

/// A sensed object with 3-D position and velocity.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Detection {
    /// Tracker-assigned identity.  Absent when the producer has no tracker
    /// state for the object.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<u64>,
    pub position: Point3,
    pub velocity: Velocity3,
}

impl Detection {
    /// Identity of the detection at `index` within its frame's list.
    ///
    /// Falls back to [`DetectionKey::Index`] when no `id` was reported.
    /// Index keys are only meaningful inside the frame they came from and
    /// must not be used to correlate detections across frames.
    pub fn key(&self, index: usize) -> DetectionKey {
        match self.id {
            Some(id) => DetectionKey::Id(id),
            None => DetectionKey::Index(index),
        }
    }
}

/// Identity of a detection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DetectionKey {
    /// Stable tracker id, valid across frames.
    Id(u64),
    /// Position within the current detections list; frame-scoped.
    Index(usize),
}

impl DetectionKey {
    pub fn is_stable(&self) -> bool {
        matches!(self, DetectionKey::Id(_))
    }
}

impl fmt::Display for DetectionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DetectionKey::Id(id) => write!(f, "{id}"),
            DetectionKey::Index(idx) => write!(f, "{idx}"),
        }
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Images
// ────────────────────────────────────────────────────────────────────────────

/// Which of the two auxiliary camera slots an image belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ImageChannel {
    Image1,
    Image2,
}

/// Opaque base64-encoded image payload as received on the wire.
///
/// The payload is not validated on receipt; [`ImageSlot::decode`] does that
/// on demand.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ImageSlot(String);

impl ImageSlot {
    pub fn new(encoded: impl Into<String>) -> Self {
        Self(encoded.into())
    }

    pub fn encoded(&self) -> &str {
        &self.0
    }

    /// `data:` URL suitable for an `<img src>` or texture loader.
    pub fn data_url(&self) -> String {
        format!("{IMAGE_DATA_URL_PREFIX}{}", self.0)
    }

    /// Decode the base64 payload into raw image bytes.
    pub fn decode(&self) -> Result<Vec<u8>, DecodeError> {
        BASE64
            .decode(self.0.as_bytes())
            .map_err(|e| DecodeError::InvalidImage(e.to_string()))
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Events
// ────────────────────────────────────────────────────────────────────────────

/// The message categories carried by the stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StreamCategory {
    #[serde(rename = "point")]
    Points,
    Detections,
    Image1,
    Image2,
    Frame,
}

impl StreamCategory {
    /// Every payload category, excluding the frame marker itself.
    pub const PAYLOADS: [StreamCategory; 4] = [
        StreamCategory::Points,
        StreamCategory::Detections,
        StreamCategory::Image1,
        StreamCategory::Image2,
    ];

    /// The `type` tag used on the wire.
    pub fn wire_name(&self) -> &'static str {
        match self {
            StreamCategory::Points => "point",
            StreamCategory::Detections => "detections",
            StreamCategory::Image1 => "image1",
            StreamCategory::Image2 => "image2",
            StreamCategory::Frame => "frame",
        }
    }
}

impl fmt::Display for StreamCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.wire_name())
    }
}

impl From<ImageChannel> for StreamCategory {
    fn from(channel: ImageChannel) -> Self {
        match channel {
            ImageChannel::Image1 => StreamCategory::Image1,
            ImageChannel::Image2 => StreamCategory::Image2,
        }
    }
}

/// A decoded inbound message.  Each variant targets exactly one field of
/// the stream state.
#[derive(Debug, Clone, PartialEq)]
pub enum StreamEvent {
    Points(PointCloud),
    Detections(Vec<Detection>),
    Image { channel: ImageChannel, image: ImageSlot },
    Frame(FrameIndex),
}

impl StreamEvent {
    pub fn category(&self) -> StreamCategory {
        match self {
            StreamEvent::Points(_) => StreamCategory::Points,
            StreamEvent::Detections(_) => StreamCategory::Detections,
            StreamEvent::Image { channel, .. } => (*channel).into(),
            StreamEvent::Frame(_) => StreamCategory::Frame,
        }
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Outbound control
// ────────────────────────────────────────────────────────────────────────────

/// Discrete local user intents that map onto an outbound control message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlIntent {
    /// Pause or resume the producer's playback.
    TogglePlayback,
}

impl ControlIntent {
    /// Literal text frame sent for this intent.
    pub fn wire_token(&self) -> &'static str {
        match self {
            ControlIntent::TogglePlayback => "toggle_pause",
        }
    }
}

/// Ready state of the stream channel, mirroring the WebSocket readyState.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ChannelStatus {
    Connecting = 0,
    Open = 1,
    Closing = 2,
    Closed = 3,
}

impl ChannelStatus {
    pub fn from_u8(raw: u8) -> Self {
        match raw {
            0 => ChannelStatus::Connecting,
            1 => ChannelStatus::Open,
            2 => ChannelStatus::Closing,
            _ => ChannelStatus::Closed,
        }
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Errors
// ────────────────────────────────────────────────────────────────────────────

/// Failure to turn one inbound message into a [`StreamEvent`].
///
/// Always scoped to a single message; the caller logs it and moves on.
#[derive(Error, Debug)]
pub enum DecodeError {
    #[error("message is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("message is not a JSON object")]
    NotAnObject,

    #[error("message has no string `type` field")]
    MissingType,

    #[error("unrecognized message type `{0}`")]
    UnknownType(String),

    #[error("`{kind}` message is missing field `{field}`")]
    MissingField {
        kind: &'static str,
        field: &'static str,
    },

    #[error("`{kind}` message has a malformed payload: {details}")]
    Malformed { kind: &'static str, details: String },

    #[error("image payload is not valid base64: {0}")]
    InvalidImage(String),
}

/// Error type spanning transport failures, configuration problems and
/// consumer faults.
#[derive(Error, Debug)]
pub enum StreamError {
    #[error("Transport Error: {0}")]
    Transport(String),

    #[error("Channel Closed")]
    ChannelClosed,

    #[error("Invalid Configuration: {0}")]
    InvalidConfig(String),

    #[error("Consumer Error: {0}")]
    Consumer(String),

    #[error("Decode Error: {0}")]
    Decode(#[from] DecodeError),
}
