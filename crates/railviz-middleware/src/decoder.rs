//! Channel Decoder.
//!
//! Parses one inbound text frame into exactly one [`StreamEvent`].
//!
//! Every message is a JSON object tagged by a `type` field:
//!
//! | `type` | payload field | event |
//! |---|---|---|
//! | `point` | `data`: list of `{x, y, z}` | [`StreamEvent::Points`] |
//! | `detections` | `data`: list of `{id?, position, velocity}` | [`StreamEvent::Detections`] |
//! | `image1` / `image2` | `data`: base64 text | [`StreamEvent::Image`] |
//! | `frame` | `frame`: non-negative integer | [`StreamEvent::Frame`] |
//!
//! A failure only ever affects the message being decoded.

use railviz_types::{
    DecodeError, Detection, FrameIndex, ImageChannel, ImageSlot, Point3, PointCloud, StreamEvent,
};
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use tracing::warn;

/// Decode one raw text frame.
pub fn decode(text: &str) -> Result<StreamEvent, DecodeError> {
    let value: Value = serde_json::from_str(text)?;
    decode_value(value)
}

/// Decode an already-parsed JSON message.
pub fn decode_value(value: Value) -> Result<StreamEvent, DecodeError> {
    let Value::Object(mut obj) = value else {
        return Err(DecodeError::NotAnObject);
    };

    let kind = match obj.get("type") {
        Some(Value::String(kind)) => kind.clone(),
        _ => return Err(DecodeError::MissingType),
    };

    match kind.as_str() {
        "point" => {
            let points: Vec<Point3> = payload(&mut obj, "point", "data")?;
            Ok(StreamEvent::Points(PointCloud::new(points)))
        }
        "detections" => {
            let detections: Vec<Detection> = payload(&mut obj, "detections", "data")?;
            Ok(StreamEvent::Detections(detections))
        }
        "image1" => decode_image(&mut obj, "image1", ImageChannel::Image1),
        "image2" => decode_image(&mut obj, "image2", ImageChannel::Image2),
        "frame" => {
            let frame: FrameIndex = payload(&mut obj, "frame", "frame")?;
            Ok(StreamEvent::Frame(frame))
        }
        _ => Err(DecodeError::UnknownType(kind)),
    }
}

/// Decode `text`, reporting any failure through `tracing` and swallowing it.
///
/// Unknown message types are expected when the producer is newer than this
/// client and are reported at `warn`; malformed payloads are reported at
/// `warn` with the decode error attached.
pub fn decode_or_report(text: &str) -> Option<StreamEvent> {
    match decode(text) {
        Ok(event) => Some(event),
        Err(DecodeError::UnknownType(kind)) => {
            warn!(kind = %kind, "ignoring unrecognized stream message");
            None
        }
        Err(e) => {
            warn!(error = %e, bytes = text.len(), "dropping malformed stream message");
            None
        }
    }
}

fn decode_image(
    obj: &mut Map<String, Value>,
    kind: &'static str,
    channel: ImageChannel,
) -> Result<StreamEvent, DecodeError> {
    let encoded: String = payload(obj, kind, "data")?;
    Ok(StreamEvent::Image {
        channel,
        image: ImageSlot::new(encoded),
    })
}

fn payload<T: DeserializeOwned>(
    obj: &mut Map<String, Value>,
    kind: &'static str,
    field: &'static str,
) -> Result<T, DecodeError> {
    let raw = obj
        .remove(field)
        .ok_or(DecodeError::MissingField { kind, field })?;
    serde_json::from_value(raw).map_err(|e| DecodeError::Malformed {
        kind,
        details: e.to_string(),
    })
}
