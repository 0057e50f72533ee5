//! Frame Reconciler.
//!
//! Folds decoded [`StreamEvent`]s into a single [`StreamState`] and hands
//! out cheap immutable snapshots of it.
//!
//! # Consistency modes
//!
//! * [`ConsistencyMode::Weak`] (default) – every event overwrites the one
//!   field it targets, immediately.  A snapshot shows the freshest value of
//!   each category, so it may pair a point cloud from frame N-1 with images
//!   from frame N.
//!
//! * [`ConsistencyMode::Strict`] – payload events are staged in a pending
//!   batch.  The next `frame` event closes the batch for that index and the
//!   batch is committed only if every category in `required` reported in
//!   it; otherwise it is discarded and the published state keeps showing the
//!   last complete frame.
//!
//! # Example
//!
//! ```rust
//! use railviz_middleware::reconciler::Reconciler;
//! use railviz_types::StreamEvent;
//!
//! let mut rec = Reconciler::default();
//! rec.apply(StreamEvent::Frame(5));
//! rec.apply(StreamEvent::Frame(7));
//! assert_eq!(rec.snapshot().frame(), 7);
//! assert!(rec.snapshot().points().is_empty());
//! ```

use std::collections::HashSet;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use railviz_types::{
    Detection, FrameIndex, ImageChannel, ImageSlot, PointCloud, StreamCategory, StreamEvent,
};
use tracing::{debug, warn};
use uuid::Uuid;

// ────────────────────────────────────────────────────────────────────────────
// StreamState
// ────────────────────────────────────────────────────────────────────────────

/// Wall-clock receipt time of the value currently held for each category.
///
/// `None` means nothing has been received yet for that category on this
/// connection.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Receipts {
    pub points: Option<DateTime<Utc>>,
    pub detections: Option<DateTime<Utc>>,
    pub image1: Option<DateTime<Utc>>,
    pub image2: Option<DateTime<Utc>>,
    pub frame: Option<DateTime<Utc>>,
}

impl Receipts {
    pub fn get(&self, category: StreamCategory) -> Option<DateTime<Utc>> {
        match category {
            StreamCategory::Points => self.points,
            StreamCategory::Detections => self.detections,
            StreamCategory::Image1 => self.image1,
            StreamCategory::Image2 => self.image2,
            StreamCategory::Frame => self.frame,
        }
    }

    fn stamp(&mut self, category: StreamCategory, at: DateTime<Utc>) {
        let slot = match category {
            StreamCategory::Points => &mut self.points,
            StreamCategory::Detections => &mut self.detections,
            StreamCategory::Image1 => &mut self.image1,
            StreamCategory::Image2 => &mut self.image2,
            StreamCategory::Frame => &mut self.frame,
        };
        *slot = Some(at);
    }
}

/// The reconciled "current frame" view of one connection.
///
/// Cloning is cheap: the bulky payloads are reference counted, so a clone
/// is the immutable snapshot handed to consumers.
#[derive(Debug, Clone, PartialEq)]
pub struct StreamState {
    session_id: Uuid,
    points: Arc<PointCloud>,
    detections: Arc<Vec<Detection>>,
    image1: Option<Arc<ImageSlot>>,
    image2: Option<Arc<ImageSlot>>,
    frame: FrameIndex,
    received: Receipts,
}

impl StreamState {
    /// Empty state for a freshly opened connection.
    pub fn new(session_id: Uuid) -> Self {
        Self {
            session_id,
            points: Arc::new(PointCloud::default()),
            detections: Arc::new(Vec::new()),
            image1: None,
            image2: None,
            frame: 0,
            received: Receipts::default(),
        }
    }

    /// Identity of the connection this state belongs to.  A reconnect
    /// produces a new id.
    pub fn session_id(&self) -> Uuid {
        self.session_id
    }

    pub fn points(&self) -> &PointCloud {
        &self.points
    }

    pub fn detections(&self) -> &[Detection] {
        &self.detections
    }

    pub fn image1(&self) -> Option<&ImageSlot> {
        self.image1.as_deref()
    }

    pub fn image2(&self) -> Option<&ImageSlot> {
        self.image2.as_deref()
    }

    pub fn image(&self, channel: ImageChannel) -> Option<&ImageSlot> {
        match channel {
            ImageChannel::Image1 => self.image1(),
            ImageChannel::Image2 => self.image2(),
        }
    }

    pub fn frame(&self) -> FrameIndex {
        self.frame
    }

    pub fn received(&self) -> &Receipts {
        &self.received
    }

    /// `true` until the first value for `category` arrives; renderers show a
    /// placeholder meanwhile.
    pub fn is_loading(&self, category: StreamCategory) -> bool {
        self.received.get(category).is_none()
    }

    fn write(&mut self, category: StreamCategory, field: Field, at: DateTime<Utc>) {
        match field {
            Field::Points(points) => self.points = points,
            Field::Detections(dets) => self.detections = dets,
            Field::Image(ImageChannel::Image1, image) => self.image1 = Some(image),
            Field::Image(ImageChannel::Image2, image) => self.image2 = Some(image),
            Field::Frame(frame) => {
                if frame < self.frame {
                    warn!(
                        previous = self.frame,
                        received = frame,
                        "frame index moved backwards"
                    );
                }
                self.frame = frame;
            }
        }
        self.received.stamp(category, at);
    }
}

/// Shareable form of one event's payload.
#[derive(Debug, Clone)]
enum Field {
    Points(Arc<PointCloud>),
    Detections(Arc<Vec<Detection>>),
    Image(ImageChannel, Arc<ImageSlot>),
    Frame(FrameIndex),
}

impl From<StreamEvent> for Field {
    fn from(event: StreamEvent) -> Self {
        match event {
            StreamEvent::Points(points) => Field::Points(Arc::new(points)),
            StreamEvent::Detections(dets) => Field::Detections(Arc::new(dets)),
            StreamEvent::Image { channel, image } => Field::Image(channel, Arc::new(image)),
            StreamEvent::Frame(frame) => Field::Frame(frame),
        }
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Consistency
// ────────────────────────────────────────────────────────────────────────────

/// How strictly a snapshot must correspond to a single source frame.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum ConsistencyMode {
    /// Last-write-wins per field.
    #[default]
    Weak,
    /// Release a frame only when every category in `required` reported for it.
    Strict { required: HashSet<StreamCategory> },
}

impl ConsistencyMode {
    /// Strict mode requiring every payload category.
    pub fn strict_all() -> Self {
        ConsistencyMode::Strict {
            required: StreamCategory::PAYLOADS.into_iter().collect(),
        }
    }
}

/// Payloads staged for the frame that has not been announced yet.
#[derive(Debug, Default)]
struct PendingBatch {
    entries: Vec<(StreamCategory, Field, DateTime<Utc>)>,
}

impl PendingBatch {
    fn stage(&mut self, category: StreamCategory, field: Field, at: DateTime<Utc>) {
        self.entries.retain(|(c, _, _)| *c != category);
        self.entries.push((category, field, at));
    }

    fn missing(&self, required: &HashSet<StreamCategory>) -> Vec<StreamCategory> {
        let mut missing: Vec<_> = required
            .iter()
            .copied()
            .filter(|cat| *cat != StreamCategory::Frame)
            .filter(|cat| !self.entries.iter().any(|(c, _, _)| c == cat))
            .collect();
        missing.sort_by_key(|c| c.wire_name());
        missing
    }
}

/// Running counters kept by the reconciler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ReconcilerStats {
    /// Events handed to [`Reconciler::apply`].
    pub events: u64,
    /// Frames released in strict mode.
    pub committed_frames: u64,
    /// Incomplete frames dropped in strict mode.
    pub discarded_frames: u64,
}

// ────────────────────────────────────────────────────────────────────────────
// Reconciler
// ────────────────────────────────────────────────────────────────────────────

/// Exclusive owner and sole writer of one connection's [`StreamState`].
#[derive(Debug)]
pub struct Reconciler {
    state: StreamState,
    mode: ConsistencyMode,
    pending: PendingBatch,
    stats: ReconcilerStats,
}

impl Default for Reconciler {
    fn default() -> Self {
        Self::new(Uuid::new_v4(), ConsistencyMode::Weak)
    }
}

impl Reconciler {
    pub fn new(session_id: Uuid, mode: ConsistencyMode) -> Self {
        Self {
            state: StreamState::new(session_id),
            mode,
            pending: PendingBatch::default(),
            stats: ReconcilerStats::default(),
        }
    }

    pub fn mode(&self) -> &ConsistencyMode {
        &self.mode
    }

    pub fn stats(&self) -> ReconcilerStats {
        self.stats
    }

    /// Fold one event into the state.
    ///
    /// Returns `true` when the published view changed, i.e. a fresh
    /// [`snapshot`](Self::snapshot) is worth distributing.  Never fails.
    pub fn apply(&mut self, event: StreamEvent) -> bool {
        self.stats.events += 1;
        let category = event.category();
        let now = Utc::now();

        let ConsistencyMode::Strict { required } = &self.mode else {
            self.state.write(category, event.into(), now);
            return true;
        };

        match event {
            StreamEvent::Frame(frame) => {
                let missing = self.pending.missing(required);
                let batch = std::mem::take(&mut self.pending);
                if !missing.is_empty() {
                    self.stats.discarded_frames += 1;
                    debug!(frame, ?missing, "discarding incomplete frame");
                    return false;
                }
                for (cat, field, at) in batch.entries {
                    self.state.write(cat, field, at);
                }
                self.state.write(category, Field::Frame(frame), now);
                self.stats.committed_frames += 1;
                true
            }
            payload => {
                self.pending.stage(category, payload.into(), now);
                false
            }
        }
    }

    /// Immutable view of the current state.  Never waits for categories to
    /// catch up with each other.
    pub fn snapshot(&self) -> StreamState {
        self.state.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decoder;
    use railviz_types::{Point3, Velocity3};

    fn cloud(n: usize) -> StreamEvent {
        StreamEvent::Points(PointCloud::new(
            (0..n).map(|i| Point3::new(i as f32, 0.0, 0.0)).collect(),
        ))
    }

    fn detections(n: usize) -> StreamEvent {
        StreamEvent::Detections(
            (0..n)
                .map(|i| Detection {
                    id: Some(i as u64),
                    position: Point3::new(0.0, 0.0, i as f32),
                    velocity: Velocity3::default(),
                })
                .collect(),
        )
    }

    fn image(channel: ImageChannel, data: &str) -> StreamEvent {
        StreamEvent::Image {
            channel,
            image: ImageSlot::new(data),
        }
    }

    // ── Weak mode ───────────────────────────────────────────────────────────

    #[test]
    fn fresh_state_is_loading_everything() {
        let rec = Reconciler::default();
        let snap = rec.snapshot();
        assert_eq!(snap.frame(), 0);
        assert!(snap.points().is_empty());
        assert!(snap.detections().is_empty());
        assert!(snap.image1().is_none());
        for cat in StreamCategory::PAYLOADS {
            assert!(snap.is_loading(cat));
        }
    }

    #[test]
    fn frame_point_detections_all_land() {
        let mut rec = Reconciler::default();
        rec.apply(StreamEvent::Frame(3));
        rec.apply(image(ImageChannel::Image1, "a"));
        rec.apply(cloud(4));
        rec.apply(image(ImageChannel::Image2, "b"));
        rec.apply(detections(2));

        let snap = rec.snapshot();
        assert_eq!(snap.frame(), 3);
        assert_eq!(snap.points().len(), 4);
        assert_eq!(snap.detections().len(), 2);
        assert_eq!(snap.image1().unwrap().encoded(), "a");
        assert_eq!(snap.image2().unwrap().encoded(), "b");
        assert!(!snap.is_loading(StreamCategory::Points));
    }

    #[test]
    fn consecutive_frames_leave_points_untouched() {
        let mut rec = Reconciler::default();
        rec.apply(cloud(10));
        let before = rec.snapshot();

        rec.apply(StreamEvent::Frame(5));
        rec.apply(StreamEvent::Frame(7));

        let after = rec.snapshot();
        assert_eq!(after.frame(), 7);
        assert_eq!(after.points(), before.points());
        assert_eq!(after.received().points, before.received().points);
    }

    #[test]
    fn last_write_wins_per_field() {
        let mut rec = Reconciler::default();
        rec.apply(cloud(3));
        rec.apply(cloud(1));
        rec.apply(image(ImageChannel::Image1, "old"));
        rec.apply(image(ImageChannel::Image1, "new"));
        let snap = rec.snapshot();
        assert_eq!(snap.points().len(), 1);
        assert_eq!(snap.image1().unwrap().encoded(), "new");
        assert!(snap.image2().is_none());
    }

    #[test]
    fn backwards_frame_is_still_applied() {
        let mut rec = Reconciler::default();
        rec.apply(StreamEvent::Frame(9));
        rec.apply(StreamEvent::Frame(4));
        assert_eq!(rec.snapshot().frame(), 4);
    }

    #[test]
    fn unknown_message_leaves_state_identical() {
        let mut rec = Reconciler::default();
        for msg in [
            r#"{"type":"point","data":[{"x":1,"y":2,"z":3}]}"#,
            r#"{"type":"image1","data":"aGk="}"#,
            r#"{"type":"frame","frame":2}"#,
        ] {
            rec.apply(decoder::decode(msg).unwrap());
        }
        let before = rec.snapshot();

        for msg in [
            r#"{"type":"radar","data":[1,2]}"#,
            r#"{"type":"point","data":[{"x":"bad","y":0,"z":0}]}"#,
            "garbage",
        ] {
            if let Some(event) = decoder::decode_or_report(msg) {
                rec.apply(event);
            }
        }

        assert_eq!(rec.snapshot(), before);
    }

    #[test]
    fn snapshot_is_isolated_from_later_writes() {
        let mut rec = Reconciler::default();
        rec.apply(cloud(2));
        let snap = rec.snapshot();
        rec.apply(cloud(5));
        assert_eq!(snap.points().len(), 2);
        assert_eq!(rec.snapshot().points().len(), 5);
    }

    #[test]
    fn weak_apply_always_reports_change() {
        let mut rec = Reconciler::default();
        assert!(rec.apply(cloud(1)));
        assert!(rec.apply(StreamEvent::Frame(1)));
        assert_eq!(rec.stats().events, 2);
    }

    // ── Strict mode ─────────────────────────────────────────────────────────

    #[test]
    fn strict_commits_complete_frame() {
        let mut rec = Reconciler::new(Uuid::new_v4(), ConsistencyMode::strict_all());
        assert!(!rec.apply(cloud(3)));
        assert!(!rec.apply(detections(1)));
        assert!(!rec.apply(image(ImageChannel::Image1, "a")));
        assert!(!rec.apply(image(ImageChannel::Image2, "b")));
        // Nothing published before the frame marker.
        assert!(rec.snapshot().points().is_empty());

        assert!(rec.apply(StreamEvent::Frame(1)));
        let snap = rec.snapshot();
        assert_eq!(snap.frame(), 1);
        assert_eq!(snap.points().len(), 3);
        assert_eq!(snap.detections().len(), 1);
        assert_eq!(rec.stats().committed_frames, 1);
    }

    #[test]
    fn strict_discards_incomplete_frame() {
        let mut rec = Reconciler::new(Uuid::new_v4(), ConsistencyMode::strict_all());
        for event in [
            cloud(3),
            detections(1),
            image(ImageChannel::Image1, "a"),
            image(ImageChannel::Image2, "b"),
            StreamEvent::Frame(1),
        ] {
            rec.apply(event);
        }
        let committed = rec.snapshot();

        // Frame 2 lacks image2.
        rec.apply(cloud(8));
        rec.apply(detections(4));
        rec.apply(image(ImageChannel::Image1, "c"));
        assert!(!rec.apply(StreamEvent::Frame(2)));

        assert_eq!(rec.snapshot(), committed);
        assert_eq!(rec.stats().discarded_frames, 1);

        // The discarded batch does not leak into the next frame.
        rec.apply(image(ImageChannel::Image2, "d"));
        assert!(!rec.apply(StreamEvent::Frame(3)));
        assert_eq!(rec.snapshot().frame(), 1);
    }

    #[test]
    fn strict_with_subset_ignores_optional_categories() {
        let required = [StreamCategory::Points, StreamCategory::Detections]
            .into_iter()
            .collect();
        let mut rec = Reconciler::new(Uuid::new_v4(), ConsistencyMode::Strict { required });
        rec.apply(cloud(2));
        rec.apply(detections(3));
        assert!(rec.apply(StreamEvent::Frame(10)));

        let snap = rec.snapshot();
        assert_eq!(snap.frame(), 10);
        assert!(snap.image1().is_none());
        assert!(snap.is_loading(StreamCategory::Image1));

        // Optional categories ride along when present.
        rec.apply(cloud(1));
        rec.apply(detections(1));
        rec.apply(image(ImageChannel::Image2, "x"));
        assert!(rec.apply(StreamEvent::Frame(11)));
        assert_eq!(rec.snapshot().image2().unwrap().encoded(), "x");
    }

    #[test]
    fn strict_restaged_category_keeps_latest() {
        let required = [StreamCategory::Points].into_iter().collect();
        let mut rec = Reconciler::new(Uuid::new_v4(), ConsistencyMode::Strict { required });
        rec.apply(cloud(2));
        rec.apply(cloud(6));
        rec.apply(StreamEvent::Frame(1));
        assert_eq!(rec.snapshot().points().len(), 6);
    }

    #[test]
    fn strict_empty_required_commits_every_frame() {
        let mut rec = Reconciler::new(
            Uuid::new_v4(),
            ConsistencyMode::Strict {
                required: HashSet::new(),
            },
        );
        assert!(rec.apply(StreamEvent::Frame(1)));
        assert!(rec.apply(StreamEvent::Frame(2)));
        assert_eq!(rec.snapshot().frame(), 2);
    }
}
