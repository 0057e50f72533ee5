//! Viewer loop: published snapshots → scored frame views → consumer.
//!
//! The session actor publishes a fresh [`StreamState`] on a `watch` channel
//! every time the reconciled view changes.  [`Viewer::run`] waits on that
//! channel, scores every detection of the latest snapshot with a
//! [`HazardScorer`] and hands the resulting [`FrameView`] to a
//! [`SnapshotConsumer`].
//!
//! Intermediate snapshots may be skipped when the consumer is slower than
//! the stream; the consumer always sees the most recent state.

use async_trait::async_trait;
use railviz_middleware::StreamState;
use railviz_perception::{HazardScore, HazardScorer};
use railviz_types::{
    Detection, DetectionKey, FrameIndex, ImageChannel, StreamCategory, StreamError,
};
use tokio::sync::watch;
use tracing::{debug, info, warn};

// ────────────────────────────────────────────────────────────────────────────
// FrameView
// ────────────────────────────────────────────────────────────────────────────

/// One detection together with its hazard signal.
#[derive(Debug, Clone, PartialEq)]
pub struct ScoredDetection {
    /// Stable id, or the list index (valid for this frame only).
    pub key: DetectionKey,
    pub detection: Detection,
    pub hazard: HazardScore,
}

impl ScoredDetection {
    /// Overlay text drawn next to the detection.
    pub fn label(&self) -> String {
        format!("ID: {}", self.key)
    }
}

/// Everything a rendering surface needs for one redraw.
#[derive(Debug, Clone, PartialEq)]
pub struct FrameView {
    pub snapshot: StreamState,
    pub detections: Vec<ScoredDetection>,
}

impl FrameView {
    /// Score every detection of `snapshot`.
    pub fn build(snapshot: StreamState, scorer: &HazardScorer) -> Self {
        let detections = snapshot
            .detections()
            .iter()
            .enumerate()
            .map(|(index, detection)| ScoredDetection {
                key: detection.key(index),
                detection: *detection,
                hazard: scorer.score(detection),
            })
            .collect();
        Self {
            snapshot,
            detections,
        }
    }

    pub fn frame(&self) -> FrameIndex {
        self.snapshot.frame()
    }

    pub fn find(&self, key: DetectionKey) -> Option<&ScoredDetection> {
        self.detections.iter().find(|d| d.key == key)
    }

    /// The detection with the highest danger, if any.
    pub fn most_dangerous(&self) -> Option<&ScoredDetection> {
        self.detections
            .iter()
            .max_by(|a, b| a.hazard.danger.total_cmp(&b.hazard.danger))
    }

    /// `data:` URL for an image slot, or `None` while it is still loading.
    pub fn image_url(&self, channel: ImageChannel) -> Option<String> {
        self.snapshot.image(channel).map(|image| image.data_url())
    }

    /// Payload categories that have not been received yet this session.
    pub fn loading(&self) -> Vec<StreamCategory> {
        StreamCategory::PAYLOADS
            .into_iter()
            .filter(|c| self.snapshot.is_loading(*c))
            .collect()
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Consumer contract
// ────────────────────────────────────────────────────────────────────────────

/// A rendering surface.
///
/// `present` is called once per observed snapshot change.  An error is
/// logged by the viewer and does not stop the loop.
#[async_trait]
pub trait SnapshotConsumer: Send {
    async fn present(&mut self, view: &FrameView) -> Result<(), StreamError>;
}

/// Headless consumer that logs a one-line summary per frame.
#[derive(Debug, Default)]
pub struct LogConsumer {
    last_frame: Option<FrameIndex>,
}

#[async_trait]
impl SnapshotConsumer for LogConsumer {
    async fn present(&mut self, view: &FrameView) -> Result<(), StreamError> {
        let hottest = view.most_dangerous();
        if self.last_frame != Some(view.frame()) {
            info!(
                frame = view.frame(),
                points = view.snapshot.points().len(),
                detections = view.detections.len(),
                hottest = ?hottest.map(|d| d.label()),
                danger = ?hottest.map(|d| d.hazard.danger),
                loading = ?view.loading(),
                "frame"
            );
        } else {
            debug!(
                frame = view.frame(),
                points = view.snapshot.points().len(),
                detections = view.detections.len(),
                "frame updated"
            );
        }
        self.last_frame = Some(view.frame());
        Ok(())
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Viewer
// ────────────────────────────────────────────────────────────────────────────

/// Counters returned when the viewer loop ends.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ViewerReport {
    pub presented: u64,
    pub consumer_errors: u64,
}

pub struct Viewer<C> {
    scorer: HazardScorer,
    consumer: C,
}

impl<C: SnapshotConsumer> Viewer<C> {
    pub fn new(scorer: HazardScorer, consumer: C) -> Self {
        Self { scorer, consumer }
    }

    pub fn consumer(&self) -> &C {
        &self.consumer
    }

    /// Present the current snapshot, then every change until the publisher
    /// goes away.
    pub async fn run(&mut self, mut snapshots: watch::Receiver<StreamState>) -> ViewerReport {
        let mut report = ViewerReport::default();
        loop {
            let snapshot = snapshots.borrow_and_update().clone();
            let view = FrameView::build(snapshot, &self.scorer);
            match self.consumer.present(&view).await {
                Ok(()) => report.presented += 1,
                Err(e) => {
                    report.consumer_errors += 1;
                    warn!(frame = view.frame(), error = %e, "consumer rejected frame");
                }
            }

            if snapshots.changed().await.is_err() {
                debug!(?report, "snapshot publisher closed; viewer stopping");
                return report;
            }
        }
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Tests
// ────────────────────────────────────────────────────────────────────────────
