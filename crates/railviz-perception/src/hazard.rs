//! Proximity Hazard Scorer.
//!
//! Turns a single [`Detection`] into the renderable hazard signal: a
//! normalized danger score, a colour, the fill level of a fixed-height
//! indicator, and a velocity arrow.
//!
//! Danger is a piecewise-linear function of the distance from the observer
//! (the coordinate origin) with two inclusive breakpoints:
//!
//! ```text
//!            1.0                              d <= near
//! danger =   1 − (d − near) / (far − near)    near < d < far
//!            0.0                              d >= far
//! ```
//!
//! The colour hue is interpolated linearly between a *hot* hue (danger 1)
//! and a *cool* hue (danger 0) at fixed saturation and lightness.
//!
//! # Example
//!
//! ```rust
//! use railviz_perception::hazard::HazardScorer;
//! use railviz_types::{Detection, Point3, Velocity3};
//!
//! let scorer = HazardScorer::default();
//! let det = Detection {
//!     id: Some(1),
//!     position: Point3::new(0.0, 0.0, 3.0),
//!     velocity: Velocity3::new(1.0, 0.0, 0.0),
//! };
//!
//! let score = scorer.score(&det);
//! assert_eq!(score.danger, 1.0);
//! assert_eq!(score.arrow_length, 1.0);
//! ```

use railviz_types::{Detection, StreamError};
use serde::{Deserialize, Serialize};

use crate::vector::{Quaternion, Vec3};

/// Distance at or below which danger saturates at 1.0.
pub const DEFAULT_NEAR: f32 = 3.0;
/// Distance at or beyond which danger drops to 0.0.
pub const DEFAULT_FAR: f32 = 10.0;
/// Arrow direction used when the reported velocity is zero.
pub const DEFAULT_ARROW_DIRECTION: Vec3 = Vec3 { x: 1.0, y: 0.0, z: 0.0 };
/// Axis the arrow geometry is modelled along before orientation.
pub const ARROW_MODEL_AXIS: Vec3 = Vec3 { x: 0.0, y: 1.0, z: 0.0 };
pub const ARROW_HEAD_LENGTH: f32 = 0.3;
pub const ARROW_HEAD_WIDTH: f32 = 0.15;

// ────────────────────────────────────────────────────────────────────────────
// Configuration
// ────────────────────────────────────────────────────────────────────────────

/// How a detection's speed maps onto the drawn arrow length.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "lowercase")]
pub enum ArrowLengthPolicy {
    /// `length = clamp(speed, min, max)`.
    Clamped { min: f32, max: f32 },
    /// `length = speed`.
    Unclamped,
}

impl Default for ArrowLengthPolicy {
    fn default() -> Self {
        ArrowLengthPolicy::Clamped { min: 0.5, max: 1.0 }
    }
}

/// Tunables of the [`HazardScorer`].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HazardConfig {
    pub near: f32,
    pub far: f32,
    pub arrow_length: ArrowLengthPolicy,
    /// Full height of the danger indicator bar.
    pub indicator_height: f32,
    /// Hue (in turns, `[0, 1]`) shown at danger 1.0.
    pub hot_hue: f32,
    /// Hue (in turns, `[0, 1]`) shown at danger 0.0.
    pub cool_hue: f32,
    pub saturation: f32,
    pub lightness: f32,
}

impl Default for HazardConfig {
    fn default() -> Self {
        Self {
            near: DEFAULT_NEAR,
            far: DEFAULT_FAR,
            arrow_length: ArrowLengthPolicy::default(),
            indicator_height: 1.0,
            hot_hue: 0.0,
            cool_hue: 0.33,
            saturation: 1.0,
            lightness: 0.5,
        }
    }
}

impl HazardConfig {
    /// Reject thresholds the piecewise mapping cannot honour.
    pub fn validate(&self) -> Result<(), StreamError> {
        let invalid = |msg: String| Err(StreamError::InvalidConfig(msg));

        if !self.near.is_finite() || !self.far.is_finite() || self.near < 0.0 {
            return invalid(format!(
                "hazard thresholds must be finite and non-negative (near={}, far={})",
                self.near, self.far
            ));
        }
        if self.far <= self.near {
            return invalid(format!(
                "hazard far threshold ({}) must exceed near threshold ({})",
                self.far, self.near
            ));
        }
        if let ArrowLengthPolicy::Clamped { min, max } = self.arrow_length
            && (!(min >= 0.0) || !(max >= min) || !max.is_finite())
        {
            return invalid(format!("arrow length clamp [{min}, {max}] is not a valid range"));
        }
        if !(self.indicator_height > 0.0) || !self.indicator_height.is_finite() {
            return invalid(format!(
                "indicator height must be positive, got {}",
                self.indicator_height
            ));
        }
        Ok(())
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Colour
// ────────────────────────────────────────────────────────────────────────────

/// Hue / saturation / lightness, every channel in `[0, 1]`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Hsl {
    pub h: f32,
    pub s: f32,
    pub l: f32,
}

/// Linear RGB, every channel in `[0, 1]`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Rgb {
    pub r: f32,
    pub g: f32,
    pub b: f32,
}

impl Hsl {
    pub fn to_rgb(self) -> Rgb {
        let h = self.h.rem_euclid(1.0);
        let s = self.s.clamp(0.0, 1.0);
        let l = self.l.clamp(0.0, 1.0);

        if s == 0.0 {
            return Rgb { r: l, g: l, b: l };
        }
        let q = if l <= 0.5 { l * (1.0 + s) } else { l + s - l * s };
        let p = 2.0 * l - q;
        Rgb {
            r: hue_to_channel(p, q, h + 1.0 / 3.0),
            g: hue_to_channel(p, q, h),
            b: hue_to_channel(p, q, h - 1.0 / 3.0),
        }
    }
}

fn hue_to_channel(p: f32, q: f32, mut t: f32) -> f32 {
    if t < 0.0 {
        t += 1.0;
    }
    if t > 1.0 {
        t -= 1.0;
    }
    if t < 1.0 / 6.0 {
        p + (q - p) * 6.0 * t
    } else if t < 0.5 {
        q
    } else if t < 2.0 / 3.0 {
        p + (q - p) * 6.0 * (2.0 / 3.0 - t)
    } else {
        p
    }
}

impl Rgb {
    /// Packed `0xRRGGBB`.
    pub fn to_hex(self) -> u32 {
        let channel = |c: f32| (c.clamp(0.0, 1.0) * 255.0).round() as u32;
        (channel(self.r) << 16) | (channel(self.g) << 8) | channel(self.b)
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Output
// ────────────────────────────────────────────────────────────────────────────

/// Renderable hazard signal for one detection.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HazardScore {
    /// Euclidean distance from the observer.
    pub distance: f32,
    /// Normalized danger in `[0, 1]`.
    pub danger: f32,
    /// Magnitude of the reported velocity.
    pub speed: f32,
    /// Unit vector the arrow points along.
    pub arrow_direction: Vec3,
    /// `true` when `arrow_direction` is the zero-velocity fallback.
    pub default_direction: bool,
    pub arrow_length: f32,
    /// Rotation taking [`ARROW_MODEL_AXIS`] onto `arrow_direction`.
    pub arrow_orientation: Quaternion,
    pub color: Hsl,
    /// `danger * indicator_height`.
    pub filled_height: f32,
}

impl HazardScore {
    pub fn rgb(&self) -> Rgb {
        self.color.to_rgb()
    }
}

// ────────────────────────────────────────────────────────────────────────────
// HazardScorer
// ────────────────────────────────────────────────────────────────────────────

/// Pure per-detection hazard function parameterised by [`HazardConfig`].
#[derive(Debug, Clone, Copy, Default)]
pub struct HazardScorer {
    config: HazardConfig,
}

impl HazardScorer {
    /// Build a scorer after validating `config`.
    pub fn new(config: HazardConfig) -> Result<Self, StreamError> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &HazardConfig {
        &self.config
    }

    /// Danger for an object at `distance` from the observer.
    pub fn danger(&self, distance: f32) -> f32 {
        let HazardConfig { near, far, .. } = self.config;
        if distance <= near {
            1.0
        } else if distance >= far {
            0.0
        } else {
            (1.0 - (distance - near) / (far - near)).clamp(0.0, 1.0)
        }
    }

    /// Drawn arrow length for an object moving at `speed`.
    pub fn arrow_length(&self, speed: f32) -> f32 {
        match self.config.arrow_length {
            ArrowLengthPolicy::Clamped { min, max } => speed.clamp(min, max),
            ArrowLengthPolicy::Unclamped => speed,
        }
    }

    /// Colour for a given danger level.
    pub fn color(&self, danger: f32) -> Hsl {
        let c = &self.config;
        Hsl {
            h: (1.0 - danger) * c.cool_hue + danger * c.hot_hue,
            s: c.saturation,
            l: c.lightness,
        }
    }

    /// Score one detection.
    pub fn score(&self, detection: &Detection) -> HazardScore {
        let distance = Vec3::from(detection.position).length();
        let danger = self.danger(distance);

        let velocity = Vec3::from(detection.velocity);
        let speed = velocity.length();
        let (arrow_direction, default_direction) = match velocity.normalized() {
            Some(dir) => (dir, false),
            None => (DEFAULT_ARROW_DIRECTION, true),
        };

        HazardScore {
            distance,
            danger,
            speed,
            arrow_direction,
            default_direction,
            arrow_length: self.arrow_length(speed),
            arrow_orientation: Quaternion::from_unit_vectors(ARROW_MODEL_AXIS, arrow_direction),
            color: self.color(danger),
            filled_height: danger * self.config.indicator_height,
        }
    }
}

/// Score `detection` with the default thresholds.
pub fn score(detection: &Detection) -> HazardScore {
    HazardScorer::default().score(detection)
}

// ────────────────────────────────────────────────────────────────────────────
// Tests
// ────────────────────────────────────────────────────────────────────────────
