//! `railviz-perception` – hazard interpretation of the reconciled stream.
//!
//! Turns raw detections into the signals a renderer draws on top of the
//! point cloud.
//!
//! # Modules
//!
//! - [`hazard`] – [`HazardScorer`][hazard::HazardScorer]: pure function
//!   from a detection's position and velocity to a normalized danger score,
//!   colour, indicator fill and velocity arrow.
//! - [`vector`] – [`Vec3`][vector::Vec3] and
//!   [`Quaternion`][vector::Quaternion] helpers shared by the scorer.

pub mod hazard;
pub mod vector;

pub use hazard::{ArrowLengthPolicy, HazardConfig, HazardScore, HazardScorer};
pub use vector::{Quaternion, Vec3};
