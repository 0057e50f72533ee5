//! Small 3-D vector and rotation toolkit used by the hazard scorer.
//!
//! # Example
//!
//! ```rust
//! use railviz_perception::vector::{Quaternion, Vec3};
//!
//! let v = Vec3::new(3.0, 4.0, 0.0);
//! assert!((v.length() - 5.0).abs() < 1e-5);
//!
//! // Rotation that points the +Y axis along +X.
//! let q = Quaternion::from_unit_vectors(Vec3::unit_y(), Vec3::unit_x());
//! let r = q.rotate(Vec3::unit_y());
//! assert!((r.x - 1.0).abs() < 1e-5);
//! ```

use railviz_types::{Point3, Velocity3};

// ────────────────────────────────────────────────────────────────────────────
// Vec3
// ────────────────────────────────────────────────────────────────────────────

/// A 3-D vector.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Vec3 {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

impl Vec3 {
    /// Create a new vector.
    pub fn new(x: f32, y: f32, z: f32) -> Self {
        Self { x, y, z }
    }

    /// The zero vector.
    pub fn zero() -> Self {
        Self::new(0.0, 0.0, 0.0)
    }

    pub fn unit_x() -> Self {
        Self::new(1.0, 0.0, 0.0)
    }

    pub fn unit_y() -> Self {
        Self::new(0.0, 1.0, 0.0)
    }

    pub fn scale(self, k: f32) -> Self {
        Self::new(self.x * k, self.y * k, self.z * k)
    }

    pub fn dot(self, rhs: Self) -> f32 {
        self.x * rhs.x + self.y * rhs.y + self.z * rhs.z
    }

    pub fn cross(self, rhs: Self) -> Self {
        Self::new(
            self.y * rhs.z - self.z * rhs.y,
            self.z * rhs.x - self.x * rhs.z,
            self.x * rhs.y - self.y * rhs.x,
        )
    }

    /// Euclidean norm.
    ///
    /// Accumulated in `f64`: squaring in `f32` overflows above ~1.8e19 and
    /// underflows below ~1e-19.
    pub fn length(self) -> f32 {
        self.length_f64() as f32
    }

    /// Unit vector in the same direction, or `None` for a zero-length (or
    /// non-finite) vector.
    pub fn normalized(self) -> Option<Self> {
        let len = self.length_f64();
        if len > 0.0 && len.is_finite() {
            Some(Self::new(
                (self.x as f64 / len) as f32,
                (self.y as f64 / len) as f32,
                (self.z as f64 / len) as f32,
            ))
        } else {
            None
        }
    }

    fn length_f64(self) -> f64 {
        let (x, y, z) = (self.x as f64, self.y as f64, self.z as f64);
        (x * x + y * y + z * z).sqrt()
    }
}

impl From<Point3> for Vec3 {
    fn from(p: Point3) -> Self {
        Self::new(p.x, p.y, p.z)
    }
}

impl From<Velocity3> for Vec3 {
    fn from(v: Velocity3) -> Self {
        Self::new(v.vx, v.vy, v.vz)
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Quaternion
// ────────────────────────────────────────────────────────────────────────────

/// A unit quaternion representing a 3-D rotation (w, x, y, z convention).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Quaternion {
    pub w: f32,
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

impl Quaternion {
    /// Create a quaternion.  The caller is responsible for providing a unit
    /// quaternion (|q| = 1).
    pub fn new(w: f32, x: f32, y: f32, z: f32) -> Self {
        Self { w, x, y, z }
    }

    /// The identity rotation (no rotation).
    pub fn identity() -> Self {
        Self::new(1.0, 0.0, 0.0, 0.0)
    }

    /// Rotation of `angle_rad` around the unit `axis`.
    pub fn from_axis_angle(axis: Vec3, angle_rad: f32) -> Self {
        let half = angle_rad * 0.5;
        let s = half.sin();
        Self::new(half.cos(), axis.x * s, axis.y * s, axis.z * s)
    }

    /// Shortest-arc rotation taking unit vector `from` onto unit vector `to`.
    ///
    /// Antiparallel inputs pick an arbitrary axis perpendicular to `from`.
    pub fn from_unit_vectors(from: Vec3, to: Vec3) -> Self {
        let mut r = from.dot(to) + 1.0;
        let (x, y, z);
        if r < f32::EPSILON {
            r = 0.0;
            if from.x.abs() > from.z.abs() {
                (x, y, z) = (-from.y, from.x, 0.0);
            } else {
                (x, y, z) = (0.0, -from.z, from.y);
            }
        } else {
            let c = from.cross(to);
            (x, y, z) = (c.x, c.y, c.z);
        }
        Self::new(r, x, y, z).normalized()
    }

    pub fn normalized(self) -> Self {
        let n = (self.w * self.w + self.x * self.x + self.y * self.y + self.z * self.z).sqrt();
        if n == 0.0 {
            return Self::identity();
        }
        Self::new(self.w / n, self.x / n, self.y / n, self.z / n)
    }

    /// Hamilton product: compose two rotations.
    pub fn mul(self, rhs: Self) -> Self {
        Self::new(
            self.w * rhs.w - self.x * rhs.x - self.y * rhs.y - self.z * rhs.z,
            self.w * rhs.x + self.x * rhs.w + self.y * rhs.z - self.z * rhs.y,
            self.w * rhs.y - self.x * rhs.z + self.y * rhs.w + self.z * rhs.x,
            self.w * rhs.z + self.x * rhs.y - self.y * rhs.x + self.z * rhs.w,
        )
    }

    /// Conjugate (== inverse for a unit quaternion).
    pub fn conjugate(self) -> Self {
        Self::new(self.w, -self.x, -self.y, -self.z)
    }

    /// Rotate a vector by this quaternion: p' = q * p * q*.
    pub fn rotate(self, v: Vec3) -> Vec3 {
        let p = Self::new(0.0, v.x, v.y, v.z);
        let rotated = self.mul(p).mul(self.conjugate());
        Vec3::new(rotated.x, rotated.y, rotated.z)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f32::consts::{FRAC_1_SQRT_2, FRAC_PI_2};

    fn assert_vec_eq(a: Vec3, b: Vec3) {
        assert!(
            (a.x - b.x).abs() < 1e-5 && (a.y - b.y).abs() < 1e-5 && (a.z - b.z).abs() < 1e-5,
            "expected {b:?}, got {a:?}"
        );
    }

    // ── Vec3 ────────────────────────────────────────────────────────────────

    #[test]
    fn length_of_pythagorean_triple() {
        assert!((Vec3::new(0.0, 3.0, 4.0).length() - 5.0).abs() < 1e-5);
    }

    #[test]
    fn normalized_zero_is_none() {
        assert!(Vec3::zero().normalized().is_none());
    }

    #[test]
    fn normalized_has_unit_length() {
        let n = Vec3::new(2.0, -3.0, 6.0).normalized().unwrap();
        assert!((n.length() - 1.0).abs() < 1e-5);
    }

    #[test]
    fn normalized_survives_extreme_magnitudes() {
        let huge = Vec3::new(0.0, 2e19, 0.0);
        assert!(huge.length().is_finite());
        assert_vec_eq(huge.normalized().unwrap(), Vec3::unit_y());

        let tiny = Vec3::new(1e-25, 0.0, 0.0);
        assert!(tiny.length() > 0.0);
        assert_vec_eq(tiny.normalized().unwrap(), Vec3::unit_x());

        let max = Vec3::new(f32::MAX, f32::MAX, 0.0);
        assert_vec_eq(max.normalized().unwrap(), Vec3::new(FRAC_1_SQRT_2, FRAC_1_SQRT_2, 0.0));
    }

    #[test]
    fn normalized_rejects_non_finite() {
        assert!(Vec3::new(f32::NAN, 1.0, 0.0).normalized().is_none());
        assert!(Vec3::new(f32::INFINITY, 0.0, 0.0).normalized().is_none());
    }

    #[test]
    fn cross_of_axes() {
        assert_vec_eq(Vec3::unit_x().cross(Vec3::unit_y()), Vec3::new(0.0, 0.0, 1.0));
    }

    // ── Quaternion ──────────────────────────────────────────────────────────

    #[test]
    fn quaternion_identity_rotate_is_noop() {
        let v = Vec3::new(1.0, 2.0, 3.0);
        assert_vec_eq(Quaternion::identity().rotate(v), v);
    }

    #[test]
    fn quaternion_90deg_yaw_rotates_x_to_y() {
        let q = Quaternion::new(FRAC_1_SQRT_2, 0.0, 0.0, FRAC_1_SQRT_2);
        assert_vec_eq(q.rotate(Vec3::unit_x()), Vec3::unit_y());
    }

    #[test]
    fn axis_angle_matches_explicit_quaternion() {
        let q = Quaternion::from_axis_angle(Vec3::new(0.0, 0.0, 1.0), FRAC_PI_2);
        assert!((q.w - FRAC_1_SQRT_2).abs() < 1e-5);
        assert!((q.z - FRAC_1_SQRT_2).abs() < 1e-5);
    }

    #[test]
    fn quaternion_conjugate_is_inverse() {
        let q = Quaternion::new(FRAC_1_SQRT_2, 0.0, 0.0, FRAC_1_SQRT_2);
        let prod = q.mul(q.conjugate());
        assert!((prod.w - 1.0).abs() < 1e-5);
        assert!(prod.x.abs() < 1e-5);
        assert!(prod.y.abs() < 1e-5);
        assert!(prod.z.abs() < 1e-5);
    }

    #[test]
    fn from_unit_vectors_maps_from_onto_to() {
        let to = Vec3::new(1.0, 1.0, 1.0).normalized().unwrap();
        let q = Quaternion::from_unit_vectors(Vec3::unit_y(), to);
        assert_vec_eq(q.rotate(Vec3::unit_y()), to);
    }

    #[test]
    fn from_unit_vectors_antiparallel() {
        let from = Vec3::unit_y();
        let to = Vec3::new(0.0, -1.0, 0.0);
        let q = Quaternion::from_unit_vectors(from, to);
        assert_vec_eq(q.rotate(from), to);
    }

    #[test]
    fn from_unit_vectors_same_direction_is_identity() {
        let q = Quaternion::from_unit_vectors(Vec3::unit_x(), Vec3::unit_x());
        assert_vec_eq(q.rotate(Vec3::new(0.3, 0.4, 0.5)), Vec3::new(0.3, 0.4, 0.5));
    }
}
