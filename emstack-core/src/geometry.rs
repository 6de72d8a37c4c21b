//! Scene geometry primitives.
//!
//! Coordinates are expressed in nanometers in scene space. A slice view
//! is identified by its normal [`Axis`] and the crosshair component along
//! that axis.

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Orthogonal scene axis. Slice views are normal to one of these.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum Axis {
    /// Sagittal views.
    X,
    /// Coronal views.
    Y,
    /// Axial views (the stack direction in most EM volumes).
    Z,
}

impl Axis {
    /// Returns the component index of this axis.
    #[inline]
    #[must_use]
    pub fn index(self) -> usize {
        match self {
            Axis::X => 0,
            Axis::Y => 1,
            Axis::Z => 2,
        }
    }
}

/// A 3D point or extent in scene coordinates.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Vector3 {
    /// X component.
    pub x: f64,
    /// Y component.
    pub y: f64,
    /// Z component.
    pub z: f64,
}

impl Vector3 {
    /// Creates a new vector.
    #[inline]
    #[must_use]
    pub fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }

    /// Returns the component along the given axis.
    #[inline]
    #[must_use]
    pub fn along(&self, axis: Axis) -> f64 {
        match axis {
            Axis::X => self.x,
            Axis::Y => self.y,
            Axis::Z => self.z,
        }
    }

    /// Returns a copy with the component along `axis` replaced by `value`.
    #[inline]
    #[must_use]
    pub fn with_along(&self, axis: Axis, value: f64) -> Self {
        let mut copy = *self;
        match axis {
            Axis::X => copy.x = value,
            Axis::Y => copy.y = value,
            Axis::Z => copy.z = value,
        }
        copy
    }

    /// Returns a copy shifted by `delta` along `axis`.
    #[inline]
    #[must_use]
    pub fn shifted_along(&self, axis: Axis, delta: f64) -> Self {
        self.with_along(axis, self.along(axis) + delta)
    }
}

/// Axis-aligned scene bounds.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Bounds {
    /// Lower corner.
    pub min: Vector3,
    /// Upper corner.
    pub max: Vector3,
}

impl Bounds {
    /// Creates bounds from two corners.
    #[must_use]
    pub fn new(min: Vector3, max: Vector3) -> Self {
        Self { min, max }
    }

    /// Returns true if the point lies inside the bounds (inclusive).
    #[must_use]
    pub fn contains(&self, point: &Vector3) -> bool {
        point.x >= self.min.x
            && point.x <= self.max.x
            && point.y >= self.min.y
            && point.y <= self.max.y
            && point.z >= self.min.z
            && point.z <= self.max.z
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn along_and_with_along_are_consistent() {
        let v = Vector3::new(1.0, 2.0, 3.0);
        assert_relative_eq!(v.along(Axis::Y), 2.0);

        let w = v.with_along(Axis::Y, 5.0);
        assert_relative_eq!(w.y, 5.0);
        assert_relative_eq!(w.x, 1.0);
        assert_relative_eq!(w.z, 3.0);
    }

    #[test]
    fn shifted_along_moves_one_component() {
        let v = Vector3::new(0.0, 0.0, 10.0);
        let w = v.shifted_along(Axis::Z, -2.5);
        assert_relative_eq!(w.z, 7.5);
        assert_relative_eq!(w.x, 0.0);
    }

    #[test]
    fn bounds_contains_is_inclusive() {
        let b = Bounds::new(Vector3::default(), Vector3::new(10.0, 10.0, 10.0));
        assert!(b.contains(&Vector3::new(10.0, 0.0, 5.0)));
        assert!(!b.contains(&Vector3::new(10.1, 0.0, 5.0)));
    }
}
