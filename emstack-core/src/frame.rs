//! Render request frames.
//!
//! A [`Frame`] identifies one rendering request: the monotonic timestamp
//! assigned by the view state plus the scene parameters in effect at that
//! instant. Frames are immutable once constructed and shared as
//! [`FrameRef`]; consumers compare them by timestamp to discard stale
//! results.

use std::sync::Arc;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::geometry::{Bounds, Vector3};

/// Monotonic frame timestamp assigned by the view state.
pub type TimeStamp = u64;

/// Timestamp of a frame that has been invalidated or never assigned.
pub const INVALID_TIMESTAMP: TimeStamp = 0;

/// Option flags attached to a frame.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct FrameFlags {
    /// The view should focus (center) on the crosshair.
    pub focus: bool,
    /// The view should reset its camera.
    pub reset: bool,
    /// Segmentation representations must be recomputed from scratch.
    pub invalidates_segmentations: bool,
    /// Channel representations must be recomputed from scratch.
    pub invalidates_channels: bool,
}

/// Immutable identifier of one render request.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Frame {
    /// Monotonic timestamp; [`INVALID_TIMESTAMP`] marks an invalid frame.
    pub time: TimeStamp,
    /// Scene crosshair at request time.
    pub crosshair: Vector3,
    /// Scene resolution (spacing per axis) at request time.
    pub resolution: Vector3,
    /// Scene bounds at request time.
    pub bounds: Bounds,
    /// Option flags.
    pub flags: FrameFlags,
}

/// Shared handle to an immutable frame.
pub type FrameRef = Arc<Frame>;

impl Frame {
    /// Creates a frame for the given request parameters.
    #[must_use]
    pub fn new(
        time: TimeStamp,
        crosshair: Vector3,
        resolution: Vector3,
        bounds: Bounds,
    ) -> FrameRef {
        Arc::new(Self {
            time,
            crosshair,
            resolution,
            bounds,
            flags: FrameFlags::default(),
        })
    }

    /// Creates an invalid frame.
    #[must_use]
    pub fn invalid() -> FrameRef {
        Arc::new(Self {
            time: INVALID_TIMESTAMP,
            crosshair: Vector3::default(),
            resolution: Vector3::default(),
            bounds: Bounds::default(),
            flags: FrameFlags::default(),
        })
    }

    /// Returns true if this frame identifies a live render request.
    #[inline]
    #[must_use]
    pub fn is_valid(&self) -> bool {
        self.time != INVALID_TIMESTAMP
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invalid_frames_have_the_reserved_timestamp() {
        let frame = Frame::invalid();
        assert!(!frame.is_valid());
        assert_eq!(frame.time, INVALID_TIMESTAMP);
    }

    #[test]
    fn frames_compare_by_value() {
        let a = Frame::new(3, Vector3::new(1.0, 2.0, 3.0), Vector3::default(), Bounds::default());
        let b = Frame::new(3, Vector3::new(1.0, 2.0, 3.0), Vector3::default(), Bounds::default());
        assert_eq!(*a, *b);
        assert!(a.is_valid());
    }
}
