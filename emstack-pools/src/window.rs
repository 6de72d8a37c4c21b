//! Circular neighborhood of updaters around the current slice.
//!
//! A window of width `w` holds `2*w + 1` slots. Offsets are relative to
//! the current slot: negative offsets are behind (already visited),
//! positive offsets are ahead. Shifting the current position rotates the
//! buffer and reports exactly the slots whose cached slice is no longer
//! inside the neighborhood, tagged with the offset they now cover.
//!
//! The window has a single owner (the pool, on the UI thread); buffer
//! topology is never mutated after construction, so no lock is needed
//! here. Per-updater internals carry their own locks.

use std::sync::Arc;

use crate::error::{Error, Result};
use crate::updater::RepresentationUpdater;

/// An invalidated slot returned by [`RepresentationWindow::move_current`]:
/// the updater plus the offset it now covers relative to the new current
/// position.
pub struct Cursor {
    /// Updater whose slice must be recomputed.
    pub updater: Arc<RepresentationUpdater>,
    /// New offset from the current slot, in `[-width, width]`.
    pub position: i64,
}

/// Fixed-size circular buffer of updaters for neighboring slices.
pub struct RepresentationWindow {
    buffer: Vec<Arc<RepresentationUpdater>>,
    current: usize,
    width: usize,
}

impl RepresentationWindow {
    /// Builds a window over the given updaters. The slot count must be
    /// odd so a center slot exists; the current position starts there.
    ///
    /// # Errors
    /// Returns [`Error::InvalidWindowSize`] for an empty or even list.
    pub fn new(updaters: Vec<Arc<RepresentationUpdater>>) -> Result<Self> {
        if updaters.is_empty() || updaters.len() % 2 == 0 {
            return Err(Error::InvalidWindowSize(updaters.len()));
        }
        let width = updaters.len() / 2;
        Ok(Self {
            buffer: updaters,
            current: width,
            width,
        })
    }

    /// Number of slots.
    #[must_use]
    pub fn size(&self) -> usize {
        self.buffer.len()
    }

    /// Neighborhood half-width.
    #[must_use]
    pub fn width(&self) -> usize {
        self.width
    }

    /// Buffer index of the current slot.
    #[must_use]
    pub fn current_index(&self) -> usize {
        self.current
    }

    /// Wraps a logical position into a buffer index.
    #[must_use]
    pub fn inner_position(&self, position: i64) -> usize {
        let size = self.size() as i64;
        usize::try_from(position.rem_euclid(size)).unwrap_or(0)
    }

    /// Buffer index following `position`.
    #[must_use]
    pub fn next_position(&self, position: usize) -> usize {
        self.inner_position(position as i64 + 1)
    }

    /// Buffer index preceding `position`.
    #[must_use]
    pub fn prev_position(&self, position: usize) -> usize {
        self.inner_position(position as i64 - 1)
    }

    fn slot(&self, offset: i64) -> &Arc<RepresentationUpdater> {
        &self.buffer[self.inner_position(self.current as i64 + offset)]
    }

    /// Shifts the current position by `distance` slots and returns the
    /// slots that must be recomputed.
    ///
    /// A shift of zero invalidates nothing. A shift of at least the
    /// buffer size invalidates every slot (no cached slice survives).
    /// Otherwise exactly `|distance|` slots rotated onto the new edge of
    /// the neighborhood are returned, each tagged with its new offset.
    pub fn move_current(&mut self, distance: i64) -> Vec<Cursor> {
        if distance == 0 {
            return Vec::new();
        }

        let size = self.size() as i64;
        let width = self.width as i64;
        self.current = self.inner_position(self.current as i64 + distance);

        let mut invalidated = Vec::new();
        if distance.abs() >= size {
            for offset in -width..=width {
                invalidated.push(Cursor {
                    updater: Arc::clone(self.slot(offset)),
                    position: offset,
                });
            }
        } else if distance > 0 {
            // The |d| slots that were farthest behind now cover the
            // farthest-ahead offsets.
            for k in 0..distance {
                let offset = width - k;
                invalidated.push(Cursor {
                    updater: Arc::clone(self.slot(offset)),
                    position: offset,
                });
            }
        } else {
            for k in 0..-distance {
                let offset = -width + k;
                invalidated.push(Cursor {
                    updater: Arc::clone(self.slot(offset)),
                    position: offset,
                });
            }
        }
        invalidated
    }

    /// Updater at the current slice.
    #[must_use]
    pub fn current(&self) -> &Arc<RepresentationUpdater> {
        &self.buffer[self.current]
    }

    /// Every updater, ordered from offset `-width` to `+width`.
    #[must_use]
    pub fn all(&self) -> Vec<Arc<RepresentationUpdater>> {
        let width = self.width as i64;
        (-width..=width)
            .map(|offset| Arc::clone(self.slot(offset)))
            .collect()
    }

    fn range(&self, offsets: impl Iterator<Item = i64>) -> Vec<Arc<RepresentationUpdater>> {
        offsets.map(|offset| Arc::clone(self.slot(offset))).collect()
    }

    /// Updaters behind the current slice, nearest first.
    #[must_use]
    pub fn behind(&self) -> Vec<Arc<RepresentationUpdater>> {
        self.range((1..=self.width as i64).map(|k| -k))
    }

    /// Updaters ahead of the current slice, nearest first.
    #[must_use]
    pub fn ahead(&self) -> Vec<Arc<RepresentationUpdater>> {
        self.range(1..=self.width as i64)
    }

    /// Half of the half-window considered "close" to the current slice.
    #[must_use]
    pub fn closest_distance(&self) -> usize {
        self.width / 2
    }

    /// Remainder of the half-window; closest and farther partition it.
    #[must_use]
    pub fn farther_distance(&self) -> usize {
        self.width - self.closest_distance()
    }

    /// Close updaters behind, nearest first.
    #[must_use]
    pub fn closest_behind(&self) -> Vec<Arc<RepresentationUpdater>> {
        self.range((1..=self.closest_distance() as i64).map(|k| -k))
    }

    /// Close updaters ahead, nearest first.
    #[must_use]
    pub fn closest_ahead(&self) -> Vec<Arc<RepresentationUpdater>> {
        self.range(1..=self.closest_distance() as i64)
    }

    /// Close updaters on both sides.
    #[must_use]
    pub fn closest(&self) -> Vec<Arc<RepresentationUpdater>> {
        let mut updaters = self.closest_ahead();
        updaters.extend(self.closest_behind());
        updaters
    }

    /// Far updaters behind, nearest first.
    #[must_use]
    pub fn farther_behind(&self) -> Vec<Arc<RepresentationUpdater>> {
        let start = self.closest_distance() as i64 + 1;
        self.range((start..=self.width as i64).map(|k| -k))
    }

    /// Far updaters ahead, nearest first.
    #[must_use]
    pub fn farther_ahead(&self) -> Vec<Arc<RepresentationUpdater>> {
        let start = self.closest_distance() as i64 + 1;
        self.range(start..=self.width as i64)
    }

    /// Far updaters on both sides.
    #[must_use]
    pub fn farther(&self) -> Vec<Arc<RepresentationUpdater>> {
        let mut updaters = self.farther_ahead();
        updaters.extend(self.farther_behind());
        updaters
    }
}
