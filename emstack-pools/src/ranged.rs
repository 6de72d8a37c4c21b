//! Time-ranged value storage.
//!
//! A [`RangedValue`] keeps the values published for a range of frame
//! timestamps: each inserted value is valid from its timestamp until the
//! next insertion, and the range end can be extended without a new value
//! when a later frame produced identical output.

use std::collections::BTreeMap;

use emstack_core::{TimeStamp, INVALID_TIMESTAMP};

/// Values keyed by the frame timestamp they became valid at.
#[derive(Debug, Clone, Default)]
pub struct RangedValue<T> {
    values: BTreeMap<TimeStamp, T>,
    last_time: TimeStamp,
}

impl<T> RangedValue<T> {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self {
            values: BTreeMap::new(),
            last_time: INVALID_TIMESTAMP,
        }
    }

    /// True if no value has been recorded.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Records a new value valid from `time` on.
    pub fn insert(&mut self, time: TimeStamp, value: T) {
        self.values.insert(time, value);
        self.last_time = self.last_time.max(time);
    }

    /// Extends the range of the latest value to cover `time`.
    pub fn reuse(&mut self, time: TimeStamp) {
        self.last_time = self.last_time.max(time);
    }

    /// Value in effect at `time`: the latest value recorded at or before
    /// that timestamp.
    #[must_use]
    pub fn value_at(&self, time: TimeStamp) -> Option<&T> {
        self.values.range(..=time).next_back().map(|(_, v)| v)
    }

    /// Latest recorded value.
    #[must_use]
    pub fn last(&self) -> Option<&T> {
        self.values.values().next_back()
    }

    /// Timestamp of the newest frame covered, [`INVALID_TIMESTAMP`] when
    /// empty.
    #[must_use]
    pub fn last_time(&self) -> TimeStamp {
        self.last_time
    }

    /// Timestamps for which a value is known: first recorded time through
    /// the newest covered frame.
    #[must_use]
    pub fn ready_range(&self) -> Option<(TimeStamp, TimeStamp)> {
        self.values
            .keys()
            .next()
            .map(|&first| (first, self.last_time))
    }

    /// Drops every value recorded before `time`; the value in effect at
    /// `time` (if any) is rebased to start there.
    pub fn invalidate_previous(&mut self, time: TimeStamp) {
        let rebased = self
            .values
            .range(..=time)
            .next_back()
            .map(|(&at, _)| at)
            .and_then(|at| self.values.remove(&at));

        self.values = self.values.split_off(&time);
        if let Some(value) = rebased {
            self.values.insert(time, value);
        }
        self.last_time = self.last_time.max(time);
    }

    /// Removes everything.
    pub fn clear(&mut self) {
        self.values.clear();
        self.last_time = INVALID_TIMESTAMP;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn value_at_picks_the_covering_range() {
        let mut ranged = RangedValue::new();
        ranged.insert(2, "a");
        ranged.insert(5, "b");

        assert_eq!(ranged.value_at(1), None);
        assert_eq!(ranged.value_at(2), Some(&"a"));
        assert_eq!(ranged.value_at(4), Some(&"a"));
        assert_eq!(ranged.value_at(5), Some(&"b"));
        assert_eq!(ranged.value_at(100), Some(&"b"));
    }

    #[test]
    fn reuse_extends_the_range_without_a_new_value() {
        let mut ranged = RangedValue::new();
        ranged.insert(2, "a");
        ranged.reuse(7);

        assert_eq!(ranged.last_time(), 7);
        assert_eq!(ranged.ready_range(), Some((2, 7)));
        assert_eq!(ranged.last(), Some(&"a"));
    }

    #[test]
    fn invalidate_previous_rebases_the_covering_value() {
        let mut ranged = RangedValue::new();
        ranged.insert(2, "a");
        ranged.insert(5, "b");
        ranged.insert(9, "c");

        ranged.invalidate_previous(6);

        assert_eq!(ranged.value_at(5), None);
        assert_eq!(ranged.value_at(6), Some(&"b"));
        assert_eq!(ranged.value_at(9), Some(&"c"));
        assert_eq!(ranged.ready_range(), Some((6, 9)));
    }

    #[test]
    fn empty_store_reports_invalid_time() {
        let ranged: RangedValue<u32> = RangedValue::new();
        assert_eq!(ranged.last_time(), INVALID_TIMESTAMP);
        assert_eq!(ranged.ready_range(), None);
        assert!(ranged.is_empty());
    }
}
