//! Pool surface and shared pool bookkeeping.

use std::collections::HashMap;

use crossbeam_channel::{unbounded, Receiver, Sender};
use log::trace;

use emstack_core::{
    pipeline::actor_maps_equal, ActorRef, Actors, FrameRef, ItemId, RepresentationState,
    StateValue, TimeStamp, Vector3, ViewItemRef,
};

use crate::error::Result;
use crate::event::{PoolEvent, UpdaterEvent};
use crate::ranged::RangedValue;

/// Coordinator translating view navigation into updater task submissions.
///
/// Implementations own one or more [`RepresentationUpdater`]s
/// (crate::updater::RepresentationUpdater), decide which must run on a
/// crosshair or settings change, and surface only the most recently
/// requested consistent actor set through [`PoolEvent`]s. All methods run
/// on the UI thread.
pub trait RepresentationPool {
    /// Registers a source item with every updater of the pool.
    fn add_source(&mut self, item: &ViewItemRef);

    /// Unregisters a source item, dropping its cached actors everywhere.
    fn remove_source(&mut self, id: ItemId);

    /// Live registered items.
    fn sources(&self) -> Vec<ViewItemRef>;

    /// True if the pool has items to generate actors from.
    fn has_sources(&self) -> bool;

    /// Copy of the pool settings.
    fn settings(&self) -> RepresentationState;

    /// Sets one settings tag. A genuine change propagates to every
    /// updater and resubmits them, since settings affect every buffered
    /// slice uniformly.
    ///
    /// # Errors
    /// Returns an error if resubmission fails (scheduler shut down).
    fn set_setting(&mut self, tag: &str, value: StateValue) -> Result<()>;

    /// Updates all representations to conform to the frame's crosshair
    /// and resolution, submitting whatever became stale.
    ///
    /// # Errors
    /// Returns an error on unusable resolution or scheduler shutdown.
    fn update(&mut self, frame: FrameRef) -> Result<()>;

    /// Marks every buffered representation stale and recomputes it for
    /// the given frame.
    ///
    /// # Errors
    /// Returns an error if resubmission fails.
    fn invalidate(&mut self, frame: FrameRef) -> Result<()>;

    /// Rebuilds the representations of the given items in every updater.
    ///
    /// # Errors
    /// Returns an error if resubmission fails.
    fn invalidate_items(&mut self, items: &[ItemId], frame: FrameRef) -> Result<()>;

    /// Refreshes only colors/visibility of the given items.
    ///
    /// # Errors
    /// Returns an error if resubmission fails.
    fn recolor_items(&mut self, items: &[ItemId], frame: FrameRef) -> Result<()>;

    /// Items picked by a point, or the item owning a rendered actor.
    fn pick(&self, point: &Vector3, actor: Option<&ActorRef>) -> Vec<ViewItemRef>;

    /// Actors valid at the given timestamp.
    fn actors_at(&self, time: TimeStamp) -> Option<Actors>;

    /// Timestamp of the latest frame with ready representations.
    fn last_update_timestamp(&self) -> TimeStamp;

    /// Range of frames for which representations exist.
    fn ready_range(&self) -> Option<(TimeStamp, TimeStamp)>;

    /// Extends the validity of the latest actors to cover `time`, for
    /// frames that are known to need no new actors.
    fn reuse_representations(&mut self, time: TimeStamp);

    /// Drops actors recorded before the given timestamp.
    fn invalidate_previous_actors(&mut self, time: TimeStamp);

    /// Drains updater completions and republishes newer consistent actor
    /// sets. Call once per UI tick.
    fn process_events(&mut self);

    /// Output channel consumed by the render layer. Single consumer.
    fn events(&self) -> Receiver<PoolEvent>;

    /// Notes one more manager using this pool.
    fn increment_observers(&mut self);

    /// Notes one less manager using this pool.
    fn decrement_observers(&mut self);

    /// True while the pool is observed and has sources.
    fn is_enabled(&self) -> bool;
}

/// Bookkeeping shared by every pool implementation.
pub(crate) struct PoolCore {
    pub settings: RepresentationState,
    pub sources: HashMap<ItemId, ViewItemRef>,
    pub valid_actors: RangedValue<Actors>,
    pub updater_tx: Sender<UpdaterEvent>,
    updater_rx: Receiver<UpdaterEvent>,
    pub output_tx: Sender<PoolEvent>,
    output_rx: Receiver<PoolEvent>,
    observers: usize,
}

impl PoolCore {
    pub fn new() -> Self {
        let (updater_tx, updater_rx) = unbounded();
        let (output_tx, output_rx) = unbounded();
        Self {
            settings: RepresentationState::new(),
            sources: HashMap::new(),
            valid_actors: RangedValue::new(),
            updater_tx,
            updater_rx,
            output_tx,
            output_rx,
            observers: 0,
        }
    }

    /// Records a publication and forwards it if the actors differ from
    /// the previous frame's. Publications not newer than the last
    /// processed frame are stale and dropped.
    pub fn on_actors_ready(&mut self, frame: FrameRef, actors: Actors) {
        if frame.time <= self.valid_actors.last_time() {
            trace!("dropping stale actors for frame {}", frame.time);
            return;
        }

        let changed = self
            .valid_actors
            .last()
            .is_none_or(|last| !actor_maps_equal(&last.read(), &actors.read()));

        if changed {
            self.valid_actors.insert(frame.time, actors.clone());
            let _ = self.output_tx.send(PoolEvent::ActorsReady { frame, actors });
        } else {
            self.valid_actors.reuse(frame.time);
        }
    }

    /// Drains pending updater events.
    pub fn process_updater_events(&mut self) {
        while let Ok(event) = self.updater_rx.try_recv() {
            match event {
                UpdaterEvent::ActorsReady { frame, actors, .. } => {
                    self.on_actors_ready(frame, actors);
                }
                UpdaterEvent::Progress {
                    description,
                    fraction,
                    ..
                } => {
                    let _ = self.output_tx.send(PoolEvent::Progress {
                        description,
                        fraction,
                    });
                }
            }
        }
    }

    pub fn events(&self) -> Receiver<PoolEvent> {
        self.output_rx.clone()
    }

    pub fn increment_observers(&mut self) {
        self.observers += 1;
    }

    pub fn decrement_observers(&mut self) {
        self.observers = self.observers.saturating_sub(1);
    }

    pub fn is_enabled(&self) -> bool {
        self.observers > 0 && !self.sources.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use emstack_core::{ActorMap, Bounds, Frame};
    use parking_lot::RwLock;
    use std::sync::Arc;

    fn empty_actors() -> Actors {
        Arc::new(RwLock::new(ActorMap::new()))
    }

    fn frame(time: TimeStamp) -> FrameRef {
        Frame::new(
            time,
            Vector3::default(),
            Vector3::new(1.0, 1.0, 1.0),
            Bounds::default(),
        )
    }

    #[test]
    fn stale_frames_are_dropped() {
        let mut core = PoolCore::new();
        let rx = core.events();

        core.on_actors_ready(frame(5), empty_actors());
        core.on_actors_ready(frame(3), empty_actors());

        assert_eq!(core.valid_actors.last_time(), 5);
        assert_eq!(rx.try_iter().count(), 1);
    }

    #[test]
    fn unchanged_actors_extend_the_range_without_emitting() {
        let mut core = PoolCore::new();
        let rx = core.events();

        let actors = empty_actors();
        core.on_actors_ready(frame(1), actors.clone());
        // Same (empty) content for a newer frame: range extends silently.
        core.on_actors_ready(frame(2), empty_actors());

        assert_eq!(core.valid_actors.ready_range(), Some((1, 2)));
        assert_eq!(rx.try_iter().count(), 1);
    }

    #[test]
    fn observer_counting_gates_enablement() {
        let mut core = PoolCore::new();
        assert!(!core.is_enabled());

        core.increment_observers();
        assert!(!core.is_enabled()); // still no sources

        core.sources.insert(1, crate::testing::TestItem::shared(1));
        assert!(core.is_enabled());

        core.decrement_observers();
        assert!(!core.is_enabled());
        core.decrement_observers(); // saturates, no panic
    }
}
