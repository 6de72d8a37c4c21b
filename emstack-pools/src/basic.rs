//! Single-updater pool recomputing one slice context on demand.

use std::sync::Arc;

use crossbeam_channel::Receiver;
use log::warn;

use emstack_core::{
    ActorRef, Actors, FrameRef, ItemId, PipelineRef, RepresentationState, StateValue, TimeStamp,
    Vector3, ViewItemRef,
};
use emstack_scheduler::{Scheduler, TaskRef};

use crate::error::Result;
use crate::event::PoolEvent;
use crate::pool::{PoolCore, RepresentationPool};
use crate::updater::{RepresentationUpdater, UpdateMode};

/// Pool with a single updater and no slice buffering: every navigation
/// recomputes the representations from scratch. Suited to representations
/// whose actors do not depend on the crosshair slice (volumetric meshes)
/// or are cheap enough to rebuild each time.
pub struct BasicRepresentationPool {
    scheduler: Arc<Scheduler>,
    updater: Arc<RepresentationUpdater>,
    core: PoolCore,
    kind: String,
    init: bool,
}

impl BasicRepresentationPool {
    /// Builds the pool around a pipeline, running items sequentially or
    /// through the worker pool depending on `mode`.
    #[must_use]
    pub fn new(pipeline: PipelineRef, scheduler: Arc<Scheduler>, mode: UpdateMode) -> Self {
        let core = PoolCore::new();
        let kind = pipeline.kind().to_string();
        let updater = RepresentationUpdater::new(
            scheduler.next_task_id(),
            pipeline,
            mode,
            core.updater_tx.clone(),
        );
        Self {
            scheduler,
            updater,
            core,
            kind,
            init: false,
        }
    }

    /// The pool's updater, mainly for tests and diagnostics.
    #[must_use]
    pub fn updater(&self) -> &Arc<RepresentationUpdater> {
        &self.updater
    }

    fn submit(&self) -> Result<()> {
        let task: TaskRef = self.updater.clone();
        self.scheduler.submit(&task)?;
        Ok(())
    }

    /// Resubmits after a source change. Before the first `update` there is
    /// no frame context to compute against, so nothing runs yet.
    fn resubmit_if_active(&self) {
        if self.init {
            if let Err(err) = self.submit() {
                warn!("{} pool: resubmission failed: {err}", self.kind);
            }
        }
    }
}

impl RepresentationPool for BasicRepresentationPool {
    fn add_source(&mut self, item: &ViewItemRef) {
        self.core.sources.insert(item.id(), Arc::clone(item));
        self.updater.add_source(item);
        self.resubmit_if_active();
    }

    fn remove_source(&mut self, id: ItemId) {
        self.core.sources.remove(&id);
        self.updater.remove_source(id);
        self.resubmit_if_active();
    }

    fn sources(&self) -> Vec<ViewItemRef> {
        self.core.sources.values().cloned().collect()
    }

    fn has_sources(&self) -> bool {
        !self.core.sources.is_empty()
    }

    fn settings(&self) -> RepresentationState {
        self.core.settings.clone()
    }

    fn set_setting(&mut self, tag: &str, value: StateValue) -> Result<()> {
        self.core.settings.set_value(tag, value);
        if !self.core.settings.has_pending_changes() {
            return Ok(());
        }
        let pending = self.core.settings.clone();
        self.core.settings.commit();
        self.updater.apply_settings(&pending);
        if self.init {
            self.submit()?;
        }
        Ok(())
    }

    fn update(&mut self, frame: FrameRef) -> Result<()> {
        self.init = true;
        self.updater.invalidate();
        self.updater.set_crosshair(frame.crosshair);
        self.updater.set_resolution(frame.resolution);
        self.updater
            .set_description(format!("{} representations", self.kind));
        self.updater.set_frame(frame);
        self.submit()
    }

    fn invalidate(&mut self, frame: FrameRef) -> Result<()> {
        let _ = self.core.output_tx.send(PoolEvent::ActorsInvalidated {
            frame: frame.clone(),
        });
        self.update(frame)
    }

    fn invalidate_items(&mut self, items: &[ItemId], frame: FrameRef) -> Result<()> {
        self.updater.update_representations(items);
        if self.init {
            self.updater.set_frame(frame);
            self.submit()?;
        }
        Ok(())
    }

    fn recolor_items(&mut self, items: &[ItemId], frame: FrameRef) -> Result<()> {
        self.updater.update_representation_colors(items);
        if self.init {
            self.updater.set_frame(frame);
            self.submit()?;
        }
        Ok(())
    }

    fn pick(&self, point: &Vector3, actor: Option<&ActorRef>) -> Vec<ViewItemRef> {
        self.updater.pick(point, actor)
    }

    fn actors_at(&self, time: TimeStamp) -> Option<Actors> {
        self.core.valid_actors.value_at(time).cloned()
    }

    fn last_update_timestamp(&self) -> TimeStamp {
        self.core.valid_actors.last_time()
    }

    fn ready_range(&self) -> Option<(TimeStamp, TimeStamp)> {
        self.core.valid_actors.ready_range()
    }

    fn reuse_representations(&mut self, time: TimeStamp) {
        self.core.valid_actors.reuse(time);
    }

    fn invalidate_previous_actors(&mut self, time: TimeStamp) {
        self.core.valid_actors.invalidate_previous(time);
    }

    fn process_events(&mut self) {
        self.core.process_updater_events();
    }

    fn events(&self) -> Receiver<PoolEvent> {
        self.core.events()
    }

    fn increment_observers(&mut self) {
        self.core.increment_observers();
    }

    fn decrement_observers(&mut self) {
        self.core.decrement_observers();
    }

    fn is_enabled(&self) -> bool {
        self.core.is_enabled()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{TestItem, TestPipeline};
    use emstack_core::{Bounds, Frame};
    use std::sync::atomic::Ordering;
    use std::time::{Duration, Instant};

    fn frame(time: TimeStamp) -> FrameRef {
        Frame::new(
            time,
            Vector3::new(1.0, 2.0, 3.0),
            Vector3::new(1.0, 1.0, 1.0),
            Bounds::default(),
        )
    }

    fn wait_for_ready(pool: &mut BasicRepresentationPool) -> PoolEvent {
        let events = pool.events();
        let deadline = Instant::now() + Duration::from_secs(5);
        loop {
            pool.process_events();
            if let Ok(event) = events.try_recv() {
                if matches!(event, PoolEvent::ActorsReady { .. }) {
                    return event;
                }
                continue;
            }
            assert!(Instant::now() < deadline, "no actors became ready");
            std::thread::sleep(Duration::from_millis(1));
        }
    }

    #[test]
    fn update_builds_and_publishes_actors() {
        let scheduler = Scheduler::new(1).unwrap();
        let pipeline = TestPipeline::shared();
        let mut pool =
            BasicRepresentationPool::new(pipeline.clone(), scheduler, UpdateMode::Sequential);

        pool.add_source(&TestItem::shared(7));
        pool.update(frame(1)).unwrap();

        let PoolEvent::ActorsReady { frame, actors } = wait_for_ready(&mut pool) else {
            unreachable!()
        };
        assert_eq!(frame.time, 1);
        assert!(actors.read().contains_key(&7));
        assert_eq!(pool.last_update_timestamp(), 1);
        assert_eq!(pipeline.created.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn recolor_reuses_actors_and_extends_the_range() {
        let scheduler = Scheduler::new(1).unwrap();
        let pipeline = TestPipeline::shared();
        let mut pool =
            BasicRepresentationPool::new(pipeline.clone(), scheduler, UpdateMode::Sequential);

        pool.add_source(&TestItem::shared(7));
        pool.update(frame(1)).unwrap();
        wait_for_ready(&mut pool);

        pool.recolor_items(&[7], frame(2)).unwrap();
        let events = pool.events();
        let deadline = Instant::now() + Duration::from_secs(5);
        while pool.ready_range() != Some((1, 2)) {
            assert!(Instant::now() < deadline, "range never extended");
            pool.process_events();
            std::thread::sleep(Duration::from_millis(1));
        }
        // Identical actors for the newer frame: extended silently.
        assert!(events.try_iter().all(|e| !matches!(e, PoolEvent::ActorsReady { .. })));
        assert_eq!(pipeline.created.load(Ordering::SeqCst), 1);
        assert!(pipeline.recolored.load(Ordering::SeqCst) >= 2);
    }

    #[test]
    fn setting_change_before_first_update_does_not_run() {
        let scheduler = Scheduler::new(1).unwrap();
        let pipeline = TestPipeline::shared();
        let mut pool =
            BasicRepresentationPool::new(pipeline.clone(), scheduler.clone(), UpdateMode::Sequential);

        pool.add_source(&TestItem::shared(1));
        pool.set_setting("opacity", StateValue::from(0.5)).unwrap();

        std::thread::sleep(Duration::from_millis(20));
        assert_eq!(pipeline.created.load(Ordering::SeqCst), 0);
        assert_eq!(scheduler.active_tasks(), 0);
    }
}
