//! Sliding-window pool keeping neighboring slices precomputed.

use std::sync::Arc;

use crossbeam_channel::Receiver;
use log::{debug, warn};

use emstack_core::{
    ActorRef, Actors, Axis, FrameRef, ItemId, PipelineRef, RepresentationState, StateValue,
    TimeStamp, Vector3, ViewItemRef,
};
use emstack_scheduler::{Priority, Scheduler, TaskRef};

use crate::error::{Error, Result};
use crate::event::PoolEvent;
use crate::pool::{PoolCore, RepresentationPool};
use crate::updater::{RepresentationUpdater, UpdateMode};
use crate::window::RepresentationWindow;

/// Pool that pages a circular window of updaters along one axis.
///
/// Each updater owns the actors of one slice in the neighborhood of the
/// current crosshair. Moving the crosshair rotates the window: only the
/// slots whose slice left the neighborhood are recomputed, at a priority
/// that drops with distance from the current slice, while the current
/// slot's cached actors (if warm) are republished at once.
pub struct BufferedRepresentationPool {
    normal: Axis,
    scheduler: Arc<Scheduler>,
    window: RepresentationWindow,
    core: PoolCore,
    init: bool,
    crosshair: Vector3,
    resolution: Vector3,
}

impl BufferedRepresentationPool {
    /// Builds a pool with `2 * window_width + 1` updaters sliding along
    /// `normal`.
    ///
    /// # Errors
    /// Returns [`Error::InvalidWindowWidth`] when `window_width` is zero.
    pub fn new(
        normal: Axis,
        pipeline: PipelineRef,
        scheduler: Arc<Scheduler>,
        mode: UpdateMode,
        window_width: usize,
    ) -> Result<Self> {
        if window_width == 0 {
            return Err(Error::InvalidWindowWidth);
        }
        let core = PoolCore::new();
        let updaters = (0..=2 * window_width)
            .map(|_| {
                RepresentationUpdater::new(
                    scheduler.next_task_id(),
                    pipeline.clone(),
                    mode,
                    core.updater_tx.clone(),
                )
            })
            .collect();
        let window = RepresentationWindow::new(updaters)?;
        Ok(Self {
            normal,
            scheduler,
            window,
            core,
            init: false,
            crosshair: Vector3::default(),
            resolution: Vector3::default(),
        })
    }

    /// Axis the window slides along.
    #[must_use]
    pub fn normal(&self) -> Axis {
        self.normal
    }

    /// The window, mainly for tests and diagnostics.
    #[must_use]
    pub fn window(&self) -> &RepresentationWindow {
        &self.window
    }

    fn spacing(&self, resolution: Vector3) -> Result<f64> {
        let value = resolution.along(self.normal);
        if !value.is_finite() || value <= 0.0 {
            return Err(Error::InvalidResolution {
                axis: self.normal,
                value,
            });
        }
        Ok(value)
    }

    /// Whole slices between the stored crosshair and `point` along the
    /// normal axis.
    fn normal_shift(&self, point: Vector3, spacing: f64) -> i64 {
        let distance = point.along(self.normal) - self.crosshair.along(self.normal);
        #[allow(clippy::cast_possible_truncation)]
        let slices = (distance / spacing).round() as i64;
        slices
    }

    fn submit(&self, updater: &Arc<RepresentationUpdater>) -> Result<()> {
        let task: TaskRef = updater.clone();
        self.scheduler.submit(&task)?;
        Ok(())
    }

    fn submit_all(&self) -> Result<()> {
        for updater in self.window.all() {
            self.submit(&updater)?;
        }
        self.update_priorities();
        Ok(())
    }

    /// Current slice runs first, near prefetches next, far ones last.
    fn update_priorities(&self) {
        self.reprioritize(std::slice::from_ref(self.window.current()), Priority::VeryHigh);
        self.reprioritize(&self.window.closest(), Priority::High);
        self.reprioritize(&self.window.farther(), Priority::Low);
    }

    fn reprioritize(&self, updaters: &[Arc<RepresentationUpdater>], priority: Priority) {
        for updater in updaters {
            updater.set_priority(priority);
            let task: TaskRef = updater.clone();
            self.scheduler.change_priority(&task);
        }
    }

    fn resubmit_if_active(&self) {
        if self.init {
            if let Err(err) = self.submit_all() {
                warn!("buffered pool: resubmission failed: {err}");
            }
        }
    }
}

impl RepresentationPool for BufferedRepresentationPool {
    fn add_source(&mut self, item: &ViewItemRef) {
        self.core.sources.insert(item.id(), Arc::clone(item));
        for updater in self.window.all() {
            updater.add_source(item);
        }
        self.resubmit_if_active();
    }

    fn remove_source(&mut self, id: ItemId) {
        self.core.sources.remove(&id);
        for updater in self.window.all() {
            updater.remove_source(id);
        }
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
        for updater in self.window.all() {
            updater.apply_settings(&pending);
        }
        if self.init {
            self.submit_all()?;
        }
        Ok(())
    }

    fn update(&mut self, frame: FrameRef) -> Result<()> {
        let spacing = self.spacing(frame.resolution)?;

        // A resolution change remaps every slot to a new slice, as does
        // the very first frame; otherwise only the slices that left the
        // neighborhood need recomputing.
        let full = !self.init || self.resolution != frame.resolution;
        let shift = if full {
            self.window.size() as i64
        } else {
            self.normal_shift(frame.crosshair, spacing)
        };
        self.init = true;
        self.crosshair = frame.crosshair;
        self.resolution = frame.resolution;

        let invalidated = self.window.move_current(shift);
        debug!(
            "frame {}: shift {shift} along {:?}, {} slot(s) stale",
            frame.time,
            self.normal,
            invalidated.len()
        );

        for cursor in &invalidated {
            #[allow(clippy::cast_precision_loss)]
            let slice_crosshair = frame
                .crosshair
                .shifted_along(self.normal, cursor.position as f64 * spacing);
            cursor.updater.invalidate();
            cursor.updater.set_crosshair(slice_crosshair);
            cursor.updater.set_resolution(frame.resolution);
            cursor.updater.set_description(format!(
                "{:?} slice at {:.2}",
                self.normal,
                slice_crosshair.along(self.normal)
            ));
        }

        let current = Arc::clone(self.window.current());
        current.set_frame(frame.clone());

        for cursor in &invalidated {
            self.submit(&cursor.updater)?;
        }
        self.update_priorities();

        if current.has_finished() {
            // Warm cache: the slice was prefetched while it sat next to
            // the old current position. Republish without recomputing.
            self.core.on_actors_ready(frame, current.actors_snapshot());
        }
        Ok(())
    }

    fn invalidate(&mut self, frame: FrameRef) -> Result<()> {
        let _ = self.core.output_tx.send(PoolEvent::ActorsInvalidated {
            frame: frame.clone(),
        });
        for updater in self.window.all() {
            updater.invalidate();
        }
        if self.init {
            self.window.current().set_frame(frame);
            self.submit_all()?;
        }
        Ok(())
    }

    fn invalidate_items(&mut self, items: &[ItemId], frame: FrameRef) -> Result<()> {
        for updater in self.window.all() {
            updater.update_representations(items);
        }
        if self.init {
            self.window.current().set_frame(frame);
            self.submit_all()?;
        }
        Ok(())
    }

    fn recolor_items(&mut self, items: &[ItemId], frame: FrameRef) -> Result<()> {
        for updater in self.window.all() {
            updater.update_representation_colors(items);
        }
        if self.init {
            self.window.current().set_frame(frame);
            self.submit_all()?;
        }
        Ok(())
    }

    fn pick(&self, point: &Vector3, actor: Option<&ActorRef>) -> Vec<ViewItemRef> {
        let current = self.window.current();
        if current.has_finished() {
            current.pick(point, actor)
        } else {
            Vec::new()
        }
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
