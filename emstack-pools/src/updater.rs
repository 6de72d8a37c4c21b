//! Background actor computation for one slice context.
//!
//! A [`RepresentationUpdater`] owns the source items it renders, their
//! current settings and frame, and a cache of the actors computed so far.
//! It is a persistent scheduler task: pools resubmit it whenever its
//! parameters change, and the scheduler's restart semantics guarantee at
//! most one running instance.
//!
//! Consistency model: every mutation that supersedes in-flight work bumps
//! an atomic generation counter under the state write lock. `run()`
//! snapshots the generation at start, checks it cooperatively between
//! items, and re-checks it under the state lock before publishing, so a
//! slow run can never publish over a newer invalidation.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicU8, AtomicUsize, Ordering};
use std::sync::{Arc, Weak};

use crossbeam_channel::Sender;
use log::trace;
use parking_lot::{Mutex, RwLock};
use rayon::prelude::*;

use emstack_core::{
    ActorMap, ActorRef, Actors, FrameRef, ItemId, PipelineRef, RepresentationState, StateValue,
    TimeStamp, Vector3, ViewItem, ViewItemRef, INVALID_TIMESTAMP,
};
use emstack_scheduler::{Priority, Task, TaskId};

use crate::event::UpdaterEvent;

/// Settings tag carrying the slice crosshair.
///
/// Kept inside the settings state so that a settings change can preserve
/// the crosshair already aimed at this updater's slice.
pub const CROSSHAIR_TAG: &str = "crosshair";

/// How the updater walks its work list.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateMode {
    /// One item at a time, cancellation checked between items.
    Sequential,
    /// Per-item actor construction fans out on the rayon pool. Use for
    /// pipelines that build many expensive actors per change (meshes).
    Parallel,
}

/// Kind of refresh requested for an item.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum UpdateKind {
    /// Rebuild the item's actors from scratch.
    Rebuild,
    /// Reuse cached actors and refresh colors/visibility only.
    Recolor,
}

/// A registered source. The updater never owns item lifetimes; a dead
/// weak reference simply drops out of the next run.
struct SourceEntry {
    item: Weak<dyn ViewItem>,
    /// Per-item pipeline override, resolved once at registration.
    pipeline: Option<PipelineRef>,
}

struct UpdaterState {
    frame: Option<FrameRef>,
    crosshair: Vector3,
    resolution: Vector3,
    settings: RepresentationState,
    sources: HashMap<ItemId, SourceEntry>,
    requested: HashMap<ItemId, UpdateKind>,
    full_update: bool,
}

struct WorkItem {
    id: ItemId,
    item: ViewItemRef,
    pipeline: PipelineRef,
    kind: UpdateKind,
    cached: Option<Vec<ActorRef>>,
}

/// Background task computing actors for a set of sources for one frame.
pub struct RepresentationUpdater {
    id: TaskId,
    mode: UpdateMode,
    pipeline: PipelineRef,
    description: Mutex<String>,
    priority: AtomicU8,
    /// Epoch of the current parameters; bumped on every invalidation.
    generation: AtomicU64,
    /// True once a run completed for the current generation.
    finished: AtomicBool,
    state: RwLock<UpdaterState>,
    actors: RwLock<ActorMap>,
    events: Sender<UpdaterEvent>,
}

impl RepresentationUpdater {
    /// Creates an updater reporting on the given event channel.
    #[must_use]
    pub fn new(
        id: TaskId,
        pipeline: PipelineRef,
        mode: UpdateMode,
        events: Sender<UpdaterEvent>,
    ) -> Arc<Self> {
        Arc::new(Self {
            id,
            mode,
            pipeline,
            description: Mutex::new(String::new()),
            priority: AtomicU8::new(Priority::Normal.as_u8()),
            generation: AtomicU64::new(0),
            finished: AtomicBool::new(false),
            state: RwLock::new(UpdaterState {
                frame: None,
                crosshair: Vector3::default(),
                resolution: Vector3::default(),
                settings: RepresentationState::new(),
                sources: HashMap::new(),
                requested: HashMap::new(),
                full_update: false,
            }),
            actors: RwLock::new(ActorMap::new()),
            events,
        })
    }

    /// Registers an item to render. The per-item pipeline capability is
    /// resolved here, once, never per frame.
    pub fn add_source(&self, item: &ViewItemRef) {
        let mut state = self.state.write();
        let override_pipeline = item.temporal_pipeline();
        state.sources.insert(
            item.id(),
            SourceEntry {
                item: Arc::downgrade(item),
                pipeline: override_pipeline,
            },
        );
        state.requested.insert(item.id(), UpdateKind::Rebuild);
    }

    /// Unregisters an item and eagerly drops its cached actors.
    pub fn remove_source(&self, id: ItemId) {
        let mut state = self.state.write();
        state.sources.remove(&id);
        state.requested.remove(&id);
        drop(state);
        self.actors.write().remove(&id);
    }

    /// Returns true if the item is registered.
    #[must_use]
    pub fn has_source(&self, id: ItemId) -> bool {
        self.state.read().sources.contains_key(&id)
    }

    /// Returns the live registered items.
    #[must_use]
    pub fn sources(&self) -> Vec<ViewItemRef> {
        self.state
            .read()
            .sources
            .values()
            .filter_map(|entry| entry.item.upgrade())
            .collect()
    }

    /// Aims the updater at a slice crosshair. A changed crosshair forces
    /// a full rebuild on the next run.
    pub fn set_crosshair(&self, point: Vector3) {
        let mut state = self.state.write();
        if state.crosshair != point {
            state.crosshair = point;
            state.full_update = true;
        }
        state.settings.set_value(CROSSHAIR_TAG, point);
    }

    /// Current slice crosshair.
    #[must_use]
    pub fn crosshair(&self) -> Vector3 {
        self.state.read().crosshair
    }

    /// Updates the scene resolution.
    pub fn set_resolution(&self, resolution: Vector3) {
        let mut state = self.state.write();
        if state.resolution != resolution {
            state.resolution = resolution;
            state.full_update = true;
        }
    }

    /// Stamps the updater with the frame its next publication belongs to.
    pub fn set_frame(&self, frame: FrameRef) {
        self.state.write().frame = Some(frame);
    }

    /// Frame of the current parameters, if any.
    #[must_use]
    pub fn current_frame(&self) -> Option<FrameRef> {
        self.state.read().frame.clone()
    }

    /// Timestamp of the current frame, [`INVALID_TIMESTAMP`] when stale.
    #[must_use]
    pub fn timestamp(&self) -> TimeStamp {
        self.state
            .read()
            .frame
            .as_ref()
            .map_or(INVALID_TIMESTAMP, |frame| frame.time)
    }

    /// Merges new settings in, preserving the crosshair already aimed at
    /// this slice, and restarts any in-flight run.
    pub fn apply_settings(&self, settings: &RepresentationState) {
        let mut state = self.state.write();
        let crosshair = state.settings.get_value(CROSSHAIR_TAG).cloned();
        state.settings.apply(settings);
        if let Some(crosshair) = crosshair {
            state.settings.set_value(CROSSHAIR_TAG, crosshair);
        }
        state.full_update = true;
        self.generation.fetch_add(1, Ordering::AcqRel);
        self.finished.store(false, Ordering::Release);
    }

    /// Returns a copy of the current settings.
    #[must_use]
    pub fn settings(&self) -> RepresentationState {
        self.state.read().settings.clone()
    }

    /// Marks the updater stale: drops its frame, forces a rebuild and
    /// cancels any in-flight run.
    pub fn invalidate(&self) {
        let mut state = self.state.write();
        state.frame = None;
        state.full_update = true;
        self.generation.fetch_add(1, Ordering::AcqRel);
        self.finished.store(false, Ordering::Release);
    }

    /// Requests a rebuild of the given items on the next run.
    pub fn update_representations(&self, items: &[ItemId]) {
        let mut state = self.state.write();
        for id in items {
            if state.sources.contains_key(id) {
                state.requested.insert(*id, UpdateKind::Rebuild);
            }
        }
        self.finished.store(false, Ordering::Release);
    }

    /// Requests a recolor of the given items on the next run. A pending
    /// rebuild for the same item is not downgraded.
    pub fn update_representation_colors(&self, items: &[ItemId]) {
        let mut state = self.state.write();
        for id in items {
            if state.sources.contains_key(id) {
                state
                    .requested
                    .entry(*id)
                    .or_insert(UpdateKind::Recolor);
            }
        }
        self.finished.store(false, Ordering::Release);
    }

    /// Sets the human readable task description.
    pub fn set_description(&self, description: impl Into<String>) {
        *self.description.lock() = description.into();
    }

    /// Updates the scheduling priority. The scheduler reads it at
    /// dispatch time; pools re-key queued entries after calling this.
    pub fn set_priority(&self, priority: Priority) {
        self.priority.store(priority.as_u8(), Ordering::SeqCst);
    }

    /// True once a run completed for the current parameters.
    #[must_use]
    pub fn has_finished(&self) -> bool {
        self.finished.load(Ordering::Acquire)
    }

    /// Returns a frozen snapshot of the actor cache.
    #[must_use]
    pub fn actors_snapshot(&self) -> Actors {
        Arc::new(RwLock::new(self.actors.read().clone()))
    }

    /// Returns the items picked by a point, or the item owning a given
    /// actor. Runs on the UI thread under the actors read lock.
    #[must_use]
    pub fn pick(&self, point: &Vector3, actor: Option<&ActorRef>) -> Vec<ViewItemRef> {
        let mut picked = Vec::new();
        // Lock order everywhere: state before actors.
        let state = self.state.read();
        let actors = self.actors.read();

        if let Some(actor) = actor {
            for (id, item_actors) in actors.iter() {
                if item_actors.iter().any(|candidate| Arc::ptr_eq(candidate, actor)) {
                    if let Some(item) = state
                        .sources
                        .get(id)
                        .and_then(|entry| entry.item.upgrade())
                    {
                        picked.push(item);
                    }
                    break;
                }
            }
            return picked;
        }

        for (id, entry) in &state.sources {
            if !actors.contains_key(id) {
                continue;
            }
            let Some(item) = entry.item.upgrade() else {
                continue;
            };
            let pipeline = entry.pipeline.as_ref().unwrap_or(&self.pipeline);
            if pipeline.pick(item.as_ref(), point) {
                picked.push(item);
            }
        }
        picked
    }

    fn can_execute(&self, generation: u64) -> bool {
        self.generation.load(Ordering::Acquire) == generation
    }

    #[allow(clippy::cast_precision_loss)]
    fn report_progress(&self, done: usize, total: usize) {
        let fraction = done as f32 / total.max(1) as f32;
        let _ = self.events.send(UpdaterEvent::Progress {
            updater: self.id,
            description: self.description.lock().clone(),
            fraction,
        });
    }

    /// Snapshots frame, settings and work list under the state lock.
    fn snapshot(&self) -> (u64, RepresentationState, Vec<WorkItem>) {
        let mut state = self.state.write();
        // Read under the same lock invalidators bump it under, so the
        // snapshot and its generation are consistent.
        let generation = self.generation.load(Ordering::Acquire);
        let full = state.full_update;
        state.full_update = false;
        let requested = std::mem::take(&mut state.requested);

        let cache = self.actors.read();
        let mut work = Vec::new();
        for (id, entry) in &state.sources {
            let kind = if full {
                Some(UpdateKind::Rebuild)
            } else {
                requested.get(id).copied()
            };
            let Some(kind) = kind else { continue };
            let Some(item) = entry.item.upgrade() else {
                // Removed or dropped mid-flight: silently not refreshed.
                continue;
            };
            work.push(WorkItem {
                id: *id,
                item,
                pipeline: entry
                    .pipeline
                    .clone()
                    .unwrap_or_else(|| Arc::clone(&self.pipeline)),
                kind,
                cached: cache.get(id).cloned(),
            });
        }
        drop(cache);

        let settings = state.settings.clone();
        state.settings.commit();
        (generation, settings, work)
    }

    /// Builds or refreshes one item's actors.
    fn build_item(work: WorkItem, settings: &RepresentationState) -> (ItemId, Vec<ActorRef>) {
        let state = work
            .pipeline
            .representation_state(work.item.as_ref(), settings);
        let mut actors = match (work.kind, work.cached) {
            (UpdateKind::Recolor, Some(cached)) => cached,
            _ => work.pipeline.create_actors(work.item.as_ref(), &state),
        };
        work.pipeline
            .update_colors(&mut actors, work.item.as_ref(), &state);
        (work.id, actors)
    }

    /// Publishes the staged actors if this run is still current.
    fn publish(&self, generation: u64, staged: Vec<(ItemId, Vec<ActorRef>)>) {
        let frame = {
            // The read lock excludes invalidate()'s write-locked critical
            // section, so the generation check and the publication are
            // atomic with respect to invalidation.
            let state = self.state.read();
            if !self.can_execute(generation) {
                trace!("updater {} superseded before publish", self.id);
                return;
            }

            let mut cache = self.actors.write();
            for (id, actors) in staged {
                cache.insert(id, actors);
            }
            self.finished.store(true, Ordering::Release);

            match state.frame.clone() {
                Some(frame) if frame.is_valid() => frame,
                // Prefetch run: cache is warm, nothing to publish yet.
                _ => return,
            }
        };

        let _ = self.events.send(UpdaterEvent::ActorsReady {
            updater: self.id,
            frame,
            actors: self.actors_snapshot(),
        });
    }

    fn run_body(&self) {
        let (generation, settings, work) = self.snapshot();
        let total = work.len();

        let staged = match self.mode {
            UpdateMode::Sequential => {
                let mut staged = Vec::with_capacity(total);
                for (done, item) in work.into_iter().enumerate() {
                    if !self.can_execute(generation) {
                        trace!("updater {} cancelled mid-run", self.id);
                        return;
                    }
                    staged.push(Self::build_item(item, &settings));
                    self.report_progress(done + 1, total);
                }
                staged
            }
            UpdateMode::Parallel => {
                let counter = AtomicUsize::new(0);
                let results: Vec<Option<(ItemId, Vec<ActorRef>)>> = work
                    .into_par_iter()
                    .map(|item| {
                        if !self.can_execute(generation) {
                            return None;
                        }
                        let built = Self::build_item(item, &settings);
                        let done = counter.fetch_add(1, Ordering::Relaxed) + 1;
                        self.report_progress(done, total);
                        Some(built)
                    })
                    .collect();
                if results.iter().any(Option::is_none) {
                    trace!("updater {} cancelled mid-run", self.id);
                    return;
                }
                results.into_iter().flatten().collect()
            }
        };

        self.publish(generation, staged);
    }
}

impl Task for RepresentationUpdater {
    fn id(&self) -> TaskId {
        self.id
    }

    fn description(&self) -> String {
        self.description.lock().clone()
    }

    fn priority(&self) -> Priority {
        Priority::from_u8(self.priority.load(Ordering::SeqCst))
    }

    fn run(&self) {
        self.run_body();
    }
}

/// Convenience accessor for the crosshair stored in a settings state.
#[must_use]
pub fn settings_crosshair(settings: &RepresentationState) -> Option<Vector3> {
    match settings.get_value(CROSSHAIR_TAG) {
        Some(StateValue::Vector(point)) => Some(*point),
        _ => None,
    }
}
