//! Test fixtures: in-memory view items, pipelines and actors.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use crossbeam_channel::{bounded, Receiver, Sender};

use emstack_core::{
    Actor, ActorRef, ItemId, ItemKind, Pipeline, PipelineRef, RepresentationState, Vector3,
    ViewItem, ViewItemRef,
};

/// A minimal renderable stand-in. The engine only ever tracks actor
/// handle identity, so no payload is needed.
pub struct TestActor;

impl Actor for TestActor {}

/// A source item with a fixed identity.
pub struct TestItem {
    id: ItemId,
    pipeline: Option<PipelineRef>,
}

impl TestItem {
    pub fn shared(id: ItemId) -> ViewItemRef {
        Arc::new(Self { id, pipeline: None })
    }

    /// An item carrying a per-item pipeline override.
    pub fn with_pipeline(id: ItemId, pipeline: PipelineRef) -> ViewItemRef {
        Arc::new(Self {
            id,
            pipeline: Some(pipeline),
        })
    }
}

impl ViewItem for TestItem {
    fn id(&self) -> ItemId {
        self.id
    }

    fn kind(&self) -> ItemKind {
        ItemKind::Segmentation
    }

    fn name(&self) -> String {
        format!("segmentation {}", self.id)
    }

    fn temporal_pipeline(&self) -> Option<PipelineRef> {
        self.pipeline.clone()
    }
}

/// Counting pipeline: one actor per item, picks points with x >= 0.
pub struct TestPipeline {
    pub created: AtomicUsize,
    pub recolored: AtomicUsize,
}

impl TestPipeline {
    pub fn shared() -> Arc<Self> {
        Arc::new(Self {
            created: AtomicUsize::new(0),
            recolored: AtomicUsize::new(0),
        })
    }
}

impl Pipeline for TestPipeline {
    fn kind(&self) -> &str {
        "test"
    }

    fn representation_state(
        &self,
        item: &dyn ViewItem,
        settings: &RepresentationState,
    ) -> RepresentationState {
        let mut state = settings.clone();
        state.set_value("item", i64::try_from(item.id()).unwrap_or(0));
        state
    }

    fn create_actors(&self, _item: &dyn ViewItem, _state: &RepresentationState) -> Vec<ActorRef> {
        self.created.fetch_add(1, Ordering::SeqCst);
        vec![Arc::new(TestActor)]
    }

    fn update_colors(
        &self,
        _actors: &mut Vec<ActorRef>,
        _item: &dyn ViewItem,
        _state: &RepresentationState,
    ) {
        self.recolored.fetch_add(1, Ordering::SeqCst);
    }

    fn pick(&self, _item: &dyn ViewItem, point: &Vector3) -> bool {
        point.x >= 0.0
    }
}

/// Synchronization handles for [`BlockingPipeline`].
pub struct BlockingGate {
    /// Fires when actor construction begins.
    pub started: Receiver<()>,
    /// Send to let the construction finish.
    pub release: Sender<()>,
}

/// Pipeline whose actor construction blocks until released, so tests can
/// invalidate an updater mid-run deterministically.
pub struct BlockingPipeline {
    started: Sender<()>,
    release: Receiver<()>,
}

impl BlockingPipeline {
    pub fn shared() -> (Arc<Self>, BlockingGate) {
        let (started_tx, started_rx) = bounded(1);
        let (release_tx, release_rx) = bounded(1);
        (
            Arc::new(Self {
                started: started_tx,
                release: release_rx,
            }),
            BlockingGate {
                started: started_rx,
                release: release_tx,
            },
        )
    }
}

impl Pipeline for BlockingPipeline {
    fn kind(&self) -> &str {
        "blocking"
    }

    fn representation_state(
        &self,
        _item: &dyn ViewItem,
        settings: &RepresentationState,
    ) -> RepresentationState {
        settings.clone()
    }

    fn create_actors(&self, _item: &dyn ViewItem, _state: &RepresentationState) -> Vec<ActorRef> {
        let _ = self.started.send(());
        let _ = self.release.recv();
        vec![Arc::new(TestActor)]
    }

    fn update_colors(
        &self,
        _actors: &mut Vec<ActorRef>,
        _item: &dyn ViewItem,
        _state: &RepresentationState,
    ) {
    }

    fn pick(&self, _item: &dyn ViewItem, _point: &Vector3) -> bool {
        false
    }
}
