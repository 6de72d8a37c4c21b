//! Interface traits between the update engine and the application layer.
//!
//! The engine never inspects the data it renders: it sees source items
//! through [`ViewItem`] (stable identity plus an optional per-item
//! pipeline override) and produces actors through [`Pipeline`]. Actors
//! are opaque handles; the render backend downcasts them on its side.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use parking_lot::RwLock;

use crate::geometry::Vector3;
use crate::state::RepresentationState;

/// Stable identity of a view item, used as actor map key.
pub type ItemId = u64;

/// Kind of source item a pool attends to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ItemKind {
    /// Raw image stack.
    Channel,
    /// Labeled segmentation.
    Segmentation,
}

/// A source item whose representation is computed by the engine.
///
/// Implementations live in the application's model layer. The engine
/// holds weak references only; it never owns item lifetimes.
pub trait ViewItem: Send + Sync {
    /// Stable identity, unique within a session.
    fn id(&self) -> ItemId;

    /// Item kind.
    fn kind(&self) -> ItemKind;

    /// Human readable name, used in task descriptions and logs.
    fn name(&self) -> String;

    /// Per-item pipeline override, if this item carries one.
    ///
    /// Items under interactive edition can supply a temporal pipeline
    /// that replaces the updater's default. Resolved once when the item
    /// is registered, not per frame.
    fn temporal_pipeline(&self) -> Option<PipelineRef> {
        None
    }
}

/// Shared handle to a view item.
pub type ViewItemRef = Arc<dyn ViewItem>;

/// An opaque renderable object produced by a pipeline.
///
/// Identity (pointer equality of the shared handle) is what the engine
/// relies on; everything else belongs to the render backend.
pub trait Actor: Send + Sync {
    /// Returns true if the actor should currently be composited.
    fn is_visible(&self) -> bool {
        true
    }
}

/// Shared handle to an actor.
pub type ActorRef = Arc<dyn Actor>;

/// Mapping from source item to its renderable representations.
pub type ActorMap = HashMap<ItemId, Vec<ActorRef>>;

/// A published actor map, shared between the updater (writer) and the
/// render/pick threads (readers).
pub type Actors = Arc<RwLock<ActorMap>>;

/// Builds and refreshes actors for view items.
pub trait Pipeline: Send + Sync {
    /// Pipeline kind tag, e.g. `"slice"` or `"contour"`.
    fn kind(&self) -> &str;

    /// Computes the per-item representation state for the given settings.
    fn representation_state(
        &self,
        item: &dyn ViewItem,
        settings: &RepresentationState,
    ) -> RepresentationState;

    /// Creates the actors for an item in the given state.
    fn create_actors(&self, item: &dyn ViewItem, state: &RepresentationState) -> Vec<ActorRef>;

    /// Refreshes colors/visibility of existing actors without rebuilding.
    fn update_colors(
        &self,
        actors: &mut Vec<ActorRef>,
        item: &dyn ViewItem,
        state: &RepresentationState,
    );

    /// Returns true if the item's representation contains the point.
    fn pick(&self, item: &dyn ViewItem, point: &Vector3) -> bool;
}

/// Shared handle to a pipeline.
pub type PipelineRef = Arc<dyn Pipeline>;

impl fmt::Debug for dyn ViewItem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ViewItem")
            .field("id", &self.id())
            .field("kind", &self.kind())
            .field("name", &self.name())
            .finish()
    }
}

/// Returns true if both actor maps hold the same actors for the same items.
///
/// Actors compare by handle identity, not content.
#[must_use]
pub fn actor_maps_equal(a: &ActorMap, b: &ActorMap) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.iter().all(|(id, actors)| {
        b.get(id).is_some_and(|others| {
            actors.len() == others.len()
                && actors
                    .iter()
                    .zip(others.iter())
                    .all(|(x, y)| Arc::ptr_eq(x, y))
        })
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    struct NullActor;
    impl Actor for NullActor {}

    #[test]
    fn actor_maps_compare_by_identity() {
        let actor: ActorRef = Arc::new(NullActor);
        let twin: ActorRef = Arc::new(NullActor);

        let mut a = ActorMap::new();
        a.insert(1, vec![actor.clone()]);
        let mut b = ActorMap::new();
        b.insert(1, vec![actor]);

        assert!(actor_maps_equal(&a, &b));

        b.insert(1, vec![twin]);
        assert!(!actor_maps_equal(&a, &b));
    }

    #[test]
    fn actor_maps_with_different_keys_differ() {
        let actor: ActorRef = Arc::new(NullActor);
        let mut a = ActorMap::new();
        a.insert(1, vec![actor.clone()]);
        let mut b = ActorMap::new();
        b.insert(2, vec![actor]);

        assert!(!actor_maps_equal(&a, &b));
    }
}
