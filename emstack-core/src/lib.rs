//! emstack-core: Core types for the emstack representation update engine.
//!
//! This crate provides the value types and interface traits shared by the
//! scheduler and pool crates: render request frames, scene geometry,
//! diffable representation settings, and the pipeline/view-item seams the
//! application layer plugs into.

pub mod frame;
pub mod geometry;
pub mod pipeline;
pub mod state;

pub use frame::{Frame, FrameFlags, FrameRef, TimeStamp, INVALID_TIMESTAMP};
pub use geometry::{Axis, Bounds, Vector3};
pub use pipeline::{
    Actor, ActorMap, ActorRef, Actors, ItemId, ItemKind, Pipeline, PipelineRef, ViewItem,
    ViewItemRef,
};
pub use state::{RepresentationState, StateValue};
