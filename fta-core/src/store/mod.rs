//! Client-side copy of the fault tree that edits apply to immediately.

pub mod optimistic;

pub use optimistic::OptimisticStore;
