//! Merge, render and publish guide data

pub mod generation;
pub mod merge;
pub mod orchestrator;
pub mod publish;

pub use generation::generate_xmltv;
pub use merge::{merge, merge_fragments, CollisionPolicy};
pub use orchestrator::{RefreshGuard, RefreshOrchestrator};
pub use publish::publish_document;
