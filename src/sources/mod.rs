//! Upstream guide sources

pub mod factory;
pub mod traits;
pub mod xmltv;
pub mod zap2it;

pub use factory::{ConfiguredSource, SourceFactory};
pub use traits::{FetchWindow, GuideSource};
