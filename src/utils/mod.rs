//! Utility helpers shared across sources and the pipeline

pub mod jitter;
pub mod time;
pub mod xmltv_parser;
