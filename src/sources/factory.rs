//! Build guide sources from configuration

use std::sync::Arc;

use super::traits::GuideSource;
use super::xmltv::XmltvSource;
use super::zap2it::Zap2itSource;
use crate::config::{FetchConfig, SourceConfig};
use crate::errors::AppResult;

/// A source plus whether its failure aborts the refresh
#[derive(Clone)]
pub struct ConfiguredSource {
    pub source: Arc<dyn GuideSource>,
    pub required: bool,
}

impl ConfiguredSource {
    pub fn new(source: Arc<dyn GuideSource>, required: bool) -> Self {
        Self { source, required }
    }

    pub fn required(source: Arc<dyn GuideSource>) -> Self {
        Self::new(source, true)
    }

    pub fn optional(source: Arc<dyn GuideSource>) -> Self {
        Self::new(source, false)
    }

    pub fn name(&self) -> &str {
        self.source.name()
    }
}

pub struct SourceFactory;

impl SourceFactory {
    pub fn create(config: &SourceConfig, fetch: &FetchConfig) -> AppResult<ConfiguredSource> {
        let source: Arc<dyn GuideSource> = match config {
            SourceConfig::Zap2it(c) => Arc::new(Zap2itSource::new(c.clone(), fetch)?),
            SourceConfig::Xmltv(c) => Arc::new(XmltvSource::new(c.clone(), fetch)?),
        };
        Ok(ConfiguredSource::new(source, config.required()))
    }

    /// Build every configured source, in configuration order
    pub fn create_all(configs: &[SourceConfig], fetch: &FetchConfig) -> AppResult<Vec<ConfiguredSource>> {
        configs.iter().map(|c| Self::create(c, fetch)).collect()
    }
}
