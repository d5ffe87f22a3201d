//! XMLTV document source
//!
//! Pulls a complete XMLTV document from an http(s) URL or a local path. The
//! document already spans its own schedule, so the whole fetch is one window.

use async_trait::async_trait;
use tracing::debug;

use crate::config::{FetchConfig, XmltvSourceConfig};
use crate::errors::{AppError, AppResult, FetchError, FetchResult};
use crate::models::GuideFragment;
use crate::sources::traits::{FetchWindow, GuideSource};
use crate::utils::xmltv_parser::parse_xmltv_document;

pub struct XmltvSource {
    config: XmltvSourceConfig,
    client: reqwest::Client,
}

impl XmltvSource {
    pub fn new(config: XmltvSourceConfig, fetch: &FetchConfig) -> AppResult<Self> {
        let mut builder = reqwest::Client::builder().timeout(fetch.request_timeout);
        if let Some(ua) = fetch.user_agent.as_deref().filter(|ua| !ua.trim().is_empty()) {
            builder = builder.user_agent(ua.to_string());
        } else {
            builder = builder.user_agent(concat!("epg-harvester/", env!("CARGO_PKG_VERSION")));
        }
        let client = builder
            .build()
            .map_err(|e| AppError::configuration(format!("Failed to build HTTP client: {e}")))?;
        Ok(Self { config, client })
    }

    fn is_remote(&self) -> bool {
        let location = self.config.location.trim();
        location.starts_with("http://") || location.starts_with("https://")
    }

    async fn load(&self) -> FetchResult<String> {
        let location = self.config.location.trim();
        if self.is_remote() {
            let response = self
                .client
                .get(location)
                .send()
                .await
                .map_err(|e| FetchError::network(e.to_string()))?;
            let status = response.status();
            if !status.is_success() {
                return Err(FetchError::from_status(status.as_u16()));
            }
            response
                .text()
                .await
                .map_err(|e| FetchError::network(e.to_string()))
        } else {
            tokio::fs::read_to_string(location).await.map_err(|e| {
                FetchError::configuration("location", format!("Cannot read {location}: {e}"))
            })
        }
    }
}

#[async_trait]
impl GuideSource for XmltvSource {
    fn name(&self) -> &str {
        &self.config.name
    }

    fn validate(&self) -> FetchResult<()> {
        if self.config.location.trim().is_empty() {
            return Err(FetchError::configuration("location", "XMLTV location is required"));
        }
        Ok(())
    }

    async fn fetch_window(&self, window: &FetchWindow) -> FetchResult<GuideFragment> {
        let content = self.load().await?;
        let (fragment, stats) = parse_xmltv_document(&content)?;
        debug!(
            "Parsed XMLTV source '{}' window {}: {} channels, {} programs, {} skipped",
            self.config.name, window, stats.channels, stats.programs, stats.skipped_programs
        );
        Ok(fragment)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use std::io::Write;

    fn source(location: &str) -> XmltvSource {
        XmltvSource::new(
            XmltvSourceConfig {
                name: "local".to_string(),
                required: false,
                location: location.to_string(),
            },
            &FetchConfig::default(),
        )
        .unwrap()
    }

    fn window() -> FetchWindow {
        FetchWindow {
            index: 0,
            total: 1,
            start: Utc::now(),
            hours: 72,
        }
    }

    #[tokio::test]
    async fn test_reads_local_document() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"<tv><channel id="a"><display-name>Alpha</display-name></channel>
<programme start="20240301180000 +0000" stop="20240301190000 +0000" channel="a"><title>Show</title></programme></tv>"#
        )
        .unwrap();

        let source = source(file.path().to_str().unwrap());
        assert!(source.validate().is_ok());
        assert_eq!(source.chunk_hours(), None);

        let fragment = source.fetch_window(&window()).await.unwrap();
        assert_eq!(fragment.channel_count(), 1);
        assert_eq!(fragment.program_count(), 1);
    }

    #[tokio::test]
    async fn test_missing_file_is_configuration_error() {
        let err = source("/definitely/not/here.xml")
            .fetch_window(&window())
            .await
            .unwrap_err();
        assert!(matches!(err, FetchError::Configuration { .. }));
        assert!(!err.is_transient());
    }

    #[test]
    fn test_empty_location_fails_validation() {
        assert!(source("  ").validate().is_err());
    }
}
