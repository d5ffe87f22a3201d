use chrono::{TimeZone, Utc};
use serde_json::json;
use std::time::Duration;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use epg_harvester::config::{FetchConfig, Zap2itSourceConfig};
use epg_harvester::errors::FetchError;
use epg_harvester::ingestor::{ChunkedFetcher, FetchOptions, RetryPolicy};
use epg_harvester::observability::CollectingSink;
use epg_harvester::sources::zap2it::Zap2itSource;

fn grid_body() -> serde_json::Value {
    json!({
        "channels": [{
            "stationId": "19629",
            "callSign": "WABC",
            "affiliateName": "ABC",
            "channelNo": "7.1",
            "thumbnail": "//zap2it.tmsimg.com/assets/s10003_h3_aa.png",
            "events": [{
                "startTime": "2024-03-01T18:00:00Z",
                "endTime": "2024-03-01T18:30:00Z",
                "duration": "30",
                "flag": ["New"],
                "program": {
                    "title": "Eyewitness News",
                    "tmsId": "EP000191906789",
                    "seriesId": "SH00019190"
                }
            }]
        }]
    })
}

fn source(server: &MockServer, chunk_hours: u32) -> Zap2itSource {
    let config = Zap2itSourceConfig {
        name: "zap2it".to_string(),
        required: true,
        lineup_id: "USA-OTA10001".to_string(),
        postal_code: Some("10001".to_string()),
        country: "USA".to_string(),
        prefer_affiliate_names: false,
        user_id: Some("cafebabe".to_string()),
        grid_url: format!("{}/api/grid", server.uri()),
        landing_url: format!("{}/", server.uri()),
    };
    let fetch = FetchConfig {
        chunk_hours,
        request_timeout: Duration::from_secs(5),
        ..FetchConfig::default()
    };
    Zap2itSource::new(config, &fetch).unwrap()
}

fn options(total_hours: u32, max_retries: u32) -> FetchOptions {
    FetchOptions {
        total_hours,
        inter_chunk_delay: Duration::ZERO,
        retry: RetryPolicy {
            max_retries,
            base_delay: Duration::from_millis(5),
            max_delay: Duration::from_millis(20),
            max_jitter: Duration::ZERO,
        },
    }
}

async fn grid_requests(server: &MockServer) -> Vec<wiremock::Request> {
    server
        .received_requests()
        .await
        .unwrap_or_default()
        .into_iter()
        .filter(|r| r.url.path() == "/api/grid")
        .collect()
}

#[tokio::test]
async fn test_retries_server_errors_then_parses_grid() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/grid"))
        .respond_with(ResponseTemplate::new(500))
        .up_to_n_times(2)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/grid"))
        .and(query_param("lineupId", "USA-lineupId-DEFAULT"))
        .and(query_param("timespan", "6"))
        .and(query_param("postalCode", "10001"))
        .respond_with(ResponseTemplate::new(200).set_body_json(grid_body()))
        .mount(&server)
        .await;

    let sink = CollectingSink::new();
    let fetcher = ChunkedFetcher::new(sink.clone());
    let anchor = Utc.with_ymd_and_hms(2024, 3, 1, 18, 0, 0).unwrap();

    let (fragment, report) = fetcher
        .fetch_at(&source(&server, 6), &options(6, 3), anchor)
        .await
        .unwrap();

    assert_eq!(report.windows, 1);
    assert_eq!(report.attempts, 3);
    assert_eq!(report.retries, 2);
    assert_eq!(grid_requests(&server).await.len(), 3);
    assert_eq!(sink.count_matching("fetcher", "Retrying window"), 2);

    let channel = fragment.channel("19629").unwrap();
    assert_eq!(channel.preferred_name(), "WABC");
    assert_eq!(channel.number.as_deref(), Some("7.1"));
    let programs = fragment.programs_for("19629");
    assert_eq!(programs.len(), 1);
    assert_eq!(programs[0].title, "Eyewitness News");
    assert!(programs[0].flags.new);
}

#[tokio::test]
async fn test_exhausted_rate_limit_stops_before_next_window() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/grid"))
        .respond_with(ResponseTemplate::new(429))
        .mount(&server)
        .await;

    let fetcher = ChunkedFetcher::new(CollectingSink::new());
    let anchor = Utc.with_ymd_and_hms(2024, 3, 1, 18, 0, 0).unwrap();

    let err = fetcher
        .fetch_at(&source(&server, 6), &options(12, 2), anchor)
        .await
        .unwrap_err();
    assert_eq!(err, FetchError::RateLimited);
    assert!(err.is_transient());

    let requests = grid_requests(&server).await;
    assert_eq!(requests.len(), 3);
    let first_window = anchor.timestamp().to_string();
    assert!(requests.iter().all(|r| r
        .url
        .query_pairs()
        .any(|(k, v)| k == "time" && v == first_window.as_str())));
}

#[tokio::test]
async fn test_client_error_is_not_retried() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/grid"))
        .respond_with(ResponseTemplate::new(403))
        .mount(&server)
        .await;

    let fetcher = ChunkedFetcher::new(CollectingSink::new());
    let err = fetcher
        .fetch(&source(&server, 6), &options(6, 3))
        .await
        .unwrap_err();
    assert_eq!(err, FetchError::ClientError { status: 403 });
    assert_eq!(grid_requests(&server).await.len(), 1);
}

#[tokio::test]
async fn test_malformed_json_is_invalid_response() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/grid"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>maintenance</html>"))
        .mount(&server)
        .await;

    let fetcher = ChunkedFetcher::new(CollectingSink::new());
    let err = fetcher
        .fetch(&source(&server, 6), &options(6, 3))
        .await
        .unwrap_err();
    assert!(matches!(err, FetchError::InvalidResponse { .. }));
    assert_eq!(grid_requests(&server).await.len(), 1);
}

#[tokio::test]
async fn test_windows_walk_the_timespan() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/grid"))
        .respond_with(ResponseTemplate::new(200).set_body_json(grid_body()))
        .mount(&server)
        .await;

    let fetcher = ChunkedFetcher::new(CollectingSink::new());
    let anchor = Utc.with_ymd_and_hms(2024, 3, 1, 0, 0, 0).unwrap();
    let (_, report) = fetcher
        .fetch_at(&source(&server, 6), &options(20, 0), anchor)
        .await
        .unwrap();
    assert_eq!(report.windows, 4);

    let times: Vec<i64> = grid_requests(&server)
        .await
        .iter()
        .filter_map(|r| {
            r.url
                .query_pairs()
                .find(|(k, _)| k == "time")
                .and_then(|(_, v)| v.parse().ok())
        })
        .collect();
    let expected: Vec<i64> = (0..4).map(|i| anchor.timestamp() + i * 6 * 3600).collect();
    assert_eq!(times, expected);
}
