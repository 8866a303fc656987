//! HTTP client for The Blue Alliance read API.
//!
//! Every path keeps the last ETag and body it was served with. Requests send
//! `If-None-Match`, and a `304` surfaces as [`Fetched::Unchanged`].

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{header, Client, StatusCode};

use super::wire;
use super::{CacheKey, Fetched, Upstream};
use crate::errors::UpstreamError;
use crate::models::{Event, EventTeamRanking, Match, Team};

/// Header carrying the read API key.
pub const API_KEY_HEADER: &str = "X-TBA-Auth-Key";

/// Largest response body accepted, comfortably above a full season event list.
const MAX_RESPONSE_SIZE: usize = 8 * 1024 * 1024;

/// Upper bound on team pages walked in one fetch.
const MAX_TEAM_PAGES: u32 = 64;

#[derive(Debug, Clone)]
struct CachedBody {
    etag: String,
    body: Vec<u8>,
}

/// Client for The Blue Alliance v3 API.
pub struct TbaClient {
    http: Client,
    base_url: String,
    api_key: Option<String>,
    cache: Mutex<HashMap<String, CachedBody>>,
}

impl TbaClient {
    /// Create a client for `base_url` (e.g. `https://www.thebluealliance.com/api/v3`).
    pub fn new(
        base_url: impl Into<String>,
        api_key: Option<String>,
        timeout: Duration,
    ) -> Result<Self, reqwest::Error> {
        let http = Client::builder().timeout(timeout).build()?;

        Ok(Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key,
            cache: Mutex::new(HashMap::new()),
        })
    }

    fn cached(&self, path: &str) -> Option<CachedBody> {
        self.cache
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .get(path)
            .cloned()
    }

    fn remember(&self, path: &str, etag: String, body: &[u8]) {
        self.cache
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .insert(
                path.to_string(),
                CachedBody {
                    etag,
                    body: body.to_vec(),
                },
            );
    }

    /// Drop a cached body that failed to decode, so the next fetch is unconditional.
    fn forget(&self, path: &str) {
        self.cache
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .remove(path);
    }

    fn forget_prefix(&self, prefix: &str) {
        self.cache
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .retain(|path, _| !path.starts_with(prefix));
    }

    /// Issue one conditional GET for `path`.
    async fn request(&self, path: &str) -> Result<Fetched<Vec<u8>>, UpstreamError> {
        let http_err = |source: reqwest::Error| UpstreamError::Http {
            path: path.to_string(),
            source,
        };

        let mut req = self.http.get(format!("{}{}", self.base_url, path));
        if let Some(key) = &self.api_key {
            req = req.header(API_KEY_HEADER, key);
        }
        if let Some(cached) = self.cached(path) {
            req = req.header(header::IF_NONE_MATCH, cached.etag);
        }

        let mut resp = req.send().await.map_err(http_err)?;

        if resp.status() == StatusCode::NOT_MODIFIED {
            tracing::debug!(path, "not modified");
            return Ok(Fetched::Unchanged);
        }

        if !resp.status().is_success() {
            return Err(UpstreamError::Status {
                path: path.to_string(),
                status: resp.status().as_u16(),
            });
        }

        let etag = resp
            .headers()
            .get(header::ETAG)
            .and_then(|v| v.to_str().ok())
            .map(|s| s.to_string());

        let too_large = || UpstreamError::TooLarge {
            path: path.to_string(),
            limit: MAX_RESPONSE_SIZE,
        };

        if resp
            .content_length()
            .is_some_and(|len| len > MAX_RESPONSE_SIZE as u64)
        {
            return Err(too_large());
        }

        let mut body = Vec::new();
        while let Some(chunk) = resp.chunk().await.map_err(http_err)? {
            if body.len() + chunk.len() > MAX_RESPONSE_SIZE {
                return Err(too_large());
            }
            body.extend_from_slice(&chunk);
        }

        if let Some(etag) = etag {
            self.remember(path, etag, &body);
        }

        Ok(Fetched::Data(body))
    }

    /// Like [`request`](Self::request), but an unchanged page is replaced by the body
    /// it was last served with. Returns the body and whether it changed.
    async fn request_page(&self, path: &str) -> Result<(Vec<u8>, bool), UpstreamError> {
        match self.request(path).await? {
            Fetched::Data(body) => Ok((body, true)),
            Fetched::Unchanged => match self.cached(path) {
                Some(cached) => Ok((cached.body, false)),
                None => Err(UpstreamError::Invalid {
                    path: path.to_string(),
                    message: "not modified without a cached body".to_string(),
                }),
            },
        }
    }
}

#[async_trait]
impl Upstream for TbaClient {
    async fn get_events(&self, year: i32) -> Result<Fetched<Vec<Event>>, UpstreamError> {
        let path = format!("/events/{}", year);
        match self.request(&path).await? {
            Fetched::Unchanged => Ok(Fetched::Unchanged),
            Fetched::Data(body) => wire::decode_events(&path, year, &body)
                .inspect_err(|_| self.forget(&path))
                .map(Fetched::Data),
        }
    }

    /// Walks `/teams/{page}` until an empty page. The roster only counts as
    /// unchanged when every page was.
    async fn get_teams(&self) -> Result<Fetched<Vec<Team>>, UpstreamError> {
        let mut teams = Vec::new();
        let mut changed = false;

        for page in 0..MAX_TEAM_PAGES {
            let path = format!("/teams/{}", page);
            let (body, page_changed) = self.request_page(&path).await?;
            changed |= page_changed;

            let page_teams = wire::decode_teams(&path, &body).inspect_err(|_| self.forget(&path))?;
            if page_teams.is_empty() {
                return if changed {
                    Ok(Fetched::Data(teams))
                } else {
                    Ok(Fetched::Unchanged)
                };
            }
            teams.extend(page_teams);
        }

        // Pages already walked may have refreshed their cache entries.
        self.forget_prefix("/teams/");
        Err(UpstreamError::Invalid {
            path: "/teams".to_string(),
            message: format!("no empty page within {} pages", MAX_TEAM_PAGES),
        })
    }

    async fn get_matches(&self, event_key: &str) -> Result<Fetched<Vec<Match>>, UpstreamError> {
        let path = format!("/event/{}/matches/simple", event_key);
        match self.request(&path).await? {
            Fetched::Unchanged => Ok(Fetched::Unchanged),
            Fetched::Data(body) => {
                wire::decode_matches(&path, event_key, &body)
                    .inspect_err(|_| self.forget(&path))
                    .map(Fetched::Data)
            }
        }
    }

    async fn get_team_rankings(
        &self,
        event_key: &str,
    ) -> Result<Fetched<Vec<EventTeamRanking>>, UpstreamError> {
        let path = format!("/event/{}/rankings", event_key);
        match self.request(&path).await? {
            Fetched::Unchanged => Ok(Fetched::Unchanged),
            Fetched::Data(body) => {
                wire::decode_rankings(&path, event_key, &body)
                    .inspect_err(|_| self.forget(&path))
                    .map(Fetched::Data)
            }
        }
    }

    async fn ping(&self) -> Result<(), UpstreamError> {
        let path = "/status";
        let mut req = self.http.get(format!("{}{}", self.base_url, path));
        if let Some(key) = &self.api_key {
            req = req.header(API_KEY_HEADER, key);
        }

        let resp = req.send().await.map_err(|source| UpstreamError::Http {
            path: path.to_string(),
            source,
        })?;

        if !resp.status().is_success() {
            return Err(UpstreamError::Status {
                path: path.to_string(),
                status: resp.status().as_u16(),
            });
        }
        Ok(())
    }

    fn invalidate(&self, key: CacheKey<'_>) {
        match key {
            CacheKey::Events(year) => self.forget(&format!("/events/{}", year)),
            CacheKey::Teams => self.forget_prefix("/teams/"),
            CacheKey::Matches(event_key) => {
                self.forget(&format!("/event/{}/matches/simple", event_key))
            }
            CacheKey::Rankings(event_key) => self.forget(&format!("/event/{}/rankings", event_key)),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    use axum::{
        extract::{Path, State},
        http::{HeaderMap, StatusCode},
        response::IntoResponse,
        routing::get,
        Router,
    };

    use super::*;

    const API_KEY: &str = "notARealKey";

    #[derive(Clone, Default)]
    struct FakeTba {
        hits: Arc<AtomicUsize>,
    }

    fn authorized(headers: &HeaderMap) -> bool {
        headers.get(API_KEY_HEADER).and_then(|v| v.to_str().ok()) == Some(API_KEY)
    }

    async fn events(State(fake): State<FakeTba>, headers: HeaderMap) -> impl IntoResponse {
        fake.hits.fetch_add(1, Ordering::SeqCst);
        if !authorized(&headers) {
            return StatusCode::UNAUTHORIZED.into_response();
        }
        if headers.get("if-none-match").and_then(|v| v.to_str().ok()) == Some("\"v1\"") {
            return StatusCode::NOT_MODIFIED.into_response();
        }
        (
            [("etag", "\"v1\"")],
            r#"[{"key": "2019orwil", "name": "Wilsonville", "start_date": "2019-03-08", "end_date": "2019-03-10"}]"#,
        )
            .into_response()
    }

    async fn teams(Path(page): Path<u32>, headers: HeaderMap) -> impl IntoResponse {
        let etag = format!("\"page{}\"", page);
        if headers.get("if-none-match").and_then(|v| v.to_str().ok()) == Some(etag.as_str()) {
            return StatusCode::NOT_MODIFIED.into_response();
        }
        let body = match page {
            0 => r#"[{"key": "frc1", "team_number": 1}, {"key": "frc2", "team_number": 2}]"#,
            1 => r#"[{"key": "frc501", "team_number": 501}]"#,
            _ => "[]",
        };
        ([("etag", etag)], body).into_response()
    }

    async fn matches(Path(event_key): Path<String>) -> impl IntoResponse {
        if event_key == "2019broken" {
            return StatusCode::INTERNAL_SERVER_ERROR.into_response();
        }
        r#"[{"key": "2019orwil_qm1", "alliances": {"red": {"score": 10, "team_keys": []}, "blue": {"score": -1, "team_keys": []}}}]"#
            .into_response()
    }

    async fn rankings() -> impl IntoResponse {
        "{not json"
    }

    async fn spawn_fake(fake: FakeTba) -> String {
        let app = Router::new()
            .route("/events/{year}", get(events))
            .route("/teams/{page}", get(teams))
            .route("/event/{key}/matches/simple", get(matches))
            .route("/event/{key}/rankings", get(rankings))
            .route("/status", get(|| async { "{}" }))
            .with_state(fake);

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        format!("http://{}", addr)
    }

    fn client(base_url: &str, key: &str) -> TbaClient {
        TbaClient::new(base_url, Some(key.to_string()), Duration::from_secs(5)).unwrap()
    }

    #[tokio::test]
    async fn test_events_etag_round_trip() {
        let fake = FakeTba::default();
        let url = spawn_fake(fake.clone()).await;
        let tba = client(&url, API_KEY);

        let first = tba.get_events(2019).await.unwrap();
        match first {
            Fetched::Data(events) => {
                assert_eq!(events.len(), 1);
                assert_eq!(events[0].key, "2019orwil");
            }
            Fetched::Unchanged => panic!("first fetch cannot be unchanged"),
        }

        let second = tba.get_events(2019).await.unwrap();
        assert!(matches!(second, Fetched::Unchanged));
        assert_eq!(fake.hits.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_bad_key_is_status_error() {
        let url = spawn_fake(FakeTba::default()).await;
        let tba = client(&url, "wrong");

        let err = tba.get_events(2019).await.unwrap_err();
        assert!(matches!(err, UpstreamError::Status { status: 401, .. }));
    }

    #[tokio::test]
    async fn test_teams_walks_pages() {
        let url = spawn_fake(FakeTba::default()).await;
        let tba = client(&url, API_KEY);

        let Fetched::Data(teams) = tba.get_teams().await.unwrap() else {
            panic!("expected teams");
        };
        let keys: Vec<_> = teams.iter().map(|t| t.key.as_str()).collect();
        assert_eq!(keys, vec!["frc1", "frc2", "frc501"]);

        assert!(matches!(tba.get_teams().await.unwrap(), Fetched::Unchanged));

        tba.invalidate(CacheKey::Teams);
        let Fetched::Data(teams) = tba.get_teams().await.unwrap() else {
            panic!("expected a full roster after invalidation");
        };
        assert_eq!(teams.len(), 3);
    }

    #[tokio::test]
    async fn test_matches_and_failures() {
        let url = spawn_fake(FakeTba::default()).await;
        let tba = client(&url, API_KEY);

        let Fetched::Data(matches) = tba.get_matches("2019orwil").await.unwrap() else {
            panic!("expected matches");
        };
        assert_eq!(matches[0].red_score, Some(10));
        assert_eq!(matches[0].blue_score, None);

        let err = tba.get_matches("2019broken").await.unwrap_err();
        assert!(matches!(err, UpstreamError::Status { status: 500, .. }));

        let err = tba.get_team_rankings("2019orwil").await.unwrap_err();
        assert!(matches!(err, UpstreamError::Decode { .. }));

        tba.ping().await.unwrap();
    }

    #[tokio::test]
    async fn test_teams_without_terminating_page_is_rejected() {
        let app = Router::new().route(
            "/teams/{page}",
            get(|Path(page): Path<u32>| async move {
                (
                    [("etag", format!("\"page{}\"", page))],
                    format!(r#"[{{"key": "frc{0}", "team_number": {0}}}]"#, page + 1),
                )
            }),
        );
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        let tba = client(&format!("http://{}", addr), API_KEY);
        let err = tba.get_teams().await.unwrap_err();
        assert!(matches!(err, UpstreamError::Invalid { .. }));
        assert!(tba.cached("/teams/0").is_none());
    }

    #[tokio::test]
    async fn test_unreachable_upstream() {
        let tba = TbaClient::new("http://127.0.0.1:1", None, Duration::from_secs(1)).unwrap();
        let err = tba.get_teams().await.unwrap_err();
        assert!(matches!(err, UpstreamError::Http { .. }));
        assert!(tba.ping().await.is_err());
    }
}
