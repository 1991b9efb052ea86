//! Timetable feed over HTTP(S)

use async_trait::async_trait;
use chrono::{Duration as ChronoDuration, NaiveDate};
use nextup_api::{Credential, Event, Timetable};
use nextup_host_api::{FetchError, HostError, HostResult, RemoteFetcher};
use reqwest::{Client, StatusCode};
use nextup_util::Clock;
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Body of a feed response
#[derive(Debug, Deserialize)]
struct FeedResponse {
    events: Vec<Event>,
}

/// Remote fetcher backed by a JSON feed endpoint
pub struct HttpFetcher {
    client: Client,
    url: Option<String>,
    days_ahead: u32,
    clock: Arc<dyn Clock>,
}

impl HttpFetcher {
    /// Create a fetcher for `url`, requesting `days_ahead` days starting
    /// from the current day of `clock`
    pub fn new(
        url: Option<String>,
        days_ahead: u32,
        timeout: Duration,
        clock: Arc<dyn Clock>,
    ) -> HostResult<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .connect_timeout(timeout)
            .user_agent(concat!("nextup/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| HostError::Internal(format!("Failed to create HTTP client: {}", e)))?;

        if url.is_none() {
            warn!("No feed URL configured, refreshes will fail until one is set");
        }

        Ok(Self {
            client,
            url,
            days_ahead,
            clock,
        })
    }
}

#[async_trait]
impl RemoteFetcher for HttpFetcher {
    async fn fetch(&self, credential: &Credential) -> Result<Timetable, FetchError> {
        let Some(url) = self.url.as_deref() else {
            return Err(FetchError::Transport("no feed URL configured".into()));
        };

        let (from, to) = date_range(self.clock.now().date(), self.days_ahead);
        debug!(url = %url, from = %from, to = %to, "Fetching timetable");

        let response = self
            .client
            .get(url)
            .basic_auth(credential.username(), Some(credential.secret()))
            .query(&[("from", from.to_string()), ("to", to.to_string())])
            .send()
            .await
            .map_err(|e| FetchError::Transport(e.to_string()))?;

        let status = response.status();
        if let Some(err) = classify_status(status) {
            warn!(url = %url, status = %status, "Feed request failed");
            return Err(err);
        }

        let body = response
            .text()
            .await
            .map_err(|e| FetchError::Transport(e.to_string()))?;

        let timetable = parse_feed(&body)?;
        info!(
            url = %url,
            event_count = timetable.len(),
            "Timetable fetched"
        );
        Ok(timetable)
    }
}

/// First and last day requested for a window of `days_ahead` days
pub fn date_range(today: NaiveDate, days_ahead: u32) -> (NaiveDate, NaiveDate) {
    let span = i64::from(days_ahead.max(1)) - 1;
    (today, today + ChronoDuration::days(span))
}

/// Map a non-success status to a fetch error
pub fn classify_status(status: StatusCode) -> Option<FetchError> {
    if status.is_success() {
        return None;
    }
    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => Some(FetchError::AuthenticationRejected),
        other => Some(FetchError::Transport(format!("HTTP {}", other))),
    }
}

/// Decode a feed body into a timetable
pub fn parse_feed(body: &str) -> Result<Timetable, FetchError> {
    let response: FeedResponse =
        serde_json::from_str(body).map_err(|e| FetchError::Parse(e.to_string()))?;
    Ok(Timetable::new(response.events))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;
    use nextup_util::ManualClock;
    use tokio::sync::oneshot;

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 3, d).unwrap()
    }

    /// Serve one canned HTTP response and hand back the raw request
    async fn serve_once(status_line: &'static str, body: &'static str) -> (String, oneshot::Receiver<String>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (tx, rx) = oneshot::channel();

        tokio::spawn(async move {
            let (mut stream, _) = listener.accept().await.unwrap();
            let mut buf = vec![0u8; 8192];
            let n = stream.read(&mut buf).await.unwrap();
            let _ = tx.send(String::from_utf8_lossy(&buf[..n]).into_owned());

            let response = format!(
                "HTTP/1.1 {}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                status_line,
                body.len(),
                body
            );
            stream.write_all(response.as_bytes()).await.unwrap();
            stream.shutdown().await.unwrap();
        });

        (format!("http://{}/timetable", addr), rx)
    }

    fn fetcher(url: String) -> HttpFetcher {
        HttpFetcher::new(Some(url), 7, Duration::from_secs(5), clock_at(day(17))).unwrap()
    }

    fn clock_at(date: NaiveDate) -> Arc<dyn Clock> {
        Arc::new(ManualClock::new(date.and_hms_opt(8, 30, 0).unwrap()))
    }

    #[test]
    fn test_date_range() {
        assert_eq!(date_range(day(17), 7), (day(17), day(23)));
        assert_eq!(date_range(day(17), 1), (day(17), day(17)));
        assert_eq!(date_range(day(17), 0), (day(17), day(17)));
    }

    #[test]
    fn test_classify_status() {
        assert!(classify_status(StatusCode::OK).is_none());
        assert_eq!(
            classify_status(StatusCode::UNAUTHORIZED),
            Some(FetchError::AuthenticationRejected)
        );
        assert_eq!(
            classify_status(StatusCode::FORBIDDEN),
            Some(FetchError::AuthenticationRejected)
        );
        assert!(matches!(
            classify_status(StatusCode::BAD_GATEWAY),
            Some(FetchError::Transport(_))
        ));
    }

    #[test]
    fn test_parse_feed() {
        let body = r#"{"events":[
            {"start":"2025-03-17T11:00:00","title":"Databases","location":"R2.010"},
            {"start":"2025-03-17T09:00:00","title":"Algorithms","location":"R1.006","cancelled":true}
        ]}"#;
        let timetable = parse_feed(body).unwrap();
        assert_eq!(timetable.len(), 2);
        assert!(timetable.events()[1].cancelled);

        assert!(matches!(parse_feed("<html>"), Err(FetchError::Parse(_))));
        assert!(matches!(parse_feed(r#"{"items":[]}"#), Err(FetchError::Parse(_))));
    }

    #[tokio::test]
    async fn test_missing_url() {
        let fetcher = HttpFetcher::new(None, 7, Duration::from_secs(1), clock_at(day(17))).unwrap();
        let result = fetcher.fetch(&Credential::new("student", "pw")).await;
        assert_eq!(
            result,
            Err(FetchError::Transport("no feed URL configured".into()))
        );
    }

    #[tokio::test]
    async fn test_fetch_success_sends_auth_and_range() {
        let (url, request) = serve_once(
            "200 OK",
            r#"{"events":[{"start":"2025-03-17T09:00:00","title":"Algorithms","location":"R1.006"}]}"#,
        )
        .await;

        let timetable = fetcher(url)
            .fetch(&Credential::new("student", "pw"))
            .await
            .unwrap();
        assert_eq!(timetable.len(), 1);
        assert_eq!(timetable.events()[0].title, "Algorithms");

        let request = request.await.unwrap();
        assert!(request.starts_with("GET /timetable?from=2025-03-17&to=2025-03-23 "));
        assert!(request.to_ascii_lowercase().contains("authorization: basic "));
    }

    #[tokio::test]
    async fn test_fetch_range_follows_clock() {
        let (url, request) = serve_once("200 OK", r#"{"events":[]}"#).await;

        let fetcher = HttpFetcher::new(Some(url), 3, Duration::from_secs(5), clock_at(day(30))).unwrap();
        fetcher.fetch(&Credential::new("student", "pw")).await.unwrap();

        let request = request.await.unwrap();
        assert!(request.starts_with("GET /timetable?from=2025-03-30&to=2025-04-01 "));
    }

    #[tokio::test]
    async fn test_fetch_unauthorized() {
        let (url, _request) = serve_once("401 Unauthorized", "").await;
        let result = fetcher(url).fetch(&Credential::new("student", "wrong")).await;
        assert_eq!(result, Err(FetchError::AuthenticationRejected));
    }

    #[tokio::test]
    async fn test_fetch_bad_body() {
        let (url, _request) = serve_once("200 OK", "not json").await;
        let result = fetcher(url).fetch(&Credential::new("student", "pw")).await;
        assert!(matches!(result, Err(FetchError::Parse(_))));
    }

    #[tokio::test]
    async fn test_fetch_unreachable() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let result = fetcher(format!("http://{}/timetable", addr))
            .fetch(&Credential::new("student", "pw"))
            .await;
        assert!(matches!(result, Err(FetchError::Transport(_))));
    }
}
