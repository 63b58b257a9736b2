//! Forecast provider client.
//!
//! Retrieves the raw daily forecast for a location. The response body is
//! returned untouched; decoding and validation live in
//! [`parser`](crate::services::parser). Retry policy belongs to the sync
//! coordinator, so a failed request is reported once and never repeated here.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::header::{HeaderMap, HeaderValue, USER_AGENT};
use url::form_urlencoded;

use crate::settings::Location;

/// Raw provider response body.
#[derive(Debug, Clone)]
pub struct RawPayload {
    pub body: String,
    pub fetched_at: DateTime<Utc>,
}

#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("provider returned HTTP {0}")]
    Status(reqwest::StatusCode),

    #[error("invalid client configuration: {0}")]
    Config(String),
}

/// Source of raw forecast data.
#[async_trait]
pub trait ForecastFetcher: Send + Sync {
    async fn fetch(&self, location: &Location, days: u32) -> Result<RawPayload, FetchError>;
}

/// HTTP implementation against a configurable URL template.
///
/// The template may contain `{query}` (expanded to `q=...` or `lat=...&lon=...`)
/// and `{days}`.
#[derive(Debug, Clone)]
pub struct HttpForecastFetcher {
    client: reqwest::Client,
    url_template: String,
}

impl HttpForecastFetcher {
    pub fn new(url_template: &str, user_agent: &str, timeout: Duration) -> Result<Self, FetchError> {
        let mut headers = HeaderMap::new();
        headers.insert(
            USER_AGENT,
            HeaderValue::from_str(user_agent)
                .map_err(|e| FetchError::Config(format!("Invalid User-Agent: {}", e)))?,
        );

        let client = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(timeout)
            .build()?;

        Ok(Self {
            client,
            url_template: url_template.to_string(),
        })
    }
}

#[async_trait]
impl ForecastFetcher for HttpForecastFetcher {
    async fn fetch(&self, location: &Location, days: u32) -> Result<RawPayload, FetchError> {
        let url = render_url(&self.url_template, location, days);
        tracing::debug!("Fetching forecast for {} from {}", location, url);

        let response = self.client.get(&url).send().await?;

        if !response.status().is_success() {
            return Err(FetchError::Status(response.status()));
        }

        let body = response.text().await?;

        Ok(RawPayload {
            body,
            fetched_at: Utc::now(),
        })
    }
}

/// Expand the URL template for a location.
pub fn render_url(template: &str, location: &Location, days: u32) -> String {
    let query = match location {
        Location::Query { query } => {
            let encoded: String = form_urlencoded::byte_serialize(query.as_bytes()).collect();
            format!("q={}", encoded)
        }
        // Limit to 4 decimal places, same precision as the cache key
        Location::Coordinates {
            latitude,
            longitude,
        } => format!("lat={:.4}&lon={:.4}", latitude, longitude),
    };

    template
        .replace("{query}", &query)
        .replace("{days}", &days.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const TEMPLATE: &str = "https://example.test/forecast/daily?{query}&units=metric&cnt={days}";

    fn fetcher_for(server: &MockServer) -> HttpForecastFetcher {
        let template = format!("{}/forecast/daily?{{query}}&units=metric&cnt={{days}}", server.uri());
        HttpForecastFetcher::new(&template, "weather-cache-test/0.1", Duration::from_secs(2)).unwrap()
    }

    #[test]
    fn test_render_url_query_is_encoded() {
        let loc = Location::parse("Mountain View, CA").unwrap();
        assert_eq!(
            render_url(TEMPLATE, &loc, 14),
            "https://example.test/forecast/daily?q=Mountain+View%2C+CA&units=metric&cnt=14"
        );
    }

    #[test]
    fn test_render_url_coordinates() {
        let loc = Location::coordinates(37.42199, -122.08406).unwrap();
        assert_eq!(
            render_url(TEMPLATE, &loc, 7),
            "https://example.test/forecast/daily?lat=37.4220&lon=-122.0841&units=metric&cnt=7"
        );
    }

    #[test]
    fn test_invalid_user_agent_rejected() {
        let result = HttpForecastFetcher::new(TEMPLATE, "bad\nagent", Duration::from_secs(1));
        assert!(matches!(result, Err(FetchError::Config(_))));
    }

    #[tokio::test]
    async fn test_fetch_success_returns_body() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/forecast/daily"))
            .and(query_param("q", "94043"))
            .and(query_param("cnt", "14"))
            .and(header("user-agent", "weather-cache-test/0.1"))
            .respond_with(ResponseTemplate::new(200).set_body_string(r#"{"cod":"200","list":[]}"#))
            .expect(1)
            .mount(&server)
            .await;

        let payload = fetcher_for(&server)
            .fetch(&Location::parse("94043").unwrap(), 14)
            .await
            .unwrap();
        assert_eq!(payload.body, r#"{"cod":"200","list":[]}"#);
    }

    #[tokio::test]
    async fn test_fetch_non_success_status_is_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(503))
            .expect(1)
            .mount(&server)
            .await;

        let err = fetcher_for(&server)
            .fetch(&Location::parse("94043").unwrap(), 14)
            .await
            .unwrap_err();
        assert!(matches!(err, FetchError::Status(s) if s.as_u16() == 503));
    }

    #[tokio::test]
    async fn test_fetch_timeout_is_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(5)))
            .mount(&server)
            .await;

        let template = format!("{}/forecast/daily?{{query}}", server.uri());
        let fetcher =
            HttpForecastFetcher::new(&template, "weather-cache-test/0.1", Duration::from_millis(200))
                .unwrap();
        let err = fetcher
            .fetch(&Location::parse("94043").unwrap(), 14)
            .await
            .unwrap_err();
        assert!(matches!(err, FetchError::Request(_)));
    }
}
