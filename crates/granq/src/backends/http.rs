//! # 📡 THE HTTP GRANULE API BACKEND
//!
//! 🎬 COLD OPEN: INT. METADATA SERVICE, LOAD BALANCER, 3:47 AM
//!
//! Forty batches arrive at once. Each one wants its granules marked `queued` before it is
//! allowed to leave. The service sighs, checks the bearer token, and starts writing.
//!
//! Endpoints, relative to the configured base URL:
//! - `GET   /collections/{name}/{version}`
//! - `GET   /providers/{id}`
//! - `PATCH /granules/{collectionId}/{granuleId}` with a [`GranuleStatusUpdate`] body
//!
//! Path segments are percent-encoded, so a granule id with a space or slash stays one
//! segment. Any non-2xx status is an error carrying the response body, because the body
//! is where the service explains itself.
//!
//! 🔄 No retries here. Retries are the caller's problem. Good luck.
//!
//! 🦆

use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use async_trait::async_trait;
use reqwest::{RequestBuilder, Response, Url, header::CONTENT_TYPE};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use tracing::{debug, trace};

use crate::backends::GranuleApi;
use crate::common::{Collection, GranuleStatusUpdate, Provider};

/// 📡 Where the granule API lives and how to knock.
#[derive(Deserialize, Clone)]
pub struct HttpApiConfig {
    /// 📡 Base URL, scheme and all. A path prefix (`https://host/api/v1`) is fine.
    pub url: String,
    /// 🔒 Sent as `Authorization: Bearer <token>` when present.
    #[serde(default)]
    pub token: Option<String>,
    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

fn default_connect_timeout_secs() -> u64 {
    10
}

fn default_request_timeout_secs() -> u64 {
    30
}

// 🎭 manual Debug so the token never ends up in a log line
impl std::fmt::Debug for HttpApiConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpApiConfig")
            .field("url", &self.url)
            .field("token", &self.token.as_ref().map(|_| "<redacted>"))
            .field("connect_timeout_secs", &self.connect_timeout_secs)
            .field("request_timeout_secs", &self.request_timeout_secs)
            .finish()
    }
}

/// 🗄️ The granule API over HTTP. One `reqwest::Client`, reused for every call.
#[derive(Debug)]
pub struct HttpApi {
    client: reqwest::Client,
    base_url: Url,
    config: HttpApiConfig,
}

impl HttpApi {
    /// 🚀 Build the client with the configured timeouts and validate the base URL.
    ///
    /// No connectivity ping: the first lookup finds out soon enough, and it fails with
    /// the same error a ping would.
    pub fn new(config: HttpApiConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(config.connect_timeout_secs))
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()
            .context("💀 The HTTP client refused to be born. Probably the TLS stack. Either way: tragic.")?;
        let base_url = Url::parse(&config.url).with_context(|| {
            format!("💀 '{}' is not a URL the granule API could possibly live at", config.url)
        })?;
        if base_url.cannot_be_a_base() {
            anyhow::bail!("💀 '{}' cannot have paths appended to it. Include the scheme (https://...).", config.url);
        }
        Ok(Self {
            client,
            base_url,
            config,
        })
    }

    /// 🧭 Base URL + percent-encoded segments.
    fn endpoint(&self, segments: &[&str]) -> Result<Url> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| anyhow!("💀 '{}' cannot have paths appended to it", self.config.url))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.config.token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    async fn get_json<T: DeserializeOwned>(&self, url: Url) -> Result<T> {
        trace!("📡 GET {url}");
        let response = self
            .authorize(self.client.get(url.clone()))
            .send()
            .await
            .with_context(|| format!("💀 GET {url} never made it. Check connectivity, timeouts, and feelings."))?;
        let response = ensure_success(response, "GET", &url).await?;
        let bytes = response
            .bytes()
            .await
            .with_context(|| format!("💀 GET {url} hung up halfway through the body"))?;
        serde_json::from_slice(&bytes)
            .with_context(|| format!("💀 GET {url} answered, but not in a shape we recognise"))
    }
}

/// 🚦 Turn a non-2xx response into an error that quotes the service's own explanation.
async fn ensure_success(response: Response, verb: &str, url: &Url) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    anyhow::bail!("💀 {verb} {url} came back {status}. The service said: '{body}'")
}

#[async_trait]
impl GranuleApi for HttpApi {
    async fn get_collection(&self, name: &str, version: &str) -> Result<Collection> {
        let url = self.endpoint(&["collections", name, version])?;
        self.get_json(url).await
    }

    async fn get_provider(&self, provider_id: &str) -> Result<Provider> {
        let url = self.endpoint(&["providers", provider_id])?;
        self.get_json(url).await
    }

    async fn update_granule(&self, update: &GranuleStatusUpdate) -> Result<()> {
        let url = self.endpoint(&["granules", &update.collection_id, &update.granule_id])?;
        let body = serde_json::to_vec(update).context("💀 the status update refused to serialize")?;
        let response = self
            .authorize(self.client.patch(url.clone()))
            .header(CONTENT_TYPE, "application/json")
            .body(body)
            .send()
            .await
            .with_context(|| format!("💀 PATCH {url} never made it to the granule API"))?;
        ensure_success(response, "PATCH", &url).await?;
        debug!("✍️ granule {} is officially queued", update.granule_id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::GranuleStatus;
    use serde_json::json;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn config(url: String, token: Option<&str>) -> HttpApiConfig {
        HttpApiConfig {
            url,
            token: token.map(str::to_string),
            connect_timeout_secs: 2,
            request_timeout_secs: 5,
        }
    }

    #[tokio::test]
    async fn the_one_where_a_collection_comes_back_with_its_extras() -> Result<()> {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/collections/MOD09GQ/006"))
            .and(header("authorization", "Bearer sekrit"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "name": "MOD09GQ",
                "version": "006",
                "granuleIdExtraction": "(.*)\\.hdf"
            })))
            .expect(1)
            .mount(&server)
            .await;

        let api = HttpApi::new(config(server.uri(), Some("sekrit")))?;
        let collection = api.get_collection("MOD09GQ", "006").await?;
        assert_eq!(collection.name, "MOD09GQ");
        assert_eq!(collection.extra["granuleIdExtraction"], "(.*)\\.hdf");
        Ok(())
    }

    #[tokio::test]
    async fn the_one_where_the_base_path_prefix_is_respected() -> Result<()> {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/v1/providers/daac"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"id": "daac", "host": "ftp"})))
            .expect(1)
            .mount(&server)
            .await;

        let api = HttpApi::new(config(format!("{}/api/v1/", server.uri()), None))?;
        let provider = api.get_provider("daac").await?;
        assert_eq!(provider.id, "daac");
        Ok(())
    }

    #[tokio::test]
    async fn the_one_where_queued_status_is_patched_in() -> Result<()> {
        let server = MockServer::start().await;
        Mock::given(method("PATCH"))
            .and(path("/granules/MOD09GQ___006/g-1"))
            .and(body_partial_json(json!({
                "granuleId": "g-1",
                "collectionId": "MOD09GQ___006",
                "status": "queued",
                "archived": false,
                "createdAt": 10
            })))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        let api = HttpApi::new(config(server.uri(), None))?;
        api.update_granule(&GranuleStatusUpdate {
            collection_id: "MOD09GQ___006".to_string(),
            granule_id: "g-1".to_string(),
            producer_granule_id: "g-1".to_string(),
            status: GranuleStatus::Queued,
            updated_at: Some(10),
            created_at: Some(10),
            archived: false,
        })
        .await?;
        Ok(())
    }

    #[tokio::test]
    async fn the_one_where_a_404_is_an_error_that_quotes_the_body() -> Result<()> {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/collections/NOPE/1"))
            .respond_with(ResponseTemplate::new(404).set_body_string("collection not found"))
            .mount(&server)
            .await;

        let api = HttpApi::new(config(server.uri(), None))?;
        let err = api.get_collection("NOPE", "1").await.expect_err("💀 a 404 should not be a collection");
        let message = format!("{err:#}");
        assert!(message.contains("404"), "{message}");
        assert!(message.contains("collection not found"), "{message}");
        Ok(())
    }

    #[test]
    fn the_one_where_a_garbage_url_is_refused_up_front() {
        assert!(HttpApi::new(config("not a url".to_string(), None)).is_err());
        assert!(HttpApi::new(config("mailto:someone@example.com".to_string(), None)).is_err());
    }

    #[test]
    fn the_one_where_the_token_stays_out_of_the_logs() {
        let rendered = format!("{:?}", config("http://localhost".to_string(), Some("hunter2")));
        assert!(!rendered.contains("hunter2"));
        assert!(rendered.contains("<redacted>"));
    }
}
