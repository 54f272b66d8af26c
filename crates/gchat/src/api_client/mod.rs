mod error;
pub mod model;
pub mod send_message_output;
pub mod sse;

use std::sync::Arc;
use std::time::Duration;

pub use error::ApiClientError;
use futures::StreamExt;
use parking_lot::Mutex;
use tracing::{
    debug,
    error,
};

use crate::api_client::model::{
    ErrorResponse,
    GenerateContentRequest,
    GenerateContentResponse,
    Part,
};
use crate::api_client::send_message_output::{
    ChunkSource,
    SendMessageOutput,
};
use crate::cli::chat::tool_host::ToolHost;
use crate::settings::{
    Setting,
    Settings,
};
use crate::util::env_var::{
    GEMINI_API_KEY,
    GOOGLE_API_KEY,
};
use crate::util::DEFAULT_API_BASE_URL;

pub const API_KEY_HEADER: &str = "x-goog-api-key";

const DEFAULT_TIMEOUT_DURATION: Duration = Duration::from_secs(60 * 5);

#[derive(Clone, Debug)]
pub struct ApiClient {
    client: reqwest::Client,
    api_key: Option<String>,
    base_url: String,
    tool_host: Option<Arc<dyn ToolHost>>,
    mock_client: Option<Arc<Mutex<std::vec::IntoIter<Vec<GenerateContentResponse>>>>>,
}

impl ApiClient {
    pub fn new(settings: &Settings) -> Result<Self, ApiClientError> {
        let timeout = timeout(settings);
        let client = reqwest::Client::builder()
            .connect_timeout(timeout)
            .read_timeout(timeout)
            .user_agent(concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION")))
            .build()?;

        let base_url = settings
            .get_string(Setting::ApiBaseUrl)
            .unwrap_or_else(|| DEFAULT_API_BASE_URL.to_owned());

        Ok(Self {
            client,
            api_key: api_key_from_env(),
            base_url,
            tool_host: None,
            mock_client: None,
        })
    }

    /// A client that replays canned responses instead of calling the network.
    pub fn new_mock() -> Self {
        Self {
            client: reqwest::Client::new(),
            api_key: None,
            base_url: DEFAULT_API_BASE_URL.to_owned(),
            tool_host: None,
            mock_client: Some(Arc::new(Mutex::new(Vec::new().into_iter()))),
        }
    }

    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = Some(api_key.into());
        self
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    /// Host used to answer function calls for declared external tools.
    pub fn with_tool_host(mut self, tool_host: Arc<dyn ToolHost>) -> Self {
        self.tool_host = Some(tool_host);
        self
    }

    pub fn tool_host(&self) -> Option<&Arc<dyn ToolHost>> {
        self.tool_host.as_ref()
    }

    pub async fn send_message(
        &self,
        model_id: &str,
        request: GenerateContentRequest,
    ) -> Result<SendMessageOutput, ApiClientError> {
        debug!(model_id, "Sending request: {:#?}", request);
        let source = self.open_source(model_id, &request).await?;
        Ok(SendMessageOutput::new(self.clone(), model_id.to_owned(), request, source))
    }

    /// Opens one `streamGenerateContent` stream for the request.
    pub(crate) async fn open_source(
        &self,
        model_id: &str,
        request: &GenerateContentRequest,
    ) -> Result<ChunkSource, ApiClientError> {
        if let Some(mock) = &self.mock_client {
            let chunks = mock.lock().next().unwrap_or_default();
            return Ok(ChunkSource::Mock(chunks.into_iter().map(Ok).collect()));
        }

        let api_key = self.api_key.as_deref().ok_or(ApiClientError::MissingApiKey)?;
        let url = format!(
            "{}/models/{}:streamGenerateContent?alt=sse",
            self.base_url.trim_end_matches('/'),
            model_id
        );

        let response = self
            .client
            .post(&url)
            .header(API_KEY_HEADER, api_key)
            .json(request)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let message = match serde_json::from_str::<ErrorResponse>(&body) {
                Ok(ErrorResponse { error }) => error.message,
                Err(_) if body.trim().is_empty() => status.canonical_reason().unwrap_or("request failed").to_owned(),
                Err(_) => body,
            };
            error!(%status, %message, "request failed");
            return Err(ApiClientError::Api {
                status_code: status.as_u16(),
                message,
            });
        }

        Ok(ChunkSource::gemini(response.bytes_stream().boxed()))
    }

    /// Only meant for testing. Do not use outside of testing responses.
    ///
    /// Expects an array of responses, each an array of chunks. A string chunk is a text part and
    /// an object chunk is a raw part, for example `{"functionCall": {"name": "f", "args": {}}}`.
    pub fn set_mock_output(&mut self, json: serde_json::Value) -> Result<(), serde_json::Error> {
        let mut mock = Vec::new();
        for response in json.as_array().into_iter().flatten() {
            let mut stream = Vec::new();
            for event in response.as_array().into_iter().flatten() {
                let part = match event {
                    serde_json::Value::String(text) => Part::text(text.clone()),
                    other => serde_json::from_value(other.clone())?,
                };
                stream.push(GenerateContentResponse::from_parts(vec![part]));
            }
            mock.push(stream);
        }

        self.mock_client = Some(Arc::new(Mutex::new(mock.into_iter())));
        Ok(())
    }
}

fn api_key_from_env() -> Option<String> {
    [GEMINI_API_KEY, GOOGLE_API_KEY]
        .into_iter()
        .filter_map(|name| std::env::var(name).ok())
        .find(|key| !key.trim().is_empty())
}

fn timeout(settings: &Settings) -> Duration {
    settings
        .get_int(Setting::ApiTimeout)
        .and_then(|i| i.try_into().ok())
        .map_or(DEFAULT_TIMEOUT_DURATION, Duration::from_millis)
}
