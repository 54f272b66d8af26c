use std::collections::VecDeque;

use bytes::Bytes;
use futures::StreamExt;
use futures::stream::BoxStream;
use serde_json::{
    Value,
    json,
};
use tracing::{
    debug,
    trace,
    warn,
};

use crate::api_client::model::{
    Content,
    ErrorResponse,
    FunctionCall,
    GenerateContentRequest,
    GenerateContentResponse,
    MODEL_ROLE,
    Part,
    USER_ROLE,
};
use crate::api_client::sse::SseDecoder;
use crate::api_client::{
    ApiClient,
    ApiClientError,
};

/// Upper bound on tool round trips answered for a single message.
pub const MAX_TOOL_ROUNDS: usize = 10;

/// Where the chunks of the current round come from.
pub enum ChunkSource {
    Gemini {
        body: BoxStream<'static, reqwest::Result<Bytes>>,
        decoder: SseDecoder,
        events: VecDeque<String>,
        done: bool,
    },
    Mock(VecDeque<Result<GenerateContentResponse, ApiClientError>>),
    Exhausted,
}

impl std::fmt::Debug for ChunkSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Gemini { events, done, .. } => f
                .debug_struct("Gemini")
                .field("events", events)
                .field("done", done)
                .finish_non_exhaustive(),
            Self::Mock(chunks) => f.debug_tuple("Mock").field(chunks).finish(),
            Self::Exhausted => f.write_str("Exhausted"),
        }
    }
}

impl ChunkSource {
    pub fn gemini(body: BoxStream<'static, reqwest::Result<Bytes>>) -> Self {
        Self::Gemini {
            body,
            decoder: SseDecoder::new(),
            events: VecDeque::new(),
            done: false,
        }
    }

    async fn next_chunk(&mut self) -> Result<Option<GenerateContentResponse>, ApiClientError> {
        match self {
            Self::Gemini {
                body,
                decoder,
                events,
                done,
            } => loop {
                if let Some(data) = events.pop_front() {
                    if data.trim().is_empty() {
                        continue;
                    }
                    return parse_chunk(&data).map(Some);
                }
                if *done {
                    return Ok(None);
                }
                match body.next().await {
                    Some(bytes) => events.extend(decoder.push(&bytes?)),
                    None => {
                        *done = true;
                        events.extend(decoder.finish());
                    },
                }
            },
            Self::Mock(chunks) => chunks.pop_front().transpose(),
            Self::Exhausted => Ok(None),
        }
    }
}

/// Decodes one SSE payload. The error envelope is checked first since providers report
/// in-stream failures with a 200 status.
pub fn parse_chunk(data: &str) -> Result<GenerateContentResponse, ApiClientError> {
    if let Ok(ErrorResponse { error }) = serde_json::from_str::<ErrorResponse>(data) {
        return Err(ApiClientError::Api {
            status_code: u16::try_from(error.code).unwrap_or(500),
            message: error.message,
        });
    }

    serde_json::from_str(data).map_err(|source| ApiClientError::MalformedChunk {
        source,
        data: data.to_owned(),
    })
}

/// The chunks of one streamed response, including any follow-up rounds needed to answer
/// function calls for tools declared by the client's tool host.
#[derive(Debug)]
pub struct SendMessageOutput {
    client: ApiClient,
    model_id: String,
    request: GenerateContentRequest,
    source: ChunkSource,
    /// Function calls from the current round that the tool host will answer.
    pending_calls: Vec<FunctionCall>,
    /// Non-thought parts the model produced in the current round.
    model_parts: Vec<Part>,
    rounds: usize,
    request_id: Option<String>,
}

impl SendMessageOutput {
    pub(crate) fn new(
        client: ApiClient,
        model_id: String,
        request: GenerateContentRequest,
        source: ChunkSource,
    ) -> Self {
        Self {
            client,
            model_id,
            request,
            source,
            pending_calls: Vec::new(),
            model_parts: Vec::new(),
            rounds: 0,
            request_id: None,
        }
    }

    /// An output replaying the given chunks, with no follow-up rounds.
    pub fn mock(chunks: Vec<Result<GenerateContentResponse, ApiClientError>>) -> Self {
        Self::new(
            ApiClient::new_mock(),
            String::new(),
            GenerateContentRequest::default(),
            ChunkSource::Mock(chunks.into()),
        )
    }

    pub fn request_id(&self) -> Option<&str> {
        self.request_id.as_deref()
    }

    pub async fn recv(&mut self) -> Result<Option<GenerateContentResponse>, ApiClientError> {
        match self.source.next_chunk().await {
            Ok(Some(chunk)) => {
                trace!(?chunk, "received chunk");
                if self.request_id.is_none() {
                    self.request_id = chunk.response_id.clone();
                }
                for part in chunk.parts().iter().filter(|part| !part.is_thought()) {
                    if let Some(call) = &part.function_call {
                        if self.is_host_function(&call.name) {
                            self.pending_calls.push(call.clone());
                        }
                    }
                    self.model_parts.push(part.clone());
                }
                Ok(Some(chunk))
            },
            Ok(None) => self.next_round().await,
            Err(err) => {
                self.source = ChunkSource::Exhausted;
                Err(err)
            },
        }
    }

    fn is_host_function(&self, name: &str) -> bool {
        self.client.tool_host().is_some()
            && self
                .request
                .tools
                .iter()
                .filter_map(|tool| tool.function_declarations.as_ref())
                .flatten()
                .any(|declaration| declaration.name == name)
    }

    /// Answers the function calls of the round that just ended and opens the follow-up stream.
    /// The function responses are returned as a chunk of their own so consumers see them in
    /// order.
    async fn next_round(&mut self) -> Result<Option<GenerateContentResponse>, ApiClientError> {
        self.source = ChunkSource::Exhausted;
        let calls = std::mem::take(&mut self.pending_calls);
        if calls.is_empty() {
            return Ok(None);
        }
        let Some(tool_host) = self.client.tool_host().cloned() else {
            return Ok(None);
        };
        if self.rounds >= MAX_TOOL_ROUNDS {
            warn!(rounds = self.rounds, "tool round limit reached, ending response");
            return Ok(None);
        }
        self.rounds += 1;

        let mut responses = Vec::new();
        for call in calls {
            let args = call.args.clone().unwrap_or_else(|| Value::Object(Default::default()));
            debug!(name = %call.name, round = self.rounds, "calling tool");
            let response = match tool_host.call_tool(&call.name, args).await {
                Ok(result) => json!({ "result": result }),
                Err(err) => {
                    let err = ApiClientError::ToolHost {
                        name: call.name.clone(),
                        message: err.to_string(),
                    };
                    warn!(%err, "tool call failed");
                    json!({ "error": err.to_string() })
                },
            };
            let mut part = Part::function_response(call.name, response);
            if let Some(response) = part.function_response.as_mut() {
                response.id = call.id;
            }
            responses.push(part);
        }

        let model_parts = std::mem::take(&mut self.model_parts);
        self.request.contents.push(Content::with_parts(MODEL_ROLE, model_parts));
        self.request
            .contents
            .push(Content::with_parts(USER_ROLE, responses.clone()));

        self.source = self.client.open_source(&self.model_id, &self.request).await?;
        Ok(Some(GenerateContentResponse::from_parts(responses)))
    }
}
