use std::collections::VecDeque;

use futures::Stream;
use serde_json::{
    Map,
    Value,
    json,
};
use thiserror::Error;
use tracing::trace;

use crate::api_client::ApiClientError;
use crate::api_client::model::Part;
use crate::api_client::send_message_output::SendMessageOutput;

/// Name used for events of the provider's built-in code execution tool.
pub const CODE_EXECUTION_TOOL_NAME: &str = "code_execution";

#[derive(Debug, Error)]
pub struct RecvError {
    /// The request id associated with the [SendMessageOutput] stream.
    pub request_id: Option<String>,
    #[source]
    pub source: RecvErrorKind,
}

impl std::fmt::Display for RecvError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Failed to receive the next message: ")?;
        if let Some(request_id) = self.request_id.as_ref() {
            write!(f, "request_id: {}, error: ", request_id)?;
        }
        write!(f, "{}", self.source)?;
        Ok(())
    }
}

#[derive(Debug, Error)]
pub enum RecvErrorKind {
    #[error("{0}")]
    Client(#[from] ApiClientError),
    /// A tool event hook failed. The tool itself is not retried.
    #[error("{0}")]
    Hook(eyre::Report),
}

/// A typed event of a streamed response.
#[derive(Debug, Clone, PartialEq)]
pub enum StreamEvent {
    /// Text returned by the model. This should be displayed to the user as it is received.
    Text(String),
    /// The model invoked a tool.
    ToolCall { name: String, params: Value },
    /// The result of a tool invocation.
    ToolResult { name: String, result: Value },
}

/// Side effects to run while tool events pass through the [ResponseParser].
///
/// Hooks run synchronously and own the terminal while they run.
pub trait ToolEventHooks: Send {
    /// Called before the [StreamEvent::ToolCall] is yielded.
    fn before_tool_call(&mut self, name: &str, params: &Value) -> eyre::Result<()>;

    /// Called after the [StreamEvent::ToolResult] is constructed, before it is yielded.
    fn after_tool_result(&mut self, name: &str, result: &Value) -> eyre::Result<()>;
}

/// State associated with demultiplexing a [SendMessageOutput] into [StreamEvent]s.
///
/// # Usage
///
/// You should repeatedly call [Self::recv] until `None` is returned. Events are yielded in the
/// order their parts arrived; a failure is returned once, after every event that preceded it.
pub struct ResponseParser {
    /// The response to consume and parse into a sequence of [StreamEvent].
    response: SendMessageOutput,
    hooks: Option<Box<dyn ToolEventHooks>>,
    /// Events decoded from the last chunk that have not been yielded yet.
    pending: VecDeque<StreamEvent>,
    /// Buffer for holding the accumulated assistant response.
    assistant_text: String,
    ended: bool,
}

impl std::fmt::Debug for ResponseParser {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResponseParser")
            .field("response", &self.response)
            .field("has_hooks", &self.hooks.is_some())
            .field("pending", &self.pending)
            .field("assistant_text", &self.assistant_text)
            .field("ended", &self.ended)
            .finish()
    }
}

impl ResponseParser {
    pub fn new(response: SendMessageOutput) -> Self {
        Self {
            response,
            hooks: None,
            pending: VecDeque::new(),
            assistant_text: String::new(),
            ended: false,
        }
    }

    pub fn with_hooks(mut self, hooks: Box<dyn ToolEventHooks>) -> Self {
        self.hooks = Some(hooks);
        self
    }

    /// The text received so far.
    pub fn assistant_text(&self) -> &str {
        &self.assistant_text
    }

    /// Returns the next event, or `None` once the provider has closed the stream.
    pub async fn recv(&mut self) -> Result<Option<StreamEvent>, RecvError> {
        loop {
            if let Some(event) = self.pending.pop_front() {
                self.run_hooks(&event)?;
                if let StreamEvent::Text(text) = &event {
                    self.assistant_text.push_str(text);
                }
                return Ok(Some(event));
            }

            if self.ended {
                return Ok(None);
            }

            match self.response.recv().await {
                Ok(Some(chunk)) => self.pending.extend(chunk.parts().iter().filter_map(classify)),
                Ok(None) => {
                    trace!("response stream ended");
                    self.ended = true;
                },
                Err(err) => {
                    self.ended = true;
                    return Err(self.error(err));
                },
            }
        }
    }

    /// Consumes the parser into a lazy stream of events. The stream ends after the first error.
    pub fn into_stream(self) -> impl Stream<Item = Result<StreamEvent, RecvError>> {
        futures::stream::unfold(Some(self), |parser| async move {
            let mut parser = parser?;
            match parser.recv().await {
                Ok(Some(event)) => Some((Ok(event), Some(parser))),
                Ok(None) => None,
                Err(err) => Some((Err(err), None)),
            }
        })
    }

    fn run_hooks(&mut self, event: &StreamEvent) -> Result<(), RecvError> {
        let Some(hooks) = self.hooks.as_mut() else {
            return Ok(());
        };
        let result = match event {
            StreamEvent::ToolCall { name, params } => hooks.before_tool_call(name, params),
            StreamEvent::ToolResult { name, result } => hooks.after_tool_result(name, result),
            StreamEvent::Text(_) => Ok(()),
        };
        result.map_err(|err| {
            self.ended = true;
            self.pending.clear();
            self.error(RecvErrorKind::Hook(err))
        })
    }

    /// The provider's id for the response, once a chunk carrying it has arrived.
    pub fn request_id(&self) -> Option<&str> {
        self.response.request_id()
    }

    /// Helper to create a new [RecvError] populated with the associated request id for the stream.
    fn error(&self, source: impl Into<RecvErrorKind>) -> RecvError {
        RecvError {
            request_id: self.request_id().map(str::to_string),
            source: source.into(),
        }
    }
}

/// Maps one part to an event. Tool invocations win over tool results, which win over text.
fn classify(part: &Part) -> Option<StreamEvent> {
    if part.is_thought() {
        return None;
    }

    if let Some(call) = &part.function_call {
        return Some(StreamEvent::ToolCall {
            name: call.name.clone(),
            params: call.args.clone().unwrap_or_else(|| Value::Object(Map::new())),
        });
    }
    if let Some(code) = &part.executable_code {
        return Some(StreamEvent::ToolCall {
            name: CODE_EXECUTION_TOOL_NAME.to_owned(),
            params: json!({ "language": code.language, "code": code.code }),
        });
    }

    if let Some(response) = &part.function_response {
        return Some(StreamEvent::ToolResult {
            name: response.name.clone(),
            result: response.response.clone(),
        });
    }
    if let Some(result) = &part.code_execution_result {
        return Some(StreamEvent::ToolResult {
            name: CODE_EXECUTION_TOOL_NAME.to_owned(),
            result: json!({ "outcome": result.outcome, "output": result.output }),
        });
    }

    part.text
        .as_ref()
        .filter(|text| !text.is_empty())
        .map(|text| StreamEvent::Text(text.clone()))
}

#[cfg(test)]
pub(crate) mod tests {
    use std::sync::Arc;

    use futures::StreamExt;
    use parking_lot::Mutex;

    use super::*;
    use crate::api_client::model::{
        CodeExecutionResult,
        ExecutableCode,
        GenerateContentResponse,
    };

    /// Records hook calls into a shared log, optionally failing on a given tool name.
    #[derive(Debug, Default, Clone)]
    pub struct RecordingHooks {
        pub log: Arc<Mutex<Vec<String>>>,
        pub fail_on: Option<String>,
    }

    impl ToolEventHooks for RecordingHooks {
        fn before_tool_call(&mut self, name: &str, _params: &Value) -> eyre::Result<()> {
            self.log.lock().push(format!("before:{name}"));
            if self.fail_on.as_deref() == Some(name) {
                eyre::bail!("hook failed for {name}");
            }
            Ok(())
        }

        fn after_tool_result(&mut self, name: &str, _result: &Value) -> eyre::Result<()> {
            self.log.lock().push(format!("after:{name}"));
            Ok(())
        }
    }

    fn chunk(parts: Vec<Part>) -> Result<GenerateContentResponse, ApiClientError> {
        Ok(GenerateContentResponse::from_parts(parts))
    }

    fn code_parts() -> (Part, Part) {
        let call = Part {
            executable_code: Some(ExecutableCode {
                language: Some("PYTHON".to_owned()),
                code: Some("print(1 + 1)".to_owned()),
            }),
            ..Default::default()
        };
        let result = Part {
            code_execution_result: Some(CodeExecutionResult {
                outcome: Some("OUTCOME_OK".to_owned()),
                output: Some("2\n".to_owned()),
            }),
            ..Default::default()
        };
        (call, result)
    }

    #[tokio::test]
    async fn test_event_order_is_preserved() {
        let (code, code_result) = code_parts();
        let output = SendMessageOutput::mock(vec![
            chunk(vec![Part::text("Let me compute. "), code]),
            chunk(vec![code_result, Part::text("The answer is "), Part::text("2.")]),
            chunk(vec![
                Part::function_call("lookup", json!({"q": "x"})),
                Part::function_response("lookup", json!({"result": "y"})),
            ]),
        ]);
        let mut parser = ResponseParser::new(output);

        let mut events = Vec::new();
        while let Some(event) = parser.recv().await.unwrap() {
            events.push(event);
        }

        assert_eq!(events, vec![
            StreamEvent::Text("Let me compute. ".to_owned()),
            StreamEvent::ToolCall {
                name: CODE_EXECUTION_TOOL_NAME.to_owned(),
                params: json!({"language": "PYTHON", "code": "print(1 + 1)"}),
            },
            StreamEvent::ToolResult {
                name: CODE_EXECUTION_TOOL_NAME.to_owned(),
                result: json!({"outcome": "OUTCOME_OK", "output": "2\n"}),
            },
            StreamEvent::Text("The answer is ".to_owned()),
            StreamEvent::Text("2.".to_owned()),
            StreamEvent::ToolCall {
                name: "lookup".to_owned(),
                params: json!({"q": "x"}),
            },
            StreamEvent::ToolResult {
                name: "lookup".to_owned(),
                result: json!({"result": "y"}),
            },
        ]);
        assert_eq!(parser.assistant_text(), "Let me compute. The answer is 2.");
        assert!(parser.recv().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_thoughts_and_empty_parts_are_skipped() {
        let thought = Part {
            text: Some("planning".to_owned()),
            thought: Some(true),
            ..Default::default()
        };
        let output = SendMessageOutput::mock(vec![chunk(vec![thought, Part::default(), Part::text(""), Part::text("hi")])]);
        let events: Vec<_> = ResponseParser::new(output)
            .into_stream()
            .map(Result::unwrap)
            .collect()
            .await;
        assert_eq!(events, vec![StreamEvent::Text("hi".to_owned())]);
    }

    #[tokio::test]
    async fn test_tool_call_wins_over_text_in_one_part() {
        let mut part = Part::function_call("lookup", json!({}));
        part.text = Some("ignored".to_owned());
        let output = SendMessageOutput::mock(vec![chunk(vec![part])]);
        let mut parser = ResponseParser::new(output);
        assert!(matches!(
            parser.recv().await.unwrap(),
            Some(StreamEvent::ToolCall { ref name, .. }) if name == "lookup"
        ));
        assert!(parser.recv().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_hooks_fire_in_sequence() {
        let (code, code_result) = code_parts();
        let hooks = RecordingHooks::default();
        let log = hooks.log.clone();
        let output = SendMessageOutput::mock(vec![chunk(vec![Part::text("a"), code, code_result, Part::text("b")])]);
        let mut parser = ResponseParser::new(output).with_hooks(Box::new(hooks));

        let mut seen = Vec::new();
        while let Some(event) = parser.recv().await.unwrap() {
            let label = match event {
                StreamEvent::Text(text) => format!("text:{text}"),
                StreamEvent::ToolCall { name, .. } => format!("call:{name}"),
                StreamEvent::ToolResult { name, .. } => format!("result:{name}"),
            };
            // The hook for an event has already run when the event is received.
            seen.push(format!("{label} after {} hook calls", log.lock().len()));
        }

        assert_eq!(log.lock().as_slice(), &["before:code_execution", "after:code_execution"]);
        assert_eq!(seen, vec![
            "text:a after 0 hook calls",
            "call:code_execution after 1 hook calls",
            "result:code_execution after 2 hook calls",
            "text:b after 2 hook calls",
        ]);
    }

    #[tokio::test]
    async fn test_hook_failure_is_terminal() {
        let hooks = RecordingHooks {
            fail_on: Some("lookup".to_owned()),
            ..Default::default()
        };
        let output = SendMessageOutput::mock(vec![chunk(vec![
            Part::text("before"),
            Part::function_call("lookup", json!({})),
            Part::text("after"),
        ])]);
        let mut parser = ResponseParser::new(output).with_hooks(Box::new(hooks));

        assert_eq!(parser.recv().await.unwrap(), Some(StreamEvent::Text("before".to_owned())));
        let err = parser.recv().await.unwrap_err();
        assert!(matches!(err.source, RecvErrorKind::Hook(_)));
        assert!(err.to_string().contains("hook failed for lookup"));
        assert!(parser.recv().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_error_after_partial_output() {
        let output = SendMessageOutput::mock(vec![
            chunk(vec![Part::text("partial")]),
            Err(ApiClientError::Api {
                status_code: 503,
                message: "The model is overloaded.".to_owned(),
            }),
        ]);
        let mut parser = ResponseParser::new(output);

        assert_eq!(parser.recv().await.unwrap(), Some(StreamEvent::Text("partial".to_owned())));
        let err = parser.recv().await.unwrap_err();
        assert!(matches!(err.source, RecvErrorKind::Client(_)));
        assert_eq!(
            err.to_string(),
            "Failed to receive the next message: The model is overloaded. (status: 503)"
        );
        assert_eq!(parser.assistant_text(), "partial");
        assert!(parser.recv().await.unwrap().is_none());
    }
}
