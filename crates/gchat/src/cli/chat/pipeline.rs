use std::io::Write;

use tracing::{
    debug,
    trace,
};

use crate::api_client::ApiClient;
use crate::cli::chat::ChatError;
use crate::cli::chat::conversation::ConversationState;
use crate::cli::chat::output_buffer::{
    MarkdownRenderer,
    OutputBuffer,
};
use crate::cli::chat::parser::{
    ResponseParser,
    StreamEvent,
    ToolEventHooks,
};
use crate::cli::chat::tool_resolver::{
    ToolCategoryPreference,
    ToolDeclaration,
    resolve_tools,
    to_api_tools,
};
use crate::util::spinner::SpinnerSlot;

/// What a completed response left behind for the session.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PipelineOutcome {
    /// At least one tool event was received.
    pub used_tools: bool,
    pub assistant_text: String,
    pub request_id: Option<String>,
}

/// Runs one request/response cycle: resolves tools, sends the conversation, demultiplexes the
/// stream and writes the text through an [OutputBuffer].
///
/// Everything it needs is fixed at construction.
#[derive(Debug, Clone)]
pub struct ResponsePipeline<R> {
    client: ApiClient,
    model_id: String,
    preference: ToolCategoryPreference,
    renderer: R,
}

impl<R: MarkdownRenderer + Clone> ResponsePipeline<R> {
    pub fn new(client: ApiClient, model_id: String, preference: ToolCategoryPreference, renderer: R) -> Self {
        Self {
            client,
            model_id,
            preference,
            renderer,
        }
    }

    pub fn model_id(&self) -> &str {
        &self.model_id
    }

    pub fn preference(&self) -> ToolCategoryPreference {
        self.preference
    }

    /// The declarations attached to the next request.
    pub fn declarations(&self) -> Vec<ToolDeclaration> {
        let external = self.client.tool_host().map(|host| host.tools()).unwrap_or_default();
        resolve_tools(&self.model_id, &external, self.preference)
    }

    /// Sends the conversation and streams the answer to `output`.
    ///
    /// The spinner is stopped before the first text is written. Text received before a failure
    /// stays written; the buffer is flushed exactly once, whether or not the stream failed.
    pub async fn run<W: Write>(
        &self,
        conversation: &ConversationState,
        hooks: Option<Box<dyn ToolEventHooks>>,
        spinner: &SpinnerSlot,
        output: &mut W,
    ) -> Result<PipelineOutcome, ChatError> {
        let declarations = self.declarations();
        let mut request = conversation.to_request();
        request.tools = to_api_tools(&declarations);

        let response = self.client.send_message(&self.model_id, request).await?;
        let mut parser = ResponseParser::new(response);
        if let Some(hooks) = hooks {
            parser = parser.with_hooks(hooks);
        }

        let mut buffer = OutputBuffer::new(self.renderer.clone());
        let mut used_tools = false;
        let result = loop {
            match parser.recv().await {
                Ok(Some(StreamEvent::Text(text))) => {
                    if let Err(err) = write_text(&mut buffer, &text, spinner, output) {
                        break Err(ChatError::Std(err));
                    }
                },
                Ok(Some(event @ (StreamEvent::ToolCall { .. } | StreamEvent::ToolResult { .. }))) => {
                    trace!(?event, "tool event");
                    used_tools = true;
                },
                Ok(None) => break Ok(()),
                Err(err) => break Err(ChatError::ResponseStream(Box::new(err))),
            }
        };

        let flushed = flush_buffer(&mut buffer, spinner, output);
        result?;
        flushed?;

        let request_id = parser.request_id().map(str::to_owned);
        debug!(?request_id, used_tools, "response complete");

        Ok(PipelineOutcome {
            used_tools,
            assistant_text: parser.assistant_text().to_owned(),
            request_id,
        })
    }
}

fn write_text<R: MarkdownRenderer>(
    buffer: &mut OutputBuffer<R>,
    text: &str,
    spinner: &SpinnerSlot,
    output: &mut impl Write,
) -> std::io::Result<()> {
    spinner.stop(output)?;
    if let Some(rendered) = buffer.append(text) {
        output.write_all(rendered.as_bytes())?;
        output.flush()?;
    }
    Ok(())
}

fn flush_buffer<R: MarkdownRenderer>(
    buffer: &mut OutputBuffer<R>,
    spinner: &SpinnerSlot,
    output: &mut impl Write,
) -> std::io::Result<()> {
    spinner.stop(output)?;
    if let Some(rendered) = buffer.flush() {
        output.write_all(rendered.as_bytes())?;
    }
    output.flush()
}
