//! Top-level request lifecycle.
//!
//! A request flows through enhance, route, stream-or-not, a bounded tool
//! loop, and post-processing. The public entry point never returns an
//! error: failures fold into an error-content [`AIResponse`].

use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use futures::stream::BoxStream;
use futures::StreamExt;
use tokio::sync::mpsc;
use tokio_stream::wrappers::UnboundedReceiverStream;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::config::Config;
use crate::content::process_content;
use crate::error::QuillError;
use crate::permission::{AllowAll, PermissionGate};
use crate::provider::sanitize::extract_inline_tool_calls;
use crate::provider::{
    create_provider, ModelProvider, ProviderKind, ProviderRequest, ProviderSettings,
};
use crate::session::{SessionContext, WritingPhase};
use crate::stream::DeltaBatcher;
use crate::tools::ToolRegistry;
use crate::types::{
    AIRequest, AIResponse, ContentPart, Cost, FinishReason, ModelMessage, Role, StreamEventType,
    StreamMessage, StreamingStats, TokenCallback, ToolCall, Usage,
};

/// Model id reported by offline mock responses.
pub const OFFLINE_MODEL: &str = "offline-mock";

/// Bounds on the tool-calling loop. Whichever bound hits first terminates
/// the loop.
#[derive(Debug, Clone, Copy)]
pub struct LoopLimits {
    /// Maximum model rounds in one request.
    pub max_iterations: usize,
    /// Consecutive rounds in which every tool call failed before aborting.
    pub failure_threshold: usize,
}

impl Default for LoopLimits {
    fn default() -> Self {
        Self {
            max_iterations: 5,
            failure_threshold: 2,
        }
    }
}

/// Orchestrates the request lifecycle across providers, tools, and content
/// processing. Cheap to clone; all shared parts are reference-counted.
#[derive(Clone)]
pub struct Coordinator {
    config: Config,
    registry: Arc<ToolRegistry>,
    gate: Arc<dyn PermissionGate>,
    limits: LoopLimits,
}

impl Coordinator {
    pub fn new(config: Config, registry: Arc<ToolRegistry>) -> Self {
        Self {
            config,
            registry,
            gate: Arc::new(AllowAll),
            limits: LoopLimits::default(),
        }
    }

    pub fn with_gate(mut self, gate: Arc<dyn PermissionGate>) -> Self {
        self.gate = gate;
        self
    }

    pub fn with_limits(mut self, limits: LoopLimits) -> Self {
        self.limits = limits;
        self
    }

    /// Process a request to completion. Never returns an error to the
    /// caller; transport and provider failures become error-content
    /// responses with a remediation hint.
    pub async fn process_request(
        &self,
        request: &AIRequest,
        session: &SessionContext,
    ) -> AIResponse {
        let started = Instant::now();
        if self.config.offline {
            return self.offline_response(request);
        }
        match self.run(request, session, started).await {
            Ok(response) => response,
            Err(error) => {
                warn!(model = %request.model, %error, "request failed");
                AIResponse::from_error(&error, &request.model, elapsed_ms(started))
            }
        }
    }

    /// Typed streaming surface over [`Self::process_request`]. All delivery
    /// goes through one channel: `system` → `progress` → repeated
    /// `character_delta` → terminal `ai_response` (or `error`).
    pub fn process_streaming_messages(
        &self,
        request: AIRequest,
        session: Arc<SessionContext>,
    ) -> BoxStream<'static, StreamMessage> {
        let (tx, rx) = mpsc::unbounded_channel();
        let coordinator = self.clone();
        tokio::spawn(async move {
            let _ = tx.send(StreamMessage::System {
                message: format!("processing with model {}", request.model),
            });
            let _ = tx.send(StreamMessage::Progress {
                stage: "routing".to_owned(),
                percent: 10,
            });

            let delta_tx = tx.clone();
            let on_token: TokenCallback = Arc::new(move |chunk: &str| {
                let _ = delta_tx.send(StreamMessage::CharacterDelta {
                    text: chunk.to_owned(),
                });
            });
            let mut request = request;
            request.stream = true;
            request.on_token = Some(on_token);

            let response = coordinator.process_request(&request, &session).await;
            let terminal = if response.is_error {
                StreamMessage::Error {
                    message: response.content.clone(),
                }
            } else {
                StreamMessage::AiResponse {
                    content: response.content.clone(),
                    metadata: Box::new(response),
                }
            };
            let _ = tx.send(terminal);
        });
        UnboundedReceiverStream::new(rx).boxed()
    }

    async fn run(
        &self,
        request: &AIRequest,
        session: &SessionContext,
        started: Instant,
    ) -> Result<AIResponse, QuillError> {
        let enhanced = self.enhance_request(request, session);
        let kind = ProviderKind::infer_from_model(&enhanced.model, self.config.default_provider());
        let provider = create_provider(kind, &enhanced.model, &self.config)?;
        debug!(model = %enhanced.model, provider = %kind, "routing request");

        let tools = if enhanced.enable_tool_calls && !self.registry.is_empty() {
            Some(self.registry.definitions(enhanced.allowed_tools.as_deref()))
        } else {
            None
        };
        let settings = ProviderSettings {
            max_tokens: enhanced.max_tokens,
            temperature: enhanced.temperature,
            stop_sequences: None,
        };

        let mut messages = Vec::new();
        if let Some(system) = &enhanced.system_prompt {
            messages.push(ModelMessage::system(system));
        }
        if let Some(context) = &enhanced.task_context {
            messages.push(ModelMessage::system(format!("Task context:\n{context}")));
        }
        messages.push(ModelMessage::user(&enhanced.prompt));

        let mut content = String::new();
        let mut total_usage = Usage::default();
        let mut all_calls: Vec<ToolCall> = Vec::new();
        let mut has_tool_interaction = false;
        let mut streaming_stats = None;
        let mut consecutive_failures = 0usize;

        for round in 0..self.limits.max_iterations {
            let provider_request = ProviderRequest {
                messages: messages.clone(),
                settings: settings.clone(),
                tools: tools.clone(),
            };

            // Stream only the first round; follow-up rounds after tool
            // execution are short and fetched whole.
            let streamed = enhanced.stream && round == 0;
            let (text, usage, wire_calls, _finish) = if streamed {
                self.streaming_round(
                    provider.as_ref(),
                    &provider_request,
                    enhanced.on_token.as_ref(),
                    &mut streaming_stats,
                )
                .await?
            } else {
                let response = provider.process_request(&provider_request).await?;
                (
                    response.text,
                    response.usage,
                    response.tool_calls,
                    response.finish_reason,
                )
            };

            total_usage.merge(&usage);
            let (clean, inline_calls) = extract_inline_tool_calls(&text);
            let mut round_calls = wire_calls;
            round_calls.extend(inline_calls);

            if streamed {
                // The deltas already reached the token callback verbatim;
                // keep content byte-identical to what the callback saw.
                content.push_str(&text);
            } else if !clean.trim().is_empty() {
                let mut piece = String::new();
                if !content.is_empty() {
                    piece.push('\n');
                }
                piece.push_str(clean.trim_end());
                push_piece(&mut content, &piece, enhanced.on_token.as_ref());
            }

            if round_calls.is_empty() {
                break;
            }
            has_tool_interaction = true;

            let mut assistant_parts: Vec<ContentPart> = Vec::new();
            if !clean.trim().is_empty() {
                assistant_parts.push(ContentPart::Text {
                    text: clean.trim_end().to_owned(),
                });
            }
            assistant_parts.extend(round_calls.iter().cloned().map(ContentPart::ToolCall));
            messages.push(ModelMessage {
                role: Role::Assistant,
                content: assistant_parts,
                timestamp: Some(Utc::now()),
            });

            // Strictly sequential: later calls may depend on earlier side
            // effects.
            let mut any_success = false;
            for call in &round_calls {
                let result = self
                    .registry
                    .execute_tool(call, self.gate.as_ref(), session, CancellationToken::new())
                    .await;
                if result.succeeded() {
                    any_success = true;
                    push_piece(
                        &mut content,
                        &format!("\n[tool ok: {}]", call.tool_name),
                        enhanced.on_token.as_ref(),
                    );
                    messages.push(ModelMessage::tool_result(
                        &call.call_id,
                        result.result.unwrap_or(serde_json::Value::Null),
                        false,
                    ));
                } else {
                    let message = result.error.unwrap_or_else(|| "unknown failure".to_owned());
                    push_piece(
                        &mut content,
                        &format!("\n[tool error: {}] {message}", call.tool_name),
                        enhanced.on_token.as_ref(),
                    );
                    messages.push(ModelMessage::tool_result(
                        &call.call_id,
                        serde_json::json!({ "error": message }),
                        true,
                    ));
                }
                all_calls.push(call.clone());
            }

            if any_success {
                consecutive_failures = 0;
            } else {
                consecutive_failures += 1;
                if consecutive_failures >= self.limits.failure_threshold {
                    warn!(rounds = consecutive_failures, "aborting tool loop");
                    push_piece(
                        &mut content,
                        &format!(
                            "\n[tool loop aborted after {consecutive_failures} consecutive failing rounds]"
                        ),
                        enhanced.on_token.as_ref(),
                    );
                    break;
                }
            }

            if round + 1 == self.limits.max_iterations {
                push_piece(
                    &mut content,
                    "\n[tool loop stopped at the iteration limit]",
                    enhanced.on_token.as_ref(),
                );
            }
        }

        let cost = self
            .config
            .pricing
            .map(|(input, output)| Cost::from_usage(&total_usage, input, output).total_cost)
            .unwrap_or(0.0);
        let blocks = process_content(&content);
        Ok(AIResponse {
            content,
            blocks,
            usage: total_usage,
            cost,
            duration_ms: elapsed_ms(started),
            model: enhanced.model.clone(),
            tool_calls: all_calls,
            has_tool_interaction,
            streaming: streaming_stats,
            is_error: false,
        })
    }

    async fn streaming_round(
        &self,
        provider: &dyn ModelProvider,
        provider_request: &ProviderRequest,
        on_token: Option<&TokenCallback>,
        stats_slot: &mut Option<StreamingStats>,
    ) -> Result<(String, Usage, Vec<ToolCall>, Option<FinishReason>), QuillError> {
        let mut stream = provider.process_streaming_request(provider_request).await?;
        let mut batcher = DeltaBatcher::new();
        let mut text = String::new();
        let mut usage = Usage::default();
        let mut tool_calls = Vec::new();
        let mut finish = None;
        let mut stats = StreamingStats::default();

        while let Some(delta) = stream.next().await {
            let delta = delta?;
            stats.deltas += 1;
            match delta.event_type {
                StreamEventType::TextDelta => {
                    text.push_str(&delta.text);
                    if let Some(batch) = batcher.push(&delta.text) {
                        if let Some(callback) = on_token {
                            callback(&batch);
                        }
                    }
                }
                StreamEventType::ToolCallDelta => {
                    if let Some(call) = delta.tool_call {
                        tool_calls.push(call);
                    }
                }
                StreamEventType::Done => {
                    if let Some(u) = delta.usage {
                        usage.merge(&u);
                    }
                    finish = delta.finish_reason;
                }
                StreamEventType::Error => {
                    return Err(QuillError::Stream(if delta.text.is_empty() {
                        "stream reported an error event".to_owned()
                    } else {
                        delta.text
                    }));
                }
            }
        }
        if let Some(rest) = batcher.flush() {
            if let Some(callback) = on_token {
                callback(&rest);
            }
        }
        stats.batches = batcher.batches;
        *stats_slot = Some(stats);
        Ok((text, usage, tool_calls, finish))
    }

    /// Derive the routed copy of a request. For prompts that look like a
    /// writing-phase task, a skipped phase earlier in the usual ordering
    /// adds an advisory note to the system prompt. It nudges; it never
    /// blocks.
    fn enhance_request(&self, request: &AIRequest, session: &SessionContext) -> AIRequest {
        let mut enhanced = request.clone();
        if enhanced.model.is_empty() {
            enhanced.model = self.config.model.clone();
        }
        let Some(phase) = detect_writing_phase(&enhanced.prompt) else {
            return enhanced;
        };
        let skipped = session.tasks.skipped_before(phase);
        if skipped.is_empty() {
            return enhanced;
        }
        let names: Vec<String> = skipped.iter().map(ToString::to_string).collect();
        let advisory = format!(
            "Advisory: no completed {} work exists for this project yet. \
             The usual order is outline, characters, draft, polish. \
             Mention this to the user, then continue with their request.",
            names.join(" or ")
        );
        debug!(phase = %phase, skipped = ?names, "adding task-order advisory");
        enhanced.system_prompt = Some(match enhanced.system_prompt.take() {
            Some(existing) => format!("{existing}\n\n{advisory}"),
            None => advisory,
        });
        enhanced
    }

    /// Deterministic mock response for demo and test use. No network.
    fn offline_response(&self, request: &AIRequest) -> AIResponse {
        let tool_calls = if request.enable_tool_calls {
            vec![ToolCall::new(
                "offline_call_1",
                "Read",
                serde_json::json!({ "path": "README.md" }),
            )]
        } else {
            Vec::new()
        };
        let content = format!(
            "[offline mode] No provider was contacted.\nPrompt received: {}",
            request.prompt
        );
        if let Some(callback) = &request.on_token {
            callback(&content);
        }
        let has_tool_interaction = !tool_calls.is_empty();
        AIResponse {
            blocks: process_content(&content),
            content,
            tool_calls,
            has_tool_interaction,
            ..AIResponse::empty(OFFLINE_MODEL)
        }
    }
}

impl std::fmt::Debug for Coordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Coordinator")
            .field("model", &self.config.model)
            .field("limits", &self.limits)
            .finish()
    }
}

/// Which writing phase a prompt appears to target, if any.
fn detect_writing_phase(prompt: &str) -> Option<WritingPhase> {
    let prompt = prompt.to_lowercase();
    // Polish before draft: "revise chapter 2" is polish work even though
    // it names a chapter.
    if ["polish", "revise", "proofread", "tighten"]
        .iter()
        .any(|kw| prompt.contains(kw))
    {
        Some(WritingPhase::Polish)
    } else if prompt.contains("outline") {
        Some(WritingPhase::Outline)
    } else if prompt.contains("character") {
        Some(WritingPhase::Characters)
    } else if ["draft", "chapter", "scene", "write the story"]
        .iter()
        .any(|kw| prompt.contains(kw))
    {
        Some(WritingPhase::Draft)
    } else {
        None
    }
}

fn elapsed_ms(started: Instant) -> u64 {
    started.elapsed().as_millis() as u64
}

/// Append a piece to the accumulated content and mirror it to the token
/// callback, so streamed deltas concatenate to exactly the final content.
fn push_piece(content: &mut String, piece: &str, on_token: Option<&TokenCallback>) {
    content.push_str(piece);
    if let Some(callback) = on_token {
        callback(piece);
    }
}
