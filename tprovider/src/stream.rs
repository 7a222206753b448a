//! Streaming event contracts, in-memory streams and delta reassembly.
//!
//! ```rust
//! use tprovider::{StreamAccumulator, StreamEvent, ToolCallDelta};
//!
//! let mut acc = StreamAccumulator::default();
//! acc.apply(&StreamEvent::ToolCallDelta(ToolCallDelta::new(0).with_name("foo")));
//! acc.apply(&StreamEvent::ToolCallDelta(ToolCallDelta::new(0).with_arguments("{\"a\":")));
//! acc.apply(&StreamEvent::ToolCallDelta(ToolCallDelta::new(0).with_arguments("1}")));
//!
//! let calls = acc.tool_calls();
//! assert_eq!(calls[0].name, "foo");
//! assert_eq!(calls[0].arguments, "{\"a\":1}");
//! ```

use std::collections::{BTreeMap, VecDeque};
use std::pin::Pin;
use std::task::{Context, Poll};

use futures_core::Stream;

use crate::{
    Message, ModelResponse, OutputItem, ProviderError, ProviderKind, StopReason, TokenUsage,
    ToolCall,
};

/// Fragment of a tool call keyed by its position in the reply.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ToolCallDelta {
    pub index: u32,
    pub id: Option<String>,
    pub name: Option<String>,
    pub arguments: Option<String>,
}

impl ToolCallDelta {
    pub fn new(index: u32) -> Self {
        Self {
            index,
            ..Self::default()
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn with_arguments(mut self, arguments: impl Into<String>) -> Self {
        self.arguments = Some(arguments.into());
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamEvent {
    TextDelta(String),
    ReasoningDelta(String),
    ToolCallDelta(ToolCallDelta),
    Usage(TokenUsage),
    Finished(StopReason),
}

/// Provider stream contract.
///
/// Invariants for consumers:
/// - Events are emitted in source order.
/// - Tool call fragments for one index arrive in order and concatenate to the full call.
/// - `Finished` is emitted at most once and is the last event when present.
/// - Once the stream yields `None`, it must not yield additional items.
pub trait ModelEventStream: Stream<Item = Result<StreamEvent, ProviderError>> + Send {}

impl<T> ModelEventStream for T where T: Stream<Item = Result<StreamEvent, ProviderError>> + Send {}

pub type BoxedEventStream<'a> = Pin<Box<dyn ModelEventStream + 'a>>;

#[derive(Debug)]
pub struct VecEventStream {
    events: VecDeque<Result<StreamEvent, ProviderError>>,
}

impl VecEventStream {
    pub fn new(events: Vec<Result<StreamEvent, ProviderError>>) -> Self {
        Self {
            events: events.into(),
        }
    }
}

impl Stream for VecEventStream {
    type Item = Result<StreamEvent, ProviderError>;

    fn poll_next(
        mut self: Pin<&mut Self>,
        _cx: &mut Context<'_>,
    ) -> Poll<Option<Result<StreamEvent, ProviderError>>> {
        Poll::Ready(self.events.pop_front())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
struct PartialToolCall {
    id: Option<String>,
    name: String,
    arguments: String,
}

/// Folds stream events into the final reply.
#[derive(Debug, Clone, Default)]
pub struct StreamAccumulator {
    text: String,
    reasoning: String,
    tool_calls: BTreeMap<u32, PartialToolCall>,
    usage: TokenUsage,
    stop_reason: Option<StopReason>,
}

impl StreamAccumulator {
    pub fn apply(&mut self, event: &StreamEvent) {
        match event {
            StreamEvent::TextDelta(delta) => self.text.push_str(delta),
            StreamEvent::ReasoningDelta(delta) => self.reasoning.push_str(delta),
            StreamEvent::ToolCallDelta(delta) => {
                let entry = self.tool_calls.entry(delta.index).or_default();
                if let Some(id) = &delta.id
                    && !id.is_empty()
                {
                    entry.id = Some(id.clone());
                }
                if let Some(name) = &delta.name {
                    entry.name.push_str(name);
                }
                if let Some(arguments) = &delta.arguments {
                    entry.arguments.push_str(arguments);
                }
            }
            StreamEvent::Usage(usage) => self.usage = merge_usage(self.usage, *usage),
            StreamEvent::Finished(reason) => self.stop_reason = Some(*reason),
        }
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn reasoning(&self) -> &str {
        &self.reasoning
    }

    pub fn tool_calls(&self) -> Vec<ToolCall> {
        self.tool_calls
            .iter()
            .filter(|(_, call)| !call.name.is_empty())
            .map(|(index, call)| ToolCall {
                id: call
                    .id
                    .clone()
                    .unwrap_or_else(|| format!("call_{index}")),
                name: call.name.clone(),
                arguments: if call.arguments.trim().is_empty() {
                    "{}".to_string()
                } else {
                    call.arguments.clone()
                },
            })
            .collect()
    }

    pub fn finish(self, provider: ProviderKind, model: impl Into<String>) -> ModelResponse {
        let tool_calls = self.tool_calls();
        let mut output = Vec::new();

        if !self.reasoning.is_empty() {
            output.push(OutputItem::Reasoning(self.reasoning));
        }
        if !self.text.is_empty() {
            output.push(OutputItem::Message(Message::assistant(self.text)));
        }

        let stop_reason = match self.stop_reason {
            Some(reason) => reason,
            None if !tool_calls.is_empty() => StopReason::ToolUse,
            None => StopReason::EndTurn,
        };
        output.extend(tool_calls.into_iter().map(OutputItem::ToolCall));

        ModelResponse {
            provider,
            model: model.into(),
            output,
            stop_reason,
            usage: self.usage,
        }
    }
}

fn merge_usage(current: TokenUsage, update: TokenUsage) -> TokenUsage {
    let input_tokens = current.input_tokens.max(update.input_tokens);
    let output_tokens = current.output_tokens.max(update.output_tokens);
    TokenUsage {
        input_tokens,
        output_tokens,
        total_tokens: update
            .total_tokens
            .max(current.total_tokens)
            .max(input_tokens + output_tokens),
    }
}
