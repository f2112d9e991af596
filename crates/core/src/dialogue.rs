//! Dialogue generation: streaming replies from an OpenAI-compatible backend.

use anyhow::Result;
use async_openai::{
    Client,
    config::OpenAIConfig,
    types::{
        ChatCompletionRequestAssistantMessageArgs, ChatCompletionRequestMessage,
        ChatCompletionRequestSystemMessageArgs, ChatCompletionRequestUserMessageArgs,
        CreateChatCompletionRequestArgs,
    },
};
use async_trait::async_trait;
use futures::{Stream, StreamExt};
use serde::{Deserialize, Serialize};
use std::pin::Pin;

/// Marker pair some dialogue backends emit around internal deliberation.
/// Anything between the markers is stripped before the reply is used.
const REASONING_OPEN: &str = "<think>";
const REASONING_CLOSE: &str = "</think>";

/// One prior turn of the conversation, replayed as context for the next
/// reply.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct ChatTurn {
    pub role: TurnRole,
    pub content: String,
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum TurnRole {
    /// The human peer on the call.
    Peer,
    /// The agent itself.
    Agent,
}

/// A lazy, finite stream of reply fragments.
pub type ReplyStream = Pin<Box<dyn Stream<Item = Result<String>> + Send>>;

/// A generic client for the backend that produces the agent's replies.
#[async_trait]
pub trait DialogueService: Send + Sync {
    /// Streams the reply to `query`, given the prior conversation turns.
    async fn stream_reply(&self, query: &str, history: &[ChatTurn]) -> Result<ReplyStream>;
}

/// Drains a reply stream into the full reply text.
pub async fn collect_reply(mut stream: ReplyStream) -> Result<String> {
    let mut reply = String::new();
    while let Some(fragment) = stream.next().await {
        reply.push_str(&fragment?);
    }
    Ok(reply)
}

/// Removes reasoning-markup spans from `text` and trims the result.
///
/// An unterminated open marker is left as written, matching the behavior of
/// a non-greedy span match.
pub fn strip_reasoning(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut rest = text;
    while let Some(open) = rest.find(REASONING_OPEN) {
        out.push_str(&rest[..open]);
        let after_open = &rest[open + REASONING_OPEN.len()..];
        match after_open.find(REASONING_CLOSE) {
            Some(close) => rest = &after_open[close + REASONING_CLOSE.len()..],
            None => {
                out.push_str(&rest[open..]);
                rest = "";
            }
        }
    }
    out.push_str(rest);
    out.trim().to_string()
}

/// An implementation of `DialogueService` for any OpenAI-compatible API.
pub struct OpenAICompatibleClient {
    client: Client<OpenAIConfig>,
    model: String,
    persona_prompt: String,
}

impl OpenAICompatibleClient {
    /// Creates a new client for an OpenAI-compatible service.
    ///
    /// # Arguments
    ///
    /// * `config` - The client configuration, including API key and base URL.
    /// * `model` - The model identifier to use for chat completions.
    /// * `persona_prompt` - The system prompt establishing the agent's persona.
    pub fn new(config: OpenAIConfig, model: String, persona_prompt: String) -> Self {
        Self {
            client: Client::with_config(config),
            model,
            persona_prompt,
        }
    }
}

#[async_trait]
impl DialogueService for OpenAICompatibleClient {
    async fn stream_reply(&self, query: &str, history: &[ChatTurn]) -> Result<ReplyStream> {
        let mut messages: Vec<ChatCompletionRequestMessage> = vec![
            ChatCompletionRequestSystemMessageArgs::default()
                .content(self.persona_prompt.clone())
                .build()?
                .into(),
        ];
        for turn in history {
            match turn.role {
                TurnRole::Peer => messages.push(
                    ChatCompletionRequestUserMessageArgs::default()
                        .content(turn.content.clone())
                        .build()?
                        .into(),
                ),
                TurnRole::Agent => messages.push(
                    ChatCompletionRequestAssistantMessageArgs::default()
                        .content(turn.content.clone())
                        .build()?
                        .into(),
                ),
            }
        }
        messages.push(
            ChatCompletionRequestUserMessageArgs::default()
                .content(query.to_string())
                .build()?
                .into(),
        );

        let request = CreateChatCompletionRequestArgs::default()
            .model(&self.model)
            .messages(messages)
            .stream(true)
            .build()?;

        let stream = self.client.chat().create_stream(request).await?;

        Ok(Box::pin(stream.filter_map(|result| async {
            match result {
                Ok(response) => {
                    let choice = response.choices.first()?;
                    let content = choice.delta.content.as_ref()?;
                    if content.is_empty() {
                        None
                    } else {
                        Some(Ok(content.clone()))
                    }
                }
                Err(e) => Some(Err(e.into())),
            }
        })))
    }
}
