//! Answer generation.
//!
//! [`LlmService`] is the single seam between the search pipeline and the
//! model: one system prompt plus an ordered message list in, answer text
//! out. Backends are selected by `[llm].provider`:
//!
//! | Config Value | Service |
//! |--------------|---------|
//! | `"openai"` | [`OpenAiChat`]: any OpenAI-compatible `/chat/completions` endpoint |
//! | `"echo"` | [`EchoLlm`]: offline, repeats the question with the context count |
//!
//! Upstream failures propagate to the caller; there is no retry.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::config::LlmConfig;
use crate::error::LlmError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

#[async_trait]
pub trait LlmService: Send + Sync {
    async fn complete(
        &self,
        system_prompt: &str,
        messages: &[ChatMessage],
    ) -> Result<String, LlmError>;
}

const PROMPT_PREAMBLE: &str = "You are a helpful assistant with access to a knowlege base, tasked with answering questions about the world and its history, people, places and other events.

Answer the question in a very concise manner. Use an unbiased and journalistic tone. Do not repeat text. Don't make anything up. If you are not sure about something, just say that you don't know.";

const PROMPT_CONTEXT: &str = "Answer the question solely based on the provided search results from the knowledge base. If the search results from the knowledge base are not relevant to the question at hand, just say that you don't know. Don't make anything up.

Anything between the following 'context' XML blocks is retrieved from the knowledge base, not part of the conversation with the user. The bullet points are ordered by relevance, so the first one is the most relevant.";

const PROMPT_CLOSING: &str =
    "Don't mention the knowledge base, context or search results in your answer.";

/// Build the system prompt. The `<context>` block appears only when
/// `contexts` is non-empty.
pub fn system_prompt(contexts: &[String]) -> String {
    let mut prompt = String::from(PROMPT_PREAMBLE);
    prompt.push_str("\n\n");
    if !contexts.is_empty() {
        prompt.push_str(PROMPT_CONTEXT);
        prompt.push_str("\n\n<context>\n");
        for c in contexts {
            prompt.push_str("    - ");
            prompt.push_str(c);
            prompt.push('\n');
        }
        prompt.push_str("</context>\n\n");
    }
    prompt.push_str(PROMPT_CLOSING);
    prompt
}

/// Replay `history` (most recent first, alternating question/answer) oldest
/// first, then append the new question.
pub fn build_messages(history: &[String], question: &str) -> Vec<ChatMessage> {
    let mut messages: Vec<ChatMessage> = history
        .chunks(2)
        .rev()
        .flat_map(|pair| {
            let mut turn = Vec::with_capacity(2);
            if let Some(q) = pair.first() {
                turn.push(ChatMessage::user(q.clone()));
            }
            if let Some(a) = pair.get(1) {
                turn.push(ChatMessage::assistant(a.clone()));
            }
            turn
        })
        .collect();
    messages.push(ChatMessage::user(format!("Question: {}", question)));
    messages
}

pub fn create_llm(config: &LlmConfig) -> Result<Arc<dyn LlmService>> {
    match config.provider.as_str() {
        "openai" => Ok(Arc::new(OpenAiChat::new(config)?)),
        "echo" => Ok(Arc::new(EchoLlm)),
        other => bail!("Unknown llm provider: {}", other),
    }
}

// ============ OpenAI-compatible chat ============

/// Chat completions over HTTP. Reads `OPENAI_API_KEY` per request so the
/// server can start without a key and fail only the requests that need one.
pub struct OpenAiChat {
    url: String,
    model: String,
    client: reqwest::Client,
}

impl OpenAiChat {
    pub fn new(config: &LlmConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        Ok(Self {
            url: format!("{}/chat/completions", config.api_base.trim_end_matches('/')),
            model: config.model.clone(),
            client,
        })
    }
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage>,
}

#[derive(Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Deserialize)]
struct ChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

#[async_trait]
impl LlmService for OpenAiChat {
    async fn complete(
        &self,
        system_prompt: &str,
        messages: &[ChatMessage],
    ) -> Result<String, LlmError> {
        let api_key = std::env::var("OPENAI_API_KEY").map_err(|_| LlmError::MissingApiKey)?;

        let mut all = Vec::with_capacity(messages.len() + 1);
        all.push(ChatMessage {
            role: Role::System,
            content: system_prompt.to_string(),
        });
        all.extend_from_slice(messages);

        let resp = self
            .client
            .post(&self.url)
            .bearer_auth(api_key)
            .json(&ChatRequest {
                model: &self.model,
                messages: all,
            })
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(LlmError::Upstream {
                status: status.as_u16(),
                body,
            });
        }

        let parsed: ChatResponse = resp.json().await?;
        parse_answer(parsed)
    }
}

fn parse_answer(resp: ChatResponse) -> Result<String, LlmError> {
    resp.choices
        .into_iter()
        .next()
        .and_then(|c| c.message.content)
        .map(|s| s.trim().to_string())
        .ok_or(LlmError::EmptyResponse)
}

// ============ Echo ============

/// Offline stand-in for development and tests.
pub struct EchoLlm;

#[async_trait]
impl LlmService for EchoLlm {
    async fn complete(
        &self,
        system_prompt: &str,
        messages: &[ChatMessage],
    ) -> Result<String, LlmError> {
        let question = messages
            .last()
            .map(|m| m.content.trim_start_matches("Question: "))
            .unwrap_or_default();
        let contexts = system_prompt.matches("\n    - ").count();
        Ok(format!("{} ({} references)", question, contexts))
    }
}
