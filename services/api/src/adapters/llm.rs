//! services/api/src/adapters/llm.rs
//!
//! This module contains the adapter for the generative backend. It implements
//! the `GenerativeBackend` port from the `core` crate against any
//! OpenAI-compatible chat completions endpoint (Gemini exposes one).

use async_openai::{
    config::OpenAIConfig,
    error::OpenAIError,
    types::chat::{
        ChatCompletionRequestMessage, ChatCompletionRequestSystemMessageArgs,
        ChatCompletionRequestUserMessageArgs, CreateChatCompletionRequestArgs, ResponseFormat,
    },
    Client,
};
use async_trait::async_trait;
use nutrition_core::{
    domain::{BackendReply, GenerationRequest, TokenCounts},
    ports::{GenerativeBackend, PortError, PortResult},
};
use std::collections::HashMap;
use std::sync::Mutex;
use tracing::debug;

//=========================================================================================
// The Main Adapter Struct
//=========================================================================================

/// An adapter that implements `GenerativeBackend` with one client per secret.
pub struct OpenAiCompatibleBackend {
    api_base: String,
    clients: Mutex<HashMap<String, Client<OpenAIConfig>>>,
}

impl OpenAiCompatibleBackend {
    /// Creates a new `OpenAiCompatibleBackend` talking to `api_base`.
    pub fn new(api_base: impl Into<String>) -> Self {
        Self {
            api_base: api_base.into(),
            clients: Mutex::new(HashMap::new()),
        }
    }

    fn client_for(&self, secret: &str) -> Client<OpenAIConfig> {
        let mut clients = self.clients.lock().unwrap_or_else(|e| e.into_inner());
        clients
            .entry(secret.to_string())
            .or_insert_with(|| {
                Client::with_config(
                    OpenAIConfig::new()
                        .with_api_key(secret)
                        .with_api_base(&self.api_base),
                )
            })
            .clone()
    }
}

fn build_messages(request: &GenerationRequest) -> PortResult<Vec<ChatCompletionRequestMessage>> {
    let mut messages = Vec::with_capacity(2);
    if let Some(instruction) = request
        .system_instruction
        .as_deref()
        .filter(|s| !s.trim().is_empty())
    {
        messages.push(
            ChatCompletionRequestSystemMessageArgs::default()
                .content(instruction)
                .build()
                .map_err(|e| PortError::Unexpected(e.to_string()))?
                .into(),
        );
    }
    messages.push(
        ChatCompletionRequestUserMessageArgs::default()
            .content(request.prompt.as_str())
            .build()
            .map_err(|e| PortError::Unexpected(e.to_string()))?
            .into(),
    );
    Ok(messages)
}

//=========================================================================================
// `GenerativeBackend` Trait Implementation
//=========================================================================================

#[async_trait]
impl GenerativeBackend for OpenAiCompatibleBackend {
    async fn generate(
        &self,
        secret: &str,
        model: &str,
        request: &GenerationRequest,
    ) -> PortResult<BackendReply> {
        let mut args = CreateChatCompletionRequestArgs::default();
        args.model(model).messages(build_messages(request)?).n(1);
        if let Some(max_tokens) = request.max_tokens {
            args.max_tokens(max_tokens);
        }
        if let Some(temperature) = request.temperature {
            args.temperature(temperature);
        }
        if request.json_mode {
            args.response_format(ResponseFormat::JsonObject);
        }
        let chat_request = args
            .build()
            .map_err(|e| PortError::Unexpected(e.to_string()))?;

        let response = self
            .client_for(secret)
            .chat()
            .create(chat_request)
            .await
            .map_err(|e: OpenAIError| PortError::Backend(e.to_string()))?;

        let usage = response.usage.as_ref().map(|u| TokenCounts {
            input: u64::from(u.prompt_tokens),
            output: u64::from(u.completion_tokens),
        });

        let text = response
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .ok_or_else(|| {
                PortError::MalformedResponse("Backend returned no text content.".to_string())
            })?;

        debug!(model, chars = text.len(), ?usage, "Backend reply received");
        Ok(BackendReply { text, usage })
    }
}
