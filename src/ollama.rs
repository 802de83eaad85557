//! Blocking client for a local Ollama server.
//!
//! Implements [`Embedder`] over `POST /api/embed` and [`Generator`] over
//! non-streaming `POST /api/chat`.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::{
    embedding::{Embedder, check_batch},
    error::{Error, Result},
    generation::{GenerationParams, Generator},
    settings::Settings,
};

#[derive(Debug, Serialize)]
struct EmbedRequest<'a> {
    model: &'a str,
    input: &'a [String],
}

#[derive(Debug, Deserialize)]
struct EmbedResponse {
    embeddings: Vec<Vec<f32>>,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Debug, Serialize)]
struct ChatOptions {
    temperature: f32,
    num_predict: u32,
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    stream: bool,
    options: ChatOptions,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    message: ChatReply,
}

#[derive(Debug, Deserialize)]
struct ChatReply {
    content: String,
}

/// Body Ollama sends with non-2xx responses.
#[derive(Debug, Deserialize)]
struct ErrorBody {
    error: String,
}

fn chat_messages<'a>(system: &'a str, user: &'a str) -> Vec<ChatMessage<'a>> {
    let mut messages = Vec::with_capacity(2);
    if !system.is_empty() {
        messages.push(ChatMessage {
            role: "system",
            content: system,
        });
    }
    messages.push(ChatMessage {
        role: "user",
        content: user,
    });
    messages
}

/// Turn an HTTP status error into a provider error carrying Ollama's
/// message; transport errors stay [`Error::Http`].
fn provider_error(
    err: ureq::Error,
    wrap: fn(String) -> Error,
) -> Error {
    match err {
        ureq::Error::Status(code, response) => {
            let detail = response
                .into_json::<ErrorBody>()
                .map(|body| body.error)
                .unwrap_or_else(|_| "no error message".to_string());
            wrap(format!("server answered {code}: {detail}"))
        }
        other => Error::from(other),
    }
}

pub struct OllamaClient {
    agent: ureq::Agent,
    base_url: String,
    generation_model: String,
    embedding_model: String,
}

impl OllamaClient {
    pub fn new(
        base_url: &str,
        generation_model: &str,
        embedding_model: &str,
        timeout: Duration,
    ) -> Self {
        let agent = ureq::AgentBuilder::new().timeout(timeout).build();
        Self {
            agent,
            base_url: base_url.trim_end_matches('/').to_string(),
            generation_model: generation_model.to_string(),
            embedding_model: embedding_model.to_string(),
        }
    }

    pub fn from_settings(settings: &Settings) -> Self {
        Self::new(
            &settings.ollama_url,
            &settings.generation_model,
            &settings.embedding_model,
            Duration::from_secs(settings.timeout_secs),
        )
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }
}

impl Embedder for OllamaClient {
    fn embed(&self, batch: &[String]) -> Result<Vec<Vec<f32>>> {
        if batch.is_empty() {
            return Ok(Vec::new());
        }

        debug!(model = %self.embedding_model, texts = batch.len(), "embedding");
        let response: EmbedResponse = self
            .agent
            .post(&self.endpoint("/api/embed"))
            .send_json(EmbedRequest {
                model: &self.embedding_model,
                input: batch,
            })
            .map_err(|e| provider_error(e, Error::Embedding))?
            .into_json()?;

        check_batch(batch.len(), &response.embeddings)?;
        Ok(response.embeddings)
    }
}

impl Generator for OllamaClient {
    fn generate(
        &self,
        system: &str,
        user: &str,
        params: GenerationParams,
    ) -> Result<String> {
        debug!(
            model = %self.generation_model,
            temperature = params.temperature,
            max_tokens = params.max_tokens,
            "generating"
        );
        let response: ChatResponse = self
            .agent
            .post(&self.endpoint("/api/chat"))
            .send_json(ChatRequest {
                model: &self.generation_model,
                messages: chat_messages(system, user),
                stream: false,
                options: ChatOptions {
                    temperature: params.temperature,
                    num_predict: params.max_tokens,
                },
            })
            .map_err(|e| provider_error(e, Error::Generation))?
            .into_json()?;

        Ok(response.message.content)
    }
}

impl std::fmt::Debug for OllamaClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OllamaClient")
            .field("base_url", &self.base_url)
            .field("generation_model", &self.generation_model)
            .field("embedding_model", &self.embedding_model)
            .finish_non_exhaustive()
    }
}
