// Copyright 2025 Chisomo Makombo Sakala
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use serde::Deserialize;
use serde::Serialize;

use super::AiProvider;
use super::GenerateRequest;
use super::RawGeneration;
use super::classify_http_error;
use super::transport_error;
use crate::error::ApiError;

const ENDPOINT: &str = "https://api.openai.com/v1/chat/completions";

pub struct OpenAiProvider {
  http: reqwest::Client,
  api_key: String,
}

impl OpenAiProvider {
  pub fn new(http: reqwest::Client, api_key: String) -> Self {
    OpenAiProvider { http, api_key }
  }
}

#[derive(Serialize)]
struct ChatRequest<'a> {
  model: &'a str,
  messages: Vec<ChatMessage<'a>>,
  max_tokens: u32,
  #[serde(skip_serializing_if = "Option::is_none")]
  seed: Option<u64>,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
  role: &'a str,
  content: &'a str,
}

#[derive(Deserialize)]
struct ChatResponse {
  choices: Vec<Choice>,
  usage: Usage,
}

#[derive(Deserialize)]
struct Choice {
  message: ChoiceMessage,
}

#[derive(Deserialize)]
struct ChoiceMessage {
  #[serde(default)]
  content: String,
}

#[derive(Deserialize)]
struct Usage {
  prompt_tokens: u64,
  completion_tokens: u64,
  #[serde(default)]
  completion_tokens_details: Option<CompletionTokensDetails>,
}

#[derive(Deserialize)]
struct CompletionTokensDetails {
  #[serde(default)]
  reasoning_tokens: Option<u64>,
}

#[async_trait::async_trait]
impl AiProvider for OpenAiProvider {
  async fn generate_raw(&self, request: &GenerateRequest) -> Result<RawGeneration, ApiError> {
    // OpenAI's Chat Completions API accepts a best-effort `seed` for
    // reproducibility, unlike Anthropic's Messages API; forwarded
    // verbatim.
    let body = ChatRequest {
      model: &request.model_id,
      messages: vec![
        ChatMessage { role: "system", content: &request.system },
        ChatMessage { role: "user", content: &request.prompt },
      ],
      max_tokens: request.max_tokens,
      seed: request.seed,
    };

    let response = self
      .http
      .post(ENDPOINT)
      .bearer_auth(&self.api_key)
      .json(&body)
      .send()
      .await
      .map_err(transport_error)?;

    let status = response.status();
    if !status.is_success() {
      let retry_after = response
        .headers()
        .get("retry-after")
        .and_then(|v| v.to_str().ok())
        .and_then(|s| s.parse::<u64>().ok());
      let body = response.text().await.unwrap_or_default();
      return Err(classify_http_error(status, retry_after, body));
    }

    let parsed: ChatResponse = response.json().await.map_err(transport_error)?;
    let text = parsed.choices.into_iter().next().map(|c| c.message.content).unwrap_or_default();
    let tokens_reasoning = parsed.usage.completion_tokens_details.and_then(|d| d.reasoning_tokens);

    Ok(RawGeneration {
      text,
      tokens_in: parsed.usage.prompt_tokens,
      tokens_out: parsed.usage.completion_tokens,
      tokens_reasoning,
    })
  }
}
