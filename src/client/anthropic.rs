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

const ENDPOINT: &str = "https://api.anthropic.com/v1/messages";
const ANTHROPIC_VERSION: &str = "2023-06-01";

pub struct AnthropicProvider {
  http: reqwest::Client,
  api_key: String,
}

impl AnthropicProvider {
  pub fn new(http: reqwest::Client, api_key: String) -> Self {
    AnthropicProvider { http, api_key }
  }
}

#[derive(Serialize)]
struct MessagesRequest<'a> {
  model: &'a str,
  system: &'a str,
  messages: Vec<Message<'a>>,
  max_tokens: u32,
  #[serde(skip_serializing_if = "Option::is_none")]
  metadata: Option<RequestMetadata>,
}

#[derive(Serialize)]
struct Message<'a> {
  role: &'a str,
  content: &'a str,
}

#[derive(Serialize)]
struct RequestMetadata {
  // Anthropic's Messages API has no first-class seed parameter; the
  // harness records the seed but does not transmit it, and treats the
  // resulting reproducibility as best-effort.
  #[serde(skip_serializing_if = "Option::is_none")]
  user_id: Option<String>,
}

#[derive(Deserialize)]
struct MessagesResponse {
  content: Vec<ContentBlock>,
  usage: Usage,
}

#[derive(Deserialize)]
struct ContentBlock {
  #[serde(default)]
  text: String,
}

#[derive(Deserialize)]
struct Usage {
  input_tokens: u64,
  output_tokens: u64,
}

#[async_trait::async_trait]
impl AiProvider for AnthropicProvider {
  async fn generate_raw(&self, request: &GenerateRequest) -> Result<RawGeneration, ApiError> {
    let body = MessagesRequest {
      model: &request.model_id,
      system: &request.system,
      messages: vec![Message { role: "user", content: &request.prompt }],
      max_tokens: request.max_tokens,
      metadata: None,
    };

    let response = self
      .http
      .post(ENDPOINT)
      .header("x-api-key", &self.api_key)
      .header("anthropic-version", ANTHROPIC_VERSION)
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

    let parsed: MessagesResponse = response.json().await.map_err(transport_error)?;
    let text = parsed.content.into_iter().map(|b| b.text).collect::<Vec<_>>().join("");

    Ok(RawGeneration {
      text,
      tokens_in: parsed.usage.input_tokens,
      tokens_out: parsed.usage.output_tokens,
      tokens_reasoning: None,
    })
  }
}
