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

const ENDPOINT_BASE: &str = "https://generativelanguage.googleapis.com/v1beta/models";

pub struct GoogleProvider {
  http: reqwest::Client,
  api_key: String,
}

impl GoogleProvider {
  pub fn new(http: reqwest::Client, api_key: String) -> Self {
    GoogleProvider { http, api_key }
  }
}

#[derive(Serialize)]
struct GenerateContentRequest<'a> {
  system_instruction: SystemInstruction<'a>,
  contents: Vec<Content<'a>>,
  #[serde(rename = "generationConfig")]
  generation_config: GenerationConfig,
}

#[derive(Serialize)]
struct SystemInstruction<'a> {
  parts: Vec<Part<'a>>,
}

#[derive(Serialize)]
struct Content<'a> {
  parts: Vec<Part<'a>>,
}

#[derive(Serialize)]
struct Part<'a> {
  text: &'a str,
}

#[derive(Serialize)]
struct GenerationConfig {
  #[serde(rename = "maxOutputTokens")]
  max_output_tokens: u32,
}

#[derive(Deserialize)]
struct GenerateContentResponse {
  candidates: Vec<Candidate>,
  #[serde(rename = "usageMetadata")]
  usage_metadata: UsageMetadata,
}

#[derive(Deserialize)]
struct Candidate {
  content: CandidateContent,
}

#[derive(Deserialize)]
struct CandidateContent {
  #[serde(default)]
  parts: Vec<ResponsePart>,
}

#[derive(Deserialize)]
struct ResponsePart {
  #[serde(default)]
  text: String,
}

#[derive(Deserialize)]
struct UsageMetadata {
  #[serde(rename = "promptTokenCount")]
  prompt_token_count: u64,
  #[serde(rename = "candidatesTokenCount")]
  candidates_token_count: u64,
}

#[async_trait::async_trait]
impl AiProvider for GoogleProvider {
  async fn generate_raw(&self, request: &GenerateRequest) -> Result<RawGeneration, ApiError> {
    // The Gemini API has no seed parameter in its public surface; the
    // seed is recorded on the RunRequest but never transmitted here.
    let body = GenerateContentRequest {
      system_instruction: SystemInstruction { parts: vec![Part { text: &request.system }] },
      contents: vec![Content { parts: vec![Part { text: &request.prompt }] }],
      generation_config: GenerationConfig { max_output_tokens: request.max_tokens },
    };

    let url = format!("{}/{}:generateContent", ENDPOINT_BASE, request.model_id);

    let response = self
      .http
      .post(url)
      .header("x-goog-api-key", &self.api_key)
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

    let parsed: GenerateContentResponse = response.json().await.map_err(transport_error)?;
    let text = parsed
      .candidates
      .into_iter()
      .next()
      .map(|c| c.content.parts.into_iter().map(|p| p.text).collect::<Vec<_>>().join(""))
      .unwrap_or_default();

    Ok(RawGeneration {
      text,
      tokens_in: parsed.usage_metadata.prompt_token_count,
      tokens_out: parsed.usage_metadata.candidates_token_count,
      tokens_reasoning: None,
    })
  }
}
