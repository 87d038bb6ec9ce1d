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

//! Polymorphic AI provider client (C3). A single discriminated union
//! over provider variants, each implementing the small `AiProvider`
//! contract below — deliberately not a deep trait hierarchy.

pub mod anthropic;
pub mod google;
pub mod mock;
pub mod openai;
pub mod pricing;

use std::time::Duration;

use rand::Rng;

use crate::config::AppConfig;
use crate::error::ApiError;

/// One call's worth of input to an `AiProvider`.
#[derive(Debug, Clone)]
pub struct GenerateRequest {
  pub model_id: String,
  pub system: String,
  pub prompt: String,
  pub seed: Option<u64>,
  pub max_tokens: u32,
}

/// One call's worth of output from an `AiProvider`, before cost is
/// attached by `AiClient`.
#[derive(Debug, Clone)]
pub struct RawGeneration {
  pub text: String,
  pub tokens_in: u64,
  pub tokens_out: u64,
  pub tokens_reasoning: Option<u64>,
}

/// A completed generation, with cost computed from the model's static
/// price table.
#[derive(Debug, Clone)]
pub struct Generation {
  pub text: String,
  pub tokens_in: u64,
  pub tokens_out: u64,
  pub tokens_reasoning: Option<u64>,
  pub cost_usd: f64,
  pub wall_ms: u64,
}

/// The capability every provider variant implements: send one prompt,
/// get back text plus token accounting, or a classified `ApiError`.
#[async_trait::async_trait]
pub trait AiProvider: Send + Sync {
  async fn generate_raw(&self, request: &GenerateRequest) -> Result<RawGeneration, ApiError>;
}

/// Shared HTTP error classification for the real provider variants:
/// maps a non-2xx status (plus an optional `Retry-After` value and the
/// response body) onto `ApiError`'s taxonomy.
pub(crate) fn classify_http_error(status: reqwest::StatusCode, retry_after: Option<u64>, body: String) -> ApiError {
  if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
    ApiError::RateLimited { retry_after }
  } else if status == reqwest::StatusCode::UNAUTHORIZED || status == reqwest::StatusCode::FORBIDDEN {
    ApiError::Auth(body)
  } else if status.is_server_error() {
    ApiError::Server(body)
  } else {
    ApiError::BadRequest(body)
  }
}

pub(crate) fn transport_error(err: reqwest::Error) -> ApiError {
  ApiError::Transport(err.to_string())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProviderKind {
  Anthropic,
  OpenAi,
  Google,
  Mock,
}

/// Resolves which provider variant owns a given `model_id`, by prefix.
/// Unknown prefixes are a caller error surfaced at startup, not a
/// runtime surprise.
pub fn provider_kind_for_model(model_id: &str) -> Option<ProviderKind> {
  if model_id.starts_with("mock") {
    Some(ProviderKind::Mock)
  } else if model_id.starts_with("claude-") {
    Some(ProviderKind::Anthropic)
  } else if model_id.starts_with("gpt-") || model_id.starts_with("o1") || model_id.starts_with("o3") {
    Some(ProviderKind::OpenAi)
  } else if model_id.starts_with("gemini-") {
    Some(ProviderKind::Google)
  } else {
    None
  }
}

/// The polymorphic client the rest of the harness talks to. Owns one
/// `reqwest::Client` shared across all provider variants for connection
/// pooling, and dispatches each call to the `AiProvider` selected by
/// `model_id`.
pub struct AiClient {
  http: reqwest::Client,
  anthropic_api_key: Option<String>,
  openai_api_key: Option<String>,
  google_api_key: Option<String>,
  mock: mock::MockProvider,
}

const CALL_TIMEOUT: Duration = Duration::from_secs(120);
const MAX_RETRIES: u32 = 5;
const MAX_RETRY_WALL: Duration = Duration::from_secs(60);

impl AiClient {
  pub fn new(config: &AppConfig, mock: mock::MockProvider) -> Self {
    let http = reqwest::Client::builder()
      .timeout(CALL_TIMEOUT)
      .build()
      .expect("reqwest client builds with default TLS backend");

    AiClient {
      http,
      anthropic_api_key: config.anthropic_api_key.clone(),
      openai_api_key: config.openai_api_key.clone(),
      google_api_key: config.google_api_key.clone(),
      mock,
    }
  }

  fn provider_for(&self, kind: ProviderKind) -> Result<Box<dyn AiProvider>, ApiError> {
    match kind {
      ProviderKind::Mock => Ok(Box::new(self.mock.clone())),
      ProviderKind::Anthropic => {
        let key = self.anthropic_api_key.clone().ok_or_else(|| ApiError::Auth("ANTHROPIC_API_KEY not set".to_string()))?;
        Ok(Box::new(anthropic::AnthropicProvider::new(self.http.clone(), key)))
      }
      ProviderKind::OpenAi => {
        let key = self.openai_api_key.clone().ok_or_else(|| ApiError::Auth("OPENAI_API_KEY not set".to_string()))?;
        Ok(Box::new(openai::OpenAiProvider::new(self.http.clone(), key)))
      }
      ProviderKind::Google => {
        let key = self.google_api_key.clone().ok_or_else(|| ApiError::Auth("Google auth token not set".to_string()))?;
        Ok(Box::new(google::GoogleProvider::new(self.http.clone(), key)))
      }
    }
  }

  /// Sends `request`, retrying transient failures with full-jitter
  /// exponential backoff (cap 5 attempts / 60s total). `auth` and
  /// `bad_request` surface immediately.
  pub async fn generate(&self, request: &GenerateRequest) -> Result<Generation, ApiError> {
    let span = tracing::info_span!("ai_generate", model_id = %request.model_id);
    let _enter = span.enter();

    let kind = provider_kind_for_model(&request.model_id).ok_or_else(|| ApiError::UnknownModel(request.model_id.clone()))?;
    let provider = self.provider_for(kind)?;

    let started = std::time::Instant::now();
    let mut attempt = 0u32;

    loop {
      attempt += 1;
      match provider.generate_raw(request).await {
        Ok(raw) => {
          let wall_ms = started.elapsed().as_millis() as u64;
          let cost_usd = pricing::cost_usd(&request.model_id, raw.tokens_in, raw.tokens_out, raw.tokens_reasoning);
          return Ok(Generation {
            text: raw.text,
            tokens_in: raw.tokens_in,
            tokens_out: raw.tokens_out,
            tokens_reasoning: raw.tokens_reasoning,
            cost_usd,
            wall_ms,
          });
        }
        Err(err) if err.is_transient() && attempt < MAX_RETRIES && started.elapsed() < MAX_RETRY_WALL => {
          let delay = backoff_delay(attempt, err.retry_after());
          tracing::warn!(attempt, delay_ms = delay.as_millis() as u64, error = %err, "transient AI call failure, retrying");
          tokio::time::sleep(delay).await;
        }
        Err(err) => return Err(err),
      }
    }
  }
}

/// Full-jitter exponential backoff: a uniform random delay in
/// `[0, base * 2^attempt]`, capped at the remaining retry budget and
/// honoring a provider-supplied `retry_after` as a floor when present.
fn backoff_delay(attempt: u32, retry_after: Option<u64>) -> Duration {
  let base_ms = 250u64;
  let cap_ms = 30_000u64;
  let upper = (base_ms.saturating_mul(1u64 << attempt.min(10))).min(cap_ms);
  let jittered = rand::rng().random_range(0..=upper);
  let floor = retry_after.map(|s| Duration::from_secs(s)).unwrap_or(Duration::ZERO);
  floor.max(Duration::from_millis(jittered))
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn resolves_provider_kind_by_prefix() {
    assert_eq!(provider_kind_for_model("claude-sonnet-4"), Some(ProviderKind::Anthropic));
    assert_eq!(provider_kind_for_model("gpt-4o"), Some(ProviderKind::OpenAi));
    assert_eq!(provider_kind_for_model("gemini-1.5-pro"), Some(ProviderKind::Google));
    assert_eq!(provider_kind_for_model("mock-default"), Some(ProviderKind::Mock));
    assert_eq!(provider_kind_for_model("llama-3"), None);
  }

  #[test]
  fn backoff_delay_respects_retry_after_floor() {
    let delay = backoff_delay(1, Some(5));
    assert!(delay >= Duration::from_secs(5));
  }

  #[tokio::test]
  async fn mock_round_trip_computes_zero_cost() {
    let config = AppConfig::default();
    let mut mock = mock::MockProvider::new();
    mock.register("sys", "hello", "```mock\nprint(3)\n```");
    let client = AiClient::new(&config, mock);

    let request = GenerateRequest {
      model_id: "mock-default".to_string(),
      system: "sys".to_string(),
      prompt: "hello".to_string(),
      seed: Some(1),
      max_tokens: 1024,
    };

    let generation = client.generate(&request).await.unwrap();
    assert_eq!(generation.cost_usd, 0.0);
    assert!(generation.text.contains("print(3)"));
  }
}
