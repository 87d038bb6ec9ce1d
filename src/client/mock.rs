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

//! Deterministic mock provider: canned responses keyed on a hash of the
//! prompt. Used by `--mock` runs and by the test suite so scenario tests
//! never touch the network.

use std::collections::HashMap;
use std::sync::Arc;

use sha2::Digest;
use sha2::Sha256;

use super::AiProvider;
use super::GenerateRequest;
use super::RawGeneration;
use crate::error::ApiError;

/// Deterministic key derived from `(system, prompt)`. Seed is
/// deliberately excluded: the mock represents a provider without seed
/// support, so reproducibility comes entirely from the canned registry.
fn prompt_key(system: &str, prompt: &str) -> String {
  let mut hasher = Sha256::new();
  hasher.update(system.as_bytes());
  hasher.update([0u8]);
  hasher.update(prompt.as_bytes());
  format!("{:x}", hasher.finalize())
}

/// A registry of canned `(system, prompt) -> response text` mappings.
/// Cheaply `Clone`-able (shared `Arc` storage) so each `AiClient::generate`
/// call can construct a fresh boxed `AiProvider` without copying the map.
#[derive(Debug, Clone, Default)]
pub struct MockProvider {
  responses: Arc<HashMap<String, String>>,
}

impl MockProvider {
  pub fn new() -> Self {
    MockProvider { responses: Arc::new(HashMap::new()) }
  }

  /// Registers a canned response for the exact `(system, prompt)` pair.
  /// Intended for test setup, where the caller builds the prompt with
  /// `crate::prompt::build_prompt`/`build_repair_prompt` first so the key
  /// matches exactly what the harness will send.
  pub fn register(&mut self, system: &str, prompt: &str, response: &str) {
    Arc::make_mut(&mut self.responses).insert(prompt_key(system, prompt), response.to_string());
  }
}

#[async_trait::async_trait]
impl AiProvider for MockProvider {
  async fn generate_raw(&self, request: &GenerateRequest) -> Result<RawGeneration, ApiError> {
    let key = prompt_key(&request.system, &request.prompt);
    let text = self
      .responses
      .get(&key)
      .cloned()
      .unwrap_or_else(|| "```\n// no canned mock response registered for this prompt\n```".to_string());

    Ok(RawGeneration {
      tokens_in: request.prompt.len() as u64 / 4,
      tokens_out: text.len() as u64 / 4,
      tokens_reasoning: None,
      text,
    })
  }
}
