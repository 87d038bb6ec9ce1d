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

//! Drives one `RunRequest` through repeated
//! prompt -> generate -> extract -> sandbox -> classify cycles, up to
//! its `attempt_budget` (C7). Terminates on the first `ok` outcome, on
//! an `api_error`, or when `Outcome::repairable` says no.

use crate::client::AiClient;
use crate::client::GenerateRequest;
use crate::classify;
use crate::classify::ClassifyInput;
use crate::extract;
use crate::model::AttemptRecord;
use crate::model::BenchmarkSpec;
use crate::model::Outcome;
use crate::model::RunRequest;
use crate::prompt;
use crate::prompt::AttemptHistoryEntry;
use crate::prompt::ModelHint;
use crate::runner::RateLimiter;
use crate::sandbox;
use crate::sandbox::LanguageRunner;
use crate::sandbox::SandboxRequest;

const STDERR_TAIL_BYTES: usize = 2000;
const MAX_TOKENS: u32 = 4096;

/// Runs `spec` against `request` for up to `request.attempt_budget`
/// cycles, returning every attempt made. Acquires a fresh rate-limiter
/// token around each model call alone, not around the sandbox execution
/// that follows it.
pub async fn run_attempts(
  ai_client: &AiClient,
  spec: &BenchmarkSpec,
  request: &RunRequest,
  runner: &LanguageRunner,
  hints: &[ModelHint],
  rate_limiter: &RateLimiter,
) -> Vec<AttemptRecord> {
  let mut attempts = Vec::new();
  let mut history: Vec<AttemptHistoryEntry> = Vec::new();
  let mut previous_was_timeout = false;

  for attempt_no in 1..=request.attempt_budget.max(1) {
    let built_prompt = if history.is_empty() {
      prompt::build_prompt(spec, &request.language, hints)
    } else {
      prompt::build_repair_prompt(spec, &request.language, hints, &history)
    };

    tracing::debug!(attempt_no, benchmark_id = %request.benchmark_id, "starting attempt");

    let generation = {
      let _rate_permit = rate_limiter.acquire().await;
      match ai_client
        .generate(&GenerateRequest {
          model_id: request.model_id.clone(),
          system: built_prompt.system.clone(),
          prompt: built_prompt.user.clone(),
          seed: Some(request.seed),
          max_tokens: MAX_TOKENS,
        })
        .await
      {
        Ok(g) => g,
        Err(err) => {
          tracing::warn!(error = %err, "ai call failed, recording api_error attempt");
          attempts.push(api_error_attempt(&built_prompt.user, &err.to_string()));
          break;
        }
      }
    };

    let code = extract::extract_code(&generation.text, &request.language);

    if code.is_empty() {
      let record = AttemptRecord {
        prompt_bytes: built_prompt.user.len() as u64,
        response_bytes: generation.text.len() as u64,
        tokens_input: generation.tokens_in,
        tokens_output: generation.tokens_out,
        tokens_reasoning: generation.tokens_reasoning,
        cost_usd: generation.cost_usd,
        code_extracted: String::new(),
        exit_code: None,
        stdout: String::new(),
        stderr: String::new(),
        duration_ms: generation.wall_ms,
        outcome: Outcome::ParseFail,
      };
      let repairable = record.outcome.repairable(previous_was_timeout);
      previous_was_timeout = false;
      attempts.push(record);
      if !repairable {
        break;
      }
      push_history(&mut history, &attempts);
      continue;
    }

    let sandbox_request = SandboxRequest {
      code: &code,
      runner,
      entrypoint: &spec.entrypoint,
      capabilities: &spec.capabilities,
      stdin: None,
      timeout: std::time::Duration::from_millis(request.timeout_ms),
    };

    let sandbox_output = match sandbox::run_sandboxed(sandbox_request).await {
      Ok(output) => output,
      Err(err) => {
        tracing::warn!(error = %err, "sandbox execution failed, recording api_error attempt");
        let mut record = api_error_attempt(&built_prompt.user, &err.to_string());
        record.code_extracted = code;
        record.response_bytes = generation.text.len() as u64;
        record.tokens_input = generation.tokens_in;
        record.tokens_output = generation.tokens_out;
        record.tokens_reasoning = generation.tokens_reasoning;
        record.cost_usd = generation.cost_usd;
        attempts.push(record);
        break;
      }
    };

    let outcome = if sandbox_output.timed_out {
      Outcome::Timeout
    } else {
      classify::classify(&ClassifyInput {
        exit_code: sandbox_output.exit_code,
        stdout: &sandbox_output.stdout,
        stderr: &sandbox_output.stderr,
        expected_stdout: &spec.expected_stdout,
        language: &request.language,
      })
    };

    let record = AttemptRecord {
      prompt_bytes: built_prompt.user.len() as u64,
      response_bytes: generation.text.len() as u64,
      tokens_input: generation.tokens_in,
      tokens_output: generation.tokens_out,
      tokens_reasoning: generation.tokens_reasoning,
      cost_usd: generation.cost_usd,
      code_extracted: code,
      exit_code: sandbox_output.exit_code,
      stdout: sandbox_output.stdout,
      stderr: sandbox_output.stderr,
      duration_ms: sandbox_output.duration_ms,
      outcome,
    };

    let is_last_allowed_attempt = attempt_no == request.attempt_budget.max(1);
    let repairable = record.outcome.repairable(previous_was_timeout);
    previous_was_timeout = matches!(record.outcome, Outcome::Timeout);
    attempts.push(record);

    if attempts.last().map(|a| a.outcome.is_ok()).unwrap_or(false) {
      break;
    }
    if !repairable || is_last_allowed_attempt {
      break;
    }

    push_history(&mut history, &attempts);
  }

  attempts
}

fn push_history(history: &mut Vec<AttemptHistoryEntry>, attempts: &[AttemptRecord]) {
  if let Some(last) = attempts.last() {
    let tail_start = last.stderr.len().saturating_sub(STDERR_TAIL_BYTES);
    history.push(AttemptHistoryEntry {
      code: last.code_extracted.clone(),
      stderr_tail: last.stderr[tail_start..].to_string(),
      outcome_description: last.outcome.to_string(),
    });
  }
}

fn api_error_attempt(prompt_user: &str, message: &str) -> AttemptRecord {
  AttemptRecord {
    prompt_bytes: prompt_user.len() as u64,
    response_bytes: 0,
    tokens_input: 0,
    tokens_output: 0,
    tokens_reasoning: None,
    cost_usd: 0.0,
    code_extracted: String::new(),
    exit_code: None,
    stdout: String::new(),
    stderr: message.to_string(),
    duration_ms: 0,
    outcome: Outcome::ApiError,
  }
}

#[cfg(test)]
mod tests {
  use std::path::PathBuf;

  use super::*;
  use crate::client::mock::MockProvider;
  use crate::config::AppConfig;

  fn spec() -> BenchmarkSpec {
    BenchmarkSpec {
      id: "b_add".to_string(),
      description: "print 3".to_string(),
      difficulty: 1,
      languages: ["lang1".to_string()].into_iter().collect(),
      prompt_template: "Write a <LANG> program that prints 3.".to_string(),
      entrypoint: "main".to_string(),
      capabilities: Default::default(),
      expected_stdout: "3".to_string(),
      timeout_ms: 5000,
    }
  }

  fn request() -> RunRequest {
    RunRequest {
      benchmark_id: "b_add".to_string(),
      language: "lang1".to_string(),
      model_id: "mock-default".to_string(),
      seed: 1,
      attempt_budget: 3,
      timeout_ms: 5000,
    }
  }

  fn shell_runner(script: &str) -> LanguageRunner {
    LanguageRunner {
      command: PathBuf::from("/bin/sh"),
      base_args: vec!["-c".to_string(), script.to_string()],
      source_filename: "main.txt".to_string(),
    }
  }

  fn unlimited_rate_limiter() -> RateLimiter {
    RateLimiter::new(u32::MAX)
  }

  #[tokio::test]
  async fn stops_on_first_ok_outcome() {
    let s = spec();
    let req = request();
    let p = prompt::build_prompt(&s, "lang1", &[]);

    let mut mock = MockProvider::new();
    mock.register(&p.system, &p.user, "```lang1\nprint(3)\n```");
    let client = AiClient::new(&AppConfig::default(), mock);

    let runner = shell_runner("echo 3");
    let limiter = unlimited_rate_limiter();
    let attempts = run_attempts(&client, &s, &req, &runner, &[], &limiter).await;

    assert_eq!(attempts.len(), 1);
    assert_eq!(attempts[0].outcome, Outcome::Ok);
  }

  #[tokio::test]
  async fn empty_extraction_is_parse_fail_and_repairable() {
    let s = spec();
    let mut req = request();
    req.attempt_budget = 2;
    let p = prompt::build_prompt(&s, "lang1", &[]);

    let mut mock = MockProvider::new();
    mock.register(&p.system, &p.user, "no fenced block here");
    let client = AiClient::new(&AppConfig::default(), mock);

    let runner = shell_runner("cat $0");
    let limiter = unlimited_rate_limiter();
    let attempts = run_attempts(&client, &s, &req, &runner, &[], &limiter).await;

    assert!(attempts.iter().all(|a| a.outcome != Outcome::Ok));
    assert!(!attempts.is_empty());
  }

  #[tokio::test]
  async fn respects_attempt_budget_of_one() {
    let s = spec();
    let mut req = request();
    req.attempt_budget = 1;
    let p = prompt::build_prompt(&s, "lang1", &[]);

    let mut mock = MockProvider::new();
    mock.register(&p.system, &p.user, "```lang1\nwrong\n```");
    let client = AiClient::new(&AppConfig::default(), mock);

    let runner = shell_runner("echo 2");
    let limiter = unlimited_rate_limiter();
    let attempts = run_attempts(&client, &s, &req, &runner, &[], &limiter).await;

    assert_eq!(attempts.len(), 1);
  }
}
