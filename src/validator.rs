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

//! Re-validates a single benchmark against its most recent baseline run
//! (C11): loads the baseline `RunResult`, re-executes the same
//! `RunRequest` against current state, and classifies the transition.

use std::path::Path;
use std::sync::Arc;

use crate::client::AiClient;
use crate::config::AppConfig;
use crate::error::ValidatorError;
use crate::model::BenchmarkSpec;
use crate::model::RunRequest;
use crate::model::RunResult;
use crate::prompt::ModelHint;
use crate::repair;
use crate::runner;
use crate::runner::RateLimiter;
use crate::runner::RunnerOptions;
use crate::store;
use crate::store::run_id;

/// The four-way classification of a validation re-run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValidationState {
  Validated,
  StillFailing,
  NewlyBroken,
  Improved,
}

impl ValidationState {
  fn from_transition(baseline_ok: bool, candidate_ok: bool) -> Self {
    match (baseline_ok, candidate_ok) {
      (true, true) => ValidationState::Validated,
      (false, false) => ValidationState::StillFailing,
      (true, false) => ValidationState::NewlyBroken,
      (false, true) => ValidationState::Improved,
    }
  }
}

/// A small structured diff describing one validation re-run.
#[derive(Debug, Clone)]
pub struct ValidationReport {
  pub state: ValidationState,
  pub baseline_run_id: String,
  pub candidate: RunResult,
}

/// Selects the baseline run to validate against: the most recent
/// (by `created_at`, tie-broken by `run_id` for determinism) result for
/// `benchmark_id`, optionally restricted to those whose `run_id` starts
/// with `version`.
fn select_baseline<'a>(results: &'a [RunResult], benchmark_id: &str, version: Option<&str>) -> Option<&'a RunResult> {
  results
    .iter()
    .filter(|r| r.benchmark_id == benchmark_id)
    .filter(|r| version.map(|v| r.run_id.starts_with(v)).unwrap_or(true))
    .max_by(|a, b| (a.created_at.as_str(), a.run_id.as_str()).cmp(&(b.created_at.as_str(), b.run_id.as_str())))
}

/// Runs the validator for one benchmark: finds the baseline, re-executes
/// an identical `RunRequest`, and classifies the transition.
pub async fn validate(
  ai_client: Arc<AiClient>,
  config: &AppConfig,
  spec: &BenchmarkSpec,
  baseline_dir: &Path,
  benchmark_id: &str,
  version: Option<&str>,
  mock: bool,
  hints: &[ModelHint],
) -> Result<ValidationReport, ValidatorError> {
  let baseline_results = store::load_results_dir(baseline_dir)?;
  let baseline = select_baseline(&baseline_results, benchmark_id, version)
    .ok_or_else(|| ValidatorError::NoBaseline(benchmark_id.to_string()))?
    .clone();

  let model_id = if mock && !baseline.model_id.starts_with("mock") {
    format!("mock-{}", baseline.model_id)
  } else {
    baseline.model_id.clone()
  };

  let request = RunRequest {
    benchmark_id: baseline.benchmark_id.clone(),
    language: baseline.language.clone(),
    model_id,
    seed: baseline.seed,
    attempt_budget: config.default_attempts,
    timeout_ms: spec.timeout_ms,
  };

  let language_runner = runner::resolve_language_runner(&request.language, config);
  let rate_limiter = RateLimiter::new(RunnerOptions::default().provider_rate_per_sec);
  let attempts = repair::run_attempts(&ai_client, spec, &request, &language_runner, hints, &rate_limiter).await;
  let candidate_run_id = run_id(&request)?;
  let candidate = RunResult::new(candidate_run_id, &request, attempts, crate::logging::now_iso8601());

  let state = ValidationState::from_transition(baseline.final_ok, candidate.final_ok);

  Ok(ValidationReport { state, baseline_run_id: baseline.run_id, candidate })
}
