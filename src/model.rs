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

//! Shared data model for the evaluation harness: benchmark definitions,
//! run requests, attempt/run records, and the aggregate matrix/comparison
//! views built from them.

use std::collections::BTreeMap;
use std::collections::BTreeSet;

use serde::Deserialize;
use serde::Serialize;

/// A capability token granting a generated program permission for one
/// effect class. Passed to the sandboxed child on its command line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Capability {
  Io,
  Fs,
  Net,
  Clock,
}

impl std::fmt::Display for Capability {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    let s = match self {
      Capability::Io => "IO",
      Capability::Fs => "FS",
      Capability::Net => "Net",
      Capability::Clock => "Clock",
    };
    f.write_str(s)
  }
}

/// Static definition of a single benchmark, loaded from a TOML document.
///
/// Immutable once loaded: every field is owned data, and the loader
/// (`crate::benchspec`) is the only code that constructs one.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BenchmarkSpec {
  pub id: String,
  pub description: String,
  #[serde(default)]
  pub difficulty: u32,
  pub languages: BTreeSet<String>,
  pub prompt_template: String,
  pub entrypoint: String,
  #[serde(default)]
  pub capabilities: BTreeSet<Capability>,
  #[serde(default)]
  pub expected_stdout: String,
  #[serde(default = "default_timeout_ms")]
  pub timeout_ms: u64,
}

fn default_timeout_ms() -> u64 {
  30_000
}

/// A fully-specified job: one benchmark, one language, one model, one seed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunRequest {
  pub benchmark_id: String,
  pub language: String,
  pub model_id: String,
  pub seed: u64,
  pub attempt_budget: u32,
  pub timeout_ms: u64,
}

/// The outcome of classifying a single attempt's sandbox execution (or,
/// for attempts that never reach the sandbox, the reason they stopped
/// earlier in the pipeline).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
  Ok,
  ParseFail,
  CompileError,
  RuntimeError,
  LogicError,
  Timeout,
  ApiError,
}

impl Outcome {
  pub fn is_ok(self) -> bool {
    matches!(self, Outcome::Ok)
  }

  /// Whether the repair loop is permitted to retry after this outcome:
  /// never repair `api_error`; never repair a second consecutive
  /// `timeout`.
  pub fn repairable(self, previous_was_timeout: bool) -> bool {
    match self {
      Outcome::Ok => false,
      Outcome::ApiError => false,
      Outcome::Timeout => !previous_was_timeout,
      _ => true,
    }
  }
}

impl std::fmt::Display for Outcome {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    let s = match self {
      Outcome::Ok => "ok",
      Outcome::ParseFail => "parse_fail",
      Outcome::CompileError => "compile_error",
      Outcome::RuntimeError => "runtime_error",
      Outcome::LogicError => "logic_error",
      Outcome::Timeout => "timeout",
      Outcome::ApiError => "api_error",
    };
    f.write_str(s)
  }
}

/// One (prompt -> response -> execution -> classification) cycle.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AttemptRecord {
  pub prompt_bytes: u64,
  pub response_bytes: u64,
  pub tokens_input: u64,
  pub tokens_output: u64,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub tokens_reasoning: Option<u64>,
  pub cost_usd: f64,
  pub code_extracted: String,
  pub exit_code: Option<i32>,
  pub stdout: String,
  pub stderr: String,
  pub duration_ms: u64,
  pub outcome: Outcome,
}

impl AttemptRecord {
  pub fn total_tokens(&self) -> u64 {
    self.tokens_input + self.tokens_output + self.tokens_reasoning.unwrap_or(0)
  }
}

/// Aggregates all attempts for one `RunRequest`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunResult {
  pub schema: String,
  pub run_id: String,
  pub benchmark_id: String,
  pub language: String,
  pub model_id: String,
  pub seed: u64,
  pub attempts: Vec<AttemptRecord>,
  pub zero_shot_ok: bool,
  pub final_ok: bool,
  pub total_tokens: u64,
  pub total_cost_usd: f64,
  pub total_duration_ms: u64,
  pub created_at: String,
}

pub const SCHEMA_EVAL_RUN_V1: &str = "eval.run/v1";

impl RunResult {
  /// Builds a `RunResult` from a completed `RunRequest` and its attempts,
  /// computing the derived totals rather than trusting a caller to supply
  /// them: totals are always the sum over attempts.
  pub fn new(run_id: String, request: &RunRequest, attempts: Vec<AttemptRecord>, created_at: String) -> Self {
    let zero_shot_ok = attempts.first().map(|a| a.outcome.is_ok()).unwrap_or(false);
    let final_ok = attempts.iter().any(|a| a.outcome.is_ok());
    let total_tokens = attempts.iter().map(|a| a.total_tokens()).sum();
    let total_cost_usd = attempts.iter().map(|a| a.cost_usd).sum();
    let total_duration_ms = attempts.iter().map(|a| a.duration_ms).sum();

    RunResult {
      schema: SCHEMA_EVAL_RUN_V1.to_string(),
      run_id,
      benchmark_id: request.benchmark_id.clone(),
      language: request.language.clone(),
      model_id: request.model_id.clone(),
      seed: request.seed,
      attempts,
      zero_shot_ok,
      final_ok,
      total_tokens,
      total_cost_usd,
      total_duration_ms,
      created_at,
    }
  }
}

/// Per-cell aggregate for the Matrix: one `(model, language, benchmark)`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CellSummary {
  pub runs: u64,
  pub zero_shot_rate: f64,
  pub final_rate: f64,
  pub avg_tokens: f64,
  pub avg_cost: f64,
}

impl CellSummary {
  /// Builds a summary from the `RunResult`s belonging to one cell. Empty
  /// input returns `None` so that callers never store a zero-run cell,
  /// keeping downstream averages division-safe.
  pub fn from_results(results: &[&RunResult]) -> Option<Self> {
    if results.is_empty() {
      return None;
    }
    let n = results.len() as f64;
    let zero_shot = results.iter().filter(|r| r.zero_shot_ok).count() as f64;
    let final_ok = results.iter().filter(|r| r.final_ok).count() as f64;
    let tokens: u64 = results.iter().map(|r| r.total_tokens).sum();
    let cost: f64 = results.iter().map(|r| r.total_cost_usd).sum();

    Some(CellSummary {
      runs: results.len() as u64,
      zero_shot_rate: zero_shot / n,
      final_rate: final_ok / n,
      avg_tokens: tokens as f64 / n,
      avg_cost: cost / n,
    })
  }
}

/// Three-dimensional aggregate: model -> language -> benchmark -> summary,
/// plus the whole-model and whole-language rollups the leaderboard reads.
///
/// Recomputable from a set of `RunResult`s; never persisted independently
/// of the `matrix.json` snapshot the Reporter writes on request.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Matrix {
  pub cells: BTreeMap<String, BTreeMap<String, BTreeMap<String, CellSummary>>>,
  pub model_rollups: BTreeMap<String, CellSummary>,
  pub language_rollups: BTreeMap<String, CellSummary>,
}

impl Matrix {
  pub fn build(results: &[RunResult]) -> Self {
    let mut grouped: BTreeMap<(String, String, String), Vec<&RunResult>> = BTreeMap::new();
    let mut by_model: BTreeMap<String, Vec<&RunResult>> = BTreeMap::new();
    let mut by_language: BTreeMap<String, Vec<&RunResult>> = BTreeMap::new();

    for r in results {
      grouped
        .entry((r.model_id.clone(), r.language.clone(), r.benchmark_id.clone()))
        .or_default()
        .push(r);
      by_model.entry(r.model_id.clone()).or_default().push(r);
      by_language.entry(r.language.clone()).or_default().push(r);
    }

    let mut cells: BTreeMap<String, BTreeMap<String, BTreeMap<String, CellSummary>>> = BTreeMap::new();
    for ((model, language, benchmark), rs) in grouped {
      if let Some(summary) = CellSummary::from_results(&rs) {
        cells
          .entry(model)
          .or_default()
          .entry(language)
          .or_default()
          .insert(benchmark, summary);
      }
    }

    let mut model_rollups = BTreeMap::new();
    for (model, rs) in by_model {
      if let Some(summary) = CellSummary::from_results(&rs) {
        model_rollups.insert(model, summary);
      }
    }

    let mut language_rollups = BTreeMap::new();
    for (language, rs) in by_language {
      if let Some(summary) = CellSummary::from_results(&rs) {
        language_rollups.insert(language, summary);
      }
    }

    Matrix { cells, model_rollups, language_rollups }
  }

  /// Flattened `(model, language, benchmark, summary)` rows in
  /// lexicographic key order, for reporters and diffing.
  pub fn rows(&self) -> Vec<(&str, &str, &str, &CellSummary)> {
    let mut out = Vec::new();
    for (model, langs) in &self.cells {
      for (language, benches) in langs {
        for (benchmark, summary) in benches {
          out.push((model.as_str(), language.as_str(), benchmark.as_str(), summary));
        }
      }
    }
    out
  }

  pub fn cell(&self, model: &str, language: &str, benchmark: &str) -> Option<&CellSummary> {
    self.cells.get(model)?.get(language)?.get(benchmark)
  }

  /// Whole-model rollups sorted by `final_rate` descending (ties broken
  /// by model id, for a deterministic leaderboard order).
  pub fn leaderboard(&self) -> Vec<(&str, &CellSummary)> {
    let mut rows: Vec<(&str, &CellSummary)> = self.model_rollups.iter().map(|(m, s)| (m.as_str(), s)).collect();
    rows.sort_by(|a, b| b.1.final_rate.partial_cmp(&a.1.final_rate).unwrap_or(std::cmp::Ordering::Equal).then_with(|| a.0.cmp(b.0)));
    rows
  }
}

/// Per-cell delta between a baseline and a candidate Matrix.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CellDelta {
  pub model_id: String,
  pub language: String,
  pub benchmark_id: String,
  pub baseline: Option<CellSummary>,
  pub candidate: Option<CellSummary>,
  pub final_rate_delta: f64,
}

/// Diff between two Matrices, with the `{fixed, broken, unchanged}`
/// partition below.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Comparison {
  pub deltas: Vec<CellDelta>,
  pub fixed: Vec<CellKey>,
  pub broken: Vec<CellKey>,
  pub unchanged: Vec<CellKey>,
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CellKey {
  pub model_id: String,
  pub language: String,
  pub benchmark_id: String,
}

impl Comparison {
  pub fn build(baseline: &Matrix, candidate: &Matrix) -> Self {
    let mut keys: BTreeSet<CellKey> = BTreeSet::new();
    for (model, language, benchmark, _) in baseline.rows() {
      keys.insert(CellKey {
        model_id: model.to_string(),
        language: language.to_string(),
        benchmark_id: benchmark.to_string(),
      });
    }
    for (model, language, benchmark, _) in candidate.rows() {
      keys.insert(CellKey {
        model_id: model.to_string(),
        language: language.to_string(),
        benchmark_id: benchmark.to_string(),
      });
    }

    let mut comparison = Comparison::default();
    for key in keys {
      let base_cell = baseline.cell(&key.model_id, &key.language, &key.benchmark_id).cloned();
      let cand_cell = candidate.cell(&key.model_id, &key.language, &key.benchmark_id).cloned();

      let base_final_ok = base_cell.as_ref().map(|c| c.final_rate > 0.0).unwrap_or(false);
      let cand_final_ok = cand_cell.as_ref().map(|c| c.final_rate > 0.0).unwrap_or(false);

      let final_rate_delta = cand_cell.as_ref().map(|c| c.final_rate).unwrap_or(0.0)
        - base_cell.as_ref().map(|c| c.final_rate).unwrap_or(0.0);

      comparison.deltas.push(CellDelta {
        model_id: key.model_id.clone(),
        language: key.language.clone(),
        benchmark_id: key.benchmark_id.clone(),
        baseline: base_cell,
        candidate: cand_cell,
        final_rate_delta,
      });

      if !base_final_ok && cand_final_ok {
        comparison.fixed.push(key);
      } else if base_final_ok && !cand_final_ok {
        comparison.broken.push(key);
      } else {
        comparison.unchanged.push(key);
      }
    }

    comparison
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn attempt(outcome: Outcome) -> AttemptRecord {
    AttemptRecord {
      prompt_bytes: 10,
      response_bytes: 20,
      tokens_input: 100,
      tokens_output: 50,
      tokens_reasoning: None,
      cost_usd: 0.001,
      code_extracted: "fn main() {}".to_string(),
      exit_code: Some(0),
      stdout: String::new(),
      stderr: String::new(),
      duration_ms: 10,
      outcome,
    }
  }

  #[test]
  fn run_result_totals_match_sum_over_attempts() {
    let request = RunRequest {
      benchmark_id: "b_add".to_string(),
      language: "lang1".to_string(),
      model_id: "mock-1".to_string(),
      seed: 42,
      attempt_budget: 3,
      timeout_ms: 30_000,
    };
    let attempts = vec![attempt(Outcome::RuntimeError), attempt(Outcome::Ok)];
    let result = RunResult::new("deadbeefdeadbeef".to_string(), &request, attempts, "2026-01-01T00:00:00Z".to_string());

    assert_eq!(result.total_tokens, 300);
    assert!(!result.zero_shot_ok);
    assert!(result.final_ok);
  }

  #[test]
  fn cell_summary_absent_when_no_runs() {
    let results: Vec<&RunResult> = Vec::new();
    assert!(CellSummary::from_results(&results).is_none());
  }

  #[test]
  fn comparison_symmetry_fixed_broken() {
    let req = RunRequest {
      benchmark_id: "b_add".to_string(),
      language: "lang1".to_string(),
      model_id: "mock-1".to_string(),
      seed: 1,
      attempt_budget: 1,
      timeout_ms: 1000,
    };
    let base = RunResult::new("a".to_string(), &req, vec![attempt(Outcome::RuntimeError)], "t".to_string());
    let cand = RunResult::new("a".to_string(), &req, vec![attempt(Outcome::Ok)], "t".to_string());

    let m_base = Matrix::build(&[base]);
    let m_cand = Matrix::build(&[cand]);

    let forward = Comparison::build(&m_base, &m_cand);
    let backward = Comparison::build(&m_cand, &m_base);

    assert_eq!(forward.fixed, backward.broken);
    assert_eq!(forward.broken, backward.fixed);
  }
}
