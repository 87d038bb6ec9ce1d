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

//! Loads result directories into the Matrix/Comparison aggregate views
//! and answers regression queries over them (C10).

use std::path::Path;

use crate::error::AnalyzerError;
use crate::model::Comparison;
use crate::model::Matrix;
use crate::model::RunResult;
use crate::store;

/// Loads `dir` and builds its Matrix view, averages guarded against
/// empty cells by `CellSummary::from_results`.
pub fn load_matrix(dir: &Path) -> Result<Matrix, AnalyzerError> {
  let results = store::load_results_dir(dir)?;
  Ok(Matrix::build(&results))
}

/// Computes the per-cell delta and `{fixed, broken, unchanged}`
/// partitions between a baseline and a candidate result directory.
pub fn compare(baseline_dir: &Path, candidate_dir: &Path) -> Result<Comparison, AnalyzerError> {
  let baseline_results = store::load_results_dir(baseline_dir)?;
  if baseline_results.is_empty() {
    return Err(AnalyzerError::EmptyBaseline(baseline_dir.to_path_buf()));
  }
  let candidate_results = store::load_results_dir(candidate_dir)?;

  let baseline = Matrix::build(&baseline_results);
  let candidate = Matrix::build(&candidate_results);
  Ok(Comparison::build(&baseline, &candidate))
}

/// One `(model, language, benchmark)` cell that regressed: passing in
/// baseline, failing in candidate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Regression {
  pub model_id: String,
  pub language: String,
  pub benchmark_id: String,
}

/// A run is a regression iff the same `(benchmark_id, model_id,
/// language)` triple exists in both directories with baseline
/// `final_ok == true` and candidate `final_ok == false`.
pub fn detect_regressions(baseline: &[RunResult], candidate: &[RunResult]) -> Vec<Regression> {
  use std::collections::BTreeMap;

  let key = |r: &RunResult| (r.model_id.clone(), r.language.clone(), r.benchmark_id.clone());

  let baseline_by_key: BTreeMap<_, _> = baseline.iter().map(|r| (key(r), r.final_ok)).collect();
  let candidate_by_key: BTreeMap<_, _> = candidate.iter().map(|r| (key(r), r.final_ok)).collect();

  let mut regressions = Vec::new();
  for (key, &baseline_ok) in &baseline_by_key {
    if !baseline_ok {
      continue;
    }
    if let Some(&candidate_ok) = candidate_by_key.get(key) {
      if !candidate_ok {
        regressions.push(Regression { model_id: key.0.clone(), language: key.1.clone(), benchmark_id: key.2.clone() });
      }
    }
  }
  regressions
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::model::RunRequest;

  fn result(benchmark_id: &str, model_id: &str, language: &str, final_ok: bool) -> RunResult {
    let request = RunRequest {
      benchmark_id: benchmark_id.to_string(),
      language: language.to_string(),
      model_id: model_id.to_string(),
      seed: 0,
      attempt_budget: 1,
      timeout_ms: 1000,
    };
    let mut r = RunResult::new("id".to_string(), &request, Vec::new(), "t".to_string());
    r.final_ok = final_ok;
    r
  }

  #[test]
  fn detects_pass_to_fail_transition_only() {
    let baseline = vec![result("b1", "m1", "lang1", true), result("b2", "m1", "lang1", false)];
    let candidate = vec![result("b1", "m1", "lang1", false), result("b2", "m1", "lang1", true)];

    let regressions = detect_regressions(&baseline, &candidate);
    assert_eq!(regressions.len(), 1);
    assert_eq!(regressions[0].benchmark_id, "b1");
  }

  #[test]
  fn no_regression_when_triple_absent_from_candidate() {
    let baseline = vec![result("b1", "m1", "lang1", true)];
    let candidate: Vec<RunResult> = Vec::new();
    assert!(detect_regressions(&baseline, &candidate).is_empty());
  }

  #[test]
  fn compare_rejects_empty_baseline_directory() {
    let dir = tempfile::tempdir().unwrap();
    let other = tempfile::tempdir().unwrap();
    let err = compare(dir.path(), other.path()).unwrap_err();
    assert!(matches!(err, AnalyzerError::EmptyBaseline(_)));
  }
}
