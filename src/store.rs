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

//! Persists `RunResult`s as one JSON document per `run_id`, plus an
//! append-only `summary.jsonl` and an on-demand `matrix.json` snapshot
//! (C9). Writes are atomic: write to a `NamedTempFile` in the same
//! directory, then `persist` to the final name, so a crash mid-write
//! never leaves a torn file behind.

use std::collections::BTreeMap;
use std::io::Write;
use std::path::Path;
use std::path::PathBuf;

use serde::Serialize;
use sha2::Digest;
use sha2::Sha256;

use crate::error::StoreError;
use crate::model::Matrix;
use crate::model::RunRequest;
use crate::model::RunResult;

#[derive(Serialize)]
struct MatrixSnapshot<'a> {
  version: &'a str,
  matrix: &'a Matrix,
}

/// Derives the deterministic `run_id` for a `RunRequest`: SHA-256 over
/// the canonical (sorted-key) JSON encoding, first 16 hex chars. Relies
/// on `serde_json::Value::Object` being backed by a `BTreeMap` (the
/// crate's default, `preserve_order` is not enabled), so `to_value`
/// followed by `to_string` already yields sorted keys.
pub fn run_id(request: &RunRequest) -> Result<String, StoreError> {
  let value = serde_json::to_value(request)?;
  let canonical = serde_json::to_string(&value)?;
  let mut hasher = Sha256::new();
  hasher.update(canonical.as_bytes());
  let digest = hasher.finalize();
  Ok(digest.iter().take(8).map(|b| format!("{b:02x}")).collect())
}

/// A results directory: one JSON document per run plus a running
/// `summary.jsonl`.
pub struct ResultStore {
  dir: PathBuf,
}

impl ResultStore {
  /// Opens (creating if absent) a results directory.
  pub fn open(dir: impl AsRef<Path>) -> Result<Self, StoreError> {
    let dir = dir.as_ref().to_path_buf();
    std::fs::create_dir_all(&dir).map_err(|e| StoreError::CreateDir(dir.clone(), e))?;
    Ok(ResultStore { dir })
  }

  fn artifact_path(&self, run_id: &str) -> PathBuf {
    self.dir.join(format!("{run_id}.json"))
  }

  /// Whether a `run_id` already has a persisted artifact, for `--resume`.
  pub fn contains(&self, run_id: &str) -> bool {
    self.artifact_path(run_id).exists()
  }

  /// Writes one `RunResult`, atomically, then appends its summary line.
  /// Both steps run regardless of which other runs are in flight — no
  /// ordering is imposed between concurrent calls; determinism instead
  /// comes from always sorting on read.
  pub fn write(&self, result: &RunResult) -> Result<(), StoreError> {
    let path = self.artifact_path(&result.run_id);
    let bytes = serde_json::to_vec_pretty(result)?;

    let mut temp = tempfile::NamedTempFile::new_in(&self.dir).map_err(|e| StoreError::WriteArtifact(path.clone(), e))?;
    temp.write_all(&bytes).map_err(|e| StoreError::WriteArtifact(path.clone(), e))?;
    temp.persist(&path).map_err(|e| StoreError::Persist(path.clone(), e.error))?;

    self.append_summary(result)
  }

  fn append_summary(&self, result: &RunResult) -> Result<(), StoreError> {
    let summary_path = self.dir.join("summary.jsonl");
    let mut file = std::fs::OpenOptions::new().create(true).append(true).open(&summary_path).map_err(StoreError::AppendSummary)?;
    let line = serde_json::to_string(&SummaryRow::from(result))?;
    writeln!(file, "{line}").map_err(StoreError::AppendSummary)?;
    Ok(())
  }

  /// Loads every `<run_id>.json` artifact in the directory, sorted by
  /// `run_id` so iteration is deterministic regardless of write order or
  /// filesystem directory order.
  pub fn load_all(&self) -> Result<Vec<RunResult>, StoreError> {
    load_results_dir(&self.dir)
  }

  /// Writes a `matrix.json` snapshot for `eval-matrix`, tagged with the
  /// version label the caller ran it under.
  pub fn write_matrix_snapshot(&self, matrix: &Matrix, version: &str) -> Result<(), StoreError> {
    let path = self.dir.join("matrix.json");
    let snapshot = MatrixSnapshot { version, matrix };
    let bytes = serde_json::to_vec_pretty(&snapshot)?;
    std::fs::write(&path, bytes).map_err(|e| StoreError::WriteArtifact(path, e))
  }

  pub fn dir(&self) -> &Path {
    &self.dir
  }
}

/// Loads every `<run_id>.json` in `dir`, sorted by `run_id`. Shared by
/// `ResultStore::load_all` and the Analyzer/Validator, which open result
/// directories that were not necessarily produced by this process.
pub fn load_results_dir(dir: &Path) -> Result<Vec<RunResult>, StoreError> {
  let mut by_run_id: BTreeMap<String, RunResult> = BTreeMap::new();

  let entries = std::fs::read_dir(dir).map_err(|e| StoreError::ReadDir(dir.to_path_buf(), e))?;
  for entry in entries {
    let entry = entry.map_err(|e| StoreError::ReadDir(dir.to_path_buf(), e))?;
    let path = entry.path();
    if path.extension().and_then(|e| e.to_str()) != Some("json") {
      continue;
    }
    if path.file_stem().and_then(|s| s.to_str()) == Some("matrix") {
      continue;
    }

    let bytes = std::fs::read(&path).map_err(|source| StoreError::ReadArtifact { path: path.clone(), source })?;
    let result: RunResult = serde_json::from_slice(&bytes).map_err(|source| StoreError::ParseArtifact { path: path.clone(), source })?;
    by_run_id.insert(result.run_id.clone(), result);
  }

  Ok(by_run_id.into_values().collect())
}

/// One flattened line of `summary.jsonl`.
#[derive(serde::Serialize)]
struct SummaryRow<'a> {
  run_id: &'a str,
  benchmark_id: &'a str,
  language: &'a str,
  model_id: &'a str,
  seed: u64,
  zero_shot_ok: bool,
  final_ok: bool,
  total_tokens: u64,
  total_cost_usd: f64,
}

impl<'a> From<&'a RunResult> for SummaryRow<'a> {
  fn from(r: &'a RunResult) -> Self {
    SummaryRow {
      run_id: &r.run_id,
      benchmark_id: &r.benchmark_id,
      language: &r.language,
      model_id: &r.model_id,
      seed: r.seed,
      zero_shot_ok: r.zero_shot_ok,
      final_ok: r.final_ok,
      total_tokens: r.total_tokens,
      total_cost_usd: r.total_cost_usd,
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

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

  fn result(run_id: String, request: &RunRequest) -> RunResult {
    RunResult::new(run_id, request, Vec::new(), "2026-01-01T00:00:00Z".to_string())
  }

  #[test]
  fn run_id_is_deterministic_and_field_order_independent() {
    let a = request();
    let b = RunRequest { language: "lang1".to_string(), benchmark_id: "b_add".to_string(), ..request() };
    assert_eq!(run_id(&a).unwrap(), run_id(&b).unwrap());
  }

  #[test]
  fn run_id_changes_when_a_field_changes() {
    let a = request();
    let mut b = request();
    b.seed = 2;
    assert_ne!(run_id(&a).unwrap(), run_id(&b).unwrap());
  }

  #[test]
  fn write_then_load_round_trips() {
    let dir = tempfile::tempdir().unwrap();
    let store = ResultStore::open(dir.path()).unwrap();
    let req = request();
    let rid = run_id(&req).unwrap();
    let r = result(rid.clone(), &req);

    store.write(&r).unwrap();
    assert!(store.contains(&rid));

    let loaded = store.load_all().unwrap();
    assert_eq!(loaded.len(), 1);
    assert_eq!(loaded[0].run_id, rid);

    let summary_path = dir.path().join("summary.jsonl");
    let summary = std::fs::read_to_string(summary_path).unwrap();
    assert_eq!(summary.lines().count(), 1);
  }

  #[test]
  fn load_all_sorted_by_run_id_regardless_of_write_order() {
    let dir = tempfile::tempdir().unwrap();
    let store = ResultStore::open(dir.path()).unwrap();

    let mut reqs: Vec<RunRequest> = (0..5u64)
      .map(|seed| RunRequest { seed, ..request() })
      .collect();
    reqs.reverse();

    for req in &reqs {
      let rid = run_id(req).unwrap();
      store.write(&result(rid, req)).unwrap();
    }

    let loaded = store.load_all().unwrap();
    let ids: Vec<&str> = loaded.iter().map(|r| r.run_id.as_str()).collect();
    let mut sorted_ids = ids.clone();
    sorted_ids.sort();
    assert_eq!(ids, sorted_ids);
  }

  #[test]
  fn matrix_snapshot_is_tagged_with_version() {
    let dir = tempfile::tempdir().unwrap();
    let store = ResultStore::open(dir.path()).unwrap();
    let matrix = crate::model::Matrix::default();

    store.write_matrix_snapshot(&matrix, "v1").unwrap();

    let bytes = std::fs::read(dir.path().join("matrix.json")).unwrap();
    let value: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
    assert_eq!(value["version"], "v1");
    assert!(value["matrix"]["cells"].is_object());
  }
}
