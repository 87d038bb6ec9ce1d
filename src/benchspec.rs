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

//! Loads and validates the static benchmark definitions (C1).
//!
//! Scans a directory of TOML documents, validates each against
//! `BenchmarkSpec`, and keys the result by benchmark id.

use std::collections::BTreeMap;
use std::path::Path;
use std::path::PathBuf;

use walkdir::WalkDir;

use crate::error::BenchmarkSpecError;
use crate::model::BenchmarkSpec;

/// `benchmark_id -> BenchmarkSpec`, iterable in lexicographic key order
/// because `BTreeMap` is used throughout, so downstream traversals are
/// deterministic.
pub type BenchmarkSet = BTreeMap<String, BenchmarkSpec>;

/// Loads every `*.toml` file under `dir`, recursing into subdirectories,
/// matching the `walkdir`-style traversal used elsewhere in the corpus.
pub fn load_benchmarks(dir: &Path) -> Result<BenchmarkSet, BenchmarkSpecError> {
  let span = tracing::info_span!("load_benchmarks", dir = %dir.display());
  let _enter = span.enter();

  if !dir.exists() {
    return Err(BenchmarkSpecError::DirNotFound(dir.to_path_buf()));
  }

  let mut set = BenchmarkSet::new();
  let mut sources: BTreeMap<String, PathBuf> = BTreeMap::new();

  for entry in WalkDir::new(dir).sort_by_file_name() {
    let entry = entry.map_err(|e| BenchmarkSpecError::ReadDir(std::io::Error::other(e)))?;
    let path = entry.path();

    if !entry.file_type().is_file() {
      continue;
    }
    if path.extension().and_then(|e| e.to_str()) != Some("toml") {
      tracing::debug!(path = %path.display(), "skipping non-toml file");
      continue;
    }

    let spec = load_one(path)?;
    validate(&spec)?;

    if let Some(first) = sources.get(&spec.id) {
      return Err(BenchmarkSpecError::DuplicateId {
        id: spec.id.clone(),
        first: first.clone(),
        second: path.to_path_buf(),
      });
    }

    tracing::debug!(id = %spec.id, path = %path.display(), "loaded benchmark");
    sources.insert(spec.id.clone(), path.to_path_buf());
    set.insert(spec.id.clone(), spec);
  }

  Ok(set)
}

fn load_one(path: &Path) -> Result<BenchmarkSpec, BenchmarkSpecError> {
  let content = std::fs::read_to_string(path).map_err(|source| BenchmarkSpecError::ReadFile {
    path: path.to_path_buf(),
    source,
  })?;

  toml::from_str(&content).map_err(|source| BenchmarkSpecError::TomlParse {
    path: path.to_path_buf(),
    source,
  })
}

fn validate(spec: &BenchmarkSpec) -> Result<(), BenchmarkSpecError> {
  if spec.languages.is_empty() {
    return Err(BenchmarkSpecError::EmptyLanguages { id: spec.id.clone() });
  }
  if spec.timeout_ms < 1_000 {
    return Err(BenchmarkSpecError::TimeoutTooLow {
      id: spec.id.clone(),
      timeout_ms: spec.timeout_ms,
    });
  }
  Ok(())
}

#[cfg(test)]
mod tests {
  use super::*;
  use std::io::Write;

  fn write_benchmark(dir: &Path, filename: &str, content: &str) {
    let path = dir.join(filename);
    let mut file = std::fs::File::create(&path).unwrap();
    file.write_all(content.as_bytes()).unwrap();
  }

  const VALID: &str = r#"
id = "b_add"
description = "Add two numbers"
difficulty = 1
languages = ["lang1", "lang2"]
prompt_template = "Write a program that prints 1 + 2 in <LANG>."
entrypoint = "main"
expected_stdout = "3"
"#;

  #[test]
  fn loads_valid_benchmark() {
    let dir = tempfile::tempdir().unwrap();
    write_benchmark(dir.path(), "b_add.toml", VALID);

    let set = load_benchmarks(dir.path()).unwrap();
    assert_eq!(set.len(), 1);
    assert_eq!(set["b_add"].expected_stdout, "3");
    assert_eq!(set["b_add"].timeout_ms, 30_000);
  }

  #[test]
  fn rejects_unknown_field() {
    let dir = tempfile::tempdir().unwrap();
    write_benchmark(dir.path(), "bad.toml", &format!("{VALID}\nbogus_field = 1\n"));

    let err = load_benchmarks(dir.path()).unwrap_err();
    assert!(matches!(err, BenchmarkSpecError::TomlParse { .. }));
  }

  #[test]
  fn rejects_empty_languages() {
    let dir = tempfile::tempdir().unwrap();
    write_benchmark(
      dir.path(),
      "empty_langs.toml",
      r#"
id = "b_empty"
description = "x"
languages = []
prompt_template = "x"
entrypoint = "main"
"#,
    );

    let err = load_benchmarks(dir.path()).unwrap_err();
    assert!(matches!(err, BenchmarkSpecError::EmptyLanguages { .. }));
  }

  #[test]
  fn rejects_timeout_below_minimum() {
    let dir = tempfile::tempdir().unwrap();
    write_benchmark(
      dir.path(),
      "low_timeout.toml",
      r#"
id = "b_fast"
description = "x"
languages = ["lang1"]
prompt_template = "x"
entrypoint = "main"
timeout_ms = 10
"#,
    );

    let err = load_benchmarks(dir.path()).unwrap_err();
    assert!(matches!(err, BenchmarkSpecError::TimeoutTooLow { .. }));
  }

  #[test]
  fn rejects_missing_directory() {
    let err = load_benchmarks(Path::new("/nonexistent/benchmarks")).unwrap_err();
    assert!(matches!(err, BenchmarkSpecError::DirNotFound(_)));
  }

  #[test]
  fn detects_duplicate_ids() {
    let dir = tempfile::tempdir().unwrap();
    write_benchmark(dir.path(), "a.toml", VALID);
    write_benchmark(dir.path(), "b.toml", VALID);

    let err = load_benchmarks(dir.path()).unwrap_err();
    assert!(matches!(err, BenchmarkSpecError::DuplicateId { .. }));
  }
}
