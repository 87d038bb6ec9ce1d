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
use std::path::PathBuf;

use thiserror::Error;

/// Top-level error enum for the evalharness library.
#[derive(Error, Debug)]
pub enum EvalHarnessError {
  #[error("Benchmark spec error")]
  BenchmarkSpec(#[from] BenchmarkSpecError),

  #[error("AI client error")]
  Api(#[from] ApiError),

  #[error("Sandbox error")]
  Sandbox(#[from] SandboxError),

  #[error("Runner error")]
  Runner(#[from] RunnerError),

  #[error("Result store error")]
  Store(#[from] StoreError),

  #[error("Analyzer error")]
  Analyzer(#[from] AnalyzerError),

  #[error("Validator error")]
  Validator(#[from] ValidatorError),

  #[error("Report error")]
  Report(#[from] ReportError),

  #[error("Configuration error")]
  Config(#[from] ConfigError),

  #[error("I/O error: {0}")]
  Io(#[from] std::io::Error),

  #[error("JSON serialization/deserialization error: {0}")]
  Json(#[from] serde_json::Error),
}

/// Errors from loading and validating benchmark definitions (`src/benchspec.rs`).
#[derive(Error, Debug)]
pub enum BenchmarkSpecError {
  #[error("Benchmarks directory not found: {0}")]
  DirNotFound(PathBuf),

  #[error("Failed to read benchmarks directory")]
  ReadDir(#[source] std::io::Error),

  #[error("Failed to read benchmark file {path}")]
  ReadFile {
    path: PathBuf,
    #[source]
    source: std::io::Error,
  },

  #[error("Failed to parse benchmark TOML in {path}: {source}")]
  TomlParse {
    path: PathBuf,
    #[source]
    source: toml::de::Error,
  },

  #[error("Benchmark '{id}' declares no languages; at least one is required")]
  EmptyLanguages { id: String },

  #[error("Benchmark '{id}' has timeout_ms={timeout_ms}, below the minimum of 1000")]
  TimeoutTooLow { id: String, timeout_ms: u64 },

  #[error("Duplicate benchmark id '{id}' defined in both {first} and {second}")]
  DuplicateId { id: String, first: PathBuf, second: PathBuf },
}

/// Errors surfaced by an `AiProvider::generate` call (`src/client`).
#[derive(Error, Debug, Clone)]
pub enum ApiError {
  #[error("rate limited{}", retry_after.map(|s| format!(", retry after {s}s")).unwrap_or_default())]
  RateLimited { retry_after: Option<u64> },

  #[error("authentication failed: {0}")]
  Auth(String),

  #[error("transport error: {0}")]
  Transport(String),

  #[error("server error: {0}")]
  Server(String),

  #[error("bad request: {0}")]
  BadRequest(String),

  #[error("unknown model id '{0}'")]
  UnknownModel(String),
}

impl ApiError {
  /// Whether this error kind is transient and eligible for retry:
  /// `rate_limited`, `server`, `transport`.
  pub fn is_transient(&self) -> bool {
    matches!(self, ApiError::RateLimited { .. } | ApiError::Server(_) | ApiError::Transport(_))
  }

  pub fn retry_after(&self) -> Option<u64> {
    match self {
      ApiError::RateLimited { retry_after } => *retry_after,
      _ => None,
    }
  }
}

/// Errors from the sandbox runner (`src/sandbox.rs`).
#[derive(Error, Debug)]
pub enum SandboxError {
  #[error("failed to create temp directory")]
  TempDir(#[source] std::io::Error),

  #[error("failed to write source file {0}")]
  WriteSource(PathBuf, #[source] std::io::Error),

  #[error("failed to spawn child process")]
  Spawn(#[source] std::io::Error),

  #[error("failed to take child stdout pipe")]
  PipeStdout,

  #[error("failed to take child stderr pipe")]
  PipeStderr,

  #[error("failed to read child stdout")]
  ReadStdout(#[source] std::io::Error),

  #[error("failed to read child stderr")]
  ReadStderr(#[source] std::io::Error),

  #[error("stdout task failed")]
  StdoutTask(#[source] tokio::task::JoinError),

  #[error("stderr task failed")]
  StderrTask(#[source] tokio::task::JoinError),

  #[error("failed to wait for child process")]
  WaitChild(#[source] std::io::Error),
}

/// Errors from the fan-out runner (`src/runner.rs`).
#[derive(Error, Debug)]
pub enum RunnerError {
  #[error("worker task panicked or was cancelled")]
  WorkerTask(#[source] tokio::task::JoinError),

  #[error("run cancelled")]
  Cancelled,

  #[error("no runs completed")]
  NoRunsCompleted,

  #[error("result store error")]
  Store(#[from] StoreError),
}

/// Errors from the result store (`src/store.rs`).
#[derive(Error, Debug)]
pub enum StoreError {
  #[error("failed to create results directory {0}")]
  CreateDir(PathBuf, #[source] std::io::Error),

  #[error("failed to serialize run result")]
  Serialize(#[from] serde_json::Error),

  #[error("failed to write run artifact {0}")]
  WriteArtifact(PathBuf, #[source] std::io::Error),

  #[error("failed to persist temp file to {0}")]
  Persist(PathBuf, #[source] std::io::Error),

  #[error("failed to append to summary.jsonl")]
  AppendSummary(#[source] std::io::Error),

  #[error("failed to read results directory {0}")]
  ReadDir(PathBuf, #[source] std::io::Error),

  #[error("failed to read run artifact {path}")]
  ReadArtifact {
    path: PathBuf,
    #[source]
    source: std::io::Error,
  },

  #[error("failed to parse run artifact {path}")]
  ParseArtifact {
    path: PathBuf,
    #[source]
    source: serde_json::Error,
  },
}

/// Errors from the matrix/comparison analyzer (`src/analyzer.rs`).
#[derive(Error, Debug)]
pub enum AnalyzerError {
  #[error("result store error")]
  Store(#[from] StoreError),

  #[error("baseline directory contains no run results: {0}")]
  EmptyBaseline(PathBuf),
}

/// Errors from the single-benchmark validator (`src/validator.rs`).
#[derive(Error, Debug)]
pub enum ValidatorError {
  #[error("result store error")]
  Store(#[from] StoreError),

  #[error("no baseline run found for benchmark '{0}'")]
  NoBaseline(String),

  #[error("runner error")]
  Runner(#[from] RunnerError),
}

/// Errors from report emission (`src/report.rs`).
#[derive(Error, Debug)]
pub enum ReportError {
  #[error("failed to write report")]
  Write(#[source] std::io::Error),

  #[error("failed to serialize report row")]
  Serialize(#[from] serde_json::Error),

  #[error("failed to write CSV row")]
  Csv(#[from] csv::Error),
}

/// Errors from application configuration resolution (`src/config.rs`).
#[derive(Error, Debug)]
pub enum ConfigError {
  #[error("failed to load configuration layers")]
  Figment(#[from] figment::Error),

  #[error("--langs value '{0}' is not a comma-separated list of language tags")]
  InvalidLangsFilter(String),
}
