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

//! Orchestrates `RunRequest` fan-out over a global worker pool with
//! per-provider rate limiting, cancellation, and a failure policy that
//! keeps one bad request from sinking the whole batch (C8).

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::AtomicBool;
use std::sync::atomic::AtomicUsize;
use std::sync::atomic::Ordering;
use std::time::Duration;

use futures::stream::FuturesUnordered;
use futures::stream::StreamExt;
use tokio::sync::Notify;
use tokio::sync::Semaphore;

use crate::client::AiClient;
use crate::client::ProviderKind;
use crate::client::provider_kind_for_model;
use crate::config::AppConfig;
use crate::error::RunnerError;
use crate::extract;
use crate::model::AttemptRecord;
use crate::model::BenchmarkSpec;
use crate::model::Outcome;
use crate::model::RunRequest;
use crate::model::RunResult;
use crate::prompt::ModelHint;
use crate::repair;
use crate::sandbox::LanguageRunner;
use crate::store::ResultStore;
use crate::store::run_id;

/// Tunables for one `eval` invocation's fan-out.
pub struct RunnerOptions {
  pub worker_pool_size: usize,
  pub provider_rate_per_sec: u32,
  pub max_cost_usd: Option<f64>,
  pub resume: bool,
}

impl Default for RunnerOptions {
  fn default() -> Self {
    RunnerOptions { worker_pool_size: 4, provider_rate_per_sec: 4, max_cost_usd: None, resume: false }
  }
}

/// Tallies from one `run_batch` invocation, enough for `eval`'s exit-code
/// decision: 0 when every request completed ok, 3 on any partial failure.
#[derive(Debug, Default, Clone)]
pub struct RunnerStats {
  pub total: usize,
  pub completed_ok: usize,
  pub completed_fail: usize,
  pub skipped_resumed: usize,
  pub cost_ceiling_hit: bool,
}

impl RunnerStats {
  pub fn had_partial_failure(&self) -> bool {
    self.completed_fail > 0
  }
}

/// Builds the `(benchmark × language × model × seed)` fan-out set.
/// Iterates `specs` in its own (lexicographic) key order, so the
/// resulting `Vec` order is deterministic independent of how
/// `benchmarks`/`models` filters were supplied on the command line.
pub fn expand_requests(
  specs: &std::collections::BTreeMap<String, BenchmarkSpec>,
  benchmark_filter: &[String],
  model_filter: &[String],
  lang_filter: Option<&[String]>,
  seeds: &[u64],
  attempt_budget: u32,
) -> Vec<RunRequest> {
  let mut requests = Vec::new();

  for (id, spec) in specs {
    if !benchmark_filter.is_empty() && !benchmark_filter.iter().any(|b| b == id) {
      continue;
    }

    for language in &spec.languages {
      if let Some(allowed) = lang_filter {
        if !allowed.iter().any(|l| l == language) {
          continue;
        }
      }

      for model_id in model_filter {
        for &seed in seeds {
          requests.push(RunRequest {
            benchmark_id: id.clone(),
            language: language.clone(),
            model_id: model_id.clone(),
            seed,
            attempt_budget,
            timeout_ms: spec.timeout_ms,
          });
        }
      }
    }
  }

  requests
}

/// Resolves the child CLI invocation for a target language by naming
/// convention (`<language>-cli run`), attaching the configured stdlib
/// path only for the `ailang` host language (from `AILANG_STDLIB_PATH`).
pub fn resolve_language_runner(language: &str, config: &AppConfig) -> LanguageRunner {
  let mut base_args = Vec::new();
  if language == "ailang" {
    if let Some(stdlib) = &config.ailang_stdlib_path {
      base_args.push(format!("--stdlib={}", stdlib.display()));
    }
  }
  base_args.push("run".to_string());

  let extension = extract::aliases_for(language).first().copied().unwrap_or(language);
  LanguageRunner { command: PathBuf::from(format!("{language}-cli")), base_args, source_filename: format!("main.{extension}") }
}

/// A per-provider token bucket: a `Semaphore` whose permits are refilled
/// on a fixed interval by a background task. Standing in for a
/// dedicated rate-limiter crate, which this stack does not carry.
///
/// The refill task tracks permits currently checked out (`outstanding`)
/// alongside the semaphore's own `available_permits()`, because the two
/// together are the bucket's true total capacity; topping up based on
/// `available_permits()` alone would treat permits in active use as
/// missing and keep minting new ones, growing the bucket past `rate`
/// every time an in-flight permit was later returned.
pub(crate) struct RateLimiter {
  semaphore: Arc<Semaphore>,
  outstanding: Arc<AtomicUsize>,
}

impl RateLimiter {
  pub(crate) fn new(rate_per_sec: u32) -> Self {
    let capacity = rate_per_sec.max(1) as usize;
    let semaphore = Arc::new(Semaphore::new(capacity));
    let outstanding = Arc::new(AtomicUsize::new(0));

    let refill_semaphore = semaphore.clone();
    let refill_outstanding = outstanding.clone();
    tokio::spawn(async move {
      let mut interval = tokio::time::interval(Duration::from_secs(1));
      loop {
        interval.tick().await;
        let total = refill_semaphore.available_permits() + refill_outstanding.load(Ordering::SeqCst);
        if total < capacity {
          refill_semaphore.add_permits(capacity - total);
        }
      }
    });

    RateLimiter { semaphore, outstanding }
  }

  pub(crate) async fn acquire(&self) -> RateToken {
    let permit = self.semaphore.clone().acquire_owned().await.expect("rate limiter semaphore is never closed");
    self.outstanding.fetch_add(1, Ordering::SeqCst);
    RateToken { _permit: permit, outstanding: self.outstanding.clone() }
  }
}

/// One checked-out token from a `RateLimiter`. Releases back to the
/// bucket's outstanding count on drop, so holding it only around the
/// single call it rate-limits keeps the bucket's accounting accurate.
pub(crate) struct RateToken {
  _permit: tokio::sync::OwnedSemaphorePermit,
  outstanding: Arc<AtomicUsize>,
}

impl Drop for RateToken {
  fn drop(&mut self) {
    self.outstanding.fetch_sub(1, Ordering::SeqCst);
  }
}

/// A top-level cancel signal, checked at every suspension point: each AI
/// call, rate-limiter wait, and child-process wait. Implemented with a
/// cloned `Arc<AtomicBool>` plus a `Notify` rather than
/// `tokio_util::sync::CancellationToken`, which this stack doesn't
/// depend on.
#[derive(Clone)]
pub struct CancelSignal {
  cancelled: Arc<AtomicBool>,
  notify: Arc<Notify>,
}

impl CancelSignal {
  pub fn new() -> Self {
    CancelSignal { cancelled: Arc::new(AtomicBool::new(false)), notify: Arc::new(Notify::new()) }
  }

  pub fn cancel(&self) {
    self.cancelled.store(true, Ordering::SeqCst);
    self.notify.notify_waiters();
  }

  pub fn is_cancelled(&self) -> bool {
    self.cancelled.load(Ordering::SeqCst)
  }
}

impl Default for CancelSignal {
  fn default() -> Self {
    Self::new()
  }
}

/// Runs every `RunRequest` in `requests` against `specs`, writing
/// completed `RunResult`s to `store` as they finish. Concurrency is
/// bounded by a global `worker_pool_size` semaphore; each request
/// additionally waits on its model's provider-level rate limiter.
pub async fn run_batch(
  ai_client: Arc<AiClient>,
  config: &AppConfig,
  specs: &std::collections::BTreeMap<String, BenchmarkSpec>,
  requests: Vec<RunRequest>,
  hints: &[ModelHint],
  store: &ResultStore,
  options: RunnerOptions,
  cancel: CancelSignal,
) -> Result<RunnerStats, RunnerError> {
  let mut stats = RunnerStats { total: requests.len(), ..Default::default() };

  let worker_pool = Arc::new(Semaphore::new(options.worker_pool_size.max(1)));
  let mut rate_limiters: HashMap<ProviderKind, Arc<RateLimiter>> = HashMap::new();
  for kind in [ProviderKind::Anthropic, ProviderKind::OpenAi, ProviderKind::Google, ProviderKind::Mock] {
    rate_limiters.insert(kind, Arc::new(RateLimiter::new(options.provider_rate_per_sec)));
  }

  let mut cumulative_cost = 0.0f64;
  let mut in_flight = FuturesUnordered::new();

  let mut pending = requests.into_iter();

  loop {
    while in_flight.len() < options.worker_pool_size.max(1) {
      if cancel.is_cancelled() {
        break;
      }
      if let Some(ceiling) = options.max_cost_usd {
        if cumulative_cost >= ceiling {
          stats.cost_ceiling_hit = true;
          break;
        }
      }

      let Some(request) = pending.next() else { break };

      let rid = run_id(&request)?;
      if options.resume && store.contains(&rid) {
        stats.skipped_resumed += 1;
        continue;
      }

      let Some(spec) = specs.get(&request.benchmark_id) else {
        tracing::warn!(benchmark_id = %request.benchmark_id, "no spec for request, skipping");
        continue;
      };

      let kind = provider_kind_for_model(&request.model_id).unwrap_or(ProviderKind::Mock);
      let limiter = rate_limiters.get(&kind).expect("all provider kinds pre-populated").clone();
      let worker_permit = worker_pool.clone();
      let client = ai_client.clone();
      let runner = resolve_language_runner(&request.language, config);
      let spec = spec.clone();
      let hints = hints.to_vec();
      let cancel_task = cancel.clone();

      in_flight.push(tokio::spawn(async move {
        let _worker_permit = worker_permit.acquire_owned().await.expect("worker pool semaphore is never closed");

        if cancel_task.is_cancelled() {
          return (request, None, rid);
        }

        let attempts = repair::run_attempts(&client, &spec, &request, &runner, &hints, limiter.as_ref()).await;
        (request, Some(attempts), rid)
      }));
    }

    if in_flight.is_empty() {
      break;
    }

    match in_flight.next().await {
      Some(Ok((request, Some(attempts), rid))) => {
        let final_ok = attempts.iter().any(|a| a.outcome.is_ok());
        let result = RunResult::new(rid, &request, attempts, crate::logging::now_iso8601());
        cumulative_cost += result.total_cost_usd;
        store.write(&result)?;
        if final_ok {
          stats.completed_ok += 1;
        } else {
          stats.completed_fail += 1;
        }
      }
      Some(Ok((request, None, rid))) => {
        tracing::debug!(benchmark_id = %request.benchmark_id, "request cancelled before execution");
        let attempts = vec![cancelled_attempt()];
        let result = RunResult::new(rid, &request, attempts, crate::logging::now_iso8601());
        store.write(&result)?;
        stats.completed_fail += 1;
      }
      Some(Err(join_err)) => return Err(RunnerError::WorkerTask(join_err)),
      None => break,
    }
  }

  if cancel.is_cancelled() {
    return Err(RunnerError::Cancelled);
  }

  if stats.total > 0 && stats.completed_ok == 0 && stats.completed_fail == 0 && stats.skipped_resumed == 0 {
    return Err(RunnerError::NoRunsCompleted);
  }

  Ok(stats)
}

fn cancelled_attempt() -> AttemptRecord {
  AttemptRecord {
    prompt_bytes: 0,
    response_bytes: 0,
    tokens_input: 0,
    tokens_output: 0,
    tokens_reasoning: None,
    cost_usd: 0.0,
    code_extracted: String::new(),
    exit_code: None,
    stdout: String::new(),
    stderr: "cancelled before execution".to_string(),
    duration_ms: 0,
    outcome: Outcome::ApiError,
  }
}

#[cfg(test)]
mod tests {
  use std::collections::BTreeMap;

  use super::*;
  use crate::client::mock::MockProvider;
  use crate::model::Capability;

  fn spec(id: &str, languages: &[&str]) -> BenchmarkSpec {
    BenchmarkSpec {
      id: id.to_string(),
      description: "d".to_string(),
      difficulty: 1,
      languages: languages.iter().map(|l| l.to_string()).collect(),
      prompt_template: "Write a <LANG> program that prints 3.".to_string(),
      entrypoint: "main".to_string(),
      capabilities: std::collections::BTreeSet::<Capability>::new(),
      expected_stdout: "3".to_string(),
      timeout_ms: 5000,
    }
  }

  #[test]
  fn expand_requests_is_deterministic_and_filters() {
    let mut specs = BTreeMap::new();
    specs.insert("b_add".to_string(), spec("b_add", &["lang1", "lang2"]));
    specs.insert("b_sub".to_string(), spec("b_sub", &["lang1"]));

    let requests = expand_requests(&specs, &[], &["mock-default".to_string()], None, &[0, 1], 3);

    assert_eq!(requests.len(), 6);
    assert_eq!(requests[0].benchmark_id, "b_add");
    assert_eq!(requests[0].language, "lang1");
  }

  #[test]
  fn expand_requests_honors_benchmark_filter() {
    let mut specs = BTreeMap::new();
    specs.insert("b_add".to_string(), spec("b_add", &["lang1"]));
    specs.insert("b_sub".to_string(), spec("b_sub", &["lang1"]));

    let requests = expand_requests(&specs, &["b_sub".to_string()], &["mock-default".to_string()], None, &[0], 3);

    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].benchmark_id, "b_sub");
  }

  #[tokio::test]
  async fn run_batch_completes_and_writes_results() {
    let mut specs = BTreeMap::new();
    let s = spec("b_add", &["lang1"]);
    specs.insert("b_add".to_string(), s.clone());

    let hints: Vec<ModelHint> = Vec::new();
    let p = crate::prompt::build_prompt(&s, "lang1", &hints);
    let mut mock = MockProvider::new();
    mock.register(&p.system, &p.user, "```lang1\nprint(3)\n```");
    let config = AppConfig::default();
    let client = Arc::new(AiClient::new(&config, mock));

    let requests = expand_requests(&specs, &[], &["mock-default".to_string()], None, &[0], 3);

    let dir = tempfile::tempdir().unwrap();
    let store = ResultStore::open(dir.path()).unwrap();

    let stats = run_batch(client, &config, &specs, requests, &hints, &store, RunnerOptions::default(), CancelSignal::new())
      .await
      .unwrap();

    assert_eq!(stats.total, 1);
    assert_eq!(stats.completed_ok + stats.completed_fail, 1);
    assert_eq!(store.load_all().unwrap().len(), 1);
  }
}
