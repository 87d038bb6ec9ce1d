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
use std::io::Write;
use std::sync::Arc;

use anyhow::Context;
use anyhow::Result;
use clap::Parser;
use evalharness::analyzer;
use evalharness::benchspec;
use evalharness::cli::Cli;
use evalharness::cli::Commands;
use evalharness::cli::EvalArgs;
use evalharness::cli::EvalCompareArgs;
use evalharness::cli::EvalMatrixArgs;
use evalharness::cli::EvalReportArgs;
use evalharness::cli::EvalSummaryArgs;
use evalharness::cli::EvalValidateArgs;
use evalharness::client::AiClient;
use evalharness::client::mock::MockProvider;
use evalharness::config::AppConfig;
use evalharness::config::parse_langs_filter;
use evalharness::config::resolve_eval_defaults;
use evalharness::logging::setup_tracing;
use evalharness::report;
use evalharness::runner;
use evalharness::runner::CancelSignal;
use evalharness::runner::RunnerOptions;
use evalharness::store::ResultStore;
use evalharness::validator;

const EXIT_OK: i32 = 0;
const EXIT_VALIDATION_FAILED: i32 = 1;
const EXIT_BAD_FLAGS: i32 = 2;
const EXIT_PARTIAL_FAILURE: i32 = 3;
const EXIT_REGRESSIONS_PRESENT: i32 = 4;

#[tokio::main]
async fn main() -> Result<()> {
  let _guard = setup_tracing()?;

  let cli = Cli::parse();
  let config = AppConfig::load(Some(&cli.config))?;
  let main_span = tracing::info_span!("orchestrator");
  let _enter = main_span.enter();

  let exit_code = match cli.command {
    Commands::Eval(args) => run_eval(&config, args).await?,
    Commands::EvalValidate(args) => run_eval_validate(&config, args).await?,
    Commands::EvalCompare(args) => run_eval_compare(args)?,
    Commands::EvalMatrix(args) => run_eval_matrix(args)?,
    Commands::EvalReport(args) => run_eval_report(args)?,
    Commands::EvalSummary(args) => run_eval_summary(args)?,
  };

  std::process::exit(exit_code);
}

fn build_ai_client(config: &AppConfig) -> AiClient {
  AiClient::new(config, MockProvider::new())
}

async fn run_eval(config: &AppConfig, args: EvalArgs) -> Result<i32> {
  let specs = benchspec::load_benchmarks(&args.benchmarks_dir).context("loading benchmark definitions")?;

  let lang_filter = match parse_langs_filter(&args.langs) {
    Ok(filter) => filter,
    Err(err) => {
      eprintln!("invalid --langs: {err}");
      return Ok(EXIT_BAD_FLAGS);
    }
  };

  if args.models.is_empty() {
    eprintln!("at least one --model is required");
    return Ok(EXIT_BAD_FLAGS);
  }

  let (worker_pool_size, attempt_budget) = resolve_eval_defaults(&args, config);
  let seeds = vec![args.seed.unwrap_or(0)];

  // `--mock` forces dispatch to the deterministic MockProvider by giving
  // every requested model id the `mock-` prefix `provider_kind_for_model`
  // keys off, rather than threading a separate "mock mode" flag through
  // the Runner/AiClient.
  let models: Vec<String> = args
    .models
    .iter()
    .map(|m| if args.mock && !m.starts_with("mock") { format!("mock-{m}") } else { m.clone() })
    .collect();

  let requests = runner::expand_requests(&specs, &args.benchmarks, &models, lang_filter.as_deref(), &seeds, attempt_budget);

  if args.dry_run {
    let stdout = std::io::stdout();
    let mut handle = stdout.lock();
    for request in &requests {
      writeln!(handle, "{}", serde_json::to_string(request)?)?;
    }
    return Ok(EXIT_OK);
  }

  let ai_client = Arc::new(build_ai_client(config));
  let store = ResultStore::open(&args.output)?;
  let options = RunnerOptions { worker_pool_size, provider_rate_per_sec: 4, max_cost_usd: args.max_cost_usd, resume: args.resume };

  let stats = runner::run_batch(ai_client, config, &specs, requests, &[], &store, options, CancelSignal::new()).await?;

  tracing::info!(
    total = stats.total,
    completed_ok = stats.completed_ok,
    completed_fail = stats.completed_fail,
    skipped_resumed = stats.skipped_resumed,
    cost_ceiling_hit = stats.cost_ceiling_hit,
    "eval run complete"
  );

  Ok(if stats.had_partial_failure() { EXIT_PARTIAL_FAILURE } else { EXIT_OK })
}

async fn run_eval_validate(config: &AppConfig, args: EvalValidateArgs) -> Result<i32> {
  let specs = benchspec::load_benchmarks(&args.benchmarks_dir).context("loading benchmark definitions")?;
  let Some(spec) = specs.get(&args.benchmark) else {
    eprintln!("unknown benchmark '{}'", args.benchmark);
    return Ok(EXIT_BAD_FLAGS);
  };

  let ai_client = Arc::new(build_ai_client(config));
  let report =
    validator::validate(ai_client, config, spec, &args.baseline_dir, &args.benchmark, args.version.as_deref(), args.mock, &[]).await?;

  println!(
    "{} {} -> {:?} (baseline {}, candidate {})",
    args.benchmark, spec.description, report.state, report.baseline_run_id, report.candidate.run_id
  );

  Ok(match report.state {
    validator::ValidationState::Validated | validator::ValidationState::Improved => EXIT_OK,
    validator::ValidationState::StillFailing | validator::ValidationState::NewlyBroken => EXIT_VALIDATION_FAILED,
  })
}

fn run_eval_compare(args: EvalCompareArgs) -> Result<i32> {
  let comparison = analyzer::compare(&args.baseline_dir, &args.new_dir)?;
  println!("{}", serde_json::to_string_pretty(&comparison)?);
  Ok(if comparison.broken.is_empty() { EXIT_OK } else { EXIT_REGRESSIONS_PRESENT })
}

fn run_eval_matrix(args: EvalMatrixArgs) -> Result<i32> {
  let matrix = analyzer::load_matrix(&args.dir)?;
  let store = ResultStore::open(&args.dir)?;
  store.write_matrix_snapshot(&matrix, &args.version)?;

  let stdout = std::io::stdout();
  let mut handle = stdout.lock();
  report::emit(&matrix, evalharness::cli::ReportFormat::Md, &mut handle)?;

  Ok(EXIT_OK)
}

fn run_eval_report(args: EvalReportArgs) -> Result<i32> {
  let matrix = analyzer::load_matrix(&args.dir)?;
  tracing::info!(version = %args.version, dir = %args.dir.display(), "emitting report");
  let stdout = std::io::stdout();
  let mut handle = stdout.lock();
  report::emit(&matrix, args.format, &mut handle)?;
  Ok(EXIT_OK)
}

fn run_eval_summary(args: EvalSummaryArgs) -> Result<i32> {
  let summary_path = args.dir.join("summary.jsonl");
  let contents = std::fs::read_to_string(&summary_path).with_context(|| format!("reading {}", summary_path.display()))?;
  print!("{contents}");
  Ok(EXIT_OK)
}
