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

use clap::Parser;
use clap::Subcommand;
use clap::ValueEnum;

#[derive(Debug, Parser)]
#[command(name = "evalh", version, about = "AI-Evaluation Harness: benchmark LLM code generation across target languages")]
pub struct Cli {
  #[command(subcommand)]
  pub command: Commands,

  /// Path to an optional `evalharness.json` configuration file.
  #[arg(long, global = true, default_value = "evalharness.json")]
  pub config: PathBuf,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
  /// Run benchmarks for one or more (model, language, seed) triples.
  Eval(EvalArgs),

  /// Run the validator on a single benchmark.
  #[command(name = "eval-validate")]
  EvalValidate(EvalValidateArgs),

  /// Emit a Comparison between a baseline and a candidate result directory.
  #[command(name = "eval-compare")]
  EvalCompare(EvalCompareArgs),

  /// Build and print a Matrix for a result directory.
  #[command(name = "eval-matrix")]
  EvalMatrix(EvalMatrixArgs),

  /// Emit a Reporter view for a result directory.
  #[command(name = "eval-report")]
  EvalReport(EvalReportArgs),

  /// Stream the JSONL summary for a result directory.
  #[command(name = "eval-summary")]
  EvalSummary(EvalSummaryArgs),
}

#[derive(Debug, Parser)]
pub struct EvalArgs {
  /// Directory of benchmark TOML definitions.
  #[arg(long, default_value = "benchmarks")]
  pub benchmarks_dir: PathBuf,

  /// Restrict to a single benchmark id. May be repeated.
  #[arg(long = "benchmark")]
  pub benchmarks: Vec<String>,

  /// Restrict to a single model id. May be repeated.
  #[arg(long = "model")]
  pub models: Vec<String>,

  /// Restrict to one seed. Defaults to a single run with seed 0.
  #[arg(long)]
  pub seed: Option<u64>,

  /// Comma-separated language tags to restrict the run to.
  #[arg(long)]
  pub langs: Option<String>,

  /// Use the deterministic Mock AIClient instead of a real provider.
  #[arg(long)]
  pub mock: bool,

  /// Worker pool size. Overrides the configured default.
  #[arg(long)]
  pub parallel: Option<usize>,

  /// Output directory for run artifacts.
  #[arg(long, default_value = "results")]
  pub output: PathBuf,

  /// Maximum attempts per run (zero-shot + repairs). Overrides the
  /// configured default.
  #[arg(long)]
  pub attempts: Option<u32>,

  /// Skip RunRequests whose run_id already has an artifact in --output.
  #[arg(long)]
  pub resume: bool,

  /// Print the resolved RunRequest fan-out set without executing anything.
  #[arg(long)]
  pub dry_run: bool,

  /// Stop scheduling new RunRequests once cumulative cost would exceed
  /// this ceiling. Already in-flight requests finish.
  #[arg(long)]
  pub max_cost_usd: Option<f64>,
}

#[derive(Debug, Parser)]
pub struct EvalValidateArgs {
  pub benchmark: String,

  /// Optional baseline version tag; defaults to the most recent baseline.
  pub version: Option<String>,

  #[arg(long, default_value = "benchmarks")]
  pub benchmarks_dir: PathBuf,

  #[arg(long, default_value = "results")]
  pub baseline_dir: PathBuf,

  #[arg(long)]
  pub mock: bool,
}

#[derive(Debug, Parser)]
pub struct EvalCompareArgs {
  pub baseline_dir: PathBuf,
  pub new_dir: PathBuf,
}

#[derive(Debug, Parser)]
pub struct EvalMatrixArgs {
  pub dir: PathBuf,
  pub version: String,
}

#[derive(Debug, Parser)]
pub struct EvalReportArgs {
  pub dir: PathBuf,
  pub version: String,

  #[arg(long, value_enum, default_value = "md")]
  pub format: ReportFormat,
}

#[derive(Debug, Parser)]
pub struct EvalSummaryArgs {
  pub dir: PathBuf,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
#[value(rename_all = "lowercase")]
pub enum ReportFormat {
  Md,
  Html,
  Csv,
  Jsonl,
}
