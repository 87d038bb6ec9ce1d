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

//! Emits a `Matrix` as Markdown, HTML, CSV, or JSONL, sorted
//! deterministically and rounded to a fixed precision (C12): rates to 3
//! decimal places, cost to 6. Markdown and HTML render the per-model
//! leaderboard (one row per model, sorted by final_ok rate descending);
//! CSV and JSONL render the full per-`(model, language, benchmark)` grid.

use std::io::Write;

use crate::cli::ReportFormat;
use crate::error::ReportError;
use crate::model::Matrix;

const TRIPLE_HEADER: [&str; 8] = ["model", "language", "benchmark", "runs", "zero_shot_rate", "final_rate", "avg_tokens", "avg_cost"];
const LEADERBOARD_HEADER: [&str; 5] = ["model", "runs", "zero_shot_rate", "final_rate", "avg_tokens"];

/// Writes `matrix` to `out` in `format`.
pub fn emit(matrix: &Matrix, format: ReportFormat, out: &mut impl Write) -> Result<(), ReportError> {
  match format {
    ReportFormat::Md => emit_markdown(matrix, out),
    ReportFormat::Html => emit_html(matrix, out),
    ReportFormat::Csv => emit_csv(matrix, out),
    ReportFormat::Jsonl => emit_jsonl(matrix, out),
  }
}

/// One row per model, rolled up across every language and benchmark,
/// sorted by final_ok rate descending.
fn emit_markdown(matrix: &Matrix, out: &mut impl Write) -> Result<(), ReportError> {
  let mut tw = tabwriter::TabWriter::new(out);

  writeln!(tw, "{}", LEADERBOARD_HEADER.join("\t")).map_err(ReportError::Write)?;
  for (model, summary) in matrix.leaderboard() {
    writeln!(
      tw,
      "{model}\t{}\t{}\t{}\t{:.0}",
      summary.runs,
      format_rate(summary.zero_shot_rate),
      format_rate(summary.final_rate),
      summary.avg_tokens,
    )
    .map_err(ReportError::Write)?;
  }

  tw.flush().map_err(ReportError::Write)
}

fn emit_html(matrix: &Matrix, out: &mut impl Write) -> Result<(), ReportError> {
  writeln!(out, "<table>").map_err(ReportError::Write)?;
  writeln!(out, "<tr>{}</tr>", LEADERBOARD_HEADER.iter().map(|h| format!("<th>{h}</th>")).collect::<String>())
    .map_err(ReportError::Write)?;

  for (model, summary) in matrix.leaderboard() {
    writeln!(
      out,
      "<tr><td>{model}</td><td>{}</td><td>{}</td><td>{}</td><td>{:.0}</td></tr>",
      summary.runs,
      format_rate(summary.zero_shot_rate),
      format_rate(summary.final_rate),
      summary.avg_tokens,
    )
    .map_err(ReportError::Write)?;
  }

  writeln!(out, "</table>").map_err(ReportError::Write)
}

fn emit_csv(matrix: &Matrix, out: &mut impl Write) -> Result<(), ReportError> {
  let mut writer = csv::Writer::from_writer(out);
  writer.write_record(TRIPLE_HEADER)?;

  for (model, language, benchmark, summary) in matrix.rows() {
    writer.write_record([
      model,
      language,
      benchmark,
      &summary.runs.to_string(),
      &format_rate(summary.zero_shot_rate),
      &format_rate(summary.final_rate),
      &format!("{:.0}", summary.avg_tokens),
      &format_cost(summary.avg_cost),
    ])?;
  }

  writer.flush().map_err(ReportError::Write)
}

fn emit_jsonl(matrix: &Matrix, out: &mut impl Write) -> Result<(), ReportError> {
  for (model, language, benchmark, summary) in matrix.rows() {
    let row = serde_json::json!({
      "model": model,
      "language": language,
      "benchmark": benchmark,
      "runs": summary.runs,
      "zero_shot_rate": round_to(summary.zero_shot_rate, 3),
      "final_rate": round_to(summary.final_rate, 3),
      "avg_tokens": summary.avg_tokens,
      "avg_cost": round_to(summary.avg_cost, 6),
    });
    let line = serde_json::to_string(&row)?;
    writeln!(out, "{line}").map_err(ReportError::Write)?;
  }
  Ok(())
}

fn format_rate(rate: f64) -> String {
  format!("{:.3}", rate)
}

fn format_cost(cost: f64) -> String {
  format!("{:.6}", cost)
}

fn round_to(value: f64, decimals: u32) -> f64 {
  let factor = 10f64.powi(decimals as i32);
  (value * factor).round() / factor
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::model::RunRequest;
  use crate::model::RunResult;

  fn matrix_with_one_cell() -> Matrix {
    let request = RunRequest {
      benchmark_id: "b_add".to_string(),
      language: "lang1".to_string(),
      model_id: "mock-default".to_string(),
      seed: 0,
      attempt_budget: 1,
      timeout_ms: 1000,
    };
    let mut result = RunResult::new("id".to_string(), &request, Vec::new(), "t".to_string());
    result.final_ok = true;
    result.zero_shot_ok = true;
    result.total_tokens = 150;
    result.total_cost_usd = 0.0012345;
    Matrix::build(&[result])
  }

  #[test]
  fn csv_output_has_header_and_one_row() {
    let matrix = matrix_with_one_cell();
    let mut buf = Vec::new();
    emit(&matrix, ReportFormat::Csv, &mut buf).unwrap();
    let text = String::from_utf8(buf).unwrap();
    let mut lines = text.lines();
    assert_eq!(lines.next().unwrap(), "model,language,benchmark,runs,zero_shot_rate,final_rate,avg_tokens,avg_cost");
    assert!(lines.next().unwrap().contains("mock-default"));
  }

  #[test]
  fn jsonl_rounds_rate_and_cost_to_fixed_precision() {
    let matrix = matrix_with_one_cell();
    let mut buf = Vec::new();
    emit(&matrix, ReportFormat::Jsonl, &mut buf).unwrap();
    let text = String::from_utf8(buf).unwrap();
    let row: serde_json::Value = serde_json::from_str(text.lines().next().unwrap()).unwrap();
    assert_eq!(row["final_rate"], 1.0);
    assert_eq!(row["avg_cost"], 0.001235);
  }

  #[test]
  fn markdown_output_is_nonempty_and_contains_model() {
    let matrix = matrix_with_one_cell();
    let mut buf = Vec::new();
    emit(&matrix, ReportFormat::Md, &mut buf).unwrap();
    let text = String::from_utf8(buf).unwrap();
    assert!(text.contains("mock-default"));
  }

  fn result_for(model_id: &str, final_ok: bool) -> RunResult {
    let request = RunRequest {
      benchmark_id: "b_add".to_string(),
      language: "lang1".to_string(),
      model_id: model_id.to_string(),
      seed: 0,
      attempt_budget: 1,
      timeout_ms: 1000,
    };
    let mut result = RunResult::new("id".to_string(), &request, Vec::new(), "t".to_string());
    result.final_ok = final_ok;
    result.zero_shot_ok = final_ok;
    result
  }

  #[test]
  fn markdown_leaderboard_is_one_row_per_model_sorted_by_final_rate_desc() {
    let results = vec![result_for("weak-model", false), result_for("strong-model", true)];
    let matrix = Matrix::build(&results);

    let mut buf = Vec::new();
    emit(&matrix, ReportFormat::Md, &mut buf).unwrap();
    let text = String::from_utf8(buf).unwrap();

    let strong_pos = text.find("strong-model").unwrap();
    let weak_pos = text.find("weak-model").unwrap();
    assert!(strong_pos < weak_pos, "higher final_rate model should lead the leaderboard");

    // header + one row per model, not per (model, language, benchmark) triple.
    assert_eq!(text.lines().count(), 3);
  }
}
