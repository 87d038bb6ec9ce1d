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

//! Maps a completed sandbox execution onto the outcome taxonomy (C6).
//! Pure: no IO, no process knowledge beyond the `{exit, stdout, stderr}`
//! triple handed to it.

use std::collections::HashMap;

use once_cell::sync::Lazy;

use crate::model::Outcome;

/// Stderr substrings that indicate a compile-phase failure, by language
/// tag. Supplied statically rather than inferred, since the classifier
/// has no knowledge of language internals.
static COMPILE_ERROR_MARKERS: Lazy<HashMap<&'static str, Vec<&'static str>>> = Lazy::new(|| {
  let mut m = HashMap::new();
  m.insert("rust", vec!["error[E", "error: expected", "cannot find"]);
  m.insert("lang1", vec!["SyntaxError", "TypeError: cannot"]);
  m.insert("lang2", vec!["parse error", "compile error"]);
  m
});

/// The inputs the classifier needs to produce an `Outcome`. Plain data,
/// no borrow back into `AttemptRecord`, so `Repair` and `Classifier`
/// never need to know about each other's types.
pub struct ClassifyInput<'a> {
  pub exit_code: Option<i32>,
  pub stdout: &'a str,
  pub stderr: &'a str,
  pub expected_stdout: &'a str,
  pub language: &'a str,
}

/// Strips trailing whitespace per line and drops trailing empty lines,
/// keeping interior blank lines.
pub fn normalize_stdout(text: &str) -> String {
  let mut lines: Vec<&str> = text.lines().map(|l| l.trim_end()).collect();
  while lines.last().is_some_and(|l| l.is_empty()) {
    lines.pop();
  }
  lines.join("\n")
}

pub fn classify(input: &ClassifyInput) -> Outcome {
  let Some(exit_code) = input.exit_code else {
    // A process killed by signal (no exit code) is treated the same as
    // a non-zero exit for classification purposes.
    return classify_nonzero_exit(input);
  };

  if exit_code != 0 {
    return classify_nonzero_exit(input);
  }

  if !input.expected_stdout.is_empty() {
    let normalized_actual = normalize_stdout(input.stdout);
    let normalized_expected = normalize_stdout(input.expected_stdout);
    if normalized_actual != normalized_expected {
      return Outcome::LogicError;
    }
  }

  Outcome::Ok
}

fn classify_nonzero_exit(input: &ClassifyInput) -> Outcome {
  let markers = COMPILE_ERROR_MARKERS.get(input.language).map(Vec::as_slice).unwrap_or(&[]);
  if markers.iter().any(|marker| input.stderr.contains(marker)) {
    Outcome::CompileError
  } else {
    Outcome::RuntimeError
  }
}
