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

//! Combines a `BenchmarkSpec`, a target language, and optional
//! model-family hints into the prompt sent to an `AiProvider` (C2).
//!
//! Pure: no clock reads, no process-local state. Identical inputs always
//! produce byte-identical output, which is what lets `eval --mock` runs
//! reproduce the same `run_id` set across machines.

use crate::model::BenchmarkSpec;

/// A short syntax reminder for a language that models are less familiar
/// with. Supplied by the caller (e.g. from a static table keyed by
/// `model_id` prefix); `PromptBuilder` itself carries no opinion about
/// which models need which hints.
#[derive(Debug, Clone)]
pub struct ModelHint {
  pub language: String,
  pub reminder: String,
}

const LANG_PLACEHOLDER: &str = "<LANG>";

/// The built system + user prompt pair for one `(BenchmarkSpec, language)`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Prompt {
  pub system: String,
  pub user: String,
}

/// Builds the prompt for a zero-shot attempt.
pub fn build_prompt(spec: &BenchmarkSpec, language: &str, hints: &[ModelHint]) -> Prompt {
  let mut user = spec.prompt_template.replace(LANG_PLACEHOLDER, language);

  for hint in hints.iter().filter(|h| h.language == language) {
    user.push_str("\n\n");
    user.push_str(&hint.reminder);
  }

  let system = format!(
    "You are generating a single {language} program. Respond with exactly one fenced code block \
     tagged `{language}` containing a complete, self-contained program whose entrypoint is `{entrypoint}`. \
     Do not include explanation outside the code block.",
    entrypoint = spec.entrypoint,
  );

  Prompt { system, user }
}

/// One prior attempt, reduced to the fields the repair prompt needs.
/// Kept as a plain value (not a reference back into `AttemptRecord`) so
/// `PromptBuilder` and the Classifier never need to know about each
/// other's types.
#[derive(Debug, Clone)]
pub struct AttemptHistoryEntry {
  pub code: String,
  pub stderr_tail: String,
  pub outcome_description: String,
}

/// Builds a repair prompt: the original prompt, the most recent
/// generated code, and its failure, plus a revision instruction.
pub fn build_repair_prompt(
  spec: &BenchmarkSpec,
  language: &str,
  hints: &[ModelHint],
  history: &[AttemptHistoryEntry],
) -> Prompt {
  let zero_shot = build_prompt(spec, language, hints);
  let Some(last) = history.last() else {
    return zero_shot;
  };

  let mut user = String::new();
  user.push_str(&zero_shot.user);
  user.push_str("\n\n---\n\nYour previous attempt did not pass. Here is what you wrote:\n\n```");
  user.push_str(language);
  user.push('\n');
  user.push_str(&last.code);
  user.push_str("\n```\n\nIt failed with: ");
  user.push_str(&last.outcome_description);
  if !last.stderr_tail.is_empty() {
    user.push_str("\n\nstderr:\n");
    user.push_str(&last.stderr_tail);
  }
  user.push_str("\n\nRevise the program to fix this and respond with the complete corrected program in a single fenced code block.");

  Prompt { system: zero_shot.system, user }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn spec() -> BenchmarkSpec {
    BenchmarkSpec {
      id: "b_add".to_string(),
      description: "Add two numbers".to_string(),
      difficulty: 1,
      languages: ["lang1".to_string()].into_iter().collect(),
      prompt_template: "Write a <LANG> program that prints 3.".to_string(),
      entrypoint: "main".to_string(),
      capabilities: Default::default(),
      expected_stdout: "3".to_string(),
      timeout_ms: 30_000,
    }
  }

  #[test]
  fn identical_inputs_produce_identical_prompts() {
    let s = spec();
    let p1 = build_prompt(&s, "lang1", &[]);
    let p2 = build_prompt(&s, "lang1", &[]);
    assert_eq!(p1, p2);
  }

  #[test]
  fn substitutes_lang_placeholder() {
    let s = spec();
    let p = build_prompt(&s, "lang1", &[]);
    assert!(p.user.contains("Write a lang1 program"));
    assert!(!p.user.contains(LANG_PLACEHOLDER));
  }

  #[test]
  fn applies_only_matching_hints() {
    let s = spec();
    let hints = vec![
      ModelHint { language: "lang1".to_string(), reminder: "Remember semicolons.".to_string() },
      ModelHint { language: "lang2".to_string(), reminder: "Remember indentation.".to_string() },
    ];
    let p = build_prompt(&s, "lang1", &hints);
    assert!(p.user.contains("Remember semicolons."));
    assert!(!p.user.contains("Remember indentation."));
  }

  #[test]
  fn repair_prompt_includes_prior_failure() {
    let s = spec();
    let history = vec![AttemptHistoryEntry {
      code: "print(2)".to_string(),
      stderr_tail: String::new(),
      outcome_description: "logic_error".to_string(),
    }];
    let p = build_repair_prompt(&s, "lang1", &[], &history);
    assert!(p.user.contains("print(2)"));
    assert!(p.user.contains("logic_error"));
  }

  #[test]
  fn repair_prompt_with_no_history_equals_zero_shot() {
    let s = spec();
    let p1 = build_prompt(&s, "lang1", &[]);
    let p2 = build_repair_prompt(&s, "lang1", &[], &[]);
    assert_eq!(p1, p2);
  }
}
