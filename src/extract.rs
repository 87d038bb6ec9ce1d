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

//! Extracts the first fenced code block matching the target language
//! from a model response (C4).

/// Known fence-tag aliases for a target language, beyond its own tag.
/// E.g. `rust` accepts a fence tagged `rs`. Supplied by the caller
/// rather than hardcoded, since the harness is language-independent and
/// not limited to a fixed set of target languages.
pub fn aliases_for(language: &str) -> Vec<&'static str> {
  match language {
    "rust" => vec!["rs"],
    "javascript" => vec!["js"],
    "typescript" => vec!["ts"],
    "python" => vec!["py"],
    _ => vec![],
  }
}

struct FencedBlock {
  tag: Option<String>,
  body: String,
}

/// Splits `response` into fenced (triple-backtick) blocks, in order of
/// appearance, and whatever's outside of them (discarded).
fn find_fenced_blocks(response: &str) -> Vec<FencedBlock> {
  let mut blocks = Vec::new();
  let mut lines = response.lines().peekable();

  while let Some(line) = lines.next() {
    let trimmed = line.trim_start();
    if let Some(rest) = trimmed.strip_prefix("```") {
      let tag = rest.trim();
      let tag = if tag.is_empty() { None } else { Some(tag.to_string()) };

      let mut body_lines = Vec::new();
      for inner in lines.by_ref() {
        if inner.trim_start().starts_with("```") {
          break;
        }
        body_lines.push(inner);
      }
      blocks.push(FencedBlock { tag, body: body_lines.join("\n") });
    }
  }

  blocks
}

/// Normalizes trailing whitespace and CRLF -> LF.
fn normalize(code: &str) -> String {
  code.replace("\r\n", "\n").trim_end().to_string()
}

/// Selects code from a model `response` for `language`, following this
/// priority order:
/// 1. first block tagged with the exact target language;
/// 2. else first block tagged with a known alias;
/// 3. else first untagged block;
/// 4. else the entire response (trimmed) if it contains no fences.
///
/// Returns an empty string (outcome `parse_fail`, assigned by the
/// caller) when none of the above yields content.
pub fn extract_code(response: &str, language: &str) -> String {
  let blocks = find_fenced_blocks(response);
  let aliases = aliases_for(language);

  if let Some(block) = blocks.iter().find(|b| b.tag.as_deref() == Some(language)) {
    return normalize(&block.body);
  }

  if let Some(block) = blocks.iter().find(|b| b.tag.as_deref().map(|t| aliases.contains(&t)).unwrap_or(false)) {
    return normalize(&block.body);
  }

  if let Some(block) = blocks.iter().find(|b| b.tag.is_none()) {
    return normalize(&block.body);
  }

  if blocks.is_empty() {
    return normalize(response);
  }

  String::new()
}
