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

use figment::Figment;
use figment::providers::Env;
use figment::providers::Format;
use figment::providers::Json;
use figment::providers::Serialized;
use serde::Deserialize;
use serde::Serialize;

use crate::cli::EvalArgs;
use crate::error::ConfigError;

/// Process-wide defaults and provider credentials, layered (lowest to
/// highest precedence) from: built-in defaults, an optional
/// `evalharness.json` file, `EVALHARNESS_*` environment variables, and
/// finally the parsed CLI flags.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
  #[serde(default = "default_parallel")]
  pub default_parallel: usize,
  #[serde(default = "default_attempts")]
  pub default_attempts: u32,
  #[serde(default)]
  pub anthropic_api_key: Option<String>,
  #[serde(default)]
  pub openai_api_key: Option<String>,
  #[serde(default)]
  pub google_api_key: Option<String>,
  #[serde(default)]
  pub ailang_stdlib_path: Option<PathBuf>,
}

fn default_parallel() -> usize {
  4
}

fn default_attempts() -> u32 {
  3
}

impl Default for AppConfig {
  fn default() -> Self {
    AppConfig {
      default_parallel: default_parallel(),
      default_attempts: default_attempts(),
      anthropic_api_key: None,
      openai_api_key: None,
      google_api_key: None,
      ailang_stdlib_path: None,
    }
  }
}

impl AppConfig {
  /// Loads the layered configuration. `config_path` is optional and is
  /// skipped silently if it does not exist.
  pub fn load(config_path: Option<&PathBuf>) -> Result<Self, ConfigError> {
    let mut figment = Figment::from(Serialized::defaults(AppConfig::default()));

    if let Some(path) = config_path {
      if path.exists() {
        figment = figment.merge(Json::file(path));
      } else {
        tracing::debug!(path = %path.display(), "config file not found, skipping");
      }
    }

    figment = figment.merge(Env::prefixed("EVALHARNESS_").split("__"));

    let config: AppConfig = figment.extract()?;
    Ok(config)
  }
}

/// Parses `--langs=l1,l2` into an ordered, deduplicated language filter.
/// Returns `None` when the flag is absent (meaning: all of a benchmark's
/// declared languages).
pub fn parse_langs_filter(raw: &Option<String>) -> Result<Option<Vec<String>>, ConfigError> {
  let Some(raw) = raw else {
    return Ok(None);
  };
  let langs: Vec<String> = raw
    .split(',')
    .map(|s| s.trim())
    .filter(|s| !s.is_empty())
    .map(|s| s.to_string())
    .collect();

  if langs.is_empty() {
    return Err(ConfigError::InvalidLangsFilter(raw.clone()));
  }

  Ok(Some(langs))
}

/// Resolves the effective worker-pool size and per-run attempt budget for
/// an `eval` invocation: CLI flag overrides the layered `AppConfig`
/// default.
pub fn resolve_eval_defaults(args: &EvalArgs, config: &AppConfig) -> (usize, u32) {
  let parallel = args.parallel.unwrap_or(config.default_parallel);
  let attempts = args.attempts.unwrap_or(config.default_attempts);
  (parallel, attempts)
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn parse_langs_filter_splits_and_trims() {
    let parsed = parse_langs_filter(&Some("lang1, lang2 ,lang3".to_string())).unwrap();
    assert_eq!(parsed, Some(vec!["lang1".to_string(), "lang2".to_string(), "lang3".to_string()]));
  }

  #[test]
  fn parse_langs_filter_none_when_absent() {
    assert_eq!(parse_langs_filter(&None).unwrap(), None);
  }

  #[test]
  fn parse_langs_filter_rejects_empty() {
    assert!(parse_langs_filter(&Some("".to_string())).is_err());
  }

  #[test]
  fn default_config_has_sane_defaults() {
    let config = AppConfig::default();
    assert_eq!(config.default_parallel, 4);
    assert_eq!(config.default_attempts, 3);
  }
}
