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

//! Static per-model price tables. The client computes cost, never the
//! orchestrator.

use std::collections::HashMap;

use once_cell::sync::Lazy;

/// Dollars per million tokens, by token class.
#[derive(Debug, Clone, Copy)]
pub struct Pricing {
  pub in_per_mtok: f64,
  pub out_per_mtok: f64,
  /// Reasoning-token rate, when the provider bills it separately. When
  /// absent, reasoning tokens bill at `out_per_mtok` (see DESIGN.md).
  pub reasoning_per_mtok: Option<f64>,
}

static TABLE: Lazy<HashMap<&'static str, Pricing>> = Lazy::new(|| {
  let mut m = HashMap::new();
  m.insert(
    "claude-opus-4",
    Pricing { in_per_mtok: 15.0, out_per_mtok: 75.0, reasoning_per_mtok: None },
  );
  m.insert(
    "claude-sonnet-4",
    Pricing { in_per_mtok: 3.0, out_per_mtok: 15.0, reasoning_per_mtok: None },
  );
  m.insert(
    "claude-haiku-4",
    Pricing { in_per_mtok: 0.8, out_per_mtok: 4.0, reasoning_per_mtok: None },
  );
  m.insert(
    "gpt-4o",
    Pricing { in_per_mtok: 2.5, out_per_mtok: 10.0, reasoning_per_mtok: None },
  );
  m.insert(
    "o1",
    Pricing { in_per_mtok: 15.0, out_per_mtok: 60.0, reasoning_per_mtok: Some(60.0) },
  );
  m.insert(
    "gemini-1.5-pro",
    Pricing { in_per_mtok: 1.25, out_per_mtok: 5.0, reasoning_per_mtok: None },
  );
  m.insert(
    "gemini-1.5-flash",
    Pricing { in_per_mtok: 0.075, out_per_mtok: 0.3, reasoning_per_mtok: None },
  );
  m.insert(
    "mock",
    Pricing { in_per_mtok: 0.0, out_per_mtok: 0.0, reasoning_per_mtok: Some(0.0) },
  );
  m
});

/// Looks up the price table entry for `model_id`. `model_id`s are matched
/// by exact key or by longest registered prefix (so e.g.
/// `claude-sonnet-4-20250514` resolves against `claude-sonnet-4`).
pub fn pricing_for(model_id: &str) -> Option<Pricing> {
  if let Some(p) = TABLE.get(model_id) {
    return Some(*p);
  }
  TABLE
    .iter()
    .filter(|(prefix, _)| model_id.starts_with(**prefix))
    .max_by_key(|(prefix, _)| prefix.len())
    .map(|(_, p)| *p)
}

/// Computes the dollar cost of one attempt's token usage.
pub fn cost_usd(model_id: &str, tokens_in: u64, tokens_out: u64, tokens_reasoning: Option<u64>) -> f64 {
  let Some(pricing) = pricing_for(model_id) else {
    return 0.0;
  };

  let mut total = (tokens_in as f64 / 1_000_000.0) * pricing.in_per_mtok
    + (tokens_out as f64 / 1_000_000.0) * pricing.out_per_mtok;

  if let Some(reasoning) = tokens_reasoning {
    let rate = pricing.reasoning_per_mtok.unwrap_or(pricing.out_per_mtok);
    total += (reasoning as f64 / 1_000_000.0) * rate;
  }

  total
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn resolves_exact_and_prefixed_model_ids() {
    assert!(pricing_for("claude-sonnet-4").is_some());
    assert!(pricing_for("claude-sonnet-4-20250514").is_some());
    assert!(pricing_for("totally-unknown-model").is_none());
  }

  #[test]
  fn unknown_model_costs_zero() {
    assert_eq!(cost_usd("totally-unknown-model", 1000, 1000, None), 0.0);
  }

  #[test]
  fn reasoning_tokens_bill_at_distinct_rate_when_present() {
    let with_reasoning = cost_usd("o1", 1000, 1000, Some(1000));
    let without = cost_usd("o1", 1000, 1000, None);
    assert!(with_reasoning > without);
  }

  #[test]
  fn reasoning_tokens_fall_back_to_output_rate_when_unspecified() {
    let a = cost_usd("claude-sonnet-4", 0, 0, Some(1_000_000));
    let pricing = pricing_for("claude-sonnet-4").unwrap();
    assert!((a - pricing.out_per_mtok).abs() < 1e-9);
  }
}
