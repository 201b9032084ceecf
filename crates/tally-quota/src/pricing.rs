// SPDX-FileCopyrightText: 2026 Tally Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Per-model prices for usage cost estimates.
//!
//! gpt-4.1: input=$2.00/MTok, output=$8.00/MTok
//! gpt-5:   input=$1.25/MTok, output=$10.00/MTok
//! other:   input=$1.00/MTok, output=$3.00/MTok

/// Per-model pricing in USD per million tokens.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ModelPricing {
    pub input_per_mtok: f64,
    pub output_per_mtok: f64,
}

const DEFAULT_PRICING: ModelPricing = ModelPricing {
    input_per_mtok: 1.00,
    output_per_mtok: 3.00,
};

/// Exact-name lookup; anything unlisted uses the default rate.
pub fn get_pricing(model: &str) -> ModelPricing {
    match model.trim().to_ascii_lowercase().as_str() {
        "gpt-4.1" => ModelPricing {
            input_per_mtok: 2.00,
            output_per_mtok: 8.00,
        },
        "gpt-5" => ModelPricing {
            input_per_mtok: 1.25,
            output_per_mtok: 10.00,
        },
        _ => DEFAULT_PRICING,
    }
}

/// Cost in USD, rounded to six decimals. Negative counts are treated as zero.
pub fn calculate_cost(input_tokens: i64, output_tokens: i64, pricing: &ModelPricing) -> f64 {
    let input = (input_tokens.max(0) as f64 / 1_000_000.0) * pricing.input_per_mtok;
    let output = (output_tokens.max(0) as f64 / 1_000_000.0) * pricing.output_per_mtok;
    ((input + output) * 1_000_000.0).round() / 1_000_000.0
}
