//! Token usage and cost tracking.

use serde::{Deserialize, Serialize};

/// Token usage for a generation.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct Usage {
    pub input_tokens: u32,
    pub output_tokens: u32,
    pub total_tokens: u32,
}

impl Usage {
    pub fn new(input_tokens: u32, output_tokens: u32) -> Self {
        Self {
            input_tokens,
            output_tokens,
            total_tokens: input_tokens + output_tokens,
        }
    }

    /// Accumulate another usage into this one (tool-loop rounds).
    pub fn merge(&mut self, other: &Usage) {
        self.input_tokens += other.input_tokens;
        self.output_tokens += other.output_tokens;
        self.total_tokens += other.total_tokens;
    }
}

/// Estimated cost for a generation.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct Cost {
    pub input_cost: f64,
    pub output_cost: f64,
    pub total_cost: f64,
}

impl Cost {
    /// Compute cost from usage and per-million-token pricing.
    pub fn from_usage(usage: &Usage, input_price_per_m: f64, output_price_per_m: f64) -> Self {
        let input_cost = (usage.input_tokens as f64 / 1_000_000.0) * input_price_per_m;
        let output_cost = (usage.output_tokens as f64 / 1_000_000.0) * output_price_per_m;
        Self {
            input_cost,
            output_cost,
            total_cost: input_cost + output_cost,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn merge_accumulates_rounds() {
        let mut total = Usage::new(100, 20);
        total.merge(&Usage::new(50, 30));
        assert_eq!(total.input_tokens, 150);
        assert_eq!(total.output_tokens, 50);
        assert_eq!(total.total_tokens, 200);
    }

    #[test]
    fn cost_scales_per_million() {
        let cost = Cost::from_usage(&Usage::new(1_000_000, 500_000), 3.0, 15.0);
        assert!((cost.input_cost - 3.0).abs() < 1e-9);
        assert!((cost.output_cost - 7.5).abs() < 1e-9);
        assert!((cost.total_cost - 10.5).abs() < 1e-9);
    }
}
