//! Token usage tracking.

use serde::{Deserialize, Serialize};

/// Token usage reported by the model backend.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq, Eq)]
pub struct Usage {
    pub requests: u32,
    pub input_tokens: u32,
    pub output_tokens: u32,
    pub total_tokens: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reasoning_tokens: Option<u32>,
}

impl Usage {
    /// Merge another usage into this one (accumulate).
    pub fn merge(&mut self, other: &Usage) {
        self.requests += other.requests;
        self.input_tokens += other.input_tokens;
        self.output_tokens += other.output_tokens;
        self.total_tokens += other.total_tokens;
        if let Some(v) = other.reasoning_tokens {
            *self.reasoning_tokens.get_or_insert(0) += v;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn merge_accumulates_and_keeps_optional_counts() {
        let mut total = Usage::default();
        total.merge(&Usage {
            requests: 1,
            input_tokens: 10,
            output_tokens: 5,
            total_tokens: 15,
            reasoning_tokens: None,
        });
        total.merge(&Usage {
            requests: 1,
            input_tokens: 3,
            output_tokens: 2,
            total_tokens: 5,
            reasoning_tokens: Some(7),
        });

        assert_eq!(total.requests, 2);
        assert_eq!(total.total_tokens, 20);
        assert_eq!(total.reasoning_tokens, Some(7));
    }
}
