//! Running cost and token tally.

use agent_watch_core::{CostDisplay, TokenInfo};
use tracing::warn;

/// USD total and token usage of the joined session.
///
/// Live updates are adopted in arrival order. There is no sequence number
/// on the wire, so a reordered delivery can make the total go down; that is
/// logged, not corrected.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct CostAccumulator {
    total_usd: f64,
    tokens: TokenInfo,
}

impl CostAccumulator {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adopt the snapshot total without animation. Used once per join.
    pub fn set(&mut self, total_usd: f64) -> CostDisplay {
        self.total_usd = total_usd;
        CostDisplay {
            total_usd,
            previous_usd: None,
            animate: false,
        }
    }

    /// Adopt a live total, animating from the previous value.
    pub fn update(&mut self, total_usd: f64) -> CostDisplay {
        let previous = self.total_usd;
        if total_usd < previous {
            warn!(previous, total_usd, "cost total decreased, applying in arrival order");
        }
        self.total_usd = total_usd;
        CostDisplay {
            total_usd,
            previous_usd: Some(previous),
            animate: (total_usd - previous).abs() > f64::EPSILON,
        }
    }

    /// Token counters are display only and always set directly.
    pub const fn set_tokens(&mut self, current: u64, max: u64) -> TokenInfo {
        self.tokens = TokenInfo { current, max };
        self.tokens
    }

    #[must_use]
    pub const fn total_usd(&self) -> f64 {
        self.total_usd
    }

    #[must_use]
    pub const fn tokens(&self) -> TokenInfo {
        self.tokens
    }
}
