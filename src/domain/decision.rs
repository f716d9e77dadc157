//! Decision outcomes.

use std::fmt;

/// Why a decision came out the way it did.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DecisionReason {
    /// No request to fingerprint; ads are shown
    NoRequest,
    /// An administrator forced ads on
    OverrideShow,
    /// An administrator forced ads off
    OverrideBlock,
    /// The viewer's block flag is still set
    AlreadyBlocked,
    /// This view pushed the viewer over the threshold
    ThresholdExceeded,
    /// The viewer is within the threshold
    WithinThreshold,
}

impl DecisionReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            DecisionReason::NoRequest => "no_request",
            DecisionReason::OverrideShow => "override_show",
            DecisionReason::OverrideBlock => "override_block",
            DecisionReason::AlreadyBlocked => "already_blocked",
            DecisionReason::ThresholdExceeded => "threshold_exceeded",
            DecisionReason::WithinThreshold => "within_threshold",
        }
    }

    /// Whether ads are shown for this reason.
    pub fn shows_ads(&self) -> bool {
        matches!(
            self,
            DecisionReason::NoRequest
                | DecisionReason::OverrideShow
                | DecisionReason::WithinThreshold
        )
    }
}

impl fmt::Display for DecisionReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Whether to show ads, and why.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AdsDecision {
    pub show: bool,
    pub reason: DecisionReason,
}

impl From<DecisionReason> for AdsDecision {
    fn from(reason: DecisionReason) -> Self {
        Self {
            show: reason.shows_ads(),
            reason,
        }
    }
}
