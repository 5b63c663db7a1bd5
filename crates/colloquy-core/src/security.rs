//! Security risk classification and confirmation policies.
//!
//! Every proposed action carries a coarse ordinal risk. A confirmation
//! policy decides whether a batch of proposed actions must pause for user
//! approval before execution.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{Error, Result};
use crate::event::ActionEvent;

/// Coarse ordinal risk attached to an action.
///
/// `Low < Medium < High` form a total order; `Unknown` sits outside it and
/// is handled explicitly by policies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SecurityRisk {
    /// No analyzer produced a classification.
    Unknown,
    /// Safe, read-only, or trivially reversible.
    Low,
    /// Mutating but recoverable.
    Medium,
    /// Destructive or security-sensitive.
    High,
}

impl SecurityRisk {
    /// Position in the `Low < Medium < High` order; `None` for `Unknown`.
    fn rank(self) -> Option<u8> {
        match self {
            Self::Unknown => None,
            Self::Low => Some(0),
            Self::Medium => Some(1),
            Self::High => Some(2),
        }
    }

    /// Returns true if this risk is at or above the threshold.
    ///
    /// `Unknown` on either side is never at-or-above anything; policies
    /// decide what to do with unknown risks separately.
    #[must_use]
    pub fn at_or_above(self, threshold: Self) -> bool {
        match (self.rank(), threshold.rank()) {
            (Some(own), Some(other)) => own >= other,
            _ => false,
        }
    }
}

/// Rule deciding whether a risky action must pause for approval.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConfirmationPolicy {
    /// Every non-terminal action requires confirmation.
    AlwaysConfirm,
    /// No action ever requires confirmation.
    NeverConfirm,
    /// Confirm actions at or above a risk threshold.
    ConfirmRisky {
        /// Minimum risk that triggers confirmation; never `Unknown`.
        threshold: SecurityRisk,
        /// Whether actions with `Unknown` risk require confirmation.
        confirm_unknown: bool,
    },
}

impl ConfirmationPolicy {
    /// Builds a `ConfirmRisky` policy, validating the threshold.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidPolicy`] if `threshold` is
    /// [`SecurityRisk::Unknown`].
    pub fn confirm_risky(threshold: SecurityRisk, confirm_unknown: bool) -> Result<Self> {
        if threshold == SecurityRisk::Unknown {
            return Err(Error::InvalidPolicy(
                "ConfirmRisky threshold may not be Unknown".to_owned(),
            ));
        }
        Ok(Self::ConfirmRisky {
            threshold,
            confirm_unknown,
        })
    }

    /// Decides whether a single action at the given risk needs confirmation.
    ///
    /// A `finish` action never requires confirmation under any variant.
    #[must_use]
    pub fn should_confirm(&self, risk: SecurityRisk, action: &ActionEvent) -> bool {
        if action.is_finish() {
            return false;
        }
        match *self {
            Self::AlwaysConfirm => true,
            Self::NeverConfirm => false,
            Self::ConfirmRisky {
                threshold,
                confirm_unknown,
            } => {
                if risk == SecurityRisk::Unknown {
                    confirm_unknown
                } else {
                    risk.at_or_above(threshold)
                }
            }
        }
    }
}

impl Default for ConfirmationPolicy {
    fn default() -> Self {
        Self::NeverConfirm
    }
}

/// Optional capability that assigns risks to proposed actions.
pub trait SecurityAnalyzer: Send + Sync {
    /// Classifies each action; the result is index-aligned with the input.
    fn analyze_pending_actions(&self, actions: &[&ActionEvent]) -> Vec<SecurityRisk>;
}

/// Classifies a batch of actions, defaulting to `Unknown` without an
/// analyzer. The result is index-aligned with the input.
#[must_use]
pub fn assess_actions(
    analyzer: Option<&dyn SecurityAnalyzer>,
    actions: &[&ActionEvent],
) -> Vec<SecurityRisk> {
    analyzer.map_or_else(
        || vec![SecurityRisk::Unknown; actions.len()],
        |analyzer| analyzer.analyze_pending_actions(actions),
    )
}

/// Decides whether a classified batch of actions must pause for
/// confirmation.
///
/// An empty batch and a batch whose only member is the terminal `finish`
/// action never confirm. Otherwise the whole batch pauses if the policy
/// requires confirmation for any member's risk.
#[must_use]
pub fn batch_requires_confirmation(
    policy: &ConfirmationPolicy,
    batch: &[(&ActionEvent, SecurityRisk)],
) -> bool {
    if batch.is_empty() {
        return false;
    }
    if batch.len() == 1 && batch[0].0.is_finish() {
        return false;
    }

    let confirm = batch
        .iter()
        .any(|(action, risk)| policy.should_confirm(*risk, action));
    debug!(actions = batch.len(), confirm, "evaluated confirmation gate");
    confirm
}

#[cfg(test)]
mod tests {
    use super::*;
    use colloquy_tooling::FINISH_TOOL_NAME;
    use serde_json::json;

    fn action(tool_name: &str) -> ActionEvent {
        ActionEvent {
            tool_name: tool_name.to_owned(),
            arguments: json!({}),
            risk: SecurityRisk::Unknown,
            call_id: "call".to_owned(),
        }
    }

    struct FixedAnalyzer(SecurityRisk);

    impl SecurityAnalyzer for FixedAnalyzer {
        fn analyze_pending_actions(&self, actions: &[&ActionEvent]) -> Vec<SecurityRisk> {
            vec![self.0; actions.len()]
        }
    }

    #[test]
    fn test_risk_ordering() {
        assert!(SecurityRisk::High.at_or_above(SecurityRisk::Medium));
        assert!(SecurityRisk::Medium.at_or_above(SecurityRisk::Medium));
        assert!(!SecurityRisk::Low.at_or_above(SecurityRisk::Medium));
        assert!(!SecurityRisk::Unknown.at_or_above(SecurityRisk::Low));
        assert!(!SecurityRisk::High.at_or_above(SecurityRisk::Unknown));
    }

    #[test]
    fn test_confirm_risky_rejects_unknown_threshold() {
        let policy = ConfirmationPolicy::confirm_risky(SecurityRisk::Unknown, true);
        assert!(matches!(policy, Err(Error::InvalidPolicy(_))));
    }

    #[test]
    fn test_always_confirm_exempts_finish() {
        let policy = ConfirmationPolicy::AlwaysConfirm;
        assert!(policy.should_confirm(SecurityRisk::High, &action("execute_bash")));
        assert!(!policy.should_confirm(SecurityRisk::High, &action(FINISH_TOOL_NAME)));
    }

    #[test]
    fn test_never_confirm() {
        let policy = ConfirmationPolicy::NeverConfirm;
        assert!(!policy.should_confirm(SecurityRisk::High, &action("execute_bash")));
    }

    #[test]
    fn test_confirm_risky_threshold_and_unknown() {
        let policy = ConfirmationPolicy::confirm_risky(SecurityRisk::Medium, false);
        assert!(policy.is_ok());
        if let Ok(policy) = policy {
            assert!(!policy.should_confirm(SecurityRisk::Low, &action("tool")));
            assert!(policy.should_confirm(SecurityRisk::Medium, &action("tool")));
            assert!(policy.should_confirm(SecurityRisk::High, &action("tool")));
            assert!(!policy.should_confirm(SecurityRisk::Unknown, &action("tool")));
        }

        let cautious = ConfirmationPolicy::confirm_risky(SecurityRisk::High, true);
        assert!(cautious.is_ok());
        if let Ok(cautious) = cautious {
            assert!(cautious.should_confirm(SecurityRisk::Unknown, &action("tool")));
            assert!(!cautious.should_confirm(SecurityRisk::Medium, &action("tool")));
        }
    }

    #[test]
    fn test_batch_empty_and_finish_only_never_confirm() {
        let policy = ConfirmationPolicy::AlwaysConfirm;
        assert!(!batch_requires_confirmation(&policy, &[]));

        let finish = action(FINISH_TOOL_NAME);
        assert!(!batch_requires_confirmation(
            &policy,
            &[(&finish, SecurityRisk::Unknown)]
        ));
    }

    #[test]
    fn test_batch_any_member_gates_all() {
        let policy = ConfirmationPolicy::confirm_risky(SecurityRisk::High, false);
        assert!(policy.is_ok());
        if let Ok(policy) = policy {
            let first = action("read_file");
            let second = action("execute_bash");
            let batch = [
                (&first, SecurityRisk::Low),
                (&second, SecurityRisk::High),
            ];
            assert!(batch_requires_confirmation(&policy, &batch));
        }
    }

    #[test]
    fn test_assess_without_analyzer_defaults_to_unknown() {
        let first = action("read_file");
        let second = action("execute_bash");
        let risks = assess_actions(None, &[&first, &second]);
        assert_eq!(risks, vec![SecurityRisk::Unknown, SecurityRisk::Unknown]);

        let analyzer = FixedAnalyzer(SecurityRisk::High);
        let risks = assess_actions(Some(&analyzer), &[&first, &second]);
        assert_eq!(risks, vec![SecurityRisk::High, SecurityRisk::High]);
    }

    #[test]
    fn test_unknown_risk_batch_follows_confirm_unknown() {
        let cautious = ConfirmationPolicy::confirm_risky(SecurityRisk::Low, true);
        assert!(cautious.is_ok());
        if let Ok(cautious) = cautious {
            let risky = action("execute_bash");
            assert!(batch_requires_confirmation(
                &cautious,
                &[(&risky, SecurityRisk::Unknown)]
            ));
        }

        let lenient = ConfirmationPolicy::confirm_risky(SecurityRisk::Low, false);
        assert!(lenient.is_ok());
        if let Ok(lenient) = lenient {
            let risky = action("execute_bash");
            assert!(!batch_requires_confirmation(
                &lenient,
                &[(&risky, SecurityRisk::Unknown)]
            ));
        }
    }
}
