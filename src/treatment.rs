//! Treatment evaluation
//!
//! A keyword scan of the doctor's prescription against the condition's
//! accepted and rejected lists. Accepted keywords win over rejected ones;
//! a message matching neither is treated as a rejection.

use crate::catalog::ConditionEntry;

/// Outcome of evaluating one prescription
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    Accepted,
    Rejected,
    NoMatch,
    UnknownCondition,
}

impl Verdict {
    pub fn is_accepted(self) -> bool {
        matches!(self, Verdict::Accepted)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Verdict::Accepted => "accepted",
            Verdict::Rejected => "rejected",
            Verdict::NoMatch => "no_match",
            Verdict::UnknownCondition => "unknown_condition",
        }
    }
}

/// Evaluate a prescription. Pure in (entry, message).
pub fn evaluate(entry: Option<&ConditionEntry>, message: &str) -> Verdict {
    let Some(entry) = entry else {
        return Verdict::UnknownCondition;
    };
    let lowered = message.to_lowercase();
    let mentions = |keywords: &[String]| keywords.iter().any(|kw| lowered.contains(kw.as_str()));

    if mentions(&entry.accepted_keywords) {
        Verdict::Accepted
    } else if mentions(&entry.rejected_keywords) {
        Verdict::Rejected
    } else {
        Verdict::NoMatch
    }
}
