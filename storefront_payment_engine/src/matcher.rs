//! The reconciliation matcher.
//!
//! External gateways do not echo back a structured transaction id the store controls. All we receive is an amount
//! and a free-text memo that the payer's bank may truncate, reorder or strip punctuation from. The matcher therefore
//! runs a hard amount gate followed by an ordered list of textual containment rules, most specific first.
//!
//! The matcher is a pure function over a snapshot of pending transactions. It never mutates anything; the caller
//! decides what to do with the outcome.
use log::debug;
use spg_common::Vnd;

use crate::{
    db_types::{InboundNotification, PaymentTransaction},
    helpers::{numeric_suffix, trailing_suffix},
};

/// The containment rules, in decreasing order of specificity. A match found by an earlier rule always beats any
/// match a later rule would have found.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchRule {
    /// The exact verification token appears in the memo.
    Token,
    /// The full order code appears in the memo.
    OrderCode,
    /// The digits of the order code (non-numeric prefix stripped) appear in the memo.
    NumericSuffix,
    /// The trailing fragment of the order code appears in the memo.
    TrailingSuffix,
}

impl MatchRule {
    pub const ALL: [MatchRule; 4] = [MatchRule::Token, MatchRule::OrderCode, MatchRule::NumericSuffix, MatchRule::TrailingSuffix];

    fn applies(&self, tx: &PaymentTransaction, memo: &str) -> bool {
        let code = tx.order_code.as_str().to_uppercase();
        match self {
            MatchRule::Token => memo.contains(&tx.token),
            MatchRule::OrderCode => memo.contains(&code),
            MatchRule::NumericSuffix => numeric_suffix(&code).is_some_and(|digits| memo.contains(digits)),
            MatchRule::TrailingSuffix => trailing_suffix(&code).is_some_and(|suffix| memo.contains(suffix)),
        }
    }
}

impl std::fmt::Display for MatchRule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MatchRule::Token => write!(f, "verification token"),
            MatchRule::OrderCode => write!(f, "order code"),
            MatchRule::NumericSuffix => write!(f, "numeric suffix"),
            MatchRule::TrailingSuffix => write!(f, "trailing suffix"),
        }
    }
}

#[derive(Debug, Clone)]
pub enum MatchOutcome {
    /// Exactly one pending transaction satisfied the most specific rule that matched anything.
    Match { transaction: PaymentTransaction, rule: MatchRule },
    /// Two or more transactions satisfied the same rule level. Guessing between them would risk settling the wrong
    /// order, so this is escalated for manual review.
    Ambiguous { rule: MatchRule, candidates: Vec<PaymentTransaction> },
    /// No amount-matching transaction had any textual anchor in the memo. Amount-only matches are never accepted:
    /// two customers paying the same total is an expected collision.
    NoMatch,
}

/// Matches a normalized notification against the given pending, unexpired transactions.
///
/// `tolerance` absorbs currency-subunit rounding by some gateways; candidates whose amount differs by `tolerance`
/// or more are rejected outright.
pub fn match_candidates(
    pending: &[PaymentTransaction],
    notification: &InboundNotification,
    tolerance: Vnd,
) -> MatchOutcome {
    let memo = notification.memo.to_uppercase();
    let in_tolerance: Vec<&PaymentTransaction> =
        pending.iter().filter(|tx| tx.amount.abs_diff(notification.amount) < tolerance).collect();
    debug!(
        "🔍️ {} of {} pending transactions match amount {} within {tolerance}",
        in_tolerance.len(),
        pending.len(),
        notification.amount
    );
    if in_tolerance.is_empty() {
        return MatchOutcome::NoMatch;
    }
    for rule in MatchRule::ALL {
        let mut hits = in_tolerance.iter().filter(|tx| rule.applies(tx, &memo));
        let Some(first) = hits.next() else {
            continue;
        };
        let rest: Vec<PaymentTransaction> = hits.map(|tx| (*tx).clone()).collect();
        if rest.is_empty() {
            debug!("🔍️ Transaction {} matched via {rule}", first.id);
            return MatchOutcome::Match { transaction: (*first).clone(), rule };
        }
        let mut candidates = vec![(*first).clone()];
        candidates.extend(rest);
        debug!("🔍️ {} transactions matched at the same level ({rule}). Escalating.", candidates.len());
        return MatchOutcome::Ambiguous { rule, candidates };
    }
    MatchOutcome::NoMatch
}
