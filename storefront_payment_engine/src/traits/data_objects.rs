use crate::db_types::{Order, PaymentTransaction};

/// The result of a guarded terminal transition.
///
/// Every terminal transition (confirm, reject, expire) is a conditional update that only succeeds while the
/// transaction is still pending. Exactly one racing actor gets `Transitioned`; everyone else observes the state the
/// winner left behind. Losing the race is not an error, so both arms carry the post-state.
#[derive(Debug, Clone)]
pub enum TransitionOutcome {
    /// This caller won the race and applied the transition.
    Transitioned(PaymentTransaction),
    /// Another actor got there first (or the transaction had already lapsed). The carried transaction is the
    /// current terminal state.
    AlreadyTerminal(PaymentTransaction),
}

impl TransitionOutcome {
    pub fn transaction(&self) -> &PaymentTransaction {
        match self {
            TransitionOutcome::Transitioned(tx) | TransitionOutcome::AlreadyTerminal(tx) => tx,
        }
    }

    pub fn into_transaction(self) -> PaymentTransaction {
        match self {
            TransitionOutcome::Transitioned(tx) | TransitionOutcome::AlreadyTerminal(tx) => tx,
        }
    }

    pub fn was_applied(&self) -> bool {
        matches!(self, TransitionOutcome::Transitioned(_))
    }
}

/// Outcome of a settlement attempt: the transaction transition plus the linked order as it stands afterwards.
#[derive(Debug, Clone)]
pub struct SettleOutcome {
    pub transition: TransitionOutcome,
    pub order: Order,
}
