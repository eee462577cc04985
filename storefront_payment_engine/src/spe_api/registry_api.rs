//! The payment transaction registry.
//!
//! Owns the lifecycle of QR payment attempts: creation, status, reconciliation and expiry. Durable state lives in
//! the backend; a write-through in-memory index keyed by transaction id and order code serves the checkout UI's
//! polling without touching the store. The index is derived state only -- it is rebuilt from the store at startup,
//! so a restart neither loses pending transactions nor un-expires them.
use std::{fmt::Debug, sync::Arc};

use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use log::*;
use serde::{Deserialize, Serialize};
use spg_common::Vnd;

use crate::{
    db_types::{InboundNotification, NewPaymentTransaction, Order, OrderId, PaymentRail, PaymentTransaction, TxStatus},
    events::{EventProducers, OrderPaidEvent, TransactionEvent, TransactionEventKind, TransactionPublisher},
    helpers::{extract_order_codes, new_transaction_id, new_verification_token, render_transfer_memo},
    matcher::{match_candidates, MatchOutcome, MatchRule},
    traits::{CheckoutDatabase, CheckoutDbError, SettleOutcome, TransitionOutcome},
};

/// Actor names recorded in `confirmed_by` for the non-human settlement paths.
pub const WEBHOOK_ACTOR: &str = "BANK_WEBHOOK_AUTO";
pub const CUSTOMER_ACTOR: &str = "CUSTOMER";

/// What a status poll reports. `Expired` is reported as soon as the TTL lapses, even if the sweeper has not
/// transitioned the row yet, so read-time and sweep-time always agree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StatusReport {
    NotFound,
    Pending,
    Confirmed,
    Rejected,
    Expired,
}

impl From<TxStatus> for StatusReport {
    fn from(status: TxStatus) -> Self {
        match status {
            TxStatus::Pending => Self::Pending,
            TxStatus::Confirmed => Self::Confirmed,
            TxStatus::Rejected => Self::Rejected,
            TxStatus::Expired => Self::Expired,
        }
    }
}

/// The result of feeding one normalized webhook notification through the matcher.
#[derive(Debug, Clone)]
pub enum ReconciliationOutcome {
    /// The notification settled (or found already settled) the matched transaction and its order.
    Settled { transaction: PaymentTransaction, order: Order, rule: MatchRule },
    /// No candidate passed the containment rules. Recorded for manual review.
    Unmatched,
    /// Two or more candidates tied at the same rule level. Recorded for manual review rather than guessed at.
    Ambiguous { candidates: usize },
}

pub struct PaymentRegistry<B> {
    db: B,
    producers: EventProducers,
    publisher: TransactionPublisher,
    pending: Arc<DashMap<String, PaymentTransaction>>,
    by_order: Arc<DashMap<String, String>>,
    ttl: Duration,
    amount_tolerance: Vnd,
}

impl<B> Debug for PaymentRegistry<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "PaymentRegistry ({} pending in index)", self.pending.len())
    }
}

impl<B: Clone> Clone for PaymentRegistry<B> {
    fn clone(&self) -> Self {
        Self {
            db: self.db.clone(),
            producers: self.producers.clone(),
            publisher: self.publisher.clone(),
            pending: Arc::clone(&self.pending),
            by_order: Arc::clone(&self.by_order),
            ttl: self.ttl,
            amount_tolerance: self.amount_tolerance,
        }
    }
}

impl<B> PaymentRegistry<B> {
    pub fn new(
        db: B,
        ttl: Duration,
        amount_tolerance: Vnd,
        producers: EventProducers,
        publisher: TransactionPublisher,
    ) -> Self {
        Self {
            db,
            producers,
            publisher,
            pending: Arc::new(DashMap::new()),
            by_order: Arc::new(DashMap::new()),
            ttl,
            amount_tolerance,
        }
    }

    pub fn publisher(&self) -> &TransactionPublisher {
        &self.publisher
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    fn index_insert(&self, tx: &PaymentTransaction) {
        self.by_order.insert(tx.order_code.as_str().to_string(), tx.id.clone());
        self.pending.insert(tx.id.clone(), tx.clone());
    }

    fn index_remove(&self, tx_id: &str) {
        if let Some((_, tx)) = self.pending.remove(tx_id) {
            self.by_order.remove(tx.order_code.as_str());
        }
    }
}

impl<B> PaymentRegistry<B>
where B: CheckoutDatabase
{
    /// Reloads the pending index from durable storage. Called once at startup, before the first request and before
    /// the sweeper starts.
    pub async fn rebuild_index(&self) -> Result<usize, CheckoutDbError> {
        self.pending.clear();
        self.by_order.clear();
        let pending = self.db.fetch_pending_transactions().await?;
        for tx in &pending {
            self.index_insert(tx);
        }
        info!("🏦️ Pending transaction index rebuilt: {} entry(ies)", pending.len());
        Ok(pending.len())
    }

    /// Creates a pending payment transaction for the given order and rail.
    ///
    /// The amount is frozen from the order's current total, the verification token and transfer memo are minted
    /// here, and expiry is a fixed TTL from now. At most one pending transaction may exist per order; a lapsed one
    /// is swept first so a fresh attempt is not blocked by a stale row.
    pub async fn create_pending(
        &self,
        order_code: &OrderId,
        rail: PaymentRail,
    ) -> Result<PaymentTransaction, CheckoutDbError> {
        let order = self
            .db
            .fetch_order_by_code(order_code)
            .await?
            .ok_or_else(|| CheckoutDbError::OrderNotFound(order_code.clone()))?;
        if !order.is_payable() {
            let reason = if order.paid { "already paid".to_string() } else { format!("status is {}", order.status) };
            return Err(CheckoutDbError::OrderNotPayable(order_code.clone(), reason));
        }
        let now = Utc::now();
        self.expire_due(now).await?;
        let token = new_verification_token();
        let new_tx = NewPaymentTransaction {
            id: new_transaction_id(rail, order_code, now),
            order_code: order_code.clone(),
            rail,
            amount: order.total,
            memo: render_transfer_memo(order_code, &token),
            token,
            expires_at: now + self.ttl,
        };
        let tx = self.db.insert_pending_transaction(new_tx).await?;
        self.index_insert(&tx);
        info!("🏦️ Transaction {} created for order [{}]: {} due by {}", tx.id, tx.order_code, tx.amount, tx.expires_at);
        Ok(tx)
    }

    /// The status of a transaction as observed right now. Hot path for UI polling: answered from the in-memory
    /// index when possible, falling back to the store for anything the index no longer holds.
    pub async fn status(&self, tx_id: &str) -> Result<StatusReport, CheckoutDbError> {
        let now = Utc::now();
        if let Some(entry) = self.pending.get(tx_id) {
            return Ok(entry.effective_status(now).into());
        }
        match self.db.fetch_transaction(tx_id).await? {
            None => Ok(StatusReport::NotFound),
            Some(tx) => Ok(tx.effective_status(now).into()),
        }
    }

    /// Confirms a pending, unexpired transaction and settles its order, atomically.
    ///
    /// Safe to call twice: the loser of a confirm/confirm or confirm/expire race observes the terminal state the
    /// winner left and treats it as a no-op success. Listeners are only notified by the actor that actually applied
    /// the transition.
    pub async fn confirm(&self, tx_id: &str, confirmed_by: &str) -> Result<SettleOutcome, CheckoutDbError> {
        self.confirm_with_ref(tx_id, confirmed_by, None).await
    }

    async fn confirm_with_ref(
        &self,
        tx_id: &str,
        confirmed_by: &str,
        gateway_ref: Option<&str>,
    ) -> Result<SettleOutcome, CheckoutDbError> {
        let outcome = self.db.settle_transaction(tx_id, confirmed_by, gateway_ref).await?;
        self.index_remove(tx_id);
        if let TransitionOutcome::Transitioned(tx) = &outcome.transition {
            info!("🏦️ Transaction {tx_id} confirmed by {confirmed_by}; order [{}] settled", tx.order_code);
            self.publish_closed(tx, TransactionEventKind::Confirmed).await;
            for producer in &self.producers.order_paid_producer {
                producer.publish_event(OrderPaidEvent::new(outcome.order.clone())).await;
            }
        } else {
            debug!("🏦️ Confirm of {tx_id} by {confirmed_by} was a no-op; already terminal");
        }
        Ok(outcome)
    }

    /// Rejects a pending transaction. The order is untouched and can accept a fresh payment attempt.
    pub async fn reject(
        &self,
        tx_id: &str,
        reason: &str,
        rejected_by: &str,
    ) -> Result<TransitionOutcome, CheckoutDbError> {
        let outcome = self.db.reject_transaction(tx_id, reason, rejected_by).await?;
        self.index_remove(tx_id);
        if let TransitionOutcome::Transitioned(tx) = &outcome {
            info!("🏦️ Transaction {tx_id} rejected by {rejected_by}: {reason}");
            self.publish_closed(tx, TransactionEventKind::Rejected).await;
        }
        Ok(outcome)
    }

    /// Customer abandoning the QR screen. Maps to a rejection attributed to the customer.
    pub async fn cancel_pending(&self, tx_id: &str) -> Result<TransitionOutcome, CheckoutDbError> {
        self.reject(tx_id, "Cancelled by customer", CUSTOMER_ACTOR).await
    }

    /// Transitions every lapsed pending transaction to `Expired` and notifies its listeners. The sweeper calls this
    /// on a short interval; other paths may call it opportunistically. Racing sweeps are harmless since only the
    /// rows actually transitioned by this call are returned.
    pub async fn expire_due(&self, now: DateTime<Utc>) -> Result<Vec<PaymentTransaction>, CheckoutDbError> {
        let expired = self.db.expire_transactions(now).await?;
        for tx in &expired {
            self.index_remove(&tx.id);
            debug!("🏦️ Transaction {} expired; order [{}] is still awaiting payment", tx.id, tx.order_code);
            self.publish_closed(tx, TransactionEventKind::Expired).await;
        }
        Ok(expired)
    }

    /// Drops a cancelled order's transaction from the index and tells its listeners. The durable rejection happens
    /// inside the order-cancellation transaction; this keeps the cache and subscribers in step with it.
    pub async fn evict_order(&self, order_code: &OrderId) {
        if let Some((_, tx_id)) = self.by_order.remove(order_code.as_str()) {
            if let Some((_, tx)) = self.pending.remove(&tx_id) {
                self.publish_closed(&tx, TransactionEventKind::Rejected).await;
            }
        }
    }

    /// Runs one normalized webhook notification through the reconciliation matcher.
    ///
    /// On a clean single match the transaction is confirmed through the same guarded path the admin override uses,
    /// with the gateway's reference stored for traceability. Anything else is durably recorded for manual review --
    /// a notification is never silently dropped and never settled on amount alone.
    pub async fn match_notification(
        &self,
        notification: &InboundNotification,
    ) -> Result<ReconciliationOutcome, CheckoutDbError> {
        let now = Utc::now();
        let candidates = self.db.fetch_pending_unexpired(now).await?;
        match match_candidates(&candidates, notification, self.amount_tolerance) {
            MatchOutcome::Match { transaction, rule } => {
                let outcome =
                    self.confirm_with_ref(&transaction.id, WEBHOOK_ACTOR, Some(&notification.external_ref)).await?;
                let settled = outcome.transition.into_transaction();
                if settled.status == TxStatus::Confirmed {
                    info!("🏦️ Notification {} settled transaction {} via {rule}", notification.external_ref, settled.id);
                    Ok(ReconciliationOutcome::Settled { transaction: settled, order: outcome.order, rule })
                } else {
                    // The candidate lapsed between the scan and the conditional update. The money is real, so this
                    // still goes to the review queue.
                    let reason = format!("Matched transaction {} but it is already {}", settled.id, settled.status);
                    self.db.record_unmatched_notification(notification, &reason).await?;
                    Ok(ReconciliationOutcome::Unmatched)
                }
            },
            MatchOutcome::Ambiguous { rule, candidates } => {
                let ids = candidates.iter().map(|tx| tx.id.as_str()).collect::<Vec<_>>().join(", ");
                let reason = format!("Ambiguous at {rule} level between [{ids}]");
                warn!("🏦️ {reason}. Escalating for manual review.");
                self.db.record_unmatched_notification(notification, &reason).await?;
                Ok(ReconciliationOutcome::Ambiguous { candidates: candidates.len() })
            },
            MatchOutcome::NoMatch => {
                let hints = extract_order_codes(&notification.memo);
                let reason = if hints.is_empty() {
                    "No pending transaction matched".to_string()
                } else {
                    format!("No pending transaction matched; memo mentions [{}]", hints.join(", "))
                };
                warn!("🏦️ {reason} for notification {}", notification.external_ref);
                self.db.record_unmatched_notification(notification, &reason).await?;
                Ok(ReconciliationOutcome::Unmatched)
            },
        }
    }

    async fn publish_closed(&self, tx: &PaymentTransaction, kind: TransactionEventKind) {
        let event = TransactionEvent::new(tx, kind);
        self.publisher.publish(event.clone()).await;
        for producer in &self.producers.transaction_closed_producer {
            producer.publish_event(event.clone()).await;
        }
    }

    pub fn db(&self) -> &B {
        &self.db
    }
}
