//! Keyed fan-out for checkout UIs waiting on a specific transaction.
//!
//! `subscribe` hands back a plain mpsc receiver; the transport wrapping it (websocket, SSE, long-poll) is someone
//! else's problem. Subscriptions are one-shot in spirit: a transaction announces exactly one terminal event, after
//! which its subscriber list is dropped.
use dashmap::DashMap;
use log::*;
use std::sync::Arc;
use tokio::sync::mpsc;

use crate::events::TransactionEvent;

const SUBSCRIBER_BUFFER: usize = 4;

#[derive(Clone, Default)]
pub struct TransactionPublisher {
    subscribers: Arc<DashMap<String, Vec<mpsc::Sender<TransactionEvent>>>>,
}

impl TransactionPublisher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers interest in `transaction_id`. The receiver yields the single terminal event for that transaction.
    pub fn subscribe(&self, transaction_id: &str) -> mpsc::Receiver<TransactionEvent> {
        let (sender, receiver) = mpsc::channel(SUBSCRIBER_BUFFER);
        self.subscribers.entry(transaction_id.to_string()).or_default().push(sender);
        trace!("📬️ New subscriber for transaction {transaction_id}");
        receiver
    }

    /// Delivers `event` to every subscriber of its transaction and drops the subscription list. Subscribers that
    /// went away are skipped.
    pub async fn publish(&self, event: TransactionEvent) {
        let Some((_, senders)) = self.subscribers.remove(&event.transaction_id) else {
            trace!("📬️ No subscribers for transaction {}", event.transaction_id);
            return;
        };
        debug!("📬️ Notifying {} subscriber(s) of {:?} for transaction {}", senders.len(), event.kind, event.transaction_id);
        for sender in senders {
            if sender.send(event.clone()).await.is_err() {
                trace!("📬️ Subscriber for {} hung up before the event arrived", event.transaction_id);
            }
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::events::TransactionEventKind;

    #[tokio::test]
    async fn subscribers_receive_the_terminal_event() {
        let publisher = TransactionPublisher::new();
        let mut rx1 = publisher.subscribe("bank_DH100_1");
        let mut rx2 = publisher.subscribe("bank_DH100_1");
        let mut other = publisher.subscribe("bank_DH200_1");
        let event = TransactionEvent { transaction_id: "bank_DH100_1".to_string(), kind: TransactionEventKind::Confirmed };
        publisher.publish(event.clone()).await;
        assert_eq!(rx1.recv().await, Some(event.clone()));
        assert_eq!(rx2.recv().await, Some(event));
        // The other transaction's subscriber saw nothing and its channel is still open.
        assert!(other.try_recv().is_err());
    }

    #[tokio::test]
    async fn publishing_without_subscribers_is_a_noop() {
        let publisher = TransactionPublisher::new();
        let event = TransactionEvent { transaction_id: "wallet_DH300_1".to_string(), kind: TransactionEventKind::Expired };
        publisher.publish(event).await;
    }
}
