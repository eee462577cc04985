use chrono::Utc;
use log::*;
use storefront_payment_engine::{db_types::PaymentTransaction, PaymentRegistry, SqliteDatabase};
use tokio::task::JoinHandle;

/// Starts the expiry sweeper. Do not await the returned JoinHandle, as it will run indefinitely.
///
/// The sweep period is seconds, not minutes: the transaction TTL is only a few minutes, so the sweep granularity
/// must be a small fraction of it or listeners would learn about expiry long after polling already reported it.
pub fn start_expiry_worker(registry: PaymentRegistry<SqliteDatabase>, period_seconds: u64) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut timer = tokio::time::interval(std::time::Duration::from_secs(period_seconds));
        info!("🕰️ Payment transaction expiry worker started (every {period_seconds}s)");
        loop {
            timer.tick().await;
            match registry.expire_due(Utc::now()).await {
                Ok(expired) if expired.is_empty() => {},
                Ok(expired) => {
                    info!("🕰️ {} transaction(s) expired: {}", expired.len(), tx_list(&expired));
                },
                Err(e) => {
                    error!("🕰️ Error running transaction expiry sweep: {e}");
                },
            }
        }
    })
}

fn tx_list(txs: &[PaymentTransaction]) -> String {
    txs.iter().map(|tx| format!("{} (order [{}])", tx.id, tx.order_code)).collect::<Vec<String>>().join(", ")
}
