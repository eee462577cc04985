use std::{pin::Pin, time::Duration};

use actix_web::{dev::Server, http::KeepAlive, middleware::Logger, web, App, HttpServer};
use futures::Future;
use log::*;
use storefront_payment_engine::{
    events::{EventHandlers, EventHooks, EventProducers, TransactionPublisher},
    CheckoutApi,
    PaymentRegistry,
    SqliteDatabase,
};

use crate::{
    config::ServerConfig,
    errors::ServerError,
    expiry_worker::start_expiry_worker,
    routes::{
        health,
        AdminConfirmRoute,
        AdminRejectRoute,
        BankWebhookRoute,
        CancelOrderRoute,
        CancelPaymentRoute,
        CreatePaymentRoute,
        MyOrdersRoute,
        OrderByCodeRoute,
        PaymentStatusRoute,
        PlaceOrderRoute,
    },
};

pub async fn run_server(config: ServerConfig) -> Result<(), ServerError> {
    let db = SqliteDatabase::new_with_url(&config.database_url, 25)
        .await
        .map_err(|e| ServerError::InitializeError(e.to_string()))?;
    let producers = start_default_hooks().await;
    let registry = PaymentRegistry::new(
        db.clone(),
        config.transaction_ttl,
        config.amount_tolerance,
        producers,
        TransactionPublisher::new(),
    );
    // The pending index is a cache over the store; rebuild it before the first request or sweep.
    registry.rebuild_index().await.map_err(|e| ServerError::InitializeError(e.to_string()))?;
    let _sweeper = start_expiry_worker(registry.clone(), config.sweep_interval_seconds);
    let srv = create_server_instance(config, db, registry)?;
    srv.await.map_err(|e| ServerError::InitializeError(e.to_string()))
}

/// The default production hooks: log settlements so the fulfilment team has an audit trail even with no other
/// subscriber attached.
async fn start_default_hooks() -> EventProducers {
    let mut hooks = EventHooks::default();
    hooks.on_order_paid(|event| {
        Box::pin(async move {
            info!("📦️ Order [{}] is paid and ready for fulfilment. Total {}", event.order.order_code, event.order.total);
        }) as Pin<Box<dyn Future<Output = ()> + Send>>
    });
    let handlers = EventHandlers::new(16, hooks);
    let producers = handlers.producers();
    handlers.start_handlers().await;
    producers
}

pub fn create_server_instance(
    config: ServerConfig,
    db: SqliteDatabase,
    registry: PaymentRegistry<SqliteDatabase>,
) -> Result<Server, ServerError> {
    let host = config.host.clone();
    let port = config.port;
    let srv = HttpServer::new(move || {
        let checkout_api = CheckoutApi::new(db.clone());
        App::new()
            .wrap(Logger::new("%t (%D ms) %s %a %{Host}i %U").log_target("spg::access_log"))
            .app_data(web::Data::new(checkout_api))
            .app_data(web::Data::new(registry.clone()))
            .app_data(web::Data::new(config.clone()))
            .service(health)
            .service(PlaceOrderRoute::<SqliteDatabase>::new())
            .service(MyOrdersRoute::<SqliteDatabase>::new())
            .service(OrderByCodeRoute::<SqliteDatabase>::new())
            .service(CancelOrderRoute::<SqliteDatabase>::new())
            // The fixed payment paths must register ahead of the parameterised create route, or
            // `/api/payments/cancel/{id}` would be captured as an order code and rail.
            .service(PaymentStatusRoute::<SqliteDatabase>::new())
            .service(CancelPaymentRoute::<SqliteDatabase>::new())
            .service(CreatePaymentRoute::<SqliteDatabase>::new())
            .service(BankWebhookRoute::<SqliteDatabase>::new())
            .service(AdminConfirmRoute::<SqliteDatabase>::new())
            .service(AdminRejectRoute::<SqliteDatabase>::new())
    })
    .keep_alive(KeepAlive::Timeout(Duration::from_secs(600)))
    .bind((host.as_str(), port))?
    .run();
    Ok(srv)
}
