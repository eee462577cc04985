//! Request handler definitions
//!
//! Define each route and its handler here.
//! Handlers that are more than a line or two MUST go into a separate module. Keep this module neat and tidy 🙏
//!
//! A note about performance:
//! Since each worker thread processes its requests sequentially, handlers which block the current thread will cause
//! the current worker to stop processing new requests. For this reason, any long, non-cpu-bound operation (e.g. I/O,
//! database operations, etc.) should be expressed as futures or asynchronous functions. Async handlers get executed
//! concurrently by worker threads and thus don't block execution.
use std::str::FromStr;

use actix_web::{get, web, HttpRequest, HttpResponse, Responder};
use log::*;
use storefront_payment_engine::{
    db_types::{NewOrderRequest, OrderId, PaymentMethod, PaymentRail},
    CheckoutApi,
    CheckoutDatabase,
    PaymentRegistry,
    ReconciliationOutcome,
};

use crate::{
    config::ServerConfig,
    data_objects::{
        CreateOrderParams,
        JsonResponse,
        OrderResult,
        PaymentTransactionResult,
        RejectParams,
        TransactionStatusResult,
        WebhookAck,
    },
    errors::ServerError,
    integrations::bank_webhook::{normalize_payload, verify_signature},
};

// Web-actix cannot handle generics in handlers, so it's implemented manually using the `route!` macro
#[macro_export]
macro_rules! route {
    ($name:ident => $method:ident $path:literal impl $($bounds:ty),+) => {
        paste::paste! { pub struct [<$name:camel Route>]< $( [< T $bounds:camel> ],)+ >( $( core::marker::PhantomData<fn() -> [< T $bounds:camel> ] >,)+ );}
        paste::paste! { impl< $( [< T $bounds:camel> ],)+ > [<$name:camel Route>]< $( [< T $bounds:camel> ],)+ > {
            #[allow(clippy::new_without_default)]
            pub fn new() -> Self {
                Self($( core::marker::PhantomData::<fn() -> [< T $bounds:camel> ] >,)+)
            }
        }}
        paste::paste! { impl<$( [< T $bounds:camel >] , )+> actix_web::dev::HttpServiceFactory for [<$name:camel Route>]<$([<T $bounds:camel>],)+>
        where
            $([<T $bounds:camel>]: $bounds + 'static,)+
        {
            fn register(self, config: &mut actix_web::dev::AppService) {
                let res = actix_web::Resource::new($path)
                    .name(stringify!($name))
                    .guard(actix_web::guard::$method())
                    .to($name::< $( [< T $bounds:camel >], )+>);
                actix_web::dev::HttpServiceFactory::register(res, config);
            }
        }}
    };
}

// ----------------------------------------------   Health  ----------------------------------------------------
#[get("/health")]
pub async fn health() -> impl Responder {
    trace!("💻️ Received health check request");
    HttpResponse::Ok().body("👍️\n")
}

// ----------------------------------------------   Orders  ----------------------------------------------------

route!(place_order => Post "/api/orders" impl CheckoutDatabase);
/// Places a new order from the customer's selected cart lines. The whole unit -- voucher redemption, stock
/// decrement, line-item snapshots, cart cleanup -- commits or rolls back together; a failure response means nothing
/// changed.
pub async fn place_order<B: CheckoutDatabase>(
    req: HttpRequest,
    params: web::Json<CreateOrderParams>,
    api: web::Data<CheckoutApi<B>>,
) -> Result<HttpResponse, ServerError> {
    let customer_id = customer_id_from_headers(&req)?;
    let params = params.into_inner();
    let payment_method = PaymentMethod::from_str(&params.payment_method)
        .map_err(|e| ServerError::InvalidRequest(e.to_string()))?;
    require_field(&params.delivery.address, "delivery.address")?;
    require_field(&params.delivery.recipient_name, "delivery.recipient_name")?;
    require_field(&params.delivery.phone, "delivery.phone")?;
    debug!("💻️ POST order for customer #{customer_id} with {} cart line(s)", params.selected_item_ids.len());
    let request = NewOrderRequest {
        customer_id,
        selected_item_ids: params.selected_item_ids,
        delivery: params.delivery,
        payment_method,
        voucher_code: params.voucher_code,
    };
    let order = api.place_order(request).await?;
    Ok(HttpResponse::Ok().json(order))
}

route!(my_orders => Get "/api/orders" impl CheckoutDatabase);
pub async fn my_orders<B: CheckoutDatabase>(
    req: HttpRequest,
    api: web::Data<CheckoutApi<B>>,
) -> Result<HttpResponse, ServerError> {
    let customer_id = customer_id_from_headers(&req)?;
    debug!("💻️ GET orders for customer #{customer_id}");
    let orders = api.orders_for_customer(customer_id).await?;
    Ok(HttpResponse::Ok().json(orders))
}

route!(order_by_code => Get "/api/orders/{order_code}" impl CheckoutDatabase);
pub async fn order_by_code<B: CheckoutDatabase>(
    req: HttpRequest,
    path: web::Path<String>,
    api: web::Data<CheckoutApi<B>>,
) -> Result<HttpResponse, ServerError> {
    let customer_id = customer_id_from_headers(&req)?;
    let order_code = OrderId(path.into_inner());
    let (order, items) = api
        .order_by_code(&order_code)
        .await?
        .filter(|(o, _)| o.customer_id == customer_id)
        .ok_or_else(|| ServerError::NoRecordFound(format!("Order {order_code}")))?;
    Ok(HttpResponse::Ok().json(OrderResult { order, items }))
}

route!(cancel_order => Post "/api/orders/{order_code}/cancel" impl CheckoutDatabase);
/// Cancels an order that is still awaiting confirmation. Stock goes back on the shelf; any pending payment
/// transaction dies with the order so a late webhook cannot settle it.
pub async fn cancel_order<B: CheckoutDatabase>(
    req: HttpRequest,
    path: web::Path<String>,
    api: web::Data<CheckoutApi<B>>,
    registry: web::Data<PaymentRegistry<B>>,
) -> Result<HttpResponse, ServerError> {
    let customer_id = customer_id_from_headers(&req)?;
    let order_code = OrderId(path.into_inner());
    let order = api.cancel_order(&order_code, customer_id).await?;
    registry.evict_order(&order_code).await;
    Ok(HttpResponse::Ok().json(order))
}

// ----------------------------------------------  Payments  ----------------------------------------------------

route!(create_payment => Post "/api/payments/{order_code}/{rail}" impl CheckoutDatabase);
/// Creates a pending QR payment transaction for the order on the chosen rail, and hands back everything the UI
/// needs: the transfer memo, the amount, the QR image URL and the expiry to count down against.
pub async fn create_payment<B: CheckoutDatabase>(
    req: HttpRequest,
    path: web::Path<(String, String)>,
    api: web::Data<CheckoutApi<B>>,
    registry: web::Data<PaymentRegistry<B>>,
    config: web::Data<ServerConfig>,
) -> Result<HttpResponse, ServerError> {
    let customer_id = customer_id_from_headers(&req)?;
    let (order_code, rail) = path.into_inner();
    let order_code = OrderId(order_code);
    let rail = PaymentRail::from_str(&rail).map_err(|e| ServerError::InvalidRequestPath(e.to_string()))?;
    // Customers only create payments against their own orders.
    api.order_by_code(&order_code)
        .await?
        .filter(|(o, _)| o.customer_id == customer_id)
        .ok_or_else(|| ServerError::NoRecordFound(format!("Order {order_code}")))?;
    let tx = registry.create_pending(&order_code, rail).await?;
    let qr_image_url = config.bank.qr_image_url(tx.amount, &tx.memo);
    debug!("💻️ Payment transaction {} created for order [{order_code}] via {rail}", tx.id);
    Ok(HttpResponse::Ok().json(PaymentTransactionResult::new(&tx, qr_image_url)))
}

route!(payment_status => Get "/api/payments/status/{transaction_id}" impl CheckoutDatabase);
/// The status poll the checkout UI sits on while the customer pays. Expiry is reported lazily, so a lapsed
/// transaction reads as `expired` even before the sweeper has retired it.
pub async fn payment_status<B: CheckoutDatabase>(
    path: web::Path<String>,
    registry: web::Data<PaymentRegistry<B>>,
) -> Result<HttpResponse, ServerError> {
    let transaction_id = path.into_inner();
    let status = registry.status(&transaction_id).await?;
    Ok(HttpResponse::Ok().json(TransactionStatusResult { transaction_id, status }))
}

route!(cancel_payment => Post "/api/payments/cancel/{transaction_id}" impl CheckoutDatabase);
pub async fn cancel_payment<B: CheckoutDatabase>(
    path: web::Path<String>,
    registry: web::Data<PaymentRegistry<B>>,
) -> Result<HttpResponse, ServerError> {
    let transaction_id = path.into_inner();
    let outcome = registry.cancel_pending(&transaction_id).await?;
    if outcome.was_applied() {
        Ok(HttpResponse::Ok().json(JsonResponse::success("Transaction cancelled")))
    } else {
        let status = outcome.transaction().status;
        Ok(HttpResponse::Ok().json(JsonResponse::failure(format!("Transaction is already {status}"))))
    }
}

// ----------------------------------------------   Webhook  ----------------------------------------------------

route!(bank_webhook => Post "/webhook/bank" impl CheckoutDatabase);
/// Receives a gateway's transfer notification, authenticates and normalizes it, and feeds it to the reconciliation
/// matcher. Whatever the matcher decides, the gateway gets a 200 so it stops retrying: unmatched and ambiguous
/// deliveries are already recorded on our side for manual review.
pub async fn bank_webhook<B: CheckoutDatabase>(
    req: HttpRequest,
    body: web::Bytes,
    registry: web::Data<PaymentRegistry<B>>,
    config: web::Data<ServerConfig>,
) -> Result<HttpResponse, ServerError> {
    verify_signature(&config.webhook_secret, req.headers(), &body)?;
    let payload: serde_json::Value = serde_json::from_slice(&body)
        .map_err(|e| ServerError::CouldNotDeserializePayload(e.to_string()))?;
    let notification = normalize_payload(&payload)
        .ok_or_else(|| ServerError::CouldNotDeserializePayload("Unrecognised webhook payload shape".into()))?;
    debug!("💻️ Bank webhook received: {} \"{}\"", notification.amount, notification.memo);
    // Transfers into some other account are someone else's business.
    let expected = &config.bank.account_number;
    if !expected.is_empty() && !notification.source_account.is_empty() && &notification.source_account != expected {
        info!("💻️ Skipping notification for other account {}", notification.source_account);
        return Ok(HttpResponse::Ok().json(WebhookAck::ignored()));
    }
    match registry.match_notification(&notification).await? {
        ReconciliationOutcome::Settled { transaction, .. } => {
            info!("💻️ Webhook settled transaction {}", transaction.id);
            Ok(HttpResponse::Ok().json(WebhookAck::matched(&transaction.id)))
        },
        ReconciliationOutcome::Unmatched | ReconciliationOutcome::Ambiguous { .. } => {
            Ok(HttpResponse::Ok().json(WebhookAck::unmatched()))
        },
    }
}

// ----------------------------------------------    Admin   ----------------------------------------------------

route!(admin_confirm => Post "/api/admin/confirm/{transaction_id}" impl CheckoutDatabase);
/// Manual settlement override. Goes through exactly the same guarded confirm path as the automated matcher, so an
/// admin and a webhook racing each other still produce a single stable terminal state.
pub async fn admin_confirm<B: CheckoutDatabase>(
    req: HttpRequest,
    path: web::Path<String>,
    registry: web::Data<PaymentRegistry<B>>,
) -> Result<HttpResponse, ServerError> {
    let admin_id = admin_id_from_headers(&req)?;
    let transaction_id = path.into_inner();
    let outcome = registry.confirm(&transaction_id, &format!("ADMIN_{admin_id}")).await?;
    debug!("💻️ Manual confirm of {transaction_id} by {admin_id}: applied = {}", outcome.transition.was_applied());
    Ok(HttpResponse::Ok().json(outcome.order))
}

route!(admin_reject => Post "/api/admin/reject/{transaction_id}" impl CheckoutDatabase);
pub async fn admin_reject<B: CheckoutDatabase>(
    req: HttpRequest,
    path: web::Path<String>,
    params: web::Json<RejectParams>,
    registry: web::Data<PaymentRegistry<B>>,
) -> Result<HttpResponse, ServerError> {
    let admin_id = admin_id_from_headers(&req)?;
    let transaction_id = path.into_inner();
    let outcome = registry.reject(&transaction_id, &params.reason, &format!("ADMIN_{admin_id}")).await?;
    if outcome.was_applied() {
        Ok(HttpResponse::Ok().json(JsonResponse::success("Transaction rejected")))
    } else {
        let status = outcome.transaction().status;
        Ok(HttpResponse::Ok().json(JsonResponse::failure(format!("Transaction is already {status}"))))
    }
}

// ----------------------------------------------   Helpers  ----------------------------------------------------

/// Session handling is the storefront frontend's concern; by the time a request reaches this server, the customer's
/// identity arrives in the `spg-customer-id` header.
fn customer_id_from_headers(req: &HttpRequest) -> Result<i64, ServerError> {
    req.headers()
        .get("spg-customer-id")
        .and_then(|v| v.to_str().ok())
        .and_then(|s| s.parse::<i64>().ok())
        .ok_or(ServerError::MissingIdentityHeader("spg-customer-id"))
}

fn require_field(value: &str, name: &str) -> Result<(), ServerError> {
    if value.trim().is_empty() {
        return Err(ServerError::InvalidRequest(format!("{name} is required")));
    }
    Ok(())
}

fn admin_id_from_headers(req: &HttpRequest) -> Result<String, ServerError> {
    req.headers()
        .get("spg-admin-id")
        .and_then(|v| v.to_str().ok())
        .filter(|s| !s.is_empty())
        .map(String::from)
        .ok_or(ServerError::MissingIdentityHeader("spg-admin-id"))
}
