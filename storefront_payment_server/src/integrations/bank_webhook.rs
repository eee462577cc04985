//! Normalization and authentication of inbound bank-transfer webhooks.
//!
//! Three payload dialects are recognised, tried in order: SePay (`{type, data: {...}}`), Casso
//! (`{error: 0, data: {records: [...]}}`), and a generic flat shape. Field names inside each dialect are themselves
//! aliased because the vendors rename them between API versions.
use actix_web::http::header::HeaderMap;
use hmac::{Hmac, Mac};
use log::*;
use sha2::Sha256;
use spg_common::{Secret, Vnd};
use storefront_payment_engine::db_types::InboundNotification;

use crate::errors::ServerError;

type HmacSha256 = Hmac<Sha256>;

/// Verifies the `x-signature` header: a hex HMAC-SHA256 of the raw body under the shared webhook secret.
/// An empty secret disables verification; the config layer warns loudly about that at startup.
pub fn verify_signature(secret: &Secret<String>, headers: &HeaderMap, body: &[u8]) -> Result<(), ServerError> {
    if secret.reveal().is_empty() {
        return Ok(());
    }
    let signature = headers
        .get("x-signature")
        .and_then(|v| v.to_str().ok())
        .ok_or(ServerError::InvalidWebhookSignature)?;
    let expected = hex::decode(signature).map_err(|_| ServerError::InvalidWebhookSignature)?;
    let mut mac = HmacSha256::new_from_slice(secret.reveal().as_bytes())
        .map_err(|e| ServerError::BackendError(format!("Webhook secret is unusable: {e}")))?;
    mac.update(body);
    mac.verify_slice(&expected).map_err(|_| {
        debug!("💻️ Webhook signature mismatch");
        ServerError::InvalidWebhookSignature
    })
}

/// Normalizes a gateway payload into an [`InboundNotification`]. Returns `None` when no dialect fits.
pub fn normalize_payload(body: &serde_json::Value) -> Option<InboundNotification> {
    sepay(body).or_else(|| casso(body)).or_else(|| generic(body))
}

fn sepay(body: &serde_json::Value) -> Option<InboundNotification> {
    if body.get("type").is_none() {
        return None;
    }
    let d = body.get("data")?;
    Some(InboundNotification {
        amount: amount_of(first_of(d, &["amount", "transferAmount"])?)?,
        memo: string_of(d, &["description", "content", "transferNote"]),
        external_ref: string_of(d, &["tid", "transactionId", "id"]),
        source_account: string_of(d, &["accountNumber", "account"]),
        rail_code: first_of(d, &["accountBankCode", "bankCode"])
            .and_then(|v| v.as_str())
            .unwrap_or("MB")
            .to_uppercase(),
    })
}

fn casso(body: &serde_json::Value) -> Option<InboundNotification> {
    if body.get("error").and_then(|v| v.as_i64()) != Some(0) {
        return None;
    }
    let record = body.get("data")?.get("records")?.as_array()?.first()?;
    Some(InboundNotification {
        amount: amount_of(record.get("amount")?)?,
        memo: string_of(record, &["description"]),
        external_ref: string_of(record, &["tid", "id"]),
        source_account: string_of(record, &["account"]),
        rail_code: "MB".to_string(),
    })
}

fn generic(body: &serde_json::Value) -> Option<InboundNotification> {
    let amount = body.get("amount")?;
    let memo = body.get("description")?;
    Some(InboundNotification {
        amount: amount_of(amount)?,
        memo: memo.as_str().unwrap_or_default().to_string(),
        external_ref: string_of(body, &["transactionRef", "id"]),
        source_account: string_of(body, &["accountNumber", "account"]),
        rail_code: first_of(body, &["bankCode"]).and_then(|v| v.as_str()).unwrap_or("MB").to_uppercase(),
    })
}

fn first_of<'a>(value: &'a serde_json::Value, keys: &[&str]) -> Option<&'a serde_json::Value> {
    keys.iter().find_map(|k| value.get(k)).filter(|v| !v.is_null())
}

fn string_of(value: &serde_json::Value, keys: &[&str]) -> String {
    first_of(value, keys)
        .map(|v| match v {
            serde_json::Value::String(s) => s.clone(),
            other => other.to_string(),
        })
        .unwrap_or_default()
}

/// Gateways disagree on whether amounts are numbers or strings; either way they are whole đồng.
fn amount_of(value: &serde_json::Value) -> Option<Vnd> {
    match value {
        serde_json::Value::Number(n) => n.as_f64().map(|f| Vnd::from(f.round() as i64)),
        serde_json::Value::String(s) => s.trim().parse::<f64>().ok().map(|f| Vnd::from(f.round() as i64)),
        _ => None,
    }
}

#[cfg(test)]
mod test {
    use serde_json::json;

    use super::*;

    #[test]
    fn sepay_payload_is_normalized() {
        let body = json!({
            "type": "transfer_in",
            "data": {
                "transferAmount": 150000,
                "content": "NGAN HANG TT DH100 CODE 55213 chuyen tien",
                "tid": "FT24123456",
                "accountNumber": "0346176591",
                "accountBankCode": "mb"
            }
        });
        let n = normalize_payload(&body).expect("sepay payload should normalize");
        assert_eq!(n.amount, Vnd::from(150_000));
        assert_eq!(n.memo, "NGAN HANG TT DH100 CODE 55213 chuyen tien");
        assert_eq!(n.external_ref, "FT24123456");
        assert_eq!(n.source_account, "0346176591");
        assert_eq!(n.rail_code, "MB");
    }

    #[test]
    fn casso_payload_is_normalized() {
        let body = json!({
            "error": 0,
            "data": { "records": [ { "amount": 90000, "description": "thanh toan 200", "tid": 771, "account": "0346176591" } ] }
        });
        let n = normalize_payload(&body).expect("casso payload should normalize");
        assert_eq!(n.amount, Vnd::from(90_000));
        assert_eq!(n.external_ref, "771");
    }

    #[test]
    fn generic_payload_is_normalized() {
        let body = json!({ "amount": "64000", "description": "ck don hang", "bankCode": "vcb" });
        let n = normalize_payload(&body).expect("generic payload should normalize");
        assert_eq!(n.amount, Vnd::from(64_000));
        assert_eq!(n.rail_code, "VCB");
    }

    #[test]
    fn unknown_shapes_are_refused() {
        assert!(normalize_payload(&json!({ "hello": "world" })).is_none());
        assert!(normalize_payload(&json!({ "error": 1, "data": {} })).is_none());
    }

    #[test]
    fn signature_roundtrip() {
        let secret = Secret::new("topsecret".to_string());
        let body = br#"{"amount":1000}"#;
        let mut mac = HmacSha256::new_from_slice(b"topsecret").unwrap();
        mac.update(body);
        let sig = hex::encode(mac.finalize().into_bytes());

        let mut headers = HeaderMap::new();
        headers.insert("x-signature".parse().unwrap(), sig.parse().unwrap());
        assert!(verify_signature(&secret, &headers, body).is_ok());

        let mut bad = HeaderMap::new();
        bad.insert("x-signature".parse().unwrap(), "deadbeef".parse().unwrap());
        assert!(verify_signature(&secret, &bad, body).is_err());

        // Empty secret = dev mode, everything passes.
        assert!(verify_signature(&Secret::default(), &HeaderMap::new(), body).is_ok());
    }
}
