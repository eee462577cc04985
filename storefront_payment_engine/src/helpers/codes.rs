//! Order-code, token and transfer-memo conventions.
//!
//! Inbound gateways truncate, re-case and strip punctuation from transfer memos, so everything rendered here is
//! short, upper-case and alphanumeric-plus-spaces. The matcher relies on these exact conventions; change them
//! together or not at all.
use std::sync::OnceLock;

use chrono::{DateTime, Utc};
use rand::Rng;
use regex::Regex;

use crate::db_types::{OrderId, PaymentRail};

/// Length of the trailing order-code fragment used by the weakest containment rule.
pub const ORDER_CODE_SUFFIX_LEN: usize = 8;

/// Mints a new order code: `DH` followed by the creation timestamp in milliseconds and three random digits.
/// Millisecond collisions between two checkouts are broken by the random tail.
pub fn new_order_code(now: DateTime<Utc>) -> OrderId {
    let tail = rand::thread_rng().gen_range(0..1000);
    OrderId(format!("DH{}{:03}", now.timestamp_millis(), tail))
}

/// A five-digit verification token. Numeric only, since some banks upper-case or strip letters from memos but
/// digits always survive.
pub fn new_verification_token() -> String {
    let n = rand::thread_rng().gen_range(0..100_000);
    format!("{n:05}")
}

pub fn new_transaction_id(rail: PaymentRail, order_code: &OrderId, now: DateTime<Utc>) -> String {
    format!("{}_{}_{}", rail.id_prefix(), order_code, now.timestamp_millis())
}

/// Renders the memo a payer is instructed to attach to the transfer. Embeds both the order code and the
/// verification token so the matcher has two independent anchors to find.
pub fn render_transfer_memo(order_code: &OrderId, token: &str) -> String {
    format!("TT {order_code} CODE {token}")
}

/// The digits of an order code with any non-numeric prefix stripped, e.g. `DH200` becomes `200`.
/// Returns `None` when nothing numeric remains.
pub fn numeric_suffix(order_code: &str) -> Option<&str> {
    let digits = order_code.trim_start_matches(|c: char| !c.is_ascii_digit());
    (!digits.is_empty() && digits.chars().all(|c| c.is_ascii_digit())).then_some(digits)
}

/// The last [`ORDER_CODE_SUFFIX_LEN`] characters of an order code, for codes long enough that the fragment is still
/// distinctive.
pub fn trailing_suffix(order_code: &str) -> Option<&str> {
    (order_code.len() > ORDER_CODE_SUFFIX_LEN).then(|| &order_code[order_code.len() - ORDER_CODE_SUFFIX_LEN..])
}

/// Every `DH`-style order code mentioned in a memo. Used to annotate unmatched-notification logs so an operator can
/// see at a glance which order a payer was probably aiming for.
pub fn extract_order_codes(memo: &str) -> Vec<String> {
    static CODE_RE: OnceLock<Regex> = OnceLock::new();
    let re = CODE_RE.get_or_init(|| Regex::new(r"DH[0-9]+").expect("order code pattern is valid"));
    re.find_iter(&memo.to_uppercase()).map(|m| m.as_str().to_string()).collect()
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn order_codes_are_prefixed_and_unique_enough() {
        let now = Utc::now();
        let a = new_order_code(now);
        assert!(a.as_str().starts_with("DH"));
        assert!(a.as_str()[2..].chars().all(|c| c.is_ascii_digit()));
        assert!(a.as_str().len() > ORDER_CODE_SUFFIX_LEN);
    }

    #[test]
    fn tokens_are_five_digits() {
        for _ in 0..100 {
            let t = new_verification_token();
            assert_eq!(t.len(), 5);
            assert!(t.chars().all(|c| c.is_ascii_digit()));
        }
    }

    #[test]
    fn memo_embeds_code_and_token() {
        let memo = render_transfer_memo(&OrderId("DH100".into()), "55213");
        assert_eq!(memo, "TT DH100 CODE 55213");
    }

    #[test]
    fn numeric_suffix_strips_prefix() {
        assert_eq!(numeric_suffix("DH200"), Some("200"));
        assert_eq!(numeric_suffix("DH1716203993411042"), Some("1716203993411042"));
        assert_eq!(numeric_suffix("DHABC"), None);
    }

    #[test]
    fn trailing_suffix_needs_length() {
        assert_eq!(trailing_suffix("DH1716203993411042"), Some("93411042"));
        assert_eq!(trailing_suffix("DH200"), None);
    }

    #[test]
    fn extracts_codes_from_noisy_memos() {
        let codes = extract_order_codes("NGAN HANG tt dh100 code 55213 chuyen tien DH200");
        assert_eq!(codes, vec!["DH100".to_string(), "DH200".to_string()]);
    }
}
