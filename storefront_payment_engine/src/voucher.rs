//! The voucher evaluator.
//!
//! A pure pricing rule: given a voucher record, a cart subtotal and the current time, compute the discount or say
//! exactly why the voucher cannot be applied. Checks run in a fixed order and the first failure wins, so the error
//! a customer sees is deterministic. No side effects here; the redemption counter is only touched inside the order
//! creation transaction.
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use spg_common::Vnd;
use thiserror::Error;

use crate::db_types::{DiscountKind, Voucher, VoucherStatus};

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum VoucherError {
    #[error("Voucher is not available")]
    Disabled,
    #[error("Voucher is not active yet")]
    NotYetStarted,
    #[error("Voucher has expired")]
    Expired,
    #[error("Voucher has no redemptions left")]
    Exhausted,
    #[error("Order subtotal is below the voucher minimum of {0}")]
    BelowMinimum(Vnd),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Discount {
    pub discount: Vnd,
    pub final_total: Vnd,
}

/// Evaluates `voucher` against `subtotal` at time `now`.
///
/// The discount is the voucher's percentage of the subtotal (or its flat value), clamped first to the voucher's
/// maximum-discount cap and then to the subtotal itself, so the result is always in `[0, subtotal]`.
pub fn evaluate(voucher: &Voucher, subtotal: Vnd, now: DateTime<Utc>) -> Result<Discount, VoucherError> {
    if voucher.status != VoucherStatus::Active {
        return Err(VoucherError::Disabled);
    }
    if now < voucher.starts_at {
        return Err(VoucherError::NotYetStarted);
    }
    if now > voucher.ends_at {
        return Err(VoucherError::Expired);
    }
    if voucher.used >= voucher.allowance {
        return Err(VoucherError::Exhausted);
    }
    if let Some(min_order) = voucher.min_order {
        if subtotal < min_order {
            return Err(VoucherError::BelowMinimum(min_order));
        }
    }
    let mut discount = match voucher.kind {
        DiscountKind::Percent => Vnd::from(subtotal.value() * voucher.value / 100),
        DiscountKind::Fixed => Vnd::from(voucher.value),
    };
    if let Some(cap) = voucher.max_discount {
        discount = discount.min(cap);
    }
    discount = discount.min(subtotal);
    Ok(Discount { discount, final_total: subtotal - discount })
}

#[cfg(test)]
mod test {
    use chrono::Duration;

    use super::*;

    fn voucher(kind: DiscountKind, value: i64) -> Voucher {
        let now = Utc::now();
        Voucher {
            id: 1,
            code: "GIAM10".to_string(),
            kind,
            value,
            min_order: None,
            max_discount: None,
            allowance: 100,
            used: 0,
            starts_at: now - Duration::days(1),
            ends_at: now + Duration::days(1),
            status: VoucherStatus::Active,
        }
    }

    #[test]
    fn percentage_discount() {
        let v = voucher(DiscountKind::Percent, 10);
        let result = evaluate(&v, Vnd::from(200_000), Utc::now()).unwrap();
        assert_eq!(result.discount, Vnd::from(20_000));
        assert_eq!(result.final_total, Vnd::from(180_000));
    }

    #[test]
    fn fixed_discount() {
        let v = voucher(DiscountKind::Fixed, 30_000);
        let result = evaluate(&v, Vnd::from(200_000), Utc::now()).unwrap();
        assert_eq!(result.discount, Vnd::from(30_000));
        assert_eq!(result.final_total, Vnd::from(170_000));
    }

    #[test]
    fn discount_is_capped() {
        let mut v = voucher(DiscountKind::Percent, 50);
        v.max_discount = Some(Vnd::from(40_000));
        let result = evaluate(&v, Vnd::from(200_000), Utc::now()).unwrap();
        assert_eq!(result.discount, Vnd::from(40_000));
    }

    #[test]
    fn discount_never_exceeds_subtotal() {
        let v = voucher(DiscountKind::Fixed, 500_000);
        let result = evaluate(&v, Vnd::from(80_000), Utc::now()).unwrap();
        assert_eq!(result.discount, Vnd::from(80_000));
        assert_eq!(result.final_total, Vnd::from(0));
    }

    #[test]
    fn first_failure_wins() {
        let mut v = voucher(DiscountKind::Percent, 10);
        v.status = VoucherStatus::Disabled;
        v.used = v.allowance;
        // Disabled is checked before exhaustion.
        assert_eq!(evaluate(&v, Vnd::from(100_000), Utc::now()), Err(VoucherError::Disabled));
    }

    #[test]
    fn window_is_enforced() {
        let v = voucher(DiscountKind::Percent, 10);
        let too_early = v.starts_at - Duration::seconds(1);
        let too_late = v.ends_at + Duration::seconds(1);
        assert_eq!(evaluate(&v, Vnd::from(100_000), too_early), Err(VoucherError::NotYetStarted));
        assert_eq!(evaluate(&v, Vnd::from(100_000), too_late), Err(VoucherError::Expired));
    }

    #[test]
    fn minimum_subtotal_is_enforced() {
        let mut v = voucher(DiscountKind::Percent, 10);
        v.min_order = Some(Vnd::from(150_000));
        assert_eq!(evaluate(&v, Vnd::from(100_000), Utc::now()), Err(VoucherError::BelowMinimum(Vnd::from(150_000))));
        assert!(evaluate(&v, Vnd::from(150_000), Utc::now()).is_ok());
    }

    #[test]
    fn evaluation_is_idempotent() {
        let v = voucher(DiscountKind::Percent, 15);
        let t = Utc::now();
        let first = evaluate(&v, Vnd::from(300_000), t).unwrap();
        let second = evaluate(&v, Vnd::from(300_000), t).unwrap();
        assert_eq!(first, second);
        // The record itself is untouched.
        assert_eq!(v.used, 0);
    }
}
