//! # Seller Commission
//!
//! `commission = sale_total × seller_rate`, rounded half-up to the cent.
//! The rate is snapshotted onto the commission row so later rate changes
//! never rewrite history.

use serde::{Deserialize, Serialize};

use crate::money::Money;
use crate::types::{Seller, TaxRate};

/// Commission to be recorded alongside a sale.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommissionPlan {
    pub seller_id: String,
    pub seller_name: String,
    pub rate: TaxRate,
    pub sale_total: Money,
    pub amount: Money,
}

/// Computes the commission on `total` at `rate`.
pub fn compute_commission(total: Money, rate: TaxRate) -> Money {
    total.apply_rate(rate)
}

/// Plans the commission for `seller` using their *current* rate.
pub fn plan_commission(seller: &Seller, total: Money) -> CommissionPlan {
    let rate = seller.commission_rate();
    CommissionPlan {
        seller_id: seller.id.clone(),
        seller_name: seller.name.clone(),
        rate,
        sale_total: total,
        amount: compute_commission(total, rate),
    }
}
