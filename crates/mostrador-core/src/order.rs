//! # Order Fulfillment State Machine
//!
//! ```text
//! ┌─────────┐     ┌─────────────┐     ┌──────────┐     ┌───────────┐
//! │ pending │ ──► │ preparation │ ──► │ delivery │ ──► │ completed │
//! └─────────┘     └─────────────┘     └──────────┘     └───────────┘
//!                                                        terminal,
//!                                                        has sale_id
//! ```
//!
//! Linear: no skipping, no going back. Entering `completed` is not a status
//! write on its own; the database layer commits a sale and the status change
//! in the same transaction.

use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::error::{CoreError, CoreResult};
use crate::sale::{sale_total, SaleRequestItem};
use crate::types::{LineItem, OrderStatus, PaymentType};
use crate::validation::{
    validate_line_count, validate_price_cents, validate_quantity, validate_text,
};

/// The only status an order may move to from `current`.
pub const fn next_status(current: OrderStatus) -> Option<OrderStatus> {
    match current {
        OrderStatus::Pending => Some(OrderStatus::Preparation),
        OrderStatus::Preparation => Some(OrderStatus::Delivery),
        OrderStatus::Delivery => Some(OrderStatus::Completed),
        OrderStatus::Completed => None,
    }
}

/// Checks that `to` is the immediate successor of `from`.
pub fn validate_transition(order_id: &str, from: OrderStatus, to: OrderStatus) -> CoreResult<()> {
    if next_status(from) == Some(to) {
        Ok(())
    } else {
        Err(CoreError::InvalidTransition {
            order_id: order_id.to_string(),
            from,
            to,
        })
    }
}

/// Checkout-with-delivery request.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct NewOrder {
    pub items: Vec<SaleRequestItem>,
    pub client_id: Option<String>,
    pub seller_id: Option<String>,
    pub address: String,
    pub payment_type: PaymentType,
    pub cash_amount_cents: Option<i64>,
}

/// Shape checks for a new order.
///
/// Credit and stock are *not* checked here; they are evaluated when the
/// order completes, against the balances and stock of that moment.
pub fn validate_new_order(order: &NewOrder) -> CoreResult<()> {
    if order.items.is_empty() {
        return Err(CoreError::EmptyCart);
    }
    validate_line_count(order.items.len())?;
    validate_text("address", &order.address, 300)?;

    for item in &order.items {
        validate_quantity(item.quantity)?;
        validate_price_cents(item.unit_price_cents)?;
    }
    // Refused now rather than when the order completes
    let lines: Vec<LineItem> = order
        .items
        .iter()
        .map(|item| LineItem {
            product_id: item.product_id.clone(),
            name: String::new(),
            unit_price_cents: item.unit_price_cents,
            quantity: item.quantity,
        })
        .collect();
    sale_total(&lines)?;

    if order.payment_type.uses_credit() && order.client_id.is_none() {
        return Err(CoreError::MissingClient {
            payment_type: order.payment_type.to_string(),
        });
    }

    Ok(())
}
