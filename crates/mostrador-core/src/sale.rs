//! # Sale Planning
//!
//! Turns a sale request plus snapshots of the products, client and seller
//! into a [`SalePlan`]: every number the database layer will write, decided
//! before the first write happens.
//!
//! ## Pipeline
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  SaleRequest                                                            │
//! │      │                                                                  │
//! │      ▼                                                                  │
//! │  1. total = Σ qty × unit_price            EmptyCart                     │
//! │  2. credit/mixed need a client            MissingClient                 │
//! │  3. mixed: 0 < cash < total               InvalidSplit                  │
//! │  4. balance + credit ≤ limit              CreditLimitExceeded           │
//! │  5. Σ qty per product ≤ stock             InsufficientStock             │
//! │      │                                                                  │
//! │      ▼                                                                  │
//! │  SalePlan { lines, split, stock deductions, commission }                │
//! │      │                                                                  │
//! │      ▼                                                                  │
//! │  mostrador-db::SaleProcessor  (steps 6-10, one transaction)             │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use ts_rs::TS;

use crate::commission::{plan_commission, CommissionPlan};
use crate::error::{CoreError, CoreResult, ValidationError};
use crate::ledger::check_credit;
use crate::money::Money;
use crate::types::{checked_lines_total, Client, LineItem, PaymentType, Product, Seller};
use crate::validation::{validate_line_count, validate_price_cents, validate_quantity};
use crate::MAX_SALE_TOTAL_CENTS;

// =============================================================================
// Request
// =============================================================================

/// One requested line: product, quantity and the price quoted to the buyer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct SaleRequestItem {
    pub product_id: String,
    pub quantity: i64,
    /// Price snapshot in cents, decoupled from the live catalog price.
    pub unit_price_cents: i64,
}

/// Input to `process_sale`.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct SaleRequest {
    pub items: Vec<SaleRequestItem>,
    pub client_id: Option<String>,
    pub seller_id: Option<String>,
    pub payment_type: PaymentType,
    /// Required for `mixed`; ignored otherwise.
    pub cash_amount_cents: Option<i64>,
}

impl SaleRequest {
    /// Distinct product ids in a stable order.
    pub fn product_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.items.iter().map(|i| i.product_id.clone()).collect();
        ids.sort();
        ids.dedup();
        ids
    }
}

// =============================================================================
// Plan
// =============================================================================

/// Everything `process_sale` will write, computed without I/O.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SalePlan {
    pub lines: Vec<LineItem>,
    pub total: Money,
    pub payment_type: PaymentType,
    pub cash_amount: Money,
    /// Credit portion charged to the client account.
    pub credit_amount: Money,
    /// Aggregated quantity per product, ordered by product id.
    pub stock_deductions: BTreeMap<String, i64>,
    pub commission: Option<CommissionPlan>,
}

/// Plans a sale.
///
/// ## Arguments
/// * `request` - the cart and payment plan
/// * `products` - current snapshots keyed by id
/// * `client` - the resolved client when `request.client_id` is set
/// * `seller` - the resolved seller when `request.seller_id` is set
///
/// ## Returns
/// * `Ok(SalePlan)` - every invariant holds against the snapshots
/// * `Err(CoreError)` - the first violated rule, in pipeline order
pub fn plan_sale(
    request: &SaleRequest,
    products: &HashMap<String, Product>,
    client: Option<&Client>,
    seller: Option<&Seller>,
) -> CoreResult<SalePlan> {
    // 1. Lines and total
    if request.items.is_empty() {
        return Err(CoreError::EmptyCart);
    }
    validate_line_count(request.items.len())?;

    let mut lines = Vec::with_capacity(request.items.len());
    let mut stock_deductions: BTreeMap<String, i64> = BTreeMap::new();

    for item in &request.items {
        validate_quantity(item.quantity)?;
        validate_price_cents(item.unit_price_cents)?;

        let product = products
            .get(&item.product_id)
            .filter(|p| p.is_enabled)
            .ok_or_else(|| CoreError::ProductUnavailable(item.product_id.clone()))?;

        lines.push(LineItem {
            product_id: product.id.clone(),
            name: product.name.clone(),
            unit_price_cents: item.unit_price_cents,
            quantity: item.quantity,
        });
        *stock_deductions.entry(product.id.clone()).or_insert(0) += item.quantity;
    }

    let total = sale_total(&lines)?;

    // 2. Client requirement
    let client = match (request.payment_type.uses_credit(), client) {
        (true, None) => {
            return Err(CoreError::MissingClient {
                payment_type: request.payment_type.to_string(),
            })
        }
        (_, c) => c,
    };

    // 3. Split
    let (cash_amount, credit_amount) = split_payment(request, total)?;

    // 4. Credit limit
    if let Some(client) = client {
        check_credit(client, credit_amount)?;
    }

    // 5. Stock
    for (product_id, requested) in &stock_deductions {
        let available = products.get(product_id).map(|p| p.stock).unwrap_or(0);
        if *requested > available {
            return Err(CoreError::InsufficientStock {
                product_id: product_id.clone(),
                available,
                requested: *requested,
            });
        }
    }

    let commission = seller.map(|s| plan_commission(s, total));

    Ok(SalePlan {
        lines,
        total,
        payment_type: request.payment_type,
        cash_amount,
        credit_amount,
        stock_deductions,
        commission,
    })
}

/// Σ line totals, rejecting any line or total above [`MAX_SALE_TOTAL_CENTS`].
pub(crate) fn sale_total(lines: &[LineItem]) -> CoreResult<Money> {
    let out_of_range = |field: &str| ValidationError::OutOfRange {
        field: field.to_string(),
        min: 0,
        max: MAX_SALE_TOTAL_CENTS,
    };

    for line in lines {
        match line.checked_line_total() {
            Some(t) if t.cents() <= MAX_SALE_TOTAL_CENTS => {}
            _ => return Err(out_of_range("line_total").into()),
        }
    }
    match checked_lines_total(lines) {
        Some(total) if total.cents() <= MAX_SALE_TOTAL_CENTS => Ok(total),
        _ => Err(out_of_range("total").into()),
    }
}

/// Returns `(cash, credit)` for the request's payment type.
fn split_payment(request: &SaleRequest, total: Money) -> CoreResult<(Money, Money)> {
    match request.payment_type {
        PaymentType::Cash => Ok((total, Money::zero())),
        PaymentType::Credit => Ok((Money::zero(), total)),
        PaymentType::Mixed => {
            let cash = Money::from_cents(request.cash_amount_cents.unwrap_or(0));
            if !cash.is_positive() || cash >= total {
                return Err(CoreError::InvalidSplit {
                    cash_amount: cash.cents(),
                    total: total.cents(),
                });
            }
            Ok((cash, total - cash))
        }
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn product(id: &str, price: i64, stock: i64) -> Product {
        Product {
            id: id.into(),
            name: format!("Product {}", id),
            price_cents: price,
            stock,
            is_enabled: true,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    fn catalog() -> HashMap<String, Product> {
        [product("p-1", 2500, 10), product("p-2", 5000, 1)]
            .into_iter()
            .map(|p| (p.id.clone(), p))
            .collect()
    }

    fn client(balance: i64, limit: i64) -> Client {
        Client {
            id: "c-1".into(),
            name: "Ferretería Sur".into(),
            phone: Some("351-555-0101".into()),
            tax_id: None,
            tax_category: None,
            credit_limit_cents: limit,
            balance_cents: balance,
            created_at: Utc::now(),
        }
    }

    fn request(payment_type: PaymentType, cash: Option<i64>) -> SaleRequest {
        // 4 × 2,500 = 10,000
        SaleRequest {
            items: vec![SaleRequestItem {
                product_id: "p-1".into(),
                quantity: 4,
                unit_price_cents: 2500,
            }],
            client_id: Some("c-1".into()),
            seller_id: None,
            payment_type,
            cash_amount_cents: cash,
        }
    }

    #[test]
    fn test_cash_sale_split() {
        let plan = plan_sale(&request(PaymentType::Cash, None), &catalog(), None, None).unwrap();
        assert_eq!(plan.total.cents(), 10000);
        assert_eq!(plan.cash_amount.cents(), 10000);
        assert!(plan.credit_amount.is_zero());
        assert_eq!(plan.stock_deductions.get("p-1"), Some(&4));
        assert_eq!(plan.lines[0].name, "Product p-1");
    }

    #[test]
    fn test_credit_sale_split() {
        let c = client(0, 20000);
        let plan =
            plan_sale(&request(PaymentType::Credit, None), &catalog(), Some(&c), None).unwrap();
        assert!(plan.cash_amount.is_zero());
        assert_eq!(plan.credit_amount.cents(), 10000);
    }

    #[test]
    fn test_mixed_sale_split() {
        let c = client(0, 20000);
        let plan = plan_sale(
            &request(PaymentType::Mixed, Some(4000)),
            &catalog(),
            Some(&c),
            None,
        )
        .unwrap();
        assert_eq!(plan.cash_amount.cents(), 4000);
        assert_eq!(plan.credit_amount.cents(), 6000);
        assert_eq!(plan.cash_amount + plan.credit_amount, plan.total);
    }

    #[test]
    fn test_empty_cart() {
        let mut req = request(PaymentType::Cash, None);
        req.items.clear();
        assert_eq!(
            plan_sale(&req, &catalog(), None, None),
            Err(CoreError::EmptyCart)
        );
    }

    #[test]
    fn test_missing_client() {
        let err = plan_sale(&request(PaymentType::Credit, None), &catalog(), None, None)
            .unwrap_err();
        assert!(matches!(err, CoreError::MissingClient { .. }));
    }

    #[test]
    fn test_credit_limit_exceeded() {
        // balance 0, limit 5,000, credit sale of 10,000
        let c = client(0, 5000);
        let err = plan_sale(&request(PaymentType::Credit, None), &catalog(), Some(&c), None)
            .unwrap_err();
        assert!(matches!(err, CoreError::CreditLimitExceeded { .. }));
    }

    #[test]
    fn test_invalid_split_bounds() {
        let c = client(0, 50000);
        for cash in [None, Some(0), Some(-1), Some(10000), Some(12000)] {
            let err = plan_sale(&request(PaymentType::Mixed, cash), &catalog(), Some(&c), None)
                .unwrap_err();
            assert!(
                matches!(err, CoreError::InvalidSplit { .. }),
                "cash {:?} gave {:?}",
                cash,
                err
            );
        }
    }

    #[test]
    fn test_stock_is_aggregated_per_product() {
        let req = SaleRequest {
            items: vec![
                SaleRequestItem {
                    product_id: "p-2".into(),
                    quantity: 1,
                    unit_price_cents: 5000,
                },
                SaleRequestItem {
                    product_id: "p-2".into(),
                    quantity: 1,
                    unit_price_cents: 5000,
                },
            ],
            client_id: None,
            seller_id: None,
            payment_type: PaymentType::Cash,
            cash_amount_cents: None,
        };
        let err = plan_sale(&req, &catalog(), None, None).unwrap_err();
        assert_eq!(
            err,
            CoreError::InsufficientStock {
                product_id: "p-2".into(),
                available: 1,
                requested: 2,
            }
        );
    }

    #[test]
    fn test_unknown_or_disabled_product() {
        let mut products = catalog();
        if let Some(p) = products.get_mut("p-1") {
            p.is_enabled = false;
        }
        let err = plan_sale(&request(PaymentType::Cash, None), &products, None, None).unwrap_err();
        assert_eq!(err, CoreError::ProductUnavailable("p-1".into()));
    }

    #[test]
    fn test_snapshot_price_wins_over_catalog() {
        let mut req = request(PaymentType::Cash, None);
        req.items[0].unit_price_cents = 2000;
        let plan = plan_sale(&req, &catalog(), None, None).unwrap();
        assert_eq!(plan.total.cents(), 8000);
        assert_eq!(plan.lines[0].unit_price_cents, 2000);
    }

    #[test]
    fn test_commission_planned_for_seller() {
        let seller = Seller {
            id: "s-1".into(),
            name: "Marta".into(),
            commission_rate_bps: 500,
            total_sales_cents: 0,
            total_commission_cents: 0,
            created_at: Utc::now(),
        };
        let plan = plan_sale(
            &request(PaymentType::Cash, None),
            &catalog(),
            None,
            Some(&seller),
        )
        .unwrap();
        let commission = plan.commission.unwrap();
        assert_eq!(commission.amount.cents(), 500);
        assert_eq!(commission.seller_id, "s-1");
    }

    fn single_line(quantity: i64, unit_price_cents: i64) -> SaleRequest {
        SaleRequest {
            items: vec![SaleRequestItem {
                product_id: "p-1".into(),
                quantity,
                unit_price_cents,
            }],
            client_id: None,
            seller_id: None,
            payment_type: PaymentType::Cash,
            cash_amount_cents: None,
        }
    }

    #[test]
    fn test_huge_unit_price_rejected_without_overflow() {
        let err = plan_sale(&single_line(3, i64::MAX / 2), &catalog(), None, None).unwrap_err();
        assert_eq!(
            err,
            CoreError::Validation(ValidationError::OutOfRange {
                field: "unit_price".into(),
                min: 0,
                max: crate::MAX_UNIT_PRICE_CENTS,
            })
        );
    }

    #[test]
    fn test_line_total_above_maximum_rejected() {
        // 11 × 99.999.999,99 exceeds the 999.999.999,99 ceiling
        let err = plan_sale(
            &single_line(11, crate::MAX_UNIT_PRICE_CENTS),
            &catalog(),
            None,
            None,
        )
        .unwrap_err();
        assert!(matches!(
            err,
            CoreError::Validation(ValidationError::OutOfRange { ref field, .. }) if field == "line_total"
        ));
    }

    #[test]
    fn test_sale_total_above_maximum_rejected() {
        let mut products = catalog();
        let items: Vec<SaleRequestItem> = (0..crate::MAX_SALE_LINES)
            .map(|n| {
                let p = product(&format!("big-{}", n), 0, 10);
                products.insert(p.id.clone(), p);
                SaleRequestItem {
                    product_id: format!("big-{}", n),
                    quantity: 9,
                    unit_price_cents: crate::MAX_UNIT_PRICE_CENTS,
                }
            })
            .collect();
        let req = SaleRequest {
            items,
            ..single_line(1, 0)
        };

        let err = plan_sale(&req, &products, None, None).unwrap_err();
        assert!(matches!(
            err,
            CoreError::Validation(ValidationError::OutOfRange { ref field, .. }) if field == "total"
        ));
    }

    #[test]
    fn test_line_count_capped_at_one_page() {
        let mut products = catalog();
        let items: Vec<SaleRequestItem> = (0..=crate::MAX_SALE_LINES)
            .map(|n| {
                let p = product(&format!("line-{}", n), 100, 5);
                products.insert(p.id.clone(), p);
                SaleRequestItem {
                    product_id: format!("line-{}", n),
                    quantity: 1,
                    unit_price_cents: 100,
                }
            })
            .collect();

        let mut req = SaleRequest {
            items,
            ..single_line(1, 0)
        };
        assert!(matches!(
            plan_sale(&req, &products, None, None),
            Err(CoreError::Validation(ValidationError::OutOfRange { .. }))
        ));

        req.items.pop();
        let plan = plan_sale(&req, &products, None, None).unwrap();
        assert_eq!(plan.lines.len(), crate::MAX_SALE_LINES);
        assert_eq!(plan.total.cents(), 100 * crate::MAX_SALE_LINES as i64);
    }
}
