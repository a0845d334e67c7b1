//! # Validation Module
//!
//! Input validation for requests entering the engine.
//!
//! ## Validation Layers
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  Layer 1: HTTP handler      - JSON shape (serde)                        │
//! │  Layer 2: THIS MODULE       - field rules (quantity, price, tax id)     │
//! │  Layer 3: sale/order plans  - business rules (credit, stock, split)     │
//! │  Layer 4: SQLite            - CHECK / UNIQUE / FOREIGN KEY constraints  │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use crate::error::ValidationError;
use crate::{MAX_ITEM_QUANTITY, MAX_SALE_LINES, MAX_UNIT_PRICE_CENTS};

/// Result type for validation operations.
pub type ValidationResult<T> = Result<T, ValidationError>;

// =============================================================================
// Numeric Validators
// =============================================================================

/// Validates a line quantity.
///
/// ## Rules
/// - Must be positive (> 0)
/// - Must not exceed [`MAX_ITEM_QUANTITY`]
pub fn validate_quantity(qty: i64) -> ValidationResult<()> {
    if qty <= 0 {
        return Err(ValidationError::MustBePositive {
            field: "quantity".to_string(),
        });
    }

    if qty > MAX_ITEM_QUANTITY {
        return Err(ValidationError::OutOfRange {
            field: "quantity".to_string(),
            min: 1,
            max: MAX_ITEM_QUANTITY,
        });
    }

    Ok(())
}

/// Validates a price in cents. Zero is allowed (free items), anything above
/// [`MAX_UNIT_PRICE_CENTS`] is not.
///
/// ## Example
/// ```rust
/// use mostrador_core::validation::validate_price_cents;
///
/// assert!(validate_price_cents(1099).is_ok());
/// assert!(validate_price_cents(0).is_ok());
/// assert!(validate_price_cents(-100).is_err());
/// assert!(validate_price_cents(i64::MAX / 2).is_err());
/// ```
pub fn validate_price_cents(cents: i64) -> ValidationResult<()> {
    if !(0..=MAX_UNIT_PRICE_CENTS).contains(&cents) {
        return Err(ValidationError::OutOfRange {
            field: "unit_price".to_string(),
            min: 0,
            max: MAX_UNIT_PRICE_CENTS,
        });
    }

    Ok(())
}

/// Validates an amount that must be strictly positive (payments).
pub fn validate_positive_amount(field: &str, cents: i64) -> ValidationResult<()> {
    if cents <= 0 {
        return Err(ValidationError::MustBePositive {
            field: field.to_string(),
        });
    }

    Ok(())
}

/// Validates the number of lines on a sale or order.
pub fn validate_line_count(lines: usize) -> ValidationResult<()> {
    if lines > MAX_SALE_LINES {
        return Err(ValidationError::OutOfRange {
            field: "items".to_string(),
            min: 1,
            max: MAX_SALE_LINES as i64,
        });
    }

    Ok(())
}

/// Validates a point-of-sale number (1..=99999, five printed digits).
pub fn validate_point_of_sale(pos: u32) -> ValidationResult<()> {
    if pos == 0 || pos > 99_999 {
        return Err(ValidationError::OutOfRange {
            field: "point_of_sale".to_string(),
            min: 1,
            max: 99_999,
        });
    }

    Ok(())
}

// =============================================================================
// String Validators
// =============================================================================

/// Validates a non-empty free-text field with a maximum length.
pub fn validate_text(field: &str, value: &str, max: usize) -> ValidationResult<()> {
    let value = value.trim();

    if value.is_empty() {
        return Err(ValidationError::Required {
            field: field.to_string(),
        });
    }

    if value.chars().count() > max {
        return Err(ValidationError::TooLong {
            field: field.to_string(),
            max,
        });
    }

    Ok(())
}

/// Strips separators from a tax id, keeping only digits.
///
/// ```rust
/// use mostrador_core::validation::normalize_tax_id;
///
/// assert_eq!(normalize_tax_id("20-12345678-6"), "20123456786");
/// ```
pub fn normalize_tax_id(raw: &str) -> String {
    raw.chars().filter(|c| c.is_ascii_digit()).collect()
}

/// Validates an 11-digit CUIT including its mod-11 check digit.
///
/// ## Algorithm
/// ```text
/// weights:  5 4 3 2 7 6 5 4 3 2
/// sum    = Σ digit[i] × weight[i]
/// check  = 11 − (sum mod 11)    (11 → 0, 10 → invalid)
/// ```
pub fn validate_cuit(raw: &str) -> ValidationResult<()> {
    const WEIGHTS: [u32; 10] = [5, 4, 3, 2, 7, 6, 5, 4, 3, 2];

    let digits: Vec<u32> = normalize_tax_id(raw)
        .chars()
        .filter_map(|c| c.to_digit(10))
        .collect();

    if digits.len() != 11 {
        return Err(ValidationError::InvalidFormat {
            field: "tax_id".to_string(),
            reason: "must have 11 digits".to_string(),
        });
    }

    let sum: u32 = digits
        .iter()
        .zip(WEIGHTS.iter())
        .map(|(d, w)| d * w)
        .sum();
    let check = match 11 - (sum % 11) {
        11 => 0,
        10 => {
            return Err(ValidationError::InvalidFormat {
                field: "tax_id".to_string(),
                reason: "check digit cannot be computed".to_string(),
            })
        }
        n => n,
    };

    if digits[10] != check {
        return Err(ValidationError::InvalidFormat {
            field: "tax_id".to_string(),
            reason: "check digit mismatch".to_string(),
        });
    }

    Ok(())
}

// =============================================================================
// UUID Validators
// =============================================================================

/// Validates a UUID string.
///
/// ## Example
/// ```rust
/// use mostrador_core::validation::validate_uuid;
///
/// assert!(validate_uuid("550e8400-e29b-41d4-a716-446655440000").is_ok());
/// assert!(validate_uuid("not-a-uuid").is_err());
/// ```
pub fn validate_uuid(id: &str) -> ValidationResult<()> {
    if id.trim().is_empty() {
        return Err(ValidationError::Required {
            field: "id".to_string(),
        });
    }

    uuid::Uuid::parse_str(id).map_err(|_| ValidationError::InvalidFormat {
        field: "id".to_string(),
        reason: "must be a valid UUID".to_string(),
    })?;

    Ok(())
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_quantity() {
        assert!(validate_quantity(1).is_ok());
        assert!(validate_quantity(MAX_ITEM_QUANTITY).is_ok());

        assert!(validate_quantity(0).is_err());
        assert!(validate_quantity(-1).is_err());
        assert!(validate_quantity(MAX_ITEM_QUANTITY + 1).is_err());
    }

    #[test]
    fn test_validate_price_cents() {
        assert!(validate_price_cents(0).is_ok());
        assert!(validate_price_cents(1099).is_ok());
        assert!(validate_price_cents(-100).is_err());
        assert!(validate_price_cents(crate::MAX_UNIT_PRICE_CENTS).is_ok());
        assert!(validate_price_cents(crate::MAX_UNIT_PRICE_CENTS + 1).is_err());
    }

    #[test]
    fn test_validate_cuit() {
        // 20-12345678-6: sum = 2*5+0*4+1*3+2*2+3*7+4*6+5*5+6*4+7*3+8*2 = 148
        // 148 mod 11 = 5, check = 6
        assert!(validate_cuit("20-12345678-6").is_ok());
        assert!(validate_cuit("20123456786").is_ok());
        assert!(validate_cuit("20-12345678-5").is_err());
        assert!(validate_cuit("12345678").is_err());
    }

    #[test]
    fn test_validate_text() {
        assert!(validate_text("address", "Av. Siempreviva 742", 200).is_ok());
        assert!(validate_text("address", "   ", 200).is_err());
        assert!(validate_text("address", &"a".repeat(201), 200).is_err());
    }

    #[test]
    fn test_validate_point_of_sale() {
        assert!(validate_point_of_sale(1).is_ok());
        assert!(validate_point_of_sale(0).is_err());
        assert!(validate_point_of_sale(100_000).is_err());
    }

    #[test]
    fn test_validate_uuid() {
        assert!(validate_uuid("550e8400-e29b-41d4-a716-446655440000").is_ok());
        assert!(validate_uuid("").is_err());
        assert!(validate_uuid("123").is_err());
    }
}
