use std::fmt;

use crate::domain::OrderNumber;

pub const ORDER_NUMBER_MIN_LEN: usize = 2;
pub const ORDER_NUMBER_MAX_LEN: usize = 255;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    pub field: &'static str,
    pub message: String,
}

impl ValidationError {
    pub fn new(field: &'static str, message: impl Into<String>) -> Self {
        Self {
            field,
            message: message.into(),
        }
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

impl std::error::Error for ValidationError {}

pub type ValidationResult<T = ()> = Result<T, ValidationError>;

/// Removes every whitespace character, so `"2546 1716"` and `"25461716"` are the same number.
pub fn strip_whitespace(value: &str) -> String {
    value.chars().filter(|ch| !ch.is_whitespace()).collect()
}

/// Luhn check over an order number.
///
/// Whitespace is ignored. Anything else that is not an ASCII digit makes the
/// number invalid, as does a length below two digits.
pub fn is_valid_order_number(number: &str) -> bool {
    let digits = strip_whitespace(number);
    if digits.len() < ORDER_NUMBER_MIN_LEN {
        return false;
    }

    let mut sum = 0u32;
    let mut double = false;
    for ch in digits.chars().rev() {
        let Some(mut digit) = ch.to_digit(10) else {
            return false;
        };

        if double {
            digit *= 2;
            if digit > 9 {
                digit -= 9;
            }
        }

        sum += digit;
        double = !double;
    }

    sum % 10 == 0
}

pub fn validate_order_number(number: &str) -> ValidationResult<OrderNumber> {
    let normalized = strip_whitespace(number);
    if normalized.is_empty() {
        return Err(ValidationError::new("order", "must not be empty"));
    }

    if normalized.len() > ORDER_NUMBER_MAX_LEN {
        return Err(ValidationError::new(
            "order",
            format!("must be at most {} digits", ORDER_NUMBER_MAX_LEN),
        ));
    }

    if !is_valid_order_number(&normalized) {
        return Err(ValidationError::new("order", "failed the Luhn check"));
    }

    Ok(OrderNumber::new_unchecked(normalized))
}
