//! # Checkout Model
//!
//! Readiness rules for leaving the cart, payment method selection and card
//! form validation. Nothing here talks to a payment provider.
//!
//! ## Checkout Flow
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        Checkout Flow                                    │
//! │                                                                         │
//! │  Cart ──► check_ready() ──► PaymentMethod ──► form()                    │
//! │             │                   │               │                       │
//! │             └── EmptyCart       │               ├── Card                │
//! │                                 │               ├── Upi                 │
//! │                                 │               └── Instructions        │
//! │                                 ▼                                       │
//! │                      check_payment(method, card)                        │
//! │                        └── PaymentDetails (card form invalid)           │
//! │                                                                         │
//! │  pay_label(total) drives the pay button text                            │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use ts_rs::TS;

use crate::cart::Cart;
use crate::error::{CheckoutError, ValidationError};
use crate::money::Money;

/// Shortest accepted card number (digits, spaces ignored).
pub const MIN_CARD_NUMBER_DIGITS: usize = 13;
pub const MIN_CVV_DIGITS: usize = 3;
pub const MIN_HOLDER_NAME_LEN: usize = 2;

// =============================================================================
// Readiness
// =============================================================================

/// Checks that the cart can proceed to payment.
pub fn check_ready(cart: &Cart) -> Result<(), CheckoutError> {
    if cart.is_empty() {
        return Err(CheckoutError::EmptyCart);
    }
    Ok(())
}

/// Checks the details submitted for `method`. Only card payments collect
/// details that can be checked before paying; other methods pass.
pub fn check_payment(
    method: PaymentMethod,
    card: Option<&CardDetails>,
) -> Result<(), CheckoutError> {
    if !method.validates_details() {
        return Ok(());
    }

    match card {
        Some(details) => Ok(details.validate()?),
        None => Err(required("card details").into()),
    }
}

// =============================================================================
// Payment Method
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[serde(rename_all = "snake_case")]
#[ts(export)]
pub enum PaymentMethod {
    Card,
    Upi,
    Paypal,
    ApplePay,
    BankTransfer,
    Wallet,
    Cod,
    Crypto,
}

/// Which form the payment page shows for a method.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, TS)]
#[serde(tag = "form", rename_all = "snake_case")]
#[ts(export)]
pub enum PaymentForm {
    Card,
    Upi,
    Instructions { title: String, text: String },
}

impl PaymentMethod {
    pub const ALL: [PaymentMethod; 8] = [
        PaymentMethod::Card,
        PaymentMethod::Upi,
        PaymentMethod::Paypal,
        PaymentMethod::ApplePay,
        PaymentMethod::BankTransfer,
        PaymentMethod::Wallet,
        PaymentMethod::Cod,
        PaymentMethod::Crypto,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentMethod::Card => "card",
            PaymentMethod::Upi => "upi",
            PaymentMethod::Paypal => "paypal",
            PaymentMethod::ApplePay => "apple_pay",
            PaymentMethod::BankTransfer => "bank_transfer",
            PaymentMethod::Wallet => "wallet",
            PaymentMethod::Cod => "cod",
            PaymentMethod::Crypto => "crypto",
        }
    }

    /// Whether details entered on the page must validate before paying.
    pub fn validates_details(&self) -> bool {
        matches!(self, PaymentMethod::Card)
    }

    pub fn form(&self) -> PaymentForm {
        let text = match self {
            PaymentMethod::Card => return PaymentForm::Card,
            PaymentMethod::Upi => return PaymentForm::Upi,
            PaymentMethod::Paypal => "You will be redirected to PayPal to complete your payment.",
            PaymentMethod::ApplePay => "Use Apple Pay on your device to complete the payment.",
            PaymentMethod::BankTransfer => {
                "Transfer the amount to our bank account. Details will be provided after order confirmation."
            }
            PaymentMethod::Wallet => "Select your preferred digital wallet to complete the payment.",
            PaymentMethod::Cod => "You can pay in cash when the service is completed.",
            PaymentMethod::Crypto => {
                "You will receive cryptocurrency payment details after order confirmation."
            }
        };

        PaymentForm::Instructions {
            title: format!("{} Payment", self.as_str().replace('_', " ").to_uppercase()),
            text: text.to_string(),
        }
    }

    /// Text of the pay button.
    ///
    /// ```rust
    /// use mech_core::checkout::PaymentMethod;
    /// use mech_core::money::Money;
    ///
    /// assert_eq!(PaymentMethod::Card.pay_label(Money::from_cents(5400)), "Pay $54.00");
    /// assert_eq!(PaymentMethod::Cod.pay_label(Money::from_cents(5400)), "Cash on Delivery");
    /// ```
    pub fn pay_label(&self, total: Money) -> String {
        match self {
            PaymentMethod::Card => format!("Pay {}", total),
            PaymentMethod::Upi => "Pay with UPI".to_string(),
            PaymentMethod::Paypal => "Pay with PayPal".to_string(),
            PaymentMethod::ApplePay => "Pay with Apple Pay".to_string(),
            PaymentMethod::BankTransfer => "Bank Transfer".to_string(),
            PaymentMethod::Wallet => "Pay with Wallet".to_string(),
            PaymentMethod::Cod => "Cash on Delivery".to_string(),
            PaymentMethod::Crypto => "Pay with Crypto".to_string(),
        }
    }
}

impl fmt::Display for PaymentMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PaymentMethod {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_ascii_lowercase();
        PaymentMethod::ALL
            .into_iter()
            .find(|m| m.as_str() == wanted)
            .ok_or_else(|| ValidationError::InvalidFormat {
                field: "payment method".to_string(),
                reason: format!("unknown method '{}'", s.trim()),
            })
    }
}

// =============================================================================
// Card Details
// =============================================================================

/// Raw card form input.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct CardDetails {
    pub number: String,
    pub expiry: String,
    pub cvv: String,
    pub holder_name: String,
}

impl CardDetails {
    /// Validates the card form. The first failing field is reported.
    pub fn validate(&self) -> Result<(), ValidationError> {
        let number: String = self.number.chars().filter(|c| !c.is_whitespace()).collect();
        if number.is_empty() {
            return Err(required("card number"));
        }
        if !number.chars().all(|c| c.is_ascii_digit()) {
            return Err(ValidationError::InvalidFormat {
                field: "card number".to_string(),
                reason: "digits only".to_string(),
            });
        }
        if number.len() < MIN_CARD_NUMBER_DIGITS {
            return Err(ValidationError::TooShort {
                field: "card number".to_string(),
                min: MIN_CARD_NUMBER_DIGITS,
            });
        }

        validate_expiry(&self.expiry)?;

        if self.cvv.is_empty() {
            return Err(required("CVV"));
        }
        if self.cvv.len() < MIN_CVV_DIGITS || !self.cvv.chars().all(|c| c.is_ascii_digit()) {
            return Err(ValidationError::TooShort {
                field: "CVV".to_string(),
                min: MIN_CVV_DIGITS,
            });
        }

        let name = self.holder_name.trim();
        if name.is_empty() {
            return Err(required("cardholder name"));
        }
        if name.chars().count() < MIN_HOLDER_NAME_LEN {
            return Err(ValidationError::TooShort {
                field: "cardholder name".to_string(),
                min: MIN_HOLDER_NAME_LEN,
            });
        }

        Ok(())
    }
}

fn required(field: &str) -> ValidationError {
    ValidationError::Required {
        field: field.to_string(),
    }
}

/// `MM/YY`, month 01-12.
fn validate_expiry(expiry: &str) -> Result<(), ValidationError> {
    if expiry.is_empty() {
        return Err(required("expiry date"));
    }

    let bytes = expiry.as_bytes();
    let shaped = bytes.len() == 5
        && bytes[2] == b'/'
        && bytes
            .iter()
            .enumerate()
            .all(|(i, b)| i == 2 || b.is_ascii_digit());
    if !shaped {
        return Err(ValidationError::InvalidFormat {
            field: "expiry date".to_string(),
            reason: "expected MM/YY".to_string(),
        });
    }

    let month: i64 = expiry[..2].parse().unwrap_or(0);
    if !(1..=12).contains(&month) {
        return Err(ValidationError::OutOfRange {
            field: "expiry month".to_string(),
            min: 1,
            max: 12,
        });
    }

    Ok(())
}

// =============================================================================
// Input Normalisers
// =============================================================================

/// Keeps digits and groups them by four: `"4242424242"` → `"4242 4242 42"`.
pub fn format_card_number(input: &str) -> String {
    let digits: Vec<char> = input.chars().filter(char::is_ascii_digit).collect();
    digits
        .chunks(4)
        .map(|group| group.iter().collect::<String>())
        .collect::<Vec<_>>()
        .join(" ")
}

/// Keeps digits and inserts the slash: `"1227"` → `"12/27"`.
pub fn format_expiry(input: &str) -> String {
    let digits: String = input.chars().filter(char::is_ascii_digit).collect();
    if digits.len() < 2 {
        return digits;
    }
    let year: String = digits[2..].chars().take(2).collect();
    format!("{}/{}", &digits[..2], year)
}

pub fn format_cvv(input: &str) -> String {
    input.chars().filter(char::is_ascii_digit).collect()
}

/// Letters and whitespace only.
pub fn format_holder_name(input: &str) -> String {
    input
        .chars()
        .filter(|c| c.is_ascii_alphabetic() || c.is_whitespace())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::money::UnitPrice;
    use crate::types::NewLineItem;

    fn card() -> CardDetails {
        CardDetails {
            number: "4242 4242 4242 4242".to_string(),
            expiry: "12/27".to_string(),
            cvv: "123".to_string(),
            holder_name: "Ada Lovelace".to_string(),
        }
    }

    #[test]
    fn test_empty_cart_not_ready() {
        assert_eq!(check_ready(&Cart::default()), Err(CheckoutError::EmptyCart));
    }

    #[test]
    fn test_cart_with_items_ready() {
        let mut cart = Cart::default();
        cart.add_item(NewLineItem::new("A", UnitPrice::from_cents(100), 1, 1))
            .unwrap();
        assert!(check_ready(&cart).is_ok());
    }

    #[test]
    fn test_check_payment() {
        assert!(check_payment(PaymentMethod::Card, Some(&card())).is_ok());
        assert!(check_payment(PaymentMethod::Cod, None).is_ok());
        assert!(check_payment(PaymentMethod::Upi, None).is_ok());

        assert!(matches!(
            check_payment(PaymentMethod::Card, None),
            Err(CheckoutError::PaymentDetails(ValidationError::Required { .. }))
        ));

        let bad = CardDetails {
            cvv: "1".to_string(),
            ..card()
        };
        assert!(matches!(
            check_payment(PaymentMethod::Card, Some(&bad)),
            Err(CheckoutError::PaymentDetails(ValidationError::TooShort { .. }))
        ));
    }

    #[test]
    fn test_payment_method_parse() {
        assert_eq!("apple_pay".parse::<PaymentMethod>().unwrap(), PaymentMethod::ApplePay);
        assert_eq!(" CARD ".parse::<PaymentMethod>().unwrap(), PaymentMethod::Card);
        assert!("cheque".parse::<PaymentMethod>().is_err());
    }

    #[test]
    fn test_payment_forms() {
        assert_eq!(PaymentMethod::Card.form(), PaymentForm::Card);
        assert_eq!(PaymentMethod::Upi.form(), PaymentForm::Upi);
        match PaymentMethod::BankTransfer.form() {
            PaymentForm::Instructions { title, text } => {
                assert_eq!(title, "BANK TRANSFER Payment");
                assert!(text.starts_with("Transfer the amount"));
            }
            other => panic!("unexpected form: {:?}", other),
        }
        assert!(PaymentMethod::Card.validates_details());
        assert!(!PaymentMethod::Upi.validates_details());
    }

    #[test]
    fn test_pay_labels() {
        let total = Money::from_cents(5400);
        assert_eq!(PaymentMethod::Card.pay_label(total), "Pay $54.00");
        assert_eq!(PaymentMethod::Paypal.pay_label(total), "Pay with PayPal");
        assert_eq!(PaymentMethod::Crypto.pay_label(total), "Pay with Crypto");
    }

    #[test]
    fn test_valid_card() {
        assert!(card().validate().is_ok());
    }

    #[test]
    fn test_card_number_too_short() {
        let details = CardDetails {
            number: "4242 4242 42".to_string(),
            ..card()
        };
        assert!(matches!(
            details.validate(),
            Err(ValidationError::TooShort { min: 13, .. })
        ));
    }

    #[test]
    fn test_bad_expiry() {
        for expiry in ["", "1227", "12-27", "1/27"] {
            let details = CardDetails {
                expiry: expiry.to_string(),
                ..card()
            };
            assert!(details.validate().is_err(), "accepted {:?}", expiry);
        }

        let details = CardDetails {
            expiry: "13/27".to_string(),
            ..card()
        };
        assert!(matches!(details.validate(), Err(ValidationError::OutOfRange { .. })));
    }

    #[test]
    fn test_bad_cvv_and_name() {
        let details = CardDetails {
            cvv: "12".to_string(),
            ..card()
        };
        assert!(details.validate().is_err());

        let details = CardDetails {
            holder_name: "A".to_string(),
            ..card()
        };
        assert!(details.validate().is_err());
    }

    #[test]
    fn test_input_normalisers() {
        assert_eq!(format_card_number("4242-4242 4242x4242"), "4242 4242 4242 4242");
        assert_eq!(format_card_number("42424"), "4242 4");
        assert_eq!(format_expiry("1"), "1");
        assert_eq!(format_expiry("12"), "12/");
        assert_eq!(format_expiry("12/275"), "12/27");
        assert_eq!(format_cvv("1a2b3"), "123");
        assert_eq!(format_holder_name("Ada L0velace!"), "Ada Lvelace");
    }
}
