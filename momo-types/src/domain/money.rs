//! Type-safe monetary value with embedded currency.

use serde::{Deserialize, Serialize};
use std::fmt;
use utoipa::ToSchema;

use crate::error::DomainError;

/// Currencies settled by the supported mobile-money networks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "UPPERCASE")]
pub enum Currency {
    ZMW,
    UGX,
    GHS,
    RWF,
    XAF,
    XOF,
    KES,
    TZS,
    EUR,
    USD,
}

impl Currency {
    /// Returns the number of decimal places for this currency.
    pub fn decimal_places(&self) -> u8 {
        match self {
            Currency::UGX | Currency::RWF | Currency::XAF | Currency::XOF => 0,
            Currency::ZMW
            | Currency::GHS
            | Currency::KES
            | Currency::TZS
            | Currency::EUR
            | Currency::USD => 2,
        }
    }

    /// Returns the ISO code.
    pub fn code(&self) -> &'static str {
        match self {
            Currency::ZMW => "ZMW",
            Currency::UGX => "UGX",
            Currency::GHS => "GHS",
            Currency::RWF => "RWF",
            Currency::XAF => "XAF",
            Currency::XOF => "XOF",
            Currency::KES => "KES",
            Currency::TZS => "TZS",
            Currency::EUR => "EUR",
            Currency::USD => "USD",
        }
    }
}

impl fmt::Display for Currency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

impl std::str::FromStr for Currency {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "ZMW" => Ok(Currency::ZMW),
            "UGX" => Ok(Currency::UGX),
            "GHS" => Ok(Currency::GHS),
            "RWF" => Ok(Currency::RWF),
            "XAF" => Ok(Currency::XAF),
            "XOF" => Ok(Currency::XOF),
            "KES" => Ok(Currency::KES),
            "TZS" => Ok(Currency::TZS),
            "EUR" => Ok(Currency::EUR),
            "USD" => Ok(Currency::USD),
            other => Err(DomainError::ValidationError(format!(
                "Unknown currency: {}",
                other
            ))),
        }
    }
}

/// Type-safe money representation with embedded currency.
///
/// Amount is stored in the smallest unit of the currency (ngwee, cents, etc.)
/// to avoid floating-point precision issues.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Money {
    amount: i64,
    currency: Currency,
}

impl Money {
    /// Creates a new Money value.
    pub fn new(amount: i64, currency: Currency) -> Result<Self, DomainError> {
        if amount < 0 {
            return Err(DomainError::NegativeAmount);
        }
        Ok(Self { amount, currency })
    }

    /// Returns the amount in smallest currency unit.
    pub fn amount(&self) -> i64 {
        self.amount
    }

    /// Returns the currency.
    pub fn currency(&self) -> Currency {
        self.currency
    }

    /// Checks that another amount is in the same currency and equal.
    pub fn matches(&self, other: &Money) -> Result<bool, DomainError> {
        if self.currency != other.currency {
            return Err(DomainError::CurrencyMismatch {
                expected: self.currency,
                got: other.currency,
            });
        }
        Ok(self.amount == other.amount)
    }
}

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.currency.decimal_places() {
            0 => write!(f, "{} {}", self.currency, self.amount),
            _ => {
                let major = self.amount / 100;
                let minor = (self.amount % 100).abs();
                write!(f, "{} {}.{:02}", self.currency, major, minor)
            }
        }
    }
}
