//! # Domain Identity Newtypes
//!
//! Newtype wrappers for the identifiers that travel on every document:
//! the taxpayer `Rut` and the `DocumentType` code. These prevent passing a
//! folio where a type code is expected, or an unchecked string where a
//! taxpayer id is expected.
//!
//! ## Security Invariant
//!
//! A `Rut` can only be constructed with a valid modulo-11 check digit.
//! A typo in an emitter or receiver id is caught before anything is
//! stamped or signed with it.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::IdentityError;

/// Chilean taxpayer identifier (RUT): a number plus a modulo-11 check digit.
///
/// Serializes as `NNNNNNNN-D` with no thousands separators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Rut {
    number: u32,
    check_digit: char,
}

impl Rut {
    /// Build a RUT from its number, computing the check digit.
    pub fn new(number: u32) -> Self {
        Self {
            number,
            check_digit: Self::compute_check_digit(number),
        }
    }

    /// Parse a RUT such as `76192083-9` or `76.192.083-9`.
    ///
    /// The check digit is case-insensitive (`k` and `K` are equivalent).
    pub fn parse(s: &str) -> Result<Self, IdentityError> {
        let cleaned: String = s.trim().chars().filter(|c| *c != '.').collect();
        let (number, dv) = cleaned
            .split_once('-')
            .ok_or_else(|| IdentityError::MalformedRut(s.to_string()))?;
        let number: u32 = number
            .parse()
            .map_err(|_| IdentityError::MalformedRut(s.to_string()))?;
        let mut dv_chars = dv.chars();
        let found = match (dv_chars.next(), dv_chars.next()) {
            (Some(c), None) => c.to_ascii_uppercase(),
            _ => return Err(IdentityError::MalformedRut(s.to_string())),
        };
        let expected = Self::compute_check_digit(number);
        if found != expected {
            return Err(IdentityError::CheckDigit {
                rut: s.to_string(),
                found,
                expected,
            });
        }
        Ok(Self {
            number,
            check_digit: expected,
        })
    }

    /// The numeric part, without check digit.
    pub fn number(&self) -> u32 {
        self.number
    }

    /// The check digit (`0`-`9` or `K`).
    pub fn check_digit(&self) -> char {
        self.check_digit
    }

    /// Modulo-11 check digit with the 2..=7 cyclic weight series.
    pub fn compute_check_digit(number: u32) -> char {
        let mut sum = 0u32;
        let mut weight = 2u32;
        let mut n = number;
        while n > 0 {
            sum += (n % 10) * weight;
            n /= 10;
            weight = if weight == 7 { 2 } else { weight + 1 };
        }
        match 11 - (sum % 11) {
            11 => '0',
            10 => 'K',
            d => char::from_digit(d, 10).unwrap_or('0'),
        }
    }
}

impl fmt::Display for Rut {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.number, self.check_digit)
    }
}

impl FromStr for Rut {
    type Err = IdentityError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl Serialize for Rut {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for Rut {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Self::parse(&s).map_err(serde::de::Error::custom)
    }
}

/// Authority document type code (e.g. 33 for an electronic invoice).
///
/// Which codes are supported, and how each one is stamped and batched, is
/// decided by the strategy registry in `dte-stamp`, not here.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DocumentType(pub u16);

impl DocumentType {
    /// Electronic invoice.
    pub const INVOICE: Self = Self(33);
    /// Tax-exempt electronic invoice.
    pub const EXEMPT_INVOICE: Self = Self(34);
    /// Electronic receipt.
    pub const RECEIPT: Self = Self(39);
    /// Tax-exempt electronic receipt.
    pub const EXEMPT_RECEIPT: Self = Self(41);
    /// Electronic invoice settlement.
    pub const SETTLEMENT: Self = Self(43);
    /// Electronic purchase invoice.
    pub const PURCHASE_INVOICE: Self = Self(46);
    /// Electronic dispatch guide.
    pub const DISPATCH_GUIDE: Self = Self(52);
    /// Electronic debit note.
    pub const DEBIT_NOTE: Self = Self(56);
    /// Electronic credit note.
    pub const CREDIT_NOTE: Self = Self(61);
    /// Electronic export invoice.
    pub const EXPORT_INVOICE: Self = Self(110);
    /// Electronic export debit note.
    pub const EXPORT_DEBIT_NOTE: Self = Self(111);
    /// Electronic export credit note.
    pub const EXPORT_CREDIT_NOTE: Self = Self(112);

    /// The numeric code.
    pub fn code(&self) -> u16 {
        self.0
    }

    /// Parse a type code from its decimal text form.
    pub fn parse(s: &str) -> Result<Self, IdentityError> {
        match s.trim().parse::<u16>() {
            Ok(code) if code > 0 => Ok(Self(code)),
            _ => Err(IdentityError::MalformedDocumentType(s.to_string())),
        }
    }
}

impl fmt::Display for DocumentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
