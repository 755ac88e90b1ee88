//! Value objects: equality by value, not identity.

use serde::{Deserialize, Serialize};

use crate::error::{DomainError, DomainResult};

/// Marker trait for value objects.
///
/// Value objects are **immutable** and **compared by value**; two instances
/// holding the same values are the same thing. Construction is where they
/// validate, so a value object that exists is always valid.
pub trait ValueObject: Clone + PartialEq + core::fmt::Debug {}

/// A strictly positive, finite quantity in tonnes.
#[derive(Debug, Copy, Clone, PartialEq, PartialOrd, Serialize, Deserialize)]
#[serde(try_from = "f64", into = "f64")]
pub struct Tonnes(f64);

impl Tonnes {
    pub fn new(value: f64) -> DomainResult<Self> {
        if !value.is_finite() {
            return Err(DomainError::invalid_argument("tonnes must be a finite number"));
        }
        if value <= 0.0 {
            return Err(DomainError::invalid_argument("tonnes must be greater than zero"));
        }
        Ok(Self(value))
    }

    pub fn value(self) -> f64 {
        self.0
    }
}

impl ValueObject for Tonnes {}

impl TryFrom<f64> for Tonnes {
    type Error = DomainError;

    fn try_from(value: f64) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<Tonnes> for f64 {
    fn from(value: Tonnes) -> Self {
        value.0
    }
}

impl core::fmt::Display for Tonnes {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{} t", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_zero_negative_and_non_finite() {
        assert!(Tonnes::new(0.0).is_err());
        assert!(Tonnes::new(-1.5).is_err());
        assert!(Tonnes::new(f64::NAN).is_err());
        assert!(Tonnes::new(f64::INFINITY).is_err());
        assert_eq!(Tonnes::new(2.5).unwrap().value(), 2.5);
    }

    #[test]
    fn deserialization_validates() {
        let ok: Tonnes = serde_json::from_str("3").unwrap();
        assert_eq!(ok.value(), 3.0);
        assert!(serde_json::from_str::<Tonnes>("0").is_err());
        assert_eq!(serde_json::to_string(&ok).unwrap(), "3.0");
    }
}
