//! Phone number normalization and validation.

use std::fmt;

use thiserror::Error;

use crate::config::PhoneConfig;

/// Why a phone number was rejected.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PhoneError {
    #[error("phone number is required")]
    Empty,

    #[error("phone number may only contain digits, got '{0}'")]
    NonDigit(char),

    #[error("phone number must have {min} to {max} digits, got {actual}")]
    Length {
        min: usize,
        max: usize,
        actual: usize,
    },

    #[error("phone number must start with country code {prefix}")]
    Prefix { prefix: String },
}

/// Acceptance predicate for phone numbers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PhoneRules {
    pub min_digits: usize,
    pub max_digits: usize,
    pub country_prefix: Option<String>,
}

impl PhoneRules {
    pub fn parse(&self, raw: &str) -> Result<PhoneNumber, PhoneError> {
        let mut digits = String::with_capacity(raw.len());
        for c in raw.trim().chars() {
            match c {
                '0'..='9' => digits.push(c),
                // Formatting characters people paste along with the number.
                ' ' | '-' | '.' | '(' | ')' => {}
                '+' if digits.is_empty() => {}
                other => return Err(PhoneError::NonDigit(other)),
            }
        }

        if digits.is_empty() {
            return Err(PhoneError::Empty);
        }

        let actual = digits.len();
        if actual < self.min_digits || actual > self.max_digits {
            return Err(PhoneError::Length {
                min: self.min_digits,
                max: self.max_digits,
                actual,
            });
        }

        if let Some(prefix) = &self.country_prefix {
            if !digits.starts_with(prefix.as_str()) {
                return Err(PhoneError::Prefix {
                    prefix: prefix.clone(),
                });
            }
        }

        Ok(PhoneNumber(digits))
    }
}

impl Default for PhoneRules {
    fn default() -> Self {
        Self::from(&PhoneConfig::default())
    }
}

impl From<&PhoneConfig> for PhoneRules {
    fn from(config: &PhoneConfig) -> Self {
        let prefix = config.country_prefix.trim();
        Self {
            min_digits: config.min_digits,
            max_digits: config.max_digits,
            country_prefix: (!prefix.is_empty()).then(|| prefix.to_string()),
        }
    }
}

/// A validated, digits-only phone number.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PhoneNumber(String);

impl PhoneNumber {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PhoneNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
