//! Value objects for the Customer context.

use std::fmt;

use keel_core::error::DomainError;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// A syntactically plausible email address.
///
/// The `Default` value is empty and only exists so that zero-value commands
/// can be represented; [`EmailAddress::new`] never produces it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EmailAddress(String);

impl EmailAddress {
    /// Validates and wraps an email address. Surrounding whitespace is
    /// trimmed.
    ///
    /// # Errors
    ///
    /// Returns `InputInvalid` if the address is empty or not of the form
    /// `local@domain`.
    pub fn new(value: &str) -> Result<Self, DomainError> {
        let value = value.trim();
        if value.is_empty() {
            return Err(DomainError::input_invalid("email address must not be empty"));
        }
        match value.split_once('@') {
            Some((local, domain))
                if !local.is_empty() && !domain.is_empty() && !domain.contains('@') =>
            {
                Ok(Self(value.to_owned()))
            }
            _ => Err(DomainError::input_invalid(format!(
                "email address {value:?} is not valid"
            ))),
        }
    }

    /// Borrows the address.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for EmailAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A person's given and family name.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PersonName {
    given_name: String,
    family_name: String,
}

impl PersonName {
    /// Validates and wraps a name.
    ///
    /// # Errors
    ///
    /// Returns `InputInvalid` if either part is blank.
    pub fn new(given_name: &str, family_name: &str) -> Result<Self, DomainError> {
        let given_name = given_name.trim();
        let family_name = family_name.trim();
        if given_name.is_empty() {
            return Err(DomainError::input_invalid("given name must not be empty"));
        }
        if family_name.is_empty() {
            return Err(DomainError::input_invalid("family name must not be empty"));
        }
        Ok(Self {
            given_name: given_name.to_owned(),
            family_name: family_name.to_owned(),
        })
    }

    /// Wraps a name read back from a stored event. Stored names were
    /// validated when the event was decoded.
    pub(crate) fn restore(given_name: &str, family_name: &str) -> Self {
        Self {
            given_name: given_name.to_owned(),
            family_name: family_name.to_owned(),
        }
    }

    /// The given name.
    #[must_use]
    pub fn given_name(&self) -> &str {
        &self.given_name
    }

    /// The family name.
    #[must_use]
    pub fn family_name(&self) -> &str {
        &self.family_name
    }
}

/// Secret a customer presents to confirm an email address.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConfirmationHash(String);

impl ConfirmationHash {
    /// Generates a fresh hash: SHA-256 of 32 random bytes, as 64 lowercase
    /// hex characters.
    #[must_use]
    pub fn generate() -> Self {
        let seed: [u8; 32] = rand::random();
        Self(format!("{:x}", Sha256::digest(seed)))
    }

    /// Wraps a hash supplied by a customer. Any non-blank value is accepted;
    /// whether it matches is for the aggregate to decide.
    ///
    /// # Errors
    ///
    /// Returns `InputInvalid` if `value` is blank.
    pub fn new(value: &str) -> Result<Self, DomainError> {
        let value = value.trim();
        if value.is_empty() {
            return Err(DomainError::input_invalid("confirmation hash must not be empty"));
        }
        Ok(Self(value.to_owned()))
    }

    /// Borrows the hash.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ConfirmationHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use keel_core::error::ErrorKind;

    use super::*;

    #[test]
    fn test_email_address_is_trimmed() {
        let email = EmailAddress::new("  fiona@gallagher.net ").unwrap();

        assert_eq!(email.as_str(), "fiona@gallagher.net");
    }

    #[test]
    fn test_email_address_rejects_malformed_input() {
        for input in ["", "   ", "fiona", "@gallagher.net", "fiona@", "a@b@c"] {
            let err = EmailAddress::new(input).unwrap_err();
            assert!(err.is(ErrorKind::InputInvalid), "{input:?} was accepted");
        }
    }

    #[test]
    fn test_person_name_requires_both_parts() {
        assert!(PersonName::new("Fiona", "").unwrap_err().is(ErrorKind::InputInvalid));
        assert!(PersonName::new(" ", "Gallagher").unwrap_err().is(ErrorKind::InputInvalid));
        assert_eq!(PersonName::new("Fiona", "Gallagher").unwrap().family_name(), "Gallagher");
    }

    #[test]
    fn test_generated_hash_is_64_lowercase_hex_chars() {
        let hash = ConfirmationHash::generate();

        assert_eq!(hash.as_str().len(), 64);
        assert!(hash.as_str().chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
    }

    #[test]
    fn test_generated_hashes_differ() {
        assert_ne!(ConfirmationHash::generate(), ConfirmationHash::generate());
    }
}
