//! Swedish personal identity number (personnummer).

use core::fmt;

use serde::{Deserialize, Serialize};

/// Errors that can occur when parsing a [`PersonalNumber`].
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum PersonalNumberError {
    /// The input string is empty.
    #[error("personal number cannot be empty")]
    Empty,
    /// The input has the wrong number of digits.
    #[error("personal number must have 12 digits (YYYYMMDDNNNN)")]
    WrongLength,
    /// The input contains something other than digits and one separator.
    #[error("personal number may only contain digits and a single '-' separator")]
    InvalidCharacter,
    /// The month or day part is out of range.
    #[error("personal number has an invalid birth date")]
    InvalidDate,
}

/// A 12-digit personal identity number, the stable identity key that the
/// remote authority vouches for.
///
/// The canonical form is `YYYYMMDDNNNN`. A single `-` or `+` between the date
/// and the serial part is accepted on input and dropped. No checksum is
/// enforced since the authority is the source of truth for completed orders.
///
/// ## Examples
///
/// ```
/// use bankid_gateway_core::PersonalNumber;
///
/// let pn = PersonalNumber::parse("19800101-1234").unwrap();
/// assert_eq!(pn.as_str(), "198001011234");
///
/// assert!(PersonalNumber::parse("").is_err());
/// assert!(PersonalNumber::parse("8001011234").is_err());
/// ```
#[derive(Clone, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(try_from = "String", into = "String")]
pub struct PersonalNumber(String);

impl PersonalNumber {
    /// Number of digits in the canonical form.
    pub const LENGTH: usize = 12;

    /// Parse a `PersonalNumber` from a string.
    ///
    /// # Errors
    ///
    /// Returns an error if the input is empty, has anything other than 12
    /// digits (plus an optional separator), or has an impossible month/day.
    pub fn parse(s: &str) -> Result<Self, PersonalNumberError> {
        let s = s.trim();
        if s.is_empty() {
            return Err(PersonalNumberError::Empty);
        }

        let mut separators = 0;
        let mut digits = String::with_capacity(Self::LENGTH);
        for c in s.chars() {
            match c {
                '0'..='9' => digits.push(c),
                '-' | '+' => separators += 1,
                _ => return Err(PersonalNumberError::InvalidCharacter),
            }
        }
        if separators > 1 {
            return Err(PersonalNumberError::InvalidCharacter);
        }
        if digits.len() != Self::LENGTH {
            return Err(PersonalNumberError::WrongLength);
        }

        let month: u32 = digits.get(4..6).and_then(|m| m.parse().ok()).unwrap_or(0);
        // Coordination numbers add 60 to the day.
        let day: u32 = digits.get(6..8).and_then(|d| d.parse().ok()).unwrap_or(0);
        let day = if day > 60 { day - 60 } else { day };
        if !(1..=12).contains(&month) || !(1..=31).contains(&day) {
            return Err(PersonalNumberError::InvalidDate);
        }

        Ok(Self(digits))
    }

    /// Returns the canonical 12-digit form.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns a form safe for logs: birth date kept, serial part masked.
    #[must_use]
    pub fn masked(&self) -> String {
        format!("{}****", self.0.get(..8).unwrap_or_default())
    }
}

// Identity keys are personal data; keep them out of debug output.
impl fmt::Debug for PersonalNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("PersonalNumber")
            .field(&self.masked())
            .finish()
    }
}

impl fmt::Display for PersonalNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl std::str::FromStr for PersonalNumber {
    type Err = PersonalNumberError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for PersonalNumber {
    type Error = PersonalNumberError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<PersonalNumber> for String {
    fn from(value: PersonalNumber) -> Self {
        value.0
    }
}

impl AsRef<str> for PersonalNumber {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

#[cfg(feature = "postgres")]
impl sqlx::Type<sqlx::Postgres> for PersonalNumber {
    fn type_info() -> sqlx::postgres::PgTypeInfo {
        <String as sqlx::Type<sqlx::Postgres>>::type_info()
    }

    fn compatible(ty: &sqlx::postgres::PgTypeInfo) -> bool {
        <String as sqlx::Type<sqlx::Postgres>>::compatible(ty)
    }
}

#[cfg(feature = "postgres")]
impl<'r> sqlx::Decode<'r, sqlx::Postgres> for PersonalNumber {
    fn decode(value: sqlx::postgres::PgValueRef<'r>) -> Result<Self, sqlx::error::BoxDynError> {
        let s = <String as sqlx::Decode<sqlx::Postgres>>::decode(value)?;
        Ok(Self::parse(&s)?)
    }
}

#[cfg(feature = "postgres")]
impl sqlx::Encode<'_, sqlx::Postgres> for PersonalNumber {
    fn encode_by_ref(
        &self,
        buf: &mut sqlx::postgres::PgArgumentBuffer,
    ) -> Result<sqlx::encode::IsNull, sqlx::error::BoxDynError> {
        <String as sqlx::Encode<sqlx::Postgres>>::encode_by_ref(&self.0, buf)
    }
}
