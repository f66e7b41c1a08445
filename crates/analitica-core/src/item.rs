//! Attribute values of exported items.
//!
//! Source tables are schemaless: each item is a map from attribute name to a
//! typed value. Numbers keep exact decimal semantics until they are encoded
//! (see [`crate::encoding`]).

use std::collections::BTreeMap;
use std::str::FromStr;

use bigdecimal::{BigDecimal, ParseBigDecimalError};

/// One item scanned from a source table. Keys iterate in sorted order.
pub type Item = BTreeMap<String, AttrValue>;

/// A typed attribute value.
#[derive(Debug, Clone, PartialEq)]
pub enum AttrValue {
    String(String),
    /// Arbitrary-precision decimal.
    Number(BigDecimal),
    Binary(Vec<u8>),
    Bool(bool),
    Null,
    List(Vec<AttrValue>),
    Map(Item),
    StringSet(Vec<String>),
    NumberSet(Vec<BigDecimal>),
    BinarySet(Vec<Vec<u8>>),
}

impl AttrValue {
    /// Parse a decimal number from its textual form (`"12"`, `"-0.5"`,
    /// `"1E+3"`).
    pub fn number(raw: &str) -> Result<Self, ParseBigDecimalError> {
        BigDecimal::from_str(raw).map(Self::Number)
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_number(&self) -> Option<&BigDecimal> {
        match self {
            Self::Number(n) => Some(n),
            _ => None,
        }
    }
}

impl From<&str> for AttrValue {
    fn from(s: &str) -> Self {
        Self::String(s.to_owned())
    }
}

impl From<String> for AttrValue {
    fn from(s: String) -> Self {
        Self::String(s)
    }
}

impl From<i64> for AttrValue {
    fn from(n: i64) -> Self {
        Self::Number(BigDecimal::from(n))
    }
}

impl From<bool> for AttrValue {
    fn from(b: bool) -> Self {
        Self::Bool(b)
    }
}

impl From<BigDecimal> for AttrValue {
    fn from(n: BigDecimal) -> Self {
        Self::Number(n)
    }
}

impl From<Item> for AttrValue {
    fn from(m: Item) -> Self {
        Self::Map(m)
    }
}

impl From<Vec<AttrValue>> for AttrValue {
    fn from(l: Vec<AttrValue>) -> Self {
        Self::List(l)
    }
}

/// Build an [`Item`] from `(name, value)` pairs.
///
/// ```
/// use analitica_core::{AttrValue, item};
///
/// let it = item([("id", AttrValue::from("a-1")), ("piso", AttrValue::from(3_i64))]);
/// assert_eq!(it.len(), 2);
/// ```
pub fn item<K, I>(pairs: I) -> Item
where
    K: Into<String>,
    I: IntoIterator<Item = (K, AttrValue)>,
{
    pairs.into_iter().map(|(k, v)| (k.into(), v)).collect()
}
