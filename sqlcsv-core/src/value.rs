//! Cell values and their canonical CSV text.
//!
//! The normalization rules are part of the output contract:
//!
//! | value                 | text                         |
//! |-----------------------|------------------------------|
//! | null                  | empty string                 |
//! | `true` / `false`      | `1` / `0`                    |
//! | integer               | decimal integer              |
//! | float, integral       | decimal integer (`5.0` → `5`)|
//! | float, non-integral   | default float text           |
//! | anything else         | driver text, unchanged       |

use std::borrow::Cow;

/// A single result cell as delivered by the driver.
#[derive(Debug, Clone, PartialEq)]
pub enum CellValue {
    /// SQL NULL
    Null,
    /// BIT
    Bool(bool),
    /// TINYINT, SMALLINT, INT, BIGINT
    Int(i64),
    /// REAL, FLOAT
    Float(f64),
    /// Every other type, in the driver's textual form
    Text(String),
}

impl CellValue {
    /// Canonical CSV text of this value.
    pub fn to_csv_field(&self) -> Cow<'_, str> {
        match self {
            Self::Null => Cow::Borrowed(""),
            Self::Bool(true) => Cow::Borrowed("1"),
            Self::Bool(false) => Cow::Borrowed("0"),
            Self::Int(value) => Cow::Owned(value.to_string()),
            Self::Float(value) => Cow::Owned(format_float(*value)),
            Self::Text(text) => Cow::Borrowed(text),
        }
    }
}

/// Formats a float, collapsing integral values to integer text.
///
/// Integral values of any magnitude keep every digit (`1e20` becomes
/// `100000000000000000000`); negative zero becomes `0`.
///
/// Other values use the shortest decimal text that round-trips, never
/// exponent notation: `1e-5` becomes `0.00001`, not `1e-05`.
pub fn format_float(value: f64) -> String {
    if value.is_finite() && value.fract() == 0.0 {
        if value == 0.0 {
            return "0".to_string();
        }
        format!("{value:.0}")
    } else {
        value.to_string()
    }
}

impl From<bool> for CellValue {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<i64> for CellValue {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

impl From<f64> for CellValue {
    fn from(value: f64) -> Self {
        Self::Float(value)
    }
}

impl From<&str> for CellValue {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<String> for CellValue {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl<T: Into<CellValue>> From<Option<T>> for CellValue {
    fn from(value: Option<T>) -> Self {
        value.map_or(Self::Null, Into::into)
    }
}
