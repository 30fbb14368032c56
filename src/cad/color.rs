//! AutoCAD Color Index (ACI) resolution.
//!
//! Tools accept colors either as an ACI number or as one of a fixed set of
//! symbolic names. Unknown names fall back to white rather than failing.

use std::fmt;

use serde_json::Value;

use crate::cad::error::{CadError, CadResult};

/// ACI used when a symbolic name is not recognised.
pub const DEFAULT_COLOR_INDEX: i32 = 7;

/// ACI meaning "inherit the color of the entity's layer".
pub const BYLAYER: i32 = 256;

/// Symbolic color names and their ACI values, in declaration order.
pub const COLOR_TABLE: &[(&str, i32)] = &[
    ("red", 1),
    ("yellow", 2),
    ("green", 3),
    ("cyan", 4),
    ("blue", 5),
    ("magenta", 6),
    ("white", 7),
    ("gray", 8),
    ("light_gray", 9),
    ("black", 0),
    ("bylayer", BYLAYER),
    ("byblock", 0),
];

/// Resolves a symbolic color name (case-insensitive) to its ACI value.
///
/// Unknown names resolve to [`DEFAULT_COLOR_INDEX`].
#[must_use]
pub fn resolve_color_name(name: &str) -> i32 {
    let lower = name.to_lowercase();
    COLOR_TABLE
        .iter()
        .find(|(key, _)| *key == lower)
        .map_or(DEFAULT_COLOR_INDEX, |&(_, index)| index)
}

/// A color as supplied by a caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ColorSpec {
    /// A raw ACI value, passed through unchanged.
    Index(i32),
    /// A symbolic name such as `"red"` or `"bylayer"`.
    Name(String),
}

impl ColorSpec {
    /// Creates a named color.
    #[must_use]
    pub fn named(name: impl Into<String>) -> Self {
        Self::Name(name.into())
    }

    /// Returns the ACI value for this color.
    #[must_use]
    pub fn resolve(&self) -> i32 {
        match self {
            Self::Index(index) => *index,
            Self::Name(name) => resolve_color_name(name),
        }
    }

    /// Parses a color from a tool argument.
    ///
    /// Integers are indices. Strings are always names, so `"42"` is an
    /// unknown name and resolves to white.
    ///
    /// # Errors
    ///
    /// Returns an error if the value is neither an integer nor a string, or if
    /// the integer does not fit an ACI value.
    pub fn from_json(value: &Value) -> CadResult<Self> {
        match value {
            Value::Number(n) => n
                .as_i64()
                .and_then(|v| i32::try_from(v).ok())
                .map(Self::Index)
                .ok_or_else(|| {
                    CadError::invalid_parameter("color", format!("{n} is not a valid color index"))
                }),
            Value::String(s) => Ok(Self::named(s.as_str())),
            other => Err(CadError::invalid_parameter(
                "color",
                format!("expected a color name or ACI number, got {other}"),
            )),
        }
    }
}

impl Default for ColorSpec {
    fn default() -> Self {
        Self::named("white")
    }
}

impl fmt::Display for ColorSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Index(index) => write!(f, "{index}"),
            Self::Name(name) => write!(f, "{name}"),
        }
    }
}

impl From<&str> for ColorSpec {
    fn from(s: &str) -> Self {
        Self::named(s)
    }
}

impl From<i32> for ColorSpec {
    fn from(index: i32) -> Self {
        Self::Index(index)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn every_table_entry_resolves_to_its_index() {
        for &(name, index) in COLOR_TABLE {
            assert_eq!(resolve_color_name(name), index, "color {name}");
        }
    }

    #[test]
    fn names_are_case_insensitive() {
        assert_eq!(resolve_color_name("RED"), 1);
        assert_eq!(resolve_color_name("Light_Gray"), 9);
        assert_eq!(ColorSpec::named("ByLayer").resolve(), BYLAYER);
    }

    #[test]
    fn unknown_name_defaults_to_white() {
        assert_eq!(resolve_color_name("chartreuse"), DEFAULT_COLOR_INDEX);
        assert_eq!(ColorSpec::named("").resolve(), 7);
    }

    #[test]
    fn indices_pass_through() {
        for index in [0, 1, 7, 42, 255, 256, 1000] {
            assert_eq!(ColorSpec::Index(index).resolve(), index);
        }
    }

    #[test]
    fn parse_json_values() {
        assert_eq!(ColorSpec::from_json(&json!(3)).unwrap(), ColorSpec::Index(3));
        assert_eq!(
            ColorSpec::from_json(&json!("42")).unwrap(),
            ColorSpec::named("42")
        );
        assert_eq!(
            ColorSpec::from_json(&json!("blue")).unwrap(),
            ColorSpec::named("blue")
        );
        assert!(ColorSpec::from_json(&json!(true)).is_err());
        assert!(ColorSpec::from_json(&json!(1.5)).is_err());
    }

    #[test]
    fn digit_strings_are_names_not_indices() {
        assert_eq!(ColorSpec::from("42").resolve(), DEFAULT_COLOR_INDEX);
        assert_eq!(ColorSpec::from_json(&json!("1")).unwrap().resolve(), 7);
        assert_eq!(ColorSpec::from_json(&json!(42)).unwrap().resolve(), 42);
    }

    #[test]
    fn display_keeps_caller_spelling() {
        assert_eq!(ColorSpec::named("Green").to_string(), "Green");
        assert_eq!(ColorSpec::Index(12).to_string(), "12");
    }
}
