//! Structured-document parsing with field-path aware extraction
//!
//! Configuration files are parsed into a generic [`serde_json::Value`] tree
//! regardless of their on-disk format. Typed values are then pulled out of
//! that tree through a `Section` cursor, which knows the dotted path of the
//! table it points at. Every extraction failure therefore names the exact
//! field, e.g. `networks.development.port`.

use serde_json::{Map, Value};
use std::fmt;
use std::path::Path;

use crate::config::ConfigError;

/// Supported serialized formats
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Format {
    /// TOML document
    Toml,
    /// JSON document
    Json,
}

impl Format {
    /// Detect the format from a file extension (case-insensitive)
    pub fn from_path(path: &Path) -> Option<Self> {
        let extension = path.extension()?.to_str()?.to_ascii_lowercase();
        match extension.as_str() {
            "toml" => Some(Format::Toml),
            "json" => Some(Format::Json),
            _ => None,
        }
    }

    /// Get format as string
    pub fn as_str(&self) -> &'static str {
        match self {
            Format::Toml => "toml",
            Format::Json => "json",
        }
    }
}

impl fmt::Display for Format {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Parse text into a generic document tree.
pub(crate) fn parse(text: &str, format: Format) -> Result<Value, ConfigError> {
    match format {
        Format::Toml => {
            let table = toml::from_str::<toml::Table>(text).map_err(|err| ConfigError::Parse {
                format,
                message: err.to_string(),
            })?;
            // JSON has no NaN or infinity; converting would silently turn them into null.
            for (key, value) in &table {
                if let Some((path, float)) = non_finite_float(value, key) {
                    return Err(ConfigError::invalid(
                        path,
                        format!("must be a finite number, found {float}"),
                    ));
                }
            }
            serde_json::to_value(table).map_err(|err| ConfigError::Parse {
                format,
                message: err.to_string(),
            })
        }
        Format::Json => serde_json::from_str::<Value>(text).map_err(|err| ConfigError::Parse {
            format,
            message: err.to_string(),
        }),
    }
}

/// First `nan` or `inf` float under `value`, with its dotted path.
fn non_finite_float(value: &toml::Value, path: &str) -> Option<(String, f64)> {
    match value {
        toml::Value::Float(float) if !float.is_finite() => Some((path.to_string(), *float)),
        toml::Value::Table(table) => table
            .iter()
            .find_map(|(key, value)| non_finite_float(value, &format!("{path}.{key}"))),
        toml::Value::Array(items) => items
            .iter()
            .enumerate()
            .find_map(|(index, value)| non_finite_float(value, &format!("{path}[{index}]"))),
        _ => None,
    }
}

/// Short human description of a value's type, used in error reasons.
fn describe(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(n) if n.is_f64() => "a float",
        Value::Number(_) => "an integer",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "a table",
    }
}

/// Cursor over one table of the document.
///
/// A `null` value (JSON only) is treated the same as an absent key.
#[derive(Debug, Clone)]
pub(crate) struct Section<'a> {
    path: String,
    table: &'a Map<String, Value>,
}

impl<'a> Section<'a> {
    /// Cursor over the document root, which must be a table.
    pub(crate) fn root(document: &'a Value) -> Result<Self, ConfigError> {
        match document {
            Value::Object(table) => Ok(Section {
                path: String::new(),
                table,
            }),
            other => Err(ConfigError::invalid(
                "<root>",
                format!("expected a table, found {}", describe(other)),
            )),
        }
    }

    pub(crate) fn path(&self) -> &str {
        &self.path
    }

    /// Dotted path of `key` inside this section.
    pub(crate) fn field_path(&self, key: &str) -> String {
        if self.path.is_empty() {
            key.to_string()
        } else {
            format!("{}.{}", self.path, key)
        }
    }

    fn get(&self, key: &str) -> Option<&'a Value> {
        self.table.get(key).filter(|value| !value.is_null())
    }

    fn mismatch(&self, key: &str, expected: &str, found: &Value) -> ConfigError {
        ConfigError::invalid(
            self.field_path(key),
            format!("expected {expected}, found {}", describe(found)),
        )
    }

    /// Raw value of a required key.
    pub(crate) fn required(&self, key: &str) -> Result<&'a Value, ConfigError> {
        self.get(key)
            .ok_or_else(|| ConfigError::missing(self.field_path(key)))
    }

    pub(crate) fn section(&self, key: &str) -> Result<Section<'a>, ConfigError> {
        self.optional_section(key)?
            .ok_or_else(|| ConfigError::missing(self.field_path(key)))
    }

    pub(crate) fn optional_section(&self, key: &str) -> Result<Option<Section<'a>>, ConfigError> {
        match self.get(key) {
            None => Ok(None),
            Some(Value::Object(table)) => Ok(Some(Section {
                path: self.field_path(key),
                table,
            })),
            Some(other) => Err(self.mismatch(key, "a table", other)),
        }
    }

    /// Every entry of this section as a nested section, in key order.
    pub(crate) fn sections(&self) -> Result<Vec<(&'a str, Section<'a>)>, ConfigError> {
        let mut entries = Vec::with_capacity(self.table.len());
        for (key, value) in self.table {
            match value {
                Value::Object(table) => entries.push((
                    key.as_str(),
                    Section {
                        path: self.field_path(key),
                        table,
                    },
                )),
                other => return Err(self.mismatch(key, "a table", other)),
            }
        }
        entries.sort_by(|a, b| a.0.cmp(b.0));
        Ok(entries)
    }

    pub(crate) fn required_str(&self, key: &str) -> Result<&'a str, ConfigError> {
        self.optional_str(key)?
            .ok_or_else(|| ConfigError::missing(self.field_path(key)))
    }

    pub(crate) fn optional_str(&self, key: &str) -> Result<Option<&'a str>, ConfigError> {
        match self.get(key) {
            None => Ok(None),
            Some(Value::String(s)) => Ok(Some(s.as_str())),
            Some(other) => Err(self.mismatch(key, "a string", other)),
        }
    }

    /// A required string that must contain something other than whitespace.
    pub(crate) fn required_non_empty(&self, key: &str) -> Result<&'a str, ConfigError> {
        let value = self.required_str(key)?;
        if value.trim().is_empty() {
            return Err(ConfigError::invalid(self.field_path(key), "must not be empty"));
        }
        Ok(value)
    }

    pub(crate) fn optional_bool(&self, key: &str) -> Result<Option<bool>, ConfigError> {
        match self.get(key) {
            None => Ok(None),
            Some(Value::Bool(b)) => Ok(Some(*b)),
            Some(other) => Err(self.mismatch(key, "a boolean", other)),
        }
    }

    /// An integer constrained to `min..=max`, converted to `T`.
    pub(crate) fn required_int<T>(&self, key: &str, min: T, max: T) -> Result<T, ConfigError>
    where
        T: TryFrom<i128> + Into<i128> + Copy + fmt::Display,
    {
        self.optional_int(key, min, max)?
            .ok_or_else(|| ConfigError::missing(self.field_path(key)))
    }

    pub(crate) fn optional_int<T>(&self, key: &str, min: T, max: T) -> Result<Option<T>, ConfigError>
    where
        T: TryFrom<i128> + Into<i128> + Copy + fmt::Display,
    {
        let value = match self.get(key) {
            None => return Ok(None),
            Some(value) => value,
        };
        let out_of_range = |found: &dyn fmt::Display| {
            ConfigError::invalid(
                self.field_path(key),
                format!("must be an integer between {min} and {max}, found {found}"),
            )
        };
        let number = match value {
            Value::Number(n) if !n.is_f64() => n
                .as_i64()
                .map(i128::from)
                .or_else(|| n.as_u64().map(i128::from))
                .ok_or_else(|| out_of_range(n))?,
            other => return Err(self.mismatch(key, "an integer", other)),
        };
        if number < min.into() || number > max.into() {
            return Err(out_of_range(&number));
        }
        T::try_from(number).map(Some).map_err(|_| out_of_range(&number))
    }

    /// Which of several spellings of the same field is present, if any.
    /// Giving more than one of them is an error.
    pub(crate) fn alias<'k>(&self, keys: &[&'k str]) -> Result<Option<&'k str>, ConfigError> {
        let mut present = keys.iter().copied().filter(|key| self.get(key).is_some());
        let first = present.next();
        if let (Some(first), Some(second)) = (first, present.next()) {
            return Err(ConfigError::invalid(
                self.field_path(second),
                format!("conflicts with `{}`", self.field_path(first)),
            ));
        }
        Ok(first)
    }

    /// Dotted paths of keys in this section that are not in `known`.
    pub(crate) fn unknown_keys(&self, known: &[&str]) -> Vec<String> {
        self.table
            .keys()
            .filter(|key| !known.contains(&key.as_str()))
            .map(|key| self.field_path(key))
            .collect()
    }
}
