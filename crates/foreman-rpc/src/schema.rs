//! Declarative tool schemas and the generic parameter validator.
//!
//! Every tool declares its parameters as a static table of [`ParamSpec`]s:
//! type, required flag, enum values, length bounds, numeric ranges. One
//! validator enforces them all — unknown parameters are rejected, not
//! ignored — so handlers only ever see conforming input.

use serde_json::{Map, Value};

use crate::errors::RpcError;

/// Parameter type.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ParamKind {
    Str,
    Int,
    Float,
    Bool,
    StrArray,
    IntArray,
    Object,
}

impl ParamKind {
    fn describe(self) -> &'static str {
        match self {
            Self::Str => "a string",
            Self::Int => "an integer",
            Self::Float => "a number",
            Self::Bool => "a boolean",
            Self::StrArray => "an array of strings",
            Self::IntArray => "an array of integers",
            Self::Object => "an object",
        }
    }
}

/// One declared parameter.
#[derive(Clone, Copy, Debug)]
pub struct ParamSpec {
    pub name: &'static str,
    pub kind: ParamKind,
    pub required: bool,
    pub enum_values: Option<&'static [&'static str]>,
    /// Character bounds for strings, item bounds for arrays.
    pub min_len: Option<usize>,
    pub max_len: Option<usize>,
    pub min: Option<f64>,
    pub max: Option<f64>,
}

impl ParamSpec {
    pub const fn required(name: &'static str, kind: ParamKind) -> Self {
        Self {
            name,
            kind,
            required: true,
            enum_values: None,
            min_len: None,
            max_len: None,
            min: None,
            max: None,
        }
    }

    pub const fn optional(name: &'static str, kind: ParamKind) -> Self {
        Self {
            name,
            kind,
            required: false,
            enum_values: None,
            min_len: None,
            max_len: None,
            min: None,
            max: None,
        }
    }

    pub const fn one_of(mut self, values: &'static [&'static str]) -> Self {
        self.enum_values = Some(values);
        self
    }

    pub const fn len_between(mut self, min: usize, max: usize) -> Self {
        self.min_len = Some(min);
        self.max_len = Some(max);
        self
    }

    pub const fn at_least(mut self, min: f64) -> Self {
        self.min = Some(min);
        self
    }

    pub const fn between(mut self, min: f64, max: f64) -> Self {
        self.min = Some(min);
        self.max = Some(max);
        self
    }
}

/// A tool: name plus its parameter table.
#[derive(Clone, Copy, Debug)]
pub struct ToolSchema {
    pub name: &'static str,
    pub description: &'static str,
    pub params: &'static [ParamSpec],
}

/// Validated parameter accessor handed to handlers.
#[derive(Clone, Copy, Debug)]
pub struct Args<'a> {
    map: Option<&'a Map<String, Value>>,
}

impl<'a> Args<'a> {
    fn get(&self, name: &str) -> Option<&'a Value> {
        self.map.and_then(|m| m.get(name)).filter(|v| !v.is_null())
    }

    pub fn str(&self, name: &str) -> Option<&'a str> {
        self.get(name).and_then(Value::as_str)
    }

    pub fn i64(&self, name: &str) -> Option<i64> {
        self.get(name).and_then(Value::as_i64)
    }

    pub fn f64(&self, name: &str) -> Option<f64> {
        self.get(name).and_then(Value::as_f64)
    }

    pub fn bool(&self, name: &str) -> Option<bool> {
        self.get(name).and_then(Value::as_bool)
    }

    pub fn object(&self, name: &str) -> Option<&'a Map<String, Value>> {
        self.get(name).and_then(Value::as_object)
    }

    pub fn str_array(&self, name: &str) -> Option<Vec<String>> {
        self.get(name).and_then(Value::as_array).map(|values| {
            values
                .iter()
                .filter_map(Value::as_str)
                .map(str::to_string)
                .collect()
        })
    }

    pub fn i64_array(&self, name: &str) -> Option<Vec<i64>> {
        self.get(name)
            .and_then(Value::as_array)
            .map(|values| values.iter().filter_map(Value::as_i64).collect())
    }

    fn missing(name: &str) -> RpcError {
        RpcError::invalid_params(format!("Missing required parameter '{name}'"))
    }

    pub fn req_str(&self, name: &str) -> Result<&'a str, RpcError> {
        self.str(name).ok_or_else(|| Self::missing(name))
    }

    pub fn req_i64(&self, name: &str) -> Result<i64, RpcError> {
        self.i64(name).ok_or_else(|| Self::missing(name))
    }

    pub fn req_i64_array(&self, name: &str) -> Result<Vec<i64>, RpcError> {
        self.i64_array(name).ok_or_else(|| Self::missing(name))
    }
}

fn type_matches(kind: ParamKind, value: &Value) -> bool {
    match kind {
        ParamKind::Str => value.is_string(),
        ParamKind::Int => value.as_i64().is_some(),
        ParamKind::Float => value.as_f64().is_some(),
        ParamKind::Bool => value.is_boolean(),
        ParamKind::StrArray => value
            .as_array()
            .is_some_and(|items| items.iter().all(Value::is_string)),
        ParamKind::IntArray => value
            .as_array()
            .is_some_and(|items| items.iter().all(|v| v.as_i64().is_some())),
        ParamKind::Object => value.is_object(),
    }
}

/// Validate `params` against `schema` and return the typed accessor.
///
/// Rejections: non-object params, unknown keys, missing required keys,
/// type mismatches, enum violations, and length/range bounds. Explicit
/// `null` counts as absent and is only admissible for optional parameters.
pub fn validate<'a>(schema: &ToolSchema, params: Option<&'a Value>) -> Result<Args<'a>, RpcError> {
    let map = match params {
        None | Some(Value::Null) => None,
        Some(Value::Object(map)) => Some(map),
        Some(_) => {
            return Err(RpcError::invalid_params("params must be an object"));
        }
    };

    if let Some(map) = map {
        for key in map.keys() {
            if !schema.params.iter().any(|p| p.name == key) {
                return Err(RpcError::invalid_params(format!(
                    "Unknown parameter '{key}' for '{}'",
                    schema.name
                )));
            }
        }
    }

    for spec in schema.params {
        let value = map.and_then(|m| m.get(spec.name)).filter(|v| !v.is_null());
        let Some(value) = value else {
            if spec.required {
                return Err(Args::missing(spec.name));
            }
            continue;
        };

        if !type_matches(spec.kind, value) {
            return Err(RpcError::invalid_params(format!(
                "Parameter '{}' must be {}",
                spec.name,
                spec.kind.describe()
            )));
        }

        if let (Some(allowed), Some(s)) = (spec.enum_values, value.as_str()) {
            if !allowed.contains(&s) {
                return Err(RpcError::invalid_params(format!(
                    "Parameter '{}' must be one of [{}], got '{s}'",
                    spec.name,
                    allowed.join(", ")
                )));
            }
        }

        let measured_len = match spec.kind {
            ParamKind::Str => value.as_str().map(|s| s.trim().chars().count()),
            ParamKind::StrArray | ParamKind::IntArray => value.as_array().map(Vec::len),
            _ => None,
        };
        if let Some(len) = measured_len {
            if let Some(min) = spec.min_len {
                if len < min {
                    return Err(RpcError::invalid_params(format!(
                        "Parameter '{}' must have at least {min} {}",
                        spec.name,
                        if spec.kind == ParamKind::Str {
                            "characters"
                        } else {
                            "items"
                        }
                    )));
                }
            }
            if let Some(max) = spec.max_len {
                if len > max {
                    return Err(RpcError::invalid_params(format!(
                        "Parameter '{}' must have at most {max} {}",
                        spec.name,
                        if spec.kind == ParamKind::Str {
                            "characters"
                        } else {
                            "items"
                        }
                    )));
                }
            }
        }

        if let Some(number) = value.as_f64() {
            if let Some(min) = spec.min {
                if number < min {
                    return Err(RpcError::invalid_params(format!(
                        "Parameter '{}' must be >= {min}, got {number}",
                        spec.name
                    )));
                }
            }
            if let Some(max) = spec.max {
                if number > max {
                    return Err(RpcError::invalid_params(format!(
                        "Parameter '{}' must be <= {max}, got {number}",
                        spec.name
                    )));
                }
            }
        }
    }

    Ok(Args { map })
}
