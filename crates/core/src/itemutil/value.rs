use std::fmt;

use serde::Serialize;

/// A value returned by an exporter: a scalar or a sequence of values.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Value {
    Str(String),
    Int(i64),
    Uint(u64),
    Float(f64),
    Seq(Vec<Value>),
}

impl Value {
    pub fn is_sequence(&self) -> bool {
        matches!(self, Value::Seq(_))
    }

    /// Render into result strings: one per element for a sequence, one for a scalar.
    pub fn into_strings(self) -> Vec<String> {
        match self {
            Value::Seq(items) => items.iter().map(Value::to_string).collect(),
            scalar => vec![scalar.to_string()],
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Str(s) => f.write_str(s),
            Value::Int(v) => write!(f, "{v}"),
            Value::Uint(v) => write!(f, "{v}"),
            Value::Float(v) => write!(f, "{v:.6}"),
            Value::Seq(items) => {
                let rendered: Vec<String> = items.iter().map(Value::to_string).collect();
                let json = serde_json::to_string(&rendered).map_err(|_| fmt::Error)?;
                f.write_str(&json)
            }
        }
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Str(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Str(v.to_string())
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Int(v.into())
    }
}

impl From<u64> for Value {
    fn from(v: u64) -> Self {
        Value::Uint(v)
    }
}

impl From<u32> for Value {
    fn from(v: u32) -> Self {
        Value::Uint(v.into())
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Float(v)
    }
}

impl<T: Into<Value>> From<Vec<T>> for Value {
    fn from(items: Vec<T>) -> Self {
        Value::Seq(items.into_iter().map(Into::into).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scalars_render_as_text() {
        assert_eq!(Value::from("up").to_string(), "up");
        assert_eq!(Value::from(-3i64).to_string(), "-3");
        assert_eq!(Value::from(7u64).to_string(), "7");
        assert_eq!(Value::from(0.5).to_string(), "0.500000");
    }

    #[test]
    fn sequence_splits_into_elements_in_order() {
        let value = Value::from(vec![3u64, 1, 2]);
        assert!(value.is_sequence());
        assert_eq!(value.into_strings(), vec!["3", "1", "2"]);
    }

    #[test]
    fn scalar_is_a_single_string() {
        assert_eq!(Value::from("x").into_strings(), vec!["x"]);
    }

    #[test]
    fn nested_sequence_renders_as_json_array() {
        let value = Value::Seq(vec![Value::from(vec!["a", "b"]), Value::from(1i64)]);
        assert_eq!(value.into_strings(), vec![r#"["a","b"]"#.to_string(), "1".to_string()]);
    }
}
