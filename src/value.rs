//! Raw configuration values
//!
//! `ConfigValue` is the shape of everything the merge engine touches:
//! what defaults providers return, what override files decode into, and
//! what sits in the merged tree before parameter parsers run. A value
//! may embed a [`MergeOp`](crate::merge::MergeOp) to control how it
//! combines with the value beneath it in the layer stack.

use crate::error::ConfigError;
use crate::merge::{MergeOp, Strategy};
use std::collections::BTreeMap;

/// String-keyed mapping of configuration values.
pub type Mapping = BTreeMap<String, ConfigValue>;

#[derive(Clone, Debug, PartialEq)]
pub enum ConfigValue {
    Null,
    Bool(bool),
    Integer(i64),
    Float(f64),
    String(String),
    Sequence(Vec<ConfigValue>),
    Mapping(Mapping),
    Op(Box<MergeOp>),
}

impl ConfigValue {
    pub fn type_name(&self) -> &'static str {
        match self {
            ConfigValue::Null => "null",
            ConfigValue::Bool(_) => "bool",
            ConfigValue::Integer(_) => "integer",
            ConfigValue::Float(_) => "float",
            ConfigValue::String(_) => "string",
            ConfigValue::Sequence(_) => "sequence",
            ConfigValue::Mapping(_) => "mapping",
            ConfigValue::Op(_) => "merge op",
        }
    }

    pub fn is_sequence(&self) -> bool {
        matches!(self, ConfigValue::Sequence(_))
    }

    pub fn is_mapping(&self) -> bool {
        matches!(self, ConfigValue::Mapping(_))
    }

    pub fn as_mapping(&self) -> Option<&Mapping> {
        match self {
            ConfigValue::Mapping(m) => Some(m),
            _ => None,
        }
    }

    /// String form used when this value is substituted into a template
    /// placeholder. Scalars render bare; aggregates render as JSON.
    pub fn display_string(&self) -> String {
        match self {
            ConfigValue::Null => "null".to_string(),
            ConfigValue::Bool(b) => b.to_string(),
            ConfigValue::Integer(i) => i.to_string(),
            ConfigValue::Float(f) => f.to_string(),
            ConfigValue::String(s) => s.clone(),
            other => other.to_json().to_string(),
        }
    }

    /// Strips embedded merge ops by applying each against an absent
    /// base. Used when a layer introduces a key the accumulator has
    /// never seen.
    pub fn into_plain(self) -> Result<ConfigValue, ConfigError> {
        match self {
            ConfigValue::Op(op) => op.apply(None),
            ConfigValue::Sequence(items) => Ok(ConfigValue::Sequence(
                items.into_iter().map(ConfigValue::into_plain).collect::<Result<_, _>>()?,
            )),
            ConfigValue::Mapping(m) => {
                let mut out = Mapping::new();
                for (k, v) in m {
                    out.insert(k, v.into_plain()?);
                }
                Ok(ConfigValue::Mapping(out))
            }
            scalar => Ok(scalar),
        }
    }

    pub fn to_json(&self) -> serde_json::Value {
        match self {
            ConfigValue::Null => serde_json::Value::Null,
            ConfigValue::Bool(b) => serde_json::Value::Bool(*b),
            ConfigValue::Integer(i) => serde_json::Value::from(*i),
            ConfigValue::Float(f) => serde_json::Number::from_f64(*f)
                .map(serde_json::Value::Number)
                .unwrap_or(serde_json::Value::Null),
            ConfigValue::String(s) => serde_json::Value::String(s.clone()),
            ConfigValue::Sequence(items) => {
                serde_json::Value::Array(items.iter().map(ConfigValue::to_json).collect())
            }
            ConfigValue::Mapping(m) => serde_json::Value::Object(
                m.iter().map(|(k, v)| (k.clone(), v.to_json())).collect(),
            ),
            ConfigValue::Op(op) => op.payload().to_json(),
        }
    }

    pub fn from_json(value: serde_json::Value) -> ConfigValue {
        match value {
            serde_json::Value::Null => ConfigValue::Null,
            serde_json::Value::Bool(b) => ConfigValue::Bool(b),
            serde_json::Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    ConfigValue::Integer(i)
                } else {
                    ConfigValue::Float(n.as_f64().unwrap_or(f64::NAN))
                }
            }
            serde_json::Value::String(s) => ConfigValue::String(s),
            serde_json::Value::Array(items) => {
                ConfigValue::Sequence(items.into_iter().map(ConfigValue::from_json).collect())
            }
            serde_json::Value::Object(m) => ConfigValue::Mapping(
                m.into_iter().map(|(k, v)| (k, ConfigValue::from_json(v))).collect(),
            ),
        }
    }

    /// Decodes a TOML value, recognizing single-key `{"!extend" = ...}`
    /// style tables as merge ops.
    pub fn from_toml(value: toml::Value) -> Result<ConfigValue, String> {
        Ok(match value {
            toml::Value::String(s) => ConfigValue::String(s),
            toml::Value::Integer(i) => ConfigValue::Integer(i),
            toml::Value::Float(f) => ConfigValue::Float(f),
            toml::Value::Boolean(b) => ConfigValue::Bool(b),
            toml::Value::Datetime(d) => ConfigValue::String(d.to_string()),
            toml::Value::Array(items) => ConfigValue::Sequence(
                items.into_iter().map(ConfigValue::from_toml).collect::<Result<_, _>>()?,
            ),
            toml::Value::Table(table) => {
                let mut m = Mapping::new();
                for (k, v) in table {
                    m.insert(k, ConfigValue::from_toml(v)?);
                }
                tagged_op(m)?
            }
        })
    }

    /// Decodes a YAML value. Merge ops may be written either as real
    /// YAML tags (`!extend [..]`) or as single-key mappings.
    pub fn from_yaml(value: serde_yaml::Value) -> Result<ConfigValue, String> {
        Ok(match value {
            serde_yaml::Value::Null => ConfigValue::Null,
            serde_yaml::Value::Bool(b) => ConfigValue::Bool(b),
            serde_yaml::Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    ConfigValue::Integer(i)
                } else {
                    ConfigValue::Float(n.as_f64().unwrap_or(f64::NAN))
                }
            }
            serde_yaml::Value::String(s) => ConfigValue::String(s),
            serde_yaml::Value::Sequence(items) => ConfigValue::Sequence(
                items.into_iter().map(ConfigValue::from_yaml).collect::<Result<_, _>>()?,
            ),
            serde_yaml::Value::Mapping(m) => {
                let mut out = Mapping::new();
                for (k, v) in m {
                    let serde_yaml::Value::String(key) = k else {
                        return Err("mapping keys must be strings".to_string());
                    };
                    out.insert(key, ConfigValue::from_yaml(v)?);
                }
                tagged_op(out)?
            }
            serde_yaml::Value::Tagged(tagged) => {
                let tag = tagged.tag.to_string();
                let name = tag.trim_start_matches('!');
                let Some(strategy) = Strategy::from_tag(name) else {
                    return Err(format!("{tag}: unknown merge tag"));
                };
                let payload = ConfigValue::from_yaml(tagged.value)?;
                ConfigValue::Op(Box::new(
                    MergeOp::with_strategy(strategy, payload).map_err(|e| e.to_string())?,
                ))
            }
        })
    }
}

/// Collapses a single-key mapping like `{"!prepend": [..]}` into the
/// corresponding merge op; anything else passes through as a mapping.
fn tagged_op(mut m: Mapping) -> Result<ConfigValue, String> {
    if m.len() == 1 {
        let key = m.keys().next().cloned().unwrap_or_default();
        if let Some(name) = key.strip_prefix('!') {
            let Some(strategy) = Strategy::from_tag(name) else {
                return Err(format!("!{name}: unknown merge tag"));
            };
            let payload = m.remove(&key).unwrap_or(ConfigValue::Null);
            return Ok(ConfigValue::Op(Box::new(
                MergeOp::with_strategy(strategy, payload).map_err(|e| e.to_string())?,
            )));
        }
    }
    Ok(ConfigValue::Mapping(m))
}

impl From<&str> for ConfigValue {
    fn from(s: &str) -> Self {
        ConfigValue::String(s.to_string())
    }
}

impl From<String> for ConfigValue {
    fn from(s: String) -> Self {
        ConfigValue::String(s)
    }
}

impl From<i64> for ConfigValue {
    fn from(i: i64) -> Self {
        ConfigValue::Integer(i)
    }
}

impl From<f64> for ConfigValue {
    fn from(f: f64) -> Self {
        ConfigValue::Float(f)
    }
}

impl From<bool> for ConfigValue {
    fn from(b: bool) -> Self {
        ConfigValue::Bool(b)
    }
}

impl From<Vec<ConfigValue>> for ConfigValue {
    fn from(items: Vec<ConfigValue>) -> Self {
        ConfigValue::Sequence(items)
    }
}

impl From<Mapping> for ConfigValue {
    fn from(m: Mapping) -> Self {
        ConfigValue::Mapping(m)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_from_json_nested() {
        let v = ConfigValue::from_json(json!({"a": {"b": [1, "two", true]}}));
        let ConfigValue::Mapping(m) = &v else { panic!("expected mapping") };
        let ConfigValue::Mapping(inner) = &m["a"] else { panic!("expected mapping") };
        assert_eq!(
            inner["b"],
            ConfigValue::Sequence(vec![
                ConfigValue::Integer(1),
                ConfigValue::String("two".to_string()),
                ConfigValue::Bool(true),
            ])
        );
    }

    #[test]
    fn test_display_string_scalars() {
        assert_eq!(ConfigValue::Integer(42).display_string(), "42");
        assert_eq!(ConfigValue::Bool(false).display_string(), "false");
        assert_eq!(ConfigValue::String("x".into()).display_string(), "x");
    }

    #[test]
    fn test_display_string_aggregates_render_as_json() {
        let v = ConfigValue::from_json(json!([1, 2]));
        assert_eq!(v.display_string(), "[1,2]");
    }

    #[test]
    fn test_from_toml_tagged_op() {
        let raw: toml::Value = toml::from_str("x = { \"!extend\" = [1, 2] }").expect("toml");
        let v = ConfigValue::from_toml(raw).expect("convert");
        let ConfigValue::Mapping(m) = v else { panic!("expected mapping") };
        let ConfigValue::Op(op) = &m["x"] else { panic!("expected op") };
        assert_eq!(op.strategy(), Strategy::Extend);
    }

    #[test]
    fn test_from_toml_unknown_tag_is_error() {
        let raw: toml::Value = toml::from_str("x = { \"!replace\" = [1] }").expect("toml");
        let err = ConfigValue::from_toml(raw).expect_err("unknown tag");
        assert!(err.contains("!replace"));
    }

    #[test]
    fn test_from_yaml_native_tag() {
        let raw: serde_yaml::Value = serde_yaml::from_str("!prepend [1, 2]").expect("yaml");
        let v = ConfigValue::from_yaml(raw).expect("convert");
        let ConfigValue::Op(op) = v else { panic!("expected op") };
        assert_eq!(op.strategy(), Strategy::Prepend);
    }

    #[test]
    fn test_into_plain_applies_embedded_op() {
        let mut m = Mapping::new();
        m.insert(
            "xs".to_string(),
            ConfigValue::Op(Box::new(
                MergeOp::extend(ConfigValue::from_json(json!([1, 2]))).expect("sequence"),
            )),
        );
        let plain = ConfigValue::Mapping(m).into_plain().expect("plain");
        assert_eq!(plain, ConfigValue::from_json(json!({"xs": [1, 2]})));
    }

    #[test]
    fn test_from_yaml_rejects_non_string_keys() {
        let raw: serde_yaml::Value = serde_yaml::from_str("1: x").expect("yaml");
        assert!(ConfigValue::from_yaml(raw).is_err());
    }
}
