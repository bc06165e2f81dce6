//! Tagged merge operations
//!
//! A `MergeOp` wraps a payload with an explicit strategy describing how
//! it combines with the value already sitting at the same key in the
//! layer beneath. Payload shape is validated when the op is built, so a
//! mistyped override file fails at load time rather than deep inside a
//! recursive merge. Ops own their payloads, which means a merge result
//! never aliases a structure still held by the caller.
//!
//! When two plain values meet at a key without an explicit op, a
//! default strategy is chosen from their shapes before recursing: two
//! sequences prepend, two mappings update, anything else replaces.

use crate::error::ConfigError;
use crate::value::{ConfigValue, Mapping};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Strategy {
    /// Replace the base value entirely.
    Overwrite,
    /// Append the payload sequence after the base sequence.
    Extend,
    /// Insert the payload sequence before the base sequence.
    Prepend,
    /// Recursively merge the payload mapping into the base mapping.
    Update,
}

impl Strategy {
    pub fn as_str(self) -> &'static str {
        match self {
            Strategy::Overwrite => "overwrite",
            Strategy::Extend => "extend",
            Strategy::Prepend => "prepend",
            Strategy::Update => "update",
        }
    }

    pub fn from_tag(name: &str) -> Option<Strategy> {
        match name {
            "overwrite" => Some(Strategy::Overwrite),
            "extend" => Some(Strategy::Extend),
            "prepend" => Some(Strategy::Prepend),
            "update" => Some(Strategy::Update),
            _ => None,
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct MergeOp {
    strategy: Strategy,
    payload: ConfigValue,
}

impl MergeOp {
    /// Replace whatever the lower layers put at this key. The usual
    /// escape hatch when prepend/update defaults are wrong for a
    /// sequence or mapping value.
    pub fn overwrite(payload: impl Into<ConfigValue>) -> MergeOp {
        MergeOp { strategy: Strategy::Overwrite, payload: payload.into() }
    }

    /// Append `payload` after the existing sequence.
    pub fn extend(payload: impl Into<ConfigValue>) -> Result<MergeOp, ConfigError> {
        MergeOp::with_strategy(Strategy::Extend, payload.into())
    }

    /// Insert `payload` before the existing sequence.
    pub fn prepend(payload: impl Into<ConfigValue>) -> Result<MergeOp, ConfigError> {
        MergeOp::with_strategy(Strategy::Prepend, payload.into())
    }

    /// Recursively merge `payload` into the existing mapping.
    pub fn update(payload: impl Into<ConfigValue>) -> Result<MergeOp, ConfigError> {
        MergeOp::with_strategy(Strategy::Update, payload.into())
    }

    pub fn with_strategy(strategy: Strategy, payload: ConfigValue) -> Result<MergeOp, ConfigError> {
        match strategy {
            Strategy::Extend | Strategy::Prepend if !payload.is_sequence() => {
                Err(ConfigError::MergeType {
                    strategy: strategy.as_str(),
                    expected: "sequence",
                    got: payload.type_name(),
                })
            }
            Strategy::Update if !payload.is_mapping() => Err(ConfigError::MergeType {
                strategy: strategy.as_str(),
                expected: "mapping",
                got: payload.type_name(),
            }),
            _ => Ok(MergeOp { strategy, payload }),
        }
    }

    pub fn strategy(&self) -> Strategy {
        self.strategy
    }

    pub fn payload(&self) -> &ConfigValue {
        &self.payload
    }

    /// Applies this op against the value beneath it. `None` means no
    /// lower layer ever set this key, in which case the payload stands
    /// alone (with any nested ops likewise resolved against nothing).
    pub fn apply(self, base: Option<ConfigValue>) -> Result<ConfigValue, ConfigError> {
        match self.strategy {
            Strategy::Overwrite => self.payload.into_plain(),
            Strategy::Extend => match base {
                None => self.payload.into_plain(),
                Some(ConfigValue::Sequence(mut items)) => {
                    let ConfigValue::Sequence(tail) = self.payload.into_plain()? else {
                        unreachable!("extend payload is shape-checked at construction");
                    };
                    items.extend(tail);
                    Ok(ConfigValue::Sequence(items))
                }
                Some(other) => {
                    Err(ConfigError::MergeBase { strategy: "extend", got: other.type_name() })
                }
            },
            Strategy::Prepend => match base {
                None => self.payload.into_plain(),
                Some(ConfigValue::Sequence(items)) => {
                    let ConfigValue::Sequence(mut head) = self.payload.into_plain()? else {
                        unreachable!("prepend payload is shape-checked at construction");
                    };
                    head.extend(items);
                    Ok(ConfigValue::Sequence(head))
                }
                Some(other) => {
                    Err(ConfigError::MergeBase { strategy: "prepend", got: other.type_name() })
                }
            },
            Strategy::Update => match base {
                None => self.payload.into_plain(),
                Some(ConfigValue::Mapping(base)) => {
                    let ConfigValue::Mapping(new) = self.payload else {
                        unreachable!("update payload is shape-checked at construction");
                    };
                    Ok(ConfigValue::Mapping(apply_update(new, base)?))
                }
                Some(other) => {
                    Err(ConfigError::MergeBase { strategy: "update", got: other.type_name() })
                }
            },
        }
    }
}

/// Merges `new` into `base`, recursively, honoring any embedded ops.
/// Keys only in `base` survive untouched; keys only in `new` are
/// inserted; keys in both merge under the shape-default strategy.
pub fn merge(new: Mapping, base: Mapping) -> Result<Mapping, ConfigError> {
    apply_update(new, base)
}

fn apply_update(new: Mapping, mut base: Mapping) -> Result<Mapping, ConfigError> {
    for (key, value) in new {
        match base.remove(&key) {
            Some(existing) => {
                let op = match value {
                    ConfigValue::Op(op) => *op,
                    ConfigValue::Sequence(items) if existing.is_sequence() => {
                        MergeOp { strategy: Strategy::Prepend, payload: ConfigValue::Sequence(items) }
                    }
                    ConfigValue::Mapping(m) if existing.is_mapping() => {
                        MergeOp { strategy: Strategy::Update, payload: ConfigValue::Mapping(m) }
                    }
                    replacement => {
                        base.insert(key, replacement.into_plain()?);
                        continue;
                    }
                };
                base.insert(key, op.apply(Some(existing))?);
            }
            None => {
                base.insert(key, value.into_plain()?);
            }
        }
    }
    Ok(base)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn seq(values: serde_json::Value) -> ConfigValue {
        ConfigValue::from_json(values)
    }

    fn map(values: serde_json::Value) -> Mapping {
        match ConfigValue::from_json(values) {
            ConfigValue::Mapping(m) => m,
            other => panic!("expected mapping, got {}", other.type_name()),
        }
    }

    #[test]
    fn test_extend_appends_after_base() {
        let op = MergeOp::extend(seq(json!([4, 5]))).expect("sequence payload");
        let merged = op.apply(Some(seq(json!([1, 2, 3])))).expect("merge");
        assert_eq!(merged, seq(json!([1, 2, 3, 4, 5])));
    }

    #[test]
    fn test_prepend_inserts_before_base() {
        let op = MergeOp::prepend(seq(json!([1, 2]))).expect("sequence payload");
        let merged = op.apply(Some(seq(json!([4, 5])))).expect("merge");
        assert_eq!(merged, seq(json!([1, 2, 4, 5])));
    }

    #[test]
    fn test_overwrite_ignores_base() {
        let op = MergeOp::overwrite(seq(json!({"only": "this"})));
        let merged = op.apply(Some(seq(json!([1, 2])))).expect("merge");
        assert_eq!(merged, seq(json!({"only": "this"})));
    }

    #[test]
    fn test_update_preserves_disjoint_keys() {
        let merged = merge(
            map(json!({"key1": "v1", "key2": "v2"})),
            map(json!({"key1": "v1 old", "key4": "v4"})),
        )
        .expect("merge");
        assert_eq!(merged, map(json!({"key1": "v1", "key2": "v2", "key4": "v4"})));
    }

    #[test]
    fn test_update_recurses_into_nested_mappings() {
        let merged = merge(
            map(json!({"key3": {"keyA": "vA", "keyB": "vB"}})),
            map(json!({"key3": {"keyA": "vA old", "keyC": "vC"}, "key4": "v4"})),
        )
        .expect("merge");
        assert_eq!(
            merged,
            map(json!({"key3": {"keyA": "vA", "keyB": "vB", "keyC": "vC"}, "key4": "v4"}))
        );
    }

    #[test]
    fn test_two_plain_sequences_default_to_prepend() {
        let merged = merge(map(json!({"xs": [1, 2]})), map(json!({"xs": [4, 5]}))).expect("merge");
        assert_eq!(merged, map(json!({"xs": [1, 2, 4, 5]})));
    }

    #[test]
    fn test_scalar_replaces_sequence() {
        let merged = merge(map(json!({"xs": "flat"})), map(json!({"xs": [4, 5]}))).expect("merge");
        assert_eq!(merged, map(json!({"xs": "flat"})));
    }

    #[test]
    fn test_explicit_op_inside_update() {
        let mut new = map(json!({}));
        new.insert(
            "xs".to_string(),
            ConfigValue::Op(Box::new(MergeOp::extend(seq(json!([9]))).expect("sequence payload"))),
        );
        let merged = merge(new, map(json!({"xs": [1]}))).expect("merge");
        assert_eq!(merged, map(json!({"xs": [1, 9]})));
    }

    #[test]
    fn test_op_on_fresh_key_applies_to_nothing() {
        let mut new = map(json!({}));
        new.insert(
            "xs".to_string(),
            ConfigValue::Op(Box::new(MergeOp::prepend(seq(json!([7]))).expect("sequence payload"))),
        );
        let merged = merge(new, map(json!({}))).expect("merge");
        assert_eq!(merged, map(json!({"xs": [7]})));
    }

    #[test]
    fn test_update_rejects_sequence_payload_at_construction() {
        let err = MergeOp::update(seq(json!([1, 2, 3]))).expect_err("sequence is not a mapping");
        assert!(matches!(err, ConfigError::MergeType { strategy: "update", .. }));
    }

    #[test]
    fn test_extend_rejects_mapping_payload_at_construction() {
        let err = MergeOp::extend(seq(json!({"a": 1}))).expect_err("mapping is not a sequence");
        assert!(matches!(err, ConfigError::MergeType { strategy: "extend", .. }));
    }

    #[test]
    fn test_extend_into_non_sequence_base_fails() {
        let op = MergeOp::extend(seq(json!([1]))).expect("sequence payload");
        let err = op.apply(Some(ConfigValue::Integer(3))).expect_err("base is not a sequence");
        assert!(matches!(err, ConfigError::MergeBase { strategy: "extend", .. }));
    }

    #[test]
    fn test_payload_is_owned_at_construction() {
        let mut original = vec![ConfigValue::Integer(1)];
        let op = MergeOp::extend(ConfigValue::Sequence(original.clone())).expect("sequence");
        original.push(ConfigValue::Integer(2));
        let merged = op.apply(Some(seq(json!([0])))).expect("merge");
        assert_eq!(merged, seq(json!([0, 1])));
    }
}
