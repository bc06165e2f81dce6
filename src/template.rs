//! Placeholder resolution over the merged tree
//!
//! String leaves may reference other configuration values with
//! `{{root.submodule.param}}` placeholders. Resolution runs only after
//! the full layer merge, substitutes the string form of the referenced
//! raw (not-yet-parsed) value, and repeats until no placeholders remain.
//! A placeholder naming an absent key fails immediately; a chain that
//! never settles within [`MAX_PASSES`] is reported as cyclic.

use crate::error::ConfigError;
use crate::value::{ConfigValue, Mapping};
use once_cell::sync::Lazy;
use regex::Regex;

/// Iteration bound before a still-unresolved placeholder is treated as
/// a cyclic reference.
pub const MAX_PASSES: usize = 10;

static PLACEHOLDER_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\{\{\s*([A-Za-z0-9_][A-Za-z0-9_.\-]*)\s*\}\}").expect("valid regex")
});

/// Expands placeholders in every string leaf of `tree`, in place.
pub fn resolve_tree(tree: &mut Mapping) -> Result<(), ConfigError> {
    for _ in 0..MAX_PASSES {
        let snapshot = tree.clone();
        let mut changed = false;
        for (key, value) in tree.iter_mut() {
            resolve_node(value, key, &snapshot, &mut changed)?;
        }
        if !changed {
            return Ok(());
        }
    }
    match first_placeholder(tree) {
        Some((key, placeholder)) => {
            Err(ConfigError::CyclicTemplate { key, placeholder, passes: MAX_PASSES })
        }
        None => Ok(()),
    }
}

fn resolve_node(
    value: &mut ConfigValue,
    key: &str,
    snapshot: &Mapping,
    changed: &mut bool,
) -> Result<(), ConfigError> {
    match value {
        ConfigValue::String(s) => {
            if let Some(expanded) = expand(s, key, snapshot)? {
                *s = expanded;
                *changed = true;
            }
            Ok(())
        }
        ConfigValue::Mapping(m) => {
            for (k, v) in m.iter_mut() {
                resolve_node(v, &format!("{key}.{k}"), snapshot, changed)?;
            }
            Ok(())
        }
        ConfigValue::Sequence(items) => {
            for v in items.iter_mut() {
                resolve_node(v, key, snapshot, changed)?;
            }
            Ok(())
        }
        _ => Ok(()),
    }
}

/// Substitutes every placeholder in `s`, returning `None` when the
/// string contains none. An unresolvable reference is fatal and names
/// both the key being resolved and the placeholder text.
fn expand(s: &str, key: &str, snapshot: &Mapping) -> Result<Option<String>, ConfigError> {
    let mut out = String::new();
    let mut last = 0;
    let mut hit = false;
    for caps in PLACEHOLDER_RE.captures_iter(s) {
        let whole = caps.get(0).map(|m| (m.start(), m.end())).unwrap_or((0, 0));
        let path = &caps[1];
        let segments: Vec<&str> = path.split('.').collect();
        let Some(referenced) = lookup(snapshot, &segments) else {
            return Err(ConfigError::UnresolvedPlaceholder {
                key: key.to_string(),
                placeholder: path.to_string(),
            });
        };
        out.push_str(&s[last..whole.0]);
        out.push_str(&referenced.display_string());
        last = whole.1;
        hit = true;
    }
    if !hit {
        return Ok(None);
    }
    out.push_str(&s[last..]);
    Ok(Some(out))
}

/// Walks a dotted path through nested mappings. Module keys may
/// themselves contain dots, so at each level the longest dotted prefix
/// that names a key wins.
fn lookup<'a>(m: &'a Mapping, segments: &[&str]) -> Option<&'a ConfigValue> {
    for take in (1..=segments.len()).rev() {
        let key = segments[..take].join(".");
        if let Some(v) = m.get(&key) {
            if take == segments.len() {
                return Some(v);
            }
            if let ConfigValue::Mapping(inner) = v {
                if let Some(found) = lookup(inner, &segments[take..]) {
                    return Some(found);
                }
            }
        }
    }
    None
}

fn first_placeholder(tree: &Mapping) -> Option<(String, String)> {
    fn walk(value: &ConfigValue, key: &str) -> Option<(String, String)> {
        match value {
            ConfigValue::String(s) => PLACEHOLDER_RE
                .captures(s)
                .map(|caps| (key.to_string(), caps[1].to_string())),
            ConfigValue::Mapping(m) => {
                m.iter().find_map(|(k, v)| walk(v, &format!("{key}.{k}")))
            }
            ConfigValue::Sequence(items) => items.iter().find_map(|v| walk(v, key)),
            _ => None,
        }
    }
    tree.iter().find_map(|(k, v)| walk(v, k))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn tree(values: serde_json::Value) -> Mapping {
        match ConfigValue::from_json(values) {
            ConfigValue::Mapping(m) => m,
            other => panic!("expected mapping, got {}", other.type_name()),
        }
    }

    #[test]
    fn test_simple_substitution() {
        let mut t = tree(json!({
            "my_app": {"server": {
                "run_dir": "/srv/run",
                "db": "sqlite://{{my_app.server.run_dir}}/app.db",
            }},
        }));
        resolve_tree(&mut t).expect("resolve");
        let db = lookup(&t, &["my_app", "server", "db"]).expect("present");
        assert_eq!(db, &ConfigValue::String("sqlite:///srv/run/app.db".to_string()));
    }

    #[test]
    fn test_chained_references_reach_fixed_point() {
        let mut t = tree(json!({
            "app": {"m": {
                "a": "base",
                "b": "{{app.m.a}}/mid",
                "c": "{{app.m.b}}/leaf",
            }},
        }));
        resolve_tree(&mut t).expect("resolve");
        let c = lookup(&t, &["app", "m", "c"]).expect("present");
        assert_eq!(c, &ConfigValue::String("base/mid/leaf".to_string()));
    }

    #[test]
    fn test_no_placeholders_is_idempotent() {
        let original = tree(json!({"app": {"m": {"x": "plain {not a placeholder}"}}}));
        let mut t = original.clone();
        resolve_tree(&mut t).expect("resolve");
        assert_eq!(t, original);
    }

    #[test]
    fn test_non_string_leaves_pass_through() {
        let original = tree(json!({"app": {"m": {"n": 5, "f": 1.5, "xs": [1, 2]}}}));
        let mut t = original.clone();
        resolve_tree(&mut t).expect("resolve");
        assert_eq!(t, original);
    }

    #[test]
    fn test_non_string_reference_uses_display_form() {
        let mut t = tree(json!({
            "app": {"m": {"port": 8080, "url": "http://host:{{app.m.port}}/"}},
        }));
        resolve_tree(&mut t).expect("resolve");
        let url = lookup(&t, &["app", "m", "url"]).expect("present");
        assert_eq!(url, &ConfigValue::String("http://host:8080/".to_string()));
    }

    #[test]
    fn test_unknown_reference_names_key_and_placeholder() {
        let mut t = tree(json!({"app": {"m": {"x": "{{app.m.missing}}"}}}));
        let err = resolve_tree(&mut t).expect_err("missing reference");
        let ConfigError::UnresolvedPlaceholder { key, placeholder } = err else {
            panic!("expected UnresolvedPlaceholder, got {err}");
        };
        assert_eq!(key, "app.m.x");
        assert_eq!(placeholder, "app.m.missing");
    }

    #[test]
    fn test_cycle_is_reported() {
        let mut t = tree(json!({
            "app": {"m": {"a": "{{app.m.b}}", "b": "{{app.m.a}}"}},
        }));
        let err = resolve_tree(&mut t).expect_err("cycle");
        assert!(matches!(err, ConfigError::CyclicTemplate { .. }));
    }

    #[test]
    fn test_dotted_module_key_resolves() {
        let mut t = tree(json!({
            "app": {"net.http": {"host": "h", "url": "{{app.net.http.host}}:80"}},
        }));
        resolve_tree(&mut t).expect("resolve");
        let url = lookup(&t, &["app", "net.http", "url"]).expect("present");
        assert_eq!(url, &ConfigValue::String("h:80".to_string()));
    }
}
