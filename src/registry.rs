//! Parameter declarations and the per-module value container
//!
//! A module declares its parameters once, each as a (default, parser,
//! description) triple, and gets back a [`Params`] container. The
//! container stays empty until the orchestrator runs; reads before then
//! fail with `NotReady` rather than observing partial state. Entries
//! are kept in declaration order because initialization replays them in
//! that order.

use crate::error::ConfigError;
use crate::value::ConfigValue;
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::BTreeMap;
use std::sync::{Arc, RwLock};
use tracing::debug;

static PARAM_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new("^[a-z][a-z0-9_]*$").expect("valid regex"));

/// Converts a raw merged value (possibly an env-var string) into the
/// parameter's canonical value, or explains why it cannot.
pub type ParserFn = Arc<dyn Fn(&ConfigValue) -> Result<ConfigValue, String> + Send + Sync>;

/// Called once the module's container is fully populated.
pub type InitHook = Box<dyn Fn(&Params) -> Result<(), String> + Send + Sync>;

#[derive(Clone)]
pub struct ParamDecl {
    pub default: ConfigValue,
    pub parser: ParserFn,
    pub description: String,
}

impl ParamDecl {
    pub fn new(
        default: impl Into<ConfigValue>,
        parser: impl Fn(&ConfigValue) -> Result<ConfigValue, String> + Send + Sync + 'static,
        description: &str,
    ) -> ParamDecl {
        ParamDecl {
            default: default.into(),
            parser: Arc::new(parser),
            description: description.to_string(),
        }
    }
}

#[derive(Debug, Default)]
struct ParamsInner {
    ready: bool,
    values: BTreeMap<String, ConfigValue>,
}

/// Container for one module's resolved parameter values. Cheap to
/// clone; all clones observe the same population/reset. Only the
/// orchestrator writes to it.
#[derive(Clone, Debug, Default)]
pub struct Params {
    inner: Arc<RwLock<ParamsInner>>,
}

impl Params {
    pub fn new() -> Params {
        Params::default()
    }

    pub fn is_ready(&self) -> bool {
        self.read().ready
    }

    pub fn get(&self, name: &str) -> Result<ConfigValue, ConfigError> {
        let inner = self.read();
        if !inner.ready {
            return Err(ConfigError::NotReady);
        }
        inner.values.get(name).cloned().ok_or_else(|| ConfigError::UnknownParam(name.to_string()))
    }

    pub fn str(&self, name: &str) -> Result<String, ConfigError> {
        match self.get(name)? {
            ConfigValue::String(s) => Ok(s),
            other => Err(wrong_type(name, "string", &other)),
        }
    }

    pub fn int(&self, name: &str) -> Result<i64, ConfigError> {
        match self.get(name)? {
            ConfigValue::Integer(i) => Ok(i),
            other => Err(wrong_type(name, "integer", &other)),
        }
    }

    pub fn float(&self, name: &str) -> Result<f64, ConfigError> {
        match self.get(name)? {
            ConfigValue::Float(f) => Ok(f),
            ConfigValue::Integer(i) => Ok(i as f64),
            other => Err(wrong_type(name, "float", &other)),
        }
    }

    pub fn bool(&self, name: &str) -> Result<bool, ConfigError> {
        match self.get(name)? {
            ConfigValue::Bool(b) => Ok(b),
            other => Err(wrong_type(name, "bool", &other)),
        }
    }

    pub fn seq(&self, name: &str) -> Result<Vec<ConfigValue>, ConfigError> {
        match self.get(name)? {
            ConfigValue::Sequence(items) => Ok(items),
            other => Err(wrong_type(name, "sequence", &other)),
        }
    }

    pub(crate) fn populate(&self, values: BTreeMap<String, ConfigValue>) {
        let mut inner = self.write();
        inner.values = values;
        inner.ready = true;
    }

    pub(crate) fn clear(&self) {
        let mut inner = self.write();
        inner.values.clear();
        inner.ready = false;
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, ParamsInner> {
        self.inner.read().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, ParamsInner> {
        self.inner.write().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

fn wrong_type(name: &str, expected: &'static str, got: &ConfigValue) -> ConfigError {
    ConfigError::WrongType { name: name.to_string(), expected, got: got.type_name() }
}

pub(crate) struct ModuleEntry {
    pub module: String,
    pub decls: Vec<(String, ParamDecl)>,
    pub params: Params,
    pub hook: Option<InitHook>,
}

#[derive(Default)]
pub struct Registry {
    entries: Vec<ModuleEntry>,
}

impl Registry {
    pub fn new() -> Registry {
        Registry::default()
    }

    /// Declares a module's parameters and returns its container. The
    /// container is populated during orchestrated initialization, not
    /// here. Declaring the same module key again resets its entry
    /// (test re-initialization), it never merges.
    pub fn declare(
        &mut self,
        module: &str,
        decls: Vec<(&str, ParamDecl)>,
    ) -> Result<Params, ConfigError> {
        if module.split('.').count() < 2 || module.split('.').any(str::is_empty) {
            return Err(ConfigError::ModuleKey(module.to_string()));
        }
        let mut named = Vec::with_capacity(decls.len());
        for (name, decl) in decls {
            if !PARAM_RE.is_match(name) {
                return Err(ConfigError::BadParamName {
                    module: module.to_string(),
                    name: name.to_string(),
                });
            }
            if named.iter().any(|(n, _): &(String, ParamDecl)| n == name) {
                return Err(ConfigError::DuplicateDeclaration {
                    module: module.to_string(),
                    name: name.to_string(),
                });
            }
            named.push((name.to_string(), decl));
        }
        if let Some(entry) = self.entries.iter_mut().find(|e| e.module == module) {
            debug!(module, "re-declaring module, resetting its entry");
            entry.decls = named;
            entry.params.clear();
            entry.hook = None;
            return Ok(entry.params.clone());
        }
        let params = Params::new();
        self.entries.push(ModuleEntry {
            module: module.to_string(),
            decls: named,
            params: params.clone(),
            hook: None,
        });
        Ok(params)
    }

    /// Attaches the post-init hook for an already declared module.
    pub fn set_hook(
        &mut self,
        module: &str,
        hook: impl Fn(&Params) -> Result<(), String> + Send + Sync + 'static,
    ) -> Result<(), ConfigError> {
        let entry = self
            .entries
            .iter_mut()
            .find(|e| e.module == module)
            .ok_or_else(|| ConfigError::UnknownModule(module.to_string()))?;
        entry.hook = Some(Box::new(hook));
        Ok(())
    }

    pub(crate) fn entries(&self) -> &[ModuleEntry] {
        &self.entries
    }

    pub(crate) fn reset_containers(&self) {
        for entry in &self.entries {
            entry.params.clear();
        }
    }
}

/// Stock parsers for the common parameter shapes. Each accepts both
/// the natural typed value (from a defaults provider or file) and the
/// string form an environment variable supplies.
pub mod parsers {
    use super::*;

    pub fn string(v: &ConfigValue) -> Result<ConfigValue, String> {
        match v {
            ConfigValue::String(_) => Ok(v.clone()),
            ConfigValue::Integer(_) | ConfigValue::Float(_) | ConfigValue::Bool(_) => {
                Ok(ConfigValue::String(v.display_string()))
            }
            other => Err(format!("expected a string, got {}", other.type_name())),
        }
    }

    pub fn int(v: &ConfigValue) -> Result<ConfigValue, String> {
        match v {
            ConfigValue::Integer(_) => Ok(v.clone()),
            ConfigValue::String(s) => s
                .trim()
                .parse::<i64>()
                .map(ConfigValue::Integer)
                .map_err(|e| format!("not an integer: {e}")),
            other => Err(format!("expected an integer, got {}", other.type_name())),
        }
    }

    pub fn float(v: &ConfigValue) -> Result<ConfigValue, String> {
        match v {
            ConfigValue::Float(_) => Ok(v.clone()),
            ConfigValue::Integer(i) => Ok(ConfigValue::Float(*i as f64)),
            ConfigValue::String(s) => s
                .trim()
                .parse::<f64>()
                .map(ConfigValue::Float)
                .map_err(|e| format!("not a float: {e}")),
            other => Err(format!("expected a float, got {}", other.type_name())),
        }
    }

    pub fn bool(v: &ConfigValue) -> Result<ConfigValue, String> {
        match v {
            ConfigValue::Bool(_) => Ok(v.clone()),
            ConfigValue::String(s) => match s.trim().to_ascii_lowercase().as_str() {
                "1" | "true" | "yes" | "on" => Ok(ConfigValue::Bool(true)),
                "" | "0" | "false" | "no" | "off" => Ok(ConfigValue::Bool(false)),
                other => Err(format!("not a boolean: {other:?}")),
            },
            other => Err(format!("expected a bool, got {}", other.type_name())),
        }
    }

    /// Sequence of strings; env vars supply them comma-separated.
    pub fn string_seq(v: &ConfigValue) -> Result<ConfigValue, String> {
        match v {
            ConfigValue::Sequence(items) => Ok(ConfigValue::Sequence(
                items.iter().map(string).collect::<Result<_, _>>()?,
            )),
            ConfigValue::String(s) => Ok(ConfigValue::Sequence(
                s.split(',')
                    .map(str::trim)
                    .filter(|p| !p.is_empty())
                    .map(|p| ConfigValue::String(p.to_string()))
                    .collect(),
            )),
            other => Err(format!("expected a sequence, got {}", other.type_name())),
        }
    }
}

/// Builds the env-var name that overrides one parameter:
/// `my_app.server` + `port` becomes `MY_APP_SERVER_PORT`.
pub fn param_env_var(module: &str, name: &str) -> String {
    format!("{}_{}", crate::store::env_ident(module), crate::store::env_ident(name))
}

/// Splits a module key into (root package, submodule path).
pub(crate) fn split_module(module: &str) -> (&str, &str) {
    match module.split_once('.') {
        Some((root, submodule)) => (root, submodule),
        None => (module, ""),
    }
}
