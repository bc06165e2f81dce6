//! The configuration context and initialization orchestrator
//!
//! `ConfigContext` owns everything that was ambient process state in
//! older config systems: the defaults providers, the declaration
//! registry, a snapshot of the environment, and the home directory.
//! Tests get isolation by building a fresh context, not by mutating
//! shared globals.
//!
//! `init_all` is the boot step: materialize the layered tree, resolve
//! templates, then parse every declared parameter in declaration order
//! and populate the containers. Any failure aborts the whole run and
//! rolls the context back to `Uninitialized`; there is no partially
//! ready state.

use crate::channel::{Channel, CHANNEL_ENV};
use crate::error::ConfigError;
use crate::registry::{param_env_var, split_module, InitHook, ParamDecl, Params, Registry};
use crate::store::{ChannelDefaults, ConfigStore, EnvMap};
use crate::template;
use crate::value::{ConfigValue, Mapping};
use std::collections::BTreeMap;
use std::path::PathBuf;
use tracing::debug;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum InitState {
    #[default]
    Uninitialized,
    Materializing,
    Resolving,
    Parsing,
    Ready,
}

#[derive(Default)]
pub struct ConfigContext {
    env: EnvMap,
    home: Option<PathBuf>,
    store: ConfigStore,
    registry: Registry,
    state: InitState,
    tree: Mapping,
}

impl ConfigContext {
    /// Context backed by the real process environment and home
    /// directory.
    pub fn new() -> ConfigContext {
        ConfigContext {
            env: std::env::vars().collect(),
            home: dirs::home_dir(),
            ..ConfigContext::default()
        }
    }

    /// Context with a fully explicit environment; the natural
    /// constructor for tests.
    pub fn with_env(env: EnvMap) -> ConfigContext {
        ConfigContext { env, ..ConfigContext::default() }
    }

    pub fn set_env_var(&mut self, name: &str, value: &str) {
        self.env.insert(name.to_string(), value.to_string());
    }

    pub fn set_home_dir(&mut self, home: impl Into<PathBuf>) {
        self.home = Some(home.into());
    }

    pub fn register_defaults(&mut self, package: &str, defaults: ChannelDefaults) {
        self.store.register_defaults(package, defaults);
    }

    /// Adds an override file merged above the env-named file layer.
    pub fn add_file(&mut self, path: impl Into<PathBuf>) {
        self.store.add_file(path.into());
    }

    /// Queues a fragment above every file layer; individual env vars
    /// still win. Call before `init_all`. Intended for tests.
    pub fn inject_values(&mut self, fragment: Mapping) {
        self.store.inject(fragment);
    }

    /// Declares a module's parameters; see [`Registry::declare`].
    pub fn declare(
        &mut self,
        module: &str,
        decls: Vec<(&str, ParamDecl)>,
    ) -> Result<Params, ConfigError> {
        self.registry.declare(module, decls)
    }

    /// Attaches a hook run after the module's container is populated.
    pub fn on_init(
        &mut self,
        module: &str,
        hook: impl Fn(&Params) -> Result<(), String> + Send + Sync + 'static,
    ) -> Result<(), ConfigError> {
        self.registry.set_hook(module, hook)
    }

    pub fn state(&self) -> InitState {
        self.state
    }

    /// Active channel per the environment snapshot, default dev.
    pub fn channel(&self) -> Result<Channel, ConfigError> {
        match self.env.get(CHANNEL_ENV) {
            Some(name) => Channel::from_name(name),
            None => Ok(Channel::default()),
        }
    }

    /// The resolved tree; only readable once `init_all` has finished.
    pub fn tree(&self) -> Result<&Mapping, ConfigError> {
        if self.state != InitState::Ready {
            return Err(ConfigError::NotReady);
        }
        Ok(&self.tree)
    }

    /// Boots configuration for `root`: materialize, resolve templates,
    /// parse every declared parameter in declaration order, populate
    /// the containers, and run post-init hooks. All-or-nothing.
    pub fn init_all(&mut self, root: &str) -> Result<(), ConfigError> {
        let result = self.try_init(root);
        if result.is_err() {
            self.registry.reset_containers();
            self.tree.clear();
            self.state = InitState::Uninitialized;
        }
        result
    }

    /// Returns a ready context to `Uninitialized` and empties every
    /// container, so a re-run repopulates rather than accumulates.
    /// Declarations, providers, and injected fragments survive.
    pub fn reset(&mut self) {
        self.registry.reset_containers();
        self.tree.clear();
        self.state = InitState::Uninitialized;
    }

    fn try_init(&mut self, root: &str) -> Result<(), ConfigError> {
        let channel = self.channel()?;
        debug!(root, %channel, "materializing configuration");
        self.state = InitState::Materializing;
        let mut tree = self.store.materialize(root, channel, &self.env, self.home.as_deref())?;

        self.state = InitState::Resolving;
        template::resolve_tree(&mut tree)?;

        self.state = InitState::Parsing;
        for entry in self.registry.entries() {
            let (pkg_root, submodule) = split_module(&entry.module);
            let mut values = BTreeMap::new();
            for (name, decl) in &entry.decls {
                let value = resolve_param(
                    &tree,
                    &self.env,
                    &entry.module,
                    pkg_root,
                    submodule,
                    name,
                    decl,
                )?;
                values.insert(name.clone(), value);
            }
            entry.params.populate(values);
            run_hook(&entry.module, entry.hook.as_ref(), &entry.params)?;
            debug!(module = %entry.module, "module parameters initialized");
        }

        self.tree = tree;
        self.state = InitState::Ready;
        Ok(())
    }
}

/// One parameter's value. The tree leaf comes first: the env layer
/// already overwrote it during materialization and template resolution
/// already expanded it, so reading the env var here instead would hand
/// the parser a string with unexpanded placeholders. The raw env var
/// is consulted only for parameters no layer put in the tree, then the
/// declared default applies verbatim. Defaults bypass the parser:
/// parsers convert external representations, while defaults are
/// written pre-typed.
fn resolve_param(
    tree: &Mapping,
    env: &EnvMap,
    module: &str,
    pkg_root: &str,
    submodule: &str,
    name: &str,
    decl: &ParamDecl,
) -> Result<ConfigValue, ConfigError> {
    if let Some(raw) = lookup_leaf(tree, pkg_root, submodule, name) {
        return run_parser(decl, raw, module, name);
    }
    if let Some(raw) = env.get(&param_env_var(module, name)) {
        return run_parser(decl, &ConfigValue::String(raw.clone()), module, name);
    }
    Ok(decl.default.clone())
}

fn lookup_leaf<'a>(
    tree: &'a Mapping,
    pkg_root: &str,
    submodule: &str,
    name: &str,
) -> Option<&'a ConfigValue> {
    tree.get(pkg_root)?.as_mapping()?.get(submodule)?.as_mapping()?.get(name)
}

fn run_parser(
    decl: &ParamDecl,
    raw: &ConfigValue,
    module: &str,
    name: &str,
) -> Result<ConfigValue, ConfigError> {
    (decl.parser)(raw).map_err(|reason| ConfigError::ParamParse {
        module: module.to_string(),
        name: name.to_string(),
        raw: raw.display_string(),
        reason,
    })
}

fn run_hook(module: &str, hook: Option<&InitHook>, params: &Params) -> Result<(), ConfigError> {
    if let Some(hook) = hook {
        hook(params)
            .map_err(|reason| ConfigError::InitHook { module: module.to_string(), reason })?;
    }
    Ok(())
}
