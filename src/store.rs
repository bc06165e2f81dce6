//! Layered materialization of the merged configuration tree
//!
//! Layers, in increasing precedence:
//!
//! 1. registered channel-defaults providers, base package first, then
//!    the root package;
//! 2. home-directory override files (`~/.confstack_conf.toml`, then
//!    `~/.<root>_conf.toml`, yaml/yml accepted);
//! 3. files named by `CONFSTACK_CONF_FILE` and `<ROOT>_CONF_FILE`;
//! 4. files passed explicitly (the inspection CLI's `--file`);
//! 5. injected fragments (test hook);
//! 6. per-parameter environment variables `<ROOT>_<SUBMODULE>_<PARAM>`,
//!    which overwrite leaves verbatim and bypass merge strategies.
//!
//! A probe that finds nothing (no provider registered, no dotfile) is
//! skipped with a debug log. A source that is present but malformed is
//! fatal, as is a `*_CONF_FILE` variable naming a file that does not
//! exist.

use crate::channel::Channel;
use crate::error::ConfigError;
use crate::merge::merge;
use crate::value::{ConfigValue, Mapping};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

/// The base framework package; its defaults and dotfile are always the
/// lowest layers, whatever the root package is.
pub const BASE_PACKAGE: &str = "confstack";

/// Snapshot of process environment variables, taken once when the
/// context is built so initialization never races with env mutation.
pub type EnvMap = BTreeMap<String, String>;

type DefaultsFn = Box<dyn Fn() -> Mapping + Send + Sync>;

/// Per-channel defaults for one package, registered in code. The
/// function for the active channel supplies that package's fragment; a
/// missing function means the package has nothing to say on that
/// channel.
#[derive(Default)]
pub struct ChannelDefaults {
    dev: Option<DefaultsFn>,
    alpha: Option<DefaultsFn>,
    beta: Option<DefaultsFn>,
    prod: Option<DefaultsFn>,
}

impl ChannelDefaults {
    pub fn new() -> ChannelDefaults {
        ChannelDefaults::default()
    }

    pub fn dev(mut self, f: impl Fn() -> Mapping + Send + Sync + 'static) -> Self {
        self.dev = Some(Box::new(f));
        self
    }

    pub fn alpha(mut self, f: impl Fn() -> Mapping + Send + Sync + 'static) -> Self {
        self.alpha = Some(Box::new(f));
        self
    }

    pub fn beta(mut self, f: impl Fn() -> Mapping + Send + Sync + 'static) -> Self {
        self.beta = Some(Box::new(f));
        self
    }

    pub fn prod(mut self, f: impl Fn() -> Mapping + Send + Sync + 'static) -> Self {
        self.prod = Some(Box::new(f));
        self
    }

    fn for_channel(&self, channel: Channel) -> Option<&DefaultsFn> {
        match channel {
            Channel::Dev => self.dev.as_ref(),
            Channel::Alpha => self.alpha.as_ref(),
            Channel::Beta => self.beta.as_ref(),
            Channel::Prod => self.prod.as_ref(),
        }
    }
}

#[derive(Default)]
pub struct ConfigStore {
    providers: Vec<(String, ChannelDefaults)>,
    extra_files: Vec<PathBuf>,
    injected: Vec<Mapping>,
}

impl ConfigStore {
    pub fn new() -> ConfigStore {
        ConfigStore::default()
    }

    /// Registers (or replaces) the defaults provider for a package.
    pub fn register_defaults(&mut self, package: &str, defaults: ChannelDefaults) {
        if let Some(slot) = self.providers.iter_mut().find(|(name, _)| name == package) {
            slot.1 = defaults;
        } else {
            self.providers.push((package.to_string(), defaults));
        }
    }

    /// Adds an override file merged above the env-named files.
    pub fn add_file(&mut self, path: PathBuf) {
        self.extra_files.push(path);
    }

    /// Queues a fragment merged above every file layer. Individual env
    /// vars still win. Intended for tests.
    pub fn inject(&mut self, fragment: Mapping) {
        self.injected.push(fragment);
    }

    pub fn materialize(
        &self,
        root: &str,
        channel: Channel,
        env: &EnvMap,
        home: Option<&Path>,
    ) -> Result<Mapping, ConfigError> {
        let mut packages = vec![BASE_PACKAGE];
        if root != BASE_PACKAGE {
            packages.push(root);
        }
        let mut tree = Mapping::new();

        for package in packages.iter().copied() {
            match self.providers.iter().find(|(name, _)| name == package) {
                Some((_, defaults)) => match defaults.for_channel(channel) {
                    Some(f) => {
                        let fragment = f();
                        validate_tree(&fragment).map_err(|reason| ConfigError::Source {
                            path: format!("{package} defaults ({channel})"),
                            reason,
                        })?;
                        debug!(package, %channel, "merging registered defaults");
                        tree = merge(fragment, tree)?;
                    }
                    None => debug!(package, %channel, "no defaults for channel, skipping"),
                },
                None => debug!(package, "no defaults provider registered, skipping"),
            }
        }

        if let Some(home) = home {
            for package in packages.iter().copied() {
                match find_dotfile(home, package) {
                    Some(path) => {
                        debug!(path = %path.display(), "merging home override file");
                        tree = merge(load_channel_file(&path, channel)?, tree)?;
                    }
                    None => debug!(package, "no home override file, skipping"),
                }
            }
        }

        for var in conf_file_vars(root) {
            if let Some(named) = env.get(&var) {
                let path = PathBuf::from(named);
                if !path.exists() {
                    return Err(ConfigError::Source {
                        path: named.clone(),
                        reason: format!("${var} names a file that does not exist"),
                    });
                }
                debug!(path = %path.display(), %var, "merging env-named override file");
                tree = merge(load_channel_file(&path, channel)?, tree)?;
            }
        }

        for path in &self.extra_files {
            tree = merge(load_channel_file(path, channel)?, tree)?;
        }

        for fragment in &self.injected {
            validate_tree(fragment)
                .map_err(|reason| ConfigError::Source { path: "injected values".to_string(), reason })?;
            tree = merge(fragment.clone(), tree)?;
        }

        apply_env_overrides(&mut tree, env);
        Ok(tree)
    }
}

/// Env var names for the file-path overrides, base package first.
fn conf_file_vars(root: &str) -> Vec<String> {
    let base = format!("{}_CONF_FILE", env_ident(BASE_PACKAGE));
    let rooted = format!("{}_CONF_FILE", env_ident(root));
    if rooted == base {
        vec![base]
    } else {
        vec![base, rooted]
    }
}

/// Uppercases and joins a dotted name into env-var form:
/// `my-app.net.http` becomes `MY_APP_NET_HTTP`.
pub fn env_ident(name: &str) -> String {
    name.to_uppercase().replace(['.', '-'], "_")
}

/// Highest-precedence layer: an env var named after the fully
/// qualified parameter replaces the leaf with its raw string.
fn apply_env_overrides(tree: &mut Mapping, env: &EnvMap) {
    let mut hits = Vec::new();
    for (root, submodules) in tree.iter() {
        let ConfigValue::Mapping(submodules) = submodules else { continue };
        for (submodule, params) in submodules {
            let ConfigValue::Mapping(params) = params else { continue };
            for param in params.keys() {
                let var =
                    format!("{}_{}_{}", env_ident(root), env_ident(submodule), env_ident(param));
                if let Some(raw) = env.get(&var) {
                    debug!(%var, "applying env override");
                    hits.push((root.clone(), submodule.clone(), param.clone(), raw.clone()));
                }
            }
        }
    }
    for (root, submodule, param, raw) in hits {
        let Some(ConfigValue::Mapping(submodules)) = tree.get_mut(&root) else { continue };
        let Some(ConfigValue::Mapping(params)) = submodules.get_mut(&submodule) else { continue };
        params.insert(param, ConfigValue::String(raw));
    }
}

fn find_dotfile(home: &Path, package: &str) -> Option<PathBuf> {
    for ext in ["toml", "yaml", "yml"] {
        let path = home.join(format!(".{package}_conf.{ext}"));
        if path.exists() {
            return Some(path);
        }
    }
    None
}

/// Loads one override file and extracts the active channel's fragment.
/// The file must be a TOML or YAML document whose top-level tables are
/// channel names; missing the active channel's table is fatal.
pub fn load_channel_file(path: &Path, channel: Channel) -> Result<Mapping, ConfigError> {
    let display = path.display().to_string();
    let content = fs::read_to_string(path)
        .map_err(|e| ConfigError::Source { path: display.clone(), reason: e.to_string() })?;
    let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("").to_ascii_lowercase();
    let value = match ext.as_str() {
        "toml" => {
            let raw: toml::Value = toml::from_str(&content).map_err(|e| ConfigError::Source {
                path: display.clone(),
                reason: e.to_string(),
            })?;
            ConfigValue::from_toml(raw)
        }
        "yaml" | "yml" => {
            let raw: serde_yaml::Value =
                serde_yaml::from_str(&content).map_err(|e| ConfigError::Source {
                    path: display.clone(),
                    reason: e.to_string(),
                })?;
            ConfigValue::from_yaml(raw)
        }
        other => {
            return Err(ConfigError::Source {
                path: display,
                reason: format!("unsupported extension '.{other}', expected .toml/.yaml/.yml"),
            })
        }
    }
    .map_err(|reason| ConfigError::Source { path: display.clone(), reason })?;

    let ConfigValue::Mapping(mut doc) = value else {
        return Err(ConfigError::Source {
            path: display,
            reason: "top level must be a mapping of channel tables".to_string(),
        });
    };
    let Some(fragment) = doc.remove(channel.as_str()) else {
        return Err(ConfigError::MissingChannelTable { path: display, channel });
    };
    let ConfigValue::Mapping(fragment) = fragment else {
        return Err(ConfigError::Source {
            path: display,
            reason: format!("`{channel}` table must be a mapping"),
        });
    };
    validate_tree(&fragment).map_err(|reason| ConfigError::Source { path: display, reason })?;
    Ok(fragment)
}

/// Checks the root-package -> submodule -> params shape of a fragment.
/// Merge ops are allowed in place of the inner mappings.
pub fn validate_tree(fragment: &Mapping) -> Result<(), String> {
    for (root, submodules) in fragment {
        match submodules {
            ConfigValue::Op(_) => continue,
            ConfigValue::Mapping(submodules) => {
                for (submodule, params) in submodules {
                    if !params.is_mapping() && !matches!(params, ConfigValue::Op(_)) {
                        return Err(format!(
                            "{root}.{submodule}: expected a parameter mapping, got {}",
                            params.type_name()
                        ));
                    }
                }
            }
            other => {
                return Err(format!(
                    "{root}: expected a submodule mapping, got {}",
                    other.type_name()
                ))
            }
        }
    }
    Ok(())
}
