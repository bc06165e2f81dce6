//! Error taxonomy for configuration loading, merging, and initialization
//!
//! Everything here is fatal at process startup except where the store
//! explicitly probes for an optional source. Declaration-time errors
//! (bad names, duplicate params) indicate programming errors in the
//! consuming module; source errors indicate authoring errors in a
//! defaults provider or override file.

use crate::channel::Channel;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{0}: invalid channel, must be one of: dev, alpha, beta, prod")]
    InvalidChannel(String),

    #[error("{0}: module key must be dotted (package.module)")]
    ModuleKey(String),

    #[error("{module}.{name}: parameter name must be a lowercase identifier (no leading underscore)")]
    BadParamName { module: String, name: String },

    #[error("{module}.{name}: parameter declared more than once")]
    DuplicateDeclaration { module: String, name: String },

    #[error("{strategy} payload must be a {expected}, got {got}")]
    MergeType { strategy: &'static str, expected: &'static str, got: &'static str },

    #[error("cannot {strategy} into existing value of type {got}")]
    MergeBase { strategy: &'static str, got: &'static str },

    #[error("{path}: {reason}")]
    Source { path: String, reason: String },

    #[error("{path}: no `{channel}` table in configuration source")]
    MissingChannelTable { path: String, channel: Channel },

    #[error("{key}: unresolved placeholder {{{{{placeholder}}}}}")]
    UnresolvedPlaceholder { key: String, placeholder: String },

    #[error("{key}: placeholder {{{{{placeholder}}}}} still present after {passes} passes, cyclic reference")]
    CyclicTemplate { key: String, placeholder: String, passes: usize },

    #[error("{module}.{name}: cannot parse {raw:?}: {reason}")]
    ParamParse { module: String, name: String, raw: String, reason: String },

    #[error("{module}: post-init hook failed: {reason}")]
    InitHook { module: String, reason: String },

    #[error("{0}: module was never declared")]
    UnknownModule(String),

    #[error("{0}: no such parameter")]
    UnknownParam(String),

    #[error("{name}: expected {expected}, got {got}")]
    WrongType { name: String, expected: &'static str, got: &'static str },

    #[error("configuration not initialized; call init_all first")]
    NotReady,
}
