//! confstack: layered, declarative configuration merging
//!
//! Modules declare parameters as (default, parser, description)
//! triples against a [`ConfigContext`]; the context materializes a
//! merged tree from channel defaults, home-directory override files,
//! env-named override files, and per-parameter environment variables,
//! resolves `{{dotted.path}}` templates, and hands each module back a
//! populated [`Params`] container.
//!
//! ```no_run
//! use confstack::{ConfigContext, ParamDecl};
//! use confstack::registry::parsers;
//!
//! let mut ctx = ConfigContext::new();
//! let cfg = ctx.declare(
//!     "my_app.server",
//!     vec![
//!         ("port", ParamDecl::new(8000i64, parsers::int, "listen port")),
//!         ("run_dir", ParamDecl::new("/tmp", parsers::string, "scratch directory")),
//!     ],
//! )?;
//! ctx.init_all("my_app")?;
//! let _port = cfg.int("port")?;
//! # Ok::<(), confstack::ConfigError>(())
//! ```

pub mod channel;
pub mod cli;
pub mod context;
pub mod error;
pub mod merge;
pub mod registry;
pub mod store;
pub mod template;
pub mod value;

pub use channel::Channel;
pub use context::{ConfigContext, InitState};
pub use error::ConfigError;
pub use merge::{merge, MergeOp, Strategy};
pub use registry::{ParamDecl, Params};
pub use store::{ChannelDefaults, ConfigStore, EnvMap, BASE_PACKAGE};
pub use value::{ConfigValue, Mapping};
