//! Sectioned configuration files with DEFAULT fallback and deferred
//! `%(name)s` interpolation.
//!
//! Values are stored as raw strings and expanded on every read against a
//! layered lookup: per-call overrides, then the target section, then the
//! DEFAULT section. Two interpolation strategies are available at store
//! construction time; both are bounded by a fixed depth budget.

mod error;
mod interpolate;
mod reader;
mod store;

pub use error::{ConfigError, ParsingErrors};
pub use interpolate::{Interpolation, MAX_INTERPOLATION_DEPTH};
pub use store::{Config, ConfigBuilder, DEFAULT_SECTION};
