//! Configuration recognized by the core.

pub mod settings;

pub use settings::{CarrierPreference, KdfSettings, Settings};
