//! Configuration loaded from `.formvault.toml`.

pub mod settings;

pub use settings::Settings;
