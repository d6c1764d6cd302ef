//! # subwire-settings
//!
//! Settings are loaded from three layers (in priority order):
//! 1. **Compiled defaults**: [`SubwireSettings::default()`]
//! 2. **Settings file**: `~/.subwire/settings.json` or an explicit path,
//!    deep-merged over defaults
//! 3. **Environment variables**: `SUBWIRE_*` overrides (highest priority)

#![deny(unsafe_code)]

pub mod errors;
pub mod loader;
pub mod types;

pub use errors::{Result, SettingsError};
pub use loader::{
    apply_env_overrides, apply_overrides, deep_merge, load_settings, load_settings_from_path,
    load_settings_with, settings_path,
};
pub use types::*;

use std::sync::OnceLock;

static SETTINGS: OnceLock<SubwireSettings> = OnceLock::new();

/// Get the global settings instance.
///
/// On first call, loads from the default path with env overrides, falling
/// back to compiled defaults if loading fails.
pub fn get_settings() -> &'static SubwireSettings {
    SETTINGS.get_or_init(|| load_settings().unwrap_or_default())
}

/// Initialize the global settings with a specific value.
///
/// Returns the value back if the global was already initialized.
#[allow(clippy::result_large_err)]
pub fn init_settings(settings: SubwireSettings) -> std::result::Result<(), SubwireSettings> {
    SETTINGS.set(settings)
}
