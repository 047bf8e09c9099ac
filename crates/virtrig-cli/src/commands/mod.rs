pub mod check;
pub mod completions;
pub mod run;
pub mod snapshot;

use std::path::Path;
use virtrig_state::HarnessConfig;

pub const EXIT_SUCCESS: u8 = 0;
pub const EXIT_FAILURE: u8 = 1;
pub const EXIT_CONFIG_ERROR: u8 = 2;
pub const EXIT_DIRTY: u8 = 3;

pub fn json_pretty(value: &impl serde::Serialize) -> Result<String, String> {
    serde_json::to_string_pretty(value).map_err(|e| format!("JSON serialization failed: {e}"))
}

/// Load the harness config; a missing file falls back to the built-in
/// defaults, anything else is a config error.
pub fn load_config(path: &Path) -> Result<HarnessConfig, String> {
    if !path.exists() {
        return Ok(HarnessConfig::default());
    }
    virtrig_state::parse_config_file(path).map_err(|e| format!("config error: {e}"))
}
