//! Where settings and the classroom snapshot live on disk.
//!
//! `settings.toml` goes under the platform config dir and `classroom.json`
//! under the local data dir, each in a `participation-tracker` folder
//! (via `dirs`). On Linux that is `~/.config/...` and `~/.local/share/...`.

use std::path::PathBuf;

const APP_NAME: &str = "participation-tracker";

/// Resolved file locations.
#[derive(Debug, Clone)]
pub struct AppPaths {
    pub settings_file: PathBuf,
    pub classroom_file: PathBuf,
}

/// `<base>/participation-tracker`, or a relative folder when the platform
/// has no such base directory.
fn app_dir(base: Option<PathBuf>) -> PathBuf {
    base.unwrap_or_else(|| PathBuf::from(".")).join(APP_NAME)
}

impl AppPaths {
    pub fn new() -> Self {
        Self {
            settings_file: app_dir(dirs::config_dir()).join("settings.toml"),
            classroom_file: app_dir(dirs::data_local_dir()).join("classroom.json"),
        }
    }
}

impl Default for AppPaths {
    fn default() -> Self {
        Self::new()
    }
}
