use log::{info, warn};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;
use std::sync::{LazyLock, RwLock};

pub const CURRENT_VERSION: u32 = 1;
const SETTINGS_FILENAME: &str = "config.yaml";
const APP_NAME: &str = "folio";

/// Reader text size tier. The terminal cannot scale glyphs, so tiers map
/// to content margins: a larger tier narrows the column, which changes
/// the wrap width and therefore the pagination.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum FontSizeTier {
    Small,
    #[default]
    Medium,
    Large,
}

impl FontSizeTier {
    pub fn as_str(&self) -> &'static str {
        match self {
            FontSizeTier::Small => "Small",
            FontSizeTier::Medium => "Medium",
            FontSizeTier::Large => "Large",
        }
    }

    /// Horizontal margin applied to each side of the reading column.
    pub fn content_margin(&self) -> u16 {
        match self {
            FontSizeTier::Small => 0,
            FontSizeTier::Medium => 2,
            FontSizeTier::Large => 6,
        }
    }

    pub fn next(&self) -> Self {
        match self {
            FontSizeTier::Small => FontSizeTier::Medium,
            FontSizeTier::Medium => FontSizeTier::Large,
            FontSizeTier::Large => FontSizeTier::Large,
        }
    }

    pub fn prev(&self) -> Self {
        match self {
            FontSizeTier::Small => FontSizeTier::Small,
            FontSizeTier::Medium => FontSizeTier::Small,
            FontSizeTier::Large => FontSizeTier::Medium,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    #[serde(default = "default_version")]
    pub version: u32,

    #[serde(default = "default_theme")]
    pub theme: String,

    #[serde(default)]
    pub font_size: FontSizeTier,

    /// Cosmetic only in a terminal; stored so a richer front end can
    /// honor it.
    #[serde(default = "default_font_family")]
    pub font_family: String,
}

fn default_version() -> u32 {
    CURRENT_VERSION
}

fn default_theme() -> String {
    "Oceanic Next".to_string()
}

fn default_font_family() -> String {
    "serif".to_string()
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            version: CURRENT_VERSION,
            theme: default_theme(),
            font_size: FontSizeTier::default(),
            font_family: default_font_family(),
        }
    }
}

static SETTINGS: LazyLock<RwLock<Settings>> = LazyLock::new(|| RwLock::new(Settings::default()));

fn config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|config| config.join(APP_NAME).join(SETTINGS_FILENAME))
}

pub fn load_settings() {
    let Some(path) = config_path() else {
        warn!("Could not determine config directory, using default settings");
        return;
    };
    if !path.exists() {
        info!("Settings file not found, using defaults");
        return;
    }
    match fs::read_to_string(&path) {
        Ok(content) => match serde_yaml::from_str::<Settings>(&content) {
            Ok(settings) => {
                *SETTINGS.write().unwrap() = settings;
                info!("Loaded settings from {path:?}");
            }
            Err(e) => warn!("Malformed settings at {path:?}: {e}"),
        },
        Err(e) => warn!("Could not read settings at {path:?}: {e}"),
    }
}

pub fn save_settings() -> anyhow::Result<()> {
    let Some(path) = config_path() else {
        anyhow::bail!("could not determine config directory");
    };
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let content = serde_yaml::to_string(&*SETTINGS.read().unwrap())?;
    fs::write(&path, content)?;
    Ok(())
}

pub fn current_settings() -> Settings {
    SETTINGS.read().unwrap().clone()
}

pub fn update_settings(update: impl FnOnce(&mut Settings)) {
    update(&mut SETTINGS.write().unwrap());
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn font_tiers_step_and_saturate() {
        assert_eq!(FontSizeTier::Small.next(), FontSizeTier::Medium);
        assert_eq!(FontSizeTier::Large.next(), FontSizeTier::Large);
        assert_eq!(FontSizeTier::Small.prev(), FontSizeTier::Small);
    }

    #[test]
    fn larger_tier_narrows_the_column() {
        assert!(
            FontSizeTier::Large.content_margin() > FontSizeTier::Small.content_margin()
        );
    }

    #[test]
    fn settings_round_trip_through_yaml() {
        let settings = Settings {
            version: CURRENT_VERSION,
            theme: "Gruvbox Dark".to_string(),
            font_size: FontSizeTier::Large,
            font_family: "mono".to_string(),
        };
        let yaml = serde_yaml::to_string(&settings).unwrap();
        let back: Settings = serde_yaml::from_str(&yaml).unwrap();
        assert_eq!(back.theme, "Gruvbox Dark");
        assert_eq!(back.font_size, FontSizeTier::Large);
    }
}
