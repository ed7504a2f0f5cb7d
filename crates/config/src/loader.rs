use std::{
    path::{Path, PathBuf},
    sync::Mutex,
};

use {
    anyhow::Context,
    tracing::{debug, warn},
};

use crate::{env_subst::substitute_env, schema::CourierConfig};

/// Standard config file names, checked in order.
const CONFIG_FILENAMES: &[&str] = &[
    "courier.toml",
    "courier.yaml",
    "courier.yml",
    "courier.json",
];

static CONFIG_DIR_OVERRIDE: Mutex<Option<PathBuf>> = Mutex::new(None);

/// Use `dir` instead of the user-global config directory.
pub fn set_config_dir(dir: PathBuf) {
    if let Ok(mut guard) = CONFIG_DIR_OVERRIDE.lock() {
        *guard = Some(dir);
    }
}

/// Drop a previous [`set_config_dir`] override.
pub fn clear_config_dir() {
    if let Ok(mut guard) = CONFIG_DIR_OVERRIDE.lock() {
        *guard = None;
    }
}

/// Returns the config directory: the override if set, otherwise
/// `~/.config/courier/`.
pub fn config_dir() -> Option<PathBuf> {
    if let Ok(guard) = CONFIG_DIR_OVERRIDE.lock()
        && let Some(dir) = guard.as_ref()
    {
        return Some(dir.clone());
    }
    directories::ProjectDirs::from("", "", "courier").map(|d| d.config_dir().to_path_buf())
}

/// Load config from the given path (any supported format).
pub fn load_config(path: &Path) -> anyhow::Result<CourierConfig> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| anyhow::anyhow!("failed to read {}: {e}", path.display()))?;
    let raw = substitute_env(&raw);
    parse_config(&raw, path)
}

/// Discover and load config from standard locations, then apply env
/// overrides.
///
/// Search order:
/// 1. `./courier.{toml,yaml,yml,json}` (project-local)
/// 2. `<config_dir>/courier.{toml,yaml,yml,json}` (user-global)
///
/// Uses `CourierConfig::default()` when no file exists. A file that exists
/// but cannot be read or parsed is an error rather than a silent fallback.
pub fn discover_and_load() -> anyhow::Result<CourierConfig> {
    let mut config = load_or_default(find_config_file())?;
    apply_env_overrides(&mut config);
    Ok(config)
}

fn load_or_default(path: Option<PathBuf>) -> anyhow::Result<CourierConfig> {
    match path {
        Some(path) => {
            debug!(path = %path.display(), "loading config");
            load_config(&path).with_context(|| format!("invalid config file {}", path.display()))
        },
        None => {
            debug!("no config file found, using defaults");
            Ok(CourierConfig::default())
        },
    }
}

/// Apply `COURIER_*` environment overrides on top of a loaded config.
pub fn apply_env_overrides(config: &mut CourierConfig) {
    apply_env_overrides_with(config, |name| std::env::var(name).ok());
}

fn apply_env_overrides_with(config: &mut CourierConfig, lookup: impl Fn(&str) -> Option<String>) {
    if let Some(url) = lookup("COURIER_WEBHOOK_URL").filter(|v| !v.is_empty()) {
        config.webhook.url = url;
    }
    if let Some(dir) = lookup("COURIER_STAGING_DIR").filter(|v| !v.is_empty()) {
        config.staging.dir = Some(PathBuf::from(dir));
    }
    if let Some(port) = lookup("COURIER_SIDECAR_PORT") {
        match port.parse::<u16>() {
            Ok(port) => config.whatsapp.sidecar_port = port,
            Err(e) => warn!(value = %port, error = %e, "ignoring invalid COURIER_SIDECAR_PORT"),
        }
    }
}

/// Find the first config file in standard locations.
pub(crate) fn find_config_file() -> Option<PathBuf> {
    for name in CONFIG_FILENAMES {
        let p = PathBuf::from(name);
        if p.exists() {
            return Some(p);
        }
    }

    let dir = config_dir()?;
    CONFIG_FILENAMES
        .iter()
        .map(|name| dir.join(name))
        .find(|p| p.exists())
}

fn parse_config(raw: &str, path: &Path) -> anyhow::Result<CourierConfig> {
    let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("toml");

    match ext {
        "toml" => Ok(toml::from_str(raw)?),
        "yaml" | "yml" => Ok(serde_yaml::from_str(raw)?),
        "json" => Ok(serde_json::from_str(raw)?),
        _ => anyhow::bail!("unsupported config format: .{ext}"),
    }
}
