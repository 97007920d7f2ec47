use std::{
    path::{Path, PathBuf},
    sync::Mutex,
};

use {
    secrecy::Secret,
    tracing::{debug, warn},
};

use crate::{
    Context, Error, Result, env_subst::substitute_env, schema::SwitchboardConfig,
};

/// Standard config file names, checked in order.
const CONFIG_FILENAMES: &[&str] = &[
    "switchboard.toml",
    "switchboard.yaml",
    "switchboard.yml",
    "switchboard.json",
];

static CONFIG_DIR_OVERRIDE: Mutex<Option<PathBuf>> = Mutex::new(None);
static DATA_DIR_OVERRIDE: Mutex<Option<PathBuf>> = Mutex::new(None);

/// Override the user-global config directory (CLI `--config-dir`).
pub fn set_config_dir(dir: PathBuf) {
    *CONFIG_DIR_OVERRIDE
        .lock()
        .unwrap_or_else(|e| e.into_inner()) = Some(dir);
}

/// Override the data directory (CLI `--data-dir`).
pub fn set_data_dir(dir: PathBuf) {
    *DATA_DIR_OVERRIDE.lock().unwrap_or_else(|e| e.into_inner()) = Some(dir);
}

/// Returns the user-global config directory (`~/.config/switchboard/`).
pub fn config_dir() -> Option<PathBuf> {
    if let Some(dir) = CONFIG_DIR_OVERRIDE
        .lock()
        .unwrap_or_else(|e| e.into_inner())
        .clone()
    {
        return Some(dir);
    }
    directories::ProjectDirs::from("", "", "switchboard").map(|d| d.config_dir().to_path_buf())
}

/// Returns the data directory holding the SQLite database.
pub fn data_dir() -> PathBuf {
    if let Some(dir) = DATA_DIR_OVERRIDE
        .lock()
        .unwrap_or_else(|e| e.into_inner())
        .clone()
    {
        return dir;
    }
    directories::ProjectDirs::from("", "", "switchboard")
        .map(|d| d.data_dir().to_path_buf())
        .unwrap_or_else(|| PathBuf::from(".switchboard"))
}

/// Load config from the given path (any supported format).
pub fn load_config(path: &Path) -> Result<SwitchboardConfig> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    let raw = substitute_env(&raw);
    parse_config(&raw, path)
}

/// Discover and load config from standard locations, then apply env overrides.
///
/// Search order:
/// 1. `./switchboard.{toml,yaml,yml,json}` (project-local)
/// 2. `~/.config/switchboard/switchboard.{toml,yaml,yml,json}` (user-global)
///
/// Falls back to `SwitchboardConfig::default()` if no config file is found or
/// the file fails to parse.
pub fn discover_and_load() -> SwitchboardConfig {
    let config = match find_config_file() {
        Some(path) => {
            debug!(path = %path.display(), "loading config");
            match load_config(&path) {
                Ok(cfg) => cfg,
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "failed to load config, using defaults");
                    SwitchboardConfig::default()
                },
            }
        },
        None => {
            debug!("no config file found, using defaults");
            SwitchboardConfig::default()
        },
    };
    apply_env_overrides(config)
}

/// Find the first config file in standard locations.
pub fn find_config_file() -> Option<PathBuf> {
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

/// Apply `SWITCHBOARD_*` environment overrides on top of file config.
pub fn apply_env_overrides(config: SwitchboardConfig) -> SwitchboardConfig {
    apply_env_overrides_with(config, |name| std::env::var(name).ok())
}

fn apply_env_overrides_with(
    mut config: SwitchboardConfig,
    lookup: impl Fn(&str) -> Option<String>,
) -> SwitchboardConfig {
    if let Some(url) = lookup("SWITCHBOARD_PROVIDER_URL") {
        config.provider.base_url = url;
    }
    if let Some(key) = lookup("SWITCHBOARD_PROVIDER_API_KEY").filter(|k| !k.is_empty()) {
        config.provider.api_key = Some(Secret::new(key));
    }
    if let Some(origins) = lookup("SWITCHBOARD_CORS_ORIGINS") {
        config.realtime.cors_origins = origins
            .split(',')
            .map(str::trim)
            .filter(|o| !o.is_empty())
            .map(str::to_owned)
            .collect();
    }
    if let Some(url) = lookup("SWITCHBOARD_DATABASE_URL").filter(|u| !u.is_empty()) {
        config.database.url = Some(url);
    }
    config
}

fn parse_config(raw: &str, path: &Path) -> Result<SwitchboardConfig> {
    let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("toml");

    match ext {
        "toml" => toml::from_str(raw).context("invalid TOML config"),
        "yaml" | "yml" => serde_yaml::from_str(raw).context("invalid YAML config"),
        "json" => serde_json::from_str(raw).context("invalid JSON config"),
        _ => Err(Error::message(format!("unsupported config format: .{ext}"))),
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use {super::*, secrecy::ExposeSecret};

    #[test]
    fn loads_toml_with_env_placeholder_fallback() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("switchboard.toml");
        std::fs::write(
            &path,
            "[server]\nport = ${SWITCHBOARD_TEST_UNSET_PORT:-9191}\n",
        )
        .unwrap();
        let cfg = load_config(&path).unwrap();
        assert_eq!(cfg.server.port, 9191);
    }

    #[test]
    fn loads_yaml() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("switchboard.yaml");
        std::fs::write(&path, "contacts:\n  absent_ttl_secs: 60\n").unwrap();
        let cfg = load_config(&path).unwrap();
        assert_eq!(cfg.contacts.absent_ttl_secs, 60);
    }

    #[test]
    fn rejects_unknown_extension() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("switchboard.ini");
        std::fs::write(&path, "x=1").unwrap();
        let err = load_config(&path).unwrap_err();
        assert!(err.to_string().contains("unsupported config format"));
    }

    #[test]
    fn reports_parse_errors_with_context() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("switchboard.toml");
        std::fs::write(&path, "[server\nport = 1").unwrap();
        let err = load_config(&path).unwrap_err();
        assert!(err.to_string().starts_with("invalid TOML config"));
    }

    #[test]
    fn env_overrides_apply() {
        let lookup = |name: &str| match name {
            "SWITCHBOARD_PROVIDER_URL" => Some("https://evo.internal".to_string()),
            "SWITCHBOARD_PROVIDER_API_KEY" => Some("secret".to_string()),
            "SWITCHBOARD_CORS_ORIGINS" => Some("https://a.example, https://b.example,".to_string()),
            _ => None,
        };
        let cfg = apply_env_overrides_with(SwitchboardConfig::default(), lookup);
        assert_eq!(cfg.provider.base_url, "https://evo.internal");
        assert_eq!(cfg.provider.api_key.unwrap().expose_secret(), "secret");
        assert_eq!(cfg.realtime.cors_origins, vec![
            "https://a.example".to_string(),
            "https://b.example".to_string()
        ]);
        assert!(cfg.database.url.is_none());
    }
}
