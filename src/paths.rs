//! Centralized path resolution for ytconverge
//!
//! # Environment Variables
//!
//! - `YTCONVERGE_CONFIG_DIR` - Override config directory
//! - `YTCONVERGE_STATE_DIR` - Override state directory
//!
//! # Path Resolution Priority
//!
//! For config_dir():
//! 1. `YTCONVERGE_CONFIG_DIR` environment variable
//! 2. `XDG_CONFIG_HOME/ytconverge` (if set)
//! 3. Platform default (`~/.config/ytconverge` on Unix)
//!
//! For state_dir():
//! 1. `YTCONVERGE_STATE_DIR` environment variable
//! 2. `XDG_STATE_HOME/ytconverge` (if set)
//! 3. Platform default (`~/.local/state/ytconverge` on Unix)

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};

/// Environment variable for config directory override
pub const ENV_CONFIG_DIR: &str = "YTCONVERGE_CONFIG_DIR";

/// Environment variable for state directory override
pub const ENV_STATE_DIR: &str = "YTCONVERGE_STATE_DIR";

const APP_DIR: &str = "ytconverge";

/// Default manifest file name, looked up in the working directory
pub const MANIFEST_FILE: &str = "ytconverge.toml";

/// Where a directory comes from, in priority order.
struct DirSources {
    override_dir: Option<String>,
    xdg_dir: Option<String>,
    platform_dir: Option<PathBuf>,
    home_fallback: &'static [&'static str],
}

fn resolve(sources: DirSources, home: Option<&Path>) -> Result<PathBuf> {
    if let Some(dir) = sources.override_dir {
        return Ok(expand(&dir));
    }
    if let Some(xdg) = sources.xdg_dir {
        return Ok(PathBuf::from(xdg).join(APP_DIR));
    }
    if let Some(platform) = sources.platform_dir {
        return Ok(platform.join(APP_DIR));
    }

    let home = home.context("Could not determine home directory")?;
    let mut path = home.to_path_buf();
    for part in sources.home_fallback {
        path.push(part);
    }
    Ok(path.join(APP_DIR))
}

/// Windows keeps configuration under `%APPDATA%`.
fn platform_config_dir() -> Option<PathBuf> {
    if cfg!(windows) {
        dirs::config_dir()
    } else {
        None
    }
}

fn platform_state_dir() -> Option<PathBuf> {
    if cfg!(windows) {
        dirs::data_local_dir()
    } else {
        None
    }
}

/// Get the ytconverge config directory path
pub fn config_dir() -> Result<PathBuf> {
    let path = resolve(
        DirSources {
            override_dir: std::env::var(ENV_CONFIG_DIR).ok(),
            xdg_dir: std::env::var("XDG_CONFIG_HOME").ok(),
            platform_dir: platform_config_dir(),
            home_fallback: &[".config"],
        },
        dirs::home_dir().as_deref(),
    )?;
    log::debug!("Using config dir: {}", path.display());
    Ok(path)
}

/// Get the ytconverge state directory path
pub fn state_dir() -> Result<PathBuf> {
    let path = resolve(
        DirSources {
            override_dir: std::env::var(ENV_STATE_DIR).ok(),
            xdg_dir: std::env::var("XDG_STATE_HOME").ok(),
            platform_dir: platform_state_dir(),
            home_fallback: &[".local", "state"],
        },
        dirs::home_dir().as_deref(),
    )?;
    log::debug!("Using state dir: {}", path.display());
    Ok(path)
}

/// Default provider config file
pub fn config_file() -> Result<PathBuf> {
    Ok(config_dir()?.join("config.toml"))
}

/// Default state file
pub fn state_file() -> Result<PathBuf> {
    Ok(state_dir()?.join("state.json"))
}

/// Token file the YT command-line tools share (`~/.yt/token`)
pub fn yt_token_file() -> Option<PathBuf> {
    dirs::home_dir().map(|home| home.join(".yt").join("token"))
}

/// Expand ~ and environment variables in a path string.
///
/// Unknown variables are left as written.
pub fn expand(path: &str) -> PathBuf {
    let expanded = shellexpand::full(path).unwrap_or(std::borrow::Cow::Borrowed(path));
    PathBuf::from(expanded.as_ref())
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn sources(override_dir: Option<&str>, xdg_dir: Option<&str>) -> DirSources {
        DirSources {
            override_dir: override_dir.map(str::to_string),
            xdg_dir: xdg_dir.map(str::to_string),
            platform_dir: None,
            home_fallback: &[".local", "state"],
        }
    }

    #[test]
    fn test_override_wins() {
        let result = resolve(
            sources(Some("/custom/state"), Some("/xdg")),
            Some(Path::new("/home/u")),
        )
        .unwrap();
        assert_eq!(result, PathBuf::from("/custom/state"));
    }

    #[test]
    fn test_override_expands_tilde() {
        let home = dirs::home_dir().unwrap();
        let result = resolve(sources(Some("~/yt-state"), None), None).unwrap();
        assert_eq!(result, home.join("yt-state"));
    }

    #[test]
    fn test_xdg_dir_gets_app_suffix() {
        let result = resolve(sources(None, Some("/tmp/xdg-state")), None).unwrap();
        assert_eq!(result, PathBuf::from("/tmp/xdg-state/ytconverge"));
    }

    #[test]
    fn test_home_fallback() {
        let result = resolve(sources(None, None), Some(Path::new("/home/u"))).unwrap();
        assert_eq!(result, PathBuf::from("/home/u/.local/state/ytconverge"));
    }

    #[test]
    fn test_no_home_is_an_error() {
        assert!(resolve(sources(None, None), None).is_err());
    }

    #[test]
    fn test_expand_absolute() {
        assert_eq!(expand("/absolute/path"), PathBuf::from("/absolute/path"));
    }

    #[test]
    fn test_expand_unknown_env_var_unchanged() {
        let result = expand("/path/$NONEXISTENT_VAR_12345/file");
        assert_eq!(result, PathBuf::from("/path/$NONEXISTENT_VAR_12345/file"));
    }
}
