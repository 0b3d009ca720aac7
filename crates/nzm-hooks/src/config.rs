//! Loading command hooks from the dedicated hooks file and the main config.
//!
//! Two sources, merged by concatenation:
//! 1. `hooks.toml` (dedicated file), first
//! 2. `[[command_hooks]]` inside `config.toml`, appended
//!
//! Both live in `$XDG_CONFIG_HOME/nzm/`, falling back to `~/.config/nzm/`.
//! A missing file is not an error: hooks are optional.

use std::ffi::OsString;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::event::CommandEvent;
use crate::hook::CommandHook;

pub const APP_DIR_NAME: &str = "nzm";
pub const HOOKS_FILE_NAME: &str = "hooks.toml";
pub const MAIN_CONFIG_FILE_NAME: &str = "config.toml";

/// Ordered hook set. Order is execution order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandHooksConfig {
    #[serde(default, rename = "command_hooks")]
    pub hooks: Vec<CommandHook>,
}

impl CommandHooksConfig {
    pub fn new(hooks: Vec<CommandHook>) -> Self {
        Self { hooks }
    }

    pub fn is_empty(&self) -> bool {
        self.hooks.is_empty()
    }

    /// Enabled hooks bound to `event`, in declaration order.
    pub fn hooks_for_event(&self, event: CommandEvent) -> Vec<&CommandHook> {
        self.hooks
            .iter()
            .filter(|h| h.event == event && h.is_enabled())
            .collect()
    }

    pub fn has_hooks_for_event(&self, event: CommandEvent) -> bool {
        self.hooks
            .iter()
            .any(|h| h.event == event && h.is_enabled())
    }

    /// Validate every hook; the first failure is reported with its index.
    pub fn validate(&self, origin: &str) -> Result<(), ConfigError> {
        for (index, hook) in self.hooks.iter().enumerate() {
            hook.validate().map_err(|source| ConfigError::Invalid {
                origin: origin.to_string(),
                index,
                source,
            })?;
        }
        Ok(())
    }

    /// Append `other`'s hooks after ours, keeping both orders.
    pub fn extend(&mut self, other: CommandHooksConfig) {
        self.hooks.extend(other.hooks);
    }
}

/// Where to look for the two hook sources.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HookPaths {
    pub hooks_file: PathBuf,
    pub main_config: PathBuf,
}

impl HookPaths {
    /// Default locations, or `None` when no config directory can be resolved.
    pub fn discover() -> Option<Self> {
        let dir = config_dir()?;
        Some(Self::in_dir(&dir))
    }

    pub fn in_dir(dir: &Path) -> Self {
        Self {
            hooks_file: dir.join(HOOKS_FILE_NAME),
            main_config: dir.join(MAIN_CONFIG_FILE_NAME),
        }
    }
}

/// `$XDG_CONFIG_HOME/nzm`, else `<home>/.config/nzm`.
pub fn config_dir() -> Option<PathBuf> {
    let home = directories::BaseDirs::new().map(|dirs| dirs.home_dir().to_path_buf());
    config_dir_from(std::env::var_os("XDG_CONFIG_HOME"), home)
}

fn config_dir_from(xdg_config_home: Option<OsString>, home: Option<PathBuf>) -> Option<PathBuf> {
    match xdg_config_home.filter(|v| !v.is_empty()) {
        Some(xdg) => Some(PathBuf::from(xdg).join(APP_DIR_NAME)),
        None => home.map(|home| home.join(".config").join(APP_DIR_NAME)),
    }
}

/// Read a file, mapping "not found" to `None`.
fn read_optional(path: &Path) -> Result<Option<String>, ConfigError> {
    match fs::read_to_string(path) {
        Ok(content) => Ok(Some(content)),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
        Err(source) => Err(ConfigError::Read {
            path: path.to_path_buf(),
            source,
        }),
    }
}

fn parse_and_validate(content: &str, origin: &str) -> Result<CommandHooksConfig, ConfigError> {
    let config: CommandHooksConfig = toml::from_str(content).map_err(|source| ConfigError::Parse {
        origin: origin.to_string(),
        source,
    })?;
    config.validate(origin)?;
    Ok(config)
}

/// Load the dedicated hooks file. Missing file → empty set.
///
/// Any read, parse or validation failure rejects the whole file.
pub fn load_command_hooks(path: &Path) -> Result<CommandHooksConfig, ConfigError> {
    let Some(content) = read_optional(path)? else {
        tracing::debug!(path = %path.display(), "No hooks file, using empty hook set");
        return Ok(CommandHooksConfig::default());
    };

    let config = parse_and_validate(&content, &path.display().to_string())?;
    tracing::debug!(
        path = %path.display(),
        count = config.hooks.len(),
        "Loaded command hooks"
    );
    Ok(config)
}

/// Parse hooks from TOML text directly.
pub fn load_command_hooks_from_toml(content: &str) -> Result<CommandHooksConfig, ConfigError> {
    parse_and_validate(content, "<inline>")
}

/// Extract `[[command_hooks]]` from the main config file.
///
/// A missing file, a file that is not TOML at all, or one without a
/// `command_hooks` key yields an empty set. A `command_hooks` section that
/// is malformed or fails validation is an error.
pub fn load_command_hooks_from_main_config(
    path: &Path,
) -> Result<CommandHooksConfig, ConfigError> {
    let Some(content) = read_optional(path)? else {
        return Ok(CommandHooksConfig::default());
    };

    let table: toml::Table = match toml::from_str(&content) {
        Ok(table) => table,
        Err(e) => {
            tracing::debug!(
                path = %path.display(),
                "Main config is not valid TOML, skipping its command hooks: {e}"
            );
            return Ok(CommandHooksConfig::default());
        }
    };
    if !table.contains_key("command_hooks") {
        return Ok(CommandHooksConfig::default());
    }

    parse_and_validate(&content, &path.display().to_string())
}

/// Load and merge both sources: dedicated hooks first, then main config.
///
/// A broken dedicated file is fatal. A broken main-config hook section is
/// logged and ignored.
pub fn load_all_command_hooks(paths: &HookPaths) -> Result<CommandHooksConfig, ConfigError> {
    let mut merged = load_command_hooks(&paths.hooks_file)?;

    match load_command_hooks_from_main_config(&paths.main_config) {
        Ok(main) => merged.extend(main),
        Err(e) => {
            tracing::warn!(
                path = %paths.main_config.display(),
                "Ignoring command hooks from main config: {e}"
            );
        }
    }

    Ok(merged)
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;
