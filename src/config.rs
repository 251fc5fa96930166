// config.rs - Settings read once at init.
//
// Precedence, lowest first: built-in defaults, `unreal_hook.toml` (next to the DLL, or the
// file named by UNREAL_HOOK_CONFIG), then the UNREAL_HOOK_* environment variables.
//
//   log_file = "C:/logs/hook.log"
//   log_level = "dev_warning"
//   console_level = "warning"
//
//   [signatures.fname_init]
//   pattern = "40 53 48 83 EC 30 ?? ?? ??"
//   offset = 0

use crate::error::{Error, Result};
use crate::game::SignatureOverride;
use crate::logging::LogLevel;
use crate::memory;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

pub const CONFIG_FILE: &str = "unreal_hook.toml";
pub const DEFAULT_LOG_FILE: &str = "unreal_hook.log";

const ENV_CONFIG: &str = "UNREAL_HOOK_CONFIG";
const ENV_LOG_FILE: &str = "UNREAL_HOOK_LOG_FILE";
const ENV_LOG_LEVEL: &str = "UNREAL_HOOK_LOG_LEVEL";
const ENV_CONSOLE_LEVEL: &str = "UNREAL_HOOK_CONSOLE_LEVEL";

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// Relative paths are taken from the DLL's directory
    pub log_file: Option<PathBuf>,
    pub log_level: LogLevel,
    /// Minimum level forwarded to log callbacks and the in-game console
    pub console_level: LogLevel,
    pub signatures: BTreeMap<String, SignatureOverride>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            log_file: None,
            log_level: LogLevel::DevWarning,
            console_level: LogLevel::Warning,
            signatures: BTreeMap::new(),
        }
    }
}

impl Config {
    /// Defaults, then the config file if there is one, then the environment.
    pub fn load() -> Result<Self> {
        let path = std::env::var_os(ENV_CONFIG)
            .map(PathBuf::from)
            .or_else(|| memory::this_module_dir().map(|dir| dir.join(CONFIG_FILE)));

        let mut config = match path {
            Some(path) if path.is_file() => Self::from_file(&path)?,
            _ => Self::default(),
        };
        config.apply_env(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        toml::from_str(&text).map_err(|e| Error::Config(format!("{}: {}", path.display(), e)))
    }

    pub fn from_toml(text: &str) -> Result<Self> {
        Ok(toml::from_str(text)?)
    }

    /// Layer environment overrides on top. `var` looks a variable up by name.
    pub fn apply_env(&mut self, var: impl Fn(&str) -> Option<String>) -> Result<()> {
        if let Some(file) = var(ENV_LOG_FILE).filter(|v| !v.is_empty()) {
            self.log_file = Some(PathBuf::from(file));
        }
        if let Some(level) = var(ENV_LOG_LEVEL) {
            self.log_level = parse_level(ENV_LOG_LEVEL, &level)?;
        }
        if let Some(level) = var(ENV_CONSOLE_LEVEL) {
            self.console_level = parse_level(ENV_CONSOLE_LEVEL, &level)?;
        }
        Ok(())
    }

    /// Where the log file goes.
    pub fn log_path(&self) -> PathBuf {
        let dir = memory::this_module_dir().unwrap_or_default();
        match &self.log_file {
            Some(file) if file.is_absolute() => file.clone(),
            Some(file) => dir.join(file),
            None => dir.join(DEFAULT_LOG_FILE),
        }
    }
}

fn parse_level(key: &str, value: &str) -> Result<LogLevel> {
    value
        .parse()
        .map_err(|e| Error::Config(format!("{key}: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::Resolve;
    use crate::scanner::Pattern;
    use std::collections::HashMap;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let config = Config::from_toml("").unwrap();
        assert_eq!(config, Config::default());
        assert_eq!(config.log_level, LogLevel::DevWarning);
        assert!(config.log_path().ends_with(DEFAULT_LOG_FILE));
    }

    #[test]
    fn test_full_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"
log_file = "hook.log"
log_level = "misc"
console_level = "error"

[signatures.gnames]
pattern = "48 8B 05 ?? ?? ?? ??"
offset = 3
resolve = "relative"
deref = true
"#
        )
        .unwrap();

        let config = Config::from_file(file.path()).unwrap();
        assert_eq!(config.log_level, LogLevel::Misc);
        assert_eq!(config.console_level, LogLevel::Error);
        assert!(config.log_path().ends_with("hook.log"));

        let gnames = &config.signatures["gnames"];
        assert_eq!(gnames.pattern, Some(Pattern::parse("48 8B 05 ?? ?? ?? ??").unwrap()));
        assert_eq!(gnames.offset, Some(3));
        assert_eq!(gnames.resolve, Some(Resolve::Relative));
        assert_eq!(gnames.deref, Some(true));
    }

    #[test]
    fn test_bad_file_is_reported() {
        assert!(matches!(
            Config::from_toml("log_level = \"loud\""),
            Err(Error::Config(_))
        ));
        assert!(matches!(
            Config::from_toml("colour = true"),
            Err(Error::Config(_))
        ));
        assert!(matches!(
            Config::from_toml("[signatures.gnames]\npattern = \"GG\""),
            Err(Error::Config(_))
        ));

        let missing = tempfile::tempdir().unwrap().path().join("nope.toml");
        assert!(matches!(Config::from_file(&missing), Err(Error::Io(_))));
    }

    #[test]
    fn test_env_overrides_file() {
        let mut config = Config::from_toml("log_level = \"info\"\nconsole_level = \"info\"").unwrap();
        let env: HashMap<&str, &str> = [
            ("UNREAL_HOOK_LOG_LEVEL", "Warning"),
            ("UNREAL_HOOK_LOG_FILE", "/tmp/other.log"),
        ]
        .into_iter()
        .collect();
        config
            .apply_env(|key| env.get(key).map(|v| v.to_string()))
            .unwrap();

        assert_eq!(config.log_level, LogLevel::Warning);
        assert_eq!(config.console_level, LogLevel::Info);
        assert_eq!(config.log_file, Some(PathBuf::from("/tmp/other.log")));

        let err = config
            .apply_env(|key| (key == "UNREAL_HOOK_CONSOLE_LEVEL").then(|| "chatty".to_string()))
            .unwrap_err();
        assert!(err.to_string().contains("UNREAL_HOOK_CONSOLE_LEVEL"));
    }
}
