//! mailprint configuration.
//!
//! Loaded from `--config <path>`, else `$MAILPRINT_HOME/config.toml`, else
//! `~/.mailprint/config.toml`. A missing default file means defaults; a
//! missing explicit file is an error.
//!
//! Relative paths inside the file resolve against the data root, the
//! directory holding the config file.

use std::path::{Path, PathBuf};
use std::time::Duration;
use std::{env, fs, io};

use serde::{Deserialize, Serialize};

/// Environment variable that overrides the data root.
pub const HOME_ENV: &str = "MAILPRINT_HOME";

const CONFIG_FILE: &str = "config.toml";

/// mailprint configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct Config {
    /// Name printed in the AGENT line of every briefing.
    pub agent_name: String,
    pub store: StoreConfig,
    pub mailbox: MailboxConfig,
    pub classifier: ClassifierConfig,
    pub printer: PrinterConfig,
    pub monitor: MonitorConfig,

    /// Directory relative paths resolve against. Not read from the file.
    #[serde(skip)]
    pub root: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct StoreConfig {
    pub path: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct MailboxConfig {
    /// Authorized-user token file written by the out-of-band login.
    pub token_path: PathBuf,

    /// Most unseen messages fetched per cycle.
    pub max_messages: usize,

    /// How far back the very first cycle looks.
    pub lookback_hours: u64,

    /// Listings start this far before the checkpoint, for late-indexed mail.
    pub overlap_minutes: u64,
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct ClassifierConfig {
    pub endpoint: String,
    pub model: String,

    /// Name of the environment variable holding the API key.
    pub api_key_env: String,
    pub timeout_secs: u64,

    /// Message bodies are cut to this many characters before classification.
    pub max_body_chars: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct PrinterConfig {
    /// Device node of the printer, e.g. `/dev/rfcomm0` or `/dev/usb/lp0`.
    pub device: Option<PathBuf>,

    /// Raw network printer as `host:port`. Used when `device` is unset.
    pub network: Option<String>,

    /// Characters per line; 32 for 58 mm paper.
    pub width: usize,
    pub fallback_path: PathBuf,
    pub busy_retries: u32,
    pub busy_delay_secs: u64,
    pub webhook_url: Option<String>,
    pub webhook_cooldown_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct MonitorConfig {
    pub interval_minutes: u64,

    /// Consecutive failed cycles before the loop gives up.
    pub max_consecutive_failures: u32,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            agent_name: "Agent".to_string(),
            store: StoreConfig::default(),
            mailbox: MailboxConfig::default(),
            classifier: ClassifierConfig::default(),
            printer: PrinterConfig::default(),
            monitor: MonitorConfig::default(),
            root: PathBuf::new(),
        }
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("mailprint.db"),
        }
    }
}

impl Default for MailboxConfig {
    fn default() -> Self {
        Self {
            token_path: PathBuf::from("token.json"),
            max_messages: 20,
            lookback_hours: 24,
            overlap_minutes: 60,
            timeout_secs: 30,
        }
    }
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            endpoint: "https://generativelanguage.googleapis.com/v1beta".to_string(),
            model: "gemini-2.5-flash".to_string(),
            api_key_env: "GEMINI_API_KEY".to_string(),
            timeout_secs: 60,
            max_body_chars: 3000,
        }
    }
}

impl Default for PrinterConfig {
    fn default() -> Self {
        Self {
            device: None,
            network: None,
            width: 32,
            fallback_path: PathBuf::from("printed_missions.txt"),
            busy_retries: 3,
            busy_delay_secs: 2,
            webhook_url: None,
            webhook_cooldown_secs: 5,
        }
    }
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            interval_minutes: 5,
            max_consecutive_failures: 5,
        }
    }
}

impl Config {
    /// Load config from an explicit path, or from the default location.
    pub fn load(explicit: Option<&Path>) -> Result<Self, String> {
        let (path, required) = match explicit {
            Some(path) => (path.to_path_buf(), true),
            None => (
                Self::default_path().ok_or("could not determine home directory")?,
                false,
            ),
        };
        let root = path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_default();

        let contents = match fs::read_to_string(&path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == io::ErrorKind::NotFound && !required => {
                return Ok(Self {
                    root,
                    ..Self::default()
                });
            }
            Err(e) => return Err(format!("failed to read {}: {e}", path.display())),
        };

        let mut config = Self::parse(&contents)
            .map_err(|e| format!("invalid config at {}: {e}", path.display()))?;
        config.root = root;
        Ok(config)
    }

    /// Parse and validate config text.
    pub fn parse(contents: &str) -> Result<Self, String> {
        let config: Self = toml::from_str(contents).map_err(|e| e.to_string())?;

        if config.printer.width < 16 {
            return Err("printer.width must be at least 16".to_string());
        }
        if config.monitor.interval_minutes == 0 {
            return Err("monitor.interval-minutes must be at least 1".to_string());
        }
        if config.mailbox.max_messages == 0 {
            return Err("mailbox.max-messages must be at least 1".to_string());
        }

        Ok(config)
    }

    /// The default config path: `$MAILPRINT_HOME/config.toml` or `~/.mailprint/config.toml`.
    pub fn default_path() -> Option<PathBuf> {
        if let Ok(home) = env::var(HOME_ENV)
            && !home.is_empty()
        {
            return Some(PathBuf::from(home).join(CONFIG_FILE));
        }
        dirs::home_dir().map(|h| h.join(".mailprint").join(CONFIG_FILE))
    }

    /// Resolve a configured path against the data root.
    pub fn resolve(&self, path: &Path) -> PathBuf {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.root.join(path)
        }
    }

    pub fn store_path(&self) -> PathBuf {
        self.resolve(&self.store.path)
    }

    pub fn token_path(&self) -> PathBuf {
        self.resolve(&self.mailbox.token_path)
    }

    pub fn fallback_path(&self) -> PathBuf {
        self.resolve(&self.printer.fallback_path)
    }

    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.monitor.interval_minutes * 60)
    }

    /// Read the classifier API key from the configured environment variable.
    pub fn api_key(&self) -> Result<String, String> {
        let name = &self.classifier.api_key_env;
        match env::var(name) {
            Ok(key) if !key.trim().is_empty() => Ok(key.trim().to_string()),
            _ => Err(format!("{name} environment variable not set")),
        }
    }
}
