use crate::collectors::kernel::DEFAULT_ROOT;
use crate::collectors::notifier::NotifierOptions;
use crate::models::pressure::{Resource, Scope, Trigger};
use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub general: GeneralConfig,

    #[serde(default)]
    pub notifier: NotifierConfig,

    #[serde(default = "TriggerConfig::defaults")]
    pub triggers: Vec<TriggerConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneralConfig {
    /// Resource watched when none is given on the command line
    pub resource: Resource,
    /// Directory holding the cpu/io/memory pressure files
    pub pressure_root: PathBuf,
    /// Print snapshots as JSON instead of text
    pub json: bool,
    /// Skip malformed report lines instead of failing the snapshot
    pub lenient: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotifierConfig {
    /// Give up on a trigger after this many wait failures in a row
    pub max_consecutive_failures: u32,
    /// Pause between failed waits in milliseconds
    pub retry_delay_ms: u64,
}

/// A pressure trigger armed at startup.
///
/// Example in psiwatch.toml:
/// ```toml
/// [[triggers]]
/// scope        = "some"   # "some" or "full"
/// threshold_ms = 100      # stall time that fires the trigger...
/// window_ms    = 2000     # ...within this window (500..=10000)
/// ```
///
/// Without CAP_SYS_RESOURCE the kernel only accepts windows that are whole
/// multiples of 2000 ms and rejects anything else with EINVAL.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TriggerConfig {
    pub scope:        Scope,
    pub threshold_ms: u64,
    pub window_ms:    u64,
}

impl TriggerConfig {
    pub fn defaults() -> Vec<Self> {
        vec![TriggerConfig { scope: Scope::Some, threshold_ms: 100, window_ms: 2000 }]
    }

    pub fn to_trigger(&self) -> Trigger {
        Trigger::new(
            self.scope,
            Duration::from_millis(self.threshold_ms),
            Duration::from_millis(self.window_ms),
        )
    }
}

impl NotifierConfig {
    pub fn options(&self) -> NotifierOptions {
        NotifierOptions {
            max_consecutive_failures: self.max_consecutive_failures.max(1),
            retry_delay:              Duration::from_millis(self.retry_delay_ms),
        }
    }
}

// ── Defaults ─────────────────────────────────────────────────────────

impl Default for Config {
    fn default() -> Self {
        Self {
            general:  GeneralConfig::default(),
            notifier: NotifierConfig::default(),
            triggers: TriggerConfig::defaults(),
        }
    }
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            resource:      Resource::Cpu,
            pressure_root: PathBuf::from(DEFAULT_ROOT),
            json:          false,
            lenient:       false,
        }
    }
}

impl Default for NotifierConfig {
    fn default() -> Self {
        let opts = NotifierOptions::default();
        Self {
            max_consecutive_failures: opts.max_consecutive_failures,
            retry_delay_ms:           opts.retry_delay.as_millis() as u64,
        }
    }
}

// ── Load / Save ───────────────────────────────────────────────────────

impl Config {
    pub fn load() -> Self {
        match try_load() {
            Ok(c)  => c,
            Err(e) => {
                log::debug!("using default config: {}", e);
                // Write defaults on first run (best-effort)
                let _ = try_write_defaults();
                Config::default()
            }
        }
    }

    pub fn config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|p| p.join("psiwatch").join("psiwatch.toml"))
    }

    pub fn from_toml(text: &str) -> Result<Self> {
        Ok(toml::from_str(text)?)
    }
}

fn try_load() -> Result<Config> {
    let path = Config::config_path().ok_or_else(|| anyhow::anyhow!("no config dir"))?;
    let text = fs::read_to_string(path)?;
    Config::from_toml(&text)
}

fn try_write_defaults() -> Result<()> {
    let path = Config::config_path().ok_or_else(|| anyhow::anyhow!("no config dir"))?;
    if path.exists() {
        return Ok(());
    }
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let text = toml::to_string_pretty(&Config::default())?;
    fs::write(path, format!("# psiwatch configuration\n# Generated on first run — edit freely\n\n{}", text))?;
    Ok(())
}
