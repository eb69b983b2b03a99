use crate::error::{LadderError, Result};
use crate::loader::read_description;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};

pub const DEFAULT_SCAN_PERIOD_MS: u64 = 100;

// ---------------------------------------------------------------------------
// ConfigWarning / WarnLevel
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfigWarning {
    pub level: WarnLevel,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WarnLevel {
    Warning,
    Error,
}

// ---------------------------------------------------------------------------
// CadenceMode
// ---------------------------------------------------------------------------

/// How the scheduler paces cycles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CadenceMode {
    /// Deadlines are `origin + k * period`, re-anchored after an overrun.
    #[default]
    FixedRate,
    /// Sleep `period - elapsed` after each cycle.
    SleepRemainder,
}

impl CadenceMode {
    pub fn as_str(self) -> &'static str {
        match self {
            CadenceMode::FixedRate => "fixed_rate",
            CadenceMode::SleepRemainder => "sleep_remainder",
        }
    }
}

impl fmt::Display for CadenceMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for CadenceMode {
    type Err = LadderError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "fixed_rate" => Ok(CadenceMode::FixedRate),
            "sleep_remainder" => Ok(CadenceMode::SleepRemainder),
            other => Err(LadderError::InvalidConfig(format!("unknown cadence '{other}'"))),
        }
    }
}

// ---------------------------------------------------------------------------
// RuntimeConfig
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuntimeConfig {
    #[serde(default = "default_scan_period_ms")]
    pub scan_period_ms: u64,
    #[serde(default)]
    pub cadence: CadenceMode,
    /// Stop normally after this many cycles.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_cycles: Option<u64>,
    /// Snapshot restored at start and written on exit.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state_file: Option<PathBuf>,
}

fn default_scan_period_ms() -> u64 {
    DEFAULT_SCAN_PERIOD_MS
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            scan_period_ms: default_scan_period_ms(),
            cadence: CadenceMode::default(),
            max_cycles: None,
            state_file: None,
        }
    }
}

impl RuntimeConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let cfg: RuntimeConfig = read_description(path).map_err(|e| match e {
            LadderError::ProgramLoad(msg) => LadderError::InvalidConfig(msg),
            other => other,
        })?;
        Ok(cfg)
    }

    /// Pick the scan period: explicit flag, then the program's own period,
    /// then this config.
    pub fn resolve_scan_period(&self, flag: Option<u64>, program: Option<u64>) -> u64 {
        flag.or(program).unwrap_or(self.scan_period_ms)
    }

    pub fn validate(&self) -> Vec<ConfigWarning> {
        let mut warnings = Vec::new();

        if self.scan_period_ms == 0 {
            warnings.push(ConfigWarning {
                level: WarnLevel::Error,
                message: "scan_period_ms must be greater than 0".to_string(),
            });
        } else if self.scan_period_ms < 5 {
            warnings.push(ConfigWarning {
                level: WarnLevel::Warning,
                message: format!(
                    "scan_period_ms {} is shorter than typical scheduler resolution",
                    self.scan_period_ms
                ),
            });
        }

        if self.max_cycles == Some(0) {
            warnings.push(ConfigWarning {
                level: WarnLevel::Warning,
                message: "max_cycles is 0; the scheduler will stop before its first cycle"
                    .to_string(),
            });
        }

        warnings
    }

    /// Fail on the first error-level warning.
    pub fn ensure_valid(&self) -> Result<()> {
        match self
            .validate()
            .into_iter()
            .find(|w| w.level == WarnLevel::Error)
        {
            Some(w) => Err(LadderError::InvalidConfig(w.message)),
            None => Ok(()),
        }
    }
}
