use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Which recognizers a request may use.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum RecognitionMode {
    Local,
    Cloud,
    Hybrid,
}

impl Default for RecognitionMode {
    fn default() -> Self {
        RecognitionMode::Hybrid
    }
}

impl RecognitionMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            RecognitionMode::Local => "local",
            RecognitionMode::Cloud => "cloud",
            RecognitionMode::Hybrid => "hybrid",
        }
    }
}

impl fmt::Display for RecognitionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RecognitionMode {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "local" => Ok(RecognitionMode::Local),
            "cloud" => Ok(RecognitionMode::Cloud),
            "hybrid" => Ok(RecognitionMode::Hybrid),
            other => Err(format!("unknown recognition mode '{other}'")),
        }
    }
}

/// Where the emitted latex came from.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "camelCase")]
pub enum RecognitionMethod {
    /// Served from the recognition cache.
    Cache,
    Local,
    Remote,
    /// Remote escalation failed; the local result was kept.
    LocalFallback,
}

impl RecognitionMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            RecognitionMethod::Cache => "cache",
            RecognitionMethod::Local => "local",
            RecognitionMethod::Remote => "remote",
            RecognitionMethod::LocalFallback => "localFallback",
        }
    }
}

impl FromStr for RecognitionMethod {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "cache" => Ok(RecognitionMethod::Cache),
            "local" => Ok(RecognitionMethod::Local),
            "remote" => Ok(RecognitionMethod::Remote),
            "localFallback" => Ok(RecognitionMethod::LocalFallback),
            other => Err(format!("unknown recognition method '{other}'")),
        }
    }
}

/// One line of the bounded recognition history. Strokes are not kept.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct HistoryRecord {
    pub id: String,
    pub equation: String,
    pub method: RecognitionMethod,
    pub mode: RecognitionMode,
    pub confidence: f64,
    pub duration_ms: u64,
    pub timestamp: i64,
    pub error: Option<String>,
}

impl HistoryRecord {
    pub fn is_success(&self) -> bool {
        self.error.is_none() && !self.equation.is_empty()
    }
}
