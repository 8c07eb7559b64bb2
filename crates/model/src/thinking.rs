use std::error::Error;
use std::fmt::{self, Display};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// How much intermediate reasoning the model is asked to produce.
///
/// Providers translate this into whatever knob their backend offers
/// (e.g. a reasoning effort). Models without reasoning support ignore
/// everything but [`ThinkingLevel::Off`].
#[derive(
    Clone,
    Copy,
    Debug,
    Default,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Serialize,
    Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum ThinkingLevel {
    /// No reasoning hint is sent.
    #[default]
    Off,
    /// The smallest amount of reasoning the backend supports.
    Minimal,
    /// Low reasoning effort.
    Low,
    /// Medium reasoning effort.
    Medium,
    /// High reasoning effort.
    High,
}

impl ThinkingLevel {
    /// Returns the lowercase name of the level.
    #[inline]
    pub fn as_str(&self) -> &'static str {
        match self {
            ThinkingLevel::Off => "off",
            ThinkingLevel::Minimal => "minimal",
            ThinkingLevel::Low => "low",
            ThinkingLevel::Medium => "medium",
            ThinkingLevel::High => "high",
        }
    }

    /// Returns the reasoning effort to request, or `None` when
    /// reasoning is turned off.
    #[inline]
    pub fn effort(&self) -> Option<&'static str> {
        match self {
            ThinkingLevel::Off => None,
            level => Some(level.as_str()),
        }
    }
}

impl Display for ThinkingLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The error returned when parsing an unknown thinking level.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ParseThinkingLevelError(String);

impl Display for ParseThinkingLevelError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown thinking level: {:?}", self.0)
    }
}

impl Error for ParseThinkingLevelError {}

impl FromStr for ThinkingLevel {
    type Err = ParseThinkingLevelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "off" | "none" => Ok(ThinkingLevel::Off),
            "minimal" => Ok(ThinkingLevel::Minimal),
            "low" => Ok(ThinkingLevel::Low),
            "medium" => Ok(ThinkingLevel::Medium),
            "high" => Ok(ThinkingLevel::High),
            _ => Err(ParseThinkingLevelError(s.to_owned())),
        }
    }
}
