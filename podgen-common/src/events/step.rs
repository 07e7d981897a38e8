//! Generation step names carried by progress events

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::Error;

/// Phase of episode generation named by a progress event
///
/// The wire format is a plain string. Known phases map to dedicated variants,
/// anything else is preserved verbatim in `Other` so producers stay free to
/// introduce new step names.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum ProgressStep {
    /// Connection greeting sent by the stream endpoint
    Connecting,
    Research,
    Script,
    Voice,
    Finalize,
    /// Episode is complete
    Ready,
    /// Generation failed
    Error,
    /// Producer-defined step outside the known set
    Other(String),
}

impl ProgressStep {
    pub fn as_str(&self) -> &str {
        match self {
            ProgressStep::Connecting => "connecting",
            ProgressStep::Research => "research",
            ProgressStep::Script => "script",
            ProgressStep::Voice => "voice",
            ProgressStep::Finalize => "finalize",
            ProgressStep::Ready => "ready",
            ProgressStep::Error => "error",
            ProgressStep::Other(name) => name,
        }
    }

    /// True for steps producers emit last by convention (`ready`, `error`)
    ///
    /// Advisory only: the bus never acts on it.
    pub fn is_terminal(&self) -> bool {
        matches!(self, ProgressStep::Ready | ProgressStep::Error)
    }
}

impl From<&str> for ProgressStep {
    fn from(name: &str) -> Self {
        match name {
            "connecting" => ProgressStep::Connecting,
            "research" => ProgressStep::Research,
            "script" => ProgressStep::Script,
            "voice" => ProgressStep::Voice,
            "finalize" => ProgressStep::Finalize,
            "ready" => ProgressStep::Ready,
            "error" => ProgressStep::Error,
            other => ProgressStep::Other(other.to_string()),
        }
    }
}

impl From<String> for ProgressStep {
    fn from(name: String) -> Self {
        match ProgressStep::from(name.as_str()) {
            ProgressStep::Other(_) => ProgressStep::Other(name),
            known => known,
        }
    }
}

impl From<ProgressStep> for String {
    fn from(step: ProgressStep) -> Self {
        match step {
            ProgressStep::Other(name) => name,
            known => known.as_str().to_string(),
        }
    }
}

/// Strict parse used at request boundaries: blank names are rejected
impl FromStr for ProgressStep {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        if trimmed.is_empty() {
            return Err(Error::InvalidInput("step must not be empty".to_string()));
        }
        Ok(ProgressStep::from(trimmed))
    }
}

impl fmt::Display for ProgressStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_known_steps_round_trip_through_names() {
        for name in ["connecting", "research", "script", "voice", "finalize", "ready", "error"] {
            let step = ProgressStep::from(name);
            assert!(!matches!(step, ProgressStep::Other(_)), "{} should be a known step", name);
            assert_eq!(step.as_str(), name);
        }
    }

    #[test]
    fn test_unknown_step_is_preserved() {
        let step = ProgressStep::from("mastering".to_string());
        assert_eq!(step, ProgressStep::Other("mastering".to_string()));
        assert_eq!(String::from(step), "mastering");
    }

    #[test]
    fn test_step_names_are_case_sensitive() {
        assert_eq!(ProgressStep::from("Ready"), ProgressStep::Other("Ready".to_string()));
    }

    #[test]
    fn test_serializes_as_plain_string() {
        let json = serde_json::to_string(&ProgressStep::Voice).unwrap();
        assert_eq!(json, "\"voice\"");

        let step: ProgressStep = serde_json::from_str("\"upload\"").unwrap();
        assert_eq!(step, ProgressStep::Other("upload".to_string()));
    }

    #[test]
    fn test_terminal_steps() {
        assert!(ProgressStep::Ready.is_terminal());
        assert!(ProgressStep::Error.is_terminal());
        assert!(!ProgressStep::Finalize.is_terminal());
        assert!(!ProgressStep::Other("done".to_string()).is_terminal());
    }

    #[test]
    fn test_parse_rejects_blank() {
        assert!(matches!("".parse::<ProgressStep>(), Err(Error::InvalidInput(_))));
        assert!(matches!("   ".parse::<ProgressStep>(), Err(Error::InvalidInput(_))));
        assert_eq!(" script ".parse::<ProgressStep>().unwrap(), ProgressStep::Script);
    }
}
