//! Deployment namespaces.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Namespace the process runs in, read from `ENV_NAMESPACE`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Environment {
    /// No namespace configured.
    #[default]
    None,
    /// Local development.
    Development,
    /// Shared staging.
    Staging,
    /// Production.
    Production,
    /// Staging for CS.
    StagingCs,
    /// Staging for RT.
    StagingRt,
    /// Staging for ST.
    StagingSt,
    /// Staging for TT.
    StagingTt,
}

impl Environment {
    const ALL: [Self; 8] = [
        Self::None,
        Self::Development,
        Self::Staging,
        Self::Production,
        Self::StagingCs,
        Self::StagingRt,
        Self::StagingSt,
        Self::StagingTt,
    ];

    /// Canonical name, e.g. `Staging-CS`.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::None => "None",
            Self::Development => "Development",
            Self::Staging => "Staging",
            Self::Production => "Production",
            Self::StagingCs => "Staging-CS",
            Self::StagingRt => "Staging-RT",
            Self::StagingSt => "Staging-ST",
            Self::StagingTt => "Staging-TT",
        }
    }

    /// Returns `true` in production.
    pub fn is_production(self) -> bool {
        self == Self::Production
    }

    /// Returns `true` for local development and unnamed environments.
    pub fn is_development(self) -> bool {
        matches!(self, Self::None | Self::Development)
    }
}

impl FromStr for Environment {
    type Err = String;

    /// Case-insensitive; an empty string is [`Environment::None`].
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.is_empty() {
            return Ok(Self::None);
        }
        Self::ALL
            .into_iter()
            .find(|env| env.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| format!("unknown environment namespace '{s}'"))
    }
}

impl fmt::Display for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_is_case_insensitive() {
        assert_eq!("production".parse(), Ok(Environment::Production));
        assert_eq!("STAGING-cs".parse(), Ok(Environment::StagingCs));
        assert_eq!("".parse(), Ok(Environment::None));
        assert!("qa".parse::<Environment>().is_err());
    }

    #[test]
    fn test_predicates() {
        assert!(Environment::Production.is_production());
        assert!(!Environment::Staging.is_production());
        assert!(Environment::None.is_development());
        assert!(!Environment::StagingTt.is_development());
        assert_eq!(Environment::StagingRt.to_string(), "Staging-RT");
    }
}
