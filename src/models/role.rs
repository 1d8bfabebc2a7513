//! Participant roles

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Which side of the consultation a participant is on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Role {
    Doctor,
    Patient,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Doctor => "DOCTOR",
            Role::Patient => "PATIENT",
        }
    }

    /// The other participant.
    pub fn opposite(&self) -> Role {
        match self {
            Role::Doctor => Role::Patient,
            Role::Patient => Role::Doctor,
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "doctor" => Ok(Role::Doctor),
            "patient" => Ok(Role::Patient),
            other => anyhow::bail!("Unknown role: {}. Use: doctor, patient", other),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_role_parse_case_insensitive() {
        assert_eq!("DOCTOR".parse::<Role>().unwrap(), Role::Doctor);
        assert_eq!("patient".parse::<Role>().unwrap(), Role::Patient);
        assert!("nurse".parse::<Role>().is_err());
    }

    #[test]
    fn test_role_serializes_uppercase() {
        let json = serde_json::to_string(&Role::Patient).unwrap();
        assert_eq!(json, "\"PATIENT\"");
        assert_eq!(Role::Doctor.opposite(), Role::Patient);
    }
}
