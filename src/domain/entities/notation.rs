use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::domain::DomainError;

/// PLC program representation the uploaded exports are written in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Notation {
    Ladder,
    #[serde(rename = "FBD")]
    Fbd,
    #[serde(rename = "STL")]
    Stl,
    #[serde(rename = "SCL")]
    Scl,
}

impl Notation {
    pub const ALL: [Notation; 4] = [Self::Ladder, Self::Fbd, Self::Stl, Self::Scl];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Ladder => "Ladder",
            Self::Fbd => "FBD",
            Self::Stl => "STL",
            Self::Scl => "SCL",
        }
    }

    /// Selector kept for deployments that depend on the historical routing.
    /// Exact-match keys `Ladder` and `STL` pick their own notation, `CSL`
    /// picks SCL, and every other key (`SCL` included) lands on FBD.
    pub fn from_legacy_key(key: &str) -> Self {
        match key {
            "Ladder" => Self::Ladder,
            "STL" => Self::Stl,
            "CSL" => Self::Scl,
            _ => Self::Fbd,
        }
    }
}

impl fmt::Display for Notation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Notation {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let key = s.trim();
        Self::ALL
            .into_iter()
            .find(|n| n.as_str().eq_ignore_ascii_case(key))
            .ok_or_else(|| {
                DomainError::validation(format!(
                    "unsupported notation '{key}', expected one of Ladder, FBD, STL, SCL"
                ))
            })
    }
}

/// How notation strings coming from clients are turned into a [`Notation`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TemplateDispatch {
    /// Each of the four names selects its own template; anything else is rejected.
    #[default]
    Strict,
    /// Historical string-keyed routing, see [`Notation::from_legacy_key`].
    Legacy,
}

impl TemplateDispatch {
    pub fn resolve(&self, key: &str) -> Result<Notation, DomainError> {
        match self {
            Self::Strict => key.parse(),
            Self::Legacy => Ok(Notation::from_legacy_key(key)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strict_parse_all_names() {
        for notation in Notation::ALL {
            assert_eq!(notation.as_str().parse::<Notation>().unwrap(), notation);
        }
        assert_eq!("scl".parse::<Notation>().unwrap(), Notation::Scl);
        assert_eq!(" ladder ".parse::<Notation>().unwrap(), Notation::Ladder);
    }

    #[test]
    fn test_strict_rejects_unknown() {
        let err = TemplateDispatch::Strict.resolve("CSL").unwrap_err();
        assert!(matches!(err, DomainError::Validation(_)));
        assert!(TemplateDispatch::Strict.resolve("Structured Text").is_err());
    }

    // The historical selector compares against "CSL", so the SCL option never
    // reaches its own template and unknown keys silently pick FBD.
    #[test]
    fn test_legacy_mapping_is_preserved() {
        let legacy = TemplateDispatch::Legacy;
        assert_eq!(legacy.resolve("Ladder").unwrap(), Notation::Ladder);
        assert_eq!(legacy.resolve("STL").unwrap(), Notation::Stl);
        assert_eq!(legacy.resolve("FBD").unwrap(), Notation::Fbd);
        assert_eq!(legacy.resolve("SCL").unwrap(), Notation::Fbd);
        assert_eq!(legacy.resolve("CSL").unwrap(), Notation::Scl);
        assert_eq!(legacy.resolve("ladder").unwrap(), Notation::Fbd);
        assert_eq!(legacy.resolve("anything").unwrap(), Notation::Fbd);
    }

    #[test]
    fn test_serde_names() {
        assert_eq!(serde_json::to_string(&Notation::Stl).unwrap(), "\"STL\"");
        let parsed: TemplateDispatch = serde_json::from_str("\"legacy\"").unwrap();
        assert_eq!(parsed, TemplateDispatch::Legacy);
    }
}
