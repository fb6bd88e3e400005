//! Governance rules attached to taxonomy nodes
//!
//! A taxonomy node may reference up to three rules: how long its dossiers
//! are retained, after how long an open dossier should be closed, and which
//! protection class restricts public communication. Each rule value is also
//! a vocabulary node under `rules/`, written once by the bootstrap.

use crate::error::{ValidationError, ValidationKind};
use crate::key::{Container, NodeKey};
use crate::utils::strip_textfield;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Duration a dossier is kept before archiving or deletion, in years
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "u16", into = "u16")]
pub struct RetentionPeriod(u16);

impl RetentionPeriod {
    /// Accepted retention periods
    pub const ALLOWED: [u16; 9] = [0, 1, 2, 3, 5, 10, 15, 20, 100];

    /// Create a retention period, rejecting values outside [`Self::ALLOWED`]
    pub fn new(years: u16) -> Option<Self> {
        Self::ALLOWED.contains(&years).then_some(Self(years))
    }

    /// Number of years
    pub fn years(&self) -> u16 {
        self.0
    }

    /// Vocabulary key (`rules/retentionPeriod<N>A`)
    pub fn key(&self) -> NodeKey {
        NodeKey::vocabulary(Container::Rules, format!("retentionPeriod{}A", self.0))
    }

    /// Every accepted value
    pub fn all() -> impl Iterator<Item = Self> {
        Self::ALLOWED.into_iter().map(Self)
    }
}

impl TryFrom<u16> for RetentionPeriod {
    type Error = String;

    fn try_from(value: u16) -> Result<Self, Self::Error> {
        Self::new(value).ok_or_else(|| format!("unsupported retention period: {}", value))
    }
}

impl From<RetentionPeriod> for u16 {
    fn from(value: RetentionPeriod) -> Self {
        value.0
    }
}

/// Duration after which an open dossier should be closed, in years
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "u16", into = "u16")]
pub struct ClosingPeriod(u16);

impl ClosingPeriod {
    /// Longest accepted closing period
    pub const MAX: u16 = 5;

    /// Create a closing period in `0..=5`
    pub fn new(years: u16) -> Option<Self> {
        (years <= Self::MAX).then_some(Self(years))
    }

    /// Number of years
    pub fn years(&self) -> u16 {
        self.0
    }

    /// Vocabulary key (`rules/closingPeriod<N>A`)
    pub fn key(&self) -> NodeKey {
        NodeKey::vocabulary(Container::Rules, format!("closingPeriod{}A", self.0))
    }

    /// Every accepted value
    pub fn all() -> impl Iterator<Item = Self> {
        (0..=Self::MAX).map(Self)
    }
}

impl TryFrom<u16> for ClosingPeriod {
    type Error = String;

    fn try_from(value: u16) -> Result<Self, Self::Error> {
        Self::new(value).ok_or_else(|| format!("unsupported closing period: {}", value))
    }
}

impl From<ClosingPeriod> for u16 {
    fn from(value: ClosingPeriod) -> Self {
        value.0
    }
}

/// Protection class restricting public communication
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Protection {
    /// Freely communicable
    Libre,
    /// Ordinary embargo
    Ordinaire,
    /// Special embargo
    Special,
    /// Extended embargo
    Prolongee,
}

impl Protection {
    /// Every protection class
    pub const ALL: [Protection; 4] = [
        Protection::Libre,
        Protection::Ordinaire,
        Protection::Special,
        Protection::Prolongee,
    ];

    /// Communicability embargo in years
    pub fn embargo_years(&self) -> u16 {
        match self {
            Protection::Libre => 0,
            Protection::Ordinaire => 30,
            Protection::Special => 50,
            Protection::Prolongee => 100,
        }
    }

    /// Ledger spelling
    pub fn as_str(&self) -> &'static str {
        match self {
            Protection::Libre => "LIBRE",
            Protection::Ordinaire => "ORDINAIRE",
            Protection::Special => "SPECIAL",
            Protection::Prolongee => "PROLONGEE",
        }
    }

    /// Vocabulary key (`rules/protection<NAME>`)
    pub fn key(&self) -> NodeKey {
        NodeKey::vocabulary(Container::Rules, format!("protection{}", self.as_str()))
    }

    fn parse(cell: &str) -> Option<Self> {
        let upper = cell.to_uppercase();
        Self::ALL.into_iter().find(|p| p.as_str() == upper)
    }
}

impl fmt::Display for Protection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Rules referenced by one taxonomy node
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuleSet {
    /// Retention period, if set
    pub retention: Option<RetentionPeriod>,
    /// Closing period, if set
    pub closing: Option<ClosingPeriod>,
    /// Protection class, if set
    pub protection: Option<Protection>,
}

impl RuleSet {
    /// Parse the three rule cells of a ledger row
    ///
    /// Empty cells leave the rule unset. Export artefacts (quotes, `=` and
    /// spaces) and a trailing year marker `A` are tolerated.
    pub fn parse(
        row: usize,
        id: &str,
        retention: &str,
        closing: &str,
        protection: &str,
    ) -> std::result::Result<Self, ValidationError> {
        let invalid = |what: &str, cell: &str| {
            ValidationError::new(
                row,
                id,
                ValidationKind::InvalidRule,
                format!("unsupported {} '{}'", what, cell),
            )
        };

        let retention = match parse_years(retention) {
            Cell::Empty => None,
            Cell::Years(y) => Some(RetentionPeriod::new(y).ok_or_else(|| invalid("retention period", retention))?),
            Cell::Malformed => return Err(invalid("retention period", retention)),
        };
        let closing = match parse_years(closing) {
            Cell::Empty => None,
            Cell::Years(y) => Some(ClosingPeriod::new(y).ok_or_else(|| invalid("closing period", closing))?),
            Cell::Malformed => return Err(invalid("closing period", closing)),
        };
        let cleaned = strip_textfield(protection);
        let protection = if cleaned.is_empty() {
            None
        } else {
            Some(Protection::parse(&cleaned).ok_or_else(|| invalid("protection class", protection))?)
        };

        Ok(Self {
            retention,
            closing,
            protection,
        })
    }

    /// Vocabulary keys of the rules that are set
    pub fn keys(&self) -> Vec<NodeKey> {
        let mut keys = Vec::with_capacity(3);
        if let Some(c) = self.closing {
            keys.push(c.key());
        }
        if let Some(r) = self.retention {
            keys.push(r.key());
        }
        if let Some(p) = self.protection {
            keys.push(p.key());
        }
        keys
    }

    /// Whether no rule is set
    pub fn is_empty(&self) -> bool {
        self.retention.is_none() && self.closing.is_none() && self.protection.is_none()
    }
}

enum Cell {
    Empty,
    Years(u16),
    Malformed,
}

fn parse_years(cell: &str) -> Cell {
    let cleaned = strip_textfield(cell);
    if cleaned.is_empty() {
        return Cell::Empty;
    }
    let digits = cleaned.trim_end_matches(['A', 'a']).trim();
    // Exports sometimes render integers as floats
    let digits = digits.strip_suffix(".0").unwrap_or(digits);
    match digits.parse::<u16>() {
        Ok(years) => Cell::Years(years),
        Err(_) => Cell::Malformed,
    }
}

/// Every rule vocabulary key with its title, in bootstrap order
pub fn vocabulary() -> Vec<(NodeKey, String, String)> {
    let mut entries = Vec::new();
    for r in RetentionPeriod::all() {
        entries.push((
            r.key(),
            format!("Retention period - {} years", r.years()),
            "The retention period is the duration a dossier is kept before archiving or deletion.".to_string(),
        ));
    }
    for c in ClosingPeriod::all() {
        entries.push((
            c.key(),
            format!("Closing period - {} years", c.years()),
            "The closing period is the duration after which a dossier should be closed.".to_string(),
        ));
    }
    for p in Protection::ALL {
        entries.push((
            p.key(),
            format!("Protection period - {} years", p.embargo_years()),
            "The protection period is the duration a dossier may not be communicated to the public without producer authorization.".to_string(),
        ));
    }
    entries
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_clean_cells() {
        let rules = RuleSet::parse(1, "12", "10", "2", "ORDINAIRE").unwrap();
        assert_eq!(rules.retention.map(|r| r.years()), Some(10));
        assert_eq!(rules.closing.map(|c| c.years()), Some(2));
        assert_eq!(rules.protection, Some(Protection::Ordinaire));
    }

    #[test]
    fn test_parse_export_artefacts() {
        let rules = RuleSet::parse(1, "12", "=\"100\"", " 5A ", "\"prolongee\"").unwrap();
        assert_eq!(rules.retention.map(|r| r.years()), Some(100));
        assert_eq!(rules.closing.map(|c| c.years()), Some(5));
        assert_eq!(rules.protection, Some(Protection::Prolongee));
    }

    #[test]
    fn test_empty_cells_leave_rules_unset() {
        let rules = RuleSet::parse(1, "12", "", "\"\"", " ").unwrap();
        assert!(rules.is_empty());
        assert!(rules.keys().is_empty());
    }

    #[test]
    fn test_rejects_unsupported_values() {
        let err = RuleSet::parse(4, "12", "7", "", "").unwrap_err();
        assert_eq!(err.kind, ValidationKind::InvalidRule);
        assert_eq!(err.row, 4);
        assert!(RuleSet::parse(1, "12", "", "6", "").is_err());
        assert!(RuleSet::parse(1, "12", "", "", "SECRET").is_err());
        assert!(RuleSet::parse(1, "12", "ten", "", "").is_err());
    }

    #[test]
    fn test_vocabulary_keys() {
        let rules = RuleSet::parse(1, "1", "15", "0", "LIBRE").unwrap();
        let paths: Vec<String> = rules.keys().iter().map(|k| k.path()).collect();
        assert_eq!(
            paths,
            vec![
                "rules/closingPeriod0A",
                "rules/retentionPeriod15A",
                "rules/protectionLIBRE"
            ]
        );
        assert_eq!(vocabulary().len(), 9 + 6 + 4);
    }

    #[test]
    fn test_embargo() {
        assert_eq!(Protection::Libre.embargo_years(), 0);
        assert_eq!(Protection::Special.embargo_years(), 50);
    }
}
