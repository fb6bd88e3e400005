//! Typed addressing of remote store nodes
//!
//! Every node in the store is addressed by a [`NodeKey`]. The key is resolved
//! to the store's path-like address by exactly one pure function,
//! [`NodeKey::path`], and parsed back by [`NodeKey::from_str`]. Nothing else
//! in the crate formats store paths.
//!
//! ## Layout
//!
//! ```text
//! records                                   Container(Records)
//! records/<unit>                            UnitRoot
//! records/<unit>/<id>                       Record (taxonomy node or dossier)
//! records/<unit>/<dossier>/documents        Documents
//! records/<unit>/<dossier>/documents/<id>   Document
//! records/<unit>/<dossier>/events/<id>      Event
//! types | states | rules | agents           Container
//! types/<name> | states/<name> | ...        Vocabulary
//! ```
//!
//! Unit codes are lower-cased on construction so `ACV` and `acv` address the
//! same subtree.

use crate::error::{RefsyncError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Top-level grouping nodes of the store
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Container {
    /// Record sets and records, one subtree per unit
    Records,
    /// Record type vocabulary
    Types,
    /// Lifecycle state vocabulary
    States,
    /// Governance rule vocabulary
    Rules,
    /// Creators and producers
    Agents,
}

impl Container {
    /// All containers in bootstrap order
    pub const ALL: [Container; 5] = [
        Container::Records,
        Container::Types,
        Container::States,
        Container::Rules,
        Container::Agents,
    ];

    /// Path segment of the container
    pub fn as_str(&self) -> &'static str {
        match self {
            Container::Records => "records",
            Container::Types => "types",
            Container::States => "states",
            Container::Rules => "rules",
            Container::Agents => "agents",
        }
    }

    fn parse(segment: &str) -> Option<Self> {
        Container::ALL.into_iter().find(|c| c.as_str() == segment)
    }
}

impl fmt::Display for Container {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Address of a node in the remote store
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub enum NodeKey {
    /// A top-level container
    Container(Container),
    /// A vocabulary entry inside a non-record container
    Vocabulary {
        /// Owning container
        container: Container,
        /// Entry name (e.g. `referentialLeaf`, `retentionPeriod10A`)
        name: String,
    },
    /// Root of one unit's subtree
    UnitRoot {
        /// Unit code, lower case
        unit: String,
    },
    /// A taxonomy node or a dossier
    Record {
        /// Unit code, lower case
        unit: String,
        /// Node id (integer for taxonomy nodes, call number for dossiers)
        id: String,
    },
    /// Container of a dossier's documents
    Documents {
        /// Unit code, lower case
        unit: String,
        /// Owning dossier id
        dossier: String,
    },
    /// A document inside a dossier
    Document {
        /// Unit code, lower case
        unit: String,
        /// Owning dossier id
        dossier: String,
        /// Document id
        id: String,
    },
    /// An immutable lifecycle event appended to a dossier
    Event {
        /// Unit code, lower case
        unit: String,
        /// Owning dossier id
        dossier: String,
        /// Event id
        id: String,
    },
}

impl NodeKey {
    /// Key of a unit root
    pub fn unit_root(unit: &str) -> Self {
        NodeKey::UnitRoot {
            unit: unit.to_lowercase(),
        }
    }

    /// Key of a taxonomy node or dossier
    pub fn record(unit: &str, id: impl Into<String>) -> Self {
        NodeKey::Record {
            unit: unit.to_lowercase(),
            id: id.into(),
        }
    }

    /// Key of a dossier's documents container
    pub fn documents(unit: &str, dossier: impl Into<String>) -> Self {
        NodeKey::Documents {
            unit: unit.to_lowercase(),
            dossier: dossier.into(),
        }
    }

    /// Key of a document
    pub fn document(unit: &str, dossier: impl Into<String>, id: impl Into<String>) -> Self {
        NodeKey::Document {
            unit: unit.to_lowercase(),
            dossier: dossier.into(),
            id: id.into(),
        }
    }

    /// Key of a lifecycle event
    pub fn event(unit: &str, dossier: impl Into<String>, id: impl Into<String>) -> Self {
        NodeKey::Event {
            unit: unit.to_lowercase(),
            dossier: dossier.into(),
            id: id.into(),
        }
    }

    /// Key of a vocabulary entry
    pub fn vocabulary(container: Container, name: impl Into<String>) -> Self {
        NodeKey::Vocabulary {
            container,
            name: name.into(),
        }
    }

    /// Resolve the key to its store path
    pub fn path(&self) -> String {
        match self {
            NodeKey::Container(c) => c.as_str().to_string(),
            NodeKey::Vocabulary { container, name } => format!("{}/{}", container, name),
            NodeKey::UnitRoot { unit } => format!("records/{}", unit),
            NodeKey::Record { unit, id } => format!("records/{}/{}", unit, id),
            NodeKey::Documents { unit, dossier } => format!("records/{}/{}/documents", unit, dossier),
            NodeKey::Document { unit, dossier, id } => {
                format!("records/{}/{}/documents/{}", unit, dossier, id)
            }
            NodeKey::Event { unit, dossier, id } => {
                format!("records/{}/{}/events/{}", unit, dossier, id)
            }
        }
    }

    /// Unit the key belongs to, if any
    pub fn unit(&self) -> Option<&str> {
        match self {
            NodeKey::UnitRoot { unit }
            | NodeKey::Record { unit, .. }
            | NodeKey::Documents { unit, .. }
            | NodeKey::Document { unit, .. }
            | NodeKey::Event { unit, .. } => Some(unit),
            NodeKey::Container(_) | NodeKey::Vocabulary { .. } => None,
        }
    }

    /// Last path segment, used as a fallback label
    pub fn last_segment(&self) -> String {
        let path = self.path();
        match path.rsplit_once('/') {
            Some((_, last)) => last.to_string(),
            None => path,
        }
    }

    /// Check that every segment is addressable
    pub fn validate(&self) -> Result<()> {
        let path = self.path();
        for segment in path.split('/') {
            if segment.is_empty() || segment.starts_with('@') || segment == "." || segment == ".." {
                return Err(RefsyncError::InvalidKey(path));
            }
        }
        Ok(())
    }
}

impl fmt::Display for NodeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.path())
    }
}

impl FromStr for NodeKey {
    type Err = RefsyncError;

    fn from_str(s: &str) -> Result<Self> {
        let segments: Vec<&str> = s.trim_matches('/').split('/').collect();
        let invalid = || RefsyncError::InvalidKey(s.to_string());

        let container = Container::parse(segments[0]).ok_or_else(invalid)?;
        let key = match (container, segments.as_slice()) {
            (c, [_]) => NodeKey::Container(c),
            (Container::Records, [_, unit]) => NodeKey::unit_root(unit),
            (Container::Records, [_, unit, id]) => NodeKey::record(unit, *id),
            (Container::Records, [_, unit, dossier, "documents"]) => NodeKey::documents(unit, *dossier),
            (Container::Records, [_, unit, dossier, "documents", id]) => {
                NodeKey::document(unit, *dossier, *id)
            }
            (Container::Records, [_, unit, dossier, "events", id]) => {
                NodeKey::event(unit, *dossier, *id)
            }
            (Container::Records, _) => return Err(invalid()),
            (c, [_, name]) => NodeKey::vocabulary(c, *name),
            _ => return Err(invalid()),
        };
        key.validate()?;
        Ok(key)
    }
}

impl From<NodeKey> for String {
    fn from(key: NodeKey) -> Self {
        key.path()
    }
}

impl TryFrom<String> for NodeKey {
    type Error = RefsyncError;

    fn try_from(value: String) -> Result<Self> {
        value.parse()
    }
}
