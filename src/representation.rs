//! Typed remote representation of a node
//!
//! A [`Representation`] is the full set of descriptive fields the store holds
//! for one node at one point in time. Writes always replace the whole
//! representation; mutations (close, reparent) read it, change typed fields
//! and write it back. Nothing in the crate edits serialized payloads.
//!
//! The textual graph payload produced by [`Representation::render_turtle`] is
//! for operator inspection and export; it is never parsed back.

use crate::error::Result;
use crate::key::NodeKey;
use crate::types::{NodeKind, RecordState};
use crate::utils::{escape_literal, hash_data};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Content hash of a representation, used for conditional writes
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ETag(String);

impl ETag {
    /// Wrap an existing tag value
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// Tag value
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// First 8 characters, for log lines
    pub fn short(&self) -> &str {
        &self.0[..self.0.len().min(8)]
    }
}

impl fmt::Display for ETag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Lifecycle action recorded by an event node
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventAction {
    /// The owning dossier was closed
    Closed,
}

impl EventAction {
    /// Event type name
    pub fn as_str(&self) -> &'static str {
        match self {
            EventAction::Closed => "closed",
        }
    }
}

/// Immutable lifecycle event
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LifecycleEvent {
    /// What happened
    pub action: EventAction,
    /// When it happened
    pub at: DateTime<Utc>,
    /// Agent responsible
    pub agent: NodeKey,
    /// Host the action ran on
    pub host: String,
}

/// Technical metadata of a document's file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Instantiation {
    /// Instantiation id within the document
    pub id: String,
    /// Original file name
    pub original_name: String,
    /// MIME type
    pub mime_type: String,
    /// Format registry identifier (e.g. `fmt/95`)
    pub format: String,
}

/// Full representation of a node
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Representation {
    /// Title
    pub title: String,
    /// Scope and content
    #[serde(rename = "abstract")]
    pub abstract_text: String,
    /// Call number
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub identifier: Option<String>,
    /// Record-set kind
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<NodeKind>,
    /// Lifecycle state
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state: Option<RecordState>,
    /// Governance rule links
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub rules: Vec<NodeKey>,
    /// Parent link
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent: Option<NodeKey>,
    /// Children links, in the order they were written
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<NodeKey>,
    /// Snapshot version label the representation was written under
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    /// Creator agent link
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub creator: Option<NodeKey>,
    /// Vocabulary tag of vocabulary entries (`recordSetType`, `state`, ...)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vocabulary: Option<String>,
    /// Lifecycle event carried by an event node
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub event: Option<LifecycleEvent>,
    /// File metadata carried by a document node
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub instantiation: Option<Instantiation>,
    /// Lifecycle event links appended to a dossier
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub events: Vec<NodeKey>,
}

impl Representation {
    /// Representation with only a title and description
    pub fn basic(title: impl Into<String>, abstract_text: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            abstract_text: abstract_text.into(),
            ..Default::default()
        }
    }

    /// Set the call number
    pub fn with_identifier(mut self, identifier: impl Into<String>) -> Self {
        self.identifier = Some(identifier.into());
        self
    }

    /// Set the record-set kind
    pub fn with_kind(mut self, kind: NodeKind) -> Self {
        self.kind = Some(kind);
        self
    }

    /// Set the lifecycle state
    pub fn with_state(mut self, state: RecordState) -> Self {
        self.state = Some(state);
        self
    }

    /// Set the parent link
    pub fn with_parent(mut self, parent: NodeKey) -> Self {
        self.parent = Some(parent);
        self
    }

    /// Set the children links
    pub fn with_children(mut self, children: Vec<NodeKey>) -> Self {
        self.children = children;
        self
    }

    /// Set the rule links
    pub fn with_rules(mut self, rules: Vec<NodeKey>) -> Self {
        self.rules = rules;
        self
    }

    /// Set the version label
    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.version = Some(version.into());
        self
    }

    /// Set the creator link
    pub fn with_creator(mut self, creator: NodeKey) -> Self {
        self.creator = Some(creator);
        self
    }

    /// Set the vocabulary tag
    pub fn with_vocabulary(mut self, tag: impl Into<String>) -> Self {
        self.vocabulary = Some(tag.into());
        self
    }

    /// Whether the representation is in the terminal state
    pub fn is_closed(&self) -> bool {
        self.state.is_some_and(|s| s.is_closed())
    }

    /// Label used for display: the call number, else the title
    pub fn label(&self) -> &str {
        match &self.identifier {
            Some(id) if !id.is_empty() => id,
            _ => &self.title,
        }
    }

    /// Canonical encoding hashed by [`Representation::etag`]
    pub fn canonical_bytes(&self) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }

    /// Content hash of the canonical encoding
    pub fn etag(&self) -> Result<ETag> {
        Ok(ETag(hash_data(&self.canonical_bytes()?)))
    }

    /// Render the textual graph payload
    ///
    /// `base` is prefixed to every node path (e.g. `http://localhost:8080/rest/`).
    pub fn render_turtle(&self, base: &str) -> String {
        let link = |key: &NodeKey| format!("<{}{}>", base, key.path());
        let links = |keys: &[NodeKey]| keys.iter().map(link).collect::<Vec<_>>().join(", ");

        let mut lines = vec![
            format!("<>  <rico:title> '{}'.", escape_literal(&self.title)),
            format!("<>  <rico:scopeAndContent> '{}'.", escape_literal(&self.abstract_text)),
        ];
        if let Some(creator) = &self.creator {
            lines.push(format!("<>  <rico:hasCreator> {}.", link(creator)));
        }
        if let Some(kind) = &self.kind {
            lines.push(format!("<>  <rico:isRecordSetTypeOf> {}.", link(&kind.key())));
        }
        if let Some(identifier) = &self.identifier {
            lines.push(format!("<>  <rico:hasOrHadIdentifier> '{}'.", escape_literal(identifier)));
        }
        if let Some(state) = &self.state {
            lines.push(format!("<>  <rico:hasRecordState> {}.", link(&state.key())));
        }
        if let Some(parent) = &self.parent {
            lines.push(format!("<>  <rico:isOrWasPartOf> {}.", link(parent)));
        }
        if !self.rules.is_empty() {
            lines.push(format!("<>  <rico:isOrWasRegulatedBy> {}.", links(&self.rules)));
        }
        if let Some(version) = &self.version {
            lines.push(format!("<>  <premis:version> '{}'.", escape_literal(version)));
        }
        if let Some(tag) = &self.vocabulary {
            lines.push(format!("<>  <rico:type> '{}'.", escape_literal(tag)));
        }
        if let Some(event) = &self.event {
            lines.push("<>  <rico:type> <premis:Event>.".to_string());
            lines.push(format!("<>  <premis:eventType> '{}'.", event.action.as_str()));
            lines.push(format!("<>  <premis:eventDateTime> '{}'.", event.at.to_rfc3339()));
            lines.push(format!("<>  <premis:linkingAgentIdentifier> {}.", link(&event.agent)));
            lines.push(format!("<>  <premis:eventDetail> '{}'.", escape_literal(&event.host)));
        }
        if let Some(inst) = &self.instantiation {
            lines.push(format!("<>  <rico:hasInstantiation> '{}'.", escape_literal(&inst.id)));
            lines.push(format!("<>  <premis:originalName> \"{}\".", inst.original_name));
            lines.push(format!("<>  <ebucore:hasMimeType> \"{}\".", inst.mime_type));
            lines.push(format!("<>  <premis:formatRegistryKey> \"{}\".", inst.format));
        }
        if !self.events.is_empty() {
            lines.push(format!("<>  <premis:hasEvent> {}.", links(&self.events)));
        }
        if !self.children.is_empty() {
            lines.push(format!("<>  <rico:hasOrHadPart> {}.", links(&self.children)));
        }

        let mut out = lines.join("\n");
        out.push('\n');
        out
    }
}
