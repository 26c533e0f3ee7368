//! Typed capabilities attached to extension and operation declarations.
//!
//! Descriptors carry declarative [`Marker`]s. At load time each marker is
//! handed to the [`CapabilityExtractor`] registered for its [`MarkerKind`],
//! which turns it into a typed capability stored in a [`CapabilitySet`].
//! Lookups afterwards are by exact type (`set.get::<XmlCapability>()`).

use std::any::{type_name, Any, TypeId};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Prefix of the schema location synthesized for XML capabilities that do not
/// declare one.
pub const DEFAULT_SCHEMA_LOCATION_PREFIX: &str = "https://opbind.dev/schema/";

/// Marker trait for values stored in a [`CapabilitySet`].
pub trait Capability: Any + Send + Sync + fmt::Debug {}

// ---------------------------------------------------------------------------
// CapabilitySet
// ---------------------------------------------------------------------------

/// Capabilities keyed by their concrete type.
#[derive(Clone, Default)]
pub struct CapabilitySet {
    entries: HashMap<TypeId, (&'static str, Arc<dyn Any + Send + Sync>)>,
}

impl CapabilitySet {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores a capability, replacing any previous capability of the same type.
    pub fn insert<C: Capability>(&mut self, capability: C) {
        self.entries
            .insert(TypeId::of::<C>(), (type_name::<C>(), Arc::new(capability)));
    }

    /// Retrieves a capability by its concrete type.
    #[must_use]
    pub fn get<C: Capability>(&self) -> Option<&C> {
        self.entries
            .get(&TypeId::of::<C>())
            .and_then(|(_, value)| value.downcast_ref::<C>())
    }

    #[must_use]
    pub fn contains<C: Capability>(&self) -> bool {
        self.entries.contains_key(&TypeId::of::<C>())
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl fmt::Debug for CapabilitySet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names: Vec<&str> = self.entries.values().map(|(name, _)| *name).collect();
        names.sort_unstable();
        f.debug_set().entries(names).finish()
    }
}

// ---------------------------------------------------------------------------
// Capabilities
// ---------------------------------------------------------------------------

/// The operation returns its results page by page through a cursor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PagedCapability;

impl Capability for PagedCapability {}

/// XML schema metadata of an extension.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct XmlCapability {
    pub schema_version: String,
    pub namespace: String,
    pub schema_location: String,
}

impl Capability for XmlCapability {}

// ---------------------------------------------------------------------------
// Markers
// ---------------------------------------------------------------------------

/// Declarative capability marker as written in a descriptor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum Marker {
    Xml {
        #[serde(default)]
        namespace: Option<String>,
        #[serde(default)]
        schema_version: Option<String>,
        #[serde(default)]
        schema_location: Option<String>,
    },
    Paged,
}

impl Marker {
    #[must_use]
    pub fn kind(&self) -> MarkerKind {
        match self {
            Marker::Xml { .. } => MarkerKind::Xml,
            Marker::Paged => MarkerKind::Paged,
        }
    }
}

/// Discriminant of [`Marker`], the key extractors are registered under.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MarkerKind {
    Xml,
    Paged,
}

/// Which kind of declaration a marker was found on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeclarationKind {
    Extension,
    Operation,
}

impl fmt::Display for DeclarationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeclarationKind::Extension => f.write_str("extension"),
            DeclarationKind::Operation => f.write_str("operation"),
        }
    }
}

/// What an extractor knows about the declaration it is extracting from.
#[derive(Debug, Clone, Copy)]
pub struct DeclarationContext<'a> {
    pub kind: DeclarationKind,
    /// Name of the declaration carrying the marker.
    pub name: &'a str,
    pub extension_name: &'a str,
    pub extension_version: &'a str,
}

/// Failures while turning markers into capabilities.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CapabilityError {
    #[error("marker {marker:?} is not allowed on {kind} '{name}'")]
    Misplaced {
        marker: MarkerKind,
        kind: DeclarationKind,
        name: String,
    },
    #[error("no extractor registered for marker {0:?}")]
    NoExtractor(MarkerKind),
}

// ---------------------------------------------------------------------------
// Extractors
// ---------------------------------------------------------------------------

/// Turns one kind of marker into a typed capability.
pub trait CapabilityExtractor: Send + Sync {
    /// Inserts the capability described by `marker` into `capabilities`.
    ///
    /// # Errors
    ///
    /// Returns [`CapabilityError::Misplaced`] when the marker is not valid on
    /// the kind of declaration described by `ctx`.
    fn extract(
        &self,
        marker: &Marker,
        ctx: &DeclarationContext<'_>,
        capabilities: &mut CapabilitySet,
    ) -> Result<(), CapabilityError>;
}

/// Extracts [`XmlCapability`], filling unspecified fields from the extension.
#[derive(Debug, Default)]
pub struct XmlCapabilityExtractor;

impl CapabilityExtractor for XmlCapabilityExtractor {
    fn extract(
        &self,
        marker: &Marker,
        ctx: &DeclarationContext<'_>,
        capabilities: &mut CapabilitySet,
    ) -> Result<(), CapabilityError> {
        let Marker::Xml {
            namespace,
            schema_version,
            schema_location,
        } = marker
        else {
            return Ok(());
        };
        if ctx.kind != DeclarationKind::Extension {
            return Err(misplaced(marker, ctx));
        }

        capabilities.insert(XmlCapability {
            schema_version: schema_version
                .clone()
                .unwrap_or_else(|| ctx.extension_version.to_string()),
            namespace: namespace
                .clone()
                .unwrap_or_else(|| ctx.extension_name.to_lowercase()),
            schema_location: schema_location.clone().unwrap_or_else(|| {
                format!(
                    "{DEFAULT_SCHEMA_LOCATION_PREFIX}{}",
                    ctx.extension_name.to_lowercase()
                )
            }),
        });
        Ok(())
    }
}

/// Extracts [`PagedCapability`] from operation markers.
#[derive(Debug, Default)]
pub struct PagedCapabilityExtractor;

impl CapabilityExtractor for PagedCapabilityExtractor {
    fn extract(
        &self,
        marker: &Marker,
        ctx: &DeclarationContext<'_>,
        capabilities: &mut CapabilitySet,
    ) -> Result<(), CapabilityError> {
        if ctx.kind != DeclarationKind::Operation {
            return Err(misplaced(marker, ctx));
        }
        capabilities.insert(PagedCapability);
        Ok(())
    }
}

fn misplaced(marker: &Marker, ctx: &DeclarationContext<'_>) -> CapabilityError {
    CapabilityError::Misplaced {
        marker: marker.kind(),
        kind: ctx.kind,
        name: ctx.name.to_string(),
    }
}

/// Registry of extractors keyed by marker kind.
pub struct CapabilityExtractors {
    extractors: HashMap<MarkerKind, Box<dyn CapabilityExtractor>>,
}

impl CapabilityExtractors {
    /// Creates a registry with no extractors.
    #[must_use]
    pub fn empty() -> Self {
        Self {
            extractors: HashMap::new(),
        }
    }

    /// Registers (or replaces) the extractor for `kind`.
    pub fn register(&mut self, kind: MarkerKind, extractor: impl CapabilityExtractor + 'static) {
        self.extractors.insert(kind, Box::new(extractor));
    }

    /// Runs the matching extractor for every marker.
    ///
    /// # Errors
    ///
    /// Returns [`CapabilityError::NoExtractor`] for a marker kind without a
    /// registered extractor, or the extractor's own error.
    pub fn extract_all(
        &self,
        markers: &[Marker],
        ctx: &DeclarationContext<'_>,
    ) -> Result<CapabilitySet, CapabilityError> {
        let mut capabilities = CapabilitySet::new();
        for marker in markers {
            let extractor = self
                .extractors
                .get(&marker.kind())
                .ok_or(CapabilityError::NoExtractor(marker.kind()))?;
            extractor.extract(marker, ctx, &mut capabilities)?;
        }
        Ok(capabilities)
    }
}

impl Default for CapabilityExtractors {
    /// Registry with the built-in XML and paged extractors.
    fn default() -> Self {
        let mut extractors = Self::empty();
        extractors.register(MarkerKind::Xml, XmlCapabilityExtractor);
        extractors.register(MarkerKind::Paged, PagedCapabilityExtractor);
        extractors
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    const EXTENSION_NAME: &str = "Heisenberg";
    const EXTENSION_VERSION: &str = "3.7";

    fn extension_ctx() -> DeclarationContext<'static> {
        DeclarationContext {
            kind: DeclarationKind::Extension,
            name: EXTENSION_NAME,
            extension_name: EXTENSION_NAME,
            extension_version: EXTENSION_VERSION,
        }
    }

    fn operation_ctx() -> DeclarationContext<'static> {
        DeclarationContext {
            kind: DeclarationKind::Operation,
            name: "search",
            ..extension_ctx()
        }
    }

    #[test]
    fn explicit_xml_values_are_kept() {
        let marker = Marker::Xml {
            namespace: Some("NAMESPACE".to_string()),
            schema_version: Some("SCHEMA_VERSION".to_string()),
            schema_location: Some("SCHEMA_LOCATION".to_string()),
        };
        let set = CapabilityExtractors::default()
            .extract_all(&[marker], &extension_ctx())
            .unwrap();

        let xml = set.get::<XmlCapability>().unwrap();
        assert_eq!(xml.schema_version, "SCHEMA_VERSION");
        assert_eq!(xml.namespace, "NAMESPACE");
        assert_eq!(xml.schema_location, "SCHEMA_LOCATION");
    }

    #[test]
    fn xml_defaults_come_from_extension() {
        let marker = Marker::Xml {
            namespace: Some("NAMESPACE".to_string()),
            schema_version: None,
            schema_location: None,
        };
        let set = CapabilityExtractors::default()
            .extract_all(&[marker], &extension_ctx())
            .unwrap();

        let xml = set.get::<XmlCapability>().unwrap();
        assert_eq!(xml.schema_version, EXTENSION_VERSION);
        assert_eq!(xml.namespace, "NAMESPACE");
        assert_eq!(xml.schema_location, "https://opbind.dev/schema/heisenberg");
    }

    #[test]
    fn xml_namespace_defaults_to_lowercase_name() {
        let marker = Marker::Xml {
            namespace: None,
            schema_version: None,
            schema_location: None,
        };
        let set = CapabilityExtractors::default()
            .extract_all(&[marker], &extension_ctx())
            .unwrap();
        assert_eq!(set.get::<XmlCapability>().unwrap().namespace, "heisenberg");
    }

    #[test]
    fn paged_marker_only_on_operations() {
        let extractors = CapabilityExtractors::default();
        let set = extractors.extract_all(&[Marker::Paged], &operation_ctx()).unwrap();
        assert!(set.contains::<PagedCapability>());
        assert!(!set.contains::<XmlCapability>());

        let err = extractors
            .extract_all(&[Marker::Paged], &extension_ctx())
            .unwrap_err();
        assert!(matches!(
            err,
            CapabilityError::Misplaced { marker: MarkerKind::Paged, kind: DeclarationKind::Extension, .. }
        ));
    }

    #[test]
    fn missing_extractor_is_an_error() {
        let err = CapabilityExtractors::empty()
            .extract_all(&[Marker::Paged], &operation_ctx())
            .unwrap_err();
        assert_eq!(err, CapabilityError::NoExtractor(MarkerKind::Paged));
    }

    #[test]
    fn lookup_is_by_exact_type() {
        let mut set = CapabilitySet::new();
        assert!(set.is_empty());
        set.insert(PagedCapability);
        set.insert(PagedCapability);
        assert_eq!(set.len(), 1);
        assert!(set.get::<XmlCapability>().is_none());
        assert_eq!(set.get::<PagedCapability>(), Some(&PagedCapability));
    }

    #[test]
    fn marker_deserializes_with_kind_tag() {
        let marker: Marker = serde_json::from_str(r#"{"kind": "xml", "namespace": "ns"}"#).unwrap();
        assert_eq!(marker.kind(), MarkerKind::Xml);
        let marker: Marker = serde_json::from_str(r#"{"kind": "paged"}"#).unwrap();
        assert_eq!(marker, Marker::Paged);
    }
}
