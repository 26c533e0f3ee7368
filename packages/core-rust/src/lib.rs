//! opbind core: value model, data types, extension and operation declarations,
//! typed capabilities and extension loading.

pub mod capability;
pub mod coerce;
pub mod descriptor;
pub mod loader;
pub mod model;
pub mod types;

pub use capability::{
    Capability, CapabilityError, CapabilityExtractor, CapabilityExtractors, CapabilitySet,
    DeclarationContext, DeclarationKind, Marker, MarkerKind, PagedCapability,
    PagedCapabilityExtractor, XmlCapability, XmlCapabilityExtractor,
};
pub use coerce::{coerce, CoercionError};
pub use descriptor::{ConfigurationDescriptor, ExtensionDescriptor, OperationDescriptor};
pub use loader::{ExtensionLoader, LoadError};
pub use model::{
    ConfigurationDeclaration, DefaultValue, ExtensionDeclaration, OperationDeclaration,
    ParameterDeclaration,
};
pub use types::{DataType, TypeDefinition, TypeTable, Value};

