//! Parameter resolution: raw values to typed, possibly deferred resolvers.

pub mod expression;
pub mod parameters;
pub mod set;
pub mod value;

pub use expression::{Expression, ExpressionError, ExpressionRoot};
pub use parameters::{ParametersResolver, RawParameterMap};
pub use set::{ResolverSet, ResolverSetResult};
pub use value::{ConfigurationDefaultResolver, ExpressionResolver, StaticResolver, ValueResolver};
