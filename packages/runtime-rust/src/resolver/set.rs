//! Ordered, named collections of resolvers bound to a parameter list.

use std::collections::BTreeMap;
use std::sync::Arc;

use opbind_core::Value;

use crate::error::ResolutionError;
use crate::event::Event;
use crate::resolver::ValueResolver;

#[derive(Debug, Clone)]
struct Entry {
    name: String,
    resolver: Arc<dyn ValueResolver>,
    required: bool,
}

/// Resolvers for every declared parameter of an operation or configuration,
/// in declaration order.
///
/// Built by [`crate::resolver::ParametersResolver`], which guarantees one
/// entry per declared parameter.
#[derive(Debug, Clone, Default)]
pub struct ResolverSet {
    entries: Vec<Entry>,
}

impl ResolverSet {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a resolver. A later entry with the same name replaces the
    /// earlier one in place.
    pub fn add(&mut self, name: impl Into<String>, resolver: Arc<dyn ValueResolver>, required: bool) {
        let name = name.into();
        if let Some(existing) = self.entries.iter_mut().find(|e| e.name == name) {
            existing.resolver = resolver;
            existing.required = required;
        } else {
            self.entries.push(Entry {
                name,
                resolver,
                required,
            });
        }
    }

    #[must_use]
    pub fn get(&self, name: &str) -> Option<&Arc<dyn ValueResolver>> {
        self.entries.iter().find(|e| e.name == name).map(|e| &e.resolver)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Parameter names in declaration order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|e| e.name.as_str())
    }

    /// True if any resolver depends on the event.
    #[must_use]
    pub fn is_dynamic(&self) -> bool {
        self.entries.iter().any(|e| e.resolver.is_dynamic())
    }

    /// Resolves every entry against `event`.
    ///
    /// # Errors
    ///
    /// Returns the first resolver failure, or
    /// [`ResolutionError::MissingValue`] when a required parameter resolves to
    /// `Null`.
    pub fn resolve(&self, event: &Event) -> Result<ResolverSetResult, ResolutionError> {
        let mut values = BTreeMap::new();
        for entry in &self.entries {
            let value = entry.resolver.resolve(event)?;
            if entry.required && value.is_null() {
                return Err(ResolutionError::MissingValue {
                    parameter: entry.name.clone(),
                });
            }
            values.insert(entry.name.clone(), value);
        }
        Ok(ResolverSetResult { values })
    }
}

/// Concrete argument map produced by [`ResolverSet::resolve`].
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ResolverSetResult {
    values: BTreeMap<String, Value>,
}

impl ResolverSetResult {
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.values.get(name)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.values.iter().map(|(k, v)| (k.as_str(), v))
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    #[must_use]
    pub fn into_map(self) -> BTreeMap<String, Value> {
        self.values
    }

    /// Stable string form of the values, used to key instance caches.
    #[must_use]
    pub fn cache_key(&self) -> String {
        serde_json::Value::from(Value::Map(self.values.clone())).to_string()
    }
}

impl From<ResolverSetResult> for Value {
    fn from(result: ResolverSetResult) -> Self {
        Value::Map(result.values)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resolver::{Expression, ExpressionResolver, StaticResolver};
    use crate::configuration::NoConfiguration;
    use opbind_core::{DataType, TypeTable};

    #[test]
    fn keeps_declaration_order() {
        let mut set = ResolverSet::new();
        set.add("b", Arc::new(StaticResolver::new(Value::Int(2))), false);
        set.add("a", Arc::new(StaticResolver::new(Value::Int(1))), false);
        assert_eq!(set.names().collect::<Vec<_>>(), vec!["b", "a"]);
        assert!(!set.is_dynamic());
    }

    #[test]
    fn re_adding_replaces_in_place() {
        let mut set = ResolverSet::new();
        set.add("a", Arc::new(StaticResolver::new(Value::Int(1))), false);
        set.add("a", Arc::new(StaticResolver::new(Value::Int(9))), false);
        assert_eq!(set.len(), 1);
        let result = set.resolve(&Event::default()).unwrap();
        assert_eq!(result.get("a"), Some(&Value::Int(9)));
    }

    #[test]
    fn required_null_is_missing() {
        let mut set = ResolverSet::new();
        set.add(
            "query",
            Arc::new(ExpressionResolver::new(
                "query",
                Expression::parse("#[payload.q]").unwrap(),
                DataType::String,
                Arc::new(TypeTable::new()),
                Arc::new(NoConfiguration),
            )),
            true,
        );
        assert!(set.is_dynamic());

        let err = set.resolve(&Event::default()).unwrap_err();
        assert!(matches!(err, ResolutionError::MissingValue { parameter } if parameter == "query"));

        let event = Event::new(Value::from(serde_json::json!({"q": "rust"})));
        let result = set.resolve(&event).unwrap();
        assert_eq!(result.get("query"), Some(&Value::from("rust")));
    }

    #[test]
    fn cache_key_is_stable() {
        let mut a = ResolverSet::new();
        a.add("x", Arc::new(StaticResolver::new(Value::Int(1))), false);
        a.add("y", Arc::new(StaticResolver::new(Value::from("z"))), false);
        let mut b = ResolverSet::new();
        b.add("y", Arc::new(StaticResolver::new(Value::from("z"))), false);
        b.add("x", Arc::new(StaticResolver::new(Value::Int(1))), false);

        let event = Event::default();
        assert_eq!(
            a.resolve(&event).unwrap().cache_key(),
            b.resolve(&event).unwrap().cache_key()
        );
    }
}
