//! The event flowing through processors.

use std::collections::BTreeMap;

use opbind_core::Value;
use uuid::Uuid;

use crate::processor::CursorProvider;

/// Content of an event payload or variable.
#[derive(Debug, Clone)]
pub enum Payload {
    /// A fully materialized value.
    Value(Value),
    /// A paged result consumed incrementally.
    Cursor(CursorProvider),
}

impl Payload {
    #[must_use]
    pub fn as_value(&self) -> Option<&Value> {
        match self {
            Payload::Value(v) => Some(v),
            Payload::Cursor(_) => None,
        }
    }

    #[must_use]
    pub fn as_cursor(&self) -> Option<&CursorProvider> {
        match self {
            Payload::Value(_) => None,
            Payload::Cursor(c) => Some(c),
        }
    }

    /// Short description used in error messages.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Payload::Value(_) => "value",
            Payload::Cursor(_) => "cursor",
        }
    }
}

impl From<Value> for Payload {
    fn from(value: Value) -> Self {
        Payload::Value(value)
    }
}

/// A message travelling through a flow.
///
/// Carries a payload plus named variables. Processors return a new event
/// rather than mutating a shared one.
#[derive(Debug, Clone)]
pub struct Event {
    correlation_id: Uuid,
    payload: Payload,
    variables: BTreeMap<String, Payload>,
}

impl Event {
    /// Creates an event with a fresh correlation id.
    #[must_use]
    pub fn new(payload: impl Into<Payload>) -> Self {
        Self {
            correlation_id: Uuid::new_v4(),
            payload: payload.into(),
            variables: BTreeMap::new(),
        }
    }

    /// Sets a variable, consuming and returning the event.
    #[must_use]
    pub fn with_variable(mut self, name: impl Into<String>, value: impl Into<Payload>) -> Self {
        self.variables.insert(name.into(), value.into());
        self
    }

    #[must_use]
    pub fn correlation_id(&self) -> Uuid {
        self.correlation_id
    }

    #[must_use]
    pub fn payload(&self) -> &Payload {
        &self.payload
    }

    #[must_use]
    pub fn variable(&self, name: &str) -> Option<&Payload> {
        self.variables.get(name)
    }

    pub fn variables(&self) -> impl Iterator<Item = (&str, &Payload)> {
        self.variables.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn set_payload(&mut self, payload: impl Into<Payload>) {
        self.payload = payload.into();
    }

    pub fn set_variable(&mut self, name: impl Into<String>, value: impl Into<Payload>) {
        self.variables.insert(name.into(), value.into());
    }
}

impl Default for Event {
    fn default() -> Self {
        Self::new(Value::Null)
    }
}
