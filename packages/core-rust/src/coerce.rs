//! Value coercion against declared parameter types.
//!
//! Coercion is always performed against an explicit [`TypeTable`] (the
//! declaring extension's), never against ambient state.
//!
//! Rules:
//! - `Null` is accepted for every type and passes through unchanged.
//! - `Any` accepts everything.
//! - `Bool` accepts bools and the strings `"true"` / `"false"` (any case).
//! - `Int` accepts ints, floats without a fractional part, and parseable strings.
//! - `Float` accepts floats, ints and parseable strings.
//! - `String` accepts strings and renders bools and numbers.
//! - `Bytes` accepts bytes and strings (UTF-8 encoded).
//! - `Array(t)` accepts arrays whose every item coerces to `t`.
//! - `Map` accepts maps.
//! - `Named(n)` resolves `n` in the type table: aliases recurse, enumerations
//!   accept only their listed strings.

use thiserror::Error;

use crate::types::{DataType, TypeDefinition, TypeTable, Value};

/// Bound on alias chains, guards against `A -> B -> A` tables.
const MAX_ALIAS_DEPTH: usize = 16;

/// Reasons a value cannot be coerced to a declared type.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum CoercionError {
    #[error("cannot coerce {found} value to {expected}")]
    Incompatible { expected: String, found: &'static str },
    #[error("'{value}' is not a valid {expected}")]
    Unparseable { expected: String, value: String },
    #[error("'{value}' is not one of the values of {type_name}: {allowed:?}")]
    NotInEnumeration {
        type_name: String,
        value: String,
        allowed: Vec<String>,
    },
    #[error("unknown type '{0}'")]
    UnknownType(String),
    #[error("alias chain for '{0}' is too deep")]
    AliasDepth(String),
}

/// Coerces `value` to `data_type`, resolving named types through `types`.
///
/// # Errors
///
/// Returns [`CoercionError`] if the value has no valid representation as the
/// declared type.
pub fn coerce(value: Value, data_type: &DataType, types: &TypeTable) -> Result<Value, CoercionError> {
    coerce_at_depth(value, data_type, types, 0)
}

fn coerce_at_depth(
    value: Value,
    data_type: &DataType,
    types: &TypeTable,
    depth: usize,
) -> Result<Value, CoercionError> {
    if value.is_null() {
        return Ok(value);
    }

    match data_type {
        DataType::Any => Ok(value),
        DataType::Bool => match value {
            Value::Bool(_) => Ok(value),
            Value::String(s) if s.eq_ignore_ascii_case("true") => Ok(Value::Bool(true)),
            Value::String(s) if s.eq_ignore_ascii_case("false") => Ok(Value::Bool(false)),
            Value::String(s) => Err(unparseable(data_type, s)),
            other => Err(incompatible(data_type, &other)),
        },
        DataType::Int => match value {
            Value::Int(_) => Ok(value),
            #[allow(clippy::cast_possible_truncation, clippy::float_cmp)]
            Value::Float(f) if f.fract() == 0.0 && f.is_finite() && f.abs() < 9.0e18 => {
                Ok(Value::Int(f as i64))
            }
            Value::String(s) => s
                .trim()
                .parse::<i64>()
                .map(Value::Int)
                .map_err(|_| unparseable(data_type, s)),
            other => Err(incompatible(data_type, &other)),
        },
        DataType::Float => match value {
            Value::Float(_) => Ok(value),
            #[allow(clippy::cast_precision_loss)]
            Value::Int(i) => Ok(Value::Float(i as f64)),
            Value::String(s) => s
                .trim()
                .parse::<f64>()
                .map(Value::Float)
                .map_err(|_| unparseable(data_type, s)),
            other => Err(incompatible(data_type, &other)),
        },
        DataType::String => match value {
            Value::String(_) => Ok(value),
            Value::Bool(b) => Ok(Value::String(b.to_string())),
            Value::Int(i) => Ok(Value::String(i.to_string())),
            Value::Float(f) => Ok(Value::String(f.to_string())),
            other => Err(incompatible(data_type, &other)),
        },
        DataType::Bytes => match value {
            Value::Bytes(_) => Ok(value),
            Value::String(s) => Ok(Value::Bytes(s.into_bytes())),
            other => Err(incompatible(data_type, &other)),
        },
        DataType::Array(item_type) => match value {
            Value::Array(items) => items
                .into_iter()
                .map(|item| coerce_at_depth(item, item_type, types, depth))
                .collect::<Result<Vec<_>, _>>()
                .map(Value::Array),
            other => Err(incompatible(data_type, &other)),
        },
        DataType::Map => match value {
            Value::Map(_) => Ok(value),
            other => Err(incompatible(data_type, &other)),
        },
        DataType::Named(name) => {
            if depth >= MAX_ALIAS_DEPTH {
                return Err(CoercionError::AliasDepth(name.clone()));
            }
            match types.get(name) {
                Some(TypeDefinition::Alias(target)) => {
                    coerce_at_depth(value, target, types, depth + 1)
                }
                Some(TypeDefinition::Enumeration(allowed)) => match value {
                    Value::String(s) if allowed.contains(&s) => Ok(Value::String(s)),
                    Value::String(s) => Err(CoercionError::NotInEnumeration {
                        type_name: name.clone(),
                        value: s,
                        allowed: allowed.clone(),
                    }),
                    other => Err(incompatible(data_type, &other)),
                },
                None => Err(CoercionError::UnknownType(name.clone())),
            }
        }
    }
}

fn incompatible(expected: &DataType, found: &Value) -> CoercionError {
    CoercionError::Incompatible {
        expected: expected.to_string(),
        found: found.type_name(),
    }
}

fn unparseable(expected: &DataType, value: String) -> CoercionError {
    CoercionError::Unparseable {
        expected: expected.to_string(),
        value,
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn table() -> TypeTable {
        let mut types = TypeTable::new();
        types.register(
            "Color",
            TypeDefinition::Enumeration(vec!["red".to_string(), "green".to_string()]),
        );
        types.register("PageSize", TypeDefinition::Alias(DataType::Int));
        types.register("Loop", TypeDefinition::Alias(DataType::Named("Loop".to_string())));
        types
    }

    #[test]
    fn null_passes_for_every_type() {
        let types = table();
        for dt in [DataType::Int, DataType::Map, DataType::Named("Color".to_string())] {
            assert_eq!(coerce(Value::Null, &dt, &types).unwrap(), Value::Null);
        }
    }

    #[test]
    fn int_from_string_and_integral_float() {
        let types = TypeTable::new();
        assert_eq!(coerce(Value::from(" 42 "), &DataType::Int, &types).unwrap(), Value::Int(42));
        assert_eq!(coerce(Value::Float(3.0), &DataType::Int, &types).unwrap(), Value::Int(3));
        assert!(matches!(
            coerce(Value::Float(3.5), &DataType::Int, &types),
            Err(CoercionError::Incompatible { found: "float", .. })
        ));
        assert!(matches!(
            coerce(Value::from("fifty"), &DataType::Int, &types),
            Err(CoercionError::Unparseable { .. })
        ));
    }

    #[test]
    fn bool_accepts_case_insensitive_literals() {
        let types = TypeTable::new();
        assert_eq!(coerce(Value::from("TRUE"), &DataType::Bool, &types).unwrap(), Value::Bool(true));
        assert!(coerce(Value::Int(1), &DataType::Bool, &types).is_err());
    }

    #[test]
    fn string_renders_scalars_but_not_maps() {
        let types = TypeTable::new();
        assert_eq!(coerce(Value::Int(7), &DataType::String, &types).unwrap(), Value::from("7"));
        assert!(coerce(Value::Map(std::collections::BTreeMap::new()), &DataType::String, &types).is_err());
    }

    #[test]
    fn array_items_are_coerced() {
        let types = TypeTable::new();
        let dt = DataType::Array(Box::new(DataType::Int));
        let value = Value::Array(vec![Value::from("1"), Value::Int(2)]);
        assert_eq!(
            coerce(value, &dt, &types).unwrap(),
            Value::Array(vec![Value::Int(1), Value::Int(2)])
        );
    }

    #[test]
    fn named_types_resolve_through_table() {
        let types = table();
        assert_eq!(
            coerce(Value::from("10"), &DataType::Named("PageSize".to_string()), &types).unwrap(),
            Value::Int(10)
        );
        assert!(coerce(Value::from("red"), &DataType::Named("Color".to_string()), &types).is_ok());
        assert!(matches!(
            coerce(Value::from("blue"), &DataType::Named("Color".to_string()), &types),
            Err(CoercionError::NotInEnumeration { .. })
        ));
        assert_eq!(
            coerce(Value::from("x"), &DataType::Named("Shape".to_string()), &types),
            Err(CoercionError::UnknownType("Shape".to_string()))
        );
    }

    #[test]
    fn same_type_name_differs_per_table() {
        let mut other = TypeTable::new();
        other.register("Color", TypeDefinition::Enumeration(vec!["blue".to_string()]));
        let dt = DataType::Named("Color".to_string());
        assert!(coerce(Value::from("blue"), &dt, &other).is_ok());
        assert!(coerce(Value::from("blue"), &dt, &table()).is_err());
    }

    proptest::proptest! {
        /// Any rendered integer coerces back to the same integer.
        #[test]
        fn int_strings_coerce_to_ints(n in proptest::prelude::any::<i64>()) {
            let coerced = coerce(Value::String(n.to_string()), &DataType::Int, &TypeTable::new());
            proptest::prop_assert_eq!(coerced, Ok(Value::Int(n)));
        }

        /// Coercion never panics on arbitrary strings.
        #[test]
        fn arbitrary_strings_never_panic(s in ".*") {
            let types = TypeTable::new();
            for dt in [DataType::Bool, DataType::Int, DataType::Float, DataType::Bytes] {
                let _ = coerce(Value::String(s.clone()), &dt, &types);
            }
        }
    }

    #[test]
    fn cyclic_alias_is_rejected() {
        let types = table();
        assert!(matches!(
            coerce(Value::Int(1), &DataType::Named("Loop".to_string()), &types),
            Err(CoercionError::AliasDepth(_))
        ));
    }
}
