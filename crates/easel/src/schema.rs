//! Parameter schema model.
//!
//! Generation tools take deeply-optional parameter sets, so argument
//! validation is data-driven: every parameter declares a [`ValueSchema`] and
//! one recursive [`ValueSchema::conform`] pass checks and coerces the supplied
//! value. The same declaration renders the JSON Schema fragment that discovery
//! hands to callers.
//!
//! Opaque handles (image buffers, tensors, RNG state) live only in server
//! memory and are never structurally serialized. Each [`OpaqueType`] declares
//! how its parameter crosses the wire instead: as an out-of-band reference
//! (artifact hash, seed integer) or not at all.

use serde_json::{json, Map, Value};
use thiserror::Error;

/// A value failed to match its declared schema.
#[derive(Debug, Clone, Error)]
#[error("{0}")]
pub struct SchemaError(pub String);

/// Declared semantic type of a parameter or return value.
#[derive(Debug, Clone, PartialEq)]
pub enum ValueSchema {
    String,
    Integer,
    Float,
    Boolean,
    /// Free-form JSON object (e.g. attention kwargs forwarded verbatim).
    Object,
    List(Box<ValueSchema>),
    Nullable(Box<ValueSchema>),
    /// Accepts either a bare scalar or a list; a bare scalar is lifted into a
    /// one-element list during conforming.
    ScalarOrList(Box<ValueSchema>),
    Opaque(OpaqueType),
}

/// How an opaque handle is represented when a caller supplies it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WireForm {
    /// An out-of-band reference carried as a string (e.g. artifact hash).
    StringRef,
    /// An out-of-band reference carried as an integer (e.g. RNG seed).
    IntegerRef,
    /// The parameter cannot cross the wire at all; callers must omit it.
    Forbidden,
}

/// An opaque-handle type: a server-memory value with a declared wire policy
/// and a format tag for the documentation-only schema placeholder.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OpaqueType {
    pub format: &'static str,
    pub wire: WireForm,
}

impl ValueSchema {
    pub fn list(inner: ValueSchema) -> Self {
        ValueSchema::List(Box::new(inner))
    }

    pub fn nullable(inner: ValueSchema) -> Self {
        ValueSchema::Nullable(Box::new(inner))
    }

    pub fn scalar_or_list(inner: ValueSchema) -> Self {
        ValueSchema::ScalarOrList(Box::new(inner))
    }

    pub fn is_nullable(&self) -> bool {
        matches!(self, ValueSchema::Nullable(_))
    }

    /// Validate `value` against this schema, returning the conformed value.
    ///
    /// The only narrowing-to-widening coercion is `ScalarOrList`: a bare
    /// scalar comes back wrapped in a one-element list. Everything else must
    /// match exactly.
    pub fn conform(&self, value: &Value) -> Result<Value, SchemaError> {
        match self {
            ValueSchema::String => match value {
                Value::String(_) => Ok(value.clone()),
                other => Err(mismatch("a string", other)),
            },
            ValueSchema::Integer => {
                if value.is_i64() || value.is_u64() {
                    Ok(value.clone())
                } else {
                    Err(mismatch("an integer", value))
                }
            }
            ValueSchema::Float => {
                if value.is_number() {
                    Ok(value.clone())
                } else {
                    Err(mismatch("a number", value))
                }
            }
            ValueSchema::Boolean => match value {
                Value::Bool(_) => Ok(value.clone()),
                other => Err(mismatch("a boolean", other)),
            },
            ValueSchema::Object => match value {
                Value::Object(_) => Ok(value.clone()),
                other => Err(mismatch("an object", other)),
            },
            ValueSchema::List(inner) => match value {
                Value::Array(items) => conform_items(inner, items),
                other => Err(mismatch("a list", other)),
            },
            ValueSchema::Nullable(inner) => match value {
                Value::Null => Ok(Value::Null),
                other => inner.conform(other),
            },
            ValueSchema::ScalarOrList(inner) => match value {
                Value::Array(items) => conform_items(inner, items),
                scalar => Ok(Value::Array(vec![inner.conform(scalar)?])),
            },
            ValueSchema::Opaque(opaque) => match opaque.wire {
                WireForm::StringRef => match value {
                    Value::String(_) => Ok(value.clone()),
                    other => Err(mismatch(
                        &format!("a `{}` reference string", opaque.format),
                        other,
                    )),
                },
                WireForm::IntegerRef => {
                    if value.is_i64() || value.is_u64() {
                        Ok(value.clone())
                    } else {
                        Err(mismatch(
                            &format!("a `{}` reference integer", opaque.format),
                            value,
                        ))
                    }
                }
                WireForm::Forbidden => Err(SchemaError(format!(
                    "values of type `{}` cannot be supplied over the wire",
                    opaque.format
                ))),
            },
        }
    }

    /// Render the JSON Schema fragment for discovery.
    ///
    /// Opaque types render a placeholder carrying their format tag; the
    /// placeholder documents the handle, it does not describe a wire layout.
    pub fn json_schema(&self) -> Value {
        match self {
            ValueSchema::String => json!({ "type": "string" }),
            ValueSchema::Integer => json!({ "type": "integer" }),
            ValueSchema::Float => json!({ "type": "number" }),
            ValueSchema::Boolean => json!({ "type": "boolean" }),
            ValueSchema::Object => json!({ "type": "object" }),
            ValueSchema::List(inner) => json!({
                "type": "array",
                "items": inner.json_schema(),
            }),
            ValueSchema::Nullable(inner) => {
                let mut schema = inner.json_schema();
                let simple = schema
                    .get("type")
                    .and_then(Value::as_str)
                    .map(str::to_string);
                match simple {
                    Some(ty) => {
                        schema["type"] = json!([ty, "null"]);
                        schema
                    }
                    None => json!({ "anyOf": [schema, { "type": "null" }] }),
                }
            }
            ValueSchema::ScalarOrList(inner) => json!({
                "anyOf": [
                    inner.json_schema(),
                    { "type": "array", "items": inner.json_schema() },
                ]
            }),
            ValueSchema::Opaque(opaque) => match opaque.wire {
                WireForm::StringRef => json!({ "type": "string", "format": opaque.format }),
                WireForm::IntegerRef => json!({ "type": "integer", "format": opaque.format }),
                WireForm::Forbidden => json!({ "type": "object", "format": opaque.format }),
            },
        }
    }
}

fn conform_items(inner: &ValueSchema, items: &[Value]) -> Result<Value, SchemaError> {
    let mut out = Vec::with_capacity(items.len());
    for (i, item) in items.iter().enumerate() {
        out.push(
            inner
                .conform(item)
                .map_err(|e| SchemaError(format!("element {}: {}", i, e)))?,
        );
    }
    Ok(Value::Array(out))
}

fn mismatch(expected: &str, got: &Value) -> SchemaError {
    SchemaError(format!("expected {}, got {}", expected, json_kind(got)))
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "a list",
        Value::Object(_) => "an object",
    }
}

/// One declared parameter of a tool.
#[derive(Debug, Clone)]
pub struct ParamSpec {
    pub name: String,
    pub schema: ValueSchema,
    pub default: Option<Value>,
    pub description: Option<String>,
}

impl ParamSpec {
    pub fn new(name: impl Into<String>, schema: ValueSchema) -> Self {
        Self {
            name: name.into(),
            schema,
            default: None,
            description: None,
        }
    }

    pub fn with_default(mut self, default: impl Into<Value>) -> Self {
        self.default = Some(default.into());
        self
    }

    pub fn describe(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// A parameter is required iff it has no default and is not nullable.
    pub fn is_required(&self) -> bool {
        self.default.is_none() && !self.schema.is_nullable()
    }

    /// The value bound when the caller omits this parameter, if optional.
    pub fn omitted_value(&self) -> Option<Value> {
        match &self.default {
            Some(default) => Some(default.clone()),
            None if self.schema.is_nullable() => Some(Value::Null),
            None => None,
        }
    }

    /// The discovery schema for this parameter, including default and doc.
    pub fn json_schema(&self) -> Value {
        let mut schema = self.schema.json_schema();
        if let Value::Object(map) = &mut schema {
            if let Some(description) = &self.description {
                map.insert("description".to_string(), json!(description));
            }
            if let Some(default) = &self.default {
                map.insert("default".to_string(), default.clone());
            }
        }
        schema
    }
}

/// Build the `properties` map and `required` list for a parameter set.
pub fn object_schema_parts(params: &[ParamSpec]) -> (Map<String, Value>, Vec<String>) {
    let mut properties = Map::new();
    let mut required = Vec::new();
    for param in params {
        properties.insert(param.name.clone(), param.json_schema());
        if param.is_required() {
            required.push(param.name.clone());
        }
    }
    (properties, required)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    const IMAGE: OpaqueType = OpaqueType {
        format: "image-artifact",
        wire: WireForm::StringRef,
    };
    const TENSOR: OpaqueType = OpaqueType {
        format: "tensor-handle",
        wire: WireForm::Forbidden,
    };

    #[test]
    fn primitives_conform() {
        assert!(ValueSchema::String.conform(&json!("hi")).is_ok());
        assert!(ValueSchema::Integer.conform(&json!(3)).is_ok());
        assert!(ValueSchema::Float.conform(&json!(7.5)).is_ok());
        assert!(ValueSchema::Boolean.conform(&json!(true)).is_ok());
        assert!(ValueSchema::Object.conform(&json!({"a": 1})).is_ok());
    }

    #[test]
    fn primitives_reject_wrong_kind() {
        assert!(ValueSchema::String.conform(&json!(3)).is_err());
        assert!(ValueSchema::Integer.conform(&json!(2.5)).is_err());
        assert!(ValueSchema::Boolean.conform(&json!("true")).is_err());
    }

    #[test]
    fn integers_pass_where_floats_declared() {
        assert_eq!(ValueSchema::Float.conform(&json!(5)).unwrap(), json!(5));
    }

    #[test]
    fn scalar_lifts_into_list() {
        let schema = ValueSchema::scalar_or_list(ValueSchema::String);
        assert_eq!(schema.conform(&json!("a cat")).unwrap(), json!(["a cat"]));
        assert_eq!(schema.conform(&json!(["a", "b"])).unwrap(), json!(["a", "b"]));
        assert!(schema.conform(&json!([1])).is_err());
    }

    #[test]
    fn nullable_accepts_null_and_inner() {
        let schema = ValueSchema::nullable(ValueSchema::Integer);
        assert_eq!(schema.conform(&Value::Null).unwrap(), Value::Null);
        assert_eq!(schema.conform(&json!(4)).unwrap(), json!(4));
        assert!(schema.conform(&json!("4")).is_err());
    }

    #[test]
    fn list_conforms_elementwise() {
        let schema = ValueSchema::list(ValueSchema::Float);
        assert!(schema.conform(&json!([1.0, 2, 3.5])).is_ok());
        let err = schema.conform(&json!([1.0, "x"])).unwrap_err();
        assert!(err.to_string().contains("element 1"));
    }

    #[test]
    fn opaque_reference_forms() {
        let image = ValueSchema::Opaque(IMAGE);
        assert!(image.conform(&json!("ab12")).is_ok());
        assert!(image.conform(&json!({"pixels": []})).is_err());

        let rng = ValueSchema::Opaque(OpaqueType {
            format: "rng-seed",
            wire: WireForm::IntegerRef,
        });
        assert!(rng.conform(&json!(42)).is_ok());
        assert!(rng.conform(&json!("42")).is_err());
    }

    #[test]
    fn forbidden_opaque_rejects_everything() {
        let schema = ValueSchema::Opaque(TENSOR);
        let err = schema.conform(&json!({"shape": [4, 64, 64]})).unwrap_err();
        assert!(err.to_string().contains("cannot be supplied over the wire"));
        // Null is still fine when wrapped in Nullable, i.e. the caller omits it.
        let nullable = ValueSchema::nullable(ValueSchema::Opaque(TENSOR));
        assert!(nullable.conform(&Value::Null).is_ok());
    }

    #[test]
    fn json_schema_fragments() {
        assert_eq!(
            ValueSchema::nullable(ValueSchema::Integer).json_schema(),
            json!({ "type": ["integer", "null"] })
        );
        assert_eq!(
            ValueSchema::scalar_or_list(ValueSchema::String).json_schema(),
            json!({ "anyOf": [
                { "type": "string" },
                { "type": "array", "items": { "type": "string" } },
            ]})
        );
        assert_eq!(
            ValueSchema::Opaque(TENSOR).json_schema(),
            json!({ "type": "object", "format": "tensor-handle" })
        );
    }

    #[test]
    fn nullable_union_falls_back_to_any_of() {
        let schema = ValueSchema::nullable(ValueSchema::scalar_or_list(ValueSchema::String));
        let json = schema.json_schema();
        assert!(json.get("anyOf").is_some());
    }

    #[test]
    fn requiredness_is_derived() {
        assert!(ParamSpec::new("prompt", ValueSchema::String).is_required());
        assert!(!ParamSpec::new("steps", ValueSchema::Integer)
            .with_default(50)
            .is_required());
        assert!(!ParamSpec::new("width", ValueSchema::nullable(ValueSchema::Integer)).is_required());
    }

    #[test]
    fn omitted_values() {
        let with_default = ParamSpec::new("steps", ValueSchema::Integer).with_default(50);
        assert_eq!(with_default.omitted_value(), Some(json!(50)));

        let nullable = ParamSpec::new("width", ValueSchema::nullable(ValueSchema::Integer));
        assert_eq!(nullable.omitted_value(), Some(Value::Null));

        let required = ParamSpec::new("prompt", ValueSchema::String);
        assert_eq!(required.omitted_value(), None);
    }

    #[test]
    fn param_schema_carries_default_and_description() {
        let spec = ParamSpec::new("guidance_scale", ValueSchema::Float)
            .with_default(7.5)
            .describe("Classifier-free guidance scale");
        let schema = spec.json_schema();
        assert_eq!(schema["default"], 7.5);
        assert_eq!(schema["description"], "Classifier-free guidance scale");
    }
}
