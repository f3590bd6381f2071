use std::fmt;

use serde::de::DeserializeOwned;
use serde_json::{json, Map, Value};

/// Declared type of a single argument.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldType {
    String,
    Integer,
    Number,
    Boolean,
    Array(Box<FieldType>),
    Object(InputSchema),
    /// Accepts any non-null JSON value.
    Any,
}

impl FieldType {
    pub fn array_of(item: FieldType) -> Self {
        FieldType::Array(Box::new(item))
    }

    fn type_name(&self) -> &'static str {
        match self {
            FieldType::String => "string",
            FieldType::Integer => "integer",
            FieldType::Number => "number",
            FieldType::Boolean => "boolean",
            FieldType::Array(_) => "array",
            FieldType::Object(_) => "object",
            FieldType::Any => "any",
        }
    }

    fn to_json_schema(&self) -> Value {
        match self {
            FieldType::Array(item) => json!({ "type": "array", "items": item.to_json_schema() }),
            FieldType::Object(schema) => schema.to_json_schema(),
            FieldType::Any => json!({}),
            other => json!({ "type": other.type_name() }),
        }
    }
}

/// One named argument in an `InputSchema`.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldSpec {
    pub name: String,
    pub ty: FieldType,
    pub required: bool,
    pub description: Option<String>,
    /// Allowed values for string fields.
    pub allowed: Option<Vec<String>>,
}

impl FieldSpec {
    pub fn new(name: impl Into<String>, ty: FieldType) -> Self {
        Self {
            name: name.into(),
            ty,
            required: false,
            description: None,
            allowed: None,
        }
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    pub fn describe(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn one_of<I, S>(mut self, values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.allowed = Some(values.into_iter().map(Into::into).collect());
        self
    }
}

/// Structural description of a tool's arguments.
///
/// Unknown fields are dropped during validation unless the schema is strict,
/// in which case they are rejected.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct InputSchema {
    fields: Vec<FieldSpec>,
    strict: bool,
}

impl InputSchema {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn field(mut self, field: FieldSpec) -> Self {
        self.fields.push(field);
        self
    }

    pub fn required(self, name: &str, ty: FieldType, description: &str) -> Self {
        self.field(FieldSpec::new(name, ty).required().describe(description))
    }

    pub fn optional(self, name: &str, ty: FieldType, description: &str) -> Self {
        self.field(FieldSpec::new(name, ty).describe(description))
    }

    pub fn strict(mut self) -> Self {
        self.strict = true;
        self
    }

    pub fn is_strict(&self) -> bool {
        self.strict
    }

    pub fn fields(&self) -> &[FieldSpec] {
        &self.fields
    }

    /// JSON-Schema-like shape sent to the model as the tool's `input_schema`.
    pub fn to_json_schema(&self) -> Value {
        let mut properties = Map::new();
        for f in &self.fields {
            let mut prop = f.ty.to_json_schema();
            if let Some(ref desc) = f.description {
                prop["description"] = Value::String(desc.clone());
            }
            if let Some(ref allowed) = f.allowed {
                prop["enum"] = json!(allowed);
            }
            properties.insert(f.name.clone(), prop);
        }

        let required: Vec<&str> = self
            .fields
            .iter()
            .filter(|f| f.required)
            .map(|f| f.name.as_str())
            .collect();

        let mut schema = json!({
            "type": "object",
            "properties": properties,
            "required": required,
        });
        if self.strict {
            schema["additionalProperties"] = Value::Bool(false);
        }
        schema
    }

    /// Check untyped arguments against this schema. Pure, no I/O.
    ///
    /// `null` is accepted as an empty argument object. Every violation is
    /// reported, not just the first one.
    pub fn validate(&self, raw: &Value) -> Result<ValidatedInput, ValidationError> {
        let empty = Map::new();
        let obj = match raw {
            Value::Object(map) => map,
            Value::Null => &empty,
            other => {
                return Err(ValidationError {
                    violations: vec![Violation {
                        path: String::new(),
                        kind: ViolationKind::NotAnObject,
                        expected: Some("object".into()),
                        received: Some(json_type_name(other).into()),
                    }],
                })
            }
        };

        let mut violations = Vec::new();
        let cleaned = self.check_object(obj, "", &mut violations);

        if violations.is_empty() {
            Ok(ValidatedInput { fields: cleaned })
        } else {
            Err(ValidationError { violations })
        }
    }

    fn check_object(
        &self,
        obj: &Map<String, Value>,
        prefix: &str,
        violations: &mut Vec<Violation>,
    ) -> Map<String, Value> {
        let mut out = Map::new();

        for f in &self.fields {
            let path = join_path(prefix, &f.name);
            match obj.get(&f.name) {
                None | Some(Value::Null) => {
                    if f.required {
                        violations.push(Violation {
                            path,
                            kind: ViolationKind::Missing,
                            expected: Some(f.ty.type_name().into()),
                            received: None,
                        });
                    }
                }
                Some(value) => {
                    if let Some(cleaned) = check_value(&f.ty, value, &path, violations) {
                        if let (Some(allowed), Some(s)) = (&f.allowed, cleaned.as_str()) {
                            if !allowed.iter().any(|a| a == s) {
                                violations.push(Violation {
                                    path,
                                    kind: ViolationKind::NotAllowed,
                                    expected: Some(format!("one of [{}]", allowed.join(", "))),
                                    received: Some(format!("{cleaned}")),
                                });
                                continue;
                            }
                        }
                        out.insert(f.name.clone(), cleaned);
                    }
                }
            }
        }

        if self.strict {
            for key in obj.keys() {
                if !self.fields.iter().any(|f| &f.name == key) {
                    violations.push(Violation {
                        path: join_path(prefix, key),
                        kind: ViolationKind::UnknownField,
                        expected: None,
                        received: None,
                    });
                }
            }
        }

        out
    }
}

fn check_value(
    ty: &FieldType,
    value: &Value,
    path: &str,
    violations: &mut Vec<Violation>,
) -> Option<Value> {
    let ok = match (ty, value) {
        (FieldType::Any, v) => !v.is_null(),
        (FieldType::String, Value::String(_)) => true,
        (FieldType::Boolean, Value::Bool(_)) => true,
        (FieldType::Number, Value::Number(_)) => true,
        (FieldType::Integer, Value::Number(n)) if n.is_i64() || n.is_u64() => true,
        (FieldType::Integer, Value::Number(n)) => {
            // `5.0` is stored as `5` so typed integer fields deserialize.
            match n.as_f64().filter(|f| f.fract() == 0.0 && f.abs() < i64::MAX as f64) {
                Some(f) => return Some(Value::from(f as i64)),
                None => false,
            }
        }
        (FieldType::Array(item), Value::Array(items)) => {
            let before = violations.len();
            let cleaned: Vec<Value> = items
                .iter()
                .enumerate()
                .filter_map(|(i, v)| check_value(item, v, &format!("{path}[{i}]"), violations))
                .collect();
            return (violations.len() == before).then_some(Value::Array(cleaned));
        }
        (FieldType::Object(schema), Value::Object(map)) => {
            let before = violations.len();
            let cleaned = schema.check_object(map, path, violations);
            return (violations.len() == before).then_some(Value::Object(cleaned));
        }
        _ => false,
    };

    if ok {
        Some(value.clone())
    } else {
        violations.push(Violation {
            path: path.to_string(),
            kind: ViolationKind::TypeMismatch,
            expected: Some(ty.type_name().into()),
            received: Some(json_type_name(value).into()),
        });
        None
    }
}

fn join_path(prefix: &str, name: &str) -> String {
    if prefix.is_empty() {
        name.to_string()
    } else {
        format!("{prefix}.{name}")
    }
}

fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(n) if n.is_i64() || n.is_u64() => "integer",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ViolationKind {
    Missing,
    TypeMismatch,
    UnknownField,
    NotAnObject,
    NotAllowed,
}

/// A single schema violation, addressed by dotted path (`filters.lang`, `urls[2]`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Violation {
    pub path: String,
    pub kind: ViolationKind,
    pub expected: Option<String>,
    pub received: Option<String>,
}

impl fmt::Display for Violation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let expected = self.expected.as_deref().unwrap_or("?");
        let received = self.received.as_deref().unwrap_or("?");
        match self.kind {
            ViolationKind::Missing => {
                write!(f, "missing required field '{}' (expected {expected})", self.path)
            }
            ViolationKind::TypeMismatch | ViolationKind::NotAllowed => write!(
                f,
                "field '{}': expected {expected}, received {received}",
                self.path
            ),
            ViolationKind::UnknownField => write!(f, "unexpected field '{}'", self.path),
            ViolationKind::NotAnObject => {
                write!(f, "arguments: expected {expected}, received {received}")
            }
        }
    }
}

/// Arguments rejected by an `InputSchema`. The message is written for the
/// model, so it can fix its arguments and call again.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    pub violations: Vec<Violation>,
}

impl ValidationError {
    /// True if any violation refers to the given field path.
    pub fn mentions(&self, path: &str) -> bool {
        self.violations.iter().any(|v| v.path == path)
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self.violations.iter().map(|v| v.to_string()).collect();
        write!(f, "{}", parts.join("; "))
    }
}

impl std::error::Error for ValidationError {}

/// Arguments that passed schema validation. Only `InputSchema::validate`
/// produces one, so a handler can never see raw model output.
#[derive(Debug, Clone, PartialEq)]
pub struct ValidatedInput {
    fields: Map<String, Value>,
}

impl ValidatedInput {
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.fields.get(name)
    }

    pub fn str(&self, name: &str) -> Option<&str> {
        self.fields.get(name).and_then(Value::as_str)
    }

    pub fn i64(&self, name: &str) -> Option<i64> {
        self.fields.get(name).and_then(Value::as_i64)
    }

    pub fn f64(&self, name: &str) -> Option<f64> {
        self.fields.get(name).and_then(Value::as_f64)
    }

    pub fn bool(&self, name: &str) -> Option<bool> {
        self.fields.get(name).and_then(Value::as_bool)
    }

    /// Deserialize into a typed input struct.
    pub fn deserialize<T: DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        serde_json::from_value(Value::Object(self.fields.clone()))
    }

    pub fn as_map(&self) -> &Map<String, Value> {
        &self.fields
    }

    pub fn into_value(self) -> Value {
        Value::Object(self.fields)
    }
}
