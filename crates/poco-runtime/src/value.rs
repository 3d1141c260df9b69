// value.rs — Runtime values handed between the host program and the engine.
//
// The engine never inspects host objects beyond two questions: what type is
// this, and what is in this field. Hosts answer them by implementing
// `LiveObject`; the engine passes `ObjectHandle`s around unchanged so object
// identity survives promotion and result substitution.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// A live object owned by the host program.
pub trait LiveObject: fmt::Debug + Send + Sync {
    /// Fully qualified type name, used to retarget promoted object calls.
    fn type_name(&self) -> &str;

    /// Read a field. `None` when the field is absent or null.
    fn field(&self, name: &str) -> Option<Value>;
}

/// Shared handle to a host object.
pub type ObjectHandle = Arc<dyn LiveObject>;

/// A runtime-typed value.
#[derive(Debug, Clone)]
pub enum Value {
    Int(i32),
    Long(i64),
    Double(f64),
    Float(f32),
    Bool(bool),
    Char(char),
    Str(String),
    Object(ObjectHandle),
}

impl Value {
    pub fn as_object(&self) -> Option<&ObjectHandle> {
        match self {
            Value::Object(handle) => Some(handle),
            _ => None,
        }
    }

    /// The type tag used in `#Type{value}` literals.
    pub fn type_tag(&self) -> &str {
        match self {
            Value::Int(_) => "int",
            Value::Long(_) => "long",
            Value::Double(_) => "double",
            Value::Float(_) => "float",
            Value::Bool(_) => "boolean",
            Value::Char(_) => "char",
            Value::Str(_) => "String",
            Value::Object(handle) => handle.type_name(),
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Int(a), Value::Int(b)) => a == b,
            (Value::Long(a), Value::Long(b)) => a == b,
            (Value::Double(a), Value::Double(b)) => a == b,
            (Value::Float(a), Value::Float(b)) => a == b,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Char(a), Value::Char(b)) => a == b,
            (Value::Str(a), Value::Str(b)) => a == b,
            // Identity, not structure.
            (Value::Object(a), Value::Object(b)) => {
                Arc::as_ptr(a) as *const () == Arc::as_ptr(b) as *const ()
            }
            _ => false,
        }
    }
}

/// Renders the textual form used when a value is substituted into a pattern.
/// Objects render as their type name.
impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Int(v) => write!(f, "{}", v),
            Value::Long(v) => write!(f, "{}", v),
            Value::Double(v) => write_float(f, v.to_string()),
            Value::Float(v) => write_float(f, v.to_string()),
            Value::Bool(v) => write!(f, "{}", v),
            Value::Char(v) => write!(f, "{}", v),
            Value::Str(v) => write!(f, "{}", v),
            Value::Object(handle) => write!(f, "{}", handle.type_name()),
        }
    }
}

/// Whole floats keep a `.0` so they still read back as floating point.
fn write_float(f: &mut fmt::Formatter<'_>, text: String) -> fmt::Result {
    if text.bytes().all(|b| b.is_ascii_digit() || b == b'-') {
        write!(f, "{}.0", text)
    } else {
        f.write_str(&text)
    }
}

/// Types that `#Type{value}` literals construct from text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PrimitiveType {
    Int,
    Long,
    Double,
    Float,
    Boolean,
    Char,
    String,
}

impl PrimitiveType {
    /// Recognize a type tag. Both primitive and boxed spellings are accepted.
    pub fn from_tag(tag: &str) -> Option<Self> {
        let ty = match tag.trim() {
            "int" | "Integer" | "java.lang.Integer" => PrimitiveType::Int,
            "long" | "Long" | "java.lang.Long" => PrimitiveType::Long,
            "double" | "Double" | "java.lang.Double" => PrimitiveType::Double,
            "float" | "Float" | "java.lang.Float" => PrimitiveType::Float,
            "boolean" | "Boolean" | "java.lang.Boolean" => PrimitiveType::Boolean,
            "char" | "Character" | "java.lang.Character" => PrimitiveType::Char,
            "String" | "string" | "java.lang.String" => PrimitiveType::String,
            _ => return None,
        };
        Some(ty)
    }

    /// Construct a value from literal text. Numeric text that does not parse
    /// yields `None`; booleans are true only for a case-insensitive "true".
    pub fn parse_value(&self, text: &str) -> Option<Value> {
        let trimmed = text.trim();
        match self {
            PrimitiveType::Int => trimmed.parse().ok().map(Value::Int),
            PrimitiveType::Long => trimmed.parse().ok().map(Value::Long),
            PrimitiveType::Double => trimmed.parse().ok().map(Value::Double),
            PrimitiveType::Float => trimmed.parse().ok().map(Value::Float),
            PrimitiveType::Boolean => Some(Value::Bool(trimmed.eq_ignore_ascii_case("true"))),
            PrimitiveType::Char => text.chars().next().map(Value::Char),
            PrimitiveType::String => Some(Value::Str(text.to_string())),
        }
    }
}

/// A plain field map usable as a `LiveObject`.
///
/// Hosts that snapshot objects into the warehouse (rather than exposing
/// their own types) can register these directly.
#[derive(Debug, Clone, Default)]
pub struct Record {
    type_name: String,
    fields: HashMap<String, Value>,
}

impl Record {
    pub fn new(type_name: impl Into<String>) -> Self {
        Self {
            type_name: type_name.into(),
            fields: HashMap::new(),
        }
    }

    pub fn with_field(mut self, name: impl Into<String>, value: Value) -> Self {
        self.fields.insert(name.into(), value);
        self
    }

    pub fn into_handle(self) -> ObjectHandle {
        Arc::new(self)
    }
}

impl LiveObject for Record {
    fn type_name(&self) -> &str {
        &self.type_name
    }

    fn field(&self, name: &str) -> Option<Value> {
        self.fields.get(name).cloned()
    }
}
