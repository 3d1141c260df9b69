// warehouse.rs — The variable warehouse: program state observed by the
// instrumentation layer and consumed by the decision engine.
//
// Two tables:
//   values   name    -> (type tag, value)   bound variables
//   objects  address -> ObjectHandle        live objects by address token
//
// Writes come only from the instrumentation layer and entries are never
// removed. The engine only reads, apart from applying its configured
// substitution bound. Both tables sit behind `RwLock`s so many readers can
// proceed while a single writer inserts.
//
// Resolution here is best-effort: a string value carrying `$name`
// placeholders is expanded as far as the bindings allow. Unbound names,
// self-references and references nested past the bound are left literal.
// Pattern compilation is the strict counterpart (see
// `poco_sre::pattern::substitute`).

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{PoisonError, RwLock};

use poco_sre::pattern::{self, VarResolver};
use poco_sre::signature::split_object_path;
use poco_sre::{ObjectRef, TypedLiteral, DEFAULT_MAX_SUBSTITUTION_DEPTH};

use crate::value::{ObjectHandle, PrimitiveType, Value};

/// A bound variable.
#[derive(Debug, Clone, PartialEq)]
pub struct Binding {
    pub type_tag: String,
    pub value: Value,
}

/// Shared store of bound variables and live objects.
#[derive(Debug)]
pub struct Warehouse {
    values: RwLock<HashMap<String, Binding>>,
    objects: RwLock<HashMap<String, ObjectHandle>>,
    max_depth: AtomicUsize,
}

impl Default for Warehouse {
    fn default() -> Self {
        Self::new()
    }
}

impl Warehouse {
    pub fn new() -> Self {
        Self::with_max_depth(DEFAULT_MAX_SUBSTITUTION_DEPTH)
    }

    /// Bound how deeply references nest during closure substitution.
    pub fn with_max_depth(max_depth: usize) -> Self {
        Self {
            values: RwLock::new(HashMap::new()),
            objects: RwLock::new(HashMap::new()),
            max_depth: AtomicUsize::new(max_depth),
        }
    }

    pub fn max_depth(&self) -> usize {
        self.max_depth.load(Ordering::Relaxed)
    }

    /// Change the nesting bound. Engines apply their configured bound here.
    pub fn set_max_depth(&self, max_depth: usize) {
        self.max_depth.store(max_depth, Ordering::Relaxed);
    }

    // ── Write interface ──

    /// Bind (or rebind) a variable.
    pub fn bind(&self, name: impl Into<String>, type_tag: impl Into<String>, value: Value) {
        let name = name.into();
        let type_tag = type_tag.into();
        tracing::debug!(%name, %type_tag, "binding variable");
        self.values
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(name, Binding { type_tag, value });
    }

    /// Register a live object under its address token.
    pub fn register_object(&self, address: impl Into<String>, handle: ObjectHandle) {
        let address = address.into();
        tracing::debug!(%address, type_name = handle.type_name(), "registering object");
        self.objects
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(address, handle);
    }

    // ── Read interface ──

    pub fn binding(&self, name: &str) -> Option<Binding> {
        self.values
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(name)
            .cloned()
    }

    pub fn object(&self, address: &str) -> Option<ObjectHandle> {
        self.objects
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(address)
            .cloned()
    }

    /// Look up a variable. String values have their `$name` placeholders
    /// expanded (best effort) before being returned; a reference back to
    /// `name` itself stays literal.
    pub fn resolve(&self, name: &str) -> Option<Value> {
        match self.binding(name)?.value {
            Value::Str(text) => Some(Value::Str(pattern::expand_value(
                name,
                &text,
                self,
                self.max_depth(),
            ))),
            other => Some(other),
        }
    }

    /// Expand `$name` placeholders as far as the bindings allow. Unbound,
    /// cyclic and too-deep references stay literal.
    pub fn expand(&self, text: &str) -> String {
        pattern::expand_best_effort(text, self, self.max_depth())
    }

    /// Walk `fields` starting from the object at `address`. Stops with
    /// `None` at the first absent intermediate.
    pub fn resolve_path(&self, address: &str, fields: &[String]) -> Option<Value> {
        let mut current = Value::Object(self.object(address)?);
        for field in fields {
            let next = current.as_object()?.field(field);
            match next {
                Some(value) => current = value,
                None => {
                    tracing::debug!(address, field = %field, "field path stopped at absent value");
                    return None;
                }
            }
        }
        Some(current)
    }

    /// The object a promoted object call should be invoked on, or `None` when
    /// the address is stale or the field path does not end at an object.
    pub fn call_target(&self, object: &ObjectRef) -> Option<ObjectHandle> {
        match self.resolve_path(&object.address, &object.fields)? {
            Value::Object(handle) => Some(handle),
            _ => None,
        }
    }

    /// Produce the runtime value of a `#Type{value}` literal.
    ///
    /// Primitive and string types are parsed from the (expanded) text.
    /// Any other type names a live object: by `$variable`, by address, or by
    /// an `address.field...` path.
    pub fn literal_value(&self, literal: &TypedLiteral) -> Option<Value> {
        let text = literal.value.as_str();
        if let Some(ty) = PrimitiveType::from_tag(&literal.type_tag) {
            let expanded = self.expand(text);
            let value = ty.parse_value(&expanded);
            if value.is_none() {
                tracing::warn!(literal = %literal, "literal text does not parse as its type");
            }
            return value;
        }
        if let Some(name) = variable_name(text) {
            return self.resolve(name);
        }
        if let Some(handle) = self.object(text) {
            return Some(Value::Object(handle));
        }
        let (address, fields) = split_object_path(text)?;
        self.resolve_path(&address, &fields)
    }

    /// Materialize one argument descriptor: `#Type{value}` or `$name`.
    pub fn materialize_arg(&self, descriptor: &str) -> Option<Value> {
        let descriptor = descriptor.trim();
        if let Some(literal) = TypedLiteral::parse(descriptor) {
            return self.literal_value(&literal);
        }
        if let Some(name) = variable_name(descriptor) {
            return self.resolve(name);
        }
        tracing::debug!(descriptor, "argument descriptor carries no value");
        None
    }

    /// Materialize an argument list in order. Descriptors that produce no
    /// value stay in place as `None` so positions line up with the signature.
    pub fn materialize(&self, descriptors: &[String]) -> Vec<Option<Value>> {
        descriptors
            .iter()
            .map(|d| self.materialize_arg(d))
            .collect()
    }
}

/// Variables render as text for pattern substitution. Objects render as
/// their type tag, so `$obj.close()` expands to `pkg.Type.close()`.
impl VarResolver for Warehouse {
    fn lookup(&self, name: &str) -> Option<String> {
        let binding = self.binding(name)?;
        let text = match binding.value {
            Value::Object(_) => binding.type_tag,
            other => other.to_string(),
        };
        Some(text)
    }
}

/// `$name` with nothing after the identifier.
fn variable_name(text: &str) -> Option<&str> {
    let name = text.strip_prefix('$')?;
    let valid = !name.is_empty() && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_');
    valid.then_some(name)
}
