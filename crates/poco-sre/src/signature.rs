// signature.rs — The call-signature grammar.
//
// Every string the engine reasons about is one of two shapes:
//
//   action:  dotted.name(arg, arg, ...)      e.g. `pkg.Foo.bar(int,String)`
//   result:  #Type{value}                    e.g. `#int{42}`
//
// Signatures are parsed once into a structured record and reused, instead of
// re-slicing strings on delimiters at every step of the decision protocol.
//
// Two refinements live inside the dotted name:
// - a final `new` segment marks a constructor (`pkg.Foo.new(int)`);
// - a segment containing `@` is a live-object address (`pkg.Foo@1b6d3586`).
//   The address is everything up to and including that segment, the segments
//   between it and the last one are a field path, and the last segment is
//   the method invoked on the object (or on the field reached).

use std::fmt;

use crate::error::SreError;

/// The syntactic kind of a signature or pattern.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Shape {
    /// `name(args)`: a method or constructor call.
    Action,
    /// `#Type{value}`: a typed result literal.
    Result,
}

impl Shape {
    /// Classify a string. Result literals always start with `#`.
    pub fn of(text: &str) -> Shape {
        if text.trim_start().starts_with('#') {
            Shape::Result
        } else {
            Shape::Action
        }
    }
}

/// A parsed action signature.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Signature {
    /// Dotted call name, without return type or modifiers.
    pub name: String,
    /// Argument descriptors, trimmed, in call order.
    pub args: Vec<String>,
    /// Whether the call constructs a new object (`.new` suffix).
    pub is_constructor: bool,
    /// Present when the name embeds a live-object address.
    pub object: Option<ObjectRef>,
}

/// The object-call part of a signature: `address[.field]*.method`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectRef {
    /// Opaque address token, as registered in the variable warehouse.
    pub address: String,
    /// Field accesses applied to the addressed object before the call.
    pub fields: Vec<String>,
    /// Method invoked on the final object.
    pub method: String,
}

/// A `#Type{value}` literal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TypedLiteral {
    pub type_tag: String,
    pub value: String,
}

impl Signature {
    /// Parse an action signature.
    ///
    /// A leading return type or modifiers (`void pkg.Foo.bar()`) is dropped:
    /// only the last whitespace-separated token before `(` is the name.
    pub fn parse(text: &str) -> Result<Self, SreError> {
        let trimmed = text.trim();
        let open = trimmed
            .find('(')
            .ok_or_else(|| SreError::malformed(text, "expected 'name(args)'"))?;
        if !trimmed.ends_with(')') {
            return Err(SreError::malformed(text, "expected closing ')'"));
        }

        let name = trimmed[..open]
            .split_whitespace()
            .last()
            .unwrap_or_default()
            .to_string();
        if name.is_empty() {
            return Err(SreError::malformed(text, "empty call name"));
        }
        if name.split('.').any(str::is_empty) {
            return Err(SreError::malformed(text, "empty segment in call name"));
        }
        if name.contains([')', '{', '}']) {
            return Err(SreError::malformed(text, "delimiter in call name"));
        }

        let inner = &trimmed[open + 1..trimmed.len() - 1];
        check_balanced(text, inner)?;
        let args = split_top_level(inner);

        let is_constructor = name.rsplit('.').next() == Some("new");
        let object = object_ref(&name);

        Ok(Self {
            name,
            args,
            is_constructor,
            object,
        })
    }

    /// The last segment of the call name.
    pub fn method_name(&self) -> &str {
        self.name.rsplit('.').next().unwrap_or(&self.name)
    }

    /// Arguments joined back into the `a,b,c` form used inside parentheses.
    pub fn arg_list(&self) -> String {
        self.args.join(",")
    }

    /// Rewrite an object call against the concrete type of the resolved
    /// object: `<type_name>.<method>(args)`.
    pub fn retarget(&self, type_name: &str) -> String {
        let method = match &self.object {
            Some(obj) => obj.method.as_str(),
            None => self.method_name(),
        };
        format!("{}.{}({})", type_name, method, self.arg_list())
    }
}

/// The normal form of an action signature: return type and modifiers
/// dropped, arguments trimmed and joined with `,`. Patterns and intercepted
/// signatures both pass through here so they compare character for
/// character. Text that is not a well-formed action comes back trimmed.
pub fn canonical_action(text: &str) -> String {
    match Signature::parse(text) {
        Ok(signature) => signature.to_string(),
        Err(_) => text.trim().to_string(),
    }
}

impl fmt::Display for Signature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}({})", self.name, self.arg_list())
    }
}

impl TypedLiteral {
    /// Parse `#Type{value}`. Returns `None` for anything else. The value is
    /// kept exactly as written between the braces.
    pub fn parse(text: &str) -> Option<Self> {
        let body = text.trim().strip_prefix('#')?;
        let open = body.find('{')?;
        let value = body[open + 1..].strip_suffix('}')?;
        let type_tag = body[..open].trim();
        if type_tag.is_empty() {
            return None;
        }
        Some(Self {
            type_tag: type_tag.to_string(),
            value: value.to_string(),
        })
    }
}

impl fmt::Display for TypedLiteral {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}{{{}}}", self.type_tag, self.value)
    }
}

/// Split `addr.field1.field2` into the address and its field path.
///
/// The address ends at the first segment containing `@`; returns `None`
/// when no segment carries an address token.
pub fn split_object_path(text: &str) -> Option<(String, Vec<String>)> {
    let segments: Vec<&str> = text.trim().split('.').collect();
    let at = segments.iter().position(|s| s.contains('@'))?;
    let address = segments[..=at].join(".");
    let fields = segments[at + 1..].iter().map(|s| s.to_string()).collect();
    Some((address, fields))
}

/// Split an argument list on commas that are not nested inside `(...)` or
/// `{...}`. An all-whitespace list yields no arguments.
pub fn split_top_level(inner: &str) -> Vec<String> {
    if inner.trim().is_empty() {
        return Vec::new();
    }
    let mut args = Vec::new();
    let mut depth = 0usize;
    let mut current = String::new();
    for c in inner.chars() {
        match c {
            '(' | '{' => {
                depth += 1;
                current.push(c);
            }
            ')' | '}' => {
                depth = depth.saturating_sub(1);
                current.push(c);
            }
            ',' if depth == 0 => {
                args.push(current.trim().to_string());
                current.clear();
            }
            _ => current.push(c),
        }
    }
    args.push(current.trim().to_string());
    args
}

fn object_ref(name: &str) -> Option<ObjectRef> {
    let (address, mut rest) = split_object_path(name)?;
    // An address with nothing after it is a value, not a call target.
    let method = rest.pop()?;
    Some(ObjectRef {
        address,
        fields: rest,
        method,
    })
}

fn check_balanced(text: &str, inner: &str) -> Result<(), SreError> {
    let mut stack = Vec::new();
    for c in inner.chars() {
        match c {
            '(' | '{' => stack.push(c),
            ')' if stack.pop() != Some('(') => {
                return Err(SreError::malformed(text, "unbalanced ')'"));
            }
            '}' if stack.pop() != Some('{') => {
                return Err(SreError::malformed(text, "unbalanced '}'"));
            }
            _ => {}
        }
    }
    if stack.is_empty() {
        Ok(())
    } else {
        Err(SreError::malformed(text, "unclosed delimiter in arguments"))
    }
}
