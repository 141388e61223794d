//! Host object model
//!
//! Everything the registry can hold is a [`HostObject`]. Arrays and objects are
//! shared references, so projecting a field out of an object and then mutating
//! it is visible through the parent, as it would be for a JavaScript value.
//!
//! Field projection is capability-checked per variant:
//!
//! | Variant         | Readable fields                          | Writable            |
//! |-----------------|------------------------------------------|---------------------|
//! | Object          | own keys                                 | any key             |
//! | Array           | `length`, decimal indices                | indices `0..=length`|
//! | String          | `length` (UTF-16 units)                  | no                  |
//! | Buffer          | `length`, `byteLength`, decimal indices  | no                  |
//! | Number, Bool    | none                                     | no                  |
//! | Undefined, Null | projection not supported                 | no                  |

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use indexmap::IndexMap;
use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

/// Integral numbers below this magnitude convert to JSON integers
const MAX_SAFE_INTEGER: f64 = 9_007_199_254_740_992.0;

/// Insertion-ordered property map of an object
pub type Properties = IndexMap<String, HostObject>;

/// Variant tag of a [`HostObject`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ObjectKind {
    Undefined,
    Null,
    Bool,
    Number,
    String,
    Buffer,
    Array,
    Object,
}

impl fmt::Display for ObjectKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ObjectKind::Undefined => "undefined",
            ObjectKind::Null => "null",
            ObjectKind::Bool => "bool",
            ObjectKind::Number => "number",
            ObjectKind::String => "string",
            ObjectKind::Buffer => "buffer",
            ObjectKind::Array => "array",
            ObjectKind::Object => "object",
        };
        f.write_str(name)
    }
}

/// A host string: a sequence of UTF-16 code units, not necessarily well formed
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct JsString(Vec<u16>);

impl JsString {
    /// Wrap raw code units
    pub fn from_units(units: Vec<u16>) -> Self {
        JsString(units)
    }

    pub fn units(&self) -> &[u16] {
        &self.0
    }

    /// Length in UTF-16 code units
    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Convert to a Rust string, replacing unpaired surrogates with U+FFFD
    pub fn to_string_lossy(&self) -> String {
        String::from_utf16_lossy(&self.0)
    }
}

impl From<&str> for JsString {
    fn from(s: &str) -> Self {
        JsString(s.encode_utf16().collect())
    }
}

/// An object owned by the host and referenced by the guest through a handle
#[derive(Debug, Clone, PartialEq)]
pub enum HostObject {
    Undefined,
    Null,
    Bool(bool),
    Number(f64),
    String(JsString),
    Buffer(Rc<[u8]>),
    Array(Rc<RefCell<Vec<HostObject>>>),
    Object(Rc<RefCell<Properties>>),
}

impl HostObject {
    pub fn string(s: &str) -> Self {
        HostObject::String(JsString::from(s))
    }

    pub fn buffer(bytes: impl Into<Vec<u8>>) -> Self {
        HostObject::Buffer(Rc::from(bytes.into()))
    }

    /// A new, empty object, like `{}`
    pub fn object() -> Self {
        HostObject::Object(Rc::new(RefCell::new(Properties::new())))
    }

    /// An object with the given properties, in order
    pub fn object_from<K: Into<String>>(props: impl IntoIterator<Item = (K, HostObject)>) -> Self {
        let props = props.into_iter().map(|(k, v)| (k.into(), v)).collect();
        HostObject::Object(Rc::new(RefCell::new(props)))
    }

    pub fn array(items: Vec<HostObject>) -> Self {
        HostObject::Array(Rc::new(RefCell::new(items)))
    }

    pub fn kind(&self) -> ObjectKind {
        match self {
            HostObject::Undefined => ObjectKind::Undefined,
            HostObject::Null => ObjectKind::Null,
            HostObject::Bool(_) => ObjectKind::Bool,
            HostObject::Number(_) => ObjectKind::Number,
            HostObject::String(_) => ObjectKind::String,
            HostObject::Buffer(_) => ObjectKind::Buffer,
            HostObject::Array(_) => ObjectKind::Array,
            HostObject::Object(_) => ObjectKind::Object,
        }
    }

    pub fn as_js_string(&self) -> Option<&JsString> {
        match self {
            HostObject::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            HostObject::Buffer(bytes) => Some(&bytes[..]),
            _ => None,
        }
    }

    /// Numeric view. Booleans count as 0 and 1.
    pub fn as_number(&self) -> Option<f64> {
        match self {
            HostObject::Number(n) => Some(*n),
            HostObject::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
            _ => None,
        }
    }

    /// Whether two values are the same shared array or object
    pub fn same_reference(&self, other: &HostObject) -> bool {
        match (self, other) {
            (HostObject::Array(a), HostObject::Array(b)) => Rc::ptr_eq(a, b),
            (HostObject::Object(a), HostObject::Object(b)) => Rc::ptr_eq(a, b),
            (HostObject::Buffer(a), HostObject::Buffer(b)) => Rc::ptr_eq(a, b),
            _ => false,
        }
    }

    /// Whether this variant supports field projection at all
    pub fn has_fields(&self) -> bool {
        !matches!(self, HostObject::Undefined | HostObject::Null)
    }

    /// Project the field `name`, or `None` if this value has no such field
    pub fn get_field(&self, name: &str) -> Option<HostObject> {
        match self {
            HostObject::Object(props) => props.borrow().get(name).cloned(),
            HostObject::Array(items) => {
                let items = items.borrow();
                if name == "length" {
                    return Some(HostObject::Number(items.len() as f64));
                }
                parse_index(name).and_then(|i| items.get(i).cloned())
            }
            HostObject::String(s) if name == "length" => Some(HostObject::Number(s.len() as f64)),
            HostObject::Buffer(bytes) => match name {
                "length" | "byteLength" => Some(HostObject::Number(bytes.len() as f64)),
                _ => parse_index(name)
                    .and_then(|i| bytes.get(i))
                    .map(|&b| HostObject::Number(f64::from(b))),
            },
            _ => None,
        }
    }

    /// Assign the field `name`
    ///
    /// Returns `false` when this variant (or this key, for arrays) cannot be
    /// assigned. Arrays accept existing indices and appending at `length`.
    pub fn set_field(&self, name: &str, value: HostObject) -> bool {
        match self {
            HostObject::Object(props) => {
                props.borrow_mut().insert(name.to_string(), value);
                true
            }
            HostObject::Array(items) => {
                let mut items = items.borrow_mut();
                match parse_index(name) {
                    Some(i) if i < items.len() => {
                        items[i] = value;
                        true
                    }
                    Some(i) if i == items.len() => {
                        items.push(value);
                        true
                    }
                    _ => false,
                }
            }
            _ => false,
        }
    }

    /// Convert to JSON. Undefined and non-finite numbers become `null`,
    /// buffers become base64 strings.
    pub fn to_json(&self) -> serde_json::Value {
        use serde_json::Value as Json;
        match self {
            HostObject::Undefined | HostObject::Null => Json::Null,
            HostObject::Bool(b) => Json::Bool(*b),
            HostObject::Number(n) if n.fract() == 0.0 && n.abs() < MAX_SAFE_INTEGER => {
                Json::from(*n as i64)
            }
            HostObject::Number(n) => serde_json::Number::from_f64(*n)
                .map(Json::Number)
                .unwrap_or(Json::Null),
            HostObject::String(s) => Json::String(s.to_string_lossy()),
            HostObject::Buffer(bytes) => Json::String(BASE64.encode(bytes)),
            HostObject::Array(items) => {
                Json::Array(items.borrow().iter().map(HostObject::to_json).collect())
            }
            HostObject::Object(props) => Json::Object(
                props
                    .borrow()
                    .iter()
                    .map(|(k, v)| (k.clone(), v.to_json()))
                    .collect(),
            ),
        }
    }
}

impl From<serde_json::Value> for HostObject {
    fn from(value: serde_json::Value) -> Self {
        use serde_json::Value as Json;
        match value {
            Json::Null => HostObject::Null,
            Json::Bool(b) => HostObject::Bool(b),
            Json::Number(n) => HostObject::Number(n.as_f64().unwrap_or(f64::NAN)),
            Json::String(s) => HostObject::string(&s),
            Json::Array(items) => {
                HostObject::array(items.into_iter().map(HostObject::from).collect())
            }
            Json::Object(props) => {
                HostObject::object_from(props.into_iter().map(|(k, v)| (k, HostObject::from(v))))
            }
        }
    }
}

/// Parse a canonical array index: decimal digits, no sign, no leading zeros
fn parse_index(name: &str) -> Option<usize> {
    let canonical = !name.is_empty()
        && name.bytes().all(|b| b.is_ascii_digit())
        && (name.len() == 1 || !name.starts_with('0'));
    if canonical {
        name.parse().ok()
    } else {
        None
    }
}
