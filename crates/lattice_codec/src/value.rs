//! Dynamic value and attribute type model.

use std::collections::BTreeMap;
use std::fmt;

/// Element type of a homogeneous array attribute.
///
/// Arrays of arrays are not representable; the closed set below is the
/// complete element universe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ElementType {
    /// UTF-8 string elements.
    Str,
    /// Signed 64-bit integer elements.
    Int,
    /// IEEE-754 double elements.
    Float,
    /// Boolean elements.
    Bool,
    /// Structured map elements.
    Dict,
}

impl From<ElementType> for AttributeType {
    /// The scalar attribute type of a single element.
    fn from(elem: ElementType) -> Self {
        match elem {
            ElementType::Str => AttributeType::Str,
            ElementType::Int => AttributeType::Int,
            ElementType::Float => AttributeType::Float,
            ElementType::Bool => AttributeType::Bool,
            ElementType::Dict => AttributeType::Dict,
        }
    }
}

impl fmt::Display for ElementType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ElementType::Str => "str",
            ElementType::Int => "int",
            ElementType::Float => "float",
            ElementType::Bool => "bool",
            ElementType::Dict => "dict",
        };
        f.write_str(name)
    }
}

/// Declared type of a collection attribute.
///
/// This is a fixed, closed set: scalars, structured maps, and homogeneous
/// arrays of either.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AttributeType {
    /// UTF-8 string.
    Str,
    /// Signed 64-bit integer.
    Int,
    /// IEEE-754 double.
    Float,
    /// Boolean.
    Bool,
    /// Structured map with string keys.
    Dict,
    /// Homogeneous array of the given element type.
    Array(ElementType),
}

impl AttributeType {
    /// Parses a schema type string: `"str"`, `"int"`, `"float"`, `"bool"`,
    /// `"dict"`, or any of those suffixed with `[]` for an array.
    ///
    /// Returns `None` for anything else.
    #[must_use]
    pub fn parse(spec: &str) -> Option<Self> {
        if let Some(elem) = spec.strip_suffix("[]") {
            return Self::parse_element(elem).map(AttributeType::Array);
        }
        match spec {
            "str" => Some(AttributeType::Str),
            "int" => Some(AttributeType::Int),
            "float" => Some(AttributeType::Float),
            "bool" => Some(AttributeType::Bool),
            "dict" => Some(AttributeType::Dict),
            _ => None,
        }
    }

    fn parse_element(spec: &str) -> Option<ElementType> {
        match spec {
            "str" => Some(ElementType::Str),
            "int" => Some(ElementType::Int),
            "float" => Some(ElementType::Float),
            "bool" => Some(ElementType::Bool),
            "dict" => Some(ElementType::Dict),
            _ => None,
        }
    }

    /// Returns true for array-typed attributes.
    #[must_use]
    pub const fn is_array(self) -> bool {
        matches!(self, AttributeType::Array(_))
    }

    /// Returns the element type of an array attribute, or `None` for scalars.
    #[must_use]
    pub const fn element(self) -> Option<ElementType> {
        match self {
            AttributeType::Array(elem) => Some(elem),
            _ => None,
        }
    }

    /// Returns the scalar equivalent of this type: itself for scalars, the
    /// element type widened for arrays.
    #[must_use]
    pub const fn scalar(self) -> AttributeType {
        match self {
            AttributeType::Array(ElementType::Str) => AttributeType::Str,
            AttributeType::Array(ElementType::Int) => AttributeType::Int,
            AttributeType::Array(ElementType::Float) => AttributeType::Float,
            AttributeType::Array(ElementType::Bool) => AttributeType::Bool,
            AttributeType::Array(ElementType::Dict) => AttributeType::Dict,
            other => other,
        }
    }
}

impl fmt::Display for AttributeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AttributeType::Str => f.write_str("str"),
            AttributeType::Int => f.write_str("int"),
            AttributeType::Float => f.write_str("float"),
            AttributeType::Bool => f.write_str("bool"),
            AttributeType::Dict => f.write_str("dict"),
            AttributeType::Array(elem) => write!(f, "{elem}[]"),
        }
    }
}

/// A dynamic attribute value.
///
/// Every value stored in or queried from a collection is one of these
/// variants; all kind-dependent behavior in the engine is a `match` on this
/// enum.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// UTF-8 string.
    Str(String),
    /// Signed 64-bit integer.
    Int(i64),
    /// IEEE-754 double.
    Float(f64),
    /// Boolean.
    Bool(bool),
    /// Structured map with string keys.
    Dict(BTreeMap<String, Value>),
    /// Array of values.
    Array(Vec<Value>),
}

impl Value {
    /// Get this value as a string slice, if it is one.
    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s),
            _ => None,
        }
    }

    /// Get this value as an integer, if it is one.
    #[must_use]
    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(n) => Some(*n),
            _ => None,
        }
    }

    /// Get this value as a float, if it is one.
    #[must_use]
    pub fn as_float(&self) -> Option<f64> {
        match self {
            Value::Float(x) => Some(*x),
            _ => None,
        }
    }

    /// Get this value as a boolean, if it is one.
    #[must_use]
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// Get this value as a map, if it is one.
    #[must_use]
    pub fn as_dict(&self) -> Option<&BTreeMap<String, Value>> {
        match self {
            Value::Dict(map) => Some(map),
            _ => None,
        }
    }

    /// Get this value as an array slice, if it is one.
    #[must_use]
    pub fn as_array(&self) -> Option<&[Value]> {
        match self {
            Value::Array(items) => Some(items),
            _ => None,
        }
    }

    /// Short name of this value's kind, for diagnostics.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Value::Str(_) => "str",
            Value::Int(_) => "int",
            Value::Float(_) => "float",
            Value::Bool(_) => "bool",
            Value::Dict(_) => "dict",
            Value::Array(_) => "array",
        }
    }

    /// Checks whether this value conforms to the declared attribute type.
    ///
    /// Arrays must be homogeneous: every element must match the declared
    /// element type.
    #[must_use]
    pub fn matches(&self, ty: AttributeType) -> bool {
        match (self, ty) {
            (Value::Str(_), AttributeType::Str)
            | (Value::Int(_), AttributeType::Int)
            | (Value::Float(_), AttributeType::Float)
            | (Value::Bool(_), AttributeType::Bool)
            | (Value::Dict(_), AttributeType::Dict) => true,
            (Value::Array(items), AttributeType::Array(elem)) => {
                items.iter().all(|item| item.matches_element(elem))
            }
            _ => false,
        }
    }

    fn matches_element(&self, elem: ElementType) -> bool {
        matches!(
            (self, elem),
            (Value::Str(_), ElementType::Str)
                | (Value::Int(_), ElementType::Int)
                | (Value::Float(_), ElementType::Float)
                | (Value::Bool(_), ElementType::Bool)
                | (Value::Dict(_), ElementType::Dict)
        )
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Str(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Str(s)
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Value::Int(n)
    }
}

impl From<i32> for Value {
    fn from(n: i32) -> Self {
        Value::Int(i64::from(n))
    }
}

impl From<f64> for Value {
    fn from(x: f64) -> Self {
        Value::Float(x)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<BTreeMap<String, Value>> for Value {
    fn from(map: BTreeMap<String, Value>) -> Self {
        Value::Dict(map)
    }
}

impl<T: Into<Value>> From<Vec<T>> for Value {
    fn from(items: Vec<T>) -> Self {
        Value::Array(items.into_iter().map(Into::into).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_scalar_types() {
        assert_eq!(AttributeType::parse("str"), Some(AttributeType::Str));
        assert_eq!(AttributeType::parse("int"), Some(AttributeType::Int));
        assert_eq!(AttributeType::parse("float"), Some(AttributeType::Float));
        assert_eq!(AttributeType::parse("bool"), Some(AttributeType::Bool));
        assert_eq!(AttributeType::parse("dict"), Some(AttributeType::Dict));
        assert_eq!(AttributeType::parse("decimal"), None);
    }

    #[test]
    fn parse_array_types() {
        assert_eq!(
            AttributeType::parse("str[]"),
            Some(AttributeType::Array(ElementType::Str))
        );
        assert_eq!(
            AttributeType::parse("dict[]"),
            Some(AttributeType::Array(ElementType::Dict))
        );
        assert_eq!(AttributeType::parse("[]"), None);
        assert_eq!(AttributeType::parse("str[][]"), None);
    }

    #[test]
    fn display_roundtrips_through_parse() {
        for ty in [
            AttributeType::Str,
            AttributeType::Int,
            AttributeType::Float,
            AttributeType::Bool,
            AttributeType::Dict,
            AttributeType::Array(ElementType::Int),
            AttributeType::Array(ElementType::Dict),
        ] {
            assert_eq!(AttributeType::parse(&ty.to_string()), Some(ty));
        }
    }

    #[test]
    fn scalar_matches() {
        assert!(Value::Str("x".into()).matches(AttributeType::Str));
        assert!(Value::Int(1).matches(AttributeType::Int));
        assert!(!Value::Int(1).matches(AttributeType::Float));
        assert!(!Value::Str("1".into()).matches(AttributeType::Int));
    }

    #[test]
    fn array_matches_requires_homogeneity() {
        let tags = Value::from(vec!["a", "b"]);
        assert!(tags.matches(AttributeType::Array(ElementType::Str)));
        assert!(!tags.matches(AttributeType::Array(ElementType::Int)));

        let mixed = Value::Array(vec![Value::Int(1), Value::Str("x".into())]);
        assert!(!mixed.matches(AttributeType::Array(ElementType::Int)));

        let empty = Value::Array(vec![]);
        assert!(empty.matches(AttributeType::Array(ElementType::Int)));
    }

    #[test]
    fn accessors() {
        assert_eq!(Value::Str("hi".into()).as_str(), Some("hi"));
        assert_eq!(Value::Int(7).as_int(), Some(7));
        assert_eq!(Value::Int(7).as_str(), None);
        assert_eq!(Value::Bool(true).as_bool(), Some(true));
        assert_eq!(Value::Float(1.5).as_float(), Some(1.5));
    }
}
