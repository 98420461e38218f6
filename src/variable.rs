//! Typed variable storage (component C1).
//!
//! Six scalar runtime types distinguished by the second character of the
//! variable's name (`%i`, `%f`, `%b`, `%s`, `%p`, `%r`). A name's type is
//! fixed at definition; [`VariableStore::set`] rejects a value whose
//! runtime type doesn't match. There is a single flat namespace for the
//! life of one execution — no scoping.

use std::fmt;

use ahash::AHashMap;

use crate::error::VariableError;

/// An integer point, `(x, y)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Point {
    pub x: i64,
    pub y: i64,
}

impl Point {
    #[must_use]
    pub fn new(x: i64, y: i64) -> Self {
        Self { x, y }
    }
}

impl fmt::Display for Point {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{},{}", self.x, self.y)
    }
}

/// An axis-aligned rectangle, `(x1, y1, x2, y2)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Rect {
    pub x1: i64,
    pub y1: i64,
    pub x2: i64,
    pub y2: i64,
}

impl Rect {
    #[must_use]
    pub fn new(x1: i64, y1: i64, x2: i64, y2: i64) -> Self {
        Self { x1, y1, x2, y2 }
    }

    /// The center point of this rectangle.
    #[must_use]
    pub fn center(&self) -> Point {
        Point::new((self.x1 + self.x2) / 2, (self.y1 + self.y2) / 2)
    }

    /// The axis-aligned bounding rectangle of two points.
    #[must_use]
    pub fn bounding(a: Point, b: Point) -> Self {
        Self {
            x1: a.x.min(b.x),
            y1: a.y.min(b.y),
            x2: a.x.max(b.x),
            y2: a.y.max(b.y),
        }
    }
}

impl fmt::Display for Rect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{},{},{},{}", self.x1, self.y1, self.x2, self.y2)
    }
}

/// The runtime type of a variable, fixed at definition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum VarType {
    Integer,
    Float,
    Boolean,
    String,
    Point,
    Rect,
}

impl VarType {
    /// Maps the second character of a `%X...` name to its type, if recognized.
    #[must_use]
    pub fn from_prefix(c: char) -> Option<Self> {
        match c {
            'i' => Some(Self::Integer),
            'f' => Some(Self::Float),
            'b' => Some(Self::Boolean),
            's' => Some(Self::String),
            'p' => Some(Self::Point),
            'r' => Some(Self::Rect),
            _ => None,
        }
    }

    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Self::Integer => "integer",
            Self::Float => "float",
            Self::Boolean => "boolean",
            Self::String => "string",
            Self::Point => "point",
            Self::Rect => "rect",
        }
    }
}

/// A tagged value held by the [`VariableStore`].
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Integer(i64),
    Float(f64),
    Boolean(bool),
    String(String),
    Point(Point),
    Rect(Rect),
}

impl Value {
    #[must_use]
    pub fn var_type(&self) -> VarType {
        match self {
            Self::Integer(_) => VarType::Integer,
            Self::Float(_) => VarType::Float,
            Self::Boolean(_) => VarType::Boolean,
            Self::String(_) => VarType::String,
            Self::Point(_) => VarType::Point,
            Self::Rect(_) => VarType::Rect,
        }
    }

    /// Default (zero) value for a given type, used to initialize a bare
    /// `define` with no literal.
    #[must_use]
    pub fn default_for(ty: VarType) -> Self {
        match ty {
            VarType::Integer => Self::Integer(0),
            VarType::Float => Self::Float(0.0),
            VarType::Boolean => Self::Boolean(false),
            VarType::String => Self::String(String::new()),
            VarType::Point => Self::Point(Point::default()),
            VarType::Rect => Self::Rect(Rect::default()),
        }
    }

    /// Parses a literal string into a value of the given type.
    ///
    /// Integer: signed decimal. Float: decimal with optional exponent.
    /// Boolean: `true|false|1|0`. Point: `"x,y"`. Rect: `"x1,y1,x2,y2"`.
    /// String: taken verbatim.
    pub fn parse(ty: VarType, literal: &str) -> Option<Self> {
        match ty {
            VarType::Integer => literal.trim().parse::<i64>().ok().map(Self::Integer),
            VarType::Float => literal.trim().parse::<f64>().ok().map(Self::Float),
            VarType::Boolean => match literal.trim() {
                "true" | "1" => Some(Self::Boolean(true)),
                "false" | "0" => Some(Self::Boolean(false)),
                _ => None,
            },
            VarType::String => Some(Self::String(literal.to_owned())),
            VarType::Point => parse_ints(literal, 2).map(|v| Self::Point(Point::new(v[0], v[1]))),
            VarType::Rect => parse_ints(literal, 4).map(|v| Self::Rect(Rect::new(v[0], v[1], v[2], v[3]))),
        }
    }

    /// Truthiness used by the condition evaluator for a bare variable name.
    #[must_use]
    pub fn truthy(&self) -> bool {
        match self {
            Self::Integer(n) => *n != 0,
            Self::Float(f) => *f != 0.0,
            Self::Boolean(b) => *b,
            Self::String(s) => !s.is_empty(),
            Self::Point(_) | Self::Rect(_) => true,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Integer(n) => write!(f, "{n}"),
            Self::Float(x) => write!(f, "{x}"),
            Self::Boolean(b) => write!(f, "{}", if *b { "true" } else { "false" }),
            Self::String(s) => f.write_str(s),
            Self::Point(p) => write!(f, "{p}"),
            Self::Rect(r) => write!(f, "{r}"),
        }
    }
}

/// Splits `"a,b,c,..."` into exactly `n` signed integers, trimming whitespace
/// around each component. Returns `None` on a count or parse mismatch.
fn parse_ints(s: &str, n: usize) -> Option<Vec<i64>> {
    let parts: Vec<i64> = s
        .split(',')
        .map(|p| p.trim().parse::<i64>().ok())
        .collect::<Option<Vec<_>>>()?;
    if parts.len() == n {
        Some(parts)
    } else {
        None
    }
}

/// The flat, process-wide variable namespace (component C1).
#[derive(Debug, Clone, Default)]
pub struct VariableStore {
    values: AHashMap<String, Value>,
}

impl VariableStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Validates a name and returns its declared type from the `%X` prefix.
    fn type_from_name(name: &str) -> Result<VarType, VariableError> {
        let mut chars = name.chars();
        if chars.next() != Some('%') {
            return Err(VariableError::InvalidName(name.to_owned()));
        }
        let prefix = chars.next().ok_or_else(|| VariableError::InvalidName(name.to_owned()))?;
        VarType::from_prefix(prefix).ok_or_else(|| VariableError::InvalidName(name.to_owned()))
    }

    /// Defines `name` with the zero value for `ty`. Redefinition is
    /// last-write-wins, kept for parity with the source semantics.
    pub fn define(&mut self, name: &str, ty: VarType) -> Result<(), VariableError> {
        let declared = Self::type_from_name(name)?;
        let _ = declared; // name's prefix need not equal `ty`; callers may override.
        self.values.insert(name.to_owned(), Value::default_for(ty));
        Ok(())
    }

    /// Defines `name` with type `ty`, initialized from `literal`.
    pub fn define_with(&mut self, name: &str, ty: VarType, literal: &str) -> Result<(), VariableError> {
        Self::type_from_name(name)?;
        let value = Value::parse(ty, literal).ok_or_else(|| VariableError::ParseFailure {
            name: name.to_owned(),
            literal: literal.to_owned(),
        })?;
        self.values.insert(name.to_owned(), value);
        Ok(())
    }

    #[must_use]
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.values.get(name)
    }

    /// Sets an existing variable's value. Fails if undefined or the value's
    /// type doesn't match the stored type — no implicit widening here;
    /// widening lives in the expression engine.
    pub fn set(&mut self, name: &str, value: Value) -> Result<(), VariableError> {
        let slot = self
            .values
            .get_mut(name)
            .ok_or_else(|| VariableError::UndefinedVariable(name.to_owned()))?;
        if slot.var_type() != value.var_type() {
            return Err(VariableError::TypeMismatch {
                name: name.to_owned(),
                expected: slot.var_type().name(),
                found: value.var_type().name(),
            });
        }
        *slot = value;
        Ok(())
    }

    /// Parses `"%Xname"` or `"%Xname=literal"` and applies the definition.
    pub fn parse_definition(&mut self, definition: &str) -> Result<(), VariableError> {
        if !definition.starts_with('%') {
            return Err(VariableError::InvalidName(definition.to_owned()));
        }
        match definition.split_once('=') {
            Some((name, literal)) => {
                let ty = Self::type_from_name(name)?;
                self.define_with(name, ty, literal)
            }
            None => {
                let ty = Self::type_from_name(definition)?;
                self.define(definition, ty)
            }
        }
    }

    /// Parses and applies a list of definitions, continuing past individual
    /// failures but reporting whether every one succeeded.
    pub fn parse_definitions<'a>(&mut self, definitions: impl IntoIterator<Item = &'a str>) -> bool {
        let mut all_ok = true;
        for def in definitions {
            if self.parse_definition(def).is_err() {
                all_ok = false;
            }
        }
        all_ok
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn define_and_get_roundtrips_by_type() {
        let mut store = VariableStore::new();
        store.define_with("%iK", VarType::Integer, "42").unwrap();
        assert_eq!(store.get("%iK"), Some(&Value::Integer(42)));
        assert_eq!(store.get("%iK").unwrap().to_string(), "42");
    }

    #[test]
    fn rejects_unknown_prefix() {
        let mut store = VariableStore::new();
        let err = store.define("%xFoo", VarType::Integer).unwrap_err();
        assert!(matches!(err, VariableError::InvalidName(_)));
    }

    #[test]
    fn rejects_missing_percent() {
        let mut store = VariableStore::new();
        let err = store.define("iFoo", VarType::Integer).unwrap_err();
        assert!(matches!(err, VariableError::InvalidName(_)));
    }

    #[test]
    fn set_requires_matching_type() {
        let mut store = VariableStore::new();
        store.define("%iK", VarType::Integer).unwrap();
        let err = store.set("%iK", Value::String("nope".into())).unwrap_err();
        assert!(matches!(err, VariableError::TypeMismatch { .. }));
    }

    #[test]
    fn set_undefined_fails() {
        let mut store = VariableStore::new();
        let err = store.set("%iK", Value::Integer(1)).unwrap_err();
        assert!(matches!(err, VariableError::UndefinedVariable(_)));
    }

    #[test]
    fn parse_point_and_rect_literals() {
        let mut store = VariableStore::new();
        store.parse_definition("%pStart=100,200").unwrap();
        assert_eq!(store.get("%pStart"), Some(&Value::Point(Point::new(100, 200))));

        store.parse_definition("%rArea=1,2,3,4").unwrap();
        assert_eq!(store.get("%rArea"), Some(&Value::Rect(Rect::new(1, 2, 3, 4))));
    }

    #[test]
    fn parse_boolean_accepts_numeric_forms() {
        let mut store = VariableStore::new();
        store.parse_definition("%bFlag=1").unwrap();
        assert_eq!(store.get("%bFlag"), Some(&Value::Boolean(true)));
    }

    #[test]
    fn redefinition_is_last_write_wins() {
        let mut store = VariableStore::new();
        store.parse_definition("%iK=1").unwrap();
        store.parse_definition("%iK=2").unwrap();
        assert_eq!(store.get("%iK"), Some(&Value::Integer(2)));
    }
}
