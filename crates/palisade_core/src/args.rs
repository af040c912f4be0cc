//! Dynamic hook argument values and typed hook signatures.
//!
//! Hook callers pass a stable "superset" argument list; individual handlers
//! declare only the parameters they need. [`HookSignature::reconcile`] is
//! the pure function that maps one onto the other: extra supplied arguments
//! are truncated, missing trailing arguments are padded from the declared
//! default, the zero value for value kinds, or null.

use std::fmt;
use std::sync::Arc;

use serde_json::Value;

use crate::error::HookError;
use crate::players::Player;

/// A dynamically typed value flowing through hook calls.
///
/// Equality is deliberately shallow: primitives compare by value, while
/// structured data and player handles compare by pointer identity. Hook
/// conflict detection relies on this: two plugins returning
/// equal-but-distinct structured values are still reported as a conflict.
#[derive(Clone)]
pub enum HookValue {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
    /// A positional string array, as produced by command tokenization.
    Strings(Vec<String>),
    /// Structured JSON data. Compared by allocation, not content.
    Data(Arc<Value>),
    /// A live player handle. Compared by allocation.
    Player(Arc<dyn Player>),
}

impl HookValue {
    pub fn is_null(&self) -> bool {
        matches!(self, HookValue::Null)
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            HookValue::Bool(value) => Some(*value),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            HookValue::Int(value) => Some(*value),
            _ => None,
        }
    }

    pub fn as_float(&self) -> Option<f64> {
        match self {
            HookValue::Float(value) => Some(*value),
            HookValue::Int(value) => Some(*value as f64),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            HookValue::Text(value) => Some(value),
            _ => None,
        }
    }

    pub fn as_strings(&self) -> Option<&[String]> {
        match self {
            HookValue::Strings(value) => Some(value),
            _ => None,
        }
    }

    pub fn as_data(&self) -> Option<&Arc<Value>> {
        match self {
            HookValue::Data(value) => Some(value),
            _ => None,
        }
    }

    pub fn as_player(&self) -> Option<&Arc<dyn Player>> {
        match self {
            HookValue::Player(value) => Some(value),
            _ => None,
        }
    }
}

impl PartialEq for HookValue {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (HookValue::Null, HookValue::Null) => true,
            (HookValue::Bool(a), HookValue::Bool(b)) => a == b,
            (HookValue::Int(a), HookValue::Int(b)) => a == b,
            (HookValue::Float(a), HookValue::Float(b)) => a == b,
            (HookValue::Text(a), HookValue::Text(b)) => a == b,
            (HookValue::Strings(a), HookValue::Strings(b)) => a == b,
            (HookValue::Data(a), HookValue::Data(b)) => Arc::ptr_eq(a, b),
            (HookValue::Player(a), HookValue::Player(b)) => Arc::ptr_eq(a, b),
            _ => false,
        }
    }
}

impl fmt::Debug for HookValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HookValue::Null => write!(f, "Null"),
            HookValue::Bool(value) => write!(f, "Bool({value})"),
            HookValue::Int(value) => write!(f, "Int({value})"),
            HookValue::Float(value) => write!(f, "Float({value})"),
            HookValue::Text(value) => write!(f, "Text({value:?})"),
            HookValue::Strings(value) => write!(f, "Strings({value:?})"),
            HookValue::Data(value) => write!(f, "Data({value})"),
            HookValue::Player(player) => write!(f, "Player({})", player.id()),
        }
    }
}

impl fmt::Display for HookValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HookValue::Null => write!(f, "null"),
            HookValue::Bool(value) => write!(f, "{value}"),
            HookValue::Int(value) => write!(f, "{value}"),
            HookValue::Float(value) => write!(f, "{value}"),
            HookValue::Text(value) => write!(f, "{value}"),
            HookValue::Strings(value) => write!(f, "[{}]", value.join(", ")),
            HookValue::Data(value) => write!(f, "{value}"),
            HookValue::Player(player) => write!(f, "{}", player.name()),
        }
    }
}

impl From<bool> for HookValue {
    fn from(value: bool) -> Self {
        HookValue::Bool(value)
    }
}

impl From<i32> for HookValue {
    fn from(value: i32) -> Self {
        HookValue::Int(i64::from(value))
    }
}

impl From<i64> for HookValue {
    fn from(value: i64) -> Self {
        HookValue::Int(value)
    }
}

impl From<f64> for HookValue {
    fn from(value: f64) -> Self {
        HookValue::Float(value)
    }
}

impl From<&str> for HookValue {
    fn from(value: &str) -> Self {
        HookValue::Text(value.to_string())
    }
}

impl From<String> for HookValue {
    fn from(value: String) -> Self {
        HookValue::Text(value)
    }
}

impl From<Vec<String>> for HookValue {
    fn from(value: Vec<String>) -> Self {
        HookValue::Strings(value)
    }
}

impl From<Value> for HookValue {
    fn from(value: Value) -> Self {
        HookValue::Data(Arc::new(value))
    }
}

impl From<Arc<dyn Player>> for HookValue {
    fn from(value: Arc<dyn Player>) -> Self {
        HookValue::Player(value)
    }
}

/// Typed accessors over a hook argument slice.
pub trait HookArgsExt {
    fn value_at(&self, index: usize) -> Option<&HookValue>;
    fn player_at(&self, index: usize) -> Result<Arc<dyn Player>, HookError>;
    fn text_at(&self, index: usize) -> Result<&str, HookError>;
    fn int_at(&self, index: usize) -> Result<i64, HookError>;
    fn strings_at(&self, index: usize) -> Result<&[String], HookError>;
}

impl HookArgsExt for [HookValue] {
    fn value_at(&self, index: usize) -> Option<&HookValue> {
        self.get(index)
    }

    fn player_at(&self, index: usize) -> Result<Arc<dyn Player>, HookError> {
        self.get(index)
            .and_then(HookValue::as_player)
            .cloned()
            .ok_or(HookError::BadArgument { index, expected: "a player" })
    }

    fn text_at(&self, index: usize) -> Result<&str, HookError> {
        self.get(index)
            .and_then(HookValue::as_str)
            .ok_or(HookError::BadArgument { index, expected: "text" })
    }

    fn int_at(&self, index: usize) -> Result<i64, HookError> {
        self.get(index)
            .and_then(HookValue::as_int)
            .ok_or(HookError::BadArgument { index, expected: "an integer" })
    }

    fn strings_at(&self, index: usize) -> Result<&[String], HookError> {
        self.get(index)
            .and_then(HookValue::as_strings)
            .ok_or(HookError::BadArgument { index, expected: "a string array" })
    }
}

/// The kind a hook parameter declares.
///
/// Value kinds (`Bool`, `Int`, `Float`) pad with their zero value when the
/// caller supplied fewer arguments than declared and no default exists;
/// reference kinds pad with null.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamKind {
    Any,
    Bool,
    Int,
    Float,
    Text,
    Strings,
    Data,
    Player,
}

impl ParamKind {
    /// The value used to fill a missing argument of this kind when the
    /// parameter declares no default.
    pub fn padding_value(&self) -> HookValue {
        match self {
            ParamKind::Bool => HookValue::Bool(false),
            ParamKind::Int => HookValue::Int(0),
            ParamKind::Float => HookValue::Float(0.0),
            _ => HookValue::Null,
        }
    }
}

/// One declared hook parameter.
#[derive(Debug, Clone)]
pub struct ParamSpec {
    name: String,
    kind: ParamKind,
    default: Option<HookValue>,
    by_ref: bool,
}

impl ParamSpec {
    pub fn new(name: impl Into<String>, kind: ParamKind) -> Self {
        Self {
            name: name.into(),
            kind,
            default: None,
            by_ref: false,
        }
    }

    pub fn any(name: impl Into<String>) -> Self {
        Self::new(name, ParamKind::Any)
    }

    pub fn bool(name: impl Into<String>) -> Self {
        Self::new(name, ParamKind::Bool)
    }

    pub fn int(name: impl Into<String>) -> Self {
        Self::new(name, ParamKind::Int)
    }

    pub fn float(name: impl Into<String>) -> Self {
        Self::new(name, ParamKind::Float)
    }

    pub fn text(name: impl Into<String>) -> Self {
        Self::new(name, ParamKind::Text)
    }

    pub fn strings(name: impl Into<String>) -> Self {
        Self::new(name, ParamKind::Strings)
    }

    pub fn data(name: impl Into<String>) -> Self {
        Self::new(name, ParamKind::Data)
    }

    pub fn player(name: impl Into<String>) -> Self {
        Self::new(name, ParamKind::Player)
    }

    /// Declare a default used when the caller omits this argument.
    pub fn with_default(mut self, value: impl Into<HookValue>) -> Self {
        self.default = Some(value.into());
        self
    }

    /// Mark the parameter as out/by-reference: after a reconciled call its
    /// (possibly mutated) value is copied back to the caller's slot.
    pub fn out(mut self) -> Self {
        self.by_ref = true;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> ParamKind {
        self.kind
    }

    pub fn default(&self) -> Option<&HookValue> {
        self.default.as_ref()
    }

    pub fn is_by_ref(&self) -> bool {
        self.by_ref
    }
}

/// The ordered parameter list a hook method declares.
#[derive(Debug, Clone, Default)]
pub struct HookSignature {
    params: Vec<ParamSpec>,
}

impl HookSignature {
    /// A signature with no parameters.
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn of(params: impl IntoIterator<Item = ParamSpec>) -> Self {
        Self {
            params: params.into_iter().collect(),
        }
    }

    pub fn arity(&self) -> usize {
        self.params.len()
    }

    pub fn params(&self) -> &[ParamSpec] {
        &self.params
    }

    /// Build the argument vector a handler with this signature receives.
    ///
    /// Extra supplied arguments are truncated. Missing trailing arguments
    /// are filled with the declared default when one exists, else the zero
    /// value for value kinds, else null. Pure: the supplied slice is never
    /// mutated here.
    pub fn reconcile(&self, supplied: &[HookValue]) -> Vec<HookValue> {
        let mut reconciled = Vec::with_capacity(self.params.len());
        for (index, param) in self.params.iter().enumerate() {
            if let Some(value) = supplied.get(index) {
                reconciled.push(value.clone());
            } else if let Some(default) = &param.default {
                reconciled.push(default.clone());
            } else {
                reconciled.push(param.kind.padding_value());
            }
        }
        reconciled
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn reconcile_pads_missing_args_with_declared_defaults() {
        let signature = HookSignature::of([
            ParamSpec::text("message"),
            ParamSpec::int("amount").with_default(25),
        ]);

        let reconciled = signature.reconcile(&[HookValue::from("hello")]);
        assert_eq!(reconciled.len(), 2);
        assert_eq!(reconciled[0].as_str(), Some("hello"));
        assert_eq!(reconciled[1].as_int(), Some(25));
    }

    #[test]
    fn reconcile_pads_value_kinds_with_zero_values() {
        let signature = HookSignature::of([
            ParamSpec::bool("enabled"),
            ParamSpec::int("count"),
            ParamSpec::float("ratio"),
        ]);

        let reconciled = signature.reconcile(&[]);
        assert_eq!(reconciled[0].as_bool(), Some(false));
        assert_eq!(reconciled[1].as_int(), Some(0));
        assert_eq!(reconciled[2].as_float(), Some(0.0));
    }

    #[test]
    fn reconcile_pads_reference_kinds_with_null() {
        let signature = HookSignature::of([
            ParamSpec::text("reason"),
            ParamSpec::player("target"),
            ParamSpec::data("payload"),
        ]);

        let reconciled = signature.reconcile(&[]);
        assert!(reconciled.iter().all(HookValue::is_null));
    }

    #[test]
    fn reconcile_truncates_extra_args() {
        let signature = HookSignature::of([ParamSpec::text("first")]);

        let supplied = [
            HookValue::from("keep"),
            HookValue::from("drop"),
            HookValue::from(3),
        ];
        let reconciled = signature.reconcile(&supplied);
        assert_eq!(reconciled.len(), 1);
        assert_eq!(reconciled[0].as_str(), Some("keep"));
    }

    #[test]
    fn reconcile_with_empty_signature_discards_everything() {
        let signature = HookSignature::empty();
        assert!(signature.reconcile(&[HookValue::from(1)]).is_empty());
        assert!(signature.reconcile(&[]).is_empty());
    }

    #[test]
    fn primitive_equality_is_by_value() {
        assert_eq!(HookValue::Int(2), HookValue::Int(2));
        assert_ne!(HookValue::Int(1), HookValue::Int(2));
        assert_eq!(HookValue::from("a"), HookValue::from("a"));
        assert_ne!(HookValue::Int(1), HookValue::from("1"));
    }

    #[test]
    fn data_equality_is_by_allocation() {
        let shared = Arc::new(json!({ "slots": 4 }));
        let same = HookValue::Data(shared.clone());
        let also_same = HookValue::Data(shared);
        let equal_but_distinct = HookValue::from(json!({ "slots": 4 }));

        assert_eq!(same, also_same);
        assert_ne!(same, equal_but_distinct);
    }
}
