//! Fluent construction of query selectors.
//!
//! A [`Selector`] is a tree of field bindings that serializes to the store's selector syntax.
//! Every property holds exactly one [`SelectorNode`]:
//!
//! - [`SelectorNode::Literal`] for plain equality (`{"age": 5}`),
//! - [`SelectorNode::Operators`] for operator objects (`{"age": {"$gt": 10}}`) or nested mappings,
//! - [`SelectorNode::Group`] for the logical groups `$or` / `$and`, an ordered list of sub-selectors.
//!
//! A literal property never turns into an operator object (or the other way round) through the
//! binder API; such an assignment fails with `IncompatibleAssignment`.
//!
//! # Example
//!
//! ```ignore
//! use couchlayer::selector::{Selector, OperatorValue};
//!
//! let mut selector = Selector::create();
//! selector
//!     .with_property("type").with_value("user")?
//!     .on()
//!     .with_property("age").with_value(OperatorValue::gte(18))?;
//!
//! selector
//!     .with_or()?
//!     .with_object(serde_json::json!({ "country": "BB" }))?
//!     .with_object(serde_json::json!({ "country": "TT" }))?;
//! ```

use serde::{Serialize, Serializer};
use serde_json::{Map, Number, Value};
use std::collections::BTreeMap;

use crate::error::{DbError, DbResult};

/// A field name known at compile time.
///
/// `#[derive(EntityFields)]` generates one constant of this type per struct field, so selectors
/// and sorts can reference fields without string literals scattered through the code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FieldRef(&'static str);

impl FieldRef {
    pub const fn new(name: &'static str) -> Self {
        Self(name)
    }

    pub const fn name(&self) -> &'static str {
        self.0
    }
}

impl AsRef<str> for FieldRef {
    fn as_ref(&self) -> &str {
        self.0
    }
}

/// A literal leaf value.
#[derive(Debug, Clone, PartialEq)]
pub enum Literal {
    String(String),
    Number(Number),
    Bool(bool),
}

impl Literal {
    pub fn to_value(&self) -> Value {
        match self {
            Literal::String(s) => Value::String(s.clone()),
            Literal::Number(n) => Value::Number(n.clone()),
            Literal::Bool(b) => Value::Bool(*b),
        }
    }
}

macro_rules! literal_from_number {
    ($($ty:ty),*) => {
        $(
            impl From<$ty> for Literal {
                fn from(value: $ty) -> Self {
                    Literal::Number(Number::from(value))
                }
            }

            impl From<$ty> for SelectorInput {
                fn from(value: $ty) -> Self {
                    SelectorInput::Literal(Literal::from(value))
                }
            }
        )*
    };
}

literal_from_number!(i32, i64, u32, u64, usize);

impl From<&str> for Literal {
    fn from(value: &str) -> Self {
        Literal::String(value.to_string())
    }
}

impl From<String> for Literal {
    fn from(value: String) -> Self {
        Literal::String(value)
    }
}

impl From<bool> for Literal {
    fn from(value: bool) -> Self {
        Literal::Bool(value)
    }
}

/// An operator/value pair such as `$gt: 10`, merged into a property's operator object.
#[derive(Debug, Clone, PartialEq)]
pub struct OperatorValue {
    pub operator: String,
    pub value: Value,
}

impl OperatorValue {
    pub fn new(operator: impl Into<String>, value: impl Into<Value>) -> Self {
        Self { operator: operator.into(), value: value.into() }
    }

    pub fn eq(value: impl Into<Value>) -> Self {
        Self::new("$eq", value)
    }

    pub fn ne(value: impl Into<Value>) -> Self {
        Self::new("$ne", value)
    }

    pub fn gt(value: impl Into<Value>) -> Self {
        Self::new("$gt", value)
    }

    pub fn gte(value: impl Into<Value>) -> Self {
        Self::new("$gte", value)
    }

    pub fn lt(value: impl Into<Value>) -> Self {
        Self::new("$lt", value)
    }

    pub fn lte(value: impl Into<Value>) -> Self {
        Self::new("$lte", value)
    }

    pub fn exists(should_exist: bool) -> Self {
        Self::new("$exists", should_exist)
    }

    pub fn any_of<V: Into<Value>>(values: impl IntoIterator<Item = V>) -> Self {
        Self::new("$in", Value::Array(values.into_iter().map(Into::into).collect()))
    }

    pub fn none_of<V: Into<Value>>(values: impl IntoIterator<Item = V>) -> Self {
        Self::new("$nin", Value::Array(values.into_iter().map(Into::into).collect()))
    }

    pub fn all<V: Into<Value>>(values: impl IntoIterator<Item = V>) -> Self {
        Self::new("$all", Value::Array(values.into_iter().map(Into::into).collect()))
    }

    pub fn regex(pattern: impl Into<String>) -> Self {
        Self::new("$regex", pattern.into())
    }

    /// Matches integers whose remainder by `divisor` is `remainder`.
    pub fn modulo(divisor: i64, remainder: i64) -> Self {
        Self::new("$mod", Value::from(vec![divisor, remainder]))
    }
}

/// Anything that can be handed to [`PropertyBinder::with_value`].
#[derive(Debug, Clone, PartialEq)]
pub enum SelectorInput {
    Literal(Literal),
    Operator(OperatorValue),
}

impl From<Literal> for SelectorInput {
    fn from(value: Literal) -> Self {
        SelectorInput::Literal(value)
    }
}

impl From<OperatorValue> for SelectorInput {
    fn from(value: OperatorValue) -> Self {
        SelectorInput::Operator(value)
    }
}

impl From<&str> for SelectorInput {
    fn from(value: &str) -> Self {
        SelectorInput::Literal(value.into())
    }
}

impl From<String> for SelectorInput {
    fn from(value: String) -> Self {
        SelectorInput::Literal(value.into())
    }
}

impl From<bool> for SelectorInput {
    fn from(value: bool) -> Self {
        SelectorInput::Literal(value.into())
    }
}

/// The logical group keys a selector understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogicalOperator {
    Or,
    And,
}

impl LogicalOperator {
    pub fn key(&self) -> &'static str {
        match self {
            LogicalOperator::Or => "$or",
            LogicalOperator::And => "$and",
        }
    }
}

/// The value bound to a single selector property.
#[derive(Debug, Clone, PartialEq)]
pub enum SelectorNode {
    /// Equality against a literal.
    Literal(Literal),
    /// An operator object or nested mapping.
    Operators(Map<String, Value>),
    /// An ordered list of sub-selectors under `$or` / `$and`.
    Group(Vec<Map<String, Value>>),
}

impl SelectorNode {
    pub fn to_value(&self) -> Value {
        match self {
            SelectorNode::Literal(literal) => literal.to_value(),
            SelectorNode::Operators(map) => Value::Object(map.clone()),
            SelectorNode::Group(items) => Value::Array(
                items
                    .iter()
                    .cloned()
                    .map(Value::Object)
                    .collect(),
            ),
        }
    }

    /// Classifies a raw JSON value into a node.
    ///
    /// Strings, numbers and booleans become literals, non-empty objects become operator objects
    /// and arrays of non-empty objects become groups. Anything else is rejected.
    pub fn from_value(value: Value) -> DbResult<Self> {
        match value {
            Value::String(s) => Ok(SelectorNode::Literal(Literal::String(s))),
            Value::Number(n) => Ok(SelectorNode::Literal(Literal::Number(n))),
            Value::Bool(b) => Ok(SelectorNode::Literal(Literal::Bool(b))),
            Value::Object(map) if !map.is_empty() => Ok(SelectorNode::Operators(map)),
            Value::Array(items) => items
                .into_iter()
                .map(non_empty_object)
                .collect::<DbResult<Vec<_>>>()
                .map(SelectorNode::Group),
            _ => Err(DbError::invalid_argument("Selector values cannot be null or empty objects")),
        }
    }
}

fn non_empty_object(value: Value) -> DbResult<Map<String, Value>> {
    match value {
        Value::Object(map) if !map.is_empty() => Ok(map),
        _ => Err(DbError::invalid_argument("Expected a non-empty object")),
    }
}

fn check_field(field: &str) -> DbResult<()> {
    if field.is_empty() {
        return Err(DbError::invalid_argument("Property field cannot be empty"));
    }

    Ok(())
}

/// A query predicate built from field bindings.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Selector {
    properties: BTreeMap<String, SelectorNode>,
}

impl Selector {
    /// Creates an empty selector, which matches every document.
    pub fn create() -> Self {
        Self::default()
    }

    /// Creates a selector holding an empty `$or` group.
    pub fn create_or() -> Self {
        let mut selector = Self::create();
        selector
            .properties
            .insert(LogicalOperator::Or.key().to_string(), SelectorNode::Group(Vec::new()));
        selector
    }

    /// Creates a selector holding an empty `$and` group.
    pub fn create_and() -> Self {
        let mut selector = Self::create();
        selector
            .properties
            .insert(LogicalOperator::And.key().to_string(), SelectorNode::Group(Vec::new()));
        selector
    }

    /// Creates a selector with a single property bound to `value`.
    pub fn create_with_property(
        field: impl AsRef<str>,
        value: impl Into<SelectorInput>,
    ) -> DbResult<Self> {
        let mut selector = Self::create();
        selector
            .with_property(field)
            .with_value(value)?;
        Ok(selector)
    }

    /// Creates a selector with a single property bound to a raw object.
    pub fn create_with_object_value(field: impl AsRef<str>, value: Value) -> DbResult<Self> {
        let mut selector = Self::create();
        selector
            .with_property(field)
            .with_object_value(value)?;
        Ok(selector)
    }

    /// Builds a single-field object `{field: value}`.
    pub fn create_property_value(field: impl AsRef<str>, value: impl Into<Value>) -> Value {
        let mut map = Map::new();
        map.insert(field.as_ref().to_string(), value.into());
        Value::Object(map)
    }

    /// Builds one single-field object per `(field, value)` pair.
    ///
    /// # Errors
    ///
    /// Fails with `InvalidArgument` unless both lists are non-empty and have the same length.
    pub fn create_property_array_value<F: AsRef<str>>(
        fields: &[F],
        values: Vec<Value>,
    ) -> DbResult<Vec<Value>> {
        if fields.is_empty() || values.is_empty() {
            return Err(DbError::invalid_argument("Fields and values cannot be empty"));
        }
        if fields.len() != values.len() {
            return Err(DbError::invalid_argument("Fields and values must be the same length"));
        }

        Ok(fields
            .iter()
            .zip(values)
            .map(|(field, value)| Self::create_property_value(field, value))
            .collect())
    }

    /// Scopes a value binder to `field`.
    pub fn with_property(&mut self, field: impl AsRef<str>) -> PropertyBinder<'_> {
        PropertyBinder { name: field.as_ref().to_string(), selector: self }
    }

    /// Scopes a group binder to a logical group, creating the group if it is absent.
    ///
    /// # Errors
    ///
    /// Fails with `IncompatibleAssignment` if the group key already holds something other than a
    /// group.
    pub fn with_selector_property(&mut self, operator: LogicalOperator) -> DbResult<GroupBinder<'_>> {
        let key = operator.key();
        let node = self
            .properties
            .entry(key.to_string())
            .or_insert_with(|| SelectorNode::Group(Vec::new()));
        if !matches!(node, SelectorNode::Group(_)) {
            return Err(DbError::incompatible_assignment(format!(
                "Property {key} does not hold a group"
            )));
        }

        Ok(GroupBinder { key, selector: self })
    }

    pub fn with_or(&mut self) -> DbResult<GroupBinder<'_>> {
        self.with_selector_property(LogicalOperator::Or)
    }

    pub fn with_and(&mut self) -> DbResult<GroupBinder<'_>> {
        self.with_selector_property(LogicalOperator::And)
    }

    /// Replaces the value of an existing property.
    ///
    /// # Errors
    ///
    /// Fails with `NotFound` if the property does not exist, or `InvalidArgument` if `value` cannot
    /// be bound to a property.
    pub fn change_property_value(&mut self, field: impl AsRef<str>, value: Value) -> DbResult<()> {
        let field = field.as_ref();
        check_field(field)?;

        match self.properties.get_mut(field) {
            Some(node) => {
                *node = SelectorNode::from_value(value)?;
                Ok(())
            }
            None => Err(DbError::not_found(format!("Property {field} does not exist"))),
        }
    }

    /// Removes a property. Absent properties are ignored.
    pub fn remove_property(&mut self, field: impl AsRef<str>) {
        self.properties.remove(field.as_ref());
    }

    pub fn get(&self, field: impl AsRef<str>) -> Option<&SelectorNode> {
        self.properties.get(field.as_ref())
    }

    pub fn contains(&self, field: impl AsRef<str>) -> bool {
        self.properties.contains_key(field.as_ref())
    }

    pub fn is_empty(&self) -> bool {
        self.properties.is_empty()
    }

    pub fn len(&self) -> usize {
        self.properties.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &SelectorNode)> {
        self.properties
            .iter()
            .map(|(k, v)| (k.as_str(), v))
    }

    pub fn to_map(&self) -> Map<String, Value> {
        self.properties
            .iter()
            .map(|(k, v)| (k.clone(), v.to_value()))
            .collect()
    }

    pub fn to_value(&self) -> Value {
        Value::Object(self.to_map())
    }
}

impl Serialize for Selector {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.to_map().serialize(serializer)
    }
}

impl From<Selector> for Value {
    fn from(selector: Selector) -> Self {
        selector.to_value()
    }
}

impl From<&Selector> for Value {
    fn from(selector: &Selector) -> Self {
        selector.to_value()
    }
}

/// Binds values to one property of a [`Selector`].
#[derive(Debug)]
pub struct PropertyBinder<'a> {
    selector: &'a mut Selector,
    name: String,
}

impl<'a> PropertyBinder<'a> {
    /// Binds a literal, or merges an operator pair into the property's operator object.
    ///
    /// # Errors
    ///
    /// - `InvalidArgument` for an empty field or operator name.
    /// - `IncompatibleAssignment` when a literal meets an existing value, or an operator pair meets
    ///   an existing literal or group.
    pub fn with_value(self, value: impl Into<SelectorInput>) -> DbResult<Self> {
        check_field(&self.name)?;

        let existing = self.selector.properties.get_mut(&self.name);
        match (existing, value.into()) {
            (None, SelectorInput::Literal(literal)) => {
                self.selector
                    .properties
                    .insert(self.name.clone(), SelectorNode::Literal(literal));
            }
            (None, SelectorInput::Operator(op)) => {
                check_operator(&op)?;
                let mut map = Map::new();
                map.insert(op.operator, op.value);
                self.selector
                    .properties
                    .insert(self.name.clone(), SelectorNode::Operators(map));
            }
            (Some(SelectorNode::Operators(map)), SelectorInput::Operator(op)) => {
                check_operator(&op)?;
                map.insert(op.operator, op.value);
            }
            (Some(SelectorNode::Literal(_)), SelectorInput::Operator(_)) => {
                return Err(DbError::incompatible_assignment(format!(
                    "Cannot assign an operator to literal property {}",
                    self.name
                )));
            }
            (Some(SelectorNode::Literal(_)), SelectorInput::Literal(_)) => {
                return Err(DbError::incompatible_assignment(format!(
                    "Property {} already holds a literal",
                    self.name
                )));
            }
            (Some(_), SelectorInput::Literal(_)) => {
                return Err(DbError::incompatible_assignment(format!(
                    "Cannot assign a literal to object property {}",
                    self.name
                )));
            }
            (Some(SelectorNode::Group(_)), SelectorInput::Operator(_)) => {
                return Err(DbError::incompatible_assignment(format!(
                    "Cannot assign an operator to group property {}",
                    self.name
                )));
            }
        }

        Ok(self)
    }

    /// Replaces the property's value with `value`, whatever it held before.
    ///
    /// # Errors
    ///
    /// Fails with `InvalidArgument` if `value` is null, an empty object, an empty array or
    /// otherwise not bindable.
    pub fn with_object_value(self, value: Value) -> DbResult<Self> {
        check_field(&self.name)?;

        let empty = match &value {
            Value::Null => true,
            Value::Object(map) => map.is_empty(),
            Value::Array(items) => items.is_empty(),
            Value::String(s) => s.is_empty(),
            _ => false,
        };
        if empty {
            return Err(DbError::invalid_argument(format!(
                "Cannot bind an empty value to property {}",
                self.name
            )));
        }

        let node = SelectorNode::from_value(value)?;
        self.selector
            .properties
            .insert(self.name.clone(), node);

        Ok(self)
    }

    /// Returns to the owning selector.
    pub fn on(self) -> &'a mut Selector {
        self.selector
    }
}

fn check_operator(op: &OperatorValue) -> DbResult<()> {
    if op.operator.is_empty() {
        return Err(DbError::invalid_argument("Operator name cannot be empty"));
    }

    Ok(())
}

/// Appends sub-selectors to a logical group of a [`Selector`].
#[derive(Debug)]
pub struct GroupBinder<'a> {
    selector: &'a mut Selector,
    key: &'static str,
}

impl<'a> GroupBinder<'a> {
    fn push(&mut self, item: Map<String, Value>) -> DbResult<()> {
        match self.selector.properties.get_mut(self.key) {
            Some(SelectorNode::Group(items)) => {
                items.push(item);
                Ok(())
            }
            _ => Err(DbError::incompatible_assignment(format!(
                "Property {} does not hold a group",
                self.key
            ))),
        }
    }

    /// Appends the full predicate tree of another selector.
    ///
    /// # Errors
    ///
    /// Fails with `InvalidArgument` if `selector` is empty.
    pub fn with_selector(mut self, selector: &Selector) -> DbResult<Self> {
        if selector.is_empty() {
            return Err(DbError::invalid_argument("Cannot append an empty selector to a group"));
        }
        self.push(selector.to_map())?;
        Ok(self)
    }

    /// Appends a raw predicate object.
    ///
    /// # Errors
    ///
    /// Fails with `InvalidArgument` unless `object` is a non-empty JSON object.
    pub fn with_object(mut self, object: Value) -> DbResult<Self> {
        let map = non_empty_object(object)?;
        self.push(map)?;
        Ok(self)
    }

    /// Appends every object in `objects`, in order.
    pub fn with_object_array(self, objects: impl IntoIterator<Item = Value>) -> DbResult<Self> {
        objects
            .into_iter()
            .try_fold(self, |binder, object| binder.with_object(object))
    }

    /// Appends the single-field object `{field: value}`.
    pub fn with_object_value(self, field: impl AsRef<str>, value: impl Into<Value>) -> DbResult<Self> {
        check_field(field.as_ref())?;

        let value = value.into();
        if value.is_null() {
            return Err(DbError::invalid_argument("Cannot append a null value to a group"));
        }

        self.with_object(Selector::create_property_value(field, value))
    }

    /// Returns to the owning selector.
    pub fn on(self) -> &'a mut Selector {
        self.selector
    }
}
