//! Selector evaluation for in-memory document filtering.
//!
//! Documents are matched against the JSON selector tree a [`Query`](couchlayer_core::query::Query)
//! serializes to, following the store's selector semantics:
//!
//! - `{"field": literal}` is equality,
//! - `{"field": {"$op": arg, ...}}` applies every operator,
//! - `{"field": {"sub": ...}}` matches a nested object,
//! - `$and`, `$or`, `$nor` and `$not` combine sub-selectors.
//!
//! `$regex` only matches string values and `$mod` only matches integers.
//!
//! Values compare by the store's collation order: null, false, true, numbers, strings, arrays,
//! objects. Strings compare by code point.

use regex::Regex;
use serde_json::{Map, Value};
use std::cmp::Ordering;

use crate::error::MemoryStoreError;

/// Collation view of a JSON value.
#[derive(Debug)]
pub(crate) enum Comparable<'a> {
    Null,
    Bool(bool),
    Number(f64),
    String(&'a str),
    Array(Vec<Comparable<'a>>),
    Map(Vec<(&'a str, Comparable<'a>)>),
}

impl<'a> From<&'a Value> for Comparable<'a> {
    fn from(value: &'a Value) -> Self {
        match value {
            Value::Null => Comparable::Null,
            Value::Bool(b) => Comparable::Bool(*b),
            Value::Number(n) => Comparable::Number(n.as_f64().unwrap_or(0.0)),
            Value::String(s) => Comparable::String(s),
            Value::Array(items) => Comparable::Array(
                items
                    .iter()
                    .map(Comparable::from)
                    .collect(),
            ),
            Value::Object(map) => Comparable::Map(
                map.iter()
                    .map(|(k, v)| (k.as_str(), Comparable::from(v)))
                    .collect(),
            ),
        }
    }
}

impl Comparable<'_> {
    fn rank(&self) -> u8 {
        match self {
            Comparable::Null => 0,
            Comparable::Bool(_) => 1,
            Comparable::Number(_) => 2,
            Comparable::String(_) => 3,
            Comparable::Array(_) => 4,
            Comparable::Map(_) => 5,
        }
    }
}

impl PartialEq for Comparable<'_> {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Comparable<'_> {}

impl PartialOrd for Comparable<'_> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Comparable<'_> {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self, other) {
            (Comparable::Null, Comparable::Null) => Ordering::Equal,
            (Comparable::Bool(a), Comparable::Bool(b)) => a.cmp(b),
            (Comparable::Number(a), Comparable::Number(b)) => a
                .partial_cmp(b)
                .unwrap_or(Ordering::Equal),
            (Comparable::String(a), Comparable::String(b)) => a.cmp(b),
            (Comparable::Array(a), Comparable::Array(b)) => a.cmp(b),
            (Comparable::Map(a), Comparable::Map(b)) => a.cmp(b),
            _ => self.rank().cmp(&other.rank()),
        }
    }
}

/// Orders two JSON values by collation.
pub fn collate(left: &Value, right: &Value) -> Ordering {
    Comparable::from(left).cmp(&Comparable::from(right))
}

/// Resolves a dotted field path. Numeric segments index into arrays.
pub(crate) fn lookup<'v>(document: &'v Value, path: &str) -> Option<&'v Value> {
    path.split('.')
        .try_fold(document, |current, segment| match current {
            Value::Object(map) => map.get(segment),
            Value::Array(items) => segment
                .parse::<usize>()
                .ok()
                .and_then(|i| items.get(i)),
            _ => None,
        })
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

fn operand_list<'v>(op: &str, arg: &'v Value) -> Result<&'v Vec<Value>, MemoryStoreError> {
    arg.as_array()
        .ok_or_else(|| MemoryStoreError::BadRequest(format!("Operator {op} expects an array")))
}

fn in_list(value: &Value, list: &[Value]) -> bool {
    let contains = |v: &Value| {
        list.iter()
            .any(|candidate| collate(v, candidate) == Ordering::Equal)
    };

    match value {
        Value::Array(items) => items.iter().any(contains) || contains(value),
        _ => contains(value),
    }
}

pub(crate) struct DocumentEvaluator<'a> {
    document: &'a Value,
}

impl<'a> DocumentEvaluator<'a> {
    pub fn new(document: &'a Value) -> Self {
        Self { document }
    }

    pub fn evaluate(&self, selector: &Map<String, Value>) -> Result<bool, MemoryStoreError> {
        for (key, condition) in selector {
            let matched = match key.as_str() {
                "$and" => self.all(key, condition)?,
                "$or" => self.any(key, condition)?,
                "$nor" => !self.any(key, condition)? || group(key, condition)?.is_empty(),
                "$not" => !self.evaluate(sub_selector(key, condition)?)?,
                op if op.starts_with('$') => {
                    return Err(MemoryStoreError::InvalidOperator(op.to_string()));
                }
                field => matches_condition(lookup(self.document, field), condition)?,
            };

            if !matched {
                return Ok(false);
            }
        }

        Ok(true)
    }

    fn all(&self, key: &str, condition: &Value) -> Result<bool, MemoryStoreError> {
        for selector in group(key, condition)? {
            if !self.evaluate(sub_selector(key, selector)?)? {
                return Ok(false);
            }
        }

        Ok(true)
    }

    // An empty group places no constraint.
    fn any(&self, key: &str, condition: &Value) -> Result<bool, MemoryStoreError> {
        let selectors = group(key, condition)?;
        if selectors.is_empty() {
            return Ok(true);
        }

        for selector in selectors {
            if self.evaluate(sub_selector(key, selector)?)? {
                return Ok(true);
            }
        }

        Ok(false)
    }

    /// Keeps the documents that match `selector`, in their original order.
    pub fn filter_documents(
        documents: impl IntoIterator<Item = Value>,
        selector: &Map<String, Value>,
    ) -> Result<Vec<Value>, MemoryStoreError> {
        let mut matched = Vec::new();
        for document in documents {
            if DocumentEvaluator::new(&document).evaluate(selector)? {
                matched.push(document);
            }
        }

        Ok(matched)
    }
}

fn group<'v>(key: &str, condition: &'v Value) -> Result<&'v Vec<Value>, MemoryStoreError> {
    operand_list(key, condition)
}

fn sub_selector<'v>(key: &str, value: &'v Value) -> Result<&'v Map<String, Value>, MemoryStoreError> {
    value
        .as_object()
        .ok_or_else(|| MemoryStoreError::BadRequest(format!("Operator {key} expects selectors")))
}

fn matches_condition(value: Option<&Value>, condition: &Value) -> Result<bool, MemoryStoreError> {
    match condition {
        Value::Object(ops) if !ops.is_empty() && ops.keys().all(|k| k.starts_with('$')) => {
            for (op, arg) in ops {
                if !apply_operator(value, op, arg)? {
                    return Ok(false);
                }
            }

            Ok(true)
        }
        Value::Object(nested) => match value {
            Some(inner @ Value::Object(_)) => DocumentEvaluator::new(inner).evaluate(nested),
            _ => Ok(false),
        },
        literal => Ok(value.is_some_and(|v| collate(v, literal) == Ordering::Equal)),
    }
}

fn modulo_operands(arg: &Value) -> Result<(i64, i64), MemoryStoreError> {
    let invalid = || {
        MemoryStoreError::BadRequest(
            "Operator $mod expects [divisor, remainder] with a non-zero integer divisor".into(),
        )
    };

    match arg.as_array().map(Vec::as_slice) {
        Some([divisor, remainder]) => {
            let divisor = divisor.as_i64().filter(|d| *d != 0).ok_or_else(invalid)?;
            let remainder = remainder.as_i64().ok_or_else(invalid)?;
            Ok((divisor, remainder))
        }
        _ => Err(invalid()),
    }
}

fn apply_operator(value: Option<&Value>, op: &str, arg: &Value) -> Result<bool, MemoryStoreError> {
    let compare = |accept: fn(Ordering) -> bool| value.is_some_and(|v| accept(collate(v, arg)));

    match op {
        "$eq" => Ok(compare(|o| o == Ordering::Equal)),
        "$ne" => Ok(compare(|o| o != Ordering::Equal)),
        "$gt" => Ok(compare(|o| o == Ordering::Greater)),
        "$gte" => Ok(compare(|o| o != Ordering::Less)),
        "$lt" => Ok(compare(|o| o == Ordering::Less)),
        "$lte" => Ok(compare(|o| o != Ordering::Greater)),
        "$exists" => {
            let should_exist = arg
                .as_bool()
                .ok_or_else(|| MemoryStoreError::BadRequest("Operator $exists expects a boolean".into()))?;
            Ok(value.is_some() == should_exist)
        }
        "$in" => {
            let list = operand_list(op, arg)?;
            Ok(value.is_some_and(|v| in_list(v, list)))
        }
        "$nin" => {
            let list = operand_list(op, arg)?;
            Ok(value.is_some_and(|v| !in_list(v, list)))
        }
        "$all" => {
            let list = operand_list(op, arg)?;
            Ok(value
                .and_then(Value::as_array)
                .is_some_and(|items| {
                    list.iter().all(|wanted| {
                        items
                            .iter()
                            .any(|item| collate(item, wanted) == Ordering::Equal)
                    })
                }))
        }
        "$size" => {
            let size = arg
                .as_u64()
                .ok_or_else(|| MemoryStoreError::BadRequest("Operator $size expects an integer".into()))?;
            Ok(value
                .and_then(Value::as_array)
                .is_some_and(|items| items.len() as u64 == size))
        }
        "$type" => {
            let expected = arg
                .as_str()
                .ok_or_else(|| MemoryStoreError::BadRequest("Operator $type expects a string".into()))?;
            Ok(value.is_some_and(|v| type_name(v) == expected))
        }
        "$regex" => {
            let pattern = arg
                .as_str()
                .ok_or_else(|| MemoryStoreError::BadRequest("Operator $regex expects a string".into()))?;
            let regex = Regex::new(pattern)
                .map_err(|err| MemoryStoreError::BadRequest(format!("Invalid $regex pattern: {err}")))?;
            Ok(value
                .and_then(Value::as_str)
                .is_some_and(|s| regex.is_match(s)))
        }
        "$mod" => {
            let (divisor, remainder) = modulo_operands(arg)?;
            Ok(value
                .and_then(Value::as_i64)
                .is_some_and(|n| n.checked_rem(divisor) == Some(remainder)))
        }
        "$elemMatch" => match value.and_then(Value::as_array) {
            Some(items) => {
                for item in items {
                    if matches_condition(Some(item), arg)? {
                        return Ok(true);
                    }
                }
                Ok(false)
            }
            None => Ok(false),
        },
        "$not" => Ok(!matches_condition(value, arg)?),
        other => Err(MemoryStoreError::InvalidOperator(other.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn matches(document: Value, selector: Value) -> bool {
        let selector = selector.as_object().cloned().unwrap();
        DocumentEvaluator::new(&document)
            .evaluate(&selector)
            .unwrap()
    }

    #[test]
    fn collation_order() {
        let mut values = vec![
            json!({ "a": 1 }),
            json!("b"),
            json!([1]),
            json!(2),
            json!(true),
            json!(null),
            json!(false),
            json!("a"),
            json!(1.5),
        ];
        values.sort_by(collate);

        assert_eq!(
            values,
            vec![
                json!(null),
                json!(false),
                json!(true),
                json!(1.5),
                json!(2),
                json!("a"),
                json!("b"),
                json!([1]),
                json!({ "a": 1 }),
            ]
        );
        assert_eq!(collate(&json!(1), &json!(1.0)), Ordering::Equal);
        assert_eq!(collate(&json!("user:"), &json!("user:zzz")), Ordering::Less);
        assert_eq!(collate(&json!("user:zzz"), &json!("user:\u{fff0}")), Ordering::Less);
    }

    #[test]
    fn literal_and_operators() {
        let doc = json!({ "type": "user", "age": 30, "tags": ["a", "b"] });

        assert!(matches(doc.clone(), json!({ "type": "user" })));
        assert!(!matches(doc.clone(), json!({ "type": "admin" })));
        assert!(matches(doc.clone(), json!({ "age": { "$gt": 18, "$lte": 30 } })));
        assert!(!matches(doc.clone(), json!({ "age": { "$lt": 18 } })));
        assert!(matches(doc.clone(), json!({ "age": { "$in": [10, 30] } })));
        assert!(matches(doc.clone(), json!({ "tags": { "$all": ["b", "a"] } })));
        assert!(matches(doc.clone(), json!({ "tags": { "$size": 2 } })));
        assert!(matches(doc.clone(), json!({ "missing": { "$exists": false } })));
        assert!(!matches(doc, json!({ "missing": { "$ne": 1 } })));
    }

    #[test]
    fn logical_groups() {
        let doc = json!({ "name": "alice", "address": { "city": "Bridgetown" } });

        assert!(matches(doc.clone(), json!({ "$or": [{ "name": "bob" }, { "name": "alice" }] })));
        assert!(!matches(doc.clone(), json!({ "$and": [{ "name": "alice" }, { "name": "bob" }] })));
        assert!(matches(doc.clone(), json!({ "$or": [] })));
        assert!(matches(doc.clone(), json!({ "$nor": [{ "name": "bob" }] })));
        assert!(matches(doc.clone(), json!({ "address": { "city": "Bridgetown" } })));
        assert!(matches(doc, json!({ "address.city": { "$gte": "B" } })));
    }

    #[test]
    fn regex_matches_strings_only() {
        let doc = json!({ "name": "alice", "age": 30 });

        assert!(matches(doc.clone(), json!({ "name": { "$regex": "^al" } })));
        assert!(matches(doc.clone(), json!({ "name": { "$regex": "(?i)^ALI" } })));
        assert!(!matches(doc.clone(), json!({ "name": { "$regex": "^bo" } })));
        assert!(!matches(doc.clone(), json!({ "age": { "$regex": "3" } })));
        assert!(!matches(doc, json!({ "missing": { "$regex": ".*" } })));
    }

    #[test]
    fn invalid_regex_is_bad_request() {
        let doc = json!({ "name": "alice" });
        let selector = json!({ "name": { "$regex": "(" } });
        let err = DocumentEvaluator::new(&doc)
            .evaluate(selector.as_object().unwrap())
            .unwrap_err();

        assert!(matches!(err, MemoryStoreError::BadRequest(_)));
    }

    #[test]
    fn modulo_matches_integers() {
        let doc = json!({ "n": 7, "ratio": 7.5, "name": "x" });

        assert!(matches(doc.clone(), json!({ "n": { "$mod": [3, 1] } })));
        assert!(!matches(doc.clone(), json!({ "n": { "$mod": [3, 2] } })));
        assert!(!matches(doc.clone(), json!({ "ratio": { "$mod": [3, 1] } })));
        assert!(!matches(doc.clone(), json!({ "name": { "$mod": [3, 1] } })));

        for arg in [json!([0, 1]), json!([3]), json!("3"), json!([1.5, 0])] {
            let selector = json!({ "n": { "$mod": arg } });
            let err = DocumentEvaluator::new(&doc)
                .evaluate(selector.as_object().unwrap())
                .unwrap_err();
            assert!(matches!(err, MemoryStoreError::BadRequest(_)));
        }
    }

    #[test]
    fn unknown_operator_fails() {
        let doc = json!({ "name": "alice" });
        let selector = json!({ "name": { "$near": 1 } });
        let err = DocumentEvaluator::new(&doc)
            .evaluate(selector.as_object().unwrap())
            .unwrap_err();

        assert!(matches!(err, MemoryStoreError::InvalidOperator(op) if op == "$near"));
    }
}
