//! The query layer: filter, sort and paginate a rehydrated state.
//!
//! Filters use a small document language over each entity's JSON rendering
//! (see [`Entity::to_document`]). A bare value means equality; an object of
//! `$`-operators applies each operator; `$and`, `$or` and `$not` combine.
//! `$not` also works inside a field, as in `{"priority": {"$not": {"$gt": 2}}}`.
//! Paths may be dotted to reach into nested objects.

use std::cmp::Ordering;

use exhorse_core::entity::{Entity, ProjectionState};
use exhorse_core::error::DomainError;
use regex::{Regex, RegexBuilder};
use serde::Serialize;
use serde_json::{Map, Value};
use uuid::Uuid;

use crate::config::DEFAULT_PAGE_LIMIT;

/// A parsed filter document.
#[derive(Debug, Clone, Default)]
pub enum Filter {
    /// Matches every entity.
    #[default]
    All,
    /// A condition on one field.
    Field {
        /// Dotted path into the document.
        path: String,
        /// What the field must satisfy.
        condition: Condition,
    },
    /// Every inner filter matches.
    And(Vec<Filter>),
    /// At least one inner filter matches.
    Or(Vec<Filter>),
    /// The inner filter does not match.
    Not(Box<Filter>),
}

/// A comparison applied to one field.
#[derive(Debug, Clone)]
pub enum Condition {
    /// Equal, or for arrays, containing the value.
    Eq(Value),
    /// Not equal. A missing field is not equal to anything.
    Ne(Value),
    /// Greater than.
    Gt(Value),
    /// Greater than or equal.
    Gte(Value),
    /// Less than.
    Lt(Value),
    /// Less than or equal.
    Lte(Value),
    /// Equal to one of the values.
    In(Vec<Value>),
    /// Equal to none of the values.
    Nin(Vec<Value>),
    /// A string field matching the pattern.
    Regex(Regex),
    /// The field is present (`true`) or absent (`false`).
    Exists(bool),
}

impl Filter {
    /// Equality on one field.
    #[must_use]
    pub fn eq(path: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::Field {
            path: path.into(),
            condition: Condition::Eq(value.into()),
        }
    }

    /// Parses a filter document. `null` and `{}` match everything.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::InvalidQuery` for unknown operators, operands of
    /// the wrong type, or an invalid regular expression.
    pub fn parse(document: &Value) -> Result<Self, DomainError> {
        match document {
            Value::Null => Ok(Self::All),
            Value::Object(map) => parse_object(map),
            other => Err(invalid(format!("filter must be an object, got {other}"))),
        }
    }

    /// Returns `true` if `document` satisfies the filter.
    #[must_use]
    pub fn matches(&self, document: &Value) -> bool {
        match self {
            Self::All => true,
            Self::Field { path, condition } => condition.matches(lookup(document, path)),
            Self::And(filters) => filters.iter().all(|f| f.matches(document)),
            Self::Or(filters) => filters.iter().any(|f| f.matches(document)),
            Self::Not(filter) => !filter.matches(document),
        }
    }

    /// Returns `true` if any condition reads `path` or a path below it.
    #[must_use]
    pub fn references(&self, path: &str) -> bool {
        match self {
            Self::All => false,
            Self::Field { path: field, .. } => is_within(field, path),
            Self::And(filters) | Self::Or(filters) => filters.iter().any(|f| f.references(path)),
            Self::Not(filter) => filter.references(path),
        }
    }
}

fn is_within(candidate: &str, path: &str) -> bool {
    candidate
        .strip_prefix(path)
        .is_some_and(|rest| rest.is_empty() || rest.starts_with('.'))
}

fn invalid(message: impl Into<String>) -> DomainError {
    DomainError::InvalidQuery(message.into())
}

fn parse_object(map: &Map<String, Value>) -> Result<Filter, DomainError> {
    let mut clauses = Vec::with_capacity(map.len());
    for (key, value) in map {
        clauses.push(match key.as_str() {
            "$and" => Filter::And(parse_list(key, value)?),
            "$or" => Filter::Or(parse_list(key, value)?),
            "$not" => Filter::Not(Box::new(Filter::parse(value)?)),
            op if op.starts_with('$') => return Err(invalid(format!("unknown operator {op}"))),
            path => parse_field(path, value)?,
        });
    }
    Ok(match clauses.len() {
        0 => Filter::All,
        1 => clauses.remove(0),
        _ => Filter::And(clauses),
    })
}

fn parse_list(key: &str, value: &Value) -> Result<Vec<Filter>, DomainError> {
    match value {
        Value::Array(items) if !items.is_empty() => items.iter().map(Filter::parse).collect(),
        _ => Err(invalid(format!("{key} expects a non-empty array"))),
    }
}

fn is_operator_object(map: &Map<String, Value>) -> bool {
    !map.is_empty() && map.keys().all(|k| k.starts_with('$'))
}

fn parse_field(path: &str, value: &Value) -> Result<Filter, DomainError> {
    let Value::Object(operators) = value else {
        return Ok(Filter::eq(path, value.clone()));
    };
    if !is_operator_object(operators) {
        return Ok(Filter::eq(path, value.clone()));
    }

    let case_insensitive = match operators.get("$options") {
        None => false,
        Some(Value::String(options)) if options.chars().all(|c| c == 'i') => !options.is_empty(),
        Some(other) => return Err(invalid(format!("unsupported $options {other}"))),
    };

    let mut clauses = Vec::with_capacity(operators.len());
    for (op, operand) in operators {
        let condition = match op.as_str() {
            "$eq" => Condition::Eq(operand.clone()),
            "$ne" => Condition::Ne(operand.clone()),
            "$gt" => Condition::Gt(operand.clone()),
            "$gte" => Condition::Gte(operand.clone()),
            "$lt" => Condition::Lt(operand.clone()),
            "$lte" => Condition::Lte(operand.clone()),
            "$in" => Condition::In(array_operand(op, operand)?),
            "$nin" => Condition::Nin(array_operand(op, operand)?),
            "$exists" => match operand {
                Value::Bool(present) => Condition::Exists(*present),
                _ => return Err(invalid("$exists expects a boolean")),
            },
            "$regex" => {
                let Value::String(pattern) = operand else {
                    return Err(invalid("$regex expects a string"));
                };
                let regex = RegexBuilder::new(pattern)
                    .case_insensitive(case_insensitive)
                    .build()
                    .map_err(|e| invalid(format!("bad $regex: {e}")))?;
                Condition::Regex(regex)
            }
            "$not" => {
                match operand {
                    Value::Object(inner) if is_operator_object(inner) => {
                        clauses.push(Filter::Not(Box::new(parse_field(path, operand)?)));
                    }
                    _ => return Err(invalid("$not inside a field expects an operator object")),
                }
                continue;
            }
            "$options" => continue,
            other => return Err(invalid(format!("unknown operator {other}"))),
        };
        clauses.push(Filter::Field {
            path: path.to_owned(),
            condition,
        });
    }

    Ok(match clauses.len() {
        0 => return Err(invalid("$options without $regex")),
        1 => clauses.remove(0),
        _ => Filter::And(clauses),
    })
}

fn array_operand(op: &str, operand: &Value) -> Result<Vec<Value>, DomainError> {
    match operand {
        Value::Array(values) => Ok(values.clone()),
        _ => Err(invalid(format!("{op} expects an array"))),
    }
}

/// Resolves a dotted path. Returns `None` when any segment is missing.
fn lookup<'a>(document: &'a Value, path: &str) -> Option<&'a Value> {
    path.split('.').try_fold(document, |current, segment| match current {
        Value::Object(map) => map.get(segment),
        Value::Array(items) => segment.parse::<usize>().ok().and_then(|i| items.get(i)),
        _ => None,
    })
}

impl Condition {
    fn matches(&self, field: Option<&Value>) -> bool {
        match self {
            Self::Eq(expected) => field.is_some_and(|value| contains_or_equals(value, expected)),
            Self::Ne(expected) => !field.is_some_and(|value| contains_or_equals(value, expected)),
            Self::Gt(bound) => compares(field, bound, |o| o == Ordering::Greater),
            Self::Gte(bound) => compares(field, bound, |o| o != Ordering::Less),
            Self::Lt(bound) => compares(field, bound, |o| o == Ordering::Less),
            Self::Lte(bound) => compares(field, bound, |o| o != Ordering::Greater),
            Self::In(options) => field.is_some_and(|value| {
                options.iter().any(|option| contains_or_equals(value, option))
            }),
            Self::Nin(options) => !field.is_some_and(|value| {
                options.iter().any(|option| contains_or_equals(value, option))
            }),
            Self::Regex(regex) => field.is_some_and(|value| match value {
                Value::String(s) => regex.is_match(s),
                Value::Array(items) => items
                    .iter()
                    .any(|item| item.as_str().is_some_and(|s| regex.is_match(s))),
                _ => false,
            }),
            Self::Exists(present) => field.is_some() == *present,
        }
    }
}

fn contains_or_equals(value: &Value, expected: &Value) -> bool {
    if json_equal(value, expected) {
        return true;
    }
    match value {
        Value::Array(items) if !expected.is_array() => {
            items.iter().any(|item| json_equal(item, expected))
        }
        _ => false,
    }
}

/// Equality that treats `1` and `1.0` as the same number.
fn json_equal(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => x.as_f64() == y.as_f64(),
        (Value::Array(xs), Value::Array(ys)) => {
            xs.len() == ys.len() && xs.iter().zip(ys).all(|(x, y)| json_equal(x, y))
        }
        (Value::Object(xs), Value::Object(ys)) => {
            xs.len() == ys.len()
                && xs
                    .iter()
                    .all(|(k, x)| ys.get(k).is_some_and(|y| json_equal(x, y)))
        }
        _ => a == b,
    }
}

/// Range comparison. Only values of the same kind are comparable.
fn compares(field: Option<&Value>, bound: &Value, accept: impl Fn(Ordering) -> bool) -> bool {
    let Some(value) = field else {
        return false;
    };
    let ordering = match (value, bound) {
        (Value::Number(a), Value::Number(b)) => a.as_f64().partial_cmp(&b.as_f64()),
        (Value::String(a), Value::String(b)) => Some(a.cmp(b)),
        (Value::Bool(a), Value::Bool(b)) => Some(a.cmp(b)),
        _ => None,
    };
    ordering.is_some_and(accept)
}

fn kind_rank(value: Option<&Value>) -> u8 {
    match value {
        None | Some(Value::Null) => 0,
        Some(Value::Bool(_)) => 1,
        Some(Value::Number(_)) => 2,
        Some(Value::String(_)) => 3,
        Some(Value::Array(_)) => 4,
        Some(Value::Object(_)) => 5,
    }
}

/// Total order used for sorting: missing and null first, then booleans,
/// numbers, strings, arrays and objects. Objects compare equal.
fn sort_order(a: Option<&Value>, b: Option<&Value>) -> Ordering {
    let by_kind = kind_rank(a).cmp(&kind_rank(b));
    if by_kind != Ordering::Equal {
        return by_kind;
    }
    match (a, b) {
        (Some(Value::Bool(x)), Some(Value::Bool(y))) => x.cmp(y),
        (Some(Value::Number(x)), Some(Value::Number(y))) => x
            .as_f64()
            .partial_cmp(&y.as_f64())
            .unwrap_or(Ordering::Equal),
        (Some(Value::String(x)), Some(Value::String(y))) => x.cmp(y),
        (Some(Value::Array(xs)), Some(Value::Array(ys))) => xs
            .iter()
            .zip(ys)
            .map(|(x, y)| sort_order(Some(x), Some(y)))
            .find(|o| *o != Ordering::Equal)
            .unwrap_or_else(|| xs.len().cmp(&ys.len())),
        _ => Ordering::Equal,
    }
}

/// Sort direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Direction {
    /// Smallest first.
    #[default]
    Ascending,
    /// Largest first.
    Descending,
}

/// One sort key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SortKey {
    /// Dotted path into the document.
    pub path: String,
    /// Order along this key.
    pub direction: Direction,
}

impl SortKey {
    /// Ascending on `path`.
    #[must_use]
    pub fn asc(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            direction: Direction::Ascending,
        }
    }

    /// Descending on `path`.
    #[must_use]
    pub fn desc(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            direction: Direction::Descending,
        }
    }

    /// Parses `{"field": 1 | -1, ...}` or an array of such objects. Keys of
    /// one object apply in lexical order; use the array form to control
    /// precedence.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::InvalidQuery` if a direction is not `1` or `-1`.
    pub fn parse(document: &Value) -> Result<Vec<Self>, DomainError> {
        match document {
            Value::Null => Ok(Vec::new()),
            Value::Object(map) => map
                .iter()
                .map(|(path, direction)| {
                    let direction = match direction.as_i64() {
                        Some(1) => Direction::Ascending,
                        Some(-1) => Direction::Descending,
                        _ => return Err(invalid(format!("sort direction for {path} must be 1 or -1"))),
                    };
                    Ok(Self {
                        path: path.clone(),
                        direction,
                    })
                })
                .collect(),
            Value::Array(items) => {
                let mut keys = Vec::new();
                for item in items {
                    keys.extend(Self::parse(item)?);
                }
                Ok(keys)
            }
            other => Err(invalid(format!("sort must be an object, got {other}"))),
        }
    }
}

/// How a result set is windowed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Page {
    /// Skip `skip` matches, then return up to `limit`.
    Offset {
        /// Matches to skip.
        skip: usize,
        /// Maximum to return. `None` returns everything.
        limit: Option<usize>,
    },
    /// Return up to `limit` matches whose ID follows `after`. IDs are
    /// time-ordered, so this pages in creation order.
    Cursor {
        /// Last ID of the previous page, `None` for the first page.
        after: Option<Uuid>,
        /// Maximum to return. `None` returns everything.
        limit: Option<usize>,
    },
}

impl Default for Page {
    fn default() -> Self {
        Self::Offset {
            skip: 0,
            limit: Some(DEFAULT_PAGE_LIMIT),
        }
    }
}

/// Filter, sort and page in one value.
#[derive(Debug, Clone, Default)]
pub struct FindQuery {
    /// Which entities qualify.
    pub filter: Filter,
    /// Order of the qualifying entities. Empty keeps creation order.
    pub sort: Vec<SortKey>,
    /// Which window to return.
    pub page: Page,
}

/// One page of a query result.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PageResult {
    /// Number of entities matching the filter, ignoring the window.
    pub total: usize,
    /// Limit that was applied.
    pub limit: Option<usize>,
    /// Offset that was applied, in offset mode.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub skip: Option<usize>,
    /// ID of the last returned entity, to pass as the next `after`.
    pub cursor: Option<Uuid>,
    /// The entities on this page.
    pub data: Vec<Entity>,
}

impl FindQuery {
    /// A query matching `filter` with the default window.
    #[must_use]
    pub fn filtered(filter: Filter) -> Self {
        Self {
            filter,
            ..Self::default()
        }
    }

    /// Parses `{"filter": .., "sort": .., "skip": n, "limit": n, "cursor": id}`.
    /// A `cursor` selects cursor mode; otherwise `skip` applies.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::InvalidQuery` if any part is malformed, or if a
    /// cursor is combined with a sort; see [`FindQuery::validate`].
    pub fn from_document(document: &Value, default_limit: usize) -> Result<Self, DomainError> {
        let empty = Map::new();
        let map = match document {
            Value::Null => &empty,
            Value::Object(map) => map,
            other => return Err(invalid(format!("query must be an object, got {other}"))),
        };
        let filter = Filter::parse(map.get("filter").unwrap_or(&Value::Null))?;
        let sort = SortKey::parse(map.get("sort").unwrap_or(&Value::Null))?;
        let limit = match map.get("limit") {
            None | Some(Value::Null) => Some(default_limit),
            Some(value) => Some(count(value, "limit")?),
        };
        let page = match map.get("cursor") {
            Some(Value::String(after)) => Page::Cursor {
                after: Some(
                    Uuid::parse_str(after).map_err(|e| invalid(format!("bad cursor: {e}")))?,
                ),
                limit,
            },
            None | Some(Value::Null) => Page::Offset {
                skip: match map.get("skip") {
                    None | Some(Value::Null) => 0,
                    Some(value) => count(value, "skip")?,
                },
                limit,
            },
            Some(_) => return Err(invalid("cursor must be an ID string")),
        };
        let query = Self { filter, sort, page };
        query.validate()?;
        Ok(query)
    }

    /// Checks that the parts of the query fit together. A cursor pages by ID,
    /// so it only accepts creation order: no sort, or `id` ascending.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::InvalidQuery` if a cursor is combined with any
    /// other sort.
    pub fn validate(&self) -> Result<(), DomainError> {
        let id_order = match self.sort.as_slice() {
            [] => true,
            [key] => key.path == "id" && key.direction == Direction::Ascending,
            _ => false,
        };
        if matches!(self.page, Page::Cursor { .. }) && !id_order {
            return Err(invalid("cursor paging requires creation order; sort only by id ascending"));
        }
        Ok(())
    }

    /// Returns `true` if the filter or any sort key reads `path` or a path
    /// below it.
    #[must_use]
    pub fn references(&self, path: &str) -> bool {
        self.filter.references(path) || self.sort.iter().any(|key| is_within(&key.path, path))
    }

    /// Runs the query over `state`. Call [`FindQuery::validate`] first when
    /// the query was built by hand: a cursor under another sort would skip
    /// or repeat rows between pages.
    #[must_use]
    pub fn apply(&self, state: &ProjectionState) -> PageResult {
        let mut matches: Vec<(&Entity, Value)> = state
            .iter()
            .map(|entity| (entity, entity.to_document()))
            .filter(|(_, document)| self.filter.matches(document))
            .collect();
        let total = matches.len();

        if !self.sort.is_empty() {
            matches.sort_by(|(_, a), (_, b)| {
                self.sort
                    .iter()
                    .map(|key| {
                        let ordering = sort_order(lookup(a, &key.path), lookup(b, &key.path));
                        match key.direction {
                            Direction::Ascending => ordering,
                            Direction::Descending => ordering.reverse(),
                        }
                    })
                    .find(|o| *o != Ordering::Equal)
                    .unwrap_or(Ordering::Equal)
            });
        }

        let (window, limit, skip): (Vec<&Entity>, _, _) = match self.page {
            Page::Offset { skip, limit } => (
                matches
                    .iter()
                    .skip(skip)
                    .take(limit.unwrap_or(usize::MAX))
                    .map(|(entity, _)| *entity)
                    .collect(),
                limit,
                Some(skip),
            ),
            Page::Cursor { after, limit } => (
                matches
                    .iter()
                    .filter(|(entity, _)| after.is_none_or(|after| entity.id > after))
                    .take(limit.unwrap_or(usize::MAX))
                    .map(|(entity, _)| *entity)
                    .collect(),
                limit,
                None,
            ),
        };

        PageResult {
            total,
            limit,
            skip,
            cursor: window.last().map(|entity| entity.id),
            data: window.into_iter().cloned().collect(),
        }
    }
}

fn count(value: &Value, name: &str) -> Result<usize, DomainError> {
    value
        .as_u64()
        .and_then(|n| usize::try_from(n).ok())
        .ok_or_else(|| invalid(format!("{name} must be a non-negative integer")))
}
