//! Structured queries against the remote store.
//!
//! Queries are built as plain values and rendered to OData options by the
//! HTTP store, or evaluated directly by the in-memory store.

use serde_json::{Map, Value};
use std::cmp::Ordering;
use std::fmt;

/// Remote entity sets this crate reads or writes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Resource {
    Application,
    Release,
    Image,
    Service,
    ReleaseTag,
    ImageIsPartOfRelease,
}

impl Resource {
    pub fn as_str(&self) -> &'static str {
        match self {
            Resource::Application => "application",
            Resource::Release => "release",
            Resource::Image => "image",
            Resource::Service => "service",
            Resource::ReleaseTag => "release_tag",
            Resource::ImageIsPartOfRelease => "image__is_part_of__release",
        }
    }
}

impl fmt::Display for Resource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Filter {
    Eq(String, Value),
    Ne(String, Value),
    And(Vec<Filter>),
    Or(Vec<Filter>),
}

impl Filter {
    pub fn eq(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Filter::Eq(field.into(), value.into())
    }

    pub fn ne(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Filter::Ne(field.into(), value.into())
    }

    pub fn and(filters: impl IntoIterator<Item = Filter>) -> Self {
        Filter::And(filters.into_iter().collect())
    }

    pub fn or(filters: impl IntoIterator<Item = Filter>) -> Self {
        Filter::Or(filters.into_iter().collect())
    }

    /// Every field of `key` must equal the corresponding value
    pub fn from_natural_key(key: &Map<String, Value>) -> Self {
        Filter::And(
            key.iter()
                .map(|(field, value)| Filter::Eq(field.clone(), value.clone()))
                .collect(),
        )
    }

    pub fn matches(&self, row: &Map<String, Value>) -> bool {
        match self {
            Filter::Eq(field, expected) => values_equal(row.get(field).unwrap_or(&Value::Null), expected),
            Filter::Ne(field, expected) => !values_equal(row.get(field).unwrap_or(&Value::Null), expected),
            Filter::And(filters) => filters.iter().all(|f| f.matches(row)),
            Filter::Or(filters) => filters.iter().any(|f| f.matches(row)),
        }
    }

    pub fn to_odata(&self) -> String {
        match self {
            Filter::Eq(field, value) => format!("{field} eq {}", odata_literal(value)),
            Filter::Ne(field, value) => format!("{field} ne {}", odata_literal(value)),
            Filter::And(filters) => join_odata(filters, " and "),
            Filter::Or(filters) => join_odata(filters, " or "),
        }
    }
}

fn join_odata(filters: &[Filter], separator: &str) -> String {
    filters
        .iter()
        .map(|f| match f {
            Filter::Eq(..) | Filter::Ne(..) => f.to_odata(),
            _ => format!("({})", f.to_odata()),
        })
        .collect::<Vec<_>>()
        .join(separator)
}

fn odata_literal(value: &Value) -> String {
    match value {
        Value::Null => "null".to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        Value::String(s) => format!("'{}'", s.replace('\'', "''")),
        other => format!("'{}'", other.to_string().replace('\'', "''")),
    }
}

/// Equality that treats `1` and `1.0` as the same number
pub fn values_equal(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => x.as_f64() == y.as_f64(),
        _ => a == b,
    }
}

/// Total order used for `$orderby`: booleans, numbers, strings, then nulls.
///
/// Nulls sort above every value, as on the remote backend, so a descending
/// order returns them first.
pub fn compare_values(a: &Value, b: &Value) -> Ordering {
    fn rank(v: &Value) -> u8 {
        match v {
            Value::Bool(_) => 0,
            Value::Number(_) => 1,
            Value::String(_) => 2,
            Value::Array(_) => 3,
            Value::Object(_) => 4,
            Value::Null => 5,
        }
    }
    match (a, b) {
        (Value::Bool(x), Value::Bool(y)) => x.cmp(y),
        (Value::Number(x), Value::Number(y)) => x
            .as_f64()
            .partial_cmp(&y.as_f64())
            .unwrap_or(Ordering::Equal),
        (Value::String(x), Value::String(y)) => x.cmp(y),
        _ => rank(a).cmp(&rank(b)),
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderBy {
    pub field: String,
    pub descending: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Expand {
    pub navigation: String,
    pub query: Query,
}

impl Expand {
    pub fn new(navigation: impl Into<String>, query: Query) -> Self {
        Self {
            navigation: navigation.into(),
            query,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct Query {
    pub filter: Option<Filter>,
    pub select: Vec<String>,
    pub expand: Vec<Expand>,
    pub top: Option<usize>,
    pub order_by: Option<OrderBy>,
}

impl Query {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn filter(mut self, filter: Filter) -> Self {
        self.filter = Some(filter);
        self
    }

    pub fn select(mut self, fields: &[&str]) -> Self {
        self.select = fields.iter().map(|f| f.to_string()).collect();
        self
    }

    pub fn expand(mut self, expand: Expand) -> Self {
        self.expand.push(expand);
        self
    }

    pub fn top(mut self, top: usize) -> Self {
        self.top = Some(top);
        self
    }

    pub fn order_by_desc(mut self, field: impl Into<String>) -> Self {
        self.order_by = Some(OrderBy {
            field: field.into(),
            descending: true,
        });
        self
    }

    pub fn order_by_asc(mut self, field: impl Into<String>) -> Self {
        self.order_by = Some(OrderBy {
            field: field.into(),
            descending: false,
        });
        self
    }

    /// Top-level OData query parameters
    pub fn to_odata_params(&self) -> Vec<(String, String)> {
        self.options()
            .into_iter()
            .map(|(k, v)| (k.to_string(), v))
            .collect()
    }

    fn options(&self) -> Vec<(&'static str, String)> {
        let mut options = Vec::new();
        if let Some(filter) = &self.filter {
            options.push(("$filter", filter.to_odata()));
        }
        if !self.select.is_empty() {
            options.push(("$select", self.select.join(",")));
        }
        if !self.expand.is_empty() {
            let expand = self
                .expand
                .iter()
                .map(render_expand)
                .collect::<Vec<_>>()
                .join(",");
            options.push(("$expand", expand));
        }
        if let Some(top) = self.top {
            options.push(("$top", top.to_string()));
        }
        if let Some(order) = &self.order_by {
            let direction = if order.descending { "desc" } else { "asc" };
            options.push(("$orderby", format!("{} {}", order.field, direction)));
        }
        options
    }
}

fn render_expand(expand: &Expand) -> String {
    let options = expand.query.options();
    if options.is_empty() {
        return expand.navigation.clone();
    }
    let inner = options
        .into_iter()
        .map(|(k, v)| format!("{k}={v}"))
        .collect::<Vec<_>>()
        .join(";");
    format!("{}({})", expand.navigation, inner)
}
