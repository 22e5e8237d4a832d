//! Document, query, and field-operation types exchanged with the remote store.

use serde_json::{Map, Value};
use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::fmt;

/// Field name of the server-assigned creation timestamp.
pub const CREATED_AT: &str = "createdAt";
/// Field name of the advisory last-write timestamp.
pub const LAST_UPDATED_AT: &str = "lastUpdatedAt";
/// Field name of the advisory last writer.
pub const LAST_UPDATED_BY: &str = "lastUpdatedBy";
/// Field name of the owning principal.
pub const OWNER_ID: &str = "ownerId";
/// Field name of the membership set.
pub const MEMBER_IDS: &str = "memberIds";
/// Field name of the goal amount.
pub const TARGET: &str = "target";
/// Field name of the accent color.
pub const COLOR: &str = "color";

/// Location of a single document.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DocumentPath {
    /// Collection the document lives in
    pub collection: String,
    /// Document id within the collection
    pub id: String,
}

impl DocumentPath {
    /// Builds a path from a collection name and id.
    pub fn new(collection: impl Into<String>, id: impl Into<String>) -> Self {
        Self {
            collection: collection.into(),
            id: id.into(),
        }
    }
}

impl fmt::Display for DocumentPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.collection, self.id)
    }
}

/// A document as delivered in a snapshot. The body is untyped; decoding happens at the
/// subscription boundary.
#[derive(Debug, Clone, PartialEq)]
pub struct Document {
    /// Store-assigned id
    pub id: String,
    /// Raw field map
    pub data: Map<String, Value>,
}

impl Document {
    /// Builds a document from an id and a JSON object. Non-object values yield an empty body.
    pub fn new(id: impl Into<String>, data: Value) -> Self {
        let data = match data {
            Value::Object(map) => map,
            _ => Map::new(),
        };
        Self {
            id: id.into(),
            data,
        }
    }

    /// Returns a field, if present.
    #[must_use]
    pub fn get(&self, field: &str) -> Option<&Value> {
        self.data.get(field)
    }
}

/// A single field write. Atomic operators are resolved by the store against the stored
/// value, never against a locally cached copy.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    /// Overwrite with a literal value
    Set(Value),
    /// Add a delta to the stored number (missing or non-numeric counts as 0)
    Increment(f64),
    /// Add each value not already present in the stored array
    ArrayUnion(Vec<Value>),
    /// Remove every occurrence of each value from the stored array
    ArrayRemove(Vec<Value>),
    /// Replace with the store's commit timestamp
    ServerTimestamp,
    /// Remove the field
    Delete,
}

impl FieldValue {
    /// Literal string field.
    pub fn string(value: impl Into<String>) -> Self {
        Self::Set(Value::String(value.into()))
    }

    /// Literal numeric field. Non-finite numbers are written as `null`.
    #[must_use]
    pub fn number(value: f64) -> Self {
        Self::Set(serde_json::Number::from_f64(value).map_or(Value::Null, Value::Number))
    }
}

/// Field writes keyed by field name.
pub type FieldMap = BTreeMap<String, FieldValue>;

/// Server-side filter attached to a query.
#[derive(Debug, Clone, PartialEq)]
pub enum Filter {
    /// Array field contains the value
    ArrayContains {
        /// Array field name
        field: String,
        /// Value that must be present
        value: Value,
    },
    /// Field equals one of the values
    In {
        /// Field name
        field: String,
        /// Accepted values
        values: Vec<Value>,
    },
    /// Field equals the value
    Equals {
        /// Field name
        field: String,
        /// Required value
        value: Value,
    },
}

impl Filter {
    /// Whether a document body satisfies the filter.
    #[must_use]
    pub fn matches(&self, data: &Map<String, Value>) -> bool {
        match self {
            Self::ArrayContains { field, value } => data
                .get(field)
                .and_then(Value::as_array)
                .is_some_and(|items| items.contains(value)),
            Self::In { field, values } => data.get(field).is_some_and(|v| values.contains(v)),
            Self::Equals { field, value } => data.get(field) == Some(value),
        }
    }
}

/// Sort direction for [`OrderBy`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// Smallest first
    Ascending,
    /// Largest first
    Descending,
}

/// Sort clause attached to a query.
#[derive(Debug, Clone, PartialEq)]
pub struct OrderBy {
    /// Field to sort on
    pub field: String,
    /// Sort direction
    pub direction: Direction,
}

/// A filtered, ordered collection query.
#[derive(Debug, Clone, PartialEq)]
pub struct Query {
    /// Collection to read
    pub collection: String,
    /// Optional server-side filter
    pub filter: Option<Filter>,
    /// Optional ordering
    pub order_by: Option<OrderBy>,
}

impl Query {
    /// Unfiltered, unordered query over a collection.
    pub fn collection(collection: impl Into<String>) -> Self {
        Self {
            collection: collection.into(),
            filter: None,
            order_by: None,
        }
    }

    /// Attaches a filter.
    #[must_use]
    pub fn filter(mut self, filter: Filter) -> Self {
        self.filter = Some(filter);
        self
    }

    /// Attaches an ordering.
    #[must_use]
    pub fn order_by(mut self, field: impl Into<String>, direction: Direction) -> Self {
        self.order_by = Some(OrderBy {
            field: field.into(),
            direction,
        });
        self
    }
}

/// Total order over JSON values used for query ordering: missing/null first, then booleans,
/// numbers, strings; arrays and objects compare equal.
#[must_use]
pub fn compare_values(a: Option<&Value>, b: Option<&Value>) -> Ordering {
    const fn rank(value: Option<&Value>) -> u8 {
        match value {
            None | Some(Value::Null) => 0,
            Some(Value::Bool(_)) => 1,
            Some(Value::Number(_)) => 2,
            Some(Value::String(_)) => 3,
            Some(Value::Array(_) | Value::Object(_)) => 4,
        }
    }

    match (a, b) {
        (Some(Value::Bool(x)), Some(Value::Bool(y))) => x.cmp(y),
        (Some(Value::Number(x)), Some(Value::Number(y))) => {
            let x = x.as_f64().unwrap_or(0.0);
            let y = y.as_f64().unwrap_or(0.0);
            x.total_cmp(&y)
        }
        (Some(Value::String(x)), Some(Value::String(y))) => x.cmp(y),
        _ => rank(a).cmp(&rank(b)),
    }
}
