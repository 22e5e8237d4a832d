//! Shared resource model - buckets and trips.
//!
//! A shared resource is a savings goal with an owner and a member set. Buckets and trips
//! differ only in their collection and in the names of two persisted fields, so a single
//! [`SharedResource`] type covers both and [`ResourceKind`] carries the differences.
//!
//! Documents arriving from the store are decoded defensively: a malformed document never
//! fails to decode, it degrades to safe defaults.

use crate::{
    errors::{Error, Result},
    remote::document::{
        COLOR, CREATED_AT, Document, FieldMap, FieldValue, LAST_UPDATED_AT,
        LAST_UPDATED_BY, MEMBER_IDS, OWNER_ID, TARGET,
    },
};
use chrono::{DateTime, Utc};
use serde_json::{Map, Value};
use std::fmt;

/// The two kinds of shared savings goal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResourceKind {
    /// Personal or shared budgeting category
    Bucket,
    /// Group savings goal
    Trip,
}

impl ResourceKind {
    /// Collection the documents live in.
    #[must_use]
    pub const fn collection(self) -> &'static str {
        match self {
            Self::Bucket => "buckets",
            Self::Trip => "trips",
        }
    }

    /// Persisted name of the display-name field.
    #[must_use]
    pub const fn name_field(self) -> &'static str {
        match self {
            Self::Bucket => "name",
            Self::Trip => "title",
        }
    }

    /// Persisted name of the running-balance field.
    #[must_use]
    pub const fn balance_field(self) -> &'static str {
        match self {
            Self::Bucket => "balance",
            Self::Trip => "saved",
        }
    }

    /// Kind stored in the given collection, if any.
    #[must_use]
    pub fn from_collection(collection: &str) -> Option<Self> {
        match collection {
            "buckets" => Some(Self::Bucket),
            "trips" => Some(Self::Trip),
            _ => None,
        }
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bucket => f.write_str("bucket"),
            Self::Trip => f.write_str("trip"),
        }
    }
}

/// Fixed accent palette. Purely cosmetic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AccentColor {
    /// `#3B82F6`
    Blue,
    /// `#10B981`
    Green,
    /// `#F59E0B`
    Amber,
    /// `#EF4444`
    Red,
    /// `#8B5CF6`
    Violet,
    /// `#EC4899`
    Pink,
    /// `#14B8A6`
    Teal,
    /// `#64748B`
    Slate,
}

impl AccentColor {
    /// Every palette entry, in picker order.
    pub const ALL: [Self; 8] = [
        Self::Blue,
        Self::Green,
        Self::Amber,
        Self::Red,
        Self::Violet,
        Self::Pink,
        Self::Teal,
        Self::Slate,
    ];

    /// Persisted hex form.
    #[must_use]
    pub const fn as_hex(self) -> &'static str {
        match self {
            Self::Blue => "#3B82F6",
            Self::Green => "#10B981",
            Self::Amber => "#F59E0B",
            Self::Red => "#EF4444",
            Self::Violet => "#8B5CF6",
            Self::Pink => "#EC4899",
            Self::Teal => "#14B8A6",
            Self::Slate => "#64748B",
        }
    }

    /// Parses a persisted hex string (case-insensitive). Unknown values yield `None`.
    #[must_use]
    pub fn from_hex(hex: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|color| color.as_hex().eq_ignore_ascii_case(hex.trim()))
    }
}

/// A bucket or trip as held in the local collection.
#[derive(Debug, Clone, PartialEq)]
pub struct SharedResource {
    /// Which collection this came from
    pub kind: ResourceKind,
    /// Store-assigned id
    pub id: String,
    /// Display name (`name` for buckets, `title` for trips)
    pub name: String,
    /// Goal amount; 0 means no goal
    pub target: f64,
    /// Running total (`balance` for buckets, `saved` for trips)
    pub balance: f64,
    /// Optional accent color
    pub color: Option<AccentColor>,
    /// Creator; immutable
    pub owner_id: String,
    /// Membership set, owner included
    pub member_ids: Vec<String>,
    /// Server-assigned creation time, used for ordering only
    pub created_at: Option<DateTime<Utc>>,
    /// Advisory time of the last write
    pub last_updated_at: Option<DateTime<Utc>>,
    /// Advisory id of the last writer
    pub last_updated_by: Option<String>,
}

impl SharedResource {
    /// Decodes a snapshot document. Missing or malformed numbers become 0, missing arrays
    /// become empty, missing strings become empty; duplicate member ids are dropped.
    #[must_use]
    pub fn decode(kind: ResourceKind, document: &Document) -> Self {
        let data = &document.data;
        Self {
            kind,
            id: document.id.clone(),
            name: string_field(data, kind.name_field()),
            target: number_field(data, TARGET),
            balance: number_field(data, kind.balance_field()),
            color: data
                .get(COLOR)
                .and_then(Value::as_str)
                .and_then(AccentColor::from_hex),
            owner_id: string_field(data, OWNER_ID),
            member_ids: string_array_field(data, MEMBER_IDS),
            created_at: timestamp_field(data, CREATED_AT),
            last_updated_at: timestamp_field(data, LAST_UPDATED_AT),
            last_updated_by: data
                .get(LAST_UPDATED_BY)
                .and_then(Value::as_str)
                .map(str::to_string),
        }
    }

    /// Whether a goal amount is set.
    #[must_use]
    pub fn has_goal(&self) -> bool {
        self.target > 0.0
    }
}

/// Input for creating a bucket or trip.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct NewResource {
    /// Display name; trimmed before saving
    pub name: String,
    /// Optional goal; must be finite and positive when present
    pub target: Option<f64>,
    /// Optional starting balance; must be finite and non-negative when present
    pub initial_balance: Option<f64>,
    /// Optional accent color
    pub color: Option<AccentColor>,
}

impl NewResource {
    /// A goal with just a name.
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    /// Sets the goal amount.
    #[must_use]
    pub fn with_target(mut self, target: f64) -> Self {
        self.target = Some(target);
        self
    }

    /// Sets the accent color.
    #[must_use]
    pub fn with_color(mut self, color: AccentColor) -> Self {
        self.color = Some(color);
        self
    }

    /// Checks the input and returns the trimmed name.
    pub fn validate(&self) -> Result<String> {
        let name = validate_name(&self.name)?;
        if let Some(target) = self.target {
            validate_target(target)?;
        }
        if let Some(balance) = self.initial_balance {
            validate_balance(balance)?;
        }
        Ok(name)
    }

    /// Field writes for the new document. `ownerId` and the sole member are the creator;
    /// timestamps are requested from the store.
    pub fn to_fields(&self, kind: ResourceKind, owner_id: &str) -> Result<FieldMap> {
        let name = self.validate()?;
        let mut fields = FieldMap::new();
        fields.insert(kind.name_field().to_string(), FieldValue::string(name));
        fields.insert(
            TARGET.to_string(),
            FieldValue::number(self.target.unwrap_or(0.0)),
        );
        fields.insert(
            kind.balance_field().to_string(),
            FieldValue::number(self.initial_balance.unwrap_or(0.0)),
        );
        fields.insert(COLOR.to_string(), color_value(self.color));
        fields.insert(OWNER_ID.to_string(), FieldValue::string(owner_id));
        fields.insert(
            MEMBER_IDS.to_string(),
            FieldValue::Set(Value::Array(vec![Value::String(owner_id.to_string())])),
        );
        fields.insert(CREATED_AT.to_string(), FieldValue::ServerTimestamp);
        stamp_update(&mut fields, owner_id);
        Ok(fields)
    }
}

/// Owner edit of a bucket or trip. `None` leaves a field unchanged.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ResourceUpdate {
    /// New display name
    pub name: Option<String>,
    /// `Some(None)` removes the goal; `Some(Some(x))` sets it
    pub target: Option<Option<f64>>,
    /// Corrected balance, written as-is
    pub balance: Option<f64>,
    /// `Some(None)` clears the color
    pub color: Option<Option<AccentColor>>,
}

impl ResourceUpdate {
    /// Whether the update changes nothing.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.name.is_none()
            && self.target.is_none()
            && self.balance.is_none()
            && self.color.is_none()
    }

    /// Validates and converts to field writes, stamped with the editor.
    pub fn to_fields(&self, kind: ResourceKind, editor_id: &str) -> Result<FieldMap> {
        let mut fields = FieldMap::new();
        if let Some(name) = &self.name {
            fields.insert(
                kind.name_field().to_string(),
                FieldValue::string(validate_name(name)?),
            );
        }
        if let Some(target) = self.target {
            let value = match target {
                Some(target) => validate_target(target)?,
                None => 0.0,
            };
            fields.insert(TARGET.to_string(), FieldValue::number(value));
        }
        if let Some(balance) = self.balance {
            fields.insert(
                kind.balance_field().to_string(),
                FieldValue::number(validate_balance(balance)?),
            );
        }
        if let Some(color) = self.color {
            let value = color.map_or(FieldValue::Delete, |c| FieldValue::string(c.as_hex()));
            fields.insert(COLOR.to_string(), value);
        }
        stamp_update(&mut fields, editor_id);
        Ok(fields)
    }
}

/// Trims a display name, rejecting empty input.
pub fn validate_name(name: &str) -> Result<String> {
    let trimmed = name.trim();
    if trimmed.is_empty() {
        return Err(Error::validation("Name cannot be empty"));
    }
    Ok(trimmed.to_string())
}

/// A goal must be a finite number greater than zero.
pub fn validate_target(target: f64) -> Result<f64> {
    if !target.is_finite() || target <= 0.0 {
        return Err(Error::validation(format!(
            "Target must be a positive number, got {target}"
        )));
    }
    Ok(target)
}

/// A balance must be a finite number, zero or more.
pub fn validate_balance(balance: f64) -> Result<f64> {
    if !balance.is_finite() || balance < 0.0 {
        return Err(Error::validation(format!(
            "Balance must be zero or more, got {balance}"
        )));
    }
    Ok(balance)
}

/// A contribution must be a finite number greater than zero.
pub fn validate_contribution(amount: f64) -> Result<f64> {
    if !amount.is_finite() || amount <= 0.0 {
        return Err(Error::InvalidAmount { amount });
    }
    Ok(amount)
}

/// Adds the advisory last-write fields.
pub fn stamp_update(fields: &mut FieldMap, writer_id: &str) {
    fields.insert(LAST_UPDATED_AT.to_string(), FieldValue::ServerTimestamp);
    fields.insert(LAST_UPDATED_BY.to_string(), FieldValue::string(writer_id));
}

fn color_value(color: Option<AccentColor>) -> FieldValue {
    color.map_or(FieldValue::Set(Value::Null), |c| FieldValue::string(c.as_hex()))
}

pub(crate) fn string_field(data: &Map<String, Value>, field: &str) -> String {
    data.get(field)
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string()
}

pub(crate) fn number_field(data: &Map<String, Value>, field: &str) -> f64 {
    data.get(field)
        .and_then(Value::as_f64)
        .filter(|n| n.is_finite())
        .unwrap_or(0.0)
}

pub(crate) fn string_array_field(data: &Map<String, Value>, field: &str) -> Vec<String> {
    let mut values: Vec<String> = Vec::new();
    if let Some(items) = data.get(field).and_then(Value::as_array) {
        for item in items.iter().filter_map(Value::as_str) {
            if !values.iter().any(|existing| existing == item) {
                values.push(item.to_string());
            }
        }
    }
    values
}

/// Accepts RFC 3339 strings and epoch milliseconds.
pub(crate) fn timestamp_field(data: &Map<String, Value>, field: &str) -> Option<DateTime<Utc>> {
    match data.get(field)? {
        Value::String(raw) => DateTime::parse_from_rfc3339(raw)
            .ok()
            .map(|parsed| parsed.with_timezone(&Utc)),
        Value::Number(millis) => millis
            .as_i64()
            .and_then(DateTime::<Utc>::from_timestamp_millis),
        _ => None,
    }
}
