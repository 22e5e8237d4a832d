//! Document entity - one row per stored document.
//! The body is kept as a JSON object; field-level atomic operations are resolved by the
//! store before the row is written.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Stored document, keyed by collection and id
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "documents")]
pub struct Model {
    /// Collection name (e.g., `"buckets"`)
    #[sea_orm(primary_key, auto_increment = false)]
    pub collection: String,
    /// Store-assigned or caller-chosen document id
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: String,
    /// Document body as a JSON object
    pub data: Json,
    /// When the row was first written
    pub created_at: DateTimeUtc,
    /// When the row was last written
    pub updated_at: DateTimeUtc,
}

/// Documents are self-contained
#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
