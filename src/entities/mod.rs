//! Entity module - `SeaORM` entity definitions backing the reference document store.

pub mod document;

pub use document::{Column as DocumentColumn, Entity as DocumentEntity, Model as DocumentModel};
