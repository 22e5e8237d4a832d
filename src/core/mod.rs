//! Framework-agnostic core: resource model, sync engines, guard, and derived aggregates.

/// Pending/error tracking for mutation surfaces
pub mod actions;
/// Totals, progress, and ranking over a snapshot
pub mod aggregate;
/// Owner/member permission predicates
pub mod authorization;
/// Generic live collection with subscription lifecycle
pub mod live;
/// Principal and public profile types
pub mod principal;
/// Public profile mirror and member display
pub mod profiles;
/// Buckets, trips, and their write payloads
pub mod resource;
/// Auth-driven session wiring
pub mod session;
/// Per-kind sync engine
pub mod sync;
