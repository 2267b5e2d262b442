//! redkin keeps one-to-many (parent → children) entity associations synchronized with a
//! hash/range-keyed sorted key-value store: every child of a parent is stored under a
//! partition key equal to the parent's id and ordered among its siblings by a range key.
//!
//! The store itself sits behind the [`StoreClient`] trait (paged range query, idempotent
//! upsert, idempotent delete); a [Redb](https://github.com/cberner/redb)-backed client is
//! provided as [`RedbStore`]. Child payloads are encoded with `bincode` via serde.
//!
//! A parent type declares one `static` [`RelationDef`] and embeds one [`HasMany`] slot per
//! relation, then delegates to it from its accessors and lifecycle hooks: lazy cached
//! loading on first access, write-back reconciliation after the parent's own attributes
//! are persisted, cascade delete before the parent's own row is removed, and a reset on
//! reload. Reads run through [`ChildScan`], which pages through the child set in fixed-size
//! batches so cascade and reconciliation passes never hold more than one page plus the
//! in-memory child list.

pub mod association;
pub mod entity;
pub mod error;
pub mod logger;
pub mod scan;
pub mod store;

pub use association::{HasMany, RelationDef};
pub use entity::{mint_range_key, ChildEntity};
pub use error::AppError;
pub use scan::{ChildScan, DEFAULT_BATCH_SIZE, RANGE_KEY_FLOOR};
pub use store::{Page, RawRecord, RedbStore, StoreClient};

pub use bincode;
pub use chrono;
pub use rand;
pub use redb;
pub use serde;
