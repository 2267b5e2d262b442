use crate::entity::ChildEntity;
use crate::error::AppError;
use crate::scan::{ChildScan, DEFAULT_BATCH_SIZE, RANGE_KEY_FLOOR};
use crate::store::StoreClient;
use std::collections::HashSet;

/// Immutable per-relation descriptor, declared once as a `static` where the
/// parent type is defined and shared by every instance's [`HasMany`] slot.
#[derive(Debug, Clone, Copy)]
pub struct RelationDef {
    pub name: &'static str,
    pub batch_size: usize,
}

impl RelationDef {
    pub const fn new(name: &'static str) -> Self {
        RelationDef { name, batch_size: DEFAULT_BATCH_SIZE }
    }

    pub const fn with_batch_size(name: &'static str, batch_size: usize) -> Self {
        RelationDef { name, batch_size }
    }
}

enum Slot<C> {
    Unloaded,
    Loaded(Vec<C>),
}

/// Per-parent-instance association slot for one has-many relation.
///
/// `Unloaded` means "never examined in this session"; `Loaded` holds the
/// exclusively owned, range-key-ordered child sequence. The slot only goes
/// back to `Unloaded` through [`HasMany::reset`] (the parent's reload hook);
/// it is never silently invalidated, and once loaded no read touches the
/// store again unless a caller forces a reload.
///
/// The parent type embeds one `HasMany` field per declared relation, passes
/// its committed id (`None` while it is a new record) into every call, and
/// delegates from its lifecycle hooks: [`HasMany::write_back`] after its own
/// attributes are durably saved, [`HasMany::cascade_destroy`] before its own
/// row is removed, [`HasMany::reset`] on reload.
pub struct HasMany<C: ChildEntity> {
    def: &'static RelationDef,
    slot: Slot<C>,
}

impl<C: ChildEntity> HasMany<C> {
    pub fn new(def: &'static RelationDef) -> Self {
        HasMany { def, slot: Slot::Unloaded }
    }

    pub fn is_loaded(&self) -> bool {
        matches!(self.slot, Slot::Loaded(_))
    }

    /// Returns the children, loading them from the store on first access.
    ///
    /// A loaded slot is returned as-is with no I/O unless `force_reload` is
    /// set. A new parent (`parent_id = None`) yields an empty slice without a
    /// store call and leaves the slot unloaded, so the first access after the
    /// parent is persisted queries the store.
    pub fn load<S: StoreClient>(
        &mut self,
        parent_id: Option<&str>,
        store: &S,
        force_reload: bool,
    ) -> Result<&[C], AppError> {
        if force_reload {
            self.slot = Slot::Unloaded;
        }
        if matches!(self.slot, Slot::Unloaded) {
            let Some(parent_id) = parent_id else { return Ok(&[]) };
            let mut children = Vec::new();
            for record in ChildScan::new(store, C::COLLECTION, parent_id, RANGE_KEY_FLOOR, self.def.batch_size) {
                children.push(C::hydrate(&record?)?);
            }
            self.slot = Slot::Loaded(children);
        }
        match &self.slot {
            Slot::Loaded(children) => Ok(children.as_slice()),
            Slot::Unloaded => Ok(&[]),
        }
    }

    /// Replaces the in-memory child sequence and marks the slot loaded. An
    /// empty vec means "explicitly no children", which is distinct from an
    /// unloaded slot. No I/O; a child already bound to a different partition
    /// key than this parent is rejected before anything else happens.
    pub fn set(&mut self, parent_id: Option<&str>, children: Vec<C>) -> Result<(), AppError> {
        for child in &children {
            if let Some(bound) = child.partition_key() {
                let owned_by_us = parent_id == Some(bound);
                if !owned_by_us {
                    return Err(AppError::AssociationTypeMismatch(format!(
                        "relation {}: child is bound to partition key {bound}, expected {}",
                        self.def.name,
                        parent_id.unwrap_or("<new parent>"),
                    )));
                }
            }
        }
        self.slot = Slot::Loaded(children);
        Ok(())
    }

    /// Loads lazily, then reports whether any child exists.
    pub fn is_present<S: StoreClient>(&mut self, parent_id: Option<&str>, store: &S) -> Result<bool, AppError> {
        Ok(!self.load(parent_id, store, false)?.is_empty())
    }

    /// Reconciles the store's child set to the in-memory one. Invoked from the
    /// parent's persist path, after the parent's own attributes are durable.
    ///
    /// An unloaded slot was never examined or assigned in this session, so the
    /// relation is skipped outright: no queries, no writes. Otherwise every
    /// in-memory child is saved first (unbound children are bound to this
    /// parent), then one batched pass over the persisted set destroys every
    /// record whose range key no child in memory carries. Saves strictly
    /// precede deletes so a surviving child is never transiently absent. The
    /// first failure aborts and propagates; completed saves and deletes are
    /// not rolled back, so callers needing atomicity must provide it at the
    /// store level.
    pub fn write_back<S: StoreClient>(&mut self, parent_id: &str, store: &S) -> Result<(), AppError> {
        let children = match &mut self.slot {
            Slot::Unloaded => return Ok(()),
            Slot::Loaded(children) => children,
        };
        for child in children.iter_mut() {
            match child.partition_key() {
                None => child.bind(parent_id),
                Some(bound) if bound != parent_id => {
                    return Err(AppError::AssociationTypeMismatch(format!(
                        "relation {}: child is bound to partition key {bound}, expected {parent_id}",
                        self.def.name,
                    )));
                }
                Some(_) => {}
            }
            child.save(store)?;
        }
        let kept: HashSet<&str> = children.iter().filter_map(C::range_key).collect();
        for record in ChildScan::new(store, C::COLLECTION, parent_id, RANGE_KEY_FLOOR, self.def.batch_size) {
            let record = record?;
            if kept.contains(record.range_key.as_str()) {
                continue;
            }
            C::hydrate(&record)?.destroy(store)?;
        }
        Ok(())
    }

    /// Destroys every persisted child of the parent, page by page, regardless
    /// of slot state. Invoked from the parent's destroy path before its own
    /// row is removed; a failed child destroy aborts immediately so the caller
    /// must keep the parent row, leaving no child orphaned behind a deleted
    /// parent key.
    pub fn cascade_destroy<S: StoreClient>(&self, parent_id: Option<&str>, store: &S) -> Result<(), AppError> {
        let Some(parent_id) = parent_id else { return Ok(()) };
        for record in ChildScan::new(store, C::COLLECTION, parent_id, RANGE_KEY_FLOOR, self.def.batch_size) {
            C::hydrate(&record?)?.destroy(store)?;
        }
        Ok(())
    }

    /// Discards the slot, pending assignments included. The parent's reload
    /// hook; the next access re-queries the store.
    pub fn reset(&mut self) {
        self.slot = Slot::Unloaded;
    }
}
