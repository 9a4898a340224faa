//! Ordered collection
//!
//! Per-parent sibling lists with dense 0-based positions.

use std::collections::HashMap;
use std::fmt::Display;
use std::hash::Hash;
use std::sync::Arc;

use parking_lot::lock_api::ArcMutexGuard;
use parking_lot::{Mutex, RawMutex, RwLock};

use crate::error::{EntityKind, GridError, Result};

use super::plan::{Change, Plan};

/// Identifier usable as a parent or item key
pub trait Key: Copy + Eq + Hash + Ord + Display + Send + Sync + 'static {}

impl<T> Key for T where T: Copy + Eq + Hash + Ord + Display + Send + Sync + 'static {}

/// One parent's children; the index of an item is its position
struct Siblings<C> {
    items: Vec<C>,
    /// Set once the parent is closed; no further children may be added
    sealed: bool,
}

/// Dense ordering of items under parents
///
/// ## Concurrency
/// - Each parent's sibling list sits behind its own `Mutex` (the parent's
///   exclusion scope). Renumbering one parent never blocks another.
/// - `parents` and `owners` are index maps behind `RwLock`s. They are only
///   held for a lookup or an update and never while waiting on a scope.
/// - Scopes of two parents are always taken in ascending parent order.
pub struct OrderedCollection<P, C> {
    parent_kind: EntityKind,
    item_kind: EntityKind,
    parents: RwLock<HashMap<P, Arc<Mutex<Siblings<C>>>>>,
    owners: RwLock<HashMap<C, P>>,
}

impl<P: Key, C: Key> OrderedCollection<P, C> {
    pub fn new(parent_kind: EntityKind, item_kind: EntityKind) -> Self {
        Self {
            parent_kind,
            item_kind,
            parents: RwLock::new(HashMap::new()),
            owners: RwLock::new(HashMap::new()),
        }
    }

    // =========================================================================
    // Parents
    // =========================================================================

    /// Make `parent` available for children. Returns false if already known.
    pub fn register_parent(&self, parent: P) -> bool {
        let mut parents = self.parents.write();
        if parents.contains_key(&parent) {
            return false;
        }
        parents.insert(
            parent,
            Arc::new(Mutex::new(Siblings {
                items: Vec::new(),
                sealed: false,
            })),
        );
        true
    }

    /// Register `parent` with an existing ordered child list (used when
    /// loading persisted state)
    pub fn restore_parent(&self, parent: P, items: Vec<C>) -> Result<()> {
        let mut parents = self.parents.write();
        let mut owners = self.owners.write();

        if parents.contains_key(&parent) {
            return Err(GridError::DuplicateKey {
                key: format!("{} {}", self.parent_kind, parent),
                existing: "an existing sibling set".to_string(),
            });
        }
        for item in &items {
            if let Some(owner) = owners.get(item) {
                return Err(self.already_owned(*item, *owner));
            }
        }
        let mut seen = std::collections::HashSet::with_capacity(items.len());
        if !items.iter().all(|item| seen.insert(*item)) {
            return Err(GridError::StorageFailure(format!(
                "duplicate {} under {} {}",
                self.item_kind, self.parent_kind, parent
            )));
        }

        for item in &items {
            owners.insert(*item, parent);
        }
        parents.insert(
            parent,
            Arc::new(Mutex::new(Siblings {
                items,
                sealed: false,
            })),
        );
        Ok(())
    }

    pub fn contains_parent(&self, parent: P) -> bool {
        self.parents.read().contains_key(&parent)
    }

    /// All open parents, ascending
    pub fn parents(&self) -> Vec<P> {
        let mut parents: Vec<P> = self.parents.read().keys().copied().collect();
        parents.sort_unstable();
        parents
    }

    // =========================================================================
    // Reads
    // =========================================================================

    pub fn parent_of(&self, item: C) -> Option<P> {
        self.owners.read().get(&item).copied()
    }

    pub fn position_of(&self, item: C) -> Option<usize> {
        let scope = self.scope_of(item).ok()?;
        scope.position_of(item)
    }

    /// Children of `parent` in position order
    pub fn children(&self, parent: P) -> Result<Vec<C>> {
        Ok(self.scope(parent)?.items().to_vec())
    }

    pub fn sibling_count(&self, parent: P) -> Result<usize> {
        Ok(self.scope(parent)?.len())
    }

    // =========================================================================
    // Exclusion Scopes
    // =========================================================================

    /// Lock the sibling set of `parent`
    pub fn scope(&self, parent: P) -> Result<Scope<'_, P, C>> {
        let slot = self
            .parents
            .read()
            .get(&parent)
            .cloned()
            .ok_or_else(|| GridError::not_found(self.parent_kind, parent))?;

        let siblings = slot.lock_arc();
        if siblings.sealed {
            return Err(GridError::not_found(self.parent_kind, parent));
        }

        Ok(Scope {
            collection: self,
            parent,
            siblings,
        })
    }

    /// Lock the sibling set that currently holds `item`
    ///
    /// The owner is looked up, locked, then re-checked; if a concurrent
    /// reparent moved the item in between, the lookup is retried.
    pub fn scope_of(&self, item: C) -> Result<Scope<'_, P, C>> {
        loop {
            let parent = self
                .parent_of(item)
                .ok_or_else(|| GridError::not_found(self.item_kind, item))?;

            match self.scope(parent) {
                Ok(scope) if scope.position_of(item).is_some() => return Ok(scope),
                Ok(_) if self.parent_of(item) == Some(parent) => {
                    return Err(GridError::StorageFailure(format!(
                        "{} {} bound to {} {} but missing from its siblings",
                        self.item_kind, item, self.parent_kind, parent
                    )));
                }
                Err(e) if self.parent_of(item) == Some(parent) => return Err(e),
                _ => continue,
            }
        }
    }

    /// Lock two distinct sibling sets in ascending parent order
    ///
    /// The scopes are returned in argument order.
    pub fn scope_pair(&self, a: P, b: P) -> Result<(Scope<'_, P, C>, Scope<'_, P, C>)> {
        debug_assert!(a != b, "scope_pair needs distinct parents");
        if a < b {
            let first = self.scope(a)?;
            let second = self.scope(b)?;
            Ok((first, second))
        } else {
            let first = self.scope(b)?;
            let second = self.scope(a)?;
            Ok((second, first))
        }
    }

    // =========================================================================
    // Mutations
    // =========================================================================
    //
    // Each mutation validates under the scope, builds its plan(s), passes
    // them to `commit`, and applies them only if `commit` succeeds.

    /// Place `item` after the last child of `parent`
    pub fn append<F>(&self, parent: P, item: C, commit: F) -> Result<Plan<P, C>>
    where
        F: FnOnce(&[Plan<P, C>]) -> Result<()>,
    {
        let mut scope = self.scope(parent)?;
        let plan = scope.plan_append(item)?;
        commit(std::slice::from_ref(&plan))?;
        scope.apply(&plan);
        Ok(plan)
    }

    /// Insert `item` at `position`, shifting later siblings up by one
    pub fn insert_at<F>(&self, parent: P, item: C, position: usize, commit: F) -> Result<Plan<P, C>>
    where
        F: FnOnce(&[Plan<P, C>]) -> Result<()>,
    {
        let mut scope = self.scope(parent)?;
        let plan = scope.plan_insert(item, position)?;
        commit(std::slice::from_ref(&plan))?;
        scope.apply(&plan);
        Ok(plan)
    }

    /// Move `item` to `position` among its current siblings
    pub fn move_item<F>(&self, item: C, position: usize, commit: F) -> Result<Plan<P, C>>
    where
        F: FnOnce(&[Plan<P, C>]) -> Result<()>,
    {
        let mut scope = self.scope_of(item)?;
        let plan = scope.plan_move(item, position)?;
        commit(std::slice::from_ref(&plan))?;
        scope.apply(&plan);
        Ok(plan)
    }

    /// Remove `item`, shifting later siblings down by one
    pub fn remove<F>(&self, item: C, commit: F) -> Result<Plan<P, C>>
    where
        F: FnOnce(&[Plan<P, C>]) -> Result<()>,
    {
        let mut scope = self.scope_of(item)?;
        let plan = scope.plan_remove(item)?;
        commit(std::slice::from_ref(&plan))?;
        scope.apply(&plan);
        Ok(plan)
    }

    /// Move `item` under `new_parent` at `position`, as one atomic unit
    ///
    /// Returns `[removal, insertion]`, or a single move plan when
    /// `new_parent` already owns the item.
    pub fn reparent<F>(
        &self,
        item: C,
        new_parent: P,
        position: usize,
        commit: F,
    ) -> Result<Vec<Plan<P, C>>>
    where
        F: FnOnce(&[Plan<P, C>]) -> Result<()>,
    {
        loop {
            let source = self
                .parent_of(item)
                .ok_or_else(|| GridError::not_found(self.item_kind, item))?;

            if source == new_parent {
                let mut scope = match self.scope(source) {
                    Ok(scope) if scope.position_of(item).is_some() => scope,
                    Ok(_) => continue,
                    Err(e) if self.parent_of(item) == Some(source) => return Err(e),
                    Err(_) => continue,
                };
                let plans = vec![scope.plan_move(item, position)?];
                commit(&plans)?;
                scope.apply(&plans[0]);
                return Ok(plans);
            }

            let (mut from, mut to) = match self.scope_pair(source, new_parent) {
                Ok(pair) => pair,
                Err(e) if self.parent_of(item) == Some(source) => return Err(e),
                Err(_) => continue,
            };
            let Some(from_position) = from.position_of(item) else {
                continue;
            };
            if position > to.len() {
                return Err(GridError::OutOfRange {
                    position,
                    len: to.len(),
                });
            }

            let plans = vec![
                Plan::remove(source, item, from_position, from.len()),
                Plan::insert(new_parent, item, position, to.len()),
            ];
            commit(&plans)?;
            // Insert first so the owner index never goes blank
            to.apply(&plans[1]);
            from.apply(&plans[0]);
            return Ok(plans);
        }
    }

    /// Seal `parent` and unbind all its children, returned in position order
    pub fn close_parent<F>(&self, parent: P, commit: F) -> Result<Vec<C>>
    where
        F: FnOnce(&[C]) -> Result<()>,
    {
        let scope = self.scope(parent)?;
        commit(scope.items())?;
        Ok(scope.seal())
    }

    fn already_owned(&self, item: C, owner: P) -> GridError {
        GridError::DuplicateKey {
            key: format!("{} {}", self.item_kind, item),
            existing: format!("{} {}", self.parent_kind, owner),
        }
    }
}

/// Exclusive access to one parent's sibling set
///
/// Dropping the scope releases the parent.
pub struct Scope<'a, P, C> {
    collection: &'a OrderedCollection<P, C>,
    parent: P,
    siblings: ArcMutexGuard<RawMutex, Siblings<C>>,
}

impl<'a, P: Key, C: Key> Scope<'a, P, C> {
    pub fn parent(&self) -> P {
        self.parent
    }

    /// Children in position order
    pub fn items(&self) -> &[C] {
        &self.siblings.items
    }

    pub fn len(&self) -> usize {
        self.siblings.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.siblings.items.is_empty()
    }

    pub fn position_of(&self, item: C) -> Option<usize> {
        self.siblings.items.iter().position(|c| *c == item)
    }

    // -------------------------------------------------------------------------
    // Planning (no mutation)
    // -------------------------------------------------------------------------

    pub fn plan_append(&self, item: C) -> Result<Plan<P, C>> {
        self.plan_insert(item, self.len())
    }

    pub fn plan_insert(&self, item: C, position: usize) -> Result<Plan<P, C>> {
        if position > self.len() {
            return Err(GridError::OutOfRange {
                position,
                len: self.len(),
            });
        }
        if let Some(owner) = self.collection.parent_of(item) {
            return Err(self.collection.already_owned(item, owner));
        }
        Ok(Plan::insert(self.parent, item, position, self.len()))
    }

    pub fn plan_move(&self, item: C, position: usize) -> Result<Plan<P, C>> {
        let from = self.require(item)?;
        if position >= self.len() {
            return Err(GridError::OutOfRange {
                position,
                len: self.len(),
            });
        }
        Ok(Plan::relocate(self.parent, item, from, position))
    }

    pub fn plan_remove(&self, item: C) -> Result<Plan<P, C>> {
        let from = self.require(item)?;
        Ok(Plan::remove(self.parent, item, from, self.len()))
    }

    fn require(&self, item: C) -> Result<usize> {
        self.position_of(item)
            .ok_or_else(|| GridError::not_found(self.collection.item_kind, item))
    }

    // -------------------------------------------------------------------------
    // Applying
    // -------------------------------------------------------------------------

    /// Apply a plan built by this scope
    ///
    /// The shifted range moves in a single rotation, so every affected
    /// sibling is renumbered in one pass.
    pub(crate) fn apply(&mut self, plan: &Plan<P, C>) {
        debug_assert!(plan.parent() == self.parent);
        let item = plan.item();

        match plan.change() {
            Change::Insert { at } => {
                self.siblings.items.insert(at, item);
                self.collection.owners.write().insert(item, self.parent);
            }
            Change::Remove { from } => {
                let removed = self.siblings.items.remove(from);
                debug_assert!(removed == item);
                let mut owners = self.collection.owners.write();
                if owners.get(&item) == Some(&self.parent) {
                    owners.remove(&item);
                }
            }
            Change::Move { from, to } => {
                if from < to {
                    self.siblings.items[from..=to].rotate_left(1);
                } else if to < from {
                    self.siblings.items[to..=from].rotate_right(1);
                }
            }
        }
    }

    /// Close the parent: no more children, all current children unbound
    pub fn seal(mut self) -> Vec<C> {
        self.siblings.sealed = true;
        let items = std::mem::take(&mut self.siblings.items);
        {
            let mut owners = self.collection.owners.write();
            for item in &items {
                if owners.get(item) == Some(&self.parent) {
                    owners.remove(item);
                }
            }
        }
        self.collection.parents.write().remove(&self.parent);
        items
    }
}
