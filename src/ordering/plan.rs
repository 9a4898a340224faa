//! Reorder plans
//!
//! A plan is the validated description of one parent's renumber: what
//! happens to the moving item, plus at most one contiguous range of siblings
//! whose positions all move by the same delta.

/// A half-open range of old positions `[start, end)` that all move by `delta`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Shift {
    pub start: usize,
    pub end: usize,
    pub delta: isize,
}

impl Shift {
    fn new(start: usize, end: usize, delta: isize) -> Option<Self> {
        (start < end).then_some(Self { start, end, delta })
    }

    /// Does this shift move the sibling at `position`?
    pub fn covers(&self, position: usize) -> bool {
        (self.start..self.end).contains(&position)
    }

    /// Number of siblings renumbered
    pub fn len(&self) -> usize {
        self.end - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.start >= self.end
    }
}

/// What happens to the item itself
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Change {
    Insert { at: usize },
    Remove { from: usize },
    Move { from: usize, to: usize },
}

/// Validated renumber of one parent's sibling set
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Plan<P, C> {
    parent: P,
    item: C,
    change: Change,
    shift: Option<Shift>,
}

impl<P: Copy, C: Copy> Plan<P, C> {
    /// Insert `item` at `at` into a sibling set of `len`
    pub(crate) fn insert(parent: P, item: C, at: usize, len: usize) -> Self {
        debug_assert!(at <= len);
        Self {
            parent,
            item,
            change: Change::Insert { at },
            shift: Shift::new(at, len, 1),
        }
    }

    /// Remove `item` from `from` in a sibling set of `len`
    pub(crate) fn remove(parent: P, item: C, from: usize, len: usize) -> Self {
        debug_assert!(from < len);
        Self {
            parent,
            item,
            change: Change::Remove { from },
            shift: Shift::new(from + 1, len, -1),
        }
    }

    /// Move `item` from `from` to `to` within the same sibling set
    pub(crate) fn relocate(parent: P, item: C, from: usize, to: usize) -> Self {
        let shift = if from < to {
            Shift::new(from + 1, to + 1, -1)
        } else {
            Shift::new(to, from, 1)
        };
        Self {
            parent,
            item,
            change: Change::Move { from, to },
            shift,
        }
    }

    pub fn parent(&self) -> P {
        self.parent
    }

    pub fn item(&self) -> C {
        self.item
    }

    pub fn change(&self) -> Change {
        self.change
    }

    pub fn shift(&self) -> Option<Shift> {
        self.shift
    }

    /// Position the item occupies once the plan is applied (None for removals)
    pub fn target(&self) -> Option<usize> {
        match self.change {
            Change::Insert { at } => Some(at),
            Change::Move { to, .. } => Some(to),
            Change::Remove { .. } => None,
        }
    }

    /// New position of a sibling (other than the item) that was at `old`
    pub fn renumber(&self, old: usize) -> usize {
        match self.shift {
            Some(shift) if shift.covers(old) => old.saturating_add_signed(shift.delta),
            _ => old,
        }
    }
}
