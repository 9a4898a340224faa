//! Ordering Module
//!
//! Generic ordered collection manager: keeps every parent's children at
//! dense positions `0..n` under insert, move, remove and reparent.
//!
//! ## Responsibilities
//! - One exclusion scope per parent; different parents never contend
//! - Validate, plan, commit, then apply (a failed commit changes nothing)
//! - Shifts are expressed as a single range delta per parent
//!
//! ## Renumbering
//! ```text
//!  move(b, 0):   a b c        remove(a):   b a c
//!               [0 1 2]                   [0 1 2]
//!                 │                          │
//!   item b: 1 → 0                item a: removed
//!   shift [0,1) +1               shift [2,3) -1
//!                 ▼                          ▼
//!                b a c                      b c
//!               [0 1 2]                    [0 1]
//! ```
//!
//! The content tree instantiates this once for page → columns and once for
//! column → posts.

mod collection;
mod plan;

pub use collection::{Key, OrderedCollection, Scope};
pub use plan::{Change, Plan, Shift};
