//! Closure-table hierarchies for SeaORM.
//!
//! The closure relation stores one `(ancestor, descendant, depth)` row for
//! every related pair of nodes, self-pairs included, so ancestor, descendant
//! and depth queries are plain indexed lookups. This crate owns the other
//! side of that bargain: the incremental maintenance of the relation under
//! inserts, re-parenting moves and the deletion variants, for both unordered
//! trees and trees with an explicit sibling order. PostgreSQL and SQLite are
//! supported through SeaORM.

pub mod config;
pub mod error;
pub mod guard;
pub mod lock;
pub mod ordered;
pub mod store;
pub mod traits;
pub mod tree;

pub mod prelude {
    //! Convenient re-exports for consumers.
    pub use crate::config::{
        AdvisoryLockStrategy, ClosureTableOptions, ClosureTableSchema,
    };
    pub use crate::traits::{ClosureTableModel, OrderedNodeModel};
}

pub use closure_table_macros::ClosureTableModel as ClosureTableModelDerive;
#[doc(hidden)]
pub use closure_table_macros::ClosureTableModel;
pub use config::{AdvisoryLockKey, AdvisoryLockStrategy, ClosureTableOptions, ClosureTableSchema};
pub use error::ClosureTableError;
pub use ordered::OrderedTreeRepository;
pub use store::{ClosureEdge, ClosureStore};
pub use traits::{ClosureTableModel, OrderedNodeModel};
pub use tree::TreeRepository;
