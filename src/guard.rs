//! Structural precondition checks shared by the tree engines.
//!
//! Each guard either passes or returns a specific error; none of them mutate
//! state, so they are safe to call from any point inside a transaction.

use sea_orm::{ColumnTrait, Condition, ConnectionTrait, EntityTrait, PaginatorTrait, QueryFilter};

use crate::error::ClosureTableError;
use crate::traits::ClosureTableModel;

/// Fail with [`ClosureTableError::MoveNotPossible`] unless an entity row with
/// this id exists.
pub async fn assert_exists<M, C>(conn: &C, id: &M::Id) -> Result<(), ClosureTableError>
where
    M: ClosureTableModel,
    C: ConnectionTrait,
{
    let count = M::Entity::find()
        .filter(M::id_column().eq(M::id_to_value(id)))
        .count(conn)
        .await?;

    if count == 0 {
        return Err(ClosureTableError::move_not_possible(format!(
            "node {:?} is not persisted",
            M::id_to_value(id)
        )));
    }

    Ok(())
}

/// Fail with [`ClosureTableError::SameNode`] when both ids name the same node.
pub fn assert_different_nodes<M>(a: &M::Id, b: &M::Id) -> Result<(), ClosureTableError>
where
    M: ClosureTableModel,
{
    if a == b {
        return Err(ClosureTableError::same_node(format!(
            "both sides are node {:?}",
            M::id_to_value(a)
        )));
    }

    Ok(())
}

/// Fail with [`ClosureTableError::MoveNotPossible`] when `candidate_parent`
/// lies inside `node`'s subtree; re-parenting onto it would create a cycle.
pub async fn assert_not_ancestor_of<M, C>(
    conn: &C,
    candidate_parent: &M::Id,
    node: &M::Id,
) -> Result<(), ClosureTableError>
where
    M: ClosureTableModel,
    C: ConnectionTrait,
{
    let count = M::ClosureEntity::find()
        .filter(
            Condition::all()
                .add(M::closure_ancestor_column().eq(M::id_to_value(node)))
                .add(M::closure_descendant_column().eq(M::id_to_value(candidate_parent))),
        )
        .count(conn)
        .await?;

    if count > 0 {
        return Err(ClosureTableError::move_not_possible(format!(
            "node {:?} is a descendant of node {:?}; the move would create a cycle",
            M::id_to_value(candidate_parent),
            M::id_to_value(node)
        )));
    }

    Ok(())
}
