use std::marker::PhantomData;

use sea_orm::sea_query::{Alias, Expr, Query};
use sea_orm::{
    ColumnTrait, Condition, ConnectionTrait, EntityTrait, PaginatorTrait, QueryFilter, QueryOrder,
    Value,
};
use serde::{Deserialize, Serialize};

use crate::error::ClosureTableError;
use crate::traits::ClosureTableModel;

/// One row of the closure relation.
///
/// `depth` is the number of parent hops from ancestor to descendant; the
/// mandatory self-edge of every node carries `depth == 0`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClosureEdge<Id> {
    pub ancestor: Id,
    pub descendant: Id,
    pub depth: i32,
}

/// Primitive read/write access to the closure relation for one node type.
///
/// The store issues plain statements against the connection it is handed and
/// performs no transaction management of its own; callers scope transactions
/// around multi-statement operations.
#[derive(Debug, Default)]
pub struct ClosureStore<M>
where
    M: ClosureTableModel,
{
    _marker: PhantomData<M>,
}

impl<M> ClosureStore<M>
where
    M: ClosureTableModel,
{
    pub fn new() -> Self {
        Self {
            _marker: PhantomData,
        }
    }

    /// All edges ending at `id`: the node's path to its root, nearest first.
    pub async fn path_edges<C: ConnectionTrait>(
        &self,
        conn: &C,
        id: &M::Id,
    ) -> Result<Vec<ClosureEdge<M::Id>>, ClosureTableError> {
        let rows = M::ClosureEntity::find()
            .filter(M::closure_descendant_column().eq(M::id_to_value(id)))
            .order_by_asc(M::closure_depth_column())
            .all(conn)
            .await?;
        Ok(rows.iter().map(Self::edge_from_row).collect())
    }

    /// All edges starting at `id`: the node's full subtree, shallowest first.
    pub async fn subtree_edges<C: ConnectionTrait>(
        &self,
        conn: &C,
        id: &M::Id,
    ) -> Result<Vec<ClosureEdge<M::Id>>, ClosureTableError> {
        let rows = M::ClosureEntity::find()
            .filter(M::closure_ancestor_column().eq(M::id_to_value(id)))
            .order_by_asc(M::closure_depth_column())
            .all(conn)
            .await?;
        Ok(rows.iter().map(Self::edge_from_row).collect())
    }

    /// Strict ancestor ids of `id`, nearest first.
    pub async fn ancestor_ids<C: ConnectionTrait>(
        &self,
        conn: &C,
        id: &M::Id,
    ) -> Result<Vec<M::Id>, ClosureTableError> {
        let edges = self.path_edges(conn, id).await?;
        Ok(edges
            .into_iter()
            .filter(|edge| edge.depth > 0)
            .map(|edge| edge.ancestor)
            .collect())
    }

    /// Strict descendant ids of `id`, shallowest first.
    pub async fn descendant_ids<C: ConnectionTrait>(
        &self,
        conn: &C,
        id: &M::Id,
    ) -> Result<Vec<M::Id>, ClosureTableError> {
        let edges = self.subtree_edges(conn, id).await?;
        Ok(edges
            .into_iter()
            .filter(|edge| edge.depth > 0)
            .map(|edge| edge.descendant)
            .collect())
    }

    /// Ids of `id`'s subtree including `id` itself, shallowest first.
    pub async fn subtree_ids<C: ConnectionTrait>(
        &self,
        conn: &C,
        id: &M::Id,
    ) -> Result<Vec<M::Id>, ClosureTableError> {
        let edges = self.subtree_edges(conn, id).await?;
        Ok(edges.into_iter().map(|edge| edge.descendant).collect())
    }

    /// Direct child ids of `id`.
    pub async fn child_ids<C: ConnectionTrait>(
        &self,
        conn: &C,
        id: &M::Id,
    ) -> Result<Vec<M::Id>, ClosureTableError> {
        let rows = M::ClosureEntity::find()
            .filter(M::closure_ancestor_column().eq(M::id_to_value(id)))
            .filter(M::closure_depth_column().eq(1))
            .order_by_asc(M::closure_descendant_column())
            .all(conn)
            .await?;
        Ok(rows.iter().map(|row| M::closure_model_descendant(row)).collect())
    }

    /// The unique depth-1 ancestor of `id`, or `None` for a root.
    pub async fn parent_id<C: ConnectionTrait>(
        &self,
        conn: &C,
        id: &M::Id,
    ) -> Result<Option<M::Id>, ClosureTableError> {
        let row = M::ClosureEntity::find()
            .filter(M::closure_descendant_column().eq(M::id_to_value(id)))
            .filter(M::closure_depth_column().eq(1))
            .one(conn)
            .await?;
        Ok(row.map(|row| M::closure_model_ancestor(&row)))
    }

    /// Count closure rows matching an arbitrary predicate.
    pub async fn count_edges<C: ConnectionTrait>(
        &self,
        conn: &C,
        condition: Condition,
    ) -> Result<u64, ClosureTableError> {
        let count = M::ClosureEntity::find().filter(condition).count(conn).await?;
        Ok(count)
    }

    /// Number of strict ancestors of `id`, i.e. its depth.
    pub async fn count_ancestor_edges<C: ConnectionTrait>(
        &self,
        conn: &C,
        id: &M::Id,
    ) -> Result<u64, ClosureTableError> {
        self.count_edges(
            conn,
            Condition::all()
                .add(M::closure_descendant_column().eq(M::id_to_value(id)))
                .add(M::closure_depth_column().gt(0)),
        )
        .await
    }

    /// Number of strict descendants of `id`.
    pub async fn count_descendant_edges<C: ConnectionTrait>(
        &self,
        conn: &C,
        id: &M::Id,
    ) -> Result<u64, ClosureTableError> {
        self.count_edges(
            conn,
            Condition::all()
                .add(M::closure_ancestor_column().eq(M::id_to_value(id)))
                .add(M::closure_depth_column().gt(0)),
        )
        .await
    }

    /// Number of direct children of `id`.
    pub async fn count_child_edges<C: ConnectionTrait>(
        &self,
        conn: &C,
        id: &M::Id,
    ) -> Result<u64, ClosureTableError> {
        self.count_edges(
            conn,
            Condition::all()
                .add(M::closure_ancestor_column().eq(M::id_to_value(id)))
                .add(M::closure_depth_column().eq(1)),
        )
        .await
    }

    pub async fn has_self_edge<C: ConnectionTrait>(
        &self,
        conn: &C,
        id: &M::Id,
    ) -> Result<bool, ClosureTableError> {
        let count = self
            .count_edges(
                conn,
                Condition::all()
                    .add(M::closure_ancestor_column().eq(M::id_to_value(id)))
                    .add(M::closure_descendant_column().eq(M::id_to_value(id))),
            )
            .await?;
        Ok(count > 0)
    }

    /// Insert the mandatory `(id, id, 0)` edge for a freshly created node.
    pub async fn insert_self_edge<C: ConnectionTrait>(
        &self,
        conn: &C,
        id: &M::Id,
    ) -> Result<(), ClosureTableError> {
        if self.has_self_edge(conn, id).await? {
            return Err(ClosureTableError::duplicate_edge(format!(
                "self edge already exists for node {:?}",
                M::id_to_value(id)
            )));
        }

        let row = M::closure_build_row(id.clone(), id.clone(), 0);
        M::ClosureEntity::insert_many([row]).exec(conn).await?;
        Ok(())
    }

    /// Delete every edge whose ancestor is in `ancestor_ids` and whose
    /// descendant is in `descendant_ids` — the full cross product, used to
    /// detach a subtree from its inherited ancestor chain.
    pub async fn delete_cross_product<C: ConnectionTrait>(
        &self,
        conn: &C,
        ancestor_ids: &[M::Id],
        descendant_ids: &[M::Id],
    ) -> Result<(), ClosureTableError> {
        if ancestor_ids.is_empty() || descendant_ids.is_empty() {
            return Ok(());
        }

        let ancestor_values: Vec<Value> = ancestor_ids.iter().map(M::id_to_value).collect();
        let descendant_values: Vec<Value> = descendant_ids.iter().map(M::id_to_value).collect();

        M::ClosureEntity::delete_many()
            .filter(M::closure_ancestor_column().is_in(ancestor_values))
            .filter(M::closure_descendant_column().is_in(descendant_values))
            .exec(conn)
            .await?;
        Ok(())
    }

    /// Delete every edge ending at one of `ids`. Removing a node set this way
    /// also removes its members' self-edges and internal edges.
    pub async fn delete_edges_of<C: ConnectionTrait>(
        &self,
        conn: &C,
        ids: &[M::Id],
    ) -> Result<(), ClosureTableError> {
        if ids.is_empty() {
            return Ok(());
        }

        let values: Vec<Value> = ids.iter().map(M::id_to_value).collect();
        M::ClosureEntity::delete_many()
            .filter(M::closure_descendant_column().is_in(values))
            .exec(conn)
            .await?;
        Ok(())
    }

    /// Materialize every edge from `parent_id`'s ancestor chain (itself
    /// included) to `node_id`'s subtree (itself included) in one cross-join
    /// `INSERT ... SELECT`, so concurrent readers never observe a partially
    /// attached subtree.
    pub async fn attach<C: ConnectionTrait>(
        &self,
        conn: &C,
        parent_id: &M::Id,
        node_id: &M::Id,
    ) -> Result<(), ClosureTableError> {
        let schema = M::closure_table_schema();
        let table = Alias::new(schema.closure_table());
        let supertbl = Alias::new("supertbl");
        let subtbl = Alias::new("subtbl");
        let ancestor = Alias::new(schema.ancestor_column());
        let descendant = Alias::new(schema.descendant_column());
        let depth = Alias::new(schema.depth_column());

        let mut select = Query::select();
        select
            .column((supertbl.clone(), ancestor.clone()))
            .column((subtbl.clone(), descendant.clone()))
            .expr(
                Expr::col((supertbl.clone(), depth.clone()))
                    .add(Expr::col((subtbl.clone(), depth.clone())))
                    .add(1),
            )
            .from_as(table.clone(), supertbl.clone())
            .from_as(table.clone(), subtbl.clone())
            .and_where(Expr::col((supertbl, descendant.clone())).eq(M::id_to_value(parent_id)))
            .and_where(Expr::col((subtbl, ancestor.clone())).eq(M::id_to_value(node_id)));

        let mut insert = Query::insert();
        insert
            .into_table(table)
            .columns([ancestor, descendant, depth])
            .select_from(select)
            .map_err(|err| ClosureTableError::invariant(err.to_string()))?;

        let statement = conn.get_database_backend().build(&insert);
        conn.execute(statement).await?;
        Ok(())
    }

    fn edge_from_row(row: &M::ClosureModel) -> ClosureEdge<M::Id> {
        ClosureEdge {
            ancestor: M::closure_model_ancestor(row),
            descendant: M::closure_model_descendant(row),
            depth: M::closure_model_depth(row),
        }
    }
}
