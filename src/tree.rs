use sea_orm::{
    ColumnTrait, Condition, ConnectionTrait, DatabaseConnection, EntityTrait, QueryFilter,
    QueryOrder, Value,
};

use crate::config::ClosureTableSchema;
use crate::error::ClosureTableError;
use crate::guard;
use crate::lock::{commit_on_ok, LockedTransaction};
use crate::store::ClosureStore;
use crate::traits::ClosureTableModel;

/// Unordered tree engine: root-ification, re-parenting and the deletion
/// variants, implemented as closure-relation surgery on [`ClosureStore`].
///
/// Every mutating method opens its own [`LockedTransaction`] so a move or
/// delete either fully commits or fully rolls back; reads run on whatever
/// connection they are handed.
#[derive(Debug, Default)]
pub struct TreeRepository<M>
where
    M: ClosureTableModel,
{
    store: ClosureStore<M>,
}

impl<M> TreeRepository<M>
where
    M: ClosureTableModel,
{
    pub fn new() -> Self {
        Self {
            store: ClosureStore::new(),
        }
    }

    /// The underlying closure-relation store.
    pub fn store(&self) -> &ClosureStore<M> {
        &self.store
    }

    fn schema() -> &'static ClosureTableSchema {
        M::closure_table_schema()
    }

    // ------------------------------------------------------------------
    // Node lifecycle
    // ------------------------------------------------------------------

    /// Record the mandatory self-edge for a freshly persisted node.
    ///
    /// Callers must invoke this once right after inserting the entity row,
    /// on the same connection or transaction; every other operation assumes
    /// the self-edge is present.
    pub async fn insert_node<C: ConnectionTrait>(
        &self,
        conn: &C,
        node: &M,
    ) -> Result<(), ClosureTableError> {
        self.store.insert_self_edge(conn, &node.id()).await
    }

    // ------------------------------------------------------------------
    // Moves
    // ------------------------------------------------------------------

    /// Detach `node` (and its whole subtree) from its ancestor chain.
    ///
    /// Returns `false` without touching any edge when the node is already a
    /// root. Fails with [`ClosureTableError::MoveNotPossible`] when the node
    /// is not persisted.
    pub async fn make_root(
        &self,
        db: &DatabaseConnection,
        node: &M,
    ) -> Result<bool, ClosureTableError> {
        let txn = LockedTransaction::acquire(Self::schema().advisory_lock_strategy(), db).await?;
        let result = self.make_root_by_id(txn.connection(), &node.id()).await;
        commit_on_ok(txn, result).await
    }

    /// Re-parent `node` (with its whole subtree) under `parent`.
    pub async fn move_as_child_of(
        &self,
        db: &DatabaseConnection,
        node: &M,
        parent: &M,
    ) -> Result<(), ClosureTableError> {
        let txn = LockedTransaction::acquire(Self::schema().advisory_lock_strategy(), db).await?;
        let result = self
            .move_as_child_of_by_id(txn.connection(), &node.id(), &parent.id())
            .await;
        commit_on_ok(txn, result).await
    }

    /// Place `node` next to `reference`: under the same parent, or as a root
    /// when the reference is a root.
    pub async fn move_as_sibling_of(
        &self,
        db: &DatabaseConnection,
        node: &M,
        reference: &M,
    ) -> Result<(), ClosureTableError> {
        let txn = LockedTransaction::acquire(Self::schema().advisory_lock_strategy(), db).await?;
        let result = self
            .move_as_sibling_of_by_id(txn.connection(), &node.id(), &reference.id())
            .await;
        commit_on_ok(txn, result).await
    }

    /// Let `node` take `reference`'s place: `node` becomes a sibling of
    /// `reference`, then `reference` (with its subtree) becomes `node`'s
    /// child.
    pub async fn move_as_parent_of(
        &self,
        db: &DatabaseConnection,
        node: &M,
        reference: &M,
    ) -> Result<(), ClosureTableError> {
        let txn = LockedTransaction::acquire(Self::schema().advisory_lock_strategy(), db).await?;
        let result = self
            .move_as_parent_of_by_id(txn.connection(), &node.id(), &reference.id())
            .await;
        commit_on_ok(txn, result).await
    }

    /// Move `node` one level up, making its former parent its child.
    pub async fn pull_up(&self, db: &DatabaseConnection, node: &M) -> Result<(), ClosureTableError> {
        let txn = LockedTransaction::acquire(Self::schema().advisory_lock_strategy(), db).await?;
        let result = self.pull_up_by_id(txn.connection(), &node.id()).await;
        commit_on_ok(txn, result).await
    }

    /// Move `child` one level up into `node`'s place, making `node` its
    /// child. `child` must be a direct child of `node`.
    pub async fn push_down(
        &self,
        db: &DatabaseConnection,
        node: &M,
        child: &M,
    ) -> Result<(), ClosureTableError> {
        let txn = LockedTransaction::acquire(Self::schema().advisory_lock_strategy(), db).await?;
        let result = self
            .push_down_by_id(txn.connection(), &node.id(), &child.id())
            .await;
        commit_on_ok(txn, result).await
    }

    /// Re-parent every direct child of `node` to `node`'s own parent.
    pub async fn extract_children(
        &self,
        db: &DatabaseConnection,
        node: &M,
    ) -> Result<(), ClosureTableError> {
        let txn = LockedTransaction::acquire(Self::schema().advisory_lock_strategy(), db).await?;
        let result = self
            .extract_children_by_id(txn.connection(), &node.id())
            .await;
        commit_on_ok(txn, result).await
    }

    // ------------------------------------------------------------------
    // Deletes
    // ------------------------------------------------------------------

    /// Delete a leaf node. Fails with [`ClosureTableError::DeleteNotPossible`]
    /// when the node still has children.
    ///
    /// Only the entity row is deleted here; the leaf's own closure rows are
    /// removed by the schema's cascading foreign keys.
    pub async fn delete(&self, db: &DatabaseConnection, node: &M) -> Result<(), ClosureTableError> {
        let txn = LockedTransaction::acquire(Self::schema().advisory_lock_strategy(), db).await?;
        let result = self.delete_leaf_by_id(txn.connection(), &node.id()).await;
        commit_on_ok(txn, result).await
    }

    /// Delete `node` and every descendant, entity rows and closure rows both.
    pub async fn delete_subtree(
        &self,
        db: &DatabaseConnection,
        node: &M,
    ) -> Result<(), ClosureTableError> {
        let txn = LockedTransaction::acquire(Self::schema().advisory_lock_strategy(), db).await?;
        let result = async {
            let conn = txn.connection();
            let ids = self.store.subtree_ids(conn, &node.id()).await?;
            self.delete_nodes(conn, &ids).await
        }
        .await;
        commit_on_ok(txn, result).await
    }

    /// Delete every strict descendant of `node`, keeping `node` itself.
    pub async fn delete_descendants(
        &self,
        db: &DatabaseConnection,
        node: &M,
    ) -> Result<(), ClosureTableError> {
        let txn = LockedTransaction::acquire(Self::schema().advisory_lock_strategy(), db).await?;
        let result = async {
            let conn = txn.connection();
            let ids = self.store.descendant_ids(conn, &node.id()).await?;
            self.delete_nodes(conn, &ids).await
        }
        .await;
        commit_on_ok(txn, result).await
    }

    /// Delete `node` while re-attaching its direct children one level up.
    pub async fn delete_keep_descendants(
        &self,
        db: &DatabaseConnection,
        node: &M,
    ) -> Result<(), ClosureTableError> {
        let txn = LockedTransaction::acquire(Self::schema().advisory_lock_strategy(), db).await?;
        let result = async {
            let conn = txn.connection();
            let id = node.id();
            self.extract_children_by_id(conn, &id).await?;
            self.delete_leaf_by_id(conn, &id).await
        }
        .await;
        commit_on_ok(txn, result).await
    }

    // ------------------------------------------------------------------
    // Derived reads
    // ------------------------------------------------------------------

    /// The node's parent, or `None` for a root.
    pub async fn parent<C: ConnectionTrait>(
        &self,
        conn: &C,
        node: &M,
    ) -> Result<Option<M>, ClosureTableError> {
        match self.store.parent_id(conn, &node.id()).await? {
            Some(parent_id) => self.find_by_id(conn, &parent_id).await,
            None => Ok(None),
        }
    }

    /// Direct children, id-ordered.
    pub async fn children<C: ConnectionTrait>(
        &self,
        conn: &C,
        node: &M,
    ) -> Result<Vec<M>, ClosureTableError> {
        let ids = self.store.child_ids(conn, &node.id()).await?;
        self.load_in_order(conn, &ids).await
    }

    /// Strict ancestors, nearest first.
    pub async fn ancestors<C: ConnectionTrait>(
        &self,
        conn: &C,
        node: &M,
    ) -> Result<Vec<M>, ClosureTableError> {
        let ids = self.store.ancestor_ids(conn, &node.id()).await?;
        self.load_in_order(conn, &ids).await
    }

    /// The node and its ancestors, root first.
    pub async fn path<C: ConnectionTrait>(
        &self,
        conn: &C,
        node: &M,
    ) -> Result<Vec<M>, ClosureTableError> {
        let edges = self.store.path_edges(conn, &node.id()).await?;
        let mut ids: Vec<M::Id> = edges.into_iter().map(|edge| edge.ancestor).collect();
        ids.reverse();
        self.load_in_order(conn, &ids).await
    }

    /// Strict descendants, shallowest first.
    pub async fn descendants<C: ConnectionTrait>(
        &self,
        conn: &C,
        node: &M,
    ) -> Result<Vec<M>, ClosureTableError> {
        let ids = self.store.descendant_ids(conn, &node.id()).await?;
        self.load_in_order(conn, &ids).await
    }

    /// The node and its descendants, node first.
    pub async fn subtree<C: ConnectionTrait>(
        &self,
        conn: &C,
        node: &M,
    ) -> Result<Vec<M>, ClosureTableError> {
        let ids = self.store.subtree_ids(conn, &node.id()).await?;
        self.load_in_order(conn, &ids).await
    }

    /// The root of the node's tree; the node itself when it is a root.
    pub async fn root_of<C: ConnectionTrait>(
        &self,
        conn: &C,
        node: &M,
    ) -> Result<M, ClosureTableError> {
        let edges = self.store.path_edges(conn, &node.id()).await?;
        match edges.last() {
            Some(edge) if edge.depth > 0 => self
                .find_by_id(conn, &edge.ancestor)
                .await?
                .ok_or_else(|| {
                    ClosureTableError::invariant("closure ancestor row without an entity row")
                }),
            _ => Ok(node.clone()),
        }
    }

    /// Every node without ancestors, id-ordered.
    pub async fn roots<C: ConnectionTrait>(&self, conn: &C) -> Result<Vec<M>, ClosureTableError> {
        let rows = M::ClosureEntity::find()
            .filter(M::closure_depth_column().gt(0))
            .all(conn)
            .await?;
        let child_values: Vec<Value> = rows
            .iter()
            .map(|row| M::id_to_value(&M::closure_model_descendant(row)))
            .collect();

        let mut query = M::Entity::find();
        if !child_values.is_empty() {
            query = query.filter(M::id_column().is_not_in(child_values));
        }
        let models = query.order_by_asc(M::id_column()).all(conn).await?;
        Ok(models)
    }

    /// Every node without children, id-ordered.
    pub async fn leaves<C: ConnectionTrait>(&self, conn: &C) -> Result<Vec<M>, ClosureTableError> {
        let rows = M::ClosureEntity::find()
            .filter(M::closure_depth_column().gt(0))
            .all(conn)
            .await?;
        let parent_values: Vec<Value> = rows
            .iter()
            .map(|row| M::id_to_value(&M::closure_model_ancestor(row)))
            .collect();

        let mut query = M::Entity::find();
        if !parent_values.is_empty() {
            query = query.filter(M::id_column().is_not_in(parent_values));
        }
        let models = query.order_by_asc(M::id_column()).all(conn).await?;
        Ok(models)
    }

    /// Other nodes sharing the node's parent (other roots, for a root).
    pub async fn siblings<C: ConnectionTrait>(
        &self,
        conn: &C,
        node: &M,
    ) -> Result<Vec<M>, ClosureTableError> {
        let id = node.id();
        let group = match self.store.parent_id(conn, &id).await? {
            Some(parent_id) => {
                let ids = self.store.child_ids(conn, &parent_id).await?;
                self.load_in_order(conn, &ids).await?
            }
            None => self.roots(conn).await?,
        };
        Ok(group.into_iter().filter(|m| m.id() != id).collect())
    }

    /// Number of parent hops to the root.
    pub async fn depth<C: ConnectionTrait>(
        &self,
        conn: &C,
        node: &M,
    ) -> Result<u64, ClosureTableError> {
        self.store.count_ancestor_edges(conn, &node.id()).await
    }

    pub async fn count_ancestors<C: ConnectionTrait>(
        &self,
        conn: &C,
        node: &M,
    ) -> Result<u64, ClosureTableError> {
        self.store.count_ancestor_edges(conn, &node.id()).await
    }

    pub async fn count_descendants<C: ConnectionTrait>(
        &self,
        conn: &C,
        node: &M,
    ) -> Result<u64, ClosureTableError> {
        self.store.count_descendant_edges(conn, &node.id()).await
    }

    pub async fn count_children<C: ConnectionTrait>(
        &self,
        conn: &C,
        node: &M,
    ) -> Result<u64, ClosureTableError> {
        self.store.count_child_edges(conn, &node.id()).await
    }

    /// Number of nodes in the subtree, the node included.
    pub async fn count_subtree<C: ConnectionTrait>(
        &self,
        conn: &C,
        node: &M,
    ) -> Result<u64, ClosureTableError> {
        self.store
            .count_edges(
                conn,
                Condition::all().add(M::closure_ancestor_column().eq(M::id_to_value(&node.id()))),
            )
            .await
    }

    /// Number of nodes on the path to the root, the node included.
    pub async fn count_path<C: ConnectionTrait>(
        &self,
        conn: &C,
        node: &M,
    ) -> Result<u64, ClosureTableError> {
        self.store
            .count_edges(
                conn,
                Condition::all().add(M::closure_descendant_column().eq(M::id_to_value(&node.id()))),
            )
            .await
    }

    pub async fn is_root<C: ConnectionTrait>(
        &self,
        conn: &C,
        node: &M,
    ) -> Result<bool, ClosureTableError> {
        Ok(self.count_ancestors(conn, node).await? == 0)
    }

    pub async fn is_child<C: ConnectionTrait>(
        &self,
        conn: &C,
        node: &M,
    ) -> Result<bool, ClosureTableError> {
        Ok(self.count_ancestors(conn, node).await? > 0)
    }

    pub async fn is_leaf<C: ConnectionTrait>(
        &self,
        conn: &C,
        node: &M,
    ) -> Result<bool, ClosureTableError> {
        Ok(self.count_children(conn, node).await? == 0)
    }

    pub async fn has_children<C: ConnectionTrait>(
        &self,
        conn: &C,
        node: &M,
    ) -> Result<bool, ClosureTableError> {
        Ok(self.count_children(conn, node).await? > 0)
    }

    // ------------------------------------------------------------------
    // Internals, shared with the ordered engine
    // ------------------------------------------------------------------

    pub(crate) async fn make_root_by_id<C: ConnectionTrait>(
        &self,
        conn: &C,
        id: &M::Id,
    ) -> Result<bool, ClosureTableError> {
        guard::assert_exists::<M, C>(conn, id).await?;

        let ancestor_ids = self.store.ancestor_ids(conn, id).await?;
        if ancestor_ids.is_empty() {
            return Ok(false);
        }

        let subtree_ids = self.store.subtree_ids(conn, id).await?;
        self.store
            .delete_cross_product(conn, &ancestor_ids, &subtree_ids)
            .await?;
        Ok(true)
    }

    pub(crate) async fn move_as_child_of_by_id<C: ConnectionTrait>(
        &self,
        conn: &C,
        node_id: &M::Id,
        parent_id: &M::Id,
    ) -> Result<(), ClosureTableError> {
        guard::assert_exists::<M, C>(conn, node_id).await?;
        guard::assert_exists::<M, C>(conn, parent_id).await?;
        guard::assert_different_nodes::<M>(node_id, parent_id)?;
        guard::assert_not_ancestor_of::<M, C>(conn, parent_id, node_id).await?;

        self.make_root_by_id(conn, node_id).await?;
        self.store.attach(conn, parent_id, node_id).await
    }

    pub(crate) async fn move_as_sibling_of_by_id<C: ConnectionTrait>(
        &self,
        conn: &C,
        node_id: &M::Id,
        reference_id: &M::Id,
    ) -> Result<(), ClosureTableError> {
        guard::assert_exists::<M, C>(conn, node_id).await?;
        guard::assert_exists::<M, C>(conn, reference_id).await?;
        guard::assert_different_nodes::<M>(node_id, reference_id)?;

        match self.store.parent_id(conn, reference_id).await? {
            Some(parent_id) => self.move_as_child_of_by_id(conn, node_id, &parent_id).await,
            None => {
                self.make_root_by_id(conn, node_id).await?;
                Ok(())
            }
        }
    }

    pub(crate) async fn move_as_parent_of_by_id<C: ConnectionTrait>(
        &self,
        conn: &C,
        node_id: &M::Id,
        reference_id: &M::Id,
    ) -> Result<(), ClosureTableError> {
        guard::assert_exists::<M, C>(conn, node_id).await?;
        guard::assert_exists::<M, C>(conn, reference_id).await?;
        guard::assert_different_nodes::<M>(node_id, reference_id)?;

        self.move_as_sibling_of_by_id(conn, node_id, reference_id)
            .await?;
        self.move_as_child_of_by_id(conn, reference_id, node_id).await
    }

    pub(crate) async fn pull_up_by_id<C: ConnectionTrait>(
        &self,
        conn: &C,
        id: &M::Id,
    ) -> Result<(), ClosureTableError> {
        guard::assert_exists::<M, C>(conn, id).await?;

        let parent_id = self.store.parent_id(conn, id).await?.ok_or_else(|| {
            ClosureTableError::move_not_possible("a root node cannot be pulled up")
        })?;
        self.move_as_parent_of_by_id(conn, id, &parent_id).await
    }

    pub(crate) async fn push_down_by_id<C: ConnectionTrait>(
        &self,
        conn: &C,
        node_id: &M::Id,
        child_id: &M::Id,
    ) -> Result<(), ClosureTableError> {
        guard::assert_exists::<M, C>(conn, node_id).await?;
        guard::assert_exists::<M, C>(conn, child_id).await?;

        let child_parent = self.store.parent_id(conn, child_id).await?;
        if child_parent.as_ref() != Some(node_id) {
            return Err(ClosureTableError::move_not_possible(
                "only a direct child can be pushed down onto",
            ));
        }
        self.move_as_parent_of_by_id(conn, child_id, node_id).await
    }

    pub(crate) async fn extract_children_by_id<C: ConnectionTrait>(
        &self,
        conn: &C,
        id: &M::Id,
    ) -> Result<(), ClosureTableError> {
        let child_ids = self.store.child_ids(conn, id).await?;
        for child_id in &child_ids {
            self.move_as_sibling_of_by_id(conn, child_id, id).await?;
        }
        Ok(())
    }

    pub(crate) async fn delete_leaf_by_id<C: ConnectionTrait>(
        &self,
        conn: &C,
        id: &M::Id,
    ) -> Result<(), ClosureTableError> {
        if self.store.count_child_edges(conn, id).await? > 0 {
            return Err(ClosureTableError::delete_not_possible(format!(
                "node {:?} still has children",
                M::id_to_value(id)
            )));
        }

        M::Entity::delete_many()
            .filter(M::id_column().eq(M::id_to_value(id)))
            .exec(conn)
            .await?;
        Ok(())
    }

    async fn delete_nodes<C: ConnectionTrait>(
        &self,
        conn: &C,
        ids: &[M::Id],
    ) -> Result<(), ClosureTableError> {
        if ids.is_empty() {
            return Ok(());
        }

        self.store.delete_edges_of(conn, ids).await?;

        let values: Vec<Value> = ids.iter().map(M::id_to_value).collect();
        M::Entity::delete_many()
            .filter(M::id_column().is_in(values))
            .exec(conn)
            .await?;
        Ok(())
    }

    pub(crate) async fn find_by_id<C: ConnectionTrait>(
        &self,
        conn: &C,
        id: &M::Id,
    ) -> Result<Option<M>, ClosureTableError> {
        let model = M::Entity::find()
            .filter(M::id_column().eq(M::id_to_value(id)))
            .one(conn)
            .await?;
        Ok(model)
    }

    /// Load models for `ids`, preserving the closure-derived ordering.
    pub(crate) async fn load_in_order<C: ConnectionTrait>(
        &self,
        conn: &C,
        ids: &[M::Id],
    ) -> Result<Vec<M>, ClosureTableError> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let values: Vec<Value> = ids.iter().map(M::id_to_value).collect();
        let models = M::Entity::find()
            .filter(M::id_column().is_in(values))
            .all(conn)
            .await?;

        let mut ordered = Vec::with_capacity(ids.len());
        for id in ids {
            if let Some(model) = models.iter().find(|m| m.id() == *id) {
                ordered.push(model.clone());
            }
        }
        Ok(ordered)
    }
}
