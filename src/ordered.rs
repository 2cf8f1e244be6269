use sea_orm::sea_query::Expr;
use sea_orm::{ColumnTrait, ConnectionTrait, DatabaseConnection, EntityTrait, QueryFilter, Value};

use crate::config::ClosureTableSchema;
use crate::error::ClosureTableError;
use crate::guard;
use crate::lock::{commit_on_ok, LockedTransaction};
use crate::traits::{ClosureTableModel, OrderedNodeModel};
use crate::tree::TreeRepository;

/// The sibling group a placement operates on: one parent's children, or the
/// set of roots.
enum SiblingGroup<Id> {
    Child(Id),
    Root,
}

/// Ordered tree engine: wraps [`TreeRepository`] and maintains the `position`
/// column within each sibling group.
///
/// First/last placements extend the group's position range (`min - 1` /
/// `max + 1`, or `0` in an empty group) so existing siblings are never
/// renumbered. Before/after placements shift the trailing siblings by one and
/// take the freed slot, which keeps integer positions exact without any
/// interpolation tie-break.
#[derive(Debug, Default)]
pub struct OrderedTreeRepository<M>
where
    M: OrderedNodeModel,
{
    tree: TreeRepository<M>,
}

impl<M> OrderedTreeRepository<M>
where
    M: OrderedNodeModel,
{
    pub fn new() -> Self {
        Self {
            tree: TreeRepository::new(),
        }
    }

    /// The unordered engine, for structural operations and reads that do not
    /// involve positions.
    pub fn tree(&self) -> &TreeRepository<M> {
        &self.tree
    }

    fn schema() -> &'static ClosureTableSchema {
        M::closure_table_schema()
    }

    // ------------------------------------------------------------------
    // Placements
    // ------------------------------------------------------------------

    /// Re-parent `node` under `parent` and order it before all of `parent`'s
    /// other children.
    pub async fn move_as_first_child(
        &self,
        db: &DatabaseConnection,
        node: &M,
        parent: &M,
    ) -> Result<(), ClosureTableError> {
        self.move_as_edge_child(db, node, parent, true).await
    }

    /// Re-parent `node` under `parent` and order it after all of `parent`'s
    /// other children.
    pub async fn move_as_last_child(
        &self,
        db: &DatabaseConnection,
        node: &M,
        parent: &M,
    ) -> Result<(), ClosureTableError> {
        self.move_as_edge_child(db, node, parent, false).await
    }

    /// Detach `node` and order it before all other roots.
    pub async fn make_first_root(
        &self,
        db: &DatabaseConnection,
        node: &M,
    ) -> Result<(), ClosureTableError> {
        self.make_edge_root(db, node, true).await
    }

    /// Detach `node` and order it after all other roots.
    pub async fn make_last_root(
        &self,
        db: &DatabaseConnection,
        node: &M,
    ) -> Result<(), ClosureTableError> {
        self.make_edge_root(db, node, false).await
    }

    /// Place `node` in `reference`'s sibling group, immediately before it.
    pub async fn move_before(
        &self,
        db: &DatabaseConnection,
        node: &M,
        reference: &M,
    ) -> Result<(), ClosureTableError> {
        self.move_adjacent(db, node, reference, true).await
    }

    /// Place `node` in `reference`'s sibling group, immediately after it.
    pub async fn move_after(
        &self,
        db: &DatabaseConnection,
        node: &M,
        reference: &M,
    ) -> Result<(), ClosureTableError> {
        self.move_adjacent(db, node, reference, false).await
    }

    /// Place `node` first within `reference`'s sibling group.
    pub async fn move_as_first_sibling(
        &self,
        db: &DatabaseConnection,
        node: &M,
        reference: &M,
    ) -> Result<(), ClosureTableError> {
        self.move_as_edge_sibling(db, node, reference, true).await
    }

    /// Place `node` last within `reference`'s sibling group.
    pub async fn move_as_last_sibling(
        &self,
        db: &DatabaseConnection,
        node: &M,
        reference: &M,
    ) -> Result<(), ClosureTableError> {
        self.move_as_edge_sibling(db, node, reference, false).await
    }

    // ------------------------------------------------------------------
    // Reads
    // ------------------------------------------------------------------

    /// Direct children ordered by position.
    pub async fn children<C: ConnectionTrait>(
        &self,
        conn: &C,
        node: &M,
    ) -> Result<Vec<M>, ClosureTableError> {
        let mut children = self.tree.children(conn, node).await?;
        children.sort_by_key(|m| m.position());
        Ok(children)
    }

    /// Roots ordered by position.
    pub async fn roots<C: ConnectionTrait>(&self, conn: &C) -> Result<Vec<M>, ClosureTableError> {
        let mut roots = self.tree.roots(conn).await?;
        roots.sort_by_key(|m| m.position());
        Ok(roots)
    }

    // ------------------------------------------------------------------
    // Internals
    // ------------------------------------------------------------------

    async fn move_as_edge_child(
        &self,
        db: &DatabaseConnection,
        node: &M,
        parent: &M,
        first: bool,
    ) -> Result<(), ClosureTableError> {
        let txn = LockedTransaction::acquire(Self::schema().advisory_lock_strategy(), db).await?;
        let result = async {
            let conn = txn.connection();
            let node_id = node.id();
            let parent_id = parent.id();
            self.tree
                .move_as_child_of_by_id(conn, &node_id, &parent_id)
                .await?;
            self.place_at_edge(conn, &node_id, &SiblingGroup::Child(parent_id), first)
                .await
        }
        .await;
        commit_on_ok(txn, result).await
    }

    async fn make_edge_root(
        &self,
        db: &DatabaseConnection,
        node: &M,
        first: bool,
    ) -> Result<(), ClosureTableError> {
        let txn = LockedTransaction::acquire(Self::schema().advisory_lock_strategy(), db).await?;
        let result = async {
            let conn = txn.connection();
            let node_id = node.id();
            self.tree.make_root_by_id(conn, &node_id).await?;
            self.place_at_edge(conn, &node_id, &SiblingGroup::Root, first)
                .await
        }
        .await;
        commit_on_ok(txn, result).await
    }

    async fn move_adjacent(
        &self,
        db: &DatabaseConnection,
        node: &M,
        reference: &M,
        before: bool,
    ) -> Result<(), ClosureTableError> {
        let txn = LockedTransaction::acquire(Self::schema().advisory_lock_strategy(), db).await?;
        let result = async {
            let conn = txn.connection();
            let node_id = node.id();
            let reference_id = reference.id();

            guard::assert_exists::<M, _>(conn, &node_id).await?;
            guard::assert_exists::<M, _>(conn, &reference_id).await?;
            guard::assert_different_nodes::<M>(&node_id, &reference_id)?;

            let reference_position = self.fresh_position(conn, &reference_id).await?;
            let group = match self.tree.store().parent_id(conn, &reference_id).await? {
                Some(parent_id) => {
                    self.tree
                        .move_as_child_of_by_id(conn, &node_id, &parent_id)
                        .await?;
                    SiblingGroup::Child(parent_id)
                }
                None => {
                    self.tree.make_root_by_id(conn, &node_id).await?;
                    SiblingGroup::Root
                }
            };

            if before {
                // Shift the reference and everything behind it one slot back,
                // then take the reference's old slot.
                self.shift_from(conn, &group, &node_id, reference_position, true)
                    .await?;
                self.set_position(conn, &node_id, reference_position).await
            } else {
                self.shift_from(conn, &group, &node_id, reference_position, false)
                    .await?;
                self.set_position(conn, &node_id, reference_position + 1)
                    .await
            }
        }
        .await;
        commit_on_ok(txn, result).await
    }

    async fn move_as_edge_sibling(
        &self,
        db: &DatabaseConnection,
        node: &M,
        reference: &M,
        first: bool,
    ) -> Result<(), ClosureTableError> {
        let txn = LockedTransaction::acquire(Self::schema().advisory_lock_strategy(), db).await?;
        let result = async {
            let conn = txn.connection();
            let node_id = node.id();
            let reference_id = reference.id();

            guard::assert_exists::<M, _>(conn, &node_id).await?;
            guard::assert_exists::<M, _>(conn, &reference_id).await?;
            guard::assert_different_nodes::<M>(&node_id, &reference_id)?;

            match self.tree.store().parent_id(conn, &reference_id).await? {
                Some(parent_id) => {
                    self.tree
                        .move_as_child_of_by_id(conn, &node_id, &parent_id)
                        .await?;
                    self.place_at_edge(conn, &node_id, &SiblingGroup::Child(parent_id), first)
                        .await
                }
                None => {
                    self.tree.make_root_by_id(conn, &node_id).await?;
                    self.place_at_edge(conn, &node_id, &SiblingGroup::Root, first)
                        .await
                }
            }
        }
        .await;
        commit_on_ok(txn, result).await
    }

    /// Set the node's position to one past the group's boundary, or `0` when
    /// the node is the group's only member.
    async fn place_at_edge<C: ConnectionTrait>(
        &self,
        conn: &C,
        node_id: &M::Id,
        group: &SiblingGroup<M::Id>,
        first: bool,
    ) -> Result<(), ClosureTableError> {
        let others = self.group_members(conn, group, Some(node_id)).await?;

        let boundary = if first {
            others.iter().map(|m| m.position()).min().map(|p| p - 1)
        } else {
            others.iter().map(|m| m.position()).max().map(|p| p + 1)
        };
        self.set_position(conn, node_id, boundary.unwrap_or(0)).await
    }

    /// Shift positions `>= threshold` (or `> threshold`) within the group by
    /// one, leaving the moved node itself untouched.
    async fn shift_from<C: ConnectionTrait>(
        &self,
        conn: &C,
        group: &SiblingGroup<M::Id>,
        moved_id: &M::Id,
        threshold: i64,
        inclusive: bool,
    ) -> Result<(), ClosureTableError> {
        let members = self.group_members(conn, group, Some(moved_id)).await?;
        if members.is_empty() {
            return Ok(());
        }

        let values: Vec<Value> = members
            .iter()
            .map(|m| M::id_to_value(&m.id()))
            .collect();

        let mut update = M::Entity::update_many()
            .col_expr(
                M::position_column(),
                Expr::col(M::position_column()).add(1),
            )
            .filter(M::id_column().is_in(values));
        update = if inclusive {
            update.filter(M::position_column().gte(threshold))
        } else {
            update.filter(M::position_column().gt(threshold))
        };
        update.exec(conn).await?;
        Ok(())
    }

    async fn group_members<C: ConnectionTrait>(
        &self,
        conn: &C,
        group: &SiblingGroup<M::Id>,
        exclude: Option<&M::Id>,
    ) -> Result<Vec<M>, ClosureTableError> {
        let members = match group {
            SiblingGroup::Child(parent_id) => {
                let ids = self.tree.store().child_ids(conn, parent_id).await?;
                self.tree.load_in_order(conn, &ids).await?
            }
            SiblingGroup::Root => self.tree.roots(conn).await?,
        };
        Ok(members
            .into_iter()
            .filter(|m| exclude.map_or(true, |id| m.id() != *id))
            .collect())
    }

    async fn set_position<C: ConnectionTrait>(
        &self,
        conn: &C,
        id: &M::Id,
        position: i64,
    ) -> Result<(), ClosureTableError> {
        M::Entity::update_many()
            .col_expr(M::position_column(), Expr::value(position))
            .filter(M::id_column().eq(M::id_to_value(id)))
            .exec(conn)
            .await?;
        Ok(())
    }

    async fn fresh_position<C: ConnectionTrait>(
        &self,
        conn: &C,
        id: &M::Id,
    ) -> Result<i64, ClosureTableError> {
        let model = self.tree.find_by_id(conn, id).await?.ok_or_else(|| {
            ClosureTableError::move_not_possible(format!(
                "node {:?} is not persisted",
                M::id_to_value(id)
            ))
        })?;
        Ok(model.position())
    }
}
