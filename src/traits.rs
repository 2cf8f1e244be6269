use sea_orm::{
    ActiveModelBehavior, ActiveModelTrait, EntityTrait, FromQueryResult, IntoActiveModel, Value,
};

use crate::config::ClosureTableSchema;

/// Trait implemented by SeaORM `Model` types that participate in a closure
/// table hierarchy.
///
/// Implementations are normally provided by the `#[derive(ClosureTableModel)]`
/// macro. The model contributes nothing structural beyond its id; every tree
/// relationship is derived from the closure relation.
pub trait ClosureTableModel:
    Clone + Send + Sync + 'static + IntoActiveModel<Self::ActiveModel> + FromQueryResult
{
    type Entity: EntityTrait<Model = Self>;
    type ActiveModel: ActiveModelTrait<Entity = Self::Entity> + ActiveModelBehavior + Send;
    type Id: Clone + PartialEq + Send + Sync + 'static;

    type ClosureEntity: EntityTrait<Model = Self::ClosureModel>;
    type ClosureModel: Clone + Send + Sync + 'static + FromQueryResult;
    type ClosureActiveModel: ActiveModelTrait<Entity = Self::ClosureEntity>
        + ActiveModelBehavior
        + Send;

    fn closure_table_schema() -> &'static ClosureTableSchema;

    fn id(&self) -> Self::Id;
    fn id_to_value(id: &Self::Id) -> Value;
    fn id_column() -> <Self::Entity as EntityTrait>::Column;

    fn closure_ancestor_column() -> <Self::ClosureEntity as EntityTrait>::Column;
    fn closure_descendant_column() -> <Self::ClosureEntity as EntityTrait>::Column;
    fn closure_depth_column() -> <Self::ClosureEntity as EntityTrait>::Column;

    fn closure_model_ancestor(model: &Self::ClosureModel) -> Self::Id;
    fn closure_model_descendant(model: &Self::ClosureModel) -> Self::Id;
    fn closure_model_depth(model: &Self::ClosureModel) -> i32;
    fn closure_build_row(
        ancestor: Self::Id,
        descendant: Self::Id,
        depth: i32,
    ) -> Self::ClosureActiveModel;
}

/// Extension contract for models whose siblings carry an explicit ordering.
///
/// The position column must be an `i64`; only the relative order of values is
/// meaningful, so gaps and negative values are expected.
pub trait OrderedNodeModel: ClosureTableModel {
    fn position(&self) -> i64;
    fn set_position(active: &mut Self::ActiveModel, position: i64);
    fn position_column() -> <Self::Entity as EntityTrait>::Column;
}
