use closure_table::{ClosureTableError, OrderedTreeRepository};
use sea_orm::{
    ActiveModelTrait, ActiveValue, ConnectOptions, ConnectionTrait, Database, DatabaseConnection,
    DbBackend, EntityTrait, Statement,
};

mod entity {
    pub mod node {
        use closure_table::ClosureTableModelDerive as ClosureTableModel;
        use sea_orm::entity::prelude::*;

        #[derive(Clone, Debug, PartialEq, DeriveEntityModel, ClosureTableModel)]
        #[sea_orm(table_name = "nodes")]
        #[closure_table(
            closure_module = "crate::entity::node_closure",
            closure_table = "node_closures",
            position_field = "position"
        )]
        pub struct Model {
            #[sea_orm(primary_key)]
            pub id: i32,
            pub name: String,
            pub position: i64,
        }

        #[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
        pub enum Relation {}

        impl ActiveModelBehavior for ActiveModel {}
    }

    pub mod node_closure {
        use sea_orm::entity::prelude::*;

        #[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
        #[sea_orm(table_name = "node_closures")]
        pub struct Model {
            #[sea_orm(primary_key, auto_increment = false)]
            pub ancestor_id: i32,
            #[sea_orm(primary_key, auto_increment = false)]
            pub descendant_id: i32,
            pub depth: i32,
        }

        #[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
        pub enum Relation {}

        impl ActiveModelBehavior for ActiveModel {}
    }
}

type Node = entity::node::Model;

async fn setup_database() -> Result<DatabaseConnection, sea_orm::DbErr> {
    let mut options = ConnectOptions::new("sqlite::memory:");
    options.max_connections(1);
    let db = Database::connect(options).await?;

    db.execute(Statement::from_string(
        DbBackend::Sqlite,
        r#"
        CREATE TABLE nodes (
            id INTEGER PRIMARY KEY,
            name TEXT NOT NULL,
            position BIGINT NOT NULL DEFAULT 0
        )
        "#,
    ))
    .await?;

    db.execute(Statement::from_string(
        DbBackend::Sqlite,
        r#"
        CREATE TABLE node_closures (
            ancestor_id INTEGER NOT NULL,
            descendant_id INTEGER NOT NULL,
            depth INTEGER NOT NULL DEFAULT 0,
            PRIMARY KEY (ancestor_id, descendant_id)
        )
        "#,
    ))
    .await?;

    Ok(db)
}

async fn create_node(
    db: &DatabaseConnection,
    repo: &OrderedTreeRepository<Node>,
    id: i32,
    name: &str,
) -> Result<Node, Box<dyn std::error::Error>> {
    let model = entity::node::ActiveModel {
        id: ActiveValue::Set(id),
        name: ActiveValue::Set(name.to_owned()),
        position: ActiveValue::Set(0),
    }
    .insert(db)
    .await?;
    repo.tree().insert_node(db, &model).await?;
    Ok(model)
}

async fn set_position(
    db: &DatabaseConnection,
    id: i32,
    position: i64,
) -> Result<(), Box<dyn std::error::Error>> {
    entity::node::ActiveModel {
        id: ActiveValue::Set(id),
        position: ActiveValue::Set(position),
        ..Default::default()
    }
    .update(db)
    .await?;
    Ok(())
}

async fn fresh(db: &DatabaseConnection, id: i32) -> Result<Node, Box<dyn std::error::Error>> {
    let model = entity::node::Entity::find_by_id(id)
        .one(db)
        .await?
        .ok_or("node vanished")?;
    Ok(model)
}

fn names(models: &[Node]) -> Vec<&str> {
    models.iter().map(|m| m.name.as_str()).collect()
}

#[tokio::test]
async fn first_child_of_a_childless_parent_sits_at_zero() -> Result<(), Box<dyn std::error::Error>>
{
    let db = setup_database().await?;
    let repo = OrderedTreeRepository::<Node>::new();

    let parent = create_node(&db, &repo, 1, "parent").await?;
    let child = create_node(&db, &repo, 2, "child").await?;

    repo.move_as_first_child(&db, &child, &parent).await?;

    assert_eq!(
        repo.tree().parent(&db, &child).await?.map(|m| m.id),
        Some(1)
    );
    assert_eq!(fresh(&db, 2).await?.position, 0);
    assert_eq!(repo.tree().count_children(&db, &parent).await?, 1);

    Ok(())
}

#[tokio::test]
async fn first_child_lands_before_the_current_minimum() -> Result<(), Box<dyn std::error::Error>> {
    let db = setup_database().await?;
    let repo = OrderedTreeRepository::<Node>::new();

    let parent = create_node(&db, &repo, 1, "parent").await?;
    let existing1 = create_node(&db, &repo, 2, "existing1").await?;
    let existing2 = create_node(&db, &repo, 3, "existing2").await?;
    let newcomer = create_node(&db, &repo, 4, "new").await?;

    repo.tree().move_as_child_of(&db, &existing1, &parent).await?;
    set_position(&db, existing1.id, 5).await?;
    repo.tree().move_as_child_of(&db, &existing2, &parent).await?;
    set_position(&db, existing2.id, 10).await?;

    repo.move_as_first_child(&db, &newcomer, &parent).await?;

    assert_eq!(fresh(&db, 4).await?.position, 4);
    assert_eq!(repo.tree().count_children(&db, &parent).await?, 3);

    Ok(())
}

#[tokio::test]
async fn last_child_lands_after_the_current_maximum() -> Result<(), Box<dyn std::error::Error>> {
    let db = setup_database().await?;
    let repo = OrderedTreeRepository::<Node>::new();

    let parent = create_node(&db, &repo, 1, "parent").await?;
    let existing1 = create_node(&db, &repo, 2, "existing1").await?;
    let existing2 = create_node(&db, &repo, 3, "existing2").await?;
    let newcomer = create_node(&db, &repo, 4, "new").await?;

    repo.tree().move_as_child_of(&db, &existing1, &parent).await?;
    set_position(&db, existing1.id, 5).await?;
    repo.tree().move_as_child_of(&db, &existing2, &parent).await?;
    set_position(&db, existing2.id, 10).await?;

    repo.move_as_last_child(&db, &newcomer, &parent).await?;

    assert_eq!(fresh(&db, 4).await?.position, 11);
    assert_eq!(repo.tree().count_children(&db, &parent).await?, 3);

    Ok(())
}

#[tokio::test]
async fn root_level_node_can_become_a_positioned_child() -> Result<(), Box<dyn std::error::Error>> {
    let db = setup_database().await?;
    let repo = OrderedTreeRepository::<Node>::new();

    let parent = create_node(&db, &repo, 1, "parent").await?;
    let root_node = create_node(&db, &repo, 2, "root_node").await?;

    assert!(repo.tree().is_root(&db, &root_node).await?);

    repo.move_as_first_child(&db, &root_node, &parent).await?;

    assert!(!repo.tree().is_root(&db, &root_node).await?);
    assert_eq!(repo.tree().depth(&db, &root_node).await?, 1);
    assert_eq!(repo.tree().count_children(&db, &parent).await?, 1);

    repo.move_as_last_child(&db, &root_node, &parent).await?;

    assert_eq!(repo.tree().depth(&db, &root_node).await?, 1);
    assert_eq!(repo.tree().count_children(&db, &parent).await?, 1);

    Ok(())
}

#[tokio::test]
async fn make_first_root_lands_before_existing_roots() -> Result<(), Box<dyn std::error::Error>> {
    let db = setup_database().await?;
    let repo = OrderedTreeRepository::<Node>::new();

    create_node(&db, &repo, 1, "root1").await?;
    set_position(&db, 1, 5).await?;
    create_node(&db, &repo, 2, "root2").await?;
    set_position(&db, 2, 10).await?;

    let parent = fresh(&db, 1).await?;
    let newcomer = create_node(&db, &repo, 3, "new_root").await?;
    repo.move_as_first_child(&db, &newcomer, &parent).await?;
    repo.make_first_root(&db, &newcomer).await?;

    assert!(repo.tree().is_root(&db, &newcomer).await?);
    assert_eq!(fresh(&db, 3).await?.position, 4);

    Ok(())
}

#[tokio::test]
async fn make_last_root_lands_after_existing_roots() -> Result<(), Box<dyn std::error::Error>> {
    let db = setup_database().await?;
    let repo = OrderedTreeRepository::<Node>::new();

    create_node(&db, &repo, 1, "root1").await?;
    set_position(&db, 1, 5).await?;
    create_node(&db, &repo, 2, "root2").await?;
    set_position(&db, 2, 10).await?;

    let newcomer = create_node(&db, &repo, 3, "new_root").await?;
    repo.make_last_root(&db, &newcomer).await?;

    assert!(repo.tree().is_root(&db, &newcomer).await?);
    assert_eq!(fresh(&db, 3).await?.position, 11);

    Ok(())
}

#[tokio::test]
async fn mixed_edge_placements_keep_the_expected_order() -> Result<(), Box<dyn std::error::Error>> {
    let db = setup_database().await?;
    let repo = OrderedTreeRepository::<Node>::new();

    let root = create_node(&db, &repo, 1, "root").await?;
    let child1 = create_node(&db, &repo, 2, "child1").await?;
    let child2 = create_node(&db, &repo, 3, "child2").await?;
    let child3 = create_node(&db, &repo, 4, "child3").await?;

    repo.move_as_last_child(&db, &child2, &root).await?;
    repo.move_as_first_child(&db, &child1, &root).await?;
    repo.move_as_last_child(&db, &child3, &root).await?;

    let children = repo.children(&db, &root).await?;
    assert_eq!(names(&children), vec!["child1", "child2", "child3"]);
    assert!(children[0].position < children[1].position);
    assert!(children[1].position < children[2].position);

    Ok(())
}

#[tokio::test]
async fn reordering_within_the_same_parent() -> Result<(), Box<dyn std::error::Error>> {
    let db = setup_database().await?;
    let repo = OrderedTreeRepository::<Node>::new();

    let parent = create_node(&db, &repo, 1, "parent").await?;
    let child1 = create_node(&db, &repo, 2, "child1").await?;
    let child2 = create_node(&db, &repo, 3, "child2").await?;

    repo.move_as_last_child(&db, &child1, &parent).await?;
    repo.move_as_last_child(&db, &child2, &parent).await?;

    let children = repo.children(&db, &parent).await?;
    assert_eq!(names(&children), vec!["child1", "child2"]);

    repo.move_as_first_child(&db, &child2, &parent).await?;

    let children = repo.children(&db, &parent).await?;
    assert_eq!(names(&children), vec!["child2", "child1"]);

    repo.move_as_last_child(&db, &child2, &parent).await?;

    let children = repo.children(&db, &parent).await?;
    assert_eq!(names(&children), vec!["child1", "child2"]);

    Ok(())
}

#[tokio::test]
async fn moving_a_node_between_parents() -> Result<(), Box<dyn std::error::Error>> {
    let db = setup_database().await?;
    let repo = OrderedTreeRepository::<Node>::new();

    let parent1 = create_node(&db, &repo, 1, "parent1").await?;
    let parent2 = create_node(&db, &repo, 2, "parent2").await?;
    let child = create_node(&db, &repo, 3, "child").await?;

    repo.move_as_first_child(&db, &child, &parent1).await?;
    assert_eq!(repo.tree().count_children(&db, &parent1).await?, 1);
    assert_eq!(repo.tree().count_children(&db, &parent2).await?, 0);

    repo.move_as_last_child(&db, &child, &parent2).await?;
    assert_eq!(
        repo.tree().parent(&db, &child).await?.map(|m| m.id),
        Some(2)
    );
    assert_eq!(repo.tree().count_children(&db, &parent1).await?, 0);
    assert_eq!(repo.tree().count_children(&db, &parent2).await?, 1);

    Ok(())
}

#[tokio::test]
async fn move_before_takes_the_reference_slot() -> Result<(), Box<dyn std::error::Error>> {
    let db = setup_database().await?;
    let repo = OrderedTreeRepository::<Node>::new();

    let parent = create_node(&db, &repo, 1, "parent").await?;
    let child1 = create_node(&db, &repo, 2, "child1").await?;
    let child2 = create_node(&db, &repo, 3, "child2").await?;
    let newcomer = create_node(&db, &repo, 4, "new").await?;

    repo.tree().move_as_child_of(&db, &child1, &parent).await?;
    set_position(&db, child1.id, 5).await?;
    repo.tree().move_as_child_of(&db, &child2, &parent).await?;
    set_position(&db, child2.id, 10).await?;

    let child2 = fresh(&db, 3).await?;
    repo.move_before(&db, &newcomer, &child2).await?;

    assert_eq!(fresh(&db, 2).await?.position, 5);
    assert_eq!(fresh(&db, 4).await?.position, 10);
    assert_eq!(fresh(&db, 3).await?.position, 11);

    let children = repo.children(&db, &parent).await?;
    assert_eq!(names(&children), vec!["child1", "new", "child2"]);

    Ok(())
}

#[tokio::test]
async fn move_after_slots_in_behind_the_reference() -> Result<(), Box<dyn std::error::Error>> {
    let db = setup_database().await?;
    let repo = OrderedTreeRepository::<Node>::new();

    let parent = create_node(&db, &repo, 1, "parent").await?;
    let child1 = create_node(&db, &repo, 2, "child1").await?;
    let child2 = create_node(&db, &repo, 3, "child2").await?;
    let newcomer = create_node(&db, &repo, 4, "new").await?;

    repo.tree().move_as_child_of(&db, &child1, &parent).await?;
    set_position(&db, child1.id, 5).await?;
    repo.tree().move_as_child_of(&db, &child2, &parent).await?;
    set_position(&db, child2.id, 10).await?;

    let child1 = fresh(&db, 2).await?;
    repo.move_after(&db, &newcomer, &child1).await?;

    assert_eq!(fresh(&db, 2).await?.position, 5);
    assert_eq!(fresh(&db, 4).await?.position, 6);
    assert_eq!(fresh(&db, 3).await?.position, 11);

    let children = repo.children(&db, &parent).await?;
    assert_eq!(names(&children), vec!["child1", "new", "child2"]);

    Ok(())
}

#[tokio::test]
async fn adjacent_moves_follow_a_root_reference() -> Result<(), Box<dyn std::error::Error>> {
    let db = setup_database().await?;
    let repo = OrderedTreeRepository::<Node>::new();

    let root1 = create_node(&db, &repo, 1, "root1").await?;
    let root2 = create_node(&db, &repo, 2, "root2").await?;
    let child = create_node(&db, &repo, 3, "child").await?;

    repo.make_last_root(&db, &root2).await?;
    repo.move_as_first_child(&db, &child, &root1).await?;

    let root2 = fresh(&db, 2).await?;
    repo.move_before(&db, &child, &root2).await?;

    assert!(repo.tree().is_root(&db, &child).await?);
    let roots = repo.roots(&db).await?;
    assert_eq!(names(&roots), vec!["root1", "child", "root2"]);

    Ok(())
}

#[tokio::test]
async fn edge_sibling_moves_join_the_reference_group() -> Result<(), Box<dyn std::error::Error>> {
    let db = setup_database().await?;
    let repo = OrderedTreeRepository::<Node>::new();

    let parent = create_node(&db, &repo, 1, "parent").await?;
    let child1 = create_node(&db, &repo, 2, "child1").await?;
    let child2 = create_node(&db, &repo, 3, "child2").await?;
    let newcomer = create_node(&db, &repo, 4, "new").await?;

    repo.move_as_last_child(&db, &child1, &parent).await?;
    repo.move_as_last_child(&db, &child2, &parent).await?;

    repo.move_as_first_sibling(&db, &newcomer, &child2).await?;
    let children = repo.children(&db, &parent).await?;
    assert_eq!(names(&children), vec!["new", "child1", "child2"]);

    repo.move_as_last_sibling(&db, &newcomer, &child1).await?;
    let children = repo.children(&db, &parent).await?;
    assert_eq!(names(&children), vec!["child1", "child2", "new"]);

    Ok(())
}

#[tokio::test]
async fn adjacent_move_rejects_the_node_itself() -> Result<(), Box<dyn std::error::Error>> {
    let db = setup_database().await?;
    let repo = OrderedTreeRepository::<Node>::new();

    let node = create_node(&db, &repo, 1, "node").await?;

    let err = repo.move_before(&db, &node, &node).await.unwrap_err();
    assert!(matches!(err, ClosureTableError::SameNode(_)));

    Ok(())
}
