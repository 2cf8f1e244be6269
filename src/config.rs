use crc32fast::Hasher;

/// Static description of the closure relation backing one node type.
///
/// Holds the closure table name together with its three column identifiers.
/// The identifiers are validated once at construction; every statement the
/// engine builds is derived from this descriptor, so no runtime column-name
/// lookup happens anywhere else.
#[derive(Clone, Debug)]
pub struct ClosureTableSchema {
    entity_name: String,
    closure_table: String,
    ancestor_column: String,
    descendant_column: String,
    depth_column: String,
    advisory_lock_strategy: AdvisoryLockStrategy,
}

impl ClosureTableSchema {
    /// Create a new schema descriptor with the conventional column names.
    ///
    /// # Panics
    ///
    /// Panics if `closure_table` is empty.
    pub fn new(entity_name: impl Into<String>, closure_table: impl Into<String>) -> Self {
        let entity_name = entity_name.into();
        let closure_table = closure_table.into();

        let default_lock = AdvisoryLockStrategy::Namespaced(AdvisoryLockKey::derived_from(
            &entity_name,
            &closure_table,
        ));

        let schema = Self {
            entity_name,
            closure_table,
            ancestor_column: "ancestor_id".to_string(),
            descendant_column: "descendant_id".to_string(),
            depth_column: "depth".to_string(),
            advisory_lock_strategy: default_lock,
        };
        schema.validate();
        schema
    }

    /// Merge options produced by [`ClosureTableOptions`].
    ///
    /// # Panics
    ///
    /// Panics if the resulting column identifiers are empty or not pairwise
    /// distinct.
    pub(crate) fn apply_options(mut self, options: ClosureTableOptions) -> Self {
        if let Some(closure_table) = options.closure_table {
            self.closure_table = closure_table;
        }
        if let Some(ancestor_column) = options.ancestor_column {
            self.ancestor_column = ancestor_column;
        }
        if let Some(descendant_column) = options.descendant_column {
            self.descendant_column = descendant_column;
        }
        if let Some(depth_column) = options.depth_column {
            self.depth_column = depth_column;
        }
        if let Some(strategy) = options.advisory_lock_strategy {
            self.advisory_lock_strategy = strategy;
        }
        self.validate();
        self
    }

    fn validate(&self) {
        assert!(
            !self.closure_table.is_empty(),
            "closure table name must not be empty"
        );
        let columns = [
            self.ancestor_column.as_str(),
            self.descendant_column.as_str(),
            self.depth_column.as_str(),
        ];
        for column in columns {
            assert!(!column.is_empty(), "closure column names must not be empty");
        }
        assert!(
            columns[0] != columns[1] && columns[0] != columns[2] && columns[1] != columns[2],
            "closure columns must be pairwise distinct: {columns:?}"
        );
    }

    /// Human-readable Rust struct name for the base entity.
    pub fn entity_name(&self) -> &str {
        &self.entity_name
    }

    /// Table backing the closure relation.
    pub fn closure_table(&self) -> &str {
        &self.closure_table
    }

    /// Column holding the ancestor id of an edge.
    pub fn ancestor_column(&self) -> &str {
        &self.ancestor_column
    }

    /// Column holding the descendant id of an edge.
    pub fn descendant_column(&self) -> &str {
        &self.descendant_column
    }

    /// Column holding the hop count of an edge.
    pub fn depth_column(&self) -> &str {
        &self.depth_column
    }

    /// Advisory lock strategy (PostgreSQL only).
    pub fn advisory_lock_strategy(&self) -> &AdvisoryLockStrategy {
        &self.advisory_lock_strategy
    }
}

/// Builder-style options consumed by the derive macro.
#[derive(Clone, Debug, Default)]
pub struct ClosureTableOptions {
    closure_table: Option<String>,
    ancestor_column: Option<String>,
    descendant_column: Option<String>,
    depth_column: Option<String>,
    advisory_lock_strategy: Option<AdvisoryLockStrategy>,
}

impl ClosureTableOptions {
    pub fn closure_table(mut self, value: impl Into<String>) -> Self {
        self.closure_table = Some(value.into());
        self
    }

    pub fn ancestor_column(mut self, value: impl Into<String>) -> Self {
        self.ancestor_column = Some(value.into());
        self
    }

    pub fn descendant_column(mut self, value: impl Into<String>) -> Self {
        self.descendant_column = Some(value.into());
        self
    }

    pub fn depth_column(mut self, value: impl Into<String>) -> Self {
        self.depth_column = Some(value.into());
        self
    }

    pub fn advisory_lock_strategy(mut self, strategy: AdvisoryLockStrategy) -> Self {
        self.advisory_lock_strategy = Some(strategy);
        self
    }

    pub fn apply(self, base: ClosureTableSchema) -> ClosureTableSchema {
        base.apply_options(self)
    }
}

/// Key used for PostgreSQL advisory locks.
#[derive(Clone, Debug, Eq, PartialEq, Hash)]
pub struct AdvisoryLockKey(String);

impl AdvisoryLockKey {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }

    fn derived_from(entity: &str, closure_table: &str) -> Self {
        let mut hasher = Hasher::new();
        hasher.update(entity.as_bytes());
        hasher.update(b"/");
        hasher.update(closure_table.as_bytes());
        let crc = hasher.finalize();
        Self(format!("closure-table::{entity}::{closure_table}::{crc:x}"))
    }
}

/// Configuration describing how to acquire advisory locks.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum AdvisoryLockStrategy {
    Disabled,
    Namespaced(AdvisoryLockKey),
}

impl AdvisoryLockStrategy {
    pub fn key(&self) -> Option<&AdvisoryLockKey> {
        match self {
            AdvisoryLockStrategy::Disabled => None,
            AdvisoryLockStrategy::Namespaced(key) => Some(key),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn schema_defaults_to_conventional_columns() {
        let schema = ClosureTableSchema::new("Node", "node_closures");
        assert_eq!(schema.ancestor_column(), "ancestor_id");
        assert_eq!(schema.descendant_column(), "descendant_id");
        assert_eq!(schema.depth_column(), "depth");
        assert!(schema.advisory_lock_strategy().key().is_some());
    }

    #[test]
    fn options_override_columns() {
        let schema = ClosureTableOptions::default()
            .ancestor_column("parent")
            .descendant_column("child")
            .depth_column("hops")
            .apply(ClosureTableSchema::new("Node", "node_closures"));
        assert_eq!(schema.ancestor_column(), "parent");
        assert_eq!(schema.descendant_column(), "child");
        assert_eq!(schema.depth_column(), "hops");
    }

    #[test]
    #[should_panic(expected = "pairwise distinct")]
    fn duplicate_columns_are_rejected() {
        let _ = ClosureTableOptions::default()
            .descendant_column("ancestor_id")
            .apply(ClosureTableSchema::new("Node", "node_closures"));
    }

    #[test]
    fn lock_keys_are_namespaced_per_relation() {
        let a = ClosureTableSchema::new("Node", "node_closures");
        let b = ClosureTableSchema::new("Category", "category_closures");
        assert_ne!(
            a.advisory_lock_strategy().key(),
            b.advisory_lock_strategy().key()
        );
    }
}
