//! Reconciler
//!
//! Folds the snapshot and every change-set file into one view of the schema
//! and reports each foreign-key column no index supports. Events are applied
//! in a single total order: the snapshot first, then change-set files in the
//! order the caller supplies. A column's kind comes from its latest type
//! change if it has one, else from its latest declaration.

use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};

use super::snapshot::SnapshotFacts;
use super::ExtractedFile;
use crate::config::ReportScope;
use crate::domain::{
    ColumnDeclaration, ColumnKind, ColumnTypeChange, Diagnostic, DiagnosticKind, IndexDeclaration,
    InlineIndex, Location, SchemaEvent, Violation, ViolationReason,
};

/// Knobs that change what counts as a violation
#[derive(Debug, Clone)]
pub struct ReconcileOptions {
    /// Column name suffix marking a foreign key
    pub foreign_key_suffix: String,
    /// Treat `references` / `belongs_to` columns as indexed unless they say
    /// `index: false`
    pub references_indexed_by_default: bool,
    pub scope: ReportScope,
    /// `table.column` or `*.column`
    pub ignored_columns: Vec<String>,
}

impl Default for ReconcileOptions {
    fn default() -> Self {
        Self {
            foreign_key_suffix: "_id".to_string(),
            references_indexed_by_default: false,
            scope: ReportScope::Changed,
            ignored_columns: Vec::new(),
        }
    }
}

/// Counters for the run summary
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ReconcileStats {
    /// Change-set files folded
    pub files: usize,
    /// Columns alive after the fold
    pub columns_tracked: usize,
    /// Columns that qualify as foreign keys
    pub foreign_keys: usize,
    /// Distinct indexes by table and column set
    pub indexes: usize,
}

#[derive(Debug, Clone)]
pub struct Reconciliation {
    /// Ordered by table, column, then first-seen location
    pub violations: Vec<Violation>,
    /// Extraction diagnostics in fold order, then the reconciler's own
    pub diagnostics: Vec<Diagnostic>,
    pub stats: ReconcileStats,
}

type ColumnKey = (String, String);

#[derive(Debug, Clone)]
struct ColumnState {
    /// Kind given by the most recent declaration
    declared_kind: ColumnKind,
    declared_location: Location,
    /// False while only a type change has been seen
    declared: bool,
    /// Most recent type change, which outranks any declaration
    retyped: Option<(ColumnKind, Location)>,
    /// `index:` option of the most recent declaration
    inline_index: InlineIndex,
    first_seen: Location,
    /// Declared, retyped or renamed by a change-set file
    touched: bool,
}

impl ColumnState {
    fn effective_kind(&self) -> ColumnKind {
        self.retyped.as_ref().map_or(self.declared_kind, |(kind, _)| *kind)
    }

    /// Statement that gave the column its effective kind
    fn kind_location(&self) -> &Location {
        self.retyped
            .as_ref()
            .map_or(&self.declared_location, |(_, location)| location)
    }
}

#[derive(Debug, Default)]
struct SchemaState {
    columns: BTreeMap<ColumnKey, ColumnState>,
    indexes: Vec<IndexDeclaration>,
    /// Every column some declaration named, whatever happened to it later
    declared_anywhere: BTreeSet<ColumnKey>,
    /// Type changes applied before any declaration of their column
    undeclared_retypes: Vec<ColumnTypeChange>,
}

impl SchemaState {
    fn apply(&mut self, event: &SchemaEvent, from_change_set: bool) {
        match event {
            // Tables only exist through their columns
            SchemaEvent::TableDefined(_) => {}
            SchemaEvent::TableDropped(drop) => {
                self.columns.retain(|(table, _), _| table != &drop.table);
                self.indexes.retain(|index| index.table != drop.table);
            }
            SchemaEvent::TableRenamed(rename) => {
                let moved: Vec<ColumnKey> = self
                    .columns
                    .keys()
                    .filter(|(table, _)| table == &rename.from)
                    .cloned()
                    .collect();
                for key in moved {
                    if let Some(state) = self.columns.remove(&key) {
                        self.columns.insert((rename.to.clone(), key.1), state);
                    }
                }
                for index in self.indexes.iter_mut().filter(|i| i.table == rename.from) {
                    index.table = rename.to.clone();
                }
            }
            SchemaEvent::ColumnDeclared(decl) => self.declare(decl, from_change_set),
            SchemaEvent::ColumnRetyped(change) => self.retype(change, from_change_set),
            SchemaEvent::ColumnRenamed(rename) => {
                let from = (rename.table.clone(), rename.from.clone());
                // Renaming a column nothing declared leaves nothing to move
                if let Some(mut state) = self.columns.remove(&from) {
                    state.touched |= from_change_set;
                    self.columns
                        .insert((rename.table.clone(), rename.to.clone()), state);
                }
                for index in self.indexes.iter_mut().filter(|i| i.table == rename.table) {
                    for column in index.columns.iter_mut().filter(|c| **c == rename.from) {
                        *column = rename.to.clone();
                    }
                }
            }
            SchemaEvent::ColumnRemoved(removal) => {
                self.columns
                    .remove(&(removal.table.clone(), removal.column.clone()));
                self.indexes
                    .retain(|index| !(index.table == removal.table && index.contains(&removal.column)));
            }
            SchemaEvent::IndexAdded(index) => {
                let known = self
                    .indexes
                    .iter()
                    .any(|i| i.table == index.table && i.columns == index.columns);
                if !known {
                    self.indexes.push(index.clone());
                }
            }
        }
    }

    fn declare(&mut self, decl: &ColumnDeclaration, from_change_set: bool) {
        let key = (decl.table.clone(), decl.column.clone());
        self.declared_anywhere.insert(key.clone());
        match self.columns.get_mut(&key) {
            Some(state) => {
                state.declared_kind = decl.kind;
                state.declared_location = decl.location.clone();
                state.declared = true;
                state.inline_index = decl.inline_index;
                state.touched |= from_change_set;
            }
            None => {
                self.columns.insert(
                    key,
                    ColumnState {
                        declared_kind: decl.kind,
                        declared_location: decl.location.clone(),
                        declared: true,
                        retyped: None,
                        inline_index: decl.inline_index,
                        first_seen: decl.location.clone(),
                        touched: from_change_set,
                    },
                );
            }
        }
    }

    fn retype(&mut self, change: &ColumnTypeChange, from_change_set: bool) {
        let key = (change.table.clone(), change.column.clone());
        let retyped = Some((change.new_kind, change.location.clone()));
        match self.columns.get_mut(&key) {
            Some(state) => {
                if !state.declared {
                    self.undeclared_retypes.push(change.clone());
                }
                state.retyped = retyped;
                state.touched |= from_change_set;
            }
            None => {
                self.undeclared_retypes.push(change.clone());
                self.columns.insert(
                    key,
                    ColumnState {
                        declared_kind: change.new_kind,
                        declared_location: change.location.clone(),
                        declared: false,
                        retyped,
                        inline_index: InlineIndex::Unspecified,
                        first_seen: change.location.clone(),
                        touched: from_change_set,
                    },
                );
            }
        }
    }

    /// Type changes whose column no declaration in the whole fold names
    fn ambiguous_retypes(&self) -> Vec<Diagnostic> {
        self.undeclared_retypes
            .iter()
            .filter(|change| {
                !self
                    .declared_anywhere
                    .contains(&(change.table.clone(), change.column.clone()))
            })
            .map(|change| {
                Diagnostic::new(
                    DiagnosticKind::AmbiguousRetype,
                    change.location.clone(),
                    format!(
                        "{}.{} changes type but was never declared; assuming {}",
                        change.table, change.column, change.new_kind
                    ),
                )
            })
            .collect()
    }

    /// Whether some index on `table` leads with `column`
    fn has_leading_index(&self, table: &str, column: &str) -> bool {
        self.indexes
            .iter()
            .any(|index| index.table == table && index.leading_column() == Some(column))
    }

    fn distinct_indexes(&self) -> usize {
        self.indexes
            .iter()
            .map(IndexDeclaration::identity)
            .collect::<BTreeSet<_>>()
            .len()
    }
}

/// Merges extractor output into the violation list
#[derive(Debug, Clone, Default)]
pub struct Reconciler {
    options: ReconcileOptions,
}

impl Reconciler {
    pub fn new(options: ReconcileOptions) -> Self {
        Self { options }
    }

    /// Fold the snapshot, then `change_set` in the order given
    pub fn reconcile(&self, snapshot: &SnapshotFacts, change_set: &[ExtractedFile]) -> Reconciliation {
        let mut state = SchemaState::default();
        let mut diagnostics = snapshot.diagnostics.clone();

        for event in &snapshot.events {
            state.apply(event, false);
        }
        for file in change_set {
            diagnostics.extend(file.diagnostics.iter().cloned());
            for event in &file.events {
                state.apply(event, true);
            }
        }

        let mut violations = Vec::new();
        let mut foreign_keys = 0;
        for ((table, column), column_state) in &state.columns {
            let kind = column_state.effective_kind();
            if !self.is_foreign_key(column, kind) {
                continue;
            }
            foreign_keys += 1;

            if self.is_satisfied(&state, table, column, column_state)
                || self.is_ignored(table, column)
                || (self.options.scope == ReportScope::Changed && !column_state.touched)
            {
                continue;
            }

            violations.push(Violation {
                table: table.clone(),
                column: column.clone(),
                reason: ViolationReason::MissingIndex,
                inferred_kind: kind,
                location: column_state.kind_location().clone(),
                first_seen: column_state.first_seen.clone(),
            });
        }

        violations.sort_by(|a, b| {
            (&a.table, &a.column, &a.first_seen).cmp(&(&b.table, &b.column, &b.first_seen))
        });

        let stats = ReconcileStats {
            files: change_set.len(),
            columns_tracked: state.columns.len(),
            foreign_keys,
            indexes: state.distinct_indexes(),
        };
        diagnostics.extend(state.ambiguous_retypes());

        Reconciliation {
            violations,
            diagnostics,
            stats,
        }
    }

    fn is_foreign_key(&self, column: &str, kind: ColumnKind) -> bool {
        column.ends_with(&self.options.foreign_key_suffix) && kind.is_foreign_key_shaped()
    }

    fn is_satisfied(&self, state: &SchemaState, table: &str, column: &str, column_state: &ColumnState) -> bool {
        if column_state.inline_index == InlineIndex::Requested {
            return true;
        }
        if self.options.references_indexed_by_default
            && column_state.declared_kind == ColumnKind::Reference
            && column_state.inline_index != InlineIndex::Declined
        {
            return true;
        }
        state.has_leading_index(table, column)
    }

    fn is_ignored(&self, table: &str, column: &str) -> bool {
        self.options.ignored_columns.iter().any(|pattern| {
            match pattern.split_once('.') {
                Some(("*", ignored)) => ignored == column,
                Some((ignored_table, ignored)) => ignored_table == table && ignored == column,
                None => false,
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::{extract_file, snapshot};
    use std::path::Path;

    fn migration(name: &str, text: &str) -> ExtractedFile {
        extract_file(Path::new(&format!("db/migrate/{}", name)), text, false)
    }

    fn no_snapshot() -> SnapshotFacts {
        SnapshotFacts::default()
    }

    fn reconcile(snapshot: &SnapshotFacts, files: &[ExtractedFile]) -> Reconciliation {
        Reconciler::default().reconcile(snapshot, files)
    }

    fn flagged(result: &Reconciliation) -> Vec<(&str, &str)> {
        result
            .violations
            .iter()
            .map(|v| (v.table.as_str(), v.column.as_str()))
            .collect()
    }

    #[test]
    fn test_inline_index_satisfies() {
        let file = migration(
            "1_create_albums.rb",
            "create_table :albums do |t|\n  t.bigint :comment_id, index: true\nend\n",
        );
        let result = reconcile(&no_snapshot(), &[file]);
        assert!(result.violations.is_empty());
        assert_eq!(result.stats.foreign_keys, 1);
    }

    #[test]
    fn test_missing_index_reported_once() {
        let file = migration(
            "1_create_albums.rb",
            "create_table :albums do |t|\n  t.bigint :comment_id\n  t.bigint :comment_id\nend\n",
        );
        let result = reconcile(&no_snapshot(), &[file]);
        assert_eq!(flagged(&result), vec![("albums", "comment_id")]);

        let violation = &result.violations[0];
        assert_eq!(violation.reason, ViolationReason::MissingIndex);
        assert_eq!(violation.first_seen.line, 2);
        assert_eq!(violation.location.line, 3);
        assert_eq!(violation.suggestion(), "add_index :albums, :comment_id");
    }

    #[test]
    fn test_cross_file_index_satisfies() {
        let a = migration("1_add.rb", "add_column :albums, :comment_id, :bigint\n");
        let b = migration("2_index.rb", "add_index :albums, :comment_id\n");
        assert!(reconcile(&no_snapshot(), &[a.clone(), b.clone()]).violations.is_empty());
        // Coverage does not depend on which file comes first
        assert!(reconcile(&no_snapshot(), &[b, a]).violations.is_empty());
    }

    #[test]
    fn test_retype_uses_final_kind() {
        let declare_string = migration("1_add.rb", "add_column :albums, :comment_id, :string\n");
        let to_bigint = migration("2_change.rb", "change_column :albums, :comment_id, :bigint\n");
        let result = reconcile(&no_snapshot(), &[declare_string, to_bigint]);
        assert_eq!(result.violations.len(), 1);
        assert_eq!(result.violations[0].inferred_kind, ColumnKind::Bigint);
        assert_eq!(
            result.violations[0].location.file,
            Path::new("db/migrate/2_change.rb")
        );

        let declare_bigint = migration("1_add.rb", "add_column :albums, :comment_id, :bigint\n");
        let to_string = migration("2_change.rb", "change_column :albums, :comment_id, :string\n");
        assert!(reconcile(&no_snapshot(), &[declare_bigint, to_string])
            .violations
            .is_empty());
    }

    #[test]
    fn test_composite_index_covers_leading_column_only() {
        let file = migration(
            "1_employees.rb",
            r#"
create_table :employees do |t|
  t.bigint :company_id
  t.bigint :department_id
end
add_index :employees, [:company_id, :department_id]
"#,
        );
        let result = reconcile(&no_snapshot(), &[file]);
        assert_eq!(flagged(&result), vec![("employees", "department_id")]);
    }

    #[test]
    fn test_reversed_composite_keeps_both_orderings() {
        let file = migration(
            "1_employees.rb",
            r#"
add_column :employees, :company_id, :bigint
add_column :employees, :department_id, :bigint
add_index :employees, [:company_id, :department_id]
add_index :employees, [:department_id, :company_id]
"#,
        );
        let result = reconcile(&no_snapshot(), &[file]);
        assert!(result.violations.is_empty());
        assert_eq!(result.stats.indexes, 1);
    }

    #[test]
    fn test_snapshot_only_index_is_honored() {
        let schema = snapshot::extract(
            Path::new("db/schema.rb"),
            r#"
ActiveRecord::Schema[7.1].define(version: 2024_01_01_000000) do
  create_table "albums", force: :cascade do |t|
    t.bigint "comment_id"
    t.bigint "artist_id"
    t.index ["comment_id"], name: "index_albums_on_comment_id"
  end
end
"#,
            false,
        );
        let file = migration("3_add_label.rb", "add_column :albums, :label_id, :bigint, index: true\n");
        let result = reconcile(&schema, &[file]);
        assert!(result.violations.is_empty());
        assert_eq!(result.stats.columns_tracked, 3);

        // Snapshot-only gaps surface when reporting everything
        let all = Reconciler::new(ReconcileOptions {
            scope: ReportScope::All,
            ..ReconcileOptions::default()
        })
        .reconcile(&schema, &[]);
        assert_eq!(flagged(&all), vec![("albums", "artist_id")]);
    }

    #[test]
    fn test_albums_comment_id_scenario() {
        let first = migration(
            "20240101000000_create_albums.rb",
            r#"
class CreateAlbums < ActiveRecord::Migration[7.1]
  def change
    create_table :albums do |t|
      t.string :comment_id
    end
  end
end
"#,
        );
        let second = migration(
            "20240102000000_change_comment_id.rb",
            r#"
class ChangeCommentId < ActiveRecord::Migration[7.1]
  def change
    change_column :albums, :comment_id, :bigint
  end
end
"#,
        );
        let result = reconcile(&no_snapshot(), &[first.clone(), second.clone()]);
        assert_eq!(flagged(&result), vec![("albums", "comment_id")]);
        assert_eq!(result.violations[0].reason, ViolationReason::MissingIndex);

        let indexed_second = migration(
            "20240102000000_change_comment_id.rb",
            "change_column :albums, :comment_id, :bigint\nadd_index :albums, :comment_id\n",
        );
        assert!(reconcile(&no_snapshot(), &[first, indexed_second])
            .violations
            .is_empty());

        let indexed_first = migration(
            "20240101000000_create_albums.rb",
            "create_table :albums do |t|\n  t.string :comment_id\nend\nadd_index :albums, :comment_id\n",
        );
        assert!(reconcile(&no_snapshot(), &[indexed_first, second])
            .violations
            .is_empty());
    }

    #[test]
    fn test_ambiguous_retype_is_diagnosed() {
        let file = migration("1_change.rb", "change_column :albums, :comment_id, :bigint\n");
        let result = reconcile(&no_snapshot(), &[file]);
        assert_eq!(result.violations.len(), 1);
        assert!(result
            .diagnostics
            .iter()
            .any(|d| d.kind == DiagnosticKind::AmbiguousRetype));
    }

    #[test]
    fn test_retype_outranks_later_declaration() {
        let change = migration("1_change.rb", "change_column :albums, :comment_id, :bigint\n");
        let add = migration("2_add.rb", "add_column :albums, :comment_id, :string\n");
        let result = reconcile(&no_snapshot(), &[change, add]);

        assert_eq!(flagged(&result), vec![("albums", "comment_id")]);
        assert_eq!(result.violations[0].inferred_kind, ColumnKind::Bigint);
        assert_eq!(
            result.violations[0].location.file,
            Path::new("db/migrate/1_change.rb")
        );
        assert!(result
            .diagnostics
            .iter()
            .all(|d| d.kind != DiagnosticKind::AmbiguousRetype));
    }

    #[test]
    fn test_removal_forgets_type_change() {
        let file = migration(
            "1_change.rb",
            r#"
add_column :albums, :comment_id, :string
change_column :albums, :comment_id, :bigint
remove_column :albums, :comment_id
add_column :albums, :comment_id, :string
"#,
        );
        assert!(reconcile(&no_snapshot(), &[file]).violations.is_empty());
    }

    #[test]
    fn test_rename_and_removal() {
        let create = migration(
            "1_create.rb",
            "add_column :albums, :owner_id, :bigint\nadd_index :albums, :owner_id\nadd_column :albums, :legacy_id, :bigint\n",
        );
        let change = migration(
            "2_change.rb",
            "rename_column :albums, :owner_id, :creator_id\nremove_column :albums, :legacy_id\n",
        );
        let result = reconcile(&no_snapshot(), &[create, change]);
        assert!(result.violations.is_empty());
        assert_eq!(result.stats.columns_tracked, 1);
    }

    #[test]
    fn test_removed_column_drops_its_indexes() {
        let file = migration(
            "1_change.rb",
            r#"
add_column :albums, :comment_id, :bigint
add_column :albums, :artist_id, :bigint
add_index :albums, [:artist_id, :comment_id]
add_index :albums, :comment_id
remove_column :albums, :artist_id
add_column :albums, :artist_id, :bigint
"#,
        );
        let result = reconcile(&no_snapshot(), &[file]);
        assert_eq!(flagged(&result), vec![("albums", "artist_id")]);
    }

    #[test]
    fn test_table_drop_and_rename() {
        let file = migration(
            "1_tables.rb",
            r#"
add_column :old_albums, :comment_id, :bigint
drop_table :old_albums
add_column :records, :label_id, :bigint
rename_table :records, :albums
"#,
        );
        let result = reconcile(&no_snapshot(), &[file]);
        assert_eq!(flagged(&result), vec![("albums", "label_id")]);
    }

    #[test]
    fn test_references_indexed_by_default() {
        let file = migration(
            "1_refs.rb",
            "add_reference :albums, :user\nadd_reference :albums, :studio, index: false\n",
        );
        assert_eq!(
            flagged(&reconcile(&no_snapshot(), &[file.clone()])),
            vec![("albums", "studio_id"), ("albums", "user_id")]
        );

        let result = Reconciler::new(ReconcileOptions {
            references_indexed_by_default: true,
            ..ReconcileOptions::default()
        })
        .reconcile(&no_snapshot(), &[file]);
        assert_eq!(flagged(&result), vec![("albums", "studio_id")]);
    }

    #[test]
    fn test_ignored_columns_and_suffix() {
        let file = migration(
            "1_add.rb",
            "add_column :albums, :comment_id, :bigint\nadd_column :albums, :tenant_id, :bigint\nadd_column :albums, :owner_ref, :bigint\n",
        );
        let result = Reconciler::new(ReconcileOptions {
            ignored_columns: vec!["*.tenant_id".to_string(), "albums.comment_id".to_string()],
            ..ReconcileOptions::default()
        })
        .reconcile(&no_snapshot(), &[file.clone()]);
        assert!(result.violations.is_empty());

        let result = Reconciler::new(ReconcileOptions {
            foreign_key_suffix: "_ref".to_string(),
            ..ReconcileOptions::default()
        })
        .reconcile(&no_snapshot(), &[file]);
        assert_eq!(flagged(&result), vec![("albums", "owner_ref")]);
    }

    #[test]
    fn test_violations_are_ordered() {
        let file = migration(
            "1_add.rb",
            "add_column :zebras, :a_id, :bigint\nadd_column :albums, :z_id, :integer\nadd_column :albums, :b_id, :bigint\n",
        );
        let result = reconcile(&no_snapshot(), &[file]);
        assert_eq!(
            flagged(&result),
            vec![("albums", "b_id"), ("albums", "z_id"), ("zebras", "a_id")]
        );
    }
}
