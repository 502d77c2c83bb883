//! Column-operation extractor
//!
//! Recognizes the Rails forms that create, retype, rename or remove columns
//! and tables. Index statements are left to [`super::indexes`]; the `index:`
//! option of a declaration is read here and carried on the declaration.

use std::path::Path;

use super::blocks::{TableFrame, TableMode};
use super::scanner::{Interpretation, Scanned, Scanner, StatementContext};
use super::syntax::{Call, Value};
use crate::domain::{
    ColumnDeclaration, ColumnKind, ColumnRemoval, ColumnRename, ColumnTypeChange, InlineIndex,
    Location, SchemaEvent, TableDefinition, TableDrop, TableRename,
};

/// Column and table events of one file, in file order.
///
/// Lazy; clone the iterator before consuming it to scan again.
pub fn operations<'a>(path: &Path, text: &'a str) -> impl Iterator<Item = SchemaEvent> + Clone + 'a {
    Scanner::new(path, text, false).filter_map(|item| match item {
        Scanned::Event(event) if !event.is_index_operation() => Some(event),
        _ => None,
    })
}

/// Interpret one statement
pub fn interpret(call: &Call, ctx: &StatementContext<'_>) -> Interpretation {
    match ctx.table {
        Some(table) if call.has_receiver(&table.var) => table_statement(call, table, &ctx.location),
        _ if call.receiver.is_none() => standalone_statement(call, &ctx.location),
        _ => Interpretation::unrecognized(),
    }
}

fn standalone_statement(call: &Call, location: &Location) -> Interpretation {
    match call.method.as_str() {
        "create_table" => match call.name_at(0) {
            Some(table) => {
                let found = Interpretation::recognized().with_event(SchemaEvent::TableDefined(
                    TableDefinition {
                        table: table.to_string(),
                        location: location.clone(),
                    },
                ));
                if call.block.is_some() {
                    found.opening(table, TableMode::Create)
                } else {
                    found
                }
            }
            None => Interpretation::malformed(location, "create_table without a table name"),
        },
        "create_join_table" => create_join_table(call, location),
        "change_table" => match call.name_at(0) {
            Some(table) => Interpretation::recognized().opening(table, TableMode::Change),
            None => Interpretation::malformed(location, "change_table without a table name"),
        },
        "add_column" => match (call.name_at(0), call.name_at(1), call.name_at(2)) {
            (Some(table), Some(column), Some(ty)) => Interpretation::recognized()
                .with_event(declaration(table, column, kind_of(ty), call, location)),
            _ => Interpretation::malformed(location, "add_column needs a table, a column and a type"),
        },
        "change_column" => match (call.name_at(0), call.name_at(1), call.name_at(2)) {
            (Some(table), Some(column), Some(ty)) => {
                Interpretation::recognized().with_event(retype(table, column, ty, location))
            }
            _ => Interpretation::malformed(
                location,
                "change_column needs a table, a column and a type",
            ),
        },
        "add_reference" | "add_belongs_to" => match (call.name_at(0), call.name_at(1)) {
            (Some(table), Some(name)) => {
                Interpretation::recognized().with_events(reference(table, name, call, location))
            }
            _ => Interpretation::malformed(
                location,
                format!("{} needs a table and a reference name", call.method),
            ),
        },
        "rename_column" => match (call.name_at(0), call.name_at(1), call.name_at(2)) {
            (Some(table), Some(from), Some(to)) => {
                Interpretation::recognized().with_event(rename(table, from, to, location))
            }
            _ => Interpretation::malformed(location, "rename_column needs a table and two names"),
        },
        "remove_column" | "remove_columns" => match call.name_at(0) {
            Some(table) => {
                // remove_column may carry the old type as a third argument
                let columns = if call.method == "remove_column" {
                    call.name_at(1).into_iter().collect()
                } else {
                    call.names_from(1)
                };
                if columns.is_empty() {
                    return Interpretation::malformed(
                        location,
                        format!("{} without a column name", call.method),
                    );
                }
                Interpretation::recognized()
                    .with_events(columns.into_iter().map(|c| removal(table, c, location)))
            }
            None => Interpretation::malformed(location, format!("{} without a table name", call.method)),
        },
        "remove_reference" | "remove_belongs_to" | "remove_references" => match call.name_at(0) {
            Some(table) => {
                let names = call.names_from(1);
                if names.is_empty() {
                    return Interpretation::malformed(
                        location,
                        format!("{} without a reference name", call.method),
                    );
                }
                Interpretation::recognized()
                    .with_events(reference_removals(table, &names, call, location))
            }
            None => Interpretation::malformed(location, format!("{} without a table name", call.method)),
        },
        "drop_table" => match call.name_at(0) {
            Some(table) => Interpretation::recognized().with_event(SchemaEvent::TableDropped(TableDrop {
                table: table.to_string(),
                location: location.clone(),
            })),
            None => Interpretation::malformed(location, "drop_table without a table name"),
        },
        "drop_join_table" => match (call.name_at(0), call.name_at(1)) {
            (Some(a), Some(b)) => {
                let table = call
                    .option("table_name")
                    .and_then(Value::as_name)
                    .map(str::to_string)
                    .unwrap_or_else(|| join_table_name(a, b));
                Interpretation::recognized()
                    .with_event(SchemaEvent::TableDropped(TableDrop {
                        table,
                        location: location.clone(),
                    }))
            }
            _ => Interpretation::malformed(location, "drop_join_table needs two table names"),
        },
        "rename_table" => match (call.name_at(0), call.name_at(1)) {
            (Some(from), Some(to)) => Interpretation::recognized().with_event(SchemaEvent::TableRenamed(
                TableRename {
                    from: from.to_string(),
                    to: to.to_string(),
                    location: location.clone(),
                },
            )),
            _ => Interpretation::malformed(location, "rename_table needs two table names"),
        },
        _ => Interpretation::unrecognized(),
    }
}

/// Statement whose receiver is the block variable of a table block
fn table_statement(call: &Call, frame: &TableFrame, location: &Location) -> Interpretation {
    let table = frame.name.as_str();

    match call.method.as_str() {
        "column" => match (call.name_at(0), call.name_at(1)) {
            (Some(column), Some(ty)) => Interpretation::recognized()
                .with_event(declaration(table, column, kind_of(ty), call, location)),
            _ => Interpretation::malformed(location, "column needs a name and a type"),
        },
        "references" | "belongs_to" => {
            let names = call.names_from(0);
            if names.is_empty() {
                return Interpretation::malformed(
                    location,
                    format!("{} without a reference name", call.method),
                );
            }
            Interpretation::recognized().with_events(
                names
                    .into_iter()
                    .flat_map(|name| reference(table, name, call, location)),
            )
        }
        "change" if frame.mode == TableMode::Change => match (call.name_at(0), call.name_at(1)) {
            (Some(column), Some(ty)) => {
                Interpretation::recognized().with_event(retype(table, column, ty, location))
            }
            _ => Interpretation::malformed(location, "change needs a column and a type"),
        },
        "rename" if frame.mode == TableMode::Change => match (call.name_at(0), call.name_at(1)) {
            (Some(from), Some(to)) => {
                Interpretation::recognized().with_event(rename(table, from, to, location))
            }
            _ => Interpretation::malformed(location, "rename needs two column names"),
        },
        "remove" if frame.mode == TableMode::Change => {
            let columns = call.names_from(0);
            if columns.is_empty() {
                return Interpretation::malformed(location, "remove without a column name");
            }
            Interpretation::recognized()
                .with_events(columns.into_iter().map(|c| removal(table, c, location)))
        }
        "remove_references" | "remove_belongs_to" if frame.mode == TableMode::Change => {
            let names = call.names_from(0);
            if names.is_empty() {
                return Interpretation::malformed(
                    location,
                    format!("{} without a reference name", call.method),
                );
            }
            Interpretation::recognized()
                .with_events(reference_removals(table, &names, call, location))
        }
        method => match ColumnKind::from_type_token(method) {
            Some(kind) => {
                let columns = call.names_from(0);
                if columns.is_empty() {
                    return Interpretation::malformed(
                        location,
                        format!("{} column without a name", method),
                    );
                }
                Interpretation::recognized().with_events(
                    columns
                        .into_iter()
                        .map(|column| declaration(table, column, kind, call, location)),
                )
            }
            None => Interpretation::unrecognized(),
        },
    }
}

fn create_join_table(call: &Call, location: &Location) -> Interpretation {
    let (Some(a), Some(b)) = (call.name_at(0), call.name_at(1)) else {
        return Interpretation::malformed(location, "create_join_table needs two table names");
    };

    let table = call
        .option("table_name")
        .and_then(Value::as_name)
        .map(str::to_string)
        .unwrap_or_else(|| join_table_name(a, b));
    let inline_index = inline_index(call.option("column_options").and_then(|o| o.get("index")));

    let mut found = Interpretation::recognized().with_event(SchemaEvent::TableDefined(
        TableDefinition {
            table: table.clone(),
            location: location.clone(),
        },
    ));
    for side in [a, b] {
        found = found.with_event(SchemaEvent::ColumnDeclared(ColumnDeclaration {
            table: table.clone(),
            column: format!("{}_id", singularize(side)),
            kind: ColumnKind::Bigint,
            inline_index,
            location: location.clone(),
        }));
    }

    if call.block.is_some() {
        found.opening(table, TableMode::Create)
    } else {
        found
    }
}

/// Kind of a type argument. Only the leading word counts, so a Postgres
/// cast such as `'bigint USING e_id::bigint'` reads as `bigint`.
fn kind_of(ty: &str) -> ColumnKind {
    let token = ty.split_whitespace().next().unwrap_or(ty);
    ColumnKind::from_type_token(token).unwrap_or(ColumnKind::Other)
}

fn inline_index(option: Option<&Value>) -> InlineIndex {
    match option {
        None => InlineIndex::Unspecified,
        Some(value) if value.is_truthy() => InlineIndex::Requested,
        Some(_) => InlineIndex::Declined,
    }
}

fn declaration(
    table: &str,
    column: &str,
    kind: ColumnKind,
    call: &Call,
    location: &Location,
) -> SchemaEvent {
    SchemaEvent::ColumnDeclared(ColumnDeclaration {
        table: table.to_string(),
        column: column.to_string(),
        kind,
        inline_index: inline_index(call.option("index")),
        location: location.clone(),
    })
}

/// `<name>_id` plus `<name>_type` when polymorphic. The id column is a
/// reference whatever its storage type; `type: :integer` / `type: :bigint`
/// only narrow the reported kind.
fn reference(table: &str, name: &str, call: &Call, location: &Location) -> Vec<SchemaEvent> {
    let kind = match call.option("type").and_then(Value::as_name).map(kind_of) {
        Some(kind @ (ColumnKind::Bigint | ColumnKind::Integer)) => kind,
        _ => ColumnKind::Reference,
    };

    let mut events = vec![declaration(table, &format!("{}_id", name), kind, call, location)];
    if is_polymorphic(call) {
        events.push(SchemaEvent::ColumnDeclared(ColumnDeclaration {
            table: table.to_string(),
            column: format!("{}_type", name),
            kind: ColumnKind::String,
            inline_index: InlineIndex::Unspecified,
            location: location.clone(),
        }));
    }
    events
}

fn reference_removals(
    table: &str,
    names: &[&str],
    call: &Call,
    location: &Location,
) -> Vec<SchemaEvent> {
    let polymorphic = is_polymorphic(call);
    names
        .iter()
        .flat_map(|name| {
            let mut columns = vec![format!("{}_id", name)];
            if polymorphic {
                columns.push(format!("{}_type", name));
            }
            columns
        })
        .map(|column| removal(table, &column, location))
        .collect()
}

fn is_polymorphic(call: &Call) -> bool {
    call.option("polymorphic").map_or(false, Value::is_truthy)
}

fn retype(table: &str, column: &str, ty: &str, location: &Location) -> SchemaEvent {
    SchemaEvent::ColumnRetyped(ColumnTypeChange {
        table: table.to_string(),
        column: column.to_string(),
        new_kind: kind_of(ty),
        location: location.clone(),
    })
}

fn rename(table: &str, from: &str, to: &str, location: &Location) -> SchemaEvent {
    SchemaEvent::ColumnRenamed(ColumnRename {
        table: table.to_string(),
        from: from.to_string(),
        to: to.to_string(),
        location: location.clone(),
    })
}

fn removal(table: &str, column: &str, location: &Location) -> SchemaEvent {
    SchemaEvent::ColumnRemoved(ColumnRemoval {
        table: table.to_string(),
        column: column.to_string(),
        location: location.clone(),
    })
}

/// Default name Rails gives the join table of `a` and `b`: both names in
/// lexical order joined by `_`, with a shared leading `prefix_` kept once
/// (`music_artists` + `music_records` => `music_artists_records`).
pub fn join_table_name(a: &str, b: &str) -> String {
    let (first, second) = if a <= b { (a, b) } else { (b, a) };

    let mut shared = 0;
    for ((i, x), y) in first.char_indices().zip(second.chars()) {
        if x != y {
            break;
        }
        if x == '_' {
            shared = i + 1;
        }
    }

    format!("{}_{}", first, &second[shared..])
}

/// Rails-style singular of a table name, enough for join table columns
pub fn singularize(word: &str) -> String {
    if word.ends_with("ss") {
        return word.to_string();
    }
    if let Some(stem) = word.strip_suffix("ies") {
        if stem.ends_with(|c: char| !"aeiou".contains(c)) {
            return format!("{}y", stem);
        }
    }
    for suffix in ["sses", "shes", "ches", "xes"] {
        if word.ends_with(suffix) {
            return word[..word.len() - 2].to_string();
        }
    }
    word.strip_suffix('s').unwrap_or(word).to_string()
}
