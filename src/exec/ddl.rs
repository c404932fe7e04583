// Licensed to the Apache Software Foundation (ASF) under one
// or more contributor license agreements.  See the NOTICE file
// distributed with this work for additional information
// regarding copyright ownership.  The ASF licenses this file
// to you under the Apache License, Version 2.0 (the
// "License"); you may not use this file except in compliance
// with the License.  You may obtain a copy of the License at
//
//   http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing,
// software distributed under the License is distributed on an
// "AS IS" BASIS, WITHOUT WARRANTIES OR CONDITIONS OF ANY
// KIND, either express or implied.  See the License for the
// specific language governing permissions and limitations
// under the License.

//! CREATE TABLE, ALTER TABLE, DROP TABLE (spec §4.4).

use crate::ast::{AlterTableStatement, ColumnPosition, CreateTableStatement};
use crate::error::{Error, Result};
use crate::expr::{self, EvalContext};
use crate::file_info::FileInfo;
use crate::record::{Cell, HeaderField};
use crate::scope::Filter;
use crate::view::View;
use std::sync::Arc;

use super::select;

fn renumber(header: &mut [HeaderField]) {
    for (i, field) in header.iter_mut().enumerate() {
        field.column_number = i + 1;
    }
}

pub fn execute_create_table(
    stmt: &CreateTableStatement,
    filter: &mut Filter,
    ctx: &EvalContext,
) -> Result<Arc<parking_lot::RwLock<View>>> {
    let file_info = FileInfo::file(
        ctx.config.repository.join(format!("{}.csv", stmt.name)),
        ctx.config.delimiter,
    );
    if file_info.exists() || ctx.catalog.views.contains(&file_info) {
        return Err(Error::file_already_exists(format!("{} already exists", stmt.name)));
    }

    let header: Vec<HeaderField> = stmt
        .columns
        .iter()
        .enumerate()
        .map(|(i, c)| HeaderField::new(stmt.name.clone(), c.name.clone(), i + 1))
        .collect();

    let records = match &stmt.query {
        Some(query) => {
            let mut child = filter.create_child();
            let view = select::execute_select(query, &mut child, ctx)?;
            if view.header.len() != header.len() {
                return Err(Error::subquery_too_many_fields(format!(
                    "CREATE TABLE {} declares {} columns but the query produces {}",
                    stmt.name,
                    header.len(),
                    view.header.len()
                )));
            }
            view.records
        }
        None => Vec::new(),
    };

    let view = View::new(header, records, file_info.clone());
    view.validate()?;

    let shared = ctx.catalog.views.insert(&file_info, view);
    ctx.catalog.transactions.begin_create(shared.clone());
    Ok(shared)
}

pub fn execute_drop_table(name: &str, filter: &mut Filter, ctx: &EvalContext) -> Result<()> {
    let target = super::resolve_mutation_target(name, filter, ctx)?;
    if super::needs_pending_mutation(&target.read().file_info) {
        ctx.catalog.transactions.begin_drop(target.clone());
    }
    Ok(())
}

pub fn execute_alter_table(stmt: &AlterTableStatement, filter: &mut Filter, ctx: &EvalContext) -> Result<()> {
    match stmt {
        AlterTableStatement::AddColumn { table, column, position, reference_column } => {
            let target = super::resolve_mutation_target(table, filter, ctx)?;

            let default_value = match &column.default {
                Some(expr) => {
                    let mut detached = Filter::new_root();
                    expr::evaluate(expr, &mut detached, ctx)?
                }
                None => crate::value::Primary::Null,
            };

            let mut guard = target.write();
            if guard.header.iter().any(|f| f.matches_name(&column.name)) {
                return Err(Error::field_name_duplicate(format!(
                    "column {:?} already exists on {table}",
                    column.name
                )));
            }
            let insert_at = match position {
                ColumnPosition::First => 0,
                ColumnPosition::Last => guard.header.len(),
                ColumnPosition::After => {
                    let reference = reference_column.as_deref().ok_or_else(|| {
                        Error::internal("ADD COLUMN AFTER requires a reference column")
                    })?;
                    guard.resolve_field(None, reference)? + 1
                }
                ColumnPosition::Before => {
                    let reference = reference_column.as_deref().ok_or_else(|| {
                        Error::internal("ADD COLUMN BEFORE requires a reference column")
                    })?;
                    guard.resolve_field(None, reference)?
                }
            };

            let field = HeaderField::new(table.clone(), column.name.clone(), 0);
            guard.header.insert(insert_at, field);
            for record in guard.records.iter_mut() {
                record.cells.insert(insert_at, Cell::single(default_value.clone()));
            }
            renumber(&mut guard.header);
            guard.operated_fields += 1;
            let needs_mutation = super::needs_pending_mutation(&guard.file_info);
            drop(guard);
            if needs_mutation {
                ctx.catalog.transactions.begin_mutation(target.clone())?;
            }
            Ok(())
        }
        AlterTableStatement::DropColumn { table, column } => {
            let target = super::resolve_mutation_target(table, filter, ctx)?;
            let mut guard = target.write();
            let idx = guard.resolve_field(None, column)?;
            guard.header.remove(idx);
            for record in guard.records.iter_mut() {
                record.cells.remove(idx);
            }
            renumber(&mut guard.header);
            guard.operated_fields += 1;
            let needs_mutation = super::needs_pending_mutation(&guard.file_info);
            drop(guard);
            if needs_mutation {
                ctx.catalog.transactions.begin_mutation(target.clone())?;
            }
            Ok(())
        }
        AlterTableStatement::RenameColumn { table, column, new_name } => {
            let target = super::resolve_mutation_target(table, filter, ctx)?;
            let mut guard = target.write();
            let idx = guard.resolve_field(None, column)?;
            guard.header[idx].column_name = new_name.clone();
            guard.operated_fields += 1;
            let needs_mutation = super::needs_pending_mutation(&guard.file_info);
            drop(guard);
            if needs_mutation {
                ctx.catalog.transactions.begin_mutation(target.clone())?;
            }
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::ColumnDef;
    use crate::catalog::Catalog;
    use crate::config::Config;
    use crate::expr::functions::NoScalarFunctions;
    use crate::record::Record;
    use crate::value::Primary;

    fn ctx_for<'a>(catalog: &'a Catalog, config: &'a Config, funcs: &'a NoScalarFunctions) -> EvalContext<'a> {
        EvalContext { catalog, config, scalar_functions: funcs }
    }

    #[test]
    fn create_table_fails_if_file_exists() {
        let dir = tempfile::tempdir().unwrap();
        let mut filter = Filter::new_root();
        let catalog = Catalog::new();
        let config = Config { repository: dir.path().to_path_buf(), ..Config::default() };
        let funcs = NoScalarFunctions;
        let ctx = ctx_for(&catalog, &config, &funcs);

        let stmt = CreateTableStatement {
            name: "t".into(),
            columns: vec![ColumnDef { name: "a".into(), default: None }],
            query: None,
        };
        execute_create_table(&stmt, &mut filter, &ctx).unwrap();
        let err = execute_create_table(&stmt, &mut filter, &ctx).unwrap_err();
        assert_eq!(err.kind, crate::error::ErrorKind::FileAlreadyExists);
    }

    #[test]
    fn add_column_extends_existing_records_with_default() {
        let dir = tempfile::tempdir().unwrap();
        let mut filter = Filter::new_root();
        let catalog = Catalog::new();
        let config = Config { repository: dir.path().to_path_buf(), ..Config::default() };
        let funcs = NoScalarFunctions;
        let ctx = ctx_for(&catalog, &config, &funcs);

        let header = vec![HeaderField::new("t", "a", 1)];
        let records = vec![Record::from_values(vec![Primary::Integer(1)])];
        filter
            .declare_temp_view("t", View::new(header, records, FileInfo::temporary("t")))
            .unwrap();

        let stmt = AlterTableStatement::AddColumn {
            table: "t".into(),
            column: ColumnDef { name: "b".into(), default: Some(crate::ast::Expr::IntegerLiteral(0)) },
            position: ColumnPosition::Last,
            reference_column: None,
        };
        execute_alter_table(&stmt, &mut filter, &ctx).unwrap();

        let view = filter.lookup_temp_view("t").unwrap();
        let guard = view.read();
        assert_eq!(guard.header.len(), 2);
        assert_eq!(guard.records[0].get(1).unwrap().value(), &Primary::Integer(0));
    }
}
