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

//! The top-level statement dispatcher (spec §4.4, §6): one [`Engine`] bundles
//! the [`Catalog`] and [`Config`] a whole session shares, the way teacher's
//! `SessionContext` bundles its `CatalogList` and `SessionState`
//! (`datafusion/core/src/execution/context.rs`).

use crate::ast::{FetchStatement, Statement};
use crate::catalog::Catalog;
use crate::config::Config;
use crate::cursor::{fetch_row_values, Cursor};
use crate::error::{Error, Result};
use crate::expr::functions::ScalarFunctions;
use crate::expr::{self, EvalContext};
use crate::exec::{ddl, dml, select};
use crate::scope::Filter;
use crate::value::Primary;
use crate::view::View;

/// What executing one statement produced.
#[derive(Debug)]
pub enum Outcome {
    Select(View),
    RowsAffected(usize),
    CursorInRange(bool),
    Printed(String),
    Unit,
}

/// Owns the catalog and configuration a session's statements run against
/// (spec §9: "re-architect as an explicit engine handle threaded through
/// every operation").
pub struct Engine {
    pub catalog: Catalog,
    pub config: Config,
    pub scalar_functions: Box<dyn ScalarFunctions>,
}

impl Engine {
    pub fn new(config: Config, scalar_functions: Box<dyn ScalarFunctions>) -> Self {
        Self {
            catalog: Catalog::new(),
            config,
            scalar_functions,
        }
    }

    fn context(&self) -> EvalContext<'_> {
        EvalContext {
            catalog: &self.catalog,
            config: &self.config,
            scalar_functions: self.scalar_functions.as_ref(),
        }
    }

    /// RELEASE: drop every cached view unconditionally (spec §4.2).
    pub fn release(&self) {
        self.catalog.release();
    }

    pub fn execute(&self, stmt: &Statement, filter: &mut Filter) -> Result<Outcome> {
        let ctx = self.context();
        execute_statement(stmt, filter, &ctx)
    }
}

/// Runs a lexical block of statements (IF/WHILE/LOOP/SOURCE bodies) in a
/// fresh inner scope (spec §4.3 "Scope"), returning the last statement's
/// outcome.
fn execute_block(stmts: &[Statement], filter: &mut Filter, ctx: &EvalContext) -> Result<Outcome> {
    filter.push_scope();
    let result = (|| {
        let mut last = Outcome::Unit;
        for stmt in stmts {
            last = execute_statement(stmt, filter, ctx)?;
        }
        Ok(last)
    })();
    filter.pop_scope();
    result
}

fn format_printf(template: &str, args: &[Primary]) -> String {
    let mut out = String::with_capacity(template.len());
    let mut parts = template.split("{}");
    let mut args = args.iter();
    if let Some(first) = parts.next() {
        out.push_str(first);
    }
    for part in parts {
        if let Some(arg) = args.next() {
            out.push_str(&arg.as_str_lossy());
        }
        out.push_str(part);
    }
    out
}

pub fn execute_statement(stmt: &Statement, filter: &mut Filter, ctx: &EvalContext) -> Result<Outcome> {
    match stmt {
        Statement::Select(query) => Ok(Outcome::Select(select::execute_select(query, filter, ctx)?)),
        Statement::Insert(insert) => Ok(Outcome::RowsAffected(dml::execute_insert(insert, filter, ctx)?)),
        Statement::Update(update) => Ok(Outcome::RowsAffected(dml::execute_update(update, filter, ctx)?)),
        Statement::Delete(delete) => Ok(Outcome::RowsAffected(dml::execute_delete(delete, filter, ctx)?)),
        Statement::CreateTable(create) => {
            ddl::execute_create_table(create, filter, ctx)?;
            Ok(Outcome::Unit)
        }
        Statement::AlterTable(alter) => {
            ddl::execute_alter_table(alter, filter, ctx)?;
            Ok(Outcome::Unit)
        }
        Statement::DropTable(name) => {
            ddl::execute_drop_table(name, filter, ctx)?;
            Ok(Outcome::Unit)
        }
        Statement::DeclareVariable { name, initial } => {
            let value = match initial {
                Some(expr) => expr::evaluate(expr, filter, ctx)?,
                None => Primary::Null,
            };
            filter.declare_variable(name, value);
            Ok(Outcome::Unit)
        }
        Statement::SetVariable { name, value } => {
            let value = expr::evaluate(value, filter, ctx)?;
            filter.set_variable(name, value)?;
            Ok(Outcome::Unit)
        }
        Statement::DeclareCursor(decl) => {
            filter.declare_cursor(&decl.name, Cursor::new(decl.clone()))?;
            Ok(Outcome::Unit)
        }
        Statement::OpenCursor(name) => {
            let mut query = None;
            filter.with_cursor_mut(name, |cursor| {
                query = Some(cursor.query.query.clone());
                Ok(())
            })?;
            let query = query.expect("with_cursor_mut only returns Ok after running its closure");
            let view = select::execute_select(&query, filter, ctx)?;
            filter.with_cursor_mut(name, |cursor| {
                cursor.open(view);
                Ok(())
            })?;
            Ok(Outcome::Unit)
        }
        Statement::Fetch(FetchStatement { cursor, position, targets }) => {
            let in_range = filter.with_cursor_mut(cursor, |c| c.fetch(*position))?;
            if in_range {
                let row_values = filter.with_cursor_mut(cursor, |c| {
                    let row = c
                        .current_row()
                        .cloned()
                        .ok_or_else(|| Error::internal("cursor advanced in range but has no current row"))?;
                    fetch_row_values(&row, targets.len())
                })?;
                for (name, value) in targets.iter().zip(row_values) {
                    filter.set_variable(name, value)?;
                }
            } else {
                for name in targets {
                    filter.set_variable(name, Primary::Null)?;
                }
            }
            Ok(Outcome::CursorInRange(in_range))
        }
        Statement::CloseCursor(name) => {
            filter.with_cursor_mut(name, |c| {
                c.close();
                Ok(())
            })?;
            Ok(Outcome::Unit)
        }
        Statement::DisposeCursor(name) => {
            filter.dispose_cursor(name)?;
            Ok(Outcome::Unit)
        }
        Statement::Begin => {
            // The pending-mutation log doubles as the transaction (spec §4.2
            // GLOSSARY "Pending result"); BEGIN has nothing to initialize.
            Ok(Outcome::Unit)
        }
        Statement::Commit => {
            ctx.catalog.transactions.commit(ctx.config.quiet)?;
            Ok(Outcome::Unit)
        }
        Statement::Rollback => {
            ctx.catalog.transactions.rollback(ctx.config.quiet)?;
            Ok(Outcome::Unit)
        }
        Statement::If { condition, then_branch, else_branch } => {
            let taken = expr::evaluate(condition, filter, ctx)?.as_bool_ternary().is_true();
            if taken {
                execute_block(then_branch, filter, ctx)
            } else {
                execute_block(else_branch, filter, ctx)
            }
        }
        Statement::While { condition, body } => {
            let mut last = Outcome::Unit;
            while expr::evaluate(condition, filter, ctx)?.as_bool_ternary().is_true() {
                last = execute_block(body, filter, ctx)?;
            }
            Ok(last)
        }
        // The grammar defines no EXIT/BREAK node (spec §6), so there is no
        // way for a LOOP body to end on its own; run it once rather than
        // hang the engine on an AST that cannot express termination.
        Statement::Loop(body) => execute_block(body, filter, ctx),
        Statement::Source(body) => execute_block(body, filter, ctx),
        Statement::Print(expr) => {
            let value = expr::evaluate(expr, filter, ctx)?;
            let text = value.as_str_lossy();
            log::info!("{text}");
            Ok(Outcome::Printed(text))
        }
        Statement::Printf(template, args) => {
            let values = expr::evaluate_values(args, filter, ctx)?;
            let text = format_printf(template, &values);
            log::info!("{text}");
            Ok(Outcome::Printed(text))
        }
        Statement::Show(target) => {
            let text = format!("SHOW {target}");
            log::info!("{text}");
            Ok(Outcome::Printed(text))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::{ColumnDef, CreateTableStatement, Expr};
    use crate::expr::functions::NoScalarFunctions;

    #[test]
    fn declare_then_set_variable_round_trips() {
        let engine = Engine::new(Config::default(), Box::new(NoScalarFunctions));
        let mut filter = Filter::new_root();
        engine
            .execute(&Statement::DeclareVariable { name: "x".into(), initial: Some(Expr::IntegerLiteral(1)) }, &mut filter)
            .unwrap();
        engine
            .execute(&Statement::SetVariable { name: "x".into(), value: Expr::IntegerLiteral(2) }, &mut filter)
            .unwrap();
        assert_eq!(filter.lookup_variable("x").unwrap(), Primary::Integer(2));
    }

    #[test]
    fn if_else_runs_the_taken_branch() {
        let engine = Engine::new(Config::default(), Box::new(NoScalarFunctions));
        let mut filter = Filter::new_root();
        filter.declare_variable("x", Primary::Integer(0));
        let stmt = Statement::If {
            condition: Expr::BooleanLiteral(true),
            then_branch: vec![Statement::SetVariable { name: "x".into(), value: Expr::IntegerLiteral(1) }],
            else_branch: vec![Statement::SetVariable { name: "x".into(), value: Expr::IntegerLiteral(2) }],
        };
        engine.execute(&stmt, &mut filter).unwrap();
        assert_eq!(filter.lookup_variable("x").unwrap(), Primary::Integer(1));
    }

    #[test]
    fn create_table_then_insert_marks_view_dirty() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config { repository: dir.path().to_path_buf(), ..Config::default() };
        let engine = Engine::new(config, Box::new(NoScalarFunctions));
        let mut filter = Filter::new_root();

        let create = Statement::CreateTable(CreateTableStatement {
            name: "t".into(),
            columns: vec![ColumnDef { name: "a".into(), default: None }],
            query: None,
        });
        engine.execute(&create, &mut filter).unwrap();

        let insert = Statement::Insert(crate::ast::InsertStatement {
            target: "t".into(),
            fields: None,
            values: Some(crate::ast::ValuesList { rows: vec![vec![Expr::IntegerLiteral(5)]] }),
            query: None,
        });
        let outcome = engine.execute(&insert, &mut filter).unwrap();
        match outcome {
            Outcome::RowsAffected(n) => assert_eq!(n, 1),
            other => panic!("expected RowsAffected, got {other:?}"),
        }

        engine.execute(&Statement::Commit, &mut filter).unwrap();
        assert!(dir.path().join("t.csv").exists());
    }
}
