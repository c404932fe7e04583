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

//! Statement executors (spec §4.4): SELECT, INSERT/UPDATE/DELETE, and
//! CREATE/ALTER TABLE, built over [`crate::catalog::Catalog`] and
//! [`crate::scope::Filter`].

pub mod ddl;
pub mod dml;
pub mod select;

use crate::ast::{FromClause, JoinCondition, JoinKind, TableRef};
use crate::error::{Error, Result};
use crate::expr::EvalContext;
use crate::record::{HeaderField, Record};
use crate::scope::Filter;
use crate::value::Primary;
use crate::view::View;
use std::sync::Arc;

/// Resolves a [`TableRef`] to an `Arc<View>`: a cached/loaded file-backed
/// view, a scoped temporary view, or a materialized subquery result.
pub fn resolve_table_ref(table: &TableRef, filter: &mut Filter, ctx: &EvalContext) -> Result<(String, Arc<View>)> {
    match table {
        TableRef::Named { name, alias } => {
            let label = alias.clone().unwrap_or_else(|| name.clone());
            if let Some(temp) = filter.lookup_temp_view(name) {
                return Ok((label, Arc::new(temp.read().clone())));
            }
            let file_info = crate::file_info::FileInfo::file(
                ctx.config.repository.join(format!("{name}.csv")),
                ctx.config.delimiter,
            );
            let shared = ctx.catalog.views.get(&file_info, ctx.config)?;
            Ok((label, Arc::new(shared.read().clone())))
        }
        TableRef::Subquery { query, alias } => {
            let mut child = filter.create_child();
            let view = select::execute_select(query, &mut child, ctx)?;
            Ok((alias.clone(), Arc::new(view)))
        }
    }
}

/// Builds the combined FROM-clause view: first table plus every JOIN,
/// applied left to right (spec §4.4 "FROM clause").
pub fn execute_from(from: &FromClause, filter: &mut Filter, ctx: &EvalContext) -> Result<View> {
    let (label, first) = resolve_table_ref(&from.first, filter, ctx)?;
    let mut working = rename_view(&first, &label);

    for join in &from.joins {
        let (right_label, right) = resolve_table_ref(&join.right, filter, ctx)?;
        let right = rename_view(&right, &right_label);
        working = apply_join(working, right, join.kind, &join.condition, filter, ctx)?;
    }
    Ok(working)
}

fn rename_view(view: &View, label: &str) -> View {
    let mut renamed = view.clone();
    for field in &mut renamed.header {
        field.view_name = label.to_string();
    }
    renamed
}

fn apply_join(
    left: View,
    right: View,
    kind: JoinKind,
    condition: &JoinCondition,
    filter: &mut Filter,
    ctx: &EvalContext,
) -> Result<View> {
    let mut header = left.header.clone();
    header.extend(right.header.iter().cloned());
    for field in &mut header {
        field.column_number = 0;
    }
    for (i, field) in header.iter_mut().enumerate() {
        field.column_number = i + 1;
    }

    let left_arity = left.header.len();
    let right_arity = right.header.len();
    let mut combined = View::new(header, Vec::new(), crate::file_info::FileInfo::temporary("join"));

    let matches = |l: &Record, r: &Record, filter: &mut Filter, ctx: &EvalContext| -> Result<bool> {
        match condition {
            JoinCondition::None => Ok(true),
            JoinCondition::Using(cols) => Ok(cols.iter().all(|c| {
                let li = combined.header.iter().position(|f| f.matches_name(c) && f.column_number <= left_arity);
                let ri = combined
                    .header
                    .iter()
                    .position(|f| f.matches_name(c) && f.column_number > left_arity);
                match (li, ri) {
                    (Some(li), Some(ri)) => {
                        let lv = l.get(li).map(|c| c.value().clone()).unwrap_or(Primary::Null);
                        let rv = r.get(ri - left_arity).map(|c| c.value().clone()).unwrap_or(Primary::Null);
                        lv.sql_eq(&rv).is_true()
                    }
                    _ => false,
                }
            })),
            JoinCondition::On(expr) => {
                let mut joined_record = l.clone();
                joined_record.cells.extend(r.cells.iter().cloned());
                let probe_view = Arc::new(View::new(combined.header.clone(), vec![joined_record], combined.file_info.clone()));
                let mut child = filter.create_child();
                child.bind_record(probe_view, 0);
                Ok(crate::expr::evaluate(expr, &mut child, ctx)?.as_bool_ternary().is_true())
            }
        }
    };

    let mut right_matched = vec![false; right.records.len()];
    for l in &left.records {
        let mut any_match = false;
        for (ri, r) in right.records.iter().enumerate() {
            if kind == JoinKind::Cross || matches(l, r, filter, ctx)? {
                any_match = true;
                right_matched[ri] = true;
                let mut cells = l.cells.clone();
                cells.extend(r.cells.iter().cloned());
                combined.records.push(Record::new(cells));
            }
        }
        if !any_match && matches!(kind, JoinKind::Left | JoinKind::FullOuter) {
            let mut cells = l.cells.clone();
            cells.extend((0..right_arity).map(|_| Primary::Null.into()));
            combined.records.push(Record::new(cells));
        }
    }
    if matches!(kind, JoinKind::Right | JoinKind::FullOuter) {
        for (ri, r) in right.records.iter().enumerate() {
            if !right_matched[ri] {
                let mut cells: Vec<_> = (0..left_arity).map(|_| Primary::Null.into()).collect();
                cells.extend(r.cells.iter().cloned());
                combined.records.push(Record::new(cells));
            }
        }
    }

    Ok(combined)
}

/// Resolves an unqualified table name to the view the INSERT/UPDATE/DELETE
/// executors should mutate: the scope's temp view if declared, otherwise
/// the catalog-backed file view (spec §4.4, §4.2).
pub fn resolve_mutation_target(
    name: &str,
    filter: &mut Filter,
    ctx: &EvalContext,
) -> Result<std::sync::Arc<parking_lot::RwLock<View>>> {
    if let Some(temp) = filter.lookup_temp_view(name) {
        return Ok(temp);
    }
    let file_info = crate::file_info::FileInfo::file(
        ctx.config.repository.join(format!("{name}.csv")),
        ctx.config.delimiter,
    );
    ctx.catalog.views.get(&file_info, ctx.config)
}

pub(crate) fn header_field_without_view(name: &str, number: usize) -> HeaderField {
    HeaderField::new(String::new(), name, number)
}

/// Whether a mutation on this view should register a pending entry and
/// acquire the file's advisory lock. A view still awaiting its first
/// `CREATE TABLE` commit has no backing file to lock yet; its eventual
/// commit already flushes whatever records it holds at that time, so
/// mutations applied before that first commit need no entry of their own.
pub(crate) fn needs_pending_mutation(file_info: &crate::file_info::FileInfo) -> bool {
    !file_info.is_temporary && file_info.exists()
}
