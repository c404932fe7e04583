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

//! INSERT / UPDATE / DELETE (spec §4.4).

use crate::ast::{DeleteStatement, FromClause, InsertStatement, TableRef, UpdateStatement};
use crate::error::{Error, Result};
use crate::expr::{self, EvalContext};
use crate::record::{Cell, HeaderField, Record};
use crate::scope::Filter;
use crate::value::{serialize_tuple, Primary};
use crate::view::View;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

pub fn execute_insert(stmt: &InsertStatement, filter: &mut Filter, ctx: &EvalContext) -> Result<usize> {
    let target = super::resolve_mutation_target(&stmt.target, filter, ctx)?;
    let header_len = target.read().header.len();
    let field_positions: Option<Vec<usize>> = match &stmt.fields {
        Some(names) => {
            let guard = target.read();
            Some(
                names
                    .iter()
                    .map(|n| guard.resolve_field(None, n))
                    .collect::<Result<Vec<_>>>()?,
            )
        }
        None => None,
    };

    let rows: Vec<Vec<Primary>> = if let Some(values) = &stmt.values {
        values
            .rows
            .iter()
            .map(|row| expr::evaluate_values(row, filter, ctx))
            .collect::<Result<Vec<_>>>()?
    } else if let Some(query) = &stmt.query {
        let mut child = filter.create_child();
        let view = super::select::execute_select(query, &mut child, ctx)?;
        view.records
            .into_iter()
            .map(|r| r.cells.into_iter().map(Cell::into_value).collect())
            .collect()
    } else {
        Vec::new()
    };

    let mut inserted = 0;
    {
        let mut guard = target.write();
        for row_values in rows {
            let record = match &field_positions {
                Some(positions) => {
                    if row_values.len() != positions.len() {
                        return Err(Error::internal(
                            "INSERT row has a different number of values than the field list",
                        ));
                    }
                    let mut cells = vec![Cell::single(Primary::Null); header_len];
                    for (pos, value) in positions.iter().zip(row_values) {
                        cells[*pos] = Cell::single(value);
                    }
                    Record::new(cells)
                }
                None => {
                    if row_values.len() > header_len {
                        return Err(Error::internal("INSERT row has more values than the target has columns"));
                    }
                    let mut record = Record::from_values(row_values);
                    record.extend_with_nulls(header_len);
                    record
                }
            };
            guard.records.push(record);
            inserted += 1;
        }
        guard.operated_records += inserted;
    }

    if super::needs_pending_mutation(&target.read().file_info) {
        ctx.catalog.transactions.begin_mutation(target.clone())?;
    }
    Ok(inserted)
}

/// The contiguous `[start, end)` column range a labeled table occupies in a
/// joined header; `apply_join` lays out `left.header ++ right.header`
/// without reordering, so every source table's own columns stay contiguous.
fn column_range(header: &[HeaderField], label: &str) -> Option<(usize, usize)> {
    let positions: Vec<usize> = header
        .iter()
        .enumerate()
        .filter(|(_, f)| f.view_name.eq_ignore_ascii_case(label))
        .map(|(i, _)| i)
        .collect();
    let (&start, &end) = (positions.first()?, positions.last()?);
    Some((start, end + 1))
}

fn record_key(record: &Record, range: (usize, usize)) -> String {
    let values: Vec<Primary> = record.cells[range.0..range.1]
        .iter()
        .map(|c| c.value().clone())
        .collect();
    serialize_tuple(&values)
}

fn default_from_clause(tables: &[String]) -> Result<FromClause> {
    let first = tables
        .first()
        .ok_or_else(|| Error::tables_to_delete_not_specified("no target table was given"))?;
    Ok(FromClause {
        first: TableRef::Named { name: first.clone(), alias: None },
        joins: Vec::new(),
    })
}

pub fn execute_update(stmt: &UpdateStatement, filter: &mut Filter, ctx: &EvalContext) -> Result<usize> {
    let from = match &stmt.from {
        Some(f) => f.clone(),
        None => default_from_clause(&stmt.tables)?,
    };
    let combined = Arc::new(super::execute_from(&from, filter, ctx)?);

    let mut target_views: HashMap<String, Arc<parking_lot::RwLock<View>>> = HashMap::new();
    let mut target_ranges: HashMap<String, (usize, usize)> = HashMap::new();
    for name in &stmt.tables {
        let view = super::resolve_mutation_target(name, filter, ctx)?;
        let range = column_range(&combined.header, name)
            .ok_or_else(|| Error::field_not_in_update_tables(format!("table {name:?} is not part of the UPDATE's FROM clause")))?;
        target_views.insert(name.to_ascii_uppercase(), view);
        target_ranges.insert(name.to_ascii_uppercase(), range);
    }

    // assignment -> resolved target table name, validated against the
    // UPDATE statement's table list (spec §4.4 "Only target views listed in
    // the UPDATE tables clause may be modified").
    let mut resolved_assignments = Vec::with_capacity(stmt.assignments.len());
    for assignment in &stmt.assignments {
        let table_name = match &assignment.target_view {
            Some(name) => {
                let key = name.to_ascii_uppercase();
                if !target_views.contains_key(&key) {
                    return Err(Error::field_not_in_update_tables(format!(
                        "{name}.{} is not one of the UPDATE's target tables",
                        assignment.field
                    )));
                }
                key
            }
            None if stmt.tables.len() == 1 => stmt.tables[0].to_ascii_uppercase(),
            None => {
                return Err(Error::field_not_in_update_tables(format!(
                    "assignment to {:?} must be qualified when UPDATE targets multiple tables",
                    assignment.field
                )))
            }
        };
        resolved_assignments.push((table_name, assignment));
    }

    // (table, record key, field index) -> new value; detects the same
    // physical record receiving two different values for the same field
    // from different joined rows (spec §4.4 "Ambiguity rule").
    let mut pending: HashMap<(String, String, usize), Primary> = HashMap::new();
    let mut touched: HashMap<String, HashSet<String>> = HashMap::new();

    for row in 0..combined.records.len() {
        filter.bind_record(combined.clone(), row);
        let keep = match &stmt.filter {
            Some(predicate) => expr::evaluate(predicate, filter, ctx)?.as_bool_ternary().is_true(),
            None => true,
        };
        if !keep {
            continue;
        }
        for (table_name, assignment) in &resolved_assignments {
            let range = target_ranges[table_name];
            let key = record_key(&combined.records[row], range);
            let target = &target_views[table_name];
            let field_idx = {
                let guard = target.read();
                guard.resolve_field(None, &assignment.field)?
            };
            let new_value = expr::evaluate(&assignment.value, filter, ctx)?;
            let pending_key = (table_name.clone(), key.clone(), field_idx);
            if let Some(existing) = pending.get(&pending_key) {
                if existing != &new_value {
                    return Err(Error::record_ambiguous(format!(
                        "field {:?} of a record in {} would receive two different values from this UPDATE",
                        assignment.field, table_name
                    )));
                }
            } else {
                pending.insert(pending_key, new_value);
            }
            touched.entry(table_name.clone()).or_default().insert(key);
        }
    }

    let mut total_updated = 0;
    for (table_name, view) in &target_views {
        let mut guard = view.write();
        let full_range = (0, guard.header.len());
        let mut updated_here = 0;
        for record in guard.records.iter_mut() {
            let key = record_key(record, full_range);
            let Some(keys) = touched.get(table_name) else { continue };
            if !keys.contains(&key) {
                continue;
            }
            let mut changed = false;
            for field_idx in 0..record.cells.len() {
                if let Some(value) = pending.get(&(table_name.clone(), key.clone(), field_idx)) {
                    record.cells[field_idx] = Cell::single(value.clone());
                    changed = true;
                }
            }
            if changed {
                updated_here += 1;
            }
        }
        guard.operated_records += updated_here;
        total_updated += updated_here;
        if updated_here > 0 && super::needs_pending_mutation(&guard.file_info) {
            drop(guard);
            ctx.catalog.transactions.begin_mutation(view.clone())?;
        }
    }

    Ok(total_updated)
}

pub fn execute_delete(stmt: &DeleteStatement, filter: &mut Filter, ctx: &EvalContext) -> Result<usize> {
    let tables = if stmt.tables.is_empty() {
        if stmt.from.joins.is_empty() {
            match &stmt.from.first {
                TableRef::Named { name, .. } => vec![name.clone()],
                TableRef::Subquery { .. } => {
                    return Err(Error::tables_to_delete_not_specified(
                        "DELETE FROM a subquery requires an explicit table list",
                    ))
                }
            }
        } else {
            return Err(Error::tables_to_delete_not_specified(
                "DELETE over a join requires an explicit table list",
            ));
        }
    } else {
        stmt.tables.clone()
    };

    let combined = Arc::new(super::execute_from(&stmt.from, filter, ctx)?);

    let mut target_views: HashMap<String, Arc<parking_lot::RwLock<View>>> = HashMap::new();
    let mut target_ranges: HashMap<String, (usize, usize)> = HashMap::new();
    for name in &tables {
        let view = super::resolve_mutation_target(name, filter, ctx)?;
        let range = column_range(&combined.header, name)
            .ok_or_else(|| Error::field_not_in_update_tables(format!("table {name:?} is not part of the DELETE's FROM clause")))?;
        target_views.insert(name.to_ascii_uppercase(), view);
        target_ranges.insert(name.to_ascii_uppercase(), range);
    }

    let mut doomed: HashMap<String, HashSet<String>> = HashMap::new();
    for row in 0..combined.records.len() {
        filter.bind_record(combined.clone(), row);
        let matched = match &stmt.filter {
            Some(predicate) => expr::evaluate(predicate, filter, ctx)?.as_bool_ternary().is_true(),
            None => true,
        };
        if !matched {
            continue;
        }
        for name in &tables {
            let key = name.to_ascii_uppercase();
            let range = target_ranges[&key];
            let record_key = record_key(&combined.records[row], range);
            doomed.entry(key).or_default().insert(record_key);
        }
    }

    let mut total_deleted = 0;
    for (table_name, view) in &target_views {
        let mut guard = view.write();
        let full_range = (0, guard.header.len());
        let before = guard.records.len();
        let Some(keys) = doomed.get(table_name) else { continue };
        guard.records.retain(|record| !keys.contains(&record_key(record, full_range)));
        let deleted_here = before - guard.records.len();
        guard.operated_records += deleted_here;
        total_deleted += deleted_here;
        if deleted_here > 0 && super::needs_pending_mutation(&guard.file_info) {
            drop(guard);
            ctx.catalog.transactions.begin_mutation(view.clone())?;
        }
    }

    Ok(total_deleted)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::{Assignment, ValuesList};
    use crate::catalog::Catalog;
    use crate::config::Config;
    use crate::expr::functions::NoScalarFunctions;
    use crate::file_info::FileInfo;
    use crate::record::HeaderField as HF;

    fn ctx_for<'a>(catalog: &'a Catalog, config: &'a Config, funcs: &'a NoScalarFunctions) -> EvalContext<'a> {
        EvalContext { catalog, config, scalar_functions: funcs }
    }

    fn seed(filter: &mut Filter, name: &str) {
        let header = vec![HF::new(name, "a", 1), HF::new(name, "b", 2)];
        let records = vec![
            Record::from_values(vec![Primary::Integer(1), Primary::Integer(10)]),
            Record::from_values(vec![Primary::Integer(2), Primary::Integer(20)]),
        ];
        filter
            .declare_temp_view(name, View::new(header, records, FileInfo::temporary(name)))
            .unwrap();
    }

    #[test]
    fn insert_extends_short_rows_with_nulls() {
        let mut filter = Filter::new_root();
        seed(&mut filter, "t");
        let catalog = Catalog::new();
        let config = Config::default();
        let funcs = NoScalarFunctions;
        let ctx = ctx_for(&catalog, &config, &funcs);

        let stmt = InsertStatement {
            target: "t".into(),
            fields: None,
            values: Some(ValuesList { rows: vec![vec![crate::ast::Expr::IntegerLiteral(3)]] }),
            query: None,
        };
        let n = execute_insert(&stmt, &mut filter, &ctx).unwrap();
        assert_eq!(n, 1);
        let view = filter.lookup_temp_view("t").unwrap();
        let guard = view.read();
        assert_eq!(guard.records.len(), 3);
        assert_eq!(guard.records[2].get(0).unwrap().value(), &Primary::Integer(3));
        assert!(guard.records[2].get(1).unwrap().value().is_null());
    }

    #[test]
    fn update_applies_matching_rows_only() {
        let mut filter = Filter::new_root();
        seed(&mut filter, "t");
        let catalog = Catalog::new();
        let config = Config::default();
        let funcs = NoScalarFunctions;
        let ctx = ctx_for(&catalog, &config, &funcs);

        let stmt = UpdateStatement {
            tables: vec!["t".into()],
            from: None,
            assignments: vec![Assignment {
                target_view: None,
                field: "b".into(),
                value: crate::ast::Expr::IntegerLiteral(99),
            }],
            filter: Some(crate::ast::Expr::Binary(
                Box::new(crate::ast::Expr::Field { view: None, name: "a".into(), span: crate::error::Span::UNKNOWN }),
                crate::ast::BinaryOp::Eq,
                Box::new(crate::ast::Expr::IntegerLiteral(2)),
            )),
        };
        let n = execute_update(&stmt, &mut filter, &ctx).unwrap();
        assert_eq!(n, 1);
        let view = filter.lookup_temp_view("t").unwrap();
        let guard = view.read();
        assert_eq!(guard.records[0].get(1).unwrap().value(), &Primary::Integer(10));
        assert_eq!(guard.records[1].get(1).unwrap().value(), &Primary::Integer(99));
    }

    #[test]
    fn delete_without_tables_uses_single_from_table() {
        let mut filter = Filter::new_root();
        seed(&mut filter, "t");
        let catalog = Catalog::new();
        let config = Config::default();
        let funcs = NoScalarFunctions;
        let ctx = ctx_for(&catalog, &config, &funcs);

        let stmt = DeleteStatement {
            tables: vec![],
            from: FromClause { first: TableRef::Named { name: "t".into(), alias: None }, joins: vec![] },
            filter: Some(crate::ast::Expr::Binary(
                Box::new(crate::ast::Expr::Field { view: None, name: "a".into(), span: crate::error::Span::UNKNOWN }),
                crate::ast::BinaryOp::Eq,
                Box::new(crate::ast::Expr::IntegerLiteral(1)),
            )),
        };
        let n = execute_delete(&stmt, &mut filter, &ctx).unwrap();
        assert_eq!(n, 1);
        let view = filter.lookup_temp_view("t").unwrap();
        let guard = view.read();
        assert_eq!(guard.records.len(), 1);
        assert_eq!(guard.records[0].get(0).unwrap().value(), &Primary::Integer(2));
    }
}
