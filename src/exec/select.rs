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

//! The SELECT pipeline (spec §4.4 "SELECT"): CTEs, FROM/JOIN, WHERE,
//! GROUP BY/HAVING, window functions, projection, DISTINCT, set operations,
//! ORDER BY, LIMIT/OFFSET.

use crate::ast::{CommonTableExpr, Expr, FunctionCall, NullsOrder, Select, SelectItem, SetOp};
use crate::error::{Error, Result};
use crate::expr::{self, EvalContext};
use crate::record::{Cell, HeaderField, Record};
use crate::scope::Filter;
use crate::value::{serialize_tuple, Primary};
use crate::view::View;
use crate::window;
use indexmap::IndexMap;
use std::collections::HashSet;
use std::sync::Arc;

pub fn execute_select(query: &Select, filter: &mut Filter, ctx: &EvalContext) -> Result<View> {
    register_ctes(&query.ctes, filter, ctx)?;

    let base = match &query.from {
        Some(from) => super::execute_from(from, filter, ctx)?,
        None => View::new(Vec::new(), vec![Record::new(Vec::new())], crate::file_info::FileInfo::temporary("dual")),
    };

    let filtered = apply_where(base, query.filter.as_ref(), filter, ctx)?;

    let agg_calls = collect_aggregate_calls_from_select(query, filter);
    let mut working = if !query.group_by.is_empty() || !agg_calls.is_empty() {
        group_rows(&filtered, &query.group_by, &agg_calls, filter, ctx)?
    } else {
        filtered
    };

    if let Some(having) = &query.having {
        working = apply_where(working, Some(having), filter, ctx)?;
    }

    apply_window_functions(&mut working, query, filter, ctx)?;

    let mut projected = project(&working, &query.items, filter, ctx)?;

    if query.distinct {
        dedup_rows(&mut projected);
    }

    for set_op in &query.set_ops {
        let mut child = filter.create_child();
        let rhs = execute_select(&set_op.rhs, &mut child, ctx)?;
        projected = apply_set_op(projected, rhs, set_op.op, set_op.all);
    }

    sort_rows(&mut projected, &query.order_by, filter, ctx)?;
    apply_limit_offset(&mut projected, query.limit, query.offset);

    Ok(projected)
}

fn register_ctes(ctes: &[CommonTableExpr], filter: &mut Filter, ctx: &EvalContext) -> Result<()> {
    for cte in ctes {
        let mut anchor_view = execute_select(&cte.anchor, filter, ctx)?;
        label_view(&mut anchor_view, &cte.name);
        apply_column_aliases(&mut anchor_view, &cte.columns)?;
        filter.declare_temp_view(&cte.name, anchor_view)?;

        if let Some(member) = &cte.recursive_member {
            // Standard working-table algorithm: each round feeds the member
            // query only the *previous* round's new rows (not the whole
            // accumulated table), so a row already grown from is never
            // grown from again. Feeding the full table back in would
            // re-derive every prior increment each round and never
            // terminate.
            let mut full = filter.lookup_temp_view(&cte.name).unwrap().read().clone();
            let mut working = full.clone();
            loop {
                filter.replace_temp_view(&cte.name, working.clone());
                let mut increment = execute_select(member, filter, ctx)?;
                if increment.records.is_empty() {
                    break;
                }
                label_view(&mut increment, &cte.name);
                if increment.header.len() != full.header.len() {
                    return Err(Error::recursion_field_count(format!(
                        "recursive member of {:?} produces a different column count than its anchor",
                        cte.name
                    )));
                }
                full.records.extend(increment.records.clone());
                working = View::new(full.header.clone(), increment.records, full.file_info.clone());
            }
            filter.replace_temp_view(&cte.name, full);
        }
    }
    Ok(())
}

fn label_view(view: &mut View, name: &str) {
    for field in &mut view.header {
        field.view_name = name.to_string();
    }
}

fn apply_column_aliases(view: &mut View, columns: &[String]) -> Result<()> {
    if columns.is_empty() {
        return Ok(());
    }
    if columns.len() != view.header.len() {
        return Err(Error::recursion_field_count(
            "CTE column list length does not match its query's column count",
        ));
    }
    for (field, name) in view.header.iter_mut().zip(columns) {
        field.column_name = name.clone();
    }
    Ok(())
}

fn apply_where(view: View, predicate: Option<&Expr>, filter: &mut Filter, ctx: &EvalContext) -> Result<View> {
    let Some(predicate) = predicate else { return Ok(view) };
    let arc = Arc::new(view);
    let mut kept = Vec::new();
    for (i, record) in arc.records.iter().enumerate() {
        filter.bind_record(arc.clone(), i);
        if expr::evaluate(predicate, filter, ctx)?.as_bool_ternary().is_true() {
            kept.push(record.clone());
        }
    }
    Ok(View::new(arc.header.clone(), kept, arc.file_info.clone()))
}

/// Walks every SELECT item and the HAVING clause for non-window AGGREGATE
/// (built-in or user-defined) calls (spec §4.4 "GROUP BY").
fn collect_aggregate_calls_from_select(query: &Select, filter: &Filter) -> Vec<FunctionCall> {
    let mut out = Vec::new();
    for item in &query.items {
        collect_aggregate_calls(&item.expr, filter, &mut out);
    }
    if let Some(having) = &query.having {
        collect_aggregate_calls(having, filter, &mut out);
    }
    for item in &query.order_by {
        collect_aggregate_calls(&item.expr, filter, &mut out);
    }
    out
}

fn collect_aggregate_calls(expr: &Expr, filter: &Filter, out: &mut Vec<FunctionCall>) {
    match expr {
        Expr::Function(call) if call.over.is_none() && is_aggregate_like(&call.name, filter) => {
            out.push((**call).clone());
        }
        Expr::Function(call) => {
            for arg in &call.args {
                collect_aggregate_calls(arg, filter, out);
            }
        }
        Expr::Unary(_, inner) => collect_aggregate_calls(inner, filter, out),
        Expr::Binary(lhs, _, rhs) => {
            collect_aggregate_calls(lhs, filter, out);
            collect_aggregate_calls(rhs, filter, out);
        }
        Expr::Case { operand, whens, else_result } => {
            if let Some(o) = operand {
                collect_aggregate_calls(o, filter, out);
            }
            for when in whens {
                collect_aggregate_calls(&when.condition, filter, out);
                collect_aggregate_calls(&when.result, filter, out);
            }
            if let Some(e) = else_result {
                collect_aggregate_calls(e, filter, out);
            }
        }
        Expr::Cast { expr, .. } => collect_aggregate_calls(expr, filter, out),
        _ => {}
    }
}

fn is_aggregate_like(name: &str, filter: &Filter) -> bool {
    matches!(
        window::functions::classify(name, filter),
        window::functions::FunctionKind::Aggregate | window::functions::FunctionKind::UserDefined(_)
    )
}

fn group_rows(view: &View, group_by: &[Expr], agg_calls: &[FunctionCall], filter: &mut Filter, ctx: &EvalContext) -> Result<View> {
    let arc = Arc::new(view.clone());
    let mut groups: IndexMap<String, (Vec<Primary>, Vec<usize>)> = IndexMap::new();

    if group_by.is_empty() {
        let rows: Vec<usize> = (0..arc.records.len()).collect();
        groups.insert(String::new(), (Vec::new(), rows));
    } else {
        for i in 0..arc.records.len() {
            filter.bind_record(arc.clone(), i);
            let key_values = expr::evaluate_values(group_by, filter, ctx)?;
            let key = serialize_tuple(&key_values);
            groups.entry(key).or_insert_with(|| (key_values, Vec::new())).1.push(i);
        }
    }

    let mut header: Vec<HeaderField> = group_by
        .iter()
        .enumerate()
        .map(|(i, e)| HeaderField {
            is_group_key: true,
            ..HeaderField::new(String::new(), window::render_expr(e), i + 1)
        })
        .collect();
    let group_key_count = header.len();
    for (i, call) in agg_calls.iter().enumerate() {
        header.push(HeaderField {
            is_from_table: false,
            ..HeaderField::new(String::new(), window::render_call_signature(call), group_key_count + i + 1)
        });
    }

    let mut records = Vec::with_capacity(groups.len());
    for (key_values, rows) in groups.into_values() {
        let mut cells: Vec<Cell> = key_values.into_iter().map(Cell::single).collect();
        for call in agg_calls {
            let values = if call.star_arg {
                vec![Primary::Integer(1); rows.len()]
            } else {
                rows.iter()
                    .map(|&row| {
                        filter.bind_record(arc.clone(), row);
                        expr::evaluate(&call.args[0], filter, ctx)
                    })
                    .collect::<Result<Vec<_>>>()?
            };
            cells.push(Cell::grouped(values));
        }
        records.push(Record::new(cells));
    }

    Ok(View::new(header, records, crate::file_info::FileInfo::temporary("grouped")))
}

fn apply_window_functions(view: &mut View, query: &Select, filter: &Filter, ctx: &EvalContext) -> Result<()> {
    let mut calls: Vec<FunctionCall> = Vec::new();
    for item in &query.items {
        collect_window_calls(&item.expr, &mut calls);
    }
    for item in &query.order_by {
        collect_window_calls(&item.expr, &mut calls);
    }
    if calls.is_empty() {
        return Ok(());
    }

    let snapshot = Arc::new(view.clone());
    let mut seen = HashSet::new();
    for call in &calls {
        let sig = window::render_call_signature(call);
        if !seen.insert(sig) {
            continue;
        }
        let (header, values) = window::evaluate_window(call, &snapshot, filter, ctx)?;
        view.append_column(header, values)?;
    }
    Ok(())
}

fn collect_window_calls(expr: &Expr, out: &mut Vec<FunctionCall>) {
    match expr {
        Expr::Function(call) if call.over.is_some() => out.push((**call).clone()),
        Expr::Function(call) => {
            for arg in &call.args {
                collect_window_calls(arg, out);
            }
        }
        Expr::Unary(_, inner) => collect_window_calls(inner, out),
        Expr::Binary(lhs, _, rhs) => {
            collect_window_calls(lhs, out);
            collect_window_calls(rhs, out);
        }
        Expr::Case { operand, whens, else_result } => {
            if let Some(o) = operand {
                collect_window_calls(o, out);
            }
            for when in whens {
                collect_window_calls(&when.condition, out);
                collect_window_calls(&when.result, out);
            }
            if let Some(e) = else_result {
                collect_window_calls(e, out);
            }
        }
        Expr::Cast { expr, .. } => collect_window_calls(expr, out),
        _ => {}
    }
}

fn project(view: &View, items: &[SelectItem], filter: &mut Filter, ctx: &EvalContext) -> Result<View> {
    let expanded = expand_items(view, items);

    let header: Vec<HeaderField> = expanded
        .iter()
        .enumerate()
        .map(|(i, (expr, alias))| {
            let name = alias.clone().unwrap_or_else(|| window::render_expr(expr));
            HeaderField::new(String::new(), name, i + 1)
        })
        .collect();

    let arc = Arc::new(view.clone());
    let mut records = Vec::with_capacity(arc.records.len());
    for i in 0..arc.records.len() {
        filter.bind_record(arc.clone(), i);
        let values = expanded
            .iter()
            .map(|(expr, _)| expr::evaluate(expr, filter, ctx))
            .collect::<Result<Vec<_>>>()?;
        records.push(Record::from_values(values));
    }
    Ok(View::new(header, records, crate::file_info::FileInfo::temporary("projection")))
}

/// Expands `*` and `view.*` into one `Field` item per matching header
/// column (spec §4.4 "SELECT field expansion").
fn expand_items(view: &View, items: &[SelectItem]) -> Vec<(Expr, Option<String>)> {
    let mut out = Vec::new();
    for item in items {
        match &item.expr {
            Expr::Star => {
                for field in &view.header {
                    out.push((
                        Expr::Field { view: None, name: field.column_name.clone(), span: crate::error::Span::UNKNOWN },
                        Some(field.column_name.clone()),
                    ));
                }
            }
            Expr::QualifiedStar(v) => {
                for field in view.header.iter().filter(|f| f.view_name.eq_ignore_ascii_case(v)) {
                    out.push((
                        Expr::Field { view: Some(v.clone()), name: field.column_name.clone(), span: crate::error::Span::UNKNOWN },
                        Some(field.column_name.clone()),
                    ));
                }
            }
            other => out.push((other.clone(), item.alias.clone())),
        }
    }
    out
}

fn dedup_rows(view: &mut View) {
    let mut seen = HashSet::new();
    view.records.retain(|r| {
        let key = serialize_tuple(&r.cells.iter().map(|c| c.value().clone()).collect::<Vec<_>>());
        seen.insert(key)
    });
}

fn apply_set_op(lhs: View, rhs: View, op: SetOp, all: bool) -> View {
    let row_key = |r: &Record| serialize_tuple(&r.cells.iter().map(|c| c.value().clone()).collect::<Vec<_>>());
    let rhs_keys: HashSet<String> = rhs.records.iter().map(row_key).collect();

    let mut records = match op {
        SetOp::Union => {
            let mut combined = lhs.records.clone();
            combined.extend(rhs.records.clone());
            combined
        }
        SetOp::Intersect => lhs.records.iter().filter(|r| rhs_keys.contains(&row_key(r))).cloned().collect(),
        SetOp::Except => lhs.records.iter().filter(|r| !rhs_keys.contains(&row_key(r))).cloned().collect(),
    };

    if !all {
        let mut seen = HashSet::new();
        records.retain(|r| seen.insert(row_key(r)));
    }

    View::new(lhs.header, records, lhs.file_info)
}

fn sort_rows(view: &mut View, order_by: &[crate::ast::OrderByItem], filter: &mut Filter, ctx: &EvalContext) -> Result<()> {
    if order_by.is_empty() {
        return Ok(());
    }
    let arc = Arc::new(view.clone());
    let mut keyed: Vec<(usize, Vec<Primary>)> = Vec::with_capacity(arc.records.len());
    for i in 0..arc.records.len() {
        filter.bind_record(arc.clone(), i);
        let values = order_by
            .iter()
            .map(|item| expr::evaluate(&item.expr, filter, ctx))
            .collect::<Result<Vec<_>>>()?;
        keyed.push((i, values));
    }
    keyed.sort_by(|a, b| {
        for (col, item) in order_by.iter().enumerate() {
            let (l, r) = (&a.1[col], &b.1[col]);
            // No explicit NULLS clause defaults to NULLS LAST for ascending
            // order and NULLS FIRST for descending, matching the common
            // convention the teacher's own ORDER BY planner follows.
            let nulls_first = item.nulls.unwrap_or(if item.descending { NullsOrder::First } else { NullsOrder::Last }) == NullsOrder::First;
            let ordering = match (l.is_null(), r.is_null()) {
                (true, true) => std::cmp::Ordering::Equal,
                (true, false) => if nulls_first { std::cmp::Ordering::Less } else { std::cmp::Ordering::Greater },
                (false, true) => if nulls_first { std::cmp::Ordering::Greater } else { std::cmp::Ordering::Less },
                (false, false) => {
                    let cmp = l.sql_cmp(r).unwrap_or(std::cmp::Ordering::Equal);
                    if item.descending { cmp.reverse() } else { cmp }
                }
            };
            if ordering != std::cmp::Ordering::Equal {
                return ordering;
            }
        }
        a.0.cmp(&b.0)
    });
    view.records = keyed.into_iter().map(|(i, _)| arc.records[i].clone()).collect();
    Ok(())
}

fn apply_limit_offset(view: &mut View, limit: Option<i64>, offset: Option<i64>) {
    let offset = offset.unwrap_or(0).max(0) as usize;
    if offset >= view.records.len() {
        view.records.clear();
        return;
    }
    view.records.drain(0..offset);
    if let Some(limit) = limit {
        let limit = limit.max(0) as usize;
        view.records.truncate(limit);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::{BinaryOp, FromClause, TableRef};
    use crate::catalog::Catalog;
    use crate::config::Config;
    use crate::expr::functions::NoScalarFunctions;
    use crate::file_info::FileInfo;
    use crate::record::HeaderField as HF;

    fn field(name: &str) -> Expr {
        Expr::Field { view: None, name: name.into(), span: crate::error::Span::UNKNOWN }
    }

    fn ctx_for<'a>(catalog: &'a Catalog, config: &'a Config, funcs: &'a NoScalarFunctions) -> EvalContext<'a> {
        EvalContext { catalog, config, scalar_functions: funcs }
    }

    fn seed_temp_table(filter: &mut Filter, name: &str) {
        let header = vec![HF::new(name, "a", 1), HF::new(name, "b", 2)];
        let records = vec![
            Record::from_values(vec![Primary::Integer(1), Primary::Integer(10)]),
            Record::from_values(vec![Primary::Integer(1), Primary::Integer(20)]),
            Record::from_values(vec![Primary::Integer(2), Primary::Integer(5)]),
        ];
        filter
            .declare_temp_view(name, View::new(header, records, FileInfo::temporary(name)))
            .unwrap();
    }

    #[test]
    fn group_by_sum_aggregates_per_group() {
        let mut filter = Filter::new_root();
        seed_temp_table(&mut filter, "t");
        let catalog = Catalog::new();
        let config = Config::default();
        let funcs = NoScalarFunctions;
        let ctx = ctx_for(&catalog, &config, &funcs);

        let call = FunctionCall {
            name: "SUM".into(),
            args: vec![field("b")],
            distinct: false,
            star_arg: false,
            ignore_nulls: false,
            over: None,
            span: crate::error::Span::UNKNOWN,
        };
        let query = Select {
            items: vec![
                SelectItem { expr: field("a"), alias: None },
                SelectItem { expr: Expr::Function(Box::new(call)), alias: Some("total".into()) },
            ],
            from: Some(FromClause { first: TableRef::Named { name: "t".into(), alias: None }, joins: vec![] }),
            group_by: vec![field("a")],
            order_by: vec![crate::ast::OrderByItem { expr: field("a"), descending: false, nulls: None }],
            ..Select::default()
        };

        let result = execute_select(&query, &mut filter, &ctx).unwrap();
        assert_eq!(result.records.len(), 2);
        assert_eq!(result.records[0].get(0).unwrap().value(), &Primary::Integer(1));
        assert_eq!(result.records[0].get(1).unwrap().value(), &Primary::Integer(30));
        assert_eq!(result.records[1].get(1).unwrap().value(), &Primary::Integer(5));
    }

    #[test]
    fn where_filters_rows() {
        let mut filter = Filter::new_root();
        seed_temp_table(&mut filter, "t");
        let catalog = Catalog::new();
        let config = Config::default();
        let funcs = NoScalarFunctions;
        let ctx = ctx_for(&catalog, &config, &funcs);

        let query = Select {
            items: vec![SelectItem { expr: field("b"), alias: None }],
            from: Some(FromClause { first: TableRef::Named { name: "t".into(), alias: None }, joins: vec![] }),
            filter: Some(Expr::Binary(Box::new(field("a")), BinaryOp::Eq, Box::new(Expr::IntegerLiteral(2)))),
            ..Select::default()
        };
        let result = execute_select(&query, &mut filter, &ctx).unwrap();
        assert_eq!(result.records.len(), 1);
        assert_eq!(result.records[0].get(0).unwrap().value(), &Primary::Integer(5));
    }

    #[test]
    fn limit_and_offset_slice_result() {
        let mut filter = Filter::new_root();
        seed_temp_table(&mut filter, "t");
        let catalog = Catalog::new();
        let config = Config::default();
        let funcs = NoScalarFunctions;
        let ctx = ctx_for(&catalog, &config, &funcs);

        let query = Select {
            items: vec![SelectItem { expr: field("b"), alias: None }],
            from: Some(FromClause { first: TableRef::Named { name: "t".into(), alias: None }, joins: vec![] }),
            order_by: vec![crate::ast::OrderByItem { expr: field("b"), descending: false, nulls: None }],
            limit: Some(1),
            offset: Some(1),
            ..Select::default()
        };
        let result = execute_select(&query, &mut filter, &ctx).unwrap();
        assert_eq!(result.records.len(), 1);
        assert_eq!(result.records[0].get(0).unwrap().value(), &Primary::Integer(10));
    }
}
