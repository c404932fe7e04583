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

//! Recursive evaluation of AST expression nodes (spec §4.3 "Expression
//! evaluation").

pub mod functions;

use crate::ast::{BinaryOp, CastType, Expr, SubqueryQuantifier, UnaryOp};
use crate::catalog::Catalog;
use crate::config::Config;
use crate::error::{Error, Result};
use crate::scope::Filter;
use crate::value::{Primary, Ternary};
use functions::ScalarFunctions;
use std::sync::Arc;

/// Everything expression evaluation needs beyond the [`Filter`] itself:
/// the catalog (for subqueries to resolve tables), config, and the
/// pluggable scalar-function dispatch table (spec §1).
pub struct EvalContext<'a> {
    pub catalog: &'a Catalog,
    pub config: &'a Config,
    pub scalar_functions: &'a dyn ScalarFunctions,
}

pub fn evaluate_values(exprs: &[Expr], filter: &mut Filter, ctx: &EvalContext) -> Result<Vec<Primary>> {
    exprs.iter().map(|e| evaluate(e, filter, ctx)).collect()
}

/// `Filter.evaluate(expr) -> Primary` (spec §4.3 "Contract").
pub fn evaluate(expr: &Expr, filter: &mut Filter, ctx: &EvalContext) -> Result<Primary> {
    match expr {
        Expr::NullLiteral => Ok(Primary::Null),
        Expr::IntegerLiteral(i) => Ok(Primary::Integer(*i)),
        Expr::FloatLiteral(f) => Ok(Primary::Float(*f)),
        Expr::StringLiteral(s) => Ok(Primary::String(s.clone())),
        Expr::BooleanLiteral(b) => Ok(Primary::Boolean(*b)),
        Expr::Star | Expr::QualifiedStar(_) => {
            Err(Error::internal("`*` cannot be evaluated as a scalar expression"))
        }
        Expr::Field { view, name, span } => resolve_field(filter, view.as_deref(), name, *span),
        Expr::FieldIndexed { view, name, index, span } => {
            resolve_field_indexed(filter, view.as_deref(), name, *index, *span)
        }
        Expr::Variable(name) => filter.lookup_variable(name),
        Expr::SystemVariable(name) => system_variable(name, ctx),
        Expr::Unary(op, inner) => evaluate_unary(*op, inner, filter, ctx),
        Expr::Binary(lhs, op, rhs) => evaluate_binary(lhs, *op, rhs, filter, ctx),
        Expr::Case { operand, whens, else_result } => {
            evaluate_case(operand.as_deref(), whens, else_result.as_deref(), filter, ctx)
        }
        Expr::Cast { expr, target, span } => {
            let value = evaluate(expr, filter, ctx)?;
            cast(value, *target, *span)
        }
        Expr::Function(call) => evaluate_function(call, filter, ctx),
        Expr::Subquery { query, quantifier, compare_expr, span } => {
            evaluate_subquery(query, *quantifier, compare_expr.as_deref(), filter, ctx, *span)
        }
        Expr::Cursor { name, predicate, span } => evaluate_cursor(filter, name, *predicate, *span),
    }
}

/// `CURSOR c IS OPEN` / `IS IN RANGE` / `COUNT` (spec §4.5).
fn evaluate_cursor(
    filter: &Filter,
    name: &str,
    predicate: crate::ast::CursorPredicate,
    span: crate::error::Span,
) -> Result<Primary> {
    use crate::ast::CursorPredicate;
    filter
        .with_cursor_mut(name, |cursor| {
            Ok(match predicate {
                CursorPredicate::IsOpen => Primary::Ternary(cursor.is_open_ternary()),
                CursorPredicate::IsInRange => Primary::Ternary(cursor.is_in_range()),
                CursorPredicate::Count => Primary::Integer(cursor.count()?),
            })
        })
        .map_err(|e| e.with_span(span))
}

fn resolve_field(filter: &Filter, view: Option<&str>, name: &str, span: crate::error::Span) -> Result<Primary> {
    // `@var`-style identifiers are parsed to `Expr::Variable`, so an
    // unqualified `Field` always addresses the bound record; correlated
    // subqueries walk outward through `record_refs` (spec §4.3).
    for record_ref in &filter.record_refs {
        match record_ref.view.resolve_field(view, name) {
            Ok(idx) => {
                let record = record_ref
                    .view
                    .records
                    .get(record_ref.record_index)
                    .ok_or_else(|| Error::internal("record index out of range"))?;
                return Ok(record
                    .get(idx)
                    .map(|c| c.value().clone())
                    .unwrap_or(Primary::Null));
            }
            Err(e) if e.kind == crate::error::ErrorKind::FieldAmbiguous => return Err(e.with_span(span)),
            Err(_) => continue,
        }
    }
    Err(Error::field_not_exist(format!("field {name:?} does not exist")).with_span(span))
}

fn resolve_field_indexed(
    filter: &Filter,
    view: Option<&str>,
    name: &str,
    index: usize,
    span: crate::error::Span,
) -> Result<Primary> {
    for record_ref in &filter.record_refs {
        if let Ok(idx) = record_ref.view.resolve_field(view, name) {
            let record = record_ref
                .view
                .records
                .get(record_ref.record_index)
                .ok_or_else(|| Error::internal("record index out of range"))?;
            let cell = record.get(idx).ok_or_else(|| Error::internal("column index out of range"))?;
            return Ok(cell
                .grouped_values()
                .get(index)
                .cloned()
                .unwrap_or(Primary::Null));
        }
    }
    Err(Error::field_not_exist(format!("field {name:?} does not exist")).with_span(span))
}

/// Like [`resolve_field`] but returns the whole [`crate::record::Cell`]
/// rather than collapsing it to a single value; used to reach a GROUP BY
/// aggregate column's raw member values (spec §4.4 "cells that aggregate
/// functions consume").
fn resolve_cell(filter: &Filter, name: &str, span: crate::error::Span) -> Result<crate::record::Cell> {
    for record_ref in &filter.record_refs {
        if let Ok(idx) = record_ref.view.resolve_field(None, name) {
            let record = record_ref
                .view
                .records
                .get(record_ref.record_index)
                .ok_or_else(|| Error::internal("record index out of range"))?;
            return record
                .get(idx)
                .cloned()
                .ok_or_else(|| Error::internal("column index out of range"));
        }
    }
    Err(Error::field_not_exist(format!("field {name:?} does not exist")).with_span(span))
}

fn system_variable(name: &str, ctx: &EvalContext) -> Result<Primary> {
    match name.to_ascii_uppercase().as_str() {
        "CPU" => Ok(Primary::Integer(ctx.config.cpu.unwrap_or_else(num_cpus::get) as i64)),
        "QUIET" => Ok(Primary::Boolean(ctx.config.quiet)),
        other => Err(Error::variable_undeclared(format!("unknown system variable @@{other}"))),
    }
}

fn evaluate_unary(op: UnaryOp, inner: &Expr, filter: &mut Filter, ctx: &EvalContext) -> Result<Primary> {
    let value = evaluate(inner, filter, ctx)?;
    Ok(match op {
        UnaryOp::Neg => match value {
            Primary::Integer(i) => Primary::Integer(-i),
            Primary::Float(f) => Primary::Float(-f),
            Primary::Null => Primary::Null,
            other => return Err(Error::type_conversion(format!("cannot negate {}", other.type_tag()))),
        },
        UnaryOp::Not => Primary::Ternary(value.as_bool_ternary().not()),
        UnaryOp::IsNull => Primary::Boolean(value.is_null()),
        UnaryOp::IsNotNull => Primary::Boolean(!value.is_null()),
    })
}

fn evaluate_binary(lhs: &Expr, op: BinaryOp, rhs: &Expr, filter: &mut Filter, ctx: &EvalContext) -> Result<Primary> {
    // AND/OR short-circuit on their SQL three-valued identity element so a
    // NULL on the other side does not spuriously force UNKNOWN.
    if op == BinaryOp::And {
        let l = evaluate(lhs, filter, ctx)?.as_bool_ternary();
        if l == Ternary::False {
            return Ok(Primary::Ternary(Ternary::False));
        }
        let r = evaluate(rhs, filter, ctx)?.as_bool_ternary();
        return Ok(Primary::Ternary(l.and(r)));
    }
    if op == BinaryOp::Or {
        let l = evaluate(lhs, filter, ctx)?.as_bool_ternary();
        if l == Ternary::True {
            return Ok(Primary::Ternary(Ternary::True));
        }
        let r = evaluate(rhs, filter, ctx)?.as_bool_ternary();
        return Ok(Primary::Ternary(l.or(r)));
    }

    let l = evaluate(lhs, filter, ctx)?;
    let r = evaluate(rhs, filter, ctx)?;

    use BinaryOp::*;
    match op {
        Eq => Ok(Primary::Ternary(l.sql_eq(&r))),
        NotEq => Ok(Primary::Ternary(l.sql_eq(&r).not())),
        Lt => Ok(Primary::Ternary(ternary_from_ordering(l.sql_cmp(&r), |o| o == std::cmp::Ordering::Less))),
        LtEq => Ok(Primary::Ternary(ternary_from_ordering(l.sql_cmp(&r), |o| o != std::cmp::Ordering::Greater))),
        Gt => Ok(Primary::Ternary(ternary_from_ordering(l.sql_cmp(&r), |o| o == std::cmp::Ordering::Greater))),
        GtEq => Ok(Primary::Ternary(ternary_from_ordering(l.sql_cmp(&r), |o| o != std::cmp::Ordering::Less))),
        Add | Sub | Mul | Div | Mod => arithmetic(l, op, r),
        Concat => {
            if l.is_null() || r.is_null() {
                Ok(Primary::Null)
            } else {
                Ok(Primary::String(format!("{}{}", l.as_str_lossy(), r.as_str_lossy())))
            }
        }
        Like | NotLike => {
            if l.is_null() || r.is_null() {
                return Ok(Primary::Ternary(Ternary::Unknown));
            }
            let matched = like_match(&l.as_str_lossy(), &r.as_str_lossy());
            let matched = if op == NotLike { !matched } else { matched };
            Ok(Primary::Ternary(Ternary::from_bool(matched)))
        }
        And | Or => unreachable!("handled above"),
    }
}

fn ternary_from_ordering(ord: Option<std::cmp::Ordering>, pred: impl Fn(std::cmp::Ordering) -> bool) -> Ternary {
    match ord {
        Some(o) => Ternary::from_bool(pred(o)),
        None => Ternary::Unknown,
    }
}

fn arithmetic(l: Primary, op: BinaryOp, r: Primary) -> Result<Primary> {
    if l.is_null() || r.is_null() {
        return Ok(Primary::Null);
    }
    let is_float = matches!(l, Primary::Float(_)) || matches!(r, Primary::Float(_));
    if is_float {
        let a = l.as_f64().ok_or_else(|| Error::type_conversion("expected a numeric operand"))?;
        let b = r.as_f64().ok_or_else(|| Error::type_conversion("expected a numeric operand"))?;
        return Ok(Primary::Float(match op {
            BinaryOp::Add => a + b,
            BinaryOp::Sub => a - b,
            BinaryOp::Mul => a * b,
            BinaryOp::Div => a / b,
            BinaryOp::Mod => a % b,
            _ => unreachable!(),
        }));
    }
    let a = l.as_i64().ok_or_else(|| Error::type_conversion("expected a numeric operand"))?;
    let b = r.as_i64().ok_or_else(|| Error::type_conversion("expected a numeric operand"))?;
    match op {
        BinaryOp::Add => Ok(Primary::Integer(a + b)),
        BinaryOp::Sub => Ok(Primary::Integer(a - b)),
        BinaryOp::Mul => Ok(Primary::Integer(a * b)),
        BinaryOp::Div => {
            if b == 0 {
                Err(Error::type_conversion("division by zero"))
            } else {
                Ok(Primary::Integer(a / b))
            }
        }
        BinaryOp::Mod => {
            if b == 0 {
                Err(Error::type_conversion("division by zero"))
            } else {
                Ok(Primary::Integer(a % b))
            }
        }
        _ => unreachable!(),
    }
}

/// A minimal SQL `LIKE` matcher: `%` matches any run of characters, `_`
/// matches exactly one.
fn like_match(text: &str, pattern: &str) -> bool {
    fn go(t: &[char], p: &[char]) -> bool {
        match p.first() {
            None => t.is_empty(),
            Some('%') => go(t, &p[1..]) || (!t.is_empty() && go(&t[1..], p)),
            Some('_') => !t.is_empty() && go(&t[1..], &p[1..]),
            Some(c) => t.first() == Some(c) && go(&t[1..], &p[1..]),
        }
    }
    let t: Vec<char> = text.chars().collect();
    let p: Vec<char> = pattern.chars().collect();
    go(&t, &p)
}

fn evaluate_case(
    operand: Option<&Expr>,
    whens: &[crate::ast::CaseWhen],
    else_result: Option<&Expr>,
    filter: &mut Filter,
    ctx: &EvalContext,
) -> Result<Primary> {
    let operand_value = match operand {
        Some(e) => Some(evaluate(e, filter, ctx)?),
        None => None,
    };
    for when in whens {
        let matched = match &operand_value {
            Some(v) => evaluate(&when.condition, filter, ctx)?.sql_eq(v).is_true(),
            None => evaluate(&when.condition, filter, ctx)?.as_bool_ternary().is_true(),
        };
        if matched {
            return evaluate(&when.result, filter, ctx);
        }
    }
    match else_result {
        Some(e) => evaluate(e, filter, ctx),
        None => Ok(Primary::Null),
    }
}

/// CAST with well-defined coercion failure (spec §4.3).
pub fn cast(value: Primary, target: CastType, span: crate::error::Span) -> Result<Primary> {
    if value.is_null() {
        return Ok(Primary::Null);
    }
    Ok(match target {
        CastType::Integer => Primary::Integer(
            value
                .as_i64()
                .ok_or_else(|| Error::type_conversion(format!("cannot cast {value} to INTEGER")).with_span(span))?,
        ),
        CastType::Float => Primary::Float(
            value
                .as_f64()
                .ok_or_else(|| Error::type_conversion(format!("cannot cast {value} to FLOAT")).with_span(span))?,
        ),
        CastType::String => Primary::String(value.as_str_lossy()),
        CastType::Boolean => Primary::Boolean(value.as_bool_ternary().is_true()),
        CastType::Datetime => match value {
            Primary::Datetime(dt) => Primary::Datetime(dt),
            Primary::String(s) => chrono::DateTime::parse_from_rfc3339(&s)
                .map(|dt| Primary::Datetime(dt.with_timezone(&chrono::Utc)))
                .map_err(|_| Error::type_conversion(format!("cannot cast {s:?} to DATETIME")).with_span(span))?,
            other => return Err(Error::type_conversion(format!("cannot cast {} to DATETIME", other.type_tag())).with_span(span)),
        },
    })
}

fn evaluate_function(call: &crate::ast::FunctionCall, filter: &mut Filter, ctx: &EvalContext) -> Result<Primary> {
    if call.over.is_some() {
        // Window-function calls are resolved to an already-materialized
        // column by the SELECT pipeline before general expression
        // evaluation ever sees them again (spec §4.1 "Write-back").
        return resolve_field(filter, None, &crate::window::render_call_signature(call), call.span);
    }

    if let Some(def) = filter.lookup_user_function(&call.name) {
        if !def.is_aggregate {
            return evaluate_user_defined_scalar(&def, call, filter, ctx);
        }
    }

    let kind = crate::window::functions::classify(&call.name, filter);
    match kind {
        crate::window::functions::FunctionKind::Aggregate => {
            // Non-window aggregate reference: the GROUP BY / whole-result
            // pipeline (exec::select) has already materialized this call's
            // argument values into a synthetic grouped column named by its
            // rendered signature (spec §4.4 "aggregate functions consume
            // those [grouped] cells"); apply the aggregate here.
            let sig = crate::window::render_call_signature(call);
            let cell = resolve_cell(filter, &sig, call.span)?;
            crate::window::functions::apply_aggregate(&call.name, cell.grouped_values()).map_err(|e| e.with_span(call.span))
        }
        crate::window::functions::FunctionKind::Analytic => {
            Err(Error::internal(format!("{} is a window function and requires OVER(...)", call.name)).with_span(call.span))
        }
        crate::window::functions::FunctionKind::UserDefined(def) => {
            if def.params.len() != 2 {
                return Err(Error::function_argument_length(format!(
                    "user-defined aggregate {} must declare exactly 2 parameters (accumulator, value)",
                    def.name
                ))
                .with_span(call.span));
            }
            let sig = crate::window::render_call_signature(call);
            let cell = resolve_cell(filter, &sig, call.span)?;
            let mut accumulator = Primary::Null;
            for value in cell.grouped_values() {
                let mut step = filter.create_child();
                step.push_scope();
                step.declare_variable(&def.params[0], accumulator);
                step.declare_variable(&def.params[1], value.clone());
                accumulator = evaluate(&def.body, &mut step, ctx)?;
            }
            Ok(accumulator)
        }
        crate::window::functions::FunctionKind::Scalar => {
            let args = evaluate_values(&call.args, filter, ctx)?;
            ctx.scalar_functions.call(&call.name, &args).map_err(|e| e.with_span(call.span))
        }
    }
}

fn evaluate_user_defined_scalar(
    def: &crate::scope::UserFunctionDef,
    call: &crate::ast::FunctionCall,
    filter: &mut Filter,
    ctx: &EvalContext,
) -> Result<Primary> {
    if def.params.len() != call.args.len() {
        return Err(Error::function_argument_length(format!(
            "{} expects {} argument(s), got {}",
            call.name,
            def.params.len(),
            call.args.len()
        ))
        .with_span(call.span));
    }
    let args = evaluate_values(&call.args, filter, ctx)?;
    let mut child = filter.create_child();
    child.push_scope();
    for (param, value) in def.params.iter().zip(args) {
        child.declare_variable(param, value);
    }
    evaluate(&def.body, &mut child, ctx)
}

fn evaluate_subquery(
    query: &Arc<crate::ast::Select>,
    quantifier: SubqueryQuantifier,
    compare_expr: Option<&Expr>,
    filter: &mut Filter,
    ctx: &EvalContext,
    span: crate::error::Span,
) -> Result<Primary> {
    let mut child = filter.create_child();
    let view = crate::exec::select::execute_select(query, &mut child, ctx)?;

    match quantifier {
        SubqueryQuantifier::Exists => Ok(Primary::Ternary(Ternary::from_bool(!view.records.is_empty()))),
        SubqueryQuantifier::NotExists => Ok(Primary::Ternary(Ternary::from_bool(view.records.is_empty()))),
        SubqueryQuantifier::Scalar => {
            if view.records.len() > 1 {
                return Err(Error::subquery_too_many_rows("scalar subquery returned more than one row").with_span(span));
            }
            if view.header.len() > 1 {
                return Err(Error::subquery_too_many_fields("scalar subquery returned more than one column").with_span(span));
            }
            Ok(view
                .records
                .first()
                .and_then(|r| r.get(0))
                .map(|c| c.value().clone())
                .unwrap_or(Primary::Null))
        }
        SubqueryQuantifier::In | SubqueryQuantifier::NotIn | SubqueryQuantifier::Any | SubqueryQuantifier::All => {
            let compare = compare_expr.ok_or_else(|| Error::internal("IN/ANY/ALL subquery missing comparison operand"))?;
            let lhs = evaluate(compare, filter, ctx)?;
            if view.header.len() > 1 {
                return Err(Error::subquery_too_many_fields("row subquery returned more than one column").with_span(span));
            }
            let column_values: Vec<Primary> = view
                .records
                .iter()
                .filter_map(|r| r.get(0).map(|c| c.value().clone()))
                .collect();
            let matches: Vec<Ternary> = column_values.iter().map(|v| lhs.sql_eq(v)).collect();
            let result = match quantifier {
                SubqueryQuantifier::In | SubqueryQuantifier::Any => {
                    matches.into_iter().fold(Ternary::False, Ternary::or)
                }
                SubqueryQuantifier::NotIn => matches.into_iter().fold(Ternary::False, Ternary::or).not(),
                SubqueryQuantifier::All => matches.into_iter().fold(Ternary::True, Ternary::and),
                _ => unreachable!(),
            };
            Ok(Primary::Ternary(result))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::file_info::FileInfo;
    use crate::record::{HeaderField, Record};
    use crate::view::View;

    fn ctx(catalog: &Catalog, config: &Config, funcs: &dyn ScalarFunctions) -> EvalContext<'_> {
        EvalContext { catalog, config, scalar_functions: funcs }
    }

    fn bound_filter() -> (Filter, Arc<View>) {
        let header = vec![HeaderField::new("t", "a", 1), HeaderField::new("t", "b", 2)];
        let records = vec![Record::from_values(vec![Primary::Integer(1), Primary::Null])];
        let view = Arc::new(View::new(header, records, FileInfo::temporary("t")));
        let mut filter = Filter::new_root();
        filter.bind_record(view.clone(), 0);
        (filter, view)
    }

    #[test]
    fn field_null_propagates_through_arithmetic() {
        let (mut filter, _) = bound_filter();
        let catalog = Catalog::new();
        let config = Config::default();
        let funcs = functions::NoScalarFunctions;
        let c = ctx(&catalog, &config, &funcs);
        let expr = Expr::Binary(
            Box::new(Expr::Field { view: None, name: "b".into(), span: crate::error::Span::UNKNOWN }),
            BinaryOp::Add,
            Box::new(Expr::IntegerLiteral(1)),
        );
        assert_eq!(evaluate(&expr, &mut filter, &c).unwrap(), Primary::Null);
    }

    #[test]
    fn and_short_circuits_on_false() {
        let (mut filter, _) = bound_filter();
        let catalog = Catalog::new();
        let config = Config::default();
        let funcs = functions::NoScalarFunctions;
        let c = ctx(&catalog, &config, &funcs);
        let expr = Expr::Binary(
            Box::new(Expr::BooleanLiteral(false)),
            BinaryOp::And,
            Box::new(Expr::Field { view: None, name: "nonexistent".into(), span: crate::error::Span::UNKNOWN }),
        );
        assert_eq!(evaluate(&expr, &mut filter, &c).unwrap(), Primary::Ternary(Ternary::False));
    }

    #[test]
    fn like_matches_percent_and_underscore() {
        assert!(like_match("hello", "h_ll%"));
        assert!(!like_match("hxllo", "h_l"));
    }

    #[test]
    fn cast_integer_to_string() {
        let r = cast(Primary::Integer(42), CastType::String, crate::error::Span::UNKNOWN).unwrap();
        assert_eq!(r, Primary::String("42".into()));
    }

    #[test]
    fn cast_invalid_string_to_integer_fails() {
        let err = cast(Primary::String("abc".into()), CastType::Integer, crate::error::Span::UNKNOWN).unwrap_err();
        assert_eq!(err.kind, crate::error::ErrorKind::TypeConversion);
    }
}
