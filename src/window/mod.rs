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

//! The parallel partition & window-function engine (spec §4.1): classify,
//! arity-check, partition-phase, merge-phase, evaluation-phase, write-back.
//!
//! Parallelism is `rayon` work-stealing over partitions rather than
//! teacher's `tokio`/`DataFusion` async task scheduling, per the spec's
//! explicit worker-thread/work-stealing model (§5 "Scheduling model"); the
//! classify → partition → merge → evaluate → write-back pipeline itself
//! mirrors teacher's `WindowAggExec` (`datafusion/physical-plan/src/windows`)
//! staging, generalized from Arrow batches to row-at-a-time `Primary`
//! evaluation.

pub mod functions;

use crate::ast::{FrameBound, FunctionCall, OverClause};
use crate::error::{Error, FirstErrorSlot, Result};
use crate::expr::{self, EvalContext};
use crate::record::HeaderField;
use crate::scope::Filter;
use crate::value::{serialize_tuple, Primary};
use crate::view::View;
use functions::FunctionKind;
use indexmap::IndexMap;
use rayon::prelude::*;
use std::sync::Arc;

/// The synthetic column name a window/aggregate call's result is written
/// under and later looked up through (spec §4.1 "write-back": a new field
/// named after the call's rendered form).
pub fn render_call_signature(call: &FunctionCall) -> String {
    let args = if call.star_arg {
        "*".to_string()
    } else {
        call.args
            .iter()
            .map(render_expr)
            .collect::<Vec<_>>()
            .join(", ")
    };
    let distinct = if call.distinct { "DISTINCT " } else { "" };
    match &call.over {
        Some(over) => format!("{}({distinct}{args}) OVER({})", call.name.to_ascii_uppercase(), render_over(over)),
        None => format!("{}({distinct}{args})", call.name.to_ascii_uppercase()),
    }
}

fn render_over(over: &OverClause) -> String {
    let mut parts = Vec::new();
    if !over.partition_by.is_empty() {
        parts.push(format!(
            "PARTITION BY {}",
            over.partition_by.iter().map(render_expr).collect::<Vec<_>>().join(", ")
        ));
    }
    if !over.order_by.is_empty() {
        parts.push(format!(
            "ORDER BY {}",
            over.order_by
                .iter()
                .map(|o| format!("{}{}", render_expr(&o.expr), if o.descending { " DESC" } else { "" }))
                .collect::<Vec<_>>()
                .join(", ")
        ));
    }
    parts.join(" ")
}

pub(crate) fn render_expr(expr: &crate::ast::Expr) -> String {
    use crate::ast::Expr::*;
    match expr {
        Field { view, name, .. } => match view {
            Some(v) => format!("{v}.{name}"),
            None => name.clone(),
        },
        IntegerLiteral(i) => i.to_string(),
        StringLiteral(s) => format!("'{s}'"),
        Star => "*".to_string(),
        _ => "expr".to_string(),
    }
}

/// Runs the full window-function pipeline for one `OVER(...)` call and
/// returns the header/value-column to append to `view` (spec §4.1
/// "Write-back").
pub fn evaluate_window(
    call: &FunctionCall,
    view: &Arc<View>,
    filter: &Filter,
    ctx: &EvalContext,
) -> Result<(HeaderField, Vec<Primary>)> {
    let over = call
        .over
        .as_ref()
        .ok_or_else(|| Error::internal(format!("{} requires an OVER clause", call.name)).with_span(call.span))?;

    let kind = functions::classify(&call.name, filter);
    functions::arity_check(&call.name, call)?;

    let row_count = view.records.len();
    let header = HeaderField {
        is_from_table: false,
        ..HeaderField::new(String::new(), render_call_signature(call), view.header.len() + 1)
    };
    if row_count == 0 {
        return Ok((header, Vec::new()));
    }

    // Partition-phase (parallel): compute each row's partition key and
    // ordering key concurrently.
    let keyed: Vec<(usize, String, Vec<Primary>)> = (0..row_count)
        .into_par_iter()
        .map(|row| -> Result<(usize, String, Vec<Primary>)> {
            let mut child = filter.create_child();
            child.bind_record(view.clone(), row);
            let partition_values = expr::evaluate_values(&over.partition_by, &mut child, ctx)?;
            let order_values = expr::evaluate_values(
                &over.order_by.iter().map(|o| o.expr.clone()).collect::<Vec<_>>(),
                &mut child,
                ctx,
            )?;
            Ok((row, serialize_tuple(&partition_values), order_values))
        })
        .collect::<Result<Vec<_>>>()?;

    // Merge-phase (serial, order-preserving): group by partition key in
    // first-appearance order, then stable-sort each group by ORDER BY
    // (ties keep original row order for determinism; spec §4.1
    // "tie-breaking & determinism").
    let mut partitions: IndexMap<String, Vec<usize>> = IndexMap::new();
    let mut order_keys: Vec<Vec<Primary>> = vec![Vec::new(); row_count];
    for (row, key, order_values) in keyed {
        order_keys[row] = order_values;
        partitions.entry(key).or_default().push(row);
    }
    for rows in partitions.values_mut() {
        let nulls_last = over.order_by.iter().map(|o| o.nulls.is_none() && !o.descending).collect::<Vec<_>>();
        let _ = nulls_last;
        rows.sort_by(|&a, &b| {
            for (i, item) in over.order_by.iter().enumerate() {
                let cmp = order_keys[a][i]
                    .sql_cmp(&order_keys[b][i])
                    .unwrap_or(std::cmp::Ordering::Equal);
                let cmp = if item.descending { cmp.reverse() } else { cmp };
                if cmp != std::cmp::Ordering::Equal {
                    return cmp;
                }
            }
            a.cmp(&b)
        });
    }

    // Evaluation-phase (parallel across partitions, sequential within):
    // cooperative first-error-wins cancellation (spec §4.1, §5).
    let error_slot = FirstErrorSlot::new();
    let results: Vec<Vec<(usize, Primary)>> = partitions
        .values()
        .collect::<Vec<_>>()
        .into_par_iter()
        .map(|rows| {
            if error_slot.is_set() {
                return Vec::new();
            }
            match evaluate_partition(&kind, call, over, rows, view, filter, ctx) {
                Ok(values) => rows.iter().copied().zip(values).collect(),
                Err(e) => {
                    error_slot.record(e);
                    Vec::new()
                }
            }
        })
        .collect();
    error_slot.into_result()?;

    // Write-back (serial): restore original row order.
    let mut column = vec![Primary::Null; row_count];
    for part in results {
        for (row, value) in part {
            column[row] = value;
        }
    }
    Ok((header, column))
}

fn evaluate_partition(
    kind: &FunctionKind,
    call: &FunctionCall,
    over: &OverClause,
    rows: &[usize],
    view: &Arc<View>,
    filter: &Filter,
    ctx: &EvalContext,
) -> Result<Vec<Primary>> {
    let mut child = filter.create_child();
    let arg_values = |child: &mut Filter, expr_idx: usize| -> Result<Vec<Primary>> {
        rows.iter()
            .map(|&row| {
                child.bind_record(view.clone(), row);
                expr::evaluate(&call.args[expr_idx], child, ctx)
            })
            .collect()
    };

    match kind {
        FunctionKind::Analytic => evaluate_analytic(call, over, rows, &mut child, view, ctx),
        FunctionKind::Aggregate => {
            let values = if call.star_arg {
                vec![Primary::Integer(1); rows.len()]
            } else {
                arg_values(&mut child, 0)?
            };
            let result = functions::apply_aggregate(&call.name, &values)?;
            Ok(vec![result; rows.len()])
        }
        FunctionKind::UserDefined(def) => {
            if def.params.len() != 2 {
                return Err(Error::function_argument_length(format!(
                    "user-defined aggregate {} must declare exactly 2 parameters (accumulator, value)",
                    def.name
                )));
            }
            let values = arg_values(&mut child, 0)?;
            let mut accumulator = Primary::Null;
            for value in values {
                let mut step = child.create_child();
                step.push_scope();
                step.declare_variable(&def.params[0], accumulator);
                step.declare_variable(&def.params[1], value);
                accumulator = expr::evaluate(&def.body, &mut step, ctx)?;
            }
            Ok(vec![accumulator; rows.len()])
        }
        FunctionKind::Scalar => Err(Error::internal(format!("{} is not a window function", call.name)).with_span(call.span)),
    }
}

fn evaluate_analytic(
    call: &FunctionCall,
    over: &OverClause,
    rows: &[usize],
    filter: &mut Filter,
    view: &Arc<View>,
    ctx: &EvalContext,
) -> Result<Vec<Primary>> {
    let n = rows.len();
    let name = call.name.to_ascii_uppercase();

    // Materialize the ordering key per partition-local position, used by
    // RANK/DENSE_RANK/CUME_DIST/PERCENT_RANK tie detection.
    let order_keys: Vec<String> = rows
        .iter()
        .map(|&row| -> Result<String> {
            filter.bind_record(view.clone(), row);
            let values = expr::evaluate_values(&over.order_by.iter().map(|o| o.expr.clone()).collect::<Vec<_>>(), filter, ctx)?;
            Ok(serialize_tuple(&values))
        })
        .collect::<Result<Vec<_>>>()?;

    match name.as_str() {
        "ROW_NUMBER" => Ok((1..=n as i64).map(Primary::Integer).collect()),
        "RANK" => {
            let mut out = Vec::with_capacity(n);
            let mut rank = 1i64;
            for i in 0..n {
                if i > 0 && order_keys[i] != order_keys[i - 1] {
                    rank = i as i64 + 1;
                }
                out.push(Primary::Integer(rank));
            }
            Ok(out)
        }
        "DENSE_RANK" => {
            let mut out = Vec::with_capacity(n);
            let mut rank = 1i64;
            for i in 0..n {
                if i > 0 && order_keys[i] != order_keys[i - 1] {
                    rank += 1;
                }
                out.push(Primary::Integer(rank));
            }
            Ok(out)
        }
        "CUME_DIST" => {
            let mut group_end = vec![0usize; n];
            let mut i = 0;
            while i < n {
                let mut j = i;
                while j + 1 < n && order_keys[j + 1] == order_keys[i] {
                    j += 1;
                }
                for k in i..=j {
                    group_end[k] = j;
                }
                i = j + 1;
            }
            Ok(group_end.into_iter().map(|end| Primary::Float((end + 1) as f64 / n as f64)).collect())
        }
        "PERCENT_RANK" => {
            let mut out = Vec::with_capacity(n);
            let mut rank = 1i64;
            for i in 0..n {
                if i > 0 && order_keys[i] != order_keys[i - 1] {
                    rank = i as i64 + 1;
                }
                let pr = if n > 1 { (rank - 1) as f64 / (n - 1) as f64 } else { 1.0 };
                out.push(Primary::Float(pr));
            }
            Ok(out)
        }
        "NTILE" => {
            filter.bind_record(view.clone(), rows[0]);
            let k = expr::evaluate(&call.args[0], filter, ctx)?
                .as_i64()
                .ok_or_else(|| Error::function_invalid_argument("NTILE expects an integer bucket count"))?;
            if k <= 0 {
                return Err(Error::function_invalid_argument("NTILE bucket count must be positive"));
            }
            // Resolved Open Question 3 (DESIGN.md): the standard
            // largest-buckets-first distribution formula is applied
            // uniformly. When k exceeds the partition's row count, the
            // surplus buckets naturally receive zero rows; no special case
            // is needed.
            let k = k as usize;
            let base = n / k;
            let remainder = n % k;
            let mut out = Vec::with_capacity(n);
            let mut bucket = 1i64;
            let mut large_left = remainder;
            let mut remaining_in_bucket = base + if large_left > 0 { large_left -= 1; 1 } else { 0 };
            for i in 0..n {
                if remaining_in_bucket == 0 {
                    bucket += 1;
                    if large_left > 0 {
                        large_left -= 1;
                        remaining_in_bucket = base + 1;
                    } else {
                        remaining_in_bucket = base;
                    }
                }
                let _ = i;
                out.push(Primary::Integer(bucket));
                remaining_in_bucket -= 1;
            }
            Ok(out)
        }
        "FIRST_VALUE" | "LAST_VALUE" => {
            let values = rows
                .iter()
                .map(|&row| {
                    filter.bind_record(view.clone(), row);
                    expr::evaluate(&call.args[0], filter, ctx)
                })
                .collect::<Result<Vec<_>>>()?;
            let candidate = if name == "FIRST_VALUE" {
                pick_value(&values, call.ignore_nulls, false)
            } else {
                pick_value(&values, call.ignore_nulls, true)
            };
            Ok(vec![candidate; n])
        }
        "NTH_VALUE" => {
            let values = rows
                .iter()
                .map(|&row| {
                    filter.bind_record(view.clone(), row);
                    expr::evaluate(&call.args[0], filter, ctx)
                })
                .collect::<Result<Vec<_>>>()?;
            filter.bind_record(view.clone(), rows[0]);
            let nth = expr::evaluate(&call.args[1], filter, ctx)?
                .as_i64()
                .ok_or_else(|| Error::function_invalid_argument("NTH_VALUE expects an integer position"))?;
            let candidates: Vec<&Primary> = if call.ignore_nulls {
                values.iter().filter(|v| !v.is_null()).collect()
            } else {
                values.iter().collect()
            };
            let result = if nth >= 1 {
                candidates.get(nth as usize - 1).map(|v| (*v).clone()).unwrap_or(Primary::Null)
            } else {
                Primary::Null
            };
            Ok(vec![result; n])
        }
        "LAG" | "LEAD" => {
            let values = rows
                .iter()
                .map(|&row| {
                    filter.bind_record(view.clone(), row);
                    expr::evaluate(&call.args[0], filter, ctx)
                })
                .collect::<Result<Vec<_>>>()?;
            let offset = if call.args.len() > 1 {
                filter.bind_record(view.clone(), rows[0]);
                expr::evaluate(&call.args[1], filter, ctx)?.as_i64().unwrap_or(1)
            } else {
                1
            };
            let default = if call.args.len() > 2 {
                filter.bind_record(view.clone(), rows[0]);
                expr::evaluate(&call.args[2], filter, ctx)?
            } else {
                Primary::Null
            };
            let signed_offset = if name == "LAG" { -offset } else { offset };
            Ok(offset_lookup(&values, signed_offset, call.ignore_nulls, &default))
        }
        "LISTAGG" => {
            let values = rows
                .iter()
                .map(|&row| {
                    filter.bind_record(view.clone(), row);
                    expr::evaluate(&call.args[0], filter, ctx)
                })
                .collect::<Result<Vec<_>>>()?;
            let separator = if call.args.len() > 1 {
                filter.bind_record(view.clone(), rows[0]);
                expr::evaluate(&call.args[1], filter, ctx)?.as_str_lossy()
            } else {
                String::new()
            };
            let joined = values
                .iter()
                .filter(|v| !v.is_null())
                .map(Primary::as_str_lossy)
                .collect::<Vec<_>>()
                .join(&separator);
            Ok(vec![Primary::String(joined); n])
        }
        other => Err(Error::function_not_exist(format!("unknown analytic function {other}")).with_span(call.span)),
    }
}

fn pick_value(values: &[Primary], ignore_nulls: bool, from_end: bool) -> Primary {
    let iter: Box<dyn Iterator<Item = &Primary>> = if from_end {
        Box::new(values.iter().rev())
    } else {
        Box::new(values.iter())
    };
    if ignore_nulls {
        iter.filter(|v| !v.is_null()).next().cloned().unwrap_or(Primary::Null)
    } else {
        iter.take(1).next().cloned().unwrap_or(Primary::Null)
    }
}

fn offset_lookup(values: &[Primary], signed_offset: i64, ignore_nulls: bool, default: &Primary) -> Vec<Primary> {
    let n = values.len() as i64;
    if !ignore_nulls {
        return (0..n)
            .map(|i| {
                let target = i + signed_offset;
                if target >= 0 && target < n {
                    values[target as usize].clone()
                } else {
                    default.clone()
                }
            })
            .collect();
    }
    let non_null_positions: Vec<usize> = values
        .iter()
        .enumerate()
        .filter(|(_, v)| !v.is_null())
        .map(|(i, _)| i)
        .collect();
    (0..n as usize)
        .map(|i| {
            let rank = non_null_positions.binary_search(&i).unwrap_or_else(|e| e) as i64;
            let target_rank = rank + signed_offset;
            if target_rank >= 0 && (target_rank as usize) < non_null_positions.len() {
                values[non_null_positions[target_rank as usize]].clone()
            } else {
                default.clone()
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::{Expr, OrderByItem};
    use crate::catalog::Catalog;
    use crate::config::Config;
    use crate::expr::functions::NoScalarFunctions;
    use crate::file_info::FileInfo;
    use crate::record::{HeaderField as HF, Record};

    fn sample_view() -> Arc<View> {
        let header = vec![HF::new("t", "grp", 1), HF::new("t", "v", 2)];
        let records = vec![
            Record::from_values(vec![Primary::Integer(1), Primary::Integer(10)]),
            Record::from_values(vec![Primary::Integer(1), Primary::Integer(10)]),
            Record::from_values(vec![Primary::Integer(1), Primary::Integer(30)]),
            Record::from_values(vec![Primary::Integer(2), Primary::Integer(5)]),
        ];
        Arc::new(View::new(header, records, FileInfo::temporary("t")))
    }

    fn field(name: &str) -> Expr {
        Expr::Field { view: None, name: name.into(), span: crate::error::Span::UNKNOWN }
    }

    #[test]
    fn row_number_and_rank_handle_ties() {
        let view = sample_view();
        let filter = Filter::new_root();
        let catalog = Catalog::new();
        let config = Config::default();
        let funcs = NoScalarFunctions;
        let ctx = EvalContext { catalog: &catalog, config: &config, scalar_functions: &funcs };

        let over = OverClause {
            partition_by: vec![field("grp")],
            order_by: vec![OrderByItem { expr: field("v"), descending: false, nulls: None }],
            frame: None,
        };
        let call = FunctionCall {
            name: "RANK".into(),
            args: vec![],
            distinct: false,
            star_arg: false,
            ignore_nulls: false,
            over: Some(over.clone()),
            span: crate::error::Span::UNKNOWN,
        };
        let (_, values) = evaluate_window(&call, &view, &filter, &ctx).unwrap();
        // partition {1}: v = 10, 10, 30 -> ranks 1, 1, 3; partition {2}: rank 1
        assert_eq!(values[0], Primary::Integer(1));
        assert_eq!(values[1], Primary::Integer(1));
        assert_eq!(values[2], Primary::Integer(3));
        assert_eq!(values[3], Primary::Integer(1));

        let row_number_call = FunctionCall { name: "ROW_NUMBER".into(), over: Some(over), ..call };
        let (_, rn) = evaluate_window(&row_number_call, &view, &filter, &ctx).unwrap();
        assert_eq!(rn[0], Primary::Integer(1));
        assert_eq!(rn[1], Primary::Integer(2));
        assert_eq!(rn[2], Primary::Integer(3));
    }

    #[test]
    fn ntile_distributes_remainder_to_first_buckets() {
        let view = sample_view();
        let filter = Filter::new_root();
        let catalog = Catalog::new();
        let config = Config::default();
        let funcs = NoScalarFunctions;
        let ctx = EvalContext { catalog: &catalog, config: &config, scalar_functions: &funcs };
        let over = OverClause {
            partition_by: vec![],
            order_by: vec![OrderByItem { expr: field("v"), descending: false, nulls: None }],
            frame: None,
        };
        let call = FunctionCall {
            name: "NTILE".into(),
            args: vec![Expr::IntegerLiteral(3)],
            distinct: false,
            star_arg: false,
            ignore_nulls: false,
            over: Some(over),
            span: crate::error::Span::UNKNOWN,
        };
        let (_, values) = evaluate_window(&call, &view, &filter, &ctx).unwrap();
        // Row order by ascending `v` is [row3(5), row0(10), row1(10), row2(30)];
        // 4 rows into 3 buckets -> sizes 2,1,1, so row3 and row0 share bucket 1.
        assert_eq!(values, vec![Primary::Integer(1), Primary::Integer(2), Primary::Integer(3), Primary::Integer(1)]);
    }

    #[test]
    fn lag_ignore_nulls_skips_null_values() {
        let header = vec![HF::new("t", "v", 1)];
        let records = vec![
            Record::from_values(vec![Primary::Integer(1)]),
            Record::from_values(vec![Primary::Null]),
            Record::from_values(vec![Primary::Integer(3)]),
        ];
        let view = Arc::new(View::new(header, records, FileInfo::temporary("t")));
        let filter = Filter::new_root();
        let catalog = Catalog::new();
        let config = Config::default();
        let funcs = NoScalarFunctions;
        let ctx = EvalContext { catalog: &catalog, config: &config, scalar_functions: &funcs };
        let over = OverClause { partition_by: vec![], order_by: vec![], frame: None };
        let call = FunctionCall {
            name: "LAG".into(),
            args: vec![field("v")],
            distinct: false,
            star_arg: false,
            ignore_nulls: true,
            over: Some(over),
            span: crate::error::Span::UNKNOWN,
        };
        let (_, values) = evaluate_window(&call, &view, &filter, &ctx).unwrap();
        // Row 0 has no prior non-null value; rows 1 and 2 both see row 0's
        // value (1) as their nearest preceding non-null, since row 1 itself
        // is null and is skipped by IGNORE NULLS.
        assert_eq!(values[0], Primary::Null);
        assert_eq!(values[1], Primary::Integer(1));
        assert_eq!(values[2], Primary::Integer(1));
    }
}
