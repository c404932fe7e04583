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

//! Function classification and per-partition evaluation (spec §4.1
//! "classify" and the individual function contracts), the same shape as
//! teacher's `BuiltInWindowFunction` dispatch in
//! `datafusion/expr/src/window_function.rs` plus its `first_last.rs`
//! FIRST_VALUE/LAST_VALUE accumulators, generalized to row-at-a-time
//! `Primary` values instead of Arrow arrays.

use crate::ast::FunctionCall;
use crate::error::{Error, Result};
use crate::scope::{Filter, UserFunctionDef};
use crate::value::Primary;

const ANALYTIC_NAMES: &[&str] = &[
    "ROW_NUMBER",
    "RANK",
    "DENSE_RANK",
    "CUME_DIST",
    "PERCENT_RANK",
    "NTILE",
    "FIRST_VALUE",
    "LAST_VALUE",
    "NTH_VALUE",
    "LAG",
    "LEAD",
    "LISTAGG",
];

const AGGREGATE_NAMES: &[&str] = &["COUNT", "SUM", "AVG", "MIN", "MAX", "STDEV"];

#[derive(Debug, Clone)]
pub enum FunctionKind {
    Analytic,
    Aggregate,
    UserDefined(UserFunctionDef),
    Scalar,
}

/// Classifies a call by name (spec §4.1 "classify"): ANALYTIC and AGGREGATE
/// names are reserved; anything else falls back to a user-defined function
/// looked up in scope, or plain scalar dispatch.
pub fn classify(name: &str, filter: &Filter) -> FunctionKind {
    let upper = name.to_ascii_uppercase();
    if ANALYTIC_NAMES.contains(&upper.as_str()) {
        return FunctionKind::Analytic;
    }
    if AGGREGATE_NAMES.contains(&upper.as_str()) {
        return FunctionKind::Aggregate;
    }
    if let Some(def) = filter.lookup_user_function(&upper) {
        if def.is_aggregate {
            return FunctionKind::UserDefined(def);
        }
    }
    FunctionKind::Scalar
}

/// Arity/shape checks independent of argument values (spec §4.1
/// "arity-check"); run once per call before the parallel phases start so a
/// malformed call fails fast rather than mid-partition.
pub fn arity_check(name: &str, call: &FunctionCall) -> Result<()> {
    let upper = name.to_ascii_uppercase();
    let n = call.args.len();
    let ok = match upper.as_str() {
        "ROW_NUMBER" | "RANK" | "DENSE_RANK" | "CUME_DIST" | "PERCENT_RANK" => n == 0,
        "NTILE" => n == 1,
        "FIRST_VALUE" | "LAST_VALUE" => n == 1,
        "NTH_VALUE" => n == 2,
        "LAG" | "LEAD" => (1..=3).contains(&n),
        "LISTAGG" => (1..=2).contains(&n),
        "COUNT" => n == 0 || n == 1 || call.star_arg,
        "SUM" | "AVG" | "MIN" | "MAX" | "STDEV" => n == 1 || call.star_arg,
        _ => true,
    };
    if ok {
        Ok(())
    } else {
        Err(Error::function_argument_length(format!(
            "{name} called with {n} argument(s)"
        ))
        .with_span(call.span))
    }
}

/// Applies an AGGREGATE function to a value list materialized by the engine
/// (spec §4.1 AGGREGATE: "materialize the argument values ... apply the
/// aggregate to the value list"). `NULL`s are skipped, matching standard SQL
/// aggregate semantics.
pub fn apply_aggregate(name: &str, values: &[Primary]) -> Result<Primary> {
    let non_null: Vec<&Primary> = values.iter().filter(|v| !v.is_null()).collect();
    Ok(match name.to_ascii_uppercase().as_str() {
        "COUNT" => Primary::Integer(non_null.len() as i64),
        "SUM" => {
            if non_null.is_empty() {
                Primary::Null
            } else {
                numeric_fold(&non_null, 0.0, |a, b| a + b)
            }
        }
        "AVG" => {
            if non_null.is_empty() {
                Primary::Null
            } else {
                let sum = non_null.iter().filter_map(|v| v.as_f64()).sum::<f64>();
                Primary::Float(sum / non_null.len() as f64)
            }
        }
        "MIN" => non_null
            .into_iter()
            .min_by(|a, b| a.sql_cmp(b).unwrap_or(std::cmp::Ordering::Equal))
            .cloned()
            .unwrap_or(Primary::Null),
        "MAX" => non_null
            .into_iter()
            .max_by(|a, b| a.sql_cmp(b).unwrap_or(std::cmp::Ordering::Equal))
            .cloned()
            .unwrap_or(Primary::Null),
        "STDEV" => {
            if non_null.len() < 2 {
                Primary::Null
            } else {
                let xs: Vec<f64> = non_null.iter().filter_map(|v| v.as_f64()).collect();
                let mean = xs.iter().sum::<f64>() / xs.len() as f64;
                let variance = xs.iter().map(|x| (x - mean).powi(2)).sum::<f64>() / (xs.len() - 1) as f64;
                Primary::Float(variance.sqrt())
            }
        }
        other => return Err(Error::function_not_exist(format!("unknown aggregate {other}"))),
    })
}

fn numeric_fold(values: &[&Primary], init: f64, op: impl Fn(f64, f64) -> f64) -> Primary {
    let all_integer = values.iter().all(|v| matches!(v, Primary::Integer(_)));
    if all_integer {
        let sum = values.iter().filter_map(|v| v.as_i64()).fold(init as i64, |a, b| a + b);
        Primary::Integer(sum)
    } else {
        let sum = values.iter().filter_map(|v| v.as_f64()).fold(init, op);
        Primary::Float(sum)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classify_recognizes_analytic_and_aggregate_names() {
        let filter = Filter::new_root();
        assert!(matches!(classify("row_number", &filter), FunctionKind::Analytic));
        assert!(matches!(classify("sum", &filter), FunctionKind::Aggregate));
        assert!(matches!(classify("upper", &filter), FunctionKind::Scalar));
    }

    #[test]
    fn apply_aggregate_sum_skips_nulls() {
        let values = vec![Primary::Integer(1), Primary::Null, Primary::Integer(2)];
        assert_eq!(apply_aggregate("SUM", &values).unwrap(), Primary::Integer(3));
    }

    #[test]
    fn apply_aggregate_count_counts_non_null() {
        let values = vec![Primary::Integer(1), Primary::Null];
        assert_eq!(apply_aggregate("COUNT", &values).unwrap(), Primary::Integer(1));
    }

    #[test]
    fn arity_check_rejects_row_number_with_args() {
        let call = FunctionCall {
            name: "ROW_NUMBER".into(),
            args: vec![crate::ast::Expr::IntegerLiteral(1)],
            distinct: false,
            star_arg: false,
            ignore_nulls: false,
            over: None,
            span: crate::error::Span::UNKNOWN,
        };
        assert!(arity_check("ROW_NUMBER", &call).is_err());
    }
}
