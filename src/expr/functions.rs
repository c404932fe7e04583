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

//! Scalar-function dispatch (spec §1: "Built-in scalar functions' internal
//! math ... the engine only invokes a typed dispatch table").
//!
//! The STRING/DATETIME/NUMERIC function families themselves are an external
//! collaborator; this module only declares the table the evaluator calls
//! through, the same shape as teacher's `ScalarFunctionExpr::fun` dispatch
//! in `datafusion/physical-expr/src/scalar_function.rs`, minus the
//! Arrow-kernel machinery that table delegates to.

use crate::error::{Error, Result};
use crate::value::Primary;

/// A typed dispatch table from uppercased scalar-function name to
/// implementation. Callers provide their own (the real STRING/DATETIME/
/// NUMERIC families); [`NoScalarFunctions`] is the empty default and
/// [`BasicScalarFunctions`] is a minimal illustrative set used in this
/// crate's own tests.
pub trait ScalarFunctions: Send + Sync {
    fn call(&self, name: &str, args: &[Primary]) -> Result<Primary>;
}

/// The default when no scalar-function family has been wired in: every call
/// fails with `FunctionNotExist`, exactly as calling an unregistered
/// function should.
#[derive(Debug, Default)]
pub struct NoScalarFunctions;

impl ScalarFunctions for NoScalarFunctions {
    fn call(&self, name: &str, _args: &[Primary]) -> Result<Primary> {
        Err(Error::function_not_exist(format!("scalar function {name} is not registered")))
    }
}

/// A minimal illustrative dispatch table (COALESCE, UPPER, LOWER, LENGTH,
/// CONCAT) sufficient to exercise CASE/CAST/function-call evaluation paths
/// without claiming to implement the full STRING/DATETIME/NUMERIC families
/// the spec excludes.
#[derive(Debug, Default)]
pub struct BasicScalarFunctions;

impl ScalarFunctions for BasicScalarFunctions {
    fn call(&self, name: &str, args: &[Primary]) -> Result<Primary> {
        match name.to_ascii_uppercase().as_str() {
            "COALESCE" => Ok(args
                .iter()
                .find(|v| !v.is_null())
                .cloned()
                .unwrap_or(Primary::Null)),
            "UPPER" => Ok(Primary::String(string_arg(args, name)?.to_uppercase())),
            "LOWER" => Ok(Primary::String(string_arg(args, name)?.to_lowercase())),
            "LENGTH" => Ok(Primary::Integer(string_arg(args, name)?.chars().count() as i64)),
            "CONCAT" => Ok(Primary::String(
                args.iter().map(Primary::as_str_lossy).collect::<Vec<_>>().concat(),
            )),
            _ => Err(Error::function_not_exist(format!("scalar function {name} is not registered"))),
        }
    }
}

fn string_arg<'a>(args: &'a [Primary], name: &str) -> Result<&'a str> {
    match args.first() {
        Some(Primary::String(s)) => Ok(s.as_str()),
        _ => Err(Error::function_invalid_argument(format!(
            "{name} expects a single string argument"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn coalesce_returns_first_non_null() {
        let f = BasicScalarFunctions;
        let result = f.call("COALESCE", &[Primary::Null, Primary::Integer(4)]).unwrap();
        assert_eq!(result, Primary::Integer(4));
    }

    #[test]
    fn unregistered_function_is_rejected() {
        let f = NoScalarFunctions;
        let err = f.call("SOMETHING", &[]).unwrap_err();
        assert_eq!(err.kind, crate::error::ErrorKind::FunctionNotExist);
    }
}
