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

//! The error taxonomy this engine returns. Every variant carries the source
//! position of the AST node that triggered it.

use std::fmt;

/// A 1-based line:column position in the original statement text, or
/// [`Span::UNKNOWN`] when the AST node producing an error has none.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Span {
    pub line: Option<u32>,
    pub column: Option<u32>,
}

impl Span {
    pub const UNKNOWN: Span = Span {
        line: None,
        column: None,
    };

    pub fn new(line: u32, column: u32) -> Self {
        Self {
            line: Some(line),
            column: Some(column),
        }
    }
}

impl fmt::Display for Span {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let line = self.line.map(|l| l.to_string()).unwrap_or_else(|| "-".into());
        let column = self
            .column
            .map(|c| c.to_string())
            .unwrap_or_else(|| "-".into());
        write!(f, "[L:{line} C:{column}]")
    }
}

/// The engine's error taxonomy (spec §7). Each kind is a distinct failure
/// mode callers may want to match on; the message carries the detail.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ErrorKind {
    FunctionNotExist,
    FunctionArgumentLength,
    FunctionInvalidArgument,
    FieldNotExist,
    FieldAmbiguous,
    FieldNameDuplicate,
    TableNotLoaded,
    FileAlreadyExists,
    FileDoesNotExist,
    ViewRedeclared,
    CursorUndeclared,
    CursorFetchLengthMismatch,
    FetchPositionNotInteger,
    VariableUndeclared,
    RecordAmbiguous,
    SubqueryTooManyRows,
    SubqueryTooManyFields,
    SetClauseFieldCount,
    RecursionFieldCount,
    TablesToDeleteNotSpecified,
    FieldNotInUpdateTables,
    TypeConversion,
    IoError,
    Internal,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
#[error("{span} {kind}: {message}")]
pub struct Error {
    pub kind: ErrorKind,
    pub message: String,
    pub span: Span,
}

impl Error {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            span: Span::UNKNOWN,
        }
    }

    pub fn at(kind: ErrorKind, message: impl Into<String>, span: Span) -> Self {
        Self {
            kind,
            message: message.into(),
            span,
        }
    }

    pub fn with_span(mut self, span: Span) -> Self {
        self.span = span;
        self
    }
}

macro_rules! error_ctor {
    ($method:ident, $kind:ident) => {
        impl Error {
            pub fn $method(message: impl Into<String>) -> Self {
                Self::new(ErrorKind::$kind, message)
            }
        }
    };
}

error_ctor!(function_not_exist, FunctionNotExist);
error_ctor!(function_argument_length, FunctionArgumentLength);
error_ctor!(function_invalid_argument, FunctionInvalidArgument);
error_ctor!(field_not_exist, FieldNotExist);
error_ctor!(field_ambiguous, FieldAmbiguous);
error_ctor!(field_name_duplicate, FieldNameDuplicate);
error_ctor!(table_not_loaded, TableNotLoaded);
error_ctor!(file_already_exists, FileAlreadyExists);
error_ctor!(file_does_not_exist, FileDoesNotExist);
error_ctor!(view_redeclared, ViewRedeclared);
error_ctor!(cursor_undeclared, CursorUndeclared);
error_ctor!(cursor_fetch_length_mismatch, CursorFetchLengthMismatch);
error_ctor!(fetch_position_not_integer, FetchPositionNotInteger);
error_ctor!(variable_undeclared, VariableUndeclared);
error_ctor!(record_ambiguous, RecordAmbiguous);
error_ctor!(subquery_too_many_rows, SubqueryTooManyRows);
error_ctor!(subquery_too_many_fields, SubqueryTooManyFields);
error_ctor!(set_clause_field_count, SetClauseFieldCount);
error_ctor!(recursion_field_count, RecursionFieldCount);
error_ctor!(tables_to_delete_not_specified, TablesToDeleteNotSpecified);
error_ctor!(field_not_in_update_tables, FieldNotInUpdateTables);
error_ctor!(type_conversion, TypeConversion);
error_ctor!(internal, Internal);

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        Error::new(ErrorKind::IoError, e.to_string())
    }
}

impl From<csv::Error> for Error {
    fn from(e: csv::Error) -> Self {
        Error::new(ErrorKind::IoError, e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, Error>;

/// A slot parallel workers race to fill; the first error recorded wins and
/// every later write is dropped (spec §4.1, §5: "first captured error wins").
#[derive(Default)]
pub struct FirstErrorSlot(parking_lot::Mutex<Option<Error>>);

impl FirstErrorSlot {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records `err` unless an error was already recorded.
    pub fn record(&self, err: Error) {
        let mut guard = self.0.lock();
        if guard.is_none() {
            *guard = Some(err);
        }
    }

    pub fn is_set(&self) -> bool {
        self.0.lock().is_some()
    }

    pub fn into_result(self) -> Result<()> {
        match self.0.into_inner() {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn span_display_unknown() {
        assert_eq!(Span::UNKNOWN.to_string(), "[L:- C:-]");
    }

    #[test]
    fn span_display_known() {
        assert_eq!(Span::new(3, 7).to_string(), "[L:3 C:7]");
    }

    #[test]
    fn first_error_slot_keeps_first() {
        let slot = FirstErrorSlot::new();
        slot.record(Error::function_not_exist("FOO"));
        slot.record(Error::internal("should not replace"));
        let err = slot.into_result().unwrap_err();
        assert_eq!(err.kind, ErrorKind::FunctionNotExist);
    }
}
