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

//! Named forward/backward cursors over a materialized SELECT result
//! (spec §4.5).
//!
//! Resolved Open Question 1 (spec §9): `FETCH ABSOLUTE n` is 1-based, i.e.
//! `ABSOLUTE 1` addresses the first record. See DESIGN.md.

use crate::ast::{DeclareCursorStatement, FetchPosition};
use crate::error::{Error, Result};
use crate::value::{Primary, Ternary};
use crate::view::View;

#[derive(Debug)]
pub struct Cursor {
    pub query: DeclareCursorStatement,
    pub view: Option<View>,
    /// Zero-based; `-1` means "before first" (spec §3 "Position is
    /// zero-based").
    pub position: i64,
    pub is_open: bool,
}

impl Cursor {
    pub fn new(decl: DeclareCursorStatement) -> Self {
        Self {
            query: decl,
            view: None,
            position: -1,
            is_open: false,
        }
    }

    pub fn open(&mut self, view: View) {
        self.view = Some(view);
        self.position = -1;
        self.is_open = true;
    }

    pub fn close(&mut self) {
        self.view = None;
        self.position = -1;
        self.is_open = false;
    }

    fn len(&self) -> i64 {
        self.view.as_ref().map(|v| v.records.len() as i64).unwrap_or(0)
    }

    /// Advances position per `FetchPosition` (spec §4.5 FETCH); returns
    /// `true` when the new position is in range.
    fn advance(&mut self, position: FetchPosition) -> Result<bool> {
        if !self.is_open {
            return Err(Error::cursor_undeclared("cursor is not open"));
        }
        let len = self.len();
        let new_pos = match position {
            FetchPosition::Next => self.position + 1,
            FetchPosition::Prior => self.position - 1,
            FetchPosition::First => 0,
            FetchPosition::Last => len - 1,
            // ABSOLUTE 1 addresses the first record (1-based; resolved
            // Open Question 1).
            FetchPosition::Absolute(n) => n - 1,
            FetchPosition::Relative(n) => self.position + n,
        };
        self.position = new_pos;
        Ok(new_pos >= 0 && new_pos < len)
    }

    /// FETCH: advances, then reports whether the new position is in range.
    /// Callers assign the addressed row's fields to target variables
    /// themselves (engine-level, since that requires the enclosing
    /// [`crate::scope::Filter`]).
    pub fn fetch(&mut self, position: FetchPosition) -> Result<bool> {
        self.advance(position)
    }

    pub fn current_row(&self) -> Option<&crate::record::Record> {
        if !self.is_open || self.position < 0 {
            return None;
        }
        self.view
            .as_ref()
            .and_then(|v| v.records.get(self.position as usize))
    }

    pub fn is_in_range(&self) -> Ternary {
        if !self.is_open {
            return Ternary::Unknown;
        }
        Ternary::from_bool(self.position >= 0 && self.position < self.len())
    }

    pub fn is_open_ternary(&self) -> Ternary {
        Ternary::from_bool(self.is_open)
    }

    pub fn count(&self) -> Result<i64> {
        if !self.is_open {
            return Err(Error::cursor_undeclared("CURSOR COUNT on a closed cursor"));
        }
        Ok(self.len())
    }
}

/// Values produced by FETCH for assignment to the caller's target
/// variables, one per targeted column (spec §4.5: "arity mismatch ->
/// CursorFetchLengthMismatch").
pub fn fetch_row_values(row: &crate::record::Record, target_count: usize) -> Result<Vec<Primary>> {
    if row.arity() != target_count {
        return Err(Error::cursor_fetch_length_mismatch(format!(
            "cursor row has {} fields but {} targets were given",
            row.arity(),
            target_count
        )));
    }
    Ok(row.cells.iter().map(|c| c.value().clone()).collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::Select;
    use crate::record::{HeaderField, Record};

    fn sample_cursor() -> Cursor {
        let decl = DeclareCursorStatement {
            name: "c".into(),
            query: Select::default(),
        };
        let mut cursor = Cursor::new(decl);
        let header = vec![HeaderField::new("t", "a", 1)];
        let records = vec![
            Record::from_values(vec![Primary::Integer(1)]),
            Record::from_values(vec![Primary::Integer(2)]),
            Record::from_values(vec![Primary::Integer(3)]),
        ];
        cursor.open(View::new(header, records, crate::file_info::FileInfo::temporary("t")));
        cursor
    }

    #[test]
    fn absolute_one_addresses_first_record() {
        let mut cursor = sample_cursor();
        assert!(cursor.fetch(FetchPosition::Absolute(1)).unwrap());
        assert_eq!(cursor.current_row().unwrap().get(0).unwrap().value(), &Primary::Integer(1));
        assert!(cursor.fetch(FetchPosition::Next).unwrap());
        assert_eq!(cursor.current_row().unwrap().get(0).unwrap().value(), &Primary::Integer(2));
    }

    #[test]
    fn fetch_past_end_is_out_of_range() {
        let mut cursor = sample_cursor();
        assert!(!cursor.fetch(FetchPosition::Absolute(10)).unwrap());
        assert!(cursor.current_row().is_none());
    }

    #[test]
    fn count_fails_when_closed() {
        let decl = DeclareCursorStatement {
            name: "c".into(),
            query: Select::default(),
        };
        let cursor = Cursor::new(decl);
        assert!(cursor.count().is_err());
    }

    #[test]
    fn fetch_length_mismatch_is_reported() {
        let cursor = sample_cursor();
        let row = cursor.current_row();
        assert!(row.is_none()); // before first
        let record = Record::from_values(vec![Primary::Integer(1), Primary::Integer(2)]);
        let err = fetch_row_values(&record, 1).unwrap_err();
        assert_eq!(err.kind, crate::error::ErrorKind::CursorFetchLengthMismatch);
    }
}
