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

//! Row-oriented building blocks: [`HeaderField`], [`Cell`] and [`Record`].

use crate::value::Primary;

/// Describes one column of a [`crate::view::View`].
///
/// Column numbers are 1-based and unique within a view (spec §3).
#[derive(Debug, Clone)]
pub struct HeaderField {
    pub view_name: String,
    pub column_name: String,
    pub aliases: Vec<String>,
    pub column_number: usize,
    pub is_from_table: bool,
    pub is_join_key: bool,
    pub is_group_key: bool,
}

impl HeaderField {
    pub fn new(view_name: impl Into<String>, column_name: impl Into<String>, column_number: usize) -> Self {
        Self {
            view_name: view_name.into(),
            column_name: column_name.into(),
            aliases: Vec::new(),
            column_number,
            is_from_table: true,
            is_join_key: false,
            is_group_key: false,
        }
    }

    /// Whether `name` refers to this field, case-insensitively, either as
    /// the column name or one of its aliases.
    pub fn matches_name(&self, name: &str) -> bool {
        self.column_name.eq_ignore_ascii_case(name)
            || self.aliases.iter().any(|a| a.eq_ignore_ascii_case(name))
    }

    pub fn qualified_name(&self) -> String {
        if self.view_name.is_empty() {
            self.column_name.clone()
        } else {
            format!("{}.{}", self.view_name, self.column_name)
        }
    }
}

/// One cell of a record.
///
/// Holds exactly one [`Primary`] for a base record; holds more than one when
/// the cell represents a grouped aggregation column produced by GROUP BY
/// (spec §3, §4.4).
#[derive(Debug, Clone)]
pub struct Cell {
    values: Vec<Primary>,
}

const NULL: Primary = Primary::Null;

impl Cell {
    pub fn single(value: Primary) -> Self {
        Self {
            values: vec![value],
        }
    }

    /// `values` may be empty: an aggregate over an empty group (e.g.
    /// `COUNT(*)` on a table with no rows) still produces one output row.
    pub fn grouped(values: Vec<Primary>) -> Self {
        Self { values }
    }

    /// The value to use where exactly one is expected (ordinary field
    /// access); for a grouped cell this is the first member, matching the
    /// convention that GROUP BY's non-aggregated columns carry one
    /// representative value per group.
    pub fn value(&self) -> &Primary {
        self.values.first().unwrap_or(&NULL)
    }

    pub fn into_value(mut self) -> Primary {
        if self.values.is_empty() {
            Primary::Null
        } else {
            self.values.swap_remove(0)
        }
    }

    /// All values backing a grouped cell, for aggregate functions to
    /// consume (spec §4.1 AGGREGATE "materialize the argument values").
    pub fn grouped_values(&self) -> &[Primary] {
        &self.values
    }

    pub fn is_grouped(&self) -> bool {
        self.values.len() > 1
    }
}

impl From<Primary> for Cell {
    fn from(value: Primary) -> Self {
        Cell::single(value)
    }
}

/// An ordered sequence of [`Cell`]s; one row of a [`crate::view::View`].
#[derive(Debug, Clone, Default)]
pub struct Record {
    pub cells: Vec<Cell>,
}

impl Record {
    pub fn new(cells: Vec<Cell>) -> Self {
        Self { cells }
    }

    pub fn from_values(values: Vec<Primary>) -> Self {
        Self {
            cells: values.into_iter().map(Cell::single).collect(),
        }
    }

    pub fn arity(&self) -> usize {
        self.cells.len()
    }

    pub fn get(&self, column: usize) -> Option<&Cell> {
        self.cells.get(column)
    }

    /// Extends this record with `Primary::Null` cells up to `len`, used by
    /// INSERT when the provided values list is shorter than the header
    /// (spec §4.4 INSERT, invariant 5).
    pub fn extend_with_nulls(&mut self, len: usize) {
        while self.cells.len() < len {
            self.cells.push(Cell::single(Primary::Null));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_field_matches_alias_case_insensitively() {
        let mut f = HeaderField::new("t", "c1", 1);
        f.aliases.push("Total".to_string());
        assert!(f.matches_name("total"));
        assert!(f.matches_name("C1"));
        assert!(!f.matches_name("c2"));
    }

    #[test]
    fn grouped_cell_exposes_all_values() {
        let cell = Cell::grouped(vec![Primary::Integer(1), Primary::Integer(2)]);
        assert!(cell.is_grouped());
        assert_eq!(cell.grouped_values().len(), 2);
        assert_eq!(*cell.value(), Primary::Integer(1));
    }

    #[test]
    fn record_extend_with_nulls_pads_missing_fields() {
        let mut r = Record::from_values(vec![Primary::Integer(1)]);
        r.extend_with_nulls(3);
        assert_eq!(r.arity(), 3);
        assert!(r.get(1).unwrap().value().is_null());
        assert!(r.get(2).unwrap().value().is_null());
    }
}
