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

//! [`View`]: the in-memory table representation every statement executor
//! produces and consumes.

use crate::error::{Error, Result};
use crate::file_info::FileInfo;
use crate::record::{Cell, HeaderField, Record};
use crate::value::Primary;

/// An in-memory tabular result: header + records, whether backed by a file,
/// a temporary declaration, or a subquery (spec §3, GLOSSARY).
#[derive(Debug, Clone)]
pub struct View {
    pub header: Vec<HeaderField>,
    pub records: Vec<Record>,
    pub file_info: FileInfo,
    pub for_update: bool,
    pub operated_records: usize,
    pub operated_fields: usize,
    pub use_internal_id: bool,
}

impl View {
    pub fn new(header: Vec<HeaderField>, records: Vec<Record>, file_info: FileInfo) -> Self {
        Self {
            header,
            records,
            file_info,
            for_update: false,
            operated_records: 0,
            operated_fields: 0,
            use_internal_id: false,
        }
    }

    pub fn empty_temporary(name: impl Into<String>, columns: &[&str]) -> Self {
        let name = name.into();
        let header = columns
            .iter()
            .enumerate()
            .map(|(i, c)| HeaderField::new(name.clone(), *c, i + 1))
            .collect();
        Self::new(header, Vec::new(), FileInfo::temporary(name))
    }

    pub fn is_dirty(&self) -> bool {
        self.operated_records > 0 || self.operated_fields > 0
    }

    /// Validates the view's own invariant (spec §8 universal invariant 1):
    /// every record has `|header|` cells, and no two header fields share a
    /// case-insensitive column name.
    pub fn validate(&self) -> Result<()> {
        for (i, record) in self.records.iter().enumerate() {
            if record.arity() != self.header.len() {
                return Err(Error::internal(format!(
                    "record {i} has arity {} but header has {} fields",
                    record.arity(),
                    self.header.len()
                )));
            }
        }
        for i in 0..self.header.len() {
            for j in (i + 1)..self.header.len() {
                if self.header[i]
                    .column_name
                    .eq_ignore_ascii_case(&self.header[j].column_name)
                {
                    return Err(Error::field_name_duplicate(format!(
                        "duplicate column name {:?}",
                        self.header[i].column_name
                    )));
                }
            }
        }
        Ok(())
    }

    /// Resolves `name` to a column index, honoring case-insensitive
    /// matching and an optional `view.` qualifier; fails with
    /// `FieldAmbiguous` when multiple unqualified columns match.
    pub fn resolve_field(&self, view: Option<&str>, name: &str) -> Result<usize> {
        let candidates: Vec<usize> = self
            .header
            .iter()
            .enumerate()
            .filter(|(_, f)| {
                view.map(|v| f.view_name.eq_ignore_ascii_case(v)).unwrap_or(true)
                    && f.matches_name(name)
            })
            .map(|(i, _)| i)
            .collect();
        match candidates.len() {
            0 => Err(Error::field_not_exist(format!("field {name:?} does not exist"))),
            1 => Ok(candidates[0]),
            _ => Err(Error::field_ambiguous(format!("field {name:?} is ambiguous"))),
        }
    }

    /// Appends a new column computed for every row (used by window
    /// evaluation, §4.1 "write-back").
    pub fn append_column(&mut self, field: HeaderField, values: Vec<Primary>) -> Result<()> {
        if values.len() != self.records.len() {
            return Err(Error::internal("column length does not match record count"));
        }
        self.header.push(field);
        for (record, value) in self.records.iter_mut().zip(values) {
            record.cells.push(Cell::single(value));
        }
        Ok(())
    }

    pub fn column_values(&self, column: usize) -> Vec<Primary> {
        self.records
            .iter()
            .map(|r| r.get(column).map(|c| c.value().clone()).unwrap_or(Primary::Null))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::file_info::FileInfo;

    fn sample_view() -> View {
        let header = vec![
            HeaderField::new("t", "a", 1),
            HeaderField::new("t", "b", 2),
        ];
        let records = vec![
            Record::from_values(vec![Primary::Integer(1), Primary::Integer(2)]),
            Record::from_values(vec![Primary::Integer(3), Primary::Integer(4)]),
        ];
        View::new(header, records, FileInfo::temporary("t"))
    }

    #[test]
    fn validate_accepts_consistent_view() {
        assert!(sample_view().validate().is_ok());
    }

    #[test]
    fn validate_rejects_duplicate_header_names() {
        let mut v = sample_view();
        v.header[1] = HeaderField::new("t", "a", 2);
        assert!(v.validate().is_err());
    }

    #[test]
    fn resolve_field_detects_ambiguity_across_views() {
        let mut v = sample_view();
        v.header.push(HeaderField::new("u", "a", 3));
        v.records[0].cells.push(Cell::single(Primary::Integer(9)));
        v.records[1].cells.push(Cell::single(Primary::Integer(9)));
        let err = v.resolve_field(None, "a").unwrap_err();
        assert_eq!(err.kind, crate::error::ErrorKind::FieldAmbiguous);
        assert_eq!(v.resolve_field(Some("u"), "a").unwrap(), 2);
    }

    #[test]
    fn append_column_extends_every_record() {
        let mut v = sample_view();
        v.append_column(
            HeaderField::new("t", "rn", 3),
            vec![Primary::Integer(1), Primary::Integer(2)],
        )
        .unwrap();
        assert_eq!(v.records[0].arity(), 3);
        assert_eq!(v.records[1].get(2).unwrap().value(), &Primary::Integer(2));
    }
}
