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

//! The ambient file adapter behind [`View`]/[`FileInfo`] (spec §4.6).
//!
//! SQL-level CSV parsing semantics are an external collaborator (spec §1);
//! this module only performs the mechanical read/write of a view's backing
//! delimited file, using the `csv` crate the same way teacher's
//! `datafusion/core` CSV table provider does, plus `encoding_rs` for the
//! declared UTF-8/SJIS switch (spec §6).

use crate::config::Config;
use crate::error::{Error, Result};
use crate::file_info::{Encoding, FileInfo};
use crate::record::{HeaderField, Record};
use crate::value::Primary;
use crate::view::View;
use std::fs::File;
use std::io::{Read, Write};

fn decode(bytes: &[u8], encoding: Encoding) -> String {
    match encoding {
        Encoding::Utf8 => String::from_utf8_lossy(bytes).into_owned(),
        Encoding::Sjis => {
            let (text, _, _) = encoding_rs::SHIFT_JIS.decode(bytes);
            text.into_owned()
        }
    }
}

fn encode(text: &str, encoding: Encoding) -> Vec<u8> {
    match encoding {
        Encoding::Utf8 => text.as_bytes().to_vec(),
        Encoding::Sjis => {
            let (bytes, _, _) = encoding_rs::SHIFT_JIS.encode(text);
            bytes.into_owned()
        }
    }
}

/// Loads a view from its backing file (spec §4.2 `get(path) -> View`).
pub fn load_view(file_info: &FileInfo, _config: &Config) -> Result<View> {
    if file_info.is_temporary {
        return Err(Error::table_not_loaded(format!(
            "temporary view {:?} was never declared",
            file_info.path
        )));
    }
    if !file_info.exists() {
        return Err(Error::file_does_not_exist(format!(
            "{}",
            file_info.path.display()
        )));
    }

    let mut raw = Vec::new();
    File::open(&file_info.path)?.read_to_end(&mut raw)?;
    let text = decode(&raw, file_info.encoding);

    let mut reader = csv::ReaderBuilder::new()
        .delimiter(file_info.delimiter)
        .has_headers(!file_info.no_header)
        .from_reader(text.as_bytes());

    let view_name = file_info
        .path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();

    let header: Vec<HeaderField> = if file_info.no_header {
        // Column count is only known once we've seen the first record, so
        // headers are synthesized lazily below for the no-header case.
        Vec::new()
    } else {
        reader
            .headers()?
            .iter()
            .enumerate()
            .map(|(i, name)| HeaderField::new(view_name.clone(), name, i + 1))
            .collect()
    };

    let mut header = header;
    let mut records = Vec::new();
    for result in reader.records() {
        let string_record = result?;
        if header.is_empty() && file_info.no_header {
            header = (0..string_record.len())
                .map(|i| HeaderField::new(view_name.clone(), format!("c{}", i + 1), i + 1))
                .collect();
        }
        let values: Vec<Primary> = string_record.iter().map(Primary::parse_string).collect();
        records.push(Record::from_values(values));
    }

    let view = View::new(header, records, file_info.clone());
    view.validate()?;
    Ok(view)
}

/// Truncates and rewrites a view's backing file with its current header and
/// records (spec §4.2 COMMIT: "truncate and rewrite the file").
pub fn write_view(view: &View) -> Result<()> {
    let mut buffer: Vec<u8> = Vec::new();
    {
        let mut writer = csv::WriterBuilder::new()
            .delimiter(view.file_info.delimiter)
            .has_headers(false)
            .terminator(csv::Terminator::Any(b'\n'))
            .from_writer(&mut buffer);
        if !view.file_info.no_header {
            writer.write_record(view.header.iter().map(|f| f.column_name.as_str()))?;
        }
        for record in &view.records {
            let fields: Vec<String> = record.cells.iter().map(|c| c.value().as_str_lossy()).collect();
            writer.write_record(&fields)?;
        }
        writer.flush()?;
    }

    let text = String::from_utf8(buffer).map_err(|e| Error::internal(e.to_string()))?;
    let text = apply_line_break(&text, view.file_info.line_break);
    let bytes = encode(&text, view.file_info.encoding);

    let mut file = File::create(&view.file_info.path)?;
    file.write_all(&bytes)?;
    file.flush()?;
    Ok(())
}

fn apply_line_break(text: &str, line_break: crate::file_info::LineBreak) -> String {
    use crate::file_info::LineBreak::*;
    match line_break {
        Lf => text.to_string(),
        Cr => text.replace('\n', "\r"),
        CrLf => text.replace('\n', "\r\n"),
    }
}

/// Creates a brand-new backing file for `CREATE TABLE` (spec §4.4, §4.2
/// COMMIT "create the file, write header + current records").
pub fn create_file(view: &View) -> Result<()> {
    if view.file_info.exists() {
        return Err(Error::file_already_exists(format!(
            "{}",
            view.file_info.path.display()
        )));
    }
    write_view(view)
}

pub fn delete_file(file_info: &FileInfo) -> Result<()> {
    if file_info.exists() {
        std::fs::remove_file(&file_info.path)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_header_and_records() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("t.csv");
        let header = vec![HeaderField::new("t", "a", 1), HeaderField::new("t", "b", 2)];
        let records = vec![Record::from_values(vec![
            Primary::Integer(1),
            Primary::Integer(2),
        ])];
        let view = View::new(header, records, FileInfo::file(&path, b','));
        create_file(&view).unwrap();

        let loaded = load_view(&FileInfo::file(&path, b','), &Config::default()).unwrap();
        assert_eq!(loaded.header.len(), 2);
        assert_eq!(loaded.records.len(), 1);
        assert_eq!(loaded.records[0].get(0).unwrap().value(), &Primary::Integer(1));
    }

    #[test]
    fn create_file_fails_if_exists() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("t.csv");
        let view = View::new(
            vec![HeaderField::new("t", "a", 1)],
            vec![],
            FileInfo::file(&path, b','),
        );
        create_file(&view).unwrap();
        let err = create_file(&view).unwrap_err();
        assert_eq!(err.kind, crate::error::ErrorKind::FileAlreadyExists);
    }
}
