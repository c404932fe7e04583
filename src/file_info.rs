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

//! [`FileInfo`]: identity and on-disk format metadata for a loaded view.

use std::fs::File;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LineBreak {
    Lf,
    Cr,
    CrLf,
}

impl LineBreak {
    pub fn as_bytes(self) -> &'static [u8] {
        match self {
            LineBreak::Lf => b"\n",
            LineBreak::Cr => b"\r",
            LineBreak::CrLf => b"\r\n",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Encoding {
    Utf8,
    Sjis,
}

/// File-format and identity metadata for a [`crate::view::View`] (spec §3).
#[derive(Debug, Clone)]
pub struct FileInfo {
    pub path: PathBuf,
    pub delimiter: u8,
    pub encoding: Encoding,
    pub line_break: LineBreak,
    pub no_header: bool,
    pub is_temporary: bool,
}

impl FileInfo {
    pub fn temporary(name: impl Into<String>) -> Self {
        Self {
            path: PathBuf::from(name.into()),
            delimiter: b',',
            encoding: Encoding::Utf8,
            line_break: LineBreak::Lf,
            no_header: false,
            is_temporary: true,
        }
    }

    pub fn file(path: impl Into<PathBuf>, delimiter: u8) -> Self {
        Self {
            path: path.into(),
            delimiter,
            encoding: Encoding::Utf8,
            line_break: LineBreak::Lf,
            no_header: false,
            is_temporary: false,
        }
    }

    /// The cache identity key: the uppercased absolute path, or the declared
    /// name for temporary views (spec §3 FileInfo: "Identity key is the
    /// uppercased absolute path").
    pub fn identity_key(&self) -> String {
        if self.is_temporary {
            self.path.to_string_lossy().to_ascii_uppercase()
        } else {
            let absolute = std::fs::canonicalize(&self.path).unwrap_or_else(|_| self.path.clone());
            absolute.to_string_lossy().to_ascii_uppercase()
        }
    }

    pub fn exists(&self) -> bool {
        !self.is_temporary && Path::new(&self.path).exists()
    }

    /// Opens the underlying file for advisory locking (spec §4.2: "The lock
    /// is held until commit, rollback, or release").
    pub fn open_for_lock(&self) -> std::io::Result<File> {
        File::options().read(true).write(true).open(&self.path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn temporary_identity_key_is_uppercased_name() {
        let fi = FileInfo::temporary("tmp_view");
        assert_eq!(fi.identity_key(), "TMP_VIEW");
    }
}
