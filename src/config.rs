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

//! Engine-wide configuration (spec §6 "Environment & configuration").
//!
//! Plain data with an explicit [`Default`] impl, threaded through the
//! [`crate::engine::Engine`] rather than read from process environment
//! inside the engine itself.

use crate::file_info::{Encoding, LineBreak};
use std::path::PathBuf;

#[derive(Debug, Clone)]
pub struct Config {
    /// Worker-thread count for parallel phases; `None` means "available
    /// logical CPUs" (spec §5).
    pub cpu: Option<usize>,
    /// Base directory used to resolve unqualified table identifiers.
    pub repository: PathBuf,
    /// Suppress commit/rollback log lines (spec §6).
    pub quiet: bool,
    pub encoding: Encoding,
    pub delimiter: u8,
    pub line_break: LineBreak,
    pub no_header: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            cpu: None,
            repository: PathBuf::from("."),
            quiet: false,
            encoding: Encoding::Utf8,
            delimiter: b',',
            line_break: LineBreak::Lf,
            no_header: false,
        }
    }
}

impl Config {
    /// The worker count `W` for a statement operating on `row_count` rows:
    /// `min(configured-CPU, rows/64)`, falling back to available logical
    /// CPUs when `cpu` is unset (spec §5 "Scheduling model").
    pub fn worker_count(&self, row_count: usize) -> usize {
        let configured = self.cpu.unwrap_or_else(num_cpus::get);
        let by_rows = (row_count / 64).max(1);
        configured.max(1).min(by_rows).max(1)
    }
}
