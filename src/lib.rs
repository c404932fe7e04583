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

//! An in-memory SQL query engine over delimited text files.
//!
//! A [`catalog::Catalog`] caches each file as a [`view::View`] the first
//! time it's touched; [`ast::Statement`]s run against that cache through an
//! [`engine::Engine`], which threads a single [`scope::Filter`] through
//! variables, cursors, and nested scopes. Mutating statements (INSERT,
//! UPDATE, DELETE, CREATE/ALTER/DROP TABLE) only take effect on disk once
//! COMMIT flushes the catalog's pending entries; ROLLBACK discards them.

pub mod ast;
pub mod catalog;
pub mod config;
pub mod cursor;
pub mod engine;
pub mod error;
pub mod exec;
pub mod expr;
pub mod file_info;
pub mod io;
pub mod record;
pub mod scope;
pub mod value;
pub mod view;
pub mod window;

pub use catalog::Catalog;
pub use config::Config;
pub use engine::{Engine, Outcome};
pub use error::{Error, ErrorKind, Result};
pub use scope::Filter;
