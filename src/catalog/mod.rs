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

//! The view cache and transaction manager (spec §4.2), bundled behind a
//! single [`Catalog`] handle so the engine threads one object through every
//! operation instead of reaching for process-wide statics (spec §9
//! "Patterns requiring re-architecture").

pub mod cache;
pub mod transaction;

pub use cache::ViewCache;
pub use transaction::TransactionManager;

/// The engine's two process-wide collaborators, owned together.
#[derive(Default)]
pub struct Catalog {
    pub views: ViewCache,
    pub transactions: TransactionManager,
}

impl Catalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// RELEASE: drop all cache entries unconditionally (spec §4.2).
    pub fn release(&self) {
        self.views.release();
    }
}
