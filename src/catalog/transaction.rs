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

//! Pending-mutation log and COMMIT/ROLLBACK (spec §4.2).

use crate::error::Result;
use crate::file_info::FileInfo;
use crate::io;
use crate::view::View;
use fs2::FileExt;
use parking_lot::{Mutex, RwLock};
use std::fs::File;
use std::sync::Arc;

/// One not-yet-committed mutation awaiting COMMIT or ROLLBACK
/// (GLOSSARY "Pending result").
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MutationKind {
    Create,
    Update,
    Drop,
}

struct PendingEntry {
    kind: MutationKind,
    view: Arc<RwLock<View>>,
    /// Advisory OS lock held on the file from first mutation through
    /// COMMIT/ROLLBACK (spec §3 "Lifecycles", §4.2 "Cache invariants").
    lock_handle: Option<File>,
}

/// Tracks pending creates/updates and performs COMMIT (flush) and ROLLBACK
/// (discard/delete) (spec §4.2).
#[derive(Default)]
pub struct TransactionManager {
    pending: Mutex<Vec<PendingEntry>>,
}

impl TransactionManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a pending `CREATE TABLE`. The file is not written until
    /// COMMIT (spec §4.2 COMMIT "CREATE TABLE: create the file...").
    pub fn begin_create(&self, view: Arc<RwLock<View>>) {
        self.pending.lock().push(PendingEntry {
            kind: MutationKind::Create,
            view,
            lock_handle: None,
        });
    }

    /// Registers a pending mutation (INSERT/UPDATE/DELETE/DDL) on an
    /// already-cached view, acquiring its per-file advisory exclusive lock
    /// (spec §4.2 "Cache invariants": "Mutation on a cached View acquires a
    /// per-file advisory OS lock").
    pub fn begin_mutation(&self, view: Arc<RwLock<View>>) -> Result<()> {
        let lock_handle = {
            let guard = view.read();
            if guard.file_info.is_temporary {
                None
            } else {
                let file = guard.file_info.open_for_lock()?;
                file.lock_exclusive()?;
                Some(file)
            }
        };
        self.pending.lock().push(PendingEntry {
            kind: MutationKind::Update,
            view,
            lock_handle,
        });
        Ok(())
    }

    pub fn begin_drop(&self, view: Arc<RwLock<View>>) {
        self.pending.lock().push(PendingEntry {
            kind: MutationKind::Drop,
            view,
            lock_handle: None,
        });
    }

    /// Flushes every pending mutation in registration order. A failure on
    /// any file aborts remaining writes; already-written files remain
    /// written (spec §4.2 COMMIT: "best-effort semantics; no two-phase
    /// commit").
    pub fn commit(&self, quiet: bool) -> Result<()> {
        let mut pending = self.pending.lock();
        for entry in pending.drain(..) {
            let path_display;
            {
                let guard = entry.view.read();
                path_display = guard.file_info.path.display().to_string();
                match entry.kind {
                    MutationKind::Create => {
                        io::create_file(&guard)?;
                        if !quiet {
                            log::info!("{path_display}: created");
                        }
                    }
                    MutationKind::Update => {
                        io::write_view(&guard)?;
                        if !quiet {
                            log::info!("{path_display}: updated");
                        }
                    }
                    MutationKind::Drop => {
                        io::delete_file(&guard.file_info)?;
                        if !quiet {
                            log::info!("{path_display}: dropped");
                        }
                    }
                }
            }
            if let Some(handle) = &entry.lock_handle {
                let _ = handle.unlock();
            }
        }
        Ok(())
    }

    /// Reverses every pending mutation in reverse registration order
    /// (spec §4.2 ROLLBACK). Temporary-view mutations are intentionally
    /// left as-is here (Open Question 2, resolved in DESIGN.md: temp-view
    /// mutations are not transactional).
    pub fn rollback(&self, quiet: bool) -> Result<()> {
        let mut pending = self.pending.lock();
        for entry in pending.drain(..).rev() {
            let path_display;
            {
                let guard = entry.view.read();
                path_display = guard.file_info.path.display().to_string();
                match entry.kind {
                    MutationKind::Create => {
                        io::delete_file(&guard.file_info)?;
                        if !quiet {
                            log::info!("{path_display}: deleted");
                        }
                    }
                    MutationKind::Update | MutationKind::Drop => {
                        if !quiet {
                            log::info!("{path_display}: restored");
                        }
                    }
                }
            }
            if let Some(handle) = &entry.lock_handle {
                let _ = handle.unlock();
            }
        }
        Ok(())
    }

    pub fn pending_count(&self) -> usize {
        self.pending.lock().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::HeaderField;
    use crate::value::Primary;
    use crate::view::View;

    #[test]
    fn commit_after_create_then_insert_writes_rows_in_order() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("f.csv");
        let header = vec![HeaderField::new("f", "a", 1), HeaderField::new("f", "b", 2)];
        let mut view = View::new(header, vec![], FileInfo::file(&path, b','));
        view.records
            .push(crate::record::Record::from_values(vec![
                Primary::Integer(1),
                Primary::Integer(2),
            ]));
        let shared = Arc::new(RwLock::new(view));

        let tx = TransactionManager::new();
        tx.begin_create(shared.clone());
        tx.commit(true).unwrap();

        let contents = std::fs::read_to_string(&path).unwrap();
        assert_eq!(contents, "a,b\n1,2\n");
    }

    #[test]
    fn rollback_after_create_leaves_no_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("f.csv");
        let header = vec![HeaderField::new("f", "a", 1)];
        let view = View::new(header, vec![], FileInfo::file(&path, b','));
        let shared = Arc::new(RwLock::new(view));

        let tx = TransactionManager::new();
        tx.begin_create(shared);
        tx.rollback(true).unwrap();

        assert!(!path.exists());
    }
}
