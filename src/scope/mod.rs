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

//! The scoped evaluation environment (spec §4.3): a stack of variable,
//! cursor, temporary-view and user-function scopes, plus a per-evaluation
//! record-reference stack for row-at-a-time expression evaluation.
//!
//! Modeled on the teacher's layered-provider pattern (`CatalogList` /
//! `CatalogProvider` / `SchemaProvider` in
//! `datafusion/core/src/catalog/catalog.rs`): lookups walk inner-to-outer,
//! each layer a `parking_lot`-guarded map, addressed through one handle
//! rather than process-wide globals (spec §9's re-architecture note).

use crate::ast::Expr;
use crate::cursor::Cursor;
use crate::error::{Error, Result};
use crate::value::Primary;
use crate::view::View;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;

/// A user-defined scalar or aggregate function declared with `DECLARE
/// FUNCTION` (spec §4.1 USER_DEFINED_AGGREGATE, §4.3 "user-defined function
/// dispatch").
#[derive(Debug, Clone)]
pub struct UserFunctionDef {
    pub name: String,
    pub params: Vec<String>,
    pub body: Expr,
    pub is_aggregate: bool,
}

/// One lexical level of the environment: the declarations visible from a
/// single block (spec §3 "Scope").
#[derive(Default)]
pub struct Scope {
    pub variables: HashMap<String, Primary>,
    pub temp_views: HashMap<String, Arc<RwLock<View>>>,
    pub cursors: HashMap<String, Cursor>,
    pub user_functions: HashMap<String, UserFunctionDef>,
}

impl Scope {
    pub fn new() -> Self {
        Self::default()
    }
}

/// `{view, recordIndex}` — the row currently bound for evaluation at one
/// level of nesting; `record_refs[0]` is the innermost (spec §4.3
/// "Per-record binding").
#[derive(Clone)]
pub struct RecordRef {
    pub view: Arc<View>,
    pub record_index: usize,
}

/// A non-empty stack of [`Scope`]s; innermost wins on name lookup
/// (spec §3 "Filter").
pub struct Filter {
    scopes: Vec<Arc<RwLock<Scope>>>,
    pub record_refs: Vec<RecordRef>,
}

impl Filter {
    pub fn new_root() -> Self {
        Self {
            scopes: vec![Arc::new(RwLock::new(Scope::new()))],
            record_refs: Vec::new(),
        }
    }

    /// Enters a new lexical block (e.g. a stored procedure body): pushes a
    /// fresh innermost scope.
    pub fn push_scope(&mut self) {
        self.scopes.push(Arc::new(RwLock::new(Scope::new())));
    }

    pub fn pop_scope(&mut self) {
        if self.scopes.len() > 1 {
            self.scopes.pop();
        }
    }

    /// Creates a child filter for subquery/aggregate-argument evaluation:
    /// shares the parent's scope stack by reference, but starts its own
    /// record-reference frame prefixed onto the parent's so correlated
    /// references still resolve to the enclosing row (spec §4.3 "A child
    /// filter ... shares the parent's stacks by reference but owns its own
    /// recordRefs frame").
    pub fn create_child(&self) -> Filter {
        Filter {
            scopes: self.scopes.clone(),
            record_refs: self.record_refs.clone(),
        }
    }

    /// Binds `record_refs[0]` to `(view, index)` for the row a
    /// SELECT/window/aggregate step is currently evaluating (spec §4.3).
    pub fn bind_record(&mut self, view: Arc<View>, record_index: usize) {
        if self.record_refs.is_empty() {
            self.record_refs.push(RecordRef { view, record_index });
        } else {
            self.record_refs[0] = RecordRef { view, record_index };
        }
    }

    pub fn current_record(&self) -> Option<&RecordRef> {
        self.record_refs.first()
    }

    fn innermost(&self) -> &Arc<RwLock<Scope>> {
        self.scopes.last().expect("filter stack is never empty")
    }

    pub fn declare_variable(&mut self, name: &str, value: Primary) {
        self.innermost().write().variables.insert(name.to_ascii_uppercase(), value);
    }

    pub fn set_variable(&mut self, name: &str, value: Primary) -> Result<()> {
        let key = name.to_ascii_uppercase();
        for scope in self.scopes.iter().rev() {
            let mut guard = scope.write();
            if guard.variables.contains_key(&key) {
                guard.variables.insert(key, value);
                return Ok(());
            }
        }
        Err(Error::variable_undeclared(format!("variable @{name} was not declared")))
    }

    pub fn lookup_variable(&self, name: &str) -> Result<Primary> {
        let key = name.to_ascii_uppercase();
        for scope in self.scopes.iter().rev() {
            if let Some(v) = scope.read().variables.get(&key) {
                return Ok(v.clone());
            }
        }
        Err(Error::variable_undeclared(format!("variable @{name} was not declared")))
    }

    pub fn declare_temp_view(&mut self, name: &str, view: View) -> Result<()> {
        let key = name.to_ascii_uppercase();
        let mut guard = self.innermost().write();
        if guard.temp_views.contains_key(&key) {
            return Err(Error::view_redeclared(format!("view {name:?} is already declared")));
        }
        guard.temp_views.insert(key, Arc::new(RwLock::new(view)));
        Ok(())
    }

    /// Replaces an already-declared temp view's contents in place (used by
    /// recursive CTE evaluation to grow the working table each iteration).
    pub fn replace_temp_view(&mut self, name: &str, view: View) {
        let key = name.to_ascii_uppercase();
        for scope in self.scopes.iter().rev() {
            let mut guard = scope.write();
            if let Some(existing) = guard.temp_views.get(&key) {
                *existing.write() = view;
                return;
            }
        }
        self.innermost().write().temp_views.insert(key, Arc::new(RwLock::new(view)));
    }

    pub fn lookup_temp_view(&self, name: &str) -> Option<Arc<RwLock<View>>> {
        let key = name.to_ascii_uppercase();
        for scope in self.scopes.iter().rev() {
            if let Some(v) = scope.read().temp_views.get(&key) {
                return Some(v.clone());
            }
        }
        None
    }

    pub fn declare_cursor(&mut self, name: &str, cursor: Cursor) -> Result<()> {
        let key = name.to_ascii_uppercase();
        let mut guard = self.innermost().write();
        if guard.cursors.contains_key(&key) {
            return Err(Error::view_redeclared(format!("cursor {name:?} is already declared")));
        }
        guard.cursors.insert(key, cursor);
        Ok(())
    }

    /// Runs `f` with mutable access to the named cursor, walking scopes
    /// inner-to-outer.
    pub fn with_cursor_mut<T>(&self, name: &str, f: impl FnOnce(&mut Cursor) -> Result<T>) -> Result<T> {
        let key = name.to_ascii_uppercase();
        for scope in self.scopes.iter().rev() {
            let mut guard = scope.write();
            if let Some(cursor) = guard.cursors.get_mut(&key) {
                return f(cursor);
            }
        }
        Err(Error::cursor_undeclared(format!("cursor {name:?} was not declared")))
    }

    pub fn dispose_cursor(&mut self, name: &str) -> Result<()> {
        let key = name.to_ascii_uppercase();
        for scope in self.scopes.iter().rev() {
            if scope.write().cursors.remove(&key).is_some() {
                return Ok(());
            }
        }
        Err(Error::cursor_undeclared(format!("cursor {name:?} was not declared")))
    }

    pub fn declare_user_function(&mut self, def: UserFunctionDef) {
        self.innermost()
            .write()
            .user_functions
            .insert(def.name.to_ascii_uppercase(), def);
    }

    pub fn lookup_user_function(&self, name: &str) -> Option<UserFunctionDef> {
        let key = name.to_ascii_uppercase();
        for scope in self.scopes.iter().rev() {
            if let Some(def) = scope.read().user_functions.get(&key) {
                return Some(def.clone());
            }
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn variable_lookup_walks_innermost_first() {
        let mut filter = Filter::new_root();
        filter.declare_variable("x", Primary::Integer(1));
        filter.push_scope();
        filter.declare_variable("x", Primary::Integer(2));
        assert_eq!(filter.lookup_variable("x").unwrap(), Primary::Integer(2));
        filter.pop_scope();
        assert_eq!(filter.lookup_variable("x").unwrap(), Primary::Integer(1));
    }

    #[test]
    fn set_variable_requires_prior_declaration() {
        let mut filter = Filter::new_root();
        assert!(filter.set_variable("x", Primary::Integer(1)).is_err());
        filter.declare_variable("x", Primary::Integer(0));
        assert!(filter.set_variable("x", Primary::Integer(1)).is_ok());
    }

    #[test]
    fn child_filter_shares_declarations_but_not_record_ref() {
        let mut parent = Filter::new_root();
        parent.declare_variable("x", Primary::Integer(5));
        let view = Arc::new(View::empty_temporary("t", &["a"]));
        parent.bind_record(view.clone(), 3);

        let mut child = parent.create_child();
        assert_eq!(child.lookup_variable("x").unwrap(), Primary::Integer(5));
        assert_eq!(child.current_record().unwrap().record_index, 3);

        child.bind_record(view, 7);
        assert_eq!(child.current_record().unwrap().record_index, 7);
        assert_eq!(parent.current_record().unwrap().record_index, 3);
    }

    #[test]
    fn redeclaring_temp_view_in_same_scope_is_rejected() {
        let mut filter = Filter::new_root();
        filter.declare_temp_view("v", View::empty_temporary("v", &["a"])).unwrap();
        let err = filter
            .declare_temp_view("v", View::empty_temporary("v", &["a"]))
            .unwrap_err();
        assert_eq!(err.kind, crate::error::ErrorKind::ViewRedeclared);
    }
}
