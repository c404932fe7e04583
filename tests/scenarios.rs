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

//! End-to-end scenarios, one per testable property.

use tabularquery::ast::*;
use tabularquery::catalog::Catalog;
use tabularquery::config::Config;
use tabularquery::engine::{Engine, Outcome};
use tabularquery::error::{ErrorKind, Span};
use tabularquery::expr::functions::NoScalarFunctions;
use tabularquery::expr::EvalContext;
use tabularquery::exec::{dml, select};
use tabularquery::file_info::FileInfo;
use tabularquery::record::{HeaderField, Record};
use tabularquery::scope::Filter;
use tabularquery::value::Primary;
use tabularquery::view::View;

fn field(name: &str) -> Expr {
    Expr::Field { view: None, name: name.into(), span: Span::UNKNOWN }
}

fn qualified_field(view: &str, name: &str) -> Expr {
    Expr::Field { view: Some(view.into()), name: name.into(), span: Span::UNKNOWN }
}

/// S4 — UPDATE ambiguity: a CROSS JOIN makes the same target record a
/// candidate for two different new values, which must fail.
#[test]
fn update_ambiguity_across_a_cross_join_fails() {
    let mut filter = Filter::new_root();
    filter
        .declare_temp_view(
            "table1",
            View::new(
                vec![HeaderField::new("table1", "c1", 1), HeaderField::new("table1", "c2", 2)],
                vec![
                    Record::from_values(vec![Primary::Integer(1), Primary::String("a".into())]),
                    Record::from_values(vec![Primary::Integer(2), Primary::String("b".into())]),
                ],
                FileInfo::temporary("table1"),
            ),
        )
        .unwrap();
    filter
        .declare_temp_view(
            "table2",
            View::new(
                vec![HeaderField::new("table2", "c1", 1), HeaderField::new("table2", "c3", 2)],
                vec![
                    Record::from_values(vec![Primary::Integer(1), Primary::String("x".into())]),
                    Record::from_values(vec![Primary::Integer(1), Primary::String("y".into())]),
                ],
                FileInfo::temporary("table2"),
            ),
        )
        .unwrap();

    let catalog = Catalog::new();
    let config = Config::default();
    let funcs = NoScalarFunctions;
    let ctx = EvalContext { catalog: &catalog, config: &config, scalar_functions: &funcs };

    let stmt = UpdateStatement {
        tables: vec!["table1".into()],
        from: Some(FromClause {
            first: TableRef::Named { name: "table1".into(), alias: None },
            joins: vec![Join { kind: JoinKind::Cross, right: TableRef::Named { name: "table2".into(), alias: None }, condition: JoinCondition::None }],
        }),
        assignments: vec![Assignment { target_view: None, field: "c2".into(), value: qualified_field("table2", "c3") }],
        filter: None,
    };

    let err = dml::execute_update(&stmt, &mut filter, &ctx).unwrap_err();
    assert_eq!(err.kind, ErrorKind::RecordAmbiguous);
}

/// S5 — recursive CTE counts from 1 to 3.
#[test]
fn recursive_cte_enumerates_one_through_three() {
    let mut filter = Filter::new_root();
    let catalog = Catalog::new();
    let config = Config::default();
    let funcs = NoScalarFunctions;
    let ctx = EvalContext { catalog: &catalog, config: &config, scalar_functions: &funcs };

    let anchor = Select {
        items: vec![SelectItem { expr: Expr::IntegerLiteral(1), alias: None }],
        ..Select::default()
    };
    let recursive_member = Select {
        items: vec![SelectItem {
            expr: Expr::Binary(Box::new(field("n")), BinaryOp::Add, Box::new(Expr::IntegerLiteral(1))),
            alias: None,
        }],
        from: Some(FromClause { first: TableRef::Named { name: "it".into(), alias: None }, joins: vec![] }),
        filter: Some(Expr::Binary(Box::new(field("n")), BinaryOp::Lt, Box::new(Expr::IntegerLiteral(3)))),
        ..Select::default()
    };
    let query = Select {
        ctes: vec![CommonTableExpr {
            name: "it".into(),
            columns: vec!["n".into()],
            recursive: true,
            anchor: Box::new(anchor),
            recursive_member: Some(Box::new(recursive_member)),
        }],
        items: vec![SelectItem { expr: field("n"), alias: None }],
        from: Some(FromClause { first: TableRef::Named { name: "it".into(), alias: None }, joins: vec![] }),
        order_by: vec![OrderByItem { expr: field("n"), descending: false, nulls: None }],
        ..Select::default()
    };

    let result = select::execute_select(&query, &mut filter, &ctx).unwrap();
    let values: Vec<i64> = result
        .records
        .iter()
        .map(|r| match r.get(0).unwrap().value() {
            Primary::Integer(i) => *i,
            other => panic!("expected integer, got {other:?}"),
        })
        .collect();
    assert_eq!(values, vec![1, 2, 3]);
}

/// S6 — a CREATE TABLE + INSERT rolled back leaves no file on disk (the
/// COMMIT leg of this scenario is covered by `engine::tests::
/// create_table_then_insert_marks_view_dirty`).
#[test]
fn rollback_after_create_and_insert_leaves_no_file() {
    let dir = tempfile::tempdir().unwrap();
    let config = Config { repository: dir.path().to_path_buf(), ..Config::default() };
    let engine = Engine::new(config, Box::new(NoScalarFunctions));
    let mut filter = Filter::new_root();

    let create = Statement::CreateTable(CreateTableStatement {
        name: "f".into(),
        columns: vec![ColumnDef { name: "a".into(), default: None }, ColumnDef { name: "b".into(), default: None }],
        query: None,
    });
    engine.execute(&create, &mut filter).unwrap();

    let insert = Statement::Insert(InsertStatement {
        target: "f".into(),
        fields: None,
        values: Some(ValuesList { rows: vec![vec![Expr::IntegerLiteral(1), Expr::IntegerLiteral(2)]] }),
        query: None,
    });
    engine.execute(&insert, &mut filter).unwrap();

    engine.execute(&Statement::Rollback, &mut filter).unwrap();
    assert!(!dir.path().join("f.csv").exists());
}

/// S7 — cursor FETCH ABSOLUTE then FETCH NEXT sequencing, driven through
/// `Engine::execute` rather than the cursor unit directly.
#[test]
fn cursor_absolute_then_next_advances_in_order() {
    let mut filter = Filter::new_root();
    filter
        .declare_temp_view(
            "t",
            View::new(
                vec![HeaderField::new("t", "n", 1)],
                vec![
                    Record::from_values(vec![Primary::Integer(10)]),
                    Record::from_values(vec![Primary::Integer(20)]),
                    Record::from_values(vec![Primary::Integer(30)]),
                ],
                FileInfo::temporary("t"),
            ),
        )
        .unwrap();

    let engine = Engine::new(Config::default(), Box::new(NoScalarFunctions));
    filter.declare_variable("out", Primary::Null);

    let declare = Statement::DeclareCursor(DeclareCursorStatement {
        name: "c".into(),
        query: Select {
            items: vec![SelectItem { expr: field("n"), alias: None }],
            from: Some(FromClause { first: TableRef::Named { name: "t".into(), alias: None }, joins: vec![] }),
            ..Select::default()
        },
    });
    engine.execute(&declare, &mut filter).unwrap();
    engine.execute(&Statement::OpenCursor("c".into()), &mut filter).unwrap();

    let fetch_absolute = Statement::Fetch(FetchStatement {
        cursor: "c".into(),
        position: FetchPosition::Absolute(1),
        targets: vec!["out".into()],
    });
    let outcome = engine.execute(&fetch_absolute, &mut filter).unwrap();
    assert!(matches!(outcome, Outcome::CursorInRange(true)));
    assert_eq!(filter.lookup_variable("out").unwrap(), Primary::Integer(10));

    let fetch_next = Statement::Fetch(FetchStatement {
        cursor: "c".into(),
        position: FetchPosition::Next,
        targets: vec!["out".into()],
    });
    engine.execute(&fetch_next, &mut filter).unwrap();
    assert_eq!(filter.lookup_variable("out").unwrap(), Primary::Integer(20));
}
