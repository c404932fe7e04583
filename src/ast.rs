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

//! The AST this engine consumes (spec §6 "External Interfaces").
//!
//! Lexing and parsing are an external collaborator (spec §1); this module
//! only declares the node shapes the engine's executors and evaluator
//! require, the same way teacher's `datafusion-expr::Expr` /
//! `datafusion-sql::planner` declare a plan-facing AST independent of its
//! own SQL parser crate.

use crate::error::Span;
use crate::file_info::{Encoding, LineBreak};
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Eq,
    NotEq,
    Lt,
    LtEq,
    Gt,
    GtEq,
    And,
    Or,
    Concat,
    Like,
    NotLike,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Neg,
    Not,
    IsNull,
    IsNotNull,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NullsOrder {
    First,
    Last,
}

#[derive(Debug, Clone)]
pub struct OrderByItem {
    pub expr: Expr,
    pub descending: bool,
    pub nulls: Option<NullsOrder>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameKind {
    Rows,
    Range,
}

#[derive(Debug, Clone)]
pub enum FrameBound {
    UnboundedPreceding,
    Preceding(i64),
    CurrentRow,
    Following(i64),
    UnboundedFollowing,
}

#[derive(Debug, Clone)]
pub struct WindowFrame {
    pub kind: FrameKind,
    pub start: FrameBound,
    pub end: FrameBound,
}

/// `fn(args) OVER (PARTITION BY p* ORDER BY o*)` (spec §4.1 "Contract").
#[derive(Debug, Clone)]
pub struct OverClause {
    pub partition_by: Vec<Expr>,
    pub order_by: Vec<OrderByItem>,
    pub frame: Option<WindowFrame>,
}

#[derive(Debug, Clone)]
pub struct FunctionCall {
    pub name: String,
    pub args: Vec<Expr>,
    pub distinct: bool,
    /// `true` when a bare `*` argument (e.g. `COUNT(*)`) was parsed.
    pub star_arg: bool,
    pub ignore_nulls: bool,
    pub over: Option<OverClause>,
    pub span: Span,
}

#[derive(Debug, Clone)]
pub struct CaseWhen {
    pub condition: Expr,
    pub result: Expr,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CastType {
    Integer,
    Float,
    String,
    Boolean,
    Datetime,
}

/// `CURSOR c IS OPEN` / `IS IN RANGE` / `COUNT` (spec §4.5).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CursorPredicate {
    IsOpen,
    IsInRange,
    Count,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubqueryQuantifier {
    Scalar,
    Exists,
    NotExists,
    In,
    NotIn,
    Any,
    All,
}

#[derive(Debug, Clone)]
pub enum Expr {
    NullLiteral,
    IntegerLiteral(i64),
    FloatLiteral(f64),
    StringLiteral(String),
    BooleanLiteral(bool),
    /// Bare column reference: `col` or `view.col`.
    Field {
        view: Option<String>,
        name: String,
        span: Span,
    },
    /// `view.col[n]`: references the n-th value inside a grouped cell.
    FieldIndexed {
        view: Option<String>,
        name: String,
        index: usize,
        span: Span,
    },
    Variable(String),
    SystemVariable(String),
    Unary(UnaryOp, Box<Expr>),
    Binary(Box<Expr>, BinaryOp, Box<Expr>),
    Case {
        operand: Option<Box<Expr>>,
        whens: Vec<CaseWhen>,
        else_result: Option<Box<Expr>>,
    },
    Cast {
        expr: Box<Expr>,
        target: CastType,
        span: Span,
    },
    Function(Box<FunctionCall>),
    Subquery {
        query: Arc<Select>,
        quantifier: SubqueryQuantifier,
        compare_expr: Option<Box<Expr>>,
        span: Span,
    },
    Star,
    QualifiedStar(String),
    Cursor {
        name: String,
        predicate: CursorPredicate,
        span: Span,
    },
}

#[derive(Debug, Clone)]
pub struct SelectItem {
    pub expr: Expr,
    pub alias: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinKind {
    Inner,
    Cross,
    Left,
    Right,
    FullOuter,
    Natural,
}

#[derive(Debug, Clone)]
pub enum JoinCondition {
    On(Expr),
    Using(Vec<String>),
    None,
}

#[derive(Debug, Clone)]
pub struct Join {
    pub kind: JoinKind,
    pub right: TableRef,
    pub condition: JoinCondition,
}

#[derive(Debug, Clone)]
pub enum TableRef {
    Named {
        name: String,
        alias: Option<String>,
    },
    Subquery {
        query: Arc<Select>,
        alias: String,
    },
}

#[derive(Debug, Clone)]
pub struct FromClause {
    pub first: TableRef,
    pub joins: Vec<Join>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SetOp {
    Union,
    Intersect,
    Except,
}

#[derive(Debug, Clone)]
pub struct SetOperation {
    pub op: SetOp,
    pub all: bool,
    pub rhs: Box<Select>,
}

#[derive(Debug, Clone)]
pub struct CommonTableExpr {
    pub name: String,
    pub columns: Vec<String>,
    pub recursive: bool,
    pub anchor: Box<Select>,
    /// Present only when `recursive`: the member unioned against the
    /// growing temporary view each iteration (spec §4.3 "CTE & recursion").
    pub recursive_member: Option<Box<Select>>,
}

#[derive(Debug, Clone, Default)]
pub struct Select {
    pub ctes: Vec<CommonTableExpr>,
    pub distinct: bool,
    pub items: Vec<SelectItem>,
    pub from: Option<FromClause>,
    pub filter: Option<Expr>,
    pub group_by: Vec<Expr>,
    pub having: Option<Expr>,
    pub order_by: Vec<OrderByItem>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
    pub set_ops: Vec<SetOperation>,
}

#[derive(Debug, Clone)]
pub struct ValuesList {
    pub rows: Vec<Vec<Expr>>,
}

#[derive(Debug, Clone)]
pub struct InsertStatement {
    pub target: String,
    pub fields: Option<Vec<String>>,
    pub values: Option<ValuesList>,
    pub query: Option<Box<Select>>,
}

#[derive(Debug, Clone)]
pub struct Assignment {
    pub target_view: Option<String>,
    pub field: String,
    pub value: Expr,
}

#[derive(Debug, Clone)]
pub struct UpdateStatement {
    pub tables: Vec<String>,
    pub from: Option<FromClause>,
    pub assignments: Vec<Assignment>,
    pub filter: Option<Expr>,
}

#[derive(Debug, Clone)]
pub struct DeleteStatement {
    pub tables: Vec<String>,
    pub from: FromClause,
    pub filter: Option<Expr>,
}

#[derive(Debug, Clone)]
pub struct ColumnDef {
    pub name: String,
    pub default: Option<Expr>,
}

#[derive(Debug, Clone)]
pub struct CreateTableStatement {
    pub name: String,
    pub columns: Vec<ColumnDef>,
    pub query: Option<Box<Select>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnPosition {
    First,
    Last,
    After,
    Before,
}

#[derive(Debug, Clone)]
pub enum AlterTableStatement {
    AddColumn {
        table: String,
        column: ColumnDef,
        position: ColumnPosition,
        reference_column: Option<String>,
    },
    DropColumn {
        table: String,
        column: String,
    },
    RenameColumn {
        table: String,
        column: String,
        new_name: String,
    },
}

#[derive(Debug, Clone)]
pub struct DeclareCursorStatement {
    pub name: String,
    pub query: Select,
}

#[derive(Debug, Clone, Copy)]
pub enum FetchPosition {
    Next,
    Prior,
    First,
    Last,
    Absolute(i64),
    Relative(i64),
}

#[derive(Debug, Clone)]
pub struct FetchStatement {
    pub cursor: String,
    pub position: FetchPosition,
    pub targets: Vec<String>,
}

#[derive(Debug, Clone)]
pub enum CreateFileOptions {
    Delimiter(u8),
    LineBreak(LineBreak),
    Encoding(Encoding),
    NoHeader(bool),
}

#[derive(Debug, Clone)]
pub enum Statement {
    Select(Select),
    Insert(InsertStatement),
    Update(UpdateStatement),
    Delete(DeleteStatement),
    CreateTable(CreateTableStatement),
    AlterTable(AlterTableStatement),
    DropTable(String),
    DeclareVariable { name: String, initial: Option<Expr> },
    SetVariable { name: String, value: Expr },
    DeclareCursor(DeclareCursorStatement),
    OpenCursor(String),
    Fetch(FetchStatement),
    CloseCursor(String),
    DisposeCursor(String),
    Begin,
    Commit,
    Rollback,
    If {
        condition: Expr,
        then_branch: Vec<Statement>,
        else_branch: Vec<Statement>,
    },
    While {
        condition: Expr,
        body: Vec<Statement>,
    },
    /// Unconditional loop; the grammar defines no EXIT/BREAK node, so a loop
    /// body runs until it raises an error (see `engine::execute_statement`).
    Loop(Vec<Statement>),
    /// An already-parsed included script (SOURCE), spliced in and run as a
    /// unit; lexing/parsing the referenced file is the caller's concern.
    Source(Vec<Statement>),
    Print(Expr),
    Printf(String, Vec<Expr>),
    Show(String),
}
