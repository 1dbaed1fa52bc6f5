// Copyright 2019 The Model Authors. All rights reserved.
// Use of this source code is governed by the Apache License,
// Version 2.0, that can be found in the LICENSE file.

use std::fmt;
use std::{error, result};

use lazy_static::lazy_static;
use regex::Regex;

/// Variable and object names, after canonicalization.
pub type Ident = String;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    InvalidToken,
    UnrecognizedEof,
    UnrecognizedToken,
    ExtraToken,
    UnclosedQuotedIdent,
    ExpectedNumber,
    UnknownBuiltin,
    BadBuiltinArgs,
    EmptyEquation,
    DoesNotExist,
    DuplicateName,
    UnusedInput,
    UnknownParameter,
    MissingRequiredParameter,
    MissingDelayInitialValue,
    ComputationCycle,
    FlowCycle,
    BadTable,
    BadSimSpecs,
    TypeMismatch,
    InvalidArity,
    UnknownOverride,
    DivideByZero,
    Generic,
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        use ErrorCode::*;
        let name = match self {
            InvalidToken => "invalid_token",
            UnrecognizedEof => "unrecognized_eof",
            UnrecognizedToken => "unrecognized_token",
            ExtraToken => "extra_token",
            UnclosedQuotedIdent => "unclosed_quoted_ident",
            ExpectedNumber => "expected_number",
            UnknownBuiltin => "unknown_builtin",
            BadBuiltinArgs => "bad_builtin_args",
            EmptyEquation => "empty_equation",
            DoesNotExist => "does_not_exist",
            DuplicateName => "duplicate_name",
            UnusedInput => "unused_input",
            UnknownParameter => "unknown_parameter",
            MissingRequiredParameter => "missing_required_parameter",
            MissingDelayInitialValue => "missing_delay_initial_value",
            ComputationCycle => "computation_cycle",
            FlowCycle => "flow_cycle",
            BadTable => "bad_table",
            BadSimSpecs => "bad_sim_specs",
            TypeMismatch => "type_mismatch",
            InvalidArity => "invalid_arity",
            UnknownOverride => "unknown_override",
            DivideByZero => "divide_by_zero",
            Generic => "generic",
        };
        write!(f, "{}", name)
    }
}

/// A syntax error produced while parsing a single formula string.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct ExpressionSyntaxError {
    pub code: ErrorCode,
    pub position: usize,
}

impl fmt::Display for ExpressionSyntaxError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}@{}", self.code, self.position)
    }
}

/// Issue attached to a single design-graph object by the transform pass or
/// the compiler. Aggregated per-object inside `NodeIssuesError`.
#[derive(Clone, Debug, PartialEq)]
pub enum NodeIssue {
    ExpressionSyntax(ExpressionSyntaxError),
    ExpressionError(ExpressionSyntaxError),
    UnusedInput(Ident),
    UnknownParameter(Ident),
    DuplicateName(Ident),
    MissingRequiredParameter,
    ComputationCycle,
    FlowCycle,
}

impl fmt::Display for NodeIssue {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            NodeIssue::ExpressionSyntax(e) => write!(f, "expression_syntax: {}", e),
            NodeIssue::ExpressionError(e) => write!(f, "expression_error: {}", e),
            NodeIssue::UnusedInput(n) => write!(f, "unused_input: {}", n),
            NodeIssue::UnknownParameter(n) => write!(f, "unknown_parameter: {}", n),
            NodeIssue::DuplicateName(n) => write!(f, "duplicate_name: {}", n),
            NodeIssue::MissingRequiredParameter => write!(f, "missing_required_parameter"),
            NodeIssue::ComputationCycle => write!(f, "computation_cycle"),
            NodeIssue::FlowCycle => write!(f, "flow_cycle"),
        }
    }
}

/// Aggregated compile-time issues, keyed by the offending object.
#[derive(Clone, Debug, PartialEq, Default)]
pub struct NodeIssuesError {
    pub issues: std::collections::BTreeMap<crate::datamodel::ObjectId, Vec<NodeIssue>>,
}

impl NodeIssuesError {
    pub fn is_empty(&self) -> bool {
        self.issues.is_empty()
    }

    pub fn push(&mut self, id: crate::datamodel::ObjectId, issue: NodeIssue) {
        self.issues.entry(id).or_insert_with(Vec::new).push(issue);
    }

    pub fn merge(&mut self, other: NodeIssuesError) {
        for (id, issues) in other.issues {
            self.issues.entry(id).or_insert_with(Vec::new).extend(issues);
        }
    }
}

impl fmt::Display for NodeIssuesError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{} object(s) with issues", self.issues.len())
    }
}

/// Everything that can go wrong building or running a model.
#[derive(Clone, Debug, PartialEq)]
pub enum Error {
    /// A named cycle in the graph passed to `topological_sort`.
    GraphCycle(Vec<crate::datamodel::ObjectId>),
    /// Compilation aborted because one or more objects have outstanding issues.
    NodeIssues(NodeIssuesError),
    /// A runtime error during a simulation run.
    Simulation {
        code: ErrorCode,
        step: usize,
        object: Option<crate::datamodel::ObjectId>,
        detail: String,
    },
    /// Model-level misconfiguration not tied to a single object.
    Model { code: ErrorCode, detail: String },
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Error::GraphCycle(nodes) => write!(f, "graph_cycle: {:?}", nodes),
            Error::NodeIssues(issues) => write!(f, "node_issues: {}", issues),
            Error::Simulation {
                code,
                step,
                object,
                detail,
            } => write!(
                f,
                "simulation_error{{code: {}, step: {}, object: {:?}, detail: {}}}",
                code, step, object, detail
            ),
            Error::Model { code, detail } => write!(f, "model_error{{{}: {}}}", code, detail),
        }
    }
}

impl error::Error for Error {}

pub type Result<T> = result::Result<T, Error>;

#[macro_export]
macro_rules! sim_err {
    ($code:tt, $step:expr, $object:expr, $detail:expr) => {{
        use $crate::common::{Error, ErrorCode};
        Err(Error::Simulation {
            code: ErrorCode::$code,
            step: $step,
            object: $object,
            detail: $detail,
        })
    }};
}

#[macro_export]
macro_rules! model_err {
    ($code:tt, $detail:expr) => {{
        use $crate::common::{Error, ErrorCode};
        Err(Error::Model {
            code: ErrorCode::$code,
            detail: $detail,
        })
    }};
}

/// Best-effort diagnostic output; the crate has no logging-crate dependency,
/// wrapping `eprintln!` rather than pulling in `log`/`tracing`.
#[macro_export]
macro_rules! diag {
    ($($arg:tt)*) => {{
        use std::io::Write;
        let r = writeln!(&mut ::std::io::stderr(), $($arg)*);
        r.expect("failed printing to stderr");
    }};
}

/// Normalizes a user-supplied name: trims whitespace, strips a surrounding
/// pair of quotes, collapses internal whitespace to `_`, and lowercases.
/// `Frame::object_by_name` and every formula variable reference go through
/// this so that surface spelling differences don't create spurious
/// "unknown identifier" errors.
pub fn canonicalize(name: &str) -> String {
    let name = name.trim();

    let bytes = name.as_bytes();
    let quoted = bytes.len() >= 2 && bytes[0] == b'"' && bytes[bytes.len() - 1] == b'"';

    let name = if quoted {
        &name[1..bytes.len() - 1]
    } else {
        name
    };

    lazy_static! {
        static ref WHITESPACE_RE: Regex = Regex::new(r"\\n|\\r|\n|\r|\s+").unwrap();
    }
    let name = name.replace("\\\\", "\\");
    let name = WHITESPACE_RE.replace_all(&name, "_");

    name.to_lowercase()
}
