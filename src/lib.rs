// Copyright 2019 The Model Authors. All rights reserved.
// Use of this source code is governed by the Apache License,
// Version 2.0, that can be found in the LICENSE file.

#![allow(dead_code)]

extern crate core;
#[macro_use]
extern crate lazy_static;
extern crate regex;
extern crate unicode_xid;

#[macro_use]
mod common;

mod ast;
mod builtins;
mod compiler;
mod datamodel;
mod frame;
mod lexer;
mod model;
mod parser;
mod simulator;
mod solver;
mod transform;
mod variant;

pub use common::{Error, ErrorCode, ExpressionSyntaxError, Ident, NodeIssue, NodeIssuesError, Result};
pub use datamodel::{GraphicalFunctionInterpolation, Object, ObjectId, ObjectType, StructuralKind};
pub use frame::{topological_sort, Frame, InMemoryFrame};
pub use variant::{ValueType, Variant};

pub use compiler::compile;
pub use model::{
    BoundExpression, CompiledControlBinding, CompiledDelay, CompiledFlow, CompiledModel,
    CompiledStock, ComputationKind, SimulationDefaults, SimulationObject, SimulationObjectKind,
    StateContent, StateVariable, TimeKind,
};
pub use solver::{Solver, SolverKind, State};
pub use simulator::Simulator;
