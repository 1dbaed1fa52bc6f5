// Copyright 2019 The Model Authors. All rights reserved.
// Use of this source code is governed by the Apache License,
// Version 2.0, that can be found in the LICENSE file.

//! The compiled, immutable artifact the `compiler` module produces and the
//! `solver`/`simulator` modules consume. Nothing here parses or validates;
//! by the time a `CompiledModel` exists, every name has resolved and every
//! signature has checked.

use std::collections::HashMap;
use std::rc::Rc;

use crate::builtins::Function;
use crate::common::Ident;
use crate::datamodel::ObjectId;
use crate::variant::{ValueType, Variant};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum TimeKind {
    Time,
    TimeDelta,
}

/// What a state-variable slot holds: a user object's computed output, a
/// builtin (`time`/`time_delta`), or compiler-internal bookkeeping state
/// (currently only a delay's FIFO queue).
#[derive(Clone, Debug, PartialEq)]
pub enum StateContent {
    Object(ObjectId),
    Builtin(TimeKind),
    InternalState(ObjectId),
}

#[derive(Clone, Debug, PartialEq)]
pub struct StateVariable {
    pub index: usize,
    pub content: StateContent,
    pub value_type: ValueType,
    pub name: Option<Ident>,
}

/// An `ast::Expr` after name resolution and function binding: every
/// identifier has become a state-vector index, every call/operator a
/// resolved `Function`.
#[derive(Clone, Debug)]
pub enum BoundExpression {
    Literal(Variant),
    Var {
        state_index: usize,
        value_type: ValueType,
    },
    Unary(Rc<Function>, Box<BoundExpression>),
    Binary(Rc<Function>, Box<BoundExpression>, Box<BoundExpression>),
    Call(Rc<Function>, Vec<BoundExpression>),
}

#[derive(Clone, Debug)]
pub struct CompiledDelay {
    pub queue_state_index: usize,
    pub duration: f64,
    pub initial_value: Option<f64>,
    pub parameter_state_index: usize,
    pub value_type: ValueType,
}

#[derive(Clone, Debug)]
pub enum ComputationKind {
    Formula(BoundExpression),
    GraphicalFunction(Rc<Function>, usize),
    Delay(CompiledDelay),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum SimulationObjectKind {
    Stock,
    Flow,
    Auxiliary,
}

#[derive(Clone, Debug)]
pub struct SimulationObject {
    pub id: ObjectId,
    pub kind: SimulationObjectKind,
    pub variable_index: usize,
    pub value_type: ValueType,
    pub computation: ComputationKind,
    pub name: Ident,
}

#[derive(Clone, Debug)]
pub struct CompiledStock {
    pub id: ObjectId,
    pub variable_index: usize,
    pub allows_negative: bool,
    pub delayed_inflow: bool,
    /// State indices of inflow Flows.
    pub inflows: Vec<usize>,
    /// State indices of outflow Flows, sorted by priority ascending.
    pub outflows: Vec<usize>,
}

#[derive(Clone, Debug)]
pub struct CompiledFlow {
    pub id: ObjectId,
    pub variable_index: usize,
    pub priority: i64,
}

#[derive(Clone, Debug)]
pub struct CompiledControlBinding {
    pub control_id: ObjectId,
    pub target_variable_index: usize,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SimulationDefaults {
    pub initial_time: f64,
    pub time_delta: f64,
    pub steps: usize,
}

impl Default for SimulationDefaults {
    fn default() -> Self {
        SimulationDefaults {
            initial_time: 0.0,
            time_delta: 1.0,
            steps: 10,
        }
    }
}

/// The immutable artifact produced by `crate::compiler::compile`. Consumers
/// only ever see this through accessors; there is no public mutation path.
#[derive(Clone, Debug)]
pub struct CompiledModel {
    pub state_variables: Vec<StateVariable>,
    /// `simulation_objects`, in parameter-dependency topological order.
    pub simulation_objects: Vec<SimulationObject>,
    /// Stocks, in implicit stock->stock dependency topological order.
    pub stocks: Vec<CompiledStock>,
    pub flows: Vec<CompiledFlow>,
    /// Variable indices of non-stock, non-flow simulation objects.
    pub auxiliaries: Vec<usize>,
    pub charts: Vec<ObjectId>,
    pub value_bindings: Vec<CompiledControlBinding>,
    pub time_variable_index: usize,
    pub time_delta_variable_index: usize,
    pub simulation_defaults: SimulationDefaults,

    by_id: HashMap<ObjectId, usize>,
    by_name: HashMap<Ident, usize>,
    stock_index_by_id: HashMap<ObjectId, usize>,
}

impl CompiledModel {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        state_variables: Vec<StateVariable>,
        simulation_objects: Vec<SimulationObject>,
        stocks: Vec<CompiledStock>,
        flows: Vec<CompiledFlow>,
        auxiliaries: Vec<usize>,
        charts: Vec<ObjectId>,
        value_bindings: Vec<CompiledControlBinding>,
        time_variable_index: usize,
        time_delta_variable_index: usize,
        simulation_defaults: SimulationDefaults,
    ) -> Self {
        let mut by_id = HashMap::new();
        let mut by_name = HashMap::new();
        for obj in &simulation_objects {
            by_id.insert(obj.id, obj.variable_index);
            by_name.insert(obj.name.clone(), obj.variable_index);
        }
        let mut stock_index_by_id = HashMap::new();
        for (i, s) in stocks.iter().enumerate() {
            stock_index_by_id.insert(s.id, i);
        }
        CompiledModel {
            state_variables,
            simulation_objects,
            stocks,
            flows,
            auxiliaries,
            charts,
            value_bindings,
            time_variable_index,
            time_delta_variable_index,
            simulation_defaults,
            by_id,
            by_name,
            stock_index_by_id,
        }
    }

    pub fn variable(&self, named: &str) -> Option<usize> {
        let canon = crate::common::canonicalize(named);
        self.by_name.get(&canon).copied()
    }

    pub fn variable_index(&self, of: ObjectId) -> Option<usize> {
        self.by_id.get(&of).copied()
    }

    pub fn stock_index(&self, of: ObjectId) -> Option<usize> {
        self.stock_index_by_id.get(&of).copied()
    }

    pub fn graphical_functions(&self) -> impl Iterator<Item = &SimulationObject> {
        self.simulation_objects
            .iter()
            .filter(|o| matches!(o.computation, ComputationKind::GraphicalFunction(..)))
    }

    pub fn value_bindings(&self) -> &[CompiledControlBinding] {
        &self.value_bindings
    }

    pub fn state_variables(&self) -> &[StateVariable] {
        &self.state_variables
    }
}
