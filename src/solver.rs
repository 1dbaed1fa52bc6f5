// Copyright 2019 The Model Authors. All rights reserved.
// Use of this source code is governed by the Apache License,
// Version 2.0, that can be found in the LICENSE file.

//! Owns the compiled model and the per-run override table, and advances a
//! simulation state one step at a time. `SolverKind` is a plain tagged sum
//! rather than a trait object; no dynamic dispatch is needed since both
//! integrators share every helper.

use std::collections::HashMap;
use std::rc::Rc;

use crate::builtins::Function;
use crate::common::{Error, Result};
use crate::datamodel::ObjectId;
use crate::model::{
    CompiledModel, CompiledStock, ComputationKind, SimulationObject, SimulationObjectKind,
    StateContent,
};
use crate::variant::Variant;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SolverKind {
    Euler,
    Rk4,
}

/// A `SimulationState`: one Variant per state-variable slot.
pub type State = Vec<Variant>;

pub struct Solver {
    model: Rc<CompiledModel>,
    kind: SolverKind,
    /// variable_index -> override value, re-applied every step so an
    /// Auxiliary override survives past initialization.
    constants: HashMap<usize, f64>,
    /// variable_index -> position in `model.simulation_objects`.
    obj_by_index: HashMap<usize, usize>,
}

impl Solver {
    pub fn new(model: Rc<CompiledModel>, kind: SolverKind) -> Self {
        let obj_by_index = model
            .simulation_objects
            .iter()
            .enumerate()
            .map(|(i, o)| (o.variable_index, i))
            .collect();
        Solver {
            model,
            kind,
            constants: HashMap::new(),
            obj_by_index,
        }
    }

    fn object_for_index(&self, index: usize) -> &SimulationObject {
        &self.model.simulation_objects[self.obj_by_index[&index]]
    }

    /// Builds the initial `SimulationState`. `overrides` are keyed by object
    /// id; an override for an unknown id is an error, and an override on an
    /// Auxiliary is pinned for the lifetime of the run.
    pub fn initialize(
        &mut self,
        initial_time: f64,
        dt: f64,
        overrides: &HashMap<ObjectId, f64>,
    ) -> Result<State> {
        for id in overrides.keys() {
            if self.model.variable_index(*id).is_none() {
                return model_err!(UnknownOverride, format!("override for unknown id {}", id));
            }
        }

        let mut state: State = vec![Variant::Double(0.0); self.model.state_variables.len()];
        for sv in &self.model.state_variables {
            if let StateContent::InternalState(_) = sv.content {
                state[sv.index] = Variant::ArrayOfDouble(Vec::new());
            }
        }
        state[self.model.time_variable_index] = Variant::Double(initial_time);
        state[self.model.time_delta_variable_index] = Variant::Double(dt);

        self.constants.clear();
        for obj in &self.model.simulation_objects {
            if let Some(&val) = overrides.get(&obj.id) {
                state[obj.variable_index] = Variant::Double(val);
                if obj.kind == SimulationObjectKind::Auxiliary {
                    self.constants.insert(obj.variable_index, val);
                }
            } else {
                let value = self.eval_computation(obj, &mut state, initial_time, dt, 0)?;
                state[obj.variable_index] = value;
            }
        }
        Ok(state)
    }

    fn update_builtins(&self, state: &mut State, time: f64, dt: f64) {
        state[self.model.time_variable_index] = Variant::Double(time);
        state[self.model.time_delta_variable_index] = Variant::Double(dt);
    }

    fn update(&self, state: &mut State, time: f64, dt: f64, step: usize) -> Result<()> {
        for &idx in &self.model.auxiliaries {
            if let Some(&val) = self.constants.get(&idx) {
                state[idx] = Variant::Double(val);
                continue;
            }
            let obj = self.object_for_index(idx);
            let value = self.eval_computation(obj, state, time, dt, step)?;
            state[idx] = value;
        }
        for flow in &self.model.flows {
            let obj = self.object_for_index(flow.variable_index);
            let value = self.eval_computation(obj, state, time, dt, step)?;
            state[flow.variable_index] = value;
        }
        Ok(())
    }

    /// Non-negativity arbitration for a single stock. Mutates
    /// `state`'s outflow slots in place with the post-arbitration actuals so
    /// downstream stocks in the same `stock_difference` pass see them.
    fn stock_delta(&self, stock: &CompiledStock, state: &mut State) -> Result<f64> {
        let total_inflow: f64 = stock
            .inflows
            .iter()
            .map(|&idx| state[idx].as_double().unwrap_or(0.0).max(0.0))
            .sum();

        if stock.allows_negative {
            let total_outflow: f64 = stock
                .outflows
                .iter()
                .map(|&idx| state[idx].as_double())
                .collect::<Result<Vec<_>>>()?
                .into_iter()
                .sum();
            Ok(total_inflow - total_outflow)
        } else {
            let stock_value = state[stock.variable_index].as_double()?;
            let mut available = stock_value + total_inflow;
            let mut total_outflow = 0.0;
            for &idx in &stock.outflows {
                let requested = state[idx].as_double()?.max(0.0);
                let actual = available.min(requested);
                available -= actual;
                state[idx] = Variant::Double(actual);
                total_outflow += actual;
            }
            debug_assert!(total_outflow <= stock_value + total_inflow + 1e-9);
            Ok(total_inflow - total_outflow)
        }
    }

    /// Computes the per-stock Δ-vector (already scaled by `dt`) over a copy
    /// of `state`, in stock-dependency order, writing provisional updated
    /// stock values into the copy as it goes. Returns the mutated copy
    /// (exposed for tests that check the mid-step-clamped flow actuals, per
    /// the non-negative-drain scenarios) alongside the deltas.
    pub fn stock_difference(&self, state: &State, _time: f64, dt: f64) -> Result<(State, Vec<f64>)> {
        let mut working = state.clone();
        let mut deltas = Vec::with_capacity(self.model.stocks.len());
        for stock in &self.model.stocks {
            let delta = self.stock_delta(stock, &mut working)?;
            let scaled = delta * dt;
            let new_val = working[stock.variable_index].as_double()? + scaled;
            working[stock.variable_index] = Variant::Double(new_val);
            deltas.push(scaled);
        }
        Ok((working, deltas))
    }

    fn accumulate_stocks(&self, state: &mut State, delta: &[f64]) {
        for (stock, d) in self.model.stocks.iter().zip(delta.iter()) {
            let v = state[stock.variable_index].as_double().unwrap_or(0.0);
            state[stock.variable_index] = Variant::Double(v + d);
        }
    }

    fn offset_stocks(&self, base: &State, delta: &[f64], factor: f64) -> State {
        let mut out = base.clone();
        for (stock, d) in self.model.stocks.iter().zip(delta.iter()) {
            let v = out[stock.variable_index].as_double().unwrap_or(0.0) + factor * d;
            out[stock.variable_index] = Variant::Double(v);
        }
        out
    }

    /// Advances `state` one step of size `dt`, from `current_time` to
    /// `current_time + dt`. Returns the new state.
    pub fn compute(&mut self, state: &State, current_time: f64, dt: f64, step: usize) -> Result<State> {
        match self.kind {
            SolverKind::Euler => self.compute_euler(state, current_time, dt, step),
            SolverKind::Rk4 => self.compute_rk4(state, current_time, dt, step),
        }
    }

    fn compute_euler(&mut self, state: &State, current_time: f64, dt: f64, step: usize) -> Result<State> {
        let new_time = current_time + dt;
        let mut next = state.clone();
        self.update_builtins(&mut next, new_time, dt);
        let (_, delta) = self.stock_difference(&next, new_time, dt)?;
        self.accumulate_stocks(&mut next, &delta);
        self.update(&mut next, new_time, dt, step)?;
        Ok(next)
    }

    /// RK4 does not respect the non-negativity invariant perfectly: each
    /// stage's arbitration happens independently against its own
    /// intermediate state, so the final blended Δ is not itself re-clamped.
    /// Euler is the recommended default for models relying on strict
    /// non-negative stocks.
    fn compute_rk4(&mut self, state: &State, current_time: f64, dt: f64, step: usize) -> Result<State> {
        let half_dt = dt / 2.0;
        let (_, k1) = self.stock_difference(state, current_time, dt)?;

        let s2 = self.offset_stocks(state, &k1, half_dt);
        let (_, k2) = self.stock_difference(&s2, current_time + half_dt, half_dt)?;

        let s3 = self.offset_stocks(state, &k2, half_dt);
        let (_, k3) = self.stock_difference(&s3, current_time + half_dt, half_dt)?;

        let s4 = self.offset_stocks(state, &k3, dt);
        let new_time = current_time + dt;
        let (_, k4) = self.stock_difference(&s4, new_time, dt)?;

        let n = self.model.stocks.len();
        let mut delta = Vec::with_capacity(n);
        for i in 0..n {
            delta.push((dt / 6.0) * (k1[i] + 2.0 * k2[i] + 2.0 * k3[i] + k4[i]));
        }

        let mut next = state.clone();
        self.accumulate_stocks(&mut next, &delta);
        self.update_builtins(&mut next, new_time, dt);
        self.update(&mut next, new_time, dt, step)?;
        Ok(next)
    }

    /// Post-order evaluation of a node's computation against `state`.
    fn eval_computation(
        &self,
        obj: &SimulationObject,
        state: &mut State,
        time: f64,
        dt: f64,
        step: usize,
    ) -> Result<Variant> {
        match &obj.computation {
            ComputationKind::Formula(expr) => {
                let v = eval_bound(expr, state, step, Some(obj.id))?;
                Ok(Variant::Double(v))
            }
            ComputationKind::GraphicalFunction(f, param_idx) => {
                let x = state[*param_idx].as_double()?;
                call_function(f, &[Variant::Double(x)], step, Some(obj.id))
            }
            ComputationKind::Delay(delay) => {
                let param_val = state[delay.parameter_state_index].as_double()?;
                let max_len = (delay.duration / dt.max(std::f64::EPSILON)).ceil() as usize + 1;
                let value = match &mut state[delay.queue_state_index] {
                    Variant::ArrayOfDouble(queue) => {
                        queue.push(param_val);
                        while queue.len() > max_len {
                            queue.remove(0);
                        }
                        if time < delay.duration {
                            match delay.initial_value {
                                Some(v) => v,
                                None => {
                                    return sim_err!(
                                        MissingDelayInitialValue,
                                        step,
                                        Some(obj.id),
                                        format!("delay {} has no initial_value", obj.id)
                                    )
                                }
                            }
                        } else if queue.is_empty() {
                            0.0
                        } else {
                            queue.remove(0)
                        }
                    }
                    _ => unreachable!("delay queue slot must be ArrayOfDouble"),
                };
                Ok(Variant::Double(value))
            }
        }
    }
}

fn call_function(
    f: &Function,
    args: &[Variant],
    step: usize,
    object: Option<ObjectId>,
) -> Result<Variant> {
    f.call(args).map_err(|e| match e {
        Error::Model { code, detail } => Error::Simulation {
            code,
            step,
            object,
            detail,
        },
        other => other,
    })
}

/// Evaluates a bound expression to a scalar. `object` identifies the owning
/// node, for error attribution only.
fn eval_bound(
    expr: &crate::model::BoundExpression,
    state: &State,
    step: usize,
    object: Option<ObjectId>,
) -> Result<f64> {
    use crate::model::BoundExpression::*;
    match expr {
        Literal(v) => v.as_double().map_err(|e| reattribute(e, step, object)),
        Var { state_index, .. } => state[*state_index]
            .as_double()
            .map_err(|e| reattribute(e, step, object)),
        Unary(f, inner) => {
            let a = eval_bound(inner, state, step, object)?;
            let result = call_function(f, &[Variant::Double(a)], step, object)?;
            result.as_double().map_err(|e| reattribute(e, step, object))
        }
        Binary(f, l, r) => {
            let a = eval_bound(l, state, step, object)?;
            let b = eval_bound(r, state, step, object)?;
            let result = call_function(f, &[Variant::Double(a), Variant::Double(b)], step, object)?;
            result.as_double().map_err(|e| reattribute(e, step, object))
        }
        Call(f, args) => {
            let evaluated = args
                .iter()
                .map(|a| eval_bound(a, state, step, object).map(Variant::Double))
                .collect::<Result<Vec<_>>>()?;
            let result = call_function(f, &evaluated, step, object)?;
            result.as_double().map_err(|e| reattribute(e, step, object))
        }
    }
}

fn reattribute(e: Error, step: usize, object: Option<ObjectId>) -> Error {
    match e {
        Error::Model { code, detail } => Error::Simulation {
            code,
            step,
            object,
            detail,
        },
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compiler::compile;
    use crate::datamodel::{Object, ObjectId, ObjectType};
    use crate::frame::InMemoryFrame;
    use std::collections::HashMap as Map;

    fn stock(id: u64, name: &str, initial: &str, allows_negative: bool) -> Object {
        let mut attributes = Map::new();
        attributes.insert("formula".to_string(), Variant::String(initial.to_string()));
        attributes.insert("allows_negative".to_string(), Variant::Bool(allows_negative));
        Object {
            id: ObjectId(id),
            kind: ObjectType::Stock,
            name: Some(name.to_string()),
            attributes,
            origin: None,
            target: None,
        }
    }

    fn flow(id: u64, name: &str, formula: &str, priority: f64) -> Object {
        let mut attributes = Map::new();
        attributes.insert("formula".to_string(), Variant::String(formula.to_string()));
        attributes.insert("priority".to_string(), Variant::Double(priority));
        Object {
            id: ObjectId(id),
            kind: ObjectType::Flow,
            name: Some(name.to_string()),
            attributes,
            origin: None,
            target: None,
        }
    }

    fn edge(id: u64, kind: ObjectType, origin: u64, target: u64) -> Object {
        Object {
            id: ObjectId(id),
            kind,
            name: None,
            attributes: Map::new(),
            origin: Some(ObjectId(origin)),
            target: Some(ObjectId(target)),
        }
    }

    #[test]
    fn test_kettle_pours_cup_euler_s2() {
        let mut f = InMemoryFrame::new();
        f.insert(stock(0, "kettle", "1000", true));
        f.insert(stock(1, "cup", "0", true));
        f.insert(flow(2, "pour", "100", 0.0));
        f.insert(edge(3, ObjectType::Drains, 0, 2));
        f.insert(edge(4, ObjectType::Fills, 2, 1));

        let model = Rc::new(compile(&f).unwrap());
        let mut solver = Solver::new(Rc::clone(&model), SolverKind::Euler);
        let state = solver.initialize(1.0, 1.0, &Map::new()).unwrap();

        let kettle = model.variable_index(ObjectId(0)).unwrap();
        let cup = model.variable_index(ObjectId(1)).unwrap();
        assert_eq!(state[kettle].as_double().unwrap(), 1000.0);
        assert_eq!(state[cup].as_double().unwrap(), 0.0);

        let state = solver.compute(&state, 1.0, 1.0, 1).unwrap();
        assert_eq!(state[kettle].as_double().unwrap(), 900.0);
        assert_eq!(state[cup].as_double().unwrap(), 100.0);

        let state = solver.compute(&state, 2.0, 1.0, 2).unwrap();
        assert_eq!(state[kettle].as_double().unwrap(), 800.0);
        assert_eq!(state[cup].as_double().unwrap(), 200.0);
    }

    #[test]
    fn test_non_negative_drain_clamps_s3() {
        let mut f = InMemoryFrame::new();
        f.insert(stock(0, "stock", "5", false));
        f.insert(flow(1, "flow", "10", 0.0));
        f.insert(edge(2, ObjectType::Drains, 0, 1));

        let model = Rc::new(compile(&f).unwrap());
        let mut solver = Solver::new(Rc::clone(&model), SolverKind::Euler);
        let state = solver.initialize(1.0, 1.0, &Map::new()).unwrap();

        let (working, deltas) = solver.stock_difference(&state, 1.0, 1.0).unwrap();
        assert_eq!(deltas[0], -5.0);
        let flow_idx = model.variable_index(ObjectId(1)).unwrap();
        assert_eq!(working[flow_idx].as_double().unwrap(), 5.0);
    }

    #[test]
    fn test_priority_arbitration_s4() {
        let mut f = InMemoryFrame::new();
        f.insert(stock(0, "src", "5", false));
        f.insert(stock(10, "happy_stock", "0", true));
        f.insert(stock(11, "sad_stock", "0", true));
        f.insert(flow(1, "happy", "10", 1.0));
        f.insert(flow(2, "sad", "10", 2.0));
        f.insert(edge(3, ObjectType::Drains, 0, 1));
        f.insert(edge(4, ObjectType::Drains, 0, 2));
        f.insert(edge(5, ObjectType::Fills, 1, 10));
        f.insert(edge(6, ObjectType::Fills, 2, 11));

        let model = Rc::new(compile(&f).unwrap());
        let mut solver = Solver::new(Rc::clone(&model), SolverKind::Euler);
        let state = solver.initialize(1.0, 1.0, &Map::new()).unwrap();
        let state = solver.compute(&state, 1.0, 1.0, 1).unwrap();

        let src = model.variable_index(ObjectId(0)).unwrap();
        let happy_stock = model.variable_index(ObjectId(10)).unwrap();
        let sad_stock = model.variable_index(ObjectId(11)).unwrap();
        assert_eq!(state[src].as_double().unwrap(), 0.0);
        assert_eq!(state[happy_stock].as_double().unwrap(), 5.0);
        assert_eq!(state[sad_stock].as_double().unwrap(), 0.0);
    }

    #[test]
    fn test_time_builtin_s6() {
        let f = InMemoryFrame::new();
        let model = Rc::new(compile(&f).unwrap());
        let mut solver = Solver::new(Rc::clone(&model), SolverKind::Euler);
        let state = solver.initialize(10.0, 10.0, &Map::new()).unwrap();
        assert_eq!(state[model.time_variable_index].as_double().unwrap(), 10.0);

        let state = solver.compute(&state, 10.0, 10.0, 1).unwrap();
        assert_eq!(state[model.time_variable_index].as_double().unwrap(), 20.0);

        let state = solver.compute(&state, 20.0, 10.0, 2).unwrap();
        assert_eq!(state[model.time_variable_index].as_double().unwrap(), 30.0);
    }

    #[test]
    fn test_unknown_override_is_error() {
        let f = InMemoryFrame::new();
        let model = Rc::new(compile(&f).unwrap());
        let mut solver = Solver::new(Rc::clone(&model), SolverKind::Euler);
        let mut overrides = Map::new();
        overrides.insert(ObjectId(999), 1.0);
        let err = solver.initialize(0.0, 1.0, &overrides).unwrap_err();
        match err {
            Error::Model { code, .. } => assert_eq!(code, crate::common::ErrorCode::UnknownOverride),
            other => panic!("unexpected {:?}", other),
        }
    }
}
