// Copyright 2019 The Model Authors. All rights reserved.
// Use of this source code is governed by the Apache License,
// Version 2.0, that can be found in the LICENSE file.

//! Drives a `CompiledModel` through time, one `Solver::compute` call per
//! step, and keeps the recorded trace. The trace is kept as a `Vec<State>`
//! (one `Vec<Variant>` per recorded step) rather than a single flat `f64`
//! slab, since a `Delay`'s internal queue slot is not itself an `f64`.

use std::cell::Cell;
use std::collections::HashMap;
use std::rc::Rc;

use crate::common::Result;
use crate::datamodel::ObjectId;
use crate::model::CompiledModel;
use crate::solver::{Solver, SolverKind, State};

type InitializeHook = Box<dyn FnMut(&State)>;
type StepHook = Box<dyn FnMut(usize, f64, &State)>;
type RunHook = Box<dyn FnMut(usize)>;

/// Runs a compiled model step by step and accumulates a trace. Hooks
/// (`on_initialize`/`on_step`/`on_run`) are side-effect only observers; they
/// never see a `&mut State` and cannot perturb the run.
pub struct Simulator {
    model: Rc<CompiledModel>,
    solver: Solver,
    initial_time: f64,
    time_delta: f64,
    current_step: usize,
    current_time: f64,
    current_state: State,
    history: Vec<State>,
    cancel: Option<Rc<Cell<bool>>>,
    on_initialize: Option<InitializeHook>,
    on_step: Option<StepHook>,
    on_run: Option<RunHook>,
}

impl Simulator {
    pub fn new(model: Rc<CompiledModel>, kind: SolverKind) -> Self {
        let solver = Solver::new(Rc::clone(&model), kind);
        let defaults = model.simulation_defaults;
        Simulator {
            model,
            solver,
            initial_time: defaults.initial_time,
            time_delta: defaults.time_delta,
            current_step: 0,
            current_time: defaults.initial_time,
            current_state: Vec::new(),
            history: Vec::new(),
            cancel: None,
            on_initialize: None,
            on_step: None,
            on_run: None,
        }
    }

    pub fn on_initialize(&mut self, hook: impl FnMut(&State) + 'static) {
        self.on_initialize = Some(Box::new(hook));
    }

    pub fn on_step(&mut self, hook: impl FnMut(usize, f64, &State) + 'static) {
        self.on_step = Some(Box::new(hook));
    }

    pub fn on_run(&mut self, hook: impl FnMut(usize) + 'static) {
        self.on_run = Some(Box::new(hook));
    }

    /// Registers a flag a host can flip from elsewhere to cooperatively
    /// cancel a `run` between steps. Each `step` is atomic; cancellation is
    /// only ever observed at a step boundary.
    pub fn set_cancel_flag(&mut self, flag: Rc<Cell<bool>>) {
        self.cancel = Some(flag);
    }

    /// Initializes at the model's own simulation defaults.
    pub fn initialize(&mut self, overrides: &HashMap<ObjectId, f64>) -> Result<()> {
        let defaults = self.model.simulation_defaults;
        self.initialize_with(defaults.initial_time, defaults.time_delta, overrides)
    }

    /// Initializes with an explicitly supplied start time and step size,
    /// overriding the model's own simulation defaults.
    pub fn initialize_with(
        &mut self,
        initial_time: f64,
        time_delta: f64,
        overrides: &HashMap<ObjectId, f64>,
    ) -> Result<()> {
        let state = self.solver.initialize(initial_time, time_delta, overrides)?;
        self.initial_time = initial_time;
        self.time_delta = time_delta;
        self.current_time = initial_time;
        self.current_step = 0;
        self.current_state = state.clone();
        self.history = vec![state];
        if let Some(cb) = self.on_initialize.as_mut() {
            cb(&self.current_state);
        }
        Ok(())
    }

    /// Advances by exactly one `time_delta`.
    pub fn step(&mut self) -> Result<()> {
        let dt = self.time_delta;
        let next_state = self
            .solver
            .compute(&self.current_state, self.current_time, dt, self.current_step + 1)?;
        self.current_time += dt;
        self.current_step += 1;
        self.current_state = next_state.clone();
        self.history.push(next_state);
        if let Some(cb) = self.on_step.as_mut() {
            cb(self.current_step, self.current_time, &self.current_state);
        }
        Ok(())
    }

    /// Runs up to `steps` further steps, stopping early if the cancel flag
    /// (if any) is observed set between steps.
    pub fn run(&mut self, steps: usize) -> Result<()> {
        for _ in 0..steps {
            if let Some(flag) = &self.cancel {
                if flag.get() {
                    break;
                }
            }
            self.step()?;
        }
        if let Some(cb) = self.on_run.as_mut() {
            cb(self.current_step);
        }
        Ok(())
    }

    /// Runs to the model's own configured step count, from scratch.
    pub fn run_to_end(&mut self) -> Result<()> {
        let steps = self.model.simulation_defaults.steps;
        self.run(steps)
    }

    pub fn current_time(&self) -> f64 {
        self.current_time
    }

    pub fn current_step(&self) -> usize {
        self.current_step
    }

    pub fn initial_time(&self) -> f64 {
        self.initial_time
    }

    pub fn time_delta(&self) -> f64 {
        self.time_delta
    }

    pub fn state(&self) -> &State {
        &self.current_state
    }

    pub fn variable(&self, name: &str) -> Option<usize> {
        self.model.variable(name)
    }

    /// The recorded value of `variable_index` at every recorded step so far
    /// (initialization counts as step 0).
    pub fn data_series(&self, variable_index: usize) -> Result<Vec<f64>> {
        self.history
            .iter()
            .map(|state| state[variable_index].as_double())
            .collect()
    }

    /// The recorded simulation time at every recorded step so far.
    pub fn time_points(&self) -> Result<Vec<f64>> {
        self.data_series(self.model.time_variable_index)
    }

    pub fn history_len(&self) -> usize {
        self.history.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compiler::compile;
    use crate::datamodel::{Object, ObjectType};
    use crate::frame::InMemoryFrame;
    use crate::variant::Variant;
    use std::collections::HashMap as Map;

    fn stock(id: u64, name: &str, initial: &str) -> Object {
        let mut attributes = Map::new();
        attributes.insert("formula".to_string(), Variant::String(initial.to_string()));
        attributes.insert("allows_negative".to_string(), Variant::Bool(true));
        Object {
            id: ObjectId(id),
            kind: ObjectType::Stock,
            name: Some(name.to_string()),
            attributes,
            origin: None,
            target: None,
        }
    }

    fn flow(id: u64, name: &str, formula: &str) -> Object {
        let mut attributes = Map::new();
        attributes.insert("formula".to_string(), Variant::String(formula.to_string()));
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

    fn kettle_frame() -> InMemoryFrame {
        let mut f = InMemoryFrame::new();
        f.insert(stock(0, "kettle", "1000"));
        f.insert(stock(1, "cup", "0"));
        f.insert(flow(2, "pour", "100"));
        f.insert(edge(3, ObjectType::Drains, 0, 2));
        f.insert(edge(4, ObjectType::Fills, 2, 1));
        f
    }

    #[test]
    fn test_run_records_full_trace() {
        let f = kettle_frame();
        let model = Rc::new(compile(&f).unwrap());
        let kettle = model.variable_index(ObjectId(0)).unwrap();
        let cup = model.variable_index(ObjectId(1)).unwrap();

        let mut sim = Simulator::new(Rc::clone(&model), SolverKind::Euler);
        sim.initialize_with(1.0, 1.0, &Map::new()).unwrap();
        sim.run(2).unwrap();

        assert_eq!(sim.current_time(), 3.0);
        assert_eq!(sim.current_step(), 2);

        let kettle_series = sim.data_series(kettle).unwrap();
        assert_eq!(kettle_series, vec![1000.0, 900.0, 800.0]);
        let cup_series = sim.data_series(cup).unwrap();
        assert_eq!(cup_series, vec![0.0, 100.0, 200.0]);
        let time_points = sim.time_points().unwrap();
        assert_eq!(time_points, vec![1.0, 2.0, 3.0]);
    }

    #[test]
    fn test_cancel_flag_stops_run_early() {
        let f = kettle_frame();
        let model = Rc::new(compile(&f).unwrap());
        let mut sim = Simulator::new(Rc::clone(&model), SolverKind::Euler);
        sim.initialize_with(0.0, 1.0, &Map::new()).unwrap();

        let cancel = Rc::new(Cell::new(false));
        sim.set_cancel_flag(Rc::clone(&cancel));
        cancel.set(true);
        sim.run(5).unwrap();

        assert_eq!(sim.current_step(), 0);
    }

    #[test]
    fn test_hooks_observe_without_mutating() {
        let f = kettle_frame();
        let model = Rc::new(compile(&f).unwrap());
        let mut sim = Simulator::new(Rc::clone(&model), SolverKind::Euler);

        let steps_seen = Rc::new(Cell::new(0usize));
        let steps_seen_clone = Rc::clone(&steps_seen);
        sim.on_step(move |step, _time, _state| {
            steps_seen_clone.set(step);
        });

        sim.initialize_with(0.0, 1.0, &Map::new()).unwrap();
        sim.run(3).unwrap();
        assert_eq!(steps_seen.get(), 3);
    }
}
