// Copyright 2019 The Model Authors. All rights reserved.
// Use of this source code is governed by the Apache License,
// Version 2.0, that can be found in the LICENSE file.

//! Name resolution, cycle detection, and binding: turns a validated `Frame`
//! into a `CompiledModel`. The transform pass (`crate::transform`) must have
//! already run; `compile` re-runs it itself so callers never have to
//! remember the ordering.

use std::collections::{HashMap, HashSet};
use std::rc::Rc;

use crate::ast::{free_vars, Expr};
use crate::builtins::{self, Function, SignatureError};
use crate::common::{Error, Ident, NodeIssue, NodeIssuesError};
use crate::datamodel::{Object, ObjectId, ObjectType};
use crate::frame::{topological_sort, Frame};
use crate::model::{
    BoundExpression, ComputationKind, CompiledControlBinding, CompiledDelay, CompiledFlow,
    CompiledModel, CompiledStock, SimulationDefaults, SimulationObject, SimulationObjectKind,
    StateContent, StateVariable, TimeKind,
};
use crate::transform::{self, Transformed};
use crate::variant::ValueType;

#[cfg(test)]
mod tests;

struct Builder {
    state_variables: Vec<StateVariable>,
    /// name -> state index, populated as each node is compiled in order.
    env: HashMap<Ident, usize>,
    value_types: HashMap<Ident, ValueType>,
    registry: HashMap<String, Rc<Function>>,
}

impl Builder {
    fn allocate(&mut self, content: StateContent, value_type: ValueType, name: Option<Ident>) -> usize {
        let index = self.state_variables.len();
        if let Some(n) = &name {
            self.env.insert(n.clone(), index);
            self.value_types.insert(n.clone(), value_type);
        }
        self.state_variables.push(StateVariable {
            index,
            content,
            value_type,
            name,
        });
        index
    }
}

fn bind_expr(
    expr: &Expr,
    env: &HashMap<Ident, usize>,
    value_types: &HashMap<Ident, ValueType>,
    registry: &HashMap<String, Rc<Function>>,
) -> Result<BoundExpression, NodeIssue> {
    match expr {
        Expr::Literal(v) => Ok(BoundExpression::Literal(v.clone())),
        Expr::Var(name) => {
            let index = *env
                .get(name)
                .ok_or_else(|| NodeIssue::UnknownParameter(name.clone()))?;
            let value_type = *value_types.get(name).unwrap_or(&ValueType::Double);
            Ok(BoundExpression::Var {
                state_index: index,
                value_type,
            })
        }
        Expr::Unary(op, inner) => {
            let f = lookup_function(registry, op.function_name())?;
            let bound = bind_expr(inner, env, value_types, registry)?;
            check_signature(&f, &[bound_value_type(&bound)])?;
            Ok(BoundExpression::Unary(f, Box::new(bound)))
        }
        Expr::Binary(op, l, r) => {
            let f = lookup_function(registry, op.function_name())?;
            let bl = bind_expr(l, env, value_types, registry)?;
            let br = bind_expr(r, env, value_types, registry)?;
            check_signature(&f, &[bound_value_type(&bl), bound_value_type(&br)])?;
            Ok(BoundExpression::Binary(f, Box::new(bl), Box::new(br)))
        }
        Expr::Call(name, args) => {
            let f = lookup_function(registry, name)?;
            let bound_args = args
                .iter()
                .map(|a| bind_expr(a, env, value_types, registry))
                .collect::<Result<Vec<_>, _>>()?;
            let arg_types: Vec<ValueType> = bound_args.iter().map(bound_value_type).collect();
            check_signature(&f, &arg_types)?;
            Ok(BoundExpression::Call(f, bound_args))
        }
    }
}

fn lookup_function(
    registry: &HashMap<String, Rc<Function>>,
    name: &str,
) -> Result<Rc<Function>, NodeIssue> {
    registry
        .get(name)
        .cloned()
        .ok_or_else(|| NodeIssue::UnknownParameter(name.to_string()))
}

/// The value type a bound expression evaluates to: a literal's own type, a
/// variable's resolved type, or a call/operator's declared return type.
fn bound_value_type(expr: &BoundExpression) -> ValueType {
    match expr {
        BoundExpression::Literal(v) => v.value_type(),
        BoundExpression::Var { value_type, .. } => *value_type,
        BoundExpression::Unary(f, _) => f.signature.return_type,
        BoundExpression::Binary(f, _, _) => f.signature.return_type,
        BoundExpression::Call(f, _) => f.signature.return_type,
    }
}

/// Validates both arity and argument value-types against `f`'s signature
/// before an operator/call is bound, per the signature-checking step of the
/// compile algorithm.
fn check_signature(f: &Function, arg_types: &[ValueType]) -> Result<(), NodeIssue> {
    f.signature
        .check(arg_types.len())
        .and_then(|()| f.signature.check_types(arg_types))
        .map_err(signature_error_to_issue)
}

fn signature_error_to_issue(err: SignatureError) -> NodeIssue {
    match err {
        SignatureError::InvalidArity => {
            NodeIssue::ExpressionError(crate::common::ExpressionSyntaxError {
                code: crate::common::ErrorCode::InvalidArity,
                position: 0,
            })
        }
        SignatureError::TypeMismatch(positions) => {
            NodeIssue::ExpressionError(crate::common::ExpressionSyntaxError {
                code: crate::common::ErrorCode::TypeMismatch,
                position: positions.first().copied().unwrap_or(0),
            })
        }
    }
}

/// For a formula-bearing object, computes the free variables that must
/// resolve against incoming `Parameter` edges, binds them, and records
/// `UnknownParameter`/`UnusedInput` issues.
fn compile_formula<F: Frame + ?Sized>(
    frame: &F,
    obj: &Object,
    expr: &Expr,
    builder: &Builder,
    issues: &mut NodeIssuesError,
) -> Option<BoundExpression> {
    let required: HashSet<Ident> = free_vars(expr)
        .into_iter()
        .filter(|n| !builtins::is_reserved_name(n))
        .collect();

    let incoming = frame.incoming_parameters(obj.id);
    let mut incoming_names: HashSet<Ident> = HashSet::new();
    for edge in &incoming {
        if let Some(origin_id) = edge.origin {
            if let Some(name) = frame.object(origin_id).and_then(|o| o.name.clone()) {
                incoming_names.insert(name);
            }
        }
    }

    let mut ok = true;
    for name in &required {
        if !incoming_names.contains(name) {
            issues.push(obj.id, NodeIssue::UnknownParameter(name.clone()));
            ok = false;
        }
    }
    for name in &incoming_names {
        if !required.contains(name) {
            issues.push(obj.id, NodeIssue::UnusedInput(name.clone()));
            ok = false;
        }
    }
    if !ok {
        return None;
    }

    match bind_expr(expr, &builder.env, &builder.value_types, &builder.registry) {
        Ok(b) => Some(b),
        Err(issue) => {
            issues.push(obj.id, issue);
            None
        }
    }
}

fn build_graphical_function(obj: &Object) -> Function {
    let points = match obj.attr("points") {
        Some(crate::variant::Variant::ArrayOfPoint(pts)) => pts.clone(),
        _ => Vec::new(),
    };
    let mut sorted = points;
    sorted.sort_by(|a, b| a.0.partial_cmp(&b.0).unwrap_or(std::cmp::Ordering::Equal));

    let name = format!("graphical_function@{}", obj.id);
    crate::builtins::make_graphical_function(name, sorted)
}

/// Runs the transform pass and the full compile algorithm. Returns the
/// `CompiledModel` or the aggregated issues/cycle error that aborted it.
pub fn compile<F: Frame + ?Sized>(frame: &F) -> Result<CompiledModel, Error> {
    let transformed: Transformed = transform::transform(frame);
    if !transformed.is_empty_issues() {
        return Err(Error::NodeIssues(transformed.issues));
    }

    // Step 1: collect simulation nodes, detect duplicate names.
    let nodes: Vec<&Object> = frame.simulation_nodes();
    let mut issues = NodeIssuesError::default();
    let mut seen_names: HashMap<Ident, ObjectId> = HashMap::new();
    for obj in &nodes {
        if let Some(name) = &obj.name {
            if let Some(&first_id) = seen_names.get(name) {
                issues.push(first_id, NodeIssue::DuplicateName(name.clone()));
                issues.push(obj.id, NodeIssue::DuplicateName(name.clone()));
            } else {
                seen_names.insert(name.clone(), obj.id);
            }
        }
    }
    if !issues.is_empty() {
        return Err(Error::NodeIssues(issues));
    }

    // Step 2: order by parameter dependency.
    let node_ids: Vec<ObjectId> = nodes.iter().map(|o| o.id).collect();
    let ordered_ids = match topological_sort(frame, &node_ids, ObjectType::Parameter) {
        Ok(order) => order,
        Err(Error::GraphCycle(cycle)) => {
            let mut issues = NodeIssuesError::default();
            for id in cycle {
                issues.push(id, NodeIssue::ComputationCycle);
            }
            return Err(Error::NodeIssues(issues));
        }
        Err(e) => return Err(e),
    };

    // Step 3: allocate builtins.
    let mut builder = Builder {
        state_variables: Vec::new(),
        env: HashMap::new(),
        value_types: HashMap::new(),
        registry: builtins::registry(),
    };
    let time_variable_index = builder.allocate(
        StateContent::Builtin(TimeKind::Time),
        ValueType::Double,
        Some(builtins::TIME.to_string()),
    );
    let time_delta_variable_index = builder.allocate(
        StateContent::Builtin(TimeKind::TimeDelta),
        ValueType::Double,
        Some(builtins::TIME_DELTA.to_string()),
    );

    // Step 4: compile each node in order.
    let mut simulation_objects = Vec::with_capacity(ordered_ids.len());
    let mut issues = NodeIssuesError::default();
    for id in &ordered_ids {
        let obj = frame.object(*id).expect("node enumerated by simulation_nodes must exist");
        let name = obj
            .name
            .clone()
            .unwrap_or_else(|| format!("__anon_{}", obj.id));

        let computation = match obj.kind {
            ObjectType::GraphicalFunction => {
                let incoming = frame.incoming_parameters(obj.id);
                if incoming.len() != 1 {
                    issues.push(obj.id, NodeIssue::MissingRequiredParameter);
                    continue;
                }
                let param_name = match incoming[0].origin.and_then(|o| frame.object(o)).and_then(|o| o.name.clone()) {
                    Some(n) => n,
                    None => {
                        issues.push(obj.id, NodeIssue::MissingRequiredParameter);
                        continue;
                    }
                };
                let param_index = match builder.env.get(&param_name) {
                    Some(&idx) => idx,
                    None => {
                        issues.push(obj.id, NodeIssue::UnknownParameter(param_name));
                        continue;
                    }
                };
                let f = Rc::new(build_graphical_function(obj));
                ComputationKind::GraphicalFunction(f, param_index)
            }
            ObjectType::Delay => {
                let incoming = frame.incoming_parameters(obj.id);
                if incoming.len() != 1 {
                    issues.push(obj.id, NodeIssue::MissingRequiredParameter);
                    continue;
                }
                let param_name = match incoming[0].origin.and_then(|o| frame.object(o)).and_then(|o| o.name.clone()) {
                    Some(n) => n,
                    None => {
                        issues.push(obj.id, NodeIssue::MissingRequiredParameter);
                        continue;
                    }
                };
                let param_index = match builder.env.get(&param_name) {
                    Some(&idx) => idx,
                    None => {
                        issues.push(obj.id, NodeIssue::UnknownParameter(param_name));
                        continue;
                    }
                };
                let duration = obj.attr_double("duration").unwrap_or(0.0);
                let initial_value = obj.attr_double("initial_value");
                let queue_index = builder.allocate(
                    StateContent::InternalState(obj.id),
                    ValueType::ArrayOfDouble,
                    None,
                );
                ComputationKind::Delay(CompiledDelay {
                    queue_state_index: queue_index,
                    duration,
                    initial_value,
                    parameter_state_index: param_index,
                    value_type: ValueType::Double,
                })
            }
            _ => {
                let expr = match transformed.parsed.get(id) {
                    Some(e) => e,
                    None => {
                        issues.push(obj.id, NodeIssue::MissingRequiredParameter);
                        continue;
                    }
                };
                match compile_formula(frame, obj, expr, &builder, &mut issues) {
                    Some(bound) => ComputationKind::Formula(bound),
                    None => continue,
                }
            }
        };

        let variable_index = builder.allocate(
            StateContent::Object(obj.id),
            ValueType::Double,
            Some(name.clone()),
        );

        let kind = match obj.kind {
            ObjectType::Stock => SimulationObjectKind::Stock,
            ObjectType::Flow => SimulationObjectKind::Flow,
            _ => SimulationObjectKind::Auxiliary,
        };

        simulation_objects.push(SimulationObject {
            id: obj.id,
            kind,
            variable_index,
            value_type: ValueType::Double,
            computation,
            name,
        });
    }
    if !issues.is_empty() {
        return Err(Error::NodeIssues(issues));
    }

    // Step 5: bucket by node type, preserving topological order.
    let mut flows = Vec::new();
    let mut auxiliaries = Vec::new();
    let mut stock_objs = Vec::new();
    for so in &simulation_objects {
        match so.kind {
            SimulationObjectKind::Stock => stock_objs.push(so.clone()),
            SimulationObjectKind::Flow => {
                let obj = frame.object(so.id).unwrap();
                let priority = obj.attr("priority").and_then(|v| v.as_double().ok()).unwrap_or(0.0) as i64;
                flows.push(CompiledFlow {
                    id: so.id,
                    variable_index: so.variable_index,
                    priority,
                });
            }
            SimulationObjectKind::Auxiliary => auxiliaries.push(so.variable_index),
        }
    }

    // Step 6: sort stocks by the implicit-flow graph.
    let stock_ids: Vec<ObjectId> = stock_objs.iter().map(|s| s.id).collect();
    let delayed_inflow: HashMap<ObjectId, bool> = stock_ids
        .iter()
        .map(|id| {
            let obj = frame.object(*id).unwrap();
            (*id, obj.attr_bool("delayed_inflow", false))
        })
        .collect();
    let sorted_stock_ids = match sort_stocks(&stock_ids, &transformed.implicit_flows, &delayed_inflow) {
        Ok(order) => order,
        Err(cycle) => {
            let mut issues = NodeIssuesError::default();
            for id in cycle {
                issues.push(id, NodeIssue::FlowCycle);
            }
            return Err(Error::NodeIssues(issues));
        }
    };

    // Step 7: assemble CompiledStock for each stock, in the sorted order.
    let mut stocks = Vec::with_capacity(sorted_stock_ids.len());
    for id in &sorted_stock_ids {
        let so = stock_objs.iter().find(|s| s.id == *id).unwrap();
        let obj = frame.object(*id).unwrap();
        let inflow_ids = frame.incoming(*id, ObjectType::Fills);
        let outflow_ids = frame.outgoing(*id, ObjectType::Drains);
        let mut inflows: Vec<usize> = inflow_ids
            .iter()
            .filter_map(|e| e.origin)
            .filter_map(|flow_id| flows.iter().find(|f| f.id == flow_id))
            .map(|f| f.variable_index)
            .collect();
        inflows.sort_unstable();
        inflows.dedup();

        let mut outflow_entries: Vec<&CompiledFlow> = outflow_ids
            .iter()
            .filter_map(|e| e.target)
            .filter_map(|flow_id| flows.iter().find(|f| f.id == flow_id))
            .collect();
        outflow_entries.sort_by_key(|f| f.priority);

        stocks.push(CompiledStock {
            id: *id,
            variable_index: so.variable_index,
            allows_negative: obj.attr_bool("allows_negative", false),
            delayed_inflow: *delayed_inflow.get(id).unwrap_or(&false),
            inflows,
            outflows: outflow_entries.into_iter().map(|f| f.variable_index).collect(),
        });
    }

    // Step 8: value bindings.
    let mut value_bindings = Vec::new();
    for edge in frame.value_bindings() {
        if let (Some(origin), Some(target)) = (edge.origin, edge.target) {
            if let Some(target_index) = simulation_objects
                .iter()
                .find(|o| o.id == target)
                .map(|o| o.variable_index)
            {
                value_bindings.push(CompiledControlBinding {
                    control_id: origin,
                    target_variable_index: target_index,
                });
            }
        }
    }

    // Step 9: defaults.
    let simulation_defaults = frame
        .objects()
        .find(|o| o.kind == ObjectType::Simulation)
        .map(|o| SimulationDefaults {
            initial_time: o.attr_double("initial_time").unwrap_or(0.0),
            time_delta: o.attr_double("time_delta").unwrap_or(1.0),
            steps: o.attr_double("steps").unwrap_or(10.0) as usize,
        })
        .unwrap_or_default();

    let charts: Vec<ObjectId> = frame.charts().iter().map(|o| o.id).collect();

    Ok(CompiledModel::new(
        builder.state_variables,
        simulation_objects,
        stocks,
        flows,
        auxiliaries,
        charts,
        value_bindings,
        time_variable_index,
        time_delta_variable_index,
        simulation_defaults,
    ))
}

/// Topologically sorts stocks along the implicit stock->stock graph. If a
/// cycle is found and every stock on it has `delayed_inflow = true`, the
/// cycle's edges are dropped and the sort retried; otherwise returns the
/// offending node ids.
fn sort_stocks(
    stock_ids: &[ObjectId],
    implicit_flows: &[(ObjectId, ObjectId)],
    delayed_inflow: &HashMap<ObjectId, bool>,
) -> Result<Vec<ObjectId>, Vec<ObjectId>> {
    let mut edges: Vec<(ObjectId, ObjectId)> = implicit_flows.to_vec();

    loop {
        match try_topo_sort(stock_ids, &edges) {
            Ok(order) => return Ok(order),
            Err(cycle) => {
                let all_delayed = cycle.iter().all(|id| *delayed_inflow.get(id).unwrap_or(&false));
                if !all_delayed {
                    return Err(cycle);
                }
                let cycle_set: HashSet<ObjectId> = cycle.iter().cloned().collect();
                edges.retain(|(a, b)| !(cycle_set.contains(a) && cycle_set.contains(b)));
            }
        }
    }
}

fn try_topo_sort(
    nodes: &[ObjectId],
    edges: &[(ObjectId, ObjectId)],
) -> Result<Vec<ObjectId>, Vec<ObjectId>> {
    let mut deps: HashMap<ObjectId, Vec<ObjectId>> = HashMap::new();
    for id in nodes {
        deps.entry(*id).or_insert_with(Vec::new);
    }
    let node_set: HashSet<ObjectId> = nodes.iter().cloned().collect();
    for (origin, target) in edges {
        if node_set.contains(origin) && node_set.contains(target) {
            deps.entry(*target).or_insert_with(Vec::new).push(*origin);
        }
    }

    #[derive(Clone, Copy, PartialEq)]
    enum Mark {
        Temp,
        Done,
    }
    let mut marks: HashMap<ObjectId, Mark> = HashMap::new();
    let mut order = Vec::with_capacity(nodes.len());

    fn visit(
        id: ObjectId,
        deps: &HashMap<ObjectId, Vec<ObjectId>>,
        marks: &mut HashMap<ObjectId, Mark>,
        order: &mut Vec<ObjectId>,
        stack: &mut Vec<ObjectId>,
    ) -> Result<(), Vec<ObjectId>> {
        match marks.get(&id) {
            Some(Mark::Done) => return Ok(()),
            Some(Mark::Temp) => {
                let start = stack.iter().position(|&n| n == id).unwrap_or(0);
                return Err(stack[start..].to_vec());
            }
            None => {}
        }
        marks.insert(id, Mark::Temp);
        stack.push(id);
        for &dep in deps.get(&id).into_iter().flatten() {
            visit(dep, deps, marks, order, stack)?;
        }
        stack.pop();
        marks.insert(id, Mark::Done);
        order.push(id);
        Ok(())
    }

    for &id in nodes {
        let mut stack = Vec::new();
        visit(id, &deps, &mut marks, &mut order, &mut stack)?;
    }
    Ok(order)
}
