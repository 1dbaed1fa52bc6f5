// Copyright 2019 The Model Authors. All rights reserved.
// Use of this source code is governed by the Apache License,
// Version 2.0, that can be found in the LICENSE file.

use super::*;
use crate::common::NodeIssue;
use crate::frame::InMemoryFrame;
use crate::variant::Variant;
use std::collections::HashMap as Map;

fn aux(id: u64, name: &str, formula: &str) -> Object {
    let mut attributes = Map::new();
    attributes.insert("formula".to_string(), Variant::String(formula.to_string()));
    Object {
        id: ObjectId(id),
        kind: ObjectType::Auxiliary,
        name: Some(name.to_string()),
        attributes,
        origin: None,
        target: None,
    }
}

fn stock(id: u64, name: &str, initial: &str) -> Object {
    let mut o = aux(id, name, initial);
    o.kind = ObjectType::Stock;
    o
}

fn flow(id: u64, name: &str, formula: &str, priority: Option<f64>) -> Object {
    let mut o = aux(id, name, formula);
    o.kind = ObjectType::Flow;
    if let Some(p) = priority {
        o.attributes.insert("priority".to_string(), Variant::Double(p));
    }
    o
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

fn param(id: u64, origin: u64, target: u64) -> Object {
    edge(id, ObjectType::Parameter, origin, target)
}

#[test]
fn test_duplicate_names_reported_on_both_objects() {
    let mut f = InMemoryFrame::new();
    f.insert(stock(0, "things", "1"));
    f.insert(stock(1, "things", "2"));
    f.insert(stock(2, "a", "1"));
    f.insert(stock(3, "b", "1"));

    let err = compile(&f).unwrap_err();
    match err {
        Error::NodeIssues(issues) => {
            assert!(issues.issues.contains_key(&ObjectId(0)));
            assert!(issues.issues.contains_key(&ObjectId(1)));
            assert!(matches!(issues.issues[&ObjectId(0)][0], NodeIssue::DuplicateName(_)));
        }
        other => panic!("unexpected {:?}", other),
    }
}

#[test]
fn test_parameter_cycle_is_computation_cycle() {
    let mut f = InMemoryFrame::new();
    f.insert(aux(0, "a", "b + 1"));
    f.insert(aux(1, "b", "a + 1"));
    f.insert(param(2, 1, 0)); // a depends on b
    f.insert(param(3, 0, 1)); // b depends on a

    let err = compile(&f).unwrap_err();
    match err {
        Error::NodeIssues(issues) => {
            assert_eq!(issues.issues.len(), 2);
            for v in issues.issues.values() {
                assert!(matches!(v[0], NodeIssue::ComputationCycle));
            }
        }
        other => panic!("unexpected {:?}", other),
    }
}

#[test]
fn test_unknown_parameter_reported() {
    let mut f = InMemoryFrame::new();
    f.insert(aux(0, "a", "b + 1"));
    // no Parameter edge supplying `b`

    let err = compile(&f).unwrap_err();
    match err {
        Error::NodeIssues(issues) => {
            assert!(matches!(
                issues.issues[&ObjectId(0)][0],
                NodeIssue::UnknownParameter(ref n) if n == "b"
            ));
        }
        other => panic!("unexpected {:?}", other),
    }
}

#[test]
fn test_unused_input_reported() {
    let mut f = InMemoryFrame::new();
    f.insert(aux(0, "a", "1"));
    f.insert(aux(1, "b", "2"));
    f.insert(param(2, 0, 1)); // b has an incoming parameter from a, but never uses it

    let err = compile(&f).unwrap_err();
    match err {
        Error::NodeIssues(issues) => {
            assert!(matches!(
                issues.issues[&ObjectId(1)][0],
                NodeIssue::UnusedInput(ref n) if n == "a"
            ));
        }
        other => panic!("unexpected {:?}", other),
    }
}

#[test]
fn test_simple_kettle_model_compiles() {
    let mut f = InMemoryFrame::new();
    f.insert(stock(0, "kettle", "1000"));
    f.insert(stock(1, "cup", "0"));
    f.insert(flow(2, "pour", "100", None));
    f.insert(edge(3, ObjectType::Drains, 0, 2));
    f.insert(edge(4, ObjectType::Fills, 2, 1));

    let model = compile(&f).unwrap();
    assert_eq!(model.stocks.len(), 2);
    assert_eq!(model.flows.len(), 1);
    let kettle_idx = model.stock_index(ObjectId(0)).unwrap();
    let cup_idx = model.stock_index(ObjectId(1)).unwrap();
    // kettle (the drain source) must precede cup in stock order.
    assert!(kettle_idx < cup_idx);
    assert_eq!(model.stocks[kettle_idx].outflows.len(), 1);
    assert_eq!(model.stocks[cup_idx].inflows.len(), 1);
}

#[test]
fn test_flow_priority_sorts_outflows_ascending() {
    let mut f = InMemoryFrame::new();
    f.insert(stock(0, "src", "5"));
    f.insert(flow(1, "sad", "10", Some(2.0)));
    f.insert(flow(2, "happy", "10", Some(1.0)));
    f.insert(edge(3, ObjectType::Drains, 0, 1));
    f.insert(edge(4, ObjectType::Drains, 0, 2));

    let model = compile(&f).unwrap();
    let src = &model.stocks[model.stock_index(ObjectId(0)).unwrap()];
    let happy_idx = model.variable_index(ObjectId(2)).unwrap();
    let sad_idx = model.variable_index(ObjectId(1)).unwrap();
    assert_eq!(src.outflows, vec![happy_idx, sad_idx]);
}

#[test]
fn test_graphical_function_requires_single_parameter() {
    let mut f = InMemoryFrame::new();
    f.insert(aux(0, "input", "1"));
    let mut gf = Object {
        id: ObjectId(1),
        kind: ObjectType::GraphicalFunction,
        name: Some("curve".to_string()),
        attributes: Map::new(),
        origin: None,
        target: None,
    };
    gf.attributes.insert(
        "points".to_string(),
        Variant::ArrayOfPoint(vec![(1.0, 10.0), (2.0, 20.0)]),
    );
    f.insert(gf);
    f.insert(param(2, 0, 1));

    let model = compile(&f).unwrap();
    let gf_obj = model
        .simulation_objects
        .iter()
        .find(|o| o.id == ObjectId(1))
        .unwrap();
    match &gf_obj.computation {
        ComputationKind::GraphicalFunction(f, param_idx) => {
            assert_eq!(*param_idx, model.variable_index(ObjectId(0)).unwrap());
            assert_eq!(
                f.call(&[Variant::Double(1.2)]).unwrap(),
                Variant::Double(10.0)
            );
        }
        other => panic!("unexpected computation {:?}", other),
    }
}

#[test]
fn test_flow_cycle_without_delayed_inflow_fails() {
    let mut f = InMemoryFrame::new();
    f.insert(stock(0, "a", "1"));
    f.insert(stock(1, "b", "1"));
    f.insert(flow(2, "a_to_b", "1", None));
    f.insert(flow(3, "b_to_a", "1", None));
    f.insert(edge(4, ObjectType::Drains, 0, 2));
    f.insert(edge(5, ObjectType::Fills, 2, 1));
    f.insert(edge(6, ObjectType::Drains, 1, 3));
    f.insert(edge(7, ObjectType::Fills, 3, 0));

    let err = compile(&f).unwrap_err();
    match err {
        Error::NodeIssues(issues) => {
            for v in issues.issues.values() {
                assert!(matches!(v[0], NodeIssue::FlowCycle));
            }
        }
        other => panic!("unexpected {:?}", other),
    }
}

#[test]
fn test_check_signature_reports_type_mismatch_as_expression_error() {
    let reg = crate::builtins::registry();
    let add = reg["__add__"].clone();
    let err = check_signature(&add, &[ValueType::Double, ValueType::String]).unwrap_err();
    match err {
        NodeIssue::ExpressionError(e) => assert_eq!(e.code, crate::common::ErrorCode::TypeMismatch),
        other => panic!("unexpected {:?}", other),
    }
}

#[test]
fn test_flow_cycle_with_delayed_inflow_breaks_cycle() {
    let mut f = InMemoryFrame::new();
    let mut a = stock(0, "a", "1");
    a.attributes.insert("delayed_inflow".to_string(), Variant::Bool(true));
    let mut b = stock(1, "b", "1");
    b.attributes.insert("delayed_inflow".to_string(), Variant::Bool(true));
    f.insert(a);
    f.insert(b);
    f.insert(flow(2, "a_to_b", "1", None));
    f.insert(flow(3, "b_to_a", "1", None));
    f.insert(edge(4, ObjectType::Drains, 0, 2));
    f.insert(edge(5, ObjectType::Fills, 2, 1));
    f.insert(edge(6, ObjectType::Drains, 1, 3));
    f.insert(edge(7, ObjectType::Fills, 3, 0));

    let model = compile(&f).unwrap();
    assert_eq!(model.stocks.len(), 2);
}
