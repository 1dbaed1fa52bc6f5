// Copyright 2019 The Model Authors. All rights reserved.
// Use of this source code is governed by the Apache License,
// Version 2.0, that can be found in the LICENSE file.

//! Pre-compilation transform passes. These run over a read-only
//! `Frame` and produce a side table the compiler consumes alongside it,
//! rather than mutating the frame in place: a real embedder's object store
//! may cache parsed ASTs and issue markers on its own snapshots, but the
//! core only ever needs the result of that caching, not a way to write it.

use std::collections::{HashMap, HashSet};

use crate::ast::Expr;
use crate::common::{NodeIssue, NodeIssuesError};
use crate::datamodel::{ObjectId, ObjectType};
use crate::frame::Frame;

/// Output of running all transform passes over a frame: parsed formula ASTs
/// keyed by object, the induced stock->stock graph, and any issues found.
#[derive(Default)]
pub struct Transformed {
    /// `None` for objects with no or an empty `formula` attribute.
    pub parsed: HashMap<ObjectId, Expr>,
    /// Stock -> Stock edges synthesized from Drains+Fills through a Flow.
    pub implicit_flows: Vec<(ObjectId, ObjectId)>,
    pub issues: NodeIssuesError,
}

impl Transformed {
    pub fn is_empty_issues(&self) -> bool {
        self.issues.is_empty()
    }
}

/// Runs the full idempotent transform sequence: issue cleaner (implicit --
/// we start from an empty `NodeIssuesError` each run), formula parser pass,
/// implicit flows pass.
pub fn transform<F: Frame + ?Sized>(frame: &F) -> Transformed {
    let mut out = Transformed::default();
    parse_formulas(frame, &mut out);
    synthesize_implicit_flows(frame, &mut out);
    out
}

fn parse_formulas<F: Frame + ?Sized>(frame: &F, out: &mut Transformed) {
    for object in frame.simulation_nodes() {
        let formula = match object.attr_string("formula") {
            Some(f) => f,
            None => continue,
        };
        match crate::parser::parse(formula) {
            Ok(Some(expr)) => {
                out.parsed.insert(object.id, expr);
            }
            Ok(None) => {}
            Err(err) => {
                out.issues.push(object.id, NodeIssue::ExpressionSyntax(err));
            }
        }
    }
}

fn synthesize_implicit_flows<F: Frame + ?Sized>(frame: &F, out: &mut Transformed) {
    let mut seen: HashSet<(ObjectId, ObjectId)> = HashSet::new();
    for flow in frame.objects().filter(|o| o.kind == ObjectType::Flow) {
        let drains = frame.incoming(flow.id, ObjectType::Drains);
        let fills = frame.outgoing(flow.id, ObjectType::Fills);
        for d in &drains {
            if let Some(stock_a) = d.origin {
                for fl in &fills {
                    if let Some(stock_b) = fl.target {
                        if seen.insert((stock_a, stock_b)) {
                            out.implicit_flows.push((stock_a, stock_b));
                        }
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::ErrorCode;
    use crate::datamodel::{Object, ObjectType};
    use crate::frame::InMemoryFrame;
    use crate::variant::Variant;
    use std::collections::HashMap as Map;

    fn node(id: u64, kind: ObjectType, name: &str, formula: Option<&str>) -> Object {
        let mut attributes = Map::new();
        if let Some(f) = formula {
            attributes.insert("formula".to_string(), Variant::String(f.to_string()));
        }
        Object {
            id: ObjectId(id),
            kind,
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
    fn test_parse_formulas_caches_ast_and_reports_syntax_errors() {
        let mut f = InMemoryFrame::new();
        f.insert(node(0, ObjectType::Auxiliary, "good", Some("1 + 2")));
        f.insert(node(1, ObjectType::Auxiliary, "bad", Some("1 + @")));

        let out = transform(&f);
        assert!(out.parsed.contains_key(&ObjectId(0)));
        assert!(!out.parsed.contains_key(&ObjectId(1)));
        let issues = out.issues.issues.get(&ObjectId(1)).unwrap();
        match &issues[0] {
            NodeIssue::ExpressionSyntax(e) => assert_eq!(e.code, ErrorCode::InvalidToken),
            other => panic!("unexpected issue {:?}", other),
        }
    }

    #[test]
    fn test_implicit_flow_synthesized_from_drains_and_fills() {
        let mut f = InMemoryFrame::new();
        f.insert(node(0, ObjectType::Stock, "kettle", Some("1000")));
        f.insert(node(1, ObjectType::Stock, "cup", Some("0")));
        f.insert(node(2, ObjectType::Flow, "pour", Some("100")));
        f.insert(edge(3, ObjectType::Drains, 0, 2));
        f.insert(edge(4, ObjectType::Fills, 2, 1));

        let out = transform(&f);
        assert_eq!(out.implicit_flows, vec![(ObjectId(0), ObjectId(1))]);
    }

    #[test]
    fn test_implicit_flows_pass_is_idempotent() {
        let mut f = InMemoryFrame::new();
        f.insert(node(0, ObjectType::Stock, "a", Some("1")));
        f.insert(node(1, ObjectType::Stock, "b", Some("1")));
        f.insert(node(2, ObjectType::Flow, "f", Some("1")));
        f.insert(edge(3, ObjectType::Drains, 0, 2));
        f.insert(edge(4, ObjectType::Fills, 2, 1));

        let first = transform(&f).implicit_flows;
        let second = transform(&f).implicit_flows;
        assert_eq!(first, second);
    }
}
