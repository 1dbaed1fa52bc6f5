// Copyright 2019 The Model Authors. All rights reserved.
// Use of this source code is governed by the Apache License,
// Version 2.0, that can be found in the LICENSE file.

//! Types describing the external, user-authored design graph. The core
//! never mutates this graph (see `crate::frame`); these are the shapes the
//! compiler reads.

use std::collections::HashMap;
use std::fmt;

use crate::common::Ident;
use crate::variant::Variant;

/// Opaque, stable identifier for a design-graph entity.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ObjectId(pub u64);

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum StructuralKind {
    Node,
    Edge,
    Unstructured,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ObjectType {
    Stock,
    Flow,
    Auxiliary,
    GraphicalFunction,
    Delay,
    Control,
    Chart,
    ChartSeries,
    Simulation,
    Parameter,
    Drains,
    Fills,
    ImplicitFlow,
    ValueBinding,
}

impl ObjectType {
    pub fn structural_kind(self) -> StructuralKind {
        use ObjectType::*;
        match self {
            Parameter | Drains | Fills | ImplicitFlow | ValueBinding => StructuralKind::Edge,
            Stock | Flow | Auxiliary | GraphicalFunction | Delay | Control | Chart
            | ChartSeries | Simulation => StructuralKind::Node,
        }
    }

    pub fn is_edge(self) -> bool {
        self.structural_kind() == StructuralKind::Edge
    }

    /// Node types that participate directly in the simulation: they carry a
    /// computation (formula, graphical function, or delay) and get a slot
    /// in the state vector.
    pub fn is_simulation_node(self) -> bool {
        matches!(
            self,
            ObjectType::Stock
                | ObjectType::Flow
                | ObjectType::Auxiliary
                | ObjectType::GraphicalFunction
                | ObjectType::Delay
        )
    }
}

/// A single entity in the design graph: a node (Stock, Flow, ...) or an edge
/// (Parameter, Drains, Fills, ImplicitFlow, ValueBinding).
#[derive(Clone, Debug, PartialEq)]
pub struct Object {
    pub id: ObjectId,
    pub kind: ObjectType,
    pub name: Option<Ident>,
    pub attributes: HashMap<String, Variant>,
    /// Set only for edges.
    pub origin: Option<ObjectId>,
    /// Set only for edges.
    pub target: Option<ObjectId>,
}

impl Object {
    pub fn attr(&self, key: &str) -> Option<&Variant> {
        self.attributes.get(key)
    }

    pub fn attr_string(&self, key: &str) -> Option<&str> {
        match self.attr(key) {
            Some(Variant::String(s)) => Some(s.as_str()),
            _ => None,
        }
    }

    pub fn attr_double(&self, key: &str) -> Option<f64> {
        match self.attr(key) {
            Some(v) => v.as_double().ok(),
            None => None,
        }
    }

    pub fn attr_bool(&self, key: &str, default: bool) -> bool {
        match self.attr(key) {
            Some(Variant::Bool(b)) => *b,
            _ => default,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum GraphicalFunctionInterpolation {
    Step,
}

impl Default for GraphicalFunctionInterpolation {
    fn default() -> Self {
        GraphicalFunctionInterpolation::Step
    }
}
