// Copyright 2019 The Model Authors. All rights reserved.
// Use of this source code is governed by the Apache License,
// Version 2.0, that can be found in the LICENSE file.

//! The narrow read interface the compiler consumes the design graph through,
//! plus `InMemoryFrame`, the reference implementation used by tests and by
//! anyone embedding this crate without a real project store.

use std::cell::RefCell;
use std::collections::{HashMap, HashSet};

use crate::common::{canonicalize, Error, Ident};
use crate::datamodel::{Object, ObjectId, ObjectType};

/// Read-only queries over a design frame. The compiler and transform pass
/// depend only on this trait; a real embedder's object/graph store implements
/// it directly instead of materializing an `InMemoryFrame`.
pub trait Frame {
    fn object(&self, id: ObjectId) -> Option<&Object>;
    fn objects(&self) -> Box<dyn Iterator<Item = &Object> + '_>;

    fn object_by_name(&self, name: &str) -> Option<&Object> {
        let canon = canonicalize(name);
        self.objects().find(|o| o.name.as_deref() == Some(canon.as_str()))
    }

    fn named_objects(&self) -> Vec<&Object> {
        self.objects().filter(|o| o.name.is_some()).collect()
    }

    /// Nodes that participate directly in simulation (Stock, Flow, Auxiliary,
    /// GraphicalFunction, Delay).
    fn simulation_nodes(&self) -> Vec<&Object> {
        self.objects()
            .filter(|o| o.kind.is_simulation_node())
            .collect()
    }

    fn charts(&self) -> Vec<&Object> {
        self.objects().filter(|o| o.kind == ObjectType::Chart).collect()
    }

    fn value_bindings(&self) -> Vec<&Object> {
        self.objects()
            .filter(|o| o.kind == ObjectType::ValueBinding)
            .collect()
    }

    /// Edges of `edge_type` whose `target` is `id`.
    fn incoming(&self, id: ObjectId, edge_type: ObjectType) -> Vec<&Object> {
        self.objects()
            .filter(|o| o.kind == edge_type && o.target == Some(id))
            .collect()
    }

    /// Edges of `edge_type` whose `origin` is `id`.
    fn outgoing(&self, id: ObjectId, edge_type: ObjectType) -> Vec<&Object> {
        self.objects()
            .filter(|o| o.kind == edge_type && o.origin == Some(id))
            .collect()
    }

    fn incoming_parameters(&self, id: ObjectId) -> Vec<&Object> {
        self.incoming(id, ObjectType::Parameter)
    }

    /// Issues attached by the transform pass or compiler; read by callers
    /// that want to inspect state after a transform run without forcing a
    /// full compile.
    fn formula(&self, id: ObjectId) -> Option<&str> {
        self.object(id).and_then(|o| o.attr_string("formula"))
    }
}

/// Topologically sorts `nodes` along edges of `edge_type` (edges point
/// dependency -> dependent, i.e. origin is read before target). Returns the
/// nodes in an order where every dependency precedes its dependents, or
/// `Error::GraphCycle` naming the objects on a cycle.
pub fn topological_sort<F: Frame + ?Sized>(
    frame: &F,
    nodes: &[ObjectId],
    edge_type: ObjectType,
) -> Result<Vec<ObjectId>, Error> {
    let node_set: HashSet<ObjectId> = nodes.iter().cloned().collect();

    // dependency edges: target depends on origin, so origin must come first.
    let mut deps: HashMap<ObjectId, Vec<ObjectId>> = HashMap::new();
    for id in nodes {
        deps.entry(*id).or_insert_with(Vec::new);
    }
    for edge in frame.objects().filter(|o| o.kind == edge_type) {
        if let (Some(origin), Some(target)) = (edge.origin, edge.target) {
            if node_set.contains(&origin) && node_set.contains(&target) {
                deps.entry(target).or_insert_with(Vec::new).push(origin);
            }
        }
    }

    #[derive(Clone, Copy, PartialEq)]
    enum Mark {
        Temp,
        Done,
    }

    let marks: RefCell<HashMap<ObjectId, Mark>> = RefCell::new(HashMap::new());
    let mut order = Vec::with_capacity(nodes.len());

    fn visit(
        id: ObjectId,
        deps: &HashMap<ObjectId, Vec<ObjectId>>,
        marks: &RefCell<HashMap<ObjectId, Mark>>,
        order: &mut Vec<ObjectId>,
        stack: &mut Vec<ObjectId>,
    ) -> Result<(), Error> {
        match marks.borrow().get(&id) {
            Some(Mark::Done) => return Ok(()),
            Some(Mark::Temp) => {
                let cycle_start = stack.iter().position(|&n| n == id).unwrap_or(0);
                return Err(Error::GraphCycle(stack[cycle_start..].to_vec()));
            }
            None => {}
        }
        marks.borrow_mut().insert(id, Mark::Temp);
        stack.push(id);
        for &dep in deps.get(&id).into_iter().flatten() {
            visit(dep, deps, marks, order, stack)?;
        }
        stack.pop();
        marks.borrow_mut().insert(id, Mark::Done);
        order.push(id);
        Ok(())
    }

    for &id in nodes {
        let mut stack = Vec::new();
        visit(id, &deps, &marks, &mut order, &mut stack)?;
    }

    Ok(order)
}

/// In-memory `Frame` implementation used by tests and simple embedders:
/// plain `Vec<Object>` with no external storage.
#[derive(Clone, Debug, Default)]
pub struct InMemoryFrame {
    objects: Vec<Object>,
}

impl InMemoryFrame {
    pub fn new() -> Self {
        InMemoryFrame { objects: Vec::new() }
    }

    pub fn insert(&mut self, object: Object) {
        self.objects.push(object);
    }

    pub fn object_mut(&mut self, id: ObjectId) -> Option<&mut Object> {
        self.objects.iter_mut().find(|o| o.id == id)
    }

    pub fn next_id(&self) -> ObjectId {
        ObjectId(self.objects.iter().map(|o| o.id.0).max().map(|n| n + 1).unwrap_or(0))
    }

    pub fn all_names(&self) -> Vec<Ident> {
        self.objects.iter().filter_map(|o| o.name.clone()).collect()
    }
}

impl Frame for InMemoryFrame {
    fn object(&self, id: ObjectId) -> Option<&Object> {
        self.objects.iter().find(|o| o.id == id)
    }

    fn objects(&self) -> Box<dyn Iterator<Item = &Object> + '_> {
        Box::new(self.objects.iter())
    }
}
