// Copyright 2019 The Model Authors. All rights reserved.
// Use of this source code is governed by the Apache License,
// Version 2.0, that can be found in the LICENSE file.

//! The unbound expression AST produced by the parser, before name
//! resolution and function binding happen in `crate::compiler`.

use crate::common::Ident;
use crate::variant::Variant;

#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub enum UnaryOp {
    Negative,
}

#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Eq,
    Neq,
    Lt,
    Lte,
    Gt,
    Gte,
}

impl UnaryOp {
    /// The name of the `Function` this operator is modelled as — operators
    /// are just named functions, bound the same way a call is.
    pub fn function_name(self) -> &'static str {
        match self {
            UnaryOp::Negative => "__neg__",
        }
    }
}

impl BinaryOp {
    pub fn function_name(self) -> &'static str {
        match self {
            BinaryOp::Add => "__add__",
            BinaryOp::Sub => "__sub__",
            BinaryOp::Mul => "__mul__",
            BinaryOp::Div => "__div__",
            BinaryOp::Mod => "__mod__",
            BinaryOp::Eq => "__eq__",
            BinaryOp::Neq => "__ne__",
            BinaryOp::Lt => "__lt__",
            BinaryOp::Lte => "__le__",
            BinaryOp::Gt => "__gt__",
            BinaryOp::Gte => "__ge__",
        }
    }
}

/// Unbound expression: `variable(name)` is a plain identifier, not yet
/// resolved to a state-vector slot; `call`/operators aren't yet bound to a
/// `Function`.
#[derive(Clone, PartialEq, Debug)]
pub enum Expr {
    Literal(Variant),
    Var(Ident),
    Unary(UnaryOp, Box<Expr>),
    Binary(BinaryOp, Box<Expr>, Box<Expr>),
    Call(Ident, Vec<Expr>),
}

/// Collects the set of free identifiers referenced by an expression,
/// excluding function-call names (those resolve against the builtin/graphical
/// function catalogue, not the state vector).
pub fn free_vars(expr: &Expr) -> std::collections::HashSet<Ident> {
    let mut out = std::collections::HashSet::new();
    fn walk(expr: &Expr, out: &mut std::collections::HashSet<Ident>) {
        match expr {
            Expr::Literal(_) => {}
            Expr::Var(name) => {
                out.insert(name.clone());
            }
            Expr::Unary(_, e) => walk(e, out),
            Expr::Binary(_, l, r) => {
                walk(l, out);
                walk(r, out);
            }
            Expr::Call(_, args) => {
                for a in args {
                    walk(a, out);
                }
            }
        }
    }
    walk(expr, &mut out);
    out
}

/// Renders an `Expr` back into formula text: parsing the rendered text must
/// reproduce an equivalent tree.
pub fn pretty(expr: &Expr) -> String {
    match expr {
        Expr::Literal(v) => v.to_string(),
        Expr::Var(name) => name.clone(),
        Expr::Unary(UnaryOp::Negative, inner) => format!("(-{})", pretty(inner)),
        Expr::Binary(op, l, r) => {
            let sym = match op {
                BinaryOp::Add => "+",
                BinaryOp::Sub => "-",
                BinaryOp::Mul => "*",
                BinaryOp::Div => "/",
                BinaryOp::Mod => "%",
                BinaryOp::Eq => "==",
                BinaryOp::Neq => "!=",
                BinaryOp::Lt => "<",
                BinaryOp::Lte => "<=",
                BinaryOp::Gt => ">",
                BinaryOp::Gte => ">=",
            };
            format!("({} {} {})", pretty(l), sym, pretty(r))
        }
        Expr::Call(name, args) => {
            let rendered: Vec<String> = args.iter().map(pretty).collect();
            format!("{}({})", name, rendered.join(", "))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::iter::FromIterator;

    #[test]
    fn test_free_vars() {
        let expr = Expr::Binary(
            BinaryOp::Add,
            Box::new(Expr::Var("a".to_string())),
            Box::new(Expr::Call(
                "max".to_string(),
                vec![Expr::Var("b".to_string()), Expr::Var("c".to_string())],
            )),
        );
        let expected = std::collections::HashSet::from_iter(
            ["a", "b", "c"].iter().map(|s| s.to_string()),
        );
        assert_eq!(free_vars(&expr), expected);
    }

    #[test]
    fn test_pretty_round_trips_through_the_parser() {
        let expr = Expr::Binary(
            BinaryOp::Add,
            Box::new(Expr::Var("kettle".to_string())),
            Box::new(Expr::Unary(UnaryOp::Negative, Box::new(Expr::Literal(Variant::Double(3.0))))),
        );
        let text = pretty(&expr);
        let reparsed = crate::parser::parse(&text).unwrap().unwrap();
        assert_eq!(reparsed, expr);
    }
}
