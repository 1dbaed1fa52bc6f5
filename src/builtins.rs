// Copyright 2019 The Model Authors. All rights reserved.
// Use of this source code is governed by the Apache License,
// Version 2.0, that can be found in the LICENSE file.

//! The builtin function catalogue: `Function`, its `Signature`, and the
//! value-owned registry the compiler binds operator/call names against.
//! Reshaped into data (a `Signature` + closure per function) rather than a
//! hand-matched enum, since every call here binds by name at compile time
//! rather than by a fixed AST variant.

use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;

use crate::variant::{ValueType, Variant};

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SignatureError {
    InvalidArity,
    TypeMismatch(Vec<usize>),
}

/// The expected type of each argument: either one entry per fixed position,
/// or a single type every argument of a variadic call must widen to.
#[derive(Clone, Debug)]
pub enum ArgTypes {
    Fixed(Vec<ValueType>),
    Variadic(ValueType),
}

/// Describes how many arguments a `Function` takes, what types those
/// arguments must be, and what it returns.
#[derive(Clone, Debug)]
pub struct Signature {
    pub min_arity: usize,
    pub max_arity: Option<usize>,
    pub arg_types: ArgTypes,
    pub return_type: ValueType,
}

/// Whether a value of type `actual` can stand in for an argument declared as
/// `expected`, mirroring the widening `Variant::as_double` already performs:
/// `Int`/`Bool` are numeric and pass wherever a `Double` is expected.
fn widens_to(expected: ValueType, actual: ValueType) -> bool {
    expected == actual
        || (expected == ValueType::Double && matches!(actual, ValueType::Int | ValueType::Bool))
}

impl Signature {
    pub fn check(&self, arg_count: usize) -> Result<(), SignatureError> {
        let within_max = match self.max_arity {
            Some(max) => arg_count <= max,
            None => true,
        };
        if arg_count >= self.min_arity && within_max {
            Ok(())
        } else {
            Err(SignatureError::InvalidArity)
        }
    }

    /// Validates each argument's value type against the declared signature.
    /// Assumes `check` has already accepted `arg_types.len()`.
    pub fn check_types(&self, arg_types: &[ValueType]) -> Result<(), SignatureError> {
        let mismatched: Vec<usize> = match &self.arg_types {
            ArgTypes::Fixed(expected) => arg_types
                .iter()
                .zip(expected.iter())
                .enumerate()
                .filter(|(_, (actual, expected))| !widens_to(**expected, **actual))
                .map(|(i, _)| i)
                .collect(),
            ArgTypes::Variadic(expected) => arg_types
                .iter()
                .enumerate()
                .filter(|(_, actual)| !widens_to(*expected, **actual))
                .map(|(i, _)| i)
                .collect(),
        };
        if mismatched.is_empty() {
            Ok(())
        } else {
            Err(SignatureError::TypeMismatch(mismatched))
        }
    }
}

type Implementation = Rc<dyn Fn(&[Variant]) -> crate::common::Result<Variant>>;

/// A named, callable builtin. Operators (`__add__`, `__neg__`, …) are
/// `Function`s like any other call target.
#[derive(Clone)]
pub struct Function {
    pub name: String,
    pub signature: Signature,
    implementation: Implementation,
}

impl fmt::Debug for Function {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("Function").field("name", &self.name).finish()
    }
}

impl PartialEq for Function {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name
    }
}

impl Function {
    pub fn call(&self, args: &[Variant]) -> crate::common::Result<Variant> {
        (self.implementation)(args)
    }
}

fn args_as_doubles(name: &str, args: &[Variant]) -> crate::common::Result<Vec<f64>> {
    let mut out = Vec::with_capacity(args.len());
    for a in args {
        match a.as_double() {
            Ok(n) => out.push(n),
            Err(_) => {
                return model_err!(
                    TypeMismatch,
                    format!("{}: argument is not numeric", name)
                )
            }
        }
    }
    Ok(out)
}

fn unary(name: &'static str, f: impl Fn(f64) -> f64 + 'static) -> Function {
    let name_owned = name.to_string();
    Function {
        name: name_owned,
        signature: Signature {
            min_arity: 1,
            max_arity: Some(1),
            arg_types: ArgTypes::Fixed(vec![ValueType::Double]),
            return_type: ValueType::Double,
        },
        implementation: Rc::new(move |args| {
            let nums = args_as_doubles(name, args)?;
            Ok(Variant::Double(f(nums[0])))
        }),
    }
}

fn binary(name: &'static str, f: impl Fn(f64, f64) -> f64 + 'static) -> Function {
    Function {
        name: name.to_string(),
        signature: Signature {
            min_arity: 2,
            max_arity: Some(2),
            arg_types: ArgTypes::Fixed(vec![ValueType::Double, ValueType::Double]),
            return_type: ValueType::Double,
        },
        implementation: Rc::new(move |args| {
            let nums = args_as_doubles(name, args)?;
            Ok(Variant::Double(f(nums[0], nums[1])))
        }),
    }
}

fn comparison(name: &'static str, f: impl Fn(f64, f64) -> bool + 'static) -> Function {
    Function {
        name: name.to_string(),
        signature: Signature {
            min_arity: 2,
            max_arity: Some(2),
            arg_types: ArgTypes::Fixed(vec![ValueType::Double, ValueType::Double]),
            return_type: ValueType::Bool,
        },
        implementation: Rc::new(move |args| {
            let nums = args_as_doubles(name, args)?;
            Ok(Variant::Bool(f(nums[0], nums[1])))
        }),
    }
}

fn variadic(name: &'static str, f: impl Fn(&[f64]) -> f64 + 'static) -> Function {
    Function {
        name: name.to_string(),
        signature: Signature {
            min_arity: 1,
            max_arity: None,
            arg_types: ArgTypes::Variadic(ValueType::Double),
            return_type: ValueType::Double,
        },
        implementation: Rc::new(move |args| {
            let nums = args_as_doubles(name, args)?;
            Ok(Variant::Double(f(&nums)))
        }),
    }
}

/// Builds the builtin function registry once at compiler construction. Names
/// are canonical lowercase; operator entries use the `__xxx__` spelling
/// `ast::BinaryOp`/`UnaryOp::function_name` produce. Returned as `Rc<Function>`
/// so the compiler can hand out cheap handles into `model::BoundExpression`
/// without recloning the underlying closure.
pub fn registry() -> HashMap<String, Rc<Function>> {
    let mut m = HashMap::new();

    let mut add = |f: Function| {
        m.insert(f.name.clone(), Rc::new(f));
    };

    add(unary("__neg__", |a| -a));
    add(unary("abs", f64::abs));
    add(unary("floor", f64::floor));
    add(unary("ceiling", f64::ceil));
    add(unary("round", |a| a.round()));

    add(binary("__add__", |a, b| a + b));
    add(binary("__sub__", |a, b| a - b));
    add(binary("__mul__", |a, b| a * b));
    add(binary("__div__", |a, b| a / b));
    add(binary("__mod__", |a, b| a % b));
    add(binary("power", f64::powf));

    add(comparison("__eq__", |a, b| a == b));
    add(comparison("__ne__", |a, b| a != b));
    add(comparison("__lt__", |a, b| a < b));
    add(comparison("__le__", |a, b| a <= b));
    add(comparison("__gt__", |a, b| a > b));
    add(comparison("__ge__", |a, b| a >= b));

    add(variadic("sum", |xs| xs.iter().sum()));
    add(variadic("min", |xs| {
        xs.iter().cloned().fold(f64::INFINITY, f64::min)
    }));
    add(variadic("max", |xs| {
        xs.iter().cloned().fold(f64::NEG_INFINITY, f64::max)
    }));

    m
}

/// Names that refer to state-vector builtins rather than user-authored
/// objects; the compiler allocates these first and they may not be shadowed.
pub const TIME: &str = "time";
pub const TIME_DELTA: &str = "time_delta";

pub fn is_reserved_name(name: &str) -> bool {
    name == TIME || name == TIME_DELTA
}

/// Nearest-point (step) interpolation for a graphical function's points,
/// sorted by `x`; ties prefer the smaller `x_i`. An empty curve evaluates to
/// the origin.
pub fn nearest_point(points: &[(f64, f64)], x: f64) -> f64 {
    let mut best: Option<(f64, f64)> = None;
    for &(px, py) in points {
        let d = (x - px).abs();
        best = match best {
            None => Some((px, py)),
            Some((bx, _)) if d < (x - bx).abs() => Some((px, py)),
            Some((bx, by)) if d == (x - bx).abs() && px < bx => Some((px, py)),
            other => other,
        };
    }
    best.map(|(_, y)| y).unwrap_or(0.0)
}

/// Builds the unary `Function` a `GraphicalFunction` node's computation
/// binds to. `points` should already be sorted by `x`.
pub fn make_graphical_function(name: String, points: Vec<(f64, f64)>) -> Function {
    Function {
        name: name.clone(),
        signature: Signature {
            min_arity: 1,
            max_arity: Some(1),
            arg_types: ArgTypes::Fixed(vec![ValueType::Double]),
            return_type: ValueType::Double,
        },
        implementation: Rc::new(move |args| {
            let x = args_as_doubles(&name, args)?[0];
            Ok(Variant::Double(nearest_point(&points, x)))
        }),
    }
}
