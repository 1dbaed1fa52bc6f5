// Copyright 2019 The Model Authors. All rights reserved.
// Use of this source code is governed by the Apache License,
// Version 2.0, that can be found in the LICENSE file.

//! Tagged values that flow through attribute maps, literals, and the
//! simulation state vector.

use std::fmt;

use crate::common::{Error, ErrorCode, Result};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ValueType {
    Int,
    Double,
    Bool,
    String,
    Point,
    ArrayOfPoint,
    ArrayOfDouble,
}

impl fmt::Display for ValueType {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let name = match self {
            ValueType::Int => "int",
            ValueType::Double => "double",
            ValueType::Bool => "bool",
            ValueType::String => "string",
            ValueType::Point => "point",
            ValueType::ArrayOfPoint => "array_of_point",
            ValueType::ArrayOfDouble => "array_of_double",
        };
        write!(f, "{}", name)
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum Variant {
    Int(i64),
    Double(f64),
    Bool(bool),
    String(String),
    Point(f64, f64),
    ArrayOfPoint(Vec<(f64, f64)>),
    ArrayOfDouble(Vec<f64>),
}

impl Variant {
    pub fn value_type(&self) -> ValueType {
        match self {
            Variant::Int(_) => ValueType::Int,
            Variant::Double(_) => ValueType::Double,
            Variant::Bool(_) => ValueType::Bool,
            Variant::String(_) => ValueType::String,
            Variant::Point(..) => ValueType::Point,
            Variant::ArrayOfPoint(_) => ValueType::ArrayOfPoint,
            Variant::ArrayOfDouble(_) => ValueType::ArrayOfDouble,
        }
    }

    /// Widens `Int`/`Bool`/`Double` to an `f64`; any other variant is a type
    /// error. Used pervasively by the evaluator, which only ever operates on
    /// numbers once binding has happened.
    pub fn as_double(&self) -> Result<f64> {
        match self {
            Variant::Int(n) => Ok(*n as f64),
            Variant::Double(n) => Ok(*n),
            Variant::Bool(b) => Ok(if *b { 1.0 } else { 0.0 }),
            _ => Err(Error::Model {
                code: ErrorCode::TypeMismatch,
                detail: format!("expected a number, found {}", self.value_type()),
            }),
        }
    }

    pub fn from_double(n: f64) -> Variant {
        Variant::Double(n)
    }
}

impl fmt::Display for Variant {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Variant::Int(n) => write!(f, "{}", n),
            Variant::Double(n) => write!(f, "{}", n),
            Variant::Bool(b) => write!(f, "{}", b),
            Variant::String(s) => write!(f, "{:?}", s),
            Variant::Point(x, y) => write!(f, "({}, {})", x, y),
            Variant::ArrayOfPoint(pts) => write!(f, "{:?}", pts),
            Variant::ArrayOfDouble(xs) => write!(f, "{:?}", xs),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_as_double() {
        assert_eq!(Variant::Int(3).as_double().unwrap(), 3.0);
        assert_eq!(Variant::Bool(true).as_double().unwrap(), 1.0);
        assert_eq!(Variant::Double(2.5).as_double().unwrap(), 2.5);
        assert!(Variant::String("x".to_string()).as_double().is_err());
    }
}
