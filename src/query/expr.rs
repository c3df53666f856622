//! Arithmetic over named layers.
//!
//! A [`LayerExpr`] is sent to the service as part of a query so that derived layers (for
//! instance a forecast minus a reanalysis) are computed remotely, and can also be evaluated
//! locally over fields that have already been fetched.

use crate::bias::error::BiasError;
use crate::types::grid::GriddedField;
use crate::utils::defined;
use serde::{Serialize, Serializer};
use std::collections::{BTreeSet, HashMap};
use std::fmt;
use std::ops;

/// An arithmetic expression over layer names and constants.
///
/// Expressions are usually built with the arithmetic operators:
///
/// ```
/// use forecast_bias::LayerExpr;
///
/// let difference = LayerExpr::layer("t2m_fc") - LayerExpr::layer("t2m_ra");
/// assert_eq!(difference.to_string(), "(t2m_fc - t2m_ra)");
///
/// let celsius = LayerExpr::layer("t2m_fc") - 273.15;
/// assert_eq!(celsius.to_string(), "(t2m_fc - 273.15)");
/// ```
#[derive(Debug, Clone, PartialEq)]
pub enum LayerExpr {
    Layer(String),
    Constant(f64),
    Add(Box<LayerExpr>, Box<LayerExpr>),
    Sub(Box<LayerExpr>, Box<LayerExpr>),
    Mul(Box<LayerExpr>, Box<LayerExpr>),
    Div(Box<LayerExpr>, Box<LayerExpr>),
}

/// Intermediate result of evaluation. Scalars are only promoted to fields when combined
/// with one, since only then is the grid known.
enum Operand {
    Field(GriddedField),
    Scalar(Option<f64>),
}

impl LayerExpr {
    pub fn layer(name: impl Into<String>) -> Self {
        LayerExpr::Layer(name.into())
    }

    pub fn constant(value: f64) -> Self {
        LayerExpr::Constant(value)
    }

    /// The distinct layer names referenced anywhere in the expression.
    pub fn layer_names(&self) -> BTreeSet<&str> {
        let mut names = BTreeSet::new();
        self.collect_layer_names(&mut names);
        names
    }

    fn collect_layer_names<'a>(&'a self, names: &mut BTreeSet<&'a str>) {
        match self {
            LayerExpr::Layer(name) => {
                names.insert(name.as_str());
            }
            LayerExpr::Constant(_) => {}
            LayerExpr::Add(lhs, rhs)
            | LayerExpr::Sub(lhs, rhs)
            | LayerExpr::Mul(lhs, rhs)
            | LayerExpr::Div(lhs, rhs) => {
                lhs.collect_layer_names(names);
                rhs.collect_layer_names(names);
            }
        }
    }

    /// Evaluates the expression cell by cell over `layers`.
    ///
    /// A cell is missing in the result when it is missing in any referenced layer, when it
    /// divides by zero, or when the arithmetic is not finite.
    ///
    /// # Errors
    ///
    /// * [`BiasError::UnknownLayer`] if a referenced layer is not in `layers`.
    /// * [`BiasError::GridMismatch`] if the referenced layers are on different grids.
    /// * [`BiasError::ConstantExpression`] if the expression references no layer at all.
    pub fn evaluate(
        &self,
        layers: &HashMap<String, GriddedField>,
    ) -> Result<GriddedField, BiasError> {
        match self.evaluate_operand(layers)? {
            Operand::Field(field) => Ok(field),
            Operand::Scalar(_) => Err(BiasError::ConstantExpression(self.to_string())),
        }
    }

    fn evaluate_operand(
        &self,
        layers: &HashMap<String, GriddedField>,
    ) -> Result<Operand, BiasError> {
        let (lhs, rhs, op) = match self {
            LayerExpr::Layer(name) => {
                return layers
                    .get(name)
                    .cloned()
                    .map(Operand::Field)
                    .ok_or_else(|| BiasError::UnknownLayer(name.clone()));
            }
            LayerExpr::Constant(value) => return Ok(Operand::Scalar(defined(*value))),
            LayerExpr::Add(lhs, rhs) => (lhs, rhs, add as CellOp),
            LayerExpr::Sub(lhs, rhs) => (lhs, rhs, sub as CellOp),
            LayerExpr::Mul(lhs, rhs) => (lhs, rhs, mul as CellOp),
            LayerExpr::Div(lhs, rhs) => (lhs, rhs, div as CellOp),
        };

        let lhs = lhs.evaluate_operand(layers)?;
        let rhs = rhs.evaluate_operand(layers)?;
        combine(lhs, rhs, op)
    }
}

type CellOp = fn(f64, f64) -> Option<f64>;

fn add(a: f64, b: f64) -> Option<f64> {
    defined(a + b)
}

fn sub(a: f64, b: f64) -> Option<f64> {
    defined(a - b)
}

fn mul(a: f64, b: f64) -> Option<f64> {
    defined(a * b)
}

fn div(a: f64, b: f64) -> Option<f64> {
    if b == 0.0 {
        None
    } else {
        defined(a / b)
    }
}

fn promote(scalar: Option<f64>, like: &GriddedField) -> GriddedField {
    match scalar {
        Some(value) => GriddedField::filled(*like.grid(), value),
        None => GriddedField::missing(*like.grid()),
    }
}

fn combine(lhs: Operand, rhs: Operand, op: CellOp) -> Result<Operand, BiasError> {
    let field = match (lhs, rhs) {
        (Operand::Scalar(a), Operand::Scalar(b)) => {
            return Ok(Operand::Scalar(a.zip(b).and_then(|(a, b)| op(a, b))));
        }
        (Operand::Field(a), Operand::Field(b)) => a.zip_with(&b, op)?,
        (Operand::Field(a), Operand::Scalar(b)) => a.zip_with(&promote(b, &a), op)?,
        (Operand::Scalar(a), Operand::Field(b)) => promote(a, &b).zip_with(&b, op)?,
    };
    Ok(Operand::Field(field))
}

impl fmt::Display for LayerExpr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let (lhs, symbol, rhs) = match self {
            LayerExpr::Layer(name) => return f.write_str(name),
            LayerExpr::Constant(value) => return write!(f, "{value}"),
            LayerExpr::Add(lhs, rhs) => (lhs, "+", rhs),
            LayerExpr::Sub(lhs, rhs) => (lhs, "-", rhs),
            LayerExpr::Mul(lhs, rhs) => (lhs, "*", rhs),
            LayerExpr::Div(lhs, rhs) => (lhs, "/", rhs),
        };
        write!(f, "({lhs} {symbol} {rhs})")
    }
}

impl Serialize for LayerExpr {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

macro_rules! impl_layer_op {
    ($trait:ident, $method:ident, $variant:ident) => {
        impl ops::$trait for LayerExpr {
            type Output = LayerExpr;

            fn $method(self, rhs: LayerExpr) -> LayerExpr {
                LayerExpr::$variant(Box::new(self), Box::new(rhs))
            }
        }

        impl ops::$trait<f64> for LayerExpr {
            type Output = LayerExpr;

            fn $method(self, rhs: f64) -> LayerExpr {
                LayerExpr::$variant(Box::new(self), Box::new(LayerExpr::Constant(rhs)))
            }
        }
    };
}

impl_layer_op!(Add, add, Add);
impl_layer_op!(Sub, sub, Sub);
impl_layer_op!(Mul, mul, Mul);
impl_layer_op!(Div, div, Div);
