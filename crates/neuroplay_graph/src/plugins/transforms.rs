// SPDX-License-Identifier: MIT OR Apache-2.0
//! Transform plugins: arithmetic, thresholds, buffering and indexing.

use crate::context::NodeContext;
use crate::error::OperatorError;
use crate::node::{Params, Plugin};
use crate::port::{Port, PortType, PortUpdate, DEFAULT_PORT};
use crate::value::Value;
use std::collections::VecDeque;

fn expect_number(value: &Value) -> Result<f64, OperatorError> {
    value
        .as_f64()
        .ok_or_else(|| OperatorError::new(format!("expected number, got {}", value.kind())))
}

fn param_number(params: &Params, key: &str, fallback: f64) -> Result<f64, OperatorError> {
    params.get(key).map_or(Ok(fallback), expect_number)
}

fn param_str<'a>(params: &'a Params, key: &str, fallback: &'a str) -> Result<&'a str, OperatorError> {
    match params.get(key) {
        None => Ok(fallback),
        Some(value) => value
            .as_str()
            .ok_or_else(|| OperatorError::new(format!("`{key}` must be a string, got {}", value.kind()))),
    }
}

/// Binary operation applied by [`Arithmetic`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    /// `x + v`
    Add,
    /// `x - v`
    Subtract,
    /// `x * v`
    Multiply,
    /// `x / v`
    Divide,
    /// `x % v`
    Modulo,
    /// `x ^ v`
    Power,
}

impl Operation {
    /// Parse an operation name or symbol
    pub fn parse(name: &str) -> Option<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "add" | "+" => Some(Self::Add),
            "subtract" | "-" => Some(Self::Subtract),
            "multiply" | "*" => Some(Self::Multiply),
            "divide" | "/" => Some(Self::Divide),
            "modulo" | "%" => Some(Self::Modulo),
            "power" | "^" => Some(Self::Power),
            _ => None,
        }
    }

    fn apply(self, x: f64, v: f64) -> Result<f64, OperatorError> {
        match self {
            Self::Add => Ok(x + v),
            Self::Subtract => Ok(x - v),
            Self::Multiply => Ok(x * v),
            Self::Divide | Self::Modulo if v == 0.0 => Err(OperatorError::new("division by zero")),
            Self::Divide => Ok(x / v),
            Self::Modulo => Ok(x % v),
            Self::Power => Ok(x.powf(v)),
        }
    }
}

/// Applies an operation between the input and the `value` port.
/// Arrays are processed element by element.
#[derive(Debug, Clone)]
pub struct Arithmetic {
    operation: Operation,
    operand: f64,
}

impl Arithmetic {
    /// Read `op` (default `add`) and `value` (default 0) params
    pub fn from_params(params: &Params) -> Result<Self, OperatorError> {
        let name = param_str(params, "op", "add")?;
        let operation =
            Operation::parse(name).ok_or_else(|| OperatorError::new(format!("unknown operation `{name}`")))?;
        Ok(Self {
            operation,
            operand: param_number(params, "value", 0.0)?,
        })
    }

    fn apply(&self, input: &Value) -> Result<Value, OperatorError> {
        match input {
            Value::Array(items) => items
                .iter()
                .map(|item| self.apply(item))
                .collect::<Result<Vec<_>, _>>()
                .map(Value::Array),
            other => self.operation.apply(expect_number(other)?, self.operand).map(Value::from),
        }
    }
}

impl Plugin for Arithmetic {
    fn ports(&self) -> Vec<Port> {
        vec![
            Port::new(DEFAULT_PORT).with_output(PortType::Number),
            Port::new("value")
                .with_input(PortType::Number)
                .with_output(PortType::Number)
                .with_value(self.operand.into())
                .editable(),
        ]
    }

    fn operator(
        &mut self,
        _ctx: &mut NodeContext<'_>,
        port: &str,
        update: &PortUpdate,
    ) -> Result<Option<Value>, OperatorError> {
        if port == "value" {
            self.operand = expect_number(&update.data)?;
            return Ok(Some(self.operand.into()));
        }
        self.apply(&update.data).map(Some)
    }
}

/// Comparison used by [`Threshold`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Comparison {
    /// `>`
    Greater,
    /// `>=`
    GreaterOrEqual,
    /// `<`
    Less,
    /// `<=`
    LessOrEqual,
    /// `==`
    Equal,
}

impl Comparison {
    /// Parse a comparison symbol
    pub fn parse(symbol: &str) -> Option<Self> {
        match symbol.trim() {
            ">" => Some(Self::Greater),
            ">=" => Some(Self::GreaterOrEqual),
            "<" => Some(Self::Less),
            "<=" => Some(Self::LessOrEqual),
            "==" | "=" => Some(Self::Equal),
            _ => None,
        }
    }

    fn test(self, x: f64, threshold: f64) -> bool {
        match self {
            Self::Greater => x > threshold,
            Self::GreaterOrEqual => x >= threshold,
            Self::Less => x < threshold,
            Self::LessOrEqual => x <= threshold,
            Self::Equal => (x - threshold).abs() < f64::EPSILON,
        }
    }
}

/// Emits whether the input crosses a threshold.
/// For arrays the most recent (last) element is tested.
#[derive(Debug, Clone)]
pub struct Threshold {
    comparison: Comparison,
    threshold: f64,
}

impl Threshold {
    /// Read `value` (default 0.5) and `comparison` (default `>`) params
    pub fn from_params(params: &Params) -> Result<Self, OperatorError> {
        let symbol = param_str(params, "comparison", ">")?;
        let comparison =
            Comparison::parse(symbol).ok_or_else(|| OperatorError::new(format!("unknown comparison `{symbol}`")))?;
        Ok(Self {
            comparison,
            threshold: param_number(params, "value", 0.5)?,
        })
    }
}

impl Plugin for Threshold {
    fn ports(&self) -> Vec<Port> {
        vec![
            Port::new(DEFAULT_PORT)
                .with_input(PortType::Number)
                .with_output(PortType::Boolean),
            Port::new("value")
                .with_input(PortType::Number)
                .with_output(PortType::Number)
                .with_value(self.threshold.into())
                .editable(),
        ]
    }

    fn operator(
        &mut self,
        _ctx: &mut NodeContext<'_>,
        port: &str,
        update: &PortUpdate,
    ) -> Result<Option<Value>, OperatorError> {
        if port == "value" {
            self.threshold = expect_number(&update.data)?;
            return Ok(Some(self.threshold.into()));
        }
        let sample = match &update.data {
            Value::Array(items) => match items.last() {
                Some(last) => last,
                None => return Ok(None),
            },
            other => other,
        };
        let x = expect_number(sample)?;
        Ok(Some(self.comparison.test(x, self.threshold).into()))
    }
}

/// Keeps the most recent `size` samples and emits them as an array
#[derive(Debug, Clone)]
pub struct Buffer {
    size: usize,
    samples: VecDeque<Value>,
}

impl Buffer {
    /// Read the `size` param (default 10)
    pub fn from_params(params: &Params) -> Result<Self, OperatorError> {
        let size = param_number(params, "size", 10.0)?;
        Ok(Self {
            size: Self::clamp_size(size)?,
            samples: VecDeque::new(),
        })
    }

    fn clamp_size(size: f64) -> Result<usize, OperatorError> {
        if !(size.is_finite() && size >= 1.0) {
            return Err(OperatorError::new(format!("buffer size must be at least 1, got {size}")));
        }
        Ok(size as usize)
    }

    fn trim(&mut self) {
        while self.samples.len() > self.size {
            self.samples.pop_front();
        }
    }
}

impl Plugin for Buffer {
    fn ports(&self) -> Vec<Port> {
        vec![
            Port::new(DEFAULT_PORT).with_output(PortType::Array),
            Port::new("size")
                .with_input(PortType::Number)
                .with_output(PortType::Number)
                .with_value((self.size as f64).into())
                .editable(),
        ]
    }

    fn operator(
        &mut self,
        _ctx: &mut NodeContext<'_>,
        port: &str,
        update: &PortUpdate,
    ) -> Result<Option<Value>, OperatorError> {
        if port == "size" {
            self.size = Self::clamp_size(expect_number(&update.data)?)?;
            self.trim();
            return Ok(Some((self.size as f64).into()));
        }
        match &update.data {
            Value::Array(items) => self.samples.extend(items.iter().cloned()),
            other => self.samples.push_back(other.clone()),
        }
        self.trim();
        Ok(Some(Value::Array(self.samples.iter().cloned().collect())))
    }
}

/// Position selected by [`Index`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Position {
    /// First element
    First,
    /// Last element
    Last,
    /// Element at an offset from the start
    At(usize),
}

impl Position {
    fn parse(value: &Value) -> Result<Self, OperatorError> {
        match value {
            Value::String(text) => match text.trim() {
                "first" => Ok(Self::First),
                "last" => Ok(Self::Last),
                other => other
                    .parse()
                    .map(Self::At)
                    .map_err(|_| OperatorError::new(format!("invalid index `{other}`"))),
            },
            Value::Number(n) if n.is_finite() && *n >= 0.0 => Ok(Self::At(*n as usize)),
            other => Err(OperatorError::new(format!("invalid index of type {}", other.kind()))),
        }
    }

    fn label(self) -> Value {
        match self {
            Self::First => "first".into(),
            Self::Last => "last".into(),
            Self::At(i) => (i as f64).into(),
        }
    }
}

/// Picks one element out of an array
#[derive(Debug, Clone)]
pub struct Index {
    position: Position,
}

impl Index {
    /// Read the `index` param: `"first"`, `"last"` (default) or an offset
    pub fn from_params(params: &Params) -> Result<Self, OperatorError> {
        let position = match params.get("index") {
            Some(value) => Position::parse(value)?,
            None => Position::Last,
        };
        Ok(Self { position })
    }
}

impl Plugin for Index {
    fn ports(&self) -> Vec<Port> {
        vec![
            Port::new(DEFAULT_PORT).with_input(PortType::Array),
            Port::new("index")
                .with_input(PortType::String)
                .with_value(self.position.label())
                .editable(),
        ]
    }

    fn operator(
        &mut self,
        _ctx: &mut NodeContext<'_>,
        port: &str,
        update: &PortUpdate,
    ) -> Result<Option<Value>, OperatorError> {
        if port == "index" {
            self.position = Position::parse(&update.data)?;
            return Ok(Some(self.position.label()));
        }
        let Some(items) = update.data.as_array() else {
            return Ok(Some(update.data.clone()));
        };
        let picked = match self.position {
            Position::First => items.first(),
            Position::Last => items.last(),
            Position::At(i) => items.get(i),
        };
        Ok(picked.cloned())
    }
}
