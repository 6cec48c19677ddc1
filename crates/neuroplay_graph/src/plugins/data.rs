// SPDX-License-Identifier: MIT OR Apache-2.0
//! Data source plugins.

use crate::context::NodeContext;
use crate::error::OperatorError;
use crate::node::{Params, Plugin};
use crate::port::{Port, PortType, PortUpdate, DEFAULT_PORT};
use crate::scheduler::TimerId;
use crate::value::Value;
use std::f64::consts::TAU;
use std::time::Duration;

fn number(value: &Value) -> Result<f64, OperatorError> {
    match value {
        Value::String(text) => text
            .trim()
            .parse()
            .map_err(|_| OperatorError::new(format!("`{text}` is not a number"))),
        other => other
            .as_f64()
            .ok_or_else(|| OperatorError::new(format!("expected number, got {}", other.kind()))),
    }
}

fn param_number(params: &Params, key: &str, fallback: f64) -> Result<f64, OperatorError> {
    params.get(key).map_or(Ok(fallback), number)
}

/// Editable constant that forwards numbers written to it
#[derive(Debug, Clone, Default)]
pub struct NumberSource {
    initial: Option<f64>,
}

impl NumberSource {
    /// Read the optional `value` param
    pub fn from_params(params: &Params) -> Self {
        Self {
            initial: params.get("value").and_then(Value::as_f64),
        }
    }
}

impl Plugin for NumberSource {
    fn ports(&self) -> Vec<Port> {
        let port = Port::new(DEFAULT_PORT)
            .with_input(PortType::Number)
            .with_output(PortType::Number)
            .editable();
        match self.initial {
            Some(value) => vec![port.with_value(value.into())],
            None => vec![port],
        }
    }

    fn operator(
        &mut self,
        _ctx: &mut NodeContext<'_>,
        _port: &str,
        update: &PortUpdate,
    ) -> Result<Option<Value>, OperatorError> {
        number(&update.data).map(|n| Some(n.into()))
    }
}

/// Periodic sine wave source.
///
/// Samples `amplitude * sin(2π * frequency * t)` on the graph clock `rate`
/// times per second and emits each sample on the default port.
#[derive(Debug, Clone)]
pub struct Sine {
    rate: f64,
    frequency: f64,
    amplitude: f64,
    timer: Option<TimerId>,
}

impl Sine {
    /// Read `rate` (Hz, default 60), `frequency` and `amplitude` params
    pub fn from_params(params: &Params) -> Result<Self, OperatorError> {
        let rate = param_number(params, "rate", 60.0)?;
        if !(rate.is_finite() && rate > 0.0) {
            return Err(OperatorError::new(format!("rate must be positive, got {rate}")));
        }
        Ok(Self {
            rate,
            frequency: param_number(params, "frequency", 1.0)?,
            amplitude: param_number(params, "amplitude", 1.0)?,
            timer: None,
        })
    }

    fn sample(&self, ctx: &NodeContext<'_>) -> f64 {
        let frequency = ctx.port_value("frequency").and_then(Value::as_f64).unwrap_or(self.frequency);
        let amplitude = ctx.port_value("amplitude").and_then(Value::as_f64).unwrap_or(self.amplitude);
        amplitude * (TAU * frequency * ctx.now().as_secs_f64()).sin()
    }
}

impl Plugin for Sine {
    fn ports(&self) -> Vec<Port> {
        vec![
            Port::passthrough(DEFAULT_PORT).with_output(PortType::Number),
            Port::new("frequency")
                .with_input(PortType::Number)
                .with_output(PortType::Number)
                .with_value(self.frequency.into())
                .editable(),
            Port::new("amplitude")
                .with_input(PortType::Number)
                .with_output(PortType::Number)
                .with_value(self.amplitude.into())
                .editable(),
        ]
    }

    fn init(&mut self, ctx: &mut NodeContext<'_>) -> Result<(), OperatorError> {
        self.timer = Some(ctx.set_interval(Duration::from_secs_f64(1.0 / self.rate)));
        Ok(())
    }

    fn deinit(&mut self, ctx: &mut NodeContext<'_>) {
        if let Some(timer) = self.timer.take() {
            ctx.cancel_timer(timer);
        }
    }

    fn operator(
        &mut self,
        _ctx: &mut NodeContext<'_>,
        _port: &str,
        update: &PortUpdate,
    ) -> Result<Option<Value>, OperatorError> {
        number(&update.data).map(|n| Some(n.into()))
    }

    fn on_timer(&mut self, ctx: &mut NodeContext<'_>, _timer: TimerId) -> Result<(), OperatorError> {
        let sample = self.sample(ctx);
        ctx.run(DEFAULT_PORT, sample.into());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::edge::Endpoint;
    use crate::graph::Graph;
    use crate::node::{NodeId, Props};
    use std::cell::RefCell;
    use std::rc::Rc;

    fn params(entries: &[(&str, Value)]) -> Params {
        entries.iter().map(|(k, v)| ((*k).to_string(), v.clone())).collect()
    }

    #[test]
    fn test_number_coerces_input() {
        let mut graph = Graph::new("test");
        let source = NumberSource::from_params(&params(&[("value", Value::from(4))]));
        graph.add_plugin("n", "Number", Props::default(), Box::new(source)).unwrap();
        let id = NodeId::new("n");
        assert_eq!(graph.value(&id, DEFAULT_PORT), Some(&Value::from(4)));

        graph.start();
        assert_eq!(graph.push("n", DEFAULT_PORT, " 2.5 ").unwrap(), Some(Value::from(2.5)));
        assert!(graph.push("n", DEFAULT_PORT, "abc").is_err());
        assert_eq!(graph.value(&id, DEFAULT_PORT), Some(&Value::from(2.5)));
    }

    #[test]
    fn test_sine_samples_on_graph_clock() {
        let sine = Sine::from_params(&params(&[("rate", Value::from(4)), ("amplitude", Value::from(2))])).unwrap();
        let mut graph = Graph::new("test");
        graph.add_plugin("sine", "Sine", Props::default(), Box::new(sine)).unwrap();
        let samples = Rc::new(RefCell::new(Vec::new()));
        let sink = samples.clone();
        graph.add_sink(Endpoint::default_port("sine"), move |value| {
            sink.borrow_mut().push(value.as_f64().unwrap());
        });
        graph.start();

        assert_eq!(graph.advance(Duration::from_millis(500)), 2);
        let samples = samples.borrow();
        assert_eq!(samples.len(), 2);
        assert!((samples[0] - 2.0).abs() < 1e-9);
        assert!(samples[1].abs() < 1e-9);
    }

    #[test]
    fn test_sine_stops_after_stop() {
        let sine = Sine::from_params(&Params::new()).unwrap();
        let mut graph = Graph::new("test");
        graph.add_plugin("sine", "Sine", Props::default(), Box::new(sine)).unwrap();
        graph.start();
        assert_eq!(graph.pending_timers(), 1);

        graph.stop();
        assert_eq!(graph.pending_timers(), 0);
        assert_eq!(graph.advance(Duration::from_secs(1)), 0);
    }

    #[test]
    fn test_invalid_rate_is_rejected() {
        assert!(Sine::from_params(&params(&[("rate", Value::from(0))])).is_err());
        assert!(Sine::from_params(&params(&[("rate", Value::from("fast"))])).is_err());
    }
}
