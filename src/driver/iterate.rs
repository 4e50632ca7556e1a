//! Fixed-point iteration through a feedback pair of expressions.

use tracing::{debug, info, warn};

use crate::component::{Component, ExecContext, VarSpec};
use crate::config::IterateSettings;
use crate::error::{FlowError, Result};
use crate::expr::CompiledExpression;
use crate::store::{NodeKind, Value};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DriverState {
    Idle,
    Iterating,
    Converged,
    Failed,
}

/// Repeatedly feeds `loop_end` back into `loop_start` and reruns the
/// workflow until the value moves by no more than `tolerance`.
///
/// Both expressions are bound to the driver node, so sibling names such as
/// `comp.x` resolve through the parent scope.
#[derive(Debug)]
pub struct ConvergenceDriver {
    loop_start: Option<CompiledExpression>,
    loop_end: Option<CompiledExpression>,
    settings: IterateSettings,
    state: DriverState,
}

impl Default for ConvergenceDriver {
    fn default() -> Self {
        Self::new()
    }
}

impl ConvergenceDriver {
    pub fn new() -> Self {
        Self::with_settings(&IterateSettings::default())
    }

    /// Uses `settings` as the defaults of the `tolerance` and `max_iteration` inputs.
    pub fn with_settings(settings: &IterateSettings) -> Self {
        Self { loop_start: None, loop_end: None, settings: settings.clone(), state: DriverState::Idle }
    }

    pub fn with_loop(mut self, start: &str, end: &str) -> Result<Self> {
        self.set_loop_start(start)?;
        self.set_loop_end(end)?;
        Ok(self)
    }

    pub fn set_loop_start(&mut self, text: &str) -> Result<()> {
        assign_text(&mut self.loop_start, text)
    }

    pub fn set_loop_end(&mut self, text: &str) -> Result<()> {
        assign_text(&mut self.loop_end, text)
    }

    pub fn state(&self) -> DriverState {
        self.state
    }

    fn iterate(&mut self, ctx: &mut ExecContext<'_>) -> Result<()> {
        let tolerance = ctx.get_f64("tolerance")?;
        let max_iteration = ctx.get_i64("max_iteration")?;
        if max_iteration < 1 {
            return Err(FlowError::structure(ctx.pathname(), "max_iteration must be at least 1"));
        }
        if !(tolerance >= 0.0) {
            return Err(FlowError::structure(ctx.pathname(), "tolerance must be non-negative"));
        }

        let me = ctx.node();
        let (Some(start), Some(end)) = (self.loop_start.as_mut(), self.loop_end.as_mut()) else {
            return Err(FlowError::structure(ctx.pathname(), "loop_start and loop_end must both be set"));
        };
        for expr in [&mut *start, &mut *end] {
            if expr.scope() != Some(me) {
                expr.bind(ctx.model().registry(), me)?;
            }
        }

        let mut previous = end.evaluate(ctx.model(), None)?;
        for i in 1..=max_iteration {
            start.set(ctx.model(), previous.clone(), None)?;
            ctx.run_workflow()?;
            let current = end.evaluate(ctx.model(), None)?;
            ctx.set_output("current_iteration", Value::Int(i))?;

            let delta = distance(&current, &previous)
                .ok_or_else(|| ctx.fail(format!("loop_end must be numeric, got {}", current)))?;
            debug!(driver = %ctx.pathname(), iteration = i, delta, "iterated");
            if delta <= tolerance {
                info!(driver = %ctx.pathname(), iterations = i, "converged");
                self.state = DriverState::Converged;
                return Ok(());
            }
            previous = current;
        }

        warn!(driver = %ctx.pathname(), max_iteration, "no convergence");
        Err(FlowError::Convergence { origin: ctx.pathname().into() })
    }
}

fn assign_text(slot: &mut Option<CompiledExpression>, text: &str) -> Result<()> {
    match slot {
        Some(expr) => expr.set_text(text),
        None => {
            *slot = Some(CompiledExpression::parse(text)?);
            Ok(())
        }
    }
}

/// Largest absolute element-wise difference.
fn distance(a: &Value, b: &Value) -> Option<f64> {
    let (a, b) = (a.to_vec(), b.to_vec());
    if a.len() != b.len() {
        return None;
    }
    Some(a.iter().zip(&b).map(|(x, y)| (x - y).abs()).fold(0.0, f64::max))
}

impl Component for ConvergenceDriver {
    fn variables(&self) -> Vec<VarSpec> {
        vec![
            VarSpec::input("tolerance", self.settings.tolerance),
            VarSpec::input("max_iteration", self.settings.max_iteration),
            VarSpec::output("current_iteration", 0),
        ]
    }

    fn kind(&self) -> NodeKind {
        NodeKind::Driver
    }

    fn execute(&mut self, ctx: &mut ExecContext<'_>) -> Result<()> {
        self.state = DriverState::Iterating;
        let result = self.iterate(ctx);
        if result.is_err() {
            self.state = DriverState::Failed;
        }
        result
    }

    fn expression_texts(&self) -> Vec<String> {
        [&self.loop_start, &self.loop_end]
            .into_iter()
            .flatten()
            .map(|e| e.text().to_string())
            .collect()
    }
}
