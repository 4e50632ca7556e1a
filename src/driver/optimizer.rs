//! Outer-loop driver delegating the search to a pluggable strategy.

use tracing::{debug, info, warn};

use crate::component::{Component, ExecContext, VarSpec};
use crate::config::DEFAULT_OPTIMIZER_MAX_ITERATIONS;
use crate::error::{FlowError, Result};
use crate::expr::CompiledExpression;
use crate::store::{NodeKind, Value};

/// Proposes the next design point from the current one.
///
/// Returning `Ok(None)` ends the optimization at the current point.
pub trait OptimizerStrategy {
    fn step(&mut self, iteration: i64, design: &[f64], objective: f64, constraints: &[f64]) -> Result<Option<Vec<f64>>>;
}

impl<F> OptimizerStrategy for F
where
    F: FnMut(i64, &[f64], f64, &[f64]) -> Result<Option<Vec<f64>>>,
{
    fn step(&mut self, iteration: i64, design: &[f64], objective: f64, constraints: &[f64]) -> Result<Option<Vec<f64>>> {
        self(iteration, design, objective, constraints)
    }
}

pub struct OptimizerDriver {
    design: Vec<CompiledExpression>,
    objective: Option<CompiledExpression>,
    constraints: Vec<CompiledExpression>,
    strategy: Box<dyn OptimizerStrategy>,
    max_iterations: i64,
}

impl OptimizerDriver {
    pub fn new(strategy: impl OptimizerStrategy + 'static) -> Self {
        Self {
            design: Vec::new(),
            objective: None,
            constraints: Vec::new(),
            strategy: Box::new(strategy),
            max_iterations: DEFAULT_OPTIMIZER_MAX_ITERATIONS,
        }
    }

    /// Default for the `max_iterations` input.
    pub fn with_max_iterations(mut self, max_iterations: i64) -> Self {
        self.max_iterations = max_iterations;
        self
    }

    pub fn add_design_variable(&mut self, text: &str) -> Result<()> {
        self.design.push(CompiledExpression::parse(text)?);
        Ok(())
    }

    pub fn set_objective(&mut self, text: &str) -> Result<()> {
        match &mut self.objective {
            Some(expr) => expr.set_text(text),
            None => {
                self.objective = Some(CompiledExpression::parse(text)?);
                Ok(())
            }
        }
    }

    pub fn add_constraint(&mut self, text: &str) -> Result<()> {
        self.constraints.push(CompiledExpression::parse(text)?);
        Ok(())
    }

    fn expressions_mut(&mut self) -> impl Iterator<Item = &mut CompiledExpression> + '_ {
        self.design.iter_mut().chain(self.objective.as_mut()).chain(self.constraints.iter_mut())
    }
}

fn scalar(ctx: &mut ExecContext<'_>, expr: &mut CompiledExpression) -> Result<f64> {
    let value = expr.evaluate(ctx.model(), None)?;
    value
        .as_f64()
        .ok_or_else(|| ctx.fail(format!("'{}' must evaluate to a number, got {}", expr.text(), value)))
}

impl Component for OptimizerDriver {
    fn variables(&self) -> Vec<VarSpec> {
        vec![
            VarSpec::input("max_iterations", self.max_iterations),
            VarSpec::output("iteration", 0),
            VarSpec::output("objective", 0.0),
        ]
    }

    fn kind(&self) -> NodeKind {
        NodeKind::Driver
    }

    fn execute(&mut self, ctx: &mut ExecContext<'_>) -> Result<()> {
        let max_iterations = ctx.get_i64("max_iterations")?;
        if max_iterations < 1 {
            return Err(FlowError::structure(ctx.pathname(), "max_iterations must be at least 1"));
        }
        if self.design.is_empty() || self.objective.is_none() {
            return Err(FlowError::structure(ctx.pathname(), "an objective and at least one design variable are required"));
        }
        let me = ctx.node();
        for expr in self.expressions_mut() {
            if expr.scope() != Some(me) {
                expr.bind(ctx.model().registry(), me)?;
            }
        }

        for i in 1..=max_iterations {
            ctx.run_workflow()?;
            let design = self.design.iter_mut().map(|e| scalar(ctx, e)).collect::<Result<Vec<_>>>()?;
            let objective = match self.objective.as_mut() {
                Some(expr) => scalar(ctx, expr)?,
                None => return Err(ctx.fail("objective is not set")),
            };
            let constraints = self.constraints.iter_mut().map(|e| scalar(ctx, e)).collect::<Result<Vec<_>>>()?;
            ctx.set_output("iteration", Value::Int(i))?;
            ctx.set_output("objective", objective)?;
            debug!(driver = %ctx.pathname(), iteration = i, objective, "optimizer step");

            let Some(next) = self.strategy.step(i, &design, objective, &constraints)? else {
                info!(driver = %ctx.pathname(), iterations = i, objective, "optimizer finished");
                return Ok(());
            };
            if next.len() != design.len() {
                return Err(ctx.fail(format!(
                    "strategy returned {} values for {} design variables",
                    next.len(),
                    design.len()
                )));
            }
            for (expr, value) in self.design.iter_mut().zip(next) {
                expr.set(ctx.model(), Value::Scalar(value), None)?;
            }
        }

        warn!(driver = %ctx.pathname(), max_iterations, "optimizer did not finish");
        Err(FlowError::Convergence { origin: ctx.pathname().into() })
    }

    fn expression_texts(&self) -> Vec<String> {
        self.design
            .iter()
            .chain(self.objective.as_ref())
            .chain(&self.constraints)
            .map(|e| e.text().to_string())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::component::FnComponent;
    use crate::model::Model;

    fn parabola() -> FnComponent {
        FnComponent::new(
            vec![VarSpec::input("x", 0.0), VarSpec::output("f", 0.0), VarSpec::output("g", 0.0)],
            |ctx| {
                let x = ctx.get_f64("x")?;
                ctx.set_output("f", (x - 3.0) * (x - 3.0))?;
                ctx.set_output("g", x)
            },
        )
    }

    fn unit_steps(_: i64, design: &[f64], objective: f64, _: &[f64]) -> Result<Option<Vec<f64>>> {
        Ok((objective > 0.0).then(|| vec![design[0] + 1.0]))
    }

    fn build(max_iterations: i64) -> (Model, crate::store::NodeId) {
        let mut model = Model::new();
        let root = model.root();
        model.add(root, "comp", parabola()).unwrap();
        let mut driver = OptimizerDriver::new(unit_steps).with_max_iterations(max_iterations);
        driver.add_design_variable("comp.x").unwrap();
        driver.set_objective("comp.f").unwrap();
        driver.add_constraint("comp.g - 10").unwrap();
        let node = model.add(root, "opt", driver).unwrap();
        (model, node)
    }

    #[test]
    fn test_strategy_walks_to_minimum() {
        let (mut model, opt) = build(10);
        let root = model.root();
        model.run().unwrap();
        assert_eq!(model.get(root, "comp.x").unwrap().as_f64(), Some(3.0));
        assert_eq!(model.get(root, "opt.iteration").unwrap(), Value::Int(4));
        assert_eq!(model.execution_count(opt), 1);
    }

    #[test]
    fn test_iteration_limit_is_a_convergence_error() {
        let (mut model, _) = build(2);
        let err = model.run().unwrap_err();
        assert_eq!(err.to_string(), "opt: Max iterations exceeded without convergence.");
    }

    #[test]
    fn test_objective_syntax_error_names_the_driver() {
        let (mut model, opt) = build(10);
        let err = model
            .configure::<OptimizerDriver, _>(opt, |d| d.set_objective("comp.f +"))
            .unwrap_err();
        assert!(err.to_string().starts_with("opt: syntax error in 'comp.f +'"), "{}", err);

        // The previous objective survives a rejected edit.
        model.run().unwrap();
        assert_eq!(model.get(model.root(), "opt.objective").unwrap(), Value::Scalar(0.0));
    }
}
