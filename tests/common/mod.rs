#![allow(dead_code)]

use std::cell::RefCell;
use std::rc::Rc;

use hierflow_core::component::{Component, ExecContext, FnComponent, VarSpec};
use hierflow_core::store::NodeKind;
use hierflow_core::Result;

/// Names of executed nodes, in execution order.
pub type ExecLog = Rc<RefCell<Vec<String>>>;

pub fn exec_log() -> ExecLog {
    Rc::new(RefCell::new(Vec::new()))
}

fn short_name(ctx: &ExecContext<'_>) -> String {
    let path = ctx.pathname();
    path.rsplit('.').next().unwrap_or_default().to_string()
}

/// Two integer inputs, two integer outputs: `c = a + b`, `d = a - b`.
pub fn simple() -> FnComponent {
    simple_logged(&exec_log())
}

pub fn simple_logged(log: &ExecLog) -> FnComponent {
    let log = Rc::clone(log);
    FnComponent::new(
        vec![
            VarSpec::input("a", 1),
            VarSpec::input("b", 2),
            VarSpec::output("c", 3),
            VarSpec::output("d", -1),
        ],
        move |ctx| {
            log.borrow_mut().push(short_name(ctx));
            let a = ctx.get_i64("a")?;
            let b = ctx.get_i64("b")?;
            ctx.set_output("c", a + b)?;
            ctx.set_output("d", a - b)
        },
    )
}

/// A driver that records its name, then runs its workflow once.
pub struct DumbDriver {
    pub objectives: Vec<String>,
    log: ExecLog,
}

impl DumbDriver {
    pub fn new(log: &ExecLog) -> Self {
        Self { objectives: Vec::new(), log: Rc::clone(log) }
    }

    pub fn add_objective(&mut self, text: &str) {
        self.objectives.push(text.to_string());
    }
}

impl Component for DumbDriver {
    fn variables(&self) -> Vec<VarSpec> {
        Vec::new()
    }

    fn kind(&self) -> NodeKind {
        NodeKind::Driver
    }

    fn execute(&mut self, ctx: &mut ExecContext<'_>) -> Result<()> {
        self.log.borrow_mut().push(short_name(ctx));
        ctx.run_workflow()
    }

    fn expression_texts(&self) -> Vec<String> {
        self.objectives.clone()
    }
}

/// One float input and one float output, computed by `body`.
pub fn scalar_comp(invar: f64, outvar: f64, body: fn(f64) -> f64) -> FnComponent {
    FnComponent::new(
        vec![VarSpec::input("invar", invar), VarSpec::output("outvar", outvar)],
        move |ctx| {
            let x = ctx.get_f64("invar")?;
            ctx.set_output("outvar", body(x))
        },
    )
}
