use crate::model::Model;
use crate::store::{Direction, NodeId, NodeKind};
use std::fmt::Write;

/// Renders the subtree under `target`: nodes with kind and execution count,
/// variables with direction, value and validity.
pub fn format_tree(model: &Model, target: NodeId) -> String {
    let mut tracer = Tracer { model, output: String::new() };
    let reg = model.registry();

    if reg.is_alive(target) {
        let path = reg.pathname(target);
        let title = if path.is_empty() { "<root>" } else { path.as_str() };
        let _ = writeln!(tracer.output, "MODEL TREE for '{}':", title);
        let _ = writeln!(tracer.output, "--------------------------------------------------");
        tracer.trace_node(target, "");
    } else {
        let _ = writeln!(tracer.output, "Error: Detached node {:?}", target);
    }
    tracer.output
}

struct Tracer<'a> {
    model: &'a Model,
    output: String,
}

impl<'a> Tracer<'a> {
    fn trace_node(&mut self, node: NodeId, prefix: &str) {
        let reg = self.model.registry();
        let idx = node.index();
        let name = if reg.pathname(node).is_empty() { "<root>" } else { reg.names[idx].as_str() };

        let header = match reg.kinds[idx] {
            NodeKind::Assembly => format!("{} (assembly)", name),
            kind => {
                let label = if kind == NodeKind::Driver { "driver" } else { "component" };
                let stale = if self.model.is_stale(node) { ", stale" } else { "" };
                format!("{} ({}, runs={}{})", name, label, self.model.execution_count(node), stale)
            }
        };
        let _ = writeln!(self.output, "{}{}", prefix, header);

        let vars = &reg.node_vars[idx];
        let children = &reg.children[idx];
        let stem = self.build_child_stem(prefix);
        let total = vars.len() + children.len();

        for (i, &var) in vars.iter().enumerate() {
            let connector = if i + 1 == total { "`-- " } else { "|-- " };
            let arrow = match reg.directions[var.index()] {
                Direction::Input => "in ",
                Direction::Output => "out",
            };
            let flag = if reg.valid[var.index()] { "" } else { " (invalid)" };
            let _ = writeln!(
                self.output,
                "{}{}{} {} = {}{}",
                stem, connector, arrow, reg.var_names[var.index()], reg.values[var.index()], flag
            );
        }
        for (i, &child) in children.iter().enumerate() {
            let connector = if vars.len() + i + 1 == total { "`-- " } else { "|-- " };
            self.trace_node(child, &format!("{}{}", stem, connector));
        }
    }

    fn build_child_stem(&self, current_prefix: &str) -> String {
        current_prefix.replace("`-- ", "    ").replace("|-- ", "|   ")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::component::{FnComponent, VarSpec};

    #[test]
    fn test_tree_lists_nodes_and_validity() {
        let mut model = Model::new();
        let root = model.root();
        let sub = model.add_assembly(root, "sub").unwrap();
        let comp = FnComponent::new(vec![VarSpec::input("a", 1), VarSpec::output("c", 0)], |ctx| {
            let a = ctx.get_i64("a")?;
            ctx.set_output("c", a + 1)
        });
        model.add(sub, "comp", comp).unwrap();

        let before = format_tree(&model, root);
        assert!(before.contains("comp (component, runs=0, stale)"), "{}", before);
        assert!(before.contains("out c = 0 (invalid)"), "{}", before);

        model.run().unwrap();
        let after = format_tree(&model, root);
        assert!(after.contains("`-- comp (component, runs=1)\n"), "{}", after);
        assert!(after.contains("out c = 2\n"), "{}", after);
    }
}
