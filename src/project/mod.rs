//! Building models from recorded commands.
//!
//! A [`Project`] executes [`Command`]s against its model and hands each one
//! that succeeded to a [`CommandRecorder`]. Replaying a recorded macro into a
//! fresh project rebuilds the same hierarchy, wiring and input values.

pub mod command;
pub mod factory;

pub use command::{Command, CommandRecorder, MacroLog};
pub use factory::ComponentFactory;

use tracing::{debug, warn};

use crate::error::{FlowError, Result};
use crate::model::Model;
use crate::store::NodeId;

pub struct Project<R: CommandRecorder = MacroLog> {
    model: Model,
    factory: ComponentFactory,
    recorder: R,
}

impl<R: CommandRecorder> Project<R> {
    pub fn new(model: Model, factory: ComponentFactory, recorder: R) -> Self {
        Self { model, factory, recorder }
    }

    /// Builds a fresh project by executing `commands` in order.
    pub fn replay(factory: ComponentFactory, commands: &[Command], recorder: R) -> Result<Self> {
        let mut project = Self::new(Model::new(), factory, recorder);
        for (i, cmd) in commands.iter().enumerate() {
            project.command(cmd.clone()).map_err(|err| {
                warn!(line = i + 1, %err, "replay stopped");
                err
            })?;
        }
        Ok(project)
    }

    pub fn model(&self) -> &Model {
        &self.model
    }

    pub fn model_mut(&mut self) -> &mut Model {
        &mut self.model
    }

    pub fn recorder(&self) -> &R {
        &self.recorder
    }

    pub fn into_parts(self) -> (Model, R) {
        (self.model, self.recorder)
    }

    /// Executes `cmd`; only successful commands reach the recorder.
    pub fn command(&mut self, cmd: Command) -> Result<()> {
        self.apply(&cmd)?;
        debug!(?cmd, "recorded");
        self.recorder.record(&cmd);
        Ok(())
    }

    fn node(&self, path: &str) -> Result<NodeId> {
        if path.is_empty() {
            Ok(self.model.root())
        } else {
            self.model.find(path)
        }
    }

    /// Splits `a.b.c` into the node at `a.b` and the name `c`.
    fn parent_and_name<'p>(&self, path: &'p str) -> Result<(NodeId, &'p str)> {
        match path.rsplit_once('.') {
            Some((parent, name)) => Ok((self.node(parent)?, name)),
            None if !path.is_empty() => Ok((self.model.root(), path)),
            None => Err(FlowError::structure("", "empty pathname")),
        }
    }

    fn apply(&mut self, cmd: &Command) -> Result<()> {
        match cmd {
            Command::Assembly { path } => {
                let (parent, name) = self.parent_and_name(path)?;
                self.model.add_assembly(parent, name)?;
            }
            Command::Create { path, type_name } => {
                let (parent, name) = self.parent_and_name(path)?;
                let component = self.factory.create(type_name)?;
                self.model.add_boxed(parent, name, component)?;
            }
            Command::Connect { scope, src, dst } => {
                let scope = self.node(scope)?;
                self.model.connect(scope, src, dst)?;
            }
            Command::Disconnect { scope, dst } => {
                let scope = self.node(scope)?;
                self.model.disconnect(scope, dst)?;
            }
            Command::Passthrough { scope, path, alias } => {
                let scope = self.node(scope)?;
                self.model.create_passthrough(scope, path, alias)?;
            }
            Command::Set { path, value } => {
                let root = self.model.root();
                self.model.set(root, path, value.clone())?;
            }
            Command::Workflow { owner, members } => {
                let owner = self.node(owner)?;
                let members = members.iter().map(|m| self.node(m)).collect::<Result<Vec<_>>>()?;
                self.model.workflow_add(owner, &members)?;
            }
            Command::Remove { path } => {
                let node = self.node(path)?;
                self.model.remove(node)?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::component::{FnComponent, VarSpec};
    use crate::store::Value;

    fn factory() -> ComponentFactory {
        let mut factory = ComponentFactory::new();
        factory.register("Inc", || {
            FnComponent::new(vec![VarSpec::input("x", 0), VarSpec::output("y", 0)], |ctx| {
                let x = ctx.get_i64("x")?;
                ctx.set_output("y", x + 1)
            })
        });
        factory
    }

    fn script() -> Vec<Command> {
        vec![
            Command::Assembly { path: "sub".into() },
            Command::Create { path: "sub.first".into(), type_name: "Inc".into() },
            Command::Create { path: "sub.second".into(), type_name: "Inc".into() },
            Command::Connect { scope: "sub".into(), src: "first.y".into(), dst: "second.x".into() },
            Command::Passthrough { scope: "sub".into(), path: "second.y".into(), alias: "out".into() },
            Command::Set { path: "sub.first.x".into(), value: Value::Int(1) },
            Command::Set { path: "sub.first.x".into(), value: Value::Int(5) },
        ]
    }

    #[test]
    fn test_replay_rebuilds_model() {
        let mut project = Project::replay(factory(), &script(), MacroLog::new()).unwrap();
        project.model_mut().run().unwrap();
        let root = project.model().root();
        assert_eq!(project.model().get(root, "sub.out").unwrap(), Value::Int(7));
        assert_eq!(project.recorder().len(), 7);
        assert_eq!(project.recorder().filtered().len(), 6);
    }

    #[test]
    fn test_failed_command_is_not_recorded() {
        let mut project = Project::new(Model::new(), factory(), MacroLog::new());
        project.command(Command::Assembly { path: "sub".into() }).unwrap();
        let err = project
            .command(Command::Create { path: "sub.x".into(), type_name: "Nope".into() })
            .unwrap_err();
        assert!(matches!(err, FlowError::Structure { .. }));
        assert_eq!(project.recorder().len(), 1);
    }

    #[test]
    fn test_remove_and_workflow_commands() {
        let mut project = Project::replay(factory(), &script(), MacroLog::new()).unwrap();
        project
            .command(Command::Workflow { owner: "sub".into(), members: vec!["sub.second".into(), "sub.first".into()] })
            .unwrap();
        let sub = project.model().find("sub").unwrap();
        assert_eq!(project.model().workflow(sub).map(|w| w.len()), Some(2));

        project.command(Command::Remove { path: "sub.first".into() }).unwrap();
        assert_eq!(project.model().workflow(sub).map(|w| w.len()), Some(1));
        assert!(project.model().find("sub.first").is_err());
    }
}
