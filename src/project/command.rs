//! Recordable model-building commands and the macro log that stores them.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::io::{BufRead, BufReader, Write};
use std::path::Path;

use crate::error::{FlowError, Result};
use crate::store::Value;

/// One model edit, addressed entirely by pathname.
///
/// Serialized as a JSON object tagged by `op`, e.g.
/// `{"op":"connect","scope":"sub","src":"comp1.c","dst":"comp4.a"}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Command {
    Assembly { path: String },
    Create { path: String, type_name: String },
    Connect { scope: String, src: String, dst: String },
    Disconnect { scope: String, dst: String },
    Passthrough { scope: String, path: String, alias: String },
    Set { path: String, value: Value },
    Workflow { owner: String, members: Vec<String> },
    Remove { path: String },
}

/// Receives every command that executed successfully.
pub trait CommandRecorder {
    fn record(&mut self, command: &Command);
}

/// In-memory macro, persisted as one JSON command per line.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MacroLog {
    commands: Vec<Command>,
}

impl CommandRecorder for MacroLog {
    fn record(&mut self, command: &Command) {
        self.commands.push(command.clone());
    }
}

impl MacroLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn commands(&self) -> &[Command] {
        &self.commands
    }

    pub fn len(&self) -> usize {
        self.commands.len()
    }

    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }

    /// The macro without `set` commands that a later `set` of the same path overrides.
    pub fn filtered(&self) -> Vec<Command> {
        let mut assigned = HashSet::new();
        let mut kept: Vec<Command> = self
            .commands
            .iter()
            .rev()
            .filter(|cmd| match cmd {
                Command::Set { path, .. } => assigned.insert(path.clone()),
                _ => true,
            })
            .cloned()
            .collect();
        kept.reverse();
        kept
    }

    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let io_err = |e: std::io::Error| FlowError::Config(format!("Failed to write {}: {}", path.display(), e));
        let mut file = std::fs::File::create(path).map_err(io_err)?;
        for cmd in self.filtered() {
            let line = serde_json::to_string(&cmd)
                .map_err(|e| FlowError::Config(format!("Failed to serialize command: {}", e)))?;
            writeln!(file, "{}", line).map_err(io_err)?;
        }
        Ok(())
    }

    /// Reads a saved macro. Blank lines and lines starting with `#` are skipped.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let file = std::fs::File::open(path)
            .map_err(|e| FlowError::Config(format!("Failed to read {}: {}", path.display(), e)))?;
        let mut commands = Vec::new();
        for (i, line) in BufReader::new(file).lines().enumerate() {
            let line = line.map_err(|e| FlowError::Config(format!("Failed to read {}: {}", path.display(), e)))?;
            let trimmed = line.trim();
            if trimmed.is_empty() || trimmed.starts_with('#') {
                continue;
            }
            let cmd = serde_json::from_str(trimmed).map_err(|e| {
                FlowError::Config(format!("{} line {}: {}", path.display(), i + 1, e))
            })?;
            commands.push(cmd);
        }
        Ok(Self { commands })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn set(path: &str, value: i64) -> Command {
        Command::Set { path: path.to_string(), value: Value::Int(value) }
    }

    #[test]
    fn test_wire_format_is_tagged_by_op() {
        let cmd = Command::Connect { scope: "sub".into(), src: "comp1.c".into(), dst: "comp4.a".into() };
        let json = serde_json::to_string(&cmd).unwrap();
        assert_eq!(json, r#"{"op":"connect","scope":"sub","src":"comp1.c","dst":"comp4.a"}"#);

        let parsed: Command = serde_json::from_str(r#"{"op":"set","path":"comp.x","value":2.5}"#).unwrap();
        assert_eq!(parsed, Command::Set { path: "comp.x".into(), value: Value::Scalar(2.5) });
    }

    #[test]
    fn test_filtered_keeps_last_set_per_path() {
        let mut log = MacroLog::new();
        log.record(&Command::Assembly { path: "sub".into() });
        log.record(&set("sub.a", 1));
        log.record(&set("sub.b", 2));
        log.record(&set("sub.a", 3));

        assert_eq!(
            log.filtered(),
            vec![Command::Assembly { path: "sub".into() }, set("sub.b", 2), set("sub.a", 3)]
        );
        assert_eq!(log.len(), 4);
    }

    #[test]
    fn test_save_and_load_skip_comments() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("model.macro");
        let mut log = MacroLog::new();
        log.record(&Command::Assembly { path: "sub".into() });
        log.record(&set("sub.a", 1));
        log.save(&path).unwrap();

        let mut text = std::fs::read_to_string(&path).unwrap();
        text.insert_str(0, "# header\n\n");
        std::fs::write(&path, text).unwrap();
        assert_eq!(MacroLog::load(&path).unwrap(), log);

        std::fs::write(&path, "{\"op\":\"bogus\"}\n").unwrap();
        let err = MacroLog::load(&path).unwrap_err();
        assert!(err.to_string().contains("line 1"), "{}", err);
    }
}
