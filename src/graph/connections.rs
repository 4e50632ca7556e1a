use smallvec::SmallVec;
use std::collections::HashMap;

use crate::store::VarId;

/// Variable-to-variable edge table. At most one source per destination.
#[derive(Debug, Clone, Default)]
pub struct Connections {
    source_of: HashMap<VarId, VarId>,
    targets: HashMap<VarId, SmallVec<[VarId; 2]>>,
}

impl Connections {
    pub fn source(&self, dst: VarId) -> Option<VarId> {
        self.source_of.get(&dst).copied()
    }

    pub fn targets(&self, src: VarId) -> &[VarId] {
        self.targets.get(&src).map(|t| t.as_slice()).unwrap_or(&[])
    }

    pub fn len(&self) -> usize {
        self.source_of.len()
    }

    pub fn is_empty(&self) -> bool {
        self.source_of.is_empty()
    }

    /// Adds `src -> dst`. On conflict returns the destination's existing source.
    pub fn insert(&mut self, src: VarId, dst: VarId) -> Result<(), VarId> {
        if let Some(existing) = self.source(dst) {
            return Err(existing);
        }
        self.source_of.insert(dst, src);
        self.targets.entry(src).or_default().push(dst);
        Ok(())
    }

    pub fn remove(&mut self, dst: VarId) -> Option<VarId> {
        let src = self.source_of.remove(&dst)?;
        if let Some(list) = self.targets.get_mut(&src) {
            list.retain(|t| *t != dst);
            if list.is_empty() {
                self.targets.remove(&src);
            }
        }
        Some(src)
    }

    /// Drops every edge touching `var`.
    pub fn remove_var(&mut self, var: VarId) {
        self.remove(var);
        if let Some(dsts) = self.targets.remove(&var) {
            for dst in dsts {
                self.source_of.remove(&dst);
            }
        }
    }

    /// `(src, dst)` pairs in no particular order.
    pub fn iter(&self) -> impl Iterator<Item = (VarId, VarId)> + '_ {
        self.source_of.iter().map(|(dst, src)| (*src, *dst))
    }
}
