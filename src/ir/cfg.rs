// File: src/ir/cfg.rs
//
// Per-scope control-flow graph in its linearized, interpretable form.
//
// Instructions sit at fixed program counters. Branches name labels, which the
// label table resolves to program counters. Exception and cleanup handlers
// are described by protected regions: half-open pc ranges that name the pc of
// the rescue entry and/or the ensure entry covering them.

use super::instr::Instr;
use ahash::AHashMap;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Branch target, resolved to a program counter by the owning CFG
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Label(pub u32);

impl Label {
    /// Pseudo-label one past the last instruction; jumping there ends the scope
    pub const EXIT: Label = Label(u32::MAX);
}

impl fmt::Display for Label {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if *self == Label::EXIT {
            write!(f, "EXIT")
        } else {
            write!(f, "L{}", self.0)
        }
    }
}

/// A statically known protected range of instructions
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProtectedRegion {
    pub start: usize,
    /// Exclusive
    pub end: usize,
    pub rescuer: Option<usize>,
    pub ensurer: Option<usize>,
}

impl ProtectedRegion {
    pub fn covers(&self, pc: usize) -> bool {
        self.start <= pc && pc < self.end
    }

    fn span(&self) -> usize {
        self.end - self.start
    }
}

#[derive(Debug, Clone)]
pub struct Cfg {
    instrs: Vec<Instr>,
    labels: AHashMap<Label, usize>,
    regions: Vec<ProtectedRegion>,
    registers: usize,
}

impl Cfg {
    pub(crate) fn new(instrs: Vec<Instr>, labels: AHashMap<Label, usize>, regions: Vec<ProtectedRegion>) -> Self {
        let registers = instrs.iter().flat_map(|i| i.registers()).map(|r| r.index() + 1).max().unwrap_or(0);
        Self { instrs, labels, regions, registers }
    }

    pub fn instructions(&self) -> &[Instr] {
        &self.instrs
    }

    pub fn len(&self) -> usize {
        self.instrs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.instrs.is_empty()
    }

    pub fn regions(&self) -> &[ProtectedRegion] {
        &self.regions
    }

    /// Size of the register file a frame of this scope needs
    pub fn register_count(&self) -> usize {
        self.registers
    }

    pub fn target_pc(&self, label: Label) -> Option<usize> {
        if label == Label::EXIT {
            return Some(self.instrs.len());
        }
        self.labels.get(&label).copied()
    }

    /// Pc of the nearest enclosing rescue entry for the instruction at `pc`
    pub fn rescuer_for(&self, pc: usize) -> Option<usize> {
        self.innermost_handler(pc, |r| r.rescuer)
    }

    /// Pc of the nearest enclosing ensure entry for the instruction at `pc`
    pub fn ensurer_for(&self, pc: usize) -> Option<usize> {
        self.innermost_handler(pc, |r| r.ensurer)
    }

    fn innermost_handler<F>(&self, pc: usize, handler: F) -> Option<usize>
    where
        F: Fn(&ProtectedRegion) -> Option<usize>,
    {
        self.regions
            .iter()
            .filter(|r| r.covers(pc))
            .filter_map(|r| handler(r).map(|target| (r.span(), target)))
            .min_by_key(|(span, _)| *span)
            .map(|(_, target)| target)
    }
}

impl fmt::Display for Cfg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut by_pc: Vec<(usize, Label)> = self.labels.iter().map(|(l, pc)| (*pc, *l)).collect();
        by_pc.sort();

        for (pc, instr) in self.instrs.iter().enumerate() {
            for (_, label) in by_pc.iter().filter(|(at, _)| *at == pc) {
                writeln!(f, "  {}:", label)?;
            }
            writeln!(f, "    {:04}  {}", pc, instr)?;
        }
        for region in &self.regions {
            write!(f, "  protect [{}, {})", region.start, region.end)?;
            if let Some(pc) = region.rescuer {
                write!(f, " rescue {:04}", pc)?;
            }
            if let Some(pc) = region.ensurer {
                write!(f, " ensure {:04}", pc)?;
            }
            writeln!(f)?;
        }
        Ok(())
    }
}
