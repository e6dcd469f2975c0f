// File: src/ir/builder.rs
//
// Assembles scopes into a CompilationUnit.
//
// Scopes are declared first so instructions can refer to each other by
// ScopeId, then defined one at a time from a ScopeBuilder. Labels and
// protected regions are resolved to program counters when a scope is
// defined; cross-scope references are checked when the unit is finished.

use super::cfg::{Cfg, Label, ProtectedRegion};
use super::instr::{Instr, Reg};
use super::scope::{CompilationUnit, Scope, ScopeId, ScopeKind};
use ahash::AHashMap;
use std::fmt;

#[derive(Debug, Clone, PartialEq)]
pub enum BuildError {
    UndefinedLabel { scope: String, label: Label },
    DuplicateLabel { scope: String, label: Label },
    InvalidRegion { scope: String, start: Label, end: Label },
    HandlerOutOfRange { scope: String, label: Label },
    UnknownScope { scope: String, target: ScopeId },
    BadCallTarget { scope: String, target: ScopeId, expected: &'static str },
    UndefinedScope { scope: String },
    AlreadyDefined { scope: String },
    ReservedLabel { scope: String },
    RegisterOutOfRange { scope: String, reg: Reg },
}

/// Largest register file a single frame may ask for
pub const MAX_REGISTERS: u32 = 1 << 16;

impl fmt::Display for BuildError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BuildError::UndefinedLabel { scope, label } => write!(f, "in {}: label {} is never placed", scope, label),
            BuildError::DuplicateLabel { scope, label } => write!(f, "in {}: label {} is placed twice", scope, label),
            BuildError::InvalidRegion { scope, start, end } => {
                write!(f, "in {}: protected region {}..{} ends before it starts", scope, start, end)
            }
            BuildError::HandlerOutOfRange { scope, label } => {
                write!(f, "in {}: handler {} does not point at an instruction", scope, label)
            }
            BuildError::UnknownScope { scope, target } => write!(f, "in {}: reference to unknown {}", scope, target),
            BuildError::BadCallTarget { scope, target, expected } => {
                write!(f, "in {}: {} is not a {}", scope, target, expected)
            }
            BuildError::UndefinedScope { scope } => write!(f, "scope {} was declared but never defined", scope),
            BuildError::AlreadyDefined { scope } => write!(f, "scope {} is defined twice", scope),
            BuildError::ReservedLabel { scope } => {
                write!(f, "in {}: label {} is reserved for the scope exit", scope, Label::EXIT.0)
            }
            BuildError::RegisterOutOfRange { scope, reg } => {
                write!(f, "in {}: register {} exceeds the limit of {} registers", scope, reg, MAX_REGISTERS)
            }
        }
    }
}

impl std::error::Error for BuildError {}

/// Protected region expressed in labels
#[derive(Debug, Clone, PartialEq)]
pub struct RegionSpec {
    pub start: Label,
    pub end: Label,
    pub rescue: Option<Label>,
    pub ensure: Option<Label>,
}

/// Instruction stream of one scope under construction
#[derive(Debug, Default)]
pub struct ScopeBuilder {
    instrs: Vec<Instr>,
    placed: Vec<(Label, usize)>,
    regions: Vec<RegionSpec>,
    next_label: u32,
}

impl ScopeBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn new_label(&mut self) -> Label {
        loop {
            let label = Label(self.next_label);
            self.next_label += 1;
            if label != Label::EXIT && !self.placed.iter().any(|(l, _)| *l == label) {
                return label;
            }
        }
    }

    /// Bind `label` to the next emitted instruction
    pub fn place(&mut self, label: Label) -> &mut Self {
        self.placed.push((label, self.instrs.len()));
        self
    }

    /// Append an instruction and return its program counter
    pub fn emit(&mut self, instr: Instr) -> usize {
        self.instrs.push(instr);
        self.instrs.len() - 1
    }

    pub fn region(&mut self, region: RegionSpec) -> &mut Self {
        self.regions.push(region);
        self
    }

    pub fn rescue(&mut self, start: Label, end: Label, handler: Label) -> &mut Self {
        self.region(RegionSpec { start, end, rescue: Some(handler), ensure: None })
    }

    /// Ensure-only region: the handler also receives raises, so cleanup runs
    /// before any outer rescuer sees the exception
    pub fn ensure(&mut self, start: Label, end: Label, handler: Label) -> &mut Self {
        self.region(RegionSpec { start, end, rescue: Some(handler), ensure: Some(handler) })
    }

    fn build(self, scope: &str) -> Result<Cfg, BuildError> {
        let mut labels = AHashMap::new();
        for (label, pc) in &self.placed {
            if *label == Label::EXIT {
                return Err(BuildError::ReservedLabel { scope: scope.to_string() });
            }
            if labels.insert(*label, *pc).is_some() {
                return Err(BuildError::DuplicateLabel { scope: scope.to_string(), label: *label });
            }
        }

        let resolve = |label: Label| {
            labels
                .get(&label)
                .copied()
                .ok_or_else(|| BuildError::UndefinedLabel { scope: scope.to_string(), label })
        };

        for instr in &self.instrs {
            if let Some(reg) = instr.registers().into_iter().find(|r| r.0 >= MAX_REGISTERS) {
                return Err(BuildError::RegisterOutOfRange { scope: scope.to_string(), reg });
            }
            if let Some(target) = instr.branch_target() {
                if target != Label::EXIT {
                    resolve(target)?;
                }
            }
        }

        let len = self.instrs.len();
        let handler = |label: Option<Label>| -> Result<Option<usize>, BuildError> {
            match label {
                None => Ok(None),
                Some(label) => {
                    let pc = resolve(label)?;
                    if pc >= len {
                        return Err(BuildError::HandlerOutOfRange { scope: scope.to_string(), label });
                    }
                    Ok(Some(pc))
                }
            }
        };

        let mut regions = Vec::with_capacity(self.regions.len());
        for spec in &self.regions {
            let start = resolve(spec.start)?;
            let end = resolve(spec.end)?;
            if end < start {
                return Err(BuildError::InvalidRegion { scope: scope.to_string(), start: spec.start, end: spec.end });
            }
            regions.push(ProtectedRegion {
                start,
                end,
                rescuer: handler(spec.rescue)?,
                ensurer: handler(spec.ensure)?,
            });
        }

        Ok(Cfg::new(self.instrs, labels, regions))
    }
}

struct Declared {
    name: String,
    kind: ScopeKind,
    lexical_method: Option<ScopeId>,
    cfg: Option<Cfg>,
}

/// Builds a CompilationUnit out of declared and defined scopes
pub struct UnitBuilder {
    name: String,
    scopes: Vec<Declared>,
}

impl UnitBuilder {
    pub fn new(name: &str) -> Self {
        Self { name: name.to_string(), scopes: Vec::new() }
    }

    pub fn declare(&mut self, name: &str, kind: ScopeKind) -> ScopeId {
        let id = ScopeId(self.scopes.len() as u32);
        self.scopes.push(Declared { name: name.to_string(), kind, lexical_method: None, cfg: None });
        id
    }

    pub fn declare_closure(&mut self, name: &str, lexical_method: ScopeId) -> ScopeId {
        let id = self.declare(name, ScopeKind::Closure);
        self.scopes[id.index()].lexical_method = Some(lexical_method);
        id
    }

    pub fn define(&mut self, id: ScopeId, body: ScopeBuilder) -> Result<(), BuildError> {
        let declared = self
            .scopes
            .get_mut(id.index())
            .ok_or(BuildError::UnknownScope { scope: "<unit>".to_string(), target: id })?;
        if declared.cfg.is_some() {
            return Err(BuildError::AlreadyDefined { scope: declared.name.clone() });
        }
        declared.cfg = Some(body.build(&declared.name)?);
        Ok(())
    }

    pub fn finish(self, root_method: ScopeId) -> Result<CompilationUnit, BuildError> {
        let kinds: Vec<ScopeKind> = self.scopes.iter().map(|s| s.kind).collect();
        let lookup = |scope: &str, target: ScopeId| {
            kinds
                .get(target.index())
                .copied()
                .ok_or_else(|| BuildError::UnknownScope { scope: scope.to_string(), target })
        };

        if lookup("<unit>", root_method)? == ScopeKind::Closure {
            return Err(BuildError::BadCallTarget {
                scope: "<unit>".to_string(),
                target: root_method,
                expected: "method",
            });
        }

        let mut scopes = Vec::with_capacity(self.scopes.len());
        for (index, declared) in self.scopes.into_iter().enumerate() {
            let name = declared.name;
            let cfg = declared.cfg.ok_or_else(|| BuildError::UndefinedScope { scope: name.clone() })?;

            if let Some(method) = declared.lexical_method {
                lookup(&name, method)?;
            }
            for instr in cfg.instructions() {
                match instr {
                    Instr::CallMethod { method, .. } => {
                        if lookup(&name, *method)? == ScopeKind::Closure {
                            return Err(BuildError::BadCallTarget { scope: name, target: *method, expected: "method" });
                        }
                    }
                    Instr::CallBlock { closure, .. } => {
                        if lookup(&name, *closure)? != ScopeKind::Closure {
                            return Err(BuildError::BadCallTarget {
                                scope: name,
                                target: *closure,
                                expected: "closure",
                            });
                        }
                    }
                    Instr::Break { target, .. } | Instr::Return { method: Some(target), .. } => {
                        lookup(&name, *target)?;
                    }
                    _ => {}
                }
            }

            scopes.push(Scope::new(ScopeId(index as u32), name, declared.kind, declared.lexical_method, cfg));
        }

        Ok(CompilationUnit::new(self.name, scopes, root_method))
    }
}
