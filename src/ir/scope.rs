// File: src/ir/scope.rs
//
// Lexical scopes and the compilation unit that owns them.

use super::cfg::Cfg;
use crate::module::Module;
use once_cell::sync::OnceCell;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// Identity of a scope inside its compilation unit
///
/// Scope identity is what non-local returns and breaks target, and what the
/// per-thread call stack records. Comparisons are by index only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ScopeId(pub u32);

impl ScopeId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for ScopeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "scope#{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScopeKind {
    /// Synthetic root method of a compilation unit
    Script,
    Method,
    /// Block, proc or lambda body
    Closure,
    /// Class, module or singleton-class body
    ModuleBody,
}

impl fmt::Display for ScopeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScopeKind::Script => write!(f, "script"),
            ScopeKind::Method => write!(f, "method"),
            ScopeKind::Closure => write!(f, "closure"),
            ScopeKind::ModuleBody => write!(f, "module body"),
        }
    }
}

/// A lexical execution unit with its own CFG
#[derive(Debug)]
pub struct Scope {
    id: ScopeId,
    name: String,
    kind: ScopeKind,
    /// For closures: the method the closure is lexically defined in
    lexical_method: Option<ScopeId>,
    cfg: Cfg,
}

impl Scope {
    pub(crate) fn new(id: ScopeId, name: String, kind: ScopeKind, lexical_method: Option<ScopeId>, cfg: Cfg) -> Self {
        Self { id, name, kind, lexical_method, cfg }
    }

    pub fn id(&self) -> ScopeId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> ScopeKind {
        self.kind
    }

    pub fn is_closure(&self) -> bool {
        self.kind == ScopeKind::Closure
    }

    pub fn lexical_method(&self) -> Option<ScopeId> {
        self.lexical_method
    }

    pub fn cfg(&self) -> &Cfg {
        &self.cfg
    }
}

/// Output of the IR builder for one compilation unit
///
/// Scopes are immutable once built. The only mutable piece is the root module,
/// which is assigned at most once; a unit evaluated a second time keeps the
/// module it was first given.
#[derive(Debug)]
pub struct CompilationUnit {
    name: String,
    scopes: Vec<Scope>,
    root_method: ScopeId,
    root_module: OnceCell<Arc<Module>>,
}

impl CompilationUnit {
    pub(crate) fn new(name: String, scopes: Vec<Scope>, root_method: ScopeId) -> Self {
        Self { name, scopes, root_method, root_module: OnceCell::new() }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn scope(&self, id: ScopeId) -> Option<&Scope> {
        self.scopes.get(id.index())
    }

    pub fn scopes(&self) -> &[Scope] {
        &self.scopes
    }

    pub fn root_method(&self) -> ScopeId {
        self.root_method
    }

    pub fn root_module(&self) -> Option<Arc<Module>> {
        self.root_module.get().cloned()
    }

    /// Assign the root module unless one is already set; returns whether it was applied
    pub fn set_root_module(&self, module: Arc<Module>) -> bool {
        self.root_module.set(module).is_ok()
    }

    pub fn root_module_or_init<F>(&self, init: F) -> Arc<Module>
    where
        F: FnOnce() -> Arc<Module>,
    {
        self.root_module.get_or_init(init).clone()
    }
}
