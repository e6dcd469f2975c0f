// File: src/ir/mod.rs
//
// Intermediate representation consumed by the interpreter.
//
// A compilation unit is a tree of scopes (script, methods, closures), each
// owning an immutable control-flow graph: a flat instruction arena addressed
// by program counter, a label table, and the protected regions that say which
// handler code covers which instructions.

pub mod builder;
pub mod cfg;
pub mod instr;
pub mod loader;
pub mod scope;

pub use builder::{BuildError, RegionSpec, ScopeBuilder, UnitBuilder, MAX_REGISTERS};
pub use cfg::{Cfg, Label, ProtectedRegion};
pub use instr::{BlockMode, Instr, Operand, Reg};
pub use loader::load_unit;
pub use scope::{CompilationUnit, Scope, ScopeId, ScopeKind};
