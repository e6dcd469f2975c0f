// File: src/ir/loader.rs
//
// JSON form of a compilation unit.
//
// Scopes are listed in order; a scope's position in the list is its ScopeId.
// Code is a list of instructions interleaved with label markers:
//
//     {"label": 3}
//     {"op": "jump", "target": 3}
//
// Regions name labels. A region that only names an ensure handler also routes
// raises to it, the same as ScopeBuilder::ensure.

use super::builder::{RegionSpec, ScopeBuilder, UnitBuilder};
use super::cfg::Label;
use super::instr::Instr;
use super::scope::{CompilationUnit, ScopeId, ScopeKind};
use crate::errors::InterpError;
use serde::Deserialize;

#[derive(Debug, Deserialize)]
struct UnitFile {
    name: String,
    #[serde(default)]
    root: u32,
    scopes: Vec<ScopeFile>,
}

#[derive(Debug, Deserialize)]
struct ScopeFile {
    name: String,
    kind: ScopeKind,
    #[serde(default)]
    lexical_method: Option<ScopeId>,
    code: Vec<CodeItem>,
    #[serde(default)]
    regions: Vec<RegionFile>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum CodeItem {
    Label { label: Label },
    Instr(Instr),
}

#[derive(Debug, Deserialize)]
struct RegionFile {
    start: Label,
    end: Label,
    #[serde(default)]
    rescue: Option<Label>,
    #[serde(default)]
    ensure: Option<Label>,
}

/// Parse and build a compilation unit from its JSON form
pub fn load_unit(source: &str) -> Result<CompilationUnit, InterpError> {
    let file: UnitFile =
        serde_json::from_str(source).map_err(|e| InterpError::load_error(format!("invalid unit file: {}", e)))?;

    let mut unit = UnitBuilder::new(&file.name);
    let ids: Vec<ScopeId> = file
        .scopes
        .iter()
        .map(|scope| match (scope.kind, scope.lexical_method) {
            (ScopeKind::Closure, Some(method)) => unit.declare_closure(&scope.name, method),
            (kind, _) => unit.declare(&scope.name, kind),
        })
        .collect();

    for (id, scope) in ids.into_iter().zip(file.scopes) {
        let mut body = ScopeBuilder::new();
        for item in scope.code {
            match item {
                CodeItem::Label { label } => {
                    body.place(label);
                }
                CodeItem::Instr(instr) => {
                    body.emit(instr);
                }
            }
        }
        for region in scope.regions {
            let rescue = region.rescue.or(region.ensure);
            body.region(RegionSpec { start: region.start, end: region.end, rescue, ensure: region.ensure });
        }
        unit.define(id, body)?;
    }

    Ok(unit.finish(ScopeId(file.root))?)
}
