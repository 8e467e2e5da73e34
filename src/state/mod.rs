//! Fixture objects bound into generated harnesses.
//!
//! A [`StateObject`] is one fixture instance a generated harness creates and
//! passes to benchmark and helper methods. The [`graph::StateGraph`] discovers
//! them from method parameters and helper parameters and orders them for
//! setup and teardown.

pub mod graph;

use crate::metadata::{infra, AuxCounterKind, ClassInfo, Level, Scope};

pub use graph::StateGraph;

/// Index of a fixture inside its [`StateGraph`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct StateId(pub usize);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HelperKind {
    Setup,
    TearDown,
}

/// A lifecycle method to splice into generated code.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HelperInvocation {
    pub method: String,
    /// Class declaring the helper; may be an ancestor of the fixture type.
    pub declaring_class: String,
    pub level: Level,
    pub kind: HelperKind,
    /// Fixtures passed to the helper, in parameter order.
    pub arguments: Vec<StateId>,
}

/// A `@Param` field to inject before trial setup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParamBinding {
    pub name: String,
    /// Class declaring the field; injection targets this level of the
    /// fixture's type hierarchy.
    pub declaring_class: String,
    pub ty: String,
    /// Declared values; empty when blank.
    pub values: Vec<String>,
    /// Constants of the field type when it is an enum.
    pub enum_constants: Option<Vec<String>>,
}

/// A named auxiliary result read from a thread-scoped fixture after the
/// measurement loop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuxCounter {
    pub name: String,
    pub state: StateId,
    /// Member access expression relative to the fixture value: `hits` for a
    /// field, `hits()` for a method.
    pub accessor: String,
    pub kind: AuxCounterKind,
}

/// One fixture to be created and injected by the harness.
#[derive(Debug, Clone)]
pub struct StateObject {
    pub id: StateId,
    pub user_type: String,
    /// Path of the user type in generated code.
    pub user_path: String,
    /// Package the fixture wrapper is generated into.
    pub package: String,
    pub fixture_type: String,
    pub scope: Scope,
    /// Bound without a method parameter, e.g. the benchmark class itself.
    pub implicit: bool,
    pub local_identifier: String,
    pub field_identifier: String,
    pub params: Vec<ParamBinding>,
    pub helpers: Vec<HelperInvocation>,
}

impl StateObject {
    /// Harness-provided fixtures copied from harness data at creation.
    pub fn is_copy_initialized(&self) -> bool {
        infra::is_copy_initialized(&self.user_type)
    }

    /// The measurement-window control fixture.
    pub fn is_control(&self) -> bool {
        self.user_type == infra::CONTROL
    }

    pub fn helpers_at(&self, kind: HelperKind, level: Level) -> impl Iterator<Item = &HelperInvocation> {
        self.helpers
            .iter()
            .filter(move |h| h.kind == kind && h.level == level)
    }

    pub fn has_helpers_at(&self, level: Level) -> bool {
        self.helpers.iter().any(|h| h.level == level)
    }

    /// Every distinct fixture this one's helpers take, in first-use order.
    pub fn dependencies(&self) -> Vec<StateId> {
        let mut out = Vec::new();
        for h in &self.helpers {
            for a in &h.arguments {
                if !out.contains(a) {
                    out.push(*a);
                }
            }
        }
        out
    }
}

/// Package generated code for `class` is placed in.
pub fn generated_package(class: &ClassInfo, suffix: &str) -> String {
    if class.package.is_empty() {
        suffix.to_string()
    } else {
        format!("{}.{suffix}", class.package)
    }
}
