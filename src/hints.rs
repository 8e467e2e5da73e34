//! Compiler directives collected while generating, written out as one
//! sorted `command,target` line per directive.

use std::collections::BTreeSet;

use crate::metadata::hierarchy::ancestors;
use crate::metadata::{ClassInfo, CompilerMode, Declared, MetadataSource, MethodInfo};

/// Resource the directives are written to.
pub const RESOURCE: &str = "microbench/CompilerHints";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HintAction {
    /// Soft default: dropped when the user put a CompilerControl annotation
    /// on the method or its class.
    ForceInline,
    /// Keeps a generated loop body compiled on its own.
    DontInline,
    /// What the user asked for.
    Explicit(CompilerMode),
}

impl HintAction {
    fn command(self) -> &'static str {
        match self {
            HintAction::ForceInline => CompilerMode::Inline.command(),
            HintAction::DontInline => CompilerMode::DontInline.command(),
            HintAction::Explicit(mode) => mode.command(),
        }
    }
}

/// Deduplicated, sorted directive set.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CompilerHints {
    lines: BTreeSet<String>,
}

impl CompilerHints {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a directive for a dotted target such as `org.a.B.measure` or
    /// `org.a.B.*`.
    pub fn register(&mut self, target: &str, action: HintAction) {
        self.lines.insert(format!("{},{target}", action.command()));
    }

    /// Record a directive for a user method. Soft force-inline hints yield
    /// to explicit compiler control on the method or its declaring class.
    pub fn register_method(
        &mut self,
        source: &dyn MetadataSource,
        method: Declared<'_, MethodInfo>,
        action: HintAction,
    ) {
        if action == HintAction::ForceInline && has_explicit_control(source, method) {
            return;
        }
        self.register(&method_target(method.owner, method.item), action);
    }

    /// Record every CompilerControl annotation on `class`, its ancestors,
    /// their methods and constructors.
    pub fn collect_explicit(&mut self, source: &dyn MetadataSource, class: &ClassInfo) {
        for c in ancestors(source, class) {
            if let Some(mode) = c.annotations.compiler_control() {
                self.register(&format!("{}.*", c.qualified_name), HintAction::Explicit(mode));
            }
            for m in &c.methods {
                if let Some(mode) = m.annotations.compiler_control() {
                    self.register(&method_target(c, m), HintAction::Explicit(mode));
                }
            }
            for ctor in &c.constructors {
                if let Some(mode) = ctor.annotations.compiler_control() {
                    self.register(
                        &format!("{}.<init>", c.qualified_name),
                        HintAction::Explicit(mode),
                    );
                }
            }
        }
    }

    pub fn merge(&mut self, other: &CompilerHints) {
        self.lines.extend(other.lines.iter().cloned());
    }

    /// Parse a previously written resource, skipping blank lines.
    pub fn parse(text: &str) -> Self {
        Self {
            lines: text
                .lines()
                .map(str::trim)
                .filter(|l| !l.is_empty())
                .map(str::to_string)
                .collect(),
        }
    }

    pub fn lines(&self) -> impl Iterator<Item = &str> {
        self.lines.iter().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.lines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    pub fn render(&self) -> String {
        let mut out = String::new();
        for line in &self.lines {
            out.push_str(line);
            out.push('\n');
        }
        out
    }
}

fn method_target(owner: &ClassInfo, method: &MethodInfo) -> String {
    format!("{}.{}", owner.qualified_name, method.name)
}

fn has_explicit_control(source: &dyn MetadataSource, method: Declared<'_, MethodInfo>) -> bool {
    method.annotations.compiler_control().is_some()
        || ancestors(source, method.owner).any(|c| c.annotations.compiler_control().is_some())
}
