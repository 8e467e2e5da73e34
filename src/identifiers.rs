//! Deterministic name allocation for generated fixture types and variables.
//!
//! One allocator lives for one generation pass. Asking twice for the same
//! fixture returns the same name; two distinct user types never share one.

use std::collections::{HashMap, HashSet};

use crate::metadata::{ClassInfo, Scope};

const FIXTURE_SUFFIX: &str = "_Fixture";

#[derive(Debug, Default)]
pub struct Identifiers {
    /// user type -> generated fixture type
    fixture_types: HashMap<String, String>,
    claimed: HashSet<String>,
    /// user type -> collapsed name
    collapsed: HashMap<String, String>,
    next_index: usize,
}

impl Identifiers {
    pub fn new() -> Self {
        Self::default()
    }

    /// Forget every allocation, as at the start of a fresh pass.
    pub fn reset(&mut self) {
        *self = Self::default();
    }

    /// Generated wrapper type for a user fixture type: `MyState_Fixture`,
    /// `Outer_Inner_Fixture`, with a numeric suffix if two user types from
    /// different packages would otherwise collide.
    pub fn fixture_type(&mut self, class: &ClassInfo) -> String {
        if let Some(name) = self.fixture_types.get(&class.qualified_name) {
            return name.clone();
        }
        let base = format!("{}{FIXTURE_SUFFIX}", class.generated_name());
        let mut candidate = base.clone();
        let mut n = 2;
        while !self.claimed.insert(candidate.clone()) {
            candidate = format!("{base}_{n}");
            n += 1;
        }
        self.fixture_types
            .insert(class.qualified_name.clone(), candidate.clone());
        candidate
    }

    /// Short, unique, lower-case stem for a user type: `mystate0_`.
    pub fn collapse_type_name(&mut self, qualified_name: &str) -> String {
        if let Some(name) = self.collapsed.get(qualified_name) {
            return name.clone();
        }
        let simple = qualified_name
            .rsplit(|c| c == '.' || c == '$')
            .next()
            .unwrap_or(qualified_name)
            .to_lowercase();
        let name = format!("{simple}{}_", self.next_index);
        self.next_index += 1;
        self.collapsed
            .insert(qualified_name.to_string(), name.clone());
        name
    }

    /// Harness field holding the fixture: `f_mystate0_t`.
    pub fn field_identifier(&mut self, qualified_name: &str, scope: Scope) -> String {
        format!("f_{}{}", self.collapse_type_name(qualified_name), scope_tag(scope))
    }

    /// Local variable holding the fixture inside generated bodies:
    /// `l_mystate0_t`.
    pub fn local_identifier(&mut self, qualified_name: &str, scope: Scope) -> String {
        format!("l_{}{}", self.collapse_type_name(qualified_name), scope_tag(scope))
    }
}

fn scope_tag(scope: Scope) -> &'static str {
    match scope {
        Scope::Benchmark => "b",
        Scope::Group => "g",
        Scope::Thread => "t",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn should_return_same_names_when_asked_twice() {
        let mut ids = Identifiers::new();
        let class = ClassInfo::new("org.a.MyState");
        let t1 = ids.fixture_type(&class);
        let f1 = ids.field_identifier("org.a.MyState", Scope::Thread);
        let l1 = ids.local_identifier("org.a.MyState", Scope::Thread);
        assert_eq!(t1, ids.fixture_type(&class));
        assert_eq!(f1, ids.field_identifier("org.a.MyState", Scope::Thread));
        assert_eq!(l1, ids.local_identifier("org.a.MyState", Scope::Thread));
        assert_eq!(t1, "MyState_Fixture");
        assert_eq!(f1, "f_mystate0_t");
        assert_eq!(l1, "l_mystate0_t");
    }

    #[test]
    fn should_not_collide_when_simple_names_match() {
        let mut ids = Identifiers::new();
        let a = ids.fixture_type(&ClassInfo::new("org.a.State"));
        let b = ids.fixture_type(&ClassInfo::new("org.b.State"));
        assert_ne!(a, b);
        assert_eq!(b, "State_Fixture_2");

        let fa = ids.field_identifier("org.a.State", Scope::Benchmark);
        let fb = ids.field_identifier("org.b.State", Scope::Benchmark);
        assert_ne!(fa, fb);
    }

    #[test]
    fn should_distinguish_scopes_of_same_type() {
        let mut ids = Identifiers::new();
        let thread = ids.local_identifier("org.a.S", Scope::Thread);
        let group = ids.local_identifier("org.a.S", Scope::Group);
        assert_ne!(thread, group);
    }

    #[test]
    fn should_start_over_when_reset() {
        let mut ids = Identifiers::new();
        ids.collapse_type_name("org.a.X");
        ids.collapse_type_name("org.a.Y");
        ids.reset();
        assert_eq!(ids.collapse_type_name("org.a.Y"), "y0_");
    }
}
