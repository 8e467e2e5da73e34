//! Read-only metadata model: classes, methods, fields, parameters and their
//! annotations.
//!
//! The generator never introspects code itself. It consumes this normalized
//! view, whoever produced it: a JSON dump written by a source scanner, a
//! build-script pass, or a test building classes by hand with the builder
//! methods below.

pub mod annotations;
pub mod hierarchy;

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::ops::Deref;

use crate::error::Result;
pub use annotations::{
    Annotation, AnnotationKind, Annotations, AuxCounterKind, CompilerMode, ElementKind,
    ForkSettings, IterationSettings, Level, Scope,
};

/// Declaration modifiers shared by classes, methods, fields and constructors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Modifiers {
    pub public: bool,
    #[serde(rename = "abstract")]
    pub is_abstract: bool,
    #[serde(rename = "final")]
    pub is_final: bool,
    #[serde(rename = "static")]
    pub is_static: bool,
    pub synchronized: bool,
    pub strict_fp: bool,
}

impl Modifiers {
    pub fn public() -> Self {
        Self {
            public: true,
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParameterInfo {
    pub name: String,
    /// Qualified type name, or a primitive type name.
    #[serde(rename = "type")]
    pub ty: String,
}

impl ParameterInfo {
    pub fn new(name: impl Into<String>, ty: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ty: ty.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldInfo {
    pub name: String,
    #[serde(rename = "type")]
    pub ty: String,
    #[serde(default)]
    pub modifiers: Modifiers,
    #[serde(default)]
    pub annotations: Annotations,
}

impl FieldInfo {
    pub fn new(name: impl Into<String>, ty: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ty: ty.into(),
            modifiers: Modifiers::public(),
            annotations: Annotations::new(),
        }
    }

    pub fn modifiers(mut self, modifiers: Modifiers) -> Self {
        self.modifiers = modifiers;
        self
    }

    pub fn annotate(mut self, annotation: Annotation) -> Self {
        self.annotations.push(annotation);
        self
    }

    pub fn is_public(&self) -> bool {
        self.modifiers.public
    }

    pub fn is_static(&self) -> bool {
        self.modifiers.is_static
    }

    pub fn is_final(&self) -> bool {
        self.modifiers.is_final
    }
}

fn void() -> String {
    "void".to_string()
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MethodInfo {
    pub name: String,
    #[serde(default = "void")]
    pub return_type: String,
    #[serde(default)]
    pub modifiers: Modifiers,
    #[serde(default)]
    pub parameters: Vec<ParameterInfo>,
    #[serde(default)]
    pub annotations: Annotations,
}

impl MethodInfo {
    /// A public, void, parameterless method.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            return_type: void(),
            modifiers: Modifiers::public(),
            parameters: Vec::new(),
            annotations: Annotations::new(),
        }
    }

    pub fn returns(mut self, ty: impl Into<String>) -> Self {
        self.return_type = ty.into();
        self
    }

    pub fn modifiers(mut self, modifiers: Modifiers) -> Self {
        self.modifiers = modifiers;
        self
    }

    pub fn param(mut self, name: impl Into<String>, ty: impl Into<String>) -> Self {
        self.parameters.push(ParameterInfo::new(name, ty));
        self
    }

    pub fn annotate(mut self, annotation: Annotation) -> Self {
        self.annotations.push(annotation);
        self
    }

    pub fn is_public(&self) -> bool {
        self.modifiers.public
    }

    pub fn is_abstract(&self) -> bool {
        self.modifiers.is_abstract
    }

    pub fn is_static(&self) -> bool {
        self.modifiers.is_static
    }

    pub fn is_synchronized(&self) -> bool {
        self.modifiers.synchronized
    }

    pub fn returns_void(&self) -> bool {
        self.return_type == "void"
    }

    /// Methods with the same name and parameter types override each other.
    pub fn signature(&self) -> String {
        let params: Vec<&str> = self.parameters.iter().map(|p| p.ty.as_str()).collect();
        format!("{}({})", self.name, params.join(","))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ConstructorInfo {
    #[serde(default)]
    pub modifiers: Modifiers,
    #[serde(default)]
    pub parameters: Vec<ParameterInfo>,
    #[serde(default)]
    pub annotations: Annotations,
}

impl ConstructorInfo {
    pub fn public_no_arg() -> Self {
        Self {
            modifiers: Modifiers::public(),
            ..Self::default()
        }
    }
}

/// One class (or enum) of the benchmarked program.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassInfo {
    /// Dotted qualified name, e.g. `org.bench.MyBench` or
    /// `org.bench.Outer.Inner` for nested classes.
    pub qualified_name: String,
    /// Dotted package name; empty for the default package.
    #[serde(default)]
    pub package: String,
    #[serde(default)]
    pub superclass: Option<String>,
    #[serde(default)]
    pub modifiers: Modifiers,
    /// Declared inside another class.
    #[serde(default)]
    pub nested: bool,
    #[serde(default)]
    pub is_enum: bool,
    #[serde(default)]
    pub enum_constants: Vec<String>,
    #[serde(default)]
    pub annotations: Annotations,
    #[serde(default)]
    pub fields: Vec<FieldInfo>,
    #[serde(default)]
    pub methods: Vec<MethodInfo>,
    #[serde(default)]
    pub constructors: Vec<ConstructorInfo>,
}

impl ClassInfo {
    /// A public top-level class with a public no-arg constructor. The package
    /// is everything before the last dot.
    pub fn new(qualified_name: impl Into<String>) -> Self {
        let qualified_name = qualified_name.into();
        let package = qualified_name
            .rsplit_once('.')
            .map(|(p, _)| p.to_string())
            .unwrap_or_default();
        Self {
            qualified_name,
            package,
            superclass: None,
            modifiers: Modifiers::public(),
            nested: false,
            is_enum: false,
            enum_constants: Vec::new(),
            annotations: Annotations::new(),
            fields: Vec::new(),
            methods: Vec::new(),
            constructors: vec![ConstructorInfo::public_no_arg()],
        }
    }

    /// An enum with the given constants.
    pub fn enumeration(qualified_name: impl Into<String>, constants: &[&str]) -> Self {
        let mut class = Self::new(qualified_name);
        class.is_enum = true;
        class.modifiers.is_final = true;
        class.enum_constants = constants.iter().map(|c| c.to_string()).collect();
        class.constructors.clear();
        class
    }

    pub fn in_package(mut self, package: impl Into<String>) -> Self {
        self.package = package.into();
        self
    }

    pub fn extends(mut self, superclass: impl Into<String>) -> Self {
        self.superclass = Some(superclass.into());
        self
    }

    pub fn modifiers(mut self, modifiers: Modifiers) -> Self {
        self.modifiers = modifiers;
        self
    }

    pub fn nested(mut self, is_static: bool) -> Self {
        self.nested = true;
        self.modifiers.is_static = is_static;
        self
    }

    pub fn annotate(mut self, annotation: Annotation) -> Self {
        self.annotations.push(annotation);
        self
    }

    pub fn state(self, scope: Scope) -> Self {
        self.annotate(Annotation::State { scope: Some(scope) })
    }

    pub fn field(mut self, field: FieldInfo) -> Self {
        self.fields.push(field);
        self
    }

    pub fn method(mut self, method: MethodInfo) -> Self {
        self.methods.push(method);
        self
    }

    pub fn constructors(mut self, constructors: Vec<ConstructorInfo>) -> Self {
        self.constructors = constructors;
        self
    }

    /// Name relative to the package: `MyBench`, `Outer.Inner`.
    pub fn simple_name(&self) -> &str {
        if self.package.is_empty() {
            &self.qualified_name
        } else {
            self.qualified_name
                .strip_prefix(&self.package)
                .and_then(|s| s.strip_prefix('.'))
                .unwrap_or(&self.qualified_name)
        }
    }

    /// Identifier-safe name relative to the package: `Outer_Inner`.
    pub fn generated_name(&self) -> String {
        self.simple_name().replace('.', "_")
    }

    /// Path of the type in generated Rust code. Harness-provided types live
    /// in the runtime module of this crate.
    pub fn rust_path(&self) -> String {
        if infra::is_infra(&self.qualified_name) {
            format!("cntryl_microbench::runtime::{}", self.generated_name())
        } else {
            format!("{}::{}", package_path(&self.package), self.generated_name())
        }
    }

    pub fn is_public(&self) -> bool {
        self.modifiers.public
    }

    pub fn is_abstract(&self) -> bool {
        self.modifiers.is_abstract
    }

    pub fn is_final(&self) -> bool {
        self.modifiers.is_final
    }

    /// Nested and not static: instances need an enclosing instance.
    pub fn is_inner(&self) -> bool {
        self.nested && !self.modifiers.is_static
    }

    pub fn has_public_no_arg_constructor(&self) -> bool {
        self.constructors
            .iter()
            .any(|c| c.modifiers.public && c.parameters.is_empty())
    }
}

/// Rust module path of a dotted package: `org.a` becomes `crate::org::a`.
pub fn package_path(package: &str) -> String {
    if package.is_empty() {
        "crate".to_string()
    } else {
        format!("crate::{}", package.replace('.', "::"))
    }
}

/// A member together with the class that declares it.
#[derive(Debug)]
pub struct Declared<'a, T> {
    pub owner: &'a ClassInfo,
    pub item: &'a T,
}

impl<T> Clone for Declared<'_, T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for Declared<'_, T> {}

impl<'a, T> Declared<'a, T> {
    pub fn new(owner: &'a ClassInfo, item: &'a T) -> Self {
        Self { owner, item }
    }
}

impl<T> Deref for Declared<'_, T> {
    type Target = T;

    fn deref(&self) -> &T {
        self.item
    }
}

/// Query interface over a set of classes.
pub trait MetadataSource {
    /// Every known class, sorted by qualified name.
    fn classes(&self) -> Vec<&ClassInfo>;

    /// Look a class up by qualified name.
    fn resolve(&self, qualified_name: &str) -> Option<&ClassInfo>;
}

/// Qualified names of harness-provided fixture types.
pub mod infra {
    pub const PACKAGE: &str = "microbench.infra";
    pub const BLACKHOLE: &str = "microbench.infra.Blackhole";
    pub const CONTROL: &str = "microbench.infra.Control";
    pub const BENCHMARK_PARAMS: &str = "microbench.infra.BenchmarkParams";
    pub const ITERATION_PARAMS: &str = "microbench.infra.IterationParams";
    pub const THREAD_PARAMS: &str = "microbench.infra.ThreadParams";

    /// Fixtures built by copying harness data instead of a no-arg constructor.
    pub fn is_copy_initialized(qualified_name: &str) -> bool {
        matches!(
            qualified_name,
            BENCHMARK_PARAMS | ITERATION_PARAMS | THREAD_PARAMS
        )
    }

    /// Types injected by the harness without being fixtures.
    pub fn is_special(qualified_name: &str) -> bool {
        qualified_name == BLACKHOLE
    }

    pub fn is_infra(qualified_name: &str) -> bool {
        qualified_name
            .strip_prefix(PACKAGE)
            .is_some_and(|rest| rest.starts_with('.'))
    }
}

fn infra_classes() -> Vec<ClassInfo> {
    let params = |name: &str| {
        ClassInfo::new(name)
            .state(Scope::Thread)
            .constructors(Vec::new())
    };
    vec![
        ClassInfo::new(infra::BLACKHOLE).modifiers(Modifiers {
            public: true,
            is_final: true,
            ..Modifiers::default()
        }),
        ClassInfo::new(infra::CONTROL)
            .state(Scope::Group)
            .field(FieldInfo::new("start_measurement", "boolean"))
            .field(FieldInfo::new("stop_measurement", "boolean")),
        params(infra::BENCHMARK_PARAMS),
        params(infra::ITERATION_PARAMS),
        params(infra::THREAD_PARAMS),
    ]
}

/// In-memory class set, loadable from JSON. Harness-provided fixture types
/// are always present.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClassModel {
    classes: Vec<ClassInfo>,
    #[serde(skip)]
    index: HashMap<String, usize>,
}

impl Default for ClassModel {
    fn default() -> Self {
        Self::new()
    }
}

impl ClassModel {
    pub fn new() -> Self {
        let mut model = Self {
            classes: Vec::new(),
            index: HashMap::new(),
        };
        for class in infra_classes() {
            model.insert(class);
        }
        model
    }

    pub fn from_classes(classes: impl IntoIterator<Item = ClassInfo>) -> Self {
        let mut model = Self::new();
        for class in classes {
            model.insert(class);
        }
        model
    }

    /// Parse a `{"classes": [...]}` document.
    pub fn from_json(text: &str) -> Result<Self> {
        let parsed: ClassModel = serde_json::from_str(text)?;
        Ok(Self::from_classes(parsed.classes))
    }

    /// Add or replace a class.
    pub fn insert(&mut self, class: ClassInfo) {
        match self.index.get(&class.qualified_name) {
            Some(&i) => self.classes[i] = class,
            None => {
                self.index
                    .insert(class.qualified_name.clone(), self.classes.len());
                self.classes.push(class);
            }
        }
    }

    /// Merge another model into this one; later classes win.
    pub fn extend(&mut self, other: ClassModel) {
        for class in other.classes {
            self.insert(class);
        }
    }

    pub fn len(&self) -> usize {
        self.classes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.classes.is_empty()
    }
}

impl MetadataSource for ClassModel {
    fn classes(&self) -> Vec<&ClassInfo> {
        let mut all: Vec<&ClassInfo> = self.classes.iter().collect();
        all.sort_by(|a, b| a.qualified_name.cmp(&b.qualified_name));
        all
    }

    fn resolve(&self, qualified_name: &str) -> Option<&ClassInfo> {
        self.index.get(qualified_name).map(|&i| &self.classes[i])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn should_derive_package_and_simple_name() {
        let c = ClassInfo::new("org.bench.MyBench");
        assert_eq!(c.package, "org.bench");
        assert_eq!(c.simple_name(), "MyBench");

        let nested = ClassInfo::new("org.bench.Outer.Inner").in_package("org.bench");
        assert_eq!(nested.simple_name(), "Outer.Inner");
        assert_eq!(nested.generated_name(), "Outer_Inner");

        let default_pkg = ClassInfo::new("Loose");
        assert!(default_pkg.package.is_empty());
        assert_eq!(default_pkg.simple_name(), "Loose");
    }

    #[test]
    fn should_map_types_to_rust_paths() {
        let nested = ClassInfo::new("org.bench.Outer.Inner").in_package("org.bench");
        assert_eq!(nested.rust_path(), "crate::org::bench::Outer_Inner");
        assert_eq!(
            ClassInfo::new(infra::THREAD_PARAMS).rust_path(),
            "cntryl_microbench::runtime::ThreadParams"
        );
    }

    #[test]
    fn should_seed_infra_classes() {
        let model = ClassModel::new();
        assert!(model.resolve(infra::BLACKHOLE).is_some());
        assert!(model.resolve(infra::THREAD_PARAMS).is_some());
        assert!(infra::is_copy_initialized(infra::ITERATION_PARAMS));
        assert!(!infra::is_copy_initialized(infra::CONTROL));
        assert!(infra::is_infra(infra::CONTROL));
        assert!(!infra::is_infra("microbench.infrastructure.X"));
    }

    #[test]
    fn should_load_model_from_json() {
        let json = r#"{
            "classes": [{
                "qualified_name": "org.bench.MyBench",
                "package": "org.bench",
                "modifiers": {"public": true},
                "constructors": [{"modifiers": {"public": true}}],
                "methods": [{
                    "name": "measure",
                    "modifiers": {"public": true},
                    "parameters": [{"name": "s", "type": "org.bench.MyState"}],
                    "annotations": [{"annotation": "benchmark"}]
                }]
            }]
        }"#;
        let model = ClassModel::from_json(json).unwrap();
        let class = model.resolve("org.bench.MyBench").unwrap();
        assert_eq!(class.methods[0].return_type, "void");
        assert!(class.methods[0].annotations.has(AnnotationKind::Benchmark));
        assert!(class.has_public_no_arg_constructor());
    }

    #[test]
    fn should_replace_class_on_reinsert() {
        let mut model = ClassModel::new();
        let before = model.len();
        model.insert(ClassInfo::new("org.a.A"));
        model.insert(ClassInfo::new("org.a.A").modifiers(Modifiers::default()));
        assert_eq!(model.len(), before + 1);
        assert!(!model.resolve("org.a.A").unwrap().is_public());
    }
}
