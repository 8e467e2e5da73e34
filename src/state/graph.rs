//! Discovery and ordering of the fixtures a method group needs.

use std::collections::{BTreeMap, HashMap, HashSet};

use tracing::trace;

use super::{
    generated_package, AuxCounter, HelperInvocation, HelperKind, ParamBinding, StateId,
    StateObject,
};
use crate::error::{ElementRef, GenerationError, Result};
use crate::identifiers::Identifiers;
use crate::metadata::hierarchy::{
    all_fields, all_methods, ancestors, annotation_super, state_annotation,
};
use crate::metadata::{
    infra, AnnotationKind, ClassInfo, Declared, MetadataSource, MethodInfo, Scope,
};

/// What the harness passes for one benchmark method parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MethodArg {
    State(StateId),
    Blackhole,
}

/// Fixture dependency graph for one method group.
///
/// Fixtures are keyed by (user type, scope): every method and helper asking
/// for the same combination shares one [`StateObject`].
#[derive(Debug)]
pub struct StateGraph {
    package_suffix: String,
    states: Vec<StateObject>,
    index: HashMap<(String, Scope), StateId>,
    args: BTreeMap<String, Vec<MethodArg>>,
    implicits: BTreeMap<String, StateId>,
    resolved: HashSet<StateId>,
    aux: BTreeMap<String, Vec<AuxCounter>>,
    aux_bound: HashSet<(StateId, String)>,
}

impl StateGraph {
    pub fn new(package_suffix: impl Into<String>) -> Self {
        Self {
            package_suffix: package_suffix.into(),
            states: Vec::new(),
            index: HashMap::new(),
            args: BTreeMap::new(),
            implicits: BTreeMap::new(),
            resolved: HashSet::new(),
            aux: BTreeMap::new(),
            aux_bound: HashSet::new(),
        }
    }

    /// Bind the benchmark class itself and every parameter of `methods`.
    ///
    /// The benchmark class is bound implicitly, with its own State scope, or
    /// per thread when it declares none.
    pub fn bind_methods<'a>(
        &mut self,
        source: &'a dyn MetadataSource,
        holder: &'a ClassInfo,
        methods: impl IntoIterator<Item = Declared<'a, MethodInfo>>,
        ids: &mut Identifiers,
    ) -> Result<()> {
        let holder_scope = match state_annotation(source, holder) {
            Some((_, Some(scope))) => scope,
            Some((owner, None)) => {
                return Err(GenerationError::MissingOption {
                    annotation: "State",
                    option: "Scope",
                    element: ElementRef::class(owner),
                })
            }
            None => Scope::Thread,
        };
        let holder_id = self.get_or_create(holder, holder_scope, true, ids);
        self.implicits.insert("bench".to_string(), holder_id);
        let site = ElementRef::class(holder);
        self.bind(source, None, holder_id, holder, &site, ids, &mut Vec::new())?;

        for method in methods {
            let mut args = Vec::with_capacity(method.parameters.len());
            for param in &method.parameters {
                if infra::is_special(&param.ty) {
                    args.push(MethodArg::Blackhole);
                    continue;
                }
                let site = ElementRef::parameter(method.owner, method.item, param);
                let class = source.resolve(&param.ty).ok_or_else(|| {
                    GenerationError::config(
                        format!("Unknown type of benchmark method argument: {}", param.ty),
                        site.clone(),
                    )
                })?;
                let id = self.state_for(source, class, &site, ids)?;
                self.bind(source, Some(&method.name), id, class, &site, ids, &mut Vec::new())?;
                args.push(MethodArg::State(id));
            }
            self.args.insert(method.name.clone(), args);
        }
        Ok(())
    }

    fn state_for(
        &mut self,
        source: &dyn MetadataSource,
        class: &ClassInfo,
        site: &ElementRef,
        ids: &mut Identifiers,
    ) -> Result<StateId> {
        match state_annotation(source, class) {
            Some((_, Some(scope))) => Ok(self.get_or_create(class, scope, false, ids)),
            Some((owner, None)) => Err(GenerationError::MissingOption {
                annotation: "State",
                option: "Scope",
                element: ElementRef::class(owner),
            }),
            None => Err(GenerationError::config(
                format!(
                    "Method parameters should be @State classes, but {} is not",
                    class.qualified_name
                ),
                site.clone(),
            )),
        }
    }

    fn get_or_create(
        &mut self,
        class: &ClassInfo,
        scope: Scope,
        implicit: bool,
        ids: &mut Identifiers,
    ) -> StateId {
        let key = (class.qualified_name.clone(), scope);
        if let Some(&id) = self.index.get(&key) {
            return id;
        }
        let id = StateId(self.states.len());
        self.states.push(StateObject {
            id,
            user_type: class.qualified_name.clone(),
            user_path: class.rust_path(),
            package: generated_package(class, &self.package_suffix),
            fixture_type: ids.fixture_type(class),
            scope,
            implicit,
            local_identifier: ids.local_identifier(&class.qualified_name, scope),
            field_identifier: ids.field_identifier(&class.qualified_name, scope),
            params: Vec::new(),
            helpers: Vec::new(),
        });
        self.index.insert(key, id);
        trace!(state = %class.qualified_name, scope = scope.name(), "new fixture");
        id
    }

    /// Register `id` under a binding context and walk its helpers.
    ///
    /// `ctx` is the benchmark method whose parameter led here, `None` for
    /// implicit fixtures. `path` holds the fixtures on the current recursive
    /// walk; meeting one of them again is a dependency cycle, reported at
    /// `site`. Fixtures finished in another branch are reused as is.
    #[allow(clippy::too_many_arguments)]
    fn bind(
        &mut self,
        source: &dyn MetadataSource,
        ctx: Option<&str>,
        id: StateId,
        class: &ClassInfo,
        site: &ElementRef,
        ids: &mut Identifiers,
        path: &mut Vec<StateId>,
    ) -> Result<()> {
        if path.contains(&id) {
            let mut names: Vec<&str> = path
                .iter()
                .map(|s| self.states[s.0].user_type.as_str())
                .collect();
            names.push(&self.states[id.0].user_type);
            return Err(GenerationError::StateCycle {
                path: names.join(" -> "),
                element: site.clone(),
            });
        }

        if annotation_super(source, class, AnnotationKind::AuxCounters).is_some() {
            self.bind_aux(source, ctx, id, class)?;
        }

        if self.resolved.contains(&id) {
            return Ok(());
        }

        path.push(id);
        let params = collect_params(source, class);
        let mut helpers = Vec::new();
        for method in all_methods(source, class) {
            let kinds = [
                (HelperKind::Setup, method.annotations.setup()),
                (HelperKind::TearDown, method.annotations.teardown()),
            ];
            for (kind, level) in kinds {
                let Some(level) = level else { continue };
                let arguments = self.bind_helper_args(source, ctx, method, ids, path)?;
                trace!(
                    state = %class.qualified_name,
                    helper = %method.name,
                    level = level.name(),
                    "helper bound"
                );
                helpers.push(HelperInvocation {
                    method: method.name.clone(),
                    declaring_class: method.owner.qualified_name.clone(),
                    level,
                    kind,
                    arguments,
                });
            }
        }
        path.pop();

        let state = &mut self.states[id.0];
        state.params = params;
        state.helpers = helpers;
        self.resolved.insert(id);
        Ok(())
    }

    fn bind_helper_args(
        &mut self,
        source: &dyn MetadataSource,
        ctx: Option<&str>,
        method: Declared<'_, MethodInfo>,
        ids: &mut Identifiers,
        path: &mut Vec<StateId>,
    ) -> Result<Vec<StateId>> {
        let mut arguments = Vec::with_capacity(method.parameters.len());
        for param in &method.parameters {
            let site = ElementRef::parameter(method.owner, method.item, param);
            if infra::is_special(&param.ty) {
                return Err(GenerationError::config(
                    "Blackhole can only be injected into benchmark methods",
                    site,
                ));
            }
            let class = source.resolve(&param.ty).ok_or_else(|| {
                GenerationError::config(
                    format!("Unknown type of helper method argument: {}", param.ty),
                    site.clone(),
                )
            })?;
            let child = self.state_for(source, class, &site, ids)?;
            self.bind(source, ctx, child, class, &site, ids, path)?;
            arguments.push(child);
        }
        Ok(arguments)
    }

    fn bind_aux(
        &mut self,
        source: &dyn MetadataSource,
        ctx: Option<&str>,
        id: StateId,
        class: &ClassInfo,
    ) -> Result<()> {
        let element = ElementRef::class(class);
        let Some(method) = ctx else {
            return Err(GenerationError::config(
                "@AuxCounters can only be used on states passed as benchmark method arguments",
                element,
            ));
        };
        if self.states[id.0].scope != Scope::Thread {
            return Err(GenerationError::config(
                "@AuxCounters can only be used with Scope.Thread states",
                element,
            ));
        }
        if !self.aux_bound.insert((id, method.to_string())) {
            return Ok(());
        }
        let kind = ancestors(source, class)
            .find_map(|c| c.annotations.aux_counters())
            .unwrap_or_default();

        let mut found = Vec::new();
        for field in all_fields(source, class) {
            if !field.is_public() || field.is_static() {
                continue;
            }
            if !is_counter_type(&field.ty) {
                return Err(GenerationError::config(
                    format!(
                        "Illegal type for the public field in @AuxCounters: {} {}",
                        field.ty, field.name
                    ),
                    ElementRef::field(field.owner, field.item),
                ));
            }
            found.push((field.name.clone(), field.name.clone()));
        }
        for m in all_methods(source, class) {
            if !m.is_public() || m.is_static() || !m.parameters.is_empty() {
                continue;
            }
            if m.annotations.setup().is_some() || m.annotations.teardown().is_some() {
                continue;
            }
            if is_counter_type(&m.return_type) {
                found.push((m.name.clone(), format!("{}()", m.name)));
            }
        }

        let counters = self.aux.entry(method.to_string()).or_default();
        for (name, accessor) in found {
            if counters.iter().any(|c| c.name == name) {
                return Err(GenerationError::config(
                    format!("Conflicting @AuxCounters, please use unique names: {name}"),
                    element,
                ));
            }
            counters.push(AuxCounter {
                name,
                state: id,
                accessor,
                kind,
            });
        }
        Ok(())
    }

    pub fn states(&self) -> &[StateObject] {
        &self.states
    }

    pub fn state(&self, id: StateId) -> &StateObject {
        &self.states[id.0]
    }

    /// Arguments of a bound benchmark method, in parameter order.
    pub fn args(&self, method: &str) -> &[MethodArg] {
        self.args.get(method).map_or(&[], Vec::as_slice)
    }

    /// The implicit fixture for the benchmark class.
    pub fn holder(&self) -> Option<StateId> {
        self.implicits.get("bench").copied()
    }

    pub fn aux_counters(&self, method: &str) -> &[AuxCounter] {
        self.aux.get(method).map_or(&[], Vec::as_slice)
    }

    /// Fixtures a method needs, linearized breadth first from its roots:
    /// control fixtures, implicit fixtures, then the method's arguments.
    ///
    /// Forward order lists each fixture before the fixtures its helpers
    /// depend on; reverse order is the exact reversal.
    pub fn state_order(&self, method: &str, forward: bool) -> Vec<StateId> {
        let mut stratum: Vec<StateId> = self
            .states
            .iter()
            .filter(|s| s.is_control())
            .map(|s| s.id)
            .collect();
        stratum.extend(self.implicits.values().copied());
        stratum.extend(self.args(method).iter().filter_map(|a| match a {
            MethodArg::State(id) => Some(*id),
            MethodArg::Blackhole => None,
        }));

        let mut linear = Vec::new();
        while !stratum.is_empty() {
            let next: Vec<StateId> = stratum
                .iter()
                .flat_map(|id| self.states[id.0].dependencies())
                .collect();
            linear.extend(stratum);
            stratum = next;
        }

        let mut seen = HashSet::new();
        let mut order: Vec<StateId> = linear.into_iter().filter(|id| seen.insert(*id)).collect();
        if !forward {
            order.reverse();
        }
        order
    }

    /// Fixtures a method needs with every fixture after the fixtures its
    /// helpers take: the order fixture accessors must run in.
    pub fn init_order(&self, method: &str) -> Vec<StateId> {
        fn visit(graph: &StateGraph, id: StateId, done: &mut HashSet<StateId>, out: &mut Vec<StateId>) {
            if !done.insert(id) {
                return;
            }
            for dep in graph.states[id.0].dependencies() {
                visit(graph, dep, done, out);
            }
            out.push(id);
        }
        let mut done = HashSet::new();
        let mut out = Vec::new();
        for id in self.state_order(method, true) {
            visit(self, id, &mut done, &mut out);
        }
        out
    }

    /// Every `@Param` binding reachable from the group, in fixture order.
    pub fn params(&self) -> impl Iterator<Item = &ParamBinding> {
        self.states.iter().flat_map(|s| s.params.iter())
    }
}

fn collect_params(source: &dyn MetadataSource, class: &ClassInfo) -> Vec<ParamBinding> {
    all_fields(source, class)
        .into_iter()
        .filter_map(|f| {
            let values = f.annotations.param()?;
            let enum_constants = source
                .resolve(&f.ty)
                .filter(|c| c.is_enum)
                .map(|c| c.enum_constants.clone());
            Some(ParamBinding {
                name: f.name.clone(),
                declaring_class: f.owner.qualified_name.clone(),
                ty: f.ty.clone(),
                values: values.to_vec(),
                enum_constants,
            })
        })
        .collect()
}

fn is_counter_type(ty: &str) -> bool {
    matches!(ty, "int" | "long" | "i32" | "i64" | "u32" | "u64")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::{Annotation, ClassModel, FieldInfo, Level};

    fn setup(level: Level) -> Annotation {
        Annotation::Setup { level }
    }

    fn bind(model: &ClassModel, holder: &str) -> Result<StateGraph> {
        let holder = model.resolve(holder).unwrap();
        let methods: Vec<_> = holder
            .methods
            .iter()
            .filter(|m| m.annotations.has(AnnotationKind::Benchmark))
            .map(|m| Declared::new(holder, m))
            .collect();
        let mut graph = StateGraph::new("generated");
        graph.bind_methods(model, holder, methods, &mut Identifiers::new())?;
        Ok(graph)
    }

    fn bench(params: &[(&str, &str)]) -> ClassInfo {
        let mut m = MethodInfo::new("measure").annotate(Annotation::Benchmark);
        for (n, t) in params {
            m = m.param(*n, *t);
        }
        ClassInfo::new("org.a.Bench").method(m)
    }

    #[test]
    fn should_bind_holder_implicitly_with_thread_scope_when_no_state() {
        let model = ClassModel::from_classes([
            bench(&[("s", "org.a.S")]),
            ClassInfo::new("org.a.S").state(Scope::Thread),
        ]);
        let graph = bind(&model, "org.a.Bench").unwrap();
        let holder = graph.state(graph.holder().unwrap());
        assert!(holder.implicit);
        assert_eq!(holder.scope, Scope::Thread);
        assert_eq!(graph.args("measure").len(), 1);
        assert_eq!(graph.states().len(), 2);
    }

    #[test]
    fn should_order_dependencies_after_dependents() {
        let model = ClassModel::from_classes([
            bench(&[("a", "org.a.A")]),
            ClassInfo::new("org.a.A")
                .state(Scope::Benchmark)
                .method(MethodInfo::new("init").param("b", "org.a.B").annotate(setup(Level::Trial))),
            ClassInfo::new("org.a.B")
                .state(Scope::Benchmark)
                .method(MethodInfo::new("init").param("c", "org.a.C").annotate(setup(Level::Iteration))),
            ClassInfo::new("org.a.C").state(Scope::Thread),
        ]);
        let graph = bind(&model, "org.a.Bench").unwrap();
        let names = |ids: Vec<StateId>| -> Vec<String> {
            ids.into_iter()
                .map(|id| graph.state(id).user_type.clone())
                .collect()
        };
        let forward = names(graph.state_order("measure", true));
        assert_eq!(forward, ["org.a.Bench", "org.a.A", "org.a.B", "org.a.C"]);

        let mut reverse = names(graph.state_order("measure", false));
        reverse.reverse();
        assert_eq!(reverse, forward);

        let init = names(graph.init_order("measure"));
        assert_eq!(init, ["org.a.Bench", "org.a.C", "org.a.B", "org.a.A"]);
    }

    #[test]
    fn should_initialize_dependency_first_when_it_is_also_a_root() {
        let model = ClassModel::from_classes([
            bench(&[("b", "org.a.B"), ("a", "org.a.A")]),
            ClassInfo::new("org.a.A")
                .state(Scope::Thread)
                .method(MethodInfo::new("init").param("b", "org.a.B").annotate(setup(Level::Trial))),
            ClassInfo::new("org.a.B").state(Scope::Thread),
        ]);
        let graph = bind(&model, "org.a.Bench").unwrap();
        let a = graph.args("measure")[1];
        let b = graph.args("measure")[0];
        let order = graph.init_order("measure");
        let pos = |arg: MethodArg| match arg {
            MethodArg::State(id) => order.iter().position(|x| *x == id).unwrap(),
            MethodArg::Blackhole => unreachable!(),
        };
        assert!(pos(b) < pos(a));
    }

    #[test]
    fn should_share_fixture_when_type_and_scope_match() {
        let model = ClassModel::from_classes([
            ClassInfo::new("org.a.Bench")
                .method(MethodInfo::new("one").param("s", "org.a.S").annotate(Annotation::Benchmark))
                .method(MethodInfo::new("two").param("s", "org.a.S").annotate(Annotation::Benchmark)),
            ClassInfo::new("org.a.S").state(Scope::Benchmark),
        ]);
        let graph = bind(&model, "org.a.Bench").unwrap();
        assert_eq!(graph.args("one"), graph.args("two"));
        assert_eq!(graph.states().len(), 2);
    }

    #[test]
    fn should_fail_with_cycle_when_helper_graph_loops() {
        let model = ClassModel::from_classes([
            bench(&[("a", "org.a.A")]),
            ClassInfo::new("org.a.A")
                .state(Scope::Thread)
                .method(MethodInfo::new("init").param("b", "org.a.B").annotate(setup(Level::Trial))),
            ClassInfo::new("org.a.B")
                .state(Scope::Thread)
                .method(MethodInfo::new("init").param("a", "org.a.A").annotate(setup(Level::Trial))),
        ]);
        let err = bind(&model, "org.a.Bench").unwrap_err();
        match err {
            GenerationError::StateCycle { path, element } => {
                assert_eq!(path, "org.a.A -> org.a.B -> org.a.A");
                assert_eq!(element.name, "org.a.B.init(a)");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn should_allow_diamond_when_no_cycle() {
        let model = ClassModel::from_classes([
            bench(&[("a", "org.a.A"), ("b", "org.a.B")]),
            ClassInfo::new("org.a.A")
                .state(Scope::Thread)
                .method(MethodInfo::new("init").param("c", "org.a.C").annotate(setup(Level::Trial))),
            ClassInfo::new("org.a.B")
                .state(Scope::Thread)
                .method(MethodInfo::new("init").param("c", "org.a.C").annotate(setup(Level::Trial))),
            ClassInfo::new("org.a.C").state(Scope::Thread),
        ]);
        let graph = bind(&model, "org.a.Bench").unwrap();
        assert_eq!(graph.state_order("measure", true).len(), 4);
    }

    #[test]
    fn should_record_params_with_declaring_class() {
        let model = ClassModel::from_classes([
            bench(&[("s", "org.a.S")]),
            ClassInfo::new("org.a.Base").field(
                FieldInfo::new("size", "int").annotate(Annotation::Param {
                    values: vec!["1".into(), "2".into()],
                }),
            ),
            ClassInfo::new("org.a.S").extends("org.a.Base").state(Scope::Thread),
        ]);
        let graph = bind(&model, "org.a.Bench").unwrap();
        let params: Vec<_> = graph.params().collect();
        assert_eq!(params.len(), 1);
        assert_eq!(params[0].declaring_class, "org.a.Base");
        assert_eq!(params[0].values, ["1", "2"]);
    }

    #[test]
    fn should_collect_aux_counters_from_fields_and_methods() {
        let model = ClassModel::from_classes([
            bench(&[("c", "org.a.Counters")]),
            ClassInfo::new("org.a.Counters")
                .state(Scope::Thread)
                .annotate(Annotation::AuxCounters {
                    kind: crate::metadata::AuxCounterKind::Events,
                })
                .field(FieldInfo::new("hits", "long"))
                .method(MethodInfo::new("misses").returns("int"))
                .method(MethodInfo::new("reset").annotate(setup(Level::Iteration))),
        ]);
        let graph = bind(&model, "org.a.Bench").unwrap();
        let aux = graph.aux_counters("measure");
        let accessors: Vec<_> = aux.iter().map(|c| c.accessor.as_str()).collect();
        assert_eq!(accessors, ["hits", "misses()"]);
    }

    #[test]
    fn should_reject_colliding_aux_counter_names() {
        let counters = |name: &str| {
            ClassInfo::new(name)
                .state(Scope::Thread)
                .annotate(Annotation::AuxCounters {
                    kind: Default::default(),
                })
                .field(FieldInfo::new("hits", "int"))
        };
        let model = ClassModel::from_classes([
            bench(&[("a", "org.a.C1"), ("b", "org.a.C2")]),
            counters("org.a.C1"),
            counters("org.a.C2"),
        ]);
        let err = bind(&model, "org.a.Bench").unwrap_err();
        assert!(err.to_string().contains("Conflicting @AuxCounters"));
    }

    #[test]
    fn should_reject_aux_counters_on_shared_state() {
        let model = ClassModel::from_classes([
            bench(&[("a", "org.a.C")]),
            ClassInfo::new("org.a.C")
                .state(Scope::Benchmark)
                .annotate(Annotation::AuxCounters {
                    kind: Default::default(),
                }),
        ]);
        assert!(bind(&model, "org.a.Bench").is_err());
    }

    #[test]
    fn should_map_blackhole_parameter() {
        let model = ClassModel::from_classes([bench(&[("bh", infra::BLACKHOLE)])]);
        let graph = bind(&model, "org.a.Bench").unwrap();
        assert_eq!(graph.args("measure"), [MethodArg::Blackhole]);
    }
}
