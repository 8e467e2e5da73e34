//! Fixture wrapper types and the harness code that creates, guards and
//! releases fixtures.
//!
//! A wrapper is laid out as user value, padding, lifecycle flags and
//! mutexes, padding. Thread fixtures live in a harness field; benchmark
//! fixtures in a static slot; group fixtures in a static map keyed by group
//! index. Shared slots are locked while a fixture is looked up or created,
//! and shared helper calls run under the fixture's spin mutex for their
//! level.

use super::padding::Padding;
use super::writer::SourceWriter;
use crate::metadata::{package_path, Level, Scope};
use crate::state::{HelperInvocation, HelperKind, StateGraph, StateObject};

/// Qualified name of the wrapper type.
pub fn fixture_class(state: &StateObject) -> String {
    format!("{}.{}", state.package, state.fixture_type)
}

/// Path of the wrapper type in generated code. Every generated item lives
/// in a module file named after it, so the type sits one level below its
/// module.
pub fn fixture_path(state: &StateObject) -> String {
    let name = &state.fixture_type;
    format!("{}::{name}::{name}", package_path(&state.package))
}

/// Name of the static slot holding a shared fixture.
pub fn static_slot(state: &StateObject) -> String {
    state.field_identifier.to_uppercase()
}

pub fn accessor_name(state: &StateObject) -> String {
    format!("try_init_{}", state.field_identifier)
}

/// Borrow of the user value handed to measured code. Shared fixtures are
/// reached by every worker at once and lend `&User` only.
pub fn measured_ref(state: &StateObject) -> String {
    let accessor = if state.scope.is_shared() { "shared" } else { "user" };
    format!("{}.{accessor}()", state.local_identifier)
}

/// Source of the wrapper type for one fixture.
pub fn render_fixture(state: &StateObject, padding: &mut Padding) -> String {
    let name = &state.fixture_type;
    let user = &state.user_path;
    let mut w = SourceWriter::new();
    w.line(format!("//! Fixture wrapper for `{}`.", state.user_type))
        .blank()
        .line("#![allow(non_camel_case_types, dead_code)]")
        .blank()
        .line("use std::cell::UnsafeCell;")
        .line("use std::ops::Deref;")
        .line("use std::sync::atomic::AtomicBool;")
        .blank()
        .line("use cntryl_microbench::runtime::SpinMutex;")
        .blank();

    w.line("#[repr(C)]")
        .open(format!("pub struct {name}_B1 {{"))
        .line(format!("value: UnsafeCell<{user}>,"))
        .close("}")
        .blank();

    padded_layer(&mut w, &format!("{name}_B2"), padding.fields("b2"));

    w.line("#[repr(C)]")
        .line("#[derive(Default)]")
        .open(format!("pub struct {name}_B3 {{"));
    for level in Level::ALL {
        w.line(format!("pub ready_{}: AtomicBool,", level.name()));
    }
    for level in Level::ALL {
        w.line(format!("pub setup_{}_mutex: SpinMutex,", level.name()))
            .line(format!("pub teardown_{}_mutex: SpinMutex,", level.name()));
    }
    w.close("}").blank();

    padded_layer(&mut w, &format!("{name}_B4"), padding.fields("b4"));

    w.line("#[repr(C)]")
        .open(format!("pub struct {name} {{"))
        .line(format!("b1: {name}_B1,"))
        .line(format!("b2: {name}_B2,"))
        .line(format!("b3: {name}_B3,"))
        .line(format!("b4: {name}_B4,"))
        .close("}")
        .blank();

    w.line(
        "// SAFETY: `user()` lends `&mut` to one worker at a time. Thread fixtures \
         are reached by their own worker only. Shared fixtures lend `&mut` to \
         helpers running under a spin mutex while siblings wait at a control \
         barrier, and lend `&` through `shared()` while measuring, which \
         requires the user type to be `Sync`.",
    )
    .line(format!("unsafe impl Sync for {name} {{}}"))
    .blank();
    if state.scope.is_shared() {
        w.open("const _: fn() = || {")
            .line("fn assert_sync<T: ?Sized + Sync>() {}")
            .line(format!("assert_sync::<{user}>();"))
            .close("};")
            .blank();
    }

    w.open(format!("impl {name} {{"));
    if !state.is_copy_initialized() {
        w.open("pub fn new() -> Self {")
            .line(format!("Self::with_value(<{user}>::default())"))
            .close("}")
            .blank();
    }
    w.open(format!("pub fn with_value(value: {user}) -> Self {{"))
        .open("Self {")
        .line(format!("b1: {name}_B1 {{ value: UnsafeCell::new(value) }},"))
        .line("b2: Default::default(),")
        .line("b3: Default::default(),")
        .line("b4: Default::default(),")
        .close("}")
        .close("}")
        .blank()
        .line("#[allow(clippy::mut_from_ref)]")
        .open(format!("pub fn user(&self) -> &mut {user} {{"))
        .line("// SAFETY: see the Sync impl above.")
        .line("unsafe { &mut *self.b1.value.get() }")
        .close("}")
        .blank()
        .open(format!("pub fn shared(&self) -> &{user} {{"))
        .line("// SAFETY: see the Sync impl above.")
        .line("unsafe { &*self.b1.value.get() }")
        .close("}")
        .close("}")
        .blank();

    w.open(format!("impl Deref for {name} {{"))
        .line(format!("type Target = {name}_B3;"))
        .blank()
        .open("fn deref(&self) -> &Self::Target {")
        .line("&self.b3")
        .close("}")
        .close("}");
    w.finish()
}

fn padded_layer(w: &mut SourceWriter, name: &str, fields: &str) {
    w.line("#[repr(C)]")
        .line("#[derive(Default)]")
        .open(format!("pub struct {name} {{"))
        .block(fields)
        .close("}")
        .blank();
}

/// Static slot declaration for a shared fixture; `None` for thread fixtures.
pub fn render_static(state: &StateObject) -> Option<String> {
    let ty = fixture_path(state);
    let slot = static_slot(state);
    match state.scope {
        Scope::Thread => None,
        Scope::Benchmark => Some(format!(
            "static {slot}: Mutex<Option<Arc<{ty}>>> = Mutex::new(None);"
        )),
        Scope::Group => Some(format!(
            "static {slot}: Mutex<BTreeMap<i32, Arc<{ty}>>> = Mutex::new(BTreeMap::new());"
        )),
    }
}

/// Harness struct field caching this worker's handle to the fixture.
pub fn render_field(state: &StateObject) -> String {
    format!("{}: Option<Arc<{}>>,", state.field_identifier, fixture_path(state))
}

/// Expression creating a fresh wrapper.
fn constructor(state: &StateObject) -> String {
    let ty = fixture_path(state);
    match state.user_type.as_str() {
        crate::metadata::infra::BENCHMARK_PARAMS => {
            format!("{ty}::with_value(control.benchmark_params().clone())")
        }
        crate::metadata::infra::ITERATION_PARAMS => {
            format!("{ty}::with_value(control.iteration_params().clone())")
        }
        crate::metadata::infra::THREAD_PARAMS => format!("{ty}::with_value(thread_params.clone())"),
        _ => format!("{ty}::new()"),
    }
}

/// Call of one helper on `receiver`, passing dependency locals.
pub fn helper_call(graph: &StateGraph, receiver: &str, helper: &HelperInvocation) -> String {
    let args: Vec<String> = helper
        .arguments
        .iter()
        .map(|id| format!("{}.user()", graph.state(*id).local_identifier))
        .collect();
    format!("{receiver}.user().{}({});", helper.method, args.join(", "))
}

/// Lazy accessor creating the fixture on first use, injecting params and
/// running trial setup once.
pub fn render_accessor(graph: &StateGraph, state: &StateObject) -> String {
    let ty = fixture_path(state);
    let field = &state.field_identifier;
    let mut signature = vec![
        "&mut self".to_string(),
        "control: &InfraControl".to_string(),
        "thread_params: &ThreadParams".to_string(),
    ];
    for dep in state.dependencies() {
        let dep = graph.state(dep);
        signature.push(format!("{}: &{}", dep.local_identifier, fixture_path(dep)));
    }

    let mut w = SourceWriter::new();
    w.open(format!(
        "fn {}({}) -> Result<Arc<{ty}>, HarnessError> {{",
        accessor_name(state),
        signature.join(", ")
    ))
    .open(format!("if let Some(val) = &self.{field} {{"))
    .line("return Ok(Arc::clone(val));")
    .close("}");

    match state.scope {
        Scope::Thread => {
            w.line(format!("let val = Arc::new({});", constructor(state)));
            trial_setup(&mut w, graph, state);
        }
        Scope::Benchmark | Scope::Group => {
            let slot = static_slot(state);
            w.open("let val = {")
                .line(format!("let mut slot = lock_slot(&{slot})?;"))
                .open("if control.is_failing() {")
                .line("return Err(HarnessError::FailureInOtherThread);")
                .close("}");
            if state.scope == Scope::Benchmark {
                w.line(format!(
                    "Arc::clone(slot.get_or_insert_with(|| Arc::new({})))",
                    constructor(state)
                ));
            } else {
                w.line(format!(
                    "Arc::clone(slot.entry(thread_params.group_index()).or_insert_with(|| Arc::new({})))",
                    constructor(state)
                ));
            }
            w.close("};")
                .open("if !val.ready_trial.load(Ordering::Acquire) {")
                .line("let _guard = val.setup_trial_mutex.lock(control)?;")
                .open("if !val.ready_trial.load(Ordering::Acquire) {");
            trial_setup(&mut w, graph, state);
            w.close("}").close("}");
        }
    }
    w.line(format!("self.{field} = Some(Arc::clone(&val));"))
        .line("Ok(val)")
        .close("}");
    w.finish()
}

fn trial_setup(w: &mut SourceWriter, graph: &StateGraph, state: &StateObject) {
    for param in &state.params {
        w.line(format!(
            "control.inject_param(val.user(), \"{}\", \"{}\")?;",
            param.declaring_class, param.name
        ));
    }
    for h in state.helpers_at(HelperKind::Setup, Level::Trial) {
        w.line(helper_call(graph, "val", h));
    }
    w.line("val.ready_trial.store(true, Ordering::Release);");
}

/// Setup helpers of one level for one fixture. Shared fixtures run them
/// once under the level's spin mutex and mark the level ready; every
/// fixture with helpers at the level goes through the ready flag so the
/// matching teardown knows setup happened.
pub fn render_level_setup(graph: &StateGraph, state: &StateObject, level: Level) -> Option<String> {
    if !state.has_helpers_at(level) {
        return None;
    }
    let l = &state.local_identifier;
    let name = level.name();
    let mut w = SourceWriter::new();
    if state.scope.is_shared() {
        w.open("{")
            .line(format!("let _guard = {l}.setup_{name}_mutex.lock(control)?;"))
            .open(format!("if !{l}.ready_{name}.load(Ordering::Acquire) {{"));
        for h in state.helpers_at(HelperKind::Setup, level) {
            w.line(helper_call(graph, l, h));
        }
        w.line(format!("{l}.ready_{name}.store(true, Ordering::Release);"))
            .close("}")
            .close("}");
    } else {
        for h in state.helpers_at(HelperKind::Setup, level) {
            w.line(helper_call(graph, l, h));
        }
        w.line(format!("{l}.ready_{name}.store(true, Ordering::Release);"));
    }
    Some(w.finish())
}

/// Teardown helpers of one level for one fixture, mirroring
/// [`render_level_setup`].
pub fn render_level_teardown(graph: &StateGraph, state: &StateObject, level: Level) -> Option<String> {
    if !state.has_helpers_at(level) {
        return None;
    }
    let l = &state.local_identifier;
    let name = level.name();
    let mut w = SourceWriter::new();
    if state.scope.is_shared() {
        w.open("{")
            .line(format!("let _guard = {l}.teardown_{name}_mutex.lock(control)?;"));
    }
    w.open(format!("if {l}.ready_{name}.load(Ordering::Acquire) {{"));
    for h in state.helpers_at(HelperKind::TearDown, level) {
        w.line(helper_call(graph, l, h));
    }
    w.line(format!("{l}.ready_{name}.store(false, Ordering::Release);"))
        .close("}");
    if state.scope.is_shared() {
        w.close("}");
    }
    Some(w.finish())
}

/// Trial teardown on the last iteration, then release of the fixture so the
/// next trial starts from a fresh instance.
pub fn render_trial_teardown(graph: &StateGraph, state: &StateObject) -> String {
    let mut w = SourceWriter::new();
    let trial_helpers = state.has_helpers_at(Level::Trial);
    if trial_helpers || !state.params.is_empty() {
        let l = &state.local_identifier;
        if state.scope.is_shared() {
            w.open("{")
                .line(format!("let _guard = {l}.teardown_trial_mutex.lock(control)?;"));
        }
        w.open(format!("if {l}.ready_trial.load(Ordering::Acquire) {{"));
        for h in state.helpers_at(HelperKind::TearDown, Level::Trial) {
            w.line(helper_call(graph, l, h));
        }
        w.line(format!("{l}.ready_trial.store(false, Ordering::Release);"))
            .close("}");
        if state.scope.is_shared() {
            w.close("}");
        }
    }
    let slot = static_slot(state);
    match state.scope {
        Scope::Thread => {}
        Scope::Benchmark => {
            w.line(format!("lock_slot(&{slot})?.take();"));
        }
        Scope::Group => {
            w.line(format!(
                "lock_slot(&{slot})?.remove(&thread_params.group_index());"
            ));
        }
    }
    w.line(format!("self.{} = None;", state.field_identifier));
    w.finish()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identifiers::Identifiers;
    use crate::metadata::{Annotation, ClassInfo, ClassModel, Declared, FieldInfo, MetadataSource, MethodInfo};

    fn graph(model: &ClassModel) -> StateGraph {
        let holder = model.resolve("org.a.B").unwrap();
        let methods: Vec<_> = holder.methods.iter().map(|m| Declared::new(holder, m)).collect();
        let mut graph = StateGraph::new("generated");
        graph
            .bind_methods(model, holder, methods, &mut Identifiers::new())
            .unwrap();
        graph
    }

    fn model(scope: Scope) -> ClassModel {
        ClassModel::from_classes([
            ClassInfo::new("org.a.B").method(
                MethodInfo::new("measure")
                    .param("s", "org.a.S")
                    .annotate(Annotation::Benchmark),
            ),
            ClassInfo::new("org.a.S")
                .state(scope)
                .field(FieldInfo::new("size", "int").annotate(Annotation::Param {
                    values: vec!["1".into()],
                }))
                .method(MethodInfo::new("init").annotate(Annotation::Setup { level: Level::Trial }))
                .method(MethodInfo::new("reset").annotate(Annotation::Setup {
                    level: Level::Iteration,
                }))
                .method(MethodInfo::new("close").annotate(Annotation::TearDown {
                    level: Level::Trial,
                })),
        ])
    }

    fn state<'g>(graph: &'g StateGraph, ty: &str) -> &'g StateObject {
        graph.states().iter().find(|s| s.user_type == ty).unwrap()
    }

    #[test]
    fn should_layer_wrapper_with_padding() {
        let model = model(Scope::Thread);
        let graph = graph(&model);
        let text = render_fixture(state(&graph, "org.a.S"), &mut Padding::new(32));
        let b1 = text.find("pub struct S_Fixture_B1").unwrap();
        let b2 = text.find("pub struct S_Fixture_B2").unwrap();
        let b3 = text.find("pub struct S_Fixture_B3").unwrap();
        let b4 = text.find("pub struct S_Fixture_B4").unwrap();
        assert!(b1 < b2 && b2 < b3 && b3 < b4);
        assert!(text.contains("pad_b2_031: u8,"));
        assert!(text.contains("pub setup_iteration_mutex: SpinMutex,"));
        assert!(text.contains("value: UnsafeCell<crate::org::a::S>,"));
        assert!(text.contains("pub fn new() -> Self"));
        assert!(!text.contains("assert_sync"));
    }

    #[test]
    fn should_require_sync_user_type_for_shared_fixtures() {
        for scope in [Scope::Benchmark, Scope::Group] {
            let model = model(scope);
            let graph = graph(&model);
            let s = state(&graph, "org.a.S");
            let text = render_fixture(s, &mut Padding::new(0));
            assert!(text.contains("assert_sync::<crate::org::a::S>();"));
            assert!(text.contains("pub fn shared(&self) -> &crate::org::a::S {"));
            assert_eq!(measured_ref(s), format!("{}.shared()", s.local_identifier));
        }
        let model = model(Scope::Thread);
        let graph = graph(&model);
        let s = state(&graph, "org.a.S");
        assert_eq!(measured_ref(s), format!("{}.user()", s.local_identifier));
    }

    #[test]
    fn should_name_wrapper_inside_its_own_module() {
        let model = model(Scope::Benchmark);
        let graph = graph(&model);
        let s = state(&graph, "org.a.S");
        assert_eq!(fixture_path(s), "crate::org::a::generated::S_Fixture::S_Fixture");
        assert!(render_field(s).ends_with("Option<Arc<crate::org::a::generated::S_Fixture::S_Fixture>>,"));
    }

    #[test]
    fn should_copy_initialize_harness_params() {
        let model = ClassModel::from_classes([ClassInfo::new("org.a.B").method(
            MethodInfo::new("measure")
                .param("tp", crate::metadata::infra::THREAD_PARAMS)
                .annotate(Annotation::Benchmark),
        )]);
        let graph = graph(&model);
        let tp = state(&graph, crate::metadata::infra::THREAD_PARAMS);
        assert!(!render_fixture(tp, &mut Padding::new(0)).contains("pub fn new()"));
        assert!(render_accessor(&graph, tp).contains("with_value(thread_params.clone())"));
    }

    #[test]
    fn should_create_thread_fixture_without_locking() {
        let model = model(Scope::Thread);
        let graph = graph(&model);
        let s = state(&graph, "org.a.S");
        assert!(render_static(s).is_none());
        let text = render_accessor(&graph, s);
        assert!(!text.contains("lock_slot"));
        assert!(text.contains("control.inject_param(val.user(), \"org.a.S\", \"size\")?;"));
        assert!(text.contains("val.user().init();"));
    }

    #[test]
    fn should_guard_shared_fixture_creation() {
        for scope in [Scope::Benchmark, Scope::Group] {
            let model = model(scope);
            let graph = graph(&model);
            let s = state(&graph, "org.a.S");
            let slot = render_static(s).unwrap();
            assert!(slot.starts_with(&format!("static {}", static_slot(s))));
            let text = render_accessor(&graph, s);
            assert!(text.contains("lock_slot("));
            assert!(text.contains("setup_trial_mutex.lock(control)?"));
            if scope == Scope::Group {
                assert!(text.contains("thread_params.group_index()"));
            }
            let setup = render_level_setup(&graph, s, Level::Iteration).unwrap();
            assert!(setup.contains("setup_iteration_mutex.lock(control)?"));
            let teardown = render_trial_teardown(&graph, s);
            assert!(teardown.contains("user().close();"));
            assert!(teardown.contains("lock_slot("));
        }
    }

    #[test]
    fn should_skip_levels_without_helpers() {
        let model = model(Scope::Thread);
        let graph = graph(&model);
        let s = state(&graph, "org.a.S");
        assert!(render_level_setup(&graph, s, Level::Invocation).is_none());
        assert!(render_level_teardown(&graph, s, Level::Invocation).is_none());
    }
}
