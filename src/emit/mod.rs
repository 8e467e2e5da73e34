//! Code emission: harness and fixture sources for one method group.
//!
//! A harness is one Rust module holding a struct with a cached slot per
//! thread fixture, static slots for shared fixtures, one dispatch method per
//! timing mode, the measured stubs and the fixture accessors. Fixture
//! wrappers are separate modules so harnesses of different groups can share
//! them. Each generated item is the only item of a module named after it.

pub mod fixtures;
pub mod modes;
pub mod padding;
pub mod writer;

use crate::group::MethodGroup;
use crate::hints::{CompilerHints, HintAction};
use crate::metadata::MetadataSource;
use crate::state::{StateGraph, StateObject};
use modes::LoopEmitter;
use padding::Padding;
use writer::SourceWriter;

/// One generated source file, keyed by the dotted qualified name of what it
/// defines.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeneratedSource {
    pub qualified_name: String,
    pub text: String,
}

/// Settings the emitter reads from the generator configuration.
#[derive(Debug, Clone, Copy)]
pub struct EmitOptions {
    pub samples_per_ms: u32,
    pub force_inline_helpers: bool,
}

/// Render the harness of `group` and register the compiler hints its
/// structure calls for.
pub fn emit_harness(
    source: &dyn MetadataSource,
    generated_package: &str,
    group: &MethodGroup<'_>,
    graph: &StateGraph,
    options: EmitOptions,
    hints: &mut CompilerHints,
) -> GeneratedSource {
    let qualified_name = group.generated_class(generated_package);
    let name = group.generated_simple_name();
    let emitter = LoopEmitter::new(group, graph);

    let mut w = SourceWriter::new();
    w.line(format!(
        "//! Measurement harness for `{}` group `{}`.",
        group.holder.qualified_name, group.name
    ))
    .line("//!")
    .line("//! Generated code, do not edit.")
    .blank()
    .line("#![allow(non_snake_case, non_upper_case_globals, unused_variables, unused_mut, clippy::all)]")
    .blank()
    .line("use std::collections::BTreeMap;")
    .line("use std::sync::atomic::Ordering;")
    .line("use std::sync::{Arc, Mutex};")
    .line("use std::time::{Duration, Instant};")
    .blank()
    .line("use cntryl_microbench::runtime::*;")
    .blank();

    let statics: Vec<String> = graph.states().iter().filter_map(fixtures::render_static).collect();
    for s in &statics {
        w.line(s);
    }
    if !statics.is_empty() {
        w.blank();
    }

    w.line("#[derive(Default)]")
        .open(format!("pub struct {name} {{"))
        .line("sample_rnd_mask: i32,");
    for state in graph.states() {
        w.line(fixtures::render_field(state));
    }
    w.close("}").blank();

    w.open(format!("impl {name} {{"))
        .line(format!(
            "const OPS_PER_INVOCATION: i32 = {};",
            group.ops_per_invocation()
        ))
        .line(format!(
            "const SAMPLES_PER_MS: u32 = {};",
            options.samples_per_ms
        ))
        .blank()
        .open("pub fn new() -> Self {")
        .line("Self::default()")
        .close("}");

    for &mode in &group.modes {
        w.blank().block(&emitter.render_dispatch(mode));
        for (stub, text) in emitter.render_stubs(mode) {
            w.blank().block(&text);
            hints.register(&format!("{qualified_name}.{stub}"), HintAction::DontInline);
        }
    }
    for state in graph.states() {
        w.blank().block(&fixtures::render_accessor(graph, state));
    }
    w.close("}");

    if options.force_inline_helpers {
        for member in &group.members {
            hints.register_method(source, member.method, HintAction::ForceInline);
        }
        register_helper_hints(source, graph, hints);
    }

    GeneratedSource {
        qualified_name,
        text: w.finish(),
    }
}

fn register_helper_hints(source: &dyn MetadataSource, graph: &StateGraph, hints: &mut CompilerHints) {
    for state in graph.states() {
        for helper in &state.helpers {
            let Some(owner) = source.resolve(&helper.declaring_class) else {
                continue;
            };
            if let Some(method) = owner.methods.iter().find(|m| m.name == helper.method) {
                hints.register_method(
                    source,
                    crate::metadata::Declared::new(owner, method),
                    HintAction::ForceInline,
                );
            }
        }
    }
}

/// Render the wrapper type of one fixture.
pub fn emit_fixture(state: &StateObject, padding: &mut Padding) -> GeneratedSource {
    GeneratedSource {
        qualified_name: fixtures::fixture_class(state),
        text: fixtures::render_fixture(state, padding),
    }
}
