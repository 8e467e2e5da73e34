//! The generation pass.
//!
//! [`BenchmarkGenerator::generate`] walks every class of a metadata source,
//! generates harnesses for the ones declaring benchmark methods and reports
//! problems through the destination. A failing class never stops the pass.
//! [`BenchmarkGenerator::complete`] writes the benchmark list and compiler
//! hints once every pass is done.

use std::collections::HashSet;
use std::panic::{self, AssertUnwindSafe};

use tracing::{debug, info, warn};

use crate::benchmark_list::{self, BenchmarkList, BenchmarkListEntry};
use crate::config::GeneratorConfig;
use crate::destination::GeneratorDestination;
use crate::emit::padding::Padding;
use crate::emit::{emit_fixture, emit_harness, EmitOptions, GeneratedSource};
use crate::error::{ElementRef, GenerationError, Result};
use crate::group::{assemble, MethodGroup};
use crate::hints::{self, CompilerHints};
use crate::identifiers::Identifiers;
use crate::metadata::hierarchy::all_methods;
use crate::metadata::{AnnotationKind, ClassInfo, Level, MetadataSource};
use crate::state::StateGraph;
use crate::validate::{validate_benchmark, validate_group};

/// Everything one class produced, written only once the whole class
/// generated cleanly.
struct ClassOutput {
    sources: Vec<GeneratedSource>,
    entries: Vec<BenchmarkListEntry>,
    hints: CompilerHints,
    warnings: Vec<(String, ElementRef)>,
    fixtures: Vec<String>,
}

/// Generator state for one build. Call [`generate`](Self::generate) once per
/// pass, then [`complete`](Self::complete).
#[derive(Debug)]
pub struct BenchmarkGenerator {
    config: GeneratorConfig,
    processed: HashSet<String>,
    entries: Vec<BenchmarkListEntry>,
    hints: CompilerHints,
    identifiers: Identifiers,
    padding: Padding,
    emitted_fixtures: HashSet<String>,
}

impl BenchmarkGenerator {
    pub fn new(config: GeneratorConfig) -> Self {
        let padding = Padding::new(config.padding_fields);
        Self {
            config,
            processed: HashSet::new(),
            entries: Vec::new(),
            hints: CompilerHints::new(),
            identifiers: Identifiers::new(),
            padding,
            emitted_fixtures: HashSet::new(),
        }
    }

    pub fn config(&self) -> &GeneratorConfig {
        &self.config
    }

    /// Entries collected so far, in list order.
    pub fn benchmark_list(&self) -> BenchmarkList {
        BenchmarkList::new(self.entries.clone())
    }

    pub fn hints(&self) -> &CompilerHints {
        &self.hints
    }

    /// Whether `class` was already handled by an earlier pass.
    pub fn is_processed(&self, class: &str) -> bool {
        self.processed.contains(class)
    }

    /// Generate harnesses for every unprocessed benchmark class in `source`.
    /// Returns how many classes were generated without error.
    pub fn generate(
        &mut self,
        source: &dyn MetadataSource,
        dest: &mut dyn GeneratorDestination,
    ) -> usize {
        let candidates: Vec<&ClassInfo> = source
            .classes()
            .into_iter()
            .filter(|c| !c.is_abstract() && !c.is_enum)
            .filter(|c| !self.processed.contains(&c.qualified_name))
            .filter(|c| self.config.accepts(&c.qualified_name))
            .filter(|c| {
                all_methods(source, c)
                    .iter()
                    .any(|m| m.annotations.has(AnnotationKind::Benchmark))
            })
            .collect();

        let mut generated = 0;
        for class in candidates {
            self.processed.insert(class.qualified_name.clone());
            debug!(class = %class.qualified_name, "generating benchmark class");

            let outcome = panic::catch_unwind(AssertUnwindSafe(|| self.generate_class(source, class)))
                .unwrap_or_else(|payload| {
                    Err(GenerationError::Internal {
                        message: panic_message(payload.as_ref()),
                    })
                });

            match outcome {
                Ok(output) => {
                    if self.accept(output, dest) {
                        generated += 1;
                    }
                }
                Err(e) => report_error(dest, &e),
            }
        }
        generated
    }

    fn generate_class(&mut self, source: &dyn MetadataSource, class: &ClassInfo) -> Result<ClassOutput> {
        let methods: Vec<_> = all_methods(source, class)
            .into_iter()
            .filter(|m| m.annotations.has(AnnotationKind::Benchmark))
            .collect();
        validate_benchmark(source, class, &methods)?;

        let mut info = assemble(source, class, &methods, &self.config)?;
        let mut output = ClassOutput {
            sources: Vec::new(),
            entries: Vec::new(),
            hints: CompilerHints::new(),
            warnings: Vec::new(),
            fixtures: Vec::new(),
        };
        output.hints.collect_explicit(source, class);

        let options = EmitOptions {
            samples_per_ms: self.config.samples_per_ms,
            force_inline_helpers: self.config.force_inline_helpers,
        };

        for group in &mut info.groups {
            validate_group(source, group)?;
            for c in &group.conflicts {
                output.warnings.push((
                    format!(
                        "Conflicting @{} values in group \"{}\": using {}, ignoring {} declared on {}",
                        c.knob, group.name, c.chosen, c.ignored, c.method
                    ),
                    ElementRef::class(class),
                ));
            }

            let mut graph = StateGraph::new(self.config.generated_package_suffix.clone());
            graph.bind_methods(
                source,
                class,
                group.members.iter().map(|m| m.method),
                &mut self.identifiers,
            )?;
            group.resolve_params(&graph)?;

            for state in graph.states() {
                if state.scope.is_shared() && state.has_helpers_at(Level::Invocation) {
                    output.warnings.push((
                        format!(
                            "Level.Invocation helpers on {}-scoped state {} run under a lock \
                             inside the measured loop and may distort the results.",
                            state.scope.name(),
                            state.user_type
                        ),
                        ElementRef::class(class),
                    ));
                }
            }

            output.sources.push(emit_harness(
                source,
                &info.generated_package,
                group,
                &graph,
                options,
                &mut output.hints,
            ));
            for state in graph.states() {
                let fixture = emit_fixture(state, &mut self.padding);
                if self.emitted_fixtures.contains(&fixture.qualified_name)
                    || output.fixtures.contains(&fixture.qualified_name)
                {
                    continue;
                }
                output.fixtures.push(fixture.qualified_name.clone());
                output.sources.push(fixture);
            }

            output
                .entries
                .extend(list_entries(group, &info.generated_package));
            debug!(
                class = %class.qualified_name,
                group = %group.name,
                states = graph.states().len(),
                modes = group.modes.len(),
                "generated method group"
            );
        }
        Ok(output)
    }

    /// Write one class's sources and fold its entries and hints into the
    /// pass. Returns false when a write failed.
    fn accept(&mut self, output: ClassOutput, dest: &mut dyn GeneratorDestination) -> bool {
        for (message, element) in &output.warnings {
            dest.print_warning_at(message, element);
        }
        let mut written = HashSet::new();
        for src in &output.sources {
            match dest.write_class(&src.qualified_name, &src.text) {
                Ok(()) => {
                    written.insert(src.qualified_name.as_str());
                }
                Err(e) => dest.print_error_caused(
                    &format!("Unable to write generated source {}", src.qualified_name),
                    &e,
                ),
            }
        }
        let ok = written.len() == output.sources.len();
        self.emitted_fixtures.extend(
            output
                .fixtures
                .into_iter()
                .filter(|f| written.contains(f.as_str())),
        );
        self.entries.extend(
            output
                .entries
                .into_iter()
                .filter(|e| written.contains(e.generated_class.as_str())),
        );
        // Stub hints name harness methods, so they only hold for a fully written class.
        if ok {
            self.hints.merge(&output.hints);
        }
        ok
    }

    /// Write the benchmark list and compiler hints, merged with what an
    /// earlier build left in the destination for classes not seen here.
    pub fn complete(&mut self, dest: &mut dyn GeneratorDestination) {
        let mut entries = self.entries.clone();
        match dest.read_resource(benchmark_list::RESOURCE) {
            Ok(Some(text)) => match BenchmarkList::read(&text) {
                Ok(previous) => entries.extend(
                    previous
                        .entries()
                        .iter()
                        .filter(|e| !self.processed.contains(&e.user_class))
                        .cloned(),
                ),
                Err(e) => {
                    warn!(error = %e, "discarding unreadable benchmark list");
                    dest.print_warning(&format!("Discarding previous benchmark list: {e}"));
                }
            },
            Ok(None) => {}
            Err(e) => dest.print_error_caused("Unable to read previous benchmark list", &e),
        }
        let list = BenchmarkList::new(entries);

        let mut hints = self.hints.clone();
        match dest.read_resource(hints::RESOURCE) {
            Ok(Some(text)) => hints.merge(&CompilerHints::parse(&text)),
            Ok(None) => {}
            Err(e) => dest.print_error_caused("Unable to read previous compiler hints", &e),
        }

        if let Err(e) = dest.write_resource(benchmark_list::RESOURCE, &list.render()) {
            dest.print_error_caused(
                &format!("Unable to write {}", benchmark_list::RESOURCE),
                &e,
            );
        }
        if let Err(e) = dest.write_resource(hints::RESOURCE, &hints.render()) {
            dest.print_error_caused(&format!("Unable to write {}", hints::RESOURCE), &e);
        }
        if let Err(e) = dest.finish() {
            dest.print_error_caused("Unable to finish generated sources", &e);
        }
        info!(
            benchmarks = list.entries().len(),
            hints = hints.len(),
            "benchmark generation complete"
        );
    }
}

/// One list entry per mode of `group`.
fn list_entries(group: &MethodGroup<'_>, generated_package: &str) -> Vec<BenchmarkListEntry> {
    let knobs = &group.knobs;
    let labels = group.thread_group_labels();
    group
        .modes
        .iter()
        .map(|&mode| {
            let mut e = BenchmarkListEntry::new(
                group.holder.qualified_name.clone(),
                group.generated_class(generated_package),
                group.name.clone(),
                mode,
            );
            e.threads = knobs.threads;
            e.thread_groups = group.thread_groups();
            e.thread_group_labels = (!labels.is_empty()).then(|| labels.clone());
            e.warmup_iterations = knobs.warmup_iterations;
            e.warmup_time = knobs.warmup_time;
            e.warmup_batch_size = knobs.warmup_batch_size;
            e.measurement_iterations = knobs.measurement_iterations;
            e.measurement_time = knobs.measurement_time;
            e.measurement_batch_size = knobs.measurement_batch_size;
            e.forks = knobs.forks;
            e.warmup_forks = knobs.warmup_forks;
            e.fork_executable = knobs.fork_executable.clone();
            e.fork_args = knobs.fork_args.clone();
            e.fork_args_prepend = knobs.fork_args_prepend.clone();
            e.fork_args_append = knobs.fork_args_append.clone();
            e.params = (!group.params.is_empty()).then(|| group.params.clone());
            e.time_unit = Some(group.time_unit(mode));
            e.ops_per_invocation = knobs.ops_per_invocation;
            e.timeout = knobs.timeout;
            e
        })
        .collect()
}

fn report_error(dest: &mut dyn GeneratorDestination, e: &GenerationError) {
    match e {
        GenerationError::Internal { .. } => dest.print_error_caused(
            "Annotation generator had thrown the exception.",
            e,
        ),
        _ => match e.element() {
            Some(element) => dest.print_error_at(&e.to_string(), element),
            None => dest.print_error(&e.to_string()),
        },
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
