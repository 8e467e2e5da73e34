//! Method group assembly.
//!
//! Benchmark methods are bucketed by explicit `@Group` name, or by their own
//! name when they carry none. Each group gets one effective configuration:
//! the union of declared modes and one value per configuration knob.
//!
//! Knob lookup scans the member methods in lexicographic name order and then
//! the benchmark class and its ancestors; the first value found wins. Members
//! declaring a different value are recorded as [`KnobConflict`]s so the
//! generator can warn about them.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt::Debug;

use tracing::debug;

use crate::config::{is_identifier, GeneratorConfig};
use crate::error::{ElementRef, GenerationError, Result};
use crate::metadata::hierarchy::{ancestors, annotation_recursive};
use crate::metadata::{
    Annotation, AnnotationKind, Annotations, ClassInfo, Declared, ElementKind, ForkSettings,
    IterationSettings, MetadataSource, MethodInfo,
};
use crate::mode::Mode;
use crate::state::{generated_package, StateGraph};
use crate::time::{TimeUnit, TimeValue};

/// All generated groups of one benchmark class.
#[derive(Debug)]
pub struct BenchmarkInfo<'a> {
    pub holder: &'a ClassInfo,
    pub generated_package: String,
    pub groups: Vec<MethodGroup<'a>>,
}

#[derive(Debug, Clone, Copy)]
pub struct GroupMember<'a> {
    pub method: Declared<'a, MethodInfo>,
    /// Worker threads running this member within one group instance.
    pub threads: i32,
}

impl GroupMember<'_> {
    pub fn name(&self) -> &str {
        &self.method.name
    }
}

/// Resolved configuration knobs. `None` means "not declared anywhere"; the
/// launcher applies its own defaults.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GroupKnobs {
    pub threads: Option<i32>,
    pub ops_per_invocation: Option<i32>,
    pub time_unit: Option<TimeUnit>,
    pub warmup_iterations: Option<i32>,
    pub warmup_time: Option<TimeValue>,
    pub warmup_batch_size: Option<i32>,
    pub measurement_iterations: Option<i32>,
    pub measurement_time: Option<TimeValue>,
    pub measurement_batch_size: Option<i32>,
    pub forks: Option<i32>,
    pub warmup_forks: Option<i32>,
    pub fork_executable: Option<String>,
    pub fork_args: Option<Vec<String>>,
    pub fork_args_prepend: Option<Vec<String>>,
    pub fork_args_append: Option<Vec<String>>,
    pub timeout: Option<TimeValue>,
}

/// Two members of one group declaring different values for a knob.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KnobConflict {
    pub knob: &'static str,
    pub chosen: String,
    pub ignored: String,
    pub method: String,
}

#[derive(Debug)]
pub struct MethodGroup<'a> {
    pub holder: &'a ClassInfo,
    pub name: String,
    /// Members carry an explicit `@Group`.
    pub explicit: bool,
    /// Sorted by method name.
    pub members: Vec<GroupMember<'a>>,
    pub modes: BTreeSet<Mode>,
    pub strict_fp: bool,
    pub knobs: GroupKnobs,
    /// `@Param` name to candidate values; empty when supplied at run time.
    pub params: BTreeMap<String, Vec<String>>,
    pub conflicts: Vec<KnobConflict>,
}

/// Partition `methods` into groups and resolve their configuration.
pub fn assemble<'a>(
    source: &'a dyn MetadataSource,
    holder: &'a ClassInfo,
    methods: &[Declared<'a, MethodInfo>],
    config: &GeneratorConfig,
) -> Result<BenchmarkInfo<'a>> {
    let mut buckets: BTreeMap<String, (bool, Vec<Declared<'a, MethodInfo>>)> = BTreeMap::new();
    for &method in methods {
        let (name, explicit) = match method.annotations.group() {
            Some(name) => {
                if !is_identifier(name) {
                    return Err(GenerationError::config(
                        format!("Group name should be a legal identifier: \"{name}\""),
                        ElementRef::method(method.owner, method.item),
                    ));
                }
                (name.to_string(), true)
            }
            None => (method.name.clone(), false),
        };
        let entry = buckets.entry(name).or_insert((explicit, Vec::new()));
        entry.0 &= explicit;
        entry.1.push(method);
    }

    let mut groups = Vec::with_capacity(buckets.len());
    for (name, (explicit, mut members)) in buckets {
        members.sort_by(|a, b| a.name.cmp(&b.name));
        groups.push(MethodGroup::build(source, holder, name, explicit, members, config)?);
    }

    Ok(BenchmarkInfo {
        holder,
        generated_package: generated_package(holder, &config.generated_package_suffix),
        groups,
    })
}

impl<'a> MethodGroup<'a> {
    fn build(
        source: &'a dyn MetadataSource,
        holder: &'a ClassInfo,
        name: String,
        explicit: bool,
        methods: Vec<Declared<'a, MethodInfo>>,
        config: &GeneratorConfig,
    ) -> Result<Self> {
        let mut members = Vec::with_capacity(methods.len());
        for method in methods {
            let threads = method.annotations.group_threads().unwrap_or(1);
            if threads < 1 {
                return Err(GenerationError::config(
                    format!("@GroupThreads should be positive, but was {threads}"),
                    ElementRef::method(method.owner, method.item),
                ));
            }
            members.push(GroupMember { method, threads });
        }

        let mut modes = BTreeSet::new();
        for m in &members {
            if let Some(Annotation::BenchmarkMode { modes: declared }) =
                annotation_recursive(source, m.method.item, holder, AnnotationKind::BenchmarkMode)
            {
                modes.extend(Mode::expand(declared.iter().copied()));
            }
        }
        if modes.is_empty() {
            modes.insert(config.default_mode);
        }

        let strict_fp = holder.modifiers.strict_fp
            || members.iter().any(|m| m.method.modifiers.strict_fp);

        let mut group = Self {
            holder,
            name,
            explicit,
            members,
            modes,
            strict_fp,
            knobs: GroupKnobs::default(),
            params: BTreeMap::new(),
            conflicts: Vec::new(),
        };
        group.knobs = group.resolve_knobs(source);
        debug!(
            class = %holder.qualified_name,
            group = %group.name,
            members = group.members.len(),
            "group assembled"
        );
        Ok(group)
    }

    fn resolve_knobs(&mut self, source: &'a dyn MetadataSource) -> GroupKnobs {
        GroupKnobs {
            threads: self.resolve(source, "Threads", |a| {
                a.iter().find_map(|x| match x {
                    Annotation::Threads { threads } => Some(*threads),
                    _ => None,
                })
            }),
            ops_per_invocation: self.resolve(source, "OperationsPerInvocation", |a| {
                a.iter().find_map(|x| match x {
                    Annotation::OperationsPerInvocation { value } => Some(*value),
                    _ => None,
                })
            }),
            time_unit: self.resolve(source, "OutputTimeUnit", |a| {
                a.iter().find_map(|x| match x {
                    Annotation::OutputTimeUnit { unit } => Some(*unit),
                    _ => None,
                })
            }),
            warmup_iterations: self.resolve(source, "Warmup.iterations", |a| warmup(a)?.iterations),
            warmup_time: self.resolve(source, "Warmup.time", |a| warmup(a)?.time),
            warmup_batch_size: self.resolve(source, "Warmup.batchSize", |a| warmup(a)?.batch_size),
            measurement_iterations: self
                .resolve(source, "Measurement.iterations", |a| measurement(a)?.iterations),
            measurement_time: self.resolve(source, "Measurement.time", |a| measurement(a)?.time),
            measurement_batch_size: self
                .resolve(source, "Measurement.batchSize", |a| measurement(a)?.batch_size),
            forks: self.resolve(source, "Fork.value", |a| fork(a)?.value),
            warmup_forks: self.resolve(source, "Fork.warmups", |a| fork(a)?.warmups),
            fork_executable: self
                .resolve(source, "Fork.executable", |a| fork(a)?.executable.clone()),
            fork_args: self.resolve(source, "Fork.args", |a| fork(a)?.args.clone()),
            fork_args_prepend: self
                .resolve(source, "Fork.argsPrepend", |a| fork(a)?.args_prepend.clone()),
            fork_args_append: self
                .resolve(source, "Fork.argsAppend", |a| fork(a)?.args_append.clone()),
            timeout: self.resolve(source, "Timeout", |a| {
                a.iter().find_map(|x| match x {
                    Annotation::Timeout { time } => Some(*time),
                    _ => None,
                })
            }),
        }
    }

    /// First value of a knob over members (by name), then the class chain.
    fn resolve<T, F>(&mut self, source: &'a dyn MetadataSource, knob: &'static str, extract: F) -> Option<T>
    where
        T: Clone + PartialEq + Debug,
        F: Fn(&Annotations) -> Option<T>,
    {
        let mut chosen: Option<T> = None;
        for m in &self.members {
            let Some(value) = extract(&m.method.annotations) else {
                continue;
            };
            match &chosen {
                None => chosen = Some(value),
                Some(first) if *first != value => self.conflicts.push(KnobConflict {
                    knob,
                    chosen: format!("{first:?}"),
                    ignored: format!("{value:?}"),
                    method: m.method.name.clone(),
                }),
                Some(_) => {}
            }
        }
        if chosen.is_some() {
            return chosen;
        }
        ancestors(source, self.holder).find_map(|c| extract(&c.annotations))
    }

    /// Collect `@Param` values from every fixture bound for this group.
    ///
    /// Blank enum params take every constant. One name bound to two
    /// different value lists is an error.
    pub fn resolve_params(&mut self, graph: &StateGraph) -> Result<()> {
        for binding in graph.params() {
            let values = if binding.values.is_empty() {
                binding.enum_constants.clone().unwrap_or_default()
            } else {
                binding.values.clone()
            };
            match self.params.get(&binding.name) {
                Some(existing) if *existing != values => {
                    return Err(GenerationError::config(
                        format!(
                            "Colliding @Param values for \"{}\" in group \"{}\": {:?} and {:?}",
                            binding.name, self.name, existing, values
                        ),
                        ElementRef {
                            kind: ElementKind::Field,
                            name: format!("{}.{}", binding.declaring_class, binding.name),
                        },
                    ));
                }
                Some(_) => {}
                None => {
                    self.params.insert(binding.name.clone(), values);
                }
            }
        }
        Ok(())
    }

    /// Qualified name of the generated harness for this group.
    pub fn generated_class(&self, generated_package: &str) -> String {
        format!("{generated_package}.{}", self.generated_simple_name())
    }

    pub fn generated_simple_name(&self) -> String {
        format!("{}_{}_harness", self.holder.generated_name(), self.name)
    }

    pub fn thread_groups(&self) -> Vec<i32> {
        self.members.iter().map(|m| m.threads).collect()
    }

    /// Member labels, only meaningful for multi-method groups.
    pub fn thread_group_labels(&self) -> Vec<String> {
        if self.members.len() > 1 {
            self.members.iter().map(|m| m.method.name.clone()).collect()
        } else {
            Vec::new()
        }
    }

    pub fn ops_per_invocation(&self) -> i32 {
        self.knobs.ops_per_invocation.unwrap_or(1)
    }

    pub fn time_unit(&self, mode: Mode) -> TimeUnit {
        self.knobs.time_unit.unwrap_or(match mode {
            Mode::Throughput => TimeUnit::Seconds,
            _ => TimeUnit::Microseconds,
        })
    }
}

fn warmup(a: &Annotations) -> Option<&IterationSettings> {
    a.iter().find_map(|x| match x {
        Annotation::Warmup(s) => Some(s),
        _ => None,
    })
}

fn measurement(a: &Annotations) -> Option<&IterationSettings> {
    a.iter().find_map(|x| match x {
        Annotation::Measurement(s) => Some(s),
        _ => None,
    })
}

fn fork(a: &Annotations) -> Option<&ForkSettings> {
    a.iter().find_map(|x| match x {
        Annotation::Fork(s) => Some(s),
        _ => None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identifiers::Identifiers;
    use crate::metadata::{ClassModel, FieldInfo, Scope};

    fn methods(class: &ClassInfo) -> Vec<Declared<'_, MethodInfo>> {
        class.methods.iter().map(|m| Declared::new(class, m)).collect()
    }

    fn grouped(name: &str, group: &str, threads: i32) -> MethodInfo {
        MethodInfo::new(name)
            .annotate(Annotation::Benchmark)
            .annotate(Annotation::Group { name: group.into() })
            .annotate(Annotation::GroupThreads { threads })
    }

    #[test]
    fn should_default_mode_when_none_declared() {
        let model = ClassModel::from_classes([
            ClassInfo::new("org.a.B").method(MethodInfo::new("measure").annotate(Annotation::Benchmark))
        ]);
        let holder = model.resolve("org.a.B").unwrap();
        let info = assemble(&model, holder, &methods(holder), &GeneratorConfig::default()).unwrap();
        assert_eq!(info.groups.len(), 1);
        let g = &info.groups[0];
        assert_eq!(g.name, "measure");
        assert!(!g.explicit);
        assert_eq!(g.modes.iter().copied().collect::<Vec<_>>(), [Mode::Throughput]);
        assert_eq!(info.generated_package, "org.a.generated");
        assert_eq!(g.generated_class(&info.generated_package), "org.a.generated.B_measure_harness");
    }

    #[test]
    fn should_merge_explicit_group_members() {
        let model = ClassModel::from_classes([ClassInfo::new("org.a.B")
            .method(grouped("put", "g", 3))
            .method(grouped("get", "g", 1).annotate(Annotation::BenchmarkMode {
                modes: vec![Mode::AverageTime],
            }))]);
        let holder = model.resolve("org.a.B").unwrap();
        let info = assemble(&model, holder, &methods(holder), &GeneratorConfig::default()).unwrap();
        assert_eq!(info.groups.len(), 1);
        let g = &info.groups[0];
        assert!(g.explicit);
        assert_eq!(g.thread_groups(), [1, 3]);
        assert_eq!(g.thread_group_labels(), ["get", "put"]);
        assert_eq!(g.modes.iter().copied().collect::<Vec<_>>(), [Mode::AverageTime]);
    }

    #[test]
    fn should_fall_back_to_class_chain_for_knobs() {
        let model = ClassModel::from_classes([
            ClassInfo::new("org.a.Base").annotate(Annotation::Measurement(IterationSettings {
                iterations: Some(7),
                time: Some(TimeValue::seconds(2)),
                batch_size: None,
            })),
            ClassInfo::new("org.a.B")
                .extends("org.a.Base")
                .method(
                    MethodInfo::new("m")
                        .annotate(Annotation::Benchmark)
                        .annotate(Annotation::Measurement(IterationSettings {
                            iterations: Some(3),
                            ..Default::default()
                        })),
                ),
        ]);
        let holder = model.resolve("org.a.B").unwrap();
        let info = assemble(&model, holder, &methods(holder), &GeneratorConfig::default()).unwrap();
        let k = &info.groups[0].knobs;
        assert_eq!(k.measurement_iterations, Some(3));
        assert_eq!(k.measurement_time, Some(TimeValue::seconds(2)));
        assert_eq!(k.measurement_batch_size, None);
    }

    #[test]
    fn should_pick_lexicographically_first_method_when_knobs_conflict() {
        let model = ClassModel::from_classes([ClassInfo::new("org.a.B")
            .method(grouped("zeta", "g", 1).annotate(Annotation::OperationsPerInvocation { value: 5 }))
            .method(grouped("alpha", "g", 1).annotate(Annotation::OperationsPerInvocation { value: 2 }))]);
        let holder = model.resolve("org.a.B").unwrap();
        let info = assemble(&model, holder, &methods(holder), &GeneratorConfig::default()).unwrap();
        let g = &info.groups[0];
        assert_eq!(g.knobs.ops_per_invocation, Some(2));
        assert_eq!(g.conflicts.len(), 1);
        assert_eq!(g.conflicts[0].method, "zeta");
    }

    #[test]
    fn should_reject_illegal_group_name() {
        let model = ClassModel::from_classes([
            ClassInfo::new("org.a.B").method(grouped("m", "not a name", 1))
        ]);
        let holder = model.resolve("org.a.B").unwrap();
        assert!(assemble(&model, holder, &methods(holder), &GeneratorConfig::default()).is_err());
    }

    #[test]
    fn should_expand_blank_enum_params_and_reject_collisions() {
        let param = |values: &[&str]| Annotation::Param {
            values: values.iter().map(|v| v.to_string()).collect(),
        };
        let model = ClassModel::from_classes([
            ClassInfo::enumeration("org.a.Kind", &["FAST", "SLOW"]),
            ClassInfo::new("org.a.S1")
                .state(Scope::Thread)
                .field(FieldInfo::new("kind", "org.a.Kind").annotate(param(&[])))
                .field(FieldInfo::new("size", "int").annotate(param(&["1", "2"]))),
            ClassInfo::new("org.a.S2")
                .state(Scope::Thread)
                .field(FieldInfo::new("size", "int").annotate(param(&["3"]))),
            ClassInfo::new("org.a.B")
                .method(MethodInfo::new("ok").param("s", "org.a.S1").annotate(Annotation::Benchmark))
                .method(
                    MethodInfo::new("clash")
                        .param("a", "org.a.S1")
                        .param("b", "org.a.S2")
                        .annotate(Annotation::Benchmark),
                ),
        ]);
        let holder = model.resolve("org.a.B").unwrap();
        let mut info =
            assemble(&model, holder, &methods(holder), &GeneratorConfig::default()).unwrap();
        let mut ids = Identifiers::new();
        for g in &mut info.groups {
            let mut graph = StateGraph::new("generated");
            let members: Vec<_> = g.members.iter().map(|m| m.method).collect();
            graph.bind_methods(&model, holder, members, &mut ids).unwrap();
            let res = g.resolve_params(&graph);
            if g.name == "ok" {
                res.unwrap();
                assert_eq!(g.params["kind"], ["FAST", "SLOW"]);
                assert_eq!(g.params["size"], ["1", "2"]);
            } else {
                assert!(res.is_err());
            }
        }
    }
}
