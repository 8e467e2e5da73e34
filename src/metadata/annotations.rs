//! Annotation catalogue: what can be attached to benchmark classes, methods
//! and fields, and where each annotation is allowed to appear.

use serde::{Deserialize, Serialize};

use crate::mode::Mode;
use crate::time::{TimeUnit, TimeValue};

/// Sharing granularity of a fixture.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Scope {
    /// One instance shared by every worker thread.
    Benchmark,
    /// One instance per synchronization group.
    Group,
    /// One instance per worker thread.
    Thread,
}

impl Scope {
    pub fn name(self) -> &'static str {
        match self {
            Scope::Benchmark => "Benchmark",
            Scope::Group => "Group",
            Scope::Thread => "Thread",
        }
    }

    /// Shared scopes need locking around lazy initialization and helpers.
    pub fn is_shared(self) -> bool {
        !matches!(self, Scope::Thread)
    }
}

/// Granularity at which a setup/teardown helper runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Level {
    /// Once per run (all iterations of one fork).
    #[default]
    Trial,
    /// Once per iteration.
    Iteration,
    /// Around every benchmark method call.
    Invocation,
}

impl Level {
    pub const ALL: [Level; 3] = [Level::Trial, Level::Iteration, Level::Invocation];

    pub fn name(self) -> &'static str {
        match self {
            Level::Trial => "trial",
            Level::Iteration => "iteration",
            Level::Invocation => "invocation",
        }
    }
}

/// Compiler directive requested for a method or class.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CompilerMode {
    Break,
    Print,
    Exclude,
    Inline,
    DontInline,
    CompileOnly,
}

impl CompilerMode {
    /// Command word written into the compiler hints resource.
    pub fn command(self) -> &'static str {
        match self {
            CompilerMode::Break => "break",
            CompilerMode::Print => "print",
            CompilerMode::Exclude => "exclude",
            CompilerMode::Inline => "inline",
            CompilerMode::DontInline => "dontinline",
            CompilerMode::CompileOnly => "compileonly",
        }
    }
}

/// How auxiliary counters are reported.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum AuxCounterKind {
    /// Counters are operation counts, normalized like the primary result.
    #[default]
    Operations,
    /// Counters are plain event totals.
    Events,
}

/// Kind of metadata element an annotation sits on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ElementKind {
    Type,
    Method,
    Constructor,
    Field,
    Parameter,
}

impl ElementKind {
    pub fn name(self) -> &'static str {
        match self {
            ElementKind::Type => "type",
            ElementKind::Method => "method",
            ElementKind::Constructor => "constructor",
            ElementKind::Field => "field",
            ElementKind::Parameter => "parameter",
        }
    }
}

/// Warmup or measurement iteration settings. Every knob is optional; an
/// absent knob defers to the next annotation in the lookup chain.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct IterationSettings {
    #[serde(default)]
    pub iterations: Option<i32>,
    #[serde(default)]
    pub time: Option<TimeValue>,
    #[serde(default)]
    pub batch_size: Option<i32>,
}

/// Fork settings.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ForkSettings {
    #[serde(default)]
    pub value: Option<i32>,
    #[serde(default)]
    pub warmups: Option<i32>,
    /// Executable used to launch the forked benchmark process.
    #[serde(default)]
    pub executable: Option<String>,
    /// Replaces the launcher's default process arguments.
    #[serde(default)]
    pub args: Option<Vec<String>>,
    #[serde(default)]
    pub args_prepend: Option<Vec<String>>,
    #[serde(default)]
    pub args_append: Option<Vec<String>>,
}

/// One annotation instance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "annotation", rename_all = "snake_case")]
pub enum Annotation {
    Benchmark,
    BenchmarkMode {
        modes: Vec<Mode>,
    },
    CompilerControl {
        mode: CompilerMode,
    },
    Fork(ForkSettings),
    Group {
        name: String,
    },
    GroupThreads {
        threads: i32,
    },
    Measurement(IterationSettings),
    Warmup(IterationSettings),
    OperationsPerInvocation {
        value: i32,
    },
    OutputTimeUnit {
        unit: TimeUnit,
    },
    /// Empty `values` means "blank": enum fields take every constant, other
    /// fields must be supplied at run time.
    Param {
        #[serde(default)]
        values: Vec<String>,
    },
    Setup {
        #[serde(default)]
        level: Level,
    },
    #[serde(rename = "teardown")]
    TearDown {
        #[serde(default)]
        level: Level,
    },
    /// The scope is optional in the model so that a missing scope can be
    /// reported instead of silently defaulted.
    State {
        #[serde(default)]
        scope: Option<Scope>,
    },
    Threads {
        threads: i32,
    },
    Timeout {
        time: TimeValue,
    },
    AuxCounters {
        #[serde(default)]
        kind: AuxCounterKind,
    },
}

/// Discriminant of [`Annotation`], used for lookups and target checks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AnnotationKind {
    Benchmark,
    BenchmarkMode,
    CompilerControl,
    Fork,
    Group,
    GroupThreads,
    Measurement,
    Warmup,
    OperationsPerInvocation,
    OutputTimeUnit,
    Param,
    Setup,
    TearDown,
    State,
    Threads,
    Timeout,
    AuxCounters,
}

impl AnnotationKind {
    pub fn name(self) -> &'static str {
        match self {
            AnnotationKind::Benchmark => "Benchmark",
            AnnotationKind::BenchmarkMode => "BenchmarkMode",
            AnnotationKind::CompilerControl => "CompilerControl",
            AnnotationKind::Fork => "Fork",
            AnnotationKind::Group => "Group",
            AnnotationKind::GroupThreads => "GroupThreads",
            AnnotationKind::Measurement => "Measurement",
            AnnotationKind::Warmup => "Warmup",
            AnnotationKind::OperationsPerInvocation => "OperationsPerInvocation",
            AnnotationKind::OutputTimeUnit => "OutputTimeUnit",
            AnnotationKind::Param => "Param",
            AnnotationKind::Setup => "Setup",
            AnnotationKind::TearDown => "TearDown",
            AnnotationKind::State => "State",
            AnnotationKind::Threads => "Threads",
            AnnotationKind::Timeout => "Timeout",
            AnnotationKind::AuxCounters => "AuxCounters",
        }
    }

    /// Element kinds this annotation may be placed on.
    pub fn targets(self) -> &'static [ElementKind] {
        use ElementKind::*;
        match self {
            AnnotationKind::Benchmark
            | AnnotationKind::Group
            | AnnotationKind::GroupThreads
            | AnnotationKind::Setup
            | AnnotationKind::TearDown => &[Method],
            AnnotationKind::BenchmarkMode
            | AnnotationKind::Fork
            | AnnotationKind::Measurement
            | AnnotationKind::Warmup
            | AnnotationKind::OperationsPerInvocation
            | AnnotationKind::OutputTimeUnit
            | AnnotationKind::Threads
            | AnnotationKind::Timeout => &[Method, Type],
            AnnotationKind::CompilerControl => &[Method, Constructor, Type],
            AnnotationKind::Param => &[Field],
            AnnotationKind::State | AnnotationKind::AuxCounters => &[Type],
        }
    }

    pub fn applies_to(self, kind: ElementKind) -> bool {
        self.targets().contains(&kind)
    }
}

impl Annotation {
    pub fn kind(&self) -> AnnotationKind {
        match self {
            Annotation::Benchmark => AnnotationKind::Benchmark,
            Annotation::BenchmarkMode { .. } => AnnotationKind::BenchmarkMode,
            Annotation::CompilerControl { .. } => AnnotationKind::CompilerControl,
            Annotation::Fork(_) => AnnotationKind::Fork,
            Annotation::Group { .. } => AnnotationKind::Group,
            Annotation::GroupThreads { .. } => AnnotationKind::GroupThreads,
            Annotation::Measurement(_) => AnnotationKind::Measurement,
            Annotation::Warmup(_) => AnnotationKind::Warmup,
            Annotation::OperationsPerInvocation { .. } => AnnotationKind::OperationsPerInvocation,
            Annotation::OutputTimeUnit { .. } => AnnotationKind::OutputTimeUnit,
            Annotation::Param { .. } => AnnotationKind::Param,
            Annotation::Setup { .. } => AnnotationKind::Setup,
            Annotation::TearDown { .. } => AnnotationKind::TearDown,
            Annotation::State { .. } => AnnotationKind::State,
            Annotation::Threads { .. } => AnnotationKind::Threads,
            Annotation::Timeout { .. } => AnnotationKind::Timeout,
            Annotation::AuxCounters { .. } => AnnotationKind::AuxCounters,
        }
    }
}

/// Ordered annotation bag attached to one element.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Annotations(Vec<Annotation>);

impl Annotations {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, annotation: Annotation) {
        self.0.push(annotation);
    }

    pub fn iter(&self) -> impl Iterator<Item = &Annotation> {
        self.0.iter()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn get(&self, kind: AnnotationKind) -> Option<&Annotation> {
        self.0.iter().find(|a| a.kind() == kind)
    }

    pub fn has(&self, kind: AnnotationKind) -> bool {
        self.get(kind).is_some()
    }

    /// `Some(scope)` when a State annotation is present; the inner option is
    /// `None` when the annotation omits its scope.
    pub fn state(&self) -> Option<Option<Scope>> {
        self.0.iter().find_map(|a| match a {
            Annotation::State { scope } => Some(*scope),
            _ => None,
        })
    }

    pub fn group(&self) -> Option<&str> {
        self.0.iter().find_map(|a| match a {
            Annotation::Group { name } => Some(name.as_str()),
            _ => None,
        })
    }

    pub fn group_threads(&self) -> Option<i32> {
        self.0.iter().find_map(|a| match a {
            Annotation::GroupThreads { threads } => Some(*threads),
            _ => None,
        })
    }

    pub fn setup(&self) -> Option<Level> {
        self.0.iter().find_map(|a| match a {
            Annotation::Setup { level } => Some(*level),
            _ => None,
        })
    }

    pub fn teardown(&self) -> Option<Level> {
        self.0.iter().find_map(|a| match a {
            Annotation::TearDown { level } => Some(*level),
            _ => None,
        })
    }

    pub fn param(&self) -> Option<&[String]> {
        self.0.iter().find_map(|a| match a {
            Annotation::Param { values } => Some(values.as_slice()),
            _ => None,
        })
    }

    pub fn compiler_control(&self) -> Option<CompilerMode> {
        self.0.iter().find_map(|a| match a {
            Annotation::CompilerControl { mode } => Some(*mode),
            _ => None,
        })
    }

    pub fn aux_counters(&self) -> Option<AuxCounterKind> {
        self.0.iter().find_map(|a| match a {
            Annotation::AuxCounters { kind } => Some(*kind),
            _ => None,
        })
    }
}

impl From<Vec<Annotation>> for Annotations {
    fn from(v: Vec<Annotation>) -> Self {
        Self(v)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn should_deserialize_tagged_annotations() {
        let json = r#"[
            {"annotation": "state", "scope": "thread"},
            {"annotation": "setup", "level": "iteration"},
            {"annotation": "warmup", "iterations": 3, "time": {"time": 1, "unit": "seconds"}},
            {"annotation": "param", "values": ["1", "2"]},
            {"annotation": "teardown"}
        ]"#;
        let anns: Annotations = serde_json::from_str(json).unwrap();
        assert_eq!(anns.state(), Some(Some(Scope::Thread)));
        assert_eq!(anns.setup(), Some(Level::Iteration));
        assert_eq!(anns.teardown(), Some(Level::Trial));
        assert_eq!(anns.param().map(|v| v.len()), Some(2));
        assert!(anns.has(AnnotationKind::Warmup));
    }

    #[test]
    fn should_keep_missing_state_scope_visible() {
        let anns: Annotations = serde_json::from_str(r#"[{"annotation": "state"}]"#).unwrap();
        assert_eq!(anns.state(), Some(None));
    }

    #[test]
    fn should_restrict_param_to_fields() {
        assert!(AnnotationKind::Param.applies_to(ElementKind::Field));
        assert!(!AnnotationKind::Param.applies_to(ElementKind::Method));
        assert!(AnnotationKind::Threads.applies_to(ElementKind::Type));
        assert!(!AnnotationKind::State.applies_to(ElementKind::Method));
    }
}
