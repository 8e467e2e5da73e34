//! Builds a scratch crate around harnesses written by `FileDestination` and
//! runs every timing mode on two worker threads.

#![cfg(not(miri))]

use std::fs;
use std::path::Path;
use std::process::Command;

use cntryl_microbench::metadata::{Annotation, ClassInfo, FieldInfo, Level, MethodInfo, Scope};
use cntryl_microbench::{BenchmarkGenerator, ClassModel, FileDestination, GeneratorConfig, Mode};

/// Benchmark types the generated code refers to as `crate::org::a::*`.
const USER_MODULE: &str = r#"
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

use cntryl_microbench::runtime::{parse_param, ParamTarget};

pub mod generated;

/// Helper calls per level: trial setup, iteration setup, iteration
/// teardown, trial teardown.
pub struct Counts([AtomicUsize; 4]);

impl Counts {
    pub const fn new() -> Self {
        Self([
            AtomicUsize::new(0),
            AtomicUsize::new(0),
            AtomicUsize::new(0),
            AtomicUsize::new(0),
        ])
    }

    fn bump(&self, slot: usize) {
        self.0[slot].fetch_add(1, Ordering::SeqCst);
    }

    pub fn snapshot(&self) -> [usize; 4] {
        [0, 1, 2, 3].map(|i| self.0[i].load(Ordering::SeqCst))
    }

    pub fn reset(&self) {
        for c in &self.0 {
            c.store(0, Ordering::SeqCst);
        }
    }
}

pub static S_COUNTS: Counts = Counts::new();
pub static G_COUNTS: Counts = Counts::new();
pub static T_COUNTS: Counts = Counts::new();

macro_rules! counted_helpers {
    ($ty:ident, $counts:ident) => {
        impl $ty {
            pub fn setup_trial(&mut self) {
                $counts.bump(0);
            }

            pub fn setup_iteration(&mut self) {
                $counts.bump(1);
            }

            pub fn teardown_iteration(&mut self) {
                $counts.bump(2);
            }

            pub fn teardown_trial(&mut self) {
                $counts.bump(3);
            }
        }
    };
}

#[derive(Default)]
pub struct B;

impl B {
    pub fn measure(&mut self, s: &S, g: &G, t: &mut T) -> i64 {
        assert_eq!(s.size, 8);
        s.calls.fetch_add(1, Ordering::Relaxed);
        g.calls.fetch_add(1, Ordering::Relaxed);
        t.calls += 1;
        t.calls as i64
    }
}

#[derive(Default)]
pub struct S {
    pub size: i32,
    pub calls: AtomicU64,
}

impl ParamTarget for S {
    fn set_param(&mut self, _declaring: &str, name: &str, value: &str) -> Result<(), String> {
        match name {
            "size" => self.size = parse_param(value)?,
            other => return Err(format!("unknown param {other}")),
        }
        Ok(())
    }
}

#[derive(Default)]
pub struct G {
    pub calls: AtomicU64,
}

#[derive(Default)]
pub struct T {
    pub calls: u64,
}

counted_helpers!(S, S_COUNTS);
counted_helpers!(G, G_COUNTS);
counted_helpers!(T, T_COUNTS);
"#;

/// Drives each mode through two iterations, the second one last, with a
/// fresh trial per mode.
const MAIN: &str = r#"
mod org;

use std::thread;
use std::time::Duration;

use cntryl_microbench::runtime::*;
use org::a::generated::B_measure_harness::B_measure_harness as Harness;
use org::a::{G_COUNTS, S_COUNTS, T_COUNTS};

const THREADS: i32 = 2;

type Dispatch = fn(&mut Harness, &InfraControl, &ThreadParams) -> Result<IterationResult, HarnessError>;

fn run_iteration(harnesses: &mut [Harness], dispatch: Dispatch, last: bool) -> Vec<IterationResult> {
    let control = InfraControl::new(
        BenchmarkParams::new("org.a.B.measure").threads(THREADS).param("size", "8"),
        IterationParams::new(2, Duration::from_millis(20), 2),
    )
    .last_iteration(last);
    thread::scope(|s| {
        let workers: Vec<_> = harnesses
            .iter_mut()
            .enumerate()
            .map(|(i, harness)| {
                let control = &control;
                s.spawn(move || {
                    let params = ThreadParams::distribute(i as i32, THREADS, &[1]);
                    dispatch(harness, control, &params)
                })
            })
            .collect();
        thread::sleep(Duration::from_millis(20));
        control.mark_done();
        workers
            .into_iter()
            .map(|w| w.join().expect("worker panicked").expect("harness failed"))
            .collect()
    })
}

fn main() {
    let modes = [
        ("Throughput", Harness::measure_Throughput as Dispatch),
        ("AverageTime", Harness::measure_AverageTime as Dispatch),
        ("SampleTime", Harness::measure_SampleTime as Dispatch),
        ("SingleShotTime", Harness::measure_SingleShotTime as Dispatch),
    ];
    for (name, dispatch) in modes {
        for counts in [&S_COUNTS, &G_COUNTS, &T_COUNTS] {
            counts.reset();
        }
        let mut harnesses: Vec<Harness> = (0..THREADS).map(|_| Harness::new()).collect();
        for last in [false, true] {
            for result in run_iteration(&mut harnesses, dispatch, last) {
                let primary = result.primary().expect("primary result");
                assert_eq!(primary.label(), "measure", "{name}");
                assert!(primary.score().is_finite(), "{name}: score {}", primary.score());
            }
        }
        assert_eq!(S_COUNTS.snapshot(), [1, 2, 2, 1], "{name}: benchmark-scope S");
        assert_eq!(G_COUNTS.snapshot(), [2, 4, 4, 2], "{name}: group-scope G");
        assert_eq!(T_COUNTS.snapshot(), [2, 4, 4, 2], "{name}: thread-scope T");
        println!("{name}: ok");
    }
}
"#;

fn counted_state(name: &str, scope: Scope) -> ClassInfo {
    ClassInfo::new(name)
        .state(scope)
        .method(MethodInfo::new("setup_trial").annotate(Annotation::Setup { level: Level::Trial }))
        .method(MethodInfo::new("setup_iteration").annotate(Annotation::Setup {
            level: Level::Iteration,
        }))
        .method(MethodInfo::new("teardown_iteration").annotate(Annotation::TearDown {
            level: Level::Iteration,
        }))
        .method(MethodInfo::new("teardown_trial").annotate(Annotation::TearDown {
            level: Level::Trial,
        }))
}

fn model() -> ClassModel {
    ClassModel::from_classes([
        ClassInfo::new("org.a.B")
            .annotate(Annotation::BenchmarkMode {
                modes: vec![
                    Mode::Throughput,
                    Mode::AverageTime,
                    Mode::SampleTime,
                    Mode::SingleShotTime,
                ],
            })
            .method(
                MethodInfo::new("measure")
                    .param("s", "org.a.S")
                    .param("g", "org.a.G")
                    .param("t", "org.a.T")
                    .returns("long")
                    .annotate(Annotation::Benchmark),
            ),
        counted_state("org.a.S", Scope::Benchmark).field(
            FieldInfo::new("size", "int").annotate(Annotation::Param {
                values: vec!["8".into()],
            }),
        ),
        counted_state("org.a.G", Scope::Group),
        counted_state("org.a.T", Scope::Thread),
    ])
}

fn write_scratch_crate(project: &Path) {
    let manifest_dir = Path::new(env!("CARGO_MANIFEST_DIR"));
    let cargo_toml = format!(
        r#"
[package]
name = "microbench-generated-harness"
version = "0.1.0"
edition = "2021"
publish = false

[dependencies]
cntryl-microbench = {{ path = {:?} }}

[workspace]
"#,
        manifest_dir.display()
    );
    fs::write(project.join("Cargo.toml"), cargo_toml).expect("Failed to write Cargo.toml");
    let src = project.join("src");
    fs::create_dir_all(src.join("org/a")).expect("Failed to create src/org/a");
    fs::write(src.join("main.rs"), MAIN).expect("Failed to write main.rs");
    fs::write(src.join("org/mod.rs"), "pub mod a;\n").expect("Failed to write org/mod.rs");
    fs::write(src.join("org/a/mod.rs"), USER_MODULE).expect("Failed to write org/a/mod.rs");
}

#[test]
fn should_compile_and_run_generated_harness_in_every_mode() {
    let temp_dir = tempfile::tempdir().expect("Failed to create temp directory");
    let project = temp_dir.path();
    write_scratch_crate(project);

    let mut dest = FileDestination::new(project.join("src"));
    let mut generator = BenchmarkGenerator::new(GeneratorConfig::new());
    assert_eq!(generator.generate(&model(), &mut dest), 1);
    generator.complete(&mut dest);
    assert!(!dest.has_errors(), "generation reported errors");
    assert!(project.join("src/org/a/generated/mod.rs").exists());

    // Pin the scratch build to the versions this crate already resolved.
    let lock = Path::new(env!("CARGO_MANIFEST_DIR")).join("Cargo.lock");
    let mut cmd = Command::new(option_env!("CARGO").unwrap_or("cargo"));
    cmd.current_dir(project)
        .args(["run", "--quiet"])
        .env(
            "CARGO_TARGET_DIR",
            std::env::temp_dir().join("cntryl-microbench-harness-target"),
        );
    if lock.exists() {
        fs::copy(&lock, project.join("Cargo.lock")).expect("Failed to copy Cargo.lock");
        cmd.arg("--offline");
    }

    let output = cmd.output().expect("Failed to execute cargo run");
    let stdout = String::from_utf8_lossy(&output.stdout);
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(
        output.status.success(),
        "generated harness failed\n--- stdout\n{stdout}\n--- stderr\n{stderr}"
    );
    for mode in ["Throughput", "AverageTime", "SampleTime", "SingleShotTime"] {
        assert!(stdout.contains(&format!("{mode}: ok")), "{stdout}");
    }
}
