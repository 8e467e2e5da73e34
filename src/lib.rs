//! # cntryl-microbench
//!
//! A microbenchmark harness generator.
//!
//! Benchmark code is described by a normalized metadata model: classes,
//! methods, fields and the annotations on them (`@Benchmark`, `@State`,
//! `@Setup`, `@Param`, ...). The generator validates that model, binds every
//! fixture a benchmark method needs into a dependency-ordered state graph,
//! groups methods and resolves their configuration, and emits Rust source
//! for the measurement loops of each timing mode. Alongside the sources it
//! writes a benchmark list for the launcher and a compiler-hint resource.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use cntryl_microbench::{BenchmarkGenerator, ClassModel, FileDestination, GeneratorConfig};
//!
//! let model = ClassModel::from_json(&std::fs::read_to_string("model.json")?)?;
//! let mut dest = FileDestination::new("target/microbench");
//! let mut generator = BenchmarkGenerator::new(GeneratorConfig::from_env());
//!
//! generator.generate(&model, &mut dest);
//! generator.complete(&mut dest);
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```
//!
//! Generated harnesses link against [`runtime`].
//!
//! ## Mounting generated code
//!
//! Harnesses for classes in `org.a` land in the `org.a.generated` package,
//! one module per item, and name user types as `crate::org::a::Name`. Point
//! the output directory at the crate's `src/` and declare the package from
//! the user module:
//!
//! ```rust,ignore
//! // src/org/a/mod.rs
//! pub mod generated;
//! ```
//!
//! Benchmark methods receive Thread-scope states as `&mut State` and
//! Benchmark- or Group-scope states as `&State`, which must be `Sync`.
//! Setup and teardown helpers always take `&mut self`.

pub mod benchmark_list;
pub mod config;
pub mod destination;
pub mod emit;
pub mod error;
pub mod generator;
pub mod group;
pub mod hints;
pub mod identifiers;
pub mod metadata;
pub mod mode;
pub mod runtime;
pub mod state;
pub mod time;
pub mod validate;

pub use benchmark_list::{BenchmarkList, BenchmarkListEntry};
pub use config::GeneratorConfig;
pub use destination::{Diagnostic, FileDestination, GeneratorDestination, MemoryDestination, Severity};
pub use error::{ElementRef, GenerationError};
pub use generator::BenchmarkGenerator;
pub use hints::CompilerHints;
pub use metadata::{ClassInfo, ClassModel, MetadataSource};
pub use mode::Mode;
pub use time::{TimeUnit, TimeValue};
