//! Where generated artifacts and diagnostics go.
//!
//! The generator never writes files or prints on its own. It hands generated
//! sources, resources and every error or warning to a [`GeneratorDestination`].

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use tracing::{debug, error, warn};

use crate::error::ElementRef;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Error,
    Warning,
}

/// One reported problem.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diagnostic {
    pub severity: Severity,
    pub message: String,
    pub element: Option<ElementRef>,
    pub cause: Option<String>,
}

impl Diagnostic {
    pub fn error(message: impl Into<String>) -> Self {
        Self {
            severity: Severity::Error,
            message: message.into(),
            element: None,
            cause: None,
        }
    }

    pub fn warning(message: impl Into<String>) -> Self {
        Self {
            severity: Severity::Warning,
            ..Self::error(message)
        }
    }

    pub fn at(mut self, element: ElementRef) -> Self {
        self.element = Some(element);
        self
    }

    pub fn caused_by(mut self, cause: impl fmt::Display) -> Self {
        self.cause = Some(cause.to_string());
        self
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)?;
        if let Some(element) = &self.element {
            write!(f, "\n   [{element}]")?;
        }
        if let Some(cause) = &self.cause {
            write!(f, "\n   caused by: {cause}")?;
        }
        Ok(())
    }
}

/// Sink for generated sources, resources and diagnostics.
pub trait GeneratorDestination {
    /// Write the source of the item with dotted qualified name `qualified_name`.
    fn write_class(&mut self, qualified_name: &str, text: &str) -> io::Result<()>;

    /// Write a flat resource such as the benchmark list.
    fn write_resource(&mut self, name: &str, text: &str) -> io::Result<()>;

    /// Content of a resource written by an earlier pass, if any.
    fn read_resource(&mut self, _name: &str) -> io::Result<Option<String>> {
        Ok(None)
    }

    fn report(&mut self, diagnostic: Diagnostic);

    fn print_error(&mut self, message: &str) {
        self.report(Diagnostic::error(message));
    }

    fn print_error_at(&mut self, message: &str, element: &ElementRef) {
        self.report(Diagnostic::error(message).at(element.clone()));
    }

    fn print_error_caused(&mut self, message: &str, cause: &dyn fmt::Display) {
        self.report(Diagnostic::error(message).caused_by(cause));
    }

    fn print_warning(&mut self, message: &str) {
        self.report(Diagnostic::warning(message));
    }

    fn print_warning_at(&mut self, message: &str, element: &ElementRef) {
        self.report(Diagnostic::warning(message).at(element.clone()));
    }

    /// Called once after the last artifact was written.
    fn finish(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// Writes sources as a Rust module tree under `root`.
///
/// `org.a.generated.B_m_harness` lands in `org/a/generated/B_m_harness.rs`;
/// [`finish`](GeneratorDestination::finish) then writes a `mod.rs` into each
/// generated package directory declaring its items. Generated code names
/// user types as `crate::org::a::B` and its own items as
/// `crate::org::a::generated::S_Fixture::S_Fixture`, so the user's
/// `org::a` module mounts the package with `pub mod generated;`. Parent
/// directories belong to the user crate and are left alone. Resources are
/// written verbatim at `root/<name>`.
#[derive(Debug)]
pub struct FileDestination {
    root: PathBuf,
    modules: BTreeSet<String>,
    errors: usize,
    warnings: usize,
}

impl FileDestination {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            modules: BTreeSet::new(),
            errors: 0,
            warnings: 0,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn error_count(&self) -> usize {
        self.errors
    }

    pub fn warning_count(&self) -> usize {
        self.warnings
    }

    pub fn has_errors(&self) -> bool {
        self.errors > 0
    }

    fn class_path(&self, qualified_name: &str) -> PathBuf {
        let mut path = self.root.clone();
        let segments: Vec<&str> = qualified_name.split('.').collect();
        if let Some((last, dirs)) = segments.split_last() {
            for d in dirs {
                path.push(d);
            }
            path.push(format!("{last}.rs"));
        }
        path
    }

    /// Generated package (dotted) to the items written into it.
    fn packages(&self) -> BTreeMap<&str, BTreeSet<&str>> {
        let mut packages: BTreeMap<&str, BTreeSet<&str>> = BTreeMap::new();
        for qn in &self.modules {
            let (package, item) = qn.rsplit_once('.').unwrap_or(("", qn.as_str()));
            packages.entry(package).or_default().insert(item);
        }
        packages
    }
}

impl GeneratorDestination for FileDestination {
    fn write_class(&mut self, qualified_name: &str, text: &str) -> io::Result<()> {
        let path = self.class_path(qualified_name);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&path, text)?;
        debug!(class = qualified_name, path = %path.display(), "wrote generated source");
        self.modules.insert(qualified_name.to_string());
        Ok(())
    }

    fn write_resource(&mut self, name: &str, text: &str) -> io::Result<()> {
        let path = self.root.join(name);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&path, text)?;
        debug!(resource = name, path = %path.display(), "wrote resource");
        Ok(())
    }

    fn read_resource(&mut self, name: &str) -> io::Result<Option<String>> {
        match fs::read_to_string(self.root.join(name)) {
            Ok(text) => Ok(Some(text)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e),
        }
    }

    fn report(&mut self, diagnostic: Diagnostic) {
        match diagnostic.severity {
            Severity::Error => {
                self.errors += 1;
                error!("{diagnostic}");
            }
            Severity::Warning => {
                self.warnings += 1;
                warn!("{diagnostic}");
            }
        }
    }

    fn finish(&mut self) -> io::Result<()> {
        for (package, items) in self.packages() {
            let mut path = self.root.clone();
            for segment in package.split('.').filter(|s| !s.is_empty()) {
                path.push(segment);
            }
            let mut text = String::from("// Generated code, do not edit.\n\n#![allow(non_snake_case)]\n\n");
            for item in items {
                text.push_str(&format!("pub mod {item};\n"));
            }
            fs::write(path.join("mod.rs"), text)?;
            debug!(package, path = %path.display(), "wrote package module");
        }
        Ok(())
    }
}

/// Keeps everything in memory; used by tests and `--list`.
#[derive(Debug, Default)]
pub struct MemoryDestination {
    pub classes: BTreeMap<String, String>,
    pub resources: BTreeMap<String, String>,
    pub diagnostics: Vec<Diagnostic>,
    /// Make every write fail, to exercise error reporting.
    pub fail_writes: bool,
}

impl MemoryDestination {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn errors(&self) -> impl Iterator<Item = &Diagnostic> {
        self.diagnostics
            .iter()
            .filter(|d| d.severity == Severity::Error)
    }

    pub fn warnings(&self) -> impl Iterator<Item = &Diagnostic> {
        self.diagnostics
            .iter()
            .filter(|d| d.severity == Severity::Warning)
    }

    fn check_writable(&self) -> io::Result<()> {
        if self.fail_writes {
            Err(io::Error::new(io::ErrorKind::PermissionDenied, "writes disabled"))
        } else {
            Ok(())
        }
    }
}

impl GeneratorDestination for MemoryDestination {
    fn write_class(&mut self, qualified_name: &str, text: &str) -> io::Result<()> {
        self.check_writable()?;
        self.classes.insert(qualified_name.to_string(), text.to_string());
        Ok(())
    }

    fn write_resource(&mut self, name: &str, text: &str) -> io::Result<()> {
        self.check_writable()?;
        self.resources.insert(name.to_string(), text.to_string());
        Ok(())
    }

    fn read_resource(&mut self, name: &str) -> io::Result<Option<String>> {
        Ok(self.resources.get(name).cloned())
    }

    fn report(&mut self, diagnostic: Diagnostic) {
        self.diagnostics.push(diagnostic);
    }
}
