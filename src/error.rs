//! Error taxonomy of the generator.
//!
//! Configuration and graph errors always name the element they were found
//! on. They abort generation of the offending class only; the generator
//! reports them through the destination and moves on to the next class.

use std::fmt;

use thiserror::Error;

use crate::metadata::{ClassInfo, ElementKind, FieldInfo, MethodInfo, ParameterInfo};

/// Reference to the metadata element a diagnostic is attributed to.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ElementRef {
    pub kind: ElementKind,
    /// Dotted path: `org.a.Bench`, `org.a.Bench.measure`,
    /// `org.a.Bench.measure(state)`.
    pub name: String,
}

impl ElementRef {
    pub fn class(class: &ClassInfo) -> Self {
        Self {
            kind: ElementKind::Type,
            name: class.qualified_name.clone(),
        }
    }

    pub fn method(owner: &ClassInfo, method: &MethodInfo) -> Self {
        Self {
            kind: ElementKind::Method,
            name: format!("{}.{}", owner.qualified_name, method.name),
        }
    }

    pub fn field(owner: &ClassInfo, field: &FieldInfo) -> Self {
        Self {
            kind: ElementKind::Field,
            name: format!("{}.{}", owner.qualified_name, field.name),
        }
    }

    pub fn parameter(owner: &ClassInfo, method: &MethodInfo, param: &ParameterInfo) -> Self {
        Self {
            kind: ElementKind::Parameter,
            name: format!("{}.{}({})", owner.qualified_name, method.name, param.name),
        }
    }

    pub fn constructor(owner: &ClassInfo) -> Self {
        Self {
            kind: ElementKind::Constructor,
            name: format!("{}.<init>", owner.qualified_name),
        }
    }
}

impl fmt::Display for ElementRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.kind.name(), self.name)
    }
}

#[derive(Debug, Error)]
pub enum GenerationError {
    /// A structural rule violated by user code.
    #[error("{message}")]
    Config { message: String, element: ElementRef },

    /// A fixture depends on itself through setup/teardown parameters.
    #[error("@State dependency cycle is detected: {path}")]
    StateCycle { path: String, element: ElementRef },

    /// An annotation that must carry a value does not.
    #[error("The @{annotation} annotation should have the explicit {option} argument")]
    MissingOption {
        annotation: &'static str,
        option: &'static str,
        element: ElementRef,
    },

    #[error("Annotation generator had thrown the exception: {message}")]
    Internal { message: String },

    #[error("{context}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Malformed benchmark list line: {reason}")]
    ListFormat { reason: String },

    #[error("Invalid metadata model: {0}")]
    Model(#[from] serde_json::Error),
}

impl GenerationError {
    pub fn config(message: impl Into<String>, element: ElementRef) -> Self {
        GenerationError::Config {
            message: message.into(),
            element,
        }
    }

    pub fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        GenerationError::Io {
            context: context.into(),
            source,
        }
    }

    pub fn list_format(reason: impl Into<String>) -> Self {
        GenerationError::ListFormat {
            reason: reason.into(),
        }
    }

    /// Element the error is attributed to, for element-scoped errors.
    pub fn element(&self) -> Option<&ElementRef> {
        match self {
            GenerationError::Config { element, .. }
            | GenerationError::StateCycle { element, .. }
            | GenerationError::MissingOption { element, .. } => Some(element),
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, GenerationError>;
