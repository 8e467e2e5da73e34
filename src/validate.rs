//! Structural rules checked before any code is generated.
//!
//! Every check fails with the first violation found, attributed to the
//! offending class, method, field or parameter. The generator reports it and
//! skips the class.

use std::collections::HashSet;

use crate::error::{ElementRef, GenerationError, Result};
use crate::group::MethodGroup;
use crate::metadata::hierarchy::{all_fields, all_methods, ancestors, state_annotation};
use crate::metadata::{
    infra, Annotation, AnnotationKind, Annotations, ClassInfo, Declared, ElementKind, FieldInfo,
    MetadataSource, MethodInfo, Scope,
};

/// Validate a benchmark class, its benchmark methods and every fixture type
/// reachable from them.
pub fn validate_benchmark<'a>(
    source: &'a dyn MetadataSource,
    holder: &'a ClassInfo,
    methods: &[Declared<'a, MethodInfo>],
) -> Result<()> {
    let element = ElementRef::class(holder);
    if holder.package.is_empty() {
        return Err(GenerationError::config(
            "Benchmark class should have package other than default.",
            element,
        ));
    }
    if holder.is_final() {
        return Err(GenerationError::config(
            "Benchmark classes should not be final.",
            element,
        ));
    }

    let holder_state = state_annotation(source, holder);
    match holder_state {
        Some((_, Some(_))) => validate_state(source, holder)?,
        Some((owner, None)) => return Err(missing_scope(owner)),
        None => {
            for field in all_fields(source, holder) {
                if !field.is_static() {
                    return Err(GenerationError::config(
                        format!(
                            "Field \"{}\" is declared within the class not having @State annotation. \
                             This can result in unspecified behavior, and prohibited.",
                            field.name
                        ),
                        ElementRef::field(field.owner, field.item),
                    ));
                }
            }
        }
    }
    for class in ancestors(source, holder) {
        validate_targets(class)?;
    }

    for &method in methods {
        validate_benchmark_method(source, holder, method)?;
    }

    // Every fixture type reachable from benchmark and helper parameters.
    let mut seen = HashSet::new();
    let mut pending: Vec<&ClassInfo> = vec![holder];
    for method in methods {
        pending.extend(validate_state_args(source, *method)?);
    }
    while let Some(class) = pending.pop() {
        if !seen.insert(class.qualified_name.clone()) {
            continue;
        }
        if !std::ptr::eq(class, holder) {
            validate_state(source, class)?;
        }
        validate_params(source, class)?;
        for helper in validate_helpers(source, class)? {
            pending.extend(validate_state_args(source, helper)?);
        }
    }
    Ok(())
}

fn validate_benchmark_method(
    source: &dyn MetadataSource,
    holder: &ClassInfo,
    method: Declared<'_, MethodInfo>,
) -> Result<()> {
    let element = ElementRef::method(method.owner, method.item);
    if !method.is_public() {
        return Err(GenerationError::config(
            "@Benchmark method should be public.",
            element,
        ));
    }
    if method.is_abstract() {
        return Err(GenerationError::config(
            "@Benchmark method can not be abstract.",
            element,
        ));
    }
    if method.is_synchronized() {
        match state_annotation(source, holder) {
            None => {
                return Err(GenerationError::config(
                    "@Benchmark method is synchronized, but the class is not annotated with @State.",
                    element,
                ))
            }
            Some((_, scope)) if method.is_static() && scope != Some(Scope::Benchmark) => {
                return Err(GenerationError::config(
                    "The static @Benchmark method is synchronized, but the class is not \
                     annotated with @State(Scope.Benchmark).",
                    element,
                ))
            }
            Some(_) => {}
        }
    }
    for annotation in method.annotations.iter() {
        if let Annotation::OperationsPerInvocation { value } = annotation {
            if *value < 1 {
                return Err(GenerationError::config(
                    format!("The OperationsPerInvocation needs to be greater than 0, but was {value}"),
                    element,
                ));
            }
        }
    }
    for class in ancestors(source, holder) {
        for annotation in class.annotations.iter() {
            if let Annotation::OperationsPerInvocation { value } = annotation {
                if *value < 1 {
                    return Err(GenerationError::config(
                        format!(
                            "The OperationsPerInvocation needs to be greater than 0, but was {value}"
                        ),
                        ElementRef::class(class),
                    ));
                }
            }
        }
    }
    if method.annotations.group().is_some()
        && method.annotations.has(AnnotationKind::Threads)
    {
        return Err(GenerationError::config(
            "@Threads annotation is placed within the benchmark method with @Group annotation. \
             This has ambiguous behavioral effect, and prohibited. \
             Did you mean @GroupThreads instead?",
            element,
        ));
    }
    Ok(())
}

/// Validate a fixture type.
///
/// Harness-provided fixture types are trusted as is.
pub fn validate_state(source: &dyn MetadataSource, class: &ClassInfo) -> Result<()> {
    if infra::is_infra(&class.qualified_name) {
        return Ok(());
    }
    let element = ElementRef::class(class);
    match state_annotation(source, class) {
        Some((_, Some(_))) => {}
        Some((owner, None)) => return Err(missing_scope(owner)),
        None => {
            return Err(GenerationError::config(
                format!("{} is not a @State class.", class.qualified_name),
                element,
            ))
        }
    }
    if !class.is_public() {
        return Err(GenerationError::config(
            "The instantiated @State annotation only supports public classes.",
            element,
        ));
    }
    if class.is_final() {
        return Err(GenerationError::config(
            "The instantiated @State annotation does not support final classes.",
            element,
        ));
    }
    if class.is_inner() {
        return Err(GenerationError::config(
            "The instantiated @State annotation does not support inner classes, \
             make sure your class is static.",
            element,
        ));
    }
    if class.is_abstract() {
        return Err(GenerationError::config(
            "The instantiated @State class cannot be abstract.",
            element,
        ));
    }
    if !class.has_public_no_arg_constructor() {
        return Err(GenerationError::config(
            "The @State annotated class must have a public no-arg constructor.",
            ElementRef::constructor(class),
        ));
    }
    for c in ancestors(source, class) {
        validate_targets(c)?;
    }
    Ok(())
}

/// Check that every parameter of `method` is a fixture type and return the
/// resolved parameter classes. Blackhole parameters are skipped.
pub fn validate_state_args<'a>(
    source: &'a dyn MetadataSource,
    method: Declared<'a, MethodInfo>,
) -> Result<Vec<&'a ClassInfo>> {
    let mut out = Vec::with_capacity(method.item.parameters.len());
    for param in &method.item.parameters {
        if infra::is_special(&param.ty) {
            continue;
        }
        let element = ElementRef::parameter(method.owner, method.item, param);
        let class = source.resolve(&param.ty).ok_or_else(|| {
            GenerationError::config(format!("Unknown method argument type: {}", param.ty), element.clone())
        })?;
        if state_annotation(source, class).is_none() {
            return Err(GenerationError::config(
                format!(
                    "Method parameters should be @State classes, but \"{}\" is {}.",
                    param.name, param.ty
                ),
                element,
            ));
        }
        out.push(class);
    }
    Ok(out)
}

/// Check setup/teardown helpers declared on `class` or its ancestors and
/// return them.
pub fn validate_helpers<'a>(
    source: &'a dyn MetadataSource,
    class: &'a ClassInfo,
) -> Result<Vec<Declared<'a, MethodInfo>>> {
    let is_state = state_annotation(source, class).is_some();
    let mut helpers = Vec::new();
    for method in all_methods(source, class) {
        let setup = method.annotations.setup().is_some();
        let teardown = method.annotations.teardown().is_some();
        if !setup && !teardown {
            continue;
        }
        let label = if setup { "@Setup" } else { "@TearDown" };
        let element = ElementRef::method(method.owner, method.item);
        if !is_state && !method.owner.is_abstract() {
            return Err(GenerationError::config(
                format!(
                    "{label} annotation is placed within the class not having @State annotation. \
                     This has no behavioral effect, and prohibited."
                ),
                element,
            ));
        }
        if !method.is_public() {
            return Err(GenerationError::config(
                format!("{label} method should be public."),
                element,
            ));
        }
        if !method.returns_void() {
            return Err(GenerationError::config(
                format!("{label} method should not return anything."),
                element,
            ));
        }
        helpers.push(method);
    }
    Ok(helpers)
}

/// Check every `@Param` field visible on `class`.
pub fn validate_params(source: &dyn MetadataSource, class: &ClassInfo) -> Result<()> {
    let is_state = state_annotation(source, class).is_some();
    for field in all_fields(source, class) {
        let Some(values) = field.annotations.param() else {
            continue;
        };
        let element = ElementRef::field(field.owner, field.item);
        if field.is_static() {
            return Err(GenerationError::config(
                "@Param annotation is not acceptable on static fields.",
                element,
            ));
        }
        if field.is_final() {
            return Err(GenerationError::config(
                "@Param annotation is not acceptable on final fields.",
                element,
            ));
        }
        if !is_state {
            return Err(GenerationError::config(
                "@Param annotation should be placed in @State-annotated class.",
                element,
            ));
        }
        let enum_constants = source
            .resolve(&field.ty)
            .filter(|c| c.is_enum)
            .map(|c| c.enum_constants.as_slice());
        check_param_type(field.item, enum_constants, &element)?;
        for value in values {
            if let Err(reason) = check_param_value(&field.ty, value, enum_constants) {
                return Err(GenerationError::config(
                    format!(
                        "Some @Param values can not be converted to target type: \
                         \"{value}\" can not be converted to {}: {reason}",
                        field.ty
                    ),
                    element,
                ));
            }
        }
    }
    Ok(())
}

fn check_param_type(
    field: &FieldInfo,
    enum_constants: Option<&[String]>,
    element: &ElementRef,
) -> Result<()> {
    if enum_constants.is_some() || is_supported_param_type(&field.ty) {
        return Ok(());
    }
    Err(GenerationError::config(
        format!(
            "@Param can only be placed over the annotation-compatible types: \
             primitives, Strings, or enums; {} is not.",
            field.ty
        ),
        element.clone(),
    ))
}

fn is_supported_param_type(ty: &str) -> bool {
    matches!(
        ty,
        "byte" | "short" | "int" | "long" | "float" | "double" | "boolean" | "char" | "String"
            | "java.lang.String" | "i8" | "i16" | "i32" | "i64" | "u8" | "u16" | "u32" | "u64"
            | "f32" | "f64" | "bool" | "str"
    )
}

/// Check that `value` converts to the declared `@Param` field type.
pub fn check_param_value(
    ty: &str,
    value: &str,
    enum_constants: Option<&[String]>,
) -> std::result::Result<(), String> {
    if let Some(constants) = enum_constants {
        return if constants.iter().any(|c| c == value) {
            Ok(())
        } else {
            Err(format!("not one of {constants:?}"))
        };
    }
    fn parse<T: std::str::FromStr>(value: &str) -> std::result::Result<(), String>
    where
        T::Err: std::fmt::Display,
    {
        value.trim().parse::<T>().map(|_| ()).map_err(|e| e.to_string())
    }
    match ty {
        "byte" | "i8" => parse::<i8>(value),
        "short" | "i16" => parse::<i16>(value),
        "int" | "i32" => parse::<i32>(value),
        "long" | "i64" => parse::<i64>(value),
        "u8" => parse::<u8>(value),
        "u16" => parse::<u16>(value),
        "u32" => parse::<u32>(value),
        "u64" => parse::<u64>(value),
        "float" | "f32" => parse::<f32>(value),
        "double" | "f64" => parse::<f64>(value),
        "boolean" | "bool" => match value.trim().to_ascii_lowercase().as_str() {
            "true" | "false" => Ok(()),
            _ => Err("expected true or false".to_string()),
        },
        "char" => match value.chars().count() {
            1 => Ok(()),
            n => Err(format!("expected exactly one character, got {n}")),
        },
        "String" | "java.lang.String" | "str" => Ok(()),
        other => Err(format!("unsupported type {other}")),
    }
}

/// Check each annotation of the class and its members against the element
/// kinds it may be placed on.
pub fn validate_targets(class: &ClassInfo) -> Result<()> {
    let check = |annotations: &Annotations, kind: ElementKind, element: ElementRef| {
        for a in annotations.iter() {
            let k = a.kind();
            if !k.applies_to(kind) {
                return Err(GenerationError::config(
                    format!("Annotation @{} is not applicable to {}.", k.name(), kind.name()),
                    element,
                ));
            }
        }
        Ok(())
    };
    check(&class.annotations, ElementKind::Type, ElementRef::class(class))?;
    for m in &class.methods {
        check(&m.annotations, ElementKind::Method, ElementRef::method(class, m))?;
    }
    for f in &class.fields {
        check(&f.annotations, ElementKind::Field, ElementRef::field(class, f))?;
    }
    for c in &class.constructors {
        check(&c.annotations, ElementKind::Constructor, ElementRef::constructor(class))?;
    }
    Ok(())
}

/// Rules that need the assembled group.
///
/// A multi-method group needs `@Group` on every member; only explicitly
/// grouped methods may use group-scoped fixtures, either as parameters or
/// through a group-scoped benchmark class.
pub fn validate_group(source: &dyn MetadataSource, group: &MethodGroup<'_>) -> Result<()> {
    if group.members.len() > 1 {
        if let Some(m) = group
            .members
            .iter()
            .find(|m| m.method.annotations.group().is_none())
        {
            return Err(GenerationError::config(
                format!(
                    "Method group \"{}\" has {} methods, but \"{}\" is not annotated with @Group.",
                    group.name,
                    group.members.len(),
                    m.method.name
                ),
                ElementRef::method(m.method.owner, m.method.item),
            ));
        }
        return Ok(());
    }
    if group.explicit {
        return Ok(());
    }

    let Some(member) = group.members.first() else {
        return Ok(());
    };
    let element = ElementRef::method(member.method.owner, member.method.item);
    let group_scoped = |class: &ClassInfo| {
        matches!(state_annotation(source, class), Some((_, Some(Scope::Group))))
    };
    let uses_group_state = group_scoped(group.holder)
        || member
            .method
            .parameters
            .iter()
            .filter_map(|p| source.resolve(&p.ty))
            .any(|c| group_scoped(c) && !infra::is_infra(&c.qualified_name));
    if uses_group_state {
        return Err(GenerationError::config(
            "Only @Group-annotated methods can use @State(Scope.Group) states.",
            element,
        ));
    }
    Ok(())
}

fn missing_scope(owner: &ClassInfo) -> GenerationError {
    GenerationError::MissingOption {
        annotation: "State",
        option: "Scope",
        element: ElementRef::class(owner),
    }
}
