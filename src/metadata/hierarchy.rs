//! Inherited-metadata resolution over the explicit superclass chain.

use std::collections::HashSet;

use super::{Annotation, AnnotationKind, ClassInfo, Declared, FieldInfo, MetadataSource, MethodInfo};

/// Iterator over a class and its resolvable superclasses, most-derived first.
/// Stops at the first unresolvable superclass and never loops on a
/// malformed (cyclic) chain.
pub struct Ancestors<'a> {
    source: &'a dyn MetadataSource,
    next: Option<&'a ClassInfo>,
    seen: HashSet<&'a str>,
}

impl<'a> Iterator for Ancestors<'a> {
    type Item = &'a ClassInfo;

    fn next(&mut self) -> Option<Self::Item> {
        let current = self.next.take()?;
        if !self.seen.insert(current.qualified_name.as_str()) {
            return None;
        }
        self.next = current
            .superclass
            .as_deref()
            .and_then(|name| self.source.resolve(name));
        Some(current)
    }
}

pub fn ancestors<'a>(source: &'a dyn MetadataSource, class: &'a ClassInfo) -> Ancestors<'a> {
    Ancestors {
        source,
        next: Some(class),
        seen: HashSet::new(),
    }
}

/// Every field declared on the class or an ancestor, most-derived first.
pub fn all_fields<'a>(
    source: &'a dyn MetadataSource,
    class: &'a ClassInfo,
) -> Vec<Declared<'a, FieldInfo>> {
    ancestors(source, class)
        .flat_map(|c| c.fields.iter().map(move |f| Declared::new(c, f)))
        .collect()
}

/// Every method visible on the class. A method redeclared with the same
/// signature in a subclass hides the ancestor's declaration.
pub fn all_methods<'a>(
    source: &'a dyn MetadataSource,
    class: &'a ClassInfo,
) -> Vec<Declared<'a, MethodInfo>> {
    let mut seen = HashSet::new();
    let mut out = Vec::new();
    for c in ancestors(source, class) {
        for m in &c.methods {
            if seen.insert(m.signature()) {
                out.push(Declared::new(c, m));
            }
        }
    }
    out
}

/// Annotation on the class itself or the nearest ancestor carrying it.
pub fn annotation_super<'a>(
    source: &'a dyn MetadataSource,
    class: &'a ClassInfo,
    kind: AnnotationKind,
) -> Option<&'a Annotation> {
    ancestors(source, class).find_map(|c| c.annotations.get(kind))
}

/// The class (or nearest ancestor) carrying a State annotation, together
/// with the declared scope, if any.
pub fn state_annotation<'a>(
    source: &'a dyn MetadataSource,
    class: &'a ClassInfo,
) -> Option<(&'a ClassInfo, Option<super::Scope>)> {
    ancestors(source, class).find_map(|c| c.annotations.state().map(|scope| (c, scope)))
}

/// Annotations of `kind` that apply to a benchmark method, nearest first:
/// the method's own, then the holder class and its ancestors.
pub fn annotations_recursive<'a>(
    source: &'a dyn MetadataSource,
    method: &'a MethodInfo,
    holder: &'a ClassInfo,
    kind: AnnotationKind,
) -> Vec<&'a Annotation> {
    method
        .annotations
        .get(kind)
        .into_iter()
        .chain(ancestors(source, holder).filter_map(|c| c.annotations.get(kind)))
        .collect()
}

/// Nearest annotation of `kind` for a benchmark method.
pub fn annotation_recursive<'a>(
    source: &'a dyn MetadataSource,
    method: &'a MethodInfo,
    holder: &'a ClassInfo,
    kind: AnnotationKind,
) -> Option<&'a Annotation> {
    annotations_recursive(source, method, holder, kind)
        .into_iter()
        .next()
}
