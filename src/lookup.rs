//! Read-only views over a set of classes, and inner-class reconstruction.

use std::collections::HashMap;

use log::error;

use crate::container::{ClassArena, ClassId};
use crate::members::MethodDefinition;

/// Snapshot index of a list of classes, taken at construction time.
///
/// Later renames in the arena are not reflected.
#[derive(Debug, Default)]
pub struct DexLookup {
    classes: HashMap<String, ClassId>,
    methods: HashMap<(String, String, String), (ClassId, usize)>,
}

impl DexLookup {
    pub fn new(arena: &ClassArena, ids: &[ClassId]) -> Self {
        let mut lookup = DexLookup::default();
        for id in ids {
            let Some(class) = arena.get(*id) else { continue };
            let fullname = class.fullname();
            for (ix, method) in class.methods().iter().enumerate() {
                let key = (fullname.clone(), method.name().to_string(), method.prototype().signature());
                lookup.methods.entry(key).or_insert((*id, ix));
            }
            lookup.classes.entry(fullname).or_insert(*id);
        }
        lookup
    }

    pub fn get_class(&self, fullname: &str) -> Option<ClassId> {
        self.classes.get(fullname).copied()
    }

    /// Owning class and index of the method within it.
    pub fn get_method(&self, class: &str, name: &str, signature: &str) -> Option<(ClassId, usize)> {
        self.methods
            .get(&(class.to_string(), name.to_string(), signature.to_string()))
            .copied()
    }

    pub fn method<'a>(&self, arena: &'a ClassArena, class: &str, name: &str, signature: &str) -> Option<&'a MethodDefinition> {
        let (id, ix) = self.get_method(class, name, signature)?;
        arena.get(id)?.methods().get(ix)
    }

    pub fn len(&self) -> usize {
        self.classes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.classes.is_empty()
    }
}

/// A class whose owner named by its `$` suffix was not found.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HierarchyDiagnostic {
    pub class: ClassId,
    pub fullname: String,
    pub missing_owner: String,
}

#[derive(Debug, Default)]
pub struct Hierarchy {
    pub top_level: Vec<ClassId>,
    pub diagnostics: Vec<HierarchyDiagnostic>,
}

/// Attaches `Outer$Inner` classes to `Outer` when `Outer` is in `ids`.
///
/// Classes whose owner is missing stay top-level; they are logged and
/// reported in the diagnostics. Classes that already have an owner are left
/// where they are.
pub fn hierarchicalize(arena: &mut ClassArena, ids: &[ClassId]) -> Hierarchy {
    let lookup = DexLookup::new(arena, ids);
    let mut hierarchy = Hierarchy::default();

    for id in ids {
        let Some(class) = arena.get(*id) else { continue };
        if class.owner().is_some() {
            continue;
        }
        let fullname = class.fullname();
        let Some(split) = fullname.rfind('$') else {
            hierarchy.top_level.push(*id);
            continue;
        };
        let owner_name = fullname[..split].to_string();

        let failure = match lookup.get_class(&owner_name).filter(|owner| owner != id) {
            Some(owner) => match arena.add_inner_class(owner, *id) {
                Ok(()) => continue,
                Err(e) => format!("cannot attach {} to {}: {}", fullname, owner_name, e),
            },
            None => format!("owner {} of inner class {} not found, keeping it top-level", owner_name, fullname),
        };
        error!("{}", failure);
        hierarchy.top_level.push(*id);
        hierarchy.diagnostics.push(HierarchyDiagnostic {
            class: *id,
            fullname,
            missing_owner: owner_name,
        });
    }
    hierarchy
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::class_def::ClassDefinition;
    use crate::members::{AccessFlags, Prototype};

    #[test]
    fn lookup_finds_methods_by_signature() {
        let mut arena = ClassArena::new();
        let mut class = ClassDefinition::new("a.Foo");
        let m = class.new_method("go", Prototype::parse("(J)I").unwrap(), AccessFlags::PUBLIC).unwrap();
        class.add_method(m).unwrap();
        let id = arena.alloc(class);

        let lookup = DexLookup::new(&arena, &[id]);
        assert_eq!(lookup.get_class("a.Foo"), Some(id));
        assert_eq!(lookup.get_method("a.Foo", "go", "(J)I"), Some((id, 0)));
        assert!(lookup.get_method("a.Foo", "go", "()I").is_none());
        assert_eq!(lookup.method(&arena, "a.Foo", "go", "(J)I").unwrap().name(), "go");
    }

    #[test]
    fn nested_names_attach_to_the_last_dollar() {
        let mut arena = ClassArena::new();
        let outer = arena.alloc(ClassDefinition::new("p.Outer"));
        let mid = arena.alloc(ClassDefinition::new("p.Outer$Mid"));
        let leaf = arena.alloc(ClassDefinition::new("p.Outer$Mid$Leaf"));

        let h = hierarchicalize(&mut arena, &[leaf, mid, outer]);
        assert_eq!(h.top_level, vec![outer]);
        assert!(h.diagnostics.is_empty());
        assert_eq!(arena[leaf].owner(), Some(mid));
        assert_eq!(arena[mid].owner(), Some(outer));
    }

    #[test]
    fn missing_owner_stays_top_level() {
        let mut arena = ClassArena::new();
        let orphan = arena.alloc(ClassDefinition::new("Outer$Inner"));
        let h = hierarchicalize(&mut arena, &[orphan]);
        assert_eq!(h.top_level, vec![orphan]);
        assert_eq!(h.diagnostics.len(), 1);
        assert_eq!(h.diagnostics[0].missing_owner, "Outer");
        assert_eq!(arena[orphan].owner(), None);
    }

    #[test]
    fn lambda_names_need_their_full_prefix() {
        let mut arena = ClassArena::new();
        let foo = arena.alloc(ClassDefinition::new("p.Foo"));
        let lambda = arena.alloc(ClassDefinition::new("p.Foo$$Lambda$1"));

        let h = hierarchicalize(&mut arena, &[foo, lambda]);
        assert_eq!(h.top_level, vec![foo, lambda]);
        assert_eq!(h.diagnostics.len(), 1);
        assert_eq!(h.diagnostics[0].missing_owner, "p.Foo$$Lambda");
        assert_eq!(arena[lambda].owner(), None);
        assert!(arena[foo].inner_classes().is_empty());
    }
}
