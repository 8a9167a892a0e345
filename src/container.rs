//! Class storage and dex containers.
//!
//! The [`ClassArena`] owns every class definition and every [`Dex`]. A dex
//! only stores class ids plus two name indices (top-level and inner). The
//! arena keeps, per class, the list of dexes that registered it so renames
//! can be pushed to each of them. Dropped dexes are pruned from that list the
//! next time it is walked.

use std::collections::HashMap;
use std::ops::{Index, IndexMut};

use log::debug;

use crate::class_def::ClassDefinition;
use crate::dex::error::{DexError, ErrorKind};
use crate::members::MethodDefinition;
use crate::types::join_fullname;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ClassId(u32);

impl ClassId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DexId(u32);

impl DexId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// Top-level classes of one output dex, with name indices.
#[derive(Debug, Default)]
pub struct Dex {
    classes: Vec<ClassId>,
    top_level: HashMap<String, ClassId>,
    inner: HashMap<String, ClassId>,
}

impl Dex {
    /// Top-level classes in registration order.
    pub fn classes(&self) -> &[ClassId] {
        &self.classes
    }

    /// Number of classes, inner classes included.
    pub fn class_count(&self) -> usize {
        self.top_level.len() + self.inner.len()
    }

    /// O(1) lookup across the top-level and inner-class indices.
    pub fn get_class(&self, fullname: &str) -> Option<ClassId> {
        self.top_level.get(fullname).or_else(|| self.inner.get(fullname)).copied()
    }

    pub fn is_top_level(&self, fullname: &str) -> bool {
        self.top_level.contains_key(fullname)
    }

    pub fn is_inner(&self, fullname: &str) -> bool {
        self.inner.contains_key(fullname)
    }

    fn index_of(&self, fullname: &str, id: ClassId) -> Option<bool> {
        match (self.top_level.get(fullname), self.inner.get(fullname)) {
            (Some(found), _) if *found == id => Some(true),
            (_, Some(found)) if *found == id => Some(false),
            _ => None,
        }
    }

    fn check_rename(&self, old: &str, new: &str, id: ClassId) -> Result<(), DexError> {
        if self.index_of(old, id).is_none() {
            return Err(DexError::of(ErrorKind::NotAMember, format!("class {} is not a member of this dex", old)));
        }
        if old != new && self.get_class(new).is_some() {
            return Err(DexError::structure(format!("class {} already exists in this dex", new)));
        }
        Ok(())
    }

    fn on_name_changed(&mut self, old: &str, new: &str, id: ClassId) {
        let index = match self.index_of(old, id) {
            Some(true) => &mut self.top_level,
            Some(false) => &mut self.inner,
            None => return,
        };
        index.remove(old);
        index.insert(new.to_string(), id);
    }
}

/// Owner of class definitions and dex containers.
#[derive(Debug, Default)]
pub struct ClassArena {
    classes: Vec<ClassDefinition>,
    registrations: Vec<Vec<DexId>>,
    dexes: Vec<Option<Dex>>,
}

impl ClassArena {
    pub fn new() -> Self {
        ClassArena::default()
    }

    pub fn alloc(&mut self, class: ClassDefinition) -> ClassId {
        let id = ClassId(self.classes.len() as u32);
        self.classes.push(class);
        self.registrations.push(vec![]);
        id
    }

    pub fn get(&self, id: ClassId) -> Option<&ClassDefinition> {
        self.classes.get(id.index())
    }

    pub fn get_mut(&mut self, id: ClassId) -> Option<&mut ClassDefinition> {
        self.classes.get_mut(id.index())
    }

    pub fn len(&self) -> usize {
        self.classes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.classes.is_empty()
    }

    pub fn ids(&self) -> impl Iterator<Item = ClassId> {
        (0..self.classes.len() as u32).map(ClassId)
    }

    fn checked(&self, id: ClassId) -> Result<&ClassDefinition, DexError> {
        self.get(id)
            .ok_or_else(|| DexError::not_found(format!("class id {} is not in this arena", id.0)))
    }

    pub fn create_dex(&mut self) -> DexId {
        let id = DexId(self.dexes.len() as u32);
        self.dexes.push(Some(Dex::default()));
        id
    }

    pub fn dex(&self, id: DexId) -> Option<&Dex> {
        self.dexes.get(id.index()).and_then(Option::as_ref)
    }

    fn dex_mut(&mut self, id: DexId) -> Result<&mut Dex, DexError> {
        self.dexes
            .get_mut(id.index())
            .and_then(Option::as_mut)
            .ok_or_else(|| DexError::not_found(format!("dex {} does not exist", id.0)))
    }

    /// Drops a dex. Registrations that point at it are pruned lazily.
    pub fn remove_dex(&mut self, id: DexId) -> Option<Dex> {
        self.dexes.get_mut(id.index()).and_then(Option::take)
    }

    /// Dexes currently holding `class`, pruning dropped ones.
    pub fn registered_dexes(&mut self, class: ClassId) -> Vec<DexId> {
        self.prune(class);
        self.registrations.get(class.index()).cloned().unwrap_or_default()
    }

    fn prune(&mut self, class: ClassId) {
        let dexes = &self.dexes;
        if let Some(list) = self.registrations.get_mut(class.index()) {
            let before = list.len();
            list.retain(|d| matches!(dexes.get(d.index()), Some(Some(_))));
            if list.len() != before {
                debug!("pruned {} dropped dex registrations", before - list.len());
            }
        }
    }

    /// `class` and its inner classes, depth first.
    fn subtree(&self, class: ClassId) -> Vec<ClassId> {
        let mut out = vec![];
        let mut stack = vec![class];
        while let Some(id) = stack.pop() {
            out.push(id);
            if let Some(c) = self.get(id) {
                stack.extend(c.inner_classes.iter().rev());
            }
        }
        out
    }

    /// Registers a top-level class and indexes its inner classes recursively.
    pub fn add_class(&mut self, dex: DexId, class: ClassId) -> Result<(), DexError> {
        self.checked(class)?;
        let subtree = self.subtree(class);
        let names: Vec<String> = subtree.iter().map(|id| self[*id].fullname()).collect();
        let d = self.dex_mut(dex)?;
        for name in &names {
            if d.get_class(name).is_some() {
                return Err(DexError::structure(format!("class {} already exists in this dex", name)));
            }
        }
        d.classes.push(class);
        for (i, (id, name)) in subtree.iter().zip(names).enumerate() {
            if i == 0 {
                d.top_level.insert(name, *id);
            } else {
                d.inner.insert(name, *id);
            }
        }
        for id in subtree {
            self.registrations[id.index()].push(dex);
        }
        Ok(())
    }

    /// Unregisters a top-level class and its inner classes.
    pub fn remove_class(&mut self, dex: DexId, class: ClassId) -> Result<(), DexError> {
        let name = self.checked(class)?.fullname();
        let subtree = self.subtree(class);
        let names: Vec<String> = subtree.iter().map(|id| self[*id].fullname()).collect();
        let d = self.dex_mut(dex)?;
        if d.index_of(&name, class) != Some(true) {
            return Err(DexError::of(ErrorKind::NotAMember, format!("class {} is not a top-level member of this dex", name)));
        }
        d.classes.retain(|c| *c != class);
        d.top_level.remove(&name);
        for n in names.iter().skip(1) {
            d.inner.remove(n);
        }
        for id in subtree {
            self.registrations[id.index()].retain(|r| *r != dex);
        }
        Ok(())
    }

    /// Attaches `inner` to `owner`, re-indexing it in every dex that holds the owner.
    pub fn add_inner_class(&mut self, owner: ClassId, inner: ClassId) -> Result<(), DexError> {
        self.checked(owner)?;
        let inner_name = self.checked(inner)?.fullname();
        if owner == inner || self.subtree(inner).contains(&owner) {
            return Err(DexError::structure(format!("class {} cannot be nested in itself", inner_name)));
        }
        if let Some(existing) = self[inner].owner {
            return Err(DexError::structure(format!(
                "class {} is already an inner class of {}",
                inner_name,
                self[existing].fullname()
            )));
        }

        self.prune(owner);
        self.prune(inner);
        let owner_dexes = self.registrations[owner.index()].clone();
        let subtree = self.subtree(inner);
        let names: Vec<String> = subtree.iter().map(|id| self[*id].fullname()).collect();

        for dex in &owner_dexes {
            let d = self.dex_mut(*dex)?;
            let held_top_level = d.index_of(&inner_name, inner) == Some(true);
            if !held_top_level {
                for name in &names {
                    if d.get_class(name).is_some() {
                        return Err(DexError::structure(format!("class {} already exists in this dex", name)));
                    }
                }
            }
        }

        for dex in &owner_dexes {
            let d = self.dex_mut(*dex)?;
            if d.index_of(&inner_name, inner) == Some(true) {
                d.top_level.remove(&inner_name);
                d.classes.retain(|c| *c != inner);
                d.inner.insert(inner_name.clone(), inner);
            } else {
                for (id, name) in subtree.iter().zip(&names) {
                    d.inner.insert(name.clone(), *id);
                }
                for id in &subtree {
                    self.registrations[id.index()].push(*dex);
                }
            }
        }

        self[inner].owner = Some(owner);
        self[owner].inner_classes.push(inner);
        Ok(())
    }

    pub fn get_class(&self, dex: DexId, fullname: &str) -> Option<ClassId> {
        self.dex(dex)?.get_class(fullname)
    }

    pub fn get_method(&self, dex: DexId, class: &str, name: &str, signature: &str) -> Option<&MethodDefinition> {
        let id = self.get_class(dex, class)?;
        self.get(id)?.get_method_with_signature(name, signature)
    }

    /// Renames a class and updates the indices of every dex that registered it.
    pub fn rename_class(&mut self, class: ClassId, new_fullname: &str) -> Result<(), DexError> {
        let old = self.checked(class)?.fullname();
        let new = crate::types::ClassReference::new(new_fullname).fullname();
        self.prune(class);
        let dexes = self.registrations[class.index()].clone();
        for dex in &dexes {
            if let Some(d) = self.dex(*dex) {
                d.check_rename(&old, &new, class)?;
            }
        }
        for dex in &dexes {
            self.dex_mut(*dex)?.on_name_changed(&old, &new, class);
        }
        self[class].set_fullname_unchecked(&new);
        Ok(())
    }

    pub fn set_class_name(&mut self, class: ClassId, name: &str) -> Result<(), DexError> {
        let namespace = self.checked(class)?.namespace().to_string();
        self.rename_class(class, &join_fullname(&namespace, name))
    }

    pub fn set_class_namespace(&mut self, class: ClassId, namespace: &str) -> Result<(), DexError> {
        let name = self.checked(class)?.name().to_string();
        self.rename_class(class, &join_fullname(&namespace.replace('/', "."), &name))
    }

    /// Every class of a dex: each top-level class followed by its inner classes, depth first.
    pub fn flatten(&self, dex: DexId) -> Vec<ClassId> {
        match self.dex(dex) {
            Some(d) => d.classes.iter().flat_map(|c| self.subtree(*c)).collect(),
            None => vec![],
        }
    }
}

/// Panics when `id` was not allocated by this arena; [`ClassArena::get`] is
/// the fallible form.
impl Index<ClassId> for ClassArena {
    type Output = ClassDefinition;

    fn index(&self, id: ClassId) -> &ClassDefinition {
        &self.classes[id.index()]
    }
}

/// Panics like `Index`; [`ClassArena::get_mut`] is the fallible form.
impl IndexMut<ClassId> for ClassArena {
    fn index_mut(&mut self, id: ClassId) -> &mut ClassDefinition {
        &mut self.classes[id.index()]
    }
}
