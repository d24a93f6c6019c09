//! Module symbol table.
//!
//! All units and FFI functions known to a program live in one arena of
//! [`ModuleObject`]s addressed by [`ObjectId`].  A fixed table of 2048 hash
//! buckets indexes them by name, each bucket keeping template units, typed
//! units and FFI functions in separate chains in insertion order.  Which flat
//! list an object belongs to is the explicit [`ObjectList`] field.

use std::sync::Arc;

use super::args::{
    argument_count_match, argument_types_match_ffi, argument_types_match_input, ArgumentMatch,
    FfiArgumentMatch, TypeMismatch,
};
use super::ast::Unit;
use super::types::PrimitiveType;
use crate::error::Error;
use crate::ffi::{FfiGroup, FfiVariables, FunctionDefinition, GroupHooks};

pub const HASH_TABLE_SIZE: usize = 2048;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObjectId(pub u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct GroupId(pub u32);

/// The flat list an object is a member of.  Every object is in exactly one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ObjectList {
    UnresolvedUnits,
    ReferencedUnits,
    TemplateUnits,
    RegisteredFfi,
    ReferencedFfi,
}

#[derive(Debug, thiserror::Error, Clone, PartialEq)]
pub enum LookupError {
    #[error("module object not found")]
    NotFound,
    #[error("argument count mismatch")]
    ArgumentCount { object: ObjectId },
    #[error("argument {} cannot convert from '{}' to '{}'", .mismatch.index, .mismatch.from, .mismatch.to)]
    TypeMismatch { object: ObjectId, mismatch: TypeMismatch },
    #[error("incomplete definition")]
    IncompleteDef,
}

// ── Objects ───────────────────────────────────────────────────────────────────

#[derive(Debug)]
pub struct UnitObject {
    /// `None` while the resolver has the unit checked out.
    unit: Option<Box<Unit>>,
    pub input_types: Vec<PrimitiveType>,
    /// `Delayed` until the output type is known.
    pub output: PrimitiveType,
    /// Cloned from a template for a particular argument-type list.
    pub instance: bool,
}

#[derive(Debug)]
pub struct FfiObject {
    pub group: GroupId,
    pub definition: Arc<FunctionDefinition>,
}

#[derive(Debug)]
pub enum ObjectKind {
    Unit(UnitObject),
    Ffi(FfiObject),
}

#[derive(Debug)]
pub struct ModuleObject {
    pub name: String,
    pub list: ObjectList,
    pub kind: ObjectKind,
}

impl ModuleObject {
    pub fn is_referenced(&self) -> bool {
        matches!(self.list, ObjectList::ReferencedUnits | ObjectList::ReferencedFfi)
    }

    pub fn as_unit(&self) -> Option<&UnitObject> {
        match &self.kind {
            ObjectKind::Unit(u) => Some(u),
            ObjectKind::Ffi(_) => None,
        }
    }

    pub fn as_ffi(&self) -> Option<&FfiObject> {
        match &self.kind {
            ObjectKind::Ffi(f) => Some(f),
            ObjectKind::Unit(_) => None,
        }
    }

    /// Parameter types of the object's signature.
    pub fn parameter_types(&self) -> &[PrimitiveType] {
        match &self.kind {
            ObjectKind::Unit(u) => &u.input_types,
            ObjectKind::Ffi(f) => &f.definition.arguments,
        }
    }

    pub fn output_type(&self) -> PrimitiveType {
        match &self.kind {
            ObjectKind::Unit(u) => u.output,
            ObjectKind::Ffi(f) => f.definition.output,
        }
    }
}

pub struct FfiGroupRecord {
    pub name: String,
    pub id: GroupId,
    pub referenced: bool,
    pub hooks: Option<Arc<dyn GroupHooks>>,
    pub objects: Vec<ObjectId>,
}

impl std::fmt::Debug for FfiGroupRecord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FfiGroupRecord")
            .field("name", &self.name)
            .field("id", &self.id)
            .field("referenced", &self.referenced)
            .field("objects", &self.objects)
            .finish()
    }
}

#[derive(Debug, Default, Clone)]
struct Bucket {
    templates: Vec<ObjectId>,
    typed: Vec<ObjectId>,
    ffi: Vec<ObjectId>,
}

/// FNV-style multiply-xor hash, reduced to a bucket index.
pub fn compute_hash(name: &str) -> usize {
    let mut hash: u32 = 0;
    for b in name.bytes() {
        hash = hash.wrapping_mul(16_777_619);
        hash ^= u32::from(b);
    }
    hash as usize % HASH_TABLE_SIZE
}

// ── Module ────────────────────────────────────────────────────────────────────

#[derive(Debug)]
pub struct Module {
    objects: Vec<ModuleObject>,
    buckets: Vec<Bucket>,
    groups: Vec<FfiGroupRecord>,
    next_unit_id: u32,
    variables: FfiVariables,
}

impl Default for Module {
    fn default() -> Self {
        Self::new()
    }
}

impl Module {
    pub fn new() -> Self {
        Module {
            objects: Vec::new(),
            buckets: vec![Bucket::default(); HASH_TABLE_SIZE],
            groups: Vec::new(),
            next_unit_id: 1,
            variables: FfiVariables::new(),
        }
    }

    pub fn object(&self, id: ObjectId) -> Option<&ModuleObject> {
        self.objects.get(id.0 as usize)
    }

    fn object_mut(&mut self, id: ObjectId) -> Option<&mut ModuleObject> {
        self.objects.get_mut(id.0 as usize)
    }

    pub fn objects(&self) -> impl Iterator<Item = (ObjectId, &ModuleObject)> {
        self.objects.iter().enumerate().map(|(i, o)| (ObjectId(i as u32), o))
    }

    /// Members of one flat list, in insertion order.
    pub fn objects_in(&self, list: ObjectList) -> impl Iterator<Item = ObjectId> + '_ {
        self.objects().filter(move |(_, o)| o.list == list).map(|(id, _)| id)
    }

    pub fn groups(&self) -> &[FfiGroupRecord] {
        &self.groups
    }

    pub fn group(&self, id: GroupId) -> Option<&FfiGroupRecord> {
        self.groups.get(id.0 as usize)
    }

    pub fn unit(&self, id: ObjectId) -> Option<&Unit> {
        self.object(id)?.as_unit()?.unit.as_deref()
    }

    /// Find a unit by name and declared input types.
    pub fn find_unit(&self, name: &str, input_types: &[PrimitiveType]) -> Option<ObjectId> {
        let bucket = &self.buckets[compute_hash(name)];
        bucket.typed.iter().chain(&bucket.templates).copied().find(|&id| {
            self.object(id)
                .is_some_and(|o| o.name == name && o.parameter_types() == input_types)
        })
    }

    // ── Units ─────────────────────────────────────────────────────────────────

    /// Register a unit.  Typed units start unresolved; a unit with an untyped
    /// input goes into the template chain.
    pub fn add_unit(&mut self, unit: Unit) -> ObjectId {
        self.insert_unit(unit, false)
    }

    /// Register a unit cloned from a template for concrete argument types.
    pub fn add_instance(&mut self, unit: Unit) -> ObjectId {
        self.insert_unit(unit, true)
    }

    fn insert_unit(&mut self, unit: Unit, instance: bool) -> ObjectId {
        let id = ObjectId(self.objects.len() as u32);
        let typed = unit.is_typed();
        let list = if typed { ObjectList::UnresolvedUnits } else { ObjectList::TemplateUnits };
        let bucket = &mut self.buckets[compute_hash(&unit.name)];
        if typed {
            bucket.typed.push(id);
        } else {
            bucket.templates.push(id);
        }
        tracing::debug!(unit = %unit.name, id = id.0, ?list, instance, "add unit module object");
        self.objects.push(ModuleObject {
            name: unit.name.clone(),
            list,
            kind: ObjectKind::Unit(UnitObject {
                input_types: unit.input_types(),
                output: PrimitiveType::Delayed,
                unit: Some(Box::new(unit)),
                instance,
            }),
        });
        id
    }

    /// Take a unit out of the module for resolution.
    pub fn check_out_unit(&mut self, id: ObjectId) -> Option<Box<Unit>> {
        match &mut self.object_mut(id)?.kind {
            ObjectKind::Unit(u) => u.unit.take(),
            ObjectKind::Ffi(_) => None,
        }
    }

    /// Return a checked-out unit, refreshing the cached signature.
    pub fn check_in_unit(&mut self, id: ObjectId, unit: Box<Unit>) {
        if let Some(ModuleObject { kind: ObjectKind::Unit(u), .. }) = self.object_mut(id) {
            u.input_types = unit.input_types();
            u.unit = Some(unit);
        }
    }

    /// Whether the unit is currently checked out.
    pub fn is_checked_out(&self, id: ObjectId) -> bool {
        self.object(id)
            .and_then(ModuleObject::as_unit)
            .is_some_and(|u| u.unit.is_none())
    }

    /// Publish a unit's output type.
    pub fn set_unit_output(&mut self, id: ObjectId, output: PrimitiveType) {
        if let Some(ModuleObject { kind: ObjectKind::Unit(u), .. }) = self.object_mut(id) {
            u.output = output;
        }
    }

    /// Assign the next unit id and move the unit to the referenced list.
    pub fn mark_unit_resolved(&mut self, id: ObjectId) -> Option<u32> {
        let unit_id = self.next_unit_id;
        let object = self.objects.get_mut(id.0 as usize)?;
        let ObjectKind::Unit(u) = &mut object.kind else { return None };
        if object.list == ObjectList::ReferencedUnits {
            return u.unit.as_ref().map(|unit| unit.unit_id);
        }
        if let Some(unit) = u.unit.as_mut() {
            unit.unit_id = unit_id;
        }
        object.list = ObjectList::ReferencedUnits;
        self.next_unit_id += 1;
        tracing::debug!(unit = %object.name, unit_id, "unit resolved");
        Some(unit_id)
    }

    /// Number of unit ids handed out so far.
    pub fn unit_count(&self) -> u32 {
        self.next_unit_id - 1
    }

    pub fn lookup_template(&self, name: &str) -> Option<ObjectId> {
        self.buckets[compute_hash(name)]
            .templates
            .iter()
            .copied()
            .find(|&id| self.object(id).is_some_and(|o| o.name == name))
    }

    fn named_in(&self, chain: &[ObjectId], name: &str) -> Vec<(ObjectId, &ModuleObject)> {
        chain
            .iter()
            .filter_map(|&id| self.object(id).map(|o| (id, o)))
            .filter(|(_, o)| o.name == name)
            .collect()
    }

    /// Find the callable for `name` applied to `argument_types`.
    ///
    /// Typed units are tried by exact signature, then by argument count;
    /// FFI functions are ranked by conversion delta, first registered wins a
    /// tie.  A count mismatch stops the search with the offending object.
    pub fn lookup_module_object(
        &self,
        name: &str,
        argument_types: &[PrimitiveType],
    ) -> Result<ObjectId, LookupError> {
        if argument_types.iter().any(|t| !t.is_concrete()) {
            return Err(LookupError::IncompleteDef);
        }
        let bucket = &self.buckets[compute_hash(name)];
        let typed = self.named_in(&bucket.typed, name);

        for &(id, object) in &typed {
            match argument_types_match_input(object.parameter_types(), argument_types) {
                ArgumentMatch::Match => {
                    tracing::trace!(name, id = id.0, "lookup: exact unit match");
                    return Ok(id);
                }
                ArgumentMatch::CountMismatch => return Err(LookupError::ArgumentCount { object: id }),
                ArgumentMatch::TypeMismatch(_) => {}
            }
        }

        for &(id, object) in &typed {
            let Some(unit) = object.as_unit() else { continue };
            if unit.instance {
                continue;
            }
            match argument_count_match(&unit.input_types, argument_types) {
                ArgumentMatch::CountMismatch => return Err(LookupError::ArgumentCount { object: id }),
                _ => {
                    if let ArgumentMatch::TypeMismatch(mismatch) =
                        argument_types_match_input(&unit.input_types, argument_types)
                    {
                        return Err(LookupError::TypeMismatch { object: id, mismatch });
                    }
                }
            }
        }

        let mut best: Option<(ObjectId, FfiArgumentMatch)> = None;
        for (id, object) in self.named_in(&bucket.ffi, name) {
            let Some(m) = argument_types_match_ffi(object.parameter_types(), argument_types) else {
                return Err(LookupError::ArgumentCount { object: id });
            };
            if best.as_ref().map_or(true, |(_, b)| m.delta < b.delta) {
                best = Some((id, m));
            }
        }
        match best {
            Some((object, FfiArgumentMatch { mismatch: Some(mismatch), .. })) => {
                Err(LookupError::TypeMismatch { object, mismatch })
            }
            Some((id, m)) => {
                tracing::trace!(name, id = id.0, delta = m.delta, "lookup: ffi match");
                Ok(id)
            }
            None => Err(LookupError::NotFound),
        }
    }

    // ── FFI ───────────────────────────────────────────────────────────────────

    /// Register a group of FFI functions.  Nothing is registered if any
    /// definition is invalid.
    pub fn add_ffi_group(&mut self, group: FfiGroup) -> Result<GroupId, Error> {
        for def in &group.functions {
            def.validate()
                .map_err(|reason| Error::FfiRegistration { name: def.name.clone(), reason })?;
        }
        let gid = GroupId(self.groups.len() as u32);
        let mut objects = Vec::with_capacity(group.functions.len());
        for def in group.functions {
            let id = ObjectId(self.objects.len() as u32);
            self.buckets[compute_hash(&def.name)].ffi.push(id);
            self.objects.push(ModuleObject {
                name: def.name.clone(),
                list: ObjectList::RegisteredFfi,
                kind: ObjectKind::Ffi(FfiObject { group: gid, definition: Arc::new(def) }),
            });
            objects.push(id);
        }
        tracing::debug!(group = %group.name, functions = objects.len(), "add ffi group");
        self.groups.push(FfiGroupRecord {
            name: group.name,
            id: gid,
            referenced: false,
            hooks: group.hooks,
            objects,
        });
        Ok(gid)
    }

    /// Move an FFI function, and on first use its group, to the referenced lists.
    pub fn reference_ffi(&mut self, id: ObjectId) {
        let Some(object) = self.objects.get_mut(id.0 as usize) else { return };
        let ObjectKind::Ffi(ffi) = &object.kind else { return };
        let gid = ffi.group;
        if object.list == ObjectList::RegisteredFfi {
            object.list = ObjectList::ReferencedFfi;
            tracing::debug!(function = %object.name, "reference ffi");
        }
        if let Some(group) = self.groups.get_mut(gid.0 as usize) {
            group.referenced = true;
        }
    }

    pub fn referenced_groups(&self) -> impl Iterator<Item = &FfiGroupRecord> {
        self.groups.iter().filter(|g| g.referenced)
    }

    pub fn set_ffi_variable(&mut self, name: &str, value: &str) {
        self.variables.insert(name.to_owned(), value.to_owned());
    }

    pub fn ffi_variables(&self) -> &FfiVariables {
        &self.variables
    }
}
