//! Type resolution
//!
//! The resolver walks a parsed [`TranslationUnit`] and produces a populated
//! [`TypeTable`] plus the unit's variables with canonical types. It performs,
//! in order:
//!
//! 1. **Registration and hoisting**: every named struct/union/enum/typedef
//!    enters the table; inline bodies (named or anonymous) are hoisted under
//!    their tag or a minted `__anon_*` key and the referencing type is
//!    rewritten to the key. Enum constant values are assigned here,
//!    left-to-right: explicit value if given, else previous + 1 (0 first).
//! 2. **Typedef canonicalization**: aliases resolve transitively to a
//!    canonical type. An in-progress set guards the walk; revisiting an
//!    in-progress typedef is a cycle. The walk descends through by-value
//!    aggregate members (pointer members terminate it), so a cycle routed
//!    through a struct body is still caught.
//! 3. **Aggregate checking**: every member type is canonicalized, by-value
//!    references to undefined tags are rejected, and self-containment is
//!    detected.
//!
//! Anonymous members are spliced during registration: their fields enter the
//! enclosing aggregate's flattened lookup namespace (with the index path
//! crossing the anonymous boundary), while the nested definition stays in
//! the member list for layout.

use crate::parser::ast::{
    AggregateBody, AggregateKind, Declaration, EnumBody, InitValue,
    SourceLocation, TranslationUnit, Type, TypeName,
};
use crate::types::table::{
    Aggregate, EnumConstant, EnumDef, Member, MemberPath, TypeTable,
};
use rustc_hash::{FxHashMap, FxHashSet};
use std::fmt;

/// Errors produced during type resolution
#[derive(Debug, Clone)]
pub enum ResolutionError {
    /// A tag or typedef name was referenced by value but never defined
    UnknownType {
        name: String,
        location: SourceLocation,
    },

    /// Two named members in the same flattened namespace share a name
    DuplicateMember {
        name: String,
        aggregate: String,
        location: SourceLocation,
    },

    /// A typedef chain revisits a typedef that is still being resolved
    CyclicTypedef {
        name: String,
        location: SourceLocation,
    },

    /// A tag or typedef name was defined twice
    DuplicateDefinition {
        name: String,
        location: SourceLocation,
    },

    /// An enum constant name was declared twice in the ordinary namespace
    DuplicateEnumConstant {
        name: String,
        location: SourceLocation,
    },

    /// An aggregate contains itself by value (infinite size)
    RecursiveAggregate {
        name: String,
        location: SourceLocation,
    },
}

impl fmt::Display for ResolutionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResolutionError::UnknownType { name, location } => write!(
                f,
                "Resolution error at {}: unknown type '{}'",
                location, name
            ),
            ResolutionError::DuplicateMember {
                name,
                aggregate,
                location,
            } => write!(
                f,
                "Resolution error at {}: duplicate member '{}' in {}",
                location, name, aggregate
            ),
            ResolutionError::CyclicTypedef { name, location } => write!(
                f,
                "Resolution error at {}: cyclic typedef '{}'",
                location, name
            ),
            ResolutionError::DuplicateDefinition { name, location } => write!(
                f,
                "Resolution error at {}: '{}' is defined twice",
                location, name
            ),
            ResolutionError::DuplicateEnumConstant { name, location } => {
                write!(
                    f,
                    "Resolution error at {}: duplicate enum constant '{}'",
                    location, name
                )
            }
            ResolutionError::RecursiveAggregate { name, location } => write!(
                f,
                "Resolution error at {}: '{}' contains itself by value",
                location, name
            ),
        }
    }
}

impl std::error::Error for ResolutionError {}

/// A top-level variable with its canonical type and parsed initializer
#[derive(Debug, Clone)]
pub struct ResolvedVariable {
    pub name: String,
    pub ty: Type,
    pub init: Option<InitValue>,
    pub location: SourceLocation,
}

/// The resolver's output: the session type table and the unit's variables
#[derive(Debug)]
pub struct ResolvedUnit {
    pub table: TypeTable,
    pub variables: Vec<ResolvedVariable>,
}

impl ResolvedUnit {
    pub fn variable(&self, name: &str) -> Option<&ResolvedVariable> {
        self.variables.iter().find(|v| v.name == name)
    }
}

/// Resolve a parsed unit into a type table and canonical variables.
pub fn resolve_unit(
    unit: &TranslationUnit,
) -> Result<ResolvedUnit, ResolutionError> {
    Resolver::new().run(unit)
}

struct Resolver {
    table: TypeTable,
    /// Typedef targets as written (bodies hoisted), before canonicalization
    raw_typedefs: FxHashMap<String, (Type, SourceLocation)>,
    typedef_order: Vec<String>,
    /// Aggregates whose members are fully canonicalized and checked
    checked: FxHashSet<String>,
}

impl Resolver {
    fn new() -> Self {
        Resolver {
            table: TypeTable::new(),
            raw_typedefs: FxHashMap::default(),
            typedef_order: Vec::new(),
            checked: FxHashSet::default(),
        }
    }

    fn run(
        mut self,
        unit: &TranslationUnit,
    ) -> Result<ResolvedUnit, ResolutionError> {
        let mut pending = Vec::new();

        // Pass 1: registration and hoisting
        for decl in &unit.decls {
            match decl {
                Declaration::Aggregate { body, .. } => {
                    self.register_aggregate(body)?;
                }
                Declaration::Enum { body, .. } => {
                    self.register_enum(body)?;
                }
                Declaration::Typedef { name, ty, location } => {
                    let hoisted = self.hoist_type(ty)?;
                    if self.raw_typedefs.contains_key(name) {
                        return Err(ResolutionError::DuplicateDefinition {
                            name: name.clone(),
                            location: *location,
                        });
                    }
                    self.raw_typedefs
                        .insert(name.clone(), (hoisted, *location));
                    self.typedef_order.push(name.clone());
                }
                Declaration::Variable {
                    name,
                    ty,
                    init,
                    location,
                } => {
                    let hoisted = self.hoist_type(ty)?;
                    pending.push((
                        name.clone(),
                        hoisted,
                        init.clone(),
                        *location,
                    ));
                }
            }
        }

        // Pass 2: canonicalize every typedef
        for name in self.typedef_order.clone() {
            let location = self
                .raw_typedefs
                .get(&name)
                .map(|(_, loc)| *loc)
                .unwrap_or(SourceLocation::new(1, 1));
            let mut visiting = Vec::new();
            self.resolve_typedef(&name, location, &mut visiting)?;
        }

        // Pass 3: canonicalize and check every registered aggregate
        let keys: Vec<String> = self
            .table
            .aggregates_in_order()
            .map(|a| a.key.clone())
            .collect();
        for key in keys {
            let mut visiting = Vec::new();
            self.check_aggregate(&key, &mut visiting)?;
        }

        // Pass 4: canonicalize variable types
        let mut variables = Vec::new();
        for (name, ty, init, location) in pending {
            let mut visiting = Vec::new();
            let canon = self.canonicalize(&ty, location, &mut visiting)?;
            if canon.pointer_depth == 0 {
                self.check_value_use(&canon, location, &mut visiting)?;
            }
            variables.push(ResolvedVariable {
                name,
                ty: canon,
                init,
                location,
            });
        }

        Ok(ResolvedUnit {
            table: self.table,
            variables,
        })
    }

    /// Rewrite a parsed type so that inline bodies are registered in the
    /// table and every reference uses a table key.
    fn hoist_type(&mut self, ty: &Type) -> Result<Type, ResolutionError> {
        let base = match &ty.base {
            TypeName::AggregateDef(body) => {
                let key = self.register_aggregate(body)?;
                TypeName::TagRef(body.kind, key)
            }
            TypeName::EnumDef(body) => {
                let key = self.register_enum(body)?;
                TypeName::EnumRef(key)
            }
            TypeName::TagRef(kind, tag) => {
                TypeName::TagRef(*kind, TypeTable::tag_key(*kind, tag))
            }
            TypeName::EnumRef(tag) => {
                TypeName::EnumRef(TypeTable::enum_key(tag))
            }
            other => other.clone(),
        };
        Ok(Type {
            base,
            ..ty.clone()
        })
    }

    /// Register a struct/union body (members hoisted inner-first) and build
    /// its flattened lookup namespace. Returns the table key.
    fn register_aggregate(
        &mut self,
        body: &AggregateBody,
    ) -> Result<String, ResolutionError> {
        let key = match &body.tag {
            Some(tag) => {
                let key = TypeTable::tag_key(body.kind, tag);
                if self.table.contains_aggregate(&key) {
                    return Err(ResolutionError::DuplicateDefinition {
                        name: format!("{} {}", body.kind, tag),
                        location: body.location,
                    });
                }
                key
            }
            None => self.table.mint_anon_key(match body.kind {
                AggregateKind::Struct => "struct",
                AggregateKind::Union => "union",
            }),
        };

        let display = match &body.tag {
            Some(tag) => format!("{} {}", body.kind, tag),
            None => format!("anonymous {}", body.kind),
        };

        let mut members = Vec::new();
        for decl in &body.members {
            // A tagged body or enum with no declarator only declares the
            // nested tag; it contributes no member (C11 6.7.2.1).
            if decl.name.is_none() && decl.bit_width.is_none() {
                match &decl.ty.base {
                    TypeName::AggregateDef(inner) if inner.tag.is_some() => {
                        self.register_aggregate(inner)?;
                        continue;
                    }
                    TypeName::EnumDef(inner) => {
                        self.register_enum(inner)?;
                        continue;
                    }
                    _ => {}
                }
            }
            let ty = self.hoist_type(&decl.ty)?;
            members.push(Member {
                name: decl.name.clone(),
                ty,
                bit_width: decl.bit_width,
                location: decl.location,
            });
        }

        // Flattened lookup: direct members by name, plus the fields of
        // anonymous members spliced in at their nesting point.
        let mut lookup: FxHashMap<String, MemberPath> = FxHashMap::default();
        for (i, member) in members.iter().enumerate() {
            if let Some(name) = &member.name {
                insert_lookup(
                    &mut lookup,
                    name,
                    vec![i],
                    &display,
                    member.location,
                )?;
            } else if member.bit_width.is_none() {
                if let TypeName::TagRef(_, inner_key) = &member.ty.base {
                    let spliced: Vec<(String, MemberPath)> = self
                        .table
                        .aggregate(inner_key)
                        .map(|inner| {
                            inner
                                .lookup
                                .iter()
                                .map(|(n, p)| (n.clone(), p.clone()))
                                .collect()
                        })
                        .unwrap_or_default();
                    for (name, inner_path) in spliced {
                        let mut path = vec![i];
                        path.extend(inner_path);
                        insert_lookup(
                            &mut lookup,
                            &name,
                            path,
                            &display,
                            member.location,
                        )?;
                    }
                }
            }
        }

        self.table.insert_aggregate(Aggregate {
            kind: body.kind,
            tag: body.tag.clone(),
            key: key.clone(),
            members,
            lookup,
            location: body.location,
        });
        Ok(key)
    }

    /// Register an enum body and assign constant values.
    fn register_enum(
        &mut self,
        body: &EnumBody,
    ) -> Result<String, ResolutionError> {
        let key = match &body.tag {
            Some(tag) => {
                let key = TypeTable::enum_key(tag);
                if self.table.contains_enum(&key) {
                    return Err(ResolutionError::DuplicateDefinition {
                        name: format!("enum {}", tag),
                        location: body.location,
                    });
                }
                key
            }
            None => self.table.mint_anon_key("enum"),
        };

        let mut constants: Vec<EnumConstant> = Vec::new();
        let mut next = 0i64;
        for decl in &body.constants {
            let value = decl.value.unwrap_or(next);
            next = value + 1;
            if self.table.contains_enum_constant(&decl.name) {
                return Err(ResolutionError::DuplicateEnumConstant {
                    name: decl.name.clone(),
                    location: decl.location,
                });
            }
            self.table.insert_enum_constant(decl.name.clone(), value);
            constants.push(EnumConstant {
                name: decl.name.clone(),
                value,
                location: decl.location,
            });
        }

        self.table.insert_enum(EnumDef {
            tag: body.tag.clone(),
            key: key.clone(),
            constants,
            location: body.location,
        });
        Ok(key)
    }

    /// Resolve one typedef to its canonical type, detecting cycles via the
    /// in-progress `visiting` set.
    fn resolve_typedef(
        &mut self,
        name: &str,
        use_location: SourceLocation,
        visiting: &mut Vec<String>,
    ) -> Result<Type, ResolutionError> {
        if let Some(canonical) = self.table.typedef(name) {
            return Ok(canonical.clone());
        }

        let (raw, location) = match self.raw_typedefs.get(name) {
            Some((ty, loc)) => (ty.clone(), *loc),
            None => {
                return Err(ResolutionError::UnknownType {
                    name: name.to_string(),
                    location: use_location,
                });
            }
        };

        let marker = format!("typedef.{}", name);
        if visiting.contains(&marker) {
            return Err(ResolutionError::CyclicTypedef {
                name: name.to_string(),
                location,
            });
        }
        visiting.push(marker);

        let canonical = self.canonicalize(&raw, location, visiting)?;
        if canonical.pointer_depth == 0 {
            self.check_value_use(&canonical, location, visiting)?;
        }

        visiting.pop();
        self.table
            .insert_typedef(name.to_string(), canonical.clone());
        Ok(canonical)
    }

    /// Replace a typedef reference at the base of a type with its canonical
    /// target. Hoisted references and primitives pass through unchanged.
    fn canonicalize(
        &mut self,
        ty: &Type,
        use_location: SourceLocation,
        visiting: &mut Vec<String>,
    ) -> Result<Type, ResolutionError> {
        match &ty.base {
            TypeName::TypedefRef(name) => {
                let inner =
                    self.resolve_typedef(name, use_location, visiting)?;
                Ok(compose(ty, &inner))
            }
            _ => Ok(ty.clone()),
        }
    }

    /// Check a canonical type used by value: the referenced definition must
    /// exist, and by-value aggregate containment must be finite.
    fn check_value_use(
        &mut self,
        ty: &Type,
        use_location: SourceLocation,
        visiting: &mut Vec<String>,
    ) -> Result<(), ResolutionError> {
        match &ty.base {
            TypeName::TagRef(_, key) => {
                if !self.table.contains_aggregate(key) {
                    return Err(ResolutionError::UnknownType {
                        name: TypeTable::display_key(key),
                        location: use_location,
                    });
                }
                self.check_aggregate(key, visiting)
            }
            TypeName::EnumRef(key) => {
                if !self.table.contains_enum(key) {
                    return Err(ResolutionError::UnknownType {
                        name: TypeTable::display_key(key),
                        location: use_location,
                    });
                }
                Ok(())
            }
            _ => Ok(()),
        }
    }

    /// Canonicalize and check every member of an aggregate, descending into
    /// by-value members. Pointer members terminate the descent.
    fn check_aggregate(
        &mut self,
        key: &str,
        visiting: &mut Vec<String>,
    ) -> Result<(), ResolutionError> {
        if self.checked.contains(key) {
            return Ok(());
        }

        let (count, location, display) = match self.table.aggregate(key) {
            Some(aggregate) => (
                aggregate.members.len(),
                aggregate.location,
                aggregate.display_name(),
            ),
            None => return Ok(()),
        };

        let marker = format!("aggregate.{}", key);
        if visiting.contains(&marker) {
            return Err(ResolutionError::RecursiveAggregate {
                name: display,
                location,
            });
        }
        visiting.push(marker);

        for i in 0..count {
            let (member_ty, member_loc) = match self.table.aggregate(key) {
                Some(aggregate) => (
                    aggregate.members[i].ty.clone(),
                    aggregate.members[i].location,
                ),
                None => break,
            };
            let canon = self.canonicalize(&member_ty, member_loc, visiting)?;
            if canon.pointer_depth == 0 {
                self.check_value_use(&canon, member_loc, visiting)?;
            }
            if let Some(aggregate) = self.table.aggregate_mut(key) {
                aggregate.members[i].ty = canon;
            }
        }

        visiting.pop();
        self.checked.insert(key.to_string());
        Ok(())
    }
}

/// Compose a declarator type over a typedef's canonical target.
///
/// Declarator array dimensions come before the target's (`arr10 x[3]` is
/// `int x[3][10]`). A pointer declarator folds the target's array shape
/// into the pointee; the pointer itself is what layout sees.
fn compose(outer: &Type, inner: &Type) -> Type {
    let mut out = Type::new(inner.base.clone());
    out.is_const = outer.is_const || inner.is_const;
    out.is_volatile = outer.is_volatile || inner.is_volatile;
    out.pointer_depth = outer.pointer_depth + inner.pointer_depth;
    out.array_dims = outer.array_dims.clone();
    if outer.pointer_depth == 0 {
        out.array_dims.extend(inner.array_dims.iter().copied());
    }
    out
}

fn insert_lookup(
    lookup: &mut FxHashMap<String, MemberPath>,
    name: &str,
    path: MemberPath,
    aggregate: &str,
    location: SourceLocation,
) -> Result<(), ResolutionError> {
    if lookup.insert(name.to_string(), path).is_some() {
        return Err(ResolutionError::DuplicateMember {
            name: name.to_string(),
            aggregate: aggregate.to_string(),
            location,
        });
    }
    Ok(())
}
