//! Session-scoped type table
//!
//! The table owns every resolved type for one parse session: struct/union
//! definitions keyed by tag, enum definitions, canonical typedef targets,
//! and the ordinary-namespace enum constant values. All other components
//! hold read-only references into it; it is discarded at session end.
//!
//! # Key scheme
//!
//! Aggregates are keyed `struct.<tag>` / `union.<tag>`, enums `enum.<tag>`,
//! so struct/union/enum tags never collide with each other or with typedef
//! names. Anonymous bodies are hoisted under minted `__anon_struct_N` /
//! `__anon_union_N` / `__anon_enum_N` keys so member types can reference
//! them like any named type.

use crate::parser::ast::{AggregateKind, SourceLocation, Type, TypeName};
use rustc_hash::FxHashMap;

/// Index path from an aggregate to a member, crossing anonymous-member
/// boundaries. A direct member has a single-element path.
pub type MemberPath = Vec<usize>;

/// A resolved member of an aggregate. `ty` is canonical: no typedef
/// references and no inline bodies.
#[derive(Debug, Clone)]
pub struct Member {
    pub name: Option<String>,
    pub ty: Type,
    pub bit_width: Option<u32>,
    pub location: SourceLocation,
}

/// A resolved struct or union definition.
///
/// `members` preserves declaration order and the nested boundaries needed
/// for layout; `lookup` is the flattened member namespace, containing every
/// named direct member plus the fields promoted from anonymous members.
#[derive(Debug, Clone)]
pub struct Aggregate {
    pub kind: AggregateKind,
    pub tag: Option<String>,
    pub key: String,
    pub members: Vec<Member>,
    pub lookup: FxHashMap<String, MemberPath>,
    pub location: SourceLocation,
}

impl Aggregate {
    /// Human-readable name for error messages: `struct Foo` or
    /// `anonymous struct`.
    pub fn display_name(&self) -> String {
        match &self.tag {
            Some(tag) => format!("{} {}", self.kind, tag),
            None => format!("anonymous {}", self.kind),
        }
    }
}

/// A resolved enum definition with all constant values assigned.
#[derive(Debug, Clone)]
pub struct EnumDef {
    pub tag: Option<String>,
    pub key: String,
    pub constants: Vec<EnumConstant>,
    pub location: SourceLocation,
}

/// One enumerator with its final value
#[derive(Debug, Clone)]
pub struct EnumConstant {
    pub name: String,
    pub value: i64,
    pub location: SourceLocation,
}

/// The session type table
#[derive(Debug, Default)]
pub struct TypeTable {
    aggregates: FxHashMap<String, Aggregate>,
    enums: FxHashMap<String, EnumDef>,
    typedefs: FxHashMap<String, Type>,
    enum_constants: FxHashMap<String, i64>,
    /// Aggregate keys in registration order, for deterministic reporting
    aggregate_order: Vec<String>,
    anon_counter: usize,
}

impl TypeTable {
    pub fn new() -> Self {
        TypeTable::default()
    }

    /// Table key for a tagged aggregate
    pub fn tag_key(kind: AggregateKind, tag: &str) -> String {
        format!("{}.{}", kind, tag)
    }

    /// Table key for a tagged enum
    pub fn enum_key(tag: &str) -> String {
        format!("enum.{}", tag)
    }

    /// Mint a fresh key for an anonymous body
    pub fn mint_anon_key(&mut self, kind: &str) -> String {
        let key = format!("__anon_{}_{}", kind, self.anon_counter);
        self.anon_counter += 1;
        key
    }

    pub fn aggregate(&self, key: &str) -> Option<&Aggregate> {
        self.aggregates.get(key)
    }

    pub fn aggregate_mut(&mut self, key: &str) -> Option<&mut Aggregate> {
        self.aggregates.get_mut(key)
    }

    pub fn contains_aggregate(&self, key: &str) -> bool {
        self.aggregates.contains_key(key)
    }

    pub fn insert_aggregate(&mut self, aggregate: Aggregate) {
        self.aggregate_order.push(aggregate.key.clone());
        self.aggregates.insert(aggregate.key.clone(), aggregate);
    }

    /// Registered aggregates in declaration order
    pub fn aggregates_in_order(&self) -> impl Iterator<Item = &Aggregate> {
        self.aggregate_order
            .iter()
            .filter_map(|key| self.aggregates.get(key))
    }

    pub fn enum_def(&self, key: &str) -> Option<&EnumDef> {
        self.enums.get(key)
    }

    pub fn contains_enum(&self, key: &str) -> bool {
        self.enums.contains_key(key)
    }

    pub fn insert_enum(&mut self, def: EnumDef) {
        self.enums.insert(def.key.clone(), def);
    }

    pub fn typedef(&self, name: &str) -> Option<&Type> {
        self.typedefs.get(name)
    }

    pub fn insert_typedef(&mut self, name: String, ty: Type) {
        self.typedefs.insert(name, ty);
    }

    pub fn enum_constant(&self, name: &str) -> Option<i64> {
        self.enum_constants.get(name).copied()
    }

    pub fn contains_enum_constant(&self, name: &str) -> bool {
        self.enum_constants.contains_key(name)
    }

    pub fn insert_enum_constant(&mut self, name: String, value: i64) {
        self.enum_constants.insert(name, value);
    }

    /// Look up an aggregate by its source-level name: a struct tag, a union
    /// tag, or a typedef name whose canonical type is an aggregate.
    pub fn aggregate_by_name(&self, name: &str) -> Option<&Aggregate> {
        for kind in [AggregateKind::Struct, AggregateKind::Union] {
            if let Some(agg) = self.aggregates.get(&Self::tag_key(kind, name))
            {
                return Some(agg);
            }
        }
        if let Some(ty) = self.typedefs.get(name) {
            if ty.pointer_depth == 0 && ty.array_dims.is_empty() {
                if let TypeName::TagRef(_, key) = &ty.base {
                    return self.aggregates.get(key.as_str());
                }
            }
        }
        None
    }

    /// Human-readable form of a table key: `struct.Foo` → `struct Foo`,
    /// anonymous keys unchanged.
    pub fn display_key(key: &str) -> String {
        match key.split_once('.') {
            Some((kind, tag)) => format!("{} {}", kind, tag),
            None => key.to_string(),
        }
    }
}
