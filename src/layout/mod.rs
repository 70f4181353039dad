//! Memory layout computation
//!
//! Given a resolved aggregate and an [`profile::AbiProfile`], the
//! [`LayoutEngine`] computes total size, alignment, and every member's byte
//! offset, inserting padding per C alignment rules:
//!
//! - Struct: a running byte cursor is rounded up to each member's alignment
//!   before the member is placed; the final size is rounded up to the
//!   aggregate's alignment (the maximum member alignment, recursively for
//!   nested aggregates), so arrays of the aggregate tile correctly.
//! - Union: every member sits at offset 0; size is the largest member size
//!   rounded up to the largest member alignment.
//! - Array: element size times length; element alignment.
//!
//! The engine is pure: it only reads the type table and profile, and it
//! memoizes computed aggregate layouts per table key.

pub mod profile;

use crate::parser::ast::{AggregateKind, SourceLocation, Type, TypeName};
use crate::types::table::TypeTable;
use profile::AbiProfile;
use rustc_hash::FxHashMap;
use std::fmt;

/// Errors produced during layout computation
#[derive(Debug, Clone)]
pub enum LayoutError {
    /// An array member's length was never specified
    UnknownArrayLength {
        member: String,
        location: SourceLocation,
    },

    /// A construct the layout model does not cover (bit-fields, by-value
    /// `void`)
    Unsupported {
        what: String,
        location: SourceLocation,
    },
}

impl fmt::Display for LayoutError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LayoutError::UnknownArrayLength { member, location } => write!(
                f,
                "Layout error at {}: unknown array length for '{}'",
                location, member
            ),
            LayoutError::Unsupported { what, location } => write!(
                f,
                "Layout error at {}: unsupported construct: {}",
                location, what
            ),
        }
    }
}

impl std::error::Error for LayoutError {}

/// Layout of one member within its aggregate
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldLayout {
    pub name: Option<String>,
    pub offset: usize,
    pub size: usize,
    pub align: usize,
}

/// Layout of one aggregate: total size, alignment, and per-member fields
/// parallel to the aggregate's member list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AggregateLayout {
    pub key: String,
    pub size: usize,
    pub align: usize,
    pub fields: Vec<FieldLayout>,
}

impl AggregateLayout {
    pub fn field(&self, index: usize) -> Option<&FieldLayout> {
        self.fields.get(index)
    }
}

/// Round `value` up to the next multiple of `align` (`align` >= 1)
pub fn align_up(value: usize, align: usize) -> usize {
    (value + align - 1) / align * align
}

/// Layout engine over one resolved session
pub struct LayoutEngine<'a> {
    table: &'a TypeTable,
    profile: &'a AbiProfile,
    cache: FxHashMap<String, AggregateLayout>,
}

impl<'a> LayoutEngine<'a> {
    pub fn new(table: &'a TypeTable, profile: &'a AbiProfile) -> Self {
        Self {
            table,
            profile,
            cache: FxHashMap::default(),
        }
    }

    /// Layout of the aggregate registered under `key`, memoized.
    pub fn layout_of(
        &mut self,
        key: &str,
    ) -> Result<AggregateLayout, LayoutError> {
        if let Some(layout) = self.cache.get(key) {
            return Ok(layout.clone());
        }
        let layout = self.compute(key)?;
        self.cache.insert(key.to_string(), layout.clone());
        Ok(layout)
    }

    /// Size in bytes of a canonical type
    pub fn size_of(&mut self, ty: &Type) -> Result<usize, LayoutError> {
        self.size_and_align(ty, "value", SourceLocation::new(1, 1))
            .map(|(size, _)| size)
    }

    /// Alignment in bytes of a canonical type
    pub fn align_of(&mut self, ty: &Type) -> Result<usize, LayoutError> {
        self.size_and_align(ty, "value", SourceLocation::new(1, 1))
            .map(|(_, align)| align)
    }

    /// Size and natural alignment of a canonical type. `what` and
    /// `location` attribute errors to the declaration being laid out.
    fn size_and_align(
        &mut self,
        ty: &Type,
        what: &str,
        location: SourceLocation,
    ) -> Result<(usize, usize), LayoutError> {
        let (mut size, align) = if ty.pointer_depth > 0 {
            (self.profile.pointer.size, self.profile.pointer.align)
        } else {
            match &ty.base {
                TypeName::Primitive(prim) => {
                    let layout = self.profile.primitive(*prim);
                    if layout.size == 0 {
                        return Err(LayoutError::Unsupported {
                            what: format!("by-value void '{}'", what),
                            location,
                        });
                    }
                    (layout.size, layout.align)
                }
                TypeName::TagRef(_, key) => {
                    let layout = self.layout_of(key)?;
                    (layout.size, layout.align)
                }
                TypeName::EnumRef(_) => {
                    let layout = self.profile.enum_repr();
                    (layout.size, layout.align)
                }
                // Canonical types never carry typedef refs or inline bodies
                _ => {
                    return Err(LayoutError::Unsupported {
                        what: format!("unresolved type of '{}'", what),
                        location,
                    });
                }
            }
        };

        for dim in &ty.array_dims {
            match dim {
                Some(len) => size *= len,
                None => {
                    return Err(LayoutError::UnknownArrayLength {
                        member: what.to_string(),
                        location,
                    });
                }
            }
        }

        Ok((size, align))
    }

    fn compute(&mut self, key: &str) -> Result<AggregateLayout, LayoutError> {
        let (kind, members) = match self.table.aggregate(key) {
            Some(aggregate) => (aggregate.kind, aggregate.members.clone()),
            None => {
                return Err(LayoutError::Unsupported {
                    what: format!("incomplete type '{}'", key),
                    location: SourceLocation::new(1, 1),
                });
            }
        };

        let mut fields = Vec::with_capacity(members.len());
        let mut max_align = 1usize;
        let mut offset = 0usize;
        let mut max_size = 0usize;

        for member in &members {
            if member.bit_width.is_some() {
                return Err(LayoutError::Unsupported {
                    what: format!(
                        "bit-field member '{}'",
                        member.name.as_deref().unwrap_or("<unnamed>")
                    ),
                    location: member.location,
                });
            }

            let what = member.name.as_deref().unwrap_or("<anonymous>");
            let (size, natural_align) =
                self.size_and_align(&member.ty, what, member.location)?;
            let align = match self.profile.pack {
                Some(cap) => natural_align.min(cap),
                None => natural_align,
            };
            max_align = max_align.max(align);

            match kind {
                AggregateKind::Struct => {
                    offset = align_up(offset, align);
                    fields.push(FieldLayout {
                        name: member.name.clone(),
                        offset,
                        size,
                        align,
                    });
                    offset += size;
                }
                AggregateKind::Union => {
                    fields.push(FieldLayout {
                        name: member.name.clone(),
                        offset: 0,
                        size,
                        align,
                    });
                    max_size = max_size.max(size);
                }
            }
        }

        let size = match kind {
            AggregateKind::Struct => align_up(offset, max_align),
            AggregateKind::Union => align_up(max_size, max_align),
        };

        Ok(AggregateLayout {
            key: key.to_string(),
            size,
            align: max_align,
            fields,
        })
    }
}
