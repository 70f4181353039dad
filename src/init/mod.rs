//! Initializer validation
//!
//! Matches a parsed initializer against an aggregate's resolved member list
//! and layout, reporting which members are explicitly set and which are
//! implicitly zero-filled. Partial and empty initializers are success cases;
//! the errors here are designators that do not resolve and positional
//! overflow.
//!
//! # Walk rules
//!
//! - Positional values fill members in declaration order.
//! - A designator moves the cursor: following positional values continue
//!   after the member the designator named (C semantics).
//! - Designator paths resolve segment by segment against each aggregate's
//!   flattened namespace, so fields spliced from anonymous members resolve
//!   at the enclosing level, and named nested members are entered
//!   explicitly (`.d.inner`).
//! - Nested brace lists recurse with the same rules.

use crate::layout::AggregateLayout;
use crate::parser::ast::{
    InitItem, Initializer, InitValue, SourceLocation, TypeName,
};
use crate::types::table::{Aggregate, Member, TypeTable};
use std::fmt;

/// Errors produced during initializer validation
#[derive(Debug, Clone)]
pub enum InitError {
    /// A designator segment does not name a member
    UnknownDesignator {
        path: String,
        location: SourceLocation,
    },

    /// More positional values than members
    TooManyPositionalValues {
        expected: usize,
        found: usize,
        location: SourceLocation,
    },

    /// A designator path descends through a scalar, pointer, or array member
    NotAnAggregate {
        path: String,
        location: SourceLocation,
    },
}

impl fmt::Display for InitError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InitError::UnknownDesignator { path, location } => write!(
                f,
                "Initializer error at {}: unknown designator '.{}'",
                location, path
            ),
            InitError::TooManyPositionalValues {
                expected,
                found,
                location,
            } => write!(
                f,
                "Initializer error at {}: {} positional values for {} members",
                location, found, expected
            ),
            InitError::NotAnAggregate { path, location } => write!(
                f,
                "Initializer error at {}: designator '.{}' descends through \
                 a non-aggregate member",
                location, path
            ),
        }
    }
}

impl std::error::Error for InitError {}

/// Coverage state of one member after applying an initializer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InitState {
    /// Every byte of the member was explicitly set
    Explicit,
    /// Some nested leaves were set, the rest are zero-filled
    Partial,
    /// The member was not mentioned; it is implicitly zero-valued
    ZeroFilled,
}

/// Coverage of one top-level member, with its byte offset from the layout
#[derive(Debug, Clone)]
pub struct MemberInit {
    pub name: Option<String>,
    pub offset: usize,
    pub state: InitState,
}

/// Coverage report for one aggregate initializer
#[derive(Debug, Clone)]
pub struct InitReport {
    pub entries: Vec<MemberInit>,
    pub explicit: usize,
    pub partial: usize,
    pub zero_filled: usize,
}

impl InitReport {
    pub fn state_of(&self, name: &str) -> Option<InitState> {
        self.entries
            .iter()
            .find(|e| e.name.as_deref() == Some(name))
            .map(|e| e.state)
    }
}

/// Validate `init` against `aggregate` and produce the coverage report.
pub fn validate_initializer(
    table: &TypeTable,
    aggregate: &Aggregate,
    layout: &AggregateLayout,
    init: &Initializer,
) -> Result<InitReport, InitError> {
    let coverage = coverage_of_list(table, aggregate, init)?;

    let mut entries = Vec::with_capacity(coverage.len());
    let mut explicit = 0;
    let mut partial = 0;
    let mut zero_filled = 0;
    for (i, cov) in coverage.iter().enumerate() {
        let state = cov.state();
        match state {
            InitState::Explicit => explicit += 1,
            InitState::Partial => partial += 1,
            InitState::ZeroFilled => zero_filled += 1,
        }
        entries.push(MemberInit {
            name: aggregate.members[i].name.clone(),
            offset: layout.field(i).map(|f| f.offset).unwrap_or(0),
            state,
        });
    }

    Ok(InitReport {
        entries,
        explicit,
        partial,
        zero_filled,
    })
}

/// Per-member coverage, tracking nested structure where designators or
/// nested lists reached inside a member.
#[derive(Debug, Clone)]
enum Cov {
    Untouched,
    Full,
    Nested(Vec<Cov>),
}

impl Cov {
    fn state(&self) -> InitState {
        match self {
            Cov::Untouched => InitState::ZeroFilled,
            Cov::Full => InitState::Explicit,
            Cov::Nested(inner) => {
                let states: Vec<InitState> =
                    inner.iter().map(Cov::state).collect();
                if states.iter().all(|s| *s == InitState::Explicit) {
                    InitState::Explicit
                } else if states.iter().all(|s| *s == InitState::ZeroFilled) {
                    InitState::ZeroFilled
                } else {
                    InitState::Partial
                }
            }
        }
    }
}

/// Is this member a by-value aggregate a nested list or designator can
/// descend into?
fn nested_aggregate_key(member: &Member) -> Option<&str> {
    if member.ty.pointer_depth > 0 || !member.ty.array_dims.is_empty() {
        return None;
    }
    match &member.ty.base {
        TypeName::TagRef(_, key) => Some(key),
        _ => None,
    }
}

/// Walk one brace list and compute coverage for the aggregate's members.
fn coverage_of_list(
    table: &TypeTable,
    aggregate: &Aggregate,
    init: &Initializer,
) -> Result<Vec<Cov>, InitError> {
    let member_count = aggregate.members.len();
    let mut coverage = vec![Cov::Untouched; member_count];
    let mut cursor = 0usize;

    for item in &init.items {
        match item {
            InitItem::Positional(value) => {
                if cursor >= member_count {
                    return Err(InitError::TooManyPositionalValues {
                        expected: member_count,
                        found: cursor + 1,
                        location: value.location(),
                    });
                }
                let cov = value_coverage(
                    table,
                    &aggregate.members[cursor],
                    value,
                )?;
                set_cov(&mut coverage[cursor], cov);
                cursor += 1;
            }
            InitItem::Designated {
                path,
                value,
                location,
            } => {
                let (index_path, target) = resolve_designator(
                    table, aggregate, path, *location,
                )?;
                let cov = value_coverage(table, target, value)?;
                mark(table, aggregate, &mut coverage, &index_path, cov);
                // Positional values after a designator continue from the
                // member following the one it named.
                cursor = index_path[0] + 1;
            }
        }
    }

    Ok(coverage)
}

/// Coverage contributed by one value aimed at `member`: a nested list on a
/// by-value aggregate member recurses, anything else covers the member
/// wholly.
fn value_coverage(
    table: &TypeTable,
    member: &Member,
    value: &InitValue,
) -> Result<Cov, InitError> {
    if let InitValue::List(list) = value {
        if let Some(key) = nested_aggregate_key(member) {
            if let Some(inner) = table.aggregate(key) {
                return Ok(Cov::Nested(coverage_of_list(
                    table, inner, list,
                )?));
            }
        }
    }
    Ok(Cov::Full)
}

/// Resolve a dot-path against the aggregate, returning the member index
/// path (crossing anonymous boundaries) and the final member.
fn resolve_designator<'t>(
    table: &'t TypeTable,
    aggregate: &'t Aggregate,
    path: &[String],
    location: SourceLocation,
) -> Result<(Vec<usize>, &'t Member), InitError> {
    let mut current = aggregate;
    let mut index_path: Vec<usize> = Vec::new();

    for (depth, segment) in path.iter().enumerate() {
        let member_path = current.lookup.get(segment).ok_or_else(|| {
            InitError::UnknownDesignator {
                path: path[..=depth].join("."),
                location,
            }
        })?;
        index_path.extend(member_path.iter().copied());

        let member =
            member_at(table, current, member_path).ok_or_else(|| {
                InitError::UnknownDesignator {
                    path: path[..=depth].join("."),
                    location,
                }
            })?;

        if depth + 1 == path.len() {
            return Ok((index_path, member));
        }

        // More segments follow: the resolved member must itself be a
        // by-value aggregate.
        let key = nested_aggregate_key(member).ok_or_else(|| {
            InitError::NotAnAggregate {
                path: path[..=depth].join("."),
                location,
            }
        })?;
        current = table.aggregate(key).ok_or_else(|| {
            InitError::NotAnAggregate {
                path: path[..=depth].join("."),
                location,
            }
        })?;
    }

    Err(InitError::UnknownDesignator {
        path: path.join("."),
        location,
    })
}

/// Follow an index path from an aggregate to the member it names.
fn member_at<'t>(
    table: &'t TypeTable,
    aggregate: &'t Aggregate,
    path: &[usize],
) -> Option<&'t Member> {
    let mut current = aggregate;
    for (depth, &index) in path.iter().enumerate() {
        let member = current.members.get(index)?;
        if depth + 1 == path.len() {
            return Some(member);
        }
        let key = nested_aggregate_key(member)?;
        current = table.aggregate(key)?;
    }
    None
}

/// Place `value_cov` at `index_path`, materializing nested coverage along
/// the way. A member already fully covered stays fully covered.
fn mark(
    table: &TypeTable,
    aggregate: &Aggregate,
    coverage: &mut [Cov],
    index_path: &[usize],
    value_cov: Cov,
) {
    let i = index_path[0];
    if index_path.len() == 1 {
        set_cov(&mut coverage[i], value_cov);
        return;
    }

    if matches!(coverage[i], Cov::Full) {
        return;
    }

    let (inner_aggregate, inner_count) = match aggregate
        .members
        .get(i)
        .and_then(nested_aggregate_key)
        .and_then(|key| table.aggregate(key))
    {
        Some(inner) => (inner, inner.members.len()),
        // Resolution already guaranteed the path crosses aggregates only
        None => return,
    };

    if !matches!(coverage[i], Cov::Nested(_)) {
        coverage[i] = Cov::Nested(vec![Cov::Untouched; inner_count]);
    }
    if let Cov::Nested(inner_cov) = &mut coverage[i] {
        mark(
            table,
            inner_aggregate,
            inner_cov,
            &index_path[1..],
            value_cov,
        );
    }
}

/// Overwrite coverage at a slot; a fully covered member stays covered.
fn set_cov(slot: &mut Cov, value: Cov) {
    if !matches!(slot, Cov::Full) {
        *slot = value;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layout::profile::AbiProfile;
    use crate::layout::LayoutEngine;
    use crate::parser::parse::Parser;
    use crate::types::resolver::{resolve_unit, ResolvedUnit};

    fn resolve(source: &str) -> ResolvedUnit {
        let mut parser = Parser::new(source).expect("lexing failed");
        let unit = parser.parse_unit().expect("parsing failed");
        resolve_unit(&unit).expect("resolution failed")
    }

    /// Validate the initializer of variable `var` against its aggregate.
    fn report(resolved: &ResolvedUnit, var: &str) -> Result<InitReport, InitError> {
        let variable = resolved.variable(var).expect("no such variable");
        let key = match &variable.ty.base {
            TypeName::TagRef(_, key) => key.clone(),
            other => panic!("variable is not an aggregate: {:?}", other),
        };
        let aggregate = resolved.table.aggregate(&key).unwrap();
        let profile = AbiProfile::lp64();
        let mut engine = LayoutEngine::new(&resolved.table, &profile);
        let layout = engine.layout_of(&key).expect("layout failed");
        let init = match &variable.init {
            Some(InitValue::List(list)) => list.clone(),
            other => panic!("expected list initializer, got {:?}", other),
        };
        validate_initializer(&resolved.table, aggregate, &layout, &init)
    }

    #[test]
    fn test_single_leading_value() {
        let resolved = resolve(
            "struct P { int p; float q; char r; } x = {10};",
        );
        let report = report(&resolved, "x").unwrap();
        assert_eq!(report.state_of("p"), Some(InitState::Explicit));
        assert_eq!(report.state_of("q"), Some(InitState::ZeroFilled));
        assert_eq!(report.state_of("r"), Some(InitState::ZeroFilled));
        assert_eq!(report.explicit, 1);
        assert_eq!(report.zero_filled, 2);
    }

    #[test]
    fn test_empty_initializer_zero_fills_everything() {
        let resolved = resolve(
            "struct E { int a; float b; struct { int inner; } d; } e = {};",
        );
        let report = report(&resolved, "e").unwrap();
        assert_eq!(report.explicit, 0);
        assert_eq!(report.zero_filled, 3);
    }

    #[test]
    fn test_designated_subset() {
        let resolved = resolve(
            "struct S { int a; float b; char c; } s = { .a = 1, };",
        );
        let report = report(&resolved, "s").unwrap();
        assert_eq!(report.state_of("a"), Some(InitState::Explicit));
        assert_eq!(report.state_of("b"), Some(InitState::ZeroFilled));
        assert_eq!(report.state_of("c"), Some(InitState::ZeroFilled));
    }

    #[test]
    fn test_nested_designator_marks_partial() {
        let resolved = resolve(
            "struct S { int a; struct { int inner; int extra; } d; } s = \
             { .a = 1, .d.inner = 2 };",
        );
        let report = report(&resolved, "s").unwrap();
        assert_eq!(report.state_of("a"), Some(InitState::Explicit));
        assert_eq!(report.state_of("d"), Some(InitState::Partial));
    }

    #[test]
    fn test_nested_designator_full_coverage() {
        let resolved = resolve(
            "struct S { struct { int inner; } d; } s = { .d.inner = 1 };",
        );
        let report = report(&resolved, "s").unwrap();
        assert_eq!(report.state_of("d"), Some(InitState::Explicit));
    }

    #[test]
    fn test_misspelled_nested_designator() {
        let resolved = resolve(
            "struct S { int a; struct { int inner; } d; } s = \
             { .a = 1, .d.innner = 1 };",
        );
        let err = report(&resolved, "s").unwrap_err();
        assert!(
            matches!(err, InitError::UnknownDesignator { ref path, .. }
                if path == "d.innner"),
            "got: {}",
            err
        );
    }

    #[test]
    fn test_designator_through_scalar() {
        let resolved = resolve(
            "struct S { int a; } s = { .a.b = 1 };",
        );
        let err = report(&resolved, "s").unwrap_err();
        assert!(
            matches!(err, InitError::NotAnAggregate { ref path, .. }
                if path == "a"),
            "got: {}",
            err
        );
    }

    #[test]
    fn test_too_many_positional_values() {
        let resolved = resolve(
            "struct S { int a; int b; } s = { 1, 2, 3 };",
        );
        let err = report(&resolved, "s").unwrap_err();
        assert!(
            matches!(
                err,
                InitError::TooManyPositionalValues {
                    expected: 2,
                    found: 3,
                    ..
                }
            ),
            "got: {}",
            err
        );
    }

    #[test]
    fn test_designator_into_spliced_anonymous_member() {
        let resolved = resolve(
            "struct S { int a; struct { int x; int y; }; } s = \
             { .x = 5 };",
        );
        let report = report(&resolved, "s").unwrap();
        // The anonymous member holds x and y; only x was set
        assert_eq!(report.entries[1].state, InitState::Partial);
        assert_eq!(report.state_of("a"), Some(InitState::ZeroFilled));
    }

    #[test]
    fn test_positional_resumes_after_designator() {
        let resolved = resolve(
            "struct S { int a; int b; int c; } s = { .a = 1, 2 };",
        );
        let report = report(&resolved, "s").unwrap();
        assert_eq!(report.state_of("a"), Some(InitState::Explicit));
        assert_eq!(report.state_of("b"), Some(InitState::Explicit));
        assert_eq!(report.state_of("c"), Some(InitState::ZeroFilled));
    }

    #[test]
    fn test_nested_list_recursion() {
        let resolved = resolve(
            "struct S { int a; struct { int x; int y; } n; } s = \
             { 1, { 2 } };",
        );
        let report = report(&resolved, "s").unwrap();
        assert_eq!(report.state_of("a"), Some(InitState::Explicit));
        assert_eq!(report.state_of("n"), Some(InitState::Partial));
    }

    #[test]
    fn test_report_offsets_come_from_layout() {
        let resolved = resolve(
            "struct S { int a; float b; char c; } s = { 1 };",
        );
        let report = report(&resolved, "s").unwrap();
        let offsets: Vec<usize> =
            report.entries.iter().map(|e| e.offset).collect();
        assert_eq!(offsets, [0, 4, 8]);
    }
}
