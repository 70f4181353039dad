// End-to-end tests for the declaration pipeline

use cshape::init::{validate_initializer, InitError, InitReport, InitState};
use cshape::layout::profile::AbiProfile;
use cshape::layout::{AggregateLayout, LayoutEngine};
use cshape::parser::ast::{InitValue, TypeName};
use cshape::parser::parse::Parser;
use cshape::types::resolver::{resolve_unit, ResolvedUnit, ResolutionError};

fn session(source: &str) -> ResolvedUnit {
    let mut parser = Parser::new(source).expect("lexing failed");
    let unit = parser.parse_unit().expect("parsing failed");
    resolve_unit(&unit).expect("resolution failed")
}

fn layout_of(
    resolved: &ResolvedUnit,
    profile: &AbiProfile,
    name: &str,
) -> AggregateLayout {
    let aggregate = resolved
        .table
        .aggregate_by_name(name)
        .unwrap_or_else(|| panic!("no aggregate named {}", name));
    let mut engine = LayoutEngine::new(&resolved.table, profile);
    engine.layout_of(&aggregate.key).expect("layout failed")
}

fn init_report(resolved: &ResolvedUnit, var: &str) -> Result<InitReport, InitError> {
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
fn test_declaration_corpus_end_to_end() {
    let source = r#"
        #include <stdio.h>

        struct SingleMember {
            int value;
        };

        struct MultiMember {
            int a;
            float b;
            char c, d;
        };

        struct {
            int x;
            float y;
        } anonymous_struct;

        struct NestedStruct {
            int outer;
            struct SingleMember nested;
        };

        struct NestedAnonymousStruct {
            int outer;
            struct {
                int inner;
            } nested;
        };

        typedef struct {
            int id;
            char name[20];
        } TypedefStruct;

        struct IncompleteInitialization {
            int p;
            float q;
            char r;
        } incompleteInit = {10};

        struct Outer {
            int outerValue;
            struct {
                int innerValue;
            } anonymousInner;
        };
    "#;
    let resolved = session(source);
    let profile = AbiProfile::lp64();

    let single = layout_of(&resolved, &profile, "SingleMember");
    assert_eq!((single.size, single.align), (4, 4));

    let multi = layout_of(&resolved, &profile, "MultiMember");
    assert_eq!((multi.size, multi.align), (12, 4));
    let offsets: Vec<usize> = multi.fields.iter().map(|f| f.offset).collect();
    assert_eq!(offsets, [0, 4, 8, 9]);

    let nested = layout_of(&resolved, &profile, "NestedStruct");
    assert_eq!(nested.fields[1].offset, 4);
    assert_eq!(nested.size, 8);

    let nested_anon = layout_of(&resolved, &profile, "NestedAnonymousStruct");
    assert_eq!(nested_anon.fields[1].offset, 4);
    assert_eq!(nested_anon.size, 8);

    let typedefed = layout_of(&resolved, &profile, "TypedefStruct");
    assert_eq!(typedefed.fields[1].offset, 4);
    assert_eq!(typedefed.fields[1].size, 20);
    assert_eq!(typedefed.size, 24);

    // Partial positional initializer: first member explicit, rest zero
    let report = init_report(&resolved, "incompleteInit").unwrap();
    assert_eq!(report.state_of("p"), Some(InitState::Explicit));
    assert_eq!(report.state_of("q"), Some(InitState::ZeroFilled));
    assert_eq!(report.state_of("r"), Some(InitState::ZeroFilled));

    // The anonymous top-level struct is reachable through its variable
    let var = resolved.variable("anonymous_struct").unwrap();
    assert!(matches!(&var.ty.base, TypeName::TagRef(_, key)
        if key.starts_with("__anon_struct_")));
}

#[test]
fn test_designated_initializer_corpus() {
    let source = r#"
        struct StructWithInit {
            int a;
            float b;
            char c;
        } struct_with_init = {
            .a = 1,
        };

        enum enum_example {
            ENUM_1 = 0,
            ENUM_2,
        };
        typedef enum enum_example enum_example_e;

        struct StructEnum {
            enum enum_example e1;
            enum_example_e e2;
        };
    "#;
    let resolved = session(source);

    let report = init_report(&resolved, "struct_with_init").unwrap();
    assert_eq!(report.state_of("a"), Some(InitState::Explicit));
    assert_eq!(report.state_of("b"), Some(InitState::ZeroFilled));
    assert_eq!(report.state_of("c"), Some(InitState::ZeroFilled));

    // Enum values: explicit 0, then auto-incremented
    let def = resolved.table.enum_def("enum.enum_example").unwrap();
    assert_eq!(def.constants[0].name, "ENUM_1");
    assert_eq!(def.constants[0].value, 0);
    assert_eq!(def.constants[1].name, "ENUM_2");
    assert_eq!(def.constants[1].value, 1);

    // Tag and typedef alias name the same enum; both lay out as int
    let profile = AbiProfile::lp64();
    let layout = layout_of(&resolved, &profile, "StructEnum");
    assert_eq!(layout.fields[0].size, 4);
    assert_eq!(layout.fields[1].size, 4);
    assert_eq!((layout.size, layout.align), (8, 4));
}

#[test]
fn test_kitchen_sink_struct() {
    let source = r#"
        enum enum_example { ENUM_1 = 0, ENUM_2, };
        typedef enum enum_example enum_example_e;

        struct StructEnum {
            enum enum_example e1;
            enum_example_e e2;
        };

        struct EveryingStruct {
            int a;
            int b, c, d;
            int *e;
            const int f;
            int g[20];
            enum enum_example e1;
            enum_example_e e2;
            struct StructEnum n1;
            struct {
                int na;
                struct {
                    int nna;
                } nn1;
            } n2;
        } everying_struct = {

        };
    "#;
    let resolved = session(source);
    let profile = AbiProfile::lp64();
    let layout = layout_of(&resolved, &profile, "EveryingStruct");

    let offset_of = |name: &str| {
        let agg = resolved.table.aggregate_by_name("EveryingStruct").unwrap();
        let idx = agg.lookup.get(name).unwrap()[0];
        layout.fields[idx].offset
    };

    assert_eq!(offset_of("a"), 0);
    assert_eq!(offset_of("d"), 12);
    assert_eq!(offset_of("e"), 16); // pointer aligns to 8
    assert_eq!(offset_of("f"), 24);
    assert_eq!(offset_of("g"), 28);
    assert_eq!(offset_of("e1"), 108);
    assert_eq!(offset_of("n1"), 116);
    assert_eq!(offset_of("n2"), 124);
    assert_eq!(layout.align, 8);
    assert_eq!(layout.size, 136);

    // Empty initializer: everything is zero-filled
    let report = init_report(&resolved, "everying_struct").unwrap();
    assert_eq!(report.explicit, 0);
    assert_eq!(report.partial, 0);
    assert_eq!(report.zero_filled, report.entries.len());
}

#[test]
fn test_misspelled_designator_is_an_error() {
    let source = r#"
        struct NestedStructWithInit {
            int a;
            float b;
            char c;
            struct {
                int inner;
            } d;
        } nested_struct_with_init = {
            .a = 1,
            .d.innner = 1
        };
    "#;
    let resolved = session(source);
    let err = init_report(&resolved, "nested_struct_with_init").unwrap_err();
    assert!(
        matches!(err, InitError::UnknownDesignator { ref path, .. }
            if path == "d.innner"),
        "got: {}",
        err
    );
}

#[test]
fn test_correct_nested_designator() {
    let source = r#"
        struct NestedStructWithInit {
            int a;
            float b;
            char c;
            struct {
                int inner;
            } d;
        } nested_struct_with_init = {
            .a = 1,
            .d.inner = 1
        };
    "#;
    let resolved = session(source);
    let report = init_report(&resolved, "nested_struct_with_init").unwrap();
    assert_eq!(report.state_of("a"), Some(InitState::Explicit));
    assert_eq!(report.state_of("b"), Some(InitState::ZeroFilled));
    // d has a single member and it was set, so d is fully covered
    assert_eq!(report.state_of("d"), Some(InitState::Explicit));
}

#[test]
fn test_typedef_cycle_is_an_error() {
    let source = "typedef struct { B b; } A; typedef A B;";
    let mut parser = Parser::new(source).expect("lexing failed");
    let unit = parser.parse_unit().expect("parsing failed");
    let err = resolve_unit(&unit).expect_err("cycle not detected");
    assert!(
        matches!(err, ResolutionError::CyclicTypedef { .. }),
        "got: {}",
        err
    );
}

#[test]
fn test_typedef_chain_matches_direct_layout() {
    let source = r#"
        typedef int C;
        typedef C B;
        typedef B A;
        struct ViaChain { A value; };
        struct Direct { int value; };
    "#;
    let resolved = session(source);
    let profile = AbiProfile::lp64();
    let chained = layout_of(&resolved, &profile, "ViaChain");
    let direct = layout_of(&resolved, &profile, "Direct");
    assert_eq!(chained.size, direct.size);
    assert_eq!(chained.align, direct.align);
    assert_eq!(chained.fields[0], direct.fields[0]);
}

#[test]
fn test_anonymous_splice_offsets_are_consistent() {
    let source = "struct S { char c; struct { int x; char y; }; };";
    let resolved = session(source);
    let profile = AbiProfile::lp64();

    let s = resolved.table.aggregate_by_name("S").unwrap();
    let mut engine = LayoutEngine::new(&resolved.table, &profile);
    let outer_layout = engine.layout_of(&s.key).expect("layout failed");

    // Flattened view: x and y resolve through the anonymous member
    let x_path = s.lookup.get("x").expect("x not spliced").clone();
    let y_path = s.lookup.get("y").expect("y not spliced").clone();
    assert_eq!(x_path, [1, 0]);
    assert_eq!(y_path, [1, 1]);

    // Nested view: absolute offset = splice offset + inner offset
    let inner_key = match &s.members[1].ty.base {
        TypeName::TagRef(_, key) => key.clone(),
        other => panic!("anonymous member not hoisted: {:?}", other),
    };
    let inner_layout = engine.layout_of(&inner_key).expect("layout failed");
    let splice_offset = outer_layout.fields[1].offset;
    assert_eq!(splice_offset + inner_layout.fields[0].offset, 4);
    assert_eq!(splice_offset + inner_layout.fields[1].offset, 8);
}

#[test]
fn test_lex_and_parse_errors_carry_positions() {
    // Unterminated char literal
    let err = Parser::new("char c = 'x").unwrap_err();
    assert!(err.location.line >= 1);

    // Grammar violation
    let mut parser = Parser::new("struct S { int }; ").unwrap();
    let err = parser.parse_unit().unwrap_err();
    assert_eq!(err.location.line, 1);
    assert!(!err.expected.is_empty());
}
