//! Declaration parsing implementation
//!
//! This module handles parsing of C declarations:
//!
//! - Struct/union definitions: `struct [Tag]? { ... }`, including nested and
//!   anonymous bodies
//! - Enum definitions: `enum [Tag]? { A = 1, B, ... }`
//! - Typedefs: `typedef <type> <name>;`
//! - Variable declarations with optional initializers
//! - Type parsing: qualifiers, base specifiers, pointers, arrays, bit-fields
//!
//! # Grammar
//!
//! ```text
//! declaration ::= typedef_decl | tagged_def ";" | specifier declarator_list ";"
//! specifier   ::= qualifier* base_type qualifier*
//! declarator  ::= "*"* identifier ("[" size? "]")* (":" width)?
//! ```
//!
//! All parsing methods are implemented as `pub(crate)` methods on the
//! [`Parser`] struct.

use crate::parser::ast::*;
use crate::parser::lexer::Token;
use crate::parser::parse::{ParseError, Parser};

impl Parser {
    /// Parse one top-level declaration, appending the resulting nodes.
    ///
    /// A single source declaration can yield several nodes: a tagged
    /// definition used with declarators emits the definition once followed
    /// by a variable per declarator, and `int a, b;` emits one variable per
    /// name.
    pub(crate) fn parse_declaration(
        &mut self,
        out: &mut Vec<Declaration>,
    ) -> Result<(), ParseError> {
        let loc = self.current_location();

        if self.match_token(&Token::Typedef(self.current_location())) {
            let spec = self.parse_specifier()?;
            let (name, ty) = self.parse_declarator(&spec)?;
            self.expect_semicolon("after typedef")?;
            out.push(Declaration::Typedef {
                name,
                ty,
                location: loc,
            });
            return Ok(());
        }

        let mut spec = self.parse_specifier()?;

        // Definition with no declarators: struct X { ... };
        let starts_declarator = self
            .check(&Token::Star(self.current_location()))
            || matches!(self.peek(), Token::Ident(_, _));
        if !starts_declarator {
            match spec.base {
                TypeName::AggregateDef(body) => {
                    self.expect_semicolon("after type definition")?;
                    out.push(Declaration::Aggregate {
                        body: *body,
                        location: loc,
                    });
                    return Ok(());
                }
                TypeName::EnumDef(body) => {
                    self.expect_semicolon("after type definition")?;
                    out.push(Declaration::Enum {
                        body: *body,
                        location: loc,
                    });
                    return Ok(());
                }
                // Forward declaration: `struct X;` / `enum X;` declares the
                // tag without defining it and contributes nothing here.
                TypeName::TagRef(_, _) | TypeName::EnumRef(_)
                    if self.check(&Token::Semicolon(
                        self.current_location(),
                    )) =>
                {
                    self.advance();
                    return Ok(());
                }
                // A specifier with neither a body nor a declarator
                _ => {
                    return Err(ParseError::new(
                        "a declarator",
                        self.peek(),
                    ));
                }
            }
        }

        // A tagged inline body used with declarators defines the tag once;
        // the declarators then reference it by tag so multiple declarators
        // share one definition.
        match spec.base {
            TypeName::AggregateDef(ref body) if body.tag.is_some() => {
                let kind = body.kind;
                let tag = body.tag.clone().unwrap();
                out.push(Declaration::Aggregate {
                    body: (**body).clone(),
                    location: loc,
                });
                spec.base = TypeName::TagRef(kind, tag);
            }
            TypeName::EnumDef(ref body) if body.tag.is_some() => {
                let tag = body.tag.clone().unwrap();
                out.push(Declaration::Enum {
                    body: (**body).clone(),
                    location: loc,
                });
                spec.base = TypeName::EnumRef(tag);
            }
            _ => {}
        }

        loop {
            let decl_loc = self.current_location();
            let (name, ty) = self.parse_declarator(&spec)?;
            let init = if self.match_token(&Token::Eq(self.current_location()))
            {
                Some(self.parse_init_value()?)
            } else {
                None
            };
            out.push(Declaration::Variable {
                name,
                ty,
                init,
                location: decl_loc,
            });
            if !self.match_token(&Token::Comma(self.current_location())) {
                break;
            }
        }
        self.expect_semicolon("after declaration")?;
        Ok(())
    }

    /// Parse a type specifier: qualifiers plus a base type, including inline
    /// struct/union/enum bodies. Pointer and array shape belongs to the
    /// declarator, not the specifier.
    pub(crate) fn parse_specifier(&mut self) -> Result<Type, ParseError> {
        let mut is_const = false;
        let mut is_volatile = false;

        loop {
            if self.match_token(&Token::Const(self.current_location())) {
                is_const = true;
            } else if self
                .match_token(&Token::Volatile(self.current_location()))
            {
                is_volatile = true;
            } else {
                break;
            }
        }

        let base = self.parse_base_type()?;

        // Qualifiers may also follow the base type (e.g. `int const`)
        loop {
            if self.match_token(&Token::Const(self.current_location())) {
                is_const = true;
            } else if self
                .match_token(&Token::Volatile(self.current_location()))
            {
                is_volatile = true;
            } else {
                break;
            }
        }

        let mut ty = Type::new(base);
        ty.is_const = is_const;
        ty.is_volatile = is_volatile;
        Ok(ty)
    }

    /// Parse the base type name of a specifier
    fn parse_base_type(&mut self) -> Result<TypeName, ParseError> {
        let loc = self.current_location();

        // struct / union
        let aggregate_kind =
            if self.match_token(&Token::Struct(self.current_location())) {
                Some(AggregateKind::Struct)
            } else if self.match_token(&Token::Union(self.current_location()))
            {
                Some(AggregateKind::Union)
            } else {
                None
            };

        if let Some(kind) = aggregate_kind {
            let tag = if let Token::Ident(name, _) = self.peek() {
                let name = name.clone();
                self.advance();
                Some(name)
            } else {
                None
            };

            if self.match_token(&Token::LBrace(self.current_location())) {
                let members = self.parse_member_declarations()?;
                self.expect_rbrace("after member list")?;
                return Ok(TypeName::AggregateDef(Box::new(AggregateBody {
                    kind,
                    tag,
                    members,
                    location: loc,
                })));
            }

            return match tag {
                Some(tag) => Ok(TypeName::TagRef(kind, tag)),
                None => Err(ParseError::new(
                    format!("{} tag or '{{'", kind),
                    self.peek(),
                )),
            };
        }

        // enum
        if self.match_token(&Token::Enum(self.current_location())) {
            let tag = if let Token::Ident(name, _) = self.peek() {
                let name = name.clone();
                self.advance();
                Some(name)
            } else {
                None
            };

            if self.match_token(&Token::LBrace(self.current_location())) {
                let constants = self.parse_enumerator_list()?;
                return Ok(TypeName::EnumDef(Box::new(EnumBody {
                    tag,
                    constants,
                    location: loc,
                })));
            }

            return match tag {
                Some(tag) => Ok(TypeName::EnumRef(tag)),
                None => {
                    Err(ParseError::new("enum tag or '{'", self.peek()))
                }
            };
        }

        // Primitive specifiers, with optional signedness prefix. Signedness
        // does not affect size or alignment, so it folds away here.
        let saw_sign = self
            .match_token(&Token::Signed(self.current_location()))
            || self.match_token(&Token::Unsigned(self.current_location()));

        if self.match_token(&Token::Char(self.current_location())) {
            return Ok(TypeName::Primitive(Primitive::Char));
        }
        if self.match_token(&Token::Short(self.current_location())) {
            self.match_token(&Token::Int(self.current_location()));
            return Ok(TypeName::Primitive(Primitive::Short));
        }
        if self.match_token(&Token::Int(self.current_location())) {
            return Ok(TypeName::Primitive(Primitive::Int));
        }
        if self.match_token(&Token::Long(self.current_location())) {
            let prim = if self
                .match_token(&Token::Long(self.current_location()))
            {
                Primitive::LongLong
            } else {
                Primitive::Long
            };
            self.match_token(&Token::Int(self.current_location()));
            return Ok(TypeName::Primitive(prim));
        }
        if self.match_token(&Token::Float(self.current_location())) {
            return Ok(TypeName::Primitive(Primitive::Float));
        }
        if self.match_token(&Token::Double(self.current_location())) {
            return Ok(TypeName::Primitive(Primitive::Double));
        }
        if self.match_token(&Token::Void(self.current_location())) {
            return Ok(TypeName::Primitive(Primitive::Void));
        }

        // Bare signed/unsigned means int
        if saw_sign {
            return Ok(TypeName::Primitive(Primitive::Int));
        }

        // An ordinary identifier in type position is a typedef name
        if let Token::Ident(name, _) = self.peek() {
            let name = name.clone();
            self.advance();
            return Ok(TypeName::TypedefRef(name));
        }

        Err(ParseError::new("a type specifier", self.peek()))
    }

    /// Parse the members of a struct/union body (after the opening brace)
    fn parse_member_declarations(
        &mut self,
    ) -> Result<Vec<MemberDecl>, ParseError> {
        let mut members = Vec::new();

        while !self.check(&Token::RBrace(self.current_location()))
            && !self.is_at_end()
        {
            self.parse_member(&mut members)?;
        }

        Ok(members)
    }

    /// Parse one member declaration (possibly multiple declarators)
    fn parse_member(
        &mut self,
        members: &mut Vec<MemberDecl>,
    ) -> Result<(), ParseError> {
        let loc = self.current_location();
        let spec = self.parse_specifier()?;

        // Anonymous member: an unnamed struct/union body directly followed
        // by ';'. Its fields are spliced into the enclosing aggregate by the
        // resolver.
        if self.check(&Token::Semicolon(self.current_location())) {
            if matches!(spec.base, TypeName::AggregateDef(_)) {
                self.advance();
                members.push(MemberDecl {
                    name: None,
                    ty: spec,
                    bit_width: None,
                    location: loc,
                });
                return Ok(());
            }
            return Err(ParseError::new("a member declarator", self.peek()));
        }

        // Unnamed bit-field padding: `int : 3;`
        if self.match_token(&Token::Colon(self.current_location())) {
            let width = self.parse_bit_width()?;
            self.expect_semicolon("after bit-field member")?;
            members.push(MemberDecl {
                name: None,
                ty: spec,
                bit_width: Some(width),
                location: loc,
            });
            return Ok(());
        }

        loop {
            let member_loc = self.current_location();
            let (name, ty) = self.parse_declarator(&spec)?;
            let bit_width =
                if self.match_token(&Token::Colon(self.current_location())) {
                    Some(self.parse_bit_width()?)
                } else {
                    None
                };
            members.push(MemberDecl {
                name: Some(name),
                ty,
                bit_width,
                location: member_loc,
            });
            if !self.match_token(&Token::Comma(self.current_location())) {
                break;
            }
        }
        self.expect_semicolon("after member declaration")?;
        Ok(())
    }

    /// Parse one declarator against a shared specifier: pointer stars, the
    /// name, and array dimensions.
    pub(crate) fn parse_declarator(
        &mut self,
        spec: &Type,
    ) -> Result<(String, Type), ParseError> {
        let mut ty = spec.clone();

        while self.match_token(&Token::Star(self.current_location())) {
            ty.pointer_depth += 1;
        }

        let name = self.expect_identifier()?;

        while self.match_token(&Token::LBracket(self.current_location())) {
            if self.check(&Token::RBracket(self.current_location())) {
                // Unsized array []
                ty.array_dims.push(None);
                self.advance();
            } else if let Token::IntLiteral(n, _) = self.peek() {
                // Sized array [N]; sizes must be compile-time constants
                let n = *n;
                self.advance();
                ty.array_dims.push(Some(n as usize));
                self.expect_rbracket("after array size")?;
            } else {
                return Err(ParseError::new(
                    "a constant integer array size",
                    self.peek(),
                ));
            }
        }

        Ok((name, ty))
    }

    /// Parse a bit-field width after ':'
    fn parse_bit_width(&mut self) -> Result<u32, ParseError> {
        if let Token::IntLiteral(n, _) = self.peek() {
            let n = *n;
            self.advance();
            Ok(n as u32)
        } else {
            Err(ParseError::new("a constant bit-field width", self.peek()))
        }
    }

    /// Parse the enumerators of an enum body (after the opening brace),
    /// including the closing brace.
    fn parse_enumerator_list(
        &mut self,
    ) -> Result<Vec<EnumConstantDecl>, ParseError> {
        let mut constants = Vec::new();

        while !self.check(&Token::RBrace(self.current_location()))
            && !self.is_at_end()
        {
            let loc = self.current_location();
            let name = self.expect_identifier()?;

            let value = if self
                .match_token(&Token::Eq(self.current_location()))
            {
                let negative =
                    self.match_token(&Token::Minus(self.current_location()));
                if let Token::IntLiteral(n, _) = self.peek() {
                    let n = *n;
                    self.advance();
                    Some(if negative { -n } else { n })
                } else {
                    return Err(ParseError::new(
                        "a constant enumerator value",
                        self.peek(),
                    ));
                }
            } else {
                None
            };

            constants.push(EnumConstantDecl {
                name,
                value,
                location: loc,
            });

            if !self.match_token(&Token::Comma(self.current_location())) {
                break;
            }
            // A trailing comma before '}' is allowed; the loop condition
            // handles it.
        }

        self.expect_rbrace("after enumerator list")?;
        Ok(constants)
    }
}

#[cfg(test)]
mod tests {
    use crate::parser::ast::*;
    use crate::parser::parse::Parser;

    fn parse(source: &str) -> TranslationUnit {
        let mut parser = Parser::new(source).expect("lexing failed");
        parser.parse_unit().expect("parsing failed")
    }

    #[test]
    fn test_multi_declarator_members() {
        let unit = parse("struct M { int a; float b; char c, d; };");
        match &unit.decls[0] {
            Declaration::Aggregate { body, .. } => {
                let names: Vec<_> = body
                    .members
                    .iter()
                    .map(|m| m.name.as_deref().unwrap())
                    .collect();
                assert_eq!(names, ["a", "b", "c", "d"]);
            }
            other => panic!("Expected aggregate, got {:?}", other),
        }
    }

    #[test]
    fn test_pointer_array_const_members() {
        let unit = parse(
            "struct E { int *e; const int f; int g[20]; char **pp; int u[]; };",
        );
        match &unit.decls[0] {
            Declaration::Aggregate { body, .. } => {
                assert_eq!(body.members[0].ty.pointer_depth, 1);
                assert!(body.members[1].ty.is_const);
                assert_eq!(body.members[2].ty.array_dims, vec![Some(20)]);
                assert_eq!(body.members[3].ty.pointer_depth, 2);
                assert_eq!(body.members[4].ty.array_dims, vec![None]);
            }
            other => panic!("Expected aggregate, got {:?}", other),
        }
    }

    #[test]
    fn test_nested_anonymous_body() {
        let unit = parse(
            "struct N { int outer; struct { int inner; } nested; };",
        );
        match &unit.decls[0] {
            Declaration::Aggregate { body, .. } => {
                let nested = &body.members[1];
                assert_eq!(nested.name.as_deref(), Some("nested"));
                match &nested.ty.base {
                    TypeName::AggregateDef(inner) => {
                        assert_eq!(inner.tag, None);
                        assert_eq!(inner.members.len(), 1);
                    }
                    other => panic!("Expected inline body, got {:?}", other),
                }
            }
            other => panic!("Expected aggregate, got {:?}", other),
        }
    }

    #[test]
    fn test_unnamed_spliced_member() {
        let unit = parse("struct S { struct { int x; int y; }; int z; };");
        match &unit.decls[0] {
            Declaration::Aggregate { body, .. } => {
                assert_eq!(body.members.len(), 2);
                assert_eq!(body.members[0].name, None);
                assert_eq!(body.members[1].name.as_deref(), Some("z"));
            }
            other => panic!("Expected aggregate, got {:?}", other),
        }
    }

    #[test]
    fn test_tagged_definition_with_variable() {
        let unit = parse("struct P { int p; float q; char r; } x = {10};");
        assert_eq!(unit.decls.len(), 2);
        assert!(matches!(&unit.decls[0], Declaration::Aggregate { body, .. }
            if body.tag.as_deref() == Some("P")));
        match &unit.decls[1] {
            Declaration::Variable { name, ty, init, .. } => {
                assert_eq!(name, "x");
                assert!(matches!(
                    &ty.base,
                    TypeName::TagRef(AggregateKind::Struct, tag) if tag == "P"
                ));
                assert!(matches!(init, Some(InitValue::List(_))));
            }
            other => panic!("Expected variable, got {:?}", other),
        }
    }

    #[test]
    fn test_anonymous_struct_variable() {
        let unit = parse("struct { int x; float y; } anonymous_struct;");
        assert_eq!(unit.decls.len(), 1);
        match &unit.decls[0] {
            Declaration::Variable { name, ty, .. } => {
                assert_eq!(name, "anonymous_struct");
                assert!(matches!(&ty.base, TypeName::AggregateDef(body)
                    if body.tag.is_none()));
            }
            other => panic!("Expected variable, got {:?}", other),
        }
    }

    #[test]
    fn test_typedef_chain() {
        let unit = parse("typedef int word; typedef word unit;");
        assert!(matches!(&unit.decls[0], Declaration::Typedef { name, ty, .. }
            if name == "word"
                && ty.base == TypeName::Primitive(Primitive::Int)));
        assert!(matches!(&unit.decls[1], Declaration::Typedef { name, ty, .. }
            if name == "unit"
                && matches!(&ty.base, TypeName::TypedefRef(t) if t == "word")));
    }

    #[test]
    fn test_typedef_enum_alias() {
        let unit = parse(
            "enum color { RED, GREEN }; typedef enum color color_e;",
        );
        assert!(matches!(&unit.decls[1], Declaration::Typedef { name, ty, .. }
            if name == "color_e"
                && matches!(&ty.base, TypeName::EnumRef(t) if t == "color")));
    }

    #[test]
    fn test_bit_field_members() {
        let unit = parse("struct B { int flags : 3; int : 2; int rest; };");
        match &unit.decls[0] {
            Declaration::Aggregate { body, .. } => {
                assert_eq!(body.members[0].bit_width, Some(3));
                assert_eq!(body.members[1].name, None);
                assert_eq!(body.members[1].bit_width, Some(2));
                assert_eq!(body.members[2].bit_width, None);
            }
            other => panic!("Expected aggregate, got {:?}", other),
        }
    }

    #[test]
    fn test_union_definition() {
        let unit = parse("union U { int i; float f; char bytes[4]; };");
        match &unit.decls[0] {
            Declaration::Aggregate { body, .. } => {
                assert_eq!(body.kind, AggregateKind::Union);
                assert_eq!(body.members.len(), 3);
            }
            other => panic!("Expected union, got {:?}", other),
        }
    }

    #[test]
    fn test_unsigned_specifiers() {
        let unit = parse("struct U { unsigned u; unsigned long ul; signed char sc; };");
        match &unit.decls[0] {
            Declaration::Aggregate { body, .. } => {
                assert_eq!(
                    body.members[0].ty.base,
                    TypeName::Primitive(Primitive::Int)
                );
                assert_eq!(
                    body.members[1].ty.base,
                    TypeName::Primitive(Primitive::Long)
                );
                assert_eq!(
                    body.members[2].ty.base,
                    TypeName::Primitive(Primitive::Char)
                );
            }
            other => panic!("Expected aggregate, got {:?}", other),
        }
    }

    #[test]
    fn test_forward_declaration() {
        let unit = parse(
            "struct Node; struct List { struct Node *head; };",
        );
        assert_eq!(unit.decls.len(), 1);
        assert!(matches!(&unit.decls[0], Declaration::Aggregate { body, .. }
            if body.tag.as_deref() == Some("List")));
    }

    #[test]
    fn test_member_missing_semicolon() {
        let mut parser =
            Parser::new("struct M { int a int b; };").expect("lexing failed");
        let err = parser.parse_unit().unwrap_err();
        assert!(err.expected.contains("';'"), "got: {}", err);
    }
}
