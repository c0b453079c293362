//! Library grammar: header, declarations and definitions
//!
//! Each declaration is parsed independently. A syntax error abandons the
//! declaration it occurs in, is recorded, and parsing resumes at the next
//! declaration keyword, so one run reports every broken declaration.

use crate::lexer::TokenKind;
use crate::parser::{Parsed, Parser};
use medql_ast::{
    AccessModifier, CodeDef, CodeSystemDef, ConceptDef, ContextDef, ExpressionDef, FunctionDef, IncludeDef, Library,
    LibraryIdentifier, OperandDef, ParameterDef, Spanned, Statement, UsingDef, ValueSetDef,
};
use medql_diagnostics::{MQL0001, MQL0012};

impl Parser<'_> {
    pub(crate) fn library(&mut self) -> Library {
        let mut library = Library::default();
        let mut context = None;
        while !self.at_eof() {
            let from = self.position();
            if let Err(error) = self.declaration(&mut library, &mut context) {
                self.errors.push(error);
                self.synchronize(from);
            }
        }
        library
    }

    /// `private` / `public`, when written
    fn access_modifier(&mut self) -> Option<AccessModifier> {
        if self.eat_keyword("private") {
            Some(AccessModifier::Private)
        } else if self.eat_keyword("public") {
            Some(AccessModifier::Public)
        } else {
            None
        }
    }

    fn version(&mut self) -> Parsed<Option<String>> {
        if self.eat_keyword("version") {
            Ok(Some(self.string()?))
        } else {
            Ok(None)
        }
    }

    /// After a declaration only another declaration or the end may follow
    fn end_of_declaration(&self) -> Parsed<()> {
        if self.at_eof() || self.at_declaration() {
            Ok(())
        } else {
            Err(self.unexpected(MQL0001, "a declaration or end of input"))
        }
    }

    fn declaration(&mut self, library: &mut Library, context: &mut Option<String>) -> Parsed<()> {
        let start = self.start();
        let modifier = self.access_modifier();
        let access = modifier.unwrap_or_default();
        let keyword = match self.kind() {
            TokenKind::Ident(word) => word.clone(),
            _ => return Err(self.unexpected(MQL0012, "a declaration")),
        };
        if modifier.is_some() && matches!(keyword.as_str(), "library" | "using" | "include" | "context") {
            return Err(self.error_at(
                MQL0012,
                format!("'{keyword}' declarations do not take an access modifier"),
                self.peek().span,
            ));
        }

        match keyword.as_str() {
            "library" => {
                let keyword_span = self.bump().span;
                let name = self.qualified_name()?;
                let version = self.version()?;
                if library.identifier.is_some() {
                    return Err(self.error_at(MQL0012, "duplicate library declaration", keyword_span));
                }
                library.identifier = Some(LibraryIdentifier { name, version });
            }
            "using" => {
                self.bump();
                let model = self.name()?;
                let version = self.version()?;
                library.usings.push(Spanned::new(UsingDef { model, version }, self.span_from(start)));
            }
            "include" => {
                self.bump();
                let name = self.qualified_name()?;
                let version = self.version()?;
                let alias = if self.eat_keyword("called") { Some(self.name()?) } else { None };
                library.includes.push(Spanned::new(
                    IncludeDef {
                        library: name,
                        version,
                        alias,
                    },
                    self.span_from(start),
                ));
            }
            "parameter" => {
                self.bump();
                let name = self.name()?;
                let type_specifier = if self.at_keyword("default") || self.at_eof() || self.at_declaration() {
                    None
                } else {
                    Some(self.type_specifier()?)
                };
                let default = if self.eat_keyword("default") { Some(self.expression()?) } else { None };
                library.parameters.push(Spanned::new(
                    ParameterDef {
                        access,
                        name,
                        type_specifier,
                        default,
                    },
                    self.span_from(start),
                ));
            }
            "codesystem" => {
                self.bump();
                let name = self.name()?;
                self.expect_symbol(":")?;
                let id = self.string()?;
                let version = self.version()?;
                library.codesystems.push(Spanned::new(
                    CodeSystemDef {
                        access,
                        name,
                        id,
                        version,
                    },
                    self.span_from(start),
                ));
            }
            "valueset" => {
                self.bump();
                let name = self.name()?;
                self.expect_symbol(":")?;
                let id = self.string()?;
                let version = self.version()?;
                let mut codesystems = Vec::new();
                if self.eat_keyword("codesystems") {
                    self.expect_symbol("{")?;
                    loop {
                        codesystems.push(self.qualified_name()?);
                        if !self.eat_symbol(",") {
                            break;
                        }
                    }
                    self.expect_symbol("}")?;
                }
                library.valuesets.push(Spanned::new(
                    ValueSetDef {
                        access,
                        name,
                        id,
                        version,
                        codesystems,
                    },
                    self.span_from(start),
                ));
            }
            "code" => {
                self.bump();
                let name = self.name()?;
                self.expect_symbol(":")?;
                let code = self.string()?;
                self.expect_keyword("from")?;
                let codesystem = self.qualified_name()?;
                let display = if self.eat_keyword("display") { Some(self.string()?) } else { None };
                library.codes.push(Spanned::new(
                    CodeDef {
                        access,
                        name,
                        code,
                        codesystem,
                        display,
                    },
                    self.span_from(start),
                ));
            }
            "concept" => {
                self.bump();
                let name = self.name()?;
                self.expect_symbol(":")?;
                self.expect_symbol("{")?;
                let mut codes = Vec::new();
                loop {
                    codes.push(self.qualified_name()?);
                    if !self.eat_symbol(",") {
                        break;
                    }
                }
                self.expect_symbol("}")?;
                let display = if self.eat_keyword("display") { Some(self.string()?) } else { None };
                library.concepts.push(Spanned::new(
                    ConceptDef {
                        access,
                        name,
                        codes,
                        display,
                    },
                    self.span_from(start),
                ));
            }
            "context" => {
                self.bump();
                let first = self.name()?;
                let def = if self.eat_symbol(".") {
                    ContextDef {
                        model: Some(first),
                        name: self.name()?,
                    }
                } else {
                    ContextDef {
                        model: None,
                        name: first,
                    }
                };
                *context = Some(def.name.clone());
                library.contexts.push(Spanned::new(def, self.span_from(start)));
            }
            "define" => {
                self.bump();
                // Both `private define X` and `define private X` are accepted
                let access = match self.access_modifier() {
                    Some(inner) if modifier.is_none() => inner,
                    Some(_) => return Err(self.unexpected(MQL0012, "a single access modifier")),
                    None => access,
                };
                let statement = self.definition(access, context.clone())?;
                library.statements.push(Spanned::new(statement, self.span_from(start)));
            }
            _ => return Err(self.unexpected(MQL0012, "a declaration")),
        }
        self.end_of_declaration()
    }

    /// After `define`: an expression definition or a function
    fn definition(&mut self, access: AccessModifier, context: Option<String>) -> Parsed<Statement> {
        let fluent = self.eat_keyword("fluent");
        if self.eat_keyword("function") {
            return self.function_definition(access, fluent, context).map(Statement::Function);
        }
        if fluent {
            return Err(self.unexpected(MQL0012, "'function' after 'fluent'"));
        }
        let name = self.name()?;
        self.expect_symbol(":")?;
        let expression = self.expression()?;
        Ok(Statement::Expression(ExpressionDef {
            access,
            name,
            context,
            expression,
        }))
    }

    fn function_definition(
        &mut self,
        access: AccessModifier,
        fluent: bool,
        context: Option<String>,
    ) -> Parsed<FunctionDef> {
        let name = self.name()?;
        self.expect_symbol("(")?;
        let mut operands = Vec::new();
        if !self.at_symbol(")") {
            loop {
                let name = self.name()?;
                let type_specifier = self.type_specifier()?;
                operands.push(OperandDef { name, type_specifier });
                if !self.eat_symbol(",") {
                    break;
                }
            }
        }
        self.expect_symbol(")")?;
        let return_type = if self.eat_keyword("returns") { Some(self.type_specifier()?) } else { None };
        self.expect_symbol(":")?;
        let body = if self.eat_keyword("external") { None } else { Some(self.expression()?) };
        Ok(FunctionDef {
            access,
            name,
            fluent,
            context,
            operands,
            return_type,
            body,
        })
    }
}
