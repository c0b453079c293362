//! Library declarations and definitions

use crate::{AccessModifier, Expression, Spanned, TypeSpecifier};

/// A parsed library. Declarations keep their source order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Library {
    pub identifier: Option<LibraryIdentifier>,
    pub usings: Vec<Spanned<UsingDef>>,
    pub includes: Vec<Spanned<IncludeDef>>,
    pub parameters: Vec<Spanned<ParameterDef>>,
    pub codesystems: Vec<Spanned<CodeSystemDef>>,
    pub valuesets: Vec<Spanned<ValueSetDef>>,
    pub codes: Vec<Spanned<CodeDef>>,
    pub concepts: Vec<Spanned<ConceptDef>>,
    pub contexts: Vec<Spanned<ContextDef>>,
    pub statements: Vec<Spanned<Statement>>,
}

impl Library {
    pub fn name(&self) -> Option<&str> {
        self.identifier.as_ref().map(|id| id.name.as_str())
    }

    pub fn expression_defs(&self) -> impl Iterator<Item = &ExpressionDef> {
        self.statements.iter().filter_map(|s| match &s.inner {
            Statement::Expression(def) => Some(def),
            Statement::Function(_) => None,
        })
    }

    pub fn function_defs(&self) -> impl Iterator<Item = &FunctionDef> {
        self.statements.iter().filter_map(|s| match &s.inner {
            Statement::Function(def) => Some(def),
            Statement::Expression(_) => None,
        })
    }
}

/// `library Name version '1.0'`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LibraryIdentifier {
    pub name: String,
    pub version: Option<String>,
}

impl LibraryIdentifier {
    /// `Name` or `Name|1.0`
    pub fn key(&self) -> String {
        match &self.version {
            Some(v) => format!("{}|{}", self.name, v),
            None => self.name.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UsingDef {
    pub model: String,
    pub version: Option<String>,
}

/// `include Common version '1.0' called C`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IncludeDef {
    pub library: String,
    pub version: Option<String>,
    pub alias: Option<String>,
}

impl IncludeDef {
    /// Name the included library is referenced by
    pub fn local_name(&self) -> &str {
        self.alias.as_deref().unwrap_or(&self.library)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ParameterDef {
    pub access: AccessModifier,
    pub name: String,
    pub type_specifier: Option<TypeSpecifier>,
    pub default: Option<Spanned<Expression>>,
}

/// `codesystem "LOINC": 'http://loinc.org'`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CodeSystemDef {
    pub access: AccessModifier,
    pub name: String,
    pub id: String,
    pub version: Option<String>,
}

/// `valueset "Diabetes": 'http://example.org/vs/diabetes'`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValueSetDef {
    pub access: AccessModifier,
    pub name: String,
    pub id: String,
    pub version: Option<String>,
    /// `codesystems { "A", "B" }`
    pub codesystems: Vec<String>,
}

/// `code "Systolic": '8480-6' from "LOINC" display 'Systolic BP'`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CodeDef {
    pub access: AccessModifier,
    pub name: String,
    pub code: String,
    pub codesystem: String,
    pub display: Option<String>,
}

/// `concept "BP": { "Systolic", "Diastolic" } display 'Blood pressure'`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConceptDef {
    pub access: AccessModifier,
    pub name: String,
    pub codes: Vec<String>,
    pub display: Option<String>,
}

/// `context Patient`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContextDef {
    pub model: Option<String>,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Statement {
    Expression(ExpressionDef),
    Function(FunctionDef),
}

impl Statement {
    pub fn name(&self) -> &str {
        match self {
            Self::Expression(def) => &def.name,
            Self::Function(def) => &def.name,
        }
    }
}

/// `define "Name": expression`
#[derive(Debug, Clone, PartialEq)]
pub struct ExpressionDef {
    pub access: AccessModifier,
    pub name: String,
    /// Context in force where the definition appears
    pub context: Option<String>,
    pub expression: Spanned<Expression>,
}

/// `define [fluent] function Name(a Integer, ...) returns T: body`
#[derive(Debug, Clone, PartialEq)]
pub struct FunctionDef {
    pub access: AccessModifier,
    pub name: String,
    pub fluent: bool,
    pub context: Option<String>,
    pub operands: Vec<OperandDef>,
    pub return_type: Option<TypeSpecifier>,
    /// `None` for `external` functions
    pub body: Option<Spanned<Expression>>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct OperandDef {
    pub name: String,
    pub type_specifier: TypeSpecifier,
}
