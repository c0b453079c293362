//! Interchange document structure
//!
//! The library envelope and its declarations are plain serde structures.
//! Expression bodies stay as raw JSON here; [`crate::loader`] validates and
//! converts them node by node so errors can name the offending path.

use medql_ast::{AccessModifier, NamedTypeSpecifier, TupleElementType, TypeSpecifier};
use serde::{Deserialize, Serialize};
use serde_json::Value;

// ============================================================================
// Library Structure
// ============================================================================

/// Root of a serialized library: `{ "library": { ... } }`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LibraryDocument {
    pub library: LibraryNode,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LibraryNode {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub identifier: Option<VersionedIdentifier>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub usings: Vec<UsingNode>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub includes: Vec<IncludeNode>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub parameters: Vec<ParameterNode>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub code_systems: Vec<CodeSystemNode>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub value_sets: Vec<ValueSetNode>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub codes: Vec<CodeNode>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub concepts: Vec<ConceptNode>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub contexts: Vec<ContextNode>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub statements: Vec<StatementNode>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VersionedIdentifier {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum AccessLevel {
    #[default]
    Public,
    Private,
}

impl AccessLevel {
    fn is_public(&self) -> bool {
        *self == Self::Public
    }
}

impl From<AccessModifier> for AccessLevel {
    fn from(access: AccessModifier) -> Self {
        match access {
            AccessModifier::Public => Self::Public,
            AccessModifier::Private => Self::Private,
        }
    }
}

impl From<AccessLevel> for AccessModifier {
    fn from(level: AccessLevel) -> Self {
        match level {
            AccessLevel::Public => Self::Public,
            AccessLevel::Private => Self::Private,
        }
    }
}

// ============================================================================
// Declarations
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UsingNode {
    pub local_identifier: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IncludeNode {
    /// Name of the included library
    pub path: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub local_identifier: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ParameterNode {
    pub name: String,
    #[serde(default, skip_serializing_if = "AccessLevel::is_public")]
    pub access_level: AccessLevel,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parameter_type_specifier: Option<TypeSpecifierNode>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CodeSystemNode {
    pub name: String,
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    #[serde(default, skip_serializing_if = "AccessLevel::is_public")]
    pub access_level: AccessLevel,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValueSetNode {
    pub name: String,
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub code_system: Vec<String>,
    #[serde(default, skip_serializing_if = "AccessLevel::is_public")]
    pub access_level: AccessLevel,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CodeNode {
    pub name: String,
    pub id: String,
    pub code_system: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display: Option<String>,
    #[serde(default, skip_serializing_if = "AccessLevel::is_public")]
    pub access_level: AccessLevel,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConceptNode {
    pub name: String,
    pub code: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display: Option<String>,
    #[serde(default, skip_serializing_if = "AccessLevel::is_public")]
    pub access_level: AccessLevel,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContextNode {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
}

// ============================================================================
// Statements
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum StatementNode {
    ExpressionDef(ExpressionDefNode),
    FunctionDef(FunctionDefNode),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExpressionDefNode {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context: Option<String>,
    #[serde(default, skip_serializing_if = "AccessLevel::is_public")]
    pub access_level: AccessLevel,
    pub expression: Value,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FunctionDefNode {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context: Option<String>,
    #[serde(default, skip_serializing_if = "AccessLevel::is_public")]
    pub access_level: AccessLevel,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub fluent: bool,
    #[serde(default)]
    pub operand: Vec<OperandNode>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result_type_specifier: Option<TypeSpecifierNode>,
    /// Absent for external functions
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expression: Option<Value>,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub external: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OperandNode {
    pub name: String,
    pub operand_type_specifier: TypeSpecifierNode,
}

// ============================================================================
// Type Specifiers
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum TypeSpecifierNode {
    NamedTypeSpecifier {
        name: String,
    },
    ListTypeSpecifier {
        #[serde(rename = "elementType")]
        element_type: Box<TypeSpecifierNode>,
    },
    IntervalTypeSpecifier {
        #[serde(rename = "pointType")]
        point_type: Box<TypeSpecifierNode>,
    },
    TupleTypeSpecifier {
        element: Vec<TupleElementNode>,
    },
    ChoiceTypeSpecifier {
        choice: Vec<TypeSpecifierNode>,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TupleElementNode {
    pub name: String,
    pub element_type: TypeSpecifierNode,
}

impl From<&TypeSpecifier> for TypeSpecifierNode {
    fn from(spec: &TypeSpecifier) -> Self {
        match spec {
            TypeSpecifier::Named(named) => Self::NamedTypeSpecifier {
                name: named.full_name(),
            },
            TypeSpecifier::List(element) => Self::ListTypeSpecifier {
                element_type: Box::new(element.as_ref().into()),
            },
            TypeSpecifier::Interval(point) => Self::IntervalTypeSpecifier {
                point_type: Box::new(point.as_ref().into()),
            },
            TypeSpecifier::Tuple(elements) => Self::TupleTypeSpecifier {
                element: elements
                    .iter()
                    .map(|e| TupleElementNode {
                        name: e.name.clone(),
                        element_type: (&e.element_type).into(),
                    })
                    .collect(),
            },
            TypeSpecifier::Choice(choices) => Self::ChoiceTypeSpecifier {
                choice: choices.iter().map(Into::into).collect(),
            },
        }
    }
}

impl From<TypeSpecifierNode> for TypeSpecifier {
    fn from(node: TypeSpecifierNode) -> Self {
        match node {
            TypeSpecifierNode::NamedTypeSpecifier { name } => Self::Named(NamedTypeSpecifier::from(name.as_str())),
            TypeSpecifierNode::ListTypeSpecifier { element_type } => Self::List(Box::new((*element_type).into())),
            TypeSpecifierNode::IntervalTypeSpecifier { point_type } => Self::Interval(Box::new((*point_type).into())),
            TypeSpecifierNode::TupleTypeSpecifier { element } => Self::Tuple(
                element
                    .into_iter()
                    .map(|e| TupleElementType {
                        name: e.name,
                        element_type: e.element_type.into(),
                    })
                    .collect(),
            ),
            TypeSpecifierNode::ChoiceTypeSpecifier { choice } => {
                Self::Choice(choice.into_iter().map(Into::into).collect())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_type_specifier_shape() {
        let spec = TypeSpecifier::list(TypeSpecifier::named("FHIR.Condition"));
        let node = TypeSpecifierNode::from(&spec);
        let value = serde_json::to_value(&node).unwrap_or_default();
        assert_eq!(
            value,
            json!({
                "type": "ListTypeSpecifier",
                "elementType": { "type": "NamedTypeSpecifier", "name": "FHIR.Condition" }
            })
        );
        assert_eq!(TypeSpecifier::from(node), spec);
    }

    #[test]
    fn test_access_level_defaults_to_public() {
        let node: CodeSystemNode =
            serde_json::from_value(json!({ "name": "LOINC", "id": "http://loinc.org" })).unwrap_or_else(|e| panic!("{e}"));
        assert_eq!(node.access_level, AccessLevel::Public);
        let printed = serde_json::to_value(&node).unwrap_or_default();
        assert!(printed.get("accessLevel").is_none());
    }
}
