//! Type specifiers (`Integer`, `FHIR.Patient`, `List<Code>`, `Interval<DateTime>`)

use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TypeSpecifier {
    Named(NamedTypeSpecifier),
    List(Box<TypeSpecifier>),
    Interval(Box<TypeSpecifier>),
    Tuple(Vec<TupleElementType>),
    Choice(Vec<TypeSpecifier>),
}

impl TypeSpecifier {
    pub fn named(name: impl Into<String>) -> Self {
        Self::Named(NamedTypeSpecifier::from(name.into().as_str()))
    }

    pub fn list(element: TypeSpecifier) -> Self {
        Self::List(Box::new(element))
    }

    pub fn interval(point: TypeSpecifier) -> Self {
        Self::Interval(Box::new(point))
    }
}

impl fmt::Display for TypeSpecifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Named(n) => write!(f, "{}", n.full_name()),
            Self::List(e) => write!(f, "List<{e}>"),
            Self::Interval(p) => write!(f, "Interval<{p}>"),
            Self::Tuple(elements) => {
                write!(f, "Tuple {{ ")?;
                for (i, e) in elements.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{} {}", e.name, e.element_type)?;
                }
                write!(f, " }}")
            }
            Self::Choice(types) => {
                write!(f, "Choice<")?;
                for (i, t) in types.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{t}")?;
                }
                write!(f, ">")
            }
        }
    }
}

/// A possibly model-qualified type name
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NamedTypeSpecifier {
    /// `System`, `FHIR`, ... when written qualified
    pub namespace: Option<String>,
    pub name: String,
}

impl NamedTypeSpecifier {
    pub fn full_name(&self) -> String {
        match &self.namespace {
            Some(ns) => format!("{}.{}", ns, self.name),
            None => self.name.clone(),
        }
    }
}

impl From<&str> for NamedTypeSpecifier {
    fn from(s: &str) -> Self {
        match s.split_once('.') {
            Some((ns, name)) => Self {
                namespace: Some(ns.to_string()),
                name: name.to_string(),
            },
            None => Self {
                namespace: None,
                name: s.to_string(),
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TupleElementType {
    pub name: String,
    pub element_type: TypeSpecifier,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_nested() {
        let t = TypeSpecifier::list(TypeSpecifier::interval(TypeSpecifier::named("System.DateTime")));
        assert_eq!(t.to_string(), "List<Interval<System.DateTime>>");
    }
}
