//! Property formulas: named formulas attached to a component property.
//!
//! Unlike value-node expressions, a property formula is bound once at compile
//! time. Every operand is classified up front so evaluation never looks at
//! the source string again.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::formula::{self, Expr, Function};
use crate::resolver::ConstantRegistry;
use crate::{Error, Result};

/// How one operand of a property formula is resolved.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ReferenceKind {
    /// `#component.property`
    ComponentProperty { component: String, property: String },
    /// `#pi`, `#e`, or a configured constant.
    SystemConstant { symbol: String },
    /// A numeric literal in the formula.
    LiteralValue { value: f64 },
    /// A built-in function application.
    FunctionCall { function: Function },
}

/// One typed operand, in source order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PropertyReference {
    /// Reference token without `#`, or the literal/function as written.
    pub token: String,
    #[serde(flatten)]
    pub kind: ReferenceKind,
}

/// A compiled formula that computes `component.property`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PropertyFormula {
    pub name: String,
    pub component: String,
    pub property: String,
    pub expression: String,
    pub references: Vec<PropertyReference>,
    #[serde(skip)]
    pub(crate) ast: Option<Arc<Expr>>,
}

impl PropertyFormula {
    /// Parse `expression` and bind its operands.
    ///
    /// Plain references must name a system constant; `#a.b` references bind
    /// to component properties, which are looked up at evaluation time. A
    /// formula may not reference the property it computes.
    pub fn compile(
        name: &str,
        component: &str,
        property: &str,
        expression: &str,
        constants: &ConstantRegistry,
    ) -> Result<Self> {
        let ast = formula::parse(expression)?;
        let mut references = Vec::new();
        let mut failure: Option<Error> = None;

        ast.walk(&mut |node| {
            if failure.is_some() {
                return;
            }
            match node {
                Expr::Number(v) => references.push(PropertyReference {
                    token: v.to_string(),
                    kind: ReferenceKind::LiteralValue { value: *v },
                }),
                Expr::Function { func, .. } => references.push(PropertyReference {
                    token: func.name().to_string(),
                    kind: ReferenceKind::FunctionCall { function: *func },
                }),
                Expr::Reference(r) => {
                    let kind = match &r.field {
                        Some(field) if r.name == component && field == property => {
                            failure = Some(Error::ConstraintViolation(format!(
                                "formula '{name}' for {component}.{property} references itself"
                            )));
                            return;
                        }
                        Some(field) => ReferenceKind::ComponentProperty {
                            component: r.name.clone(),
                            property: field.clone(),
                        },
                        None if constants.contains(&r.name) => {
                            ReferenceKind::SystemConstant { symbol: r.name.clone() }
                        }
                        None => {
                            failure = Some(Error::UnresolvedReference {
                                token: r.token(),
                                reason: "property formulas may only reference component \
                                         properties (#component.property) and system constants"
                                    .into(),
                            });
                            return;
                        }
                    };
                    references.push(PropertyReference { token: r.token(), kind });
                }
                Expr::Unary { .. } | Expr::Binary { .. } => {}
            }
        });

        if let Some(err) = failure {
            return Err(err);
        }

        Ok(Self {
            name: name.to_string(),
            component: component.to_string(),
            property: property.to_string(),
            expression: expression.to_string(),
            references,
            ast: Some(Arc::new(ast)),
        })
    }

    /// The operand bound to a reference token, if any.
    pub fn reference(&self, token: &str) -> Option<&PropertyReference> {
        self.references.iter().find(|r| {
            r.token == token
                && matches!(
                    r.kind,
                    ReferenceKind::ComponentProperty { .. } | ReferenceKind::SystemConstant { .. }
                )
        })
    }

    /// The `(component, property)` pairs this formula reads.
    pub fn inputs(&self) -> impl Iterator<Item = (&str, &str)> {
        self.references.iter().filter_map(|r| match &r.kind {
            ReferenceKind::ComponentProperty { component, property } => {
                Some((component.as_str(), property.as_str()))
            }
            _ => None,
        })
    }

    pub(crate) fn expr(&self) -> Option<&Expr> {
        self.ast.as_deref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_compile_classifies_operands() {
        let constants = ConstantRegistry::with_defaults();
        let f = PropertyFormula::compile(
            "weight",
            "motor",
            "weight",
            "#motor.mass * 9.81 + abs(#pi)",
            &constants,
        )
        .unwrap();

        let kinds: Vec<&ReferenceKind> = f.references.iter().map(|r| &r.kind).collect();
        assert_eq!(kinds.len(), 4);
        assert!(matches!(kinds[0], ReferenceKind::ComponentProperty { component, property }
            if component == "motor" && property == "mass"));
        assert!(matches!(kinds[1], ReferenceKind::LiteralValue { value } if *value == 9.81));
        assert!(matches!(kinds[2], ReferenceKind::FunctionCall { function: Function::Abs }));
        assert!(matches!(kinds[3], ReferenceKind::SystemConstant { symbol } if symbol == "pi"));
        assert_eq!(f.inputs().collect::<Vec<_>>(), vec![("motor", "mass")]);
    }

    #[test]
    fn test_compile_rejects_unknown_plain_reference() {
        let constants = ConstantRegistry::with_defaults();
        let err = PropertyFormula::compile("f", "c", "p", "#length * 2", &constants).unwrap_err();
        assert!(matches!(err, Error::UnresolvedReference { ref token, .. } if token == "length"));
    }

    #[test]
    fn test_compile_rejects_self_reference() {
        let constants = ConstantRegistry::with_defaults();
        let err = PropertyFormula::compile("f", "beam", "load", "#beam.load * 2", &constants)
            .unwrap_err();
        assert!(matches!(err, Error::ConstraintViolation(_)));
    }

    #[test]
    fn test_compile_surfaces_parse_errors() {
        let constants = ConstantRegistry::with_defaults();
        let err = PropertyFormula::compile("f", "c", "p", "#a.b +", &constants).unwrap_err();
        assert!(matches!(err, Error::Parse { .. }));
    }
}
