//! Owned expression tree for binding evaluation.
//!
//! oxc's AST borrows from its arena, while evaluated closures must outlive
//! the parse. Parsed expressions are therefore lowered into [`Expr`], which
//! the interpreter in [`crate::eval`] walks. Syntax outside the supported
//! subset lowers to [`Expr::Unsupported`] and only fails when evaluated.

use oxc_allocator::Allocator;
use oxc_ast::ast::{
    Argument, ArrayExpressionElement, BindingPattern, ChainElement, Expression, FormalParameters,
    FunctionBody, MemberExpression, ObjectPropertyKind, PropertyKey, PropertyKind, Statement,
};
use oxc_parser::Parser;
use oxc_span::{GetSpan, SourceType};
use oxc_syntax::operator::{BinaryOperator, LogicalOperator, UnaryOperator};
use std::rc::Rc;

use crate::eval::EvalError;
use crate::value::number_to_string;

#[derive(Debug, Clone, PartialEq)]
pub enum Literal {
    Undefined,
    Null,
    Bool(bool),
    Number(f64),
    String(String),
}

#[derive(Debug, Clone)]
pub enum Expr {
    Literal(Literal),
    Identifier(String),
    This,
    Template {
        quasis: Vec<String>,
        expressions: Vec<Expr>,
    },
    Array(Vec<ArrayItem>),
    Object(Vec<ObjectItem>),
    Member {
        object: Box<Expr>,
        property: MemberProperty,
        optional: bool,
    },
    Call {
        callee: Box<Expr>,
        arguments: Vec<ArrayItem>,
        optional: bool,
    },
    /// Boundary of an optional chain (`a?.b.c`).
    Chain(Box<Expr>),
    Unary {
        operator: UnaryOperator,
        argument: Box<Expr>,
    },
    Binary {
        operator: BinaryOperator,
        left: Box<Expr>,
        right: Box<Expr>,
    },
    Logical {
        operator: LogicalOperator,
        left: Box<Expr>,
        right: Box<Expr>,
    },
    Conditional {
        test: Box<Expr>,
        consequent: Box<Expr>,
        alternate: Box<Expr>,
    },
    Sequence(Vec<Expr>),
    Function(Rc<FunctionDef>),
    Unsupported(&'static str),
}

#[derive(Debug, Clone)]
pub enum ArrayItem {
    Item(Expr),
    Spread(Expr),
    Hole,
}

#[derive(Debug, Clone)]
pub enum ObjectItem {
    Property { key: PropertyName, value: Expr },
    Spread(Expr),
}

#[derive(Debug, Clone)]
pub enum PropertyName {
    Static(String),
    Computed(Expr),
}

#[derive(Debug, Clone)]
pub enum MemberProperty {
    Static(String),
    Computed(Box<Expr>),
}

#[derive(Debug)]
pub struct FunctionDef {
    pub name: Option<String>,
    pub params: Vec<String>,
    pub body: FunctionBodyExpr,
    pub is_arrow: bool,
    /// Source text, used when the function is converted to a string.
    pub source: String,
}

#[derive(Debug)]
pub enum FunctionBodyExpr {
    /// `=> expr` or `{ return expr; }`; `None` for an empty body.
    Return(Option<Expr>),
    /// A body the interpreter cannot run; calling the function fails.
    Opaque(&'static str),
}

/// Parses and lowers a JavaScript expression.
pub fn parse_expression(source: &str) -> Result<Expr, EvalError> {
    let allocator = Allocator::default();
    let parsed = Parser::new(&allocator, source, SourceType::default())
        .parse_expression()
        .map_err(|errors| EvalError::Syntax {
            expression: source.to_string(),
            message: errors
                .first()
                .map(|error| error.to_string())
                .unwrap_or_else(|| "invalid expression".to_string()),
        })?;
    Ok(Lowering { source }.expression(&parsed))
}

struct Lowering<'s> {
    source: &'s str,
}

impl Lowering<'_> {
    fn boxed(&self, expression: &Expression) -> Box<Expr> {
        Box::new(self.expression(expression))
    }

    fn expression(&self, expression: &Expression) -> Expr {
        match expression {
            Expression::BooleanLiteral(literal) => Expr::Literal(Literal::Bool(literal.value)),
            Expression::NullLiteral(_) => Expr::Literal(Literal::Null),
            Expression::NumericLiteral(literal) => Expr::Literal(Literal::Number(literal.value)),
            Expression::StringLiteral(literal) => {
                Expr::Literal(Literal::String(literal.value.to_string()))
            }
            Expression::TemplateLiteral(template) => Expr::Template {
                quasis: template
                    .quasis
                    .iter()
                    .map(|quasi| {
                        quasi
                            .value
                            .cooked
                            .as_ref()
                            .map(|cooked| cooked.to_string())
                            .unwrap_or_else(|| quasi.value.raw.to_string())
                    })
                    .collect(),
                expressions: template
                    .expressions
                    .iter()
                    .map(|expression| self.expression(expression))
                    .collect(),
            },
            Expression::Identifier(identifier) => Expr::Identifier(identifier.name.to_string()),
            Expression::ThisExpression(_) => Expr::This,
            Expression::ArrayExpression(array) => Expr::Array(
                array
                    .elements
                    .iter()
                    .map(|element| match element {
                        ArrayExpressionElement::SpreadElement(spread) => {
                            ArrayItem::Spread(self.expression(&spread.argument))
                        }
                        ArrayExpressionElement::Elision(_) => ArrayItem::Hole,
                        other => match other.as_expression() {
                            Some(expression) => ArrayItem::Item(self.expression(expression)),
                            None => ArrayItem::Hole,
                        },
                    })
                    .collect(),
            ),
            Expression::ObjectExpression(object) => Expr::Object(
                object
                    .properties
                    .iter()
                    .map(|property| match property {
                        ObjectPropertyKind::ObjectProperty(property) => {
                            let key = if property.computed {
                                match property.key.as_expression() {
                                    Some(key) => PropertyName::Computed(self.expression(key)),
                                    None => PropertyName::Static(String::new()),
                                }
                            } else {
                                PropertyName::Static(self.property_key(&property.key))
                            };
                            let value = if matches!(property.kind, PropertyKind::Init) {
                                self.expression(&property.value)
                            } else {
                                Expr::Unsupported("accessor properties")
                            };
                            ObjectItem::Property { key, value }
                        }
                        ObjectPropertyKind::SpreadProperty(spread) => {
                            ObjectItem::Spread(self.expression(&spread.argument))
                        }
                    })
                    .collect(),
            ),
            Expression::StaticMemberExpression(member) => Expr::Member {
                object: self.boxed(&member.object),
                property: MemberProperty::Static(member.property.name.to_string()),
                optional: member.optional,
            },
            Expression::ComputedMemberExpression(member) => Expr::Member {
                object: self.boxed(&member.object),
                property: MemberProperty::Computed(self.boxed(&member.expression)),
                optional: member.optional,
            },
            Expression::CallExpression(call) => Expr::Call {
                callee: self.boxed(&call.callee),
                arguments: self.arguments(&call.arguments),
                optional: call.optional,
            },
            Expression::ChainExpression(chain) => {
                let inner = match &chain.expression {
                    ChainElement::CallExpression(call) => Expr::Call {
                        callee: self.boxed(&call.callee),
                        arguments: self.arguments(&call.arguments),
                        optional: call.optional,
                    },
                    other => match other.as_member_expression() {
                        Some(member) => self.member(member),
                        None => Expr::Unsupported("this optional chain"),
                    },
                };
                Expr::Chain(Box::new(inner))
            }
            Expression::UnaryExpression(unary) => Expr::Unary {
                operator: unary.operator,
                argument: self.boxed(&unary.argument),
            },
            Expression::BinaryExpression(binary) => Expr::Binary {
                operator: binary.operator,
                left: self.boxed(&binary.left),
                right: self.boxed(&binary.right),
            },
            Expression::LogicalExpression(logical) => Expr::Logical {
                operator: logical.operator,
                left: self.boxed(&logical.left),
                right: self.boxed(&logical.right),
            },
            Expression::ConditionalExpression(conditional) => Expr::Conditional {
                test: self.boxed(&conditional.test),
                consequent: self.boxed(&conditional.consequent),
                alternate: self.boxed(&conditional.alternate),
            },
            Expression::SequenceExpression(sequence) => Expr::Sequence(
                sequence
                    .expressions
                    .iter()
                    .map(|expression| self.expression(expression))
                    .collect(),
            ),
            Expression::ParenthesizedExpression(parenthesized) => {
                self.expression(&parenthesized.expression)
            }
            Expression::ArrowFunctionExpression(arrow) => {
                let body = if arrow.r#async {
                    FunctionBodyExpr::Opaque("async functions")
                } else {
                    self.body(&arrow.body, arrow.expression)
                };
                self.function(None, &arrow.params, body, true, expression)
            }
            Expression::FunctionExpression(function) => {
                let body = if function.r#async || function.generator {
                    FunctionBodyExpr::Opaque("async and generator functions")
                } else {
                    match &function.body {
                        Some(body) => self.body(body, false),
                        None => FunctionBodyExpr::Return(None),
                    }
                };
                let name = function.id.as_ref().map(|id| id.name.to_string());
                self.function(name, &function.params, body, false, expression)
            }
            Expression::AssignmentExpression(_) => Expr::Unsupported("assignment"),
            Expression::UpdateExpression(_) => Expr::Unsupported("update expressions"),
            Expression::NewExpression(_) => Expr::Unsupported("`new`"),
            Expression::AwaitExpression(_) => Expr::Unsupported("`await`"),
            Expression::YieldExpression(_) => Expr::Unsupported("`yield`"),
            Expression::ClassExpression(_) => Expr::Unsupported("classes"),
            Expression::TaggedTemplateExpression(_) => Expr::Unsupported("tagged templates"),
            Expression::RegExpLiteral(_) => Expr::Unsupported("regular expressions"),
            Expression::BigIntLiteral(_) => Expr::Unsupported("BigInt literals"),
            _ => Expr::Unsupported("this syntax"),
        }
    }

    fn member(&self, member: &MemberExpression) -> Expr {
        match member {
            MemberExpression::StaticMemberExpression(member) => Expr::Member {
                object: self.boxed(&member.object),
                property: MemberProperty::Static(member.property.name.to_string()),
                optional: member.optional,
            },
            MemberExpression::ComputedMemberExpression(member) => Expr::Member {
                object: self.boxed(&member.object),
                property: MemberProperty::Computed(self.boxed(&member.expression)),
                optional: member.optional,
            },
            MemberExpression::PrivateFieldExpression(_) => Expr::Unsupported("private fields"),
        }
    }

    fn property_key(&self, key: &PropertyKey) -> String {
        match key {
            PropertyKey::StaticIdentifier(identifier) => identifier.name.to_string(),
            PropertyKey::StringLiteral(literal) => literal.value.to_string(),
            PropertyKey::NumericLiteral(literal) => number_to_string(literal.value),
            other => {
                let span = other.span();
                self.source
                    .get(span.start as usize..span.end as usize)
                    .unwrap_or_default()
                    .to_string()
            }
        }
    }

    fn arguments(&self, arguments: &[Argument]) -> Vec<ArrayItem> {
        arguments
            .iter()
            .map(|argument| match argument {
                Argument::SpreadElement(spread) => ArrayItem::Spread(self.expression(&spread.argument)),
                other => match other.as_expression() {
                    Some(expression) => ArrayItem::Item(self.expression(expression)),
                    None => ArrayItem::Hole,
                },
            })
            .collect()
    }

    fn body(&self, body: &FunctionBody, expression_body: bool) -> FunctionBodyExpr {
        match body.statements.as_slice() {
            [] => FunctionBodyExpr::Return(None),
            [Statement::ExpressionStatement(statement)] if expression_body => {
                FunctionBodyExpr::Return(Some(self.expression(&statement.expression)))
            }
            [Statement::ReturnStatement(statement)] => FunctionBodyExpr::Return(
                statement
                    .argument
                    .as_ref()
                    .map(|argument| self.expression(argument)),
            ),
            _ => FunctionBodyExpr::Opaque("statements other than `return`"),
        }
    }

    fn function(
        &self,
        name: Option<String>,
        params: &FormalParameters,
        body: FunctionBodyExpr,
        is_arrow: bool,
        expression: &Expression,
    ) -> Expr {
        let mut names = Vec::with_capacity(params.items.len());
        let mut simple = params.rest.is_none();
        for param in &params.items {
            match &param.pattern {
                BindingPattern::BindingIdentifier(identifier) => {
                    names.push(identifier.name.to_string())
                }
                _ => simple = false,
            }
        }
        let body = if simple {
            body
        } else {
            FunctionBodyExpr::Opaque("destructuring and rest parameters")
        };

        let span = expression.span();
        let source = self
            .source
            .get(span.start as usize..span.end as usize)
            .unwrap_or_default()
            .to_string();

        Expr::Function(Rc::new(FunctionDef {
            name,
            params: names,
            body,
            is_arrow,
            source,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lowers_member_chain() {
        let expr = parse_expression("a.b[c]").unwrap();
        match expr {
            Expr::Member {
                object,
                property: MemberProperty::Computed(_),
                optional: false,
            } => assert!(matches!(*object, Expr::Member { .. })),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_function_bodies() {
        let arrow = parse_expression("x => x + 1").unwrap();
        let Expr::Function(def) = arrow else {
            panic!("expected function");
        };
        assert!(def.is_arrow);
        assert_eq!(def.params, vec!["x"]);
        assert!(matches!(def.body, FunctionBodyExpr::Return(Some(_))));

        let function = parse_expression("function (a) { var b = a; return b; }").unwrap();
        let Expr::Function(def) = function else {
            panic!("expected function");
        };
        assert!(matches!(def.body, FunctionBodyExpr::Opaque(_)));
    }

    #[test]
    fn test_unsupported_syntax_is_deferred() {
        assert!(matches!(parse_expression("a = 1").unwrap(), Expr::Unsupported(_)));
        assert!(matches!(parse_expression("new Date()").unwrap(), Expr::Unsupported(_)));
        assert!(parse_expression("a +").is_err());
    }
}
