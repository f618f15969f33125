//! Type checking.
//!
//! Expressions are typed bottom-up against the closed set of value types;
//! objects carry an [`ObjectType`] fixed at their declaration. Checking is
//! eager: constructing a [`TypeAnalysis`] walks the whole program, so a
//! value of this type is proof the program is well-typed.

use std::collections::HashMap;

use crate::analysis::NameAnalysis;
use crate::syntax::{
    CallArgument, NodeId, NodeKind, ObjectType, ParameterDirection, ProgramTree,
    SourceLocation, ValueType,
};
use crate::{Error, Result};

/// Expression and object types for one program.
pub struct TypeAnalysis<'t, 'n> {
    tree: &'t ProgramTree,
    names: &'n NameAnalysis<'t>,
    value_types: HashMap<NodeId, ValueType>,
}

impl<'t, 'n> TypeAnalysis<'t, 'n> {
    /// Type-checks `tree`.
    ///
    /// # Errors
    ///
    /// Fails with [`Error::TypeMismatch`], [`Error::UnknownMethod`],
    /// [`Error::IncorrectNumberOfArguments`], or
    /// [`Error::ParameterDirectionMismatch`] on the first violation.
    pub fn new(tree: &'t ProgramTree, names: &'n NameAnalysis<'t>) -> Result<Self> {
        let mut analysis = Self {
            tree,
            names,
            value_types: HashMap::new(),
        };
        for function in tree.function_declarations() {
            if let NodeKind::FunctionDeclaration { body, .. } = tree.kind(function) {
                analysis.check_statement(*body)?;
            }
        }
        tracing::debug!(expressions = analysis.value_types.len(), "typed program");
        Ok(analysis)
    }

    /// The type of the expression at `node`.
    ///
    /// # Errors
    ///
    /// Fails if `node` is not an expression; all expressions were typed at
    /// construction.
    pub fn value_type(&self, node: NodeId) -> Result<ValueType> {
        self.value_types.get(&node).copied().ok_or_else(|| {
            malformed_error!("node {} is not a typed expression", node.index())
        })
    }

    /// The object type declared for the object declaration at `node`.
    ///
    /// Accepts declaration statements, parameters, and object-declaration
    /// call arguments.
    ///
    /// # Errors
    ///
    /// Fails if `node` does not declare an object.
    pub fn object_type(&self, node: NodeId) -> Result<ObjectType> {
        match self.tree.kind(node) {
            NodeKind::DeclareObject { object_type, .. }
            | NodeKind::Parameter { object_type, .. }
            | NodeKind::Argument(CallArgument::ObjectDeclaration { object_type, .. }) => {
                Ok(*object_type)
            }
            _ => Err(malformed_error!(
                "node {} does not declare an object",
                node.index()
            )),
        }
    }

    fn check_statement(&mut self, statement: NodeId) -> Result<()> {
        let location = self.tree.location(statement);
        match self.tree.kind(statement).clone() {
            NodeKind::Let { value, .. } => {
                self.infer_expression(value)?;
                Ok(())
            }
            NodeKind::DeclareObject {
                object_type,
                arguments,
                ..
            } => self.check_arguments(&object_type.constructor_signature(), &arguments, location),
            NodeKind::Update {
                method, arguments, ..
            } => {
                let object_type = self.object_type(self.names.declaration(statement)?)?;
                let signature = object_type.update_signature(method).ok_or_else(|| {
                    Error::UnknownMethod {
                        object_type,
                        method: method.to_string(),
                        location,
                    }
                })?;
                self.check_arguments(&signature, &arguments, location)
            }
            NodeKind::OutParameterInitialization { arguments, .. } => {
                let object_type = self.object_type(self.names.declaration(statement)?)?;
                self.check_arguments(&object_type.constructor_signature(), &arguments, location)
            }
            NodeKind::Output { message, .. } => {
                self.infer_expression(message)?;
                Ok(())
            }
            NodeKind::FunctionCall { arguments, .. } => self.check_call(statement, &arguments),
            NodeKind::If {
                guard,
                then_branch,
                else_branch,
            } => {
                self.expect_type(guard, ValueType::Boolean)?;
                self.check_statement(then_branch)?;
                self.check_statement(else_branch)
            }
            NodeKind::Loop { body, .. } => self.check_statement(body),
            NodeKind::Break { .. } => Ok(()),
            NodeKind::Assert { condition } => self.expect_type(condition, ValueType::Boolean),
            NodeKind::Block { statements } => {
                for statement in statements {
                    self.check_statement(statement)?;
                }
                Ok(())
            }
            _ => Err(malformed_error!("unexpected statement node")),
        }
    }

    fn check_call(&mut self, call: NodeId, arguments: &[NodeId]) -> Result<()> {
        let callee = self.names.declaration(call)?;
        let NodeKind::FunctionDeclaration { parameters, .. } = self.tree.kind(callee).clone()
        else {
            return Err(malformed_error!("call resolves to a non-function"));
        };
        if parameters.len() != arguments.len() {
            return Err(Error::IncorrectNumberOfArguments {
                expected: parameters.len(),
                actual: arguments.len(),
                location: self.tree.location(call),
            });
        }
        for (&argument, &parameter) in arguments.iter().zip(parameters.iter()) {
            self.check_call_argument(argument, parameter)?;
        }
        Ok(())
    }

    fn check_call_argument(&mut self, argument: NodeId, parameter: NodeId) -> Result<()> {
        let location = self.tree.location(argument);
        let NodeKind::Parameter {
            name,
            direction,
            object_type: parameter_type,
            ..
        } = self.tree.kind(parameter).clone()
        else {
            return Err(malformed_error!("expected a parameter node"));
        };
        let NodeKind::Argument(kind) = self.tree.kind(argument).clone() else {
            return Err(malformed_error!("expected an argument node"));
        };

        let argument_direction = match kind {
            CallArgument::Expression { .. } | CallArgument::ObjectReference { .. } => {
                ParameterDirection::In
            }
            CallArgument::OutParameter { .. } | CallArgument::ObjectDeclaration { .. } => {
                ParameterDirection::Out
            }
        };
        if argument_direction != direction {
            return Err(Error::ParameterDirectionMismatch {
                parameter: name.name().to_string(),
                expected: direction,
                actual: argument_direction,
                location,
            });
        }

        match kind {
            CallArgument::Expression { value } => {
                self.expect_type(value, parameter_type.element_type())
            }
            CallArgument::ObjectReference { .. } | CallArgument::OutParameter { .. } => {
                let referenced = self.object_type(self.names.declaration(argument)?)?;
                self.expect_object_type(referenced, parameter_type, location)
            }
            CallArgument::ObjectDeclaration { object_type, .. } => {
                self.expect_object_type(object_type, parameter_type, location)
            }
        }
    }

    fn check_arguments(
        &mut self,
        signature: &[ValueType],
        arguments: &[NodeId],
        location: SourceLocation,
    ) -> Result<()> {
        if signature.len() != arguments.len() {
            return Err(Error::IncorrectNumberOfArguments {
                expected: signature.len(),
                actual: arguments.len(),
                location,
            });
        }
        for (&argument, &expected) in arguments.iter().zip(signature.iter()) {
            self.expect_type(argument, expected)?;
        }
        Ok(())
    }

    fn expect_type(&mut self, expression: NodeId, expected: ValueType) -> Result<()> {
        let actual = self.infer_expression(expression)?;
        if actual != expected {
            return Err(Error::TypeMismatch {
                expected,
                actual,
                location: self.tree.location(expression),
            });
        }
        Ok(())
    }

    fn expect_object_type(
        &self,
        actual: ObjectType,
        expected: ObjectType,
        location: SourceLocation,
    ) -> Result<()> {
        if actual != expected {
            return Err(Error::TypeMismatch {
                expected: expected.element_type(),
                actual: actual.element_type(),
                location,
            });
        }
        Ok(())
    }

    fn infer_expression(&mut self, expression: NodeId) -> Result<ValueType> {
        if let Some(&cached) = self.value_types.get(&expression) {
            return Ok(cached);
        }
        let location = self.tree.location(expression);
        let inferred = match self.tree.kind(expression).clone() {
            NodeKind::Literal { value } => value.value_type(),
            NodeKind::ReadTemporary { .. } => {
                let declaration = self.names.declaration(expression)?;
                let NodeKind::Let { value, .. } = self.tree.kind(declaration) else {
                    return Err(malformed_error!("read resolves to a non-let"));
                };
                self.infer_expression(*value)?
            }
            NodeKind::Operator {
                operator,
                arguments,
            } => {
                let (signature, result) = operator.signature();
                self.check_arguments(signature, &arguments, location)?;
                result
            }
            NodeKind::Query {
                method, arguments, ..
            } => {
                let object_type = self.object_type(self.names.declaration(expression)?)?;
                let (signature, result) =
                    object_type.query_signature(method).ok_or_else(|| {
                        Error::UnknownMethod {
                            object_type,
                            method: method.to_string(),
                            location,
                        }
                    })?;
                self.check_arguments(&signature, &arguments, location)?;
                result
            }
            NodeKind::Declassify {
                expression: inner, ..
            }
            | NodeKind::Endorse {
                expression: inner, ..
            } => self.infer_expression(inner)?,
            NodeKind::Input { value_type, .. } => value_type,
            _ => return Err(malformed_error!("unexpected expression node")),
        };
        self.value_types.insert(expression, inferred);
        Ok(inferred)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::syntax::{
        FunctionName, MethodName, ObjectVariable, Operator, ProgramBuilder, Value, Variable,
    };

    fn here() -> SourceLocation {
        SourceLocation::new(1, 1)
    }

    fn single_function(
        builder: ProgramBuilder,
        statements: Vec<NodeId>,
    ) -> (ProgramTree, NodeId) {
        let mut builder = builder;
        let body = builder.add(NodeKind::Block { statements }, here());
        let main = builder.add(
            NodeKind::FunctionDeclaration {
                function: FunctionName::new("main"),
                label_parameters: vec![],
                parameters: vec![],
                pc_label: None,
                body,
            },
            here(),
        );
        let root = builder.add(
            NodeKind::Program {
                declarations: vec![main],
            },
            here(),
        );
        (builder.build(root).unwrap(), main)
    }

    #[test]
    fn operator_results_are_typed() {
        let mut builder = ProgramBuilder::new();
        let one = builder.add(
            NodeKind::Literal {
                value: Value::Integer(1),
            },
            here(),
        );
        let two = builder.add(
            NodeKind::Literal {
                value: Value::Integer(2),
            },
            here(),
        );
        let comparison = builder.add(
            NodeKind::Operator {
                operator: Operator::LessThan,
                arguments: vec![one, two],
            },
            here(),
        );
        let binding = builder.add(
            NodeKind::Let {
                temporary: Variable::new("x"),
                value: comparison,
            },
            here(),
        );
        let (tree, _) = single_function(builder, vec![binding]);
        let names = NameAnalysis::new(&tree).unwrap();
        let types = TypeAnalysis::new(&tree, &names).unwrap();
        assert_eq!(types.value_type(comparison).unwrap(), ValueType::Boolean);
        assert_eq!(types.value_type(one).unwrap(), ValueType::Integer);
    }

    #[test]
    fn boolean_operand_to_addition_is_rejected() {
        let mut builder = ProgramBuilder::new();
        let one = builder.add(
            NodeKind::Literal {
                value: Value::Integer(1),
            },
            here(),
        );
        let truth = builder.add(
            NodeKind::Literal {
                value: Value::Boolean(true),
            },
            here(),
        );
        let sum = builder.add(
            NodeKind::Operator {
                operator: Operator::Add,
                arguments: vec![one, truth],
            },
            here(),
        );
        let binding = builder.add(
            NodeKind::Let {
                temporary: Variable::new("x"),
                value: sum,
            },
            here(),
        );
        let (tree, _) = single_function(builder, vec![binding]);
        let names = NameAnalysis::new(&tree).unwrap();
        assert!(matches!(
            TypeAnalysis::new(&tree, &names),
            Err(Error::TypeMismatch { .. })
        ));
    }

    #[test]
    fn set_on_immutable_cell_is_unknown() {
        let mut builder = ProgramBuilder::new();
        let init = builder.add(
            NodeKind::Literal {
                value: Value::Integer(0),
            },
            here(),
        );
        let declaration = builder.add(
            NodeKind::DeclareObject {
                object: ObjectVariable::new("cell"),
                object_type: ObjectType::ImmutableCell(ValueType::Integer),
                label: None,
                arguments: vec![init],
            },
            here(),
        );
        let value = builder.add(
            NodeKind::Literal {
                value: Value::Integer(1),
            },
            here(),
        );
        let update = builder.add(
            NodeKind::Update {
                object: ObjectVariable::new("cell"),
                method: MethodName::Set,
                arguments: vec![value],
            },
            here(),
        );
        let (tree, _) = single_function(builder, vec![declaration, update]);
        let names = NameAnalysis::new(&tree).unwrap();
        assert!(matches!(
            TypeAnalysis::new(&tree, &names),
            Err(Error::UnknownMethod { .. })
        ));
    }

    #[test]
    fn out_parameter_passed_as_in_is_rejected() {
        // fn sink(p: out Cell<integer>) { out p = Cell(0); }
        // fn main() { sink(1); }  -- expression argument for an out param
        let mut builder = ProgramBuilder::new();
        let init = builder.add(
            NodeKind::Literal {
                value: Value::Integer(0),
            },
            here(),
        );
        let initialize = builder.add(
            NodeKind::OutParameterInitialization {
                parameter: ObjectVariable::new("p"),
                arguments: vec![init],
            },
            here(),
        );
        let sink_body = builder.add(
            NodeKind::Block {
                statements: vec![initialize],
            },
            here(),
        );
        let parameter = builder.add(
            NodeKind::Parameter {
                name: ObjectVariable::new("p"),
                direction: ParameterDirection::Out,
                object_type: ObjectType::ImmutableCell(ValueType::Integer),
                label: None,
            },
            here(),
        );
        let sink = builder.add(
            NodeKind::FunctionDeclaration {
                function: FunctionName::new("sink"),
                label_parameters: vec![],
                parameters: vec![parameter],
                pc_label: None,
                body: sink_body,
            },
            here(),
        );
        let one = builder.add(
            NodeKind::Literal {
                value: Value::Integer(1),
            },
            here(),
        );
        let argument = builder.add(
            NodeKind::Argument(CallArgument::Expression { value: one }),
            here(),
        );
        let call = builder.add(
            NodeKind::FunctionCall {
                function: FunctionName::new("sink"),
                arguments: vec![argument],
            },
            here(),
        );
        let main_body = builder.add(
            NodeKind::Block {
                statements: vec![call],
            },
            here(),
        );
        let main = builder.add(
            NodeKind::FunctionDeclaration {
                function: FunctionName::new("main"),
                label_parameters: vec![],
                parameters: vec![],
                pc_label: None,
                body: main_body,
            },
            here(),
        );
        let root = builder.add(
            NodeKind::Program {
                declarations: vec![main, sink],
            },
            here(),
        );
        let tree = builder.build(root).unwrap();
        let names = NameAnalysis::new(&tree).unwrap();
        assert!(matches!(
            TypeAnalysis::new(&tree, &names),
            Err(Error::ParameterDirectionMismatch { .. })
        ));
    }
}
