//! Statement lowering: locals, assignment, control flow with
//! forward-patched branch targets, and returns.

use super::{Codegen, RuntimeValue};
use crate::compiler::ast::*;
use crate::compiler::constant::coerce_to_default_type;
use crate::compiler::diagnostics::CompileResult;
use crate::compiler::ir::Instruction;
use crate::compiler::types::{type_alignment, type_size, type_representation, Type};
use std::rc::Rc;

impl Codegen {
    pub fn generate_statement(
        &mut self,
        instructions: &mut Vec<Instruction>,
        statement: &Rc<Statement>,
    ) -> CompileResult<()> {
        match &statement.kind {
            // Declarations inside a body participate in name resolution but
            // produce no code of their own.
            StatementKind::FunctionDeclaration(_)
            | StatementKind::ConstantDefinition { .. }
            | StatementKind::StructDefinition(_)
            | StatementKind::Import { .. }
            | StatementKind::Using { .. } => Ok(()),

            StatementKind::ExpressionStatement(expression) => {
                self.generate_expression(instructions, expression)?;
                Ok(())
            }

            StatementKind::VariableDeclaration {
                name,
                type_expression,
                initializer,
            } => self.generate_variable_declaration(
                instructions,
                name,
                type_expression.as_ref(),
                initializer.as_ref(),
            ),

            StatementKind::Assignment { target, value } => {
                let target_value = self.generate_expression(instructions, target)?;
                let address_register = match target_value.value {
                    RuntimeValue::Address(address_register) => address_register,
                    _ => {
                        return Err(
                            self.error(target.range, "Value is not assignable".to_string())
                        );
                    }
                };

                let value_result = self.generate_expression(instructions, value)?;
                self.coerce_to_type_write(
                    instructions,
                    value.range,
                    &value_result,
                    &target_value.ty,
                    address_register,
                )
            }

            StatementKind::If {
                condition,
                statements,
                else_ifs,
                else_statements,
            } => self.generate_if(instructions, condition, statements, else_ifs, else_statements),

            StatementKind::While {
                condition,
                statements,
            } => self.generate_while(instructions, condition, statements),

            StatementKind::Return { value } => self.generate_return(instructions, statement, value.as_ref()),
        }
    }

    fn generate_variable_declaration(
        &mut self,
        instructions: &mut Vec<Instruction>,
        name: &Identifier,
        type_expression: Option<&Expression>,
        initializer: Option<&Expression>,
    ) -> CompileResult<()> {
        let (variable_type, type_range) = match type_expression {
            Some(type_expression) => {
                let scope = self.scope();
                let ty = crate::compiler::constant::evaluate_type_expression(
                    &self.info,
                    &scope,
                    &mut self.files,
                    type_expression,
                )?;
                (ty, type_expression.range)
            }
            None => {
                // Infer from the initializer, collapsing undetermined types.
                let initializer = initializer.expect("parser guarantees an initializer");
                let value = self.generate_expression(instructions, initializer)?;
                let scope = self.scope();
                let ty = coerce_to_default_type(&self.info, &scope, initializer.range, &value.ty)?;
                if !ty.is_runtime_type() {
                    return Err(self.error(
                        initializer.range,
                        format!("Variables cannot be of type '{}'", ty),
                    ));
                }

                let size = type_size(&self.info, &ty);
                let alignment = type_alignment(&self.info, &ty);
                let address_register = self.append_allocate_local(instructions, size, alignment);
                self.coerce_to_type_write(instructions, initializer.range, &value, &ty, address_register)?;
                return self.add_variable(name.clone(), ty, initializer.range, address_register);
            }
        };

        if !variable_type.is_runtime_type() {
            return Err(self.error(
                type_range,
                format!("Variables cannot be of type '{}'", variable_type),
            ));
        }

        let size = type_size(&self.info, &variable_type);
        let alignment = type_alignment(&self.info, &variable_type);
        let address_register = self.append_allocate_local(instructions, size, alignment);

        if let Some(initializer) = initializer {
            let value = self.generate_expression(instructions, initializer)?;
            self.coerce_to_type_write(
                instructions,
                initializer.range,
                &value,
                &variable_type,
                address_register,
            )?;
        }

        self.add_variable(name.clone(), variable_type, type_range, address_register)
    }

    /// Lower a condition to a register, requiring `Bool`.
    fn generate_condition(
        &mut self,
        instructions: &mut Vec<Instruction>,
        condition: &Expression,
    ) -> CompileResult<usize> {
        let value = self.generate_expression(instructions, condition)?;
        if !matches!(value.ty, Type::Boolean) {
            return Err(self.error(
                condition.range,
                format!("Non-boolean condition. Got '{}'", value.ty),
            ));
        }
        self.generate_register_value(instructions, condition.range, &value)
    }

    fn generate_if(
        &mut self,
        instructions: &mut Vec<Instruction>,
        condition: &Expression,
        statements: &Rc<Vec<Rc<Statement>>>,
        else_ifs: &[ElseIf],
        else_statements: &Rc<Vec<Rc<Statement>>>,
    ) -> CompileResult<()> {
        let has_tail = !else_ifs.is_empty() || !else_statements.is_empty();
        let mut end_jumps = Vec::new();

        // Each arm: branch over the skip-jump into the body, the skip-jump
        // itself is patched to the next arm.
        let mut arms: Vec<(&Expression, &Rc<Vec<Rc<Statement>>>)> = vec![(condition, statements)];
        for else_if in else_ifs {
            arms.push((&else_if.condition, &else_if.statements));
        }

        for (index, (arm_condition, arm_statements)) in arms.iter().enumerate() {
            let condition_register = self.generate_condition(instructions, arm_condition)?;
            instructions.push(Instruction::Branch {
                condition_register,
                destination_instruction: instructions.len() + 2,
            });
            let skip_jump = instructions.len();
            instructions.push(Instruction::Jump {
                destination_instruction: 0,
            });

            self.push_variable_scope();
            for statement in arm_statements.iter() {
                self.generate_statement(instructions, statement)?;
            }
            self.pop_variable_scope();

            let is_last_arm = index == arms.len() - 1;
            if has_tail && !(is_last_arm && else_statements.is_empty()) {
                end_jumps.push(instructions.len());
                instructions.push(Instruction::Jump {
                    destination_instruction: 0,
                });
            }

            let next_arm = instructions.len();
            if let Instruction::Jump {
                destination_instruction,
            } = &mut instructions[skip_jump]
            {
                *destination_instruction = next_arm;
            }
        }

        self.push_variable_scope();
        for statement in else_statements.iter() {
            self.generate_statement(instructions, statement)?;
        }
        self.pop_variable_scope();

        let end = instructions.len();
        for jump in end_jumps {
            if let Instruction::Jump {
                destination_instruction,
            } = &mut instructions[jump]
            {
                *destination_instruction = end;
            }
        }

        Ok(())
    }

    fn generate_while(
        &mut self,
        instructions: &mut Vec<Instruction>,
        condition: &Expression,
        statements: &Rc<Vec<Rc<Statement>>>,
    ) -> CompileResult<()> {
        let head = instructions.len();
        let condition_register = self.generate_condition(instructions, condition)?;

        instructions.push(Instruction::Branch {
            condition_register,
            destination_instruction: instructions.len() + 2,
        });
        let exit_jump = instructions.len();
        instructions.push(Instruction::Jump {
            destination_instruction: 0,
        });

        self.push_variable_scope();
        for statement in statements.iter() {
            self.generate_statement(instructions, statement)?;
        }
        self.pop_variable_scope();

        instructions.push(Instruction::Jump {
            destination_instruction: head,
        });

        let end = instructions.len();
        if let Instruction::Jump {
            destination_instruction,
        } = &mut instructions[exit_jump]
        {
            *destination_instruction = end;
        }

        Ok(())
    }

    fn generate_return(
        &mut self,
        instructions: &mut Vec<Instruction>,
        statement: &Rc<Statement>,
        value: Option<&Expression>,
    ) -> CompileResult<()> {
        let return_type = self.return_type.clone();

        match value {
            Some(value_expression) => {
                if matches!(return_type, Type::Void) {
                    return Err(self.error(
                        statement.range,
                        "Cannot return a value from a function without a return type".to_string(),
                    ));
                }

                let value = self.generate_expression(instructions, value_expression)?;
                let representation = type_representation(&self.info, &return_type);

                if representation.is_in_register {
                    let register = self.coerce_to_register(
                        instructions,
                        value_expression.range,
                        &value,
                        &return_type,
                    )?;
                    instructions.push(Instruction::Return {
                        value_register: Some(register),
                    });
                } else {
                    let return_address = self
                        .return_address_register
                        .expect("aggregate return without a return address register");
                    self.coerce_to_type_write(
                        instructions,
                        value_expression.range,
                        &value,
                        &return_type,
                        return_address,
                    )?;
                    instructions.push(Instruction::Return {
                        value_register: None,
                    });
                }
                Ok(())
            }
            None => {
                if !matches!(return_type, Type::Void) {
                    return Err(self.error(
                        statement.range,
                        format!("Expected a return value of type '{}'", return_type),
                    ));
                }
                instructions.push(Instruction::Return {
                    value_register: None,
                });
                Ok(())
            }
        }
    }
}

/// Structural termination check: every control path through the statements
/// must end in a `return`.
pub fn statements_always_return(statements: &[Rc<Statement>]) -> bool {
    statements.iter().any(|statement| match &statement.kind {
        StatementKind::Return { .. } => true,
        StatementKind::If {
            statements,
            else_ifs,
            else_statements,
            ..
        } => {
            !else_statements.is_empty()
                && statements_always_return(statements)
                && else_ifs
                    .iter()
                    .all(|else_if| statements_always_return(&else_if.statements))
                && statements_always_return(else_statements)
        }
        _ => false,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compiler::span::FileRange;

    fn statement(kind: StatementKind) -> Rc<Statement> {
        Rc::new(Statement {
            kind,
            range: FileRange::synthetic(),
        })
    }

    fn return_statement() -> Rc<Statement> {
        statement(StatementKind::Return { value: None })
    }

    #[test]
    fn test_trailing_return_terminates() {
        let statements = vec![return_statement()];
        assert!(statements_always_return(&statements));
        assert!(!statements_always_return(&[]));
    }

    #[test]
    fn test_if_terminates_only_with_full_else() {
        let condition = Expression {
            kind: ExpressionKind::IntegerLiteral(1),
            range: FileRange::synthetic(),
        };

        let full = statement(StatementKind::If {
            condition: condition.clone(),
            statements: Rc::new(vec![return_statement()]),
            else_ifs: Vec::new(),
            else_statements: Rc::new(vec![return_statement()]),
        });
        assert!(statements_always_return(&[full]));

        let no_else = statement(StatementKind::If {
            condition,
            statements: Rc::new(vec![return_statement()]),
            else_ifs: Vec::new(),
            else_statements: Rc::new(Vec::new()),
        });
        assert!(!statements_always_return(&[no_else]));
    }
}
