//! Expression lowering. Mirrors the constant evaluator over the same
//! grammar, emitting instructions whenever an operand is not constant.

use super::{Codegen, RuntimeParameter, RuntimeValue, TypedRuntimeValue};
use crate::compiler::ast::*;
use crate::compiler::constant::*;
use crate::compiler::diagnostics::CompileResult;
use crate::compiler::ir::*;
use crate::compiler::span::FileRange;
use crate::compiler::types::*;
use std::rc::Rc;

impl Codegen {
    pub fn generate_expression(
        &mut self,
        instructions: &mut Vec<Instruction>,
        expression: &Expression,
    ) -> CompileResult<TypedRuntimeValue> {
        match &expression.kind {
            ExpressionKind::NamedReference(name) => {
                if let Some(variable) = self.find_variable(&name.text) {
                    return Ok(TypedRuntimeValue {
                        ty: variable.variable_type.clone(),
                        value: RuntimeValue::Address(variable.address_register),
                    });
                }

                let scope = self.scope();
                let constant =
                    resolve_constant_named_reference(&self.info, &scope, &mut self.files, name)?;
                Ok(TypedRuntimeValue {
                    ty: constant.ty,
                    value: RuntimeValue::Constant(constant.value),
                })
            }

            ExpressionKind::MemberReference {
                expression: object,
                name,
            } => self.generate_member_reference(instructions, object, name),

            ExpressionKind::IndexReference {
                expression: object,
                index,
            } => self.generate_index_reference(instructions, object, index),

            ExpressionKind::IntegerLiteral(value) => Ok(TypedRuntimeValue {
                ty: Type::UndeterminedInteger,
                value: RuntimeValue::Constant(ConstantValue::Integer(*value)),
            }),

            ExpressionKind::FloatLiteral(value) => Ok(TypedRuntimeValue {
                ty: Type::UndeterminedFloat,
                value: RuntimeValue::Constant(ConstantValue::Float(*value)),
            }),

            ExpressionKind::StringLiteral(_) => {
                let scope = self.scope();
                let constant =
                    evaluate_constant_expression(&self.info, &scope, &mut self.files, expression)?;
                Ok(TypedRuntimeValue {
                    ty: constant.ty,
                    value: RuntimeValue::Constant(constant.value),
                })
            }

            ExpressionKind::ArrayLiteral(elements) => {
                self.generate_array_literal(instructions, expression.range, elements)
            }

            ExpressionKind::StructLiteral(members) => {
                self.generate_struct_literal(instructions, expression.range, members)
            }

            ExpressionKind::FunctionCall {
                expression: callee,
                parameters,
            } => self.generate_function_call(instructions, expression.range, callee, parameters),

            ExpressionKind::BinaryOperation {
                operator,
                left,
                right,
            } => self.generate_binary_operation(instructions, expression.range, *operator, left, right),

            ExpressionKind::UnaryOperation {
                operator,
                expression: operand,
            } => self.generate_unary_operation(instructions, expression.range, *operator, operand),

            ExpressionKind::Cast {
                expression: operand,
                target,
            } => self.generate_cast(instructions, operand, target),

            // Type expressions carry no runtime component; evaluate them as
            // constants.
            ExpressionKind::ArrayType { .. } | ExpressionKind::FunctionType { .. } => {
                let scope = self.scope();
                let constant =
                    evaluate_constant_expression(&self.info, &scope, &mut self.files, expression)?;
                Ok(TypedRuntimeValue {
                    ty: constant.ty,
                    value: RuntimeValue::Constant(constant.value),
                })
            }
        }
    }

    // ── Members ──────────────────────────────────────────────────

    fn generate_member_reference(
        &mut self,
        instructions: &mut Vec<Instruction>,
        object: &Expression,
        name: &Identifier,
    ) -> CompileResult<TypedRuntimeValue> {
        let object_value = self.generate_expression(instructions, object)?;
        let word = self.info.address_integer_size;

        match object_value.ty.clone() {
            Type::ArraySlice { element_type } => {
                if let Some(constant) = object_value.constant() {
                    let (pointer, length) = match constant {
                        ConstantValue::Array { pointer, length } => (*pointer, *length),
                        _ => unreachable!("expected an array constant"),
                    };
                    return if name.text == "length" {
                        Ok(TypedRuntimeValue {
                            ty: self.usize_type(),
                            value: RuntimeValue::Constant(ConstantValue::Integer(length)),
                        })
                    } else if name.text == "pointer" {
                        Ok(TypedRuntimeValue {
                            ty: Type::Pointer(element_type),
                            value: RuntimeValue::Constant(ConstantValue::Pointer(pointer)),
                        })
                    } else {
                        Err(self.error(name.range, format!("No member with name '{}'", name.text)))
                    };
                }

                let base = self.generate_register_value(instructions, object.range, &object_value)?;
                if name.text == "length" {
                    let address = self.append_address_offset(instructions, base, word.byte_size());
                    Ok(TypedRuntimeValue {
                        ty: self.usize_type(),
                        value: RuntimeValue::Address(address),
                    })
                } else if name.text == "pointer" {
                    Ok(TypedRuntimeValue {
                        ty: Type::Pointer(element_type),
                        value: RuntimeValue::Address(base),
                    })
                } else {
                    Err(self.error(name.range, format!("No member with name '{}'", name.text)))
                }
            }

            Type::StaticArray {
                length,
                element_type,
            } => {
                if name.text == "length" {
                    Ok(TypedRuntimeValue {
                        ty: self.usize_type(),
                        value: RuntimeValue::Constant(ConstantValue::Integer(length)),
                    })
                } else if name.text == "pointer" {
                    let base =
                        self.generate_register_value(instructions, object.range, &object_value)?;
                    Ok(TypedRuntimeValue {
                        ty: Type::Pointer(element_type),
                        value: RuntimeValue::Register(base),
                    })
                } else {
                    Err(self.error(name.range, format!("No member with name '{}'", name.text)))
                }
            }

            Type::Struct(struct_type) => {
                for (i, member) in struct_type.members.iter().enumerate() {
                    if member.name != name.text {
                        continue;
                    }

                    if let Some(ConstantValue::Struct(values)) = object_value.constant() {
                        return Ok(TypedRuntimeValue {
                            ty: member.member_type.clone(),
                            value: RuntimeValue::Constant(values[i].clone()),
                        });
                    }

                    let base =
                        self.generate_register_value(instructions, object.range, &object_value)?;
                    let offset = struct_member_offset(&self.info, &struct_type, i);
                    let address = self.append_address_offset(instructions, base, offset);
                    return Ok(TypedRuntimeValue {
                        ty: member.member_type.clone(),
                        value: RuntimeValue::Address(address),
                    });
                }
                Err(self.error(name.range, format!("No member with name '{}'", name.text)))
            }

            Type::UndeterminedStruct { members } => {
                for (i, member) in members.iter().enumerate() {
                    if member.name != name.text {
                        continue;
                    }
                    return match &object_value.value {
                        RuntimeValue::Constant(ConstantValue::Struct(values)) => {
                            Ok(TypedRuntimeValue {
                                ty: member.member_type.clone(),
                                value: RuntimeValue::Constant(values[i].clone()),
                            })
                        }
                        RuntimeValue::UndeterminedStruct(values) => Ok(values[i].clone()),
                        _ => unreachable!("expected a struct value"),
                    };
                }
                Err(self.error(name.range, format!("No member with name '{}'", name.text)))
            }

            Type::FileModule => {
                let module = match object_value.constant() {
                    Some(ConstantValue::FileModule(module)) => module.clone(),
                    _ => unreachable!("expected a module constant"),
                };
                for statement in module.statements.iter() {
                    if statement.matches_public_declaration(&name.text) {
                        let module_scope = Rc::new(ConstantScope {
                            statements: Rc::clone(&module.statements),
                            constant_parameters: Vec::new(),
                            parent: None,
                            file_path: Rc::clone(&module.path),
                            declaration_name: None,
                        });
                        let resolved = resolve_declaration(
                            &self.info,
                            &module_scope,
                            &mut self.files,
                            statement,
                        )?;
                        return Ok(TypedRuntimeValue {
                            ty: resolved.ty,
                            value: RuntimeValue::Constant(resolved.value),
                        });
                    }
                }
                Err(self.error(name.range, format!("No member with name '{}'", name.text)))
            }

            other => Err(self.error(object.range, format!("Type '{}' has no members", other))),
        }
    }

    // ── Indexing ─────────────────────────────────────────────────

    fn generate_index_reference(
        &mut self,
        instructions: &mut Vec<Instruction>,
        object: &Expression,
        index: &Expression,
    ) -> CompileResult<TypedRuntimeValue> {
        let object_value = self.generate_expression(instructions, object)?;
        let index_value = self.generate_expression(instructions, index)?;

        if let (Some(object_constant), Some(index_constant)) =
            (object_value.constant(), index_value.constant())
        {
            let scope = self.scope();
            let result = evaluate_constant_index(
                &self.info,
                &scope,
                &object_value.ty,
                object_constant,
                object.range,
                &index_value.ty,
                index_constant,
                index.range,
            )?;
            return Ok(TypedRuntimeValue {
                ty: result.ty,
                value: RuntimeValue::Constant(result.value),
            });
        }

        let word = self.info.address_integer_size;
        let usize_type = self.usize_type();
        let index_register =
            self.coerce_to_register(instructions, index.range, &index_value, &usize_type)?;

        let (base_register, element_type) = match &object_value.ty {
            Type::StaticArray { element_type, .. } => {
                let base =
                    self.generate_register_value(instructions, object.range, &object_value)?;
                (base, element_type.as_ref().clone())
            }
            Type::ArraySlice { element_type } => {
                let representation = type_representation(&self.info, &usize_type);
                let base = match &object_value.value {
                    RuntimeValue::Constant(ConstantValue::Array { pointer, .. }) => {
                        self.append_integer_constant(instructions, word, *pointer)
                    }
                    _ => {
                        let slice_address = self.generate_register_value(
                            instructions,
                            object.range,
                            &object_value,
                        )?;
                        self.append_load_scalar(instructions, representation, slice_address)
                    }
                };
                (base, element_type.as_ref().clone())
            }
            other => {
                return Err(self.error(object.range, format!("Cannot index '{}'", other)));
            }
        };

        // address = base + index × element size
        let stride = type_size(&self.info, &element_type);
        let stride_register = self.append_integer_constant(instructions, word, stride);
        let offset_register = self.allocate_register();
        instructions.push(Instruction::IntegerArithmetic {
            operation: IntegerArithmeticOperation::Multiply,
            size: word,
            source_a: index_register,
            source_b: stride_register,
            destination: offset_register,
        });
        let address_register = self.allocate_register();
        instructions.push(Instruction::IntegerArithmetic {
            operation: IntegerArithmeticOperation::Add,
            size: word,
            source_a: base_register,
            source_b: offset_register,
            destination: address_register,
        });

        Ok(TypedRuntimeValue {
            ty: element_type,
            value: RuntimeValue::Address(address_register),
        })
    }

    // ── Aggregate literals ───────────────────────────────────────

    fn generate_array_literal(
        &mut self,
        instructions: &mut Vec<Instruction>,
        range: FileRange,
        elements: &[Expression],
    ) -> CompileResult<TypedRuntimeValue> {
        if elements.is_empty() {
            return Err(self.error(range, "Empty array literal".to_string()));
        }

        let mut values = Vec::with_capacity(elements.len());
        for element in elements {
            values.push(self.generate_expression(instructions, element)?);
        }

        let scope = self.scope();
        let element_type =
            coerce_to_default_type(&self.info, &scope, elements[0].range, &values[0].ty)?;
        if !element_type.is_runtime_type() {
            return Err(self.error(range, format!("Arrays cannot be of type '{}'", element_type)));
        }

        let array_type = Type::StaticArray {
            length: elements.len() as u64,
            element_type: Box::new(element_type.clone()),
        };

        if values.iter().all(|value| value.constant().is_some()) {
            let mut constants = Vec::with_capacity(values.len());
            for (value, element) in values.iter().zip(elements) {
                constants.push(coerce_constant_to_type(
                    &self.info,
                    &scope,
                    element.range,
                    &value.ty,
                    value.constant().expect("checked constant"),
                    &element_type,
                )?);
            }
            return Ok(TypedRuntimeValue {
                ty: array_type,
                value: RuntimeValue::Constant(ConstantValue::StaticArray(constants)),
            });
        }

        let stride = type_size(&self.info, &element_type);
        let alignment = type_alignment(&self.info, &element_type);
        let local = self.append_allocate_local(
            instructions,
            stride * elements.len() as u64,
            alignment,
        );

        for (i, (value, element)) in values.iter().zip(elements).enumerate() {
            let element_address =
                self.append_address_offset(instructions, local, i as u64 * stride);
            self.coerce_to_type_write(
                instructions,
                element.range,
                value,
                &element_type,
                element_address,
            )?;
        }

        Ok(TypedRuntimeValue {
            ty: array_type,
            value: RuntimeValue::Address(local),
        })
    }

    fn generate_struct_literal(
        &mut self,
        instructions: &mut Vec<Instruction>,
        range: FileRange,
        literal_members: &[StructLiteralMember],
    ) -> CompileResult<TypedRuntimeValue> {
        if literal_members.is_empty() {
            return Err(self.error(range, "Empty struct literal".to_string()));
        }

        let mut members = Vec::with_capacity(literal_members.len());
        let mut values = Vec::with_capacity(literal_members.len());

        for (i, member) in literal_members.iter().enumerate() {
            for (j, other) in literal_members.iter().enumerate() {
                if i != j && member.name.text == other.name.text {
                    return Err(self.error(
                        member.name.range,
                        format!("Duplicate struct member {}", member.name.text),
                    ));
                }
            }

            let value = self.generate_expression(instructions, &member.value)?;
            members.push(StructMember {
                name: member.name.text.clone(),
                member_type: value.ty.clone(),
            });
            values.push(value);
        }

        let ty = Type::UndeterminedStruct { members };

        if values.iter().all(|value| value.constant().is_some()) {
            let constants = values
                .into_iter()
                .map(|value| match value.value {
                    RuntimeValue::Constant(constant) => constant,
                    _ => unreachable!("checked constant"),
                })
                .collect();
            Ok(TypedRuntimeValue {
                ty,
                value: RuntimeValue::Constant(ConstantValue::Struct(constants)),
            })
        } else {
            Ok(TypedRuntimeValue {
                ty,
                value: RuntimeValue::UndeterminedStruct(values),
            })
        }
    }

    // ── Binary and unary operations ──────────────────────────────

    fn generate_binary_operation(
        &mut self,
        instructions: &mut Vec<Instruction>,
        range: FileRange,
        operator: BinaryOperator,
        left_expression: &Expression,
        right_expression: &Expression,
    ) -> CompileResult<TypedRuntimeValue> {
        let left = self.generate_expression(instructions, left_expression)?;
        let right = self.generate_expression(instructions, right_expression)?;

        if let (Some(left_constant), Some(right_constant)) = (left.constant(), right.constant()) {
            let scope = self.scope();
            let result = evaluate_constant_binary_operation(
                &self.info,
                &scope,
                range,
                operator,
                left_expression.range,
                &left.ty,
                left_constant,
                right_expression.range,
                &right.ty,
                right_constant,
            )?;
            return Ok(TypedRuntimeValue {
                ty: result.ty,
                value: RuntimeValue::Constant(result.value),
            });
        }

        let scope = self.scope();
        let operation_type = determine_binary_operation_type(&scope, range, &left.ty, &right.ty)?;

        let left_register =
            self.coerce_to_register(instructions, left_expression.range, &left, &operation_type)?;
        let right_register =
            self.coerce_to_register(instructions, right_expression.range, &right, &operation_type)?;

        let arithmetic = |codegen: &mut Self,
                          instructions: &mut Vec<Instruction>,
                          operation: IntegerArithmeticOperation,
                          size: RegisterSize|
         -> usize {
            let destination = codegen.allocate_register();
            instructions.push(Instruction::IntegerArithmetic {
                operation,
                size,
                source_a: left_register,
                source_b: right_register,
                destination,
            });
            destination
        };
        let comparison = |codegen: &mut Self,
                          instructions: &mut Vec<Instruction>,
                          operation: IntegerComparisonOperation,
                          size: RegisterSize|
         -> usize {
            let destination = codegen.allocate_register();
            instructions.push(Instruction::IntegerComparison {
                operation,
                size,
                source_a: left_register,
                source_b: right_register,
                destination,
            });
            destination
        };

        match &operation_type {
            Type::Integer { size, is_signed } => {
                use IntegerArithmeticOperation as Arith;
                use IntegerComparisonOperation as Cmp;

                let (register, ty) = match operator {
                    BinaryOperator::Addition => {
                        (arithmetic(self, instructions, Arith::Add, *size), operation_type.clone())
                    }
                    BinaryOperator::Subtraction => (
                        arithmetic(self, instructions, Arith::Subtract, *size),
                        operation_type.clone(),
                    ),
                    BinaryOperator::Multiplication => (
                        arithmetic(self, instructions, Arith::Multiply, *size),
                        operation_type.clone(),
                    ),
                    BinaryOperator::Division => {
                        let operation = if *is_signed {
                            Arith::SignedDivide
                        } else {
                            Arith::UnsignedDivide
                        };
                        (arithmetic(self, instructions, operation, *size), operation_type.clone())
                    }
                    BinaryOperator::Modulo => {
                        let operation = if *is_signed {
                            Arith::SignedModulus
                        } else {
                            Arith::UnsignedModulus
                        };
                        (arithmetic(self, instructions, operation, *size), operation_type.clone())
                    }
                    BinaryOperator::BitwiseAnd => (
                        arithmetic(self, instructions, Arith::BitwiseAnd, *size),
                        operation_type.clone(),
                    ),
                    BinaryOperator::BitwiseOr => (
                        arithmetic(self, instructions, Arith::BitwiseOr, *size),
                        operation_type.clone(),
                    ),
                    BinaryOperator::Equal => {
                        (comparison(self, instructions, Cmp::Equal, *size), Type::Boolean)
                    }
                    BinaryOperator::NotEqual => {
                        let equal = comparison(self, instructions, Cmp::Equal, *size);
                        (self.append_boolean_invert(instructions, equal), Type::Boolean)
                    }
                    BinaryOperator::LessThan => {
                        let operation = if *is_signed {
                            Cmp::SignedLessThan
                        } else {
                            Cmp::UnsignedLessThan
                        };
                        (comparison(self, instructions, operation, *size), Type::Boolean)
                    }
                    BinaryOperator::GreaterThan => {
                        let operation = if *is_signed {
                            Cmp::SignedGreaterThan
                        } else {
                            Cmp::UnsignedGreaterThan
                        };
                        (comparison(self, instructions, operation, *size), Type::Boolean)
                    }
                    _ => {
                        return Err(self.error(
                            range,
                            "Cannot perform that operation on integers".to_string(),
                        ));
                    }
                };
                Ok(TypedRuntimeValue {
                    ty,
                    value: RuntimeValue::Register(register),
                })
            }

            Type::Boolean => {
                use IntegerArithmeticOperation as Arith;
                let size = self.info.default_integer_size;

                let register = match operator {
                    BinaryOperator::BooleanAnd => {
                        arithmetic(self, instructions, Arith::BitwiseAnd, size)
                    }
                    BinaryOperator::BooleanOr => {
                        arithmetic(self, instructions, Arith::BitwiseOr, size)
                    }
                    BinaryOperator::Equal => {
                        comparison(self, instructions, IntegerComparisonOperation::Equal, size)
                    }
                    BinaryOperator::NotEqual => {
                        let equal = comparison(
                            self,
                            instructions,
                            IntegerComparisonOperation::Equal,
                            size,
                        );
                        self.append_boolean_invert(instructions, equal)
                    }
                    _ => {
                        return Err(self.error(
                            range,
                            "Cannot perform that operation on booleans".to_string(),
                        ));
                    }
                };
                Ok(TypedRuntimeValue {
                    ty: Type::Boolean,
                    value: RuntimeValue::Register(register),
                })
            }

            Type::Float { size } => {
                use FloatArithmeticOperation as Arith;
                use FloatComparisonOperation as Cmp;

                let float_arithmetic = |codegen: &mut Self,
                                        instructions: &mut Vec<Instruction>,
                                        operation: Arith|
                 -> usize {
                    let destination = codegen.allocate_register();
                    instructions.push(Instruction::FloatArithmetic {
                        operation,
                        size: *size,
                        source_a: left_register,
                        source_b: right_register,
                        destination,
                    });
                    destination
                };
                let float_comparison = |codegen: &mut Self,
                                        instructions: &mut Vec<Instruction>,
                                        operation: Cmp|
                 -> usize {
                    let destination = codegen.allocate_register();
                    instructions.push(Instruction::FloatComparison {
                        operation,
                        size: *size,
                        source_a: left_register,
                        source_b: right_register,
                        destination,
                    });
                    destination
                };

                let (register, ty) = match operator {
                    BinaryOperator::Addition => {
                        (float_arithmetic(self, instructions, Arith::Add), operation_type.clone())
                    }
                    BinaryOperator::Subtraction => (
                        float_arithmetic(self, instructions, Arith::Subtract),
                        operation_type.clone(),
                    ),
                    BinaryOperator::Multiplication => (
                        float_arithmetic(self, instructions, Arith::Multiply),
                        operation_type.clone(),
                    ),
                    BinaryOperator::Division => (
                        float_arithmetic(self, instructions, Arith::Divide),
                        operation_type.clone(),
                    ),
                    BinaryOperator::Equal => {
                        (float_comparison(self, instructions, Cmp::Equal), Type::Boolean)
                    }
                    BinaryOperator::NotEqual => {
                        let equal = float_comparison(self, instructions, Cmp::Equal);
                        (self.append_boolean_invert(instructions, equal), Type::Boolean)
                    }
                    BinaryOperator::LessThan => {
                        (float_comparison(self, instructions, Cmp::LessThan), Type::Boolean)
                    }
                    BinaryOperator::GreaterThan => {
                        (float_comparison(self, instructions, Cmp::GreaterThan), Type::Boolean)
                    }
                    _ => {
                        return Err(self.error(
                            range,
                            "Cannot perform that operation on floats".to_string(),
                        ));
                    }
                };
                Ok(TypedRuntimeValue {
                    ty,
                    value: RuntimeValue::Register(register),
                })
            }

            Type::Pointer(_) => {
                let size = self.info.address_integer_size;
                let register = match operator {
                    BinaryOperator::Equal => {
                        comparison(self, instructions, IntegerComparisonOperation::Equal, size)
                    }
                    BinaryOperator::NotEqual => {
                        let equal = comparison(
                            self,
                            instructions,
                            IntegerComparisonOperation::Equal,
                            size,
                        );
                        self.append_boolean_invert(instructions, equal)
                    }
                    _ => {
                        return Err(self.error(
                            range,
                            "Cannot perform that operation on pointers".to_string(),
                        ));
                    }
                };
                Ok(TypedRuntimeValue {
                    ty: Type::Boolean,
                    value: RuntimeValue::Register(register),
                })
            }

            other => Err(self.error(
                range,
                format!("Cannot perform binary operations on '{}'", other),
            )),
        }
    }

    fn generate_unary_operation(
        &mut self,
        instructions: &mut Vec<Instruction>,
        range: FileRange,
        operator: UnaryOperator,
        operand: &Expression,
    ) -> CompileResult<TypedRuntimeValue> {
        let operand_value = self.generate_expression(instructions, operand)?;

        match operator {
            UnaryOperator::Pointer => {
                if let Type::TypeType = operand_value.ty {
                    let pointee = match operand_value.constant() {
                        Some(constant) => constant.unwrap_type().clone(),
                        None => unreachable!("type values are always constant"),
                    };
                    if !pointee.is_runtime_type()
                        && !matches!(pointee, Type::Void | Type::FunctionType { .. })
                    {
                        return Err(self.error(
                            operand.range,
                            format!("Cannot create pointers to type '{}'", pointee),
                        ));
                    }
                    return Ok(TypedRuntimeValue {
                        ty: Type::TypeType,
                        value: RuntimeValue::Constant(ConstantValue::Type(Type::Pointer(
                            Box::new(pointee),
                        ))),
                    });
                }

                match operand_value.value {
                    RuntimeValue::Address(address_register) => Ok(TypedRuntimeValue {
                        ty: Type::Pointer(Box::new(operand_value.ty)),
                        value: RuntimeValue::Register(address_register),
                    }),
                    _ => Err(self.error(
                        range,
                        "Cannot take the address of a non-addressable value".to_string(),
                    )),
                }
            }

            UnaryOperator::PointerDereference => match operand_value.ty.clone() {
                Type::Pointer(pointee) => {
                    let register =
                        self.generate_register_value(instructions, operand.range, &operand_value)?;
                    Ok(TypedRuntimeValue {
                        ty: *pointee,
                        value: RuntimeValue::Address(register),
                    })
                }
                other => Err(self.error(operand.range, format!("Cannot dereference '{}'", other))),
            },

            UnaryOperator::BooleanInvert => {
                if let Some(constant) = operand_value.constant() {
                    if !matches!(operand_value.ty, Type::Boolean) {
                        return Err(self.error(
                            operand.range,
                            format!("Expected a boolean, got '{}'", operand_value.ty),
                        ));
                    }
                    return Ok(TypedRuntimeValue {
                        ty: Type::Boolean,
                        value: RuntimeValue::Constant(ConstantValue::Boolean(
                            !constant.unwrap_boolean(),
                        )),
                    });
                }

                if !matches!(operand_value.ty, Type::Boolean) {
                    return Err(self.error(
                        operand.range,
                        format!("Expected a boolean, got '{}'", operand_value.ty),
                    ));
                }
                let register =
                    self.generate_register_value(instructions, operand.range, &operand_value)?;
                let inverted = self.append_boolean_invert(instructions, register);
                Ok(TypedRuntimeValue {
                    ty: Type::Boolean,
                    value: RuntimeValue::Register(inverted),
                })
            }

            UnaryOperator::Negation => {
                if operand_value.constant().is_some() {
                    let scope = self.scope();
                    let result =
                        evaluate_constant_expression_negation(&scope, operand, &operand_value)?;
                    return Ok(result);
                }

                match operand_value.ty.clone() {
                    Type::Integer { size, .. } => {
                        let zero = self.append_integer_constant(instructions, size, 0);
                        let register = self.generate_register_value(
                            instructions,
                            operand.range,
                            &operand_value,
                        )?;
                        let destination = self.allocate_register();
                        instructions.push(Instruction::IntegerArithmetic {
                            operation: IntegerArithmeticOperation::Subtract,
                            size,
                            source_a: zero,
                            source_b: register,
                            destination,
                        });
                        Ok(TypedRuntimeValue {
                            ty: operand_value.ty,
                            value: RuntimeValue::Register(destination),
                        })
                    }
                    Type::Float { size } => {
                        let zero = self.append_float_constant(instructions, size, 0.0);
                        let register = self.generate_register_value(
                            instructions,
                            operand.range,
                            &operand_value,
                        )?;
                        let destination = self.allocate_register();
                        instructions.push(Instruction::FloatArithmetic {
                            operation: FloatArithmeticOperation::Subtract,
                            size,
                            source_a: zero,
                            source_b: register,
                            destination,
                        });
                        Ok(TypedRuntimeValue {
                            ty: operand_value.ty,
                            value: RuntimeValue::Register(destination),
                        })
                    }
                    other => {
                        Err(self.error(operand.range, format!("Cannot negate '{}'", other)))
                    }
                }
            }
        }
    }

    // ── Casts ────────────────────────────────────────────────────

    fn generate_cast(
        &mut self,
        instructions: &mut Vec<Instruction>,
        operand: &Expression,
        target: &Expression,
    ) -> CompileResult<TypedRuntimeValue> {
        let operand_value = self.generate_expression(instructions, operand)?;
        let scope = self.scope();
        let target_type = evaluate_type_expression(&self.info, &scope, &mut self.files, target)?;

        if let Some(constant) = operand_value.constant() {
            let value = evaluate_constant_cast(
                &self.info,
                &scope,
                &operand_value.ty,
                constant,
                operand.range,
                &target_type,
                target.range,
            )?;
            return Ok(TypedRuntimeValue {
                ty: target_type,
                value: RuntimeValue::Constant(value),
            });
        }

        // An implicit coercion is always an acceptable cast.
        if let Ok(register) =
            self.coerce_to_register(instructions, operand.range, &operand_value, &target_type)
        {
            return Ok(TypedRuntimeValue {
                ty: target_type,
                value: RuntimeValue::Register(register),
            });
        }

        let cast_error_message = format!(
            "Cannot cast from '{}' to '{}'",
            operand_value.ty, target_type
        );

        let source_register =
            self.generate_register_value(instructions, operand.range, &operand_value)?;

        let result_register = match (&operand_value.ty, &target_type) {
            (
                Type::Integer { size, is_signed },
                Type::Integer {
                    size: target_size,
                    is_signed: target_signed,
                },
            ) => {
                if target_size > size {
                    let destination = self.allocate_register();
                    instructions.push(Instruction::IntegerUpcast {
                        is_signed: *is_signed && *target_signed,
                        source_size: *size,
                        source: source_register,
                        destination_size: *target_size,
                        destination,
                    });
                    destination
                } else {
                    source_register
                }
            }

            (Type::Integer { size, is_signed }, Type::Float { size: target_size }) => {
                let destination = self.allocate_register();
                instructions.push(Instruction::FloatFromInteger {
                    is_signed: *is_signed,
                    integer_size: *size,
                    source: source_register,
                    float_size: *target_size,
                    destination,
                });
                destination
            }

            (Type::Integer { size, .. }, Type::Pointer(_)) => {
                if *size == self.info.address_integer_size {
                    source_register
                } else {
                    return Err(self.error(operand.range, cast_error_message));
                }
            }

            (Type::Float { size }, Type::Integer { size: target_size, .. }) => {
                let destination = self.allocate_register();
                instructions.push(Instruction::FloatTruncation {
                    float_size: *size,
                    source: source_register,
                    integer_size: *target_size,
                    destination,
                });
                destination
            }

            (Type::Float { size }, Type::Float { size: target_size }) => {
                if size == target_size {
                    source_register
                } else {
                    let destination = self.allocate_register();
                    instructions.push(Instruction::FloatConversion {
                        source_size: *size,
                        source: source_register,
                        destination_size: *target_size,
                        destination,
                    });
                    destination
                }
            }

            (Type::Pointer(_), Type::Integer { size, .. }) => {
                if *size == self.info.address_integer_size {
                    source_register
                } else {
                    return Err(self.error(operand.range, cast_error_message));
                }
            }

            (Type::Pointer(_), Type::Pointer(_)) => source_register,

            _ => return Err(self.error(operand.range, cast_error_message)),
        };

        Ok(TypedRuntimeValue {
            ty: target_type,
            value: RuntimeValue::Register(result_register),
        })
    }

    // ── Function calls ───────────────────────────────────────────

    fn generate_function_call(
        &mut self,
        instructions: &mut Vec<Instruction>,
        range: FileRange,
        callee: &Expression,
        arguments: &[Expression],
    ) -> CompileResult<TypedRuntimeValue> {
        let callee_value = self.generate_expression(instructions, callee)?;

        match callee_value.ty.clone() {
            Type::FunctionType {
                parameters,
                return_type,
            } => {
                let function = match callee_value.constant() {
                    Some(ConstantValue::Function(function)) => function.clone(),
                    _ => {
                        return Err(self.error(
                            callee.range,
                            "Cannot call a non-constant function value".to_string(),
                        ));
                    }
                };

                if arguments.len() != parameters.len() {
                    return Err(self.error(
                        range,
                        format!(
                            "Incorrect number of parameters. Expected {}, got {}",
                            parameters.len(),
                            arguments.len()
                        ),
                    ));
                }

                let mut argument_registers = Vec::with_capacity(arguments.len() + 1);
                for (argument, parameter_type) in arguments.iter().zip(&parameters) {
                    let value = self.generate_expression(instructions, argument)?;
                    let register =
                        self.coerce_to_register(instructions, argument.range, &value, parameter_type)?;
                    argument_registers.push(register);
                }

                let mangled_name = self.register_function_reference(
                    &function,
                    &parameters,
                    &return_type,
                    range,
                )?;

                self.emit_call(
                    instructions,
                    mangled_name,
                    argument_registers,
                    &return_type,
                )
            }

            Type::PolymorphicFunction => {
                let function = match callee_value.constant() {
                    Some(ConstantValue::Function(function)) => function.clone(),
                    _ => unreachable!("polymorphic functions are always constant"),
                };
                self.generate_polymorphic_call(instructions, range, &function, arguments)
            }

            Type::BuiltinFunction => {
                let builtin_name = match callee_value.constant() {
                    Some(ConstantValue::BuiltinFunction(name)) => name.clone(),
                    _ => unreachable!("expected a builtin constant"),
                };
                self.generate_builtin_call(instructions, range, &builtin_name, arguments)
            }

            Type::TypeType => {
                let ty = match callee_value.constant() {
                    Some(constant) => constant.unwrap_type().clone(),
                    None => unreachable!("type values are always constant"),
                };
                match ty {
                    Type::PolymorphicStruct(polymorphic_struct) => {
                        let mut constant_arguments = Vec::with_capacity(arguments.len());
                        for argument in arguments {
                            let value = self.generate_expression(instructions, argument)?;
                            let constant = match value.constant() {
                                Some(constant) => constant.clone(),
                                None => {
                                    return Err(self.error(
                                        argument.range,
                                        "Struct parameters must be constant".to_string(),
                                    ));
                                }
                            };
                            constant_arguments.push((
                                TypedConstantValue {
                                    ty: value.ty,
                                    value: constant,
                                },
                                argument.range,
                            ));
                        }
                        let scope = self.scope();
                        let instantiated = instantiate_polymorphic_struct(
                            &self.info,
                            &scope,
                            &mut self.files,
                            &polymorphic_struct,
                            &constant_arguments,
                            range,
                        )?;
                        Ok(TypedRuntimeValue {
                            ty: Type::TypeType,
                            value: RuntimeValue::Constant(ConstantValue::Type(instantiated)),
                        })
                    }
                    other => Err(self.error(
                        callee.range,
                        format!("Type '{}' is not polymorphic", other),
                    )),
                }
            }

            other => Err(self.error(callee.range, format!("Cannot call non-function '{}'", other))),
        }
    }

    /// Bind a fresh set of constant parameters from the call site, type the
    /// remaining runtime parameters under the new scope, and register the
    /// instantiation (reusing a cached one when the constant argument tuple
    /// matches).
    fn generate_polymorphic_call(
        &mut self,
        instructions: &mut Vec<Instruction>,
        range: FileRange,
        function: &FunctionConstant,
        arguments: &[Expression],
    ) -> CompileResult<TypedRuntimeValue> {
        let declaration = function.declaration().clone();

        if arguments.len() != declaration.parameters.len() {
            return Err(self.error(
                range,
                format!(
                    "Incorrect number of parameters. Expected {}, got {}",
                    declaration.parameters.len(),
                    arguments.len()
                ),
            ));
        }

        let mut bound: Vec<ConstantParameter> = Vec::new();
        let mut runtime_slots: Vec<Option<(RuntimeParameter, usize)>> =
            vec![None; declaration.parameters.len()];

        // Polymorphic determiners first: each binds its type parameter from
        // the (defaulted) argument type.
        for (i, parameter) in declaration.parameters.iter().enumerate() {
            let determiner = match &parameter.kind {
                ParameterKind::PolymorphicDeterminer(determiner) => determiner,
                ParameterKind::Typed(_) => continue,
            };

            if bound.iter().any(|existing| existing.name == determiner.text) {
                return Err(self.error(
                    determiner.range,
                    format!("Duplicate polymorphic parameter {}", determiner.text),
                ));
            }

            let argument_value = self.generate_expression(instructions, &arguments[i])?;
            let scope = self.scope();
            let determined = coerce_to_default_type(
                &self.info,
                &scope,
                arguments[i].range,
                &argument_value.ty,
            )?;

            bound.push(ConstantParameter {
                name: determiner.text.clone(),
                parameter_type: Type::TypeType,
                value: ConstantValue::Type(determined.clone()),
            });

            if parameter.is_constant {
                let constant = match argument_value.constant() {
                    Some(constant) => constant.clone(),
                    None => {
                        return Err(self.error(
                            arguments[i].range,
                            format!(
                                "Value of constant parameter '{}' must be a constant",
                                parameter.name.text
                            ),
                        ));
                    }
                };
                let coerced = coerce_constant_to_type(
                    &self.info,
                    &scope,
                    arguments[i].range,
                    &argument_value.ty,
                    &constant,
                    &determined,
                )?;
                bound.push(ConstantParameter {
                    name: parameter.name.text.clone(),
                    parameter_type: determined,
                    value: coerced,
                });
            } else {
                let register = self.coerce_to_register(
                    instructions,
                    arguments[i].range,
                    &argument_value,
                    &determined,
                )?;
                runtime_slots[i] = Some((
                    RuntimeParameter {
                        name: parameter.name.clone(),
                        parameter_type: determined,
                    },
                    register,
                ));
            }
        }

        // Constant parameters with explicit types.
        for (i, parameter) in declaration.parameters.iter().enumerate() {
            let type_expression = match &parameter.kind {
                ParameterKind::Typed(type_expression) if parameter.is_constant => type_expression,
                _ => continue,
            };

            let binding_scope = ConstantScope::child(
                &function.parent,
                &declaration.name.text,
                Rc::new(Vec::new()),
                bound.clone(),
            );
            let parameter_type = evaluate_type_expression(
                &self.info,
                &binding_scope,
                &mut self.files,
                type_expression,
            )?;

            let argument_value = self.generate_expression(instructions, &arguments[i])?;
            let constant = match argument_value.constant() {
                Some(constant) => constant.clone(),
                None => {
                    return Err(self.error(
                        arguments[i].range,
                        format!(
                            "Value of constant parameter '{}' must be a constant",
                            parameter.name.text
                        ),
                    ));
                }
            };
            let coerced = coerce_constant_to_type(
                &self.info,
                &binding_scope,
                arguments[i].range,
                &argument_value.ty,
                &constant,
                &parameter_type,
            )?;
            bound.push(ConstantParameter {
                name: parameter.name.text.clone(),
                parameter_type,
                value: coerced,
            });
        }

        // Remaining runtime parameters, typed under the new bindings.
        for (i, parameter) in declaration.parameters.iter().enumerate() {
            let type_expression = match &parameter.kind {
                ParameterKind::Typed(type_expression) if !parameter.is_constant => type_expression,
                _ => continue,
            };

            let binding_scope = ConstantScope::child(
                &function.parent,
                &declaration.name.text,
                Rc::new(Vec::new()),
                bound.clone(),
            );
            let parameter_type = evaluate_type_expression(
                &self.info,
                &binding_scope,
                &mut self.files,
                type_expression,
            )?;
            if !parameter_type.is_runtime_type() {
                return Err(self.error(
                    type_expression.range,
                    format!("Function parameters cannot be of type '{}'", parameter_type),
                ));
            }

            let argument_value = self.generate_expression(instructions, &arguments[i])?;
            let register = self.coerce_to_register(
                instructions,
                arguments[i].range,
                &argument_value,
                &parameter_type,
            )?;
            runtime_slots[i] = Some((
                RuntimeParameter {
                    name: parameter.name.clone(),
                    parameter_type,
                },
                register,
            ));
        }

        let binding_scope = ConstantScope::child(
            &function.parent,
            &declaration.name.text,
            Rc::new(Vec::new()),
            bound.clone(),
        );
        let return_type = match &declaration.return_type {
            Some(return_expression) => {
                let return_type = evaluate_type_expression(
                    &self.info,
                    &binding_scope,
                    &mut self.files,
                    return_expression,
                )?;
                if !return_type.is_runtime_type() {
                    return Err(self.error(
                        return_expression.range,
                        format!("Function returns cannot be of type '{}'", return_type),
                    ));
                }
                return_type
            }
            None => Type::Void,
        };

        let mut runtime_parameters = Vec::new();
        let mut argument_registers = Vec::new();
        for slot in runtime_slots.into_iter().flatten() {
            runtime_parameters.push(slot.0);
            argument_registers.push(slot.1);
        }

        let mangled_name = self.register_instantiation(
            function,
            bound,
            runtime_parameters,
            return_type.clone(),
            range,
        )?;

        self.emit_call(instructions, mangled_name, argument_registers, &return_type)
    }

    fn emit_call(
        &mut self,
        instructions: &mut Vec<Instruction>,
        function_name: String,
        mut argument_registers: Vec<usize>,
        return_type: &Type,
    ) -> CompileResult<TypedRuntimeValue> {
        if matches!(return_type, Type::Void) {
            instructions.push(Instruction::FunctionCall {
                function_name,
                parameter_registers: argument_registers,
                return_register: None,
            });
            return Ok(TypedRuntimeValue {
                ty: Type::Void,
                value: RuntimeValue::Constant(ConstantValue::Void),
            });
        }

        let representation = type_representation(&self.info, return_type);
        if representation.is_in_register {
            let return_register = self.allocate_register();
            instructions.push(Instruction::FunctionCall {
                function_name,
                parameter_registers: argument_registers,
                return_register: Some(return_register),
            });
            Ok(TypedRuntimeValue {
                ty: return_type.clone(),
                value: RuntimeValue::Register(return_register),
            })
        } else {
            // Aggregate return: the callee writes through a caller-provided
            // address passed as a trailing parameter.
            let size = type_size(&self.info, return_type);
            let alignment = type_alignment(&self.info, return_type);
            let return_local = self.append_allocate_local(instructions, size, alignment);
            argument_registers.push(return_local);
            instructions.push(Instruction::FunctionCall {
                function_name,
                parameter_registers: argument_registers,
                return_register: None,
            });
            Ok(TypedRuntimeValue {
                ty: return_type.clone(),
                value: RuntimeValue::Address(return_local),
            })
        }
    }

    fn generate_builtin_call(
        &mut self,
        instructions: &mut Vec<Instruction>,
        range: FileRange,
        builtin_name: &str,
        arguments: &[Expression],
    ) -> CompileResult<TypedRuntimeValue> {
        if arguments.len() != 1 {
            return Err(self.error(
                range,
                format!("Incorrect parameter count. Expected 1 got {}", arguments.len()),
            ));
        }

        let argument_value = self.generate_expression(instructions, &arguments[0])?;

        match builtin_name {
            "size_of" => {
                let ty = match &argument_value.ty {
                    Type::TypeType => match argument_value.constant() {
                        Some(constant) => constant.unwrap_type().clone(),
                        None => unreachable!("type values are always constant"),
                    },
                    other => other.clone(),
                };

                if !ty.is_runtime_type() {
                    return Err(
                        self.error(arguments[0].range, format!("'{}' has no size", ty))
                    );
                }

                Ok(TypedRuntimeValue {
                    ty: self.usize_type(),
                    value: RuntimeValue::Constant(ConstantValue::Integer(type_size(
                        &self.info, &ty,
                    ))),
                })
            }

            "type_of" => Ok(TypedRuntimeValue {
                ty: Type::TypeType,
                value: RuntimeValue::Constant(ConstantValue::Type(argument_value.ty)),
            }),

            _ => unreachable!("unknown builtin '{}'", builtin_name),
        }
    }
}

/// Constant negation shared with the evaluator's unary handling.
fn evaluate_constant_expression_negation(
    scope: &Rc<ConstantScope>,
    operand: &Expression,
    operand_value: &TypedRuntimeValue,
) -> CompileResult<TypedRuntimeValue> {
    let constant = operand_value
        .constant()
        .expect("caller checked the operand is constant");

    match &operand_value.ty {
        Type::Integer { .. } | Type::UndeterminedInteger => Ok(TypedRuntimeValue {
            ty: operand_value.ty.clone(),
            value: RuntimeValue::Constant(ConstantValue::Integer(
                constant.unwrap_integer().wrapping_neg(),
            )),
        }),
        Type::Float { .. } | Type::UndeterminedFloat => Ok(TypedRuntimeValue {
            ty: operand_value.ty.clone(),
            value: RuntimeValue::Constant(ConstantValue::Float(-constant.unwrap_float())),
        }),
        other => Err(error(
            scope,
            operand.range,
            format!("Cannot negate '{}'", other),
        )),
    }
}
