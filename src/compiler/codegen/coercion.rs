//! Runtime half of the coercion engine. Same rules as the constant half:
//! constants are routed through it and then materialised, so the two modes
//! cannot drift. Scalar targets produce a register; aggregate targets are
//! written through a destination address.

use super::{Codegen, RuntimeValue, TypedRuntimeValue};
use crate::compiler::constant::*;
use crate::compiler::diagnostics::CompileResult;
use crate::compiler::ir::Instruction;
use crate::compiler::span::FileRange;
use crate::compiler::types::*;

impl Codegen {
    /// Coerce into a register: scalars yield the value register, aggregates
    /// yield their storage address (laying down a local when the rule calls
    /// for one, e.g. the static-array-to-slice auto-wrap).
    pub fn coerce_to_register(
        &mut self,
        instructions: &mut Vec<Instruction>,
        range: FileRange,
        value: &TypedRuntimeValue,
        target: &Type,
    ) -> CompileResult<usize> {
        match target {
            Type::ArraySlice { element_type } => match &value.ty {
                Type::ArraySlice {
                    element_type: source_element,
                } if source_element == element_type => {
                    self.generate_register_value(instructions, range, value)
                }

                Type::StaticArray {
                    length,
                    element_type: source_element,
                } if source_element == element_type => {
                    let source_address = self.generate_register_value(instructions, range, value)?;
                    let length = *length;
                    Ok(self.wrap_into_slice(instructions, source_address, length))
                }

                Type::UndeterminedStruct { members }
                    if members.len() == 2
                        && members[0].name == "pointer"
                        && members[1].name == "length" =>
                {
                    let member_values = self.undetermined_struct_members(value);
                    let word = self.info.address_integer_size;
                    let slice_size = 2 * word.byte_size();
                    let local = self.append_allocate_local(instructions, slice_size, word.byte_size());

                    let pointer_target = Type::Pointer(element_type.clone());
                    let pointer_register =
                        self.coerce_to_register(instructions, range, &member_values[0], &pointer_target)?;
                    let pointer_representation = type_representation(&self.info, &pointer_target);
                    self.append_store_scalar(
                        instructions,
                        pointer_representation,
                        pointer_register,
                        local,
                    );

                    let length_register = self.coerce_to_register(
                        instructions,
                        range,
                        &member_values[1],
                        &self.usize_type(),
                    )?;
                    let length_address =
                        self.append_address_offset(instructions, local, word.byte_size());
                    self.append_store_scalar(
                        instructions,
                        type_representation(&self.info, &self.usize_type()),
                        length_register,
                        length_address,
                    );

                    Ok(local)
                }

                _ => Err(self.conversion_error(range, &value.ty, target)),
            },

            Type::StaticArray { .. } => {
                if value.ty == *target {
                    self.generate_register_value(instructions, range, value)
                } else {
                    Err(self.conversion_error(range, &value.ty, target))
                }
            }

            Type::Struct(struct_type) => {
                if value.ty == *target {
                    self.generate_register_value(instructions, range, value)
                } else if matches!(value.ty, Type::UndeterminedStruct { .. }) {
                    let size = struct_size(&self.info, struct_type);
                    let alignment = struct_alignment(&self.info, struct_type);
                    let local = self.append_allocate_local(instructions, size, alignment);
                    self.coerce_to_type_write(instructions, range, value, target, local)?;
                    Ok(local)
                } else {
                    Err(self.conversion_error(range, &value.ty, target))
                }
            }

            // Scalar targets.
            _ => {
                if let Some(constant) = value.constant() {
                    let scope = self.scope();
                    let coerced = coerce_constant_to_type(
                        &self.info,
                        &scope,
                        range,
                        &value.ty,
                        constant,
                        target,
                    )?;
                    return Ok(self.append_scalar_constant(instructions, target, &coerced));
                }

                let compatible = match (target, &value.ty) {
                    (
                        Type::Integer {
                            size: target_size,
                            is_signed: target_signed,
                        },
                        Type::Integer { size, is_signed },
                    ) => size == target_size && is_signed == target_signed,
                    (Type::Boolean, Type::Boolean) => true,
                    (Type::Float { size: target_size }, Type::Float { size }) => {
                        size == target_size
                    }
                    (Type::Pointer(target_pointee), Type::Pointer(pointee)) => {
                        pointee == target_pointee
                    }
                    _ => value.ty == *target,
                };

                if compatible {
                    self.generate_register_value(instructions, range, value)
                } else {
                    Err(self.conversion_error(range, &value.ty, target))
                }
            }
        }
    }

    /// Coerce and write to a destination address. Scalars store through the
    /// address; aggregates copy or are assembled field by field.
    pub fn coerce_to_type_write(
        &mut self,
        instructions: &mut Vec<Instruction>,
        range: FileRange,
        value: &TypedRuntimeValue,
        target: &Type,
        address_register: usize,
    ) -> CompileResult<()> {
        match target {
            Type::ArraySlice { element_type } => match &value.ty {
                Type::ArraySlice {
                    element_type: source_element,
                } if source_element == element_type => {
                    let source_address = self.generate_register_value(instructions, range, value)?;
                    let word = self.info.address_integer_size.byte_size();
                    instructions.push(Instruction::CopyMemory {
                        length: 2 * word,
                        source_address_register: source_address,
                        destination_address_register: address_register,
                    });
                    Ok(())
                }

                Type::StaticArray {
                    length,
                    element_type: source_element,
                } if source_element == element_type => {
                    // Auto-wrap: the data pointer goes into word 0, the
                    // length into word 1.
                    let length = *length;
                    let source_address = self.generate_register_value(instructions, range, value)?;
                    let word = self.info.address_integer_size;
                    let pointer_representation =
                        type_representation(&self.info, &Type::Pointer(element_type.clone()));
                    self.append_store_scalar(
                        instructions,
                        pointer_representation,
                        source_address,
                        address_register,
                    );
                    let length_register =
                        self.append_integer_constant(instructions, word, length);
                    let length_address =
                        self.append_address_offset(instructions, address_register, word.byte_size());
                    self.append_store_scalar(
                        instructions,
                        type_representation(&self.info, &self.usize_type()),
                        length_register,
                        length_address,
                    );
                    Ok(())
                }

                Type::UndeterminedStruct { members }
                    if members.len() == 2
                        && members[0].name == "pointer"
                        && members[1].name == "length" =>
                {
                    let member_values = self.undetermined_struct_members(value);
                    let word = self.info.address_integer_size;

                    let pointer_target = Type::Pointer(element_type.clone());
                    let pointer_register =
                        self.coerce_to_register(instructions, range, &member_values[0], &pointer_target)?;
                    self.append_store_scalar(
                        instructions,
                        type_representation(&self.info, &pointer_target),
                        pointer_register,
                        address_register,
                    );

                    let length_register = self.coerce_to_register(
                        instructions,
                        range,
                        &member_values[1],
                        &self.usize_type(),
                    )?;
                    let length_address =
                        self.append_address_offset(instructions, address_register, word.byte_size());
                    self.append_store_scalar(
                        instructions,
                        type_representation(&self.info, &self.usize_type()),
                        length_register,
                        length_address,
                    );
                    Ok(())
                }

                _ => Err(self.conversion_error(range, &value.ty, target)),
            },

            Type::StaticArray { .. } => {
                if value.ty == *target {
                    let source_address = self.generate_register_value(instructions, range, value)?;
                    instructions.push(Instruction::CopyMemory {
                        length: type_size(&self.info, target),
                        source_address_register: source_address,
                        destination_address_register: address_register,
                    });
                    Ok(())
                } else {
                    Err(self.conversion_error(range, &value.ty, target))
                }
            }

            Type::Struct(struct_type) => {
                if value.ty == *target {
                    let source_address = self.generate_register_value(instructions, range, value)?;
                    instructions.push(Instruction::CopyMemory {
                        length: struct_size(&self.info, struct_type),
                        source_address_register: source_address,
                        destination_address_register: address_register,
                    });
                    return Ok(());
                }

                let members = match &value.ty {
                    Type::UndeterminedStruct { members } => members.clone(),
                    _ => return Err(self.conversion_error(range, &value.ty, target)),
                };
                let member_values = self.undetermined_struct_members(value);

                if struct_type.is_union() {
                    // A union literal names exactly one member; it lands at
                    // offset zero.
                    if members.len() == 1 {
                        for declared in &struct_type.members {
                            if declared.name == members[0].name {
                                return self.coerce_to_type_write(
                                    instructions,
                                    range,
                                    &member_values[0],
                                    &declared.member_type.clone(),
                                    address_register,
                                );
                            }
                        }
                    }
                    return Err(self.conversion_error(range, &value.ty, target));
                }

                if members.len() != struct_type.members.len()
                    || members
                        .iter()
                        .zip(&struct_type.members)
                        .any(|(a, b)| a.name != b.name)
                {
                    return Err(self.conversion_error(range, &value.ty, target));
                }

                for (i, member_value) in member_values.iter().enumerate() {
                    let member_type = struct_type.members[i].member_type.clone();
                    let offset = struct_member_offset(&self.info, struct_type, i);
                    let member_address =
                        self.append_address_offset(instructions, address_register, offset);
                    self.coerce_to_type_write(
                        instructions,
                        range,
                        member_value,
                        &member_type,
                        member_address,
                    )?;
                }
                Ok(())
            }

            // Scalar targets: coerce into a register, store through.
            _ => {
                let register = self.coerce_to_register(instructions, range, value, target)?;
                let representation = type_representation(&self.info, target);
                self.append_store_scalar(instructions, representation, register, address_register);
                Ok(())
            }
        }
    }

    /// The two-word `{pointer, length}` local the auto-wrap rule lays down.
    fn wrap_into_slice(
        &mut self,
        instructions: &mut Vec<Instruction>,
        data_address_register: usize,
        length: u64,
    ) -> usize {
        let word = self.info.address_integer_size;
        let local = self.append_allocate_local(instructions, 2 * word.byte_size(), word.byte_size());

        let pointer_representation = type_representation(&self.info, &self.usize_type());
        self.append_store_scalar(
            instructions,
            pointer_representation,
            data_address_register,
            local,
        );

        let length_register = self.append_integer_constant(instructions, word, length);
        let length_address = self.append_address_offset(instructions, local, word.byte_size());
        self.append_store_scalar(
            instructions,
            pointer_representation,
            length_register,
            length_address,
        );

        local
    }

    /// View an undetermined struct's members as typed runtime values,
    /// whichever form (deferred constant or unmaterialised literal) the
    /// value is in.
    fn undetermined_struct_members(&self, value: &TypedRuntimeValue) -> Vec<TypedRuntimeValue> {
        let members = match &value.ty {
            Type::UndeterminedStruct { members } => members,
            _ => unreachable!("expected an undetermined struct type"),
        };
        match &value.value {
            RuntimeValue::UndeterminedStruct(values) => values.clone(),
            RuntimeValue::Constant(ConstantValue::Struct(values)) => members
                .iter()
                .zip(values)
                .map(|(member, value)| TypedRuntimeValue {
                    ty: member.member_type.clone(),
                    value: RuntimeValue::Constant(value.clone()),
                })
                .collect(),
            _ => unreachable!("expected a struct value"),
        }
    }

    fn conversion_error(
        &self,
        range: FileRange,
        from: &Type,
        to: &Type,
    ) -> crate::compiler::diagnostics::CompileError {
        self.error(
            range,
            format!("Cannot implicitly convert '{}' to '{}'", from, to),
        )
    }
}
