//! Compile-time evaluation: scopes, name resolution, the constant
//! evaluator and the constant half of the coercion engine.
//!
//! Evaluation is a plain recursive walk. Every expression yields a
//! `(Type, ConstantValue)` pair; a failed speculative attempt (the cast
//! operator probing an implicit coercion, structural slice detection) just
//! discards the returned error, so no diagnostic escapes until the driver
//! reports the final one.

use crate::compiler::ast::*;
use crate::compiler::diagnostics::{CompileError, CompileResult};
use crate::compiler::ir::{ArchitectureInfo, RegisterSize};
use crate::compiler::modules::{LoadedFile, ModuleTable};
use crate::compiler::span::FileRange;
use crate::compiler::types::*;
use std::rc::Rc;

// ═══════════════════════════════════════════════════════════════
//  Scopes
// ═══════════════════════════════════════════════════════════════

/// A compile-time value bound to a name inside a declaration scope
/// (polymorphic determiners and `$` parameters).
#[derive(Debug, Clone)]
pub struct ConstantParameter {
    pub name: String,
    pub parameter_type: Type,
    pub value: ConstantValue,
}

/// One level of the lexical scope chain. Top-level scopes own a file's
/// statements; nested scopes belong to a declaration and carry its bound
/// constant parameters. The chain is immutable: children reference parents,
/// never the reverse.
#[derive(Debug)]
pub struct ConstantScope {
    pub statements: Rc<Vec<Rc<Statement>>>,
    pub constant_parameters: Vec<ConstantParameter>,
    pub parent: Option<Rc<ConstantScope>>,
    pub file_path: Rc<str>,
    /// Name of the declaration this scope belongs to; `None` for top-level
    /// file scopes. Mangled names are built from this chain.
    pub declaration_name: Option<String>,
}

impl ConstantScope {
    pub fn top_level(file: &LoadedFile) -> Rc<ConstantScope> {
        Rc::new(ConstantScope {
            statements: Rc::clone(&file.statements),
            constant_parameters: Vec::new(),
            parent: None,
            file_path: Rc::clone(&file.path),
            declaration_name: None,
        })
    }

    pub fn child(
        parent: &Rc<ConstantScope>,
        declaration_name: &str,
        statements: Rc<Vec<Rc<Statement>>>,
        constant_parameters: Vec<ConstantParameter>,
    ) -> Rc<ConstantScope> {
        Rc::new(ConstantScope {
            statements,
            constant_parameters,
            parent: Some(Rc::clone(parent)),
            file_path: Rc::clone(&parent.file_path),
            declaration_name: Some(declaration_name.to_string()),
        })
    }
}

pub fn error(scope: &ConstantScope, range: FileRange, message: String) -> CompileError {
    CompileError::new(scope.file_path.to_string(), range, message)
}

// ═══════════════════════════════════════════════════════════════
//  Constant values
// ═══════════════════════════════════════════════════════════════

#[derive(Debug, Clone)]
pub struct FunctionConstant {
    pub declaration: Rc<Statement>,
    pub parent: Rc<ConstantScope>,
}

impl FunctionConstant {
    pub fn declaration(&self) -> &FunctionDeclaration {
        match &self.declaration.kind {
            StatementKind::FunctionDeclaration(declaration) => declaration,
            _ => unreachable!("function constant built from a non-function declaration"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct FileModuleConstant {
    pub path: Rc<str>,
    pub statements: Rc<Vec<Rc<Statement>>>,
}

/// A constant value; always paired with a [`Type`] at the use site.
#[derive(Debug, Clone)]
pub enum ConstantValue {
    Function(FunctionConstant),
    BuiltinFunction(String),
    /// Bit pattern, interpreted through the paired integer type.
    Integer(u64),
    Float(f64),
    Boolean(bool),
    Void,
    /// An absolute address.
    Pointer(u64),
    /// A slice constant: absolute data address plus length.
    Array { pointer: u64, length: u64 },
    StaticArray(Vec<ConstantValue>),
    /// Struct members in declaration order. For union constants only the
    /// active member is present; the others are `Void` placeholders.
    Struct(Vec<ConstantValue>),
    FileModule(FileModuleConstant),
    Type(Type),
}

impl ConstantValue {
    pub fn unwrap_integer(&self) -> u64 {
        match self {
            ConstantValue::Integer(value) => *value,
            _ => unreachable!("expected an integer constant"),
        }
    }

    pub fn unwrap_float(&self) -> f64 {
        match self {
            ConstantValue::Float(value) => *value,
            _ => unreachable!("expected a float constant"),
        }
    }

    pub fn unwrap_boolean(&self) -> bool {
        match self {
            ConstantValue::Boolean(value) => *value,
            _ => unreachable!("expected a boolean constant"),
        }
    }

    pub fn unwrap_type(&self) -> &Type {
        match self {
            ConstantValue::Type(ty) => ty,
            _ => unreachable!("expected a type constant"),
        }
    }
}

/// Structural equality used by the polymorphic instantiation cache.
pub fn constant_values_equal(a: &ConstantValue, b: &ConstantValue) -> bool {
    match (a, b) {
        (ConstantValue::Integer(a), ConstantValue::Integer(b)) => a == b,
        (ConstantValue::Float(a), ConstantValue::Float(b)) => a.to_bits() == b.to_bits(),
        (ConstantValue::Boolean(a), ConstantValue::Boolean(b)) => a == b,
        (ConstantValue::Void, ConstantValue::Void) => true,
        (ConstantValue::Pointer(a), ConstantValue::Pointer(b)) => a == b,
        (
            ConstantValue::Array {
                pointer: a_pointer,
                length: a_length,
            },
            ConstantValue::Array {
                pointer: b_pointer,
                length: b_length,
            },
        ) => a_pointer == b_pointer && a_length == b_length,
        (ConstantValue::StaticArray(a), ConstantValue::StaticArray(b))
        | (ConstantValue::Struct(a), ConstantValue::Struct(b)) => {
            a.len() == b.len() && a.iter().zip(b).all(|(a, b)| constant_values_equal(a, b))
        }
        (ConstantValue::Function(a), ConstantValue::Function(b)) => {
            Rc::ptr_eq(&a.declaration, &b.declaration)
        }
        (ConstantValue::BuiltinFunction(a), ConstantValue::BuiltinFunction(b)) => a == b,
        (ConstantValue::FileModule(a), ConstantValue::FileModule(b)) => a.path == b.path,
        (ConstantValue::Type(a), ConstantValue::Type(b)) => a == b,
        _ => false,
    }
}

#[derive(Debug, Clone)]
pub struct TypedConstantValue {
    pub ty: Type,
    pub value: ConstantValue,
}

// ═══════════════════════════════════════════════════════════════
//  Global constants
// ═══════════════════════════════════════════════════════════════

#[derive(Debug, Clone)]
pub struct GlobalConstant {
    pub name: String,
    pub ty: Type,
    pub value: ConstantValue,
}

/// The ambient compilation state: primitive names, builtins, and the two
/// architectural integer sizes.
#[derive(Debug)]
pub struct GlobalInfo {
    pub global_constants: Vec<GlobalConstant>,
    pub address_integer_size: RegisterSize,
    pub default_integer_size: RegisterSize,
}

impl GlobalInfo {
    pub fn new(architecture: ArchitectureInfo) -> Self {
        let mut global_constants = Vec::new();

        let mut base_type = |name: &str, ty: Type| {
            global_constants.push(GlobalConstant {
                name: name.to_string(),
                ty: Type::TypeType,
                value: ConstantValue::Type(ty),
            });
        };

        base_type(
            "u8",
            Type::Integer {
                size: RegisterSize::Size8,
                is_signed: false,
            },
        );
        base_type(
            "u16",
            Type::Integer {
                size: RegisterSize::Size16,
                is_signed: false,
            },
        );
        base_type(
            "u32",
            Type::Integer {
                size: RegisterSize::Size32,
                is_signed: false,
            },
        );
        base_type(
            "u64",
            Type::Integer {
                size: RegisterSize::Size64,
                is_signed: false,
            },
        );
        base_type(
            "i8",
            Type::Integer {
                size: RegisterSize::Size8,
                is_signed: true,
            },
        );
        base_type(
            "i16",
            Type::Integer {
                size: RegisterSize::Size16,
                is_signed: true,
            },
        );
        base_type(
            "i32",
            Type::Integer {
                size: RegisterSize::Size32,
                is_signed: true,
            },
        );
        base_type(
            "i64",
            Type::Integer {
                size: RegisterSize::Size64,
                is_signed: true,
            },
        );
        base_type(
            "usize",
            Type::Integer {
                size: architecture.address_size,
                is_signed: false,
            },
        );
        base_type(
            "isize",
            Type::Integer {
                size: architecture.address_size,
                is_signed: true,
            },
        );
        base_type(
            "f32",
            Type::Float {
                size: RegisterSize::Size32,
            },
        );
        base_type(
            "f64",
            Type::Float {
                size: RegisterSize::Size64,
            },
        );
        base_type("bool", Type::Boolean);
        base_type("void", Type::Void);
        base_type("type", Type::TypeType);

        global_constants.push(GlobalConstant {
            name: "true".to_string(),
            ty: Type::Boolean,
            value: ConstantValue::Boolean(true),
        });
        global_constants.push(GlobalConstant {
            name: "false".to_string(),
            ty: Type::Boolean,
            value: ConstantValue::Boolean(false),
        });

        for builtin in ["size_of", "type_of"] {
            global_constants.push(GlobalConstant {
                name: builtin.to_string(),
                ty: Type::BuiltinFunction,
                value: ConstantValue::BuiltinFunction(builtin.to_string()),
            });
        }

        Self {
            global_constants,
            address_integer_size: architecture.address_size,
            default_integer_size: architecture.default_size,
        }
    }

    pub fn usize_type(&self) -> Type {
        Type::Integer {
            size: self.address_integer_size,
            is_signed: false,
        }
    }
}

// ═══════════════════════════════════════════════════════════════
//  Constant-mode coercion
// ═══════════════════════════════════════════════════════════════

/// Range-check an undetermined integer literal against a concrete target.
pub fn check_undetermined_integer_coercion(
    scope: &ConstantScope,
    range: FileRange,
    target_size: RegisterSize,
    target_signed: bool,
    value: u64,
) -> CompileResult<()> {
    let in_range = if target_signed {
        let signed = value as i64;
        match target_size {
            RegisterSize::Size8 => signed >= i8::MIN as i64 && signed <= i8::MAX as i64,
            RegisterSize::Size16 => signed >= i16::MIN as i64 && signed <= i16::MAX as i64,
            RegisterSize::Size32 => signed >= i32::MIN as i64 && signed <= i32::MAX as i64,
            RegisterSize::Size64 => true,
        }
    } else {
        let signed = value as i64;
        if signed < 0 {
            false
        } else {
            match target_size {
                RegisterSize::Size8 => value <= u8::MAX as u64,
                RegisterSize::Size16 => value <= u16::MAX as u64,
                RegisterSize::Size32 => value <= u32::MAX as u64,
                RegisterSize::Size64 => true,
            }
        }
    };

    if in_range {
        Ok(())
    } else {
        let target = Type::Integer {
            size: target_size,
            is_signed: target_signed,
        };
        Err(error(
            scope,
            range,
            format!(
                "Constant '{}' cannot fit in '{}'. You must cast explicitly",
                value as i64, target
            ),
        ))
    }
}

pub fn coerce_constant_to_integer_type(
    scope: &ConstantScope,
    range: FileRange,
    ty: &Type,
    value: &ConstantValue,
    target_size: RegisterSize,
    target_signed: bool,
) -> CompileResult<u64> {
    match ty {
        Type::Integer { size, is_signed } => {
            if *size != target_size || *is_signed != target_signed {
                let target = Type::Integer {
                    size: target_size,
                    is_signed: target_signed,
                };
                return Err(error(
                    scope,
                    range,
                    format!("Cannot implicitly convert '{}' to '{}'", ty, target),
                ));
            }
            Ok(value.unwrap_integer())
        }
        Type::UndeterminedInteger => {
            let integer = value.unwrap_integer();
            check_undetermined_integer_coercion(scope, range, target_size, target_signed, integer)?;
            Ok(integer)
        }
        _ => {
            let target = Type::Integer {
                size: target_size,
                is_signed: target_signed,
            };
            Err(error(
                scope,
                range,
                format!("Cannot implicitly convert '{}' to '{}'", ty, target),
            ))
        }
    }
}

fn coerce_constant_to_undetermined_integer(
    scope: &ConstantScope,
    range: FileRange,
    ty: &Type,
    value: &ConstantValue,
) -> CompileResult<u64> {
    match ty {
        Type::Integer { size, is_signed } => {
            let integer = value.unwrap_integer();
            // Preserve the source exactly at its own width.
            let truncated = if *is_signed {
                match size {
                    RegisterSize::Size8 => integer as i8 as i64 as u64,
                    RegisterSize::Size16 => integer as i16 as i64 as u64,
                    RegisterSize::Size32 => integer as i32 as i64 as u64,
                    RegisterSize::Size64 => integer,
                }
            } else {
                match size {
                    RegisterSize::Size8 => integer as u8 as u64,
                    RegisterSize::Size16 => integer as u16 as u64,
                    RegisterSize::Size32 => integer as u32 as u64,
                    RegisterSize::Size64 => integer,
                }
            };
            Ok(truncated)
        }
        Type::UndeterminedInteger => Ok(value.unwrap_integer()),
        _ => Err(error(
            scope,
            range,
            format!("Cannot implicitly convert '{}' to '{{integer}}'", ty),
        )),
    }
}

fn coerce_constant_to_pointer_type(
    scope: &ConstantScope,
    range: FileRange,
    ty: &Type,
    value: &ConstantValue,
    target_pointee: &Type,
) -> CompileResult<u64> {
    match ty {
        Type::UndeterminedInteger => Ok(value.unwrap_integer()),
        Type::Pointer(pointee) if pointee.as_ref() == target_pointee => match value {
            ConstantValue::Pointer(address) => Ok(*address),
            _ => unreachable!("expected a pointer constant"),
        },
        _ => Err(error(
            scope,
            range,
            format!(
                "Cannot implicitly convert '{}' to '{}'",
                ty,
                Type::Pointer(Box::new(target_pointee.clone()))
            ),
        )),
    }
}

/// Constant half of the coercion engine. Attempts the implicit conversion
/// rules in order and produces a new constant on success.
pub fn coerce_constant_to_type(
    info: &GlobalInfo,
    scope: &ConstantScope,
    range: FileRange,
    ty: &Type,
    value: &ConstantValue,
    target_type: &Type,
) -> CompileResult<ConstantValue> {
    match target_type {
        Type::Integer { size, is_signed } => {
            let integer = coerce_constant_to_integer_type(scope, range, ty, value, *size, *is_signed)?;
            return Ok(ConstantValue::Integer(integer));
        }

        Type::UndeterminedInteger => {
            let integer = coerce_constant_to_undetermined_integer(scope, range, ty, value)?;
            return Ok(ConstantValue::Integer(integer));
        }

        Type::Float { size: target_size } => match ty {
            Type::UndeterminedInteger => {
                return Ok(ConstantValue::Float(value.unwrap_integer() as i64 as f64));
            }
            Type::Float { size } if size == target_size => {
                return Ok(value.clone());
            }
            Type::UndeterminedFloat => {
                return Ok(value.clone());
            }
            _ => {}
        },

        Type::UndeterminedFloat => match ty {
            Type::Float { size } => {
                let float = value.unwrap_float();
                let widened = match size {
                    RegisterSize::Size32 => float as f32 as f64,
                    _ => float,
                };
                return Ok(ConstantValue::Float(widened));
            }
            Type::UndeterminedFloat => {
                return Ok(value.clone());
            }
            Type::UndeterminedInteger => {
                return Ok(ConstantValue::Float(value.unwrap_integer() as i64 as f64));
            }
            _ => {}
        },

        Type::Pointer(target_pointee) => {
            let address = coerce_constant_to_pointer_type(scope, range, ty, value, target_pointee)?;
            return Ok(ConstantValue::Pointer(address));
        }

        Type::ArraySlice { element_type } => match ty {
            Type::ArraySlice {
                element_type: source_element,
            } if source_element == element_type => {
                return Ok(value.clone());
            }
            Type::UndeterminedStruct { members }
                if members.len() == 2
                    && members[0].name == "pointer"
                    && members[1].name == "length" =>
            {
                if let ConstantValue::Struct(member_values) = value {
                    let pointer = coerce_constant_to_pointer_type(
                        scope,
                        range,
                        &members[0].member_type,
                        &member_values[0],
                        element_type,
                    );
                    if let Ok(pointer) = pointer {
                        let length = coerce_constant_to_integer_type(
                            scope,
                            range,
                            &members[1].member_type,
                            &member_values[1],
                            info.address_integer_size,
                            false,
                        );
                        if let Ok(length) = length {
                            return Ok(ConstantValue::Array { pointer, length });
                        }
                    }
                }
            }
            _ => {}
        },

        Type::Struct(struct_type) => {
            if let Type::UndeterminedStruct { members } = ty {
                if let ConstantValue::Struct(member_values) = value {
                    if struct_type.is_union() {
                        if members.len() == 1 {
                            for (index, declared) in struct_type.members.iter().enumerate() {
                                if declared.name == members[0].name {
                                    let coerced = coerce_constant_to_type(
                                        info,
                                        scope,
                                        range,
                                        &members[0].member_type,
                                        &member_values[0],
                                        &declared.member_type,
                                    )?;
                                    let mut values =
                                        vec![ConstantValue::Void; struct_type.members.len()];
                                    values[index] = coerced;
                                    return Ok(ConstantValue::Struct(values));
                                }
                            }
                        }
                    } else if members.len() == struct_type.members.len()
                        && members
                            .iter()
                            .zip(&struct_type.members)
                            .all(|(a, b)| a.name == b.name)
                    {
                        let mut values = Vec::with_capacity(members.len());
                        for ((member, declared), member_value) in
                            members.iter().zip(&struct_type.members).zip(member_values)
                        {
                            values.push(coerce_constant_to_type(
                                info,
                                scope,
                                range,
                                &member.member_type,
                                member_value,
                                &declared.member_type,
                            )?);
                        }
                        return Ok(ConstantValue::Struct(values));
                    }
                }
            }
        }

        _ => {}
    }

    if ty == target_type {
        return Ok(value.clone());
    }

    Err(error(
        scope,
        range,
        format!("Cannot implicitly convert '{}' to '{}'", ty, target_type),
    ))
}

/// Collapse an undetermined type into its default concrete type.
pub fn coerce_to_default_type(
    info: &GlobalInfo,
    scope: &ConstantScope,
    range: FileRange,
    ty: &Type,
) -> CompileResult<Type> {
    match ty {
        Type::UndeterminedInteger => Ok(Type::Integer {
            size: info.default_integer_size,
            is_signed: true,
        }),
        Type::UndeterminedFloat => Ok(Type::Float {
            size: info.default_integer_size,
        }),
        Type::UndeterminedStruct { .. } => Err(error(
            scope,
            range,
            "Undetermined struct types cannot exist at runtime".to_string(),
        )),
        _ => Ok(ty.clone()),
    }
}

// ═══════════════════════════════════════════════════════════════
//  Indexing and binary operations
// ═══════════════════════════════════════════════════════════════

pub fn evaluate_constant_index(
    info: &GlobalInfo,
    scope: &ConstantScope,
    ty: &Type,
    value: &ConstantValue,
    range: FileRange,
    index_type: &Type,
    index_value: &ConstantValue,
    index_range: FileRange,
) -> CompileResult<TypedConstantValue> {
    let index = coerce_constant_to_integer_type(
        scope,
        index_range,
        index_type,
        index_value,
        info.address_integer_size,
        false,
    )?;

    match ty {
        Type::StaticArray {
            length,
            element_type,
        } => {
            if index >= *length {
                return Err(error(
                    scope,
                    index_range,
                    format!("Array index {} out of bounds", index),
                ));
            }
            let elements = match value {
                ConstantValue::StaticArray(elements) => elements,
                _ => unreachable!("expected a static array constant"),
            };
            Ok(TypedConstantValue {
                ty: element_type.as_ref().clone(),
                value: elements[index as usize].clone(),
            })
        }
        _ => Err(error(scope, range, format!("Cannot index '{}'", ty))),
    }
}

/// The priority ladder that decides the common type both operands of a
/// binary operation coerce to.
pub fn determine_binary_operation_type(
    scope: &ConstantScope,
    range: FileRange,
    left: &Type,
    right: &Type,
) -> CompileResult<Type> {
    if matches!(left, Type::Boolean) || matches!(right, Type::Boolean) {
        Ok(Type::Boolean)
    } else if matches!(left, Type::Pointer(_)) {
        Ok(left.clone())
    } else if matches!(right, Type::Pointer(_)) {
        Ok(right.clone())
    } else if let (
        Type::Integer {
            size: left_size,
            is_signed: left_signed,
        },
        Type::Integer {
            size: right_size,
            is_signed: right_signed,
        },
    ) = (left, right)
    {
        Ok(Type::Integer {
            size: (*left_size).max(*right_size),
            is_signed: *left_signed || *right_signed,
        })
    } else if let (Type::Float { size: left_size }, Type::Float { size: right_size }) = (left, right)
    {
        Ok(Type::Float {
            size: (*left_size).max(*right_size),
        })
    } else if matches!(left, Type::Float { .. }) {
        Ok(left.clone())
    } else if matches!(right, Type::Float { .. }) {
        Ok(right.clone())
    } else if matches!(left, Type::UndeterminedFloat) || matches!(right, Type::UndeterminedFloat) {
        Ok(Type::UndeterminedFloat)
    } else if matches!(left, Type::Integer { .. }) {
        Ok(left.clone())
    } else if matches!(right, Type::Integer { .. }) {
        Ok(right.clone())
    } else if matches!(left, Type::UndeterminedInteger)
        || matches!(right, Type::UndeterminedInteger)
    {
        Ok(Type::UndeterminedInteger)
    } else {
        Err(error(
            scope,
            range,
            format!("Mismatched types '{}' and '{}'", left, right),
        ))
    }
}

fn sign_extend(size: RegisterSize, value: u64) -> i64 {
    match size {
        RegisterSize::Size8 => value as i8 as i64,
        RegisterSize::Size16 => value as i16 as i64,
        RegisterSize::Size32 => value as i32 as i64,
        RegisterSize::Size64 => value as i64,
    }
}

fn zero_extend(size: RegisterSize, value: u64) -> u64 {
    match size {
        RegisterSize::Size8 => value as u8 as u64,
        RegisterSize::Size16 => value as u16 as u64,
        RegisterSize::Size32 => value as u32 as u64,
        RegisterSize::Size64 => value,
    }
}

pub fn evaluate_constant_binary_operation(
    info: &GlobalInfo,
    scope: &ConstantScope,
    range: FileRange,
    operator: BinaryOperator,
    left_range: FileRange,
    left_type: &Type,
    left_value: &ConstantValue,
    right_range: FileRange,
    right_type: &Type,
    right_value: &ConstantValue,
) -> CompileResult<TypedConstantValue> {
    let operation_type = determine_binary_operation_type(scope, range, left_type, right_type)?;

    let left = coerce_constant_to_type(info, scope, left_range, left_type, left_value, &operation_type)?;
    let right =
        coerce_constant_to_type(info, scope, right_range, right_type, right_value, &operation_type)?;

    match &operation_type {
        Type::Integer { size, is_signed } => {
            let left = left.unwrap_integer();
            let right = right.unwrap_integer();

            let divide_checked = |value: u64| -> CompileResult<u64> {
                if zero_extend(*size, value) == 0 {
                    Err(error(scope, right_range, "Division by zero".to_string()))
                } else {
                    Ok(value)
                }
            };

            let integer_result = |value: u64| TypedConstantValue {
                ty: operation_type.clone(),
                value: ConstantValue::Integer(value),
            };
            let boolean_result = |value: bool| TypedConstantValue {
                ty: Type::Boolean,
                value: ConstantValue::Boolean(value),
            };

            match operator {
                BinaryOperator::Addition => Ok(integer_result(left.wrapping_add(right))),
                BinaryOperator::Subtraction => Ok(integer_result(left.wrapping_sub(right))),
                BinaryOperator::Multiplication => {
                    let result = if *is_signed {
                        (left as i64).wrapping_mul(right as i64) as u64
                    } else {
                        left.wrapping_mul(right)
                    };
                    Ok(integer_result(result))
                }
                BinaryOperator::Division => {
                    divide_checked(right)?;
                    let result = if *is_signed {
                        sign_extend(*size, left).wrapping_div(sign_extend(*size, right)) as u64
                    } else {
                        zero_extend(*size, left) / zero_extend(*size, right)
                    };
                    Ok(integer_result(result))
                }
                BinaryOperator::Modulo => {
                    divide_checked(right)?;
                    let result = if *is_signed {
                        sign_extend(*size, left).wrapping_rem(sign_extend(*size, right)) as u64
                    } else {
                        zero_extend(*size, left) % zero_extend(*size, right)
                    };
                    Ok(integer_result(result))
                }
                BinaryOperator::BitwiseAnd => Ok(integer_result(left & right)),
                BinaryOperator::BitwiseOr => Ok(integer_result(left | right)),
                BinaryOperator::Equal => Ok(boolean_result(left == right)),
                BinaryOperator::NotEqual => Ok(boolean_result(left != right)),
                BinaryOperator::LessThan => {
                    let result = if *is_signed {
                        sign_extend(*size, left) < sign_extend(*size, right)
                    } else {
                        zero_extend(*size, left) < zero_extend(*size, right)
                    };
                    Ok(boolean_result(result))
                }
                BinaryOperator::GreaterThan => {
                    let result = if *is_signed {
                        sign_extend(*size, left) > sign_extend(*size, right)
                    } else {
                        zero_extend(*size, left) > zero_extend(*size, right)
                    };
                    Ok(boolean_result(result))
                }
                _ => Err(error(
                    scope,
                    range,
                    "Cannot perform that operation on integers".to_string(),
                )),
            }
        }

        Type::UndeterminedInteger => {
            let left = left.unwrap_integer() as i64;
            let right = right.unwrap_integer() as i64;

            let integer_result = |value: i64| TypedConstantValue {
                ty: Type::UndeterminedInteger,
                value: ConstantValue::Integer(value as u64),
            };
            let boolean_result = |value: bool| TypedConstantValue {
                ty: Type::Boolean,
                value: ConstantValue::Boolean(value),
            };

            match operator {
                BinaryOperator::Addition => Ok(integer_result(left.wrapping_add(right))),
                BinaryOperator::Subtraction => Ok(integer_result(left.wrapping_sub(right))),
                BinaryOperator::Multiplication => Ok(integer_result(left.wrapping_mul(right))),
                BinaryOperator::Division => {
                    if right == 0 {
                        return Err(error(scope, right_range, "Division by zero".to_string()));
                    }
                    Ok(integer_result(left.wrapping_div(right)))
                }
                BinaryOperator::Modulo => {
                    if right == 0 {
                        return Err(error(scope, right_range, "Division by zero".to_string()));
                    }
                    Ok(integer_result(left.wrapping_rem(right)))
                }
                BinaryOperator::BitwiseAnd => Ok(integer_result(left & right)),
                BinaryOperator::BitwiseOr => Ok(integer_result(left | right)),
                BinaryOperator::Equal => Ok(boolean_result(left == right)),
                BinaryOperator::NotEqual => Ok(boolean_result(left != right)),
                BinaryOperator::LessThan => Ok(boolean_result(left < right)),
                BinaryOperator::GreaterThan => Ok(boolean_result(left > right)),
                _ => Err(error(
                    scope,
                    range,
                    "Cannot perform that operation on integers".to_string(),
                )),
            }
        }

        Type::Boolean => {
            let left = left.unwrap_boolean();
            let right = right.unwrap_boolean();

            let boolean_result = |value: bool| TypedConstantValue {
                ty: Type::Boolean,
                value: ConstantValue::Boolean(value),
            };

            match operator {
                BinaryOperator::BooleanAnd => Ok(boolean_result(left && right)),
                BinaryOperator::BooleanOr => Ok(boolean_result(left || right)),
                BinaryOperator::Equal => Ok(boolean_result(left == right)),
                BinaryOperator::NotEqual => Ok(boolean_result(left != right)),
                _ => Err(error(
                    scope,
                    range,
                    "Cannot perform that operation on booleans".to_string(),
                )),
            }
        }

        Type::Float { .. } | Type::UndeterminedFloat => {
            let left = left.unwrap_float();
            let right = right.unwrap_float();

            let float_result = |value: f64| TypedConstantValue {
                ty: operation_type.clone(),
                value: ConstantValue::Float(value),
            };
            let boolean_result = |value: bool| TypedConstantValue {
                ty: Type::Boolean,
                value: ConstantValue::Boolean(value),
            };

            match operator {
                BinaryOperator::Addition => Ok(float_result(left + right)),
                BinaryOperator::Subtraction => Ok(float_result(left - right)),
                BinaryOperator::Multiplication => Ok(float_result(left * right)),
                BinaryOperator::Division => Ok(float_result(left / right)),
                BinaryOperator::Equal => Ok(boolean_result(left == right)),
                BinaryOperator::NotEqual => Ok(boolean_result(left != right)),
                BinaryOperator::LessThan => Ok(boolean_result(left < right)),
                BinaryOperator::GreaterThan => Ok(boolean_result(left > right)),
                _ => Err(error(
                    scope,
                    range,
                    "Cannot perform that operation on floats".to_string(),
                )),
            }
        }

        Type::Pointer(_) => {
            let left = match left {
                ConstantValue::Pointer(address) => address,
                _ => unreachable!("expected a pointer constant"),
            };
            let right = match right {
                ConstantValue::Pointer(address) => address,
                _ => unreachable!("expected a pointer constant"),
            };

            let boolean_result = |value: bool| TypedConstantValue {
                ty: Type::Boolean,
                value: ConstantValue::Boolean(value),
            };

            match operator {
                BinaryOperator::Equal => Ok(boolean_result(left == right)),
                BinaryOperator::NotEqual => Ok(boolean_result(left != right)),
                _ => Err(error(
                    scope,
                    range,
                    "Cannot perform that operation on pointers".to_string(),
                )),
            }
        }

        _ => Err(error(
            scope,
            range,
            format!("Cannot perform binary operations on '{}'", operation_type),
        )),
    }
}

// ═══════════════════════════════════════════════════════════════
//  Casts
// ═══════════════════════════════════════════════════════════════

/// Explicit conversion. First attempts the implicit coercion rules
/// speculatively; on failure falls back to the explicit conversions
/// (integer resize with wrap, integer ↔ float, float resize,
/// pointer ↔ usize).
pub fn evaluate_constant_cast(
    info: &GlobalInfo,
    scope: &ConstantScope,
    ty: &Type,
    value: &ConstantValue,
    value_range: FileRange,
    target_type: &Type,
    _target_range: FileRange,
) -> CompileResult<ConstantValue> {
    if let Ok(coerced) = coerce_constant_to_type(info, scope, value_range, ty, value, target_type) {
        return Ok(coerced);
    }

    let cast_error = || {
        error(
            scope,
            value_range,
            format!("Cannot cast from '{}' to '{}'", ty, target_type),
        )
    };

    match target_type {
        Type::Integer {
            size: target_size,
            is_signed: target_signed,
        } => {
            let result = match ty {
                Type::Integer { size, is_signed } => {
                    let integer = value.unwrap_integer();
                    if *is_signed {
                        sign_extend(*size, integer) as u64
                    } else {
                        zero_extend(*size, integer)
                    }
                }
                Type::UndeterminedInteger => value.unwrap_integer(),
                Type::Float { size } => {
                    let float = match size {
                        RegisterSize::Size32 => value.unwrap_float() as f32 as f64,
                        _ => value.unwrap_float(),
                    };
                    if *target_signed {
                        match target_size {
                            RegisterSize::Size8 => float as i8 as u64,
                            RegisterSize::Size16 => float as i16 as u64,
                            RegisterSize::Size32 => float as i32 as u64,
                            RegisterSize::Size64 => float as i64 as u64,
                        }
                    } else {
                        match target_size {
                            RegisterSize::Size8 => float as u8 as u64,
                            RegisterSize::Size16 => float as u16 as u64,
                            RegisterSize::Size32 => float as u32 as u64,
                            RegisterSize::Size64 => float as u64,
                        }
                    }
                }
                Type::UndeterminedFloat => {
                    let float = value.unwrap_float();
                    if *target_signed {
                        match target_size {
                            RegisterSize::Size8 => float as i8 as u64,
                            RegisterSize::Size16 => float as i16 as u64,
                            RegisterSize::Size32 => float as i32 as u64,
                            RegisterSize::Size64 => float as i64 as u64,
                        }
                    } else {
                        match target_size {
                            RegisterSize::Size8 => float as u8 as u64,
                            RegisterSize::Size16 => float as u16 as u64,
                            RegisterSize::Size32 => float as u32 as u64,
                            RegisterSize::Size64 => float as u64,
                        }
                    }
                }
                Type::Pointer(_) => {
                    if *target_size == info.address_integer_size && !*target_signed {
                        match value {
                            ConstantValue::Pointer(address) => *address,
                            _ => unreachable!("expected a pointer constant"),
                        }
                    } else {
                        return Err(cast_error());
                    }
                }
                _ => return Err(cast_error()),
            };
            // Store the bit pattern truncated to the target width.
            let result = if *target_signed {
                sign_extend(*target_size, result) as u64
            } else {
                zero_extend(*target_size, result)
            };
            Ok(ConstantValue::Integer(result))
        }

        Type::Float { size: target_size } => {
            let from_value = match ty {
                Type::Integer { size, is_signed } => {
                    let integer = value.unwrap_integer();
                    if *is_signed {
                        sign_extend(*size, integer) as f64
                    } else {
                        zero_extend(*size, integer) as f64
                    }
                }
                Type::UndeterminedInteger => value.unwrap_integer() as i64 as f64,
                Type::Float { size } => match size {
                    RegisterSize::Size32 => value.unwrap_float() as f32 as f64,
                    _ => value.unwrap_float(),
                },
                Type::UndeterminedFloat => value.unwrap_float(),
                _ => return Err(cast_error()),
            };
            let result = match target_size {
                RegisterSize::Size32 => from_value as f32 as f64,
                _ => from_value,
            };
            Ok(ConstantValue::Float(result))
        }

        Type::Pointer(_) => {
            let result = match ty {
                Type::Integer { size, is_signed } => {
                    if *size == info.address_integer_size && !*is_signed {
                        value.unwrap_integer()
                    } else {
                        return Err(cast_error());
                    }
                }
                Type::Pointer(_) => match value {
                    ConstantValue::Pointer(address) => *address,
                    _ => unreachable!("expected a pointer constant"),
                },
                _ => return Err(cast_error()),
            };
            Ok(ConstantValue::Pointer(result))
        }

        _ => Err(cast_error()),
    }
}

// ═══════════════════════════════════════════════════════════════
//  Name resolution
// ═══════════════════════════════════════════════════════════════

/// Resolve the module a `using` statement names. A string literal is
/// shorthand for importing that path; anything else must evaluate to a
/// module constant.
pub fn resolve_using_module(
    info: &GlobalInfo,
    scope: &Rc<ConstantScope>,
    files: &mut ModuleTable,
    value: &Expression,
) -> CompileResult<FileModuleConstant> {
    if let ExpressionKind::StringLiteral(path) = &value.kind {
        let file = files.load(&scope.file_path, value.range, path)?;
        return Ok(FileModuleConstant {
            path: file.path,
            statements: file.statements,
        });
    }

    let module = evaluate_constant_expression(info, scope, files, value)?;
    if !matches!(module.ty, Type::FileModule) {
        return Err(error(
            scope,
            value.range,
            format!("Expected a module, got '{}'", module.ty),
        ));
    }
    match module.value {
        ConstantValue::FileModule(module) => Ok(module),
        _ => unreachable!("expected a module constant"),
    }
}

/// Search the scope chain for `name` and resolve the matched declaration.
/// Search order: constant parameters of the innermost scope, then each
/// scope outward (declarations, `using` imports, then that scope's own
/// constant parameters), finally the ambient global constants.
pub fn resolve_constant_named_reference(
    info: &GlobalInfo,
    scope: &Rc<ConstantScope>,
    files: &mut ModuleTable,
    name: &Identifier,
) -> CompileResult<TypedConstantValue> {
    for constant_parameter in &scope.constant_parameters {
        if constant_parameter.name == name.text {
            return Ok(TypedConstantValue {
                ty: constant_parameter.parameter_type.clone(),
                value: constant_parameter.value.clone(),
            });
        }
    }

    let mut current = Some(Rc::clone(scope));
    while let Some(current_scope) = current {
        for statement in current_scope.statements.iter() {
            if statement.matches_declaration(&name.text) {
                return resolve_declaration(info, &current_scope, files, statement);
            }

            if let StatementKind::Using { value } = &statement.kind {
                let module = resolve_using_module(info, &current_scope, files, value)?;

                for module_statement in module.statements.iter() {
                    if module_statement.matches_public_declaration(&name.text) {
                        let module_scope = Rc::new(ConstantScope {
                            statements: Rc::clone(&module.statements),
                            constant_parameters: Vec::new(),
                            parent: None,
                            file_path: Rc::clone(&module.path),
                            declaration_name: None,
                        });
                        return resolve_declaration(info, &module_scope, files, module_statement);
                    }
                }
            }
        }

        for constant_parameter in &current_scope.constant_parameters {
            if constant_parameter.name == name.text {
                return Ok(TypedConstantValue {
                    ty: constant_parameter.parameter_type.clone(),
                    value: constant_parameter.value.clone(),
                });
            }
        }

        current = current_scope.parent.clone();
    }

    for global_constant in &info.global_constants {
        if global_constant.name == name.text {
            return Ok(TypedConstantValue {
                ty: global_constant.ty.clone(),
                value: global_constant.value.clone(),
            });
        }
    }

    Err(error(
        scope,
        name.range,
        format!("Cannot find named reference {}", name.text),
    ))
}

// ═══════════════════════════════════════════════════════════════
//  Declaration resolution
// ═══════════════════════════════════════════════════════════════

pub fn resolve_declaration(
    info: &GlobalInfo,
    scope: &Rc<ConstantScope>,
    files: &mut ModuleTable,
    declaration: &Rc<Statement>,
) -> CompileResult<TypedConstantValue> {
    match &declaration.kind {
        StatementKind::FunctionDeclaration(function_declaration) => {
            let is_polymorphic = function_declaration.parameters.iter().any(|parameter| {
                parameter.is_constant
                    || matches!(parameter.kind, ParameterKind::PolymorphicDeterminer(_))
            });

            if is_polymorphic {
                return Ok(TypedConstantValue {
                    ty: Type::PolymorphicFunction,
                    value: ConstantValue::Function(FunctionConstant {
                        declaration: Rc::clone(declaration),
                        parent: Rc::clone(scope),
                    }),
                });
            }

            let mut parameter_types = Vec::with_capacity(function_declaration.parameters.len());
            for parameter in &function_declaration.parameters {
                let type_expression = match &parameter.kind {
                    ParameterKind::Typed(type_expression) => type_expression,
                    ParameterKind::PolymorphicDeterminer(_) => unreachable!(),
                };
                let parameter_type = evaluate_type_expression(info, scope, files, type_expression)?;
                if !parameter_type.is_runtime_type() {
                    return Err(error(
                        scope,
                        type_expression.range,
                        format!("Function parameters cannot be of type '{}'", parameter_type),
                    ));
                }
                parameter_types.push(parameter_type);
            }

            let return_type = match &function_declaration.return_type {
                Some(return_expression) => {
                    let return_type = evaluate_type_expression(info, scope, files, return_expression)?;
                    if !return_type.is_runtime_type() {
                        return Err(error(
                            scope,
                            return_expression.range,
                            format!("Function returns cannot be of type '{}'", return_type),
                        ));
                    }
                    return_type
                }
                None => Type::Void,
            };

            Ok(TypedConstantValue {
                ty: Type::FunctionType {
                    parameters: parameter_types,
                    return_type: Box::new(return_type),
                },
                value: ConstantValue::Function(FunctionConstant {
                    declaration: Rc::clone(declaration),
                    parent: Rc::clone(scope),
                }),
            })
        }

        StatementKind::ConstantDefinition { expression, .. } => {
            evaluate_constant_expression(info, scope, files, expression)
        }

        StatementKind::StructDefinition(struct_definition) => {
            if struct_definition.parameters.is_empty() {
                let members =
                    resolve_struct_members(info, scope, files, declaration, struct_definition)?;
                Ok(TypedConstantValue {
                    ty: Type::TypeType,
                    value: ConstantValue::Type(Type::Struct(StructType {
                        definition: Rc::clone(declaration),
                        members,
                    })),
                })
            } else {
                let mut parameter_types = Vec::with_capacity(struct_definition.parameters.len());
                for parameter in &struct_definition.parameters {
                    let parameter_type =
                        evaluate_type_expression(info, scope, files, &parameter.type_expression)?;
                    parameter_types.push(parameter_type);
                }
                Ok(TypedConstantValue {
                    ty: Type::TypeType,
                    value: ConstantValue::Type(Type::PolymorphicStruct(PolymorphicStructType {
                        definition: Rc::clone(declaration),
                        parameter_types,
                        parent: Rc::clone(scope),
                    })),
                })
            }
        }

        StatementKind::Import { path } => {
            let file = files.load(&scope.file_path, declaration.range, path)?;
            Ok(TypedConstantValue {
                ty: Type::FileModule,
                value: ConstantValue::FileModule(FileModuleConstant {
                    path: file.path,
                    statements: file.statements,
                }),
            })
        }

        _ => unreachable!("resolve_declaration called on a non-declaration"),
    }
}

/// Evaluate a struct definition's member types in `scope`, rejecting
/// duplicates and non-runtime member types.
pub fn resolve_struct_members(
    info: &GlobalInfo,
    scope: &Rc<ConstantScope>,
    files: &mut ModuleTable,
    _declaration: &Rc<Statement>,
    struct_definition: &StructDefinition,
) -> CompileResult<Vec<StructMember>> {
    let mut members = Vec::with_capacity(struct_definition.members.len());
    for (i, member) in struct_definition.members.iter().enumerate() {
        for (j, other) in struct_definition.members.iter().enumerate() {
            if i != j && member.name.text == other.name.text {
                return Err(error(
                    scope,
                    member.name.range,
                    format!("Duplicate struct member name {}", member.name.text),
                ));
            }
        }

        let member_type = evaluate_type_expression(info, scope, files, &member.type_expression)?;
        if !member_type.is_runtime_type() {
            return Err(error(
                scope,
                member.type_expression.range,
                format!("Struct members cannot be of type '{}'", member_type),
            ));
        }

        members.push(StructMember {
            name: member.name.text.clone(),
            member_type,
        });
    }
    Ok(members)
}

/// Instantiate a polymorphic struct with already-evaluated arguments,
/// producing the concrete nominal struct type.
pub fn instantiate_polymorphic_struct(
    info: &GlobalInfo,
    scope: &Rc<ConstantScope>,
    files: &mut ModuleTable,
    polymorphic_struct: &PolymorphicStructType,
    arguments: &[(TypedConstantValue, FileRange)],
    call_range: FileRange,
) -> CompileResult<Type> {
    let definition = polymorphic_struct.definition();
    let parameter_count = polymorphic_struct.parameter_types.len();

    if arguments.len() != parameter_count {
        return Err(error(
            scope,
            call_range,
            format!(
                "Incorrect struct parameter count: expected {}, got {}",
                parameter_count,
                arguments.len()
            ),
        ));
    }

    let mut constant_parameters = Vec::with_capacity(parameter_count);
    for (i, (argument, argument_range)) in arguments.iter().enumerate() {
        let value = coerce_constant_to_type(
            info,
            scope,
            *argument_range,
            &argument.ty,
            &argument.value,
            &polymorphic_struct.parameter_types[i],
        )?;
        constant_parameters.push(ConstantParameter {
            name: definition.parameters[i].name.text.clone(),
            parameter_type: polymorphic_struct.parameter_types[i].clone(),
            value,
        });
    }

    let member_scope = ConstantScope::child(
        &polymorphic_struct.parent,
        &definition.name.text,
        Rc::new(Vec::new()),
        constant_parameters,
    );

    let members = resolve_struct_members(
        info,
        &member_scope,
        files,
        &polymorphic_struct.definition,
        definition,
    )?;

    Ok(Type::Struct(StructType {
        definition: Rc::clone(&polymorphic_struct.definition),
        members,
    }))
}

// ═══════════════════════════════════════════════════════════════
//  The constant evaluator
// ═══════════════════════════════════════════════════════════════

pub fn evaluate_constant_expression(
    info: &GlobalInfo,
    scope: &Rc<ConstantScope>,
    files: &mut ModuleTable,
    expression: &Expression,
) -> CompileResult<TypedConstantValue> {
    match &expression.kind {
        ExpressionKind::NamedReference(name) => {
            resolve_constant_named_reference(info, scope, files, name)
        }

        ExpressionKind::MemberReference {
            expression: object,
            name,
        } => {
            let object_value = evaluate_constant_expression(info, scope, files, object)?;

            match &object_value.ty {
                Type::ArraySlice { element_type } => {
                    let (pointer, length) = match &object_value.value {
                        ConstantValue::Array { pointer, length } => (*pointer, *length),
                        _ => unreachable!("expected an array constant"),
                    };
                    if name.text == "length" {
                        Ok(TypedConstantValue {
                            ty: info.usize_type(),
                            value: ConstantValue::Integer(length),
                        })
                    } else if name.text == "pointer" {
                        Ok(TypedConstantValue {
                            ty: Type::Pointer(element_type.clone()),
                            value: ConstantValue::Pointer(pointer),
                        })
                    } else {
                        Err(error(
                            scope,
                            name.range,
                            format!("No member with name '{}'", name.text),
                        ))
                    }
                }

                Type::StaticArray { length, .. } => {
                    if name.text == "length" {
                        Ok(TypedConstantValue {
                            ty: info.usize_type(),
                            value: ConstantValue::Integer(*length),
                        })
                    } else if name.text == "pointer" {
                        Err(error(
                            scope,
                            name.range,
                            "Cannot take a pointer to a static array in a constant context"
                                .to_string(),
                        ))
                    } else {
                        Err(error(
                            scope,
                            name.range,
                            format!("No member with name '{}'", name.text),
                        ))
                    }
                }

                Type::Struct(struct_type) => {
                    let member_values = match &object_value.value {
                        ConstantValue::Struct(member_values) => member_values,
                        _ => unreachable!("expected a struct constant"),
                    };
                    for (i, member) in struct_type.members.iter().enumerate() {
                        if member.name == name.text {
                            return Ok(TypedConstantValue {
                                ty: member.member_type.clone(),
                                value: member_values[i].clone(),
                            });
                        }
                    }
                    Err(error(
                        scope,
                        name.range,
                        format!("No member with name '{}'", name.text),
                    ))
                }

                Type::UndeterminedStruct { members } => {
                    let member_values = match &object_value.value {
                        ConstantValue::Struct(member_values) => member_values,
                        _ => unreachable!("expected a struct constant"),
                    };
                    for (i, member) in members.iter().enumerate() {
                        if member.name == name.text {
                            return Ok(TypedConstantValue {
                                ty: member.member_type.clone(),
                                value: member_values[i].clone(),
                            });
                        }
                    }
                    Err(error(
                        scope,
                        name.range,
                        format!("No member with name '{}'", name.text),
                    ))
                }

                Type::FileModule => {
                    let module = match &object_value.value {
                        ConstantValue::FileModule(module) => module.clone(),
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
                            return resolve_declaration(info, &module_scope, files, statement);
                        }
                    }
                    Err(error(
                        scope,
                        name.range,
                        format!("No member with name '{}'", name.text),
                    ))
                }

                other => Err(error(
                    scope,
                    object.range,
                    format!("Type '{}' has no members", other),
                )),
            }
        }

        ExpressionKind::IndexReference {
            expression: object,
            index,
        } => {
            let object_value = evaluate_constant_expression(info, scope, files, object)?;
            let index_value = evaluate_constant_expression(info, scope, files, index)?;

            evaluate_constant_index(
                info,
                scope,
                &object_value.ty,
                &object_value.value,
                object.range,
                &index_value.ty,
                &index_value.value,
                index.range,
            )
        }

        ExpressionKind::IntegerLiteral(value) => Ok(TypedConstantValue {
            ty: Type::UndeterminedInteger,
            value: ConstantValue::Integer(*value),
        }),

        ExpressionKind::FloatLiteral(value) => Ok(TypedConstantValue {
            ty: Type::UndeterminedFloat,
            value: ConstantValue::Float(*value),
        }),

        ExpressionKind::StringLiteral(text) => {
            let characters: Vec<ConstantValue> = text
                .bytes()
                .map(|byte| ConstantValue::Integer(byte as u64))
                .collect();
            Ok(TypedConstantValue {
                ty: Type::StaticArray {
                    length: characters.len() as u64,
                    element_type: Box::new(Type::Integer {
                        size: RegisterSize::Size8,
                        is_signed: false,
                    }),
                },
                value: ConstantValue::StaticArray(characters),
            })
        }

        ExpressionKind::ArrayLiteral(elements) => {
            if elements.is_empty() {
                return Err(error(scope, expression.range, "Empty array literal".to_string()));
            }

            let first_element = evaluate_constant_expression(info, scope, files, &elements[0])?;
            let element_type =
                coerce_to_default_type(info, scope, elements[0].range, &first_element.ty)?;

            if !element_type.is_runtime_type() {
                return Err(error(
                    scope,
                    expression.range,
                    format!("Arrays cannot be of type '{}'", element_type),
                ));
            }

            let mut values = Vec::with_capacity(elements.len());
            let first_value = coerce_constant_to_type(
                info,
                scope,
                elements[0].range,
                &first_element.ty,
                &first_element.value,
                &element_type,
            )?;
            values.push(first_value);

            for element in &elements[1..] {
                let element_value = evaluate_constant_expression(info, scope, files, element)?;
                values.push(coerce_constant_to_type(
                    info,
                    scope,
                    element.range,
                    &element_value.ty,
                    &element_value.value,
                    &element_type,
                )?);
            }

            Ok(TypedConstantValue {
                ty: Type::StaticArray {
                    length: values.len() as u64,
                    element_type: Box::new(element_type),
                },
                value: ConstantValue::StaticArray(values),
            })
        }

        ExpressionKind::StructLiteral(literal_members) => {
            if literal_members.is_empty() {
                return Err(error(scope, expression.range, "Empty struct literal".to_string()));
            }

            let mut members = Vec::with_capacity(literal_members.len());
            let mut member_values = Vec::with_capacity(literal_members.len());

            for (i, member) in literal_members.iter().enumerate() {
                for (j, other) in literal_members.iter().enumerate() {
                    if i != j && member.name.text == other.name.text {
                        return Err(error(
                            scope,
                            member.name.range,
                            format!("Duplicate struct member {}", member.name.text),
                        ));
                    }
                }

                let value = evaluate_constant_expression(info, scope, files, &member.value)?;
                members.push(StructMember {
                    name: member.name.text.clone(),
                    member_type: value.ty,
                });
                member_values.push(value.value);
            }

            Ok(TypedConstantValue {
                ty: Type::UndeterminedStruct { members },
                value: ConstantValue::Struct(member_values),
            })
        }

        ExpressionKind::FunctionCall {
            expression: callee,
            parameters,
        } => {
            let callee_value = evaluate_constant_expression(info, scope, files, callee)?;

            match &callee_value.ty {
                Type::FunctionType { .. } | Type::PolymorphicFunction => Err(error(
                    scope,
                    expression.range,
                    "Function calls are not allowed in a constant context".to_string(),
                )),

                Type::BuiltinFunction => {
                    let builtin_name = match &callee_value.value {
                        ConstantValue::BuiltinFunction(name) => name.clone(),
                        _ => unreachable!("expected a builtin constant"),
                    };
                    evaluate_builtin_call(
                        info,
                        scope,
                        files,
                        &builtin_name,
                        parameters,
                        expression.range,
                    )
                }

                Type::TypeType => {
                    let ty = callee_value.value.unwrap_type().clone();
                    match ty {
                        Type::PolymorphicStruct(polymorphic_struct) => {
                            let mut arguments = Vec::with_capacity(parameters.len());
                            for parameter in parameters {
                                let argument =
                                    evaluate_constant_expression(info, scope, files, parameter)?;
                                arguments.push((argument, parameter.range));
                            }
                            let instantiated = instantiate_polymorphic_struct(
                                info,
                                scope,
                                files,
                                &polymorphic_struct,
                                &arguments,
                                expression.range,
                            )?;
                            Ok(TypedConstantValue {
                                ty: Type::TypeType,
                                value: ConstantValue::Type(instantiated),
                            })
                        }
                        other => Err(error(
                            scope,
                            callee.range,
                            format!("Type '{}' is not polymorphic", other),
                        )),
                    }
                }

                other => Err(error(
                    scope,
                    callee.range,
                    format!("Cannot call non-function '{}'", other),
                )),
            }
        }

        ExpressionKind::BinaryOperation {
            operator,
            left,
            right,
        } => {
            let left_value = evaluate_constant_expression(info, scope, files, left)?;
            let right_value = evaluate_constant_expression(info, scope, files, right)?;

            evaluate_constant_binary_operation(
                info,
                scope,
                expression.range,
                *operator,
                left.range,
                &left_value.ty,
                &left_value.value,
                right.range,
                &right_value.ty,
                &right_value.value,
            )
        }

        ExpressionKind::UnaryOperation {
            operator,
            expression: operand,
        } => {
            let operand_value = evaluate_constant_expression(info, scope, files, operand)?;

            match operator {
                UnaryOperator::Pointer => {
                    if let Type::TypeType = operand_value.ty {
                        let pointee = operand_value.value.unwrap_type().clone();
                        if !pointee.is_runtime_type()
                            && !matches!(pointee, Type::Void | Type::FunctionType { .. })
                        {
                            return Err(error(
                                scope,
                                operand.range,
                                format!("Cannot create pointers to type '{}'", pointee),
                            ));
                        }
                        Ok(TypedConstantValue {
                            ty: Type::TypeType,
                            value: ConstantValue::Type(Type::Pointer(Box::new(pointee))),
                        })
                    } else {
                        Err(error(
                            scope,
                            expression.range,
                            "Cannot take addresses at constant time".to_string(),
                        ))
                    }
                }

                UnaryOperator::PointerDereference => Err(error(
                    scope,
                    expression.range,
                    "Cannot dereference pointers in a constant context".to_string(),
                )),

                UnaryOperator::BooleanInvert => {
                    if let Type::Boolean = operand_value.ty {
                        Ok(TypedConstantValue {
                            ty: Type::Boolean,
                            value: ConstantValue::Boolean(!operand_value.value.unwrap_boolean()),
                        })
                    } else {
                        Err(error(
                            scope,
                            operand.range,
                            format!("Expected a boolean, got '{}'", operand_value.ty),
                        ))
                    }
                }

                UnaryOperator::Negation => match operand_value.ty {
                    Type::Integer { .. } | Type::UndeterminedInteger => Ok(TypedConstantValue {
                        ty: operand_value.ty,
                        value: ConstantValue::Integer(
                            operand_value.value.unwrap_integer().wrapping_neg(),
                        ),
                    }),
                    Type::Float { .. } | Type::UndeterminedFloat => Ok(TypedConstantValue {
                        ty: operand_value.ty,
                        value: ConstantValue::Float(-operand_value.value.unwrap_float()),
                    }),
                    other => Err(error(
                        scope,
                        operand.range,
                        format!("Cannot negate '{}'", other),
                    )),
                },
            }
        }

        ExpressionKind::Cast {
            expression: operand,
            target,
        } => {
            let operand_value = evaluate_constant_expression(info, scope, files, operand)?;
            let target_type = evaluate_type_expression(info, scope, files, target)?;

            let value = evaluate_constant_cast(
                info,
                scope,
                &operand_value.ty,
                &operand_value.value,
                operand.range,
                &target_type,
                target.range,
            )?;

            Ok(TypedConstantValue {
                ty: target_type,
                value,
            })
        }

        ExpressionKind::ArrayType { element, length } => {
            let element_type = evaluate_type_expression(info, scope, files, element)?;

            if !element_type.is_runtime_type() {
                return Err(error(
                    scope,
                    element.range,
                    format!("Cannot have arrays of type '{}'", element_type),
                ));
            }

            match length {
                Some(length_expression) => {
                    let length_value =
                        evaluate_constant_expression(info, scope, files, length_expression)?;
                    let length = coerce_constant_to_integer_type(
                        scope,
                        length_expression.range,
                        &length_value.ty,
                        &length_value.value,
                        info.address_integer_size,
                        false,
                    )?;
                    Ok(TypedConstantValue {
                        ty: Type::TypeType,
                        value: ConstantValue::Type(Type::StaticArray {
                            length,
                            element_type: Box::new(element_type),
                        }),
                    })
                }
                None => Ok(TypedConstantValue {
                    ty: Type::TypeType,
                    value: ConstantValue::Type(Type::ArraySlice {
                        element_type: Box::new(element_type),
                    }),
                }),
            }
        }

        ExpressionKind::FunctionType {
            parameters,
            return_type,
        } => {
            let mut parameter_types = Vec::with_capacity(parameters.len());
            for parameter in parameters {
                let type_expression = match &parameter.kind {
                    ParameterKind::Typed(type_expression) => type_expression,
                    ParameterKind::PolymorphicDeterminer(determiner) => {
                        return Err(error(
                            scope,
                            determiner.range,
                            "Function types cannot be polymorphic".to_string(),
                        ));
                    }
                };
                if parameter.is_constant {
                    return Err(error(
                        scope,
                        parameter.name.range,
                        "Function types cannot be polymorphic".to_string(),
                    ));
                }

                let parameter_type = evaluate_type_expression(info, scope, files, type_expression)?;
                if !parameter_type.is_runtime_type() {
                    return Err(error(
                        scope,
                        type_expression.range,
                        format!("Function parameters cannot be of type '{}'", parameter_type),
                    ));
                }
                parameter_types.push(parameter_type);
            }

            let resolved_return_type = match return_type {
                Some(return_expression) => {
                    let resolved = evaluate_type_expression(info, scope, files, return_expression)?;
                    if !resolved.is_runtime_type() {
                        return Err(error(
                            scope,
                            return_expression.range,
                            format!("Function returns cannot be of type '{}'", resolved),
                        ));
                    }
                    resolved
                }
                None => Type::Void,
            };

            Ok(TypedConstantValue {
                ty: Type::TypeType,
                value: ConstantValue::Type(Type::FunctionType {
                    parameters: parameter_types,
                    return_type: Box::new(resolved_return_type),
                }),
            })
        }
    }
}

fn evaluate_builtin_call(
    info: &GlobalInfo,
    scope: &Rc<ConstantScope>,
    files: &mut ModuleTable,
    builtin_name: &str,
    parameters: &[Expression],
    call_range: FileRange,
) -> CompileResult<TypedConstantValue> {
    match builtin_name {
        "size_of" => {
            if parameters.len() != 1 {
                return Err(error(
                    scope,
                    call_range,
                    format!("Incorrect parameter count. Expected 1 got {}", parameters.len()),
                ));
            }

            let parameter_value = evaluate_constant_expression(info, scope, files, &parameters[0])?;

            let ty = match &parameter_value.ty {
                Type::TypeType => parameter_value.value.unwrap_type().clone(),
                other => other.clone(),
            };

            if !ty.is_runtime_type() {
                return Err(error(
                    scope,
                    parameters[0].range,
                    format!("'{}' has no size", ty),
                ));
            }

            let size = type_size(info, &ty);

            Ok(TypedConstantValue {
                ty: info.usize_type(),
                value: ConstantValue::Integer(size),
            })
        }

        "type_of" => {
            if parameters.len() != 1 {
                return Err(error(
                    scope,
                    call_range,
                    format!("Incorrect parameter count. Expected 1 got {}", parameters.len()),
                ));
            }

            let parameter_value = evaluate_constant_expression(info, scope, files, &parameters[0])?;

            Ok(TypedConstantValue {
                ty: Type::TypeType,
                value: ConstantValue::Type(parameter_value.ty),
            })
        }

        _ => unreachable!("unknown builtin '{}'", builtin_name),
    }
}

pub fn evaluate_type_expression(
    info: &GlobalInfo,
    scope: &Rc<ConstantScope>,
    files: &mut ModuleTable,
    expression: &Expression,
) -> CompileResult<Type> {
    let value = evaluate_constant_expression(info, scope, files, expression)?;

    match value.ty {
        Type::TypeType => Ok(value.value.unwrap_type().clone()),
        other => Err(error(
            scope,
            expression.range,
            format!("Expected a type, got {}", other),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compiler::lexer::Lexer;
    use crate::compiler::parser::{self, Parser};
    use proptest::prelude::*;

    fn parse_expression(source: &str) -> Expression {
        let tokens = Lexer::new("test.cin", source).tokenize().expect("lex failed");
        let mut parser = Parser::new("test.cin", tokens);
        parser.parse_expression().expect("parse failed")
    }

    fn evaluate_with(declarations: &str, source: &str) -> CompileResult<TypedConstantValue> {
        let tokens = Lexer::new("test.cin", declarations)
            .tokenize()
            .expect("lex failed");
        let statements = Rc::new(parser::parse_tokens("test.cin", tokens).expect("parse failed"));
        let file = LoadedFile {
            path: Rc::from("test.cin"),
            statements,
        };
        let scope = ConstantScope::top_level(&file);
        let info = GlobalInfo::new(ArchitectureInfo::default());
        let mut files = ModuleTable::new();
        let expression = parse_expression(source);
        evaluate_constant_expression(&info, &scope, &mut files, &expression)
    }

    fn evaluate(source: &str) -> CompileResult<TypedConstantValue> {
        evaluate_with("", source)
    }

    #[test]
    fn test_arithmetic_constant_folds_to_undetermined_integer() {
        let result = evaluate("2 + 3 * 4").unwrap();
        assert!(matches!(result.ty, Type::UndeterminedInteger));
        assert_eq!(result.value.unwrap_integer(), 14);
    }

    #[test]
    fn test_float_promotion_in_mixed_arithmetic() {
        let result = evaluate("2 + 1.5").unwrap();
        assert!(matches!(result.ty, Type::UndeterminedFloat));
        assert_eq!(result.value.unwrap_float(), 3.5);
    }

    #[test]
    fn test_comparison_produces_boolean() {
        let result = evaluate("3 < 4").unwrap();
        assert!(matches!(result.ty, Type::Boolean));
        assert!(result.value.unwrap_boolean());
    }

    #[test]
    fn test_division_by_zero_is_diagnosed() {
        let result = evaluate("1 / 0");
        assert!(result.unwrap_err().message.contains("Division by zero"));
    }

    #[test]
    fn test_negation_of_literal() {
        let result = evaluate("-7").unwrap();
        assert_eq!(result.value.unwrap_integer() as i64, -7);
    }

    #[test]
    fn test_string_literal_is_byte_array() {
        let result = evaluate("\"hi\"").unwrap();
        match result.ty {
            Type::StaticArray {
                length,
                element_type,
            } => {
                assert_eq!(length, 2);
                assert_eq!(
                    *element_type,
                    Type::Integer {
                        size: RegisterSize::Size8,
                        is_signed: false
                    }
                );
            }
            other => panic!("expected a static array type, got {}", other),
        }
    }

    #[test]
    fn test_array_literal_infers_element_type_from_first() {
        let result = evaluate(".[1, 2, 3]").unwrap();
        match result.ty {
            Type::StaticArray {
                length,
                element_type,
            } => {
                assert_eq!(length, 3);
                // First element defaulted: i64 on the default architecture.
                assert_eq!(
                    *element_type,
                    Type::Integer {
                        size: RegisterSize::Size64,
                        is_signed: true
                    }
                );
            }
            other => panic!("expected a static array type, got {}", other),
        }
    }

    #[test]
    fn test_struct_literal_is_undetermined() {
        let result = evaluate(".{ pointer = 1, length = 2 }").unwrap();
        assert!(matches!(result.ty, Type::UndeterminedStruct { .. }));
    }

    #[test]
    fn test_duplicate_struct_literal_member_is_diagnosed() {
        let result = evaluate(".{ a = 1, a = 2 }");
        assert!(result.unwrap_err().message.contains("Duplicate struct member"));
    }

    #[test]
    fn test_constant_index_and_bounds() {
        let result = evaluate(".[10, 20, 30][1]").unwrap();
        assert_eq!(result.value.unwrap_integer(), 20);

        let result = evaluate(".[10, 20, 30][3]");
        assert!(result.unwrap_err().message.contains("out of bounds"));
    }

    #[test]
    fn test_named_reference_resolves_constant() {
        let result = evaluate_with("x :: 2 + 3 * 4;", "x").unwrap();
        assert!(matches!(result.ty, Type::UndeterminedInteger));
        assert_eq!(result.value.unwrap_integer(), 14);
    }

    #[test]
    fn test_unknown_reference_is_diagnosed() {
        let result = evaluate("nonsense");
        assert!(result
            .unwrap_err()
            .message
            .contains("Cannot find named reference"));
    }

    #[test]
    fn test_pointer_type_expression() {
        let result = evaluate("*i32").unwrap();
        assert!(matches!(result.ty, Type::TypeType));
        assert_eq!(
            *result.value.unwrap_type(),
            Type::Pointer(Box::new(Type::Integer {
                size: RegisterSize::Size32,
                is_signed: true
            }))
        );
    }

    #[test]
    fn test_array_type_expressions() {
        let result = evaluate("[]u8").unwrap();
        assert!(matches!(
            result.value.unwrap_type(),
            Type::ArraySlice { .. }
        ));

        let result = evaluate("[4]u8").unwrap();
        match result.value.unwrap_type() {
            Type::StaticArray { length, .. } => assert_eq!(*length, 4),
            other => panic!("expected a static array type, got {}", other),
        }
    }

    #[test]
    fn test_undetermined_integer_range_check() {
        let result = evaluate("cast(u8) 300").unwrap();
        assert_eq!(result.value.unwrap_integer(), 44);

        let info = GlobalInfo::new(ArchitectureInfo::default());
        let file = LoadedFile {
            path: Rc::from("test.cin"),
            statements: Rc::new(Vec::new()),
        };
        let scope = ConstantScope::top_level(&file);
        let result = coerce_constant_to_type(
            &info,
            &scope,
            FileRange::synthetic(),
            &Type::UndeterminedInteger,
            &ConstantValue::Integer(300),
            &Type::Integer {
                size: RegisterSize::Size8,
                is_signed: false,
            },
        );
        assert!(result.unwrap_err().message.contains("cannot fit"));
    }

    #[test]
    fn test_cast_pointer_to_usize() {
        let result = evaluate("cast(usize) cast(*u8) 4096").unwrap();
        assert_eq!(result.value.unwrap_integer(), 4096);
    }

    #[test]
    fn test_size_of_builtin() {
        let result = evaluate("size_of(i32)").unwrap();
        assert_eq!(result.value.unwrap_integer(), 4);

        let result = evaluate("size_of([]u8)").unwrap();
        assert_eq!(result.value.unwrap_integer(), 16);
    }

    #[test]
    fn test_type_of_builtin() {
        let result = evaluate("type_of(true)").unwrap();
        assert!(matches!(result.ty, Type::TypeType));
        assert_eq!(*result.value.unwrap_type(), Type::Boolean);
    }

    #[test]
    fn test_struct_definition_resolution() {
        let result = evaluate_with("Point :: struct { x: i32; y: i32; }", "Point").unwrap();
        assert!(matches!(result.ty, Type::TypeType));
        match result.value.unwrap_type() {
            Type::Struct(struct_type) => {
                assert_eq!(struct_type.members.len(), 2);
                assert_eq!(struct_type.members[0].name, "x");
            }
            other => panic!("expected a struct type, got {}", other),
        }
    }

    #[test]
    fn test_polymorphic_struct_instantiation() {
        let result =
            evaluate_with("Pair :: struct (T: type) { a: T; b: T; }", "Pair(i32)").unwrap();
        match result.value.unwrap_type() {
            Type::Struct(struct_type) => {
                assert_eq!(
                    struct_type.members[0].member_type,
                    Type::Integer {
                        size: RegisterSize::Size32,
                        is_signed: true
                    }
                );
            }
            other => panic!("expected a struct type, got {}", other),
        }
    }

    #[test]
    fn test_struct_member_constant_access() {
        let result = evaluate_with(
            "Pair :: struct (T: type) { a: T; b: T; }",
            "size_of(Pair(i32))",
        )
        .unwrap();
        assert_eq!(result.value.unwrap_integer(), 8);
    }

    #[test]
    fn test_function_call_rejected_at_constant_time() {
        let result = evaluate_with("f :: () -> i32 { return 1; }", "f()");
        assert!(result
            .unwrap_err()
            .message
            .contains("not allowed in a constant context"));
    }

    #[test]
    fn test_slice_coercion_from_structural_struct() {
        let info = GlobalInfo::new(ArchitectureInfo::default());
        let file = LoadedFile {
            path: Rc::from("test.cin"),
            statements: Rc::new(Vec::new()),
        };
        let scope = ConstantScope::top_level(&file);
        let literal = evaluate(".{ pointer = 4096, length = 4 }").unwrap();
        let target = Type::ArraySlice {
            element_type: Box::new(Type::Integer {
                size: RegisterSize::Size8,
                is_signed: false,
            }),
        };
        let coerced = coerce_constant_to_type(
            &info,
            &scope,
            FileRange::synthetic(),
            &literal.ty,
            &literal.value,
            &target,
        )
        .unwrap();
        match coerced {
            ConstantValue::Array { pointer, length } => {
                assert_eq!(pointer, 4096);
                assert_eq!(length, 4);
            }
            other => panic!("expected an array constant, got {:?}", other),
        }
    }

    #[test]
    fn test_default_type_rule() {
        let info = GlobalInfo::new(ArchitectureInfo::default());
        let file = LoadedFile {
            path: Rc::from("test.cin"),
            statements: Rc::new(Vec::new()),
        };
        let scope = ConstantScope::top_level(&file);
        let defaulted = coerce_to_default_type(
            &info,
            &scope,
            FileRange::synthetic(),
            &Type::UndeterminedInteger,
        )
        .unwrap();
        assert_eq!(
            defaulted,
            Type::Integer {
                size: RegisterSize::Size64,
                is_signed: true
            }
        );

        let failed = coerce_to_default_type(
            &info,
            &scope,
            FileRange::synthetic(),
            &Type::UndeterminedStruct { members: Vec::new() },
        );
        assert!(failed
            .unwrap_err()
            .message
            .contains("cannot exist at runtime"));
    }

    proptest! {
        #[test]
        fn prop_undetermined_arithmetic_matches_i64(a in -1000i64..1000, b in -1000i64..1000) {
            let result = evaluate(&format!("({}) + ({})", a, b)).unwrap();
            prop_assert_eq!(result.value.unwrap_integer() as i64, a.wrapping_add(b));

            let result = evaluate(&format!("({}) * ({})", a, b)).unwrap();
            prop_assert_eq!(result.value.unwrap_integer() as i64, a.wrapping_mul(b));
        }

        #[test]
        fn prop_comparisons_match_i64(a in -50i64..50, b in -50i64..50) {
            let result = evaluate(&format!("({}) < ({})", a, b)).unwrap();
            prop_assert_eq!(result.value.unwrap_boolean(), a < b);

            let result = evaluate(&format!("({}) == ({})", a, b)).unwrap();
            prop_assert_eq!(result.value.unwrap_boolean(), a == b);
        }
    }
}
