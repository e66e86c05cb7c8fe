//! The semantic type model: a single tagged sum with structural equality for
//! anonymous shapes and nominal equality (definition identity) for structs,
//! plus the layout rules that decide size, alignment and member offsets.

use crate::compiler::ast::{Statement, StatementKind, StructDefinition};
use crate::compiler::constant::{ConstantScope, GlobalInfo};
use crate::compiler::ir::RegisterSize;
use std::fmt;
use std::rc::Rc;

#[derive(Debug, Clone)]
pub enum Type {
    FunctionType {
        parameters: Vec<Type>,
        return_type: Box<Type>,
    },
    PolymorphicFunction,
    BuiltinFunction,
    Integer {
        size: RegisterSize,
        is_signed: bool,
    },
    UndeterminedInteger,
    Boolean,
    Float {
        size: RegisterSize,
    },
    UndeterminedFloat,
    /// The type of a type expression (`i32` itself has this type).
    TypeType,
    Void,
    Pointer(Box<Type>),
    /// Two-word `{pointer, length}` view of a contiguous run of elements.
    ArraySlice {
        element_type: Box<Type>,
    },
    StaticArray {
        length: u64,
        element_type: Box<Type>,
    },
    Struct(StructType),
    PolymorphicStruct(PolymorphicStructType),
    /// The structural type of a struct literal before coercion targets it.
    UndeterminedStruct {
        members: Vec<StructMember>,
    },
    FileModule,
}

#[derive(Debug, Clone)]
pub struct StructMember {
    pub name: String,
    pub member_type: Type,
}

#[derive(Debug, Clone)]
pub struct StructType {
    /// Identity handle: two structs are the same type only when they come
    /// from the same definition node.
    pub definition: Rc<Statement>,
    pub members: Vec<StructMember>,
}

#[derive(Debug, Clone)]
pub struct PolymorphicStructType {
    pub definition: Rc<Statement>,
    pub parameter_types: Vec<Type>,
    pub parent: Rc<ConstantScope>,
}

impl StructType {
    pub fn definition(&self) -> &StructDefinition {
        match &self.definition.kind {
            StatementKind::StructDefinition(definition) => definition,
            _ => unreachable!("struct type built from a non-struct declaration"),
        }
    }

    pub fn is_union(&self) -> bool {
        self.definition().is_union
    }
}

impl PolymorphicStructType {
    pub fn definition(&self) -> &StructDefinition {
        match &self.definition.kind {
            StatementKind::StructDefinition(definition) => definition,
            _ => unreachable!("polymorphic struct type built from a non-struct declaration"),
        }
    }
}

// ═══════════════════════════════════════════════════════════════
//  Equality
// ═══════════════════════════════════════════════════════════════

impl PartialEq for Type {
    fn eq(&self, other: &Type) -> bool {
        match (self, other) {
            (
                Type::FunctionType {
                    parameters: a_parameters,
                    return_type: a_return,
                },
                Type::FunctionType {
                    parameters: b_parameters,
                    return_type: b_return,
                },
            ) => a_parameters == b_parameters && a_return == b_return,
            // Unresolved function values never compare equal to anything.
            (Type::PolymorphicFunction, Type::PolymorphicFunction) => false,
            (Type::BuiltinFunction, Type::BuiltinFunction) => false,
            (
                Type::Integer {
                    size: a_size,
                    is_signed: a_signed,
                },
                Type::Integer {
                    size: b_size,
                    is_signed: b_signed,
                },
            ) => a_size == b_size && a_signed == b_signed,
            (Type::UndeterminedInteger, Type::UndeterminedInteger) => true,
            (Type::Boolean, Type::Boolean) => true,
            (Type::Float { size: a }, Type::Float { size: b }) => a == b,
            (Type::UndeterminedFloat, Type::UndeterminedFloat) => true,
            (Type::TypeType, Type::TypeType) => true,
            (Type::Void, Type::Void) => true,
            (Type::Pointer(a), Type::Pointer(b)) => a == b,
            (
                Type::ArraySlice { element_type: a },
                Type::ArraySlice { element_type: b },
            ) => a == b,
            (
                Type::StaticArray {
                    length: a_length,
                    element_type: a_element,
                },
                Type::StaticArray {
                    length: b_length,
                    element_type: b_element,
                },
            ) => a_length == b_length && a_element == b_element,
            (Type::Struct(a), Type::Struct(b)) => {
                Rc::ptr_eq(&a.definition, &b.definition)
                    && a.members.len() == b.members.len()
                    && a.members
                        .iter()
                        .zip(&b.members)
                        .all(|(a, b)| a.name == b.name && a.member_type == b.member_type)
            }
            (Type::PolymorphicStruct(a), Type::PolymorphicStruct(b)) => {
                Rc::ptr_eq(&a.definition, &b.definition)
            }
            (
                Type::UndeterminedStruct { members: a },
                Type::UndeterminedStruct { members: b },
            ) => {
                a.len() == b.len()
                    && a.iter()
                        .zip(b)
                        .all(|(a, b)| a.name == b.name && a.member_type == b.member_type)
            }
            (Type::FileModule, Type::FileModule) => true,
            _ => false,
        }
    }
}

// ═══════════════════════════════════════════════════════════════
//  Description
// ═══════════════════════════════════════════════════════════════

impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Type::FunctionType {
                parameters,
                return_type,
            } => {
                write!(f, "(")?;
                for (i, parameter) in parameters.iter().enumerate() {
                    if i != 0 {
                        write!(f, ",")?;
                    }
                    write!(f, "{}", parameter)?;
                }
                write!(f, ")")?;
                if **return_type != Type::Void {
                    write!(f, " -> {}", return_type)?;
                }
                Ok(())
            }
            Type::PolymorphicFunction => write!(f, "{{function}}"),
            Type::BuiltinFunction => write!(f, "{{builtin}}"),
            Type::Integer { size, is_signed } => {
                write!(f, "{}{}", if *is_signed { "i" } else { "u" }, size)
            }
            Type::UndeterminedInteger => write!(f, "{{integer}}"),
            Type::Boolean => write!(f, "bool"),
            Type::Float { size } => write!(f, "f{}", size),
            Type::UndeterminedFloat => write!(f, "{{float}}"),
            Type::TypeType => write!(f, "{{type}}"),
            Type::Void => write!(f, "void"),
            Type::Pointer(pointee) => write!(f, "*{}", pointee),
            Type::ArraySlice { element_type } => write!(f, "[]{}", element_type),
            Type::StaticArray {
                length,
                element_type,
            } => write!(f, "[{}]{}", length, element_type),
            Type::Struct(struct_type) => write!(f, "{}", struct_type.definition().name.text),
            Type::PolymorphicStruct(struct_type) => {
                write!(f, "{}", struct_type.definition().name.text)
            }
            Type::UndeterminedStruct { .. } => write!(f, "{{struct}}"),
            Type::FileModule => write!(f, "{{module}}"),
        }
    }
}

// ═══════════════════════════════════════════════════════════════
//  Predicates and layout
// ═══════════════════════════════════════════════════════════════

impl Type {
    /// Whether values of this type can be laid out in memory at run time.
    pub fn is_runtime_type(&self) -> bool {
        matches!(
            self,
            Type::Integer { .. }
                | Type::Boolean
                | Type::Float { .. }
                | Type::Pointer(_)
                | Type::ArraySlice { .. }
                | Type::StaticArray { .. }
                | Type::Struct(_)
        )
    }
}

pub fn type_alignment(info: &GlobalInfo, ty: &Type) -> u64 {
    match ty {
        Type::Integer { size, .. } => size.byte_size(),
        Type::Boolean => info.default_integer_size.byte_size(),
        Type::Float { size } => size.byte_size(),
        Type::Pointer(_) => info.address_integer_size.byte_size(),
        Type::ArraySlice { .. } => info.address_integer_size.byte_size(),
        Type::StaticArray { element_type, .. } => type_alignment(info, element_type),
        Type::Struct(struct_type) => struct_alignment(info, struct_type),
        _ => unreachable!("type '{}' has no alignment", ty),
    }
}

pub fn type_size(info: &GlobalInfo, ty: &Type) -> u64 {
    match ty {
        Type::Integer { size, .. } => size.byte_size(),
        Type::Boolean => info.default_integer_size.byte_size(),
        Type::Float { size } => size.byte_size(),
        Type::Pointer(_) => info.address_integer_size.byte_size(),
        Type::ArraySlice { .. } => 2 * info.address_integer_size.byte_size(),
        Type::StaticArray {
            length,
            element_type,
        } => length * type_size(info, element_type),
        Type::Struct(struct_type) => struct_size(info, struct_type),
        _ => unreachable!("type '{}' has no size", ty),
    }
}

pub fn struct_alignment(info: &GlobalInfo, struct_type: &StructType) -> u64 {
    let mut current_alignment = 1;
    for member in &struct_type.members {
        let alignment = type_alignment(info, &member.member_type);
        if alignment > current_alignment {
            current_alignment = alignment;
        }
    }
    current_alignment
}

pub fn struct_size(info: &GlobalInfo, struct_type: &StructType) -> u64 {
    let mut current_size: u64 = 0;
    for member in &struct_type.members {
        if struct_type.is_union() {
            let size = type_size(info, &member.member_type);
            if size > current_size {
                current_size = size;
            }
        } else {
            let alignment = type_alignment(info, &member.member_type);
            let misalignment = current_size % alignment;
            if misalignment != 0 {
                current_size += alignment - misalignment;
            }
            current_size += type_size(info, &member.member_type);
        }
    }
    current_size
}

pub fn struct_member_offset(info: &GlobalInfo, struct_type: &StructType, member_index: usize) -> u64 {
    if struct_type.is_union() {
        return 0;
    }

    let mut current_offset: u64 = 0;
    for member in &struct_type.members[..member_index] {
        let alignment = type_alignment(info, &member.member_type);
        let misalignment = current_offset % alignment;
        if misalignment != 0 {
            current_offset += alignment - misalignment;
        }
        current_offset += type_size(info, &member.member_type);
    }

    let alignment = type_alignment(info, &struct_type.members[member_index].member_type);
    let misalignment = current_offset % alignment;
    if misalignment != 0 {
        current_offset += alignment - misalignment;
    }
    current_offset
}

// ═══════════════════════════════════════════════════════════════
//  Register representation
// ═══════════════════════════════════════════════════════════════

/// Whether a runtime value lives in a register (scalars) or at an address
/// (aggregates), and how wide the register is. Aggregates are passed and
/// returned by address.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RegisterRepresentation {
    pub is_in_register: bool,
    pub value_size: RegisterSize,
    pub is_float: bool,
}

pub fn type_representation(info: &GlobalInfo, ty: &Type) -> RegisterRepresentation {
    match ty {
        Type::Integer { size, .. } => RegisterRepresentation {
            is_in_register: true,
            value_size: *size,
            is_float: false,
        },
        Type::Boolean => RegisterRepresentation {
            is_in_register: true,
            value_size: info.default_integer_size,
            is_float: false,
        },
        Type::Float { size } => RegisterRepresentation {
            is_in_register: true,
            value_size: *size,
            is_float: true,
        },
        Type::Pointer(_) => RegisterRepresentation {
            is_in_register: true,
            value_size: info.address_integer_size,
            is_float: false,
        },
        Type::ArraySlice { .. } | Type::StaticArray { .. } | Type::Struct(_) => {
            RegisterRepresentation {
                is_in_register: false,
                value_size: info.address_integer_size,
                is_float: false,
            }
        }
        _ => unreachable!("type '{}' has no runtime representation", ty),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compiler::ast::Identifier;
    use crate::compiler::span::FileRange;

    fn test_info() -> GlobalInfo {
        GlobalInfo::new(crate::compiler::ir::ArchitectureInfo::default())
    }

    fn struct_statement(name: &str, is_union: bool) -> Rc<Statement> {
        Rc::new(Statement {
            kind: StatementKind::StructDefinition(StructDefinition {
                name: Identifier {
                    text: name.to_string(),
                    range: FileRange::synthetic(),
                },
                parameters: Vec::new(),
                members: Vec::new(),
                is_union,
            }),
            range: FileRange::synthetic(),
        })
    }

    fn i32_type() -> Type {
        Type::Integer {
            size: RegisterSize::Size32,
            is_signed: true,
        }
    }

    fn u8_type() -> Type {
        Type::Integer {
            size: RegisterSize::Size8,
            is_signed: false,
        }
    }

    fn make_struct(definition: &Rc<Statement>, members: Vec<(&str, Type)>) -> StructType {
        StructType {
            definition: Rc::clone(definition),
            members: members
                .into_iter()
                .map(|(name, member_type)| StructMember {
                    name: name.to_string(),
                    member_type,
                })
                .collect(),
        }
    }

    #[test]
    fn test_identical_layout_distinct_definitions_are_unequal() {
        let a_definition = struct_statement("A", false);
        let b_definition = struct_statement("B", false);
        let a = Type::Struct(make_struct(&a_definition, vec![("x", i32_type())]));
        let b = Type::Struct(make_struct(&b_definition, vec![("x", i32_type())]));
        assert_ne!(a, b);

        let a_again = Type::Struct(make_struct(&a_definition, vec![("x", i32_type())]));
        assert_eq!(a, a_again);
    }

    #[test]
    fn test_pointer_equality_requires_equal_pointee() {
        let a = Type::Pointer(Box::new(i32_type()));
        let b = Type::Pointer(Box::new(u8_type()));
        let c = Type::Pointer(Box::new(i32_type()));
        assert_ne!(a, b);
        assert_eq!(a, c);
    }

    #[test]
    fn test_struct_layout_pads_members() {
        let info = test_info();
        let definition = struct_statement("S", false);
        let s = make_struct(&definition, vec![("a", u8_type()), ("b", i32_type())]);
        assert_eq!(struct_member_offset(&info, &s, 0), 0);
        assert_eq!(struct_member_offset(&info, &s, 1), 4);
        assert_eq!(struct_size(&info, &s), 8);
        assert_eq!(struct_alignment(&info, &s), 4);
    }

    #[test]
    fn test_union_layout_is_max_member_at_offset_zero() {
        let info = test_info();
        let definition = struct_statement("U", true);
        let u = make_struct(
            &definition,
            vec![
                ("i", i32_type()),
                (
                    "f",
                    Type::Float {
                        size: RegisterSize::Size32,
                    },
                ),
            ],
        );
        assert_eq!(struct_size(&info, &u), 4);
        assert_eq!(struct_member_offset(&info, &u, 0), 0);
        assert_eq!(struct_member_offset(&info, &u, 1), 0);
    }

    #[test]
    fn test_slice_is_two_words() {
        let info = test_info();
        let slice = Type::ArraySlice {
            element_type: Box::new(i32_type()),
        };
        assert_eq!(type_size(&info, &slice), 16);
        assert_eq!(type_alignment(&info, &slice), 8);
    }

    #[test]
    fn test_static_array_size_uses_element_size() {
        let info = test_info();
        let array = Type::StaticArray {
            length: 3,
            element_type: Box::new(i32_type()),
        };
        assert_eq!(type_size(&info, &array), 12);
        assert_eq!(type_alignment(&info, &array), 4);
    }

    #[test]
    fn test_description() {
        assert_eq!(i32_type().to_string(), "i32");
        assert_eq!(
            Type::Pointer(Box::new(u8_type())).to_string(),
            "*u8"
        );
        assert_eq!(
            Type::StaticArray {
                length: 4,
                element_type: Box::new(u8_type())
            }
            .to_string(),
            "[4]u8"
        );
        assert_eq!(Type::UndeterminedInteger.to_string(), "{integer}");
    }
}
