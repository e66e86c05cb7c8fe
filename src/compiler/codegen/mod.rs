//! IR generation: lowers each reachable function body into a flat list of
//! virtual-register instructions.
//!
//! The driver registers `main` as the first runtime function and then keeps
//! generating until the worklist is closed; lowering a body may register
//! further functions (direct calls, polymorphic instantiations) and static
//! constants (materialised aggregate literals). Registration is idempotent
//! on the mangled name.

mod coercion;
mod expressions;
mod statements;

use crate::compiler::ast::*;
use crate::compiler::constant::*;
use crate::compiler::diagnostics::{CompileError, CompileResult};
use crate::compiler::ir::*;
use crate::compiler::modules::{self, LoadedFile, ModuleTable};
use crate::compiler::span::FileRange;
use crate::compiler::types::*;
use std::rc::Rc;

// ═══════════════════════════════════════════════════════════════
//  Runtime values
// ═══════════════════════════════════════════════════════════════

/// A value during lowering. Constants are deferred until a register or
/// memory write is actually needed; `Address` is the L-value form.
#[derive(Debug, Clone)]
pub enum RuntimeValue {
    Constant(ConstantValue),
    /// A scalar held in a register, or an aggregate whose storage address
    /// is the register (aggregates are always handled by address).
    Register(usize),
    /// A register holding the address of the value.
    Address(usize),
    /// A struct literal that has not been materialised yet.
    UndeterminedStruct(Vec<TypedRuntimeValue>),
}

#[derive(Debug, Clone)]
pub struct TypedRuntimeValue {
    pub ty: Type,
    pub value: RuntimeValue,
}

impl TypedRuntimeValue {
    pub fn constant(&self) -> Option<&ConstantValue> {
        match &self.value {
            RuntimeValue::Constant(value) => Some(value),
            _ => None,
        }
    }
}

/// A local variable: its storage is always addressed so it can be assigned.
#[derive(Debug, Clone)]
pub struct Variable {
    pub name: Identifier,
    pub variable_type: Type,
    #[allow(dead_code)]
    pub type_range: FileRange,
    pub address_register: usize,
}

// ═══════════════════════════════════════════════════════════════
//  Worklist entries
// ═══════════════════════════════════════════════════════════════

#[derive(Debug, Clone)]
pub struct RuntimeParameter {
    pub name: Identifier,
    pub parameter_type: Type,
}

#[derive(Debug, Clone)]
struct RuntimeFunctionEntry {
    mangled_name: String,
    parameters: Vec<RuntimeParameter>,
    return_type: Type,
    declaration: Rc<Statement>,
    /// Scope the declaration was resolved in; the body scope is built as a
    /// child of this.
    scope: Rc<ConstantScope>,
    constant_parameters: Vec<ConstantParameter>,
    is_external: bool,
}

/// Cache of polymorphic instantiations, keyed on the declaration node plus
/// the bound constant-parameter tuple. A hit reuses the mangled name, so
/// identical call sites share one runtime function.
#[derive(Debug, Clone)]
struct Instantiation {
    declaration: Rc<Statement>,
    constant_parameters: Vec<ConstantParameter>,
    mangled_name: String,
    parameter_types: Vec<Type>,
    return_type: Type,
}

// ═══════════════════════════════════════════════════════════════
//  The generator
// ═══════════════════════════════════════════════════════════════

pub struct Codegen {
    pub info: GlobalInfo,
    pub files: ModuleTable,

    // Per-function state.
    scope: Rc<ConstantScope>,
    return_type: Type,
    return_address_register: Option<usize>,
    variable_stack: Vec<Vec<Variable>>,
    next_register: usize,

    // Whole-build state.
    runtime_functions: Vec<RuntimeFunctionEntry>,
    instantiations: Vec<Instantiation>,
    global_names: Vec<String>,
    statics: Vec<RuntimeStatic>,
}

impl Codegen {
    pub fn new(info: GlobalInfo, files: ModuleTable, root: &LoadedFile) -> Self {
        Self {
            info,
            files,
            scope: ConstantScope::top_level(root),
            return_type: Type::Void,
            return_address_register: None,
            variable_stack: Vec::new(),
            next_register: 0,
            runtime_functions: Vec::new(),
            instantiations: Vec::new(),
            global_names: Vec::new(),
            statics: Vec::new(),
        }
    }

    // ── Small helpers ────────────────────────────────────────────

    pub fn error(&self, range: FileRange, message: String) -> CompileError {
        CompileError::new(self.scope.file_path.to_string(), range, message)
    }

    pub fn allocate_register(&mut self) -> usize {
        let index = self.next_register;
        self.next_register += 1;
        index
    }

    pub fn scope(&self) -> Rc<ConstantScope> {
        Rc::clone(&self.scope)
    }

    pub fn usize_type(&self) -> Type {
        self.info.usize_type()
    }

    // ── Variables ────────────────────────────────────────────────

    pub fn push_variable_scope(&mut self) {
        self.variable_stack.push(Vec::new());
    }

    pub fn pop_variable_scope(&mut self) {
        self.variable_stack.pop();
    }

    pub fn add_variable(
        &mut self,
        name: Identifier,
        variable_type: Type,
        type_range: FileRange,
        address_register: usize,
    ) -> CompileResult<()> {
        let innermost = self
            .variable_stack
            .last_mut()
            .expect("variable scope stack is empty");
        for variable in innermost.iter() {
            if variable.name.text == name.text {
                return Err(CompileError::new(
                    self.scope.file_path.to_string(),
                    name.range,
                    format!("Duplicate variable name {}", name.text),
                ));
            }
        }
        innermost.push(Variable {
            name,
            variable_type,
            type_range,
            address_register,
        });
        Ok(())
    }

    pub fn find_variable(&self, name: &str) -> Option<&Variable> {
        for variables in self.variable_stack.iter().rev() {
            for variable in variables {
                if variable.name.text == name {
                    return Some(variable);
                }
            }
        }
        None
    }

    // ── Instruction helpers ──────────────────────────────────────

    pub fn append_integer_constant(
        &mut self,
        instructions: &mut Vec<Instruction>,
        size: RegisterSize,
        value: u64,
    ) -> usize {
        let destination = self.allocate_register();
        instructions.push(Instruction::IntegerConstant {
            size,
            destination,
            value,
        });
        destination
    }

    pub fn append_float_constant(
        &mut self,
        instructions: &mut Vec<Instruction>,
        size: RegisterSize,
        value: f64,
    ) -> usize {
        let destination = self.allocate_register();
        instructions.push(Instruction::FloatConstant {
            size,
            destination,
            value,
        });
        destination
    }

    pub fn append_allocate_local(
        &mut self,
        instructions: &mut Vec<Instruction>,
        size: u64,
        alignment: u64,
    ) -> usize {
        let destination_register = self.allocate_register();
        instructions.push(Instruction::AllocateLocal {
            size,
            alignment,
            destination_register,
        });
        destination_register
    }

    pub fn append_load_scalar(
        &mut self,
        instructions: &mut Vec<Instruction>,
        representation: RegisterRepresentation,
        address_register: usize,
    ) -> usize {
        let destination_register = self.allocate_register();
        if representation.is_float {
            instructions.push(Instruction::LoadFloat {
                size: representation.value_size,
                address_register,
                destination_register,
            });
        } else {
            instructions.push(Instruction::LoadInteger {
                size: representation.value_size,
                address_register,
                destination_register,
            });
        }
        destination_register
    }

    pub fn append_store_scalar(
        &mut self,
        instructions: &mut Vec<Instruction>,
        representation: RegisterRepresentation,
        source_register: usize,
        address_register: usize,
    ) {
        if representation.is_float {
            instructions.push(Instruction::StoreFloat {
                size: representation.value_size,
                source_register,
                address_register,
            });
        } else {
            instructions.push(Instruction::StoreInteger {
                size: representation.value_size,
                source_register,
                address_register,
            });
        }
    }

    /// `address + constant offset`, reusing the base register when the
    /// offset is zero.
    pub fn append_address_offset(
        &mut self,
        instructions: &mut Vec<Instruction>,
        address_register: usize,
        offset: u64,
    ) -> usize {
        if offset == 0 {
            return address_register;
        }
        let address_size = self.info.address_integer_size;
        let offset_register = self.append_integer_constant(instructions, address_size, offset);
        let destination = self.allocate_register();
        instructions.push(Instruction::IntegerArithmetic {
            operation: IntegerArithmeticOperation::Add,
            size: address_size,
            source_a: address_register,
            source_b: offset_register,
            destination,
        });
        destination
    }

    /// Boolean inversion stays within the instruction set: `x == 0` at the
    /// boolean's storage size.
    pub fn append_boolean_invert(
        &mut self,
        instructions: &mut Vec<Instruction>,
        source_register: usize,
    ) -> usize {
        let size = self.info.default_integer_size;
        let zero = self.append_integer_constant(instructions, size, 0);
        let destination = self.allocate_register();
        instructions.push(Instruction::IntegerComparison {
            operation: IntegerComparisonOperation::Equal,
            size,
            source_a: source_register,
            source_b: zero,
            destination,
        });
        destination
    }

    // ── Materialisation ──────────────────────────────────────────

    /// Turn a value with a concrete type into a register: scalars load or
    /// materialise into a register, aggregates yield their storage address
    /// (constants are serialised into a static first).
    pub fn generate_register_value(
        &mut self,
        instructions: &mut Vec<Instruction>,
        range: FileRange,
        value: &TypedRuntimeValue,
    ) -> CompileResult<usize> {
        let representation = type_representation(&self.info, &value.ty);

        match &value.value {
            RuntimeValue::Register(register) => Ok(*register),

            RuntimeValue::Address(address_register) => {
                if representation.is_in_register {
                    Ok(self.append_load_scalar(instructions, representation, *address_register))
                } else {
                    Ok(*address_register)
                }
            }

            RuntimeValue::Constant(constant) => {
                if representation.is_in_register {
                    Ok(self.append_scalar_constant(instructions, &value.ty, constant))
                } else {
                    let name = self.register_static_constant(&value.ty, constant);
                    let destination_register = self.allocate_register();
                    instructions.push(Instruction::ReferenceStatic {
                        name,
                        destination_register,
                    });
                    Ok(destination_register)
                }
            }

            RuntimeValue::UndeterminedStruct(_) => Err(self.error(
                range,
                "Undetermined struct types cannot exist at runtime".to_string(),
            )),
        }
    }

    pub fn append_scalar_constant(
        &mut self,
        instructions: &mut Vec<Instruction>,
        ty: &Type,
        constant: &ConstantValue,
    ) -> usize {
        match ty {
            Type::Integer { size, .. } => {
                self.append_integer_constant(instructions, *size, constant.unwrap_integer())
            }
            Type::Boolean => {
                let value = if constant.unwrap_boolean() { 1 } else { 0 };
                let size = self.info.default_integer_size;
                self.append_integer_constant(instructions, size, value)
            }
            Type::Float { size } => {
                self.append_float_constant(instructions, *size, constant.unwrap_float())
            }
            Type::Pointer(_) => {
                let address = match constant {
                    ConstantValue::Pointer(address) => *address,
                    _ => unreachable!("expected a pointer constant"),
                };
                let size = self.info.address_integer_size;
                self.append_integer_constant(instructions, size, address)
            }
            _ => unreachable!("'{}' is not a scalar type", ty),
        }
    }

    // ── Static data ──────────────────────────────────────────────

    /// Serialise a constant aggregate into static data and register it,
    /// returning the static's name.
    pub fn register_static_constant(&mut self, ty: &Type, value: &ConstantValue) -> String {
        let name = format!("constant_{}", self.statics.len());
        let mut data = vec![0u8; type_size(&self.info, ty) as usize];
        self.serialize_constant(&mut data, 0, ty, value);
        let alignment = type_alignment(&self.info, ty);
        self.statics.push(RuntimeStatic::Constant(StaticConstant {
            name: name.clone(),
            data,
            alignment,
        }));
        name
    }

    /// Write a constant into `data` at `offset` following the layout rules:
    /// little-endian integers, IEEE-754 floats, booleans at the default
    /// integer size, slices as pointer then length, static arrays packed at
    /// the element size, struct members at their computed offsets (unions at
    /// offset zero).
    fn serialize_constant(&self, data: &mut [u8], offset: usize, ty: &Type, value: &ConstantValue) {
        let write_integer = |data: &mut [u8], offset: usize, size: RegisterSize, value: u64| {
            let bytes = value.to_le_bytes();
            let count = size.byte_size() as usize;
            data[offset..offset + count].copy_from_slice(&bytes[..count]);
        };

        match ty {
            Type::Integer { size, .. } => {
                write_integer(data, offset, *size, value.unwrap_integer());
            }
            Type::Boolean => {
                let bit = if value.unwrap_boolean() { 1 } else { 0 };
                write_integer(data, offset, self.info.default_integer_size, bit);
            }
            Type::Float { size } => match size {
                RegisterSize::Size32 => {
                    let bits = (value.unwrap_float() as f32).to_le_bytes();
                    data[offset..offset + 4].copy_from_slice(&bits);
                }
                _ => {
                    let bits = value.unwrap_float().to_le_bytes();
                    data[offset..offset + 8].copy_from_slice(&bits);
                }
            },
            Type::Pointer(_) => {
                let address = match value {
                    ConstantValue::Pointer(address) => *address,
                    _ => unreachable!("expected a pointer constant"),
                };
                write_integer(data, offset, self.info.address_integer_size, address);
            }
            Type::ArraySlice { .. } => {
                let (pointer, length) = match value {
                    ConstantValue::Array { pointer, length } => (*pointer, *length),
                    _ => unreachable!("expected an array constant"),
                };
                let word = self.info.address_integer_size;
                write_integer(data, offset, word, pointer);
                write_integer(data, offset + word.byte_size() as usize, word, length);
            }
            Type::StaticArray { element_type, .. } => {
                let elements = match value {
                    ConstantValue::StaticArray(elements) => elements,
                    _ => unreachable!("expected a static array constant"),
                };
                let stride = type_size(&self.info, element_type) as usize;
                for (i, element) in elements.iter().enumerate() {
                    self.serialize_constant(data, offset + i * stride, element_type, element);
                }
            }
            Type::Struct(struct_type) => {
                let members = match value {
                    ConstantValue::Struct(members) => members,
                    _ => unreachable!("expected a struct constant"),
                };
                for (i, member_value) in members.iter().enumerate() {
                    // Inactive union members are `Void` placeholders.
                    if matches!(member_value, ConstantValue::Void) {
                        continue;
                    }
                    let member_offset = struct_member_offset(&self.info, struct_type, i) as usize;
                    self.serialize_constant(
                        data,
                        offset + member_offset,
                        &struct_type.members[i].member_type,
                        member_value,
                    );
                }
            }
            _ => unreachable!("'{}' cannot be serialised into static data", ty),
        }
    }

    // ── Mangled names and registration ───────────────────────────

    /// Mangled-name rule: the declaration name, each enclosing declaration
    /// name outward, then the stem of the owning file, joined with `_`.
    /// External functions keep their source name verbatim.
    fn mangled_name(&self, declaration_name: &str, scope: &ConstantScope) -> String {
        let mut name = declaration_name.to_string();
        let mut current = Some(scope);
        while let Some(current_scope) = current {
            if let Some(enclosing) = &current_scope.declaration_name {
                name.push('_');
                name.push_str(enclosing);
            }
            if current_scope.parent.is_none() {
                name.push('_');
                name.push_str(modules::file_stem(&current_scope.file_path));
            }
            current = current_scope.parent.as_deref();
        }
        name
    }

    fn register_global_name(&mut self, name: &str, range: FileRange) -> CompileResult<()> {
        for registered in &self.global_names {
            if registered == name {
                return Err(self.error(range, format!("Duplicate global name {}", name)));
            }
        }
        self.global_names.push(name.to_string());
        Ok(())
    }

    /// Register a runtime function if its mangled name is new. Idempotent.
    fn register_runtime_function(&mut self, entry: RuntimeFunctionEntry, range: FileRange) -> CompileResult<()> {
        for existing in &self.runtime_functions {
            if existing.mangled_name == entry.mangled_name {
                return Ok(());
            }
        }
        let mangled_name = entry.mangled_name.clone();
        self.register_global_name(&mangled_name, range)?;
        tracing::debug!(name = %entry.mangled_name, "registered runtime function");
        self.runtime_functions.push(entry);
        Ok(())
    }

    /// Register a direct (non-polymorphic) callee, returning its mangled
    /// name.
    pub fn register_function_reference(
        &mut self,
        function: &FunctionConstant,
        parameter_types: &[Type],
        return_type: &Type,
        range: FileRange,
    ) -> CompileResult<String> {
        let declaration = function.declaration();
        let mangled_name = if declaration.is_external {
            declaration.name.text.clone()
        } else {
            self.mangled_name(&declaration.name.text, &function.parent)
        };

        let parameters = declaration
            .parameters
            .iter()
            .zip(parameter_types)
            .map(|(parameter, parameter_type)| RuntimeParameter {
                name: parameter.name.clone(),
                parameter_type: parameter_type.clone(),
            })
            .collect();

        self.register_runtime_function(
            RuntimeFunctionEntry {
                mangled_name: mangled_name.clone(),
                parameters,
                return_type: return_type.clone(),
                declaration: Rc::clone(&function.declaration),
                scope: Rc::clone(&function.parent),
                constant_parameters: Vec::new(),
                is_external: declaration.is_external,
            },
            range,
        )?;

        Ok(mangled_name)
    }

    /// Register (or reuse) a polymorphic instantiation. Returns the mangled
    /// name, the runtime parameter types and the return type.
    pub fn register_instantiation(
        &mut self,
        function: &FunctionConstant,
        constant_parameters: Vec<ConstantParameter>,
        runtime_parameters: Vec<RuntimeParameter>,
        return_type: Type,
        range: FileRange,
    ) -> CompileResult<String> {
        for instantiation in &self.instantiations {
            if Rc::ptr_eq(&instantiation.declaration, &function.declaration)
                && constant_parameter_tuples_equal(
                    &instantiation.constant_parameters,
                    &constant_parameters,
                )
            {
                return Ok(instantiation.mangled_name.clone());
            }
        }

        let mangled_name = format!("function_{}", self.runtime_functions.len());
        tracing::debug!(
            name = %mangled_name,
            declaration = %function.declaration().name.text,
            "instantiating polymorphic function"
        );

        self.instantiations.push(Instantiation {
            declaration: Rc::clone(&function.declaration),
            constant_parameters: constant_parameters.clone(),
            mangled_name: mangled_name.clone(),
            parameter_types: runtime_parameters
                .iter()
                .map(|parameter| parameter.parameter_type.clone())
                .collect(),
            return_type: return_type.clone(),
        });

        self.register_runtime_function(
            RuntimeFunctionEntry {
                mangled_name: mangled_name.clone(),
                parameters: runtime_parameters,
                return_type,
                declaration: Rc::clone(&function.declaration),
                scope: Rc::clone(&function.parent),
                constant_parameters,
                is_external: false,
            },
            range,
        )?;

        Ok(mangled_name)
    }

    // ── Function generation ──────────────────────────────────────

    fn generate_function(&mut self, entry: &RuntimeFunctionEntry) -> CompileResult<IrFunction> {
        let declaration = match &entry.declaration.kind {
            StatementKind::FunctionDeclaration(declaration) => declaration,
            _ => unreachable!("runtime function entry is not a function declaration"),
        };

        let mut parameters: Vec<IrParameter> = entry
            .parameters
            .iter()
            .map(|parameter| {
                let representation = type_representation(&self.info, &parameter.parameter_type);
                IrParameter {
                    size: representation.value_size,
                    is_float: representation.is_float,
                }
            })
            .collect();

        let return_representation = if matches!(entry.return_type, Type::Void) {
            None
        } else {
            Some(type_representation(&self.info, &entry.return_type))
        };
        let returns_by_reference =
            matches!(return_representation, Some(representation) if !representation.is_in_register);
        if returns_by_reference {
            parameters.push(IrParameter {
                size: self.info.address_integer_size,
                is_float: false,
            });
        }

        if entry.is_external {
            return Ok(IrFunction {
                name: entry.mangled_name.clone(),
                is_external: true,
                parameters,
                return_representation: return_representation
                    .filter(|representation| representation.is_in_register)
                    .map(|representation| IrParameter {
                        size: representation.value_size,
                        is_float: representation.is_float,
                    }),
                returns_by_reference,
                path: entry.scope.file_path.to_string(),
                line: entry.declaration.range.first_line,
                instructions: Vec::new(),
            });
        }

        // Fresh per-function state: the register counter restarts at the
        // parameter registers.
        self.scope = ConstantScope::child(
            &entry.scope,
            &declaration.name.text,
            Rc::clone(&declaration.statements),
            entry.constant_parameters.clone(),
        );
        self.return_type = entry.return_type.clone();
        self.variable_stack = vec![Vec::new()];
        self.next_register = 0;

        let mut instructions = Vec::new();

        for parameter in &entry.parameters {
            let parameter_register = self.allocate_register();
            let representation = type_representation(&self.info, &parameter.parameter_type);
            let address_register = if representation.is_in_register {
                // Spill incoming scalars so parameters are assignable.
                let size = type_size(&self.info, &parameter.parameter_type);
                let alignment = type_alignment(&self.info, &parameter.parameter_type);
                let local = self.append_allocate_local(&mut instructions, size, alignment);
                self.append_store_scalar(
                    &mut instructions,
                    representation,
                    parameter_register,
                    local,
                );
                local
            } else {
                parameter_register
            };
            self.add_variable(
                parameter.name.clone(),
                parameter.parameter_type.clone(),
                parameter.name.range,
                address_register,
            )?;
        }

        self.return_address_register = if returns_by_reference {
            Some(self.allocate_register())
        } else {
            None
        };

        for statement in declaration.statements.iter() {
            self.generate_statement(&mut instructions, statement)?;
        }

        if matches!(entry.return_type, Type::Void) {
            if !matches!(instructions.last(), Some(Instruction::Return { .. })) {
                instructions.push(Instruction::Return {
                    value_register: None,
                });
            }
        } else if !statements::statements_always_return(&declaration.statements) {
            return Err(self.error(
                declaration.name.range,
                "Not all control paths return a value".to_string(),
            ));
        }

        self.variable_stack.clear();

        Ok(IrFunction {
            name: entry.mangled_name.clone(),
            is_external: false,
            parameters,
            return_representation: return_representation
                .filter(|representation| representation.is_in_register)
                .map(|representation| IrParameter {
                    size: representation.value_size,
                    is_float: representation.is_float,
                }),
            returns_by_reference,
            path: entry.scope.file_path.to_string(),
            line: entry.declaration.range.first_line,
            instructions,
        })
    }

    // ── Driver ───────────────────────────────────────────────────

    /// Find `main`, then generate runtime functions until the worklist is
    /// closed. Returns every runtime static in generation order.
    pub fn generate(mut self, root: &LoadedFile) -> CompileResult<Vec<RuntimeStatic>> {
        let root_scope = ConstantScope::top_level(root);

        let mut main_statement = None;
        for statement in root.statements.iter() {
            if statement.matches_declaration("main") {
                main_statement = Some(Rc::clone(statement));
                break;
            }
        }

        let main_statement = match main_statement {
            Some(statement) => statement,
            None => {
                return Err(CompileError::new(
                    root.path.to_string(),
                    FileRange::synthetic(),
                    "'main' function not found".to_string(),
                ));
            }
        };

        let main_declaration = match &main_statement.kind {
            StatementKind::FunctionDeclaration(declaration) => declaration,
            _ => {
                return Err(CompileError::new(
                    root.path.to_string(),
                    main_statement.range,
                    "'main' must be a function".to_string(),
                ));
            }
        };

        if main_declaration.is_external {
            return Err(CompileError::new(
                root.path.to_string(),
                main_statement.range,
                "'main' must not be external".to_string(),
            ));
        }

        let resolved =
            resolve_declaration(&self.info, &root_scope, &mut self.files, &main_statement)?;

        let (parameter_types, return_type) = match resolved.ty {
            Type::FunctionType {
                parameters,
                return_type,
            } => (parameters, *return_type),
            Type::PolymorphicFunction => {
                return Err(CompileError::new(
                    root.path.to_string(),
                    main_statement.range,
                    "'main' cannot be polymorphic".to_string(),
                ));
            }
            _ => unreachable!("function declaration resolved to a non-function"),
        };

        let function = match resolved.value {
            ConstantValue::Function(function) => function,
            _ => unreachable!("function declaration resolved to a non-function value"),
        };

        self.register_function_reference(
            &function,
            &parameter_types,
            &return_type,
            main_statement.range,
        )?;

        let mut generated = 0;
        while generated < self.runtime_functions.len() {
            let entry = self.runtime_functions[generated].clone();
            tracing::debug!(name = %entry.mangled_name, "generating runtime function");
            let function = self.generate_function(&entry)?;
            self.statics.push(RuntimeStatic::Function(function));
            generated += 1;
        }

        Ok(self.statics)
    }
}

fn constant_parameter_tuples_equal(a: &[ConstantParameter], b: &[ConstantParameter]) -> bool {
    a.len() == b.len()
        && a.iter().zip(b).all(|(a, b)| {
            a.name == b.name
                && a.parameter_type == b.parameter_type
                && constant_values_equal(&a.value, &b.value)
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compiler::ast::{Identifier, StructDefinition};
    use crate::compiler::ir::ArchitectureInfo;

    fn test_codegen() -> Codegen {
        let mut files = ModuleTable::new();
        let root = files.insert(Rc::from("test.cin"), Rc::new(Vec::new()));
        Codegen::new(GlobalInfo::new(ArchitectureInfo::default()), files, &root)
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

    fn u8_type() -> Type {
        Type::Integer {
            size: RegisterSize::Size8,
            is_signed: false,
        }
    }

    fn i32_type() -> Type {
        Type::Integer {
            size: RegisterSize::Size32,
            is_signed: true,
        }
    }

    #[test]
    fn test_serialised_static_size_matches_type_size() {
        let definition = struct_statement("S", false);
        let cases: Vec<(Type, ConstantValue)> = vec![
            (i32_type(), ConstantValue::Integer(7)),
            (Type::Boolean, ConstantValue::Boolean(true)),
            (
                Type::Float {
                    size: RegisterSize::Size32,
                },
                ConstantValue::Float(1.5),
            ),
            (
                Type::Pointer(Box::new(u8_type())),
                ConstantValue::Pointer(4096),
            ),
            (
                Type::ArraySlice {
                    element_type: Box::new(u8_type()),
                },
                ConstantValue::Array {
                    pointer: 4096,
                    length: 4,
                },
            ),
            (
                Type::StaticArray {
                    length: 3,
                    element_type: Box::new(i32_type()),
                },
                ConstantValue::StaticArray(vec![
                    ConstantValue::Integer(1),
                    ConstantValue::Integer(2),
                    ConstantValue::Integer(3),
                ]),
            ),
            (
                Type::Struct(StructType {
                    definition,
                    members: vec![
                        StructMember {
                            name: "a".to_string(),
                            member_type: u8_type(),
                        },
                        StructMember {
                            name: "b".to_string(),
                            member_type: i32_type(),
                        },
                    ],
                }),
                ConstantValue::Struct(vec![
                    ConstantValue::Integer(1),
                    ConstantValue::Integer(2),
                ]),
            ),
        ];

        let mut codegen = test_codegen();
        for (ty, value) in &cases {
            codegen.register_static_constant(ty, value);
        }
        for (static_entry, (ty, _)) in codegen.statics.iter().zip(&cases) {
            match static_entry {
                RuntimeStatic::Constant(constant) => {
                    assert_eq!(
                        constant.data.len() as u64,
                        type_size(&codegen.info, ty),
                        "serialised size mismatch for '{}'",
                        ty
                    );
                    assert_eq!(constant.alignment, type_alignment(&codegen.info, ty));
                }
                _ => unreachable!(),
            }
        }
    }

    #[test]
    fn test_integers_are_little_endian() {
        let mut codegen = test_codegen();
        let name = codegen.register_static_constant(
            &Type::Integer {
                size: RegisterSize::Size32,
                is_signed: false,
            },
            &ConstantValue::Integer(0x1122_3344),
        );
        assert_eq!(name, "constant_0");
        match &codegen.statics[0] {
            RuntimeStatic::Constant(constant) => {
                assert_eq!(constant.data, vec![0x44, 0x33, 0x22, 0x11]);
            }
            _ => unreachable!(),
        }
    }

    #[test]
    fn test_slice_serialises_pointer_then_length() {
        let mut codegen = test_codegen();
        codegen.register_static_constant(
            &Type::ArraySlice {
                element_type: Box::new(u8_type()),
            },
            &ConstantValue::Array {
                pointer: 0x10,
                length: 2,
            },
        );
        match &codegen.statics[0] {
            RuntimeStatic::Constant(constant) => {
                assert_eq!(constant.data.len(), 16);
                assert_eq!(constant.data[0], 0x10);
                assert_eq!(constant.data[8], 2);
            }
            _ => unreachable!(),
        }
    }

    #[test]
    fn test_struct_members_land_at_their_offsets() {
        let definition = struct_statement("S", false);
        let struct_type = StructType {
            definition,
            members: vec![
                StructMember {
                    name: "a".to_string(),
                    member_type: u8_type(),
                },
                StructMember {
                    name: "b".to_string(),
                    member_type: i32_type(),
                },
            ],
        };

        let mut codegen = test_codegen();
        codegen.register_static_constant(
            &Type::Struct(struct_type),
            &ConstantValue::Struct(vec![
                ConstantValue::Integer(0xAA),
                ConstantValue::Integer(0x0102_0304),
            ]),
        );
        match &codegen.statics[0] {
            RuntimeStatic::Constant(constant) => {
                assert_eq!(constant.data.len(), 8);
                assert_eq!(constant.data[0], 0xAA);
                // Padding bytes stay zeroed.
                assert_eq!(&constant.data[1..4], &[0, 0, 0]);
                assert_eq!(&constant.data[4..8], &[0x04, 0x03, 0x02, 0x01]);
            }
            _ => unreachable!(),
        }
    }

    #[test]
    fn test_union_serialises_active_member_at_offset_zero() {
        let definition = struct_statement("U", true);
        let union_type = StructType {
            definition,
            members: vec![
                StructMember {
                    name: "i".to_string(),
                    member_type: i32_type(),
                },
                StructMember {
                    name: "f".to_string(),
                    member_type: Type::Float {
                        size: RegisterSize::Size32,
                    },
                },
            ],
        };

        let mut codegen = test_codegen();
        codegen.register_static_constant(
            &Type::Struct(union_type),
            &ConstantValue::Struct(vec![
                ConstantValue::Void,
                ConstantValue::Float(1.5),
            ]),
        );
        match &codegen.statics[0] {
            RuntimeStatic::Constant(constant) => {
                assert_eq!(constant.data.len(), 4);
                assert_eq!(constant.data, (1.5f32).to_le_bytes().to_vec());
            }
            _ => unreachable!(),
        }
    }
}
