//! The flat linear intermediate representation consumed by a machine-code
//! backend: virtual-register instructions, runtime functions and serialised
//! static data.

use std::fmt;

// ═══════════════════════════════════════════════════════════════
//  Register sizes and architecture
// ═══════════════════════════════════════════════════════════════

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum RegisterSize {
    Size8,
    Size16,
    Size32,
    Size64,
}

impl RegisterSize {
    pub fn byte_size(self) -> u64 {
        match self {
            RegisterSize::Size8 => 1,
            RegisterSize::Size16 => 2,
            RegisterSize::Size32 => 4,
            RegisterSize::Size64 => 8,
        }
    }

    pub fn bit_size(self) -> u64 {
        self.byte_size() * 8
    }

    pub fn from_bits(bits: u64) -> Option<RegisterSize> {
        match bits {
            8 => Some(RegisterSize::Size8),
            16 => Some(RegisterSize::Size16),
            32 => Some(RegisterSize::Size32),
            64 => Some(RegisterSize::Size64),
            _ => None,
        }
    }
}

impl fmt::Display for RegisterSize {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.bit_size())
    }
}

/// The two architectural constants supplied at start-up. They parameterise
/// pointer width, slice layout, boolean storage width and the default
/// integer/float types.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ArchitectureInfo {
    pub address_size: RegisterSize,
    pub default_size: RegisterSize,
}

impl Default for ArchitectureInfo {
    fn default() -> Self {
        Self {
            address_size: RegisterSize::Size64,
            default_size: RegisterSize::Size64,
        }
    }
}

// ═══════════════════════════════════════════════════════════════
//  Instructions
// ═══════════════════════════════════════════════════════════════

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IntegerArithmeticOperation {
    Add,
    Subtract,
    Multiply,
    SignedDivide,
    UnsignedDivide,
    SignedModulus,
    UnsignedModulus,
    BitwiseAnd,
    BitwiseOr,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IntegerComparisonOperation {
    Equal,
    SignedLessThan,
    UnsignedLessThan,
    SignedGreaterThan,
    UnsignedGreaterThan,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FloatArithmeticOperation {
    Add,
    Subtract,
    Multiply,
    Divide,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FloatComparisonOperation {
    Equal,
    LessThan,
    GreaterThan,
}

/// One instruction over virtual registers. Registers are allocated
/// monotonically per function and never reused; branch targets are indices
/// into the function's instruction list.
#[derive(Debug, Clone, PartialEq)]
pub enum Instruction {
    IntegerArithmetic {
        operation: IntegerArithmeticOperation,
        size: RegisterSize,
        source_a: usize,
        source_b: usize,
        destination: usize,
    },
    IntegerComparison {
        operation: IntegerComparisonOperation,
        size: RegisterSize,
        source_a: usize,
        source_b: usize,
        destination: usize,
    },
    IntegerUpcast {
        is_signed: bool,
        source_size: RegisterSize,
        source: usize,
        destination_size: RegisterSize,
        destination: usize,
    },
    IntegerConstant {
        size: RegisterSize,
        destination: usize,
        value: u64,
    },
    FloatArithmetic {
        operation: FloatArithmeticOperation,
        size: RegisterSize,
        source_a: usize,
        source_b: usize,
        destination: usize,
    },
    FloatComparison {
        operation: FloatComparisonOperation,
        size: RegisterSize,
        source_a: usize,
        source_b: usize,
        destination: usize,
    },
    /// Change a float's size (f32 ↔ f64).
    FloatConversion {
        source_size: RegisterSize,
        source: usize,
        destination_size: RegisterSize,
        destination: usize,
    },
    /// Truncate a float into an integer register.
    FloatTruncation {
        float_size: RegisterSize,
        source: usize,
        integer_size: RegisterSize,
        destination: usize,
    },
    FloatFromInteger {
        is_signed: bool,
        integer_size: RegisterSize,
        source: usize,
        float_size: RegisterSize,
        destination: usize,
    },
    FloatConstant {
        size: RegisterSize,
        destination: usize,
        value: f64,
    },
    Jump {
        destination_instruction: usize,
    },
    /// Jump to `destination_instruction` when the condition register holds a
    /// non-zero value; fall through otherwise.
    Branch {
        condition_register: usize,
        destination_instruction: usize,
    },
    FunctionCall {
        function_name: String,
        parameter_registers: Vec<usize>,
        return_register: Option<usize>,
    },
    Return {
        value_register: Option<usize>,
    },
    AllocateLocal {
        size: u64,
        alignment: u64,
        destination_register: usize,
    },
    LoadInteger {
        size: RegisterSize,
        address_register: usize,
        destination_register: usize,
    },
    StoreInteger {
        size: RegisterSize,
        source_register: usize,
        address_register: usize,
    },
    LoadFloat {
        size: RegisterSize,
        address_register: usize,
        destination_register: usize,
    },
    StoreFloat {
        size: RegisterSize,
        source_register: usize,
        address_register: usize,
    },
    CopyMemory {
        length: u64,
        source_address_register: usize,
        destination_address_register: usize,
    },
    /// Load the address of a runtime static into a register.
    ReferenceStatic {
        name: String,
        destination_register: usize,
    },
}

impl fmt::Display for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Instruction::IntegerArithmetic {
                operation,
                size,
                source_a,
                source_b,
                destination,
            } => {
                let name = match operation {
                    IntegerArithmeticOperation::Add => "ADD",
                    IntegerArithmeticOperation::Subtract => "SUB",
                    IntegerArithmeticOperation::Multiply => "MUL",
                    IntegerArithmeticOperation::SignedDivide => "SDIV",
                    IntegerArithmeticOperation::UnsignedDivide => "UDIV",
                    IntegerArithmeticOperation::SignedModulus => "SMOD",
                    IntegerArithmeticOperation::UnsignedModulus => "UMOD",
                    IntegerArithmeticOperation::BitwiseAnd => "AND",
                    IntegerArithmeticOperation::BitwiseOr => "OR",
                };
                write!(f, "{} {} r{}, r{} -> r{}", name, size, source_a, source_b, destination)
            }
            Instruction::IntegerComparison {
                operation,
                size,
                source_a,
                source_b,
                destination,
            } => {
                let name = match operation {
                    IntegerComparisonOperation::Equal => "EQ",
                    IntegerComparisonOperation::SignedLessThan => "SLT",
                    IntegerComparisonOperation::UnsignedLessThan => "ULT",
                    IntegerComparisonOperation::SignedGreaterThan => "SGT",
                    IntegerComparisonOperation::UnsignedGreaterThan => "UGT",
                };
                write!(f, "{} {} r{}, r{} -> r{}", name, size, source_a, source_b, destination)
            }
            Instruction::IntegerUpcast {
                is_signed,
                source_size,
                source,
                destination_size,
                destination,
            } => {
                let name = if *is_signed { "SEXT" } else { "ZEXT" };
                write!(
                    f,
                    "{} {} r{} -> {} r{}",
                    name, source_size, source, destination_size, destination
                )
            }
            Instruction::IntegerConstant {
                size,
                destination,
                value,
            } => write!(f, "CONST {} {} -> r{}", size, value, destination),
            Instruction::FloatArithmetic {
                operation,
                size,
                source_a,
                source_b,
                destination,
            } => {
                let name = match operation {
                    FloatArithmeticOperation::Add => "FADD",
                    FloatArithmeticOperation::Subtract => "FSUB",
                    FloatArithmeticOperation::Multiply => "FMUL",
                    FloatArithmeticOperation::Divide => "FDIV",
                };
                write!(f, "{} {} r{}, r{} -> r{}", name, size, source_a, source_b, destination)
            }
            Instruction::FloatComparison {
                operation,
                size,
                source_a,
                source_b,
                destination,
            } => {
                let name = match operation {
                    FloatComparisonOperation::Equal => "FEQ",
                    FloatComparisonOperation::LessThan => "FLT",
                    FloatComparisonOperation::GreaterThan => "FGT",
                };
                write!(f, "{} {} r{}, r{} -> r{}", name, size, source_a, source_b, destination)
            }
            Instruction::FloatConversion {
                source_size,
                source,
                destination_size,
                destination,
            } => write!(
                f,
                "FCONV {} r{} -> {} r{}",
                source_size, source, destination_size, destination
            ),
            Instruction::FloatTruncation {
                float_size,
                source,
                integer_size,
                destination,
            } => write!(
                f,
                "FTRUNC {} r{} -> {} r{}",
                float_size, source, integer_size, destination
            ),
            Instruction::FloatFromInteger {
                is_signed,
                integer_size,
                source,
                float_size,
                destination,
            } => {
                let name = if *is_signed { "SITOF" } else { "UITOF" };
                write!(
                    f,
                    "{} {} r{} -> {} r{}",
                    name, integer_size, source, float_size, destination
                )
            }
            Instruction::FloatConstant {
                size,
                destination,
                value,
            } => write!(f, "FCONST {} {} -> r{}", size, value, destination),
            Instruction::Jump {
                destination_instruction,
            } => write!(f, "JMP {}", destination_instruction),
            Instruction::Branch {
                condition_register,
                destination_instruction,
            } => write!(f, "BR r{} -> {}", condition_register, destination_instruction),
            Instruction::FunctionCall {
                function_name,
                parameter_registers,
                return_register,
            } => {
                write!(f, "CALL {}(", function_name)?;
                for (i, register) in parameter_registers.iter().enumerate() {
                    if i != 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "r{}", register)?;
                }
                write!(f, ")")?;
                if let Some(register) = return_register {
                    write!(f, " -> r{}", register)?;
                }
                Ok(())
            }
            Instruction::Return { value_register } => match value_register {
                Some(register) => write!(f, "RET r{}", register),
                None => write!(f, "RET"),
            },
            Instruction::AllocateLocal {
                size,
                alignment,
                destination_register,
            } => write!(f, "LOCAL {} align {} -> r{}", size, alignment, destination_register),
            Instruction::LoadInteger {
                size,
                address_register,
                destination_register,
            } => write!(f, "LOAD {} [r{}] -> r{}", size, address_register, destination_register),
            Instruction::StoreInteger {
                size,
                source_register,
                address_register,
            } => write!(f, "STORE {} r{} -> [r{}]", size, source_register, address_register),
            Instruction::LoadFloat {
                size,
                address_register,
                destination_register,
            } => write!(f, "FLOAD {} [r{}] -> r{}", size, address_register, destination_register),
            Instruction::StoreFloat {
                size,
                source_register,
                address_register,
            } => write!(f, "FSTORE {} r{} -> [r{}]", size, source_register, address_register),
            Instruction::CopyMemory {
                length,
                source_address_register,
                destination_address_register,
            } => write!(
                f,
                "COPY {} [r{}] -> [r{}]",
                length, source_address_register, destination_address_register
            ),
            Instruction::ReferenceStatic {
                name,
                destination_register,
            } => write!(f, "STATIC {} -> r{}", name, destination_register),
        }
    }
}

// ═══════════════════════════════════════════════════════════════
//  Runtime statics
// ═══════════════════════════════════════════════════════════════

/// How a single function parameter or scalar return value is represented in
/// a register.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IrParameter {
    pub size: RegisterSize,
    pub is_float: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct IrFunction {
    pub name: String,
    pub is_external: bool,
    pub parameters: Vec<IrParameter>,
    /// `Some` for functions returning a register-representable value.
    pub return_representation: Option<IrParameter>,
    /// Aggregate returns are written through a caller-provided address that
    /// is appended as a trailing parameter.
    pub returns_by_reference: bool,
    pub path: String,
    pub line: u32,
    pub instructions: Vec<Instruction>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct StaticConstant {
    pub name: String,
    pub data: Vec<u8>,
    pub alignment: u64,
}

#[derive(Debug, Clone, PartialEq)]
pub enum RuntimeStatic {
    Function(IrFunction),
    Constant(StaticConstant),
}

impl RuntimeStatic {
    pub fn name(&self) -> &str {
        match self {
            RuntimeStatic::Function(function) => &function.name,
            RuntimeStatic::Constant(constant) => &constant.name,
        }
    }
}

impl fmt::Display for IrFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_external {
            write!(f, "extern ")?;
        }
        write!(f, "{}(", self.name)?;
        for (i, parameter) in self.parameters.iter().enumerate() {
            if i != 0 {
                write!(f, ", ")?;
            }
            if parameter.is_float {
                write!(f, "f{}", parameter.size)?;
            } else {
                write!(f, "i{}", parameter.size)?;
            }
        }
        write!(f, ")")?;
        if let Some(representation) = &self.return_representation {
            if representation.is_float {
                write!(f, " -> f{}", representation.size)?;
            } else {
                write!(f, " -> i{}", representation.size)?;
            }
        } else if self.returns_by_reference {
            write!(f, " -> by-reference")?;
        }
        writeln!(f)?;
        for (index, instruction) in self.instructions.iter().enumerate() {
            writeln!(f, "  {:>3}: {}", index, instruction)?;
        }
        Ok(())
    }
}

impl fmt::Display for RuntimeStatic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RuntimeStatic::Function(function) => write!(f, "{}", function),
            RuntimeStatic::Constant(constant) => {
                writeln!(
                    f,
                    "{}: {} bytes align {}",
                    constant.name,
                    constant.data.len(),
                    constant.alignment
                )
            }
        }
    }
}
