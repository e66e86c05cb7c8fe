use cinder::compiler::ir::{
    ArchitectureInfo, Instruction, IrFunction, IrParameter, RegisterSize, RuntimeStatic,
    StaticConstant,
};

// ═══════════════════════════════════════════════════════════════
//  Helpers
// ═══════════════════════════════════════════════════════════════

fn compile(source: &str) -> Vec<RuntimeStatic> {
    cinder::compile_source("test.cin", source, ArchitectureInfo::default())
        .expect("compilation failed")
}

/// 64-bit addresses with 32-bit default integers, so integer array literals
/// infer `i32` elements.
fn compile_with_default_32(source: &str) -> Vec<RuntimeStatic> {
    let architecture = ArchitectureInfo {
        address_size: RegisterSize::Size64,
        default_size: RegisterSize::Size32,
    };
    cinder::compile_source("test.cin", source, architecture).expect("compilation failed")
}

fn compile_error(source: &str) -> String {
    cinder::compile_source("test.cin", source, ArchitectureInfo::default())
        .expect_err("compilation unexpectedly succeeded")
        .message
}

fn functions(statics: &[RuntimeStatic]) -> Vec<&IrFunction> {
    statics
        .iter()
        .filter_map(|static_entry| match static_entry {
            RuntimeStatic::Function(function) => Some(function),
            _ => None,
        })
        .collect()
}

fn constants(statics: &[RuntimeStatic]) -> Vec<&StaticConstant> {
    statics
        .iter()
        .filter_map(|static_entry| match static_entry {
            RuntimeStatic::Constant(constant) => Some(constant),
            _ => None,
        })
        .collect()
}

fn find_function<'a>(statics: &'a [RuntimeStatic], name: &str) -> &'a IrFunction {
    functions(statics)
        .into_iter()
        .find(|function| function.name == name)
        .unwrap_or_else(|| panic!("no function named '{}'", name))
}

// ═══════════════════════════════════════════════════════════════
//  Constant folding (S1, S2)
// ═══════════════════════════════════════════════════════════════

#[test]
fn test_constant_definition_emits_no_code() {
    let statics = compile("x :: 2 + 3 * 4;\nmain :: () { }");
    let all = functions(&statics);
    assert_eq!(all.len(), 1);
    // Only the implicit void return.
    assert_eq!(
        all[0].instructions,
        vec![Instruction::Return {
            value_register: None
        }]
    );
}

#[test]
fn test_folded_constant_reference() {
    let statics = compile("x :: 2 + 3 * 4;\nmain :: () { y: i64 = x; }");
    let main = find_function(&statics, "main_test");
    assert!(main.instructions.contains(&Instruction::IntegerConstant {
        size: RegisterSize::Size64,
        destination: 1,
        value: 14,
    }));
}

#[test]
fn test_integer_coercion_store() {
    // S2: a 4-byte local, a store of constant 3 at width 32, a void return.
    let statics = compile("main :: () { x: i32 = 1 + 2; }");
    let main = find_function(&statics, "main_test");
    assert_eq!(
        main.instructions,
        vec![
            Instruction::AllocateLocal {
                size: 4,
                alignment: 4,
                destination_register: 0,
            },
            Instruction::IntegerConstant {
                size: RegisterSize::Size32,
                destination: 1,
                value: 3,
            },
            Instruction::StoreInteger {
                size: RegisterSize::Size32,
                source_register: 1,
                address_register: 0,
            },
            Instruction::Return {
                value_register: None
            },
        ]
    );
}

// ═══════════════════════════════════════════════════════════════
//  Polymorphism (S3)
// ═══════════════════════════════════════════════════════════════

#[test]
fn test_identical_instantiations_are_deduplicated() {
    let statics = compile(
        "id :: ($T: type, x: T) -> T { return x; }\n\
         main :: () { id(i32, 7); id(i32, 8); }",
    );
    let all = functions(&statics);
    assert_eq!(all.len(), 2);

    let instantiation = find_function(&statics, "function_1");
    assert_eq!(
        instantiation.parameters,
        vec![IrParameter {
            size: RegisterSize::Size32,
            is_float: false,
        }]
    );
    assert_eq!(
        instantiation.return_representation,
        Some(IrParameter {
            size: RegisterSize::Size32,
            is_float: false,
        })
    );
}

#[test]
fn test_distinct_constant_arguments_instantiate_twice() {
    let statics = compile(
        "id :: ($T: type, x: T) -> T { return x; }\n\
         main :: () { id(i32, 7); id(i64, 8); }",
    );
    assert_eq!(functions(&statics).len(), 3);
    find_function(&statics, "function_1");
    find_function(&statics, "function_2");
}

#[test]
fn test_polymorphic_determiner_infers_from_argument() {
    let statics = compile(
        "pass :: (x: $T) -> T { return x; }\n\
         main :: () { y: i32 = 1; pass(y); }",
    );
    let instantiation = find_function(&statics, "function_1");
    assert_eq!(
        instantiation.parameters,
        vec![IrParameter {
            size: RegisterSize::Size32,
            is_float: false,
        }]
    );
}

#[test]
fn test_non_constant_argument_for_constant_parameter() {
    let message = compile_error(
        "id :: ($T: type, $x: T) -> T { return x; }\n\
         main :: () { y: i32 = 1; id(i32, y); }",
    );
    assert!(message.contains("must be a constant"));
}

// ═══════════════════════════════════════════════════════════════
//  Slices (S4)
// ═══════════════════════════════════════════════════════════════

#[test]
fn test_slice_auto_wrap() {
    let statics = compile_with_default_32("main :: () { a: [3]i32 = .[1, 2, 3]; b: []i32 = a; }");
    let main = find_function(&statics, "main_test");

    // The array literal is serialised as a 12-byte static copied into `a`.
    let all_constants = constants(&statics);
    assert_eq!(all_constants.len(), 1);
    assert_eq!(all_constants[0].data.len(), 12);
    assert_eq!(all_constants[0].alignment, 4);
    assert_eq!(&all_constants[0].data[0..4], &[1, 0, 0, 0]);

    // `b` is a 16-byte local; the wrap stores the pointer word and then the
    // length 3.
    assert!(main.instructions.contains(&Instruction::AllocateLocal {
        size: 16,
        alignment: 8,
        destination_register: 2,
    }));
    let length_constant = main
        .instructions
        .iter()
        .position(|instruction| {
            matches!(
                instruction,
                Instruction::IntegerConstant {
                    size: RegisterSize::Size64,
                    value: 3,
                    ..
                }
            )
        })
        .expect("no length constant emitted");
    let stores: Vec<usize> = main
        .instructions
        .iter()
        .enumerate()
        .filter_map(|(index, instruction)| {
            matches!(
                instruction,
                Instruction::StoreInteger {
                    size: RegisterSize::Size64,
                    ..
                }
            )
            .then_some(index)
        })
        .collect();
    // Pointer store happens before the length constant, length store after.
    assert!(stores.iter().any(|index| *index < length_constant));
    assert!(stores.iter().any(|index| *index > length_constant));
}

#[test]
fn test_slice_members() {
    let statics = compile_with_default_32(
        "main :: () { a: [2]i32 = .[1, 2]; b: []i32 = a; n: usize = b.length; p: *i32 = b.pointer; }",
    );
    let main = find_function(&statics, "main_test");
    assert!(main
        .instructions
        .iter()
        .any(|instruction| matches!(instruction, Instruction::LoadInteger { .. })));
}

#[test]
fn test_structural_struct_to_slice() {
    let statics =
        compile("main :: () { b: []u8 = .{ pointer = cast(*u8) 4096, length = 4 }; }");
    let main = find_function(&statics, "main_test");
    assert!(main.instructions.contains(&Instruction::IntegerConstant {
        size: RegisterSize::Size64,
        destination: 1,
        value: 4096,
    }));
}

#[test]
fn test_indexing_scales_by_element_size() {
    let statics = compile_with_default_32(
        "main :: () { a: [4]i32 = .[1, 2, 3, 4]; i: usize = 2; x: i32 = a[i]; }",
    );
    let main = find_function(&statics, "main_test");
    assert!(main.instructions.iter().any(|instruction| {
        matches!(
            instruction,
            Instruction::IntegerConstant {
                size: RegisterSize::Size64,
                value: 4,
                ..
            }
        )
    }));
    assert!(main.instructions.iter().any(|instruction| {
        matches!(
            instruction,
            Instruction::IntegerArithmetic {
                operation: cinder::compiler::ir::IntegerArithmeticOperation::Multiply,
                ..
            }
        )
    }));
}

// ═══════════════════════════════════════════════════════════════
//  Unions (S5)
// ═══════════════════════════════════════════════════════════════

#[test]
fn test_union_literal_writes_member_at_offset_zero() {
    let statics = compile(
        "U :: union { i: i32; f: f32; }\n\
         main :: () { u: U = .{ f = 1.5 }; s: usize = size_of(U); }",
    );
    let main = find_function(&statics, "main_test");

    assert!(main.instructions.contains(&Instruction::AllocateLocal {
        size: 4,
        alignment: 4,
        destination_register: 0,
    }));
    let float_constant = main
        .instructions
        .iter()
        .position(|instruction| {
            matches!(
                instruction,
                Instruction::FloatConstant {
                    size: RegisterSize::Size32,
                    ..
                }
            )
        })
        .expect("no f32 constant emitted");
    match &main.instructions[float_constant + 1] {
        Instruction::StoreFloat {
            size: RegisterSize::Size32,
            address_register: 0,
            ..
        } => {}
        other => panic!("expected a 4-byte float store at offset 0, got {}", other),
    }

    // size_of(U) folded to max(size(i32), size(f32)) = 4.
    assert!(main.instructions.contains(&Instruction::IntegerConstant {
        size: RegisterSize::Size64,
        destination: 3,
        value: 4,
    }));
}

// ═══════════════════════════════════════════════════════════════
//  Imports (S6)
// ═══════════════════════════════════════════════════════════════

#[test]
fn test_using_imports_public_declarations() {
    let directory = tempfile::tempdir().expect("cannot create a temp directory");
    let module_path = directory.path().join("a.cin");
    let main_path = directory.path().join("main.cin");
    std::fs::write(&module_path, "pi :: 3.14;\n").unwrap();
    std::fs::write(
        &main_path,
        "using \"a.cin\";\nmain :: () -> f64 { return pi; }\n",
    )
    .unwrap();

    let statics = cinder::compile_file(
        main_path.to_str().unwrap(),
        ArchitectureInfo::default(),
    )
    .expect("compilation failed");

    let main = find_function(&statics, "main_main");
    assert_eq!(
        main.return_representation,
        Some(IrParameter {
            size: RegisterSize::Size64,
            is_float: true,
        })
    );
    assert!(main.instructions.contains(&Instruction::FloatConstant {
        size: RegisterSize::Size64,
        destination: 0,
        value: 3.14,
    }));
}

#[test]
fn test_import_binds_module_by_file_stem() {
    let directory = tempfile::tempdir().expect("cannot create a temp directory");
    let module_path = directory.path().join("math.cin");
    let main_path = directory.path().join("main.cin");
    std::fs::write(&module_path, "half :: 0.5;\nTWO :: 2;\n").unwrap();
    std::fs::write(
        &main_path,
        "import \"math.cin\";\nmain :: () -> i64 { return math.TWO; }\n",
    )
    .unwrap();

    let statics = cinder::compile_file(
        main_path.to_str().unwrap(),
        ArchitectureInfo::default(),
    )
    .expect("compilation failed");

    let main = find_function(&statics, "main_main");
    assert!(main.instructions.contains(&Instruction::IntegerConstant {
        size: RegisterSize::Size64,
        destination: 0,
        value: 2,
    }));
}

#[test]
fn test_missing_module_is_diagnosed() {
    let message = compile_error("using \"missing.cin\";\nmain :: () { x: i64 = pi; }");
    assert!(message.contains("Cannot find module"));
}

// ═══════════════════════════════════════════════════════════════
//  Control flow
// ═══════════════════════════════════════════════════════════════

#[test]
fn test_while_loop_jumps_backwards() {
    let statics = compile(
        "main :: () { i := 0; while i < 10 { i = i + 1; } }",
    );
    let main = find_function(&statics, "main_test");

    let backward = main
        .instructions
        .iter()
        .enumerate()
        .any(|(index, instruction)| {
            matches!(
                instruction,
                Instruction::Jump {
                    destination_instruction
                } if *destination_instruction < index
            )
        });
    assert!(backward, "no backward jump to the loop head");

    assert!(main
        .instructions
        .iter()
        .any(|instruction| matches!(instruction, Instruction::Branch { .. })));
}

#[test]
fn test_if_else_branch_targets_are_in_range() {
    let statics = compile(
        "main :: () {\n\
         \x20   x := 1;\n\
         \x20   if x == 0 { x = 2; } else if x == 1 { x = 3; } else { x = 4; }\n\
         }",
    );
    let main = find_function(&statics, "main_test");
    for instruction in &main.instructions {
        match instruction {
            Instruction::Jump {
                destination_instruction,
            }
            | Instruction::Branch {
                destination_instruction,
                ..
            } => {
                assert!(*destination_instruction <= main.instructions.len());
            }
            _ => {}
        }
    }
}

#[test]
fn test_non_boolean_condition_is_diagnosed() {
    let message = compile_error("main :: () { if 1 { } }");
    assert!(message.contains("Non-boolean condition"));
}

// ═══════════════════════════════════════════════════════════════
//  Functions and calls
// ═══════════════════════════════════════════════════════════════

#[test]
fn test_direct_call_is_registered_once() {
    let statics = compile(
        "double :: (x: i64) -> i64 { return x * 2; }\n\
         main :: () { double(1); double(2); }",
    );
    let all = functions(&statics);
    assert_eq!(all.len(), 2);
    find_function(&statics, "double_test");
}

#[test]
fn test_nested_function_mangled_name() {
    let statics = compile(
        "main :: () {\n\
         \x20   helper :: (x: i64) -> i64 { return x; }\n\
         \x20   helper(1);\n\
         }",
    );
    find_function(&statics, "helper_main_test");
}

#[test]
fn test_external_function_keeps_source_name() {
    let statics = compile(
        "write :: (fd: i32, count: usize) -> isize #extern;\n\
         main :: () { write(cast(i32) 1, 16); }",
    );
    let external = find_function(&statics, "write");
    assert!(external.is_external);
    assert!(external.instructions.is_empty());

    let main = find_function(&statics, "main_test");
    assert!(main.instructions.iter().any(|instruction| {
        matches!(
            instruction,
            Instruction::FunctionCall { function_name, .. } if function_name == "write"
        )
    }));
}

#[test]
fn test_aggregate_return_goes_by_reference() {
    let statics = compile(
        "Point :: struct { x: i64; y: i64; }\n\
         origin :: () -> Point { return .{ x = 0, y = 0 }; }\n\
         main :: () { p: Point = origin(); }",
    );
    let origin = find_function(&statics, "origin_test");
    assert!(origin.returns_by_reference);
    assert_eq!(origin.return_representation, None);
    // The return-address register is the trailing parameter.
    assert_eq!(origin.parameters.len(), 1);
    assert!(!origin.parameters[0].is_float);
}

#[test]
fn test_missing_main_is_diagnosed() {
    let message = compile_error("x :: 1;");
    assert!(message.contains("'main' function not found"));
}

#[test]
fn test_polymorphic_main_is_diagnosed() {
    let message = compile_error("main :: (x: $T) { }");
    assert!(message.contains("'main' cannot be polymorphic"));
}

#[test]
fn test_non_terminating_function_is_diagnosed() {
    let message = compile_error(
        "f :: (x: i64) -> i64 { if x == 0 { return 1; } }\n\
         main :: () { f(1); }",
    );
    assert!(message.contains("Not all control paths return a value"));
}

#[test]
fn test_return_type_mismatch_is_diagnosed() {
    let message = compile_error("main :: () -> i32 { return true; }");
    assert!(message.contains("Cannot implicitly convert 'bool' to 'i32'"));
}

// ═══════════════════════════════════════════════════════════════
//  Structs
// ═══════════════════════════════════════════════════════════════

#[test]
fn test_struct_member_assignment_uses_offset() {
    let statics = compile(
        "Point :: struct { x: i32; y: i32; }\n\
         main :: () { p: Point = .{ x = 1, y = 2 }; p.y = 3; }",
    );
    let main = find_function(&statics, "main_test");
    // Writing `p.y` adds the 4-byte member offset to the base address.
    assert!(main.instructions.iter().any(|instruction| {
        matches!(
            instruction,
            Instruction::IntegerConstant {
                size: RegisterSize::Size64,
                value: 4,
                ..
            }
        )
    }));
}

#[test]
fn test_struct_literal_requires_matching_member_names() {
    let message = compile_error(
        "Point :: struct { x: i32; y: i32; }\n\
         main :: () { p: Point = .{ x = 1, z = 2 }; }",
    );
    assert!(message.contains("Cannot implicitly convert"));
}

#[test]
fn test_duplicate_variable_is_diagnosed() {
    let message = compile_error("main :: () { x := 1; x := 2; }");
    assert!(message.contains("Duplicate variable name"));
}

#[test]
fn test_assignment_to_literal_is_diagnosed() {
    let message = compile_error("main :: () { 1 = 2; }");
    assert!(message.contains("not assignable"));
}

// ═══════════════════════════════════════════════════════════════
//  Strings
// ═══════════════════════════════════════════════════════════════

#[test]
fn test_string_literal_coerces_to_byte_slice() {
    let statics = compile("main :: () { s: []u8 = \"hi\"; }");
    let all_constants = constants(&statics);
    assert_eq!(all_constants.len(), 1);
    assert_eq!(all_constants[0].data, b"hi".to_vec());
}
