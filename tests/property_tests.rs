//! Property tests for the evaluator invariants: pure constant evaluation
//! and the IR-emitting path agree bit-for-bit on literal arithmetic, and
//! repeated compilation is deterministic.

use cinder::compiler::constant::{
    evaluate_constant_expression, ConstantScope, ConstantValue, GlobalInfo,
};
use cinder::compiler::ir::{ArchitectureInfo, Instruction, RegisterSize, RuntimeStatic};
use cinder::compiler::lexer::Lexer;
use cinder::compiler::modules::ModuleTable;
use cinder::compiler::parser::Parser;
use proptest::prelude::*;
use std::rc::Rc;

/// A small arithmetic expression over integer literals.
#[derive(Debug, Clone)]
enum Arith {
    Literal(i64),
    Binary(&'static str, Box<Arith>, Box<Arith>),
}

impl Arith {
    fn source(&self) -> String {
        match self {
            Arith::Literal(value) => format!("({})", value),
            Arith::Binary(operator, left, right) => {
                format!("({} {} {})", left.source(), operator, right.source())
            }
        }
    }
}

fn arith_strategy() -> impl Strategy<Value = Arith> {
    let leaf = (-100i64..100).prop_map(Arith::Literal);
    leaf.prop_recursive(3, 16, 2, |inner| {
        (
            prop_oneof![Just("+"), Just("-"), Just("*")],
            inner.clone(),
            inner,
        )
            .prop_map(|(operator, left, right)| {
                Arith::Binary(operator, Box::new(left), Box::new(right))
            })
    })
}

fn evaluate_constant(source: &str) -> u64 {
    let tokens = Lexer::new("test.cin", source).tokenize().expect("lex failed");
    let mut parser = Parser::new("test.cin", tokens);
    let expression = parser.parse_expression().expect("parse failed");

    let info = GlobalInfo::new(ArchitectureInfo::default());
    let file = ModuleTable::new().insert(Rc::from("test.cin"), Rc::new(Vec::new()));
    let scope = ConstantScope::top_level(&file);
    let mut files = ModuleTable::new();

    let result = evaluate_constant_expression(&info, &scope, &mut files, &expression)
        .expect("constant evaluation failed");
    match result.value {
        ConstantValue::Integer(value) => value,
        other => panic!("expected an integer constant, got {:?}", other),
    }
}

/// Compile `main :: () { x: i64 = <expr>; }` and pull out the stored
/// constant the IR generator produced.
fn evaluate_through_ir(source: &str) -> u64 {
    let program = format!("main :: () {{ x: i64 = {}; }}", source);
    let statics = cinder::compile_source("test.cin", &program, ArchitectureInfo::default())
        .expect("compilation failed");

    for static_entry in &statics {
        if let RuntimeStatic::Function(function) = static_entry {
            for instruction in &function.instructions {
                if let Instruction::IntegerConstant {
                    size: RegisterSize::Size64,
                    value,
                    ..
                } = instruction
                {
                    return *value;
                }
            }
        }
    }
    panic!("no stored constant found in the generated IR");
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    /// Spec property: the constant evaluator and the IR-emitting evaluator
    /// produce bit-identical constants for pure literal arithmetic.
    #[test]
    fn prop_constant_and_ir_evaluation_agree(expression in arith_strategy()) {
        let source = expression.source();
        prop_assert_eq!(evaluate_constant(&source), evaluate_through_ir(&source));
    }
}

#[test]
fn test_repeated_compilation_is_deterministic() {
    let source = "id :: ($T: type, x: T) -> T { return x; }\n\
                  pair :: ($T: type, a: T, b: T) -> T { return id(T, a) + id(T, b); }\n\
                  main :: () { pair(i64, 1, 2); pair(i32, cast(i32) 1, cast(i32) 2); }";

    let names = |statics: &[RuntimeStatic]| -> Vec<String> {
        statics
            .iter()
            .map(|static_entry| static_entry.name().to_string())
            .collect()
    };

    let first = cinder::compile_source("test.cin", source, ArchitectureInfo::default())
        .expect("compilation failed");
    let second = cinder::compile_source("test.cin", source, ArchitectureInfo::default())
        .expect("compilation failed");
    assert_eq!(names(&first), names(&second));
}
