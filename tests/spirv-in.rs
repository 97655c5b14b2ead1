/*!
Tests for the SPIR-V front end, on binaries built with a small assembler.
*/

use spirv::{Op, Word};
use strata::{back, front::spv, front::wgsl};

/// Builds a SPIR-V word stream one instruction at a time.
struct Assembler {
    words: Vec<Word>,
}

impl Assembler {
    fn new() -> Self {
        Assembler {
            words: vec![spirv::MAGIC_NUMBER, 0x0001_0300, 0, 100, 0],
        }
    }

    fn op(&mut self, op: Op, operands: &[Word]) -> &mut Self {
        self.words.push(((operands.len() as u32 + 1) << 16) | op as u32);
        self.words.extend_from_slice(operands);
        self
    }

    /// An instruction whose operands include a literal string, followed by
    /// more operands.
    fn op_with_string(&mut self, op: Op, before: &[Word], text: &str, after: &[Word]) -> &mut Self {
        let mut operands = before.to_vec();
        operands.extend(string(text));
        operands.extend_from_slice(after);
        self.op(op, &operands)
    }

    /// The capability, memory model and GLSL import every test uses.
    fn preamble(&mut self) -> &mut Self {
        self.op(Op::Capability, &[spirv::Capability::Shader as u32])
            .op_with_string(Op::ExtInstImport, &[90], "GLSL.std.450", &[])
            .op(
                Op::MemoryModel,
                &[
                    spirv::AddressingModel::Logical as u32,
                    spirv::MemoryModel::GLSL450 as u32,
                ],
            )
    }

    fn finish(&self) -> &[Word] {
        &self.words
    }
}

fn string(text: &str) -> Vec<Word> {
    let mut bytes = text.as_bytes().to_vec();
    bytes.resize((bytes.len() / 4 + 1) * 4, 0);
    bytes
        .chunks(4)
        .map(|c| u32::from_le_bytes([c[0], c[1], c[2], c[3]]))
        .collect()
}

// Ids shared by the tests.
const VOID: Word = 1;
const FN_VOID: Word = 2;
const UINT: Word = 3;
const INT: Word = 4;
const FLOAT: Word = 5;
const VEC4: Word = 6;
const MAIN: Word = 10;
const ENTRY: Word = 11;

/// A compute entry point whose body is `body`.
fn compute_shader(constants: impl FnOnce(&mut Assembler), body: impl FnOnce(&mut Assembler)) -> Vec<Word> {
    let mut asm = Assembler::new();
    asm.preamble()
        .op_with_string(
            Op::EntryPoint,
            &[spirv::ExecutionModel::GLCompute as u32, MAIN],
            "main",
            &[],
        )
        .op(
            Op::ExecutionMode,
            &[MAIN, spirv::ExecutionMode::LocalSize as u32, 8, 1, 1],
        )
        .op(Op::TypeVoid, &[VOID])
        .op(Op::TypeFunction, &[FN_VOID, VOID])
        .op(Op::TypeInt, &[UINT, 32, 0])
        .op(Op::TypeInt, &[INT, 32, 1])
        .op(Op::TypeFloat, &[FLOAT, 32]);
    constants(&mut asm);
    asm.op(
        Op::Function,
        &[VOID, MAIN, spirv::FunctionControl::NONE.bits(), FN_VOID],
    )
    .op(Op::Label, &[ENTRY]);
    body(&mut asm);
    asm.op(Op::Return, &[]).op(Op::FunctionEnd, &[]);
    asm.finish().to_vec()
}

fn decode(words: &[Word]) -> String {
    let _ = env_logger::builder().is_test(true).try_init();
    let module = match spv::parse_words(words, &spv::Options::default()) {
        Ok(module) => module,
        Err(error) => panic!("{error}"),
    };
    let text = back::wgsl::write_string(&module).unwrap();
    if let Err(error) = wgsl::parse_str(&text) {
        panic!("output does not parse:\n{text}\n{}", error.emit_to_string());
    }
    text
}

#[test]
fn negate_in_signed_domain() {
    const INT_30: Word = 20;
    let words = compute_shader(
        |asm| {
            asm.op(Op::Constant, &[INT, INT_30, 30]);
        },
        |asm| {
            asm.op(Op::SNegate, &[UINT, 30, INT_30]);
        },
    );
    let text = decode(&words);
    assert!(text.contains("bitcast<u32>(-(30i))"), "{text}");
}

#[test]
fn matching_signedness_needs_no_bitcast() {
    const INT_1: Word = 20;
    const INT_2: Word = 21;
    let words = compute_shader(
        |asm| {
            asm.op(Op::Constant, &[INT, INT_1, 1])
                .op(Op::Constant, &[INT, INT_2, 2]);
        },
        |asm| {
            asm.op(Op::IAdd, &[INT, 30, INT_1, INT_2]);
        },
    );
    let text = decode(&words);
    assert!(text.contains("1i + 2i"), "{text}");
    assert!(!text.contains("bitcast"), "{text}");
}

#[test]
fn mixed_signedness_is_reconciled() {
    const INT_1: Word = 20;
    const UINT_2: Word = 21;
    let words = compute_shader(
        |asm| {
            asm.op(Op::Constant, &[INT, INT_1, 1])
                .op(Op::Constant, &[UINT, UINT_2, 2]);
        },
        |asm| {
            asm.op(Op::IAdd, &[UINT, 30, INT_1, UINT_2]);
        },
    );
    let text = decode(&words);
    // The second operand follows the first, the sum is cast to the result.
    assert!(text.contains("bitcast<u32>(1i + bitcast<i32>(2u))"), "{text}");
    assert_eq!(text.matches("bitcast").count(), 2, "{text}");
}

#[test]
fn entry_point_wrapper() {
    let words = compute_shader(|_| {}, |_| {});
    let text = decode(&words);
    assert!(text.contains("@compute\n@workgroup_size(8, 1, 1)\nfn main()"), "{text}");
    assert!(text.contains("fn main_1()"), "{text}");
    assert!(text.contains("main_1();"), "{text}");
}

#[test]
fn workgroup_barrier() {
    const UINT_2: Word = 20;
    const UINT_264: Word = 21;
    let words = compute_shader(
        |asm| {
            asm.op(Op::Constant, &[UINT, UINT_2, 2])
                .op(Op::Constant, &[UINT, UINT_264, 264]);
        },
        |asm| {
            asm.op(Op::ControlBarrier, &[UINT_2, UINT_2, UINT_264]);
        },
    );
    let text = decode(&words);
    assert!(text.contains("workgroupBarrier();"), "{text}");
}

#[test]
fn barrier_memory_scope_must_be_workgroup() {
    const UINT_2: Word = 20;
    const UINT_8: Word = 21;
    const UINT_264: Word = 22;
    let words = compute_shader(
        |asm| {
            asm.op(Op::Constant, &[UINT, UINT_2, 2])
                .op(Op::Constant, &[UINT, UINT_8, 8])
                .op(Op::Constant, &[UINT, UINT_264, 264]);
        },
        |asm| {
            asm.op(Op::ControlBarrier, &[UINT_2, UINT_8, UINT_264]);
        },
    );
    let error = spv::parse_words(&words, &spv::Options::default()).unwrap_err();
    assert_eq!(*error.root(), spv::Error::WorkgroupBarrierScope);
    let message = error.to_string();
    assert!(
        message.starts_with("workgroupBarrier requires workgroup memory scope"),
        "{message}"
    );
    assert!(message.contains("OpControlBarrier 20 21 22"), "{message}");
}

#[test]
fn decode_failure_as_diagnostic() {
    let (module, diagnostics) = spv::parse_with_diagnostics(&[0, 1, 2], &spv::Options::default());
    assert_eq!(module.declarations().len(), 0);
    assert_eq!(diagnostics.error_count(), 1);
    assert_eq!(
        diagnostics.iter().next().unwrap().message,
        "Invalid SPIR-V magic number"
    );
}

#[test]
fn byte_input() {
    let words = compute_shader(|_| {}, |_| {});
    let bytes = words
        .iter()
        .flat_map(|word| word.to_le_bytes())
        .collect::<Vec<_>>();
    assert!(spv::parse_u8_slice(&bytes, &spv::Options::default()).is_ok());
    assert_eq!(
        spv::parse_u8_slice(&bytes[..bytes.len() - 1], &spv::Options::default()).unwrap_err(),
        spv::Error::IncompleteData
    );
}

#[test]
fn fragment_io() {
    const PTR_IN: Word = 20;
    const PTR_OUT: Word = 21;
    const COLOR_IN: Word = 22;
    const COLOR_OUT: Word = 23;
    let mut asm = Assembler::new();
    asm.preamble()
        .op_with_string(
            Op::EntryPoint,
            &[spirv::ExecutionModel::Fragment as u32, MAIN],
            "main",
            &[COLOR_IN, COLOR_OUT],
        )
        .op(
            Op::ExecutionMode,
            &[MAIN, spirv::ExecutionMode::OriginUpperLeft as u32],
        )
        .op_with_string(Op::Name, &[COLOR_IN], "color_in", &[])
        .op_with_string(Op::Name, &[COLOR_OUT], "color_out", &[])
        .op(Op::Decorate, &[COLOR_IN, spirv::Decoration::Location as u32, 0])
        .op(Op::Decorate, &[COLOR_OUT, spirv::Decoration::Location as u32, 0])
        .op(Op::TypeVoid, &[VOID])
        .op(Op::TypeFunction, &[FN_VOID, VOID])
        .op(Op::TypeFloat, &[FLOAT, 32])
        .op(Op::TypeVector, &[VEC4, FLOAT, 4])
        .op(Op::TypePointer, &[PTR_IN, spirv::StorageClass::Input as u32, VEC4])
        .op(Op::TypePointer, &[PTR_OUT, spirv::StorageClass::Output as u32, VEC4])
        .op(Op::Variable, &[PTR_IN, COLOR_IN, spirv::StorageClass::Input as u32])
        .op(Op::Variable, &[PTR_OUT, COLOR_OUT, spirv::StorageClass::Output as u32])
        .op(
            Op::Function,
            &[VOID, MAIN, spirv::FunctionControl::NONE.bits(), FN_VOID],
        )
        .op(Op::Label, &[ENTRY])
        .op(Op::Load, &[VEC4, 30, COLOR_IN])
        .op(Op::Store, &[COLOR_OUT, 30])
        .op(Op::Return, &[])
        .op(Op::FunctionEnd, &[]);
    let text = decode(asm.finish());
    assert!(text.contains("var<private> color_in: vec4f;"), "{text}");
    assert!(text.contains("var<private> color_out: vec4f;"), "{text}");
    assert!(text.contains("struct main_out {"), "{text}");
    assert!(text.contains("@location(0) color_out: vec4f"), "{text}");
    assert!(
        text.contains("@fragment\nfn main(@location(0) color_in_param: vec4f) -> main_out {"),
        "{text}"
    );
    assert!(text.contains("color_in = color_in_param;"), "{text}");
    assert!(text.contains("return main_out(color_out);"), "{text}");
}

#[test]
fn strict_capabilities() {
    let mut asm = Assembler::new();
    asm.op(Op::Capability, &[spirv::Capability::Geometry as u32]);
    let options = spv::Options {
        strict_capabilities: true,
        ..Default::default()
    };
    let error = spv::parse_words(asm.finish(), &options).unwrap_err();
    assert_eq!(
        *error.root(),
        spv::Error::UnsupportedCapability(spirv::Capability::Geometry)
    );
    assert!(spv::parse_words(asm.finish(), &spv::Options::default()).is_ok());
}

#[test]
fn shift_amount_is_unsigned() {
    const UINT_7: Word = 20;
    const INT_2: Word = 21;
    let words = compute_shader(
        |asm| {
            asm.op(Op::Constant, &[UINT, UINT_7, 7])
                .op(Op::Constant, &[INT, INT_2, 2]);
        },
        |asm| {
            asm.op(Op::ShiftLeftLogical, &[UINT, 30, UINT_7, INT_2]);
        },
    );
    let text = decode(&words);
    assert!(text.contains("let x_30: u32 = 7u << bitcast<u32>(2i);"), "{text}");
}

#[test]
fn float_to_int_conversions() {
    const UINT_1: Word = 20;
    const INT_1: Word = 21;
    const FLOAT_HALF: Word = 22;
    let constants = |asm: &mut Assembler| {
        asm.op(Op::Constant, &[UINT, UINT_1, 1])
            .op(Op::Constant, &[INT, INT_1, 1])
            .op(Op::Constant, &[FLOAT, FLOAT_HALF, 0.5f32.to_bits()]);
    };

    let words = compute_shader(constants, |asm| {
        asm.op(Op::ConvertFToS, &[UINT, 30, FLOAT_HALF]);
    });
    let text = decode(&words);
    assert!(text.contains("bitcast<u32>(i32(0.5f))"), "{text}");

    let cases = [
        (Op::ConvertFToU, UINT, UINT_1, spv::Error::ConvertToUnsignedOperand),
        (Op::ConvertFToS, INT, INT_1, spv::Error::ConvertToSignedOperand),
        (Op::ConvertFToU, INT, FLOAT_HALF, spv::Error::ConvertToUnsignedResult),
    ];
    for (op, ty, operand, expected) in cases {
        let words = compute_shader(constants, |asm| {
            asm.op(op, &[ty, 30, operand]);
        });
        let error = spv::parse_words(&words, &spv::Options::default()).unwrap_err();
        assert_eq!(*error.root(), expected, "{op:?}");
    }
}

#[test]
fn bit_reverse_keeps_its_type() {
    const INT_5: Word = 20;
    let words = compute_shader(
        |asm| {
            asm.op(Op::Constant, &[INT, INT_5, 5]);
        },
        |asm| {
            asm.op(Op::BitReverse, &[UINT, 30, INT_5]);
        },
    );
    let error = spv::parse_words(&words, &spv::Options::default()).unwrap_err();
    assert_eq!(*error.root(), spv::Error::BitReverseTypeMismatch);
    assert!(
        error
            .to_string()
            .starts_with("Expected Base Type to be equal to Result Type: BitReverse"),
        "{error}"
    );

    let words = compute_shader(
        |asm| {
            asm.op(Op::Constant, &[INT, INT_5, 5]);
        },
        |asm| {
            asm.op(Op::BitReverse, &[INT, 30, INT_5]);
        },
    );
    let text = decode(&words);
    assert!(text.contains("let x_30: i32 = reverseBits(5i);"), "{text}");
}

#[test]
fn undefined_struct_is_zero() {
    const UINT_3: Word = 20;
    const ARRAY: Word = 41;
    const MAT2X4: Word = 42;
    const STRUCT: Word = 43;
    let words = compute_shader(
        |asm| {
            asm.op(Op::TypeVector, &[VEC4, FLOAT, 4])
                .op(Op::Constant, &[UINT, UINT_3, 3])
                .op(Op::TypeArray, &[ARRAY, UINT, UINT_3])
                .op(Op::TypeMatrix, &[MAT2X4, VEC4, 2])
                .op(Op::TypeStruct, &[STRUCT, UINT, VEC4, ARRAY, MAT2X4]);
        },
        |asm| {
            asm.op(Op::Undef, &[STRUCT, 50]);
        },
    );
    let text = decode(&words);
    assert!(text.contains("struct S_43 {"), "{text}");
    assert!(
        text.contains("let x_50: S_43 = S_43(0u, vec4f(), array<u32, 3u>(), mat2x4f());"),
        "{text}"
    );
}

#[test]
fn outer_product_by_columns() {
    const VEC2: Word = 20;
    const MAT2: Word = 21;
    let words = compute_shader(
        |asm| {
            asm.op(Op::TypeVector, &[VEC2, FLOAT, 2])
                .op(Op::TypeMatrix, &[MAT2, VEC2, 2]);
        },
        |asm| {
            asm.op(Op::Undef, &[VEC2, 30])
                .op(Op::Undef, &[VEC2, 31])
                .op(Op::OuterProduct, &[MAT2, 32, 30, 31]);
        },
    );
    let text = decode(&words);
    // Both operands are read more than once, so they are bound first.
    assert!(text.contains("let x_30: vec2f = vec2f();"), "{text}");
    assert!(text.contains("let x_31: vec2f = vec2f();"), "{text}");
    assert!(
        text.contains(
            "let x_32: mat2x2f = mat2x2f(vec2f(x_30.x * x_31.x, x_30.y * x_31.x), \
             vec2f(x_30.x * x_31.y, x_30.y * x_31.y));"
        ),
        "{text}"
    );
}

#[test]
fn phi_becomes_variable() {
    const BOOL: Word = 7;
    const UINT_1: Word = 20;
    const UINT_2: Word = 21;
    const TRUE: Word = 22;
    let words = compute_shader(
        |asm| {
            asm.op(Op::TypeBool, &[BOOL])
                .op(Op::Constant, &[UINT, UINT_1, 1])
                .op(Op::Constant, &[UINT, UINT_2, 2])
                .op(Op::ConstantTrue, &[BOOL, TRUE]);
        },
        |asm| {
            asm.op(Op::SelectionMerge, &[43, 0])
                .op(Op::BranchConditional, &[TRUE, 41, 42])
                .op(Op::Label, &[41])
                .op(Op::Branch, &[43])
                .op(Op::Label, &[42])
                .op(Op::Branch, &[43])
                .op(Op::Label, &[43])
                .op(Op::Phi, &[UINT, 50, UINT_1, 41, UINT_2, 42]);
        },
    );
    let text = decode(&words);
    assert!(text.contains("var x_50_phi: u32;"), "{text}");
    assert!(text.contains("x_50_phi = 1u;"), "{text}");
    assert!(text.contains("x_50_phi = 2u;"), "{text}");
    assert!(text.contains("let x_50: u32 = x_50_phi;"), "{text}");
    let declared = text.find("var x_50_phi").unwrap();
    assert!(declared < text.find("if true").unwrap(), "{text}");
}

#[test]
fn value_used_in_continuing_is_hoisted() {
    const BOOL: Word = 7;
    const UINT_1: Word = 20;
    const UINT_2: Word = 21;
    const FALSE: Word = 22;
    let words = compute_shader(
        |asm| {
            asm.op(Op::TypeBool, &[BOOL])
                .op(Op::Constant, &[UINT, UINT_1, 1])
                .op(Op::Constant, &[UINT, UINT_2, 2])
                .op(Op::ConstantFalse, &[BOOL, FALSE]);
        },
        |asm| {
            asm.op(Op::Branch, &[40])
                .op(Op::Label, &[40])
                .op(Op::LoopMerge, &[43, 42, 0])
                .op(Op::Branch, &[41])
                .op(Op::Label, &[41])
                .op(Op::IAdd, &[UINT, 200, UINT_1, UINT_2])
                .op(Op::Branch, &[42])
                .op(Op::Label, &[42])
                .op(Op::IAdd, &[UINT, 201, 200, UINT_1])
                .op(Op::BranchConditional, &[FALSE, 40, 43])
                .op(Op::Label, &[43]);
        },
    );
    let text = decode(&words);
    assert!(text.contains("var x_200: u32;"), "{text}");
    assert!(text.contains("x_200 = 1u + 2u;"), "{text}");
    assert!(!text.contains("let x_200"), "{text}");
    assert!(text.contains("let x_201: u32 = x_200 + 1u;"), "{text}");
    let declared = text.find("var x_200").unwrap();
    let continuing = text.find("continuing {").unwrap();
    assert!(text.find("loop {").unwrap() < declared, "{text}");
    assert!(declared < continuing, "{text}");
}

/// A fragment shader sampling a 2D float image through a sampler, with or
/// without a depth reference.
fn sampling_shader(dref: bool) -> Vec<Word> {
    const VEC2: Word = 20;
    const IMAGE: Word = 21;
    const SAMPLER: Word = 22;
    const SAMPLED: Word = 23;
    const PTR_IMAGE: Word = 24;
    const PTR_SAMPLER: Word = 25;
    const HALF: Word = 26;
    const COORD: Word = 27;
    const TEXTURE: Word = 28;
    const SAMPLER_VAR: Word = 29;
    let uniform = spirv::StorageClass::UniformConstant as u32;
    let mut asm = Assembler::new();
    asm.preamble()
        .op_with_string(
            Op::EntryPoint,
            &[spirv::ExecutionModel::Fragment as u32, MAIN],
            "main",
            &[],
        )
        .op(
            Op::ExecutionMode,
            &[MAIN, spirv::ExecutionMode::OriginUpperLeft as u32],
        )
        .op_with_string(Op::Name, &[TEXTURE], "depth_map", &[])
        .op_with_string(Op::Name, &[SAMPLER_VAR], "shadow_sampler", &[])
        .op(Op::Decorate, &[TEXTURE, spirv::Decoration::DescriptorSet as u32, 0])
        .op(Op::Decorate, &[TEXTURE, spirv::Decoration::Binding as u32, 0])
        .op(Op::Decorate, &[SAMPLER_VAR, spirv::Decoration::DescriptorSet as u32, 0])
        .op(Op::Decorate, &[SAMPLER_VAR, spirv::Decoration::Binding as u32, 1])
        .op(Op::TypeVoid, &[VOID])
        .op(Op::TypeFunction, &[FN_VOID, VOID])
        .op(Op::TypeFloat, &[FLOAT, 32])
        .op(Op::TypeVector, &[VEC2, FLOAT, 2])
        .op(Op::TypeVector, &[VEC4, FLOAT, 4])
        .op(
            Op::TypeImage,
            &[IMAGE, FLOAT, spirv::Dim::Dim2D as u32, 0, 0, 0, 1, 0],
        )
        .op(Op::TypeSampler, &[SAMPLER])
        .op(Op::TypeSampledImage, &[SAMPLED, IMAGE])
        .op(Op::TypePointer, &[PTR_IMAGE, uniform, IMAGE])
        .op(Op::TypePointer, &[PTR_SAMPLER, uniform, SAMPLER])
        .op(Op::Constant, &[FLOAT, HALF, 0.5f32.to_bits()])
        .op(Op::ConstantComposite, &[VEC2, COORD, HALF, HALF])
        .op(Op::Variable, &[PTR_IMAGE, TEXTURE, uniform])
        .op(Op::Variable, &[PTR_SAMPLER, SAMPLER_VAR, uniform])
        .op(
            Op::Function,
            &[VOID, MAIN, spirv::FunctionControl::NONE.bits(), FN_VOID],
        )
        .op(Op::Label, &[ENTRY])
        .op(Op::Load, &[IMAGE, 30, TEXTURE])
        .op(Op::Load, &[SAMPLER, 31, SAMPLER_VAR])
        .op(Op::SampledImage, &[SAMPLED, 32, 30, 31]);
    if dref {
        asm.op(Op::ImageSampleDrefImplicitLod, &[FLOAT, 33, 32, COORD, HALF]);
    } else {
        asm.op(Op::ImageSampleImplicitLod, &[VEC4, 33, 32, COORD]);
    }
    asm.op(Op::Return, &[]).op(Op::FunctionEnd, &[]);
    asm.finish().to_vec()
}

#[test]
fn handle_types_follow_usage() {
    let text = decode(&sampling_shader(true));
    assert!(text.contains("var depth_map: texture_depth_2d;"), "{text}");
    assert!(text.contains("var shadow_sampler: sampler_comparison;"), "{text}");
    assert!(
        text.contains(
            "let x_33: f32 = textureSampleCompare(depth_map, shadow_sampler, vec2f(0.5f, 0.5f), 0.5f);"
        ),
        "{text}"
    );

    let text = decode(&sampling_shader(false));
    assert!(text.contains("var depth_map: texture_2d<f32>;"), "{text}");
    assert!(text.contains("var shadow_sampler: sampler;"), "{text}");
    assert!(text.contains("textureSample(depth_map, shadow_sampler, "), "{text}");
}
