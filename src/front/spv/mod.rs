/*! SPIR-V frontend

Decodes a SPIR-V binary into a WGSL [`ast::Module`].

## Passes

1. The header is checked and the word stream is split into instructions.
2. The module pass reads everything up to the first function, recording
   names, decorations, types, constants and module variables by id, then
   collects the blocks of each function.
3. Every function body is scanned to learn how each texture and sampler is
   used, which decides the WGSL type of its module variable.
4. Module variables are declared, then functions, callees first.
5. Each entry point becomes a wrapper function with WGSL's stage attributes
   that copies its inputs into module-scope `var<private>`s, calls the
   SPIR-V function and returns the outputs.

## Naming

WGSL names come from `OpName` when present and `x_<id>` otherwise, made
unique by a [`namer::Namer`] that also reserves every keyword and builtin.

## Integer signedness

SPIR-V types carry their signedness, but instructions may mix them; see
the `function` module.
!*/

mod convert;
mod error;
mod flow;
mod function;
mod glsl;
mod image;
mod namer;
mod types;
mod usage;

pub use error::Error;

use self::{
    convert::BuiltinValue,
    flow::{Merge, Terminator},
    function::{Expr, FunctionEmitter},
    namer::Namer,
    types::{ImageType, Scalar, Type},
    usage::{HandleTypeName, Usage},
};
use crate::{
    ast::{self, AttributeKind, Literal, StatementKind},
    diagnostic::{self, filter},
    keywords, resolve, FastHashMap, FastIndexMap, Span,
};

use spirv::{Op, StorageClass, Word};

pub const SUPPORTED_CAPABILITIES: &[spirv::Capability] = &[
    spirv::Capability::Shader,
    spirv::Capability::VulkanMemoryModel,
    spirv::Capability::ClipDistance,
    spirv::Capability::CullDistance,
    spirv::Capability::SampleRateShading,
    spirv::Capability::DerivativeControl,
    spirv::Capability::Matrix,
    spirv::Capability::ImageQuery,
    spirv::Capability::Sampled1D,
    spirv::Capability::Image1D,
    spirv::Capability::SampledCubeArray,
    spirv::Capability::ImageCubeArray,
    spirv::Capability::StorageImageExtendedFormats,
    spirv::Capability::Float16,
    spirv::Capability::StorageBuffer16BitAccess,
    spirv::Capability::UniformAndStorageBuffer16BitAccess,
];
pub const SUPPORTED_EXTENSIONS: &[&str] = &[
    "SPV_KHR_storage_buffer_storage_class",
    "SPV_KHR_vulkan_memory_model",
    "SPV_KHR_16bit_storage",
];
pub const SUPPORTED_EXT_SETS: &[&str] = &["GLSL.std.450"];

/// Words before the first instruction.
const HEADER_WORDS: usize = 5;

#[derive(Clone, Debug, Default)]
pub struct Options {
    /// Emit `diagnostic(off, derivative_uniformity);` so that derivatives in
    /// non-uniform control flow are accepted downstream.
    pub allow_non_uniform_derivatives: bool,
    /// SPIR-V's clip space has Y pointing down; negate the Y component of
    /// vertex positions to match WGSL.
    pub adjust_coordinate_space: bool,
    /// Only allow shaders with the known set of capabilities.
    pub strict_capabilities: bool,
}

/// The section of the module being read. Sections must come in this order.
#[derive(Clone, Copy, Debug, PartialEq, PartialOrd)]
pub enum ModuleState {
    Empty,
    Capability,
    Extension,
    ExtInstImport,
    MemoryModel,
    EntryPoint,
    ExecutionMode,
    Source,
    Name,
    ModuleProcessed,
    Annotation,
    Type,
    Function,
}

#[derive(Clone, Debug)]
struct Instruction {
    op: Op,
    wc: u16,
    operands: Vec<Word>,
    /// Word offset in the binary.
    offset: usize,
}

impl Instruction {
    fn expect(&self, count: u16) -> Result<(), Error> {
        if self.wc == count {
            Ok(())
        } else {
            Err(Error::InvalidOperandCount(self.op, self.wc))
        }
    }

    fn expect_at_least(&self, count: u16) -> Result<u16, Error> {
        self.wc
            .checked_sub(count)
            .ok_or(Error::InvalidOperandCount(self.op, self.wc))
    }

    /// Attach this instruction to an error, unless one already is.
    fn wrap(&self, error: Error) -> Error {
        if let Error::Instruction { .. } = error {
            return error;
        }
        let mut disassembly = format!("Op{:?}", self.op);
        for operand in self.operands.iter() {
            disassembly.push_str(&format!(" {operand}"));
        }
        Error::Instruction {
            offset: self.offset,
            disassembly,
            inner: Box::new(error),
        }
    }

    /// The literal string starting at operand `start`, and the index of the
    /// operand after it.
    fn string(&self, start: usize) -> Result<(String, usize), Error> {
        let mut bytes = Vec::new();
        for (index, word) in self.operands.iter().enumerate().skip(start) {
            let chars = word.to_le_bytes();
            match chars.iter().position(|&c| c == 0) {
                Some(end) => {
                    bytes.extend_from_slice(&chars[..end]);
                    let string = String::from_utf8(bytes).map_err(|_| Error::BadString)?;
                    return Ok((string, index + 1));
                }
                None => bytes.extend_from_slice(&chars),
            }
        }
        Err(Error::BadString)
    }
}

#[derive(Debug)]
struct BasicBlock {
    id: Word,
    body: Vec<Instruction>,
    merge: Option<Merge>,
    terminator: Terminator,
}

#[derive(Debug)]
struct FunctionInfo {
    id: Word,
    result_type: Word,
    /// (id, type) of each parameter.
    params: Vec<(Word, Word)>,
    blocks: Vec<BasicBlock>,
}

#[derive(Clone, Debug, Default)]
struct Decoration {
    location: Option<Word>,
    binding: Option<Word>,
    desc_set: Option<Word>,
    builtin: Option<Word>,
    spec_id: Option<Word>,
    non_writable: bool,
    flat: bool,
    no_perspective: bool,
    centroid: bool,
    sample: bool,
    buffer_block: bool,
    invariant: bool,
}

#[derive(Clone, Debug)]
struct GlobalVariable {
    class: StorageClass,
    /// The pointer type of the variable.
    ty: Word,
    /// The type it points to.
    base: Word,
    initializer: Option<Word>,
}

#[derive(Clone, Debug)]
enum ConstantValue {
    Scalar(Literal),
    Composite(Vec<Word>),
    Null,
    Undef,
}

#[derive(Clone, Debug)]
struct Constant {
    ty: Word,
    value: ConstantValue,
    /// Declared with `OpSpecConstant*`: an `override` in WGSL.
    spec: bool,
}

#[derive(Debug)]
struct EntryPoint {
    stage: ast::ShaderStage,
    name: String,
    function_id: Word,
    interface: Vec<Word>,
    workgroup_size: [u32; 3],
}

struct Parser {
    options: Options,
    state: ModuleState,
    module: ast::Module,
    namer: Namer,
    debug_names: FastHashMap<Word, String>,
    member_debug_names: FastHashMap<(Word, u32), String>,
    decorations: FastHashMap<Word, Decoration>,
    member_decorations: FastHashMap<(Word, u32), Decoration>,
    types: FastHashMap<Word, Type>,
    /// The first id declaring each scalar and vector type.
    interned: FastHashMap<(Scalar, u32), Word>,
    /// Ids for types the module does not declare but the output needs,
    /// allocated past the module's id bound.
    next_synthetic_id: Word,
    struct_names: FastHashMap<Word, String>,
    constants: FastHashMap<Word, Constant>,
    /// Names of overrides and of named composite constants once declared.
    constant_names: FastHashMap<Word, String>,
    globals: FastIndexMap<Word, GlobalVariable>,
    global_names: FastHashMap<Word, String>,
    /// The WGSL type each texture variable was declared with.
    handle_names: FastHashMap<Word, HandleTypeName>,
    function_names: FastHashMap<Word, String>,
    function_params: FastHashMap<Word, Vec<Word>>,
    entry_points: Vec<EntryPoint>,
    ext_glsl_id: Option<Word>,
    usage: FastHashMap<Word, Usage>,
}

fn reserved_names() -> Vec<String> {
    let mut names = keywords::wgsl::KEYWORDS
        .iter()
        .chain(keywords::wgsl::RESERVED)
        .map(|&name| name.to_string())
        .collect::<Vec<_>>();
    names.extend(
        resolve::BuiltinFunction::ALL
            .iter()
            .map(|function| function.name().to_string()),
    );
    for scalar in ["bool", "i32", "u32", "f32", "f16"] {
        names.push(scalar.to_string());
    }
    for size in 2..=4 {
        names.push(format!("vec{size}"));
        for suffix in ['i', 'u', 'f', 'h'] {
            names.push(format!("vec{size}{suffix}"));
        }
        for rows in 2..=4 {
            names.push(format!("mat{size}x{rows}"));
            names.push(format!("mat{size}x{rows}f"));
            names.push(format!("mat{size}x{rows}h"));
        }
    }
    for other in [
        "array",
        "atomic",
        "ptr",
        "sampler",
        "sampler_comparison",
        "texture_1d",
        "texture_2d",
        "texture_2d_array",
        "texture_3d",
        "texture_cube",
        "texture_cube_array",
        "texture_multisampled_2d",
        "texture_depth_2d",
        "texture_depth_2d_array",
        "texture_depth_cube",
        "texture_depth_cube_array",
        "texture_depth_multisampled_2d",
        "texture_storage_1d",
        "texture_storage_2d",
        "texture_storage_2d_array",
        "texture_storage_3d",
    ] {
        names.push(other.to_string());
    }
    names
}

impl Parser {
    fn new(options: &Options, bound: Word) -> Self {
        let reserved = reserved_names();
        Parser {
            options: options.clone(),
            state: ModuleState::Empty,
            module: ast::Module::new(),
            namer: Namer::new(reserved.iter().map(String::as_str)),
            debug_names: FastHashMap::default(),
            member_debug_names: FastHashMap::default(),
            decorations: FastHashMap::default(),
            member_decorations: FastHashMap::default(),
            types: FastHashMap::default(),
            interned: FastHashMap::default(),
            next_synthetic_id: bound,
            struct_names: FastHashMap::default(),
            constants: FastHashMap::default(),
            constant_names: FastHashMap::default(),
            globals: FastIndexMap::default(),
            global_names: FastHashMap::default(),
            handle_names: FastHashMap::default(),
            function_names: FastHashMap::default(),
            function_params: FastHashMap::default(),
            entry_points: Vec::new(),
            ext_glsl_id: None,
            usage: FastHashMap::default(),
        }
    }

    fn switch(&mut self, state: ModuleState, op: Op) -> Result<(), Error> {
        if state < self.state {
            Err(Error::UnsupportedInstruction(self.state, op))
        } else {
            self.state = state;
            Ok(())
        }
    }

    fn parse(mut self, instructions: &[Instruction]) -> Result<ast::Module, Error> {
        self.directives(instructions);
        let functions = self.module_pass(instructions)?;

        let bodies = functions
            .iter()
            .flat_map(|function| function.blocks.iter())
            .flat_map(|block| block.body.iter());
        self.collect_usage(bodies)?;
        for (&id, usage) in self.usage.iter() {
            log::trace!("\t%{} {}", id, usage);
        }

        let globals = self.globals.keys().copied().collect::<Vec<_>>();
        for id in globals {
            self.declare_global(id)?;
        }

        let entry_names = self
            .entry_points
            .iter()
            .map(|ep| (ep.function_id, ep.name.clone()))
            .collect::<FastHashMap<_, _>>();
        for function in functions.iter() {
            let label = match self.debug_names.get(&function.id) {
                Some(name) => name.clone(),
                None => match entry_names.get(&function.id) {
                    Some(name) => name.clone(),
                    None => format!("x_{}", function.id),
                },
            };
            let name = self.namer.call(&label);
            self.function_names.insert(function.id, name);
        }

        for index in call_order(&functions)? {
            let function = &functions[index];
            let name = self.function_names[&function.id].clone();
            let declaration = FunctionEmitter::new(&mut self, function).emit(name)?;
            self.module.add_global_declaration(
                ast::GlobalDeclKind::Function(declaration),
                Span::UNDEFINED,
            );
        }

        let entry_points = std::mem::take(&mut self.entry_points);
        for entry_point in entry_points.iter() {
            self.entry_point(entry_point)?;
        }
        Ok(self.module)
    }

    /// `enable` and `diagnostic` directives must precede everything else, so
    /// the instructions that need them are found up front.
    fn directives(&mut self, instructions: &[Instruction]) {
        let mut extensions = Vec::new();
        let half_floats = instructions
            .iter()
            .any(|inst| inst.op == Op::TypeFloat && inst.operands.get(1) == Some(&16));
        if half_floats {
            extensions.push(ast::ExtensionKind::F16);
        }
        let push_constants = instructions.iter().any(|inst| {
            inst.op == Op::TypePointer
                && inst.operands.get(1) == Some(&(StorageClass::PushConstant as u32))
        });
        if push_constants {
            extensions.push(ast::ExtensionKind::ChromiumExperimentalPushConstant);
        }
        if !extensions.is_empty() {
            let extensions = extensions
                .into_iter()
                .map(|kind| ast::Extension {
                    id: self.module.next_id(),
                    span: Span::UNDEFINED,
                    kind,
                })
                .collect();
            self.module.add_global_declaration(
                ast::GlobalDeclKind::Enable { extensions },
                Span::UNDEFINED,
            );
        }
        if self.options.allow_non_uniform_derivatives {
            let control = ast::DiagnosticControl {
                severity: filter::Severity::Off,
                rule: ast::DiagnosticRuleName {
                    category: None,
                    name: ast::Ident::new("derivative_uniformity", Span::UNDEFINED),
                },
            };
            self.module.add_global_declaration(
                ast::GlobalDeclKind::DiagnosticDirective(control),
                Span::UNDEFINED,
            );
        }
    }

    fn module_pass(&mut self, instructions: &[Instruction]) -> Result<Vec<FunctionInfo>, Error> {
        let mut functions = Vec::new();
        let mut iter = instructions.iter();
        while let Some(inst) = iter.next() {
            log::trace!("\t{:?} [{}]", inst.op, inst.wc);
            let result = match inst.op {
                Op::Capability => self.parse_capability(inst),
                Op::Extension => self.parse_extension(inst),
                Op::ExtInstImport => self.parse_ext_inst_import(inst),
                Op::MemoryModel => self.switch(ModuleState::MemoryModel, inst.op),
                Op::EntryPoint => self.parse_entry_point(inst),
                Op::ExecutionMode => self.parse_execution_mode(inst),
                Op::String | Op::Source | Op::SourceExtension | Op::SourceContinued => {
                    self.switch(ModuleState::Source, inst.op)
                }
                Op::Name => self.parse_name(inst),
                Op::MemberName => self.parse_member_name(inst),
                Op::ModuleProcessed => self.switch(ModuleState::ModuleProcessed, inst.op),
                Op::Decorate => self.parse_decorate(inst),
                Op::MemberDecorate => self.parse_member_decorate(inst),
                Op::Line | Op::NoLine | Op::Nop => Ok(()),
                Op::TypeVoid
                | Op::TypeBool
                | Op::TypeInt
                | Op::TypeFloat
                | Op::TypeVector
                | Op::TypeMatrix
                | Op::TypeArray
                | Op::TypeRuntimeArray
                | Op::TypeStruct
                | Op::TypePointer
                | Op::TypeFunction
                | Op::TypeImage
                | Op::TypeSampledImage
                | Op::TypeSampler => self.parse_type(inst),
                Op::Constant
                | Op::SpecConstant
                | Op::ConstantTrue
                | Op::ConstantFalse
                | Op::SpecConstantTrue
                | Op::SpecConstantFalse
                | Op::ConstantComposite
                | Op::SpecConstantComposite
                | Op::ConstantNull
                | Op::Undef => self.parse_constant(inst),
                Op::Variable => self.parse_global_variable(inst),
                Op::Function => self
                    .switch(ModuleState::Function, inst.op)
                    .and_then(|()| self.parse_function(inst, &mut iter))
                    .map(|function| functions.push(function)),
                op => Err(Error::UnsupportedInstruction(self.state, op)),
            };
            result.map_err(|error| inst.wrap(error))?;
        }
        Ok(functions)
    }

    fn parse_capability(&mut self, inst: &Instruction) -> Result<(), Error> {
        self.switch(ModuleState::Capability, inst.op)?;
        inst.expect(2)?;
        let word = inst.operands[0];
        let capability = spirv::Capability::from_u32(word).ok_or(Error::UnknownCapability(word))?;
        if !SUPPORTED_CAPABILITIES.contains(&capability) {
            if self.options.strict_capabilities {
                return Err(Error::UnsupportedCapability(capability));
            }
            log::warn!("Unknown capability {:?}", capability);
        }
        Ok(())
    }

    fn parse_extension(&mut self, inst: &Instruction) -> Result<(), Error> {
        self.switch(ModuleState::Extension, inst.op)?;
        inst.expect_at_least(2)?;
        let (name, _) = inst.string(0)?;
        if !SUPPORTED_EXTENSIONS.contains(&name.as_str()) {
            return Err(Error::UnsupportedExtension(name));
        }
        Ok(())
    }

    fn parse_ext_inst_import(&mut self, inst: &Instruction) -> Result<(), Error> {
        self.switch(ModuleState::ExtInstImport, inst.op)?;
        inst.expect_at_least(3)?;
        let (name, _) = inst.string(1)?;
        if !SUPPORTED_EXT_SETS.contains(&name.as_str()) {
            return Err(Error::UnsupportedExtSet(name));
        }
        self.ext_glsl_id = Some(inst.operands[0]);
        Ok(())
    }

    fn parse_entry_point(&mut self, inst: &Instruction) -> Result<(), Error> {
        self.switch(ModuleState::EntryPoint, inst.op)?;
        inst.expect_at_least(4)?;
        let model = inst.operands[0];
        let stage = match spirv::ExecutionModel::from_u32(model) {
            Some(spirv::ExecutionModel::Vertex) => ast::ShaderStage::Vertex,
            Some(spirv::ExecutionModel::Fragment) => ast::ShaderStage::Fragment,
            Some(spirv::ExecutionModel::GLCompute) => ast::ShaderStage::Compute,
            _ => return Err(Error::UnsupportedExecutionModel(model)),
        };
        let (label, next) = inst.string(2)?;
        // Entry points are named before anything else so that the wrappers
        // keep their names.
        let name = self.namer.call(&Namer::sanitize(&label));
        if name != label {
            log::warn!("entry point {} renamed to {}", label, name);
        }
        self.entry_points.push(EntryPoint {
            stage,
            name,
            function_id: inst.operands[1],
            interface: inst.operands[next..].to_vec(),
            workgroup_size: [1; 3],
        });
        Ok(())
    }

    fn parse_execution_mode(&mut self, inst: &Instruction) -> Result<(), Error> {
        use spirv::ExecutionMode as Em;

        self.switch(ModuleState::ExecutionMode, inst.op)?;
        inst.expect_at_least(3)?;
        let (function_id, mode) = (inst.operands[0], inst.operands[1]);
        let entry_point = self
            .entry_points
            .iter_mut()
            .find(|ep| ep.function_id == function_id)
            .ok_or(Error::InvalidId(function_id))?;
        match Em::from_u32(mode) {
            Some(Em::LocalSize) => {
                inst.expect(6)?;
                entry_point.workgroup_size = [inst.operands[2], inst.operands[3], inst.operands[4]];
            }
            // Implied by WGSL.
            Some(Em::OriginUpperLeft | Em::DepthReplacing) => {}
            other => log::warn!("Ignoring execution mode {:?}", other),
        }
        Ok(())
    }

    fn parse_name(&mut self, inst: &Instruction) -> Result<(), Error> {
        self.switch(ModuleState::Name, inst.op)?;
        inst.expect_at_least(3)?;
        let (name, _) = inst.string(1)?;
        if !name.is_empty() {
            self.debug_names.insert(inst.operands[0], name);
        }
        Ok(())
    }

    fn parse_member_name(&mut self, inst: &Instruction) -> Result<(), Error> {
        self.switch(ModuleState::Name, inst.op)?;
        inst.expect_at_least(4)?;
        let (name, _) = inst.string(2)?;
        if !name.is_empty() {
            self.member_debug_names
                .insert((inst.operands[0], inst.operands[1]), name);
        }
        Ok(())
    }

    fn parse_decorate(&mut self, inst: &Instruction) -> Result<(), Error> {
        self.switch(ModuleState::Annotation, inst.op)?;
        inst.expect_at_least(3)?;
        let id = inst.operands[0];
        let mut decoration = self.decorations.remove(&id).unwrap_or_default();
        apply_decoration(&mut decoration, &inst.operands[1..])?;
        self.decorations.insert(id, decoration);
        Ok(())
    }

    fn parse_member_decorate(&mut self, inst: &Instruction) -> Result<(), Error> {
        self.switch(ModuleState::Annotation, inst.op)?;
        inst.expect_at_least(4)?;
        let key = (inst.operands[0], inst.operands[1]);
        let mut decoration = self.member_decorations.remove(&key).unwrap_or_default();
        apply_decoration(&mut decoration, &inst.operands[2..])?;
        self.member_decorations.insert(key, decoration);
        Ok(())
    }

    fn parse_type(&mut self, inst: &Instruction) -> Result<(), Error> {
        self.switch(ModuleState::Type, inst.op)?;
        inst.expect_at_least(2)?;
        let ops = &inst.operands;
        let id = ops[0];
        let ty = match inst.op {
            Op::TypeVoid => Type::Void,
            Op::TypeBool => Type::Scalar(Scalar::Bool),
            Op::TypeInt => {
                inst.expect(4)?;
                if ops[1] != 32 {
                    return Err(Error::InvalidTypeWidth(ops[1]));
                }
                Type::Scalar(if ops[2] != 0 { Scalar::I32 } else { Scalar::U32 })
            }
            Op::TypeFloat => {
                inst.expect_at_least(3)?;
                match ops[1] {
                    32 => Type::Scalar(Scalar::F32),
                    16 => Type::Scalar(Scalar::F16),
                    width => return Err(Error::InvalidTypeWidth(width)),
                }
            }
            Op::TypeVector => {
                inst.expect(4)?;
                let scalar = match self.scalar_info(ops[1]) {
                    Some((scalar, 1)) => scalar,
                    _ => return Err(Error::InvalidId(ops[1])),
                };
                Type::Vector {
                    size: convert::map_vector_size(ops[2])?,
                    scalar,
                }
            }
            Op::TypeMatrix => {
                inst.expect(4)?;
                let (scalar, rows) = match self.scalar_info(ops[1]) {
                    Some((scalar, rows)) if rows > 1 => (scalar, rows),
                    _ => return Err(Error::InvalidId(ops[1])),
                };
                Type::Matrix {
                    columns: convert::map_vector_size(ops[2])?,
                    rows,
                    scalar,
                }
            }
            Op::TypeArray => {
                inst.expect(4)?;
                let length = ops[2];
                match self.constants.get(&length) {
                    Some(constant) if !constant.spec => {}
                    _ => return Err(Error::InvalidArraySize(length)),
                }
                Type::Array {
                    base: ops[1],
                    length: Some(length),
                }
            }
            Op::TypeRuntimeArray => {
                inst.expect(3)?;
                Type::Array {
                    base: ops[1],
                    length: None,
                }
            }
            Op::TypeStruct => Type::Struct {
                members: ops[1..].to_vec(),
            },
            Op::TypePointer => {
                inst.expect(4)?;
                Type::Pointer {
                    class: convert::map_storage_class(ops[1])?,
                    base: ops[2],
                }
            }
            Op::TypeFunction => {
                inst.expect_at_least(3)?;
                Type::Function {
                    result: ops[1],
                    params: ops[2..].to_vec(),
                }
            }
            Op::TypeImage => {
                inst.expect_at_least(9)?;
                let dim = convert::map_image_dim(ops[2])?;
                if dim == spirv::Dim::Dim1D && ops[4] != 0 {
                    return Err(Error::UnsupportedImageDim(ops[2]));
                }
                Type::Image(ImageType {
                    sampled_type: ops[1],
                    dim,
                    depth: ops[3],
                    arrayed: ops[4] != 0,
                    multisampled: ops[5] != 0,
                    sampled: ops[6],
                    format: convert::map_image_format(ops[7])?,
                })
            }
            Op::TypeSampledImage => {
                inst.expect(3)?;
                Type::SampledImage { image: ops[1] }
            }
            Op::TypeSampler => Type::Sampler,
            op => return Err(Error::UnsupportedInstruction(self.state, op)),
        };
        self.register_type(id, ty);
        Ok(())
    }

    fn parse_constant(&mut self, inst: &Instruction) -> Result<(), Error> {
        self.switch(ModuleState::Type, inst.op)?;
        inst.expect_at_least(3)?;
        let ops = &inst.operands;
        let (ty, id) = (ops[0], ops[1]);
        let spec = matches!(
            inst.op,
            Op::SpecConstant | Op::SpecConstantTrue | Op::SpecConstantFalse
        );
        let value = match inst.op {
            Op::Constant | Op::SpecConstant => {
                inst.expect(4)?;
                match self.scalar_info(ty) {
                    Some((scalar, 1)) => ConstantValue::Scalar(scalar.literal(ops[2])),
                    _ => return Err(Error::InvalidTypeWidth(ty)),
                }
            }
            Op::ConstantTrue | Op::SpecConstantTrue => ConstantValue::Scalar(Literal::Bool(true)),
            Op::ConstantFalse | Op::SpecConstantFalse => {
                ConstantValue::Scalar(Literal::Bool(false))
            }
            Op::ConstantComposite | Op::SpecConstantComposite => {
                ConstantValue::Composite(ops[2..].to_vec())
            }
            Op::ConstantNull => ConstantValue::Null,
            _ => ConstantValue::Undef,
        };
        self.constants.insert(
            id,
            Constant {
                ty,
                value: value.clone(),
                spec,
            },
        );
        if let (true, ConstantValue::Scalar(literal)) = (spec, value) {
            self.declare_override(id, ty, literal)?;
        }
        Ok(())
    }

    fn declare_override(&mut self, id: Word, ty: Word, literal: Literal) -> Result<(), Error> {
        let name = self.value_name(id);
        let ty_expr = self.type_expr(ty)?;
        let initializer = self.module.literal_expr(literal, Span::UNDEFINED);
        let mut attributes = Vec::new();
        if let Some(spec_id) = self.decorations.get(&id).and_then(|d| d.spec_id) {
            let value = self.attribute_literal(spec_id);
            attributes.push(self.attribute(AttributeKind::Id(value)));
        }
        self.module.add_global_declaration(
            ast::GlobalDeclKind::Variable(ast::Variable {
                name: ast::Ident::new(name.clone(), Span::UNDEFINED),
                kind: ast::VariableKind::Override,
                ty: Some(ty_expr),
                initializer: Some(initializer),
                attributes,
            }),
            Span::UNDEFINED,
        );
        self.constant_names.insert(id, name);
        Ok(())
    }

    fn parse_global_variable(&mut self, inst: &Instruction) -> Result<(), Error> {
        self.switch(ModuleState::Type, inst.op)?;
        inst.expect_at_least(4)?;
        let ops = &inst.operands;
        let (ty, id) = (ops[0], ops[1]);
        let class = convert::map_storage_class(ops[2])?;
        let base = match *self.lookup_type(ty)? {
            Type::Pointer { base, .. } => base,
            _ => return Err(Error::InvalidAccessType(ty)),
        };
        if class == StorageClass::Function {
            return Err(Error::UnsupportedStorageClass(ops[2]));
        }
        self.globals.insert(
            id,
            GlobalVariable {
                class,
                ty,
                base,
                initializer: ops.get(3).copied(),
            },
        );
        Ok(())
    }

    fn parse_function<'a>(
        &mut self,
        header: &Instruction,
        rest: &mut impl Iterator<Item = &'a Instruction>,
    ) -> Result<FunctionInfo, Error> {
        header.expect(5)?;
        let (result_type, id, function_type) =
            (header.operands[0], header.operands[1], header.operands[3]);
        let param_types = match *self.lookup_type(function_type)? {
            Type::Function { ref params, .. } => params.clone(),
            _ => return Err(Error::InvalidId(function_type)),
        };
        log::debug!("function %{} with {} parameters", id, param_types.len());
        self.function_params.insert(id, param_types);

        let mut info = FunctionInfo {
            id,
            result_type,
            params: Vec::new(),
            blocks: Vec::new(),
        };
        let mut current: Option<BasicBlock> = None;
        for inst in rest {
            let done = function_instruction(&mut info, &mut current, inst)
                .map_err(|error| inst.wrap(error))?;
            if done {
                return Ok(info);
            }
        }
        Err(Error::IncompleteData)
    }

    // Lookups shared by the function emitter.

    /// A fresh WGSL name for the value `id`.
    fn value_name(&mut self, id: Word) -> String {
        match self.debug_names.get(&id) {
            Some(name) => {
                let name = name.clone();
                self.namer.call(&name)
            }
            None => self.namer.call(&format!("x_{id}")),
        }
    }

    /// The value of an integer constant.
    fn constant_u32(&self, id: Word) -> Option<u32> {
        match self.constants.get(&id)?.value {
            ConstantValue::Scalar(Literal::U32(value)) => Some(value),
            ConstantValue::Scalar(Literal::I32(value)) => u32::try_from(value).ok(),
            _ => None,
        }
    }

    /// Whether `id` is a constant zero of any scalar type.
    fn constant_is_zero(&self, id: Word) -> bool {
        match self.constants.get(&id).map(|c| &c.value) {
            Some(&ConstantValue::Scalar(Literal::F32(value) | Literal::F16(value))) => value == 0.0,
            Some(&ConstantValue::Null) => true,
            _ => self.constant_u32(id) == Some(0),
        }
    }

    fn constant_expr(&mut self, id: Word) -> Result<Expr, Error> {
        if let Some(name) = self.constant_names.get(&id) {
            return Ok(self.module.ident_expr(name.clone(), Span::UNDEFINED));
        }
        let constant = self.constants.get(&id).cloned().ok_or(Error::InvalidId(id))?;
        match constant.value {
            ConstantValue::Scalar(literal) => Ok(self.module.literal_expr(literal, Span::UNDEFINED)),
            ConstantValue::Composite(parts) => {
                let callee = self.type_expr(constant.ty)?;
                let arguments = parts
                    .iter()
                    .map(|&part| self.constant_expr(part))
                    .collect::<Result<Vec<_>, _>>()?;
                let value = self.module.call_expr(callee, arguments, Span::UNDEFINED);
                if !self.debug_names.contains_key(&id) {
                    return Ok(value);
                }
                let name = self.value_name(id);
                let ty = self.type_expr(constant.ty)?;
                self.module.add_global_declaration(
                    ast::GlobalDeclKind::Variable(ast::Variable {
                        name: ast::Ident::new(name.clone(), Span::UNDEFINED),
                        kind: ast::VariableKind::Const,
                        ty: Some(ty),
                        initializer: Some(value),
                        attributes: Vec::new(),
                    }),
                    Span::UNDEFINED,
                );
                self.constant_names.insert(id, name.clone());
                Ok(self.module.ident_expr(name, Span::UNDEFINED))
            }
            ConstantValue::Null | ConstantValue::Undef => self.zero_value(constant.ty),
        }
    }

    /// The expression and type of a constant or module variable.
    fn module_value(&mut self, id: Word) -> Result<(Expr, Word), Error> {
        if let Some(constant) = self.constants.get(&id) {
            let ty = constant.ty;
            return Ok((self.constant_expr(id)?, ty));
        }
        if let Some(global) = self.globals.get(&id) {
            let ty = global.ty;
            let name = self
                .global_names
                .get(&id)
                .cloned()
                .ok_or(Error::InvalidId(id))?;
            return Ok((self.module.ident_expr(name, Span::UNDEFINED), ty));
        }
        Err(Error::UnhandledExpression(id))
    }

    fn module_value_type(&self, id: Word) -> Option<Word> {
        match self.constants.get(&id) {
            Some(constant) => Some(constant.ty),
            None => self.globals.get(&id).map(|global| global.ty),
        }
    }

    fn function_parameter_types(&self, id: Word) -> Result<Vec<Word>, Error> {
        self.function_params
            .get(&id)
            .cloned()
            .ok_or(Error::InvalidId(id))
    }

    // Declarations.

    fn attribute(&mut self, kind: AttributeKind) -> ast::Attribute {
        ast::Attribute {
            id: self.module.next_id(),
            span: Span::UNDEFINED,
            kind,
        }
    }

    fn attribute_literal(&mut self, value: u32) -> Expr {
        self.module
            .literal_expr(Literal::AbstractInt(i64::from(value)), Span::UNDEFINED)
    }

    fn resource_attributes(&mut self, id: Word) -> Vec<ast::Attribute> {
        let decoration = self.decorations.get(&id).cloned().unwrap_or_default();
        let mut attributes = Vec::new();
        if let Some(set) = decoration.desc_set {
            let value = self.attribute_literal(set);
            attributes.push(self.attribute(AttributeKind::Group(value)));
        }
        if let Some(binding) = decoration.binding {
            let value = self.attribute_literal(binding);
            attributes.push(self.attribute(AttributeKind::Binding(value)));
        }
        attributes
    }

    /// The WGSL type of a texture or sampler variable, from its usage.
    fn handle_type(&mut self, id: Word, base: Word) -> Result<Expr, Error> {
        let usage = self.usage.get(&id).copied().unwrap_or_default();
        match self.lookup_type(base)?.clone() {
            Type::Sampler => {
                let name = if usage.contains(Usage::COMPARISON_SAMPLER) {
                    "sampler_comparison"
                } else {
                    "sampler"
                };
                Ok(self.module.ident_expr(name, Span::UNDEFINED))
            }
            Type::Image(ref image) => {
                let name = usage::image_type_name(image, Some((id, usage)))?;
                self.handle_names.insert(id, name);
                self.handle_type_expr(name, image)
            }
            _ => Err(Error::UnsupportedType(base)),
        }
    }

    fn declare_global(&mut self, id: Word) -> Result<(), Error> {
        let global = self.globals[&id].clone();
        let name = self.value_name(id);
        self.global_names.insert(id, name.clone());
        log::debug!("declaring %{} as {} in {:?}", id, name, global.class);

        let mut attributes = Vec::new();
        let (space, access, ty) = match global.class {
            StorageClass::UniformConstant => {
                attributes = self.resource_attributes(id);
                (None, None, self.handle_type(id, global.base)?)
            }
            StorageClass::Uniform | StorageClass::StorageBuffer => {
                attributes = self.resource_attributes(id);
                let buffer_block = self
                    .decorations
                    .get(&global.base)
                    .map_or(false, |d| d.buffer_block);
                if global.class == StorageClass::Uniform && !buffer_block {
                    (Some("uniform"), None, self.type_expr(global.base)?)
                } else {
                    let access = if self.is_read_only(id, global.base) {
                        "read"
                    } else {
                        "read_write"
                    };
                    (Some("storage"), Some(access), self.type_expr(global.base)?)
                }
            }
            StorageClass::Workgroup => (Some("workgroup"), None, self.type_expr(global.base)?),
            StorageClass::PushConstant => {
                (Some("push_constant"), None, self.type_expr(global.base)?)
            }
            // Inputs and outputs are copied in and out by the entry point
            // wrappers.
            StorageClass::Private | StorageClass::Input | StorageClass::Output => {
                (Some("private"), None, self.type_expr(global.base)?)
            }
            other => return Err(Error::UnsupportedStorageClass(other as u32)),
        };
        let initializer = match global.initializer {
            Some(init) => Some(self.constant_expr(init)?),
            None => None,
        };
        let address_space = space.map(|space| self.module.ident_expr(space, Span::UNDEFINED));
        let access = access.map(|access| self.module.ident_expr(access, Span::UNDEFINED));
        self.module.add_global_declaration(
            ast::GlobalDeclKind::Variable(ast::Variable {
                name: ast::Ident::new(name, Span::UNDEFINED),
                kind: ast::VariableKind::Var {
                    address_space,
                    access,
                },
                ty: Some(ty),
                initializer,
                attributes,
            }),
            Span::UNDEFINED,
        );
        Ok(())
    }

    /// A storage buffer is read-only if the variable, or every member of its
    /// struct, is `NonWritable`.
    fn is_read_only(&self, id: Word, base: Word) -> bool {
        if self.decorations.get(&id).map_or(false, |d| d.non_writable) {
            return true;
        }
        match self.types.get(&base) {
            Some(Type::Struct { members }) => (0..members.len() as u32).all(|index| {
                self.member_decorations
                    .get(&(base, index))
                    .map_or(false, |d| d.non_writable)
            }),
            _ => false,
        }
    }

    // Entry points.

    /// `@location` and interpolation attributes for a user-defined stage
    /// input or output.
    fn location_attributes(
        &mut self,
        decoration: &Decoration,
        ty: Word,
        interpolated: bool,
    ) -> Result<Vec<ast::Attribute>, Error> {
        let location = decoration.location.ok_or(Error::InvalidDecoration(ty))?;
        let value = self.attribute_literal(location);
        let mut attributes = vec![self.attribute(AttributeKind::Location(value))];
        if !interpolated {
            return Ok(attributes);
        }
        let integer = self
            .scalar_info(ty)
            .map_or(false, |(scalar, _)| scalar.is_integer());
        let sampling = if decoration.centroid {
            Some("centroid")
        } else if decoration.sample {
            Some("sample")
        } else {
            None
        };
        let kind = if integer || decoration.flat {
            Some(("flat", None))
        } else if decoration.no_perspective {
            Some(("linear", sampling))
        } else {
            sampling.map(|sampling| ("perspective", Some(sampling)))
        };
        if let Some((kind, sampling)) = kind {
            let ty = self.module.ident_expr(kind, Span::UNDEFINED);
            let sampling = sampling.map(|s| self.module.ident_expr(s, Span::UNDEFINED));
            attributes.push(self.attribute(AttributeKind::Interpolate { ty, sampling }));
        }
        Ok(attributes)
    }

    fn builtin_attributes(&mut self, builtin: BuiltinValue, invariant: bool) -> Vec<ast::Attribute> {
        let name = self.module.ident_expr(builtin.name, Span::UNDEFINED);
        let mut attributes = vec![self.attribute(AttributeKind::Builtin(name))];
        if invariant {
            attributes.push(self.attribute(AttributeKind::Invariant));
        }
        attributes
    }

    /// Bitcast `expr` from `from` to `to` when only their signedness differs.
    fn convert_io(&mut self, expr: Expr, from: Word, to: Word) -> Result<Expr, Error> {
        match (self.scalar_info(from), self.scalar_info(to)) {
            (Some((a, _)), Some((b, _))) if a != b && a.is_integer() && b.is_integer() => {
                let ty = self.type_expr(to)?;
                Ok(self
                    .module
                    .add_expression(ast::ExpressionKind::Bitcast { ty, expr }, Span::UNDEFINED))
            }
            _ => Ok(expr),
        }
    }

    fn statement(&mut self, kind: StatementKind) -> ast::Statement {
        self.module.statement(kind, Span::UNDEFINED)
    }

    fn entry_point(&mut self, entry_point: &EntryPoint) -> Result<(), Error> {
        let stage = entry_point.stage;
        log::debug!("wrapping {:?} entry point {}", stage, entry_point.name);
        let mut params = Vec::new();
        let mut body = Vec::new();
        let mut members = Vec::new();
        let mut results = Vec::new();

        for &id in entry_point.interface.iter() {
            let Some(global) = self.globals.get(&id).cloned() else {
                continue;
            };
            if global.class != StorageClass::Input {
                continue;
            }
            let decoration = self.decorations.get(&id).cloned().unwrap_or_default();
            if let Some(Type::Struct { .. }) = self.types.get(&global.base) {
                return Err(Error::UnsupportedType(global.base));
            }
            let var_name = self.global_names[&id].clone();
            let (ty, attributes) = match decoration.builtin {
                Some(word) => match convert::map_builtin(word)? {
                    Some(builtin) => (
                        self.shaped_type(builtin.scalar, builtin.size),
                        self.builtin_attributes(builtin, false),
                    ),
                    None => continue,
                },
                None => {
                    let interpolated = stage == ast::ShaderStage::Fragment;
                    let attributes =
                        self.location_attributes(&decoration, global.base, interpolated)?;
                    (global.base, attributes)
                }
            };
            let param_name = self.namer.call(&format!("{var_name}_param"));
            let param_ty = self.type_expr(ty)?;
            params.push(ast::Parameter {
                id: self.module.next_id(),
                span: Span::UNDEFINED,
                name: ast::Ident::new(param_name.clone(), Span::UNDEFINED),
                ty: param_ty,
                attributes,
            });
            let value = self.module.ident_expr(param_name, Span::UNDEFINED);
            let rhs = self.convert_io(value, ty, global.base)?;
            let lhs = self.module.ident_expr(var_name, Span::UNDEFINED);
            body.push(self.statement(StatementKind::Assignment { lhs, op: None, rhs }));
        }

        let callee_name = self.function_names[&entry_point.function_id].clone();
        let callee = self.module.ident_expr(callee_name, Span::UNDEFINED);
        let call = self.module.call_expr(callee, Vec::new(), Span::UNDEFINED);
        body.push(self.statement(StatementKind::Call(call)));

        for &id in entry_point.interface.iter() {
            let Some(global) = self.globals.get(&id).cloned() else {
                continue;
            };
            if global.class != StorageClass::Output {
                continue;
            }
            let var_name = self.global_names[&id].clone();
            let decoration = self.decorations.get(&id).cloned().unwrap_or_default();
            let struct_members = match self.types.get(&global.base) {
                Some(Type::Struct { members }) => Some(members.clone()),
                _ => None,
            };
            match struct_members {
                // `gl_PerVertex` and friends: one output per builtin member.
                Some(member_types) => {
                    for (index, &member_ty) in member_types.iter().enumerate() {
                        let index = index as u32;
                        let member_decoration = self
                            .member_decorations
                            .get(&(global.base, index))
                            .cloned()
                            .unwrap_or_default();
                        let builtin = match member_decoration.builtin {
                            Some(word) => convert::map_builtin(word)?,
                            None => return Err(Error::UnsupportedType(global.base)),
                        };
                        let Some(builtin) = builtin else {
                            continue;
                        };
                        let member_name = self.member_name(global.base, index);
                        let base = self.module.ident_expr(var_name.clone(), Span::UNDEFINED);
                        let value = self.module.add_expression(
                            ast::ExpressionKind::Member {
                                base,
                                member: ast::Ident::new(member_name.clone(), Span::UNDEFINED),
                            },
                            Span::UNDEFINED,
                        );
                        self.flip_position(&mut body, builtin, value)?;
                        let natural = self.shaped_type(builtin.scalar, builtin.size);
                        let value = self.module.duplicate_expression(value);
                        let value = self.convert_io(value, member_ty, natural)?;
                        let attributes =
                            self.builtin_attributes(builtin, member_decoration.invariant);
                        members.push((member_name, natural, attributes));
                        results.push(value);
                    }
                }
                None => {
                    let (ty, attributes) = match decoration.builtin {
                        Some(word) => match convert::map_builtin(word)? {
                            Some(builtin) => {
                                let value =
                                    self.module.ident_expr(var_name.clone(), Span::UNDEFINED);
                                self.flip_position(&mut body, builtin, value)?;
                                (
                                    self.shaped_type(builtin.scalar, builtin.size),
                                    self.builtin_attributes(builtin, decoration.invariant),
                                )
                            }
                            None => continue,
                        },
                        None => {
                            let interpolated = stage == ast::ShaderStage::Vertex;
                            let attributes =
                                self.location_attributes(&decoration, global.base, interpolated)?;
                            (global.base, attributes)
                        }
                    };
                    let value = self.module.ident_expr(var_name.clone(), Span::UNDEFINED);
                    let value = self.convert_io(value, global.base, ty)?;
                    members.push((var_name, ty, attributes));
                    results.push(value);
                }
            }
        }

        let return_type = if members.is_empty() {
            None
        } else {
            let struct_name = self.namer.call(&format!("{}_out", entry_point.name));
            let mut ast_members = Vec::with_capacity(members.len());
            for (name, ty, attributes) in members {
                let ty = self.type_expr(ty)?;
                ast_members.push(ast::StructMember {
                    id: self.module.next_id(),
                    span: Span::UNDEFINED,
                    name: ast::Ident::new(name, Span::UNDEFINED),
                    ty,
                    attributes,
                });
            }
            self.module.add_global_declaration(
                ast::GlobalDeclKind::TypeDecl(ast::TypeDecl::Struct(ast::Struct {
                    name: ast::Ident::new(struct_name.clone(), Span::UNDEFINED),
                    members: ast_members,
                    attributes: Vec::new(),
                })),
                Span::UNDEFINED,
            );
            let constructor = self.module.ident_expr(struct_name.clone(), Span::UNDEFINED);
            let value = self.module.call_expr(constructor, results, Span::UNDEFINED);
            body.push(self.statement(StatementKind::Return(Some(value))));
            Some(self.module.ident_expr(struct_name, Span::UNDEFINED))
        };

        let mut attributes = vec![self.attribute(match stage {
            ast::ShaderStage::Vertex => AttributeKind::Vertex,
            ast::ShaderStage::Fragment => AttributeKind::Fragment,
            ast::ShaderStage::Compute => AttributeKind::Compute,
        })];
        if stage == ast::ShaderStage::Compute {
            let [x, y, z] = entry_point.workgroup_size;
            let x = self.attribute_literal(x);
            let y = Some(self.attribute_literal(y));
            let z = Some(self.attribute_literal(z));
            attributes.push(self.attribute(AttributeKind::WorkgroupSize { x, y, z }));
        }
        let body = self.module.block(body, Span::UNDEFINED);
        self.module.add_global_declaration(
            ast::GlobalDeclKind::Function(ast::Function {
                name: ast::Ident::new(entry_point.name.clone(), Span::UNDEFINED),
                params,
                return_type,
                return_attributes: Vec::new(),
                attributes,
                body,
            }),
            Span::UNDEFINED,
        );
        Ok(())
    }

    /// `position.y = -position.y;` when adjusting the coordinate space.
    fn flip_position(
        &mut self,
        body: &mut Vec<ast::Statement>,
        builtin: BuiltinValue,
        position: Expr,
    ) -> Result<(), Error> {
        if !self.options.adjust_coordinate_space || builtin.name != "position" {
            return Ok(());
        }
        let member = |module: &mut ast::Module| {
            let base = module.duplicate_expression(position);
            module.add_expression(
                ast::ExpressionKind::Member {
                    base,
                    member: ast::Ident::new("y", Span::UNDEFINED),
                },
                Span::UNDEFINED,
            )
        };
        let lhs = member(&mut self.module);
        let y = member(&mut self.module);
        let rhs = self.module.add_expression(
            ast::ExpressionKind::Unary {
                op: ast::UnaryOperator::Negate,
                expr: y,
            },
            Span::UNDEFINED,
        );
        body.push(self.statement(StatementKind::Assignment { lhs, op: None, rhs }));
        Ok(())
    }
}

fn apply_decoration(decoration: &mut Decoration, words: &[Word]) -> Result<(), Error> {
    use spirv::Decoration as Dec;

    let raw = words[0];
    let argument = || words.get(1).copied().ok_or(Error::InvalidDecoration(raw));
    match Dec::from_u32(raw).ok_or(Error::InvalidDecoration(raw))? {
        Dec::Location => decoration.location = Some(argument()?),
        Dec::Binding => decoration.binding = Some(argument()?),
        Dec::DescriptorSet => decoration.desc_set = Some(argument()?),
        Dec::BuiltIn => decoration.builtin = Some(argument()?),
        Dec::SpecId => decoration.spec_id = Some(argument()?),
        Dec::NonWritable => decoration.non_writable = true,
        Dec::Flat => decoration.flat = true,
        Dec::NoPerspective => decoration.no_perspective = true,
        Dec::Centroid => decoration.centroid = true,
        Dec::Sample => decoration.sample = true,
        Dec::BufferBlock => decoration.buffer_block = true,
        Dec::Invariant => decoration.invariant = true,
        // WGSL computes layouts itself.
        Dec::Block | Dec::Offset | Dec::ArrayStride | Dec::MatrixStride | Dec::ColMajor => {}
        Dec::RelaxedPrecision | Dec::NonReadable | Dec::Restrict | Dec::Aliased => {}
        other => log::warn!("Unknown decoration {:?}", other),
    }
    Ok(())
}

/// Add one instruction of a function body. Returns whether it ended the
/// function.
fn function_instruction(
    info: &mut FunctionInfo,
    current: &mut Option<BasicBlock>,
    inst: &Instruction,
) -> Result<bool, Error> {
    let ops = &inst.operands;
    let terminator = match inst.op {
        Op::FunctionParameter => {
            inst.expect(3)?;
            info.params.push((ops[1], ops[0]));
            return Ok(false);
        }
        Op::Label => {
            inst.expect(2)?;
            if let Some(block) = current.take() {
                return Err(Error::InvalidTerminator(block.id));
            }
            *current = Some(BasicBlock {
                id: ops[0],
                body: Vec::new(),
                merge: None,
                terminator: Terminator::Unreachable,
            });
            return Ok(false);
        }
        Op::FunctionEnd => {
            if let Some(block) = current.take() {
                return Err(Error::InvalidTerminator(block.id));
            }
            return Ok(true);
        }
        Op::Line | Op::NoLine | Op::Nop => return Ok(false),
        Op::SelectionMerge => {
            inst.expect(3)?;
            let block = current.as_mut().ok_or(Error::InvalidTerminator(info.id))?;
            block.merge = Some(Merge::Selection(ops[0]));
            return Ok(false);
        }
        Op::LoopMerge => {
            inst.expect_at_least(4)?;
            let block = current.as_mut().ok_or(Error::InvalidTerminator(info.id))?;
            block.merge = Some(Merge::Loop {
                merge: ops[0],
                continuing: ops[1],
            });
            return Ok(false);
        }
        Op::Branch => {
            inst.expect(2)?;
            Terminator::Branch(ops[0])
        }
        Op::BranchConditional => {
            inst.expect_at_least(4)?;
            Terminator::BranchConditional {
                condition: ops[0],
                accept: ops[1],
                reject: ops[2],
            }
        }
        Op::Switch => {
            inst.expect_at_least(3)?;
            Terminator::Switch {
                selector: ops[0],
                default: ops[1],
                targets: ops[2..]
                    .chunks(2)
                    .filter_map(|pair| match *pair {
                        [literal, target] => Some((literal, target)),
                        _ => None,
                    })
                    .collect(),
            }
        }
        Op::Return => Terminator::Return,
        Op::ReturnValue => {
            inst.expect(2)?;
            Terminator::ReturnValue(ops[0])
        }
        Op::Kill | Op::TerminateInvocation => Terminator::Kill,
        Op::Unreachable => Terminator::Unreachable,
        _ => {
            let block = current.as_mut().ok_or(Error::InvalidTerminator(info.id))?;
            block.body.push(inst.clone());
            return Ok(false);
        }
    };
    let mut block = current.take().ok_or(Error::InvalidTerminator(info.id))?;
    block.terminator = terminator;
    info.blocks.push(block);
    Ok(false)
}

/// Function indices ordered so that every function comes after the
/// functions it calls.
fn call_order(functions: &[FunctionInfo]) -> Result<Vec<usize>, Error> {
    let mut graph = petgraph::Graph::<usize, ()>::new();
    let nodes = (0..functions.len())
        .map(|index| graph.add_node(index))
        .collect::<Vec<_>>();
    let index_of = functions
        .iter()
        .enumerate()
        .map(|(index, function)| (function.id, index))
        .collect::<FastHashMap<_, _>>();
    for (caller, function) in functions.iter().enumerate() {
        let calls = function
            .blocks
            .iter()
            .flat_map(|block| block.body.iter())
            .filter(|inst| inst.op == Op::FunctionCall);
        for inst in calls {
            let callee = *inst.operands.get(2).ok_or(Error::InvalidOperandCount(inst.op, inst.wc))?;
            let callee = *index_of.get(&callee).ok_or(Error::InvalidId(callee))?;
            graph.update_edge(nodes[caller], nodes[callee], ());
        }
    }
    let mut order = petgraph::algo::toposort(&graph, None)
        .map_err(|cycle| Error::FunctionCallCycle(functions[graph[cycle.node_id()]].id))?;
    // Callers come first in a topological order; callees must be declared
    // first.
    order.reverse();
    Ok(order.into_iter().map(|node| graph[node]).collect())
}

fn split_instructions(words: &[Word]) -> Result<Vec<Instruction>, Error> {
    let mut instructions = Vec::new();
    let mut offset = HEADER_WORDS;
    while offset < words.len() {
        let word = words[offset];
        let (wc, opcode) = ((word >> 16) as u16, (word & 0xffff) as u16);
        if wc == 0 {
            return Err(Error::InvalidWordCount);
        }
        let end = offset + wc as usize;
        if end > words.len() {
            return Err(Error::IncompleteData);
        }
        let op = Op::from_u32(u32::from(opcode)).ok_or(Error::UnknownInstruction(opcode))?;
        instructions.push(Instruction {
            op,
            wc,
            operands: words[offset + 1..end].to_vec(),
            offset,
        });
        offset = end;
    }
    Ok(instructions)
}

/// Decode a SPIR-V module.
pub fn parse_words(words: &[Word], options: &Options) -> Result<ast::Module, Error> {
    if words.first() != Some(&spirv::MAGIC_NUMBER) {
        return Err(Error::InvalidMagicNumber);
    }
    if words.len() < HEADER_WORDS {
        return Err(Error::InvalidHeader);
    }
    let (version, generator, bound) = (words[1], words[2], words[3]);
    log::info!("Generated by {} version {:x}", generator, version);
    let instructions = split_instructions(words)?;
    Parser::new(options, bound).parse(&instructions)
}

/// Decode a SPIR-V module from little-endian bytes.
pub fn parse_u8_slice(data: &[u8], options: &Options) -> Result<ast::Module, Error> {
    if data.len() % 4 != 0 {
        return Err(Error::IncompleteData);
    }
    let words = data
        .chunks(4)
        .map(|chunk| u32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
        .collect::<Vec<_>>();
    parse_words(&words, options)
}

/// Decode a SPIR-V module, reporting failure as a diagnostic. The module is
/// empty when decoding failed.
pub fn parse_with_diagnostics(words: &[Word], options: &Options) -> (ast::Module, diagnostic::List) {
    let mut diagnostics = diagnostic::List::default();
    match parse_words(words, options) {
        Ok(module) => (module, diagnostics),
        Err(error) => {
            let span = match error {
                Error::Instruction { offset, .. } => Span::point(offset as u32 * 4),
                _ => Span::UNDEFINED,
            };
            diagnostics.add_error(error.to_string(), span);
            (ast::Module::new(), diagnostics)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn header(bound: Word) -> Vec<Word> {
        vec![spirv::MAGIC_NUMBER, 0x0001_0000, 0, bound, 0]
    }

    fn inst(op: Op, operands: &[Word]) -> Vec<Word> {
        let mut words = vec![((operands.len() as u32 + 1) << 16) | op as u32];
        words.extend_from_slice(operands);
        words
    }

    fn string(text: &str) -> Vec<Word> {
        let mut bytes = text.as_bytes().to_vec();
        bytes.resize((bytes.len() / 4 + 1) * 4, 0);
        bytes
            .chunks(4)
            .map(|c| u32::from_le_bytes([c[0], c[1], c[2], c[3]]))
            .collect()
    }

    #[test]
    fn header_errors() {
        let options = Options::default();
        assert_eq!(parse_words(&[], &options).unwrap_err(), Error::InvalidMagicNumber);
        assert_eq!(
            parse_words(&[0x0302_2307, 0], &options).unwrap_err(),
            Error::InvalidMagicNumber
        );
        assert_eq!(
            parse_words(&[spirv::MAGIC_NUMBER, 0], &options).unwrap_err(),
            Error::InvalidHeader
        );
        let mut words = header(1);
        words.push(0x0005_0011);
        assert_eq!(parse_words(&words, &options).unwrap_err(), Error::IncompleteData);
    }

    #[test]
    fn strings() {
        let words = string("GLSL.std.450");
        let inst = Instruction {
            op: Op::ExtInstImport,
            wc: words.len() as u16 + 2,
            operands: std::iter::once(1).chain(words).collect(),
            offset: 5,
        };
        assert_eq!(inst.string(1).unwrap(), ("GLSL.std.450".to_string(), 5));
    }

    #[test]
    fn section_order() {
        let mut words = header(10);
        words.extend(inst(Op::TypeVoid, &[1]));
        words.extend(inst(Op::Capability, &[spirv::Capability::Shader as u32]));
        let error = parse_words(&words, &Options::default()).unwrap_err();
        assert_eq!(
            *error.root(),
            Error::UnsupportedInstruction(ModuleState::Type, Op::Capability)
        );
        assert_eq!(
            error.to_string(),
            "unsupported instruction Capability at Type\nat word 7: OpCapability 1"
        );
        match error {
            Error::Instruction { offset, .. } => assert_eq!(offset, 7),
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[test]
    fn call_cycle() {
        let mut words = header(10);
        words.extend(inst(Op::Capability, &[spirv::Capability::Shader as u32]));
        words.extend(inst(Op::TypeVoid, &[1]));
        words.extend(inst(Op::TypeFunction, &[2, 1]));
        for (id, other, label) in [(3, 4, 5), (4, 3, 6)] {
            words.extend(inst(Op::Function, &[1, id, 0, 2]));
            words.extend(inst(Op::Label, &[label]));
            words.extend(inst(Op::FunctionCall, &[1, label + 2, other]));
            words.extend(inst(Op::Return, &[]));
            words.extend(inst(Op::FunctionEnd, &[]));
        }
        let error = parse_words(&words, &Options::default()).unwrap_err();
        assert!(matches!(error, Error::FunctionCallCycle(3 | 4)));
    }
}
