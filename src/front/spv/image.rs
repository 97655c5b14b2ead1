//! Texture sampling, loads, stores and queries.

use super::{
    convert,
    function::{Expr, FunctionEmitter, Value, ValueKind},
    types::{ImageType, Scalar, Type},
    usage::{self, HandleTypeName},
    Error, Instruction, ModuleState,
};
use crate::{ast::StatementKind, resolve::BuiltinFunction as Bf};
use spirv::{ImageOperands, Op, Word};

pub(super) const fn is_image_instruction(op: Op) -> bool {
    matches!(
        op,
        Op::SampledImage
            | Op::Image
            | Op::ImageSampleImplicitLod
            | Op::ImageSampleExplicitLod
            | Op::ImageSampleDrefImplicitLod
            | Op::ImageSampleDrefExplicitLod
            | Op::ImageFetch
            | Op::ImageRead
            | Op::ImageWrite
            | Op::ImageGather
            | Op::ImageDrefGather
            | Op::ImageQuerySize
            | Op::ImageQuerySizeLod
            | Op::ImageQueryLevels
            | Op::ImageQuerySamples
    )
}

/// The optional operands trailing an image instruction.
#[derive(Debug, Default, PartialEq)]
struct Operands {
    bias: Option<Word>,
    lod: Option<Word>,
    grad: Option<(Word, Word)>,
    offset: Option<Word>,
    sample: Option<Word>,
}

fn parse_operands(words: &[Word]) -> Result<Operands, Error> {
    let mut operands = Operands::default();
    let Some((&mask, mut rest)) = words.split_first() else {
        return Ok(operands);
    };
    let flags = ImageOperands::from_bits(mask).ok_or(Error::UnsupportedImageOperands(mask))?;
    let supported = ImageOperands::BIAS
        | ImageOperands::LOD
        | ImageOperands::GRAD
        | ImageOperands::CONST_OFFSET
        | ImageOperands::OFFSET
        | ImageOperands::SAMPLE;
    if !supported.contains(flags) {
        return Err(Error::UnsupportedImageOperands(mask));
    }
    let mut next = || -> Result<Word, Error> {
        let (&word, tail) = rest
            .split_first()
            .ok_or(Error::UnsupportedImageOperands(mask))?;
        rest = tail;
        Ok(word)
    };
    // Operands follow in the order of their mask bits.
    if flags.contains(ImageOperands::BIAS) {
        operands.bias = Some(next()?);
    }
    if flags.contains(ImageOperands::LOD) {
        operands.lod = Some(next()?);
    }
    if flags.contains(ImageOperands::GRAD) {
        operands.grad = Some((next()?, next()?));
    }
    if flags.contains(ImageOperands::CONST_OFFSET) {
        operands.offset = Some(next()?);
    }
    if flags.contains(ImageOperands::OFFSET) {
        operands.offset = Some(next()?);
    }
    if flags.contains(ImageOperands::SAMPLE) {
        operands.sample = Some(next()?);
    }
    Ok(operands)
}

/// What the emitter knows about the texture an instruction reads.
struct Texture {
    expr: Expr,
    image: ImageType,
    name: HandleTypeName,
}

impl Texture {
    fn is_depth(&self) -> bool {
        match self.name {
            HandleTypeName::Plain(name) => name.starts_with("texture_depth"),
            _ => false,
        }
    }
}

impl FunctionEmitter<'_> {
    pub(super) fn image_instruction(&mut self, inst: &Instruction) -> Result<(), Error> {
        let ops = &inst.operands;
        match inst.op {
            Op::SampledImage => {
                inst.expect(5)?;
                self.values.insert(
                    ops[1],
                    Value {
                        ty: ops[0],
                        kind: ValueKind::SampledImage {
                            image: ops[2],
                            sampler: ops[3],
                        },
                    },
                );
            }
            Op::Image => {
                inst.expect(4)?;
                let image = match self.values.get(&ops[2]) {
                    Some(&Value {
                        kind: ValueKind::SampledImage { image, .. },
                        ..
                    }) => image,
                    _ => return Err(Error::UnhandledExpression(ops[2])),
                };
                let mut value = self
                    .values
                    .get(&image)
                    .cloned()
                    .ok_or(Error::UnhandledExpression(image))?;
                value.ty = ops[0];
                self.values.insert(ops[1], value);
                if let Some(&origin) = self.handle_origins.get(&image) {
                    self.handle_origins.insert(ops[1], origin);
                }
            }
            Op::ImageSampleImplicitLod | Op::ImageSampleExplicitLod => self.sample(inst, false)?,
            Op::ImageSampleDrefImplicitLod | Op::ImageSampleDrefExplicitLod => {
                self.sample(inst, true)?
            }
            Op::ImageGather | Op::ImageDrefGather => self.gather(inst)?,
            Op::ImageFetch | Op::ImageRead => self.load(inst)?,
            Op::ImageWrite => self.store(inst)?,
            Op::ImageQuerySize | Op::ImageQuerySizeLod => self.query_size(inst)?,
            Op::ImageQueryLevels | Op::ImageQuerySamples => {
                inst.expect(4)?;
                let (ty, id) = (ops[0], ops[1]);
                let texture = self.texture(ops[2])?;
                let function = if inst.op == Op::ImageQueryLevels {
                    Bf::TextureNumLevels
                } else {
                    Bf::TextureNumSamples
                };
                let expr = self.builtin(function, vec![texture.expr]);
                let u32_ty = self.parser.shaped_type(Scalar::U32, 1);
                let expr = self.reconcile(expr, u32_ty, ty)?;
                self.define(id, ty, expr, false)?;
            }
            op => return Err(Error::UnsupportedInstruction(ModuleState::Function, op)),
        }
        Ok(())
    }

    /// The texture loaded as value `id`, and the WGSL type its module
    /// variable was declared with.
    fn texture(&mut self, id: Word) -> Result<Texture, Error> {
        let ty = self.value_type(id).ok_or(Error::InvalidId(id))?;
        let image = match *self.parser.lookup_type(ty)? {
            Type::Image(ref image) => image.clone(),
            _ => return Err(Error::InvalidAccessType(ty)),
        };
        let declared = self
            .handle_origins
            .get(&id)
            .and_then(|global| self.parser.handle_names.get(global))
            .copied();
        let name = match declared {
            Some(name) => name,
            None => usage::image_type_name(&image, None)?,
        };
        let (expr, _) = self.reference(id)?;
        Ok(Texture { expr, image, name })
    }

    fn sampled_image(&mut self, id: Word) -> Result<(Texture, Expr), Error> {
        let (image, sampler) = match self.values.get(&id) {
            Some(&Value {
                kind: ValueKind::SampledImage { image, sampler },
                ..
            }) => (image, sampler),
            _ => return Err(Error::UnhandledExpression(id)),
        };
        let texture = self.texture(image)?;
        let (sampler, _) = self.reference(sampler)?;
        Ok((texture, sampler))
    }

    /// Split a SPIR-V coordinate into the WGSL coordinates and array index.
    /// Sampling takes a float array index, which WGSL wants as an integer.
    fn coordinates(
        &mut self,
        coordinate: Word,
        image: &ImageType,
    ) -> Result<(Expr, Option<Expr>), Error> {
        let coordinate_ty = self
            .value_type(coordinate)
            .ok_or(Error::InvalidId(coordinate))?;
        let (scalar, size) = self
            .parser
            .scalar_info(coordinate_ty)
            .ok_or(Error::InvalidAccessType(coordinate_ty))?;
        let count = usage::coordinate_count(image);
        let needed = count + u32::from(image.arrayed);
        if size < needed {
            return Err(Error::InvalidAccessType(coordinate_ty));
        }
        let (value, _) = self.value(coordinate)?;
        let coordinates = if size == count {
            value
        } else {
            self.member(value, &"xyzw"[..count as usize])
        };
        if !image.arrayed {
            return Ok((coordinates, None));
        }
        let (value, _) = self.value(coordinate)?;
        let layer = count as usize;
        let mut index = self.member(value, &"xyzw"[layer..=layer]);
        if scalar.is_float() {
            let rounded = self.builtin(Bf::Round, vec![index]);
            let i32_ty = self.parser.shaped_type(Scalar::I32, 1);
            index = self.construct(i32_ty, vec![rounded])?;
        }
        Ok((coordinates, Some(index)))
    }

    fn offset(&mut self, offset: Option<Word>) -> Result<Option<Expr>, Error> {
        match offset {
            Some(offset) => {
                let value = self.value(offset)?;
                Ok(Some(self.force_signedness(value, true)?.0))
            }
            None => Ok(None),
        }
    }

    /// Depth textures sample to a scalar; SPIR-V wants a four-component
    /// vector with the depth in the first component.
    fn widen(&mut self, expr: Expr, ty: Word) -> Result<Expr, Error> {
        match self.parser.scalar_info(ty) {
            Some((scalar, 4)) => {
                let mut arguments = vec![expr];
                for _ in 0..3 {
                    arguments.push(self.literal(scalar.zero()));
                }
                self.construct(ty, arguments)
            }
            _ => Ok(expr),
        }
    }

    fn sample(&mut self, inst: &Instruction, compare: bool) -> Result<(), Error> {
        let fixed = if compare { 5 } else { 4 };
        inst.expect_at_least(fixed as u16 + 1)?;
        let ops = &inst.operands;
        let (ty, id) = (ops[0], ops[1]);
        let operands = parse_operands(&ops[fixed..])?;
        let (texture, sampler) = self.sampled_image(ops[2])?;
        let (coordinates, array_index) = self.coordinates(ops[3], &texture.image)?;
        let is_depth = texture.is_depth();

        let mut arguments = vec![texture.expr, sampler, coordinates];
        arguments.extend(array_index);
        let function = if compare {
            let (dref, _) = self.value(ops[4])?;
            arguments.push(dref);
            match operands.lod {
                Some(lod) => {
                    if !self.parser.constant_is_zero(lod) {
                        return Err(Error::UnsupportedImageOperands(lod));
                    }
                    Bf::TextureSampleCompareLevel
                }
                None if inst.op == Op::ImageSampleDrefExplicitLod => Bf::TextureSampleCompareLevel,
                None => Bf::TextureSampleCompare,
            }
        } else if let Some(bias) = operands.bias {
            arguments.push(self.value(bias)?.0);
            Bf::TextureSampleBias
        } else if let Some(lod) = operands.lod {
            let (mut level, level_ty) = self.value(lod)?;
            if is_depth && !matches!(self.parser.scalar_info(level_ty), Some((Scalar::I32, 1))) {
                let i32_ty = self.parser.shaped_type(Scalar::I32, 1);
                level = self.construct(i32_ty, vec![level])?;
            }
            arguments.push(level);
            Bf::TextureSampleLevel
        } else if let Some((dx, dy)) = operands.grad {
            arguments.push(self.value(dx)?.0);
            arguments.push(self.value(dy)?.0);
            Bf::TextureSampleGrad
        } else {
            Bf::TextureSample
        };
        arguments.extend(self.offset(operands.offset)?);

        let mut expr = self.builtin(function, arguments);
        if is_depth && !compare {
            expr = self.widen(expr, ty)?;
        }
        self.define(id, ty, expr, false)
    }

    fn gather(&mut self, inst: &Instruction) -> Result<(), Error> {
        inst.expect_at_least(6)?;
        let ops = &inst.operands;
        let (ty, id) = (ops[0], ops[1]);
        let operands = parse_operands(&ops[5..])?;
        let (texture, sampler) = self.sampled_image(ops[2])?;
        let is_depth = texture.is_depth();
        let (coordinates, array_index) = self.coordinates(ops[3], &texture.image)?;

        let mut arguments = Vec::with_capacity(6);
        let function = if inst.op == Op::ImageDrefGather {
            arguments.extend([texture.expr, sampler, coordinates]);
            arguments.extend(array_index);
            arguments.push(self.value(ops[4])?.0);
            Bf::TextureGatherCompare
        } else {
            if !is_depth {
                let component = self.value(ops[4])?;
                arguments.push(self.force_signedness(component, true)?.0);
            }
            arguments.extend([texture.expr, sampler, coordinates]);
            arguments.extend(array_index);
            Bf::TextureGather
        };
        arguments.extend(self.offset(operands.offset)?);
        let expr = self.builtin(function, arguments);
        self.define(id, ty, expr, false)
    }

    /// `OpImageFetch` and `OpImageRead`: `textureLoad`.
    fn load(&mut self, inst: &Instruction) -> Result<(), Error> {
        inst.expect_at_least(5)?;
        let ops = &inst.operands;
        let (ty, id) = (ops[0], ops[1]);
        let operands = parse_operands(&ops[4..])?;
        let texture = self.texture(ops[2])?;
        let is_depth = texture.is_depth();
        let storage = matches!(texture.name, HandleTypeName::Storage { .. });
        let (coordinates, array_index) = self.coordinates(ops[3], &texture.image)?;

        let mut arguments = vec![texture.expr, coordinates];
        arguments.extend(array_index);
        if texture.image.multisampled {
            let sample = operands.sample.ok_or(Error::UnsupportedImageOperands(0))?;
            arguments.push(self.value(sample)?.0);
        } else if !storage {
            let level = match operands.lod {
                Some(lod) => self.value(lod)?.0,
                None => self.literal(crate::ast::Literal::I32(0)),
            };
            arguments.push(level);
        }
        let mut expr = self.builtin(Bf::TextureLoad, arguments);
        if is_depth {
            expr = self.widen(expr, ty)?;
        } else if let Some((scalar, _)) = self.parser.scalar_info(ty) {
            // Texels come back with the signedness of the texture's type.
            let component = self
                .parser
                .scalar_info(texture.image.sampled_type)
                .map_or(scalar, |(component, _)| component);
            let natural = self.parser.shaped_type(component, 4);
            expr = self.reconcile(expr, natural, ty)?;
        }
        self.define(id, ty, expr, false)
    }

    /// `OpImageWrite`: `textureStore`, padding the texel to four components.
    fn store(&mut self, inst: &Instruction) -> Result<(), Error> {
        inst.expect_at_least(4)?;
        let ops = &inst.operands;
        let texture = self.texture(ops[0])?;
        let (coordinates, array_index) = self.coordinates(ops[1], &texture.image)?;
        let (mut texel, texel_ty) = self.value(ops[2])?;
        if let Some((scalar, size)) = self.parser.scalar_info(texel_ty) {
            if size < 4 {
                let padded = self.parser.shaped_type(scalar, 4);
                let mut arguments = vec![texel];
                for _ in size..4 {
                    arguments.push(self.literal(scalar.zero()));
                }
                texel = self.construct(padded, arguments)?;
            }
        }
        let mut arguments = vec![texture.expr, coordinates];
        arguments.extend(array_index);
        arguments.push(texel);
        let call = self.builtin(Bf::TextureStore, arguments);
        self.push(StatementKind::Call(call));
        Ok(())
    }

    /// `textureDimensions`, plus `textureNumLayers` for arrayed textures.
    fn query_size(&mut self, inst: &Instruction) -> Result<(), Error> {
        inst.expect_at_least(4)?;
        let ops = &inst.operands;
        let (ty, id) = (ops[0], ops[1]);
        let texture = self.texture(ops[2])?;
        let mut arguments = vec![texture.expr];
        if let Some(&lod) = ops.get(3) {
            arguments.push(self.value(lod)?.0);
        }
        let mut expr = self.builtin(Bf::TextureDimensions, arguments);
        let dimensions = match texture.image.dim {
            spirv::Dim::DimCube => 2,
            dim => convert::dim_coordinates(dim),
        };
        let mut natural = self.parser.shaped_type(Scalar::U32, dimensions);
        if texture.image.arrayed {
            let (layers_texture, _) = self.reference(ops[2])?;
            let layers = self.builtin(Bf::TextureNumLayers, vec![layers_texture]);
            natural = self.parser.shaped_type(Scalar::U32, dimensions + 1);
            expr = self.construct(natural, vec![expr, layers])?;
        }
        let expr = self.reconcile(expr, natural, ty)?;
        self.define(id, ty, expr, false)
    }
}

#[cfg(test)]
mod tests {
    use super::{parse_operands, Operands};

    #[test]
    fn operands_follow_mask_order() {
        // Lod | ConstOffset
        let operands = parse_operands(&[0x2 | 0x8, 10, 11]).unwrap();
        assert_eq!(
            operands,
            Operands {
                lod: Some(10),
                offset: Some(11),
                ..Operands::default()
            }
        );
        // Grad takes two ids.
        let operands = parse_operands(&[0x4, 20, 21]).unwrap();
        assert_eq!(operands.grad, Some((20, 21)));
        assert_eq!(parse_operands(&[]).unwrap(), Operands::default());
    }

    #[test]
    fn rejected_operands() {
        // MinLod has no WGSL counterpart.
        assert!(parse_operands(&[0x80, 5]).is_err());
        // Missing operand words.
        assert!(parse_operands(&[0x1]).is_err());
    }
}
