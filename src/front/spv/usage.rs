/*!
How sampler and image variables are used.

SPIR-V image types leave out facts WGSL texture types must state: whether a
texture is sampled with a comparison sampler, whether a storage image is read,
written or both. These are recovered by walking every function body once,
tracing image operations back to the module variable they load from, and
accumulating a [`Usage`] per variable.
*/

use super::{convert, types::ImageType, Error, Instruction, Parser};
use crate::FastHashMap;
use spirv::{Op, Word};

bitflags::bitflags! {
    /// What a handle variable has been seen doing. Merging is a bitwise union,
    /// so it is idempotent and order does not matter.
    #[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
    pub struct Usage: u16 {
        const SAMPLER = 1 << 0;
        const COMPARISON_SAMPLER = 1 << 1;
        const TEXTURE = 1 << 2;
        const SAMPLED_TEXTURE = 1 << 3;
        const MULTISAMPLED_TEXTURE = 1 << 4;
        const DEPTH_TEXTURE = 1 << 5;
        const STORAGE_READ = 1 << 6;
        const STORAGE_WRITE = 1 << 7;
    }
}

impl Usage {
    pub fn add_sampler(&mut self) {
        self.insert(Self::SAMPLER);
    }

    pub fn add_comparison_sampler(&mut self) {
        self.insert(Self::SAMPLER | Self::COMPARISON_SAMPLER);
    }

    pub fn add_texture(&mut self) {
        self.insert(Self::TEXTURE);
    }

    pub fn add_sampled_texture(&mut self) {
        self.insert(Self::TEXTURE | Self::SAMPLED_TEXTURE);
    }

    pub fn add_multisampled_texture(&mut self) {
        self.insert(Self::TEXTURE | Self::SAMPLED_TEXTURE | Self::MULTISAMPLED_TEXTURE);
    }

    pub fn add_depth_texture(&mut self) {
        self.insert(Self::TEXTURE | Self::SAMPLED_TEXTURE | Self::DEPTH_TEXTURE);
    }

    pub fn add_storage_read_texture(&mut self) {
        self.insert(Self::TEXTURE | Self::STORAGE_READ);
    }

    pub fn add_storage_write_texture(&mut self) {
        self.insert(Self::TEXTURE | Self::STORAGE_WRITE);
    }

    pub fn add(&mut self, other: Self) {
        *self |= other;
    }

    pub const fn is_sampler(self) -> bool {
        self.contains(Self::SAMPLER)
    }

    pub const fn is_texture(self) -> bool {
        self.contains(Self::TEXTURE)
    }

    pub const fn is_storage(self) -> bool {
        self.intersects(Self::STORAGE_READ.union(Self::STORAGE_WRITE))
    }

    /// No contradictory facts have been recorded.
    pub const fn is_valid(self) -> bool {
        if self.is_sampler() && self.is_texture() {
            return false;
        }
        if self.is_storage()
            && self.intersects(
                Self::SAMPLED_TEXTURE
                    .union(Self::MULTISAMPLED_TEXTURE)
                    .union(Self::DEPTH_TEXTURE),
            )
        {
            return false;
        }
        true
    }

    /// Enough is known to pick a WGSL type.
    pub const fn is_complete(self) -> bool {
        self.is_valid()
            && (self.is_sampler()
                || (self.is_texture()
                    && (self.contains(Self::SAMPLED_TEXTURE) || self.is_storage())))
    }
}

impl std::fmt::Display for Usage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Usage(")?;
        if self.is_sampler() {
            write!(f, "Sampler(")?;
            if self.contains(Self::COMPARISON_SAMPLER) {
                write!(f, " comparison")?;
            }
            write!(f, " )")?;
        }
        if self.is_texture() {
            write!(f, "Texture(")?;
            for (flag, text) in [
                (Self::SAMPLED_TEXTURE, " is_sampled"),
                (Self::MULTISAMPLED_TEXTURE, " ms"),
                (Self::DEPTH_TEXTURE, " depth"),
                (Self::STORAGE_READ, " read"),
                (Self::STORAGE_WRITE, " write"),
            ] {
                if self.contains(flag) {
                    write!(f, "{text}")?;
                }
            }
            write!(f, " )")?;
        }
        write!(f, ")")
    }
}

/// The WGSL type of a handle variable, before its template arguments are
/// spelled out.
#[derive(Clone, Copy, Debug, PartialEq)]
pub(super) enum HandleTypeName {
    /// `sampler`, `texture_depth_2d`, ...
    Plain(&'static str),
    /// `texture_2d<T>` and friends, templated on the texel component type.
    Sampled(&'static str),
    Storage {
        name: &'static str,
        format: &'static str,
        access: &'static str,
    },
}

const fn sampled_name(dim: spirv::Dim, arrayed: bool) -> &'static str {
    match (dim, arrayed) {
        (spirv::Dim::Dim1D, _) => "texture_1d",
        (spirv::Dim::Dim3D, _) => "texture_3d",
        (spirv::Dim::DimCube, false) => "texture_cube",
        (spirv::Dim::DimCube, true) => "texture_cube_array",
        (_, false) => "texture_2d",
        (_, true) => "texture_2d_array",
    }
}

const fn depth_name(dim: spirv::Dim, arrayed: bool) -> &'static str {
    match (dim, arrayed) {
        (spirv::Dim::DimCube, false) => "texture_depth_cube",
        (spirv::Dim::DimCube, true) => "texture_depth_cube_array",
        (_, false) => "texture_depth_2d",
        (_, true) => "texture_depth_2d_array",
    }
}

const fn storage_name(dim: spirv::Dim, arrayed: bool) -> &'static str {
    match (dim, arrayed) {
        (spirv::Dim::Dim1D, _) => "texture_storage_1d",
        (spirv::Dim::Dim3D, _) => "texture_storage_3d",
        (_, false) => "texture_storage_2d",
        (_, true) => "texture_storage_2d_array",
    }
}

/// The usage an image type implies on its own.
pub(super) fn declared_usage(image: &ImageType) -> Usage {
    let mut usage = Usage::empty();
    match image.sampled {
        1 if image.multisampled => usage.add_multisampled_texture(),
        1 if image.depth == 1 => usage.add_depth_texture(),
        1 => usage.add_sampled_texture(),
        _ => usage.add_texture(),
    }
    usage
}

/// Pick the WGSL type for an image, from its declaration and, for a module
/// variable, everything the functions do with it.
pub(super) fn image_type_name(
    image: &ImageType,
    usage: Option<(Word, Usage)>,
) -> Result<HandleTypeName, Error> {
    let (id, usage) = match usage {
        Some((id, usage)) => (id, usage | declared_usage(image)),
        None => (image.sampled_type, declared_usage(image)),
    };
    if !usage.is_valid() {
        return Err(Error::InvalidUsage {
            id,
            usage: usage.to_string(),
        });
    }
    let dim = image.dim;
    if usage.is_storage() || image.sampled == 2 {
        let format = image.format.ok_or(Error::UnsupportedImageFormat(0))?;
        let access = match (
            usage.contains(Usage::STORAGE_READ),
            usage.contains(Usage::STORAGE_WRITE),
        ) {
            (true, true) => "read_write",
            (true, false) => "read",
            (false, true) => "write",
            (false, false) => {
                return Err(Error::IncompleteUsage {
                    id,
                    usage: usage.to_string(),
                })
            }
        };
        return Ok(HandleTypeName::Storage {
            name: storage_name(dim, image.arrayed),
            format,
            access,
        });
    }
    if !usage.is_complete() {
        return Err(Error::IncompleteUsage {
            id,
            usage: usage.to_string(),
        });
    }
    Ok(if usage.contains(Usage::MULTISAMPLED_TEXTURE) {
        if usage.contains(Usage::DEPTH_TEXTURE) {
            HandleTypeName::Plain("texture_depth_multisampled_2d")
        } else {
            HandleTypeName::Sampled("texture_multisampled_2d")
        }
    } else if usage.contains(Usage::DEPTH_TEXTURE) {
        HandleTypeName::Plain(depth_name(dim, image.arrayed))
    } else {
        HandleTypeName::Sampled(sampled_name(dim, image.arrayed))
    })
}

/// The dimension count WGSL texture builtins address an image with.
pub(super) const fn coordinate_count(image: &ImageType) -> u32 {
    convert::dim_coordinates(image.dim)
}

/// Where a function-local id's handle came from.
#[derive(Clone, Copy)]
enum Origin {
    Variable(Word),
    Sampled { image: Word, sampler: Word },
}

impl Parser {
    /// Walk every function body and record how each handle variable is used.
    pub(super) fn collect_usage<'a>(
        &mut self,
        bodies: impl Iterator<Item = &'a Instruction>,
    ) -> Result<(), Error> {
        let mut origins = FastHashMap::<Word, Origin>::default();
        for inst in bodies {
            let operands = &inst.operands;
            match inst.op {
                Op::Load | Op::CopyObject if operands.len() >= 3 => {
                    let source = operands[2];
                    let origin = if self.globals.contains_key(&source) {
                        Some(Origin::Variable(source))
                    } else {
                        origins.get(&source).copied()
                    };
                    if let Some(origin) = origin {
                        origins.insert(operands[1], origin);
                    }
                }
                Op::SampledImage if operands.len() >= 4 => {
                    if let (Some(Origin::Variable(image)), Some(Origin::Variable(sampler))) =
                        (origins.get(&operands[2]), origins.get(&operands[3]))
                    {
                        let (image, sampler) = (*image, *sampler);
                        origins.insert(operands[1], Origin::Sampled { image, sampler });
                        self.usage.entry(sampler).or_default().add_sampler();
                        self.usage.entry(image).or_default().add_texture();
                    }
                }
                Op::ImageSampleImplicitLod
                | Op::ImageSampleExplicitLod
                | Op::ImageGather
                | Op::ImageSampleDrefImplicitLod
                | Op::ImageSampleDrefExplicitLod
                | Op::ImageDrefGather
                    if operands.len() >= 3 =>
                {
                    let dref = matches!(
                        inst.op,
                        Op::ImageSampleDrefImplicitLod
                            | Op::ImageSampleDrefExplicitLod
                            | Op::ImageDrefGather
                    );
                    if let Some(&Origin::Sampled { image, sampler }) = origins.get(&operands[2]) {
                        let (image_usage, sampler_usage) = if dref {
                            let mut image_usage = Usage::empty();
                            image_usage.add_depth_texture();
                            let mut sampler_usage = Usage::empty();
                            sampler_usage.add_comparison_sampler();
                            (image_usage, sampler_usage)
                        } else {
                            let mut image_usage = Usage::empty();
                            image_usage.add_sampled_texture();
                            let mut sampler_usage = Usage::empty();
                            sampler_usage.add_sampler();
                            (image_usage, sampler_usage)
                        };
                        self.usage.entry(image).or_default().add(image_usage);
                        self.usage.entry(sampler).or_default().add(sampler_usage);
                    }
                }
                Op::ImageFetch | Op::ImageRead | Op::ImageWrite => {
                    let image_operand = if inst.op == Op::ImageWrite { 0 } else { 2 };
                    if let Some(&Origin::Variable(image)) =
                        operands.get(image_operand).and_then(|id| origins.get(id))
                    {
                        let usage = self.usage.entry(image).or_default();
                        match inst.op {
                            Op::ImageFetch => usage.add_sampled_texture(),
                            Op::ImageRead => usage.add_storage_read_texture(),
                            _ => usage.add_storage_write_texture(),
                        }
                    }
                }
                Op::ImageQuerySize
                | Op::ImageQuerySizeLod
                | Op::ImageQueryLevels
                | Op::ImageQuerySamples
                    if operands.len() >= 3 =>
                {
                    if let Some(&Origin::Variable(image)) = origins.get(&operands[2]) {
                        self.usage.entry(image).or_default().add_texture();
                    }
                }
                _ => {}
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::Usage;

    fn all_single() -> Vec<Usage> {
        let adders: [fn(&mut Usage); 8] = [
            Usage::add_sampler,
            Usage::add_comparison_sampler,
            Usage::add_texture,
            Usage::add_sampled_texture,
            Usage::add_multisampled_texture,
            Usage::add_depth_texture,
            Usage::add_storage_read_texture,
            Usage::add_storage_write_texture,
        ];
        adders
            .iter()
            .map(|add| {
                let mut usage = Usage::empty();
                add(&mut usage);
                usage
            })
            .collect()
    }

    #[test]
    fn merge_is_idempotent_and_commutative() {
        let singles = all_single();
        for &a in &singles {
            let mut twice = a;
            twice.add(a);
            assert_eq!(twice, a);
            for &b in &singles {
                let mut ab = a;
                ab.add(b);
                let mut ba = b;
                ba.add(a);
                assert_eq!(ab, ba);
            }
        }
    }

    #[test]
    fn completeness() {
        let mut sampler = Usage::empty();
        sampler.add_sampler();
        assert!(sampler.is_complete());

        let mut texture = Usage::empty();
        texture.add_texture();
        assert!(texture.is_valid());
        assert!(!texture.is_complete());
        texture.add_storage_write_texture();
        assert!(texture.is_complete());

        let mut both = sampler;
        both.add_texture();
        assert!(!both.is_valid());
        assert!(!both.is_complete());

        let mut sampled_storage = Usage::empty();
        sampled_storage.add_sampled_texture();
        sampled_storage.add_storage_read_texture();
        assert!(!sampled_storage.is_valid());
    }

    #[test]
    fn display() {
        let mut usage = Usage::empty();
        usage.add_comparison_sampler();
        assert_eq!(usage.to_string(), "Usage(Sampler( comparison ))");
        let mut usage = Usage::empty();
        usage.add_depth_texture();
        assert_eq!(usage.to_string(), "Usage(Texture( is_sampled depth ))");
    }
}
