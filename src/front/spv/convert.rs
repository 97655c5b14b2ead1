use super::{error::Error, types::Scalar};

pub(super) fn map_storage_class(word: spirv::Word) -> Result<spirv::StorageClass, Error> {
    use spirv::StorageClass as Sc;
    match Sc::from_u32(word) {
        Some(
            class @ (Sc::UniformConstant
            | Sc::Function
            | Sc::Input
            | Sc::Output
            | Sc::Private
            | Sc::StorageBuffer
            | Sc::Uniform
            | Sc::Workgroup
            | Sc::PushConstant),
        ) => Ok(class),
        _ => Err(Error::UnsupportedStorageClass(word)),
    }
}

/// The spelling of `class` in a `var<...>` or `ptr<...>` template list.
pub(super) const fn address_space(class: spirv::StorageClass) -> Option<&'static str> {
    use spirv::StorageClass as Sc;
    Some(match class {
        Sc::Function => "function",
        Sc::Private | Sc::Input | Sc::Output => "private",
        Sc::StorageBuffer => "storage",
        Sc::Uniform => "uniform",
        Sc::Workgroup => "workgroup",
        Sc::PushConstant => "push_constant",
        _ => return None,
    })
}

pub(super) fn map_vector_size(word: spirv::Word) -> Result<u32, Error> {
    match word {
        2..=4 => Ok(word),
        _ => Err(Error::InvalidVectorSize(word)),
    }
}

pub(super) fn map_image_dim(word: spirv::Word) -> Result<spirv::Dim, Error> {
    use spirv::Dim as D;
    match D::from_u32(word) {
        Some(dim @ (D::Dim1D | D::Dim2D | D::Dim3D | D::DimCube)) => Ok(dim),
        _ => Err(Error::UnsupportedImageDim(word)),
    }
}

/// The number of coordinates addressing a texel, not counting the layer.
pub(super) const fn dim_coordinates(dim: spirv::Dim) -> u32 {
    match dim {
        spirv::Dim::Dim1D => 1,
        spirv::Dim::Dim2D => 2,
        _ => 3,
    }
}

pub(super) fn map_image_format(word: spirv::Word) -> Result<Option<&'static str>, Error> {
    use spirv::ImageFormat as If;
    Ok(Some(match If::from_u32(word) {
        Some(If::Unknown) => return Ok(None),
        Some(If::Rgba8) => "rgba8unorm",
        Some(If::Rgba8Snorm) => "rgba8snorm",
        Some(If::Rgba8ui) => "rgba8uint",
        Some(If::Rgba8i) => "rgba8sint",
        Some(If::Rgba16ui) => "rgba16uint",
        Some(If::Rgba16i) => "rgba16sint",
        Some(If::Rgba16f) => "rgba16float",
        Some(If::R32ui) => "r32uint",
        Some(If::R32i) => "r32sint",
        Some(If::R32f) => "r32float",
        Some(If::Rg32ui) => "rg32uint",
        Some(If::Rg32i) => "rg32sint",
        Some(If::Rg32f) => "rg32float",
        Some(If::Rgba32ui) => "rgba32uint",
        Some(If::Rgba32i) => "rgba32sint",
        Some(If::Rgba32f) => "rgba32float",
        _ => return Err(Error::UnsupportedImageFormat(word)),
    }))
}

/// A pipeline builtin: its WGSL name and the type WGSL requires for it.
#[derive(Clone, Copy, Debug, PartialEq)]
pub(super) struct BuiltinValue {
    pub name: &'static str,
    pub scalar: Scalar,
    /// Number of components, 1 for a scalar.
    pub size: u32,
}

pub(super) fn map_builtin(word: spirv::Word) -> Result<Option<BuiltinValue>, Error> {
    use spirv::BuiltIn as Bi;
    let (name, scalar, size) = match Bi::from_u32(word) {
        Some(Bi::Position | Bi::FragCoord) => ("position", Scalar::F32, 4),
        Some(Bi::VertexIndex) => ("vertex_index", Scalar::U32, 1),
        Some(Bi::InstanceIndex) => ("instance_index", Scalar::U32, 1),
        Some(Bi::FrontFacing) => ("front_facing", Scalar::Bool, 1),
        Some(Bi::FragDepth) => ("frag_depth", Scalar::F32, 1),
        Some(Bi::SampleId) => ("sample_index", Scalar::U32, 1),
        Some(Bi::LocalInvocationId) => ("local_invocation_id", Scalar::U32, 3),
        Some(Bi::LocalInvocationIndex) => ("local_invocation_index", Scalar::U32, 1),
        Some(Bi::GlobalInvocationId) => ("global_invocation_id", Scalar::U32, 3),
        Some(Bi::WorkgroupId) => ("workgroup_id", Scalar::U32, 3),
        Some(Bi::NumWorkgroups) => ("num_workgroups", Scalar::U32, 3),
        // No WGSL counterpart; writes to them are dropped.
        Some(Bi::PointSize | Bi::ClipDistance | Bi::CullDistance) => return Ok(None),
        _ => return Err(Error::UnsupportedBuiltIn(word)),
    };
    Ok(Some(BuiltinValue { name, scalar, size }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtins() {
        let position = map_builtin(spirv::BuiltIn::FragCoord as u32).unwrap().unwrap();
        assert_eq!(position.name, "position");
        assert_eq!(position.size, 4);
        assert_eq!(map_builtin(spirv::BuiltIn::PointSize as u32), Ok(None));
        assert_eq!(
            map_builtin(spirv::BuiltIn::SubgroupSize as u32),
            Err(Error::UnsupportedBuiltIn(spirv::BuiltIn::SubgroupSize as u32))
        );
    }

    #[test]
    fn formats() {
        assert_eq!(
            map_image_format(spirv::ImageFormat::Rgba8 as u32),
            Ok(Some("rgba8unorm"))
        );
        assert_eq!(map_image_format(spirv::ImageFormat::Unknown as u32), Ok(None));
        assert!(map_image_format(spirv::ImageFormat::R11fG11fB10f as u32).is_err());
    }
}
