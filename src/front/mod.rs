//! Front ends that read shader source into an [`ast::Module`](crate::ast::Module).

pub mod spv;
pub mod wgsl;
