/*!
Backend for [WGSL][wgsl] (WebGPU Shading Language).

Writes an [`ast::Module`](crate::ast::Module) back out as source text.
Output that came from the WGSL front end parses again into a module with
the same declarations and expression shapes; spacing, comments and redundant
parentheses are not preserved.

[wgsl]: https://gpuweb.github.io/gpuweb/wgsl.html
*/

mod writer;

use thiserror::Error;

pub use writer::Writer;

#[derive(Error, Debug)]
pub enum Error {
    #[error(transparent)]
    FmtError(#[from] std::fmt::Error),
}

pub fn write_string(module: &crate::ast::Module) -> Result<String, Error> {
    let mut w = Writer::new(String::new());
    w.write(module)?;
    let output = w.finish();
    Ok(output)
}
