//! Functions which export shader modules into text formats.

pub mod wgsl;

const INDENT: &str = "    ";

/// Indentation depth.
#[derive(Clone, Copy)]
struct Level(usize);

impl Level {
    const fn next(&self) -> Self {
        Level(self.0 + 1)
    }
}

impl std::fmt::Display for Level {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> Result<(), std::fmt::Error> {
        (0..self.0).try_for_each(|_| formatter.write_str(INDENT))
    }
}
