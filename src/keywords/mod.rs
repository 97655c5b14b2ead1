/*!
Lists of reserved keywords for the languages this crate reads and writes.
*/

pub mod wgsl;
