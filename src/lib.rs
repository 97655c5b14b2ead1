/*!
Shader front end and middle end for WGSL and SPIR-V.

`strata` reads shader programs in two forms and brings them to one place:

- [`front::wgsl`] tokenizes and parses WGSL text into an [`ast::Module`],
  recovering from syntax errors so that a single pass reports as many
  independent problems as possible.
- [`front::spv`] decodes a SPIR-V binary into the same [`ast::Module`],
  reconstructing structured control flow and reconciling SPIR-V's signed and
  unsigned integer types with explicit bitcasts.

A module from either front end can then be handed to [`resolve`], which orders
declarations, infers types, selects builtin overloads, computes side effects
and applies `diagnostic(...)` severity control. [`back::wgsl`] writes any
module back out as WGSL text.

Problems are reported through [`diagnostic::List`], a list of
[`diagnostic::Diagnostic`] values carrying a [`Span`] into the source text.
[`diagnostic::Formatter`] renders them as `file:line:col severity: message`
lines with a caret marker underneath.

```
let source = "fn main() { let x = 1 + 2 * 3; }";
let module = strata::front::wgsl::parse_str(source).unwrap();
let info = strata::resolve::resolve(&module, &Default::default()).unwrap();
assert!(!info.diagnostics.contains_errors());
```
*/

#![allow(
    clippy::new_without_default,
    clippy::unneeded_field_pattern,
    clippy::match_like_matches_macro,
    clippy::collapsible_if,
    clippy::derive_partial_eq_without_eq,
    clippy::needless_borrowed_reference,
    clippy::single_match,
    clippy::enum_variant_names
)]
#![warn(
    trivial_casts,
    trivial_numeric_casts,
    unused_extern_crates,
    unused_qualifications,
    clippy::pattern_type_mismatch,
    clippy::missing_const_for_fn,
    clippy::rest_pat_in_fully_bound_structs,
    clippy::match_wildcard_for_single_variants
)]
#![deny(clippy::exit)]

mod arena;
pub mod ast;
pub mod back;
pub mod diagnostic;
pub mod front;
pub mod keywords;
pub mod resolve;
mod span;

pub use crate::arena::{Arena, BadHandle, Handle};
pub use crate::span::{SourceFile, SourceLocation, Span};

/// Hash map that is faster but not resilient to DoS attacks.
pub type FastHashMap<K, T> = rustc_hash::FxHashMap<K, T>;
/// Hash set that is faster but not resilient to DoS attacks.
pub type FastHashSet<K> = rustc_hash::FxHashSet<K>;

/// Insertion-order-preserving hash map (`IndexMap<K, V>`), but with the same
/// hasher as `FastHashMap<K, V>` (faster but not resilient to DoS attacks).
pub type FastIndexMap<K, V> =
    indexmap::IndexMap<K, V, std::hash::BuildHasherDefault<rustc_hash::FxHasher>>;

/// Insertion-order-preserving hash set (`IndexSet<K>`), but with the same
/// hasher as `FastHashSet<K>` (faster but not resilient to DoS attacks).
pub type FastIndexSet<K> =
    indexmap::IndexSet<K, std::hash::BuildHasherDefault<rustc_hash::FxHasher>>;
