//! Parsing of the embedded binary image: the Clang offload-bundle section
//! and the ELF code objects nested inside it.
//!
//! Grounded on `DAGEE-lib/include/dagr/kernel.h`'s binary-image loader and
//! the original `clang-offload-bundler` format it consumes, via the
//! `goblin` crate's ELF reader.

pub mod bundle;
pub mod symbols;

pub use bundle::{find_bundles_in_elf, BundleEntry, OffloadBundle};
pub use symbols::{demangle_device_stub, find_device_stub_symbols};
