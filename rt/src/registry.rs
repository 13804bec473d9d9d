//! The kernel registry: maps a mangled symbol or a host function pointer to
//! the code-object address and argument layout a dispatch packet needs.
//!
//! Grounded on `DAGEE-lib/include/dagr/kernel.h`'s `KernelLauncher`
//! registration path, which resolves a `__global__` function's address to a
//! `.kd`-suffixed symbol name via the device-stub table before handing it to
//! the driver.

use std::collections::HashMap;
use std::sync::Arc;

use dagee_core::binimage::{demangle_device_stub, find_bundles_in_elf, find_device_stub_symbols};
use dagee_core::driver::{Driver, KernelBody};
use dagee_core::CodeObjectAddr;

use crate::error::{Error, Result};
use crate::task::{compute_layout, ArgKind, ArgLayout};

/// Everything a task needs to launch a previously registered kernel.
pub struct KernelInfo {
    pub name: String,
    pub code_object: CodeObjectAddr,
    pub arg_layout: ArgLayout,
}

/// Maps kernel names (and, for kernels resolved from a host function
/// pointer, the pointer itself) to their [`KernelInfo`].
///
/// Two independent indexes mirror the two ways `DAGEE-lib` looks a kernel
/// up: by the symbol the loader demangled, and by the function pointer a
/// `__global__` wrapper passes at first-call time (cached so repeat launches
/// of the same templated kernel skip re-resolution).
pub struct KernelRegistry {
    driver: Arc<dyn Driver>,
    by_name: HashMap<String, Arc<KernelInfo>>,
    by_ptr: HashMap<usize, Arc<KernelInfo>>,
    symbol_table: HashMap<usize, String>,
}

impl KernelRegistry {
    pub fn new(driver: Arc<dyn Driver>) -> Self {
        KernelRegistry { driver, by_name: HashMap::new(), by_ptr: HashMap::new(), symbol_table: HashMap::new() }
    }

    /// Records that the device-stub symbol at `stub_addr` demangles to the
    /// kernel named `mangled_stub`, for later lookup by
    /// [`register_by_ptr`](Self::register_by_ptr). Typically populated once
    /// per loaded binary image from its ELF symbol table.
    pub fn record_stub_symbol(&mut self, stub_addr: usize, mangled_stub: &str) -> Result<()> {
        let name = demangle_device_stub(mangled_stub)?;
        self.symbol_table.insert(stub_addr, name);
        Ok(())
    }

    /// Loads an embedded binary image: extracts the host ELF's offload
    /// bundles, failing with [`dagee_core::Error::NoCodeBlob`] unless at
    /// least one bundle carries a GPU-family target, then walks the ELF's
    /// own symbol table recording every device-stub symbol found via
    /// [`record_stub_symbol`](Self::record_stub_symbol) so later
    /// [`register_by_ptr`](Self::register_by_ptr) calls can resolve a
    /// `__global__` wrapper's address to a kernel name.
    ///
    /// Returns the number of stub symbols recorded.
    pub fn load_embedded_image(&mut self, elf_bytes: &[u8]) -> Result<usize> {
        const GPU_TRIPLE_PREFIXES: [&str; 2] = ["amdgcn", "nvptx"];

        let bundles = find_bundles_in_elf(elf_bytes)?;
        let has_gpu_blob = bundles
            .iter()
            .any(|bundle| GPU_TRIPLE_PREFIXES.iter().any(|prefix| bundle.find_by_triple_substr(prefix).is_some()));
        if !has_gpu_blob {
            return Err(dagee_core::Error::NoCodeBlob.into());
        }

        let stubs = find_device_stub_symbols(elf_bytes)?;
        let mut recorded = 0;
        for (addr, mangled) in &stubs {
            if self.record_stub_symbol(*addr, mangled).is_ok() {
                recorded += 1;
            }
        }
        Ok(recorded)
    }

    /// Registers `body` under an explicit kernel name. The argument-buffer
    /// size is computed from `param_kinds` at registration, not at launch,
    /// so every launch of this kernel reuses the same layout.
    ///
    /// Registering the same name twice is an error: unlike pointer-based
    /// registration, there is no way to tell whether the caller meant to
    /// redefine the kernel or simply launch it again.
    pub fn register_by_name(
        &mut self,
        name: &str,
        body: KernelBody,
        param_kinds: &[ArgKind],
    ) -> Result<Arc<KernelInfo>> {
        if self.by_name.contains_key(name) {
            return Err(Error::DuplicateKernel(name.to_string()));
        }
        let info = Arc::new(KernelInfo {
            name: name.to_string(),
            code_object: self.driver.register_kernel_body(body),
            arg_layout: compute_layout(param_kinds),
        });
        self.by_name.insert(name.to_string(), info.clone());
        Ok(info)
    }

    /// Registers (or returns the already-registered) kernel for a host
    /// function pointer, resolving its name through the stub symbol table
    /// recorded via [`record_stub_symbol`](Self::record_stub_symbol).
    ///
    /// Idempotent: calling this twice with the same `func_ptr` returns the
    /// same [`KernelInfo`] without re-registering a second code object,
    /// matching `KernelLauncher`'s one-time-resolution cache.
    pub fn register_by_ptr(
        &mut self,
        func_ptr: usize,
        body: KernelBody,
        param_kinds: &[ArgKind],
    ) -> Result<Arc<KernelInfo>> {
        if let Some(info) = self.by_ptr.get(&func_ptr) {
            return Ok(info.clone());
        }
        let stub_name = self.symbol_table.get(&func_ptr).cloned().ok_or(Error::Core(dagee_core::Error::SymbolNotResolvable))?;
        let kd_name = format!("{stub_name}.kd");
        let info = match self.by_name.get(&kd_name) {
            Some(existing) => existing.clone(),
            None => self.register_by_name(&kd_name, body, param_kinds)?,
        };
        self.by_ptr.insert(func_ptr, info.clone());
        Ok(info)
    }

    /// Looks up a previously registered kernel by name.
    pub fn get(&self, name: &str) -> Result<Arc<KernelInfo>> {
        self.by_name.get(name).cloned().ok_or_else(|| Error::UnknownKernel(name.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dagee_core::agent::{Agent, DeviceKind};
    use dagee_core::driver::sim::SimDriver;

    fn driver() -> Arc<dyn Driver> {
        Arc::new(SimDriver::new(vec![Agent::new(0, DeviceKind::Gpu, 64)]))
    }

    #[test]
    fn load_embedded_image_rejects_non_elf_bytes() {
        let mut registry = KernelRegistry::new(driver());
        let err = registry.load_embedded_image(&[0u8; 16]).unwrap_err();
        assert!(matches!(err, Error::Core(_)));
    }

    #[test]
    fn registering_the_same_pointer_twice_is_idempotent() {
        let mut registry = KernelRegistry::new(driver());
        registry.record_stub_symbol(0x1000, "_ZN4dagr21__device_stub__saxpyEPfS0_S0_i").unwrap();

        let a = registry.register_by_ptr(0x1000, Arc::new(|_| {}), &[ArgKind::Pointer]).unwrap();
        let b = registry.register_by_ptr(0x1000, Arc::new(|_| {}), &[ArgKind::Pointer]).unwrap();
        assert_eq!(a.code_object, b.code_object);
        assert_eq!(a.name, "saxpy.kd");
    }

    #[test]
    fn registering_the_same_name_twice_is_an_error() {
        let mut registry = KernelRegistry::new(driver());
        registry.register_by_name("noop", Arc::new(|_| {}), &[]).unwrap();
        assert!(registry.register_by_name("noop", Arc::new(|_| {}), &[]).is_err());
    }

    #[test]
    fn unknown_name_lookup_fails() {
        let registry = KernelRegistry::new(driver());
        assert!(registry.get("nope").is_err());
    }
}
