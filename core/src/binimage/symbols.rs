//! Device-stub symbol demangling.
//!
//! A host-side kernel launch goes through a compiler-generated "device
//! stub" function rather than the kernel itself; its mangled name embeds
//! the real kernel name behind a `__device_stub__` marker and an
//! Itanium-style length prefix that covers the marker plus the kernel name:
//! `<prefix><N>__device_stub__<kernel-name><suffix>`, where `N ==
//! len("__device_stub__") + len(kernel-name)`. Grounded on
//! `DAGEE-lib/include/dagr/kernel.h`'s registration path, which recovers
//! the kernel name from exactly this pattern.

use crate::error::{Error, Result};

const STUB_MARKER: &str = "__device_stub__";

/// Walks a host ELF image's symbol table for every defined symbol whose
/// name contains the device-stub marker, returning its address and mangled
/// name so the caller can feed each pair to
/// [`KernelRegistry::record_stub_symbol`](crate) via [`demangle_device_stub`].
///
/// Grounded on `ProgInfo.h`'s `KernelPtrToNameLookup`, which resolves a
/// `__global__` wrapper's address the same way: scanning the host binary's
/// own symbol table rather than the device code object's.
pub fn find_device_stub_symbols(elf_bytes: &[u8]) -> Result<Vec<(usize, String)>> {
    let elf = goblin::elf::Elf::parse(elf_bytes).map_err(|e| Error::MalformedImage(e.to_string()))?;
    let mut found = Vec::new();
    for sym in elf.syms.iter() {
        if sym.st_value == 0 {
            continue;
        }
        let Some(name) = elf.strtab.get_at(sym.st_name) else { continue };
        if name.contains(STUB_MARKER) {
            found.push((sym.st_value as usize, name.to_string()));
        }
    }
    Ok(found)
}

/// Recovers the plain kernel name from a mangled device-stub symbol.
pub fn demangle_device_stub(mangled: &str) -> Result<String, Error> {
    let marker_at = mangled.find(STUB_MARKER).ok_or_else(|| Error::UndemanglableStub(mangled.to_string()))?;

    let digits_end = marker_at;
    let digits_start = mangled[..digits_end]
        .rfind(|c: char| !c.is_ascii_digit())
        .map(|i| i + 1)
        .unwrap_or(0);
    if digits_start == digits_end {
        return Err(Error::UndemanglableStub(mangled.to_string()));
    }
    let n: usize = mangled[digits_start..digits_end]
        .parse()
        .map_err(|_| Error::UndemanglableStub(mangled.to_string()))?;

    let name_start = marker_at + STUB_MARKER.len();
    let name_len = n
        .checked_sub(STUB_MARKER.len())
        .ok_or_else(|| Error::UndemanglableStub(mangled.to_string()))?;
    let name_end = name_start.checked_add(name_len).ok_or_else(|| Error::UndemanglableStub(mangled.to_string()))?;

    mangled
        .get(name_start..name_end)
        .map(|s| s.to_string())
        .ok_or_else(|| Error::UndemanglableStub(mangled.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_marker_and_recovers_name() {
        // "__device_stub__saxpy" is 21 bytes long (16 + len("saxpy")).
        let mangled = "_ZN4dagr21__device_stub__saxpyEPfS0_S0_i";
        assert_eq!(demangle_device_stub(mangled).unwrap(), "saxpy");
    }

    #[test]
    fn rejects_symbols_without_the_marker() {
        assert!(demangle_device_stub("_Z5saxpyPfS_S_i").is_err());
    }
}
