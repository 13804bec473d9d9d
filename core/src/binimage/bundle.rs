//! The Clang offload-bundle container format: one magic-prefixed header
//! followed by a table of (offset, size, target-triple) entries, each
//! pointing at a nested code object for one target.

use crate::error::{Error, Result};

const MAGIC: &[u8] = b"__CLANG_OFFLOAD_BUNDLE__";

/// One entry in an [`OffloadBundle`]'s table: a target triple and the byte
/// range (relative to the bundle's own start) of its code object.
#[derive(Debug, Clone)]
pub struct BundleEntry {
    pub triple: String,
    pub offset: usize,
    pub size: usize,
}

/// A parsed Clang offload bundle: a magic header, an entry table, and the
/// raw bytes the table's offsets index into.
pub struct OffloadBundle {
    pub entries: Vec<BundleEntry>,
    data: Vec<u8>,
    consumed: usize,
}

fn align_up_8(value: usize) -> usize {
    (value + 7) & !7
}

impl OffloadBundle {
    /// Parses a single bundle starting at byte 0 of `data`, which may be
    /// followed by more bundles in the same section — see
    /// [`consumed_len`](Self::consumed_len). Bundles are always 8-byte
    /// aligned within their containing section; misaligned input is
    /// rejected as malformed rather than silently scanned for, matching the
    /// strictness of the reference bundler.
    pub fn parse(data: &[u8]) -> Result<Self> {
        if data.len() < MAGIC.len() + 8 {
            return Err(Error::MalformedImage("truncated before entry count".into()));
        }
        if &data[..MAGIC.len()] != MAGIC {
            return Err(Error::MalformedImage("bad offload-bundle magic".into()));
        }
        let mut cursor = MAGIC.len();
        let num_entries = read_u64(data, cursor)?;
        cursor += 8;

        let mut entries = Vec::with_capacity(num_entries as usize);
        let mut max_end = cursor;
        for _ in 0..num_entries {
            let offset = read_u64(data, cursor)? as usize;
            cursor += 8;
            let size = read_u64(data, cursor)? as usize;
            cursor += 8;
            let triple_size = read_u64(data, cursor)? as usize;
            cursor += 8;
            let triple_bytes = data
                .get(cursor..cursor + triple_size)
                .ok_or_else(|| Error::MalformedImage("truncated target triple".into()))?;
            let triple = String::from_utf8_lossy(triple_bytes).into_owned();
            cursor += triple_size;

            if offset + size > data.len() {
                return Err(Error::MalformedImage(format!("entry for `{triple}` overruns bundle")));
            }
            // Empty entries (size 0) are tolerated, matching the reference
            // bundler's handling of targets a blob was not built for.
            max_end = max_end.max(offset + size);
            entries.push(BundleEntry { triple, offset, size });
        }
        max_end = max_end.max(cursor);

        Ok(OffloadBundle { entries, data: data[..max_end].to_vec(), consumed: align_up_8(max_end) })
    }

    /// The raw code-object bytes for `entry`.
    pub fn entry_bytes(&self, entry: &BundleEntry) -> &[u8] {
        &self.data[entry.offset..entry.offset + entry.size]
    }

    /// Finds the first entry whose triple contains `needle` (e.g.
    /// `"amdgcn"` or `"nvptx"`).
    pub fn find_by_triple_substr(&self, needle: &str) -> Option<&BundleEntry> {
        self.entries.iter().find(|e| e.triple.contains(needle))
    }

    /// Byte offset, relative to this bundle's own start and 8-byte aligned,
    /// where a following bundle in the same section would begin: the
    /// largest-offset entry's `offset + size`, rounded up to 8.
    pub fn consumed_len(&self) -> usize {
        self.consumed
    }
}

fn read_u64(data: &[u8], at: usize) -> Result<u64> {
    let bytes: [u8; 8] = data
        .get(at..at + 8)
        .ok_or_else(|| Error::MalformedImage("truncated bundle header field".into()))?
        .try_into()
        .unwrap();
    Ok(u64::from_le_bytes(bytes))
}

/// Walks an ELF host binary's section table for every section whose name
/// suggests an embedded fat binary (`.hip_fatbin`, `.nv_fatbin`, or any
/// name containing `fatbin`) and steps through every bundle packed into it,
/// advancing past each one by its own [`OffloadBundle::consumed_len`] to
/// find the next. A section that does not start with the bundle magic at
/// all is skipped rather than treated as an error — a binary may embed more
/// than one device-code section, and the caller only needs the ones that
/// are actually bundles.
pub fn find_bundles_in_elf(elf_bytes: &[u8]) -> Result<Vec<OffloadBundle>> {
    let elf = goblin::elf::Elf::parse(elf_bytes).map_err(|e| Error::MalformedImage(e.to_string()))?;
    let mut bundles = Vec::new();

    for section in &elf.section_headers {
        let name = elf.shdr_strtab.get_at(section.sh_name).unwrap_or("");
        if !(name == ".hip_fatbin" || name == ".nv_fatbin" || name.contains("fatbin")) {
            continue;
        }
        let start = section.sh_offset as usize;
        let end = start.saturating_add(section.sh_size as usize);
        let Some(bytes) = elf_bytes.get(start..end) else { continue };

        let mut pos = 0usize;
        while pos + MAGIC.len() <= bytes.len() {
            let Some(remaining) = bytes.get(pos..) else { break };
            let bundle = match OffloadBundle::parse(remaining) {
                Ok(bundle) => bundle,
                // No further bundle at this position — stop stepping
                // through this section, matching at least one bundle
                // already found there is not itself an error.
                Err(_) => break,
            };
            let advance = bundle.consumed_len().max(1);
            bundles.push(bundle);
            pos += advance;
        }
    }

    if bundles.is_empty() {
        return Err(Error::NoCodeBlob);
    }
    Ok(bundles)
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Builds a single-entry bundle with its payload packed immediately
    /// after the header, so `consumed_len()` lands exactly at the end of
    /// the returned bytes.
    fn build_bundle(triple: &str, payload: &[u8]) -> Vec<u8> {
        let header_len = MAGIC.len() + 8 + 8 + 8 + 8 + triple.len();
        let mut data = vec![0u8; header_len + payload.len()];
        data[..MAGIC.len()].copy_from_slice(MAGIC);
        let mut pos = MAGIC.len();
        data[pos..pos + 8].copy_from_slice(&1u64.to_le_bytes());
        pos += 8;
        data[pos..pos + 8].copy_from_slice(&(header_len as u64).to_le_bytes());
        pos += 8;
        data[pos..pos + 8].copy_from_slice(&(payload.len() as u64).to_le_bytes());
        pos += 8;
        data[pos..pos + 8].copy_from_slice(&(triple.len() as u64).to_le_bytes());
        pos += 8;
        data[pos..pos + triple.len()].copy_from_slice(triple.as_bytes());
        pos += triple.len();
        debug_assert_eq!(pos, header_len);
        data[header_len..].copy_from_slice(payload);
        data
    }

    #[test]
    fn parse_recovers_entry_and_payload_bytes() {
        let data = build_bundle("amdgcn-amd-amdhsa--gfx90a", &[0xAB; 4]);
        let bundle = OffloadBundle::parse(&data).unwrap();
        assert_eq!(bundle.entries.len(), 1);
        let entry = bundle.find_by_triple_substr("amdgcn").unwrap();
        assert_eq!(bundle.entry_bytes(entry), &[0xAB; 4]);
    }

    #[test]
    fn rejects_bad_magic() {
        let mut data = build_bundle("amdgcn-amd-amdhsa--gfx90a", &[0; 4]);
        data[0] = b'X';
        assert!(OffloadBundle::parse(&data).is_err());
    }

    #[test]
    fn rejects_truncated_header() {
        let data = build_bundle("amdgcn-amd-amdhsa--gfx90a", &[0; 4]);
        assert!(OffloadBundle::parse(&data[..MAGIC.len() + 4]).is_err());
    }

    #[test]
    fn rejects_entry_overrunning_the_bundle() {
        let mut data = build_bundle("amdgcn-amd-amdhsa--gfx90a", &[0; 4]);
        // Inflate the recorded size of the one entry past the buffer's end.
        let size_field = MAGIC.len() + 8 + 8;
        data[size_field..size_field + 8].copy_from_slice(&1_000_000u64.to_le_bytes());
        assert!(OffloadBundle::parse(&data).is_err());
    }

    #[test]
    fn stepping_through_two_concatenated_bundles_finds_both() {
        let first_bytes = build_bundle("amdgcn-amd-amdhsa--gfx90a", &[1, 2, 3, 4, 5, 6, 7, 8]);
        let second_bytes = build_bundle("nvptx64-nvidia-cuda", &[9, 9]);

        let mut combined = first_bytes.clone();
        combined.extend_from_slice(&second_bytes);

        let first = OffloadBundle::parse(&combined).unwrap();
        assert_eq!(first.consumed_len(), first_bytes.len());
        assert!(first.find_by_triple_substr("amdgcn").is_some());

        let second = OffloadBundle::parse(&combined[first.consumed_len()..]).unwrap();
        assert!(second.find_by_triple_substr("nvptx").is_some());
    }
}
