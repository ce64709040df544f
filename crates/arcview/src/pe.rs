//! PE executable model: header summary and the resource table.
//!
//! Headers, sections, imports and exports come from goblin. The resource
//! directory is walked here with explicit bounds checks so that a single
//! corrupt entry is skipped instead of failing the whole listing.

use crate::error::ViewerError;
use crate::host::FileViewer;
use crate::safety::{numbered_name, resolve_output_path};
use crate::session::{open_in_viewer, ViewerSession};
use crate::types::{ExtractOptions, ExtractStats, ScratchExtraction};
use goblin::pe::PE;
use serde::Serialize;
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Instant;

/// Header-level facts about a PE image.
#[derive(Debug, Clone, Serialize)]
pub struct PeSummary {
    /// Offset of the `PE\0\0` signature (`e_lfanew`)
    pub pe_header_offset: u32,
    pub machine: u16,
    pub machine_name: String,
    pub number_of_sections: u16,
    pub time_date_stamp: u32,
    pub characteristics: u16,
    pub entry_point: u64,
    pub image_base: u64,
    pub subsystem: Option<u16>,
    pub is_64: bool,
    pub is_dll: bool,
    pub sections: Vec<SectionSummary>,
    pub imports: Vec<ImportedLibrary>,
    pub exports: Vec<ExportedSymbol>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SectionSummary {
    pub name: String,
    pub virtual_address: u32,
    pub virtual_size: u32,
    pub raw_size: u32,
    pub raw_pointer: u32,
    pub characteristics: u32,
}

#[derive(Debug, Clone, Serialize)]
pub struct ImportedLibrary {
    pub dll: String,
    pub functions: Vec<ImportedFunction>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ImportedFunction {
    pub name: String,
    pub rva: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct ExportedSymbol {
    pub name: String,
    pub rva: u64,
}

/// One leaf of the resource tree (type / name / language).
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResourceEntry {
    pub type_name: String,
    pub resource_name: String,
    pub lang_id: u32,
    pub size_bytes: u64,

    /// Unique within one image
    pub file_name: String,

    #[serde(skip)]
    data_offset: usize,
}

/// Symbolic names of the predefined resource types.
const RESOURCE_TYPES: &[(u32, &str)] = &[
    (1, "RT_CURSOR"),
    (2, "RT_BITMAP"),
    (3, "RT_ICON"),
    (4, "RT_MENU"),
    (5, "RT_DIALOG"),
    (6, "RT_STRING"),
    (7, "RT_FONTDIR"),
    (8, "RT_FONT"),
    (9, "RT_ACCELERATOR"),
    (10, "RT_RCDATA"),
    (11, "RT_MESSAGETABLE"),
    (12, "RT_GROUP_CURSOR"),
    (14, "RT_GROUP_ICON"),
    (16, "RT_VERSION"),
    (17, "RT_DLGINCLUDE"),
    (19, "RT_PLUGPLAY"),
    (20, "RT_VXD"),
    (21, "RT_ANICURSOR"),
    (22, "RT_ANIICON"),
    (23, "RT_HTML"),
    (24, "RT_MANIFEST"),
];

const RESOURCE_EXTENSIONS: &[(&str, &str)] = &[
    ("RT_ICON", ".ico"),
    ("RT_BITMAP", ".bmp"),
    ("RT_MANIFEST", ".mf"),
    ("RT_VERSION", ".version"),
    ("RT_STRING", ".txt"),
    ("RT_MESSAGETABLE", ".bin"),
    ("RT_GROUP_ICON", ".group_ico"),
    ("RT_GROUP_CURSOR", ".group_cur"),
    ("RT_CURSOR", ".cur"),
];

/// `RT_*` name for a numeric type id, or `Unknown ({id})`.
pub fn resource_type_name(id: u32) -> String {
    RESOURCE_TYPES
        .iter()
        .find(|(type_id, _)| *type_id == id)
        .map(|(_, name)| name.to_string())
        .unwrap_or_else(|| format!("Unknown ({})", id))
}

/// File extension used when saving a resource of `type_name`.
pub fn resource_extension(type_name: &str) -> &'static str {
    RESOURCE_EXTENSIONS
        .iter()
        .find(|(name, _)| *name == type_name)
        .map(|(_, ext)| *ext)
        .unwrap_or(".bin")
}

/// `{resource_name}_{lang_id}{extension}`, with path separators and other
/// characters that are invalid in file names replaced by `_`.
pub fn resource_file_name(type_name: &str, resource_name: &str, lang_id: u32) -> String {
    let safe_name: String = resource_name
        .chars()
        .map(|c| match c {
            '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' => '_',
            c if c.is_control() => '_',
            c => c,
        })
        .collect();
    format!("{}_{}{}", safe_name, lang_id, resource_extension(type_name))
}

/// A parsed executable with its resources indexed by synthesized file name.
pub struct PeViewerModel {
    path: PathBuf,
    data: Vec<u8>,
    summary: PeSummary,
    resources: Vec<ResourceEntry>,
    skipped: usize,
}

impl PeViewerModel {
    pub fn open(path: &Path) -> Result<Self, ViewerError> {
        let data = fs::read(path).map_err(|e| ViewerError::fs(path, e))?;
        Self::parse(path.to_path_buf(), data)
    }

    /// Parse an in-memory image. Fails with `PeFormat` when the headers or
    /// the root resource directory are malformed.
    pub fn parse(path: PathBuf, data: Vec<u8>) -> Result<Self, ViewerError> {
        let (summary, layout) = {
            let pe = PE::parse(&data).map_err(|e| ViewerError::pe(e.to_string()))?;
            (summarize(&pe), ImageLayout::from_pe(&pe))
        };

        let mut walker = ResourceWalker {
            data: &data,
            layout: &layout,
            root: 0,
            skipped: 0,
            entries: Vec::new(),
            used_names: HashSet::new(),
        };
        walker.walk()?;
        let ResourceWalker { skipped, entries, .. } = walker;

        if skipped > 0 {
            tracing::warn!(path = %path.display(), skipped, "Skipped malformed resource entries");
        }
        tracing::debug!(path = %path.display(), resources = entries.len(), "Parsed PE image");

        Ok(Self {
            path,
            data,
            summary,
            resources: entries,
            skipped,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn summary(&self) -> &PeSummary {
        &self.summary
    }

    /// Resources in walk order (type, then name, then language).
    pub fn list_resources(&self) -> &[ResourceEntry] {
        &self.resources
    }

    /// Number of resource directory entries skipped as malformed.
    pub fn skipped_entries(&self) -> usize {
        self.skipped
    }

    pub fn get_resource_bytes(&self, file_name: &str) -> Result<&[u8], ViewerError> {
        let entry = self
            .resources
            .iter()
            .find(|r| r.file_name == file_name)
            .ok_or_else(|| ViewerError::EntryNotFound(file_name.to_string()))?;

        let end = entry.data_offset + entry.size_bytes as usize;
        self.data
            .get(entry.data_offset..end)
            .ok_or_else(|| ViewerError::pe(format!("resource {} out of bounds", file_name)))
    }

    /// Write every resource to `dest_dir/<file_name>`.
    pub fn extract_all_resources(&self, dest_dir: &Path, options: &ExtractOptions) -> Result<ExtractStats, ViewerError> {
        let start_time = Instant::now();
        fs::create_dir_all(dest_dir).map_err(|e| ViewerError::fs(dest_dir, e))?;
        let mut stats = ExtractStats::default();

        for entry in &self.resources {
            let bytes = self.get_resource_bytes(&entry.file_name)?;
            let Some(target) = resolve_output_path(&dest_dir.join(&entry.file_name), options.overwrite)? else {
                tracing::debug!(resource = %entry.file_name, "Skipping existing file");
                continue;
            };
            fs::write(&target, bytes).map_err(|e| ViewerError::fs(&target, e))?;
            stats.files_extracted += 1;
            stats.bytes_written += bytes.len() as u64;
        }

        stats.duration = start_time.elapsed();
        tracing::info!(
            path = %self.path.display(),
            dest = %dest_dir.display(),
            files = stats.files_extracted,
            "Extracted resources"
        );
        Ok(stats)
    }

    /// Materialize one resource in the session's scratch space and open it.
    pub fn view_resource(
        &self,
        file_name: &str,
        session: &mut ViewerSession,
        viewer: &dyn FileViewer,
    ) -> Result<ScratchExtraction, ViewerError> {
        let bytes = self.get_resource_bytes(file_name)?;
        let extraction = session.materialize(&self.path, file_name, bytes)?;
        open_in_viewer(&extraction, viewer)?;
        Ok(extraction)
    }
}

fn machine_name(machine: u16) -> String {
    match machine {
        0x014c => "x86".to_string(),
        0x8664 => "x86_64".to_string(),
        0x01c0 => "ARM".to_string(),
        0x01c4 => "ARMv7".to_string(),
        0xaa64 => "ARM64".to_string(),
        _ => format!("unknown-{:#x}", machine),
    }
}

fn summarize(pe: &PE) -> PeSummary {
    let coff = &pe.header.coff_header;

    let sections = pe
        .sections
        .iter()
        .map(|section| SectionSummary {
            name: section
                .name()
                .map(|n| n.trim_end_matches('\0').to_string())
                .unwrap_or_else(|_| String::from_utf8_lossy(&section.name).trim_end_matches('\0').to_string()),
            virtual_address: section.virtual_address,
            virtual_size: section.virtual_size,
            raw_size: section.size_of_raw_data,
            raw_pointer: section.pointer_to_raw_data,
            characteristics: section.characteristics,
        })
        .collect();

    let mut imports: Vec<ImportedLibrary> = Vec::new();
    for import in &pe.imports {
        let function = ImportedFunction {
            name: import.name.to_string(),
            rva: import.rva as u64,
        };
        match imports.iter_mut().find(|lib| lib.dll == import.dll) {
            Some(lib) => lib.functions.push(function),
            None => imports.push(ImportedLibrary {
                dll: import.dll.to_string(),
                functions: vec![function],
            }),
        }
    }

    let exports = pe
        .exports
        .iter()
        .filter_map(|export| {
            export.name.map(|name| ExportedSymbol {
                name: name.to_string(),
                rva: export.rva as u64,
            })
        })
        .collect();

    PeSummary {
        pe_header_offset: pe.header.dos_header.pe_pointer,
        machine: coff.machine,
        machine_name: machine_name(coff.machine),
        number_of_sections: coff.number_of_sections,
        time_date_stamp: coff.time_date_stamp,
        characteristics: coff.characteristics,
        entry_point: pe.entry as u64,
        image_base: pe.image_base as u64,
        subsystem: pe
            .header
            .optional_header
            .as_ref()
            .map(|h| h.windows_fields.subsystem),
        is_64: pe.is_64,
        is_dll: pe.is_lib,
        sections,
        imports,
        exports,
    }
}

/// Section spans and the resource directory location, detached from the
/// borrowed goblin view.
struct ImageLayout {
    /// `(virtual_address, raw_size, raw_pointer)`
    sections: Vec<(u32, u32, u32)>,
    resource_rva: Option<u32>,
}

impl ImageLayout {
    fn from_pe(pe: &PE) -> Self {
        let resource_rva = pe
            .header
            .optional_header
            .as_ref()
            .and_then(|h| h.data_directories.get_resource_table().as_ref().map(|dir| dir.virtual_address))
            .filter(|rva| *rva != 0);

        Self {
            sections: pe
                .sections
                .iter()
                .map(|s| (s.virtual_address, s.size_of_raw_data, s.pointer_to_raw_data))
                .collect(),
            resource_rva,
        }
    }

    /// Map an RVA to a file offset through the section table.
    fn rva_to_offset(&self, rva: u32) -> Option<usize> {
        self.sections.iter().find_map(|&(va, raw_size, raw_pointer)| {
            let delta = rva.checked_sub(va)?;
            if delta < raw_size {
                (raw_pointer as usize).checked_add(delta as usize)
            } else {
                None
            }
        })
    }
}

const HIGH_BIT: u32 = 0x8000_0000;
const DIRECTORY_HEADER_LEN: usize = 16;
const DIRECTORY_ENTRY_LEN: usize = 8;
const DATA_ENTRY_LEN: usize = 16;

fn read_u16(data: &[u8], offset: usize) -> Option<u16> {
    let bytes = data.get(offset..offset.checked_add(2)?)?;
    Some(u16::from_le_bytes([bytes[0], bytes[1]]))
}

fn read_u32(data: &[u8], offset: usize) -> Option<u32> {
    let bytes = data.get(offset..offset.checked_add(4)?)?;
    Some(u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
}

/// Identifier of a directory entry: a numeric id or a UTF-16 name.
enum EntryKey {
    Id(u32),
    Name(String),
}

struct DirectoryEntry {
    key: EntryKey,
    /// Offset relative to the resource root
    target: u32,
    is_directory: bool,
}

struct ResourceWalker<'a> {
    data: &'a [u8],
    layout: &'a ImageLayout,
    /// File offset of the root resource directory
    root: usize,
    skipped: usize,
    entries: Vec<ResourceEntry>,
    used_names: HashSet<String>,
}

impl ResourceWalker<'_> {
    fn walk(&mut self) -> Result<(), ViewerError> {
        let Some(rva) = self.layout.resource_rva else {
            return Ok(());
        };
        self.root = self
            .layout
            .rva_to_offset(rva)
            .ok_or_else(|| ViewerError::pe(format!("resource directory RVA {:#x} is outside every section", rva)))?;

        let types = self
            .directory(0)
            .ok_or_else(|| ViewerError::pe("resource root directory is truncated"))?;

        for type_entry in types {
            let names = self.subdirectory(&type_entry);
            let type_name = match type_entry.key {
                EntryKey::Id(id) => resource_type_name(id),
                EntryKey::Name(name) => name,
            };
            let Some(names) = names else {
                continue;
            };

            for name_entry in names {
                let resource_name = match &name_entry.key {
                    EntryKey::Id(id) => id.to_string(),
                    EntryKey::Name(name) => name.clone(),
                };
                let Some(languages) = self.subdirectory(&name_entry) else {
                    continue;
                };

                for lang_entry in languages {
                    let lang_id = match lang_entry.key {
                        EntryKey::Id(id) => id,
                        EntryKey::Name(_) => 0,
                    };
                    if lang_entry.is_directory {
                        self.skip("language entry points to a directory");
                        continue;
                    }
                    match self.data_entry(lang_entry.target) {
                        Some((data_offset, size)) => self.push(&type_name, &resource_name, lang_id, data_offset, size),
                        None => self.skip("resource data out of bounds"),
                    }
                }
            }
        }

        Ok(())
    }

    fn skip(&mut self, reason: &str) {
        tracing::debug!(reason, "Skipping resource entry");
        self.skipped += 1;
    }

    fn subdirectory(&mut self, entry: &DirectoryEntry) -> Option<Vec<DirectoryEntry>> {
        if !entry.is_directory {
            self.skip("expected a subdirectory");
            return None;
        }
        let entries = self.directory(entry.target);
        if entries.is_none() {
            self.skip("subdirectory out of bounds");
        }
        entries
    }

    /// Read the entries of the directory at `offset` (relative to the root).
    fn directory(&self, offset: u32) -> Option<Vec<DirectoryEntry>> {
        let start = self.root.checked_add(offset as usize)?;
        let named = read_u16(self.data, start + 12)? as usize;
        let ids = read_u16(self.data, start + 14)? as usize;
        let count = named + ids;

        let end = start
            .checked_add(DIRECTORY_HEADER_LEN)?
            .checked_add(count * DIRECTORY_ENTRY_LEN)?;
        if end > self.data.len() {
            return None;
        }

        let mut entries = Vec::with_capacity(count);
        for i in 0..count {
            let at = start + DIRECTORY_HEADER_LEN + i * DIRECTORY_ENTRY_LEN;
            let name_field = read_u32(self.data, at)?;
            let offset_field = read_u32(self.data, at + 4)?;

            let key = if name_field & HIGH_BIT != 0 {
                match self.name_string(name_field & !HIGH_BIT) {
                    Some(name) => EntryKey::Name(name),
                    None => EntryKey::Id(name_field & !HIGH_BIT),
                }
            } else {
                EntryKey::Id(name_field)
            };

            entries.push(DirectoryEntry {
                key,
                target: offset_field & !HIGH_BIT,
                is_directory: offset_field & HIGH_BIT != 0,
            });
        }
        Some(entries)
    }

    /// Length-prefixed UTF-16LE string at `offset` (relative to the root).
    fn name_string(&self, offset: u32) -> Option<String> {
        let start = self.root.checked_add(offset as usize)?;
        let len = read_u16(self.data, start)? as usize;
        let bytes = self.data.get(start + 2..start + 2 + len * 2)?;
        let units: Vec<u16> = bytes
            .chunks_exact(2)
            .map(|pair| u16::from_le_bytes([pair[0], pair[1]]))
            .collect();
        Some(String::from_utf16_lossy(&units))
    }

    /// Resolve an `IMAGE_RESOURCE_DATA_ENTRY` to `(file_offset, size)`.
    fn data_entry(&self, offset: u32) -> Option<(usize, u32)> {
        let start = self.root.checked_add(offset as usize)?;
        if start.checked_add(DATA_ENTRY_LEN)? > self.data.len() {
            return None;
        }
        let data_rva = read_u32(self.data, start)?;
        let size = read_u32(self.data, start + 4)?;

        let data_offset = self.layout.rva_to_offset(data_rva)?;
        if data_offset.checked_add(size as usize)? > self.data.len() {
            return None;
        }
        Some((data_offset, size))
    }

    fn push(&mut self, type_name: &str, resource_name: &str, lang_id: u32, data_offset: usize, size: u32) {
        let base = resource_file_name(type_name, resource_name, lang_id);
        let mut file_name = base.clone();
        let mut n = 1;
        while self.used_names.contains(&file_name) {
            file_name = numbered_name(Path::new(&base), n);
            n += 1;
        }
        self.used_names.insert(file_name.clone());

        self.entries.push(ResourceEntry {
            type_name: type_name.to_string(),
            resource_name: resource_name.to_string(),
            lang_id,
            size_bytes: size as u64,
            file_name,
            data_offset,
        });
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub(crate) enum Key {
        Id(u32),
        Name(&'static str),
    }

    pub(crate) struct Res {
        pub(crate) ty: Key,
        pub(crate) name: Key,
        pub(crate) lang: u32,
        pub(crate) data: Vec<u8>,
    }

    pub(crate) const SECTION_RVA: u32 = 0x1000;
    const SECTION_FILE_OFFSET: usize = 0x200;
    const PE_OFFSET: usize = 0x80;

    fn put_u16(buf: &mut [u8], at: usize, value: u16) {
        buf[at..at + 2].copy_from_slice(&value.to_le_bytes());
    }

    fn put_u32(buf: &mut [u8], at: usize, value: u32) {
        buf[at..at + 4].copy_from_slice(&value.to_le_bytes());
    }

    fn align(value: usize, to: usize) -> usize {
        value.div_ceil(to) * to
    }

    fn key_field(key: Key, string_base: usize, strings: &mut Vec<u8>) -> u32 {
        match key {
            Key::Id(id) => id,
            Key::Name(name) => {
                let offset = string_base + strings.len();
                let units: Vec<u16> = name.encode_utf16().collect();
                strings.extend_from_slice(&(units.len() as u16).to_le_bytes());
                for unit in units {
                    strings.extend_from_slice(&unit.to_le_bytes());
                }
                HIGH_BIT | offset as u32
            }
        }
    }

    fn write_directory(buf: &mut [u8], at: usize, entries: &[(Key, u32, u32)], is_dir: bool) {
        let named = entries.iter().filter(|(k, _, _)| matches!(k, Key::Name(_))).count();
        put_u16(buf, at + 12, named as u16);
        put_u16(buf, at + 14, (entries.len() - named) as u16);
        let mut ordered: Vec<_> = entries.to_vec();
        ordered.sort_by_key(|(k, _, _)| !matches!(k, Key::Name(_)));
        for (i, (_, name_field, target)) in ordered.iter().enumerate() {
            let slot = at + DIRECTORY_HEADER_LEN + i * DIRECTORY_ENTRY_LEN;
            put_u32(buf, slot, *name_field);
            put_u32(buf, slot + 4, if is_dir { HIGH_BIT | *target } else { *target });
        }
    }

    /// Lay out a `.rsrc` section holding `resources`.
    pub(crate) fn resource_section(resources: &[Res]) -> Vec<u8> {
        type Names<'r> = Vec<(Key, Vec<(u32, &'r [u8])>)>;
        let mut types: Vec<(Key, Names<'_>)> = Vec::new();
        for res in resources {
            let t = match types.iter().position(|(k, _)| *k == res.ty) {
                Some(i) => i,
                None => {
                    types.push((res.ty, Vec::new()));
                    types.len() - 1
                }
            };
            let names = &mut types[t].1;
            let n = match names.iter().position(|(k, _)| *k == res.name) {
                Some(i) => i,
                None => {
                    names.push((res.name, Vec::new()));
                    names.len() - 1
                }
            };
            names[n].1.push((res.lang, res.data.as_slice()));
        }

        let dir_size = |n: usize| DIRECTORY_HEADER_LEN + DIRECTORY_ENTRY_LEN * n;
        let mut offset = dir_size(types.len());
        let mut type_dirs = Vec::new();
        for (_, names) in &types {
            type_dirs.push(offset);
            offset += dir_size(names.len());
        }
        let mut lang_dirs = Vec::new();
        for (_, names) in &types {
            let per_type: Vec<usize> = names
                .iter()
                .map(|(_, langs)| {
                    let at = offset;
                    offset += dir_size(langs.len());
                    at
                })
                .collect();
            lang_dirs.push(per_type);
        }
        let mut data_entries = Vec::new();
        for (_, names) in &types {
            let per_type: Vec<Vec<usize>> = names
                .iter()
                .map(|(_, langs)| {
                    langs
                        .iter()
                        .map(|_| {
                            let at = offset;
                            offset += DATA_ENTRY_LEN;
                            at
                        })
                        .collect()
                })
                .collect();
            data_entries.push(per_type);
        }
        let mut blobs = Vec::new();
        for (_, names) in &types {
            for (_, langs) in names {
                for (_, data) in langs {
                    offset = align(offset, 4);
                    blobs.push((offset, *data));
                    offset += data.len();
                }
            }
        }
        let string_base = align(offset, 4);

        let mut buf = vec![0u8; string_base];
        let mut strings = Vec::new();

        let root_entries: Vec<(Key, u32, u32)> = types
            .iter()
            .zip(&type_dirs)
            .map(|((key, _), at)| (*key, key_field(*key, string_base, &mut strings), *at as u32))
            .collect();
        write_directory(&mut buf, 0, &root_entries, true);

        let mut blob_index = 0;
        for (t, (_, names)) in types.iter().enumerate() {
            let name_entries: Vec<(Key, u32, u32)> = names
                .iter()
                .zip(&lang_dirs[t])
                .map(|((key, _), at)| (*key, key_field(*key, string_base, &mut strings), *at as u32))
                .collect();
            write_directory(&mut buf, type_dirs[t], &name_entries, true);

            for (n, (_, langs)) in names.iter().enumerate() {
                let lang_entries: Vec<(Key, u32, u32)> = langs
                    .iter()
                    .zip(&data_entries[t][n])
                    .map(|((lang, _), at)| (Key::Id(*lang), *lang, *at as u32))
                    .collect();
                write_directory(&mut buf, lang_dirs[t][n], &lang_entries, false);

                for at in &data_entries[t][n] {
                    let (blob_at, data) = blobs[blob_index];
                    blob_index += 1;
                    put_u32(&mut buf, *at, SECTION_RVA + blob_at as u32);
                    put_u32(&mut buf, *at + 4, data.len() as u32);
                    buf[blob_at..blob_at + data.len()].copy_from_slice(data);
                }
            }
        }

        buf.extend_from_slice(&strings);
        buf
    }

    /// Minimal PE32 image with one `.rsrc` section holding `rsrc`.
    pub(crate) fn build_image(rsrc: &[u8]) -> Vec<u8> {
        let raw_size = align(rsrc.len().max(1), 0x200);
        let mut image = vec![0u8; SECTION_FILE_OFFSET + raw_size];

        image[0..2].copy_from_slice(b"MZ");
        put_u32(&mut image, 0x3C, PE_OFFSET as u32);
        image[PE_OFFSET..PE_OFFSET + 4].copy_from_slice(b"PE\0\0");

        let coff = PE_OFFSET + 4;
        put_u16(&mut image, coff, 0x014c);
        put_u16(&mut image, coff + 2, 1);
        put_u32(&mut image, coff + 4, 0x5F00_0000);
        put_u16(&mut image, coff + 16, 224);
        put_u16(&mut image, coff + 18, 0x0102);

        let opt = coff + 20;
        put_u16(&mut image, opt, 0x10b);
        put_u32(&mut image, opt + 8, raw_size as u32);
        put_u32(&mut image, opt + 16, SECTION_RVA);
        put_u32(&mut image, opt + 20, SECTION_RVA);
        put_u32(&mut image, opt + 24, SECTION_RVA);
        put_u32(&mut image, opt + 28, 0x0040_0000);
        put_u32(&mut image, opt + 32, 0x1000);
        put_u32(&mut image, opt + 36, 0x200);
        put_u16(&mut image, opt + 40, 6);
        put_u16(&mut image, opt + 48, 6);
        put_u32(&mut image, opt + 56, SECTION_RVA + align(raw_size, 0x1000) as u32);
        put_u32(&mut image, opt + 60, SECTION_FILE_OFFSET as u32);
        put_u16(&mut image, opt + 68, 2);
        put_u32(&mut image, opt + 72, 0x10_0000);
        put_u32(&mut image, opt + 76, 0x1000);
        put_u32(&mut image, opt + 80, 0x10_0000);
        put_u32(&mut image, opt + 84, 0x1000);
        put_u32(&mut image, opt + 92, 16);

        let data_dirs = opt + 96;
        if !rsrc.is_empty() {
            put_u32(&mut image, data_dirs + 2 * 8, SECTION_RVA);
            put_u32(&mut image, data_dirs + 2 * 8 + 4, rsrc.len() as u32);
        }

        let section = opt + 224;
        image[section..section + 5].copy_from_slice(b".rsrc");
        put_u32(&mut image, section + 8, rsrc.len() as u32);
        put_u32(&mut image, section + 12, SECTION_RVA);
        put_u32(&mut image, section + 16, raw_size as u32);
        put_u32(&mut image, section + 20, SECTION_FILE_OFFSET as u32);
        put_u32(&mut image, section + 36, 0x4000_0040);

        image[SECTION_FILE_OFFSET..SECTION_FILE_OFFSET + rsrc.len()].copy_from_slice(rsrc);
        image
    }

    pub(crate) fn sample_resources() -> Vec<Res> {
        vec![
            Res {
                ty: Key::Id(3),
                name: Key::Id(5),
                lang: 1033,
                data: vec![0xAA; 40],
            },
            Res {
                ty: Key::Id(3),
                name: Key::Id(6),
                lang: 1033,
                data: vec![0xBB; 24],
            },
            Res {
                ty: Key::Id(24),
                name: Key::Id(1),
                lang: 1033,
                data: b"<assembly/>".to_vec(),
            },
            Res {
                ty: Key::Name("MYDATA"),
                name: Key::Name("config/main"),
                lang: 0,
                data: b"payload".to_vec(),
            },
        ]
    }

    fn parse(image: Vec<u8>) -> PeViewerModel {
        PeViewerModel::parse(PathBuf::from("sample.exe"), image).unwrap()
    }

    #[test]
    fn test_resource_file_name() {
        assert_eq!(resource_file_name("RT_ICON", "5", 1033), "5_1033.ico");
        assert_eq!(resource_file_name("RT_GROUP_ICON", "1", 0), "1_0.group_ico");
        assert_eq!(resource_file_name("Unknown (99)", "7", 1033), "7_1033.bin");
        assert_eq!(resource_file_name("RT_RCDATA", "a/b", 0), "a_b_0.bin");
    }

    #[test]
    fn test_resource_type_names() {
        assert_eq!(resource_type_name(3), "RT_ICON");
        assert_eq!(resource_type_name(24), "RT_MANIFEST");
        assert_eq!(resource_type_name(99), "Unknown (99)");
    }

    #[test]
    fn test_summary_fields() {
        let model = parse(build_image(&resource_section(&sample_resources())));
        let summary = model.summary();

        assert_eq!(summary.pe_header_offset, PE_OFFSET as u32);
        assert_eq!(summary.machine_name, "x86");
        assert_eq!(summary.number_of_sections, 1);
        assert_eq!(summary.sections[0].name, ".rsrc");
        assert_eq!(summary.sections[0].virtual_address, SECTION_RVA);
        assert_eq!(summary.image_base, 0x0040_0000);
        assert_eq!(summary.subsystem, Some(2));
        assert!(!summary.is_64);
        assert!(!summary.is_dll);
    }

    #[test]
    fn test_lists_resources_in_walk_order() {
        let model = parse(build_image(&resource_section(&sample_resources())));

        let names: Vec<_> = model.list_resources().iter().map(|r| r.file_name.as_str()).collect();
        assert_eq!(names, vec!["config_main_0.bin", "5_1033.ico", "6_1033.ico", "1_1033.mf"]);

        let custom = &model.list_resources()[0];
        assert_eq!(custom.type_name, "MYDATA");
        assert_eq!(custom.resource_name, "config/main");
        assert_eq!(model.skipped_entries(), 0);

        assert_eq!(model.get_resource_bytes("5_1033.ico").unwrap(), &[0xAA; 40][..]);
        assert_eq!(model.get_resource_bytes("1_1033.mf").unwrap(), b"<assembly/>");
        assert!(matches!(
            model.get_resource_bytes("missing.bin"),
            Err(ViewerError::EntryNotFound(_))
        ));
    }

    #[test]
    fn test_colliding_names_get_counter() {
        let resources = vec![
            Res {
                ty: Key::Id(10),
                name: Key::Name("dup"),
                lang: 0,
                data: b"one".to_vec(),
            },
            Res {
                ty: Key::Id(10),
                name: Key::Name("dup"),
                lang: 0,
                data: b"two".to_vec(),
            },
            Res {
                ty: Key::Id(10),
                name: Key::Name("dup"),
                lang: 0,
                data: b"three".to_vec(),
            },
        ];
        let model = parse(build_image(&resource_section(&resources)));

        let names: Vec<_> = model.list_resources().iter().map(|r| r.file_name.as_str()).collect();
        assert_eq!(names, vec!["dup_0.bin", "dup_0 (1).bin", "dup_0 (2).bin"]);
        assert_eq!(model.get_resource_bytes("dup_0 (2).bin").unwrap(), b"three");
    }

    #[test]
    fn test_bad_data_entry_is_skipped() {
        let mut rsrc = resource_section(&sample_resources());

        // Find the data entry of 5_1033.ico by the RVA it stores.
        let model = parse(build_image(&rsrc));
        let target = model.list_resources()[1].data_offset - SECTION_FILE_OFFSET;
        let entry_at = rsrc
            .chunks_exact(4)
            .position(|w| w == (SECTION_RVA + target as u32).to_le_bytes())
            .unwrap()
            * 4;
        put_u32(&mut rsrc, entry_at, 0x00FF_0000);

        let model = parse(build_image(&rsrc));
        assert_eq!(model.skipped_entries(), 1);
        assert_eq!(model.list_resources().len(), 3);
        assert!(model.list_resources().iter().all(|r| r.file_name != "5_1033.ico"));
    }

    #[test]
    fn test_bad_subdirectory_is_skipped() {
        let mut rsrc = resource_section(&sample_resources());
        // Root entry 0 is the named type; send its subdirectory past the end.
        put_u32(&mut rsrc, DIRECTORY_HEADER_LEN + 4, HIGH_BIT | 0x00FF_FFF0);

        let model = parse(build_image(&rsrc));
        assert_eq!(model.skipped_entries(), 1);
        let names: Vec<_> = model.list_resources().iter().map(|r| r.file_name.as_str()).collect();
        assert_eq!(names, vec!["5_1033.ico", "6_1033.ico", "1_1033.mf"]);
    }

    #[test]
    fn test_image_without_resources() {
        let model = parse(build_image(&[]));
        assert!(model.list_resources().is_empty());
        assert_eq!(model.skipped_entries(), 0);
    }

    #[test]
    fn test_not_a_pe_is_format_error() {
        let err = PeViewerModel::parse(PathBuf::from("x.exe"), b"PK\x03\x04 definitely not MZ".to_vec())
            .err()
            .unwrap();
        assert!(matches!(err, ViewerError::PeFormat { archive_fallback: None, .. }));
    }

    #[test]
    fn test_extract_all_resources_writes_every_file() {
        let model = parse(build_image(&resource_section(&sample_resources())));
        let dest = tempfile::TempDir::new().unwrap();

        let stats = model
            .extract_all_resources(dest.path(), &ExtractOptions::default())
            .unwrap();

        assert_eq!(stats.files_extracted, 4);
        assert_eq!(fs::read(dest.path().join("1_1033.mf")).unwrap(), b"<assembly/>");
        assert_eq!(fs::read(dest.path().join("config_main_0.bin")).unwrap(), b"payload");
    }
}
