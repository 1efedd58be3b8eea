//! ELF image parsing and DWARF section loading.

use std::borrow::Cow;
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use gimli::{Dwarf, EndianArcSlice, RunTimeEndian, SectionId};
use object::{Object, ObjectSection, ObjectSegment};
use once_cell::sync::OnceCell;
use tracing::debug;

use crate::error::{DebuggerError, Result};
use crate::types::Address;

pub(crate) type OwnedReader = EndianArcSlice<RunTimeEndian>;
pub(crate) type OwnedDwarf = Dwarf<OwnedReader>;

const DWARF_SECTIONS: &[SectionId] = &[
    SectionId::DebugAbbrev,
    SectionId::DebugAddr,
    SectionId::DebugInfo,
    SectionId::DebugLine,
    SectionId::DebugLineStr,
    SectionId::DebugRanges,
    SectionId::DebugRngLists,
    SectionId::DebugStr,
    SectionId::DebugStrOffsets,
    SectionId::DebugTypes,
    SectionId::DebugLoc,
    SectionId::DebugLocLists,
];

fn load_section_bytes(file: &object::File<'_>, name: &str) -> Result<Arc<[u8]>>
{
    let Some(section) = file.section_by_name(name) else {
        return Ok(Arc::<[u8]>::from(Vec::new()));
    };
    let data = section
        .uncompressed_data()
        .map_err(|err| DebuggerError::DebugInfo(format!("failed to read {name}: {err}")))?;
    Ok(match data {
        Cow::Borrowed(bytes) => Arc::<[u8]>::from(bytes.to_vec()),
        Cow::Owned(vec) => vec.into(),
    })
}

/// An executable mapped into the debuggee, with its DWARF sections
///
/// Sections missing from the file are kept as empty buffers, so a stripped
/// binary loads fine and simply resolves nothing.
pub(crate) struct ElfImage
{
    path: PathBuf,
    endian: RunTimeEndian,
    slide: i64,
    runtime_range: (u64, u64),
    entry: u64,
    debug_sections: HashMap<&'static str, Arc<[u8]>>,
    dwarf_cache: OnceCell<OwnedDwarf>,
}

impl ElfImage
{
    /// Parse `path`, mapped so that its lowest segment starts at `load_address`.
    pub(crate) fn parse(path: &Path, load_address: u64) -> Result<Self>
    {
        let bytes = fs::read(path)?;
        let file = object::File::parse(&*bytes)
            .map_err(|err| DebuggerError::DebugInfo(format!("failed to parse {}: {err}", path.display())))?;
        if file.format() != object::BinaryFormat::Elf {
            return Err(DebuggerError::DebugInfo(format!("{} is not an ELF file", path.display())));
        }

        let endian = if file.is_little_endian() {
            RunTimeEndian::Little
        } else {
            RunTimeEndian::Big
        };

        let lowest = file.segments().map(|segment| segment.address()).min().unwrap_or(0);
        let highest = file
            .segments()
            .map(|segment| segment.address().saturating_add(segment.size()))
            .max()
            .unwrap_or(lowest);

        let slide = load_address.wrapping_sub(lowest) as i64;
        let runtime_start = load_address;
        let runtime_end = runtime_start.saturating_add(highest.saturating_sub(lowest));

        let mut sections = HashMap::new();
        for id in DWARF_SECTIONS {
            sections.insert(id.name(), load_section_bytes(&file, id.name())?);
        }

        let image = Self {
            path: path.to_path_buf(),
            endian,
            slide,
            runtime_range: (runtime_start, runtime_end),
            entry: file.entry(),
            debug_sections: sections,
            dwarf_cache: OnceCell::new(),
        };
        debug!(
            path = %path.display(),
            slide = format_args!("{slide:#x}"),
            has_debug_info = image.has_debug_info(),
            "loaded image"
        );
        Ok(image)
    }

    pub(crate) fn path(&self) -> &Path
    {
        &self.path
    }

    pub(crate) fn has_debug_info(&self) -> bool
    {
        self.debug_sections
            .get(SectionId::DebugInfo.name())
            .is_some_and(|data| !data.is_empty())
    }

    pub(crate) fn contains(&self, address: Address) -> bool
    {
        let addr = address.value();
        addr >= self.runtime_range.0 && addr < self.runtime_range.1
    }

    pub(crate) fn relocated_address(&self, vmaddr: u64) -> u64
    {
        if self.slide >= 0 {
            vmaddr.saturating_add(self.slide as u64)
        } else {
            vmaddr.saturating_sub(self.slide.unsigned_abs())
        }
    }

    /// Runtime address to the address the debug info talks about.
    pub(crate) fn file_address(&self, address: Address) -> Option<u64>
    {
        if !self.contains(address) {
            return None;
        }

        let value = address.value();
        if self.slide >= 0 {
            value.checked_sub(self.slide as u64)
        } else {
            value.checked_add(self.slide.unsigned_abs())
        }
    }

    /// Runtime address of the ELF entry point.
    pub(crate) fn entry_point(&self) -> Address
    {
        Address::new(self.relocated_address(self.entry))
    }

    pub(crate) fn dwarf(&self) -> Result<&OwnedDwarf>
    {
        self.dwarf_cache.get_or_try_init(|| {
            Dwarf::load(|section| Ok::<_, gimli::Error>(self.section_reader(section)))
                .map_err(|err| DebuggerError::DebugInfo(format!("failed to load DWARF: {err}")))
        })
    }

    fn section_reader(&self, id: SectionId) -> OwnedReader
    {
        let data = self
            .debug_sections
            .get(id.name())
            .cloned()
            .unwrap_or_else(|| Arc::<[u8]>::from(Vec::new()));
        EndianArcSlice::new(data, self.endian)
    }
}
