//! Address to function lookup over DWARF `.debug_info`.

use std::path::Path;

use gimli::{constants, AttributeValue, DebuggingInformationEntry, RangeIter, Reader, Unit, UnitOffset};
use once_cell::sync::OnceCell;
use tracing::debug;

use super::demangle::{language_from_dwarf, make_symbol_name, map_dwarf_error};
use super::image::{ElfImage, OwnedDwarf, OwnedReader};
use super::SymbolResolver;
use crate::error::{DebuggerError, Result};
use crate::types::{Address, FunctionDescriptor, SymbolLanguage, SymbolName};

/// Nesting limit when following `DW_AT_abstract_origin` / `DW_AT_specification`.
const MAX_ORIGIN_DEPTH: usize = 4;

/// Function lookup backed by the debuggee's own DWARF
///
/// ## Lookup
///
/// 1. runtime address -> file address (subtract the load slide)
/// 2. find the compilation unit whose ranges contain it
/// 3. inside it, the innermost `DW_TAG_subprogram` whose ranges contain it
/// 4. name it from `DW_AT_linkage_name` (demangled) or `DW_AT_name`
///
/// Units are parsed once, on the first lookup.
pub struct DwarfResolver
{
    image: ElfImage,
    units: OnceCell<Vec<Unit<OwnedReader>>>,
}

impl DwarfResolver
{
    /// Load the executable at `path` whose lowest segment is mapped at
    /// `load_address` in the debuggee.
    ///
    /// A binary without debug info loads fine and resolves nothing.
    ///
    /// # Errors
    ///
    /// `Io` if the file cannot be read, `DebugInfo` if it is not a parseable ELF.
    pub fn load(path: impl AsRef<Path>, load_address: Address) -> Result<Self>
    {
        let image = ElfImage::parse(path.as_ref(), load_address.value())?;
        Ok(Self {
            image,
            units: OnceCell::new(),
        })
    }

    #[must_use]
    pub fn path(&self) -> &Path
    {
        self.image.path()
    }

    /// `true` when the file carries a non-empty `.debug_info`.
    #[must_use]
    pub fn has_debug_info(&self) -> bool
    {
        self.image.has_debug_info()
    }

    /// Runtime address of the program entry point.
    #[must_use]
    pub fn entry_point(&self) -> Address
    {
        self.image.entry_point()
    }

    /// Function containing `address`, surfacing DWARF parse failures.
    ///
    /// # Errors
    ///
    /// `DebugInfo` when the DWARF is malformed.
    pub fn find_function(&self, address: Address) -> Result<Option<FunctionDescriptor>>
    {
        let Some(file_address) = self.image.file_address(address) else {
            return Ok(None);
        };
        let dwarf = self.image.dwarf()?;

        for unit in self.units()? {
            let ranges = dwarf
                .unit_ranges(unit)
                .map_err(|err| map_dwarf_error("reading unit ranges", err))?;
            if containing_range(ranges, file_address)?.is_none() {
                continue;
            }
            if let Some(function) = self.function_in_unit(dwarf, unit, file_address)? {
                return Ok(Some(function));
            }
        }
        Ok(None)
    }

    fn units(&self) -> Result<&[Unit<OwnedReader>]>
    {
        let units = self.units.get_or_try_init(|| {
            let dwarf = self.image.dwarf()?;
            let mut units = Vec::new();
            let mut headers = dwarf.units();
            while let Some(header) = headers
                .next()
                .map_err(|err| map_dwarf_error("reading .debug_info unit header", err))?
            {
                units.push(
                    dwarf
                        .unit(header)
                        .map_err(|err| map_dwarf_error("parsing compilation unit", err))?,
                );
            }
            debug!(path = %self.image.path().display(), units = units.len(), "parsed compilation units");
            Ok::<_, DebuggerError>(units)
        })?;
        Ok(units)
    }

    fn function_in_unit(
        &self,
        dwarf: &OwnedDwarf,
        unit: &Unit<OwnedReader>,
        file_address: u64,
    ) -> Result<Option<FunctionDescriptor>>
    {
        let mut language = None;
        let mut innermost: Option<(UnitOffset<usize>, (u64, u64))> = None;

        let mut cursor = unit.entries();
        while let Some((_delta, entry)) = cursor.next_dfs().map_err(|err| map_dwarf_error("traversing DIE tree", err))? {
            match entry.tag() {
                constants::DW_TAG_compile_unit => {
                    if let Some(AttributeValue::Language(code)) = entry
                        .attr_value(constants::DW_AT_language)
                        .map_err(|err| map_dwarf_error("reading DW_AT_language", err))?
                    {
                        language = language_from_dwarf(code);
                    }
                }
                constants::DW_TAG_subprogram => {
                    let ranges = dwarf
                        .die_ranges(unit, entry)
                        .map_err(|err| map_dwarf_error("reading subprogram ranges", err))?;
                    // depth-first order: a nested match always comes after its parent
                    if let Some(range) = containing_range(ranges, file_address)? {
                        innermost = Some((entry.offset(), range));
                    }
                }
                _ => {}
            }
        }

        let Some((offset, (low, high))) = innermost else {
            return Ok(None);
        };
        let entry = unit
            .entry(offset)
            .map_err(|err| map_dwarf_error("re-reading subprogram", err))?;
        let name = self
            .function_name(dwarf, unit, &entry, language, 0)?
            .unwrap_or_else(|| SymbolName::new(format!("<unknown@{low:#x}>"), None, SymbolLanguage::Unknown));

        Ok(Some(FunctionDescriptor {
            name,
            low_pc: Address::new(self.image.relocated_address(low)),
            high_pc: Address::new(self.image.relocated_address(high)),
            compilation_unit: unit
                .name
                .as_ref()
                .and_then(|name| name.to_string_lossy().ok())
                .map(|name| name.into_owned()),
        }))
    }

    fn function_name(
        &self,
        dwarf: &OwnedDwarf,
        unit: &Unit<OwnedReader>,
        entry: &DebuggingInformationEntry<'_, '_, OwnedReader>,
        language: Option<SymbolLanguage>,
        depth: usize,
    ) -> Result<Option<SymbolName>>
    {
        for attribute in [
            constants::DW_AT_linkage_name,
            constants::DW_AT_MIPS_linkage_name,
            constants::DW_AT_name,
        ] {
            if let Some(attr) = entry
                .attr(attribute)
                .map_err(|err| map_dwarf_error("reading function name", err))?
            {
                let raw = attr_to_string(dwarf, unit, attr.value())?;
                return Ok(Some(make_symbol_name(raw, language)));
            }
        }

        if depth >= MAX_ORIGIN_DEPTH {
            return Ok(None);
        }
        for attribute in [constants::DW_AT_abstract_origin, constants::DW_AT_specification] {
            if let Some(AttributeValue::UnitRef(offset)) = entry
                .attr_value(attribute)
                .map_err(|err| map_dwarf_error("reading function origin", err))?
            {
                let origin = unit
                    .entry(offset)
                    .map_err(|err| map_dwarf_error("reading function origin", err))?;
                return self.function_name(dwarf, unit, &origin, language, depth + 1);
            }
        }
        Ok(None)
    }
}

impl SymbolResolver for DwarfResolver
{
    fn resolve(&self, address: Address) -> Option<FunctionDescriptor>
    {
        match self.find_function(address) {
            Ok(function) => function,
            Err(err) => {
                debug!(%address, error = %err, "symbol lookup failed");
                None
            }
        }
    }
}

/// The `[begin, end)` range containing `address`, if any.
fn containing_range(mut ranges: RangeIter<OwnedReader>, address: u64) -> Result<Option<(u64, u64)>>
{
    while let Some(range) = ranges.next().map_err(|err| map_dwarf_error("iterating ranges", err))? {
        if range.begin <= address && address < range.end {
            return Ok(Some((range.begin, range.end)));
        }
    }
    Ok(None)
}

fn attr_to_string(dwarf: &OwnedDwarf, unit: &Unit<OwnedReader>, value: AttributeValue<OwnedReader>) -> Result<String>
{
    let reader = dwarf
        .attr_string(unit, value)
        .map_err(|err| map_dwarf_error("resolving DWARF string", err))?;
    let owned = match reader.to_string() {
        Ok(cow) => cow.into_owned(),
        Err(_) => reader
            .to_string_lossy()
            .map_err(|err| map_dwarf_error("decoding DWARF string", err))?
            .into_owned(),
    };
    Ok(owned)
}
