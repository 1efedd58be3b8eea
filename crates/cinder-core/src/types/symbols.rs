//! Symbol types returned by the function resolver.

use std::fmt;

use super::Address;

/// Programming language associated with a symbol.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SymbolLanguage
{
    /// Rust symbol (detected via mangling or namespace patterns).
    Rust,
    /// C++ symbol (Itanium mangling without Rust extensions).
    Cpp,
    /// C symbol or unmangled global.
    C,
    /// Unknown or mixed language.
    Unknown,
}

impl fmt::Display for SymbolLanguage
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result
    {
        let label = match self {
            SymbolLanguage::Rust => "rust",
            SymbolLanguage::Cpp => "c++",
            SymbolLanguage::C => "c",
            SymbolLanguage::Unknown => "unknown",
        };
        write!(f, "{label}")
    }
}

/// A function name with demangling metadata.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SymbolName
{
    raw: String,
    demangled: Option<String>,
    language: SymbolLanguage,
}

impl SymbolName
{
    #[must_use]
    pub fn new(raw: String, demangled: Option<String>, language: SymbolLanguage) -> Self
    {
        Self {
            raw,
            demangled,
            language,
        }
    }

    /// Name as stored in the debug info (possibly mangled).
    #[must_use]
    pub fn raw(&self) -> &str
    {
        &self.raw
    }

    #[must_use]
    pub fn demangled(&self) -> Option<&str>
    {
        self.demangled.as_deref()
    }

    /// Preferred presentation (demangled, falling back to raw).
    #[must_use]
    pub fn display_name(&self) -> &str
    {
        self.demangled.as_deref().unwrap_or(&self.raw)
    }

    #[must_use]
    pub fn language(&self) -> SymbolLanguage
    {
        self.language
    }
}

impl fmt::Display for SymbolName
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result
    {
        write!(f, "{}", self.display_name())
    }
}

/// Function that encloses a program counter
///
/// Addresses are runtime addresses in the debuggee (load bias applied).
/// `high_pc` is exclusive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FunctionDescriptor
{
    pub name: SymbolName,
    pub low_pc: Address,
    pub high_pc: Address,
    /// Name of the compilation unit (`DW_AT_name` of the CU), when present
    pub compilation_unit: Option<String>,
}

impl FunctionDescriptor
{
    /// `true` if `address` lies inside `[low_pc, high_pc)`.
    #[must_use]
    pub fn contains(&self, address: Address) -> bool
    {
        self.low_pc <= address && address < self.high_pc
    }

    /// Byte offset of `address` from the function entry.
    #[must_use]
    pub fn offset_of(&self, address: Address) -> Option<u64>
    {
        self.contains(address).then(|| address.value() - self.low_pc.value())
    }
}

impl fmt::Display for FunctionDescriptor
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result
    {
        write!(f, "{} [{:#x}..{:#x})", self.name, self.low_pc, self.high_pc)?;
        if let Some(unit) = &self.compilation_unit {
            write!(f, " in {unit}")?;
        }
        Ok(())
    }
}
