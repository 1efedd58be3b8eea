//! Symbol demangling and language detection.
//!
//! Function names come out of DWARF either mangled (`DW_AT_linkage_name`) or
//! plain (`DW_AT_name`). The mangling scheme tells us the language:
//!
//! - **Rust**: legacy `_ZN...17h<hash>E` or v0 `_R...`
//! - **C++**: Itanium `_Z...`
//! - **C**: unmangled
//!
//! When the compilation unit records `DW_AT_language`, that wins over the
//! guess.

use gimli::constants;
use rustc_demangle::try_demangle;

use crate::error::DebuggerError;
use crate::types::{SymbolLanguage, SymbolName};

/// Create a `SymbolName` from a raw (possibly mangled) name.
///
/// `unit_language` is the language of the enclosing compilation unit, if
/// known.
pub(crate) fn make_symbol_name(raw: String, unit_language: Option<SymbolLanguage>) -> SymbolName
{
    let demangled = try_demangle(&raw).ok().map(|d| d.to_string());
    let language = unit_language.unwrap_or_else(|| guess_language(&raw));
    SymbolName::new(raw, demangled, language)
}

fn guess_language(raw: &str) -> SymbolLanguage
{
    if raw.starts_with("_R") || raw.starts_with("_ZN") || raw.contains("::") {
        SymbolLanguage::Rust
    } else if raw.starts_with("_Z") {
        SymbolLanguage::Cpp
    } else {
        SymbolLanguage::Unknown
    }
}

/// Map a `DW_AT_language` code onto the languages we tell apart.
pub(crate) fn language_from_dwarf(code: gimli::DwLang) -> Option<SymbolLanguage>
{
    match code {
        constants::DW_LANG_Rust => Some(SymbolLanguage::Rust),
        constants::DW_LANG_C_plus_plus
        | constants::DW_LANG_C_plus_plus_03
        | constants::DW_LANG_C_plus_plus_11
        | constants::DW_LANG_C_plus_plus_14 => Some(SymbolLanguage::Cpp),
        constants::DW_LANG_C89 | constants::DW_LANG_C | constants::DW_LANG_C99 | constants::DW_LANG_C11 => {
            Some(SymbolLanguage::C)
        }
        _ => None,
    }
}

/// Wrap a gimli error with what we were doing when it happened.
pub(crate) fn map_dwarf_error(context: &str, err: gimli::Error) -> DebuggerError
{
    DebuggerError::DebugInfo(format!("{context}: {err}"))
}
