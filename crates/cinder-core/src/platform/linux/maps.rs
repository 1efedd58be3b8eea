//! Load address discovery from `/proc/<pid>/maps`.

use std::path::Path;

use proc_maps::{get_process_maps, MapRange};
use tracing::debug;

use crate::error::{DebuggerError, Result};
use crate::types::{Address, ProcessId};

/// Runtime address of the first segment of `executable` in process `pid`.
///
/// This is the start of the lowest mapping of the file at file offset 0. For a
/// non-PIE executable it equals the link address, so the slide is zero.
///
/// # Errors
///
/// `Io` if the maps file cannot be read, `InvalidArgument` if no mapping of
/// `executable` exists.
pub fn load_bias(pid: ProcessId, executable: &Path) -> Result<Address>
{
    let maps = get_process_maps(pid.raw())?;
    let start = lowest_image_start(&maps, executable)
        .ok_or_else(|| DebuggerError::InvalidArgument(format!("{} is not mapped in process {pid}", executable.display())))?;
    debug!(%pid, executable = %executable.display(), load_address = format_args!("{start:#x}"), "found load bias");
    Ok(Address::new(start))
}

fn lowest_image_start(maps: &[MapRange], executable: &Path) -> Option<u64>
{
    maps.iter()
        .filter(|range| range.offset == 0 && range.filename() == Some(executable))
        .map(|range| range.start() as u64)
        .min()
}
