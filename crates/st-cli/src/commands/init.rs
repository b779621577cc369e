//! Init command for establishing device identity.

use std::io::Write;
use std::path::Path;

use anyhow::Result;

use crate::device;

/// Runs the init command.
pub fn run<W: Write>(writer: &mut W, data_dir: &Path, label: Option<&str>) -> Result<()> {
    let path = device::device_json_path(data_dir);
    let identity = device::init_device_at(&path, label)?;

    writeln!(writer, "Device ID: {}", identity.device_id)?;
    writeln!(writer, "Label:     {}", identity.label)?;
    writeln!(writer, "Saved to:  {}", path.display())?;

    Ok(())
}
