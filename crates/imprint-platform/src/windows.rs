//! Windows platform implementation
//!
//! Windows keeps mounted volumes locked on a physical drive and will refuse
//! raw writes to their sectors. Preparation dismounts every volume on the
//! drive, both before the image is streamed in and after it has been written
//! so Explorer picks up the new layout.

use crate::{PlatformError, Result};
use std::process::Command;

/// Dismount all volumes on a physical drive.
pub(crate) fn prepare_device(path: &str) -> Result<()> {
    let device_path = normalize_windows_path(path);

    let Some(drive_num) = physical_drive_number(&device_path) else {
        tracing::debug!("{} is not a physical drive, nothing to dismount", path);
        return Ok(());
    };

    tracing::debug!("Dismounting volumes on PhysicalDrive{}", drive_num);

    let output = Command::new("powershell")
        .args([
            "-NoProfile",
            "-Command",
            &format!(
                "Get-Disk -Number {} | Get-Partition | ForEach-Object {{ \
                    if ($_.DriveLetter) {{ \
                        Dismount-Volume -DriveLetter $_.DriveLetter -Force \
                    }} \
                }}",
                drive_num
            ),
        ])
        .output();

    match output {
        Ok(out) if out.status.success() => {
            std::thread::sleep(std::time::Duration::from_millis(100));
            Ok(())
        }
        Ok(out) => {
            let stderr = String::from_utf8_lossy(&out.stderr);
            if stderr.contains("not found") || stderr.trim().is_empty() {
                // No volumes to dismount
                Ok(())
            } else {
                Err(PlatformError::UnmountFailed(stderr.to_string()))
            }
        }
        Err(e) => Err(PlatformError::CommandFailed(format!(
            "Failed to run PowerShell: {}",
            e
        ))),
    }
}

/// Normalize a device path for Windows
///
/// - "1" or "PhysicalDrive1" -> "\\.\PhysicalDrive1"
/// - "\\.\PhysicalDrive1" -> unchanged
fn normalize_windows_path(path: &str) -> String {
    if path.starts_with("\\\\.\\") {
        path.to_string()
    } else if path.starts_with("PhysicalDrive") {
        format!("\\\\.\\{}", path)
    } else if let Ok(n) = path.parse::<u32>() {
        format!("\\\\.\\PhysicalDrive{}", n)
    } else {
        path.to_string()
    }
}

fn physical_drive_number(device_path: &str) -> Option<u32> {
    device_path
        .strip_prefix("\\\\.\\PhysicalDrive")?
        .parse::<u32>()
        .ok()
}
