//! macOS platform implementation
//!
//! Raw `/dev/rdiskN` nodes are handled by the resolver; there is nothing to
//! release before or after a write.

use crate::Result;

pub(crate) fn prepare_device(path: &str) -> Result<()> {
    tracing::trace!("No device preparation needed on macOS for {}", path);
    Ok(())
}
