//! `restore-driver` — runs the external catalog restore tool.
//!
//! The tool is a separate executable that restores a backup artifact into a
//! catalog server. It offers no structured result, so this crate owns both
//! halves of the contract:
//!
//! ```text
//! RestoreInvocation
//!     │
//!     ▼
//! RestoreTool::run      ← spawns `<tool> --oauth2-token … <server> <artifact>`
//!     │                    collects stderr + stdout
//!     ▼
//! parse_restored_catalog ← fixed marker protocol → catalog id
//! ```

pub mod error;
pub mod process;
pub mod protocol;


pub use error::RestoreError;
pub use process::{RestoreInvocation, RestoreTool};
pub use protocol::{parse_restored_catalog, START_MARKER, SUCCESS_MARKER};

/// Convenience `Result` alias for this crate.
pub type Result<T> = std::result::Result<T, RestoreError>;

/// Run the tool and return the restored catalog identifier.
pub fn restore(tool: &RestoreTool, invocation: &RestoreInvocation) -> Result<i64> {
    let output = tool.run(invocation)?;
    parse_restored_catalog(&output)
}
