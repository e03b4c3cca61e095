//! Layered configuration.
//!
//! Tiers, lowest to highest, merged field-by-field:
//! 1. **Defaults** - built in
//! 2. **Project** - `$CWD/treeport/config.yaml`
//! 3. **User** - `~/.treeport/config.yaml`
//! 4. **Explicit** - the file named by `TREEPORT_CONFIG_PATH` or `--config`
//! 5. **Environment** - `TREEPORT_DB_PATH`, `TREEPORT_MEDIA_DIR`
//!
//! Command-line flags are applied on top by the binary.
//!
//! ## Environment Variables
//! - `TREEPORT_CONFIG_PATH` - Explicit config file
//! - `TREEPORT_DB_PATH` - Database path
//! - `TREEPORT_MEDIA_DIR` - Media directory
//! - `TREEPORT_USER_DIR` - User config dir (default: `~/.treeport`)
//! - `TREEPORT_PROJECT_DIR` - Project config dir (default: `./treeport`)

mod loader;
mod merge;
mod types;

pub use loader::{ConfigLoader, ConfigPaths, ConfigTier};
pub use merge::{deep_merge, deep_merge_all};
pub use types::*;
