//! Convenience re-exports for library consumers.
//!
//! ```rust,no_run
//! use mock_disk_full::prelude::*;
//! ```

// Core
pub use crate::core::config::Config;
pub use crate::core::errors::{MdfError, Result};
pub use crate::core::state::{OperationGate, Phase};

// Platform
pub use crate::platform::layout::{PosixLayout, VolumeLayout, WindowsLayout, detect_layout};
pub use crate::platform::pal::{MountEntry, Platform, VolumeUsage, detect_platform};
pub use crate::platform::process::{ProcessRunner, SystemProcessRunner};

// Catalog
pub use crate::catalog::{CatalogSnapshot, VolumeCatalog, VolumeInfo};

// Filler
pub use crate::filler::fill::{FillEngine, FillJob, FillMethod, FillReport};
pub use crate::filler::release::{ReleaseEngine, ReleaseReport};
pub use crate::filler::reserve::{DEFAULT_RESERVE_MARGIN_MB, ReserveCalculator};
