//! Platform abstraction: metrics sources, path layout strategies, and
//! external tool invocation.

pub mod layout;
pub mod pal;
pub mod process;
