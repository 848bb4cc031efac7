//! Sextant build orchestration
//!
//! Drives the external Buck-style build tool to produce per-target source
//! databases, merges them into one build map, and keeps the artifact
//! symlink tree in sync across incremental rebuilds. Provides:
//! - [`RawCommand`] / [`RawBuildTool`]: the subprocess seam, with
//!   reproducible errors carrying a bounded diagnostic tail
//! - [`BuildInterface`] flavors for tool versions 1 and 2, plus the lazy
//!   working-set flavor
//! - [`Builder`] and [`LazyBuilder`]: full, incremental, fast-incremental,
//!   and restore operations returning artifact path events for the module
//!   tracker

pub mod builder;
pub mod error;
pub mod interface;
pub mod raw;
pub mod source_db;
pub mod target;

pub use builder::{BuildOutcome, BuildStats, Builder, LazyBuilder};
pub use error::{BuildError, BuildResult};
pub use interface::{
    BuildInterface, ConstructedBuildMap, LazyBuildInterface, LazyInterface, V1Interface,
    V2Interface,
};
pub use raw::{RawBuildTool, RawCommand, ToolError, LOG_TAIL_LINE_COUNT};
pub use source_db::{MergedSourceDb, HOUSEKEEPING_FILE_NAMES};
pub use target::{BuildTarget, ChangedTargets};
