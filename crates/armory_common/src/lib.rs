//! Armory Common - catalog, manifest pipeline, repository state and planning
//!
//! Everything here is synchronous and free of terminal output; the
//! `armoryctl` crate owns argument parsing and rendering.

pub mod apt;
pub mod atomic;
pub mod catalog;
pub mod config;
pub mod error;
pub mod lock;
pub mod manifest;
pub mod os_release;
pub mod paths;
pub mod planner;
pub mod repository;

pub use catalog::{Catalog, Category, RepositorySource, ToolEntry, UpdatePolicy, VersionInfo};
pub use config::ArmoryConfig;
pub use error::{ArmoryError, ErrorKind, Result};
pub use manifest::{
    ManifestOrigin, ManifestPipeline, PipelineOptions, PipelineReport, PipelineWarning,
    UpdateStatus,
};
pub use planner::{InstallPlan, PlanOptions, Planner};
pub use repository::{
    DisableOutcome, EnableOutcome, RepositoryManager, RepositoryProbe, RepositoryStatus,
};
