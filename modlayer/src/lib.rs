//! Modlayer - package deployment engine for shared content directories.
//!
//! Modlayer deploys independently-packaged content bundles ("packages")
//! into a single shared target directory, resolving path-level collisions
//! between packages. Two deployment strategies implement the same logical
//! contract — expose the highest-priority provider of every content path:
//!
//! - **Direct copy**: files are copied into the target; per-path ownership
//!   stacks record who provided what, so disabling a package re-exposes
//!   whatever it was shadowing.
//! - **Symlink overlay**: the target becomes a directory junction into a
//!   virtual overlay folder of symlinks, reconciled by a refresh job
//!   whenever enablement or priorities change.
//!
//! The engine is driven through [`service::DeployService`], which runs all
//! filesystem-heavy work on a background worker and serializes every
//! mutation of the persisted state.

pub mod deploy;
pub mod package;
pub mod platform;
pub mod service;
pub mod store;
pub mod telemetry;
