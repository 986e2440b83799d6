//! testgrid-space: capability space algebra and the requirement model.
//!
//! Both sides of a scheduling decision are expressed with the same types: a
//! test case's [`Requirement`] and an environment's [`EnvironmentSpace`]
//! capability are trees of [`CountRange`] and [`ChoiceSet`] values. The
//! [`Space`] trait gives every node of the tree the same three operations:
//! `check`, `intersect`, and `generate_minimum`.
//!
//! # Modules
//!
//! - [`check`]: `CheckResult`, `CheckMode`, `Checker`
//! - [`range`]: `CountRange`
//! - [`choice`]: `ChoiceSet`, `SetMode`, `SetSemantics`
//! - [`space`]: the `Space` trait
//! - [`os`]: `OsFamily` lineage table, `OsInfo`
//! - [`node`]: `NodeSpace`, `DiskSpace`, `NetworkSpace`
//! - [`environment`]: `EnvironmentSpace`
//! - [`requirement`]: `Requirement`, `RequiredStatus`
//! - [`error`]: `SpaceError` / `SpaceResult`

pub mod check;
pub mod choice;
pub mod environment;
pub mod error;
pub mod node;
pub mod os;
pub mod range;
pub mod requirement;
pub mod space;

pub use check::{CheckMode, CheckResult, Checker};
pub use choice::{ChoiceItem, ChoiceSet, SetMode, SetSemantics, WILDCARD};
pub use environment::EnvironmentSpace;
pub use error::{SpaceError, SpaceResult};
pub use node::{DataPath, DiskSpace, NetworkSpace, NodeSpace};
pub use os::{OsFamily, OsInfo};
pub use range::CountRange;
pub use requirement::{RequiredStatus, Requirement};
pub use space::Space;
