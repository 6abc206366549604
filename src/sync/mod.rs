//! Snapshot bootstrap and incremental update application

mod applier;
mod bootstrap;
mod source;

pub use applier::{ApplyOutcome, UpdateApplier};
pub use bootstrap::{InstallOutcome, SnapshotBootstrapper};
pub use source::{RestSnapshotClient, SnapshotSource};

#[cfg(test)]
pub(crate) use source::MockSnapshotSource;
