//! pbxadm Core - configuration mutation engine
//!
//! This crate parses the telephony engine's section-based configuration
//! files, locates the stanzas belonging to one logical entity, plans
//! surgical edits, snapshots and atomically commits the result, and asks
//! the engine to reload the affected subsystem.
//!
//! Unix only: commits apply owner/group and permission bits.

#![forbid(unsafe_code)]
#![warn(clippy::all, clippy::pedantic)]

pub mod backup;
pub mod commit;
pub mod diff;
pub mod document;
pub mod entity;
pub mod error;
pub mod locate;
pub mod lock;
pub mod plan;
pub mod reload;
pub mod response;
pub mod settings;
pub mod util;

pub use backup::{BackupManager, BackupRecord};
pub use commit::{FileOwnership, WriteCommitter};
pub use document::{ConfigDocument, ParseError, SectionStanza, StanzaRole};
pub use entity::{
    EntityKind, EntityRegistry, ManagedFile, OperationOutcome, OperationState, OperationType,
};
pub use error::{AdminError, AdminResult};
pub use plan::{InsertionPoint, MutationPlanner, NewStanza, Patch};
pub use reload::{ReloadDispatcher, ReloadError, ReloadResult, Subsystem};
pub use response::Envelope;
pub use settings::AdminSettings;
