//! Self-Update Pipeline
//!
//! Components:
//! - `manifest` - Remote version descriptor
//! - `version_record` - Local record of the installed version
//! - `download` - HTTP download with resume
//! - `verify` - Checksum verification
//! - `install` - Archive extraction and executable replacement
//! - `state` - Session state machine and exit contract
//! - `session` - Orchestrator

pub mod error;
pub mod state;
pub mod manifest;
pub mod version_record;
pub mod download;
pub mod verify;
pub mod install;
pub mod session;

pub use error::UpdateError;
pub use manifest::VersionManifest;
pub use session::UpdateSession;
pub use state::{ExitStatus, SessionOutcome, SessionPhase};
pub use version_record::LocalVersionRecord;
