//! Autoupdate - resumable, verified self-update engine
//!
//! Embed [`engine::UpdateSession`] in an application, or run the
//! `autoupdate` binary beside it.

pub mod engine;
