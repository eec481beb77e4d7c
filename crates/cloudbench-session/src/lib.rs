//! CloudBench Session - the embeddable session controller
//!
//! [`Session`] is the single entry point a host embeds: it owns the loaded
//! layers, validates every request up front, and runs the heavy work
//! (file reads, pipeline execution, exports, database transfers) on
//! dedicated workers. One worker runs per operation kind at a time; a new
//! request of the same kind cancels and replaces the in-flight one, and
//! superseded results are discarded silently so the host only ever sees
//! one completion per kind. Outcomes stream to the host as
//! [`SessionEvent`]s.

pub mod events;
pub mod session;

pub use events::{group_digits, LogLevel, OpKind, ProgressUpdate, SessionEvent};
pub use session::{ModelParams, Session, SessionDeps};
