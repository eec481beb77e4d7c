//! The event vocabulary the session emits toward its host.
//!
//! Every observable outcome of an operation travels through one unbounded
//! channel as a [`SessionEvent`]: log lines for the host's console, progress
//! transitions for its busy indicator, and the structured completion events
//! a host reacts to (layer list changes, render refreshes, finished
//! exports). A headless host can drive the whole session from this stream
//! alone.

use std::fmt;
use std::path::PathBuf;

use cloudbench_engine::StatsReport;

/// Severity of a [`SessionEvent::Log`] line
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    Info,
    Warning,
    Error,
}

/// Busy-indicator transitions.
///
/// Workers report `Indeterminate` when they start, `Percent(100)` on
/// success, and `Percent(0)` on failure; the session does not estimate
/// intermediate percentages.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProgressUpdate {
    Indeterminate,
    Percent(u8),
}

/// The operation families the session runs workers for.
///
/// Each kind owns one worker slot: dispatching a new operation of a kind
/// supersedes the in-flight one, while operations of different kinds run
/// concurrently.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OpKind {
    Read,
    Merge,
    Filter,
    Export,
    Stats,
    Model,
    DbImport,
    DbLoad,
}

impl OpKind {
    pub const ALL: [OpKind; 8] = [
        OpKind::Read,
        OpKind::Merge,
        OpKind::Filter,
        OpKind::Export,
        OpKind::Stats,
        OpKind::Model,
        OpKind::DbImport,
        OpKind::DbLoad,
    ];

    pub const COUNT: usize = Self::ALL.len();

    /// Stable worker-slot index
    pub(crate) fn slot_index(&self) -> usize {
        *self as usize
    }
}

impl fmt::Display for OpKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            OpKind::Read => "read",
            OpKind::Merge => "merge",
            OpKind::Filter => "filter",
            OpKind::Export => "export",
            OpKind::Stats => "stats",
            OpKind::Model => "model",
            OpKind::DbImport => "db import",
            OpKind::DbLoad => "db load",
        };
        f.write_str(name)
    }
}

/// One host-visible occurrence.
///
/// Events referring to a layer carry its cache key; the host resolves the
/// key against [`Session::layer`](crate::Session::layer) when it needs the
/// data behind it.
#[derive(Debug, Clone)]
pub enum SessionEvent {
    Log {
        level: LogLevel,
        message: String,
    },
    Progress(ProgressUpdate),
    /// A layer entered the session (file load, merge, or database load)
    LayerLoaded {
        key: String,
        name: String,
    },
    /// A layer left the session, or was replaced by a reload under the
    /// same key
    LayerRemoved {
        key: String,
    },
    /// A pipeline stage was appended to a layer
    StageAdded {
        key: String,
        name: String,
        details: String,
    },
    /// A layer's render buffers or style changed; re-read and repaint
    RenderUpdated {
        key: String,
    },
    StatsReady {
        key: String,
        stats: StatsReport,
    },
    ModelFinished {
        path: PathBuf,
        message: String,
    },
    ExportFinished {
        message: String,
    },
    DbImportFinished {
        message: String,
    },
    /// A dispatched worker failed. Exactly one per failed operation; the
    /// message has already been logged at error level.
    OperationFailed {
        kind: OpKind,
        message: String,
    },
}

/// `1234567` as `1,234,567`, the way counts appear in log lines
pub fn group_digits(n: u64) -> String {
    let digits = n.to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, ch) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(ch);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_group_digits() {
        assert_eq!(group_digits(0), "0");
        assert_eq!(group_digits(999), "999");
        assert_eq!(group_digits(1_000), "1,000");
        assert_eq!(group_digits(1_234_567), "1,234,567");
        assert_eq!(group_digits(25_000_000), "25,000,000");
    }

    #[test]
    fn test_slot_indices_are_dense() {
        for (expected, kind) in OpKind::ALL.iter().enumerate() {
            assert_eq!(kind.slot_index(), expected);
        }
        assert_eq!(OpKind::COUNT, 8);
    }

    #[test]
    fn test_kind_names() {
        assert_eq!(OpKind::Filter.to_string(), "filter");
        assert_eq!(OpKind::DbImport.to_string(), "db import");
    }
}
