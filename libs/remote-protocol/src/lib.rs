//! Remote node command protocol.
//!
//! Nodes whose container runtime is reached by command execution run a single helper
//! executable:
//!
//! ```text
//! hoster-helper <command> [args...]   < optional JSON request on stdin
//! ```
//!
//! The helper always writes exactly one JSON object to stdout and exits `0` on success,
//! `1` on failure and `2` on usage errors.
//!
//! # Envelope
//!
//! ```text
//! {"success": true, "data": <payload>}
//! {"success": false, "command": "start-container", "error_code": "not_found", "message": "..."}
//! ```

mod command;
mod envelope;
mod payload;

pub use command::{Command, UnknownCommand};
pub use envelope::{Envelope, ErrorCode, RemoteError};
pub use payload::*;

/// Exit status for a successful command.
pub const EXIT_SUCCESS: i32 = 0;

/// Exit status for a failed command (envelope carries the error).
pub const EXIT_FAILURE: i32 = 1;

/// Exit status for a usage error (unknown command, bad arguments).
pub const EXIT_USAGE: i32 = 2;

