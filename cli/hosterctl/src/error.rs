//! Error display for the CLI.

use colored::Colorize;
use hoster_control_plane::ScheduleError;
use hoster_model::{ErrorClass, TransitionError};
use hoster_networking::NetworkError;
use hoster_node_pool::{ClientError, PoolError};

/// Category of a known error, if the chain contains one.
pub fn classify(err: &anyhow::Error) -> Option<ErrorClass> {
    err.chain().find_map(|cause| {
        if let Some(e) = cause.downcast_ref::<ScheduleError>() {
            Some(e.class())
        } else if let Some(e) = cause.downcast_ref::<TransitionError>() {
            Some(e.class())
        } else if let Some(e) = cause.downcast_ref::<PoolError>() {
            Some(e.class())
        } else if let Some(e) = cause.downcast_ref::<ClientError>() {
            Some(e.class())
        } else if let Some(e) = cause.downcast_ref::<NetworkError>() {
            Some(match e {
                NetworkError::PortsExhausted { .. } => ErrorClass::Capacity,
                _ => ErrorClass::Input,
            })
        } else {
            None
        }
    })
}

/// Print an error in a user-friendly format.
pub fn print_error(err: &anyhow::Error) {
    eprintln!("{} {:#}", "Error:".red().bold(), err);

    let hint = match classify(err) {
        Some(ErrorClass::Capacity) => "Hint: no node can take this request right now; free capacity or relax constraints.",
        Some(ErrorClass::Connectivity) => "Hint: the node could not be reached; this is usually transient, retry later.",
        Some(ErrorClass::State) => "Hint: run `hosterctl transitions` to list legal transitions.",
        _ => return,
    };
    eprintln!("\n{}", hint.yellow());
}
