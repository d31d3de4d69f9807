//! Helper command names.

use thiserror::Error;

/// A helper command.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Command {
    Version,
    Ping,
    CreateContainer,
    StartContainer,
    StopContainer,
    RemoveContainer,
    InspectContainer,
    ListContainers,
    ContainerLogs,
    ContainerStats,
    CreateNetwork,
    RemoveNetwork,
    ConnectNetwork,
    DisconnectNetwork,
    CreateVolume,
    RemoveVolume,
    PullImage,
    ImageExists,
}

impl Command {
    pub const ALL: [Command; 18] = [
        Self::Version,
        Self::Ping,
        Self::CreateContainer,
        Self::StartContainer,
        Self::StopContainer,
        Self::RemoveContainer,
        Self::InspectContainer,
        Self::ListContainers,
        Self::ContainerLogs,
        Self::ContainerStats,
        Self::CreateNetwork,
        Self::RemoveNetwork,
        Self::ConnectNetwork,
        Self::DisconnectNetwork,
        Self::CreateVolume,
        Self::RemoveVolume,
        Self::PullImage,
        Self::ImageExists,
    ];

    /// Name as passed on the helper command line.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Version => "version",
            Self::Ping => "ping",
            Self::CreateContainer => "create-container",
            Self::StartContainer => "start-container",
            Self::StopContainer => "stop-container",
            Self::RemoveContainer => "remove-container",
            Self::InspectContainer => "inspect-container",
            Self::ListContainers => "list-containers",
            Self::ContainerLogs => "container-logs",
            Self::ContainerStats => "container-stats",
            Self::CreateNetwork => "create-network",
            Self::RemoveNetwork => "remove-network",
            Self::ConnectNetwork => "connect-network",
            Self::DisconnectNetwork => "disconnect-network",
            Self::CreateVolume => "create-volume",
            Self::RemoveVolume => "remove-volume",
            Self::PullImage => "pull-image",
            Self::ImageExists => "image-exists",
        }
    }

    /// Whether the command mutates runtime state.
    pub fn is_mutating(&self) -> bool {
        !matches!(
            self,
            Self::Version
                | Self::Ping
                | Self::InspectContainer
                | Self::ListContainers
                | Self::ContainerLogs
                | Self::ContainerStats
                | Self::ImageExists
        )
    }
}

impl std::fmt::Display for Command {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("unknown helper command: {0}")]
pub struct UnknownCommand(pub String);

impl std::str::FromStr for Command {
    type Err = UnknownCommand;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|c| c.as_str() == s)
            .ok_or_else(|| UnknownCommand(s.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_names_parse_back() {
        for command in Command::ALL {
            assert_eq!(command.as_str().parse::<Command>().unwrap(), command);
        }
        assert!("exec".parse::<Command>().is_err());
    }

    #[test]
    fn test_mutating() {
        assert!(Command::CreateContainer.is_mutating());
        assert!(!Command::ContainerStats.is_mutating());
    }
}
