//! Transports for reaching a backup destination
//!
//! A destination is either co-located (direct pipe between the send and
//! receive processes) or remote, in which case the receive side runs through
//! an ssh session with key-based authentication and strict host-key checking.
//!
//! The wire format for a remote transport is `ssh:<user>@<host>[:<port>]`,
//! with the port defaulting to 22. The literal `local` selects the co-located
//! transport.

pub mod pipe;
pub mod verify;

use std::fmt;
use std::path::Path;
use std::process::Command;
use std::str::FromStr;

use serde::Deserialize;

use crate::error::{BackupError, BackupResult};

pub use pipe::TransportPipe;
pub use verify::VerificationProbe;

/// Default ssh port when the transport address omits one
pub const DEFAULT_SSH_PORT: u16 = 22;

/// How a snapshot stream or query reaches a destination
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(try_from = "String")]
pub enum Transport {
    /// Producer and consumer run on this host, joined by a direct pipe
    Local,
    /// Consumer runs on the destination host through an ssh session
    Remote {
        user: String,
        host: String,
        port: u16,
    },
}

impl Transport {
    /// True for the co-located transport
    pub fn is_local(&self) -> bool {
        matches!(self, Transport::Local)
    }

    /// The fixed ssh argument prefix for a remote transport
    ///
    /// Key-based authentication only, strict host-key checking on. Returns
    /// `None` for the local transport.
    pub fn ssh_args(&self) -> Option<Vec<String>> {
        match self {
            Transport::Local => None,
            Transport::Remote { user, host, port } => Some(vec![
                "-o".to_string(),
                "PreferredAuthentications=publickey".to_string(),
                "-o".to_string(),
                "PubkeyAuthentication=yes".to_string(),
                "-o".to_string(),
                "StrictHostKeyChecking=yes".to_string(),
                "-p".to_string(),
                port.to_string(),
                "-l".to_string(),
                user.clone(),
                host.clone(),
            ]),
        }
    }
}

impl FromStr for Transport {
    type Err = BackupError;

    fn from_str(s: &str) -> BackupResult<Self> {
        if s.eq_ignore_ascii_case("local") {
            return Ok(Transport::Local);
        }
        let mut parts = s.splitn(3, ':');
        let scheme = parts.next().unwrap_or_default();
        if !scheme.eq_ignore_ascii_case("ssh") {
            return Err(BackupError::Config(format!(
                "invalid transport {:?}: expected 'local' or 'ssh:user@host[:port]'",
                s
            )));
        }
        let target = parts.next().filter(|t| !t.is_empty()).ok_or_else(|| {
            BackupError::Config(format!("invalid ssh transport {:?}: missing user@host", s))
        })?;
        let (user, host) = target
            .split_once('@')
            .filter(|(u, h)| !u.is_empty() && !h.is_empty())
            .ok_or_else(|| {
                BackupError::Config(format!(
                    "invalid ssh transport {:?}: expected user@host",
                    s
                ))
            })?;
        let port = match parts.next() {
            None => DEFAULT_SSH_PORT,
            Some(p) => p.parse().map_err(|_| {
                BackupError::Config(format!("invalid ssh port in transport {:?}", s))
            })?,
        };
        Ok(Transport::Remote {
            user: user.to_string(),
            host: host.to_string(),
            port,
        })
    }
}

impl TryFrom<String> for Transport {
    type Error = BackupError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl fmt::Display for Transport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Transport::Local => f.write_str("local"),
            Transport::Remote { user, host, port } => {
                write!(f, "ssh:{}@{}:{}", user, host, port)
            }
        }
    }
}

/// A backup destination: a dataset path reached via a transport
#[derive(Debug, Clone, Deserialize)]
pub struct Destination {
    /// Destination dataset path
    pub dest: String,
    /// How to reach it
    pub transport: Transport,
    /// Per-destination retention override; falls back to the global setting
    #[serde(default)]
    pub retain_snaps: Option<u32>,
}

impl Destination {
    /// Build a local destination (used by the single-run CLI mode and tests)
    pub fn local(dest: impl Into<String>) -> Self {
        Self {
            dest: dest.into(),
            transport: Transport::Local,
            retain_snaps: None,
        }
    }
}

/// Build a zfs invocation that runs either on this host or on the remote end
/// of the transport
///
/// Remote invocations hand the whole zfs command line to ssh as a single
/// argument, resolving `zfs` from the remote PATH.
pub(crate) fn zfs_command(
    zfs_path: &Path,
    ssh_path: &Path,
    transport: &Transport,
    args: &[&str],
) -> Command {
    match transport.ssh_args() {
        None => {
            let mut cmd = Command::new(zfs_path);
            cmd.args(args);
            cmd
        }
        Some(ssh_args) => {
            let mut cmd = Command::new(ssh_path);
            cmd.args(ssh_args).arg(format!("zfs {}", args.join(" ")));
            cmd
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_local() {
        assert_eq!("local".parse::<Transport>().unwrap(), Transport::Local);
        assert_eq!("LOCAL".parse::<Transport>().unwrap(), Transport::Local);
    }

    #[test]
    fn test_parse_ssh_with_default_port() {
        let t: Transport = "ssh:backup@host.example".parse().unwrap();
        assert_eq!(
            t,
            Transport::Remote {
                user: "backup".into(),
                host: "host.example".into(),
                port: 22,
            }
        );
    }

    #[test]
    fn test_parse_ssh_with_port() {
        let t: Transport = "ssh:root@10.0.0.2:2222".parse().unwrap();
        assert_eq!(
            t,
            Transport::Remote {
                user: "root".into(),
                host: "10.0.0.2".into(),
                port: 2222,
            }
        );
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!("rsync:host".parse::<Transport>().is_err());
        assert!("ssh:".parse::<Transport>().is_err());
        assert!("ssh:nohost".parse::<Transport>().is_err());
        assert!("ssh:@host".parse::<Transport>().is_err());
        assert!("ssh:user@".parse::<Transport>().is_err());
        assert!("ssh:user@host:notaport".parse::<Transport>().is_err());
    }

    #[test]
    fn test_ssh_args_shape() {
        let t: Transport = "ssh:backup@host.example:2222".parse().unwrap();
        let args = t.ssh_args().unwrap();
        assert!(args.windows(2).any(|w| w == ["-p", "2222"]));
        assert!(args.windows(2).any(|w| w == ["-l", "backup"]));
        assert!(args
            .windows(2)
            .any(|w| w == ["-o", "StrictHostKeyChecking=yes"]));
        assert_eq!(args.last().unwrap(), "host.example");
        assert!(Transport::Local.ssh_args().is_none());
    }

    #[test]
    fn test_display_round_trip() {
        let t: Transport = "ssh:backup@host.example".parse().unwrap();
        assert_eq!(t.to_string(), "ssh:backup@host.example:22");
        assert_eq!(Transport::Local.to_string(), "local");
    }

    #[test]
    fn test_destination_deserializes_from_yaml() {
        let d: Destination =
            serde_yaml::from_str("dest: tank/data\ntransport: ssh:b@h\nretain_snaps: 4\n").unwrap();
        assert_eq!(d.dest, "tank/data");
        assert!(!d.transport.is_local());
        assert_eq!(d.retain_snaps, Some(4));
    }

    #[test]
    fn test_destination_rejects_bad_transport_in_yaml() {
        let r: Result<Destination, _> = serde_yaml::from_str("dest: a\ntransport: teleport\n");
        assert!(r.is_err());
    }
}
