//! Test doubles for the external zfs and ssh tools
//!
//! The fake zfs keeps snapshot state as one `dataset@name` per line in a text
//! file and mimics the handful of subcommands the crate drives. A send stream
//! carries the snapshot identifier as its payload, which is enough for the
//! fake recv to register the snapshot at the destination. Every invocation is
//! appended to `<state>.log` so tests can assert on the exact commands run.

use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};

/// Install a fake `zfs` binary into `dir`; returns (binary path, state path)
pub fn install_fake_zfs(dir: &Path) -> (PathBuf, PathBuf) {
    let state = dir.join("state");
    fs::write(&state, "").unwrap();
    let script = format!(
        r#"#!/bin/sh
STATE="{state}"
cmd="$1"; shift
echo "zfs $cmd $*" >> "$STATE.log"
case "$cmd" in
  snapshot|snap)
    if grep -qxF "$1" "$STATE" 2>/dev/null; then
      echo "cannot create snapshot '$1': dataset already exists" >&2
      exit 1
    fi
    echo "$1" >> "$STATE"
    ;;
  destroy)
    if ! grep -qxF "$1" "$STATE" 2>/dev/null; then
      echo "cannot destroy '$1': dataset does not exist" >&2
      exit 1
    fi
    grep -vxF "$1" "$STATE" > "$STATE.tmp" || true
    mv "$STATE.tmp" "$STATE"
    ;;
  rename)
    if ! grep -qxF "$1" "$STATE" 2>/dev/null; then
      echo "cannot rename '$1': dataset does not exist" >&2
      exit 1
    fi
    grep -vxF "$1" "$STATE" > "$STATE.tmp" || true
    mv "$STATE.tmp" "$STATE"
    echo "$2" >> "$STATE"
    ;;
  list)
    for a in "$@"; do target="$a"; done
    case "$target" in
      *@*)
        if grep -qxF "$target" "$STATE" 2>/dev/null; then
          echo "$target"
        else
          echo "cannot open '$target': dataset does not exist" >&2
          exit 1
        fi
        ;;
      *)
        grep "^$target@" "$STATE" 2>/dev/null || true
        ;;
    esac
    ;;
  send)
    for a in "$@"; do snap="$a"; done
    if ! grep -qxF "$snap" "$STATE" 2>/dev/null; then
      echo "cannot open '$snap': dataset does not exist" >&2
      exit 1
    fi
    printf '%s' "$snap"
    ;;
  recv|receive)
    dest="$2"
    stream=$(cat)
    if [ -z "$stream" ]; then
      echo "cannot receive: empty stream" >&2
      exit 1
    fi
    case "$dest" in
      missing/*)
        echo "cannot receive into '$dest': dataset does not exist" >&2
        exit 1
        ;;
    esac
    name="${{stream##*@}}"
    echo "$dest@$name" >> "$STATE"
    ;;
  *)
    echo "unknown command: $cmd" >&2
    exit 2
    ;;
esac
"#,
        state = state.display()
    );
    let zfs = dir.join("zfs");
    write_executable(&zfs, &script);
    (zfs, state)
}

/// Install a fake `ssh` binary into `dir` that runs the remote command
/// locally, resolving `zfs` to the fake binary in the same directory
pub fn install_fake_ssh(dir: &Path, state: &Path) -> PathBuf {
    let script = format!(
        r#"#!/bin/sh
PATH="{dir}:$PATH"
export PATH
echo "ssh $*" >> "{state}.log"
for a in "$@"; do cmd="$a"; done
eval "$cmd"
"#,
        dir = dir.display(),
        state = state.display()
    );
    let ssh = dir.join("ssh");
    write_executable(&ssh, &script);
    ssh
}

/// Snapshot names currently registered in the fake state
pub fn read_state(state: &Path) -> Vec<String> {
    fs::read_to_string(state)
        .unwrap_or_default()
        .lines()
        .filter(|l| !l.trim().is_empty())
        .map(|l| l.to_string())
        .collect()
}

/// Seed the fake state with the given snapshot names
pub fn write_state(state: &Path, snapshots: &[&str]) {
    let mut contents = snapshots.join("\n");
    if !contents.is_empty() {
        contents.push('\n');
    }
    fs::write(state, contents).unwrap();
}

/// Every command the fakes were invoked with, in order
pub fn read_log(state: &Path) -> Vec<String> {
    fs::read_to_string(state.with_extension("log"))
        .unwrap_or_default()
        .lines()
        .map(|l| l.to_string())
        .collect()
}

fn write_executable(path: &Path, contents: &str) {
    fs::write(path, contents).unwrap();
    fs::set_permissions(path, fs::Permissions::from_mode(0o755)).unwrap();
}
