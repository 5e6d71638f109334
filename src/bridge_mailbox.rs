use serde::{Deserialize, Serialize};
use std::fs;
use std::io::{self, ErrorKind};
use std::path::{Path, PathBuf};

use crate::debug_log;

pub const REQUEST_FILE_NAME: &str = "bridge_command.txt";
pub const RESPONSE_FILE_NAME: &str = "bridge_result.txt";
pub const STATUS_FILE_NAME: &str = "bridge_status.json";

/// Suffix of a request that has been claimed by the receiver but not yet read
const CLAIMED_SUFFIX: &str = "claimed";
const TEMP_SUFFIX: &str = "tmp";

#[derive(Debug, thiserror::Error)]
pub enum MailboxError {
    #[error("Mailbox IO error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("Invalid status file {path}: {source}")]
    InvalidStatus {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

impl MailboxError {
    fn io(path: &Path, source: io::Error) -> Self {
        MailboxError::Io {
            path: path.to_path_buf(),
            source,
        }
    }
}

/// Whether the in-editor agent is currently polling the mailbox
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BridgeState {
    Active,
    Idle,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BridgeStatus {
    pub state: BridgeState,
    pub updated_at: chrono::DateTime<chrono::Utc>,
    #[serde(default)]
    pub process_id: Option<u32>,
}

/// Single-slot request/response channel between two processes, backed by files
///
/// "File exists" means "message pending". Writes go through a temp file and a
/// rename so a reader never sees a half-written message. Receiving first renames the
/// request to a claimed name, so a message written after the claim is kept for the
/// next receive instead of being deleted unread.
#[derive(Debug, Clone)]
pub struct MailboxChannel {
    request_path: PathBuf,
    response_path: PathBuf,
    status_path: PathBuf,
}

impl MailboxChannel {
    /// Mailbox using the standard file names inside `directory`
    pub fn new<P: AsRef<Path>>(directory: P) -> Self {
        let directory = directory.as_ref();
        Self::with_paths(
            directory.join(REQUEST_FILE_NAME),
            directory.join(RESPONSE_FILE_NAME),
            directory.join(STATUS_FILE_NAME),
        )
    }

    pub fn with_paths(request_path: PathBuf, response_path: PathBuf, status_path: PathBuf) -> Self {
        Self {
            request_path,
            response_path,
            status_path,
        }
    }

    pub fn request_path(&self) -> &Path {
        &self.request_path
    }

    pub fn response_path(&self) -> &Path {
        &self.response_path
    }

    pub fn status_path(&self) -> &Path {
        &self.status_path
    }

    /// Write a command for the receiver, replacing any unconsumed one
    pub fn send(&self, command: &str) -> Result<(), MailboxError> {
        write_atomically(&self.request_path, command)
    }

    /// Take the pending command, if any
    pub fn try_receive(&self) -> Result<Option<String>, MailboxError> {
        take_message(&self.request_path)
    }

    /// Whether a command is waiting, without consuming it
    pub fn has_pending_command(&self) -> bool {
        self.request_path.exists()
    }

    /// Write the result of the last command, overwriting the previous one
    pub fn send_result(&self, text: &str) -> Result<(), MailboxError> {
        write_atomically(&self.response_path, text)
    }

    /// Take the pending result, if any
    pub fn try_receive_result(&self) -> Result<Option<String>, MailboxError> {
        take_message(&self.response_path)
    }

    /// Drop any result nobody collected
    pub fn discard_result(&self) -> Result<(), MailboxError> {
        remove_if_exists(&self.response_path)
    }

    pub fn set_status(&self, state: BridgeState) -> Result<(), MailboxError> {
        let status = BridgeStatus {
            state,
            updated_at: chrono::Utc::now(),
            process_id: Some(std::process::id()),
        };
        // Serializing a plain struct cannot fail
        let json = serde_json::to_string_pretty(&status).unwrap_or_default();
        write_atomically(&self.status_path, &json)
    }

    /// Read the agent status; `None` when no agent ever started here
    pub fn read_status(&self) -> Result<Option<BridgeStatus>, MailboxError> {
        let content = match fs::read_to_string(&self.status_path) {
            Ok(content) => content,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(MailboxError::io(&self.status_path, e)),
        };
        serde_json::from_str(&content)
            .map(Some)
            .map_err(|source| MailboxError::InvalidStatus {
                path: self.status_path.clone(),
                source,
            })
    }
}

fn sibling_with_suffix(path: &Path, suffix: &str) -> PathBuf {
    let mut name = path.file_name().map(|n| n.to_os_string()).unwrap_or_default();
    name.push(".");
    name.push(suffix);
    path.with_file_name(name)
}

fn ensure_parent(path: &Path) -> Result<(), MailboxError> {
    if let Some(parent) = path.parent() {
        // create_dir_all tolerates the directory appearing concurrently
        fs::create_dir_all(parent).map_err(|e| MailboxError::io(parent, e))?;
    }
    Ok(())
}

fn write_atomically(path: &Path, content: &str) -> Result<(), MailboxError> {
    ensure_parent(path)?;
    let temp_path = sibling_with_suffix(path, TEMP_SUFFIX);
    fs::write(&temp_path, content).map_err(|e| MailboxError::io(&temp_path, e))?;
    fs::rename(&temp_path, path).map_err(|e| MailboxError::io(path, e))?;
    debug_log!("Mailbox wrote {}", path.display());
    Ok(())
}

fn take_message(path: &Path) -> Result<Option<String>, MailboxError> {
    let claimed_path = sibling_with_suffix(path, CLAIMED_SUFFIX);
    match fs::rename(path, &claimed_path) {
        Ok(()) => {}
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(MailboxError::io(path, e)),
    }

    let content = fs::read_to_string(&claimed_path).map_err(|e| MailboxError::io(&claimed_path, e))?;
    remove_if_exists(&claimed_path)?;
    debug_log!("Mailbox took {}", path.display());
    Ok(Some(content))
}

fn remove_if_exists(path: &Path) -> Result<(), MailboxError> {
    match fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
        Err(e) => Err(MailboxError::io(path, e)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mailbox() -> (tempfile::TempDir, MailboxChannel) {
        let dir = tempfile::tempdir().unwrap();
        let mailbox = MailboxChannel::new(dir.path().join("Temp").join("UnityMcpBridge"));
        (dir, mailbox)
    }

    #[test]
    fn test_receive_exactly_once() {
        let (_dir, mailbox) = mailbox();
        mailbox.send("X").unwrap();

        assert!(mailbox.has_pending_command());
        assert_eq!(mailbox.try_receive().unwrap(), Some("X".to_string()));
        assert_eq!(mailbox.try_receive().unwrap(), None);
        assert!(!mailbox.has_pending_command());
    }

    #[test]
    fn test_receive_without_directory() {
        let (_dir, mailbox) = mailbox();
        assert_eq!(mailbox.try_receive().unwrap(), None);
        assert_eq!(mailbox.try_receive_result().unwrap(), None);
    }

    #[test]
    fn test_send_overwrites_unconsumed_command() {
        let (_dir, mailbox) = mailbox();
        mailbox.send("first").unwrap();
        mailbox.send("second").unwrap();
        assert_eq!(mailbox.try_receive().unwrap(), Some("second".to_string()));
    }

    #[test]
    fn test_result_round_trip() {
        let (_dir, mailbox) = mailbox();
        mailbox.send_result("Success: done").unwrap();
        assert_eq!(
            mailbox.try_receive_result().unwrap(),
            Some("Success: done".to_string())
        );
        assert_eq!(mailbox.try_receive_result().unwrap(), None);

        mailbox.send_result("stale").unwrap();
        mailbox.discard_result().unwrap();
        assert_eq!(mailbox.try_receive_result().unwrap(), None);
    }

    #[test]
    fn test_no_temp_files_left_behind() {
        let (_dir, mailbox) = mailbox();
        mailbox.send("ping").unwrap();
        mailbox.try_receive().unwrap();

        let directory = mailbox.request_path().parent().unwrap();
        let leftovers: Vec<_> = fs::read_dir(directory).unwrap().collect();
        assert!(leftovers.is_empty(), "unexpected files: {:?}", leftovers);
    }

    #[test]
    fn test_status_round_trip() {
        let (_dir, mailbox) = mailbox();
        assert_eq!(mailbox.read_status().unwrap(), None);

        mailbox.set_status(BridgeState::Active).unwrap();
        let status = mailbox.read_status().unwrap().unwrap();
        assert_eq!(status.state, BridgeState::Active);
        assert_eq!(status.process_id, Some(std::process::id()));

        // Reading has no side effects
        assert_eq!(mailbox.read_status().unwrap().unwrap().state, BridgeState::Active);

        mailbox.set_status(BridgeState::Idle).unwrap();
        assert_eq!(mailbox.read_status().unwrap().unwrap().state, BridgeState::Idle);
    }

    #[test]
    fn test_invalid_status_file() {
        let (_dir, mailbox) = mailbox();
        ensure_parent(mailbox.status_path()).unwrap();
        fs::write(mailbox.status_path(), "not json").unwrap();
        assert!(matches!(
            mailbox.read_status(),
            Err(MailboxError::InvalidStatus { .. })
        ));
    }
}
