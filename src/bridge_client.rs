use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use tokio::sync::Mutex as TokioMutex;

use crate::bridge_command::{Command, CommandReply};
use crate::bridge_mailbox::{BridgeStatus, MailboxChannel, MailboxError};
use crate::config::BridgeConfig;
use crate::{debug_log, warn_log};

#[derive(Debug, thiserror::Error)]
pub enum BridgeClientError {
    #[error(transparent)]
    Mailbox(#[from] MailboxError),
    #[error(
        "Timed out after {0:?} waiting for the Unity Editor to answer, make sure the editor is open and the bridge is active"
    )]
    Timeout(Duration),
}

/// The external-actor side of the mailbox
///
/// Requests are serialized: a request is only sent once the previous one has been
/// answered or has timed out, which is what keeps the single-slot mailbox ordered.
#[derive(Debug, Clone)]
pub struct BridgeClient {
    mailbox: MailboxChannel,
    poll_interval: Duration,
    timeout: Duration,
    in_flight: Arc<TokioMutex<()>>,
    next_id: Arc<AtomicU64>,
}

impl BridgeClient {
    pub fn new(mailbox: MailboxChannel, poll_interval: Duration, timeout: Duration) -> Self {
        Self {
            mailbox,
            poll_interval,
            timeout,
            in_flight: Arc::new(TokioMutex::new(())),
            // Seeded from the clock so ids do not repeat across server restarts
            next_id: Arc::new(AtomicU64::new(chrono::Utc::now().timestamp_micros().unsigned_abs())),
        }
    }

    pub fn from_config(config: &BridgeConfig, project_root: &std::path::Path) -> Self {
        Self::new(
            MailboxChannel::new(config.mailbox_dir_for(project_root)),
            config.client_poll_interval(),
            config.client_timeout(),
        )
    }

    pub fn mailbox(&self) -> &MailboxChannel {
        &self.mailbox
    }

    /// Send `command` and wait for its result string
    ///
    /// The command is tagged with a fresh id and only a reply carrying that id is
    /// accepted. The result may itself be an `Error:` string; only transport failures
    /// and timeouts are returned as `Err`.
    pub async fn execute(&self, command: &Command) -> Result<String, BridgeClientError> {
        let _guard = self.in_flight.lock().await;

        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let command = command.clone().with_id(id);

        self.mailbox.discard_result()?;
        self.mailbox.send(&command.encode())?;
        debug_log!("Sent bridge command {} (id {})", command, id);

        let deadline = Instant::now() + self.timeout;
        loop {
            if let Some(raw) = self.mailbox.try_receive_result()? {
                match CommandReply::parse(&raw) {
                    Some(reply) if reply.id == id => {
                        debug_log!("Bridge result: {}", reply.result);
                        return Ok(reply.result);
                    }
                    // Late answer to a request that already timed out
                    _ => warn_log!("Ignored bridge result not meant for command {}: {}", id, raw),
                }
            }
            if Instant::now() >= deadline {
                break;
            }
            tokio::time::sleep(self.poll_interval).await;
        }

        // Withdraw the request so a late editor does not run it unexpectedly
        if self.mailbox.try_receive()?.is_some() {
            warn_log!("Withdrew unanswered bridge command {}", command);
        }
        Err(BridgeClientError::Timeout(self.timeout))
    }

    /// Read the agent status without touching the mailbox slot
    pub fn status(&self) -> Result<Option<BridgeStatus>, BridgeClientError> {
        Ok(self.mailbox.read_status()?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bridge_agent::BridgeAgent;
    use crate::bridge_command::request_id;
    use crate::bridge_mailbox::BridgeState;
    use crate::in_memory_editor::InMemoryEditor;
    use crate::refresh_escalation::EscalationChain;

    fn client_for(mailbox: MailboxChannel, timeout: Duration) -> BridgeClient {
        BridgeClient::new(mailbox, Duration::from_millis(5), timeout)
    }

    #[tokio::test]
    async fn test_execute_against_agent() {
        let dir = tempfile::tempdir().unwrap();
        let mailbox = MailboxChannel::new(dir.path());
        let client = client_for(mailbox.clone(), Duration::from_secs(5));
        let mut agent = BridgeAgent::new(
            InMemoryEditor::new(),
            mailbox,
            Duration::from_secs(1),
            EscalationChain::default(),
            Instant::now(),
        );

        let requests = async {
            let created = client
                .execute(&Command::new("create_gameobject", vec!["Player".to_string()]))
                .await
                .unwrap();
            let moved = client
                .execute(&Command::new(
                    "set_property",
                    vec!["Player".to_string(), "position".to_string(), "(1,2,3)".to_string()],
                ))
                .await
                .unwrap();
            let ghost = client
                .execute(&Command::new(
                    "set_property",
                    vec!["Ghost".to_string(), "position".to_string(), "(1,2,3)".to_string()],
                ))
                .await
                .unwrap();
            (created, moved, ghost)
        };

        let (_, (created, moved, ghost)) = tokio::join!(
            agent.run_until(Duration::from_millis(2), tokio::time::sleep(Duration::from_millis(500))),
            requests
        );

        assert_eq!(created, "Success: Created GameObject 'Player'");
        assert_eq!(moved, "Success: Set position of 'Player' to (1, 2, 3)");
        assert_eq!(ghost, "Error: GameObject 'Ghost' not found");
    }

    #[tokio::test]
    async fn test_timeout_withdraws_request() {
        let dir = tempfile::tempdir().unwrap();
        let mailbox = MailboxChannel::new(dir.path());
        let client = client_for(mailbox.clone(), Duration::from_millis(50));

        let result = client.execute(&Command::new("ping", Vec::new())).await;
        assert!(matches!(result, Err(BridgeClientError::Timeout(_))));
        assert!(!mailbox.has_pending_command());
    }

    #[tokio::test]
    async fn test_stale_result_is_discarded() {
        let dir = tempfile::tempdir().unwrap();
        let mailbox = MailboxChannel::new(dir.path());
        mailbox.send_result("stale").unwrap();
        let client = client_for(mailbox.clone(), Duration::from_millis(50));

        let result = client.execute(&Command::new("ping", Vec::new())).await;
        assert!(matches!(result, Err(BridgeClientError::Timeout(_))));
    }

    #[tokio::test]
    async fn test_late_result_of_timed_out_command_is_ignored() {
        let dir = tempfile::tempdir().unwrap();
        let mailbox = MailboxChannel::new(dir.path());
        let client = client_for(mailbox.clone(), Duration::from_millis(300));

        // An editor that claims the first command, answers it only after the client
        // gave up, then answers the second one
        let editor = mailbox.clone();
        let slow_editor = async move {
            let first = loop {
                if let Some(raw) = editor.try_receive().unwrap() {
                    break raw;
                }
                tokio::time::sleep(Duration::from_millis(2)).await;
            };
            let second = loop {
                if let Some(raw) = editor.try_receive().unwrap() {
                    break raw;
                }
                tokio::time::sleep(Duration::from_millis(2)).await;
            };
            let first_id = request_id(&first).unwrap();
            editor
                .send_result(&CommandReply::new(first_id, "Success: Deleted GameObject 'Player'").encode())
                .unwrap();
            tokio::time::sleep(Duration::from_millis(30)).await;
            let second_id = request_id(&second).unwrap();
            editor
                .send_result(&CommandReply::new(second_id, "Error: GameObject 'Enemy' not found").encode())
                .unwrap();
        };

        let requests = async {
            let short = BridgeClient {
                timeout: Duration::from_millis(40),
                ..client.clone()
            };
            let first = short
                .execute(&Command::new("delete_gameobject", vec!["Player".to_string()]))
                .await;
            let second = client
                .execute(&Command::new("find_gameobject", vec!["Enemy".to_string()]))
                .await;
            (first, second)
        };

        let (_, (first, second)) = tokio::join!(slow_editor, requests);
        assert!(matches!(first, Err(BridgeClientError::Timeout(_))));
        assert_eq!(second.unwrap(), "Error: GameObject 'Enemy' not found");
    }

    #[tokio::test]
    async fn test_bare_result_is_not_accepted() {
        let dir = tempfile::tempdir().unwrap();
        let mailbox = MailboxChannel::new(dir.path());
        let client = client_for(mailbox.clone(), Duration::from_millis(100));

        let editor = mailbox.clone();
        let answer_untagged = async move {
            while editor.try_receive().unwrap().is_none() {
                tokio::time::sleep(Duration::from_millis(2)).await;
            }
            editor.send_result("pong").unwrap();
        };

        let ping = Command::new("ping", Vec::new());
        let (_, result) = tokio::join!(answer_untagged, client.execute(&ping));
        assert!(matches!(result, Err(BridgeClientError::Timeout(_))));
    }

    #[test]
    fn test_status() {
        let dir = tempfile::tempdir().unwrap();
        let mailbox = MailboxChannel::new(dir.path());
        let client = client_for(mailbox.clone(), Duration::from_secs(1));

        assert!(client.status().unwrap().is_none());
        mailbox.set_status(BridgeState::Active).unwrap();
        assert_eq!(client.status().unwrap().unwrap().state, BridgeState::Active);
    }
}
