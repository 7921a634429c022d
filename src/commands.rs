//! Request/response commands understood by a running daemon.

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info};

use crate::model::ContentType;
use crate::orchestrator::{BackupOrchestrator, TriggerAck};
use crate::status::AllResults;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "action", content = "contentType", rename_all = "camelCase")]
pub enum Command {
    BackupNow(ContentType),
    ForceFullBackup(ContentType),
    GetBackupResults,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "status", rename_all = "camelCase")]
pub enum Response {
    Started {
        #[serde(rename = "contentType")]
        content_type: ContentType,
        force: bool,
    },
    AlreadyRunning {
        #[serde(rename = "contentType")]
        content_type: ContentType,
    },
    Results {
        results: AllResults,
    },
}

pub type Request = (Command, oneshot::Sender<Response>);

/// Answer one command. Backup commands return as soon as the cycle is started.
pub fn handle(orchestrator: &Arc<BackupOrchestrator>, command: Command) -> Response {
    let (content_type, force) = match command {
        Command::GetBackupResults => {
            return Response::Results {
                results: orchestrator.results().snapshot(),
            }
        }
        Command::BackupNow(content_type) => (content_type, false),
        Command::ForceFullBackup(content_type) => (content_type, true),
    };
    match orchestrator.trigger(content_type, force) {
        TriggerAck::Started => Response::Started {
            content_type,
            force,
        },
        TriggerAck::AlreadyRunning => Response::AlreadyRunning { content_type },
    }
}

/// Serve commands until every sender is dropped.
pub async fn serve(orchestrator: Arc<BackupOrchestrator>, mut requests: mpsc::Receiver<Request>) {
    while let Some((command, reply)) = requests.recv().await {
        debug!(?command, "command received");
        let response = handle(&orchestrator, command);
        if reply.send(response).is_err() {
            debug!("command caller went away before the reply");
        }
    }
    info!("command channel closed");
}

/// Parse a console line: `backup <type>`, `force <type>` or `status`.
pub fn parse_line(line: &str) -> Result<Command, String> {
    let mut words = line.split_whitespace();
    let verb = words.next().ok_or_else(|| "empty command".to_string())?;
    let command = match verb.to_ascii_lowercase().as_str() {
        "status" | "results" => Command::GetBackupResults,
        "backup" => Command::BackupNow(content_type_arg(words.next())?),
        "force" => Command::ForceFullBackup(content_type_arg(words.next())?),
        other => return Err(format!("unknown command '{}'", other)),
    };
    if let Some(extra) = words.next() {
        return Err(format!("unexpected argument '{}'", extra));
    }
    Ok(command)
}

fn content_type_arg(word: Option<&str>) -> Result<ContentType, String> {
    word.ok_or_else(|| "expected 'drafts' or 'published'".to_string())?
        .parse()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parses_console_lines() {
        assert_eq!(
            parse_line("backup drafts").unwrap(),
            Command::BackupNow(ContentType::Drafts)
        );
        assert_eq!(
            parse_line("  FORCE published ").unwrap(),
            Command::ForceFullBackup(ContentType::Published)
        );
        assert_eq!(parse_line("status").unwrap(), Command::GetBackupResults);
    }

    #[test]
    fn rejects_bad_lines() {
        assert!(parse_line("").is_err());
        assert!(parse_line("backup").is_err());
        assert!(parse_line("backup pages").is_err());
        assert!(parse_line("status now").is_err());
        assert!(parse_line("delete drafts").is_err());
    }

    #[test]
    fn commands_use_the_message_shape() {
        assert_eq!(
            serde_json::to_value(Command::ForceFullBackup(ContentType::Drafts)).unwrap(),
            json!({ "action": "forceFullBackup", "contentType": "drafts" })
        );
        let parsed: Command =
            serde_json::from_value(json!({ "action": "getBackupResults" })).unwrap();
        assert_eq!(parsed, Command::GetBackupResults);
    }

    #[test]
    fn responses_are_tagged() {
        let value = serde_json::to_value(Response::AlreadyRunning {
            content_type: ContentType::Published,
        })
        .unwrap();
        assert_eq!(
            value,
            json!({ "status": "alreadyRunning", "contentType": "published" })
        );
    }
}
