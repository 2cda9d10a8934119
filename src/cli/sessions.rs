//! Session management commands.

use anyhow::{Context, Result};

use xiaoclaw::config::Config;
use xiaoclaw::session::SessionManager;

use super::SessionsAction;

pub(crate) async fn cmd_sessions(config: &Config, action: SessionsAction) -> Result<()> {
    let dir = config.sessions_path();
    let manager = SessionManager::with_path(dir.clone())
        .with_context(|| format!("Failed to open session directory {:?}", dir))?;

    match action {
        SessionsAction::List => {
            let sessions = manager.list().await?;
            if sessions.is_empty() {
                println!("No sessions in {:?}", dir);
                return Ok(());
            }
            println!("{:<32} {:<20} {:<20}", "ID", "CREATED", "UPDATED");
            for info in sessions {
                let fmt = |t: Option<chrono::DateTime<chrono::Utc>>| {
                    t.map(|t| t.format("%Y-%m-%d %H:%M").to_string())
                        .unwrap_or_else(|| "-".to_string())
                };
                println!(
                    "{:<32} {:<20} {:<20}",
                    info.id,
                    fmt(info.created_at),
                    fmt(info.updated_at)
                );
            }
        }
        SessionsAction::Delete { id } => {
            if manager.delete(&id).await? {
                println!("Deleted session {}", id);
            } else {
                println!("No session named {}", id);
            }
        }
    }

    Ok(())
}
