//! `melktegna history --user U --peer V`: print a stored conversation.

use std::time::Duration;

use anyhow::{Context, Result};
use melktegna_client::ClientEvent;
use melktegna_core::UserId;

use super::{connect_as, Target};

const REPLY_TIMEOUT: Duration = Duration::from_secs(5);

pub async fn run(target: &Target, user: &str, peer: &str, limit: Option<usize>) -> Result<()> {
    let peer = UserId::parse(peer).with_context(|| format!("invalid peer '{peer}'"))?;
    let mut client = connect_as(target, user).await?;
    client
        .request_history(&peer, limit)
        .await
        .context("history request failed")?;

    loop {
        match client.next_event_timeout(REPLY_TIMEOUT).await {
            Ok(Some(ClientEvent::History(entries))) => {
                if entries.is_empty() {
                    println!("No messages with {peer}.");
                }
                for entry in entries {
                    let who = if entry.from_self { "me" } else { peer.as_str() };
                    println!("#{} [{}] {who}: {}", entry.id, entry.sent_at, entry.message);
                }
                break;
            }
            Ok(Some(ClientEvent::Error { code, message })) => {
                anyhow::bail!("relay error {code}: {message}");
            }
            Ok(Some(_)) => continue,
            Ok(None) => anyhow::bail!("connection closed before history arrived"),
            Err(_) => anyhow::bail!("timed out waiting for history"),
        }
    }

    client.close().await.ok();
    Ok(())
}
