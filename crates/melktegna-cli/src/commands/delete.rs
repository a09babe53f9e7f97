//! `melktegna delete --user U <id>`: remove a stored message the user sent.

use std::time::Duration;

use anyhow::{Context, Result};
use melktegna_client::ClientEvent;

use super::{connect_as, Target};

const REPLY_TIMEOUT: Duration = Duration::from_secs(5);

pub async fn run(target: &Target, user: &str, message_id: u64) -> Result<()> {
    let mut client = connect_as(target, user).await?;
    client
        .delete_message(message_id)
        .await
        .context("delete request failed")?;

    loop {
        match client.next_event_timeout(REPLY_TIMEOUT).await {
            Ok(Some(ClientEvent::Deleted(id))) if id == message_id => {
                println!("Deleted message #{id}.");
                break;
            }
            Ok(Some(ClientEvent::Error { code, message })) => {
                anyhow::bail!("relay error {code}: {message}");
            }
            Ok(Some(_)) => continue,
            Ok(None) => anyhow::bail!("connection closed before the relay replied"),
            Err(_) => anyhow::bail!("timed out waiting for the relay"),
        }
    }

    client.close().await.ok();
    Ok(())
}
