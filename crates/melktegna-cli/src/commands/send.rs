//! `melktegna send --from U --to V <message>`: send one message.
//!
//! Does not announce, so a `listen` session for the sender stays bound.

use std::time::Duration;

use anyhow::{Context, Result};
use melktegna_client::{quote_reply, ClientEvent};
use melktegna_core::UserId;
use tracing::info;

use super::{connect_as, Target};

/// How long to wait for the relay to acknowledge the send.
const SYNC_TIMEOUT: Duration = Duration::from_secs(5);

pub async fn run(
    target: &Target,
    from: &str,
    to: &str,
    message: &str,
    quote: Option<&str>,
) -> Result<()> {
    let to = UserId::parse(to).with_context(|| format!("invalid recipient '{to}'"))?;
    let mut client = connect_as(target, from).await?;

    let text = match quote {
        Some(original) => quote_reply(original, message),
        None => message.to_string(),
    };
    client.send_message(&to, text).await.context("send failed")?;

    // The relay handles events in order, so a pong means the send was taken.
    client
        .sync(SYNC_TIMEOUT)
        .await
        .context("relay did not acknowledge the send")?;
    while let Ok(Some(event)) = client.next_event_timeout(Duration::ZERO).await {
        if let ClientEvent::Error { code, message } = event {
            anyhow::bail!("relay error {code}: {message}");
        }
    }

    if let Some(from) = client.user() {
        info!(from = %from, to = %to, "message sent");
    }
    client.close().await.ok();
    Ok(())
}
