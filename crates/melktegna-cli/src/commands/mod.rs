//! CLI subcommand implementations.

pub mod delete;
pub mod history;
pub mod listen;
pub mod send;

use anyhow::{Context, Result};
use melktegna_client::{ChatClient, WireFormat};
use melktegna_core::UserId;
use tracing::debug;

/// Where and how to reach the relay.
#[derive(Debug, Clone)]
pub struct Target {
    pub server: String,
    pub format: WireFormat,
}

async fn connect(target: &Target) -> Result<ChatClient> {
    ChatClient::connect_with(&target.server, target.format)
        .await
        .with_context(|| format!("failed to connect to {}", target.server))
}

/// Connect and announce as `user`. Only `listen` does this: announcing
/// moves the user's live delivery to this connection.
pub async fn connect_announced(target: &Target, user: &str) -> Result<ChatClient> {
    let user = UserId::parse(user).with_context(|| format!("invalid user '{user}'"))?;
    let mut client = connect(target).await?;
    client.announce(&user).await.context("failed to announce presence")?;
    debug!(server = %target.server, user = %user, "announced");
    Ok(client)
}

/// Connect and act as `user` without announcing, leaving any running
/// `listen` session bound.
pub async fn connect_as(target: &Target, user: &str) -> Result<ChatClient> {
    let user = UserId::parse(user).with_context(|| format!("invalid user '{user}'"))?;
    let mut client = connect(target).await?;
    client.set_identity(user);
    Ok(client)
}
