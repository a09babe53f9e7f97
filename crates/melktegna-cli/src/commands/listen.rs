//! `melktegna listen --user U`: print incoming messages until Ctrl+C.

use anyhow::Result;
use melktegna_client::{ClientEvent, Inbox};
use tracing::{info, warn};

use super::{connect_announced, Target};

pub async fn run(target: &Target, user: &str, chat: Option<&str>) -> Result<()> {
    let mut client = connect_announced(target, user).await?;
    let mut inbox = Inbox::new();
    if let Some(peer) = chat {
        inbox.open_chat(peer);
    }
    info!(user, "listening, Ctrl+C to stop");

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            event = client.next_event() => match event {
                Some(ClientEvent::Message { from, payload }) => {
                    if inbox.record_incoming(&from) {
                        println!("{from}: {payload}  ({} unread)", inbox.unread(&from));
                    } else {
                        println!("{from}: {payload}");
                    }
                }
                Some(ClientEvent::Error { code, message }) => {
                    warn!(code, message = %message, "relay error");
                    if code == melktegna_core::messages::error_code::SHUTTING_DOWN {
                        break;
                    }
                }
                Some(_) => {}
                None => {
                    warn!("connection closed by relay");
                    break;
                }
            },
        }
    }

    if inbox.total_unread() > 0 {
        println!("{} unread message(s)", inbox.total_unread());
    }
    client.close().await.ok();
    Ok(())
}
