mod logging;

use std::env;

use sync_core::{SyncCommand, SyncEvent};
use sync_runtime::{ClientConfig, HttpChatApi, WsTransport, spawn_runtime};
use tracing::{error, info, warn};

#[tokio::main]
async fn main() {
    logging::init();

    let config = match ClientConfig::from_env() {
        Ok(config) => config,
        Err(err) => {
            eprintln!("Invalid configuration: {err}");
            eprintln!(
                "Required: CHATSYNC_WS_URL, CHATSYNC_API_URL, CHATSYNC_USER_ID, CHATSYNC_USER_TOKEN"
            );
            std::process::exit(2);
        }
    };

    let api = match HttpChatApi::new(&config.api_url, &config.user_token) {
        Ok(api) => api,
        Err(err) => {
            eprintln!("Failed to build API client: {err}");
            std::process::exit(1);
        }
    };
    let transport = WsTransport::new(&config.ws_url);
    let handle = spawn_runtime(config.runtime_config(), transport, api);
    let mut events = handle.subscribe();

    let mut commands = vec![SyncCommand::Connect, SyncCommand::RefreshChats];
    // Optional room to open after connecting.
    if let Some(chat_id) = env::var("CHATSYNC_SMOKE_CHAT")
        .ok()
        .filter(|v| !v.trim().is_empty())
    {
        commands.push(SyncCommand::JoinChat {
            chat_id: chat_id.clone(),
        });
        commands.push(SyncCommand::LoadInitial { chat_id });
    }
    for command in commands {
        if let Err(err) = handle.send(command).await {
            error!(error = %err, "runtime refused command");
            std::process::exit(1);
        }
    }

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("interrupted, shutting down");
                break;
            }
            event = events.recv() => match event {
                Some(SyncEvent::ConnectionLost { code, message }) => {
                    warn!(%code, %message, "connection lost");
                    break;
                }
                Some(SyncEvent::AuthResult { success: false, error_code }) => {
                    error!(?error_code, "authentication failed");
                    break;
                }
                Some(event) => println!("{event:?}"),
                None => break,
            },
        }
    }

    handle.close();
}
