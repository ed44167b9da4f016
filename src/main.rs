//! Real-time WebSocket Notification Gateway - Entry Point
//!
//! Starts the TCP listener with demo identity and membership tables wired
//! from environment variables.

use std::env;
use std::sync::Arc;

use tokio::net::TcpListener;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use taskwire::{
    serve, Gateway, GatewayConfig, Identity, RoomId, RoomKind, StaticDirectory, StaticTokens,
    UserId,
};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging with environment filter
    // Use RUST_LOG env var to control log level
    // e.g., RUST_LOG=debug or RUST_LOG=taskwire=trace
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("taskwire=info")),
        )
        .init();

    let mut config = GatewayConfig::from_env();

    // Bind address from the command line overrides the environment
    if let Some(addr) = env::args().nth(1) {
        config.bind_addr = addr;
    }

    let listener = TcpListener::bind(&config.bind_addr).await?;
    info!("Notification gateway listening on {}", config.bind_addr);

    let gateway = Arc::new(Gateway::new(
        config,
        Arc::new(demo_tokens()),
        Arc::new(demo_directory()),
    ));

    serve(gateway, listener).await;

    Ok(())
}

/// Demo identity table read from `TASKWIRE_TOKENS`, e.g.
/// `TASKWIRE_TOKENS="s3cret=1:alice,hunter2=2:bob"`.
fn demo_tokens() -> StaticTokens {
    let mut tokens = StaticTokens::new();
    let Ok(raw) = env::var("TASKWIRE_TOKENS") else {
        warn!("TASKWIRE_TOKENS not set; every connection attempt will be refused");
        return tokens;
    };

    for entry in raw.split(',').filter(|s| !s.trim().is_empty()) {
        let parsed = entry.split_once('=').and_then(|(token, identity)| {
            let (id, username) = identity.split_once(':')?;
            let user_id = id.trim().parse::<i64>().ok()?;
            Some((
                token.trim().to_string(),
                UserId(user_id),
                username.trim().to_string(),
            ))
        });
        match parsed {
            Some((token, user_id, username)) => {
                info!("Registered demo token for user {} ({})", user_id, username);
                tokens.insert(token, Identity { user_id, username });
            }
            None => warn!("Skipping malformed TASKWIRE_TOKENS entry '{}'", entry),
        }
    }

    tokens
}

/// Demo membership table read from `TASKWIRE_MEMBERS`, e.g.
/// `TASKWIRE_MEMBERS="1=project:7 workspace:3;2=project:7"`.
fn demo_directory() -> StaticDirectory {
    let mut directory = StaticDirectory::new();
    let Ok(raw) = env::var("TASKWIRE_MEMBERS") else {
        return directory;
    };

    for entry in raw.split(';').filter(|s| !s.trim().is_empty()) {
        let Some((user, rooms)) = entry.split_once('=') else {
            warn!("Skipping malformed TASKWIRE_MEMBERS entry '{}'", entry);
            continue;
        };
        let Ok(user_id) = user.trim().parse::<i64>() else {
            warn!("Skipping malformed TASKWIRE_MEMBERS entry '{}'", entry);
            continue;
        };
        let user_id = UserId(user_id);

        for room in rooms.split_whitespace() {
            match room.parse::<RoomId>() {
                Ok(room) => match room.kind() {
                    RoomKind::Project => {
                        if let Some(project_id) = room.project_id() {
                            directory.add_project(user_id, project_id);
                        }
                    }
                    RoomKind::Workspace => {
                        if let Some(workspace_id) = room.workspace_id() {
                            directory.add_workspace(user_id, workspace_id);
                        }
                    }
                    _ => warn!(
                        "Ignoring non-membership room '{}' for user {}",
                        room, user_id
                    ),
                },
                Err(e) => warn!("Skipping room '{}' for user {}: {}", room, user_id, e),
            }
        }
    }

    directory
}
