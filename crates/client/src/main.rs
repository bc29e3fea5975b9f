//! AgileFlow headless client - composition root binary
//!
//! Joins (or creates) a room and logs every change the room pushes until
//! Ctrl-C, then logs out.

use std::sync::Arc;

use anyhow::{Context, Result};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use agileflow_client::config::load_dotenv;
use agileflow_client::{
    EventKind, HttpRoomApi, Identity, RealtimeClient, RoomKind, ServerEventKind, SessionSync,
    StaticToken, SyncConfig, SyncEvent,
};

#[tokio::main]
async fn main() -> Result<()> {
    if let Ok(dir) = std::env::current_dir() {
        load_dotenv(&dir);
    }

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "agileflow_client=debug,agileflow_protocol=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting AgileFlow client");

    let config = SyncConfig::from_env().context("invalid configuration")?;
    tracing::info!("Configuration loaded");
    tracing::info!("  API: {}", config.api_base_url);
    tracing::info!("  Real-time: {}", config.ws_url);

    let identity = Identity::new(
        required_env("AGILEFLOW_USER_NAME")?,
        required_env("AGILEFLOW_USER_EMAIL")?,
    );
    let tokens = StaticToken::new(std::env::var("AGILEFLOW_ACCESS_TOKEN").ok());
    let kind: RoomKind = std::env::var("AGILEFLOW_ROOM_KIND")
        .ok()
        .map(|raw| raw.parse::<RoomKind>())
        .transpose()?
        .unwrap_or(RoomKind::Retro);

    let api = HttpRoomApi::new(&config, Arc::new(tokens));
    let (realtime, events) = RealtimeClient::new(config.ws_url.clone(), config.reconnect);
    let sync = SessionSync::new(identity, Arc::new(api), Arc::new(realtime.clone()));
    let pump = sync.spawn_event_pump(events);
    let _subscriptions = log_room_activity(&sync);

    // Identity exists from here on, so the channel may connect.
    let connection = realtime.connect();

    let joined = match std::env::var("AGILEFLOW_INVITE_CODE") {
        Ok(code) => sync.join_room(kind, &code).await,
        Err(_) => sync.create_room(kind).await,
    };
    match joined {
        Ok(room) => tracing::info!(
            room_id = %room.room_id,
            invite_code = %room.invite_code,
            kind = %room.kind,
            "In room; press Ctrl-C to leave"
        ),
        Err(e) => {
            sync.logout();
            return Err(anyhow::Error::new(e).context("could not enter a room"));
        }
    }

    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for Ctrl-C")?;
    tracing::info!("Received Ctrl-C, leaving room");

    sync.logout();
    if let Some(connection) = connection {
        let _ = connection.await;
    }
    pump.abort();

    Ok(())
}

fn required_env(var: &str) -> Result<String> {
    std::env::var(var)
        .ok()
        .filter(|value| !value.trim().is_empty())
        .with_context(|| format!("{var} must be set"))
}

fn log_room_activity(sync: &SessionSync) -> Vec<agileflow_client::Subscription> {
    let mut subscriptions = vec![
        sync.subscribe(EventKind::Connect, |_| tracing::info!("Connected")),
        sync.subscribe(EventKind::Disconnect, |_| {
            tracing::warn!("Disconnected, live updates paused")
        }),
        sync.subscribe(EventKind::ConnectionFailed, |event| {
            if let SyncEvent::ConnectionFailed { message } = event {
                tracing::error!("{message}");
            }
        }),
    ];

    for kind in ServerEventKind::ALL {
        let observer = sync.clone();
        subscriptions.push(sync.subscribe(kind, move |event| {
            let snapshot = observer.snapshot();
            tracing::info!(
                event = event.kind().as_str(),
                participants = snapshot.participants.len(),
                predictions = snapshot.predictions.len(),
                comments = snapshot.comments.len(),
                actions = snapshot.actions.len(),
                error = snapshot.error.as_deref().unwrap_or(""),
                "Room updated"
            );
        }));
    }

    subscriptions
}
