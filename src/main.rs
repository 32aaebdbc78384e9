// Copyright (c) 2022 Unfolded Circle ApS, Markus Zehnder <markus.z@unfoldedcircle.com>
// SPDX-License-Identifier: MPL-2.0

#![forbid(non_ascii_idents)]
#![deny(unsafe_code)]

use actix::{Actor, Addr, Context, Handler};
use anyhow::{Context as _, anyhow};
use bytes::Bytes;
use clap::{Parser, Subcommand};
use futures::StreamExt;
use futures::channel::mpsc;
use ha_live::APP_VERSION;
use ha_live::client::messages::{
    CallService, Connect, Disconnect, GetStates, SubscribeStateChanges, SubscribeStatus,
};
use ha_live::client::{DeviceCommand, StateChangedEvent, StatusChange};
use ha_live::configuration::{DEF_CONFIG_FILE, Settings, get_configuration};
use ha_live::entity::EntityStore;
use ha_live::util::{MessageTracing, new_websocket_client};
use ha_live::voice::{
    AudioStreamer, Close, FileOutput, SendAudio, SessionUpdate, VoiceClient, VoiceSession,
};
use ha_live::{ConnectionStatus, HassConnection};
use log::{error, info, warn};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use url::Url;

#[derive(Parser)]
#[command(
    author = "Unfolded Circle ApS",
    version = APP_VERSION,
    about = "Home Assistant live-state connection and voice pipeline client"
)]
struct Args {
    /// Configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,
    /// Home Assistant WebSocket API URL (overrides configuration)
    #[arg(short, long)]
    url: Option<Url>,
    /// Home Assistant long lived access token (overrides configuration)
    #[arg(short, long)]
    token: Option<String>,
    /// Message tracing for HA server communication: in, out, all, none
    #[arg(long, value_name = "MESSAGES")]
    trace: Option<MessageTracing>,
    #[command(subcommand)]
    command: Option<Cmd>,
}

#[derive(Subcommand)]
enum Cmd {
    /// Connect to Home Assistant and log status and entity state changes (default)
    Monitor,
    /// Send a device command to an entity
    Call {
        /// Entity identifier, e.g. `light.kitchen`
        entity_id: String,
        /// Command identifier, e.g. `on` or `toggle`
        cmd_id: String,
        /// Command parameters as JSON object, e.g. `{"brightness": 128}`
        #[arg(short, long)]
        params: Option<String>,
    },
    /// Send a recorded audio file to the voice server and save the response audio
    Voice {
        /// Recorded user audio
        input: PathBuf,
        /// Response audio output file
        #[arg(short, long, default_value = "response.mp3")]
        output: PathBuf,
        /// Voice server WebSocket URL (overrides configuration)
        #[arg(long)]
        voice_url: Option<Url>,
    },
}

#[actix::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cfg = load_cfg(&args)?;

    match args.command.unwrap_or(Cmd::Monitor) {
        Cmd::Monitor => monitor(cfg, args.trace).await,
        Cmd::Call {
            entity_id,
            cmd_id,
            params,
        } => {
            let mut command = DeviceCommand::new(entity_id, cmd_id);
            if let Some(params) = params {
                command = command.with_params(
                    serde_json::from_str(&params).context("Invalid command parameters")?,
                );
            }
            call(cfg, args.trace, command).await
        }
        Cmd::Voice {
            input,
            output,
            voice_url,
        } => {
            let url = voice_url.unwrap_or(cfg.voice.url.clone());
            voice(cfg, url, &input, output).await
        }
    }
}

fn load_cfg(args: &Args) -> anyhow::Result<Settings> {
    let cfg_file = match args.config.as_deref() {
        Some(file) => Some(file.to_string_lossy().to_string()),
        None if Path::new(DEF_CONFIG_FILE).exists() => {
            info!("Loading default configuration file: {DEF_CONFIG_FILE}");
            Some(DEF_CONFIG_FILE.to_string())
        }
        None => None,
    };
    let mut cfg = get_configuration(cfg_file.as_deref()).context("Failed to read configuration")?;
    if let Some(url) = args.url.clone() {
        cfg.hass.set_url(url);
    }
    if let Some(token) = args.token.as_ref() {
        cfg.hass.set_token(token);
    }
    Ok(cfg)
}

/// Start the Home Assistant connection and return a stream of status changes.
async fn start_connection(
    cfg: &Settings,
    trace: Option<MessageTracing>,
) -> anyhow::Result<(Addr<HassConnection>, mpsc::UnboundedReceiver<StatusChange>)> {
    if !cfg.hass.get_url().has_host() || cfg.hass.get_token().is_empty() {
        return Err(anyhow!(
            "Can't connect to Home Assistant: URL or token is missing"
        ));
    }

    let mut connection = HassConnection::new(&cfg.hass);
    if let Some(trace) = trace {
        connection = connection.with_msg_tracing(trace);
    }
    let addr = connection.start();

    let (tx, rx) = mpsc::unbounded();
    addr.send(SubscribeStatus(Box::new(move |change: &StatusChange| {
        let _ = tx.unbounded_send(change.clone());
    })))
    .await?;
    addr.send(Connect::new(cfg.hass.get_url(), cfg.hass.get_token()))
        .await?;

    Ok((addr, rx))
}

async fn monitor(cfg: Settings, trace: Option<MessageTracing>) -> anyhow::Result<()> {
    let (addr, mut status) = start_connection(&cfg, trace).await?;

    let store = Arc::new(Mutex::new(EntityStore::new()));
    let entities = store.clone();
    addr.send(SubscribeStateChanges(Box::new(
        move |event: &StateChangedEvent| {
            let Ok(mut store) = entities.lock() else {
                return;
            };
            match store.apply(event) {
                Some(entity) => info!(
                    "{} ({}): {}",
                    entity.entity_id, entity.name, entity.state
                ),
                None => info!("{} removed", event.entity_id),
            }
        },
    )))
    .await?;

    loop {
        tokio::select! {
            change = status.next() => {
                let Some(change) = change else {
                    break;
                };
                match change.error.as_deref() {
                    Some(error) => warn!("Connection status: {} ({error})", change.status),
                    None => info!("Connection status: {}", change.status),
                }
                if change.status == ConnectionStatus::Connected {
                    addr.do_send(GetStates);
                }
            }
            _ = tokio::signal::ctrl_c() => break,
        }
    }

    addr.send(Disconnect).await?;
    if let Ok(store) = store.lock() {
        info!("{} entities known at shutdown", store.len());
    }
    Ok(())
}

async fn call(
    cfg: Settings,
    trace: Option<MessageTracing>,
    command: DeviceCommand,
) -> anyhow::Result<()> {
    let request = CallService::try_from(&command)?;
    let (addr, mut status) = start_connection(&cfg, trace).await?;

    while let Some(change) = status.next().await {
        match change.status {
            ConnectionStatus::Connected => {
                addr.send(request).await??;
                info!("Sent {} to {}", command.cmd_id, command.entity_id);
                // give the socket time to flush the request
                actix::clock::sleep(Duration::from_millis(500)).await;
                addr.send(Disconnect).await?;
                return Ok(());
            }
            ConnectionStatus::Error => {
                addr.send(Disconnect).await?;
                return Err(anyhow!(
                    "Connection failed: {}",
                    change.error.unwrap_or_default()
                ));
            }
            _ => {}
        }
    }
    Err(anyhow!("Connection stopped"))
}

async fn voice(cfg: Settings, url: Url, input: &Path, output: PathBuf) -> anyhow::Result<()> {
    let audio = std::fs::read(input)
        .with_context(|| format!("Failed to read audio file {}", input.display()))?;

    let (tx, mut updates) = mpsc::unbounded();
    let printer = UpdatePrinter { tx }.start();

    let session = VoiceSession::new(AudioStreamer::new(
        FileOutput::new(output),
        &cfg.voice.streamer,
    ));
    let client = VoiceClient::new(
        url,
        new_websocket_client(Duration::from_secs(cfg.hass.connection_timeout as u64)),
        session,
        Some(printer.recipient()),
    )
    .start();
    client.do_send(SendAudio(Bytes::from(audio)));

    let result = loop {
        tokio::select! {
            update = updates.next() => match update {
                Some(SessionUpdate::ResponseComplete(_)) => break Ok(()),
                Some(SessionUpdate::Failed(e)) => break Err(anyhow!("Voice request failed: {e}")),
                Some(_) => {}
                None => break Err(anyhow!("Voice client stopped")),
            },
            _ = tokio::signal::ctrl_c() => break Ok(()),
        }
    };

    client.do_send(Close);
    result
}

/// Logs voice session updates and forwards them to the main task.
struct UpdatePrinter {
    tx: mpsc::UnboundedSender<SessionUpdate>,
}

impl Actor for UpdatePrinter {
    type Context = Context<Self>;
}

impl Handler<SessionUpdate> for UpdatePrinter {
    type Result = ();

    fn handle(&mut self, msg: SessionUpdate, _: &mut Self::Context) -> Self::Result {
        match &msg {
            SessionUpdate::Transcript(text) => info!("You: {text}"),
            SessionUpdate::ResponseComplete(text) => info!("Assistant: {text}"),
            SessionUpdate::Failed(e) => error!("Voice error: {e}"),
            SessionUpdate::ResponseText(_) | SessionUpdate::Interrupted => {}
        }
        let _ = self.tx.unbounded_send(msg);
    }
}
