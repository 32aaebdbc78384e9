// Copyright (c) 2022 Unfolded Circle ApS, Markus Zehnder <markus.z@unfoldedcircle.com>
// SPDX-License-Identifier: MPL-2.0

//! Home Assistant client WebSocket API implementation with Actix actors.

use crate::client::manager::{Action, ConnectionManager};
use crate::configuration::HomeAssistantSettings;
use crate::util::{MessageTracing, new_websocket_client};
use actix::io::SinkWrite;
use actix::{ActorFutureExt, AsyncContext, Context, SpawnHandle, WrapFuture};
use actix_codec::Framed;
use awc::error::WsProtocolError;
use awc::ws::{CloseCode, CloseReason, Codec, Frame};
use awc::{BoxedSocket, ws};
use futures::StreamExt;
use futures::stream::SplitSink;
use log::{debug, info, warn};
use std::collections::VecDeque;
use std::time::{Duration, Instant};

mod actor;
mod backoff;
mod callbacks;
mod handlers;
pub mod manager;
pub mod messages;
mod model;
pub mod service;
mod status;
mod streamhandler;

pub use callbacks::{Callback, Listener, SubscriptionId};
pub use model::{EntityState, StateChangedEvent};
pub use service::{DeviceCommand, ServiceCall};
pub use status::{ConnectionStatus, StatusChange};

pub(crate) type WsSink = SinkWrite<ws::Message, SplitSink<Framed<BoxedSocket, Codec>, ws::Message>>;

/// Input of the WebSocket stream handler, tagged with the socket generation it originates from.
pub(crate) enum SocketInput {
    Frame(u64, Result<Frame, WsProtocolError>),
    /// The frame stream of the socket ended.
    Closed(u64),
}

/// Home Assistant connection actor.
///
/// Drives a [`ConnectionManager`] with an `awc` WebSocket connection and actor timers. The actor
/// outlives individual WebSocket connections: it reconnects according to the reconnection settings
/// until it receives a [`messages::Disconnect`] message.
pub struct HassConnection {
    manager: ConnectionManager,
    ws_client: awc::Client,
    max_frame_size: usize,
    sink: Option<WsSink>,
    /// Frame stream of the current socket
    stream_handle: Option<SpawnHandle>,
    /// Pending connection request
    connect_handle: Option<SpawnHandle>,
    /// Incremented for every opened or closed socket. Frames of older sockets are ignored.
    generation: u64,
    reconnect_timer: Option<SpawnHandle>,
    heartbeat_timer: Option<SpawnHandle>,
}

impl HassConnection {
    pub fn new(settings: &HomeAssistantSettings) -> Self {
        Self {
            manager: ConnectionManager::new(settings.reconnect.clone(), settings.heartbeat),
            ws_client: new_websocket_client(Duration::from_secs(
                settings.connection_timeout as u64,
            )),
            // align frame size to Home Assistant
            max_frame_size: settings.max_frame_size_kb * 1024,
            sink: None,
            stream_handle: None,
            connect_handle: None,
            generation: 0,
            reconnect_timer: None,
            heartbeat_timer: None,
        }
    }

    /// Override the message tracing set with the `HALIVE_MSG_TRACING` environment variable.
    pub fn with_msg_tracing(mut self, msg_tracing: MessageTracing) -> Self {
        self.manager.set_msg_tracing(msg_tracing);
        self
    }

    fn id(&self) -> &str {
        self.manager.id()
    }

    /// Execute the actions of the connection manager, including all follow-up actions.
    fn execute(&mut self, actions: Vec<Action>, ctx: &mut Context<Self>) {
        let mut queue = VecDeque::from(actions);
        while let Some(action) = queue.pop_front() {
            match action {
                Action::OpenSocket(url) => self.open_socket(url, ctx),
                Action::CloseSocket => self.close_socket(ctx),
                Action::SendText(text) => {
                    let Some(sink) = self.sink.as_mut() else {
                        warn!("[{}] No connection, dropping message", self.id());
                        continue;
                    };
                    if sink.write(ws::Message::Text(text.into())).is_err() {
                        // sink is closed or closing, no chance to send a Close message
                        warn!("[{}] Could not send message, connection lost", self.id());
                        self.close_socket(ctx);
                        queue.extend(self.manager.on_close("write failed"));
                    }
                }
                Action::ScheduleReconnect(delay) => {
                    self.cancel_timer(Timer::Reconnect, ctx);
                    let handle = ctx.run_later(delay, |act, ctx| {
                        act.reconnect_timer = None;
                        let actions = act.manager.on_reconnect_timer();
                        act.execute(actions, ctx);
                    });
                    self.reconnect_timer = Some(handle);
                }
                Action::CancelReconnect => self.cancel_timer(Timer::Reconnect, ctx),
                Action::StartHeartbeat(interval) => {
                    self.cancel_timer(Timer::Heartbeat, ctx);
                    let handle = ctx.run_interval(interval, |act, ctx| {
                        let actions = act.manager.on_heartbeat(Instant::now());
                        act.execute(actions, ctx);
                    });
                    self.heartbeat_timer = Some(handle);
                }
                Action::StopHeartbeat => self.cancel_timer(Timer::Heartbeat, ctx),
            }
        }
    }

    fn open_socket(&mut self, url: url::Url, ctx: &mut Context<Self>) {
        self.close_socket(ctx);
        let generation = self.generation;
        let ws_request = self
            .ws_client
            .ws(url.as_str())
            .max_frame_size(self.max_frame_size);

        let handle = ctx.spawn(
            async move {
                debug!("Connecting to: {url}");
                ws_request.connect().await
            }
            .into_actor(self) // converts future to ActorFuture
            .map(move |result, act, ctx| {
                if generation != act.generation {
                    debug!("[{}] Discarding outdated connection", act.id());
                    return;
                }
                act.connect_handle = None;

                let actions = match result {
                    Ok((_, framed)) => {
                        let (sink, stream) = framed.split();
                        act.sink = Some(SinkWrite::new(sink, ctx));
                        let stream = stream
                            .map(move |frame| SocketInput::Frame(generation, frame))
                            .chain(futures::stream::once(async move {
                                SocketInput::Closed(generation)
                            }));
                        act.stream_handle = Some(ctx.add_stream(stream));
                        act.manager.on_open()
                    }
                    Err(e) => {
                        warn!("[{}] Could not connect: {e}", act.id());
                        act.manager.on_close(&e.to_string())
                    }
                };
                act.execute(actions, ctx);
            }),
        );
        self.connect_handle = Some(handle);
    }

    /// Close the current socket or abort a pending connection request.
    ///
    /// Frames still in flight are ignored.
    fn close_socket(&mut self, ctx: &mut Context<Self>) {
        self.generation += 1;
        if let Some(handle) = self.connect_handle.take() {
            ctx.cancel_future(handle);
        }
        if let Some(mut sink) = self.sink.take() {
            let reason = CloseReason {
                code: CloseCode::Normal,
                description: None,
            };
            // Try graceful shutdown first. A failure just means the socket is already gone.
            let _ = sink.write(ws::Message::Close(Some(reason)));
            sink.close();
        }
        if let Some(handle) = self.stream_handle.take() {
            ctx.cancel_future(handle);
        }
    }

    fn cancel_timer(&mut self, timer: Timer, ctx: &mut Context<Self>) {
        let handle = match timer {
            Timer::Reconnect => self.reconnect_timer.take(),
            Timer::Heartbeat => self.heartbeat_timer.take(),
        };
        if let Some(handle) = handle {
            ctx.cancel_future(handle);
        }
    }

    fn shutdown(&mut self, ctx: &mut Context<Self>) {
        info!("[{}] Shutting down connection", self.id());
        let actions = self.manager.disconnect();
        self.execute(actions, ctx);
    }
}

#[derive(Clone, Copy)]
enum Timer {
    Reconnect,
    Heartbeat,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::messages::{Connect, Disconnect, GetStatus, SubscribeStatus};
    use crate::client::{ConnectionStatus, StatusChange};
    use actix::{Actor, Addr, Handler, Message};
    use actix_web::{App, HttpRequest, HttpResponse, HttpServer, web};
    use std::sync::{Arc, Mutex};

    /// Minimal Home Assistant WebSocket server: authenticates every client.
    ///
    /// `/api/websocket/close` closes the socket after `auth_ok`, `/api/websocket/hold` keeps it open.
    async fn hass_ws(
        req: HttpRequest,
        body: web::Payload,
        mode: web::Path<String>,
    ) -> Result<HttpResponse, actix_web::Error> {
        let (response, mut session, mut msg_stream) = actix_ws::handle(&req, body)?;
        let close_after_auth = mode.into_inner() == "close";

        actix_web::rt::spawn(async move {
            if session
                .text(r#"{"type":"auth_required","ha_version":"2025.10.1"}"#)
                .await
                .is_err()
            {
                return;
            }
            while let Some(Ok(msg)) = msg_stream.next().await {
                let actix_ws::Message::Text(text) = msg else {
                    continue;
                };
                let msg: serde_json::Value = serde_json::from_str(&text).unwrap_or_default();
                if msg["type"] != "auth" {
                    continue;
                }
                if session
                    .text(r#"{"type":"auth_ok","ha_version":"2025.10.1"}"#)
                    .await
                    .is_err()
                {
                    return;
                }
                if close_after_auth {
                    let _ = session.close(None).await;
                    return;
                }
            }
        });

        Ok(response)
    }

    fn start_server() -> u16 {
        let server = HttpServer::new(|| {
            App::new().route("/api/websocket/{mode}", web::get().to(hass_ws))
        })
        .workers(1)
        .disable_signals()
        .bind(("127.0.0.1", 0))
        .unwrap();
        let port = server.addrs()[0].port();
        actix::spawn(server.run());
        port
    }

    fn url(port: u16, mode: &str) -> url::Url {
        url::Url::parse(&format!("ws://127.0.0.1:{port}/api/websocket/{mode}")).unwrap()
    }

    async fn start_connection() -> (Addr<HassConnection>, Arc<Mutex<Vec<ConnectionStatus>>>) {
        let addr = HassConnection::new(&HomeAssistantSettings::default()).start();
        let statuses = Arc::new(Mutex::new(Vec::new()));
        let recorded = statuses.clone();
        addr.send(SubscribeStatus(Box::new(move |change: &StatusChange| {
            recorded.lock().unwrap().push(change.status);
        })))
        .await
        .unwrap();
        (addr, statuses)
    }

    async fn wait_for_status(addr: &Addr<HassConnection>, status: ConnectionStatus) {
        for _ in 0..100 {
            if addr.send(GetStatus).await.unwrap().status == status {
                return;
            }
            actix::clock::sleep(Duration::from_millis(20)).await;
        }
        panic!("Timeout waiting for status {status}");
    }

    /// Feeds a server close into the stream handler, as if sent by the current or previous socket.
    #[derive(Message)]
    #[rtype(result = "()")]
    struct InjectServerClose {
        previous_socket: bool,
    }

    impl Handler<InjectServerClose> for HassConnection {
        type Result = ();

        fn handle(&mut self, msg: InjectServerClose, ctx: &mut Self::Context) -> Self::Result {
            let generation = if msg.previous_socket {
                self.generation - 1
            } else {
                self.generation
            };
            ctx.add_stream(futures::stream::iter([
                SocketInput::Frame(generation, Ok(Frame::Close(None))),
                SocketInput::Closed(generation),
            ]));
        }
    }

    #[actix::test]
    async fn server_close_after_auth_reports_status_sequence() {
        let port = start_server();
        let (addr, statuses) = start_connection().await;

        addr.send(Connect::new(url(port, "close"), "secret".into()))
            .await
            .unwrap();

        // the first reconnection attempt is scheduled after 1s
        for _ in 0..40 {
            if statuses.lock().unwrap().len() >= 5 {
                break;
            }
            actix::clock::sleep(Duration::from_millis(20)).await;
        }
        assert_eq!(
            vec![
                ConnectionStatus::Disconnected,
                ConnectionStatus::Connecting,
                ConnectionStatus::Authenticating,
                ConnectionStatus::Connected,
                ConnectionStatus::Disconnected,
            ],
            *statuses.lock().unwrap()
        );

        addr.send(Disconnect).await.unwrap();
    }

    #[actix::test]
    async fn frames_of_previous_socket_are_ignored() {
        let port = start_server();
        let (addr, _) = start_connection().await;

        addr.send(Connect::new(url(port, "hold"), "secret".into()))
            .await
            .unwrap();
        wait_for_status(&addr, ConnectionStatus::Connected).await;

        addr.send(InjectServerClose {
            previous_socket: true,
        })
        .await
        .unwrap();
        actix::clock::sleep(Duration::from_millis(50)).await;
        assert_eq!(
            ConnectionStatus::Connected,
            addr.send(GetStatus).await.unwrap().status
        );

        addr.send(InjectServerClose {
            previous_socket: false,
        })
        .await
        .unwrap();
        wait_for_status(&addr, ConnectionStatus::Disconnected).await;

        addr.send(Disconnect).await.unwrap();
    }
}
