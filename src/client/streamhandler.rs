// Copyright (c) 2022 Unfolded Circle ApS, Markus Zehnder <markus.z@unfoldedcircle.com>
// SPDX-License-Identifier: MPL-2.0

//! StreamHandler trait implementation to receive WebSocket frames.

use actix::{Context, Running, StreamHandler};
use awc::error::WsProtocolError;
use awc::ws::{self, Frame};
use log::{debug, error, info, warn};

use crate::client::{HassConnection, SocketInput};

impl StreamHandler<SocketInput> for HassConnection {
    fn handle(&mut self, msg: SocketInput, ctx: &mut Self::Context) {
        let actions = match msg {
            SocketInput::Frame(generation, _) | SocketInput::Closed(generation)
                if generation != self.generation =>
            {
                return;
            }
            SocketInput::Frame(_, Err(e)) => {
                error!("[{}] Protocol error: {e}", self.id());
                self.close_socket(ctx);
                self.manager.on_close(&e.to_string())
            }
            SocketInput::Frame(_, Ok(frame)) => match frame {
                Frame::Text(txt) => match std::str::from_utf8(&txt) {
                    Ok(txt) => self.manager.on_text(txt),
                    Err(e) => {
                        warn!("[{}] Ignoring invalid UTF-8 text message: {e}", self.id());
                        return;
                    }
                },
                Frame::Binary(_) => {
                    warn!("[{}] Binary messages not supported", self.id());
                    return;
                }
                Frame::Ping(bytes) => {
                    if let Some(sink) = self.sink.as_mut() {
                        let _ = sink.write(ws::Message::Pong(bytes));
                    }
                    return;
                }
                Frame::Pong(_) => return,
                Frame::Close(reason) => {
                    info!("[{}] HA closed connection. Reason: {reason:?}", self.id());
                    self.close_socket(ctx);
                    self.manager.on_close("closed by server")
                }
                Frame::Continuation(_) => {
                    error!(
                        "[{}] Continuation frames not supported! Disconnecting",
                        self.id()
                    );
                    self.close_socket(ctx);
                    self.manager.on_close("unsupported continuation frame")
                }
            },
            SocketInput::Closed(_) => {
                info!("[{}] Connection closed", self.id());
                self.close_socket(ctx);
                self.manager.on_close("connection closed")
            }
        };
        self.execute(actions, ctx);
    }

    fn started(&mut self, _: &mut Context<Self>) {
        debug!("[{}] HA StreamHandler connected", self.id());
    }

    /// The actor outlives the stream of a single socket.
    fn finished(&mut self, _: &mut Context<Self>) {
        debug!("[{}] HA StreamHandler disconnected", self.id());
    }
}

impl actix::io::WriteHandler<WsProtocolError> for HassConnection {
    fn error(&mut self, err: WsProtocolError, _: &mut Self::Context) -> Running {
        warn!("[{}] WebSocket write error: {err}", self.id());
        Running::Continue
    }

    fn finished(&mut self, _: &mut Self::Context) {
        debug!("[{}] WebSocket sink closed", self.id());
    }
}
