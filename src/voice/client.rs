// Copyright (c) 2026 Unfolded Circle ApS, Markus Zehnder <markus.z@unfoldedcircle.com>
// SPDX-License-Identifier: MPL-2.0

//! Voice pipeline WebSocket client actor.

use crate::client::WsSink;
use crate::voice::protocol::{ClientMessage, ServerMessage};
use crate::voice::session::{SessionUpdate, VoiceSession};
use crate::voice::streamer::{MediaBackend, MediaError};
use crate::voice::vad::VadEvent;
use actix::io::SinkWrite;
use actix::{
    Actor, ActorContext, ActorFutureExt, AsyncContext, Context, Handler, Message, Recipient,
    Running, StreamHandler, WrapFuture,
};
use awc::error::WsProtocolError;
use awc::ws::{self, CloseCode, CloseReason, Frame};
use bytes::Bytes;
use futures::StreamExt;
use log::{debug, error, info, warn};
use url::Url;

/// Send recorded user audio to the voice server.
///
/// Messages sent while the connection is being established are queued.
#[derive(Debug, Message)]
#[rtype(result = "()")]
pub struct SendAudio(pub Bytes);

/// Close the connection and stop the client.
#[derive(Debug, Default, Message)]
#[rtype(result = "()")]
pub struct Close;

/// Notification of an asynchronous audio output.
#[derive(Debug, Message)]
#[rtype(result = "()")]
pub enum MediaEvent {
    /// A pending append operation completed.
    AppendComplete,
    PlaybackEnded,
    Error(MediaError),
}

/// Voice pipeline connection actor.
///
/// Connects to the voice server when started and feeds the server messages into a
/// [`VoiceSession`]. Voice activity events of the user's microphone are handled for barge-in. The
/// actor stops when the connection is closed.
pub struct VoiceClient<B: MediaBackend> {
    url: Url,
    ws_client: awc::Client,
    session: VoiceSession<B>,
    updates: Option<Recipient<SessionUpdate>>,
    sink: Option<WsSink>,
    /// Outgoing messages until the connection is established
    pending: Vec<ClientMessage>,
}

impl<B: MediaBackend + Unpin + 'static> VoiceClient<B> {
    pub fn new(
        url: Url,
        ws_client: awc::Client,
        session: VoiceSession<B>,
        updates: Option<Recipient<SessionUpdate>>,
    ) -> Self {
        Self {
            url,
            ws_client,
            session,
            updates,
            sink: None,
            pending: Vec::new(),
        }
    }

    fn notify(&self, update: SessionUpdate) {
        if let Some(recipient) = self.updates.as_ref() {
            recipient.do_send(update);
        }
    }

    fn send(&mut self, msg: ClientMessage, ctx: &mut Context<Self>) {
        let Some(sink) = self.sink.as_mut() else {
            self.pending.push(msg);
            return;
        };
        let text = match serde_json::to_string(&msg) {
            Ok(text) => text,
            Err(e) => {
                error!("Error serializing voice message: {e}");
                return;
            }
        };
        if sink.write(ws::Message::Text(text.into())).is_err() {
            warn!("Could not send voice message, connection lost");
            ctx.stop();
        }
    }

    fn connect(&mut self, ctx: &mut Context<Self>) {
        let url = self.url.clone();
        let ws_request = self.ws_client.ws(url.as_str());

        ctx.spawn(
            async move {
                debug!("Connecting to voice server: {url}");
                ws_request.connect().await
            }
            .into_actor(self)
            .map(|result, act, ctx| match result {
                Ok((_, framed)) => {
                    info!("Connected to voice server");
                    let (sink, stream) = framed.split();
                    act.sink = Some(SinkWrite::new(sink, ctx));
                    ctx.add_stream(stream);
                    for msg in std::mem::take(&mut act.pending) {
                        act.send(msg, ctx);
                    }
                }
                Err(e) => {
                    error!("Could not connect to voice server: {e}");
                    act.notify(SessionUpdate::Failed(e.to_string()));
                    ctx.stop();
                }
            }),
        );
    }

    fn on_text(&mut self, text: &[u8]) {
        let msg = match serde_json::from_slice::<ServerMessage>(text) {
            Ok(msg) => msg,
            Err(e) => {
                warn!("Ignoring invalid voice server message: {e}");
                return;
            }
        };
        if let Some(update) = self.session.handle_server_message(msg) {
            self.notify(update);
        }
    }
}

impl<B: MediaBackend + Unpin + 'static> Actor for VoiceClient<B> {
    type Context = Context<Self>;

    fn started(&mut self, ctx: &mut Self::Context) {
        self.connect(ctx);
    }

    fn stopping(&mut self, _: &mut Self::Context) -> Running {
        self.session.streamer_mut().stop();
        if let Some(mut sink) = self.sink.take() {
            let reason = CloseReason {
                code: CloseCode::Normal,
                description: None,
            };
            let _ = sink.write(ws::Message::Close(Some(reason)));
            sink.close();
        }
        Running::Stop
    }

    fn stopped(&mut self, _: &mut Self::Context) {
        debug!("Voice client stopped");
    }
}

impl<B: MediaBackend + Unpin + 'static> StreamHandler<Result<Frame, WsProtocolError>>
    for VoiceClient<B>
{
    fn handle(&mut self, msg: Result<Frame, WsProtocolError>, ctx: &mut Self::Context) {
        match msg {
            Ok(Frame::Text(txt)) => self.on_text(&txt),
            Ok(Frame::Ping(bytes)) => {
                if let Some(sink) = self.sink.as_mut() {
                    let _ = sink.write(ws::Message::Pong(bytes));
                }
            }
            Ok(Frame::Pong(_)) => {}
            Ok(Frame::Binary(_)) => warn!("Binary voice messages not supported"),
            Ok(Frame::Close(reason)) => {
                info!("Voice server closed connection. Reason: {reason:?}");
                ctx.stop();
            }
            Ok(Frame::Continuation(_)) => {
                error!("Continuation frames not supported! Disconnecting");
                ctx.stop();
            }
            Err(e) => {
                error!("Voice protocol error: {e}");
                ctx.stop();
            }
        }
    }
}

impl<B: MediaBackend + Unpin + 'static> actix::io::WriteHandler<WsProtocolError>
    for VoiceClient<B>
{
}

impl<B: MediaBackend + Unpin + 'static> Handler<SendAudio> for VoiceClient<B> {
    type Result = ();

    fn handle(&mut self, msg: SendAudio, ctx: &mut Self::Context) -> Self::Result {
        debug!("Sending {} bytes of audio", msg.0.len());
        let msg = self.session.audio_input(msg.0);
        self.send(msg, ctx);
    }
}

impl<B: MediaBackend + Unpin + 'static> Handler<VadEvent> for VoiceClient<B> {
    type Result = ();

    fn handle(&mut self, msg: VadEvent, ctx: &mut Self::Context) -> Self::Result {
        if let Some(interrupt) = self.session.on_vad_event(msg) {
            self.send(interrupt, ctx);
            self.notify(SessionUpdate::Interrupted);
        }
    }
}

impl<B: MediaBackend + Unpin + 'static> Handler<MediaEvent> for VoiceClient<B> {
    type Result = ();

    fn handle(&mut self, msg: MediaEvent, _: &mut Self::Context) -> Self::Result {
        let streamer = self.session.streamer_mut();
        match msg {
            MediaEvent::AppendComplete => streamer.on_append_complete(),
            MediaEvent::PlaybackEnded => streamer.on_playback_ended(),
            MediaEvent::Error(e) => streamer.on_error(e),
        }
    }
}

impl<B: MediaBackend + Unpin + 'static> Handler<Close> for VoiceClient<B> {
    type Result = ();

    fn handle(&mut self, _: Close, ctx: &mut Self::Context) -> Self::Result {
        ctx.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::configuration::StreamerSettings;
    use crate::util::new_websocket_client;
    use crate::voice::streamer::{AppendStatus, AudioStreamer};
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    struct NullOutput;

    impl MediaBackend for NullOutput {
        fn is_supported(&self, _: &str) -> bool {
            true
        }
        fn append(&mut self, _: &[u8]) -> Result<AppendStatus, MediaError> {
            Ok(AppendStatus::Done)
        }
        fn buffered_ahead(&self) -> Duration {
            Duration::ZERO
        }
        fn play(&mut self) -> Result<(), MediaError> {
            Ok(())
        }
        fn end_of_stream(&mut self) {}
        fn play_all(&mut self, _: Bytes) -> Result<(), MediaError> {
            Ok(())
        }
        fn stop(&mut self) {}
    }

    #[derive(Default)]
    struct Updates {
        received: Arc<Mutex<Vec<SessionUpdate>>>,
    }

    impl Actor for Updates {
        type Context = Context<Self>;
    }

    impl Handler<SessionUpdate> for Updates {
        type Result = ();

        fn handle(&mut self, msg: SessionUpdate, _: &mut Self::Context) -> Self::Result {
            self.received.lock().unwrap().push(msg);
        }
    }

    #[actix::test]
    async fn connection_failure_is_reported_and_stops_client() {
        let updates = Updates::default();
        let received = updates.received.clone();
        let recipient = updates.start().recipient();

        let session = VoiceSession::new(AudioStreamer::new(NullOutput, &StreamerSettings::default()));
        let client = VoiceClient::new(
            Url::parse("ws://127.0.0.1:1/ws/voice").unwrap(),
            new_websocket_client(Duration::from_secs(1)),
            session,
            Some(recipient),
        )
        .start();
        client.do_send(SendAudio(Bytes::from_static(b"pcm")));

        actix::clock::sleep(Duration::from_millis(1500)).await;

        let received = received.lock().unwrap();
        assert_eq!(1, received.len(), "{received:?}");
        assert!(matches!(received[0], SessionUpdate::Failed(_)));
    }
}
