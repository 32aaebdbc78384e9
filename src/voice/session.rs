// Copyright (c) 2026 Unfolded Circle ApS, Markus Zehnder <markus.z@unfoldedcircle.com>
// SPDX-License-Identifier: MPL-2.0

//! Voice conversation state with barge-in support.

use crate::voice::protocol::{ClientMessage, ServerMessage};
use crate::voice::streamer::{AudioStreamer, MediaBackend};
use crate::voice::vad::VadEvent;
use actix::Message;
use bytes::Bytes;
use log::{debug, info, warn};

/// Conversation progress reported to the session consumer.
#[derive(Debug, Clone, PartialEq, Message)]
#[rtype(result = "()")]
pub enum SessionUpdate {
    /// Transcript of the user's speech.
    Transcript(String),
    /// Assistant response text received so far.
    ResponseText(String),
    ResponseComplete(String),
    /// The user interrupted the assistant.
    Interrupted,
    Failed(String),
}

/// One voice conversation: tracks the assistant response and feeds its audio to the streamer.
///
/// If the user starts speaking while a response is in progress, the response playback is stopped
/// and an `interrupt` message must be sent to the server.
pub struct VoiceSession<B: MediaBackend> {
    streamer: AudioStreamer<B>,
    transcript: String,
    response: String,
    /// Server is sending a response.
    responding: bool,
    /// Remaining messages of an interrupted response are dropped.
    interrupted: bool,
}

impl<B: MediaBackend> VoiceSession<B> {
    pub fn new(streamer: AudioStreamer<B>) -> Self {
        Self {
            streamer,
            transcript: String::new(),
            response: String::new(),
            responding: false,
            interrupted: false,
        }
    }

    pub fn transcript(&self) -> &str {
        &self.transcript
    }

    pub fn response(&self) -> &str {
        &self.response
    }

    /// A response is being received or played back.
    pub fn is_responding(&self) -> bool {
        self.responding || self.streamer.is_playing()
    }

    pub fn streamer(&self) -> &AudioStreamer<B> {
        &self.streamer
    }

    pub fn streamer_mut(&mut self) -> &mut AudioStreamer<B> {
        &mut self.streamer
    }

    pub fn audio_input(&self, data: Bytes) -> ClientMessage {
        ClientMessage::AudioInput { data }
    }

    pub fn handle_server_message(&mut self, msg: ServerMessage) -> Option<SessionUpdate> {
        match msg {
            ServerMessage::SttResult { text } => {
                info!("Transcript: {text}");
                self.interrupted = false;
                self.responding = true;
                self.response.clear();
                self.transcript = text.clone();
                Some(SessionUpdate::Transcript(text))
            }
            ServerMessage::LlmToken { .. } | ServerMessage::AudioChunk { .. }
                if self.interrupted =>
            {
                debug!("Dropping message of interrupted response");
                None
            }
            ServerMessage::LlmToken { token } => {
                self.responding = true;
                self.response.push_str(&token);
                Some(SessionUpdate::ResponseText(self.response.clone()))
            }
            ServerMessage::AudioChunk { data } => {
                self.responding = true;
                self.streamer.push(data);
                None
            }
            ServerMessage::ResponseComplete => {
                if std::mem::take(&mut self.interrupted) {
                    return None;
                }
                self.responding = false;
                self.streamer.finish();
                Some(SessionUpdate::ResponseComplete(self.response.clone()))
            }
            ServerMessage::Error { message } => {
                warn!("Voice server error: {message}");
                self.responding = false;
                self.interrupted = false;
                self.streamer.finish();
                Some(SessionUpdate::Failed(message))
            }
        }
    }

    /// Handle a voice activity transition of the user's microphone.
    ///
    /// Returns the `interrupt` message to send if the user barged in.
    pub fn on_vad_event(&mut self, event: VadEvent) -> Option<ClientMessage> {
        if event != VadEvent::SpeechStart || !self.is_responding() {
            return None;
        }
        info!("User interrupted the response");
        self.streamer.stop();
        self.interrupted = self.responding;
        self.responding = false;
        Some(ClientMessage::Interrupt)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::configuration::StreamerSettings;
    use crate::voice::streamer::{AppendStatus, MediaError};
    use std::time::Duration;

    #[derive(Default)]
    struct Recorder {
        appended: usize,
        stopped: usize,
    }

    impl MediaBackend for Recorder {
        fn is_supported(&self, _: &str) -> bool {
            true
        }
        fn append(&mut self, _: &[u8]) -> Result<AppendStatus, MediaError> {
            self.appended += 1;
            Ok(AppendStatus::Done)
        }
        fn buffered_ahead(&self) -> Duration {
            Duration::from_secs(self.appended as u64)
        }
        fn play(&mut self) -> Result<(), MediaError> {
            Ok(())
        }
        fn end_of_stream(&mut self) {}
        fn play_all(&mut self, _: Bytes) -> Result<(), MediaError> {
            Ok(())
        }
        fn stop(&mut self) {
            self.stopped += 1;
        }
    }

    fn session() -> VoiceSession<Recorder> {
        VoiceSession::new(AudioStreamer::new(
            Recorder::default(),
            &StreamerSettings::default(),
        ))
    }

    fn token(token: &str) -> ServerMessage {
        ServerMessage::LlmToken {
            token: token.into(),
        }
    }

    fn audio() -> ServerMessage {
        ServerMessage::AudioChunk {
            data: Bytes::from_static(b"mp3"),
        }
    }

    #[test]
    fn response_tokens_are_accumulated() {
        let mut session = session();
        assert_eq!(
            Some(SessionUpdate::Transcript("hi".into())),
            session.handle_server_message(ServerMessage::SttResult { text: "hi".into() })
        );
        session.handle_server_message(token("Hello"));
        assert_eq!(
            Some(SessionUpdate::ResponseText("Hello there".into())),
            session.handle_server_message(token(" there"))
        );
        assert_eq!(
            Some(SessionUpdate::ResponseComplete("Hello there".into())),
            session.handle_server_message(ServerMessage::ResponseComplete)
        );
        assert_eq!("hi", session.transcript());
    }

    #[test]
    fn speech_during_response_interrupts() {
        let mut session = session();
        session.handle_server_message(ServerMessage::SttResult { text: "hi".into() });
        session.handle_server_message(token("Hello"));
        session.handle_server_message(audio());
        assert!(session.is_responding());

        assert_eq!(
            Some(ClientMessage::Interrupt),
            session.on_vad_event(VadEvent::SpeechStart)
        );
        assert!(!session.is_responding());
        assert_eq!(1, session.streamer().backend().stopped);

        // late messages of the interrupted response are dropped
        assert_eq!(None, session.handle_server_message(token(" world")));
        session.handle_server_message(audio());
        assert_eq!(1, session.streamer().backend().appended);
        assert_eq!(None, session.handle_server_message(ServerMessage::ResponseComplete));

        // the next turn is processed again
        session.handle_server_message(ServerMessage::SttResult { text: "stop".into() });
        session.handle_server_message(token("Ok"));
        assert_eq!("Ok", session.response());
    }

    #[test]
    fn speech_while_playing_completed_response_interrupts() {
        let mut session = session();
        session.handle_server_message(audio());
        session.handle_server_message(ServerMessage::ResponseComplete);
        assert!(session.is_responding(), "playback still running");

        assert_eq!(
            Some(ClientMessage::Interrupt),
            session.on_vad_event(VadEvent::SpeechStart)
        );
    }

    #[test]
    fn speech_while_idle_is_no_barge_in() {
        let mut session = session();
        assert_eq!(None, session.on_vad_event(VadEvent::SpeechStart));

        session.handle_server_message(audio());
        session.handle_server_message(ServerMessage::ResponseComplete);
        session.streamer_mut().on_playback_ended();
        assert_eq!(None, session.on_vad_event(VadEvent::SpeechStart));
        assert_eq!(0, session.streamer().backend().stopped);
    }

    #[test]
    fn speech_end_never_interrupts() {
        let mut session = session();
        session.handle_server_message(token("Hello"));
        assert_eq!(None, session.on_vad_event(VadEvent::SpeechEnd));
    }

    #[test]
    fn server_error_ends_response() {
        let mut session = session();
        session.handle_server_message(token("Hel"));
        assert_eq!(
            Some(SessionUpdate::Failed("LLM timeout".into())),
            session.handle_server_message(ServerMessage::Error {
                message: "LLM timeout".into()
            })
        );
        assert!(!session.responding);
    }
}
