// Copyright (c) 2026 Unfolded Circle ApS, Markus Zehnder <markus.z@unfoldedcircle.com>
// SPDX-License-Identifier: MPL-2.0

//! Media backend writing the response audio to a file.

use crate::voice::streamer::{AppendStatus, MediaBackend, MediaError};
use bytes::Bytes;
use log::{debug, info};
use std::fs::File;
use std::io::Write;
use std::path::PathBuf;
use std::time::Duration;

/// Writes received audio to a file instead of an audio device.
///
/// Every response overwrites the file. Appended data counts as fully buffered, so "playback"
/// starts with the first chunk and ends once the file is complete.
pub struct FileOutput {
    path: PathBuf,
    file: Option<File>,
    written: usize,
}

impl FileOutput {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            file: None,
            written: 0,
        }
    }

    /// Number of bytes written for the current response.
    pub fn written(&self) -> usize {
        self.written
    }

    fn file(&mut self) -> Result<&mut File, MediaError> {
        if self.file.is_none() {
            debug!("Creating audio output file {}", self.path.display());
            let file = File::create(&self.path).map_err(runtime_error)?;
            self.file = Some(file);
            self.written = 0;
        }
        self.file
            .as_mut()
            .ok_or_else(|| MediaError::Runtime("output file not open".into()))
    }
}

fn runtime_error(e: std::io::Error) -> MediaError {
    MediaError::Runtime(e.to_string())
}

impl MediaBackend for FileOutput {
    fn is_supported(&self, _: &str) -> bool {
        true
    }

    fn append(&mut self, chunk: &[u8]) -> Result<AppendStatus, MediaError> {
        self.file()?.write_all(chunk).map_err(runtime_error)?;
        self.written += chunk.len();
        Ok(AppendStatus::Done)
    }

    fn buffered_ahead(&self) -> Duration {
        Duration::MAX
    }

    fn play(&mut self) -> Result<(), MediaError> {
        Ok(())
    }

    fn end_of_stream(&mut self) {
        if let Some(mut file) = self.file.take() {
            let _ = file.flush();
            info!(
                "Wrote {} bytes of response audio to {}",
                self.written,
                self.path.display()
            );
        }
    }

    fn play_all(&mut self, data: Bytes) -> Result<(), MediaError> {
        self.file = None;
        std::fs::write(&self.path, &data).map_err(runtime_error)?;
        self.written = data.len();
        info!(
            "Wrote {} bytes of response audio to {}",
            self.written,
            self.path.display()
        );
        Ok(())
    }

    fn stop(&mut self) {
        self.file = None;
    }

    /// The output file is closed after the last chunk.
    fn playback_finished(&self) -> bool {
        self.file.is_none()
    }
}
