use std::io;
use std::path::PathBuf;

use async_trait::async_trait;
use bytes::BytesMut;
use chrono::{DateTime, Utc};
use futures_util::stream::BoxStream;
use futures_util::StreamExt;
use tokio_util::codec::{Decoder, FramedRead, LinesCodec, LinesCodecError};
use tracing::warn;

use crate::model::is_valid_position;

/// One reading from the device's position sensor.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Fix {
    pub latitude: f64,
    pub longitude: f64,
    pub observed_at: DateTime<Utc>,
}

pub type FixStream = BoxStream<'static, crate::Result<Fix>>;

/// A device position sensor.
///
/// `watch` subscribes to the sensor; the subscription lasts as long as the
/// returned stream. An `Err` from `watch` means the sensor is unavailable.
#[async_trait]
pub trait PositionSource: Send {
    async fn watch(&mut self) -> crate::Result<FixStream>;
}

#[derive(Debug, Clone)]
pub enum FixInput {
    Stdin,
    File(PathBuf),
}

/// Reads fixes, one per line, from stdin or a file (a serial GPS bridge, a
/// replay log, a FIFO fed by another process).
pub struct LineSource {
    input: FixInput,
}

impl LineSource {
    pub fn new(input: FixInput) -> Self {
        Self { input }
    }
}

#[async_trait]
impl PositionSource for LineSource {
    async fn watch(&mut self) -> crate::Result<FixStream> {
        match &self.input {
            FixInput::Stdin => Ok(FramedRead::new(tokio::io::stdin(), FixCodec::new()).boxed()),
            FixInput::File(path) => {
                let file = tokio::fs::File::open(path).await.map_err(|err| {
                    crate::Error::SourceUnavailable(format!("{}: {}", path.display(), err))
                })?;
                Ok(FramedRead::new(file, FixCodec::new()).boxed())
            }
        }
    }
}

/// Decodes `lat,lng` or `lat lng` lines into fixes stamped with the time they
/// were read. Blank lines and `#` comments are skipped; malformed lines are
/// logged and skipped.
pub struct FixCodec {
    lines: LinesCodec,
}

type NextLine = fn(&mut LinesCodec, &mut BytesMut) -> Result<Option<String>, LinesCodecError>;

impl FixCodec {
    pub fn new() -> Self {
        Self {
            lines: LinesCodec::new_with_max_length(1024),
        }
    }

    /// Pulls lines until one holds a fix. Lines that are too long or not
    /// UTF-8 are dropped; only a read failure ends the stream.
    fn next_fix(
        &mut self,
        src: &mut BytesMut,
        next_line: NextLine,
    ) -> crate::Result<Option<Fix>> {
        loop {
            match next_line(&mut self.lines, src) {
                Ok(Some(line)) => {
                    if let Some(fix) = fix_from(&line) {
                        return Ok(Some(fix));
                    }
                }
                Ok(None) => return Ok(None),
                // The codec discards up to the next newline on its own.
                Err(LinesCodecError::MaxLineLengthExceeded) => {
                    warn!("skipping overlong fix line");
                }
                Err(LinesCodecError::Io(err)) if err.kind() == io::ErrorKind::InvalidData => {
                    warn!(error = %err, "skipping fix line that is not utf-8");
                }
                Err(err) => return Err(err.into()),
            }
        }
    }
}

fn fix_from(line: &str) -> Option<Fix> {
    let line = line.trim();
    if line.is_empty() || line.starts_with('#') {
        return None;
    }
    match FixParse::new(line).fix() {
        Ok(fix) => Some(fix),
        Err(err) => {
            warn!(%line, error = %err, "skipping malformed fix");
            None
        }
    }
}

impl Decoder for FixCodec {
    type Item = Fix;
    type Error = crate::Error;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        self.next_fix(src, <LinesCodec as Decoder>::decode)
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        self.next_fix(src, <LinesCodec as Decoder>::decode_eof)
    }
}

/// Cursor over the numeric fields of one fix line.
struct FixParse<'a> {
    parts: std::str::Split<'a, fn(char) -> bool>,
}

#[derive(Debug)]
enum FixParseError {
    /// The line ran out of fields.
    EndOfLine,
    Invalid(String),
}

impl std::fmt::Display for FixParseError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FixParseError::EndOfLine => f.write_str("expected latitude and longitude"),
            FixParseError::Invalid(msg) => f.write_str(msg),
        }
    }
}

fn is_separator(c: char) -> bool {
    c == ',' || c.is_whitespace()
}

impl<'a> FixParse<'a> {
    fn new(line: &'a str) -> Self {
        Self {
            parts: line.split(is_separator as fn(char) -> bool),
        }
    }

    fn next_double(&mut self) -> Result<f64, FixParseError> {
        let part = self
            .parts
            .by_ref()
            .find(|part| !part.is_empty())
            .ok_or(FixParseError::EndOfLine)?;
        part.parse::<f64>()
            .map_err(|_| FixParseError::Invalid(format!("invalid number {:?}", part)))
    }

    fn finish(&mut self) -> Result<(), FixParseError> {
        match self.parts.by_ref().find(|part| !part.is_empty()) {
            None => Ok(()),
            Some(extra) => Err(FixParseError::Invalid(format!(
                "unexpected trailing field {:?}",
                extra
            ))),
        }
    }

    fn fix(mut self) -> Result<Fix, FixParseError> {
        let latitude = self.next_double()?;
        let longitude = self.next_double()?;
        self.finish()?;
        if !is_valid_position(latitude, longitude) {
            return Err(FixParseError::Invalid(format!(
                "position out of range: {}, {}",
                latitude, longitude
            )));
        }
        Ok(Fix {
            latitude,
            longitude,
            observed_at: Utc::now(),
        })
    }
}
