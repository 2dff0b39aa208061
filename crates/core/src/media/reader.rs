use std::fs::File;
use std::io::{self, BufReader, Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};

use super::FrameSource;
use crate::error::Result;

/// Width of the ASCII-decimal length prefix in front of every frame.
pub const LENGTH_PREFIX_LEN: usize = 5;

/// File-backed [`FrameSource`] over length-prefixed frame records.
///
/// ```text
/// +-------+-------------------+-------+------------- ...
/// | 01234 | 1234 payload bytes| 00512 | 512 bytes
/// +-------+-------------------+-------+------------- ...
/// ```
///
/// Reaching the end of the file rewinds to the first record so playback
/// loops forever. A corrupt or truncated record also rewinds; in the worst
/// case one call yields no frame and the next call starts over.
#[derive(Debug)]
pub struct FrameReader {
    path: PathBuf,
    file: Option<BufReader<File>>,
    frame_number: u32,
}

enum Record {
    Frame(Vec<u8>),
    /// Fewer than five prefix bytes were available.
    ShortPrefix,
    /// Prefix bytes are not a decimal length.
    BadPrefix,
    /// Fewer payload bytes than the prefix announced.
    ShortPayload,
}

impl FrameReader {
    /// Open `path` for sequential frame reads.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = File::open(&path)?;
        tracing::debug!(path = %path.display(), "frame reader opened");
        Ok(Self {
            path,
            file: Some(BufReader::new(file)),
            frame_number: 0,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn is_closed(&self) -> bool {
        self.file.is_none()
    }

    fn rewind(&mut self) -> io::Result<()> {
        self.frame_number = 0;
        match self.file.as_mut() {
            Some(file) => file.seek(SeekFrom::Start(0)).map(|_| ()),
            None => Ok(()),
        }
    }

    fn read_record(file: &mut BufReader<File>) -> io::Result<Record> {
        let mut prefix = Vec::with_capacity(LENGTH_PREFIX_LEN);
        file.by_ref()
            .take(LENGTH_PREFIX_LEN as u64)
            .read_to_end(&mut prefix)?;
        if prefix.len() < LENGTH_PREFIX_LEN {
            return Ok(Record::ShortPrefix);
        }

        let Some(length) = parse_length(&prefix) else {
            return Ok(Record::BadPrefix);
        };

        let mut payload = Vec::with_capacity(length);
        file.by_ref().take(length as u64).read_to_end(&mut payload)?;
        if payload.len() < length {
            return Ok(Record::ShortPayload);
        }
        Ok(Record::Frame(payload))
    }

    fn try_next(&mut self) -> io::Result<Option<Vec<u8>>> {
        let Some(file) = self.file.as_mut() else {
            return Ok(None);
        };

        let record = match Self::read_record(file)? {
            Record::ShortPrefix => {
                tracing::debug!(path = %self.path.display(), "end of media, looping");
                self.rewind()?;
                match self.file.as_mut() {
                    Some(file) => Self::read_record(file)?,
                    None => return Ok(None),
                }
            }
            other => other,
        };

        let frame = match record {
            Record::Frame(frame) => frame,
            Record::ShortPrefix => {
                tracing::warn!(path = %self.path.display(), "media holds no complete frame record");
                self.rewind()?;
                return Ok(None);
            }
            Record::BadPrefix => {
                tracing::warn!(path = %self.path.display(), "invalid frame length prefix, rewinding");
                self.rewind()?;
                return Ok(None);
            }
            Record::ShortPayload => {
                tracing::warn!(path = %self.path.display(), "incomplete frame, rewinding");
                self.rewind()?;
                let retry = match self.file.as_mut() {
                    Some(file) => Self::read_record(file)?,
                    None => return Ok(None),
                };
                match retry {
                    Record::Frame(frame) => frame,
                    _ => {
                        self.rewind()?;
                        return Ok(None);
                    }
                }
            }
        };

        self.frame_number += 1;
        Ok(Some(frame))
    }
}

impl FrameSource for FrameReader {
    fn next_frame(&mut self) -> Option<Vec<u8>> {
        match self.try_next() {
            Ok(frame) => frame,
            Err(e) => {
                tracing::warn!(path = %self.path.display(), error = %e, "frame read failed, rewinding");
                if let Err(e) = self.rewind() {
                    tracing::warn!(path = %self.path.display(), error = %e, "rewind failed");
                }
                None
            }
        }
    }

    fn frame_number(&self) -> u32 {
        self.frame_number
    }

    fn close(&mut self) {
        if self.file.take().is_some() {
            tracing::debug!(path = %self.path.display(), "frame reader closed");
        }
    }
}

/// Parse a five-byte ASCII-decimal length, tolerating surrounding spaces.
fn parse_length(prefix: &[u8]) -> Option<usize> {
    std::str::from_utf8(prefix).ok()?.trim().parse().ok()
}
