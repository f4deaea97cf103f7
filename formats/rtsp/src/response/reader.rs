use std::{
    io::{self, BufRead, Read},
    str::FromStr,
};

use tokio_util::bytes::Buf;
use utils::traits::reader::{ReadFrom, ReadRemainingFrom, TryReadFrom, TryReadRemainingFrom};

use crate::{
    consts::{
        common::{LF, SPACE, SPACE_STR},
        status::RtspStatus,
        version::RtspVersion,
    },
    errors::RtspMessageError,
    header::RtspHeaders,
    util::TextReader,
};

use super::RtspResponse;

impl<R: io::BufRead> ReadRemainingFrom<RtspVersion, R> for RtspResponse {
    type Error = RtspMessageError;
    fn read_remaining_from(header: RtspVersion, mut reader: R) -> Result<Self, Self::Error> {
        let buffer = reader.fill_buf()?;
        let (res, position) = {
            let mut cursor = io::Cursor::new(buffer);
            (
                Self::try_read_remaining_from(header, &mut cursor)?.ok_or(
                    RtspMessageError::InvalidRtspMessageFormat(format!(
                        "rtsp response is not complete: {}",
                        String::from_utf8_lossy(buffer)
                    )),
                ),
                cursor.position(),
            )
        };

        if res.is_ok() {
            reader.consume(position as usize);
        }
        res
    }
}

impl<R: io::BufRead> ReadFrom<R> for RtspResponse {
    type Error = RtspMessageError;
    fn read_from(mut reader: R) -> Result<Self, Self::Error> {
        let buffer = reader.fill_buf()?;
        let (res, position) = {
            let mut cursor = io::Cursor::new(&buffer);
            (
                Self::try_read_from(&mut cursor)?.ok_or(
                    RtspMessageError::InvalidRtspMessageFormat(format!(
                        "rtsp response is not complete: {}",
                        String::from_utf8_lossy(buffer)
                    )),
                ),
                cursor.position(),
            )
        };
        if res.is_ok() {
            reader.consume(position as usize);
        }
        res
    }
}

impl FromStr for RtspResponse {
    type Err = RtspMessageError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::read_from(s.as_bytes())
    }
}

impl<R: AsRef<[u8]>> TryReadRemainingFrom<RtspVersion, R> for RtspResponse {
    type Error = RtspMessageError;
    fn try_read_remaining_from(
        header: RtspVersion,
        reader: &mut io::Cursor<R>,
    ) -> Result<Option<Self>, Self::Error> {
        if !reader.has_remaining() {
            return Ok(None);
        }
        if !TextReader::new(reader.by_ref()).expect(&[SPACE])? {
            return Err(RtspMessageError::BadStartLine(
                "rtsp response status line expects a space after the version".to_string(),
            ));
        }
        let line = TextReader::new(reader.by_ref()).try_read_line()?;
        let Some(line) = line else {
            return Ok(None);
        };
        let trimmed = line.trim();
        let code = trimmed
            .split_once(SPACE_STR)
            .map(|(code, _reason)| code)
            .unwrap_or(trimmed);
        let code: u16 = code
            .parse()
            .map_err(|_| RtspMessageError::BadStartLine(line.clone()))?;
        let status = RtspStatus::try_from(code)?;

        let headers = RtspHeaders::try_read_from(reader.by_ref())?;
        let Some(headers) = headers else {
            return Ok(None);
        };

        let body = match headers.content_length() {
            Some(length) if length > 0 => {
                let mut text_reader = TextReader::new(reader.by_ref());
                match text_reader.try_read_exact(length)? {
                    None => return Ok(None),
                    body => body,
                }
            }
            _ => None,
        };

        Ok(Some(Self {
            status,
            version: header,
            headers,
            body,
        }))
    }
}

impl<R: AsRef<[u8]>> TryReadFrom<R> for RtspResponse {
    type Error = RtspMessageError;
    fn try_read_from(reader: &mut io::Cursor<R>) -> Result<Option<Self>, Self::Error> {
        if !reader.fill_buf()?.contains(&LF) {
            return Ok(None);
        }
        let mut first_line = String::new();
        reader.fill_buf()?.read_line(&mut first_line)?;

        if let Some((first_word, _)) = first_line.split_once(SPACE_STR)
            && let Ok(version) = RtspVersion::from_str(first_word)
        {
            reader.consume(first_word.len());
            return Self::try_read_remaining_from(version, reader.by_ref());
        }
        Err(RtspMessageError::BadStartLine(first_line))
    }
}
