use std::{fmt, str::FromStr};

use crate::errors::RtspMessageError;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RtpInfoEntry {
    pub url: Option<String>,
    pub seq: Option<u16>,
    pub rtptime: Option<u32>,
}

/// `RTP-Info: url=...;seq=N;rtptime=N, url=...`. Some servers spell the
/// sequence parameter `seqno`; both are accepted.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RtpInfo {
    pub entries: Vec<RtpInfoEntry>,
}

impl RtpInfo {
    pub fn first_seq(&self) -> Option<u16> {
        self.entries.iter().find_map(|entry| entry.seq)
    }

    pub fn first_rtptime(&self) -> Option<u32> {
        self.entries.iter().find_map(|entry| entry.rtptime)
    }
}

impl FromStr for RtpInfo {
    type Err = RtspMessageError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut entries = Vec::new();
        for part in s.split(',').map(str::trim).filter(|p| !p.is_empty()) {
            let mut entry = RtpInfoEntry::default();
            for param in part.split(';').map(str::trim) {
                let (k, v) = param.split_once('=').unwrap_or((param, ""));
                match k {
                    "url" => entry.url = Some(v.trim_matches('"').to_owned()),
                    "seq" | "seqno" => {
                        entry.seq = Some(v.parse().map_err(|err| {
                            RtspMessageError::InvalidRtpInfoHeader(format!(
                                "parse seq failed: {}, {}",
                                v, err
                            ))
                        })?)
                    }
                    "rtptime" => {
                        entry.rtptime = Some(v.parse().map_err(|err| {
                            RtspMessageError::InvalidRtpInfoHeader(format!(
                                "parse rtptime failed: {}, {}",
                                v, err
                            ))
                        })?)
                    }
                    _ => {}
                }
            }
            entries.push(entry);
        }

        if entries.is_empty() {
            return Err(RtspMessageError::InvalidRtpInfoHeader(s.to_owned()));
        }
        Ok(Self { entries })
    }
}

impl fmt::Display for RtpInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let entries: Vec<String> = self
            .entries
            .iter()
            .map(|entry| {
                let mut params = Vec::new();
                if let Some(url) = &entry.url {
                    params.push(format!("url={}", url));
                }
                if let Some(seq) = &entry.seq {
                    params.push(format!("seq={}", seq));
                }
                if let Some(rtptime) = &entry.rtptime {
                    params.push(format!("rtptime={}", rtptime));
                }
                params.join(";")
            })
            .collect();
        write!(f, "{}", entries.join(", "))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn single_track() {
        let info: RtpInfo = "url=rtsp://h/track1;seqno=17;rtptime=900000".parse().unwrap();
        assert_eq!(info.entries.len(), 1);
        assert_eq!(info.entries[0].url.as_deref(), Some("rtsp://h/track1"));
        assert_eq!(info.first_seq(), Some(17));
        assert_eq!(info.first_rtptime(), Some(900_000));
    }

    #[test]
    fn multiple_tracks_and_seq_spelling() {
        let info: RtpInfo =
            "url=rtsp://e/v;seq=45102;rtptime=12345678, url=rtsp://e/a;seq=30211"
                .parse()
                .unwrap();
        assert_eq!(info.entries.len(), 2);
        assert_eq!(info.entries[1].seq, Some(30211));
        assert_eq!(info.entries[1].rtptime, None);
    }

    #[test]
    fn display_uses_canonical_seq() {
        let info: RtpInfo = "url=rtsp://h/track1;seqno=17;rtptime=900000".parse().unwrap();
        assert_eq!(
            format!("{}", info),
            "url=rtsp://h/track1;seq=17;rtptime=900000"
        );
    }
}
