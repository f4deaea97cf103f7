use std::{fmt, str::FromStr};

use npt::Npt;

use crate::errors::RtspMessageError;

pub mod npt;

#[derive(Debug, Clone, PartialEq)]
pub enum MediaTimeFormat {
    Npt(Npt),
    Extension(String),
}

impl fmt::Display for MediaTimeFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Npt(npt) => write!(f, "{}", npt),
            Self::Extension(ext) => write!(f, "{}", ext),
        }
    }
}

/// A `Range` header value. Only the NPT scale is interpreted; other scales
/// pass through as opaque extensions.
#[derive(Debug, Clone, PartialEq)]
pub struct TimeRange {
    pub start_time: Option<MediaTimeFormat>,
    pub end_time: Option<MediaTimeFormat>,
}

impl TimeRange {
    /// Open-ended NPT range starting at `start`.
    pub fn npt_from(start: Npt) -> Self {
        Self {
            start_time: Some(MediaTimeFormat::Npt(start)),
            end_time: None,
        }
    }

    /// The range start, with an absent start reading as `0` per the header
    /// grammar.
    pub fn start_npt(&self) -> Npt {
        match &self.start_time {
            Some(MediaTimeFormat::Npt(npt)) => *npt,
            _ => Npt::ZERO,
        }
    }
}

impl FromStr for TimeRange {
    type Err = RtspMessageError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (scale, value) = s.split_once('=').unwrap_or((s, ""));
        let (start, end) = value
            .split_once('-')
            .ok_or_else(|| RtspMessageError::InvalidTimeRange(format!("missing '-': {}", s)))?;
        match scale {
            "npt" => Ok(Self {
                start_time: if start.is_empty() {
                    None
                } else {
                    Some(MediaTimeFormat::Npt(start.parse()?))
                },
                end_time: if end.is_empty() {
                    None
                } else {
                    Some(MediaTimeFormat::Npt(end.parse()?))
                },
            }),
            _ => Ok(Self {
                start_time: if start.is_empty() {
                    None
                } else {
                    Some(MediaTimeFormat::Extension(start.to_owned()))
                },
                end_time: if end.is_empty() {
                    None
                } else {
                    Some(MediaTimeFormat::Extension(end.to_owned()))
                },
            }),
        }
    }
}

impl fmt::Display for TimeRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(MediaTimeFormat::Npt(_)) = self.start_time.as_ref().or(self.end_time.as_ref())
        {
            write!(f, "npt=")?;
        }
        if let Some(start) = &self.start_time {
            write!(f, "{}", start)?;
        }
        write!(f, "-")?;
        if let Some(end) = &self.end_time {
            write!(f, "{}", end)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn open_ended_npt() {
        let range: TimeRange = "npt=0-".parse().unwrap();
        assert_eq!(range.start_npt(), Npt::Seconds(0.0));
        assert_eq!(range.end_time, None);
        assert_eq!(format!("{}", range), "npt=0-");
    }

    #[test]
    fn bounded_npt() {
        let range: TimeRange = "npt=3.52-61.8".parse().unwrap();
        assert_eq!(range.start_npt(), Npt::Seconds(3.52));
        assert_eq!(
            range.end_time,
            Some(MediaTimeFormat::Npt(Npt::Seconds(61.8)))
        );
    }

    #[test]
    fn missing_start_defaults_to_zero() {
        let range: TimeRange = "npt=-145".parse().unwrap();
        assert_eq!(range.start_time, None);
        assert_eq!(range.start_npt(), Npt::ZERO);
    }

    #[test]
    fn hhmmss_start() {
        let range: TimeRange = "npt=0:10:20.25-".parse().unwrap();
        assert_eq!(
            range.start_npt(),
            Npt::HHMMSS {
                hours: 0,
                minutes: 10,
                seconds: 20.25
            }
        );
    }

    #[test]
    fn unknown_scale_is_carried_opaquely() {
        let range: TimeRange = "smpte=10:07:00-10:07:33".parse().unwrap();
        assert_eq!(range.start_npt(), Npt::ZERO);
        assert!(matches!(
            range.start_time,
            Some(MediaTimeFormat::Extension(_))
        ));
    }
}
