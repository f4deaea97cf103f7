use std::time::{SystemTime, SystemTimeError, UNIX_EPOCH};

/// Seconds between the NTP epoch (1900-01-01) and the unix epoch (1970-01-01).
const NTP_UNIX_EPOCH_OFFSET_SECS: u64 = 2_208_988_800;

/// Splits an instant into the two 32-bit halves of a 64-bit NTP timestamp:
/// whole seconds since 1900 in the upper half, the binary fraction of the
/// current second in the lower half.
pub fn ntp_timestamp_halves(instant: SystemTime) -> Result<(u32, u32), SystemTimeError> {
    let since_unix = instant.duration_since(UNIX_EPOCH)?;
    let seconds = (since_unix.as_secs() + NTP_UNIX_EPOCH_OFFSET_SECS) as u32;
    let fraction = ((since_unix.subsec_nanos() as u64) << 32) / 1_000_000_000;
    Ok((seconds, fraction as u32))
}

pub fn ntp_timestamp_halves_now() -> Result<(u32, u32), SystemTimeError> {
    ntp_timestamp_halves(SystemTime::now())
}
