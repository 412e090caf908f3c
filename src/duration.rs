use crate::error::DurationError;

/// seconds, minutes, hours, days; applied from the rightmost segment outward
const MULTIPLIERS: [u64; 4] = [1, 60, 60 * 60, 60 * 60 * 24];

/// Converts a part duration such as `1:05:30` into whole seconds.
///
/// Accepts `s`, `m:s`, `h:m:s` and `d:h:m:s`. Segments are not range checked,
/// so `90` and `1:30` are both 90 seconds.
pub fn parse_duration(duration: &str) -> Result<u64, DurationError> {
    let segments: Vec<&str> = duration.split(':').collect();
    if segments.len() > MULTIPLIERS.len() {
        return Err(DurationError::TooManySegments {
            input: duration.to_string(),
            count: segments.len(),
        });
    }

    let mut total: u64 = 0;
    for (segment, multiplier) in segments.iter().rev().zip(MULTIPLIERS) {
        // u64::from_str accepts a leading '+', which is never a valid duration
        if segment.is_empty() || !segment.bytes().all(|b| b.is_ascii_digit()) {
            return Err(DurationError::InvalidSegment {
                input: duration.to_string(),
                segment: segment.to_string(),
            });
        }
        let overflow = || DurationError::Overflow {
            input: duration.to_string(),
        };
        let value: u64 = segment.parse().map_err(|_| overflow())?;
        total = value
            .checked_mul(multiplier)
            .and_then(|v| total.checked_add(v))
            .ok_or_else(overflow)?;
    }
    Ok(total)
}
