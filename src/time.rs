//! Modified Julian Date conversions.

use jiff::{SignedDuration, Timestamp};

/// MJD of the Unix epoch (1970-01-01T00:00:00Z).
const MJD_UNIX_EPOCH: f64 = 40_587.0;

const SECONDS_PER_DAY: f64 = 86_400.0;

/// Convert a UTC timestamp to a Modified Julian Date.
pub fn mjd_from_timestamp(ts: Timestamp) -> f64 {
    let seconds = ts.as_second() as f64 + f64::from(ts.subsec_nanosecond()) / 1e9;
    MJD_UNIX_EPOCH + seconds / SECONDS_PER_DAY
}

/// Convert a Modified Julian Date back to a UTC timestamp.
///
/// Returns `None` when the date falls outside the representable range.
pub fn mjd_to_timestamp(mjd: f64) -> Option<Timestamp> {
    let seconds = (mjd - MJD_UNIX_EPOCH) * SECONDS_PER_DAY;
    let offset = SignedDuration::try_from_secs_f64(seconds).ok()?;
    Timestamp::UNIX_EPOCH.checked_add(offset).ok()
}

/// The processing time recorded for a run.
///
/// A forced value wins; otherwise the current time.
pub fn recycler_mjd(forced: Option<f64>) -> f64 {
    forced.unwrap_or_else(|| mjd_from_timestamp(Timestamp::now()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unix_epoch_is_mjd_40587() {
        assert!((mjd_from_timestamp(Timestamp::UNIX_EPOCH) - 40_587.0).abs() < 1e-9);
    }

    #[test]
    fn known_event_time_converts() {
        // GW190814 merged at 2019-08-14T21:10:39Z.
        let ts: Timestamp = "2019-08-14T21:10:39Z".parse().unwrap();
        let mjd = mjd_from_timestamp(ts);
        assert!((mjd - 58_709.882_396).abs() < 1e-5);

        let back = mjd_to_timestamp(mjd).unwrap();
        assert!((back.as_second() - ts.as_second()).abs() <= 1);
    }

    #[test]
    fn forced_mjd_wins() {
        assert!((recycler_mjd(Some(58_000.5)) - 58_000.5).abs() < f64::EPSILON);
        assert!(recycler_mjd(None) > 58_000.0);
    }
}
