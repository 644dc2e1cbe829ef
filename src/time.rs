//! Wall-clock helpers over RTC epoch seconds.

use core::fmt::Write;

/// `YYYY-MM-DDTHH:MM:SSZ`.
pub type IsoTime = heapless::String<20>;

/// Earliest epoch accepted as a synced clock (2020-01-01T00:00:00Z).
pub const EPOCH_2020: u32 = 1_577_836_800;

/// A clock reading before 2020 means the RTC was never set.
pub fn is_synced(epoch: u32) -> bool {
    epoch >= EPOCH_2020
}

/// Civil date from days since 1970-01-01 (proleptic Gregorian).
fn civil_from_days(days: i64) -> (i64, u32, u32) {
    let z = days + 719_468;
    let era = z.div_euclid(146_097);
    let doe = z.rem_euclid(146_097);
    let yoe = (doe - doe / 1460 + doe / 36_524 - doe / 146_096) / 365;
    let doy = doe - (365 * yoe + yoe / 4 - yoe / 100);
    let mp = (5 * doy + 2) / 153;
    let d = (doy - (153 * mp + 2) / 5 + 1) as u32;
    let m = (if mp < 10 { mp + 3 } else { mp - 9 }) as u32;
    let y = yoe + era * 400 + if m <= 2 { 1 } else { 0 };
    (y, m, d)
}

/// Render an epoch as ISO-8601 UTC.
pub fn epoch_to_iso(epoch: u32) -> IsoTime {
    let days = (epoch / 86_400) as i64;
    let secs = epoch % 86_400;
    let (y, m, d) = civil_from_days(days);
    let mut out = IsoTime::new();
    let _ = write!(
        out,
        "{:04}-{:02}-{:02}T{:02}:{:02}:{:02}Z",
        y,
        m,
        d,
        secs / 3600,
        (secs / 60) % 60,
        secs % 60
    );
    out
}
