//! MS-DOS date/time conversion.
//!
//! ZIP records carry modification times as two 16-bit words with 2-second
//! precision, interpreted here as UTC:
//!
//! ```text
//! date = day | month << 5 | (year - 1980) << 9
//! time = seconds / 2 | minutes << 5 | hours << 11
//! ```

use chrono::{DateTime, Datelike, NaiveDate, TimeZone, Timelike, Utc};

use crate::error::{Result, ZipError};

/// Encodes a UTC timestamp as `(dos_date, dos_time)`.
///
/// Fails for years outside the representable range [1980, 2107].
pub fn to_dos(timestamp: &DateTime<Utc>) -> Result<(u16, u16)> {
    let year = timestamp.year();
    if !(1980..=2107).contains(&year) {
        return Err(ZipError::InvalidArgument(format!(
            "year {} is outside the DOS date range [1980, 2107]",
            year
        )));
    }
    let date =
        timestamp.day() as u16 | (timestamp.month() as u16) << 5 | ((year - 1980) as u16) << 9;
    let time = (timestamp.second() / 2) as u16
        | (timestamp.minute() as u16) << 5
        | (timestamp.hour() as u16) << 11;
    Ok((date, time))
}

/// Decodes `(dos_date, dos_time)` back to a UTC timestamp.
///
/// Returns `None` when the stored words do not name a real calendar date
/// or time of day.
pub fn from_dos(date: u16, time: u16) -> Option<DateTime<Utc>> {
    let day = (date & 0x1f) as u32;
    let month = (date >> 5 & 0xf) as u32;
    let year = (date >> 9) as i32 + 1980;

    let seconds = (time & 0x1f) as u32 * 2;
    let minutes = (time >> 5 & 0x3f) as u32;
    let hours = (time >> 11) as u32;

    let naive = NaiveDate::from_ymd_opt(year, month, day)?.and_hms_opt(hours, minutes, seconds)?;
    Some(Utc.from_utc_datetime(&naive))
}
