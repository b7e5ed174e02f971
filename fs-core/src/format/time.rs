//! Packed date/time stamps as stored in superblocks and inodes

use std::fmt;
use std::io::{self, Read, Write};

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use chrono::{Datelike, NaiveDate, NaiveDateTime, Timelike, Utc};

/// Year the packed date counts from
pub const EPOCH_YEAR: i32 = 1980;

const MONTHS: [&str; 12] = [
    "Jan", "Feb", "Mar", "Apr", "May", "Jun", "Jul", "Aug", "Sep", "Oct", "Nov", "Dec",
];

/// A UZIX timestamp with two-second resolution
///
/// `date` packs day (5 bits), month (4 bits) and years since 1980 (7 bits);
/// `time` packs seconds/2 (5 bits), minutes (6 bits) and hours (5 bits).
/// On disk the time word precedes the date word.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Timestamp {
    /// Packed time of day
    pub time: u16,
    /// Packed calendar date
    pub date: u16,
}

impl Timestamp {
    /// Size of a timestamp on disk
    pub const SIZE: usize = 4;

    /// Pack calendar fields; out-of-range values are masked to their bit width
    pub fn from_parts(year: i32, month: u32, day: u32, hour: u32, minute: u32, second: u32) -> Self {
        let years = (year - EPOCH_YEAR).clamp(0, 0x7f) as u16;
        let date = (day as u16 & 0x1f) | ((month as u16 & 0x0f) << 5) | (years << 9);
        let time = ((second / 2) as u16 & 0x1f)
            | ((minute as u16 & 0x3f) << 5)
            | ((hour as u16 & 0x1f) << 11);
        Self { time, date }
    }

    /// Pack a calendar date and time; instants before 1980 clamp to the epoch
    pub fn from_datetime(dt: &NaiveDateTime) -> Self {
        if dt.year() < EPOCH_YEAR {
            return Self::from_parts(EPOCH_YEAR, 1, 1, 0, 0, 0);
        }
        Self::from_parts(
            dt.year(),
            dt.month(),
            dt.day(),
            dt.hour(),
            dt.minute(),
            dt.second(),
        )
    }

    /// The current UTC time
    pub fn now() -> Self {
        Self::from_datetime(&Utc::now().naive_utc())
    }

    /// Day of month as stored (0 on never-stamped records)
    pub fn day(&self) -> u32 {
        (self.date & 0x1f) as u32
    }

    /// Month as stored (1-12, 0 on never-stamped records)
    pub fn month(&self) -> u32 {
        ((self.date >> 5) & 0x0f) as u32
    }

    /// Full year
    pub fn year(&self) -> i32 {
        EPOCH_YEAR + ((self.date >> 9) & 0x7f) as i32
    }

    /// Hour of day
    pub fn hour(&self) -> u32 {
        ((self.time >> 11) & 0x1f) as u32
    }

    /// Minute
    pub fn minute(&self) -> u32 {
        ((self.time >> 5) & 0x3f) as u32
    }

    /// Seconds, always even
    pub fn second(&self) -> u32 {
        ((self.time & 0x1f) * 2) as u32
    }

    /// Convert to a calendar value. Zero day or month fields read as 1;
    /// `None` when the packed fields do not form a valid instant.
    pub fn to_datetime(&self) -> Option<NaiveDateTime> {
        let day = self.day().max(1);
        let month = self.month().max(1);
        NaiveDate::from_ymd_opt(self.year(), month, day)?
            .and_hms_opt(self.hour(), self.minute(), self.second())
    }

    /// Read a timestamp (time, then date)
    pub fn read_from<R: Read>(reader: &mut R) -> io::Result<Self> {
        let time = reader.read_u16::<LittleEndian>()?;
        let date = reader.read_u16::<LittleEndian>()?;
        Ok(Self { time, date })
    }

    /// Write a timestamp (time, then date)
    pub fn write_to<W: Write>(&self, writer: &mut W) -> io::Result<()> {
        writer.write_u16::<LittleEndian>(self.time)?;
        writer.write_u16::<LittleEndian>(self.date)?;
        Ok(())
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let month = MONTHS[(self.month().max(1) as usize - 1) % MONTHS.len()];
        write!(
            f,
            "{} {:2} {:4} {:02}:{:02}:{:02}",
            month,
            self.day().max(1),
            self.year(),
            self.hour(),
            self.minute(),
            self.second()
        )
    }
}
