use chrono::{Duration, NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};

/// Workbook date system used to interpret serial date values.
///
/// - `Excel1900` (default; includes the Lotus 1-2-3 leap year bug, serial 60 is
///   the nonexistent 1900-02-29)
/// - `Excel1904` (older Mac workbooks, `workbookPr date1904="1"`)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum DateSystem {
    #[default]
    #[serde(rename = "excel1900")]
    Excel1900,
    #[serde(rename = "excel1904")]
    Excel1904,
}

const MS_PER_DAY: f64 = 86_400_000.0;

fn epoch(system: DateSystem, serial: f64) -> NaiveDateTime {
    let date = match system {
        DateSystem::Excel1904 => NaiveDate::from_ymd_opt(1904, 1, 1),
        // Serials before the phantom leap day count from 1899-12-31.
        DateSystem::Excel1900 if serial < 61.0 => NaiveDate::from_ymd_opt(1899, 12, 31),
        DateSystem::Excel1900 => NaiveDate::from_ymd_opt(1899, 12, 30),
    };
    date.and_then(|d| d.and_hms_opt(0, 0, 0))
        .unwrap_or(NaiveDateTime::MIN)
}

impl DateSystem {
    /// Convert a serial number to a timestamp, rounded to the millisecond.
    pub fn from_serial(self, serial: f64) -> Option<NaiveDateTime> {
        if !serial.is_finite() || serial < 0.0 {
            return None;
        }
        let ms = (serial * MS_PER_DAY).round();
        if ms > i64::MAX as f64 {
            return None;
        }
        epoch(self, serial).checked_add_signed(Duration::milliseconds(ms as i64))
    }

    /// Convert a timestamp to a serial number.
    pub fn to_serial(self, value: NaiveDateTime) -> f64 {
        let modern = epoch(self, 61.0);
        let ms = (value - modern).num_milliseconds() as f64;
        let serial = ms / MS_PER_DAY;
        match self {
            DateSystem::Excel1900 if serial < 61.0 => {
                let legacy = epoch(self, 0.0);
                (value - legacy).num_milliseconds() as f64 / MS_PER_DAY
            }
            _ => serial,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ymd(y: i32, m: u32, d: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(y, m, d)
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap()
    }

    #[test]
    fn excel_1900_serials() {
        let s = DateSystem::Excel1900;
        assert_eq!(s.from_serial(1.0), Some(ymd(1900, 1, 1)));
        assert_eq!(s.from_serial(59.0), Some(ymd(1900, 2, 28)));
        assert_eq!(s.from_serial(61.0), Some(ymd(1900, 3, 1)));
        assert_eq!(s.from_serial(45000.0), Some(ymd(2023, 3, 15)));
        assert_eq!(s.to_serial(ymd(2023, 3, 15)), 45000.0);
        assert_eq!(s.to_serial(ymd(1900, 1, 1)), 1.0);
    }

    #[test]
    fn excel_1904_serials() {
        let s = DateSystem::Excel1904;
        assert_eq!(s.from_serial(0.0), Some(ymd(1904, 1, 1)));
        assert_eq!(s.to_serial(ymd(2023, 3, 15)), 45000.0 - 1462.0);
    }

    #[test]
    fn fractional_days_are_times() {
        let dt = DateSystem::Excel1900.from_serial(45000.5).unwrap();
        assert_eq!(dt, ymd(2023, 3, 15) + Duration::hours(12));
        assert_eq!(DateSystem::Excel1900.to_serial(dt), 45000.5);
    }
}
