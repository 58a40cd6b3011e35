//! Hijri dates for the daily greeting.
//!
//! Dates follow the Umm al-Qura calendar as computed by
//! [`icu_calendar`]'s Saudi-criterion simulation.

use chrono::{Datelike, NaiveDate};
use icu_calendar::islamic::IslamicUmmAlQura;
use icu_calendar::Date;
use serde::Serialize;

const MONTHS: [&str; 12] = [
    "Muharram",
    "Safar",
    "Rabi al-awwal",
    "Rabi al-thani",
    "Jumada al-awwal",
    "Jumada al-thani",
    "Rajab",
    "Sha'ban",
    "Ramadan",
    "Shawwal",
    "Dhu al-Qi'dah",
    "Dhu al-Hijjah",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct HijriDate {
    pub year: i64,
    pub month: u32,
    pub day: u32,
}

impl HijriDate {
    /// Convert a Gregorian date. `None` before the start of the calendar.
    pub fn from_gregorian(date: NaiveDate) -> Option<Self> {
        let month = u8::try_from(date.month()).ok()?;
        let day = u8::try_from(date.day()).ok()?;
        let iso = Date::try_new_iso_date(date.year(), month, day).ok()?;
        let hijri = iso.to_calendar(IslamicUmmAlQura::new());

        let year = i64::from(hijri.year().number);
        if year < 1 {
            return None;
        }
        Some(Self {
            year,
            month: hijri.month().ordinal,
            day: hijri.day_of_month().0,
        })
    }

    pub fn month_name(&self) -> &'static str {
        MONTHS[(self.month.clamp(1, 12) - 1) as usize]
    }

    /// `1445-09-01`
    pub fn iso(&self) -> String {
        format!("{}-{:02}-{:02}", self.year, self.month, self.day)
    }

    /// `1st of Ramadan, 1445`
    pub fn display(&self) -> String {
        format!("{} of {}, {}", ordinal(self.day), self.month_name(), self.year)
    }
}

pub fn ordinal(n: u32) -> String {
    let suffix = match (n % 10, n % 100) {
        (_, 11..=13) => "th",
        (1, _) => "st",
        (2, _) => "nd",
        (3, _) => "rd",
        _ => "th",
    };
    format!("{}{}", n, suffix)
}

/// Body of `GET /api/hijri/date`.
#[derive(Debug, Clone, Serialize)]
pub struct Today {
    pub date: String,
    pub hijri: String,
    pub display: String,
}

impl Today {
    pub fn for_date(date: NaiveDate) -> Self {
        let hijri = HijriDate::from_gregorian(date);
        Self {
            date: date.format("%Y-%m-%d").to_string(),
            hijri: hijri.map(|h| h.iso()).unwrap_or_default(),
            display: hijri.map(|h| h.display()).unwrap_or_default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ymd(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_known_dates() {
        assert_eq!(
            HijriDate::from_gregorian(ymd(2024, 3, 11)),
            Some(HijriDate {
                year: 1445,
                month: 9,
                day: 1
            })
        );
        assert_eq!(
            HijriDate::from_gregorian(ymd(2025, 3, 1)).map(|h| h.iso()),
            Some("1446-09-01".to_string())
        );
        assert_eq!(
            HijriDate::from_gregorian(ymd(2023, 7, 19)).map(|h| h.iso()),
            Some("1445-01-01".to_string())
        );
    }

    #[test]
    fn test_follows_umm_al_qura_month_starts() {
        // the arithmetic calendar still has this as 30 Dhu al-Hijjah 1445
        assert_eq!(
            HijriDate::from_gregorian(ymd(2024, 7, 7)).map(|h| h.iso()),
            Some("1446-01-01".to_string())
        );
    }

    #[test]
    fn test_before_epoch() {
        assert_eq!(HijriDate::from_gregorian(ymd(600, 1, 1)), None);
    }

    #[test]
    fn test_ordinals() {
        let got: Vec<String> = [1, 2, 3, 4, 11, 12, 13, 21, 22, 23, 30]
            .iter()
            .map(|n| ordinal(*n))
            .collect();
        assert_eq!(
            got,
            vec!["1st", "2nd", "3rd", "4th", "11th", "12th", "13th", "21st", "22nd", "23rd", "30th"]
        );
    }

    #[test]
    fn test_display() {
        let h = HijriDate::from_gregorian(ymd(2025, 3, 5)).unwrap();
        assert_eq!(h.display(), "5th of Ramadan, 1446");
    }

    #[test]
    fn test_today_body() {
        let t = Today::for_date(ymd(2024, 3, 11));
        assert_eq!(t.date, "2024-03-11");
        assert_eq!(t.hijri, "1445-09-01");
        assert_eq!(t.display, "1st of Ramadan, 1445");
    }
}
