//! Hijri calendar logic for the ledger.
//!
//! Conversion uses the arithmetic (tabular) Islamic calendar over Julian day
//! numbers. It can differ by a day from sighting-based calendars, which is why
//! the result is checked against a plausibility window and a configured fallback
//! date is used when it fails.

use chrono::{Datelike, Local, NaiveDate};
use log::{debug, warn};
use shared::{CurrentHijriDateResponse, HijriDate, HijriMonth};
use std::sync::Arc;

/// Julian day number of 1 Muharram 1 AH (civil epoch)
const ISLAMIC_EPOCH_JDN: i64 = 1_948_440;
/// Offset from chrono's days-from-CE count to the Julian day number
const CE_TO_JDN: i64 = 1_721_425;

const PLAUSIBLE_YEARS: std::ops::RangeInclusive<i32> = 1400..=1500;

const MONTH_NAMES: [&str; 12] = [
    "محرم",
    "صفر",
    "ربيع الأول",
    "ربيع الآخر",
    "جمادى الأولى",
    "جمادى الآخرة",
    "رجب",
    "شعبان",
    "رمضان",
    "شوال",
    "ذو القعدة",
    "ذو الحجة",
];

/// Source of "today" in the Gregorian calendar
pub trait Clock: Send + Sync {
    fn today(&self) -> NaiveDate;
}

/// The local system clock
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn today(&self) -> NaiveDate {
        Local::now().date_naive()
    }
}

/// A clock that always returns the same day
#[derive(Debug, Clone, Copy)]
pub struct FixedClock(pub NaiveDate);

impl Clock for FixedClock {
    fn today(&self) -> NaiveDate {
        self.0
    }
}

fn hijri_to_jdn(year: i64, month: i64, day: i64) -> i64 {
    day + (59 * (month - 1) + 1) / 2 + (year - 1) * 354 + (3 + 11 * year) / 30 + ISLAMIC_EPOCH_JDN - 1
}

/// Convert a Gregorian date to the tabular Hijri calendar
pub fn gregorian_to_hijri(date: NaiveDate) -> HijriDate {
    let jdn = date.num_days_from_ce() as i64 + CE_TO_JDN;
    let year = (30 * (jdn - ISLAMIC_EPOCH_JDN) + 10646).div_euclid(10631);
    let into_year = jdn - (29 + hijri_to_jdn(year, 1, 1));
    let month = if into_year <= 0 {
        1
    } else {
        ((2 * into_year + 58) / 59 + 1).min(12)
    };
    let day = jdn - hijri_to_jdn(year, month, 1) + 1;
    HijriDate::new(year as i32, month as u32, day as u32)
}

/// Whether `year` has a 30-day Dhu al-Hijjah
pub fn is_leap_year(year: i32) -> bool {
    (14 + 11 * year as i64).rem_euclid(30) < 11
}

/// Number of days in a Hijri month: odd months 30, even months 29, and
/// Dhu al-Hijjah 30 in leap years
pub fn days_in_month(year: i32, month: u32) -> u32 {
    match month {
        12 if is_leap_year(year) => 30,
        m if m % 2 == 1 => 30,
        _ => 29,
    }
}

/// Arabic name of a Hijri month
pub fn month_name(month: u32) -> &'static str {
    match month {
        1..=12 => MONTH_NAMES[(month - 1) as usize],
        _ => "شهر غير معروف",
    }
}

pub fn previous_month(month: HijriMonth) -> HijriMonth {
    if month.month <= 1 {
        HijriMonth::new(month.year - 1, 12)
    } else {
        HijriMonth::new(month.year, month.month - 1)
    }
}

pub fn next_month(month: HijriMonth) -> HijriMonth {
    if month.month >= 12 {
        HijriMonth::new(month.year + 1, 1)
    } else {
        HijriMonth::new(month.year, month.month + 1)
    }
}

fn is_plausible(date: HijriDate) -> bool {
    PLAUSIBLE_YEARS.contains(&date.year)
        && (1..=12).contains(&date.month)
        && (1..=30).contains(&date.day)
}

/// Calendar service: today's Hijri date and the edit window around it
#[derive(Clone)]
pub struct CalendarService {
    clock: Arc<dyn Clock>,
    fallback: HijriDate,
}

impl CalendarService {
    pub fn new(clock: Arc<dyn Clock>, fallback: HijriDate) -> Self {
        Self { clock, fallback }
    }

    /// Service on the system clock
    pub fn with_system_clock(fallback: HijriDate) -> Self {
        Self::new(Arc::new(SystemClock), fallback)
    }

    /// Service pinned to a Gregorian day
    pub fn pinned(today: NaiveDate, fallback: HijriDate) -> Self {
        Self::new(Arc::new(FixedClock(today)), fallback)
    }

    pub fn fallback_date(&self) -> HijriDate {
        self.fallback
    }

    /// Today's Hijri date and whether the fallback had to be used
    fn resolve_today(&self) -> (HijriDate, bool) {
        let today = self.clock.today();
        let converted = gregorian_to_hijri(today);
        if is_plausible(converted) {
            debug!("{} is {}", today, converted);
            (converted, false)
        } else {
            warn!(
                "Implausible Hijri date {} for {}; using fallback {}",
                converted, today, self.fallback
            );
            (self.fallback, true)
        }
    }

    /// Today's Hijri date; never fails
    pub fn current_hijri_date(&self) -> HijriDate {
        self.resolve_today().0
    }

    pub fn current_month(&self) -> HijriMonth {
        self.current_hijri_date().month_key()
    }

    /// Previous, current and next month, in that order
    pub fn editable_months(&self) -> Vec<HijriMonth> {
        let current = self.current_month();
        vec![previous_month(current), current, next_month(current)]
    }

    pub fn is_editable(&self, year: i32, month: u32) -> bool {
        self.editable_months().contains(&HijriMonth::new(year, month))
    }

    pub fn days_in_month(&self, month: HijriMonth) -> u32 {
        days_in_month(month.year, month.month)
    }

    /// Current date information for display
    pub fn current_date_response(&self) -> CurrentHijriDateResponse {
        let (date, is_fallback) = self.resolve_today();
        let name = month_name(date.month);
        CurrentHijriDateResponse {
            date,
            formatted_date: format!("{} {} {}هـ", date.day, name, date.year),
            month_name: name.to_string(),
            is_fallback,
            editable_months: {
                let current = date.month_key();
                vec![previous_month(current), current, next_month(current)]
            },
        }
    }
}
