use chrono::{Datelike, NaiveDate, Weekday};
use serde::{Deserialize, Serialize};
use std::ops::RangeInclusive;

const ETHIOPIAN_MONTHS: [&str; 13] = [
    "Meskerem", "Tikimt", "Hidar", "Tahsas", "Tir", "Yekatit", "Megabit", "Miazia", "Ginbot",
    "Sene", "Hamle", "Nehase", "Pagumen",
];

/// Julian day number of 1 Meskerem, year 1 (Amete Mihret epoch)
const ETHIOPIAN_EPOCH_JDN: i64 = 1_723_856;
/// Offset between chrono's day count from CE and the Julian day number
const CE_TO_JDN: i64 = 1_721_425;

/// Weekly reading schedule by psalm number, Sunday first
const WEEKLY_SCHEDULE: [(u32, u32); 7] = [
    (1, 21),    // Sunday
    (22, 41),   // Monday
    (42, 61),   // Tuesday
    (62, 77),   // Wednesday
    (78, 100),  // Thursday
    (101, 118), // Friday
    (119, 151), // Saturday
];

/// A date in the Ethiopian calendar
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EthiopianDate {
    pub year: i64,
    /// 1-based, 13 is Pagumen
    pub month: u32,
    pub day: u32,
    pub weekday: Weekday,
}

impl EthiopianDate {
    /// Convert a Gregorian date
    #[must_use]
    pub fn from_gregorian(date: NaiveDate) -> Self {
        let jdn = i64::from(date.num_days_from_ce()) + CE_TO_JDN;
        let since_epoch = jdn - ETHIOPIAN_EPOCH_JDN;
        let r = since_epoch.rem_euclid(1461);
        let n = r % 365 + 365 * (r / 1460);
        let year = 4 * since_epoch.div_euclid(1461) + r / 365 - r / 1460;

        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let (month, day) = ((n / 30 + 1) as u32, (n % 30 + 1) as u32);

        Self {
            year,
            month,
            day,
            weekday: date.weekday(),
        }
    }

    #[must_use]
    pub fn month_name(&self) -> &'static str {
        self.month
            .checked_sub(1)
            .and_then(|idx| ETHIOPIAN_MONTHS.get(idx as usize))
            .copied()
            .unwrap_or("Unknown")
    }
}

impl std::fmt::Display for EthiopianDate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}, {} {} {}",
            self.weekday,
            self.month_name(),
            self.day,
            self.year
        )
    }
}

/// Psalm numbers read on the given weekday
#[must_use]
pub fn reading_range(weekday: Weekday) -> RangeInclusive<u32> {
    let (start, end) = WEEKLY_SCHEDULE[weekday.num_days_from_sunday() as usize];
    start..=end
}
