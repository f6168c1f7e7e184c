//! Market calendar - finds the next session open for deferred deliveries

use crate::sources::MarketCalendarSource;
use crate::types::Timestamp;
use chrono::{Datelike, Duration, NaiveDate, NaiveTime, TimeZone, Utc, Weekday};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};

/// Trading session times
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionTimes {
    pub market_open: NaiveTime,
    pub market_close: NaiveTime,
}

/// Fixed-date US market holidays (month, day)
const FIXED_HOLIDAYS: [(u32, u32); 4] = [(1, 1), (6, 19), (7, 4), (12, 25)];

/// NYSE calendar: weekdays minus holidays, 09:30 to 16:00 New York time.
///
/// Every exchange is mapped onto this one calendar.
#[derive(Debug, Clone)]
pub struct NyseCalendar {
    holidays: Vec<NaiveDate>,
    session: SessionTimes,
}

impl NyseCalendar {
    pub fn new() -> Self {
        let mut holidays: Vec<NaiveDate> = (2020..=2030)
            .flat_map(|year| {
                FIXED_HOLIDAYS
                    .iter()
                    .filter_map(move |&(month, day)| NaiveDate::from_ymd_opt(year, month, day))
            })
            .collect();
        holidays.sort();
        Self {
            holidays,
            session: SessionTimes {
                market_open: NaiveTime::from_hms_opt(9, 30, 0).unwrap_or_default(),
                market_close: NaiveTime::from_hms_opt(16, 0, 0).unwrap_or_default(),
            },
        }
    }

    /// Add a custom holiday
    pub fn add_holiday(&mut self, date: NaiveDate) {
        if let Err(position) = self.holidays.binary_search(&date) {
            self.holidays.insert(position, date);
        }
    }

    pub fn timezone(&self) -> Tz {
        chrono_tz::America::New_York
    }

    pub fn is_trading_day(&self, date: NaiveDate) -> bool {
        !matches!(date.weekday(), Weekday::Sat | Weekday::Sun)
            && self.holidays.binary_search(&date).is_err()
    }

    pub fn session_times(&self, date: NaiveDate) -> Option<SessionTimes> {
        self.is_trading_day(date).then_some(self.session)
    }

    /// Open of the session on `date` in UTC
    pub fn open_at(&self, date: NaiveDate) -> Option<Timestamp> {
        let session = self.session_times(date)?;
        self.timezone()
            .from_local_datetime(&date.and_time(session.market_open))
            .earliest()
            .map(|local| local.with_timezone(&Utc))
    }
}

impl Default for NyseCalendar {
    fn default() -> Self {
        Self::new()
    }
}

impl MarketCalendarSource for NyseCalendar {
    fn next_market_open(&self, time: Timestamp, exchange: &str) -> Timestamp {
        let mut date = time.with_timezone(&self.timezone()).date_naive();
        for _ in 0..366 {
            if let Some(open) = self.open_at(date).filter(|open| *open > time) {
                return open;
            }
            date += Duration::days(1);
        }
        log::warn!("No session open found on {} within a year of {}", exchange, time);
        time + Duration::days(1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Timelike;

    #[test]
    fn test_trading_days() {
        let calendar = NyseCalendar::new();
        assert!(calendar.is_trading_day(NaiveDate::from_ymd_opt(2024, 1, 8).unwrap()));
        assert!(!calendar.is_trading_day(NaiveDate::from_ymd_opt(2024, 1, 6).unwrap()));
        assert!(!calendar.is_trading_day(NaiveDate::from_ymd_opt(2024, 1, 1).unwrap()));

        let times = calendar.session_times(NaiveDate::from_ymd_opt(2024, 1, 8).unwrap()).unwrap();
        assert_eq!(times.market_open.hour(), 9);
        assert_eq!(times.market_open.minute(), 30);
        assert_eq!(times.market_close.hour(), 16);
    }

    #[test]
    fn test_next_open_skips_weekend() {
        let calendar = NyseCalendar::new();
        // Friday 2024-01-05 after the close
        let friday = Utc.with_ymd_and_hms(2024, 1, 5, 22, 0, 0).unwrap();
        let open = calendar.next_market_open(friday, "NYSE");
        // Monday 09:30 EST = 14:30 UTC
        assert_eq!(open, Utc.with_ymd_and_hms(2024, 1, 8, 14, 30, 0).unwrap());
    }

    #[test]
    fn test_next_open_same_day_and_dst() {
        let calendar = NyseCalendar::new();
        let early = Utc.with_ymd_and_hms(2024, 7, 10, 12, 0, 0).unwrap();
        // 09:30 EDT = 13:30 UTC
        assert_eq!(
            calendar.next_market_open(early, "NASDAQ"),
            Utc.with_ymd_and_hms(2024, 7, 10, 13, 30, 0).unwrap()
        );

        // Exactly at the open moves on to the next session
        let at_open = Utc.with_ymd_and_hms(2024, 7, 10, 13, 30, 0).unwrap();
        assert_eq!(
            calendar.next_market_open(at_open, "NASDAQ"),
            Utc.with_ymd_and_hms(2024, 7, 11, 13, 30, 0).unwrap()
        );
    }

    #[test]
    fn test_custom_holiday() {
        let mut calendar = NyseCalendar::new();
        let day = NaiveDate::from_ymd_opt(2024, 1, 9).unwrap();
        calendar.add_holiday(day);
        calendar.add_holiday(day);
        assert!(!calendar.is_trading_day(day));

        let monday_evening = Utc.with_ymd_and_hms(2024, 1, 8, 22, 0, 0).unwrap();
        assert_eq!(
            calendar.next_market_open(monday_evening, "NYSE"),
            Utc.with_ymd_and_hms(2024, 1, 10, 14, 30, 0).unwrap()
        );
    }
}
