//! Resolution of user supplied report periods into absolute UTC windows.
//!
//! Local timestamps are interpreted in the configured reporting zone
//! (Pacific by default) and converted to UTC with second precision, the
//! granularity the incident API accepts for `since`/`until`.

use chrono::{
    DateTime, Duration, LocalResult, NaiveDate, NaiveDateTime, Offset, SubsecRound, TimeZone, Utc,
};
use chrono_tz::Tz;
use serde::Serialize;

use crate::error::{StatsError, StatsResult};

/// Format of `since`/`until` query parameters.
pub const UTC_PARAM_FORMAT: &str = "%Y-%m-%dT%H:%M:%SZ";

const DATETIME_FORMATS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M",
    "%Y-%m-%d %H:%M",
    "%Y-%m-%d %I:%M:%S %p",
    "%Y-%m-%d %I:%M %p",
    "%Y/%m/%d %H:%M:%S",
    "%Y/%m/%d %H:%M",
    "%Y/%m/%d %I:%M %p",
    "%Y%m%dT%H%M%S",
];

const SHORT_YEAR_DATETIME_FORMATS: &[&str] = &[
    "%y-%m-%d %H:%M:%S",
    "%y-%m-%dT%H:%M:%S",
    "%y-%m-%d %H:%M",
    "%y/%m/%d %H:%M:%S",
    "%y/%m/%d %H:%M",
];

// Day first is the fallback when the leading field cannot be a month.
const MONTH_FIRST_DATETIME_FORMATS: &[&str] = &[
    "%m/%d/%Y %H:%M:%S",
    "%m/%d/%Y %H:%M",
    "%m/%d/%Y %I:%M:%S %p",
    "%m/%d/%Y %I:%M %p",
    "%m-%d-%Y %H:%M:%S",
    "%m-%d-%Y %H:%M",
    "%d/%m/%Y %H:%M:%S",
    "%d/%m/%Y %H:%M",
];

const NAMED_MONTH_DATETIME_FORMATS: &[&str] = &[
    "%B %d %Y %H:%M:%S",
    "%B %d %Y %H:%M",
    "%B %d %Y %I:%M %p",
    "%B %d, %Y %H:%M:%S",
    "%B %d, %Y %H:%M",
    "%B %d, %Y %I:%M %p",
    "%d %B %Y %H:%M:%S",
    "%d %B %Y %H:%M",
];

const DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%Y/%m/%d", "%Y%m%d"];

const SHORT_YEAR_DATE_FORMATS: &[&str] = &["%y-%m-%d", "%y/%m/%d"];

const MONTH_FIRST_DATE_FORMATS: &[&str] = &["%m/%d/%Y", "%m-%d-%Y", "%d/%m/%Y"];

const NAMED_MONTH_DATE_FORMATS: &[&str] = &["%B %d %Y", "%B %d, %Y", "%d %B %Y"];

/// Field order of a numeric date, judged from its digit runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DateOrder {
    YearFirst,
    ShortYearFirst,
    MonthFirst,
}

impl DateOrder {
    fn detect(input: &str) -> Self {
        let runs: Vec<usize> = input
            .split(|c: char| !c.is_ascii_digit())
            .map(str::len)
            .collect();
        let leading = runs.first().copied().unwrap_or(0);
        if leading == 4 || leading == 8 {
            return DateOrder::YearFirst;
        }
        let has_full_year = runs.iter().skip(1).any(|len| *len == 4);
        match (leading, has_full_year) {
            (1 | 2, true) => DateOrder::MonthFirst,
            (2, false) => DateOrder::ShortYearFirst,
            _ => DateOrder::YearFirst,
        }
    }

    fn formats(self) -> (&'static [&'static str], &'static [&'static str]) {
        match self {
            DateOrder::YearFirst => (DATETIME_FORMATS, DATE_FORMATS),
            DateOrder::ShortYearFirst => (SHORT_YEAR_DATETIME_FORMATS, SHORT_YEAR_DATE_FORMATS),
            DateOrder::MonthFirst => (MONTH_FIRST_DATETIME_FORMATS, MONTH_FIRST_DATE_FORMATS),
        }
    }
}

/// Half-open interval `[start, end)` in UTC.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct TimeWindow {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl TimeWindow {
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> StatsResult<Self> {
        if end < start {
            return Err(StatsError::InvalidWindow { start, end });
        }
        Ok(Self { start, end })
    }

    pub fn contains(&self, instant: DateTime<Utc>) -> bool {
        self.start <= instant && instant < self.end
    }

    pub fn duration(&self) -> Duration {
        self.end - self.start
    }

    pub fn since_param(&self) -> String {
        self.start.format(UTC_PARAM_FORMAT).to_string()
    }

    pub fn until_param(&self) -> String {
        self.end.format(UTC_PARAM_FORMAT).to_string()
    }
}

/// Raw window flags as given on the command line.
///
/// A relative duration wins over explicit bounds. Without either, the window
/// covers the trailing default span ending now.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WindowRequest {
    pub start: Option<String>,
    pub end: Option<String>,
    pub last_minutes: Option<u32>,
}

impl WindowRequest {
    pub fn last(minutes: u32) -> Self {
        Self {
            last_minutes: Some(minutes),
            ..Self::default()
        }
    }

    pub fn between(start: impl Into<String>, end: Option<String>) -> Self {
        Self {
            start: Some(start.into()),
            end,
            last_minutes: None,
        }
    }

    pub fn resolve(
        &self,
        now: DateTime<Utc>,
        zone: Tz,
        default_span: Duration,
    ) -> StatsResult<TimeWindow> {
        let now = now.trunc_subsecs(0);
        if let Some(minutes) = self.last_minutes {
            if self.start.is_some() || self.end.is_some() {
                tracing::debug!(minutes, "relative window overrides explicit bounds");
            }
            return TimeWindow::new(now - Duration::minutes(i64::from(minutes)), now);
        }

        let start = match self.start.as_deref() {
            Some(raw) => local_to_utc(raw, zone)?,
            None => now
                .checked_sub_signed(default_span)
                .ok_or(StatsError::SpanOutOfRange { span: default_span })?,
        };
        let end = match self.end.as_deref() {
            Some(raw) => local_to_utc(raw, zone)?,
            None => now,
        };
        TimeWindow::new(start, end)
    }
}

/// Parses a free-form local timestamp, reading ambiguous dates year first.
///
/// A leading one or two digit field followed by a four digit year is read
/// month first (`03/15/2015`). Month names and 12-hour clocks are accepted.
///
/// Any offset carried by an RFC 3339 string is discarded; only the wall-clock
/// reading is kept.
pub fn parse_local_timestamp(input: &str) -> StatsResult<NaiveDateTime> {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return Err(StatsError::malformed_timestamp(input, "empty timestamp"));
    }
    if let Ok(parsed) = DateTime::parse_from_rfc3339(trimmed) {
        return Ok(parsed.naive_local());
    }

    let (datetime_formats, date_formats) = DateOrder::detect(trimmed).formats();
    let datetime_formats = datetime_formats.iter().chain(NAMED_MONTH_DATETIME_FORMATS);
    let date_formats = date_formats.iter().chain(NAMED_MONTH_DATE_FORMATS);

    for format in datetime_formats {
        if let Ok(parsed) = NaiveDateTime::parse_from_str(trimmed, format) {
            return Ok(parsed);
        }
    }
    for format in date_formats {
        if let Ok(date) = NaiveDate::parse_from_str(trimmed, format) {
            return Ok(date.and_time(chrono::NaiveTime::MIN));
        }
    }
    Err(StatsError::malformed_timestamp(
        input,
        "expected a date with optional time, e.g. 2015-03-01 08:30 or Mar 1 2015 8:30 PM",
    ))
}

/// Converts a local timestamp string to a UTC instant with second precision.
pub fn local_to_utc(input: &str, zone: Tz) -> StatsResult<DateTime<Utc>> {
    let naive = parse_local_timestamp(input)?;
    Ok(localize(naive, zone).with_timezone(&Utc).trunc_subsecs(0))
}

/// Attaches `zone` to a wall-clock reading.
///
/// Repeated readings (fall back) take the earlier instant. Skipped readings
/// (spring forward) keep the offset in force before the transition.
pub fn localize(naive: NaiveDateTime, zone: Tz) -> DateTime<Tz> {
    match zone.from_local_datetime(&naive) {
        LocalResult::Single(local) => local,
        LocalResult::Ambiguous(earliest, _) => earliest,
        LocalResult::None => {
            let offset = zone
                .offset_from_utc_datetime(&(naive - Duration::hours(12)))
                .fix();
            let utc = naive - Duration::seconds(i64::from(offset.local_minus_utc()));
            zone.from_utc_datetime(&utc)
        }
    }
}

pub fn to_local(instant: DateTime<Utc>, zone: Tz) -> DateTime<Tz> {
    instant.with_timezone(&zone)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Timelike;
    use chrono_tz::America::Los_Angeles;

    fn utc(raw: &str) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339(raw).unwrap().with_timezone(&Utc)
    }

    #[test]
    fn converts_pacific_standard_and_daylight_time() {
        assert_eq!(
            local_to_utc("2015-01-15 10:00:00", Los_Angeles).unwrap(),
            utc("2015-01-15T18:00:00Z")
        );
        assert_eq!(
            local_to_utc("2015-07-15T10:00:00", Los_Angeles).unwrap(),
            utc("2015-07-15T17:00:00Z")
        );
    }

    #[test]
    fn date_only_means_local_midnight() {
        assert_eq!(
            local_to_utc("2015/03/01", Los_Angeles).unwrap(),
            utc("2015-03-01T08:00:00Z")
        );
    }

    #[test]
    fn two_digit_year_reads_year_first() {
        let parsed = parse_local_timestamp("15-02-03 04:05").unwrap();
        assert_eq!(parsed.to_string(), "2015-02-03 04:05:00");
    }

    #[test]
    fn free_form_inputs() {
        let cases = [
            ("03/15/2015 10:00", "2015-03-15 10:00:00"),
            ("3/5/2015", "2015-03-05 00:00:00"),
            ("25/12/2015 07:15", "2015-12-25 07:15:00"),
            ("2015-03-15 8:30 PM", "2015-03-15 20:30:00"),
            ("2015/03/15 12:05 am", "2015-03-15 00:05:00"),
            ("Mar 15 2015 10:00", "2015-03-15 10:00:00"),
            ("March 15, 2015", "2015-03-15 00:00:00"),
            ("March 15, 2015 9:45 PM", "2015-03-15 21:45:00"),
            ("15 March 2015", "2015-03-15 00:00:00"),
            ("15-03-15", "2015-03-15 00:00:00"),
        ];
        for (raw, expected) in cases {
            let parsed = parse_local_timestamp(raw)
                .unwrap_or_else(|err| panic!("{raw:?} should parse: {err}"));
            assert_eq!(parsed.to_string(), expected, "{raw:?}");
        }
    }

    #[test]
    fn explicit_offset_is_replaced_by_zone() {
        assert_eq!(
            local_to_utc("2015-01-15T10:00:00Z", Los_Angeles).unwrap(),
            utc("2015-01-15T18:00:00Z")
        );
    }

    #[test]
    fn round_trip_preserves_local_reading() {
        let raw = "2016-05-04 23:59:58";
        let instant = local_to_utc(raw, Los_Angeles).unwrap();
        let back = to_local(instant, Los_Angeles);
        assert_eq!(back.naive_local(), parse_local_timestamp(raw).unwrap());
        assert_eq!(back.format("%Y-%m-%d %H:%M:%S").to_string(), raw);
    }

    #[test]
    fn fall_back_overlap_takes_earlier_instant() {
        assert_eq!(
            local_to_utc("2015-11-01 01:30:00", Los_Angeles).unwrap(),
            utc("2015-11-01T08:30:00Z")
        );
    }

    #[test]
    fn spring_forward_gap_keeps_standard_offset() {
        assert_eq!(
            local_to_utc("2015-03-08 02:30:00", Los_Angeles).unwrap(),
            utc("2015-03-08T10:30:00Z")
        );
    }

    #[test]
    fn malformed_timestamp_is_rejected() {
        for raw in ["", "yesterday", "2015-13-45 10:00", "10:00"] {
            assert!(
                matches!(
                    local_to_utc(raw, Los_Angeles),
                    Err(StatsError::MalformedTimestamp { .. })
                ),
                "{raw:?} should not parse"
            );
        }
    }

    #[test]
    fn default_window_spans_seven_days_to_the_second() {
        let now = utc("2015-06-10T12:00:00.750Z");
        let window = WindowRequest::default()
            .resolve(now, Los_Angeles, Duration::days(7))
            .unwrap();
        assert_eq!(window.end, utc("2015-06-10T12:00:00Z"));
        assert_eq!(window.duration(), Duration::days(7));
        assert_eq!(window.end.nanosecond(), 0);
        assert_eq!(window.since_param(), "2015-06-03T12:00:00Z");
    }

    #[test]
    fn oversized_default_span_is_an_error() {
        let now = utc("2015-06-10T12:00:00Z");
        assert!(matches!(
            WindowRequest::default().resolve(now, Los_Angeles, Duration::days(100_000_000)),
            Err(StatsError::SpanOutOfRange { .. })
        ));
    }

    #[test]
    fn relative_window_ends_now() {
        let now = utc("2015-06-10T12:00:00Z");
        let window = WindowRequest::last(90)
            .resolve(now, Los_Angeles, Duration::days(7))
            .unwrap();
        assert_eq!(window.start, utc("2015-06-10T10:30:00Z"));
        assert_eq!(window.until_param(), "2015-06-10T12:00:00Z");
    }

    #[test]
    fn explicit_start_defaults_end_to_now() {
        let now = utc("2015-06-10T12:00:00Z");
        let window = WindowRequest::between("2015-06-01 00:00", None)
            .resolve(now, Los_Angeles, Duration::days(7))
            .unwrap();
        assert_eq!(window.start, utc("2015-06-01T07:00:00Z"));
        assert_eq!(window.end, now);
    }

    #[test]
    fn end_before_start_is_invalid() {
        let now = utc("2015-06-10T12:00:00Z");
        let request = WindowRequest::between("2015-06-05", Some("2015-06-01".to_string()));
        assert!(matches!(
            request.resolve(now, Los_Angeles, Duration::days(7)),
            Err(StatsError::InvalidWindow { .. })
        ));
    }

    #[test]
    fn window_is_half_open() {
        let window = TimeWindow::new(utc("2015-01-01T00:00:00Z"), utc("2015-01-02T00:00:00Z"))
            .unwrap();
        assert!(window.contains(utc("2015-01-01T00:00:00Z")));
        assert!(!window.contains(utc("2015-01-02T00:00:00Z")));
    }
}
