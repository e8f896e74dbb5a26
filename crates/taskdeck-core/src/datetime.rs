use std::sync::OnceLock;

use chrono::{
  DateTime,
  LocalResult,
  NaiveDate,
  NaiveDateTime,
  SecondsFormat,
  TimeZone,
  Utc
};
use chrono_tz::Tz;
use regex::Regex;
use serde_json::Value;

const NAIVE_DATETIME_FORMATS: &[&str] = &[
  "%Y-%m-%dT%H:%M:%S%.f",
  "%Y-%m-%d %H:%M:%S%.f",
  "%Y-%m-%dT%H:%M",
  "%Y-%m-%d %H:%M"
];

/// Calendar context for date-only
/// comparisons: the current day and the
/// zone timestamps are projected into.
#[derive(Debug, Clone, Copy)]
pub struct ViewClock {
  pub today: NaiveDate,
  pub tz:    Tz
}

impl ViewClock {
  pub fn now(tz: Tz) -> Self {
    Self {
      today: Utc::now()
        .with_timezone(&tz)
        .date_naive(),
      tz
    }
  }

  pub fn fixed(
    today: NaiveDate,
    tz: Tz
  ) -> Self {
    Self {
      today,
      tz
    }
  }

  #[must_use]
  pub fn date_of(
    &self,
    dt: DateTime<Utc>
  ) -> NaiveDate {
    local_date(dt, self.tz)
  }
}

#[must_use]
pub fn local_date(
  dt: DateTime<Utc>,
  tz: Tz
) -> NaiveDate {
  dt.with_timezone(&tz).date_naive()
}

#[must_use]
pub fn format_wire(
  dt: DateTime<Utc>
) -> String {
  dt.to_rfc3339_opts(
    SecondsFormat::AutoSi,
    true
  )
}

#[must_use]
pub fn format_month_day(
  dt: DateTime<Utc>,
  tz: Tz
) -> String {
  dt.with_timezone(&tz)
    .format("%b %d")
    .to_string()
}

pub fn parse_timezone(
  raw: &str,
  source: &str
) -> Option<Tz> {
  let trimmed = raw.trim();
  if trimmed.is_empty() {
    tracing::warn!(
      source,
      "timezone source was empty"
    );
    return None;
  }

  match trimmed.parse::<Tz>() {
    | Ok(tz) => {
      tracing::debug!(
        source,
        timezone = %trimmed,
        "configured view timezone"
      );
      Some(tz)
    }
    | Err(err) => {
      tracing::warn!(
        source,
        timezone = %trimmed,
        error = %err,
        "failed to parse timezone id"
      );
      None
    }
  }
}

/// Reads a loosely typed timestamp:
/// RFC 3339, naive date-time or
/// date-only text (interpreted in `tz`),
/// or integer epoch milliseconds.
pub fn parse_timestamp(
  value: &Value,
  tz: Tz
) -> Option<DateTime<Utc>> {
  match value {
    | Value::String(raw) => {
      parse_timestamp_str(raw, tz)
    }
    | Value::Number(number) => number
      .as_i64()
      .and_then(
        DateTime::<Utc>::from_timestamp_millis
      ),
    | _ => None
  }
}

pub fn parse_timestamp_str(
  raw: &str,
  tz: Tz
) -> Option<DateTime<Utc>> {
  let token = raw.trim();
  if token.is_empty() {
    return None;
  }

  if let Ok(dt) =
    DateTime::parse_from_rfc3339(token)
  {
    return Some(dt.with_timezone(&Utc));
  }

  if let Ok(dt) =
    DateTime::parse_from_str(
      token,
      "%Y-%m-%dT%H:%M:%S%.f%z"
    )
  {
    return Some(dt.with_timezone(&Utc));
  }

  for format in NAIVE_DATETIME_FORMATS {
    if let Ok(naive) =
      NaiveDateTime::parse_from_str(
        token, format
      )
    {
      return to_utc_from_local(
        naive, tz, token
      );
    }
  }

  let date = NaiveDate::parse_from_str(
    token, "%Y-%m-%d"
  )
  .ok()
  .or_else(|| leading_date(token))?;

  let midnight =
    date.and_hms_opt(0, 0, 0)?;
  to_utc_from_local(midnight, tz, token)
}

fn leading_date(
  token: &str
) -> Option<NaiveDate> {
  static LEADING_DATE: OnceLock<
    Option<Regex>
  > = OnceLock::new();
  let re = LEADING_DATE
    .get_or_init(|| {
      Regex::new(
        r"^(?P<year>\d{4})-(?P<month>\d{2})-(?P<day>\d{2})(?:[^0-9]|$)",
      )
      .ok()
    })
    .as_ref()?;

  let caps = re.captures(token)?;
  let year = caps
    .name("year")?
    .as_str()
    .parse::<i32>()
    .ok()?;
  let month = caps
    .name("month")?
    .as_str()
    .parse::<u32>()
    .ok()?;
  let day = caps
    .name("day")?
    .as_str()
    .parse::<u32>()
    .ok()?;
  NaiveDate::from_ymd_opt(
    year, month, day
  )
}

fn to_utc_from_local(
  local_naive: NaiveDateTime,
  tz: Tz,
  context: &str
) -> Option<DateTime<Utc>> {
  match tz
    .from_local_datetime(&local_naive)
  {
    | LocalResult::Single(local_dt) => {
      Some(local_dt.with_timezone(&Utc))
    }
    | LocalResult::Ambiguous(
      first,
      second
    ) => {
      tracing::debug!(
        context,
        first = %first,
        second = %second,
        "ambiguous local datetime; using earliest"
      );
      let chosen = if first <= second {
        first
      } else {
        second
      };
      Some(chosen.with_timezone(&Utc))
    }
    | LocalResult::None => {
      tracing::debug!(
        context,
        "local datetime does not exist in view timezone"
      );
      None
    }
  }
}
