use anyhow::{
  Context,
  anyhow
};
use chrono::{
  DateTime,
  Days,
  LocalResult,
  NaiveDate,
  NaiveDateTime,
  SubsecRound,
  TimeZone,
  Utc
};
use chrono_tz::Tz;
use regex::Regex;

pub const TIMEZONE_ENV_VAR: &str =
  "TASKDECK_TIMEZONE";
const SYSTEM_TZ_ENV_VAR: &str = "TZ";

/// Wall clock truncated to the
/// millisecond precision snapshots keep.
#[must_use]
pub fn now_millis() -> DateTime<Utc> {
  Utc::now().trunc_subsecs(3)
}

/// Picks the zone used for calendar-day
/// comparisons: `$TASKDECK_TIMEZONE`, the
/// configured value, `$TZ`, the system
/// zone, then UTC.
pub fn resolve_timezone(
  configured: Option<&str>
) -> Tz {
  let system = iana_time_zone::get_timezone()
    .map_err(|err| {
      tracing::debug!(error = %err, "system timezone unavailable");
    })
    .ok();

  first_timezone([
    (
      TIMEZONE_ENV_VAR,
      std::env::var(TIMEZONE_ENV_VAR).ok()
    ),
    (
      "config",
      configured.map(str::to_string)
    ),
    (
      SYSTEM_TZ_ENV_VAR,
      std::env::var(SYSTEM_TZ_ENV_VAR).ok()
    ),
    ("system", system)
  ])
  .unwrap_or(chrono_tz::UTC)
}

/// First candidate that names a known
/// zone, in order.
fn first_timezone<'a, I>(
  candidates: I
) -> Option<Tz>
where
  I: IntoIterator<
    Item = (&'a str, Option<String>)
  >
{
  candidates.into_iter().find_map(
    |(source, raw)| {
      raw.and_then(|raw| {
        parse_timezone(&raw, source)
      })
    }
  )
}

fn parse_timezone(
  raw: &str,
  source: &str
) -> Option<Tz> {
  let trimmed =
    raw.trim().trim_start_matches(':');
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
        "configured timezone"
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

/// A fixed instant paired with the zone
/// that defines where calendar days
/// begin. Every day-level comparison goes
/// through one of these so derivations
/// stay pure.
#[derive(Debug, Clone, Copy)]
pub struct DayClock {
  tz:  Tz,
  now: DateTime<Utc>
}

impl DayClock {
  pub fn new(
    tz: Tz,
    now: DateTime<Utc>
  ) -> Self {
    Self {
      tz,
      now
    }
  }

  pub fn now(&self) -> DateTime<Utc> {
    self.now
  }

  #[must_use]
  pub fn day_of(
    &self,
    dt: DateTime<Utc>
  ) -> NaiveDate {
    dt.with_timezone(&self.tz)
      .date_naive()
  }

  #[must_use]
  pub fn today(&self) -> NaiveDate {
    self.day_of(self.now)
  }

  #[must_use]
  pub fn tomorrow(&self) -> NaiveDate {
    let today = self.today();
    today
      .checked_add_days(Days::new(1))
      .unwrap_or(today)
  }

  /// First instant of `day` in this
  /// clock's zone.
  pub fn start_of_day(
    &self,
    day: NaiveDate
  ) -> anyhow::Result<DateTime<Utc>> {
    let midnight = day
      .and_hms_opt(0, 0, 0)
      .ok_or_else(|| {
        anyhow!(
          "failed to construct \
           midnight for {day}"
        )
      })?;
    self.to_utc(midnight)
  }

  fn to_utc(
    &self,
    local_naive: NaiveDateTime
  ) -> anyhow::Result<DateTime<Utc>> {
    match self
      .tz
      .from_local_datetime(&local_naive)
    {
      | LocalResult::Single(local_dt) => {
        Ok(local_dt.with_timezone(&Utc))
      }
      | LocalResult::Ambiguous(
        first,
        second
      ) => {
        tracing::warn!(
          first = %first,
          second = %second,
          "ambiguous local datetime; using earliest"
        );
        Ok(
          first
            .min(second)
            .with_timezone(&Utc)
        )
      }
      | LocalResult::None => {
        // Midnight skipped by a DST
        // jump; the day starts an hour
        // later.
        let shifted = local_naive
          + chrono::Duration::hours(1);
        match self
          .tz
          .from_local_datetime(&shifted)
        {
          | LocalResult::Single(dt)
          | LocalResult::Ambiguous(
            dt,
            _
          ) => Ok(dt.with_timezone(&Utc)),
          | LocalResult::None => {
            Err(anyhow!(
              "local datetime does \
               not exist in {}: \
               {local_naive}",
              self.tz
            ))
          }
        }
      }
    }
  }
}

/// Parses a calendar day written as
/// `YYYY-MM-DD`.
pub fn parse_day(
  input: &str
) -> anyhow::Result<NaiveDate> {
  NaiveDate::parse_from_str(
    input.trim(),
    "%Y-%m-%d"
  )
  .with_context(|| {
    format!(
      "invalid date (expected \
       YYYY-MM-DD): {input}"
    )
  })
}

/// Resolves a due-date expression:
/// `today`, `tomorrow`, `yesterday`,
/// `+Nd`/`-Nd`, `YYYY-MM-DD` (local
/// midnight) or an RFC 3339 timestamp.
#[tracing::instrument(skip(clock), fields(input = input))]
pub fn parse_due_expr(
  input: &str,
  clock: &DayClock
) -> anyhow::Result<DateTime<Utc>> {
  let token = input.trim();
  let lower =
    token.to_ascii_lowercase();
  let today = clock.today();
  let rel_re = Regex::new(
    r"^(?P<sign>[+-])(?P<num>\d+)d$"
  )
  .map_err(|e| {
    anyhow!(
      "internal regex compile \
       failure: {e}"
    )
  })?;

  let offset_days: Option<i64> =
    match lower.as_str() {
      | "today" => Some(0),
      | "tomorrow" => Some(1),
      | "yesterday" => Some(-1),
      | _ => {
        rel_re
          .captures(&lower)
          .map(|caps| {
            let num: i64 = caps["num"]
              .parse()
              .context(
                "invalid day offset"
              )?;
            Ok::<i64, anyhow::Error>(
              if &caps["sign"] == "-" {
                -num
              } else {
                num
              }
            )
          })
          .transpose()?
      }
    };

  if let Some(days) = offset_days {
    let shift =
      Days::new(days.unsigned_abs());
    let shifted = if days >= 0 {
      today.checked_add_days(shift)
    } else {
      today.checked_sub_days(shift)
    };
    let day = shifted.ok_or_else(|| {
      anyhow!(
        "day offset out of range: \
         {token}"
      )
    })?;
    return clock.start_of_day(day);
  }

  if let Ok(day) = NaiveDate::parse_from_str(
    token, "%Y-%m-%d"
  ) {
    return clock.start_of_day(day);
  }

  DateTime::parse_from_rfc3339(token)
    .map(|dt| {
      dt.with_timezone(&Utc)
        .trunc_subsecs(3)
    })
    .map_err(|_| {
      anyhow!(
        "unrecognised due date: \
         {token}"
      )
    })
}

/// Serde for snapshot timestamps:
/// written as RFC 3339 UTC with
/// milliseconds, read from any RFC 3339
/// value or a bare `YYYY-MM-DD` date.
pub mod iso_date_serde {
  use chrono::{
    DateTime,
    NaiveDate,
    SubsecRound,
    Utc
  };
  use serde::{
    Deserialize,
    Deserializer,
    Serializer
  };

  pub const FORMAT: &str =
    "%Y-%m-%dT%H:%M:%S%.3fZ";

  pub fn serialize<S>(
    dt: &DateTime<Utc>,
    serializer: S
  ) -> Result<S::Ok, S::Error>
  where
    S: Serializer
  {
    serializer.serialize_str(
      &dt.format(FORMAT).to_string()
    )
  }

  pub fn deserialize<'de, D>(
    deserializer: D
  ) -> Result<DateTime<Utc>, D::Error>
  where
    D: Deserializer<'de>
  {
    let raw = String::deserialize(
      deserializer
    )?;
    parse(&raw)
      .map_err(serde::de::Error::custom)
  }

  pub fn parse(
    raw: &str
  ) -> Result<DateTime<Utc>, String> {
    let trimmed = raw.trim();
    if let Ok(dt) =
      DateTime::parse_from_rfc3339(
        trimmed
      )
    {
      return Ok(
        dt.with_timezone(&Utc)
          .trunc_subsecs(3)
      );
    }

    NaiveDate::parse_from_str(
      trimmed, "%Y-%m-%d"
    )
    .ok()
    .and_then(|day| {
      day.and_hms_opt(0, 0, 0)
    })
    .map(|naive| naive.and_utc())
    .ok_or_else(|| {
      format!(
        "invalid timestamp: {trimmed}"
      )
    })
  }
}

#[cfg(test)]
mod tests {
  use chrono::{
    NaiveDate,
    TimeZone,
    Utc
  };

  use super::{
    DayClock,
    first_timezone,
    iso_date_serde,
    parse_day,
    parse_due_expr
  };

  fn clock(
    tz: chrono_tz::Tz,
    hour: u32
  ) -> DayClock {
    let now = Utc
      .with_ymd_and_hms(
        2026, 10, 18, hour, 0, 0
      )
      .single()
      .expect("valid now");
    DayClock::new(tz, now)
  }

  #[test]
  fn day_boundaries_follow_timezone() {
    // 03:00 UTC is still the previous
    // evening in Mexico City.
    let utc = clock(chrono_tz::UTC, 3);
    let mx = clock(
      chrono_tz::America::Mexico_City,
      3
    );
    assert_eq!(
      utc.today(),
      NaiveDate::from_ymd_opt(
        2026, 10, 18
      )
      .expect("date")
    );
    assert_eq!(
      mx.today(),
      NaiveDate::from_ymd_opt(
        2026, 10, 17
      )
      .expect("date")
    );
    assert_eq!(
      mx.tomorrow(),
      utc.today()
    );
  }

  #[test]
  fn timezone_falls_back_to_system_zone() {
    let picked = first_timezone([
      ("TASKDECK_TIMEZONE", None),
      ("config", None),
      (
        "TZ",
        Some(
          ":America/Los_Angeles"
            .to_string()
        )
      ),
      (
        "system",
        Some("Europe/Berlin".to_string())
      )
    ]);
    assert_eq!(
      picked,
      Some(
        chrono_tz::America::Los_Angeles
      )
    );

    let skips_bad = first_timezone([
      (
        "config",
        Some("Mars/Olympus".to_string())
      ),
      ("TZ", Some(String::new())),
      (
        "system",
        Some("Europe/Berlin".to_string())
      )
    ]);
    assert_eq!(
      skips_bad,
      Some(chrono_tz::Europe::Berlin)
    );

    assert_eq!(
      first_timezone([
        ("config", None),
        ("system", None)
      ]),
      None
    );
  }

  #[test]
  fn configured_zone_wins_over_system() {
    let picked = first_timezone([
      (
        "config",
        Some("Asia/Tokyo".to_string())
      ),
      (
        "system",
        Some("Europe/Berlin".to_string())
      )
    ]);
    assert_eq!(
      picked,
      Some(chrono_tz::Asia::Tokyo)
    );
  }

  #[test]
  fn parses_relative_due_expressions() {
    let c = clock(chrono_tz::UTC, 12);
    let tomorrow =
      parse_due_expr("tomorrow", &c)
        .expect("tomorrow");
    let plus_two =
      parse_due_expr("+2d", &c)
        .expect("+2d");
    let minus_one =
      parse_due_expr("-1d", &c)
        .expect("-1d");

    assert_eq!(
      tomorrow.to_rfc3339(),
      "2026-10-19T00:00:00+00:00"
    );
    assert_eq!(
      c.day_of(plus_two)
        .format("%Y-%m-%d")
        .to_string(),
      "2026-10-20"
    );
    assert_eq!(
      c.day_of(minus_one),
      parse_day("2026-10-17")
        .expect("day")
    );
  }

  #[test]
  fn parses_absolute_due_expressions() {
    let c = clock(
      chrono_tz::Europe::Berlin,
      12
    );
    let day =
      parse_due_expr("2026-11-02", &c)
        .expect("date");
    assert_eq!(
      c.day_of(day)
        .format("%Y-%m-%d")
        .to_string(),
      "2026-11-02"
    );

    let stamp = parse_due_expr(
      "2026-11-02T15:04:05Z",
      &c
    )
    .expect("rfc3339");
    assert_eq!(
      stamp.to_rfc3339(),
      "2026-11-02T15:04:05+00:00"
    );

    assert!(
      parse_due_expr("someday", &c)
        .is_err()
    );
  }

  #[test]
  fn snapshot_timestamps_accept_dates_and_offsets()
   {
    let from_date =
      iso_date_serde::parse(
        "2026-10-18"
      )
      .expect("bare date");
    assert_eq!(
      from_date.to_rfc3339(),
      "2026-10-18T00:00:00+00:00"
    );

    let from_offset =
      iso_date_serde::parse(
        "2026-10-18T10:00:00.123456+02:00"
      )
      .expect("offset");
    assert_eq!(
      from_offset
        .format(iso_date_serde::FORMAT)
        .to_string(),
      "2026-10-18T08:00:00.123Z"
    );

    assert!(
      iso_date_serde::parse("soon")
        .is_err()
    );
  }
}
