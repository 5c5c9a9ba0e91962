//! HTTP-date handling for `Last-Modified` and `If-Modified-Since`.

use chrono::{DateTime, NaiveDateTime, SubsecRound, Utc};

/// IMF-fixdate, e.g. `Sun, 06 Nov 1994 08:49:37 GMT`
pub const HTTP_DATE_FORMAT: &str = "%a, %d %b %Y %H:%M:%S GMT";

// Obsolete forms recipients still have to accept.
const RFC850_FORMAT: &str = "%A, %d-%b-%y %H:%M:%S GMT";
const ASCTIME_FORMAT: &str = "%a %b %e %H:%M:%S %Y";

pub fn format(date: DateTime<Utc>) -> String {
    date.format(HTTP_DATE_FORMAT).to_string()
}

/// Parses any of the three HTTP-date forms. Returns `None` for anything else.
pub fn parse(value: &str) -> Option<DateTime<Utc>> {
    let value = value.trim();
    [HTTP_DATE_FORMAT, RFC850_FORMAT, ASCTIME_FORMAT]
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(value, fmt).ok())
        .map(|naive| naive.and_utc())
}

/// Whether a client copy validated at `since` is still current.
///
/// HTTP dates carry whole seconds, so the modification time is truncated before
/// comparing.
pub fn is_fresh(last_modified: DateTime<Utc>, since: DateTime<Utc>) -> bool {
    last_modified.trunc_subsecs(0) <= since
}
