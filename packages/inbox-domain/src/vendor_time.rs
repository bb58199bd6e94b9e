use time::{
	Date, OffsetDateTime, PrimitiveDateTime, UtcOffset, format_description::well_known::Rfc3339,
	macros::format_description,
};

/// Values above this are taken as epoch milliseconds rather than seconds.
const EPOCH_MILLIS_THRESHOLD: i64 = 100_000_000_000;

/// Parses the timestamp shapes the Graph API and webhook deliver.
///
/// Accepts RFC 3339, `2024-05-01T10:00:00+0000`, naive ISO 8601 (read as UTC), and epoch
/// seconds or milliseconds.
pub fn parse(raw: &str) -> Option<OffsetDateTime> {
	let raw = raw.trim();

	if raw.is_empty() {
		return None;
	}
	if let Ok(epoch) = raw.parse::<i64>() {
		return from_epoch(epoch);
	}
	if let Ok(parsed) = OffsetDateTime::parse(raw, &Rfc3339) {
		return Some(parsed);
	}
	if let Ok(parsed) = OffsetDateTime::parse(
		raw,
		format_description!(
			"[year]-[month]-[day]T[hour]:[minute]:[second][optional [.[subsecond]]][offset_hour sign:mandatory][offset_minute]"
		),
	) {
		return Some(parsed);
	}

	PrimitiveDateTime::parse(
		raw,
		format_description!("[year]-[month]-[day]T[hour]:[minute]:[second][optional [.[subsecond]]]"),
	)
	.ok()
	.map(|naive| naive.assume_offset(UtcOffset::UTC))
}

/// Converts epoch seconds or milliseconds, whichever the magnitude indicates.
pub fn from_epoch(epoch: i64) -> Option<OffsetDateTime> {
	if epoch <= 0 {
		return None;
	}

	let nanos = if epoch >= EPOCH_MILLIS_THRESHOLD {
		i128::from(epoch) * 1_000_000
	} else {
		i128::from(epoch) * 1_000_000_000
	};

	OffsetDateTime::from_unix_timestamp_nanos(nanos).ok()
}

/// Parses a `YYYY-MM-DD` cut-off as midnight UTC.
pub fn parse_date(raw: &str) -> Option<OffsetDateTime> {
	Date::parse(raw.trim(), format_description!("[year]-[month]-[day]"))
		.ok()
		.map(|date| date.midnight().assume_offset(UtcOffset::UTC))
}
