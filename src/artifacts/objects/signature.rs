//! Author and committer identity

use anyhow::Context;
use chrono::{DateTime, FixedOffset, Local};

/// Name, email and the moment an action happened
///
/// Serialized as `Name <email> <unix-seconds> <+hhmm>`.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct Signature {
    name: String,
    email: String,
    timestamp: DateTime<FixedOffset>,
    /// Written as `-0000`, which git uses for an unknown local offset
    negative_utc: bool,
}

impl Signature {
    /// Create a signature stamped with the current local time
    pub fn now(name: impl Into<String>, email: impl Into<String>) -> Self {
        Signature {
            name: name.into(),
            email: email.into(),
            timestamp: Local::now().fixed_offset(),
            negative_utc: false,
        }
    }

    pub fn new_with_timestamp(
        name: impl Into<String>,
        email: impl Into<String>,
        timestamp: DateTime<FixedOffset>,
    ) -> Self {
        Signature {
            name: name.into(),
            email: email.into(),
            timestamp,
            negative_utc: false,
        }
    }

    /// Same identity, new moment
    pub fn with_timestamp(&self, timestamp: DateTime<FixedOffset>) -> Self {
        Signature {
            timestamp,
            negative_utc: false,
            ..self.clone()
        }
    }

    /// Overlay the `GIT_AUTHOR_*` environment variables
    ///
    /// `GIT_AUTHOR_DATE` accepts RFC 2822, `%Y-%m-%d %H:%M:%S %z` or the raw
    /// `<seconds> <+hhmm>` form.
    pub fn overlay_env(self) -> Self {
        let name = std::env::var("GIT_AUTHOR_NAME").unwrap_or(self.name);
        let email = std::env::var("GIT_AUTHOR_EMAIL").unwrap_or(self.email);
        let (timestamp, negative_utc) = std::env::var("GIT_AUTHOR_DATE")
            .ok()
            .and_then(|date| Self::parse_date(&date).ok())
            .map(|timestamp| (timestamp, false))
            .unwrap_or((self.timestamp, self.negative_utc));

        Signature {
            name,
            email,
            timestamp,
            negative_utc,
        }
    }

    fn parse_date(date: &str) -> anyhow::Result<DateTime<FixedOffset>> {
        if let Ok(timestamp) = DateTime::parse_from_rfc2822(date) {
            return Ok(timestamp);
        }
        if let Ok(timestamp) = DateTime::parse_from_str(date, "%Y-%m-%d %H:%M:%S %z") {
            return Ok(timestamp);
        }

        let (seconds, offset) = date
            .trim()
            .split_once(' ')
            .context("Invalid date format")?;
        Self::from_raw_parts(seconds, offset)
    }

    fn from_raw_parts(seconds: &str, offset: &str) -> anyhow::Result<DateTime<FixedOffset>> {
        let seconds = seconds.parse::<i64>().context("Invalid timestamp")?;
        let offset = Self::parse_offset(offset)?;

        Ok(DateTime::from_timestamp(seconds, 0)
            .context("Timestamp out of range")?
            .with_timezone(&offset))
    }

    fn parse_offset(offset: &str) -> anyhow::Result<FixedOffset> {
        let (sign, digits) = match offset.as_bytes().first() {
            Some(b'+') => (1, &offset[1..]),
            Some(b'-') => (-1, &offset[1..]),
            _ => anyhow::bail!("Invalid timezone {offset}"),
        };
        if digits.len() != 4 || !digits.chars().all(|c| c.is_ascii_digit()) {
            anyhow::bail!("Invalid timezone {offset}");
        }

        let hours = digits[..2].parse::<i32>()?;
        let minutes = digits[2..].parse::<i32>()?;

        FixedOffset::east_opt(sign * (hours * 3600 + minutes * 60))
            .with_context(|| format!("Invalid timezone {offset}"))
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn email(&self) -> &str {
        &self.email
    }

    pub fn timestamp(&self) -> DateTime<FixedOffset> {
        self.timestamp
    }

    /// Offset from UTC in minutes
    pub fn offset_minutes(&self) -> i32 {
        self.timestamp.offset().local_minus_utc() / 60
    }

    /// Render the serialized form used in commit headers
    pub fn display(&self) -> String {
        let offset = if self.negative_utc {
            "-0000".to_string()
        } else {
            self.timestamp.format("%z").to_string()
        };

        format!(
            "{} <{}> {} {}",
            self.name,
            self.email,
            self.timestamp.timestamp(),
            offset
        )
    }
}

impl TryFrom<&str> for Signature {
    type Error = anyhow::Error;

    fn try_from(value: &str) -> anyhow::Result<Self> {
        let email_start = value
            .find('<')
            .context("Invalid signature format: missing '<'")?;
        let email_end = value
            .rfind('>')
            .context("Invalid signature format: missing '>'")?;
        if email_end < email_start {
            anyhow::bail!("Invalid signature format: misplaced '>'");
        }

        let name = value[..email_start].trim().to_string();
        let email = value[email_start + 1..email_end].to_string();

        let (seconds, offset) = value[email_end + 1..]
            .trim()
            .split_once(' ')
            .context("Invalid signature format: missing timezone")?;
        let offset = offset.trim();
        let timestamp = Self::from_raw_parts(seconds, offset)?;

        Ok(Signature {
            name,
            email,
            timestamp,
            negative_utc: offset == "-0000",
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use rstest::rstest;

    #[rstest]
    #[case("A U Thor <author@example.com> 1700000000 +0000")]
    #[case("A U Thor <author@example.com> 1700000000 -0530")]
    #[case("Jane <j@x> 0 +1400")]
    #[case("Jane <j@x> 0 -0000")]
    fn parses_what_it_renders(#[case] raw: &str) {
        let signature = Signature::try_from(raw).unwrap();
        assert_eq!(signature.display(), raw);
    }

    #[test]
    fn negative_utc_is_still_utc() {
        let negative = Signature::try_from("a <b> 10 -0000").unwrap();
        let positive = Signature::try_from("a <b> 10 +0000").unwrap();

        assert_eq!(negative.offset_minutes(), 0);
        assert_eq!(negative.timestamp(), positive.timestamp());
        assert_ne!(negative, positive);
        assert!(negative.with_timestamp(positive.timestamp()).display().ends_with("+0000"));
    }

    #[test]
    fn exposes_offset_in_minutes() {
        let signature = Signature::try_from("a <b> 10 -0130").unwrap();
        assert_eq!(signature.offset_minutes(), -90);
        assert_eq!(signature.timestamp().timestamp(), 10);
    }

    #[rstest]
    #[case("no email 10 +0000")]
    #[case("a <b> ten +0000")]
    #[case("a <b> 10 0000")]
    fn rejects_malformed_signatures(#[case] raw: &str) {
        assert!(Signature::try_from(raw).is_err());
    }
}
