//! Source archive keys
//!
//! Archives land as `{year}-{month}-{day}-{hour}.{ext}` (for example
//! `2024-03-15-9.json.gz`). Every partition field is taken from the key
//! itself, never from the clock, and kept exactly as written so that output
//! paths mirror the source name.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;

/// Compression applied to an archive, derived from its extension
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ArchiveCompression {
    /// Plain JSON lines
    #[default]
    None,
    /// gzip (`.gz`)
    Gzip,
    /// zstd (`.zst`)
    Zstd,
}

impl ArchiveCompression {
    /// Detect compression from a file extension such as `json.gz`
    pub fn from_extension(extension: &str) -> Self {
        match extension.rsplit('.').next().unwrap_or_default() {
            "gz" | "gzip" => Self::Gzip,
            "zst" | "zstd" => Self::Zstd,
            _ => Self::None,
        }
    }
}

/// Parsed source archive key
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ArchiveKey {
    file_name: String,
    year: String,
    month: String,
    day: String,
    hour: String,
    extension: String,
}

impl ArchiveKey {
    /// Parse an archive file name
    ///
    /// The name is split on `-` into exactly four segments and the last
    /// segment is split on its first `.` into hour and extension.
    pub fn parse(file_name: &str) -> Result<Self> {
        let segments: Vec<&str> = file_name.split('-').collect();
        if segments.len() != 4 {
            return Err(Error::invalid_key(
                file_name,
                format!(
                    "expected {{year}}-{{month}}-{{day}}-{{hour}}.{{ext}}, found {} segment(s)",
                    segments.len()
                ),
            ));
        }

        let (hour, extension) = segments[3].split_once('.').ok_or_else(|| {
            Error::invalid_key(file_name, "missing extension after hour segment")
        })?;
        if extension.is_empty() {
            return Err(Error::invalid_key(file_name, "empty extension"));
        }

        let year = segments[0];
        if year.len() != 4 {
            return Err(Error::invalid_key(file_name, "year must have four digits"));
        }
        parse_field(file_name, "year", year, 0, 9999)?;
        parse_field(file_name, "month", segments[1], 1, 12)?;
        parse_field(file_name, "day", segments[2], 1, 31)?;
        parse_field(file_name, "hour", hour, 0, 23)?;

        Ok(Self {
            file_name: file_name.to_string(),
            year: year.to_string(),
            month: segments[1].to_string(),
            day: segments[2].to_string(),
            hour: hour.to_string(),
            extension: extension.to_string(),
        })
    }

    /// Original file name
    pub fn file_name(&self) -> &str {
        &self.file_name
    }

    /// Year segment as written in the key
    pub fn year(&self) -> &str {
        &self.year
    }

    /// Month segment as written in the key
    pub fn month(&self) -> &str {
        &self.month
    }

    /// Day-of-month segment as written in the key
    pub fn day(&self) -> &str {
        &self.day
    }

    /// Hour segment as written in the key
    pub fn hour(&self) -> &str {
        &self.hour
    }

    /// Extension (everything after the hour), e.g. `json.gz`
    pub fn extension(&self) -> &str {
        &self.extension
    }

    /// Compression implied by the extension
    pub fn compression(&self) -> ArchiveCompression {
        ArchiveCompression::from_extension(&self.extension)
    }

    /// Hive-style partition path: `year=Y/month=M/dayofmonth=D`
    pub fn partition_path(&self) -> String {
        format!(
            "year={}/month={}/dayofmonth={}",
            self.year, self.month, self.day
        )
    }

    /// Common prefix of every output object name: `part-Y-M-D-H`
    pub fn object_stem(&self) -> String {
        format!(
            "part-{}-{}-{}-{}",
            self.year, self.month, self.day, self.hour
        )
    }

    /// Numeric (year, month, day, hour), used for ordering
    fn ordinal(&self) -> (u32, u32, u32, u32) {
        let num = |s: &str| s.parse::<u32>().unwrap_or_default();
        (
            num(&self.year),
            num(&self.month),
            num(&self.day),
            num(&self.hour),
        )
    }
}

fn parse_field(key: &str, name: &str, value: &str, min: u32, max: u32) -> Result<u32> {
    if value.is_empty() || !value.bytes().all(|b| b.is_ascii_digit()) {
        return Err(Error::invalid_key(
            key,
            format!("{name} segment '{value}' is not numeric"),
        ));
    }
    let parsed: u32 = value
        .parse()
        .map_err(|_| Error::invalid_key(key, format!("{name} segment '{value}' out of range")))?;
    if parsed < min || parsed > max {
        return Err(Error::invalid_key(
            key,
            format!("{name} {parsed} outside {min}..={max}"),
        ));
    }
    Ok(parsed)
}

impl Ord for ArchiveKey {
    fn cmp(&self, other: &Self) -> Ordering {
        self.ordinal()
            .cmp(&other.ordinal())
            .then_with(|| self.file_name.cmp(&other.file_name))
    }
}

impl PartialOrd for ArchiveKey {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for ArchiveKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.file_name)
    }
}

/// Whether `candidate` comes strictly after `current` in archive order
///
/// Names that are not valid archive keys fall back to plain string ordering.
pub fn is_later_archive(candidate: &str, current: &str) -> bool {
    match (ArchiveKey::parse(candidate), ArchiveKey::parse(current)) {
        (Ok(candidate), Ok(current)) => candidate > current,
        _ => candidate > current,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test]
    fn test_parse_gharchive_key() {
        let key = ArchiveKey::parse("2024-03-15-9.json.gz").unwrap();
        assert_eq!(key.year(), "2024");
        assert_eq!(key.month(), "03");
        assert_eq!(key.day(), "15");
        assert_eq!(key.hour(), "9");
        assert_eq!(key.extension(), "json.gz");
        assert_eq!(key.compression(), ArchiveCompression::Gzip);
    }

    #[test_case("2024-03-15-09.json.gz", "year=2024/month=03/dayofmonth=15" ; "padded")]
    #[test_case("2015-1-1-0.json.gz", "year=2015/month=1/dayofmonth=1" ; "unpadded")]
    #[test_case("2023-12-31-23.json", "year=2023/month=12/dayofmonth=31" ; "plain json")]
    fn test_partition_path(key: &str, expected: &str) {
        assert_eq!(ArchiveKey::parse(key).unwrap().partition_path(), expected);
    }

    #[test]
    fn test_object_stem() {
        let key = ArchiveKey::parse("2024-03-15-09.json.gz").unwrap();
        assert_eq!(key.object_stem(), "part-2024-03-15-09");
    }

    #[test_case("malformed.gz" ; "single segment")]
    #[test_case("2024-03-15.json.gz" ; "three segments")]
    #[test_case("2024-03-15-09-10.json.gz" ; "five segments")]
    #[test_case("2024-03-15-09" ; "no extension")]
    #[test_case("2024-03-15-09." ; "empty extension")]
    #[test_case("24-03-15-09.json.gz" ; "short year")]
    #[test_case("2024-13-15-09.json.gz" ; "month out of range")]
    #[test_case("2024-03-00-09.json.gz" ; "day zero")]
    #[test_case("2024-03-15-24.json.gz" ; "hour out of range")]
    #[test_case("2024-0x-15-09.json.gz" ; "non numeric")]
    #[test_case("landing/ghactivity/2024-03-15-09.json.gz" ; "path prefix")]
    fn test_invalid_keys(key: &str) {
        let err = ArchiveKey::parse(key).unwrap_err();
        assert!(matches!(err, Error::InvalidKeyFormat { .. }), "{err}");
    }

    #[test_case("json.gz", ArchiveCompression::Gzip)]
    #[test_case("json.zst", ArchiveCompression::Zstd)]
    #[test_case("json", ArchiveCompression::None)]
    #[test_case("ndjson", ArchiveCompression::None)]
    fn test_compression_from_extension(ext: &str, expected: ArchiveCompression) {
        assert_eq!(ArchiveCompression::from_extension(ext), expected);
    }

    #[test]
    fn test_ordering_is_numeric() {
        // Hours are not zero padded upstream, so "10" must sort after "9"
        assert!(is_later_archive("2024-03-15-10.json.gz", "2024-03-15-9.json.gz"));
        assert!(!is_later_archive("2024-03-15-9.json.gz", "2024-03-15-10.json.gz"));
        assert!(is_later_archive("2024-04-1-0.json.gz", "2024-03-31-23.json.gz"));
        assert!(!is_later_archive("2024-03-15-9.json.gz", "2024-03-15-9.json.gz"));
    }

    #[test]
    fn test_ordering_falls_back_to_strings() {
        assert!(is_later_archive("b", "a"));
        assert!(!is_later_archive("a", "b"));
    }
}
