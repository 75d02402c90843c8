//! Offense filtering and filtered-extract keys.
//!
//! Every code path that derives an extract file name goes through
//! [`OffenseFilter::from_request`], so `["theft", "ROBBERY"]` and
//! `["ROBBERY", "THEFT"]` always resolve to the same extract.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Sentinel offense value meaning "every offense".
pub const ALL_OFFENSES: &str = "ALL";

/// File-name segment used when no offense filter applies.
pub const ALL_TYPES_SEGMENT: &str = "ALL_TYPES";

/// Maximum number of characters of the offense list in a file name.
pub const MAX_OFFENSE_SEGMENT_LEN: usize = 50;

/// Hex digits of the offense-set digest appended to a truncated segment.
pub const OFFENSE_DIGEST_LEN: usize = 12;

/// Prefix shared by all generated extract files.
pub const EXTRACT_FILE_PREFIX: &str = "temp_for_processing";

/// A normalised set of offenses to keep.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum OffenseFilter {
    /// No filtering by offense.
    #[default]
    All,
    /// Keep only these offenses (uppercased, sorted, deduplicated).
    Only(BTreeSet<String>),
}

impl OffenseFilter {
    /// Builds a filter from raw request values.
    ///
    /// Missing, empty, `"null"` and `"ALL"` entries are dropped; the rest
    /// are trimmed and uppercased. An empty result means [`Self::All`].
    pub fn from_request<I, S>(items: I) -> Self
    where
        I: IntoIterator<Item = Option<S>>,
        S: AsRef<str>,
    {
        let set: BTreeSet<String> = items
            .into_iter()
            .flatten()
            .map(|s| s.as_ref().trim().to_uppercase())
            .filter(|s| !s.is_empty() && s != ALL_OFFENSES && s != "NULL")
            .collect();

        if set.is_empty() {
            Self::All
        } else {
            Self::Only(set)
        }
    }

    /// Returns `true` if this filter keeps every offense.
    #[must_use]
    pub const fn is_all(&self) -> bool {
        matches!(self, Self::All)
    }

    /// Case-insensitive membership test.
    #[must_use]
    pub fn matches(&self, offense: &str) -> bool {
        match self {
            Self::All => true,
            Self::Only(set) => set.contains(&offense.trim().to_uppercase()),
        }
    }

    /// Returns the offenses as a list, `["ALL"]` for [`Self::All`].
    #[must_use]
    pub fn to_list(&self) -> Vec<String> {
        match self {
            Self::All => vec![ALL_OFFENSES.to_string()],
            Self::Only(set) => set.iter().cloned().collect(),
        }
    }

    /// Returns the file-name segment for this filter.
    ///
    /// Lists longer than [`MAX_OFFENSE_SEGMENT_LEN`] are cut and suffixed
    /// with a digest of the whole normalised set, so two sets sharing a
    /// prefix never share a segment.
    #[must_use]
    pub fn file_segment(&self) -> String {
        match self {
            Self::All => ALL_TYPES_SEGMENT.to_string(),
            Self::Only(set) => {
                let safe: BTreeSet<String> =
                    set.iter().map(|o| o.replace(['/', ' '], "_")).collect();
                let joined = safe.into_iter().collect::<Vec<_>>().join("_");
                if joined.chars().count() <= MAX_OFFENSE_SEGMENT_LEN {
                    return joined;
                }

                let mut hasher = Sha256::new();
                for offense in set {
                    hasher.update(offense.as_bytes());
                    hasher.update([0]);
                }
                let mut digest = hex::encode(hasher.finalize());
                digest.truncate(OFFENSE_DIGEST_LEN);

                let prefix: String = joined.chars().take(MAX_OFFENSE_SEGMENT_LEN).collect();
                format!("{prefix}_{digest}")
            }
        }
    }
}

impl std::fmt::Display for OffenseFilter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::All => write!(f, "{ALL_OFFENSES}"),
            Self::Only(set) => {
                let list: Vec<&str> = set.iter().map(String::as_str).collect();
                write!(f, "{}", list.join(", "))
            }
        }
    }
}

/// Error returned when a start year is after the end year.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InvalidYearRangeError {
    /// Requested start year.
    pub start_year: i32,
    /// Requested end year.
    pub end_year: i32,
}

impl std::fmt::Display for InvalidYearRangeError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "start_year ({}) cannot be greater than end_year ({})",
            self.start_year, self.end_year
        )
    }
}

impl std::error::Error for InvalidYearRangeError {}

/// Identifies one filtered extract of the master table.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExtractKey {
    /// First year included.
    pub start_year: i32,
    /// Last year included.
    pub end_year: i32,
    /// Offense filter.
    pub offenses: OffenseFilter,
}

impl ExtractKey {
    /// Creates a key for an inclusive year range.
    ///
    /// # Errors
    ///
    /// Returns [`InvalidYearRangeError`] if `start_year > end_year`.
    pub fn new(
        start_year: i32,
        end_year: i32,
        offenses: OffenseFilter,
    ) -> Result<Self, InvalidYearRangeError> {
        if start_year > end_year {
            return Err(InvalidYearRangeError {
                start_year,
                end_year,
            });
        }
        Ok(Self {
            start_year,
            end_year,
            offenses,
        })
    }

    /// Returns `true` if `year` falls within the key's range.
    #[must_use]
    pub const fn contains_year(&self, year: i32) -> bool {
        year >= self.start_year && year <= self.end_year
    }

    /// Builds the extract file name, optionally suffixed with a master
    /// table fingerprint.
    #[must_use]
    pub fn file_name(&self, fingerprint: Option<&str>) -> String {
        let segment = self.offenses.file_segment();
        fingerprint.map_or_else(
            || {
                format!(
                    "{EXTRACT_FILE_PREFIX}_{}_{}_{segment}.csv",
                    self.start_year, self.end_year
                )
            },
            |fp| {
                format!(
                    "{EXTRACT_FILE_PREFIX}_{}_{}_{segment}_{fp}.csv",
                    self.start_year, self.end_year
                )
            },
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_and_sentinel_inputs_mean_all() {
        assert!(OffenseFilter::from_request(Vec::<Option<&str>>::new()).is_all());
        assert!(OffenseFilter::from_request(vec![None::<&str>]).is_all());
        assert!(OffenseFilter::from_request(vec![Some("all")]).is_all());
        assert!(OffenseFilter::from_request(vec![Some(""), Some("null")]).is_all());
    }

    #[test]
    fn order_and_case_do_not_change_the_key() {
        let a = OffenseFilter::from_request(vec![Some("theft/other"), Some("ROBBERY")]);
        let b = OffenseFilter::from_request(vec![Some("ROBBERY"), Some("THEFT/OTHER"), None]);
        assert_eq!(a, b);

        let ka = ExtractKey::new(2020, 2021, a).unwrap();
        let kb = ExtractKey::new(2020, 2021, b).unwrap();
        assert_eq!(ka.file_name(None), kb.file_name(None));
        assert_eq!(
            ka.file_name(None),
            "temp_for_processing_2020_2021_ROBBERY_THEFT_OTHER.csv"
        );
    }

    #[test]
    fn matches_case_insensitively() {
        let filter = OffenseFilter::from_request(vec![Some("Theft")]);
        assert!(filter.matches("THEFT"));
        assert!(filter.matches("theft "));
        assert!(!filter.matches("ROBBERY"));
        assert!(OffenseFilter::All.matches("ANYTHING"));
    }

    #[test]
    fn segment_is_truncated() {
        let long: Vec<Option<String>> = (0..20).map(|i| Some(format!("OFFENSE NUMBER {i}"))).collect();
        let segment = OffenseFilter::from_request(long).file_segment();
        assert_eq!(
            segment.chars().count(),
            MAX_OFFENSE_SEGMENT_LEN + 1 + OFFENSE_DIGEST_LEN
        );
        assert!(!segment.contains(' '));
    }

    #[test]
    fn sets_sharing_a_truncated_prefix_get_distinct_segments() {
        let base = [
            "ASSAULT W/DANGEROUS WEAPON",
            "BURGLARY",
            "HOMICIDE",
            "MOTOR VEHICLE THEFT",
        ];
        let narrow = OffenseFilter::from_request(base.iter().map(|o| Some(*o)));
        let wide = OffenseFilter::from_request(
            base.iter().map(|o| Some(*o)).chain(std::iter::once(Some("ROBBERY"))),
        );

        let narrow_segment = narrow.file_segment();
        let wide_segment = wide.file_segment();
        assert!(narrow_segment.starts_with("ASSAULT_W_DANGEROUS_WEAPON_BURGLARY_HOMICIDE_MOTOR"));
        assert_ne!(narrow_segment, wide_segment);

        let reordered = OffenseFilter::from_request(base.iter().rev().map(|o| Some(o.to_lowercase())));
        assert_eq!(reordered.file_segment(), narrow_segment);
    }

    #[test]
    fn short_segments_carry_no_digest() {
        let filter = OffenseFilter::from_request(vec![Some("THEFT/OTHER")]);
        assert_eq!(filter.file_segment(), "THEFT_OTHER");
    }

    #[test]
    fn all_filter_uses_all_types_segment() {
        let key = ExtractKey::new(2014, 2024, OffenseFilter::All).unwrap();
        assert_eq!(
            key.file_name(Some("abc123")),
            "temp_for_processing_2014_2024_ALL_TYPES_abc123.csv"
        );
    }

    #[test]
    fn rejects_inverted_year_range() {
        let err = ExtractKey::new(2022, 2020, OffenseFilter::All).unwrap_err();
        assert_eq!(err.start_year, 2022);
        assert!(err.to_string().contains("cannot be greater"));
    }
}
