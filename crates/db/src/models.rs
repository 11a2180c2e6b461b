//! Typed records exchanged with the storage layer.
//!
//! Rows are decoded into these types at the storage edge, so callers never
//! handle untyped column values.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Datelike, NaiveDate, Utc};
use cinekami_common::{AppError, AppResult};
use serde::de::{Deserializer, MapAccess, Visitor};
use serde::ser::{SerializeMap, Serializer};
use serde::{Deserialize, Serialize};

use crate::entities::{movie, VoteCategory};

/// Vote counts for every category of a movie.
///
/// Always holds all four categories; missing ones read as zero and unknown
/// ones are dropped on decode.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TallyMap([i64; 4]);

impl TallyMap {
    /// All categories at zero.
    #[must_use]
    pub const fn zero() -> Self {
        Self([0; 4])
    }

    /// Build from `(category, count)` pairs. Unknown category names are ignored.
    pub fn from_counts<'a, I>(counts: I) -> Self
    where
        I: IntoIterator<Item = (&'a str, i64)>,
    {
        let mut map = Self::zero();
        for (name, count) in counts {
            if let Ok(category) = name.parse::<VoteCategory>() {
                map.set(category, count);
            }
        }
        map
    }

    /// Count for a category.
    #[must_use]
    pub const fn get(&self, category: VoteCategory) -> i64 {
        self.0[category.index()]
    }

    /// Overwrite the count for a category.
    pub fn set(&mut self, category: VoteCategory, count: i64) {
        self.0[category.index()] = count;
    }

    /// Add one vote to a category.
    pub fn increment(&mut self, category: VoteCategory) {
        self.0[category.index()] += 1;
    }

    /// Sum over all categories.
    #[must_use]
    pub fn total(&self) -> i64 {
        self.0.iter().sum()
    }

    /// `(category, count)` pairs in canonical category order.
    pub fn iter(&self) -> impl Iterator<Item = (VoteCategory, i64)> + '_ {
        VoteCategory::ALL.into_iter().map(|c| (c, self.get(c)))
    }

    /// Rows ordered by count descending, then category name ascending.
    #[must_use]
    pub fn ranked(&self) -> Vec<TallyRow> {
        let mut rows: Vec<TallyRow> = self
            .iter()
            .map(|(category, count)| TallyRow { category, count })
            .collect();
        rows.sort_by(|a, b| {
            b.count
                .cmp(&a.count)
                .then_with(|| a.category.as_str().cmp(b.category.as_str()))
        });
        rows
    }

    /// Up to `limit` ranked rows strictly after `after`.
    #[must_use]
    pub fn page(&self, after: Option<&TallyKeyset>, limit: u64) -> Vec<TallyRow> {
        self.ranked()
            .into_iter()
            .filter(|row| after.is_none_or(|a| a.precedes(row)))
            .take(usize::try_from(limit).unwrap_or(usize::MAX))
            .collect()
    }
}

impl Serialize for TallyMap {
    // Keys are written in name order so the stored JSON is byte-stable.
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut categories = VoteCategory::ALL;
        categories.sort_by_key(|c| c.as_str());
        let mut map = serializer.serialize_map(Some(categories.len()))?;
        for category in categories {
            map.serialize_entry(category.as_str(), &self.get(category))?;
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for TallyMap {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct TallyVisitor;

        impl<'de> Visitor<'de> for TallyVisitor {
            type Value = TallyMap;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a map of category to count")
            }

            fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> Result<TallyMap, A::Error> {
                let mut map = TallyMap::zero();
                while let Some((name, count)) = access.next_entry::<String, i64>()? {
                    if let Ok(category) = name.parse::<VoteCategory>() {
                        map.set(category, count);
                    }
                }
                Ok(map)
            }
        }

        deserializer.deserialize_map(TallyVisitor)
    }
}

/// A calendar month, rendered as `YYYY-MM`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct YearMonth {
    year: i32,
    month: u32,
}

impl YearMonth {
    /// Create a month key. Fails unless `month` is in `1..=12` and `year` in `1..=9999`.
    pub fn new(year: i32, month: u32) -> AppResult<Self> {
        if !(1..=9999).contains(&year) || !(1..=12).contains(&month) {
            return Err(AppError::BadRequest(format!(
                "invalid month: {year}-{month}"
            )));
        }
        Ok(Self { year, month })
    }

    /// Month containing a date.
    #[must_use]
    pub fn of(date: NaiveDate) -> Self {
        Self {
            year: date.year(),
            month: date.month(),
        }
    }

    /// Month containing an instant, in UTC.
    #[must_use]
    pub fn containing(now: DateTime<Utc>) -> Self {
        Self::of(now.date_naive())
    }

    /// Calendar year.
    #[must_use]
    pub const fn year(self) -> i32 {
        self.year
    }

    /// Month number, 1-based.
    #[must_use]
    pub const fn month(self) -> u32 {
        self.month
    }

    /// The following month.
    #[must_use]
    pub const fn next(self) -> Self {
        if self.month == 12 {
            Self {
                year: self.year + 1,
                month: 1,
            }
        } else {
            Self {
                year: self.year,
                month: self.month + 1,
            }
        }
    }

    /// The preceding month.
    #[must_use]
    pub const fn previous(self) -> Self {
        if self.month == 1 {
            Self {
                year: self.year - 1,
                month: 12,
            }
        } else {
            Self {
                year: self.year,
                month: self.month - 1,
            }
        }
    }

    /// First day of the month.
    #[must_use]
    pub fn first_day(self) -> NaiveDate {
        NaiveDate::from_ymd_opt(self.year, self.month, 1).unwrap_or(NaiveDate::MIN)
    }

    /// Last day of the month.
    #[must_use]
    pub fn last_day(self) -> NaiveDate {
        self.next()
            .first_day()
            .pred_opt()
            .unwrap_or(NaiveDate::MAX)
    }

    /// Whether a date falls within the month.
    #[must_use]
    pub fn contains(self, date: NaiveDate) -> bool {
        Self::of(date) == self
    }
}

impl fmt::Display for YearMonth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04}-{:02}", self.year, self.month)
    }
}

impl FromStr for YearMonth {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || AppError::BadRequest(format!("invalid month key: {s}"));
        let (year, month) = s.split_once('-').ok_or_else(invalid)?;
        if year.len() != 4 || month.len() != 2 {
            return Err(invalid());
        }
        let year = year.parse().map_err(|_| invalid())?;
        let month = month.parse().map_err(|_| invalid())?;
        Self::new(year, month)
    }
}

/// A catalog movie.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Movie {
    /// External catalog id.
    pub id: i64,
    /// Title.
    pub title: String,
    /// Release date.
    pub release_date: NaiveDate,
    /// Synopsis.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub overview: Option<String>,
    /// Poster image path.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub poster_path: Option<String>,
    /// Backdrop image path.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub backdrop_path: Option<String>,
    /// Popularity score.
    pub popularity: f64,
    /// IMDb title page.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub imdb_url: Option<String>,
    /// Cinemagia search page.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cinemagia_url: Option<String>,
}

impl From<movie::Model> for Movie {
    fn from(m: movie::Model) -> Self {
        Self {
            id: m.id,
            title: m.title,
            release_date: m.release_date,
            overview: m.overview,
            poster_path: m.poster_path,
            backdrop_path: m.backdrop_path,
            popularity: m.popularity,
            imdb_url: m.imdb_url,
            cinemagia_url: m.cinemagia_url,
        }
    }
}

/// Upsert input from the catalog sync.
#[derive(Debug, Clone, PartialEq)]
pub struct CatalogMovie {
    pub id: i64,
    pub title: String,
    pub release_date: NaiveDate,
    pub overview: Option<String>,
    pub poster_path: Option<String>,
    pub backdrop_path: Option<String>,
    pub popularity: f64,
    pub imdb_url: Option<String>,
    pub cinemagia_url: Option<String>,
}

impl From<CatalogMovie> for Movie {
    fn from(m: CatalogMovie) -> Self {
        Self {
            id: m.id,
            title: m.title,
            release_date: m.release_date,
            overview: m.overview,
            poster_path: m.poster_path,
            backdrop_path: m.backdrop_path,
            popularity: m.popularity,
            imdb_url: m.imdb_url,
            cinemagia_url: m.cinemagia_url,
        }
    }
}

/// One row of the active-movie listing.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MovieListItem {
    #[serde(flatten)]
    pub movie: Movie,
    pub tallies: TallyMap,
    /// The requesting voter's category, when a fingerprint was supplied.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub voted_category: Option<VoteCategory>,
    /// Value of the sort key this row was scanned by.
    #[serde(skip)]
    pub sort_key: f64,
}

/// Count for one category of a movie.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct TallyRow {
    pub category: VoteCategory,
    pub count: i64,
}

/// A frozen monthly tally record.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SnapshotRecord {
    /// `YYYY-MM`
    pub month: String,
    pub movie_id: i64,
    pub tallies: TallyMap,
    pub closed_at: DateTime<Utc>,
}

/// A snapshot joined with its movie's metadata.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SnapshotListItem {
    #[serde(flatten)]
    pub snapshot: SnapshotRecord,
    pub title: String,
    pub release_date: NaiveDate,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub overview: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub poster_path: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub backdrop_path: Option<String>,
    pub popularity: f64,
    #[serde(skip)]
    pub sort_key: f64,
}

/// Keyset sort fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortField {
    Popularity,
    ReleaseDate,
    Category(VoteCategory),
    /// Snapshot listings only.
    MovieId,
}

impl SortField {
    /// Wire name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Popularity => "popularity",
            Self::ReleaseDate => "release_date",
            Self::Category(c) => c.as_str(),
            Self::MovieId => "movie_id",
        }
    }

    /// Sort key of a row. Release dates key by epoch seconds at 00:00 UTC.
    #[must_use]
    pub fn key_of(self, id: i64, popularity: f64, release_date: NaiveDate, tallies: &TallyMap) -> f64 {
        match self {
            Self::Popularity => popularity,
            Self::ReleaseDate => release_date
                .and_hms_opt(0, 0, 0)
                .map_or(0.0, |dt| dt.and_utc().timestamp() as f64),
            Self::Category(c) => tallies.get(c) as f64,
            Self::MovieId => id as f64,
        }
    }
}

impl FromStr for SortField {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "popularity" => Ok(Self::Popularity),
            "release_date" => Ok(Self::ReleaseDate),
            "movie_id" => Ok(Self::MovieId),
            other => other
                .parse::<VoteCategory>()
                .map(Self::Category)
                .map_err(|_| AppError::BadRequest(format!("invalid sort_by: {other}"))),
        }
    }
}

/// Sort direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortDir {
    Asc,
    #[default]
    Desc,
}

impl SortDir {
    /// Wire name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Asc => "asc",
            Self::Desc => "desc",
        }
    }

    /// Whether `(key, id)` lies strictly after `after` in this direction.
    #[must_use]
    pub fn is_after(self, key: f64, id: i64, after: &Keyset) -> bool {
        let ord = key
            .total_cmp(&after.key)
            .then_with(|| id.cmp(&after.id));
        match self {
            Self::Asc => ord.is_gt(),
            Self::Desc => ord.is_lt(),
        }
    }
}

impl FromStr for SortDir {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "asc" => Ok(Self::Asc),
            "desc" => Ok(Self::Desc),
            other => Err(AppError::BadRequest(format!("invalid sort_dir: {other}"))),
        }
    }
}

/// Inclusive popularity filter.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PopularityBounds {
    pub min: f64,
    pub max: f64,
}

impl Default for PopularityBounds {
    fn default() -> Self {
        Self {
            min: f64::NEG_INFINITY,
            max: f64::INFINITY,
        }
    }
}

impl PopularityBounds {
    /// Whether a popularity value passes the filter.
    #[must_use]
    pub fn contains(&self, popularity: f64) -> bool {
        popularity >= self.min && popularity <= self.max
    }
}

/// Resume point of a metric-ordered scan.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Keyset {
    pub key: f64,
    pub id: i64,
}

/// Resume point of a tally scan.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TallyKeyset {
    pub count: i64,
    pub category: VoteCategory,
}

impl TallyKeyset {
    /// Whether a row lies strictly after this position (count desc, category asc).
    #[must_use]
    pub fn precedes(&self, row: &TallyRow) -> bool {
        row.count < self.count
            || (row.count == self.count && row.category.as_str() > self.category.as_str())
    }
}

/// Parameters of an active-movie scan.
#[derive(Debug, Clone, PartialEq)]
pub struct MovieScan {
    pub sort: SortField,
    pub dir: SortDir,
    pub bounds: PopularityBounds,
    pub after: Option<Keyset>,
    pub limit: u64,
    pub fingerprint: Option<String>,
}

/// Parameters of a snapshot scan.
#[derive(Debug, Clone, PartialEq)]
pub struct SnapshotScan {
    pub sort: SortField,
    pub dir: SortDir,
    pub bounds: PopularityBounds,
    /// For [`SortField::MovieId`] only `id` is compared.
    pub after: Option<Keyset>,
    pub limit: u64,
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_tally_map_zero_filled_json() {
        let json = serde_json::to_string(&TallyMap::zero()).unwrap();
        assert_eq!(json, r#"{"arr":0,"couple":0,"solo_friends":0,"streaming":0}"#);
    }

    #[test]
    fn test_tally_map_ignores_unknown_and_fills_missing() {
        let map: TallyMap = serde_json::from_str(r#"{"couple":3,"horror":9}"#).unwrap();
        assert_eq!(map.get(VoteCategory::Couple), 3);
        assert_eq!(map.get(VoteCategory::Arr), 0);
        assert_eq!(map.total(), 3);

        let from_rows = TallyMap::from_counts([("streaming", 2), ("bogus", 5)]);
        assert_eq!(from_rows.get(VoteCategory::Streaming), 2);
        assert_eq!(from_rows.total(), 2);
    }

    #[test]
    fn test_ranked_ties_by_name() {
        let mut map = TallyMap::zero();
        map.set(VoteCategory::Streaming, 2);
        map.set(VoteCategory::Couple, 2);
        let order: Vec<_> = map.ranked().iter().map(|r| r.category.as_str()).collect();
        assert_eq!(order, ["couple", "streaming", "arr", "solo_friends"]);
    }

    #[test]
    fn test_year_month_parse_and_bounds() {
        let ym: YearMonth = "2024-02".parse().unwrap();
        assert_eq!(ym.to_string(), "2024-02");
        assert_eq!(ym.last_day(), NaiveDate::from_ymd_opt(2024, 2, 29).unwrap());
        assert_eq!(ym.previous().to_string(), "2024-01");
        assert_eq!(YearMonth::new(2024, 12).unwrap().next().to_string(), "2025-01");
        assert_eq!(YearMonth::new(2025, 1).unwrap().previous().to_string(), "2024-12");

        assert!("2024-13".parse::<YearMonth>().is_err());
        assert!("2024-2".parse::<YearMonth>().is_err());
        assert!("202402".parse::<YearMonth>().is_err());
    }

    #[test]
    fn test_year_month_serializes_as_object() {
        let json = serde_json::to_value(YearMonth::new(2025, 3).unwrap()).unwrap();
        assert_eq!(json, serde_json::json!({"year": 2025, "month": 3}));
    }

    #[test]
    fn test_sort_dir_is_after() {
        let at = Keyset { key: 5.0, id: 10 };
        assert!(SortDir::Desc.is_after(4.0, 99, &at));
        assert!(SortDir::Desc.is_after(5.0, 9, &at));
        assert!(!SortDir::Desc.is_after(5.0, 10, &at));
        assert!(SortDir::Asc.is_after(5.0, 11, &at));
        assert!(!SortDir::Asc.is_after(4.0, 11, &at));
    }

    #[test]
    fn test_sort_field_parse() {
        assert_eq!("couple".parse::<SortField>().unwrap(), SortField::Category(VoteCategory::Couple));
        assert_eq!("release_date".parse::<SortField>().unwrap(), SortField::ReleaseDate);
        assert!(matches!("title".parse::<SortField>(), Err(AppError::BadRequest(_))));
    }

    #[test]
    fn test_release_date_key_is_epoch_seconds() {
        let date = NaiveDate::from_ymd_opt(1970, 1, 2).unwrap();
        assert_eq!(SortField::ReleaseDate.key_of(1, 0.0, date, &TallyMap::zero()), 86_400.0);
    }
}
