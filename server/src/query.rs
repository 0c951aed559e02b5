//! Server half of the list contract: pagination, filtering and sorting over
//! a [`Collection`], plus the total match count the table needs to compute
//! its page count.

use std::cmp::Ordering;
use std::collections::HashMap;

use chrono::NaiveDate;
use regex::{Regex, RegexBuilder};

use crate::error::AppError;
use crate::store::{Collection, Document};

pub const DEFAULT_PAGE_SIZE: usize = 25;
const MAX_PAGE_SIZE: usize = 200;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Direction {
    #[default]
    Asc,
    Desc,
}

impl Direction {
    fn parse(raw: &str) -> Self {
        if raw.eq_ignore_ascii_case("desc") {
            Direction::Desc
        } else {
            Direction::Asc
        }
    }
}

/// Paging, sorting and filter state parsed from the query string. Anything
/// that is not a paging or sorting key is treated as a filter field.
#[derive(Debug, Clone)]
pub struct ListParams {
    pub page: usize,
    pub page_size: usize,
    pub sort: Option<String>,
    pub direction: Direction,
    pub filters: HashMap<String, String>,
}

impl ListParams {
    pub fn from_query(mut raw: HashMap<String, String>) -> Self {
        let page = raw
            .remove("page")
            .and_then(|v| v.parse().ok())
            .unwrap_or(1)
            .max(1);
        let page_size = raw
            .remove("pageSize")
            .and_then(|v| v.parse().ok())
            .unwrap_or(DEFAULT_PAGE_SIZE)
            .clamp(1, MAX_PAGE_SIZE);
        let sort = raw.remove("sort").filter(|s| !s.is_empty());
        let direction = raw
            .remove("direction")
            .map(|v| Direction::parse(&v))
            .unwrap_or_default();
        raw.retain(|_, value| !value.is_empty());

        Self {
            page,
            page_size,
            sort,
            direction,
            filters: raw,
        }
    }

    pub fn skip(&self) -> usize {
        (self.page - 1) * self.page_size
    }
}

/// A field value exposed for filtering and sorting.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    Text(String),
    Number(f64),
    Date(NaiveDate),
}

impl FieldValue {
    fn as_text(&self) -> String {
        match self {
            FieldValue::Text(text) => text.clone(),
            FieldValue::Number(number) => number.to_string(),
            FieldValue::Date(date) => date.to_string(),
        }
    }

    fn compare(&self, other: &FieldValue) -> Ordering {
        match (self, other) {
            (FieldValue::Text(a), FieldValue::Text(b)) => a.cmp(b),
            (FieldValue::Number(a), FieldValue::Number(b)) => a.total_cmp(b),
            (FieldValue::Date(a), FieldValue::Date(b)) => a.cmp(b),
            // Mixed kinds only happen on a misnamed sort key.
            _ => Ordering::Equal,
        }
    }
}

/// Named field access for listable records. Field names use the wire
/// spelling so query-string keys line up directly.
pub trait Fields {
    fn field(&self, name: &str) -> Option<FieldValue>;
}

#[derive(Debug)]
pub struct PageOut<T> {
    pub rows: Vec<T>,
    pub count: usize,
}

/// Runs a list query: filter, count, sort, then paginate. `count` is the
/// number of matches before pagination.
pub async fn run<T>(collection: &Collection<T>, params: &ListParams) -> Result<PageOut<T>, AppError>
where
    T: Document + Fields,
{
    let filters = compile_filters(&params.filters)?;

    let mut rows = collection
        .find(|doc| {
            filters.iter().all(|(name, pattern)| match doc.field(name) {
                Some(value) => pattern.is_match(&value.as_text()),
                // Filters on fields the record does not expose are ignored.
                None => true,
            })
        })
        .await;

    let count = rows.len();

    if let Some(sort) = &params.sort {
        sort_rows(&mut rows, sort, params.direction);
    }

    let rows = rows
        .into_iter()
        .skip(params.skip())
        .take(params.page_size)
        .collect();

    Ok(PageOut { rows, count })
}

/// Filter values compile to case-insensitive patterns; a plain value acts
/// as a substring match.
fn compile_filters(filters: &HashMap<String, String>) -> Result<Vec<(String, Regex)>, AppError> {
    filters
        .iter()
        .map(|(name, value)| {
            RegexBuilder::new(value)
                .case_insensitive(true)
                .build()
                .map(|pattern| (name.clone(), pattern))
                .map_err(|_| AppError::BadRequest(format!("Invalid filter for {name}.")))
        })
        .collect()
}

fn sort_rows<T: Fields>(rows: &mut [T], key: &str, direction: Direction) {
    rows.sort_by(|a, b| {
        let ordering = match (a.field(key), b.field(key)) {
            (Some(x), Some(y)) => x.compare(&y),
            (Some(_), None) => Ordering::Greater,
            (None, Some(_)) => Ordering::Less,
            (None, None) => Ordering::Equal,
        };
        match direction {
            Direction::Asc => ordering,
            Direction::Desc => ordering.reverse(),
        }
    });
}

/// Parses an optional `startDate`/`endDate` pair used by the date-ranged
/// lists (readings, deliveries).
pub fn date_range(
    raw: &mut HashMap<String, String>,
) -> Result<(Option<NaiveDate>, Option<NaiveDate>), AppError> {
    let parse = |value: Option<String>| -> Result<Option<NaiveDate>, AppError> {
        match value.filter(|v| !v.is_empty()) {
            Some(v) => v
                .parse()
                .map(Some)
                .map_err(|_| AppError::BadRequest("Please input a valid date.".to_string())),
            None => Ok(None),
        }
    };

    let start = parse(raw.remove("startDate"))?;
    let end = parse(raw.remove("endDate"))?;
    Ok((start, end))
}

pub fn within_range(date: NaiveDate, start: Option<NaiveDate>, end: Option<NaiveDate>) -> bool {
    start.map_or(true, |s| date >= s) && end.map_or(true, |e| date <= e)
}
