//! Paging and ordering for list operations.
//!
//! `orderby` is a comma separated list of `field__dir` entries, for example
//! `name__asc,created_at__desc`. Entries that do not parse are skipped. When
//! none remain the listing is ordered by `updated_at` descending.

use std::cmp::Ordering;

use serde::Deserialize;

pub const DEFAULT_PAGE_SIZE: usize = 10;
pub const MAX_PAGE_SIZE: usize = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortDirection {
    Asc,
    Desc,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SortKey {
    pub field: String,
    pub direction: SortDirection,
}

impl SortKey {
    fn parse(entry: &str) -> Option<Self> {
        let mut parts = entry.trim().split("__");
        let field = parts.next()?.trim();
        let direction = match parts.next().map(str::trim) {
            None | Some("asc") => SortDirection::Asc,
            Some("desc") => SortDirection::Desc,
            Some(_) => return None,
        };
        if field.is_empty() || parts.next().is_some() {
            return None;
        }
        Some(Self {
            field: field.to_string(),
            direction,
        })
    }
}

/// Query string of a list endpoint: `?page=&page_size=&orderby=`.
///
/// Zero values fall back to the first page and the default page size.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct QueryParams {
    pub page: usize,
    pub page_size: usize,
    #[serde(rename = "orderby")]
    pub order_by: Option<String>,
}

impl QueryParams {
    pub fn new(page: usize, page_size: usize) -> Self {
        Self {
            page,
            page_size,
            order_by: None,
        }
    }

    pub fn ordered_by(mut self, order_by: impl Into<String>) -> Self {
        self.order_by = Some(order_by.into());
        self
    }

    /// Effective page size, capped at [`MAX_PAGE_SIZE`].
    pub fn limit(&self) -> usize {
        match self.page_size {
            0 => DEFAULT_PAGE_SIZE,
            n => n.min(MAX_PAGE_SIZE),
        }
    }

    pub fn offset(&self) -> usize {
        self.page.max(1).saturating_sub(1).saturating_mul(self.limit())
    }

    pub fn sort_keys(&self) -> Vec<SortKey> {
        let keys: Vec<SortKey> = self
            .order_by
            .as_deref()
            .unwrap_or_default()
            .split(',')
            .filter_map(SortKey::parse)
            .collect();
        if keys.is_empty() {
            vec![SortKey {
                field: "updated_at".to_string(),
                direction: SortDirection::Desc,
            }]
        } else {
            keys
        }
    }

    /// Orders `items` by the requested keys, then cuts out the requested page.
    pub fn apply<T: Sortable>(&self, mut items: Vec<T>) -> Vec<T> {
        let keys = self.sort_keys();
        items.sort_by(|a, b| {
            keys.iter()
                .filter_map(|key| {
                    let ord = a.compare_by(b, &key.field)?;
                    Some(match key.direction {
                        SortDirection::Asc => ord,
                        SortDirection::Desc => ord.reverse(),
                    })
                })
                .find(|ord| ord.is_ne())
                .unwrap_or(Ordering::Equal)
        });
        items
            .into_iter()
            .skip(self.offset())
            .take(self.limit())
            .collect()
    }
}

/// A listed entity that can be ordered by named fields.
pub trait Sortable {
    /// `None` when the entity has no such field; the key is then ignored.
    fn compare_by(&self, other: &Self, field: &str) -> Option<Ordering>;
}
