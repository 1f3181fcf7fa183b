//! Offset-based pagination for `ListJobs`.
//!
//! Unlike the cursor-based Relay pagination used elsewhere in the wider
//! platform, job listings are paged by page number: the API layer renders a
//! classic "page N of M" list, not an infinite-scroll feed. `sort_by` is
//! restricted to a whitelist instead of casting an arbitrary
//! caller-supplied column name into `ORDER BY`, with a fixed `id ASC`
//! tie-breaker so pages are stable across requests.

/// Fields a job listing may be ordered by.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum JobSortBy {
    #[default]
    CreatedAt,
    UpdatedAt,
    Name,
    NextExecution,
}

impl JobSortBy {
    /// Parse a whitelisted sort key; anything else is a validation error.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "created_at" => Some(Self::CreatedAt),
            "updated_at" => Some(Self::UpdatedAt),
            "name" => Some(Self::Name),
            "next_execution" => Some(Self::NextExecution),
            _ => None,
        }
    }

    /// The column name plus a fixed `id` tie-breaker, safe to interpolate
    /// into `ORDER BY` because it is drawn only from this fixed set.
    pub fn order_by_clause(&self) -> &'static str {
        match self {
            Self::CreatedAt => "created_at DESC, id ASC",
            Self::UpdatedAt => "updated_at DESC, id ASC",
            Self::Name => "name ASC, id ASC",
            Self::NextExecution => "next_execution ASC NULLS LAST, id ASC",
        }
    }
}

/// Raw page/limit input as received from the API layer.
#[derive(Debug, Clone, Default)]
pub struct PageRequest {
    pub page: Option<u32>,
    pub limit: Option<u32>,
    pub sort_by: Option<String>,
}

/// Validated and normalized pagination parameters.
#[derive(Debug, Clone, Copy)]
pub struct ValidatedPage {
    /// 1-indexed page number.
    pub page: u32,
    /// Clamped to 1..=100.
    pub limit: u32,
    pub sort_by: JobSortBy,
}

impl PageRequest {
    pub fn validate(&self) -> Result<ValidatedPage, &'static str> {
        let page = self.page.unwrap_or(1).max(1);
        let limit = self.limit.unwrap_or(25).clamp(1, 100);
        let sort_by = match &self.sort_by {
            Some(s) => JobSortBy::parse(s).ok_or("invalid sortBy")?,
            None => JobSortBy::default(),
        };
        Ok(ValidatedPage { page, limit, sort_by })
    }
}

impl ValidatedPage {
    /// SQL `OFFSET` value.
    pub fn offset(&self) -> i64 {
        ((self.page - 1) as i64) * self.limit as i64
    }

    /// SQL `LIMIT` value.
    pub fn fetch_limit(&self) -> i64 {
        self.limit as i64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_to_page_one_limit_twenty_five() {
        let v = PageRequest::default().validate().unwrap();
        assert_eq!(v.page, 1);
        assert_eq!(v.limit, 25);
        assert_eq!(v.offset(), 0);
    }

    #[test]
    fn clamps_limit_to_one_hundred() {
        let v = PageRequest {
            limit: Some(1000),
            ..Default::default()
        }
        .validate()
        .unwrap();
        assert_eq!(v.limit, 100);
    }

    #[test]
    fn rejects_unknown_sort_key() {
        let req = PageRequest {
            sort_by: Some("'; DROP TABLE jobs;".to_string()),
            ..Default::default()
        };
        assert!(req.validate().is_err());
    }

    #[test]
    fn offset_advances_by_page() {
        let v = PageRequest {
            page: Some(3),
            limit: Some(10),
            ..Default::default()
        }
        .validate()
        .unwrap();
        assert_eq!(v.offset(), 20);
    }
}
