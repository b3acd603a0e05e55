// src/db/sort.rs

//! Paging and sorting parameters for the job listing query.
//!
//! Sort fields use the client-facing names (`ID`, `NAME`, ...) and are
//! translated to columns here, so callers never smuggle SQL in. Every
//! ordering gets a trailing `id ASC` tie-break, which is what makes paging
//! stable when the requested keys collide.

use crate::errors::{Result, SchedulerError};
use crate::types::JobStatus;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortOrder {
    Asc,
    Desc,
}

impl SortOrder {
    fn sql(self) -> &'static str {
        match self {
            SortOrder::Asc => "ASC",
            SortOrder::Desc => "DESC",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobSortField {
    Id,
    Name,
    Owner,
    Priority,
    Status,
    SubmitTime,
}

impl JobSortField {
    /// Parse a client-facing field name.
    pub fn parse(name: &str) -> Result<Self> {
        match name {
            "ID" => Ok(JobSortField::Id),
            "NAME" => Ok(JobSortField::Name),
            "OWNER" => Ok(JobSortField::Owner),
            "PRIORITY" => Ok(JobSortField::Priority),
            "STATUS" => Ok(JobSortField::Status),
            "SUBMIT_TIME" => Ok(JobSortField::SubmitTime),
            other => Err(SchedulerError::InvalidQuery(format!(
                "unknown sort field '{other}'"
            ))),
        }
    }

    fn column(self) -> &'static str {
        match self {
            JobSortField::Id => "id",
            JobSortField::Name => "name",
            JobSortField::Owner => "owner",
            JobSortField::Priority => "priority",
            JobSortField::Status => "status",
            JobSortField::SubmitTime => "submitted_time",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct JobSortParameter {
    pub field: JobSortField,
    pub order: SortOrder,
}

impl JobSortParameter {
    pub fn asc(field: JobSortField) -> Self {
        Self {
            field,
            order: SortOrder::Asc,
        }
    }

    pub fn desc(field: JobSortField) -> Self {
        Self {
            field,
            order: SortOrder::Desc,
        }
    }
}

/// One page of the job listing.
#[derive(Debug, Clone, Default)]
pub struct JobPageRequest {
    pub offset: i64,
    /// Zero means no limit.
    pub limit: i64,
    pub owner: Option<String>,
    pub statuses: Option<Vec<JobStatus>>,
    pub sort: Vec<JobSortParameter>,
}

pub(crate) fn order_by_clause(sort: &[JobSortParameter]) -> String {
    let mut clause = String::from(" ORDER BY ");
    for param in sort {
        clause.push_str(param.field.column());
        clause.push(' ');
        clause.push_str(param.order.sql());
        clause.push_str(", ");
    }
    clause.push_str("id ASC");
    clause
}

