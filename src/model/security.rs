//! Resolved access policy for one request.
//!
//! Policy resolution happens upstream; the compiler only asks whether a field
//! is visible and ANDs the row filter into every base filter.

use std::collections::HashSet;

use super::expr::Expression;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Security {
    /// Row-level restriction over dimension names.
    pub row_filter: Option<Expression>,
    /// When set, only these fields are visible.
    pub include: Option<HashSet<String>>,
    /// Hidden fields; applied after `include`.
    pub exclude: HashSet<String>,
}

impl Security {
    /// Everything visible, no row filter.
    pub fn open() -> Self {
        Self::default()
    }

    pub fn with_row_filter(mut self, filter: Expression) -> Self {
        self.row_filter = Some(filter);
        self
    }

    pub fn with_include<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.include = Some(fields.into_iter().map(Into::into).collect());
        self
    }

    pub fn with_exclude<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.exclude = fields.into_iter().map(Into::into).collect();
        self
    }

    pub fn can_access_field(&self, name: &str) -> bool {
        let included = self.include.as_ref().map_or(true, |inc| inc.contains(name));
        included && !self.exclude.contains(name)
    }
}
