//! Parameterized SQL builder
//!
//! Clause text is `&'static str`; every runtime value goes through a bound
//! parameter, so filter input can never reach the query text.

use chrono::NaiveDateTime;
use cpfm_types::{DateRange, TIMESTAMP_FORMAT};
use rusqlite::ToSql;

pub struct QueryBuilder {
    sql: String,
    params: Vec<Box<dyn ToSql>>,
    has_where: bool,
}

impl QueryBuilder {
    /// Start from a `SELECT ... FROM ...` head (no WHERE)
    pub fn new(head: &'static str) -> Self {
        Self {
            sql: head.to_string(),
            params: Vec::new(),
            has_where: false,
        }
    }

    fn connective(&mut self) {
        if self.has_where {
            self.sql.push_str(" AND ");
        } else {
            self.sql.push_str(" WHERE ");
            self.has_where = true;
        }
    }

    /// Condition without parameters
    pub fn and(mut self, clause: &'static str) -> Self {
        self.connective();
        self.sql.push_str(clause);
        self
    }

    /// Condition with one `?` placeholder
    pub fn and_param<P: ToSql + 'static>(mut self, clause: &'static str, value: P) -> Self {
        self.connective();
        self.sql.push_str(clause);
        self.params.push(Box::new(value));
        self
    }

    /// `column BETWEEN start AND end` over an inclusive date range
    pub fn and_range(mut self, column: &'static str, range: &DateRange) -> Self {
        self.connective();
        self.sql.push_str(column);
        self.sql.push_str(" BETWEEN ? AND ?");
        self.params.push(Box::new(format_ts(&range.start())));
        self.params.push(Box::new(format_ts(&range.end())));
        self
    }

    /// Trailing static SQL (GROUP BY, ORDER BY)
    pub fn push(mut self, tail: &'static str) -> Self {
        self.sql.push(' ');
        self.sql.push_str(tail);
        self
    }

    /// `LIMIT ? OFFSET ?` with bound values
    pub fn page(mut self, limit: usize, offset: usize) -> Self {
        self.sql.push_str(" LIMIT ? OFFSET ?");
        self.params.push(Box::new(limit as i64));
        self.params.push(Box::new(offset as i64));
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.sql.push_str(" LIMIT ?");
        self.params.push(Box::new(limit as i64));
        self
    }

    pub fn sql(&self) -> &str {
        &self.sql
    }

    pub fn params(&self) -> Vec<&dyn ToSql> {
        self.params.iter().map(|p| p.as_ref()).collect()
    }
}

pub fn format_ts(ts: &NaiveDateTime) -> String {
    ts.format(TIMESTAMP_FORMAT).to_string()
}

/// Escape `%`, `_` and `\` for a `LIKE ... ESCAPE '\'` pattern
pub fn like_contains(needle: &str) -> String {
    let mut pattern = String::with_capacity(needle.len() + 2);
    pattern.push('%');
    for ch in needle.chars() {
        if matches!(ch, '%' | '_' | '\\') {
            pattern.push('\\');
        }
        pattern.push(ch);
    }
    pattern.push('%');
    pattern
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_where_and_chaining() {
        let q = QueryBuilder::new("SELECT * FROM cpfm_site_info si")
            .and("TRIM(si.plugin_name) <> ''")
            .and_param("cpfm_fold(si.plugin_name) = ?", "cool timeline".to_string())
            .push("ORDER BY si.site_id ASC")
            .page(10, 20);

        assert_eq!(
            q.sql(),
            "SELECT * FROM cpfm_site_info si WHERE TRIM(si.plugin_name) <> '' \
             AND cpfm_fold(si.plugin_name) = ? ORDER BY si.site_id ASC LIMIT ? OFFSET ?"
        );
        assert_eq!(q.params().len(), 3);
    }

    #[test]
    fn test_range_binds_day_bounds() {
        let range = DateRange::parse("2024-01-01", "2024-01-31").unwrap();
        let q = QueryBuilder::new("SELECT 1 FROM t").and_range("update_date", &range);
        assert_eq!(q.sql(), "SELECT 1 FROM t WHERE update_date BETWEEN ? AND ?");
        assert_eq!(q.params().len(), 2);
    }

    #[test]
    fn test_like_escaping() {
        assert_eq!(like_contains("cool"), "%cool%");
        assert_eq!(like_contains("50%_off\\"), "%50\\%\\_off\\\\%");
    }
}
