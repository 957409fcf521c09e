use std::fmt;

/// Value of the readiness column. Free-form in the sheet; the engine only
/// ever writes `No` or `Check` and only reads `Yes`. Matching ignores case
/// and surrounding space, and a cell that already matches the derived
/// status is written back with its original spelling.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum Status {
    Yes,
    Check,
    No,
    #[default]
    Empty,
    Other(String),
}

impl Status {
    pub fn parse(raw: &str) -> Self {
        let s = raw.trim();
        if s.is_empty() {
            return Self::Empty;
        }
        match s.to_lowercase().as_str() {
            "yes" => Self::Yes,
            "check" => Self::Check,
            "no" => Self::No,
            _ => Self::Other(s.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Self::Yes => "yes",
            Self::Check => "check",
            Self::No => "no",
            Self::Empty => "",
            Self::Other(s) => s,
        }
    }

    pub fn is_yes(&self) -> bool {
        matches!(self, Self::Yes)
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if matches!(self, Self::Empty) {
            write!(f, "(blank)")
        } else {
            write!(f, "{}", self.as_str())
        }
    }
}

/// One data line of the claims spreadsheet, as seen by the engine.
#[derive(Debug, Clone)]
pub struct Row {
    /// Position in `Table::rows`.
    pub index: usize,
    /// 1-based spreadsheet line; the header occupies line 1.
    pub line: usize,
    pub payer: String,
    pub description: String,
    pub unique_id: String,
    pub status: Status,
    /// Set once the engine has reconciled the row.
    pub file_count: Option<usize>,
}

impl Row {
    pub fn new(index: usize, payer: &str, description: &str) -> Self {
        Self {
            index,
            line: index + 2,
            payer: payer.trim().to_string(),
            description: description.trim().to_string(),
            unique_id: String::new(),
            status: Status::Empty,
            file_count: None,
        }
    }

    /// Rows missing a payer or a description are never touched.
    pub fn is_actionable(&self) -> bool {
        !self.payer.is_empty() && !self.description.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_parse() {
        assert_eq!(Status::parse("yes"), Status::Yes);
        assert_eq!(Status::parse(" YES "), Status::Yes);
        assert_eq!(Status::parse("check"), Status::Check);
        assert_eq!(Status::parse("no"), Status::No);
        assert_eq!(Status::parse("   "), Status::Empty);
        assert_eq!(Status::parse("待定"), Status::Other("待定".to_string()));
    }

    #[test]
    fn test_status_as_str_keeps_free_text() {
        assert_eq!(Status::Other("maybe".into()).as_str(), "maybe");
        assert_eq!(Status::Empty.as_str(), "");
        assert_eq!(Status::Check.to_string(), "check");
    }

    #[test]
    fn test_row_line_numbers_skip_header() {
        let row = Row::new(0, " 张三 ", "文具 ");
        assert_eq!(row.line, 2);
        assert_eq!(row.payer, "张三");
        assert_eq!(row.description, "文具");
        assert!(row.is_actionable());
        assert!(!Row::new(3, "张三", "  ").is_actionable());
    }
}
