use common::error::AppError;

/// Gate on user-supplied queries before they reach a prompt.
#[derive(Debug, Clone)]
pub struct QuerySanitizer {
    max_chars: usize,
}

impl Default for QuerySanitizer {
    fn default() -> Self {
        Self { max_chars: 8192 }
    }
}

impl QuerySanitizer {
    pub fn new(max_chars: usize) -> Self {
        Self { max_chars }
    }

    pub fn check(&self, query: &str) -> Result<(), AppError> {
        if query.trim().is_empty() {
            return Err(AppError::InputRejected("query is empty".into()));
        }
        if query.chars().count() > self.max_chars {
            return Err(AppError::InputRejected(format!(
                "query exceeds {} characters",
                self.max_chars
            )));
        }
        if query
            .chars()
            .any(|c| c.is_control() && !matches!(c, '\n' | '\r' | '\t'))
        {
            return Err(AppError::InputRejected(
                "query contains control characters".into(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_ordinary_questions() {
        assert!(QuerySanitizer::default().check("How do refunds work?").is_ok());
    }

    #[test]
    fn rejects_blank_and_oversized_queries() {
        let sanitizer = QuerySanitizer::new(10);
        assert!(matches!(
            sanitizer.check("   "),
            Err(AppError::InputRejected(_))
        ));
        assert!(matches!(
            sanitizer.check("a query that is definitely too long"),
            Err(AppError::InputRejected(_))
        ));
    }

    #[test]
    fn rejects_control_characters_but_allows_newlines() {
        let sanitizer = QuerySanitizer::default();
        assert!(sanitizer.check("line one\nline two").is_ok());
        assert!(matches!(
            sanitizer.check("null\u{0}byte"),
            Err(AppError::InputRejected(_))
        ));
    }
}
