//! Request parameter extraction

use serde::Deserialize;

/// Query parameters accepted by the image endpoint
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ImageQuery {
    /// Extension of the stored original when it differs from the requested one
    pub original: Option<String>,
    /// Status code to answer with when the original is missing
    pub status: Option<String>,
}

impl ImageQuery {
    /// Empty values behave as if the parameter was absent
    pub fn original(&self) -> Option<String> {
        non_empty(&self.original)
    }

    pub fn status(&self) -> Option<String> {
        non_empty(&self.status)
    }
}

fn non_empty(value: &Option<String>) -> Option<String> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_values_are_absent() {
        let query = ImageQuery {
            original: Some(String::new()),
            status: Some(" 410 ".to_string()),
        };
        assert_eq!(query.original(), None);
        assert_eq!(query.status().as_deref(), Some("410"));
    }
}
