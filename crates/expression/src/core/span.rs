//! Source span tracking for error reporting

/// A byte range in the expression source
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Span {
    /// Start byte offset in the source
    pub start: u32,
    /// End byte offset in the source (exclusive)
    pub end: u32,
}

impl Span {
    /// Create a new span
    pub fn new(start: usize, end: usize) -> Self {
        Self {
            start: start as u32,
            end: end as u32,
        }
    }

    /// Length of this span in bytes
    pub fn len(&self) -> usize {
        self.end.saturating_sub(self.start) as usize
    }

    /// Check if this span is empty
    pub fn is_empty(&self) -> bool {
        self.start >= self.end
    }

    /// Extract the text for this span from the source
    pub fn slice<'a>(&self, source: &'a str) -> &'a str {
        source
            .get(self.start as usize..self.end as usize)
            .unwrap_or("")
    }
}

impl std::fmt::Display for Span {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}..{}", self.start, self.end)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slice_returns_covered_text() {
        let span = Span::new(4, 8);
        assert_eq!(span.slice("abc prop != 1"), "prop");
        assert_eq!(span.len(), 4);
        assert!(!span.is_empty());
    }

    #[test]
    fn slice_out_of_range_is_empty() {
        assert_eq!(Span::new(10, 20).slice("short"), "");
    }
}
