//! `*`-only glob matching
//!
//! A glob is compiled once into a leading literal, the literals found between
//! wildcards, and a trailing literal. Matching is anchored at both ends and
//! case-sensitive; `*` matches any run of characters, including none.

/// A compiled glob.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Glob {
    source: String,
    prefix: String,
    /// Literals between wildcards, searched left to right
    middle: Vec<String>,
    /// `None` when the glob has no wildcard at all
    suffix: Option<String>,
}

impl Glob {
    /// Compile a glob. Runs of `*` collapse into one wildcard.
    pub fn new(source: &str) -> Self {
        let mut parts = source.split('*');
        let prefix = parts.next().unwrap_or_default().to_string();
        let mut rest: Vec<String> = parts.map(str::to_string).collect();

        let suffix = rest.pop();
        rest.retain(|lit| !lit.is_empty());

        Self {
            source: source.to_string(),
            prefix,
            middle: rest,
            suffix,
        }
    }

    /// The glob text as written.
    pub fn as_str(&self) -> &str {
        &self.source
    }

    /// Whether the glob matches every string.
    pub fn is_match_all(&self) -> bool {
        self.prefix.is_empty()
            && self.middle.is_empty()
            && self.suffix.as_deref() == Some("")
    }

    /// Match `text` against the glob.
    pub fn matches(&self, text: &str) -> bool {
        let suffix = match &self.suffix {
            Some(suffix) => suffix,
            None => return text == self.prefix,
        };

        if text.len() < self.prefix.len() + suffix.len() {
            return false;
        }
        if !text.starts_with(self.prefix.as_str()) || !text.ends_with(suffix.as_str()) {
            return false;
        }

        // Leftmost search is enough when the only metacharacter is `*`.
        let mut window = &text[self.prefix.len()..text.len() - suffix.len()];
        for literal in &self.middle {
            match window.find(literal.as_str()) {
                Some(pos) => window = &window[pos + literal.len()..],
                None => return false,
            }
        }

        true
    }
}
