/// Parsed text-filter terms. Matching is case-insensitive substring
/// containment, so terms are stored lowercased.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Terms {
    pub include: Vec<String>,
    pub exclude: Vec<String>,
}

impl Terms {
    pub fn is_empty(&self) -> bool {
        self.include.is_empty() && self.exclude.is_empty()
    }

    /// Check a record's content. The caller supplies the already-lowercased
    /// text so one candidate is lowercased once, not once per term.
    pub fn matches(&self, content_lower: &str) -> bool {
        if !self.include.iter().all(|t| content_lower.contains(t.as_str())) {
            return false;
        }
        !self.exclude.iter().any(|t| content_lower.contains(t.as_str()))
    }
}

/// Shell-style term parsing:
/// - whitespace separates terms
/// - `"double quotes"` group a phrase (spaces preserved)
/// - a leading `-` marks the term as an exclusion
/// - `\` escapes the next character (`\-`, `\"`, `\\`)
pub fn parse_terms(text: &str) -> Terms {
    let chars: Vec<char> = text.chars().collect();
    let len = chars.len();
    let mut terms = Terms::default();
    let mut i = 0;

    while i < len {
        while i < len && chars[i].is_whitespace() {
            i += 1;
        }
        if i >= len {
            break;
        }

        let mut is_exclude = false;
        if chars[i] == '-' {
            is_exclude = true;
            i += 1;
        }

        let mut term = String::new();
        let mut quoted = false;

        while i < len {
            let c = chars[i];
            if c == '\\' && i + 1 < len {
                i += 1;
                term.push(chars[i]);
                i += 1;
            } else if c == '"' && !quoted {
                quoted = true;
                i += 1;
            } else if c == '"' && quoted {
                quoted = false;
                i += 1;
                break;
            } else if c.is_whitespace() && !quoted {
                break;
            } else {
                term.push(c);
                i += 1;
            }
        }

        if !term.is_empty() {
            let term = term.to_lowercase();
            if is_exclude {
                terms.exclude.push(term);
            } else {
                terms.include.push(term);
            }
        }
    }

    terms
}
