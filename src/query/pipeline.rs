/// Split a query on the first unescaped `|`.
///
/// `\|` produces a literal pipe and is consumed here; every other escape
/// sequence is passed through untouched for the term parser. Both halves
/// come back trimmed.
pub fn split_pipeline(raw: &str) -> (String, String) {
    let mut left = String::new();
    let mut chars = raw.chars();

    while let Some(c) = chars.next() {
        match c {
            '\\' => match chars.next() {
                // the pipe escape is resolved at this stage
                Some('|') => left.push('|'),
                Some(other) => {
                    left.push('\\');
                    left.push(other);
                }
                None => left.push('\\'),
            },
            '|' => {
                let right: String = chars.collect();
                return (left.trim().to_string(), right.trim().to_string());
            }
            _ => left.push(c),
        }
    }

    (left.trim().to_string(), String::new())
}
