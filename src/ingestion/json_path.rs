use crate::error::{Result, WarehouseError};
use serde::Deserialize;
use serde_json::Value;

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Key(String),
    Index(usize),
}

/// A JSONPaths expression restricted to member and index access, the subset
/// COPY accepts: `$['a']`, `$["a"]`, `$.a.b`, `$['a'][0]`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JsonPath {
    raw: String,
    segments: Vec<Segment>,
}

#[derive(Deserialize)]
struct JsonPathsFile {
    jsonpaths: Vec<String>,
}

impl JsonPath {
    pub fn parse(expr: &str) -> Result<Self> {
        let invalid = |why: &str| WarehouseError::Config(format!("Invalid JSONPath '{}': {}", expr, why));
        let rest = expr.trim().strip_prefix('$').ok_or_else(|| invalid("must start with '$'"))?;

        let chars: Vec<char> = rest.chars().collect();
        let mut segments = Vec::new();
        let mut i = 0;
        while i < chars.len() {
            match chars[i] {
                '.' => {
                    let start = i + 1;
                    let mut end = start;
                    while end < chars.len() && chars[end] != '.' && chars[end] != '[' {
                        end += 1;
                    }
                    if end == start {
                        return Err(invalid("empty member name"));
                    }
                    segments.push(Segment::Key(chars[start..end].iter().collect()));
                    i = end;
                }
                '[' => {
                    let close = chars[i..]
                        .iter()
                        .position(|&c| c == ']')
                        .map(|p| p + i)
                        .ok_or_else(|| invalid("unclosed '['"))?;
                    let inner: String = chars[i + 1..close].iter().collect();
                    let inner = inner.trim();
                    let quoted = inner.len() >= 2
                        && ((inner.starts_with('\'') && inner.ends_with('\''))
                            || (inner.starts_with('"') && inner.ends_with('"')));
                    if quoted {
                        segments.push(Segment::Key(inner[1..inner.len() - 1].to_string()));
                    } else {
                        let idx = inner.parse().map_err(|_| invalid("bracket must hold a quoted key or an index"))?;
                        segments.push(Segment::Index(idx));
                    }
                    i = close + 1;
                }
                _ => return Err(invalid("unexpected character")),
            }
        }

        Ok(Self {
            raw: expr.trim().to_string(),
            segments,
        })
    }

    /// Parse a JSONPaths document: `{"jsonpaths": ["$['artist']", ...]}`.
    pub fn parse_file(content: &str) -> Result<Vec<Self>> {
        let file: JsonPathsFile = serde_json::from_str(content)?;
        file.jsonpaths.iter().map(|p| Self::parse(p)).collect()
    }

    pub fn evaluate<'a>(&self, value: &'a Value) -> Option<&'a Value> {
        self.segments.iter().try_fold(value, |current, segment| match segment {
            Segment::Key(key) => current.get(key.as_str()),
            Segment::Index(idx) => current.get(*idx),
        })
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }
}
