//! Prometheus text exposition parsing
//!
//! Only the sample lines matter here; `# HELP` and `# TYPE` comments are
//! skipped, as are lines whose value does not parse.

use std::collections::BTreeMap;

/// One sample line: `name{label="value",...} value [timestamp]`
#[derive(Debug, Clone, PartialEq)]
pub struct Sample {
    pub name: String,
    pub labels: BTreeMap<String, String>,
    pub value: f64,
}

impl Sample {
    pub fn label(&self, key: &str) -> &str {
        self.labels.get(key).map(String::as_str).unwrap_or_default()
    }
}

pub fn parse(body: &str) -> Vec<Sample> {
    body.lines().filter_map(parse_line).collect()
}

fn parse_line(line: &str) -> Option<Sample> {
    let line = line.trim();
    if line.is_empty() || line.starts_with('#') {
        return None;
    }

    let (name, labels, rest) = match line.find('{') {
        Some(open) => {
            let (labels, consumed) = parse_labels(&line[open + 1..])?;
            (&line[..open], labels, &line[open + 1 + consumed..])
        }
        None => {
            let split = line.find(char::is_whitespace)?;
            (&line[..split], BTreeMap::new(), &line[split..])
        }
    };

    let value = parse_value(rest.split_whitespace().next()?)?;

    Some(Sample {
        name: name.trim().to_string(),
        labels,
        value,
    })
}

fn parse_value(raw: &str) -> Option<f64> {
    match raw {
        "+Inf" => Some(f64::INFINITY),
        "-Inf" => Some(f64::NEG_INFINITY),
        _ => raw.parse().ok(),
    }
}

/// Parse `a="b",c="d"}` and return the labels plus bytes consumed
/// (including the closing brace)
fn parse_labels(input: &str) -> Option<(BTreeMap<String, String>, usize)> {
    let mut labels = BTreeMap::new();
    let mut chars = input.char_indices().peekable();

    loop {
        while matches!(chars.peek(), Some((_, c)) if c.is_whitespace() || *c == ',') {
            chars.next();
        }

        let (start, c) = *chars.peek()?;
        if c == '}' {
            return Some((labels, start + 1));
        }

        let mut key = String::new();
        for (_, c) in chars.by_ref() {
            if c == '=' {
                break;
            }
            key.push(c);
        }

        if chars.next()?.1 != '"' {
            return None;
        }

        let mut value = String::new();
        loop {
            match chars.next()?.1 {
                '\\' => match chars.next()?.1 {
                    'n' => value.push('\n'),
                    other => value.push(other),
                },
                '"' => break,
                c => value.push(c),
            }
        }

        labels.insert(key.trim().to_string(), value);
    }
}
