//! Padding blocks that keep hot fixture flags off shared cache lines.

use std::collections::HashMap;

const FIELDS_PER_LINE: usize = 16;

/// Memoizing generator of padding field declarations.
#[derive(Debug)]
pub struct Padding {
    fields: usize,
    cache: HashMap<String, String>,
}

impl Padding {
    pub fn new(fields: usize) -> Self {
        Self {
            fields,
            cache: HashMap::new(),
        }
    }

    /// Struct field declarations `pad_{prefix}_000: u8, ...`, sixteen per
    /// line, one line per row and no indentation.
    pub fn fields(&mut self, prefix: &str) -> &str {
        let fields = self.fields;
        self.cache
            .entry(prefix.to_string())
            .or_insert_with(|| render(prefix, fields))
    }

    pub fn len(&self) -> usize {
        self.fields
    }

    pub fn is_empty(&self) -> bool {
        self.fields == 0
    }
}

fn render(prefix: &str, fields: usize) -> String {
    let names: Vec<String> = (0..fields)
        .map(|i| format!("pad_{prefix}_{i:03}: u8,"))
        .collect();
    names
        .chunks(FIELDS_PER_LINE)
        .map(|row| row.join(" "))
        .collect::<Vec<_>>()
        .join("\n")
}
