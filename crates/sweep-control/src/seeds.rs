use std::path::Path;

use rand::{Rng, seq::SliceRandom};
use sweep_model::Seed;

use crate::error::SeedError;

/// Splits one CSV record. Commas inside double quotes stay in the cell and
/// `""` inside quotes is a literal quote.
fn split_cells(line: &str) -> Vec<String> {
    let mut cells = Vec::new();
    let mut cell = String::new();
    let mut quoted = false;
    let mut chars = line.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '"' if quoted && chars.peek() == Some(&'"') => {
                cell.push('"');
                chars.next();
            }
            '"' => quoted = !quoted,
            ',' if !quoted => cells.push(std::mem::take(&mut cell).trim().to_string()),
            _ => cell.push(c),
        }
    }
    cells.push(cell.trim().to_string());
    cells
}

/// Parses a headered CSV with at least `seed` and `size` columns.
pub fn parse_dataset(text: &str) -> Result<Vec<Seed>, SeedError> {
    let mut lines = text
        .lines()
        .enumerate()
        .filter(|(_, l)| !l.trim().is_empty());

    let Some((_, header)) = lines.next() else {
        return Err(SeedError::MissingColumn("seed"));
    };
    let columns: Vec<String> = split_cells(header.trim_start_matches('\u{feff}'))
        .into_iter()
        .map(|c| c.to_ascii_lowercase())
        .collect();
    let seed_idx = columns
        .iter()
        .position(|c| c == "seed")
        .ok_or(SeedError::MissingColumn("seed"))?;
    let size_idx = columns
        .iter()
        .position(|c| c == "size")
        .ok_or(SeedError::MissingColumn("size"))?;

    let mut rows = Vec::new();
    for (idx, line) in lines {
        let cells = split_cells(line);
        let cell = |i: usize, column: &'static str| -> Result<String, SeedError> {
            cells
                .get(i)
                .filter(|v| !v.is_empty())
                .cloned()
                .ok_or(SeedError::MalformedRow {
                    line: idx + 1,
                    column,
                })
        };
        rows.push(Seed {
            seed: cell(seed_idx, "seed")?,
            size: cell(size_idx, "size")?,
        });
    }

    if rows.is_empty() {
        return Err(SeedError::Empty);
    }
    Ok(rows)
}

pub async fn load_dataset(path: &Path) -> Result<Vec<Seed>, SeedError> {
    let text = tokio::fs::read_to_string(path)
        .await
        .map_err(|source| SeedError::Io {
            path: path.to_path_buf(),
            source,
        })?;
    parse_dataset(&text)
}

/// Uniform pick over the dataset rows.
pub fn pick<'a, R: Rng + ?Sized>(rows: &'a [Seed], rng: &mut R) -> Option<&'a Seed> {
    rows.choose(rng)
}
