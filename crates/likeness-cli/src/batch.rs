use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug, PartialEq)]
#[error("line {line}: expected two image paths, found {found} field(s)")]
pub struct PairsError {
    pub line: usize,
    pub found: usize,
}

/// Parse a pairs list: one `IMAGE_A IMAGE_B` pair per line, whitespace
/// separated. Blank lines and lines starting with `#` are skipped.
pub fn parse_pairs(text: &str) -> Result<Vec<(PathBuf, PathBuf)>, PairsError> {
    text.lines()
        .enumerate()
        .map(|(i, line)| (i + 1, line.trim()))
        .filter(|(_, line)| !line.is_empty() && !line.starts_with('#'))
        .map(|(line_no, line)| {
            let fields: Vec<&str> = line.split_whitespace().collect();
            match fields.as_slice() {
                [a, b] => Ok((PathBuf::from(a), PathBuf::from(b))),
                other => Err(PairsError {
                    line: line_no,
                    found: other.len(),
                }),
            }
        })
        .collect()
}
