use std::fs::File;
use std::io;
use std::io::BufRead;
use std::path::Path;

/// Reads a target list: one URL per line, blank lines and `#` comments skipped.
pub fn read_targets(path: &Path) -> io::Result<Vec<String>> {
    let file = File::open(path)?;
    let reader = io::BufReader::new(file);
    let lines = reader
        .lines()
        .filter_map(|line| {
            let line = line.ok()?;
            let trimmed = line.trim().to_string();
            if trimmed.is_empty() || trimmed.starts_with('#') { None } else { Some(trimmed) }
        })
        .collect();
    Ok(lines)
}
