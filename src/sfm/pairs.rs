//! Exhaustive image-pair generation.
//!
//! Writes the pairs list consumed by the matching stage: one unordered pair
//! per line, the two image references separated by a single space.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use anyhow::{Context, Result};
use tracing::debug;

/// Write every unordered pair over `references` to `path`.
///
/// Returns the number of pairs written, always n·(n−1)/2.
pub fn write_exhaustive(path: &Path, references: &[String]) -> Result<usize> {
    let file = File::create(path)
        .with_context(|| format!("failed to create pairs file {}", path.display()))?;
    let mut writer = BufWriter::new(file);

    let mut count = 0usize;
    for (i, a) in references.iter().enumerate() {
        for b in &references[i + 1..] {
            writeln!(writer, "{a} {b}")
                .with_context(|| format!("failed to write pairs file {}", path.display()))?;
            count += 1;
        }
    }
    writer
        .flush()
        .with_context(|| format!("failed to write pairs file {}", path.display()))?;

    debug!("wrote {count} exhaustive pairs to {}", path.display());
    Ok(count)
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;
    use std::fs;

    use super::*;

    fn refs(n: usize) -> Vec<String> {
        (0..n).map(|i| format!("img{i:03}.jpg")).collect()
    }

    #[test]
    fn test_pair_count_is_n_choose_2() {
        let dir = tempfile::tempdir().unwrap();
        for n in [0, 1, 2, 3, 5, 17] {
            let path = dir.path().join(format!("pairs-{n}.txt"));
            let count = write_exhaustive(&path, &refs(n)).unwrap();
            assert_eq!(count, n * n.saturating_sub(1) / 2);

            let lines = fs::read_to_string(&path).unwrap();
            assert_eq!(lines.lines().count(), count);
        }
    }

    #[test]
    fn test_pairs_are_distinct_members_of_the_reference_list() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pairs.txt");
        let references = refs(5);
        write_exhaustive(&path, &references).unwrap();

        let known: HashSet<&str> = references.iter().map(String::as_str).collect();
        let mut seen = HashSet::new();
        for line in fs::read_to_string(&path).unwrap().lines() {
            let (a, b) = line.split_once(' ').expect("two space-separated refs");
            assert_ne!(a, b);
            assert!(known.contains(a) && known.contains(b));
            assert!(seen.insert((a.to_string(), b.to_string())));
        }
        assert_eq!(seen.len(), 10);
        // Unordered: no pair also appears reversed.
        for (a, b) in &seen {
            assert!(!seen.contains(&(b.clone(), a.clone())));
        }
    }
}
