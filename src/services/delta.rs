//! Copy-set computation.

use crate::models::LogFile;
use std::collections::HashSet;

/// Files present at the source but absent from the archive, in source order.
///
/// Matching is by name only: an archived file whose size differs from the
/// source copy still counts as archived. Log files are assumed immutable once
/// rotated (a rotation produces a new name), so presence is all that matters.
pub fn compute(source: &[LogFile], archive: &[LogFile]) -> Vec<LogFile> {
    let archived: HashSet<&str> = archive.iter().map(|f| f.name.as_str()).collect();
    source
        .iter()
        .filter(|file| !archived.contains(file.name.as_str()))
        .cloned()
        .collect()
}
