//! Line normalization and the prefix/suffix differ.
//!
//! The differ aligns the existing document against the on-disk lines by
//! longest common prefix and suffix, then reconciles the middles: shared
//! positions become updates, surplus document lines become deletes,
//! surplus disk lines become inserts. When prefix and suffix overlap on
//! very short files the alignment is ambiguous, so the differ falls back
//! to deleting the whole document middle and inserting the whole disk
//! middle.

/// Split file content into logical lines: CRLF is normalized to LF and a
/// final newline does not produce a trailing empty line (unless the
/// source really ended with an empty line).
pub fn split_lines(content: &str) -> Vec<String> {
    if content.is_empty() {
        return Vec::new();
    }
    let normalized = content.replace("\r\n", "\n");
    let mut lines: Vec<String> = normalized.split('\n').map(str::to_string).collect();
    if normalized.ends_with('\n') {
        lines.pop();
    }
    lines
}

/// The edits that turn `doc` into `disk`. Indices refer to `doc`.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct LineDiff {
    /// `(doc_index, new_content)` for positions whose content changed.
    pub updates: Vec<(usize, String)>,
    /// Document indices whose lines are gone.
    pub deletes: Vec<usize>,
    /// New lines appended after the shared region.
    pub inserts: Vec<String>,
}

impl LineDiff {
    pub fn is_empty(&self) -> bool {
        self.updates.is_empty() && self.deletes.is_empty() && self.inserts.is_empty()
    }
}

pub fn diff_lines(doc: &[String], disk: &[String]) -> LineDiff {
    let min_len = doc.len().min(disk.len());
    let mut prefix = 0;
    while prefix < min_len && doc[prefix] == disk[prefix] {
        prefix += 1;
    }
    let mut suffix = 0;
    while suffix < min_len && doc[doc.len() - 1 - suffix] == disk[disk.len() - 1 - suffix] {
        suffix += 1;
    }

    // Prefix and suffix overlap: alignment is ambiguous, replace the
    // whole middle.
    let ambiguous = prefix + suffix > min_len;
    if ambiguous {
        suffix = min_len - prefix;
    }

    let doc_mid = &doc[prefix..doc.len() - suffix];
    let disk_mid = &disk[prefix..disk.len() - suffix];

    let mut diff = LineDiff::default();
    if ambiguous {
        diff.deletes.extend(prefix..prefix + doc_mid.len());
        diff.inserts.extend(disk_mid.iter().cloned());
        return diff;
    }

    let shared = doc_mid.len().min(disk_mid.len());
    for i in 0..shared {
        if doc_mid[i] != disk_mid[i] {
            diff.updates.push((prefix + i, disk_mid[i].clone()));
        }
    }
    for j in disk_mid.len()..doc_mid.len() {
        diff.deletes.push(prefix + j);
    }
    for line in disk_mid.iter().skip(doc_mid.len()) {
        diff.inserts.push(line.clone());
    }
    diff
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lines(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    // -- split_lines --

    #[test]
    fn split_drops_the_final_newline() {
        assert_eq!(split_lines("a\nb\n"), lines(&["a", "b"]));
        assert_eq!(split_lines("a\nb"), lines(&["a", "b"]));
    }

    #[test]
    fn split_keeps_a_real_trailing_empty_line() {
        assert_eq!(split_lines("a\n\n"), lines(&["a", ""]));
    }

    #[test]
    fn split_normalizes_crlf() {
        assert_eq!(split_lines("a\r\nb\r\n"), lines(&["a", "b"]));
    }

    #[test]
    fn split_edge_cases() {
        assert_eq!(split_lines(""), Vec::<String>::new());
        assert_eq!(split_lines("\n"), lines(&[""]));
        assert_eq!(split_lines("only"), lines(&["only"]));
    }

    // -- diff_lines --

    #[test]
    fn identical_inputs_diff_to_nothing() {
        let doc = lines(&["a", "b"]);
        assert!(diff_lines(&doc, &doc).is_empty());
    }

    #[test]
    fn changed_middle_becomes_an_update() {
        let doc = lines(&["a", "b", "c"]);
        let disk = lines(&["a", "B", "c"]);
        let diff = diff_lines(&doc, &disk);
        assert_eq!(diff.updates, vec![(1, "B".to_string())]);
        assert!(diff.deletes.is_empty());
        assert!(diff.inserts.is_empty());
    }

    #[test]
    fn removed_lines_become_deletes() {
        let doc = lines(&["a", "b", "c", "d"]);
        let disk = lines(&["a", "d"]);
        let diff = diff_lines(&doc, &disk);
        assert!(diff.updates.is_empty());
        assert_eq!(diff.deletes, vec![1, 2]);
        assert!(diff.inserts.is_empty());
    }

    #[test]
    fn added_lines_become_inserts() {
        let doc = lines(&["a", "d"]);
        let disk = lines(&["a", "b", "c", "d"]);
        let diff = diff_lines(&doc, &disk);
        assert!(diff.updates.is_empty());
        assert!(diff.deletes.is_empty());
        assert_eq!(diff.inserts, lines(&["b", "c"]));
    }

    #[test]
    fn mixed_update_and_insert() {
        let doc = lines(&["a", "x", "z"]);
        let disk = lines(&["a", "y", "w", "z"]);
        let diff = diff_lines(&doc, &disk);
        assert_eq!(diff.updates, vec![(1, "y".to_string())]);
        assert!(diff.deletes.is_empty());
        assert_eq!(diff.inserts, lines(&["w"]));
    }

    #[test]
    fn empty_document_inserts_everything() {
        let diff = diff_lines(&[], &lines(&["a", "b"]));
        assert_eq!(diff.inserts, lines(&["a", "b"]));
        assert!(diff.updates.is_empty() && diff.deletes.is_empty());
    }

    #[test]
    fn empty_disk_deletes_everything() {
        let diff = diff_lines(&lines(&["a", "b"]), &[]);
        assert_eq!(diff.deletes, vec![0, 1]);
        assert!(diff.updates.is_empty() && diff.inserts.is_empty());
    }

    #[test]
    fn overlapping_prefix_and_suffix_falls_back_to_replace() {
        // doc ["a"], disk ["a","a"]: prefix 1 and suffix 1 both claim the
        // single shared line.
        let doc = lines(&["a"]);
        let disk = lines(&["a", "a"]);
        let diff = diff_lines(&doc, &disk);
        // Fallback: delete nothing of the (empty) doc middle, insert the
        // disk middle; the document still converges to the disk lines.
        assert!(diff.updates.is_empty());
        assert!(diff.deletes.is_empty());
        assert_eq!(diff.inserts, lines(&["a"]));
    }

    #[test]
    fn duplicate_heavy_short_files_converge() {
        let doc = lines(&["a", "a"]);
        let disk = lines(&["a"]);
        let diff = diff_lines(&doc, &disk);
        assert_eq!(diff.deletes.len(), 1);
        assert!(diff.updates.is_empty());
        assert!(diff.inserts.is_empty());
    }
}
