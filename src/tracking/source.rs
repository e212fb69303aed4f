use sha2::{Digest, Sha256};

/// Per-line fingerprints of one version of a source file.
///
/// Lines are hashed with spaces and tabs removed, so re-indenting code does
/// not break tracking. Blank lines hash to the empty string.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LineHashSequence {
    hashes: Vec<String>,
}

impl LineHashSequence {
    pub fn from_source(source: &str) -> Self {
        Self {
            hashes: source.lines().map(line_hash).collect(),
        }
    }

    pub fn from_hashes(hashes: Vec<String>) -> Self {
        Self { hashes }
    }

    pub fn len(&self) -> usize {
        self.hashes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.hashes.is_empty()
    }

    pub fn has_line(&self, line: usize) -> bool {
        line >= 1 && line <= self.hashes.len()
    }

    /// Hash of a 1-based line.
    pub fn hash_at(&self, line: usize) -> Option<&str> {
        if !self.has_line(line) {
            return None;
        }
        Some(self.hashes[line - 1].as_str())
    }

    /// 1-based lines carrying `hash`.
    pub fn occurrences(&self, hash: &str) -> Vec<usize> {
        self.hashes
            .iter()
            .enumerate()
            .filter(|(_, h)| h.as_str() == hash)
            .map(|(i, _)| i + 1)
            .collect()
    }

    /// Fingerprint of the lines within `radius` of `line`, clamped to the file.
    pub fn block_hash(&self, line: usize, radius: usize) -> Option<String> {
        if !self.has_line(line) {
            return None;
        }
        let start = line.saturating_sub(radius).max(1);
        let end = (line + radius).min(self.hashes.len());
        let mut hasher = Sha256::new();
        for hash in &self.hashes[start - 1..end] {
            hasher.update(hash.as_bytes());
            hasher.update(b"\n");
        }
        Some(hex::encode(hasher.finalize()))
    }
}

/// Hash a single line of source, ignoring spaces and tabs.
pub fn line_hash(line: &str) -> String {
    let stripped: String = line.chars().filter(|c| !matches!(c, ' ' | '\t' | '\r')).collect();
    if stripped.is_empty() {
        return String::new();
    }
    hex::encode(Sha256::digest(stripped.as_bytes()))
}
