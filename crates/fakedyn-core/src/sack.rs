//! Byte budget for a single response.
//!
//! Query and Scan pages and BatchGetItem responses stop accepting items once
//! the encoded size of what they hold would cross the configured
//! `response_size_limit`.

#[derive(Debug, Clone)]
pub struct Sack {
    limit: usize,
    used: usize,
    full: bool,
}

impl Sack {
    pub fn new(limit: usize) -> Self {
        Sack {
            limit,
            used: 0,
            full: false,
        }
    }

    /// Account for an entry of `size` bytes. Returns `false` (and stays full
    /// from then on) when it does not fit. An empty sack always accepts its
    /// first entry so a page can make progress.
    pub fn try_add(&mut self, size: usize) -> bool {
        if self.full {
            return false;
        }
        if self.used > 0 && self.used + size > self.limit {
            self.full = true;
            return false;
        }
        self.used += size;
        true
    }

    pub fn is_full(&self) -> bool {
        self.full
    }

    pub fn used(&self) -> usize {
        self.used
    }
}
