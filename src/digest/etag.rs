//! Size-aware content-addressed digest.
//!
//! Object stores compute the entity tag of a multipart upload by hashing each
//! part with MD5, concatenating the raw part digests, hashing the result with
//! MD5 again, and appending `-<part count>`. The part size is a function of
//! the total object size, so the same bytes produce the same tag only when
//! the total size is known up front. This module reproduces that layout
//! incrementally so chunks can be fed in as they arrive from the network.

use md5::{Digest, Md5};

const MIB: u64 = 1 << 20;
const TIB: u64 = 1 << 40;

/// Part size used for objects small enough to fit the part budget.
pub const DEFAULT_PART_SIZE: u64 = 64 * MIB;
/// Maximum number of parts a single object may be split into.
pub const MAX_PARTS: u64 = 10_000;
/// Objects larger than this cannot be tagged.
pub const MAX_OBJECT_SIZE: u64 = 5 * TIB;

/// Computes the part size for an object of `total` bytes.
///
/// Starts from [`DEFAULT_PART_SIZE`] and doubles until [`MAX_PARTS`] parts
/// suffice. Returns `None` when `total` exceeds [`MAX_OBJECT_SIZE`].
pub fn part_size_for(total: u64) -> Option<u64> {
    if total > MAX_OBJECT_SIZE {
        return None;
    }
    let mut part_size = DEFAULT_PART_SIZE;
    while part_size * MAX_PARTS < total {
        part_size *= 2;
    }
    Some(part_size)
}

/// Incremental hasher producing the multipart entity tag.
pub struct EtagDigester {
    part_size: u64,
    /// Hash of the part currently being filled.
    part: Md5,
    part_len: u64,
    /// Hash over the concatenated raw digests of all finished parts.
    tag: Md5,
    part_count: u64,
}

impl EtagDigester {
    /// Creates a digester for an object with a known total size.
    ///
    /// Returns `None` when the object is too large to be tagged.
    pub fn new(total_size: u64) -> Option<Self> {
        part_size_for(total_size).map(Self::with_part_size)
    }

    /// Creates a digester with an explicit part size.
    pub(crate) fn with_part_size(part_size: u64) -> Self {
        Self {
            part_size,
            part: Md5::new(),
            part_len: 0,
            tag: Md5::new(),
            part_count: 0,
        }
    }

    fn finish_part(&mut self) {
        let digest = std::mem::replace(&mut self.part, Md5::new()).finalize();
        self.tag.update(digest);
        self.part_count += 1;
        self.part_len = 0;
    }

    /// Feeds `data` into the digest, splitting across part boundaries.
    pub fn update(&mut self, mut data: &[u8]) {
        while !data.is_empty() {
            let room = (self.part_size - self.part_len) as usize;
            let take = room.min(data.len());
            self.part.update(&data[..take]);
            self.part_len += take as u64;
            if self.part_len == self.part_size {
                self.finish_part();
            }
            data = &data[take..];
        }
    }

    /// Consumes the digester and returns the final tag in
    /// `<hex>-<part count>` form.
    pub fn finalize(mut self) -> String {
        // An empty object is a single empty part.
        if self.part_len > 0 || self.part_count == 0 {
            self.finish_part();
        }
        format!("{}-{}", hex::encode(self.tag.finalize()), self.part_count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_part_size_small_object() {
        assert_eq!(part_size_for(0), Some(DEFAULT_PART_SIZE));
        assert_eq!(part_size_for(DEFAULT_PART_SIZE * MAX_PARTS), Some(DEFAULT_PART_SIZE));
    }

    #[test]
    fn test_part_size_doubles_for_large_objects() {
        let total = DEFAULT_PART_SIZE * MAX_PARTS + 1;
        assert_eq!(part_size_for(total), Some(DEFAULT_PART_SIZE * 2));
    }

    #[test]
    fn test_part_size_rejects_oversized_objects() {
        assert_eq!(part_size_for(MAX_OBJECT_SIZE + 1), None);
    }

    #[test]
    fn test_empty_object_is_one_part() {
        let tag = EtagDigester::with_part_size(4).finalize();
        assert!(tag.ends_with("-1"), "got {tag}");
        assert_eq!(tag.len(), 32 + 2);
    }

    #[test]
    fn test_part_count_suffix() {
        let mut d = EtagDigester::with_part_size(4);
        d.update(b"0123456789");
        assert!(d.finalize().ends_with("-3"));
    }

    #[test]
    fn test_exact_multiple_has_no_trailing_empty_part() {
        let mut d = EtagDigester::with_part_size(4);
        d.update(b"01234567");
        assert!(d.finalize().ends_with("-2"));
    }

    #[test]
    fn test_incremental_matches_one_shot() {
        let mut one_shot = EtagDigester::with_part_size(5);
        one_shot.update(b"the quick brown fox");

        let mut pieces = EtagDigester::with_part_size(5);
        for chunk in b"the quick brown fox".chunks(3) {
            pieces.update(chunk);
        }
        assert_eq!(one_shot.finalize(), pieces.finalize());
    }

    #[test]
    fn test_chunking_does_not_change_tag_across_boundaries() {
        let data: Vec<u8> = (0..=255u16).map(|i| (i % 256) as u8).collect();
        let mut a = EtagDigester::with_part_size(64);
        a.update(&data);
        let mut b = EtagDigester::with_part_size(64);
        b.update(&data[..63]);
        b.update(&data[63..65]);
        b.update(&data[65..]);
        assert_eq!(a.finalize(), b.finalize());
    }
}
