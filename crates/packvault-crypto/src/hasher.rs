use packvault_types::ContentHash;

/// Black-box content digest used to address attachment blobs.
///
/// Implementations must be deterministic: the same bytes always produce the
/// same [`ContentHash`].
pub trait Digest: Send + Sync {
    /// Digest raw bytes.
    fn digest(&self, data: &[u8]) -> ContentHash;

    /// Verify that data produces the expected hash.
    fn verify(&self, data: &[u8], expected: &ContentHash) -> bool {
        self.digest(data) == *expected
    }
}

/// Domain-separated BLAKE3 content hasher.
///
/// Each hasher carries a domain tag that is prepended to every hash
/// computation, so digests from different hasher domains never collide.
#[derive(Clone, Copy, Debug)]
pub struct ContentHasher {
    domain: &'static str,
}

impl ContentHasher {
    /// Hasher for attachment bytes.
    pub const ATTACHMENT: Self = Self {
        domain: "packvault-attachment-v1",
    };

    /// Create a hasher with a custom domain tag.
    pub const fn new(domain: &'static str) -> Self {
        Self { domain }
    }

    /// Hash raw bytes with domain separation.
    pub fn hash(&self, data: &[u8]) -> ContentHash {
        let mut hasher = blake3::Hasher::new();
        hasher.update(self.domain.as_bytes());
        hasher.update(b":");
        hasher.update(data);
        ContentHash::from_digest(*hasher.finalize().as_bytes())
    }

    /// The domain tag used by this hasher.
    pub fn domain(&self) -> &str {
        self.domain
    }
}

impl Default for ContentHasher {
    fn default() -> Self {
        Self::ATTACHMENT
    }
}

impl Digest for ContentHasher {
    fn digest(&self, data: &[u8]) -> ContentHash {
        self.hash(data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hash_is_deterministic() {
        let data = b"\x89PNG\r\n\x1a\n";
        assert_eq!(
            ContentHasher::ATTACHMENT.hash(data),
            ContentHasher::ATTACHMENT.hash(data)
        );
    }

    #[test]
    fn different_bytes_produce_different_hashes() {
        let a = ContentHasher::ATTACHMENT.hash(b"aaa");
        let b = ContentHasher::ATTACHMENT.hash(b"bbb");
        assert_ne!(a, b);
    }

    #[test]
    fn different_domains_produce_different_hashes() {
        let custom = ContentHasher::new("my-custom-domain-v1");
        assert_ne!(
            custom.hash(b"data"),
            ContentHasher::ATTACHMENT.hash(b"data")
        );
    }

    #[test]
    fn verify_through_trait_object() {
        let digest: &dyn Digest = &ContentHasher::ATTACHMENT;
        let hash = digest.digest(b"test data");
        assert!(digest.verify(b"test data", &hash));
        assert!(!digest.verify(b"tampered", &hash));
    }

    #[test]
    fn hex_form_is_64_chars() {
        let hash = ContentHasher::default().digest(b"x");
        assert_eq!(hash.to_hex().len(), 64);
    }

    #[test]
    fn empty_input_hashes() {
        let hash = ContentHasher::ATTACHMENT.hash(b"");
        assert_eq!(ContentHasher::ATTACHMENT.hash(b""), hash);
        assert_eq!(ContentHasher::ATTACHMENT.domain(), "packvault-attachment-v1");
    }
}
