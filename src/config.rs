//! Configuration options for the buffer cache.

use serde::{Deserialize, Serialize};

/// Configuration options for constructing a [`BufferCache`](crate::BufferCache).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheOptions {
    /// Number of buffer slots in the pool.
    /// Default: 30
    pub nbuf: usize,

    /// Number of hash buckets the slots are spread over.
    /// Default: 13
    pub buckets: usize,

    /// Size of one block payload (in bytes).
    /// Default: 1KB
    pub block_size: usize,
}

impl Default for CacheOptions {
    fn default() -> Self {
        Self {
            nbuf: 30,
            buckets: 13,
            block_size: 1024,
        }
    }
}

impl CacheOptions {
    /// Creates a new CacheOptions with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the number of buffer slots.
    pub fn nbuf(mut self, nbuf: usize) -> Self {
        self.nbuf = nbuf;
        self
    }

    /// Sets the number of hash buckets.
    pub fn buckets(mut self, buckets: usize) -> Self {
        self.buckets = buckets;
        self
    }

    /// Sets the block payload size.
    pub fn block_size(mut self, size: usize) -> Self {
        self.block_size = size;
        self
    }

    /// Parses options from a JSON document.
    ///
    /// Missing fields take their default values. The result is validated.
    ///
    /// ```
    /// use bufcache::CacheOptions;
    ///
    /// let opts = CacheOptions::from_json(r#"{ "nbuf": 64 }"#).unwrap();
    /// assert_eq!(opts.nbuf, 64);
    /// assert_eq!(opts.buckets, 13);
    /// ```
    pub fn from_json(json: &str) -> crate::Result<Self> {
        let opts: CacheOptions = serde_json::from_str(json)?;
        opts.validate()?;
        Ok(opts)
    }

    /// Validates the options and returns an error if any are invalid.
    pub fn validate(&self) -> crate::Result<()> {
        if self.nbuf == 0 {
            return Err(crate::Error::invalid_argument("nbuf must be > 0"));
        }
        if self.buckets == 0 {
            return Err(crate::Error::invalid_argument("buckets must be > 0"));
        }
        if self.block_size == 0 {
            return Err(crate::Error::invalid_argument("block_size must be > 0"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_options() {
        let opts = CacheOptions::default();
        assert_eq!(opts.nbuf, 30);
        assert_eq!(opts.buckets, 13);
        assert_eq!(opts.block_size, 1024);
    }

    #[test]
    fn test_options_builder() {
        let opts = CacheOptions::new().nbuf(8).buckets(3).block_size(512);

        assert_eq!(opts.nbuf, 8);
        assert_eq!(opts.buckets, 3);
        assert_eq!(opts.block_size, 512);
    }

    #[test]
    fn test_options_validation() {
        let mut opts = CacheOptions::default();
        assert!(opts.validate().is_ok());

        opts.nbuf = 0;
        assert!(opts.validate().is_err());

        opts.nbuf = 4;
        opts.buckets = 0;
        assert!(opts.validate().is_err());

        opts.buckets = 1;
        opts.block_size = 0;
        assert!(opts.validate().is_err());
    }

    #[test]
    fn test_options_from_json() {
        let opts = CacheOptions::from_json(r#"{ "nbuf": 16, "block_size": 4096 }"#).unwrap();
        assert_eq!(opts.nbuf, 16);
        assert_eq!(opts.buckets, 13);
        assert_eq!(opts.block_size, 4096);

        assert!(matches!(
            CacheOptions::from_json(r#"{ "buckets": 0 }"#),
            Err(crate::Error::InvalidArgument(_))
        ));
        assert!(matches!(
            CacheOptions::from_json("{ nbuf: }"),
            Err(crate::Error::Config(_))
        ));
    }
}
