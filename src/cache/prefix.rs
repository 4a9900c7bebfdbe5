//! Bucket key prefixing.

/// Turns a region name into the bucket key used in the store.
pub trait RegionPrefix: Send + Sync {
    fn prefix(&self, region: &str) -> Vec<u8>;
}

/// `name` followed by a delimiter, `":"` unless configured otherwise.
#[derive(Debug, Clone)]
pub struct DefaultRegionPrefix {
    delimiter: String,
}

impl DefaultRegionPrefix {
    pub fn new(delimiter: impl Into<String>) -> Self {
        Self {
            delimiter: delimiter.into(),
        }
    }
}

impl Default for DefaultRegionPrefix {
    fn default() -> Self {
        Self::new(":")
    }
}

impl RegionPrefix for DefaultRegionPrefix {
    fn prefix(&self, region: &str) -> Vec<u8> {
        format!("{region}{}", self.delimiter).into_bytes()
    }
}

impl<F> RegionPrefix for F
where
    F: Fn(&str) -> Vec<u8> + Send + Sync,
{
    fn prefix(&self, region: &str) -> Vec<u8> {
        self(region)
    }
}
