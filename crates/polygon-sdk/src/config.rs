//! Client configuration

use polygon_types::{DataStatus, PolygonError};

/// Default per-key buffer depth
///
/// Small on purpose: a consumer that falls this far behind starts losing
/// messages instead of buffering unboundedly.
pub const DEFAULT_BUFFER_CAPACITY: usize = 4;

/// Configuration for [`PolygonClient`](crate::PolygonClient)
///
/// # Example
///
/// ```
/// use polygon_sdk::PolygonConfig;
/// use polygon_types::DataStatus;
///
/// let config = PolygonConfig::new("my-api-key")
///     .with_data_status(DataStatus::Live)
///     .with_buffer_capacity(16);
/// ```
#[derive(Debug, Clone)]
pub struct PolygonConfig {
    api_key: String,
    data_status: DataStatus,
    buffer_capacity: usize,
}

impl PolygonConfig {
    /// Create a configuration with the given API key
    ///
    /// Defaults to the delayed feed and a buffer depth of
    /// [`DEFAULT_BUFFER_CAPACITY`].
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            data_status: DataStatus::Delayed,
            buffer_capacity: DEFAULT_BUFFER_CAPACITY,
        }
    }

    /// Read the API key from the `POLYGON_API_KEY` environment variable
    pub fn from_env() -> Result<Self, PolygonError> {
        let api_key = std::env::var("POLYGON_API_KEY").map_err(|_| {
            PolygonError::Configuration("POLYGON_API_KEY is not set".to_string())
        })?;
        Ok(Self::new(api_key))
    }

    /// Select the live or delayed feed
    pub fn with_data_status(mut self, data_status: DataStatus) -> Self {
        self.data_status = data_status;
        self
    }

    /// Set the per-key buffer depth
    pub fn with_buffer_capacity(mut self, capacity: usize) -> Self {
        self.buffer_capacity = capacity;
        self
    }

    pub fn api_key(&self) -> &str {
        &self.api_key
    }

    pub fn data_status(&self) -> DataStatus {
        self.data_status
    }

    pub fn buffer_capacity(&self) -> usize {
        self.buffer_capacity
    }

    /// Check the configuration for values the server would reject anyway
    pub fn validate(&self) -> Result<(), PolygonError> {
        if self.api_key.trim().is_empty() {
            return Err(PolygonError::Configuration(
                "API key must not be blank".to_string(),
            ));
        }
        if self.buffer_capacity == 0 {
            return Err(PolygonError::Configuration(
                "buffer capacity must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let config = PolygonConfig::new("key");
        assert_eq!(config.data_status(), DataStatus::Delayed);
        assert_eq!(config.buffer_capacity(), DEFAULT_BUFFER_CAPACITY);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn builders_override_defaults() {
        let config = PolygonConfig::new("key")
            .with_data_status(DataStatus::Live)
            .with_buffer_capacity(32);
        assert_eq!(config.data_status(), DataStatus::Live);
        assert_eq!(config.buffer_capacity(), 32);
    }

    #[test]
    fn blank_key_is_rejected() {
        assert!(matches!(
            PolygonConfig::new("   ").validate(),
            Err(PolygonError::Configuration(_))
        ));
    }

    #[test]
    fn zero_capacity_is_rejected() {
        assert!(matches!(
            PolygonConfig::new("key").with_buffer_capacity(0).validate(),
            Err(PolygonError::Configuration(_))
        ));
    }
}
