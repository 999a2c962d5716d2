//! Configuration types for outbound calls.

use std::time::Duration;

use meridian_proto::Encoding;
use serde::Deserialize;

/// Options applied by a service proxy to every outbound operation.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CallOptions {
    /// Deadline for a single operation, including its acknowledgement.
    #[serde(with = "serde_duration_secs")]
    pub call_timeout: Duration,

    /// Encoding selected for request payloads.
    pub encoding: Encoding,

    /// Protocol version stamped on outgoing frames.
    pub protocol_version: u64,
}

impl Default for CallOptions {
    fn default() -> Self {
        Self {
            call_timeout: Duration::from_secs(30),
            encoding: Encoding::Binary,
            protocol_version: meridian_proto::version::CURRENT,
        }
    }
}

impl CallOptions {
    /// Overrides the per-call deadline.
    #[must_use]
    pub const fn with_timeout(mut self, timeout: Duration) -> Self {
        self.call_timeout = timeout;
        self
    }

    /// Overrides the request encoding.
    #[must_use]
    pub const fn with_encoding(mut self, encoding: Encoding) -> Self {
        self.encoding = encoding;
        self
    }
}

mod serde_duration_secs {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer};

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs = u64::deserialize(deserializer)?;
        Ok(Duration::from_secs(secs))
    }
}
