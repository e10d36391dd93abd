//
// Copyright 2026 Hans W. Uhlig. All Rights Reserved.
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//      http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.
//

//! JSON message codec.
//!
//! Requests and replies travel as JSON documents. The reply target is carried
//! by the broker's reply-to property and never embedded in the payload.

use thiserror::Error;

/// Errors raised while encoding or decoding a message body.
#[derive(Debug, Error)]
pub enum CodecError {
    /// The value could not be serialized.
    #[error("failed to encode message: {source}")]
    Encode {
        /// The underlying serde_json error
        #[source]
        source: serde_json::Error,
    },

    /// The payload is not a valid document for the expected type.
    #[error("failed to decode message: {source}")]
    Decode {
        /// The underlying serde_json error
        #[source]
        source: serde_json::Error,
    },
}

/// Encodes and decodes message bodies as JSON.
///
/// # Examples
///
/// ```rust
/// use warren::messaging::JsonCodec;
/// use serde::{Deserialize, Serialize};
///
/// #[derive(Serialize, Deserialize, Debug, PartialEq)]
/// struct Ping {
///     seq: u32,
/// }
///
/// # fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let codec = JsonCodec::new();
/// let bytes = codec.encode(&Ping { seq: 7 })?;
/// assert_eq!(bytes, br#"{"seq":7}"#);
///
/// let decoded: Ping = codec.decode(&bytes)?;
/// assert_eq!(decoded, Ping { seq: 7 });
/// # Ok(())
/// # }
/// ```
#[derive(Clone, Copy, Debug, Default)]
pub struct JsonCodec {
    pretty: bool,
}

impl JsonCodec {
    /// Creates a codec producing compact JSON.
    pub fn new() -> Self {
        Self { pretty: false }
    }

    /// Produces indented JSON, handy when inspecting queues by hand.
    pub fn with_pretty_print(mut self) -> Self {
        self.pretty = true;
        self
    }

    /// Serializes `value`.
    pub fn encode<T>(&self, value: &T) -> Result<Vec<u8>, CodecError>
    where
        T: serde::Serialize + ?Sized,
    {
        let result = if self.pretty {
            serde_json::to_vec_pretty(value)
        } else {
            serde_json::to_vec(value)
        };
        result.map_err(|source| CodecError::Encode { source })
    }

    /// Deserializes a `T` from `bytes`.
    pub fn decode<T>(&self, bytes: &[u8]) -> Result<T, CodecError>
    where
        T: serde::de::DeserializeOwned,
    {
        serde_json::from_slice(bytes).map_err(|source| CodecError::Decode { source })
    }
}
