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

//! The message in flight.

use super::codec::{CodecError, JsonCodec};
use crate::broker::{Delivery, PublishOptions};

/// A decoded message together with its routing metadata.
///
/// Envelopes live only while a message is in flight.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Envelope<T> {
    /// The decoded body.
    pub payload: T,

    /// Queue the sender expects a reply on.
    pub reply_to: Option<String>,

    /// The delivery must be acknowledged explicitly.
    pub ack: bool,

    /// Channel-scoped tag of the delivery, 0 for outgoing messages.
    pub delivery_tag: u64,
}

impl<T> Envelope<T> {
    /// Wraps an outgoing `payload`.
    pub fn outgoing(payload: T, reply_to: Option<String>) -> Self {
        Self {
            payload,
            reply_to,
            ack: false,
            delivery_tag: 0,
        }
    }

    /// Decodes a delivery received by a consumer.
    pub fn decode(codec: &JsonCodec, delivery: &Delivery, ack: bool) -> Result<Self, CodecError>
    where
        T: serde::de::DeserializeOwned,
    {
        Ok(Self {
            payload: codec.decode(&delivery.payload)?,
            reply_to: delivery.reply_to.clone(),
            ack,
            delivery_tag: delivery.delivery_tag,
        })
    }

    /// Encodes the payload and the publish properties carrying the reply target.
    pub fn encode(&self, codec: &JsonCodec) -> Result<(Vec<u8>, PublishOptions), CodecError>
    where
        T: serde::Serialize,
    {
        let body = codec.encode(&self.payload)?;
        let options = PublishOptions {
            reply_to: self.reply_to.clone(),
        };
        Ok((body, options))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reply_target_travels_outside_the_payload() {
        let codec = JsonCodec::new();
        let envelope = Envelope::outgoing(vec![1, 2, 3], Some("amq.gen-replies".to_string()));

        let (body, options) = envelope.encode(&codec).unwrap();
        assert_eq!(body, b"[1,2,3]");
        assert_eq!(options.reply_to.as_deref(), Some("amq.gen-replies"));

        let delivery = Delivery {
            delivery_tag: 9,
            payload: body,
            reply_to: options.reply_to,
            redelivered: false,
        };
        let received: Envelope<Vec<u32>> = Envelope::decode(&codec, &delivery, true).unwrap();
        assert_eq!(received.payload, vec![1, 2, 3]);
        assert_eq!(received.reply_to, envelope.reply_to);
        assert_eq!(received.delivery_tag, 9);
        assert!(received.ack);
    }
}
