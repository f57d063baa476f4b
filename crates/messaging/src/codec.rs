//! JSON wire format for envelopes.
//!
//! Every hop goes through this codec, so consumers always work on a value
//! decoded from the wire and never on the publisher's copy.

use common::Envelope;

use crate::Result;

/// Encodes an envelope into its JSON wire form.
pub fn encode(envelope: &Envelope) -> Result<String> {
    Ok(serde_json::to_string(envelope)?)
}

/// Decodes an envelope from its JSON wire form.
pub fn decode(payload: &str) -> Result<Envelope> {
    Ok(serde_json::from_str(payload)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::MessagingError;
    use common::{EventSource, Money, Order, OrderId, OrderItem, SagaStatus, TransactionId};

    #[test]
    fn test_decode_of_encoded_envelope() {
        let order = Order::new(
            OrderId::new(),
            TransactionId::generate(),
            vec![OrderItem::new("BOOKS", 1, Money::from_cents(500))],
        );
        let envelope =
            Envelope::new(order).record(EventSource::Orchestrator, SagaStatus::Success, "started");

        let decoded = decode(&encode(&envelope).unwrap()).unwrap();
        assert_eq!(decoded, envelope);
    }

    #[test]
    fn test_garbage_is_a_codec_error() {
        assert!(matches!(decode("not json"), Err(MessagingError::Codec(_))));
        assert!(matches!(
            decode(r#"{"id":"nope"}"#),
            Err(MessagingError::Codec(_))
        ));
    }
}
