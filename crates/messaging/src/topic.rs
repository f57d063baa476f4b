//! The fixed set of saga topics.

use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::MessagingError;

/// A named saga channel.
///
/// The set is fixed at build time: one start topic, the orchestrator's
/// inbound topic, two terminal topics, a forward and a rollback topic per
/// participant, and the ending notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Topic {
    StartSaga,
    Orchestrator,
    FinishSuccess,
    FinishFail,
    ProductValidationSuccess,
    ProductValidationFail,
    PaymentSuccess,
    PaymentFail,
    InventorySuccess,
    InventoryFail,
    NotifyEnding,
}

impl Topic {
    /// Every topic the saga uses.
    pub const ALL: [Topic; 11] = [
        Topic::StartSaga,
        Topic::Orchestrator,
        Topic::FinishSuccess,
        Topic::FinishFail,
        Topic::ProductValidationSuccess,
        Topic::ProductValidationFail,
        Topic::PaymentSuccess,
        Topic::PaymentFail,
        Topic::InventorySuccess,
        Topic::InventoryFail,
        Topic::NotifyEnding,
    ];

    /// Returns the channel name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Topic::StartSaga => "start-saga",
            Topic::Orchestrator => "orchestrator",
            Topic::FinishSuccess => "finish-success",
            Topic::FinishFail => "finish-fail",
            Topic::ProductValidationSuccess => "product-validation-success",
            Topic::ProductValidationFail => "product-validation-fail",
            Topic::PaymentSuccess => "payment-success",
            Topic::PaymentFail => "payment-fail",
            Topic::InventorySuccess => "inventory-success",
            Topic::InventoryFail => "inventory-fail",
            Topic::NotifyEnding => "notify-ending",
        }
    }

    /// Returns true for the two topics that end a saga.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Topic::FinishSuccess | Topic::FinishFail)
    }
}

impl std::fmt::Display for Topic {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for Topic {
    type Err = MessagingError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Topic::ALL
            .into_iter()
            .find(|topic| topic.as_str() == s)
            .ok_or_else(|| MessagingError::UnknownTopic(s.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_names_are_unique() {
        let mut names: Vec<_> = Topic::ALL.iter().map(Topic::as_str).collect();
        names.sort_unstable();
        names.dedup();
        assert_eq!(names.len(), Topic::ALL.len());
    }

    #[test]
    fn test_parse_roundtrip() {
        for topic in Topic::ALL {
            assert_eq!(topic.as_str().parse::<Topic>().unwrap(), topic);
        }
        assert!(matches!(
            "shipping-success".parse::<Topic>(),
            Err(MessagingError::UnknownTopic(_))
        ));
    }

    #[test]
    fn test_serde_uses_channel_name() {
        let json = serde_json::to_string(&Topic::ProductValidationFail).unwrap();
        assert_eq!(json, "\"product-validation-fail\"");
    }

    #[test]
    fn test_terminal_topics() {
        assert!(Topic::FinishSuccess.is_terminal());
        assert!(Topic::FinishFail.is_terminal());
        assert!(!Topic::NotifyEnding.is_terminal());
        assert!(!Topic::Orchestrator.is_terminal());
    }
}
