//! Card filters: acceptance predicates over cards.
//!
//! A [`CardFilter`] decides whether a card counts for an operation such as
//! registration, rotation or lookup. Filters read cards and never fail:
//! missing data resolves to a default verdict.
//!
//! | filter              | outdated card | marker found          | marker missing |
//! |---------------------|---------------|-----------------------|----------------|
//! | `All`               | accept        | accept                | accept         |
//! | `Account`           | accept        | value == `"true"`     | accept         |
//! | `DeviceId(id)`      | reject        | value == `id`         | reject         |
//!
//! Markers are looked up in signature order; the first signature carrying
//! the key decides.

use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::card::Card;
use crate::error::CardError;

/// Extra-field key marking a card as the identity's account card.
pub const ACCOUNT_CARD_FIELD: &str = "accountCard";

/// Extra-field key carrying a device identifier.
pub const IDENTITY_ID_FIELD: &str = "identityId";

/// Prefix of the textual form of [`CardFilter::DeviceId`].
const DEVICE_PREFIX: &str = "device:";

/// Which cards an operation should consider.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(tag = "kind", content = "device_id", rename_all = "snake_case")]
pub enum CardFilter {
    /// Every card.
    #[default]
    All,
    /// Cards not explicitly marked as non-account cards.
    Account,
    /// Current cards issued for one device.
    DeviceId(String),
}

impl CardFilter {
    /// Build a device filter.
    pub fn device_id(id: impl Into<String>) -> Self {
        Self::DeviceId(id.into())
    }

    /// Evaluate the filter against a card.
    pub fn accepts(&self, card: &Card) -> bool {
        match self {
            Self::All => accept_all(card),
            Self::Account => accept_account(card),
            Self::DeviceId(id) => accept_device_id(id, card),
        }
    }

    /// Keep only the accepted cards, preserving order.
    pub fn select<'c, I>(&self, cards: I) -> Vec<&'c Card>
    where
        I: IntoIterator<Item = &'c Card>,
    {
        cards.into_iter().filter(|card| self.accepts(card)).collect()
    }

    /// The first accepted card.
    pub fn first<'c, I>(&self, cards: I) -> Option<&'c Card>
    where
        I: IntoIterator<Item = &'c Card>,
    {
        cards.into_iter().find(|card| self.accepts(card))
    }
}

/// Accept any card.
pub fn accept_all(_card: &Card) -> bool {
    true
}

/// Accept a card unless its first `accountCard` marker says otherwise.
///
/// Outdated cards are always accepted.
pub fn accept_account(card: &Card) -> bool {
    if card.is_outdated {
        return true;
    }
    card.extra_field(ACCOUNT_CARD_FIELD)
        .map(|value| value == "true")
        .unwrap_or(true)
}

/// Accept a current card whose first `identityId` marker equals `device_id`.
pub fn accept_device_id(device_id: &str, card: &Card) -> bool {
    if card.is_outdated {
        return false;
    }
    card.extra_field(IDENTITY_ID_FIELD) == Some(device_id)
}

impl std::fmt::Display for CardFilter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::All => write!(f, "all"),
            Self::Account => write!(f, "account"),
            Self::DeviceId(id) => write!(f, "{DEVICE_PREFIX}{id}"),
        }
    }
}

impl FromStr for CardFilter {
    type Err = CardError;

    /// Parse `all`, `account`, or `device:<id>`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "all" => Ok(Self::All),
            "account" => Ok(Self::Account),
            _ => match s.strip_prefix(DEVICE_PREFIX) {
                Some(id) if !id.is_empty() => Ok(Self::DeviceId(id.to_string())),
                Some(_) => Err(CardError::InvalidArgument(
                    "device filter needs an id: device:<id>".into(),
                )),
                None => Err(CardError::InvalidArgument(format!(
                    "unknown card filter '{s}' (expected all, account or device:<id>)"
                ))),
            },
        }
    }
}
