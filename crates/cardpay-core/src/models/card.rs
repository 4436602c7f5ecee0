use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS), ts(export))]
#[serde(rename_all = "UPPERCASE")]
pub enum CardType {
    Visa,
    Mastercard,
    Amex,
    Discover,
    #[default]
    #[serde(other)]
    Other,
}

impl CardType {
    pub fn display_name(&self) -> &'static str {
        match self {
            CardType::Visa => "Visa",
            CardType::Mastercard => "Mastercard",
            CardType::Amex => "American Express",
            CardType::Discover => "Discover",
            CardType::Other => "Other",
        }
    }

    pub fn from_str(s: &str) -> Self {
        match s.trim().to_ascii_uppercase().as_str() {
            "VISA" => CardType::Visa,
            "MASTERCARD" => CardType::Mastercard,
            "AMEX" => CardType::Amex,
            "DISCOVER" => CardType::Discover,
            _ => CardType::Other,
        }
    }
}

/// Saved card. Only the masked number ever comes back from the ledger.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS), ts(export))]
pub struct Card {
    pub id: i64,
    pub card_holder_name: String,
    pub masked_number: String,
    pub last_four_digits: String,
    #[serde(default)]
    pub card_type: CardType,
    pub expiry_month: u32,
    pub expiry_year: i32,
    #[serde(default)]
    pub is_default: bool,
    pub created_at: Option<DateTime<Utc>>,
}

impl Card {
    /// Expiry as shown on the card face, e.g. `04/27`
    pub fn expiry_display(&self) -> String {
        format!("{:02}/{:02}", self.expiry_month, self.expiry_year.rem_euclid(100))
    }
}

/// Card creation request. The only place the full number is transmitted.
#[derive(Clone, Serialize)]
pub struct NewCard {
    pub card_holder_name: String,
    pub card_number: String,
    pub card_type: CardType,
    pub expiry_month: u32,
    pub expiry_year: i32,
    pub is_default: bool,
}

impl std::fmt::Debug for NewCard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let digits: String = self.card_number.chars().filter(|c| c.is_ascii_digit()).collect();
        let last_four = &digits[digits.len().saturating_sub(4)..];
        f.debug_struct("NewCard")
            .field("card_holder_name", &self.card_holder_name)
            .field("card_number", &format!("**** {}", last_four))
            .field("card_type", &self.card_type)
            .field("expiry_month", &self.expiry_month)
            .field("expiry_year", &self.expiry_year)
            .field("is_default", &self.is_default)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_card() {
        let json = r#"{"id": 3, "card_holder_name": "Test User", "masked_number": "**** **** **** 4242", "last_four_digits": "4242", "card_type": "VISA", "expiry_month": 4, "expiry_year": 2027, "is_default": true, "created_at": "2025-03-01T10:30:00Z"}"#;
        let card: Card = serde_json::from_str(json).unwrap();
        assert_eq!(card.card_type, CardType::Visa);
        assert_eq!(card.expiry_display(), "04/27");
        assert!(card.is_default);
    }

    #[test]
    fn test_unknown_card_type_is_other() {
        let json = r#"{"id": 3, "card_holder_name": "X", "masked_number": "**** **** **** 0000", "last_four_digits": "0000", "card_type": "JCB", "expiry_month": 12, "expiry_year": 2030}"#;
        let card: Card = serde_json::from_str(json).unwrap();
        assert_eq!(card.card_type, CardType::Other);
        assert!(!card.is_default);
    }

    #[test]
    fn test_new_card_debug_hides_number() {
        let card = NewCard {
            card_holder_name: "Test User".into(),
            card_number: "4242 4242 4242 4242".into(),
            card_type: CardType::Visa,
            expiry_month: 1,
            expiry_year: 2030,
            is_default: false,
        };
        let debug = format!("{:?}", card);
        assert!(debug.contains("**** 4242"));
        assert!(!debug.contains("4242 4242"));
    }
}
