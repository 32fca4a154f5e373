//! Domain records for card production lots
//!
//! Typed counterparts of the rows the store persists. Enum variants map to the
//! business labels used on the production floor (French), which are also the
//! stored TEXT forms.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// The nine country-level subsidiaries that produce or receive lots
pub const SUBSIDIARIES: [&str; 9] = [
    "Burkina Faso",
    "Mali",
    "Niger",
    "Côte d'Ivoire",
    "Sénégal",
    "Bénin",
    "Togo",
    "Guinée Bissau",
    "Guinée Conakry",
];

/// Fixed catalog of card products that may co-occur within a lot
pub const CARD_TYPES: [&str; 12] = [
    "challenge",
    "open",
    "challenge plus",
    "access",
    "visa leader",
    "visa gold encoche",
    "visa infinite encoche",
    "visa gold premier",
    "visa infinite premier",
    "wadia challenge",
    "wadia open",
    "wadia challenge plus",
];

/// Whether `name` is one of the managed subsidiaries
pub fn is_subsidiary(name: &str) -> bool {
    SUBSIDIARIES.iter().any(|s| *s == name.trim())
}

/// Whether `name` is in the card product catalog
pub fn is_card_type(name: &str) -> bool {
    let name = name.trim();
    CARD_TYPES.iter().any(|t| t.eq_ignore_ascii_case(name))
}

/// Production category of a lot
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LotType {
    #[serde(rename = "Ordinaire")]
    Ordinary,
    #[serde(rename = "Émission instantanée")]
    InstantIssuance,
    #[serde(rename = "Renouvellement")]
    Renewal,
}

impl LotType {
    pub fn as_str(&self) -> &'static str {
        match self {
            LotType::Ordinary => "Ordinaire",
            LotType::InstantIssuance => "Émission instantanée",
            LotType::Renewal => "Renouvellement",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim() {
            "Ordinaire" => Some(LotType::Ordinary),
            "Émission instantanée" => Some(LotType::InstantIssuance),
            "Renouvellement" => Some(LotType::Renewal),
            _ => None,
        }
    }
}

impl std::fmt::Display for LotType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of a quality-control test
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TestResult {
    #[serde(rename = "Réussite")]
    Pass,
    #[serde(rename = "Échec")]
    Fail,
}

impl TestResult {
    pub fn as_str(&self) -> &'static str {
        match self {
            TestResult::Pass => "Réussite",
            TestResult::Fail => "Échec",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim() {
            "Réussite" => Some(TestResult::Pass),
            "Échec" => Some(TestResult::Fail),
            _ => None,
        }
    }
}

impl std::fmt::Display for TestResult {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Progress of a shipment through dispatch
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ShipmentStatus {
    #[serde(rename = "En attente")]
    Pending,
    #[serde(rename = "En cours d'expédition")]
    InTransit,
    #[serde(rename = "Expédié")]
    Shipped,
}

impl ShipmentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ShipmentStatus::Pending => "En attente",
            ShipmentStatus::InTransit => "En cours d'expédition",
            ShipmentStatus::Shipped => "Expédié",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim() {
            "En attente" => Some(ShipmentStatus::Pending),
            "En cours d'expédition" => Some(ShipmentStatus::InTransit),
            "Expédié" => Some(ShipmentStatus::Shipped),
            _ => None,
        }
    }
}

impl std::fmt::Display for ShipmentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A registered production lot
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Lot {
    pub id: i64,
    pub name: String,
    pub lot_type: LotType,
    pub quantity: u32,
    pub production_date: NaiveDate,
    pub registration_date: NaiveDate,
    pub subsidiary: String,
    pub pin_printing: bool,
    /// 0 when the lot is produced without PIN printing
    pub pin_count: u32,
    /// Derived at registration: ceil(quantity / 50)
    pub cards_to_test: u32,
}

/// Insert form of a lot, before the store assigns an id and stamps
/// `cards_to_test`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewLot {
    pub name: String,
    pub lot_type: LotType,
    pub quantity: u32,
    pub production_date: NaiveDate,
    pub registration_date: NaiveDate,
    pub subsidiary: String,
    pub pin_printing: bool,
    #[serde(default)]
    pub pin_count: u32,
}

/// Default remark on a quality-control entry ("rien à signaler")
pub fn default_remark() -> String {
    "RAS".to_string()
}

/// One persisted quality-control line for a card type within a lot
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QualityControl {
    pub id: i64,
    pub lot_id: i64,
    pub card_type: String,
    pub quantity: u32,
    pub sample_size: u32,
    pub control_date: NaiveDate,
    pub remark: String,
    pub result: TestResult,
}

/// Delivery agency serving a country
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeliveryAgency {
    pub country: String,
    pub agency: String,
}

/// A delivery agent working for an agency
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Courier {
    pub id: i64,
    pub agency: String,
    pub last_name: String,
    pub first_name: String,
    pub contact: String,
}

/// Consignee reference block printed on waybills for a country
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ShippingReference {
    pub country: String,
    pub reference: String,
}

/// A dispatch record for a lot
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Shipment {
    pub id: i64,
    pub lot_id: i64,
    pub country: String,
    pub status: ShipmentStatus,
    pub waybill: String,
    pub reference: String,
    pub agency: String,
    pub courier_id: i64,
    pub shipment_date: NaiveDate,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lot_type_labels_round_trip() {
        for lot_type in [LotType::Ordinary, LotType::InstantIssuance, LotType::Renewal] {
            assert_eq!(LotType::parse(lot_type.as_str()), Some(lot_type));
        }
        assert_eq!(LotType::parse("inconnu"), None);
    }

    #[test]
    fn test_result_labels_round_trip() {
        assert_eq!(TestResult::parse("Réussite"), Some(TestResult::Pass));
        assert_eq!(TestResult::parse("Échec"), Some(TestResult::Fail));
        assert_eq!(TestResult::parse(""), None);
    }

    #[test]
    fn shipment_status_labels_round_trip() {
        for status in [
            ShipmentStatus::Pending,
            ShipmentStatus::InTransit,
            ShipmentStatus::Shipped,
        ] {
            assert_eq!(ShipmentStatus::parse(status.as_str()), Some(status));
        }
    }

    #[test]
    fn serde_uses_business_labels() {
        let json = serde_json::to_string(&LotType::InstantIssuance).unwrap();
        assert_eq!(json, "\"Émission instantanée\"");

        let status: ShipmentStatus = serde_json::from_str("\"En attente\"").unwrap();
        assert_eq!(status, ShipmentStatus::Pending);
    }

    #[test]
    fn subsidiary_catalog_lookup() {
        assert!(is_subsidiary("Sénégal"));
        assert!(is_subsidiary(" Mali "));
        assert!(!is_subsidiary("France"));
    }

    #[test]
    fn card_type_catalog_lookup() {
        assert!(is_card_type("visa gold premier"));
        assert!(is_card_type("Visa Gold Premier"));
        assert!(!is_card_type("mastercard"));
    }
}
