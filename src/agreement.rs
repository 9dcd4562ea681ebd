//! # Repair Agreement Model
//!
//! The record a scan ultimately feeds. Storage, screens and printing live
//! elsewhere; this module only owns the shape of an agreement, the rule for
//! merging an [`ExtractionResult`] into it, and the totals shown on the
//! printed document.

use chrono::{DateTime, Datelike, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::extraction::ExtractionResult;
use crate::validation::{digits_only, normalize_vin, validate_phone};

/// Workflow state of an agreement; serialized with the Arabic labels the shop uses
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum RepairStatus {
    #[default]
    #[serde(rename = "جديد")]
    New,
    #[serde(rename = "قيد العمل")]
    InProgress,
    #[serde(rename = "في إنتظار القطع")]
    WaitingParts,
    #[serde(rename = "مكتمل")]
    Completed,
    #[serde(rename = "تم التسليم")]
    Delivered,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum PlateType {
    #[default]
    Saudi,
    Foreign,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VehicleData {
    /// Make, as written on the registration (e.g. "تويوتا")
    #[serde(rename = "type")]
    pub vehicle_type: String,
    pub model: String,
    pub year: String,
    pub odometer: u64,
    pub color: String,
    pub plate_type: PlateType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub plate_letters: Option<String>,
    pub plate_numbers: String,
    pub vin: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CustomerData {
    pub full_name: String,
    pub phone: String,
    pub id_number: String,
}

/// One line item of requested work
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Claim {
    pub id: String,
    pub description: String,
    pub cost: f64,
}

impl Claim {
    pub fn new(description: impl Into<String>, cost: f64) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            description: description.into(),
            cost,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RepairAgreement {
    pub id: String,
    pub serial_number: String,
    pub created_at: DateTime<Utc>,
    pub expected_delivery_date: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub job_card_number: Option<String>,
    pub vehicle: VehicleData,
    pub customer: CustomerData,
    pub claims: Vec<Claim>,
    pub discount_percent: f64,
    pub photos: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub signature: Option<String>,
    pub status: RepairStatus,
    pub terms_accepted: bool,
}

/// Serial numbers are the creation year followed by a 4-digit running number
pub fn serial_number(year: i32, existing_count: usize) -> String {
    format!("{}{:04}", year, existing_count + 1)
}

impl RepairAgreement {
    /// Blank agreement; `existing_count` is how many agreements already exist
    pub fn new(existing_count: usize) -> Self {
        let created_at = Utc::now();
        Self {
            id: Uuid::new_v4().to_string(),
            serial_number: serial_number(created_at.year(), existing_count),
            created_at,
            expected_delivery_date: String::new(),
            job_card_number: None,
            vehicle: VehicleData::default(),
            customer: CustomerData::default(),
            claims: Vec::new(),
            discount_percent: 0.0,
            photos: Vec::new(),
            signature: None,
            status: RepairStatus::New,
            terms_accepted: false,
        }
    }

    /// Merge scanned fields; returns how many fields changed.
    ///
    /// Extracted values win over existing ones, absent values never erase
    /// anything. VIN and model are upper-cased, brand fills the vehicle type,
    /// customer name fills the full name.
    pub fn apply_extraction(&mut self, result: &ExtractionResult) -> usize {
        let mut changed = 0;
        let mut merge = |target: &mut String, value: Option<String>| {
            if let Some(value) = value.filter(|v| !v.is_empty()) {
                if *target != value {
                    *target = value;
                    changed += 1;
                }
            }
        };

        merge(&mut self.vehicle.vin, result.vin.as_deref().map(normalize_vin));
        merge(&mut self.vehicle.vehicle_type, result.brand.clone());
        merge(&mut self.vehicle.model, result.model.as_deref().map(str::to_uppercase));
        merge(&mut self.vehicle.year, result.year.clone());
        merge(&mut self.vehicle.color, result.color.clone());
        merge(&mut self.vehicle.plate_numbers, result.plate_numbers.clone());
        merge(&mut self.customer.full_name, result.customer_name.clone());
        merge(&mut self.customer.id_number, result.id_number.as_deref().map(digits_only));

        if let Some(letters) = result.plate_letters.as_ref().filter(|v| !v.is_empty()) {
            if self.vehicle.plate_letters.as_ref() != Some(letters) {
                self.vehicle.plate_letters = Some(letters.clone());
                changed += 1;
            }
        }

        changed
    }

    /// Store a mobile number typed with any separators; it must read `05` plus 8 digits
    pub fn set_customer_phone(&mut self, raw: &str) -> Result<(), &'static str> {
        let digits = digits_only(raw);
        validate_phone(&digits)?;
        self.customer.phone = digits;
        Ok(())
    }

    /// Customer phone in international form (`05…` becomes `9665…`) for messaging links
    pub fn whatsapp_number(&self) -> Option<String> {
        let phone = self.customer.phone.as_str();
        if phone.is_empty() {
            return None;
        }
        match phone.strip_prefix('0') {
            Some(rest) if phone.starts_with("05") => Some(format!("966{}", rest)),
            _ => Some(phone.to_string()),
        }
    }

    pub fn add_claim(&mut self, description: impl Into<String>, cost: f64) -> &Claim {
        self.claims.push(Claim::new(description, cost));
        &self.claims[self.claims.len() - 1]
    }

    /// Sum of claim costs before discount
    pub fn subtotal(&self) -> f64 {
        self.claims.iter().map(|c| c.cost).sum()
    }

    pub fn discount_amount(&self) -> f64 {
        self.subtotal() * self.discount_percent.clamp(0.0, 100.0) / 100.0
    }

    pub fn total(&self) -> f64 {
        self.subtotal() - self.discount_amount()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_merge_prefers_extracted_and_keeps_existing() {
        let mut agreement = RepairAgreement::new(0);
        agreement.vehicle.color = "أبيض".to_string();
        agreement.customer.phone = "0551234567".to_string();

        let result = ExtractionResult {
            vin: Some("jtd-bu4ee9a0123456".to_string()),
            brand: Some("تويوتا".to_string()),
            model: Some("camry".to_string()),
            plate_letters: Some("أ ب ج".to_string()),
            ..Default::default()
        };
        let changed = agreement.apply_extraction(&result);

        assert_eq!(changed, 4);
        assert_eq!(agreement.vehicle.vin, "JTDBU4EE9A0123456");
        assert_eq!(agreement.vehicle.vehicle_type, "تويوتا");
        assert_eq!(agreement.vehicle.model, "CAMRY");
        assert_eq!(agreement.vehicle.plate_letters.as_deref(), Some("أ ب ج"));
        // Untouched by null fields
        assert_eq!(agreement.vehicle.color, "أبيض");
        assert_eq!(agreement.customer.phone, "0551234567");
    }

    #[test]
    fn test_merge_strips_id_separators() {
        let mut agreement = RepairAgreement::new(0);
        let result = ExtractionResult {
            id_number: Some("1012 345 678".to_string()),
            ..Default::default()
        };
        assert_eq!(agreement.apply_extraction(&result), 1);
        assert_eq!(agreement.customer.id_number, "1012345678");
    }

    #[test]
    fn test_customer_phone() {
        let mut agreement = RepairAgreement::new(0);
        assert_eq!(agreement.whatsapp_number(), None);

        assert_eq!(agreement.set_customer_phone("055-123 4567"), Ok(()));
        assert_eq!(agreement.customer.phone, "0551234567");
        assert_eq!(agreement.whatsapp_number().as_deref(), Some("966551234567"));

        assert_eq!(agreement.set_customer_phone("12345"), Err("phone-format"));
        assert_eq!(agreement.customer.phone, "0551234567");
    }

    #[test]
    fn test_merge_of_empty_result_changes_nothing() {
        let mut agreement = RepairAgreement::new(3);
        agreement.vehicle.year = "2018".to_string();
        let before = agreement.clone();

        assert_eq!(agreement.apply_extraction(&ExtractionResult::default()), 0);
        assert_eq!(agreement, before);
    }

    #[test]
    fn test_totals_with_discount() {
        let mut agreement = RepairAgreement::new(0);
        agreement.add_claim("سمكرة الباب الأمامي", 800.0);
        agreement.add_claim("دهان", 400.0);
        agreement.discount_percent = 10.0;

        assert_eq!(agreement.subtotal(), 1200.0);
        assert_eq!(agreement.discount_amount(), 120.0);
        assert_eq!(agreement.total(), 1080.0);
        assert_ne!(agreement.claims[0].id, agreement.claims[1].id);
    }

    #[test]
    fn test_serial_number_format() {
        assert_eq!(serial_number(2024, 0), "20240001");
        assert_eq!(serial_number(2024, 41), "20240042");
        let agreement = RepairAgreement::new(9);
        assert!(agreement.serial_number.ends_with("0010"));
    }

    #[test]
    fn test_status_serializes_with_shop_labels() {
        assert_eq!(
            serde_json::to_string(&RepairStatus::WaitingParts).unwrap(),
            "\"في إنتظار القطع\""
        );
        let status: RepairStatus = serde_json::from_str("\"تم التسليم\"").unwrap();
        assert_eq!(status, RepairStatus::Delivered);

        let value = serde_json::to_value(RepairAgreement::new(0)).unwrap();
        assert_eq!(value["status"], "جديد");
        assert_eq!(value["vehicle"]["plateType"], "Saudi");
        assert!(value["vehicle"].get("type").is_some());
    }
}
