//! Raw transaction records as they arrive from the data source.

use serde::{Deserialize, Serialize};

/// A raw credit-card transaction record.
///
/// Field names match the headers of the raw corpus CSV, so records
/// deserialize directly from both CSV rows and serving-side JSON. Everything
/// except the timestamp and birth date is optional: the feature builder
/// reconciles whatever subset of fields actually arrives against the schema
/// it was fitted on.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawTransaction {
    /// Transaction timestamp as free text; parsed under a prioritized
    /// format list by the feature builder.
    pub trans_date_trans_time: String,

    /// Cardholder birth date as free text.
    pub dob: String,

    #[serde(default)]
    pub cc_num: Option<String>,

    #[serde(default)]
    pub merchant: Option<String>,

    #[serde(default)]
    pub category: Option<String>,

    /// Transaction amount.
    #[serde(default)]
    pub amt: Option<f64>,

    #[serde(default)]
    pub first: Option<String>,

    #[serde(default)]
    pub last: Option<String>,

    #[serde(default)]
    pub gender: Option<String>,

    #[serde(default)]
    pub street: Option<String>,

    #[serde(default)]
    pub city: Option<String>,

    /// Two-letter state code; the partition key.
    #[serde(default)]
    pub state: Option<String>,

    #[serde(default)]
    pub zip: Option<String>,

    /// Cardholder latitude.
    #[serde(default)]
    pub lat: Option<f64>,

    /// Cardholder longitude.
    #[serde(default)]
    pub long: Option<f64>,

    #[serde(default)]
    pub city_pop: Option<f64>,

    #[serde(default)]
    pub job: Option<String>,

    /// Merchant latitude.
    #[serde(default)]
    pub merch_lat: Option<f64>,

    /// Merchant longitude.
    #[serde(default)]
    pub merch_long: Option<f64>,

    /// Fraud label. Present in training data, absent at serving time.
    #[serde(default)]
    pub is_fraud: Option<u8>,
}

impl RawTransaction {
    /// Create a minimal record with the required fields.
    pub fn new(trans_date_trans_time: impl Into<String>, dob: impl Into<String>) -> Self {
        Self {
            trans_date_trans_time: trans_date_trans_time.into(),
            dob: dob.into(),
            cc_num: None,
            merchant: None,
            category: None,
            amt: None,
            first: None,
            last: None,
            gender: None,
            street: None,
            city: None,
            state: None,
            zip: None,
            lat: None,
            long: None,
            city_pop: None,
            job: None,
            merch_lat: None,
            merch_long: None,
            is_fraud: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_fields_deserialize_to_none() {
        let json = r#"{"trans_date_trans_time":"01/02/20 13:45","dob":"1/5/80","amt":42.5}"#;
        let txn: RawTransaction = serde_json::from_str(json).unwrap();

        assert_eq!(txn.amt, Some(42.5));
        assert!(txn.category.is_none());
        assert!(txn.state.is_none());
        assert!(txn.is_fraud.is_none());
    }

    #[test]
    fn test_round_trip() {
        let mut txn = RawTransaction::new("01/02/20 13:45", "1/5/80");
        txn.merchant = Some("fraud_Kirlin and Sons".to_string());
        txn.is_fraud = Some(1);

        let json = serde_json::to_string(&txn).unwrap();
        let back: RawTransaction = serde_json::from_str(&json).unwrap();

        assert_eq!(back.merchant.as_deref(), Some("fraud_Kirlin and Sons"));
        assert_eq!(back.is_fraud, Some(1));
    }
}
