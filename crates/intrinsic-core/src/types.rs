use rust_decimal::Decimal;
use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;

/// All monetary values. Wraps Decimal to prevent accidental f64 usage.
pub type Money = Decimal;

/// Rates expressed as decimals (0.05 = 5%). Never as percentages.
pub type Rate = Decimal;

/// Multiples (e.g., 8.5x EV/EBITDA)
pub type Multiple = Decimal;

// ---------------------------------------------------------------------------
// Provenance tagging
// ---------------------------------------------------------------------------

/// Where a modelling input came from.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Provenance {
    /// Read directly from a reported, period-matched figure.
    Actual,
    /// Computed from secondary lines or balance-sheet deltas.
    Derived,
    /// Named default constant or sector norm.
    #[default]
    Default,
}

impl fmt::Display for Provenance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Provenance::Actual => write!(f, "ACTUAL"),
            Provenance::Derived => write!(f, "DERIVED"),
            Provenance::Default => write!(f, "DEFAULT"),
        }
    }
}

/// A value together with its provenance tag and a short source note.
///
/// Deserializes from either a bare value (tagged `DEFAULT`) or an object
/// `{ "value": .., "provenance": .., "source": .. }`.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Tagged<T> {
    pub value: T,
    pub provenance: Provenance,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub source: String,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum TaggedRepr<T> {
    Full {
        value: T,
        #[serde(default)]
        provenance: Provenance,
        #[serde(default)]
        source: String,
    },
    Bare(T),
}

impl<'de, T: Deserialize<'de>> Deserialize<'de> for Tagged<T> {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        Ok(match TaggedRepr::deserialize(deserializer)? {
            TaggedRepr::Full {
                value,
                provenance,
                source,
            } => Tagged {
                value,
                provenance,
                source,
            },
            TaggedRepr::Bare(value) => Tagged::from(value),
        })
    }
}

impl<T> From<T> for Tagged<T> {
    fn from(value: T) -> Self {
        Tagged {
            value,
            provenance: Provenance::Default,
            source: String::new(),
        }
    }
}

impl<T> Tagged<T> {
    pub fn new(value: T, provenance: Provenance, source: impl Into<String>) -> Self {
        Tagged {
            value,
            provenance,
            source: source.into(),
        }
    }

    pub fn actual(value: T, source: impl Into<String>) -> Self {
        Self::new(value, Provenance::Actual, source)
    }

    pub fn derived(value: T, source: impl Into<String>) -> Self {
        Self::new(value, Provenance::Derived, source)
    }

    pub fn defaulted(value: T, source: impl Into<String>) -> Self {
        Self::new(value, Provenance::Default, source)
    }

    /// Replace the value, keeping provenance and source.
    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Tagged<U> {
        Tagged {
            value: f(self.value),
            provenance: self.provenance,
            source: self.source,
        }
    }
}

impl Tagged<Decimal> {
    /// Shift the value by `delta`, appending a note to the source.
    pub fn shifted(&self, delta: Decimal, note: &str) -> Self {
        let source = if self.source.is_empty() {
            note.to_string()
        } else {
            format!("{}; {note}", self.source)
        };
        Tagged::new(self.value + delta, self.provenance, source)
    }
}

// ---------------------------------------------------------------------------
// Audit trail
// ---------------------------------------------------------------------------

/// One computation trace record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditEntry {
    pub stage: String,
    pub field: String,
    pub value: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub provenance: Option<Provenance>,
    pub note: String,
}

/// Explicit trace returned alongside every result.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AuditTrail {
    pub entries: Vec<AuditEntry>,
}

impl AuditTrail {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(
        &mut self,
        stage: &str,
        field: &str,
        value: impl fmt::Display,
        provenance: Option<Provenance>,
        note: impl Into<String>,
    ) {
        self.entries.push(AuditEntry {
            stage: stage.to_string(),
            field: field.to_string(),
            value: value.to_string(),
            provenance,
            note: note.into(),
        });
    }

    pub fn record_tagged(&mut self, stage: &str, field: &str, tagged: &Tagged<Decimal>) {
        self.record(
            stage,
            field,
            tagged.value,
            Some(tagged.provenance),
            tagged.source.clone(),
        );
    }

    pub fn extend(&mut self, other: AuditTrail) {
        self.entries.extend(other.entries);
    }

    pub fn for_field<'a>(&'a self, field: &'a str) -> impl Iterator<Item = &'a AuditEntry> + 'a {
        self.entries.iter().filter(move |e| e.field == field)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

// ---------------------------------------------------------------------------
// Warnings
// ---------------------------------------------------------------------------

/// Machine-readable warning category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WarningKind {
    /// Price or financial data older than the configured threshold.
    StaleData,
    /// A valuation method produced no value.
    MethodUnavailable,
    /// A BULL/BEAR scenario was rejected.
    ScenarioRejected,
    /// An input had to be defaulted or looked anomalous.
    DataQuality,
    /// Model-level caution (e.g. terminal value dominance).
    Model,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Warning {
    pub kind: WarningKind,
    pub source: String,
    pub message: String,
}

impl Warning {
    pub fn new(kind: WarningKind, source: &str, message: impl Into<String>) -> Self {
        Warning {
            kind,
            source: source.to_string(),
            message: message.into(),
        }
    }

    /// Warnings that lower the confidence score.
    pub fn affects_data_quality(&self) -> bool {
        matches!(self.kind, WarningKind::StaleData | WarningKind::DataQuality)
    }
}

impl fmt::Display for Warning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.source, self.message)
    }
}

// ---------------------------------------------------------------------------
// Output envelope
// ---------------------------------------------------------------------------

/// Standard computation output envelope
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComputationOutput<T: Serialize> {
    pub result: T,
    pub methodology: String,
    pub assumptions: serde_json::Value,
    pub warnings: Vec<String>,
    pub metadata: ComputationMetadata,
}

/// Metadata for every computation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComputationMetadata {
    pub version: String,
    pub computation_time_us: u64,
    pub precision: String,
}

impl ComputationMetadata {
    pub fn new(elapsed_us: u64, precision: &str) -> Self {
        ComputationMetadata {
            version: env!("CARGO_PKG_VERSION").to_string(),
            computation_time_us: elapsed_us,
            precision: precision.to_string(),
        }
    }
}

/// Helper to wrap computation results with metadata
pub fn with_metadata<T: Serialize>(
    methodology: &str,
    assumptions: &impl Serialize,
    warnings: Vec<String>,
    elapsed_us: u64,
    result: T,
) -> ComputationOutput<T> {
    ComputationOutput {
        result,
        methodology: methodology.to_string(),
        assumptions: serde_json::to_value(assumptions).unwrap_or_default(),
        warnings,
        metadata: ComputationMetadata::new(elapsed_us, "rust_decimal_128bit"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_bare_number_deserializes_as_default() {
        let t: Tagged<Decimal> = serde_json::from_str("0.25").unwrap();
        assert_eq!(t.value, dec!(0.25));
        assert_eq!(t.provenance, Provenance::Default);
    }

    #[test]
    fn test_tagged_object_keeps_provenance() {
        let t: Tagged<Decimal> =
            serde_json::from_str(r#"{"value": "0.08", "provenance": "ACTUAL", "source": "capex line"}"#)
                .unwrap();
        assert_eq!(t.value, dec!(0.08));
        assert_eq!(t.provenance, Provenance::Actual);
        assert_eq!(t.source, "capex line");
    }

    #[test]
    fn test_tagged_sequence() {
        let t: Tagged<Vec<Decimal>> = serde_json::from_str("[0.1, 0.09]").unwrap();
        assert_eq!(t.value, vec![dec!(0.1), dec!(0.09)]);
        assert_eq!(t.provenance, Provenance::Default);
    }

    #[test]
    fn test_shifted_appends_note() {
        let t = Tagged::actual(dec!(0.15), "ebitda / revenue");
        let s = t.shifted(dec!(0.01), "bull");
        assert_eq!(s.value, dec!(0.16));
        assert_eq!(s.provenance, Provenance::Actual);
        assert_eq!(s.source, "ebitda / revenue; bull");
    }

    #[test]
    fn test_audit_trail_filter() {
        let mut trail = AuditTrail::new();
        trail.record("financials", "tax_rate", dec!(0.25), Some(Provenance::Default), "statutory");
        trail.record("dcf", "wacc", dec!(0.12), None, "");
        assert_eq!(trail.for_field("tax_rate").count(), 1);
        assert_eq!(trail.len(), 2);
    }

    #[test]
    fn test_quality_warnings() {
        let stale = Warning::new(WarningKind::StaleData, "market", "price is 12 days old");
        let model = Warning::new(WarningKind::Model, "dcf", "terminal value dominates");
        assert!(stale.affects_data_quality());
        assert!(!model.affects_data_quality());
    }
}
