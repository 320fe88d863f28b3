//! Typed wire representation of the FHIR Observation resource.
//!
//! Only the elements the flat model carries are modeled; serde handles the
//! JSON encoding so unknown elements are simply ignored on input.

use crate::time::FhirInstant;
use serde::{Deserialize, Serialize};

pub const OBSERVATION_RESOURCE_TYPE: &str = "Observation";

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Coding {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct CodeableConcept {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub coding: Vec<Coding>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Quantity {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unit: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct SampledData {
    #[serde(default)]
    pub origin: Quantity,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub period: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dimensions: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<String>,
}

/// `start`/`end` stay as raw strings on the wire; the mapper parses them and
/// turns failures into hard errors.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Period {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Reference {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reference: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Meta {
    #[serde(rename = "versionId", default, skip_serializing_if = "Option::is_none")]
    pub version_id: Option<String>,
    #[serde(
        rename = "lastUpdated",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub last_updated: Option<FhirInstant>,
}

/// The five `value[x]` kinds the service understands, borrowed from the
/// choice fields of a resource or component. Matching is exhaustive, so a
/// new kind cannot be added without every consumer taking a stance.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FhirValue<'a> {
    Quantity(&'a Quantity),
    CodeableConcept(&'a CodeableConcept),
    String(&'a str),
    SampledData(&'a SampledData),
    Period(&'a Period),
}

fn classify_value<'a>(
    quantity: &'a Option<Quantity>,
    concept: &'a Option<CodeableConcept>,
    string: &'a Option<String>,
    sampled: &'a Option<SampledData>,
    period: &'a Option<Period>,
) -> Option<FhirValue<'a>> {
    if let Some(q) = quantity {
        Some(FhirValue::Quantity(q))
    } else if let Some(c) = concept {
        Some(FhirValue::CodeableConcept(c))
    } else if let Some(s) = string {
        Some(FhirValue::String(s))
    } else if let Some(s) = sampled {
        Some(FhirValue::SampledData(s))
    } else {
        period.as_ref().map(FhirValue::Period)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ObservationComponent {
    pub code: CodeableConcept,
    #[serde(
        rename = "valueQuantity",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub value_quantity: Option<Quantity>,
    #[serde(
        rename = "valueCodeableConcept",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub value_codeable_concept: Option<CodeableConcept>,
    #[serde(
        rename = "valueString",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub value_string: Option<String>,
    #[serde(
        rename = "valueSampledData",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub value_sampled_data: Option<SampledData>,
    #[serde(
        rename = "valuePeriod",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub value_period: Option<Period>,
}

impl ObservationComponent {
    pub fn new(code: CodeableConcept) -> Self {
        Self {
            code,
            value_quantity: None,
            value_codeable_concept: None,
            value_string: None,
            value_sampled_data: None,
            value_period: None,
        }
    }

    pub fn value(&self) -> Option<FhirValue<'_>> {
        classify_value(
            &self.value_quantity,
            &self.value_codeable_concept,
            &self.value_string,
            &self.value_sampled_data,
            &self.value_period,
        )
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ObservationResource {
    #[serde(rename = "resourceType")]
    pub resource_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub meta: Option<Meta>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<CodeableConcept>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<CodeableConcept>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subject: Option<Reference>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub device: Option<Reference>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub performer: Vec<Reference>,
    #[serde(
        rename = "effectiveDateTime",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub effective_date_time: Option<String>,
    #[serde(
        rename = "effectivePeriod",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub effective_period: Option<Period>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub issued: Option<FhirInstant>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub interpretation: Option<CodeableConcept>,
    #[serde(
        rename = "bodySite",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub body_site: Option<CodeableConcept>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comments: Option<String>,
    #[serde(
        rename = "valueQuantity",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub value_quantity: Option<Quantity>,
    #[serde(
        rename = "valueCodeableConcept",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub value_codeable_concept: Option<CodeableConcept>,
    #[serde(
        rename = "valueString",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub value_string: Option<String>,
    #[serde(
        rename = "valueSampledData",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub value_sampled_data: Option<SampledData>,
    #[serde(
        rename = "valuePeriod",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub value_period: Option<Period>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub component: Vec<ObservationComponent>,
}

impl ObservationResource {
    pub fn new() -> Self {
        Self {
            resource_type: OBSERVATION_RESOURCE_TYPE.to_string(),
            id: None,
            meta: None,
            status: None,
            category: None,
            code: None,
            subject: None,
            device: None,
            performer: Vec::new(),
            effective_date_time: None,
            effective_period: None,
            issued: None,
            interpretation: None,
            body_site: None,
            comments: None,
            value_quantity: None,
            value_codeable_concept: None,
            value_string: None,
            value_sampled_data: None,
            value_period: None,
            component: Vec::new(),
        }
    }

    pub fn value(&self) -> Option<FhirValue<'_>> {
        classify_value(
            &self.value_quantity,
            &self.value_codeable_concept,
            &self.value_string,
            &self.value_sampled_data,
            &self.value_period,
        )
    }
}

impl Default for ObservationResource {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn deserializes_minimal_resource() {
        let resource: ObservationResource =
            serde_json::from_value(json!({"resourceType": "Observation"})).unwrap();
        assert_eq!(resource.resource_type, "Observation");
        assert!(resource.id.is_none());
        assert!(resource.component.is_empty());
        assert!(resource.value().is_none());
    }

    #[test]
    fn missing_resource_type_is_a_deserialization_error() {
        let result: Result<ObservationResource, _> = serde_json::from_value(json!({"id": "5"}));
        assert!(result.is_err());
    }

    #[test]
    fn empty_fields_are_not_serialized() {
        let resource = ObservationResource::new();
        let value = serde_json::to_value(&resource).unwrap();
        let object = value.as_object().unwrap();
        assert_eq!(object.len(), 1);
        assert_eq!(object["resourceType"], "Observation");
    }

    #[test]
    fn value_classification_prefers_quantity() {
        let mut resource = ObservationResource::new();
        resource.value_string = Some("high".to_string());
        resource.value_quantity = Some(Quantity {
            value: Some(1.5),
            ..Quantity::default()
        });
        match resource.value() {
            Some(FhirValue::Quantity(q)) => assert_eq!(q.value, Some(1.5)),
            other => panic!("expected quantity, got {other:?}"),
        }
    }

    #[test]
    fn component_choice_fields_use_fhir_names() {
        let component: ObservationComponent = serde_json::from_value(json!({
            "code": {"coding": [{"code": "8480-6", "system": "http://loinc.org"}]},
            "valueQuantity": {"value": 120.0, "unit": "mmHg"}
        }))
        .unwrap();
        assert!(matches!(component.value(), Some(FhirValue::Quantity(_))));
        let back = serde_json::to_value(&component).unwrap();
        assert!(back.get("valueQuantity").is_some());
        assert!(back.get("valueString").is_none());
    }

    #[test]
    fn period_keeps_raw_strings() {
        let period: Period = serde_json::from_value(json!({
            "start": "2024-01-01T00:00:00Z",
            "end": "not-yet-validated"
        }))
        .unwrap();
        assert_eq!(period.end.as_deref(), Some("not-yet-validated"));
    }
}
