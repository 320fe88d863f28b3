//! Bidirectional transform between the external FHIR Observation and the
//! flat internal model.
//!
//! The transform is deliberately lossy where the flat model is narrower
//! than the wire form: coded-group entries are filtered per field, only the
//! first interpretation/body-site coding survives, and only one value kind
//! is rebuilt on the way out (Quantity wins over CodeableConcept, then
//! String, SampledData, Period).

use crate::error::{CoreError, Result};
use crate::fhir::{
    CodeableConcept, Coding, FhirValue, ObservationComponent, ObservationResource, Period,
    Quantity, Reference, SampledData, OBSERVATION_RESOURCE_TYPE,
};
use crate::model::{Observation, ObservationStatus};
use crate::time::FhirInstant;
use std::str::FromStr;

/// Maps an external Observation into a fresh flat row.
///
/// Fails on a wrong `resourceType` and on any unparseable dateTime; every
/// other irregularity degrades (absent status becomes `entered-in-error`,
/// a non-numeric id becomes 0, empty strings are filtered out of coded
/// groups field by field).
pub fn resource_to_observation(resource: &ObservationResource) -> Result<Observation> {
    if resource.resource_type != OBSERVATION_RESOURCE_TYPE {
        return Err(CoreError::type_mismatch(
            OBSERVATION_RESOURCE_TYPE,
            resource.resource_type.clone(),
        ));
    }

    let mut obs = Observation::new();

    obs.observation_id = resource
        .id
        .as_deref()
        .and_then(|id| id.parse::<i64>().ok())
        .unwrap_or(0);

    obs.status = resource
        .status
        .as_deref()
        .and_then(ObservationStatus::from_code)
        .unwrap_or(ObservationStatus::EnteredInError);

    if let Some(category) = &resource.category {
        collect_concept(
            category,
            &mut obs.category_code,
            &mut obs.category_display,
            &mut obs.category_system,
            &mut obs.category_text,
        );
    }
    if let Some(code) = &resource.code {
        collect_concept(
            code,
            &mut obs.code_code,
            &mut obs.code_display,
            &mut obs.code_system,
            &mut obs.code_text,
        );
    }

    if let Some(subject) = &resource.subject {
        obs.patient_reference = subject.reference.clone().unwrap_or_default();
    }
    if let Some(device) = &resource.device {
        obs.device_reference = device.reference.clone().unwrap_or_default();
    }
    for performer in &resource.performer {
        if let Some(reference) = performer.reference.as_deref() {
            if !reference.is_empty() {
                obs.performer_references.push(reference.to_string());
            }
        }
    }

    if let Some(datetime) = &resource.effective_date_time {
        obs.effective_date_time = Some(FhirInstant::from_str(datetime)?);
    } else if let Some(period) = &resource.effective_period {
        if let Some(start) = &period.start {
            obs.effective_period_start = FhirInstant::from_str(start)?;
        }
        if let Some(end) = &period.end {
            obs.effective_period_end = FhirInstant::from_str(end)?;
        }
    }

    if let Some(issued) = &resource.issued {
        obs.issued = issued.clone();
    }

    if let Some(interpretation) = &resource.interpretation {
        let (code, display, system) = first_coding(interpretation);
        obs.interpretation_code = code;
        obs.interpretation_display = display;
        obs.interpretation_system = system;
        obs.interpretation_text = interpretation.text.clone().unwrap_or_default();
    }
    if let Some(body_site) = &resource.body_site {
        let (code, display, system) = first_coding(body_site);
        obs.body_site_code = code;
        obs.body_site_display = display;
        obs.body_site_system = system;
        obs.body_site_text = body_site.text.clone().unwrap_or_default();
    }

    obs.comments = resource.comments.clone().unwrap_or_default();

    if resource.component.is_empty() {
        if let Some(value) = resource.value() {
            append_value(&mut obs, value)?;
        }
    } else {
        for component in &resource.component {
            let coding = component.code.coding.first();
            obs.component_code_code
                .push(coding.and_then(|c| c.code.clone()).unwrap_or_default());
            obs.component_code_display
                .push(coding.and_then(|c| c.display.clone()).unwrap_or_default());
            obs.component_code_system
                .push(coding.and_then(|c| c.system.clone()).unwrap_or_default());
            obs.component_code_text = component.code.text.clone().unwrap_or_default();
            // A component without a value contributes its code only.
            if let Some(value) = component.value() {
                append_value(&mut obs, value)?;
            }
        }
    }

    Ok(obs)
}

/// Rebuilds the external form of a flat row.
///
/// Inverse of [`resource_to_observation`] up to the documented losses; it
/// never fails because the flat model only holds already-validated data.
pub fn observation_to_resource(obs: &Observation) -> ObservationResource {
    let mut resource = ObservationResource::new();

    resource.id = Some(obs.observation_id.to_string());
    resource.status = Some(obs.status.as_code().to_string());

    resource.category = rebuild_concept(
        &obs.category_code,
        &obs.category_display,
        &obs.category_system,
        &obs.category_text,
    );
    resource.code = rebuild_concept(
        &obs.code_code,
        &obs.code_display,
        &obs.code_system,
        &obs.code_text,
    );

    if !obs.patient_reference.is_empty() {
        resource.subject = Some(Reference {
            reference: Some(obs.patient_reference.clone()),
        });
    }
    if !obs.device_reference.is_empty() {
        resource.device = Some(Reference {
            reference: Some(obs.device_reference.clone()),
        });
    }
    resource.performer = obs
        .performer_references
        .iter()
        .filter(|r| !r.is_empty())
        .map(|r| Reference {
            reference: Some(r.clone()),
        })
        .collect();

    match &obs.effective_date_time {
        Some(instant) => resource.effective_date_time = Some(instant.to_string()),
        None => {
            resource.effective_period = Some(Period {
                start: Some(obs.effective_period_start.to_string()),
                end: Some(obs.effective_period_end.to_string()),
            });
        }
    }
    resource.issued = Some(obs.issued.clone());

    resource.interpretation = rebuild_single_concept(
        &obs.interpretation_code,
        &obs.interpretation_display,
        &obs.interpretation_system,
        &obs.interpretation_text,
    );
    resource.body_site = rebuild_single_concept(
        &obs.body_site_code,
        &obs.body_site_display,
        &obs.body_site_system,
        &obs.body_site_text,
    );

    if !obs.comments.is_empty() {
        resource.comments = Some(obs.comments.clone());
    }

    let kind = choose_value_kind(obs);
    if obs.has_components() {
        for i in 0..obs.component_code_code.len() {
            let coding = Coding {
                code: get_nonempty(&obs.component_code_code, i),
                display: get_nonempty(&obs.component_code_display, i),
                system: get_nonempty(&obs.component_code_system, i),
            };
            let code = CodeableConcept {
                coding: if coding == Coding::default() {
                    Vec::new()
                } else {
                    vec![coding]
                },
                text: nonempty(&obs.component_code_text),
            };
            let mut component = ObservationComponent::new(code);
            if let Some(kind) = kind {
                if let Some(value) = value_at(obs, kind, i) {
                    assign_component_value(&mut component, value);
                }
            }
            resource.component.push(component);
        }
    } else if let Some(kind) = kind {
        if let Some(value) = value_at(obs, kind, 0) {
            assign_resource_value(&mut resource, value);
        }
    }

    resource
}

/// The value kind a flat row holds, probed in fixed priority order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ValueKind {
    Quantity,
    CodeableConcept,
    String,
    SampledData,
    Period,
}

/// Owned counterpart of [`FhirValue`] for the outbound direction.
enum OwnedValue {
    Quantity(Quantity),
    CodeableConcept(CodeableConcept),
    String(String),
    SampledData(SampledData),
    Period(Period),
}

fn choose_value_kind(obs: &Observation) -> Option<ValueKind> {
    if !obs.value_quantity_value.is_empty() {
        Some(ValueKind::Quantity)
    } else if !obs.value_code.is_empty() {
        Some(ValueKind::CodeableConcept)
    } else if !obs.value_string.is_empty() {
        Some(ValueKind::String)
    } else if !obs.value_sampled_data_origin_value.is_empty() {
        Some(ValueKind::SampledData)
    } else if !obs.value_period_start.is_empty() {
        Some(ValueKind::Period)
    } else {
        None
    }
}

/// Value for slot `i` of the chosen kind; a gap at `i` yields `None`
/// rather than an error.
fn value_at(obs: &Observation, kind: ValueKind, i: usize) -> Option<OwnedValue> {
    match kind {
        ValueKind::Quantity => obs.value_quantity_value.get(i).map(|value| {
            OwnedValue::Quantity(Quantity {
                value: Some(*value),
                unit: get_nonempty(&obs.value_quantity_unit, i),
                system: get_nonempty(&obs.value_quantity_system, i),
                code: get_nonempty(&obs.value_quantity_code, i),
            })
        }),
        ValueKind::CodeableConcept => {
            obs.value_code.get(i)?;
            let coding = Coding {
                code: get_nonempty(&obs.value_code, i),
                display: get_nonempty(&obs.value_display, i),
                system: get_nonempty(&obs.value_system, i),
            };
            let text = get_nonempty(&obs.value_text, i);
            if coding == Coding::default() && text.is_none() {
                return None;
            }
            Some(OwnedValue::CodeableConcept(CodeableConcept {
                coding: if coding == Coding::default() {
                    Vec::new()
                } else {
                    vec![coding]
                },
                text,
            }))
        }
        ValueKind::String => get_nonempty(&obs.value_string, i).map(OwnedValue::String),
        ValueKind::SampledData => obs.value_sampled_data_origin_value.get(i).map(|value| {
            OwnedValue::SampledData(SampledData {
                origin: Quantity {
                    value: Some(*value),
                    unit: get_nonempty(&obs.value_sampled_data_origin_unit, i),
                    system: get_nonempty(&obs.value_sampled_data_origin_system, i),
                    code: get_nonempty(&obs.value_sampled_data_origin_code, i),
                },
                period: obs.value_sampled_data_period.get(i).copied(),
                dimensions: obs.value_sampled_data_dimensions.get(i).copied(),
                data: get_nonempty(&obs.value_sampled_data_data, i),
            })
        }),
        ValueKind::Period => obs.value_period_start.get(i).map(|start| {
            OwnedValue::Period(Period {
                start: Some(start.to_string()),
                end: obs.value_period_end.get(i).map(|end| end.to_string()),
            })
        }),
    }
}

fn assign_resource_value(resource: &mut ObservationResource, value: OwnedValue) {
    match value {
        OwnedValue::Quantity(v) => resource.value_quantity = Some(v),
        OwnedValue::CodeableConcept(v) => resource.value_codeable_concept = Some(v),
        OwnedValue::String(v) => resource.value_string = Some(v),
        OwnedValue::SampledData(v) => resource.value_sampled_data = Some(v),
        OwnedValue::Period(v) => resource.value_period = Some(v),
    }
}

fn assign_component_value(component: &mut ObservationComponent, value: OwnedValue) {
    match value {
        OwnedValue::Quantity(v) => component.value_quantity = Some(v),
        OwnedValue::CodeableConcept(v) => component.value_codeable_concept = Some(v),
        OwnedValue::String(v) => component.value_string = Some(v),
        OwnedValue::SampledData(v) => component.value_sampled_data = Some(v),
        OwnedValue::Period(v) => component.value_period = Some(v),
    }
}

/// Appends one value to the matching flat sequence. Every field of the
/// value is pushed, empty defaults included, so that within one kind the
/// sub-sequences stay index-aligned across components.
fn append_value(obs: &mut Observation, value: FhirValue<'_>) -> Result<()> {
    match value {
        FhirValue::Quantity(quantity) => {
            obs.value_quantity_code
                .push(quantity.code.clone().unwrap_or_default());
            obs.value_quantity_system
                .push(quantity.system.clone().unwrap_or_default());
            obs.value_quantity_unit
                .push(quantity.unit.clone().unwrap_or_default());
            obs.value_quantity_value.push(quantity.value.unwrap_or(0.0));
        }
        FhirValue::CodeableConcept(concept) => {
            let coding = concept.coding.first();
            obs.value_code
                .push(coding.and_then(|c| c.code.clone()).unwrap_or_default());
            obs.value_display
                .push(coding.and_then(|c| c.display.clone()).unwrap_or_default());
            obs.value_system
                .push(coding.and_then(|c| c.system.clone()).unwrap_or_default());
            obs.value_text.push(concept.text.clone().unwrap_or_default());
        }
        FhirValue::String(s) => {
            obs.value_string.push(s.to_string());
        }
        FhirValue::SampledData(sampled) => {
            obs.value_sampled_data_origin_code
                .push(sampled.origin.code.clone().unwrap_or_default());
            obs.value_sampled_data_origin_system
                .push(sampled.origin.system.clone().unwrap_or_default());
            obs.value_sampled_data_origin_unit
                .push(sampled.origin.unit.clone().unwrap_or_default());
            obs.value_sampled_data_origin_value
                .push(sampled.origin.value.unwrap_or(0.0));
            obs.value_sampled_data_period
                .push(sampled.period.unwrap_or(0.0));
            obs.value_sampled_data_dimensions
                .push(sampled.dimensions.unwrap_or(0));
            obs.value_sampled_data_data
                .push(sampled.data.clone().unwrap_or_default());
        }
        FhirValue::Period(period) => {
            let start = period.start.as_deref().ok_or_else(|| {
                CoreError::malformed_date_time("valuePeriod is missing its start")
            })?;
            let end = period
                .end
                .as_deref()
                .ok_or_else(|| CoreError::malformed_date_time("valuePeriod is missing its end"))?;
            obs.value_period_start.push(FhirInstant::from_str(start)?);
            obs.value_period_end.push(FhirInstant::from_str(end)?);
        }
    }
    Ok(())
}

/// Copies a concept's codings into the parallel arrays, skipping empty
/// strings per field. The per-field skip means the three arrays can end up
/// with different lengths; that asymmetry is part of the storage contract.
fn collect_concept(
    concept: &CodeableConcept,
    codes: &mut Vec<String>,
    displays: &mut Vec<String>,
    systems: &mut Vec<String>,
    text: &mut String,
) {
    for coding in &concept.coding {
        if let Some(code) = coding.code.as_deref() {
            if !code.is_empty() {
                codes.push(code.to_string());
            }
        }
        if let Some(display) = coding.display.as_deref() {
            if !display.is_empty() {
                displays.push(display.to_string());
            }
        }
        if let Some(system) = coding.system.as_deref() {
            if !system.is_empty() {
                systems.push(system.to_string());
            }
        }
    }
    *text = concept.text.clone().unwrap_or_default();
}

fn first_coding(concept: &CodeableConcept) -> (String, String, String) {
    match concept.coding.first() {
        Some(coding) => (
            coding.code.clone().unwrap_or_default(),
            coding.display.clone().unwrap_or_default(),
            coding.system.clone().unwrap_or_default(),
        ),
        None => (String::new(), String::new(), String::new()),
    }
}

/// Rebuilds a multi-coding concept, iterating the code sequence and pairing
/// display/system entries positionally. Entries beyond the code sequence's
/// length are dropped.
fn rebuild_concept(
    codes: &[String],
    displays: &[String],
    systems: &[String],
    text: &str,
) -> Option<CodeableConcept> {
    if codes.is_empty() && displays.is_empty() && systems.is_empty() && text.is_empty() {
        return None;
    }
    let coding = (0..codes.len())
        .map(|i| Coding {
            code: nonempty(&codes[i]),
            display: get_nonempty(displays, i),
            system: get_nonempty(systems, i),
        })
        .collect();
    Some(CodeableConcept {
        coding,
        text: nonempty(text),
    })
}

fn rebuild_single_concept(
    code: &str,
    display: &str,
    system: &str,
    text: &str,
) -> Option<CodeableConcept> {
    if code.is_empty() && display.is_empty() && system.is_empty() && text.is_empty() {
        return None;
    }
    let coding = Coding {
        code: nonempty(code),
        display: nonempty(display),
        system: nonempty(system),
    };
    Some(CodeableConcept {
        coding: if coding == Coding::default() {
            Vec::new()
        } else {
            vec![coding]
        },
        text: nonempty(text),
    })
}

fn nonempty(s: &str) -> Option<String> {
    if s.is_empty() {
        None
    } else {
        Some(s.to_string())
    }
}

fn get_nonempty(values: &[String], i: usize) -> Option<String> {
    values.get(i).and_then(|s| nonempty(s))
}
