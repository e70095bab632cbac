//! Maps events to the text shown to users.
//!
//! The table below is the single source of truth for which event types this
//! service understands. Supporting a new type means adding one entry.

use crate::{error::ClassifyError, models::event::Event};

type Formatter = fn(&Event) -> Result<String, ClassifyError>;

const KNOWN_EVENTS: &[(&str, Formatter)] = &[
    ("order_confirmed", order_confirmed),
    ("shipping_updated", shipping_updated),
];

pub fn classify(event: &Event) -> Result<String, ClassifyError> {
    KNOWN_EVENTS
        .iter()
        .find(|(event_type, _)| *event_type == event.event_type)
        .map(|(_, format)| format(event))
        .unwrap_or_else(|| Err(ClassifyError::Unrecognized(event.event_type.clone())))
}

fn order_confirmed(event: &Event) -> Result<String, ClassifyError> {
    let order_id = required(event, "orderId", &event.order_id)?;
    let user_id = required(event, "userId", &event.user_id)?;

    Ok(format!("Order {} confirmed for user {}", order_id, user_id))
}

fn shipping_updated(event: &Event) -> Result<String, ClassifyError> {
    let order_id = required(event, "orderId", &event.order_id)?;
    let status = required(event, "status", &event.status)?;

    Ok(format!("Order {} shipping status: {}", order_id, status))
}

fn required<'a>(
    event: &Event,
    field: &'static str,
    value: &'a Option<String>,
) -> Result<&'a str, ClassifyError> {
    match value.as_deref() {
        Some(v) if !v.is_empty() => Ok(v),
        _ => Err(ClassifyError::MissingField {
            event_type: event.event_type.clone(),
            field,
        }),
    }
}
