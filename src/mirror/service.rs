use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::mqtt::MqttError;

pub const DOMAIN: &str = "sad_lamp";
pub const SERVICE_SET_STATE: &str = "set_state";
pub const FIELD_NEW_STATE: &str = "new_state";

#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    #[error("Unknown service {domain}.{service}")]
    UnknownService { domain: String, service: String },

    #[error("Missing field {0:?}")]
    MissingField(&'static str),

    #[error("Field {field:?} must be a string, number or bool, got {got}")]
    InvalidField { field: &'static str, got: String },

    #[error(transparent)]
    Publish(#[from] MqttError),
}

/// A platform action: `domain.service` plus its data object.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServiceCall {
    pub domain: String,
    pub service: String,
    #[serde(default)]
    pub data: Value,
}

impl ServiceCall {
    pub fn new(domain: &str, service: &str, data: Value) -> Self {
        Self {
            domain: domain.to_string(),
            service: service.to_string(),
            data,
        }
    }

    pub fn set_state(new_state: &str) -> Self {
        Self::new(
            DOMAIN,
            SERVICE_SET_STATE,
            serde_json::json!({ FIELD_NEW_STATE: new_state }),
        )
    }

    pub fn is(&self, domain: &str, service: &str) -> bool {
        self.domain == domain && self.service == service
    }

    /// Reads a scalar field as text. Numbers and bools use their JSON form.
    pub fn text_field(&self, field: &'static str) -> Result<String, ServiceError> {
        match self.data.get(field) {
            None | Some(Value::Null) => Err(ServiceError::MissingField(field)),
            Some(Value::String(s)) => Ok(s.clone()),
            Some(v @ (Value::Number(_) | Value::Bool(_))) => Ok(v.to_string()),
            Some(other) => Err(ServiceError::InvalidField {
                field,
                got: other.to_string(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn set_state_call_carries_new_state() {
        let call = ServiceCall::set_state("on");
        assert!(call.is(DOMAIN, SERVICE_SET_STATE));
        assert_eq!(call.text_field(FIELD_NEW_STATE).unwrap(), "on");
    }

    #[test]
    fn scalar_fields_become_text() {
        let call = ServiceCall::new(DOMAIN, SERVICE_SET_STATE, json!({ "new_state": 42 }));
        assert_eq!(call.text_field(FIELD_NEW_STATE).unwrap(), "42");

        let call = ServiceCall::new(DOMAIN, SERVICE_SET_STATE, json!({ "new_state": false }));
        assert_eq!(call.text_field(FIELD_NEW_STATE).unwrap(), "false");
    }

    #[test]
    fn missing_and_structured_fields_are_errors() {
        let call = ServiceCall::new(DOMAIN, SERVICE_SET_STATE, json!({}));
        assert!(matches!(
            call.text_field(FIELD_NEW_STATE),
            Err(ServiceError::MissingField("new_state"))
        ));

        let call = ServiceCall::new(DOMAIN, SERVICE_SET_STATE, json!({ "new_state": null }));
        assert!(matches!(
            call.text_field(FIELD_NEW_STATE),
            Err(ServiceError::MissingField(_))
        ));

        let call = ServiceCall::new(DOMAIN, SERVICE_SET_STATE, json!({ "new_state": [1] }));
        assert!(matches!(
            call.text_field(FIELD_NEW_STATE),
            Err(ServiceError::InvalidField { .. })
        ));
    }

    #[test]
    fn call_without_data_deserializes() {
        let call: ServiceCall =
            serde_json::from_str(r#"{"domain":"sad_lamp","service":"set_state"}"#).unwrap();
        assert_eq!(call.data, Value::Null);
    }
}
