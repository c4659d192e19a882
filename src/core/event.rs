//! Event record envelope and typed payloads.
//!
//! Every line in a session log is one [`EventRecord`]: a fixed envelope
//! (`timestamp`, `session_id`, `event_kind`) plus a payload object whose
//! shape is determined by the kind. Known kinds have typed payloads; any
//! other kind travels as a free-form object.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

pub const KIND_ROLE_CHECK: &str = "role_check";
pub const KIND_SKILL_STEP: &str = "skill_step";

/// Envelope keys a payload may never shadow.
pub const RESERVED_FIELDS: &[&str] = &["timestamp", "event_id", "session_id", "event_kind"];

/// Decision record written by the role gate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoleCheck {
    pub expected_role: String,
    pub actual_role: String,
    #[serde(rename = "match")]
    pub matched: bool,
}

/// One step of a skill execution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SkillStep {
    pub skill: String,
    pub step: String,
    pub status: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file: Option<String>,
    /// Marks the step as a policy-relevant action.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub governance: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum EventPayload {
    RoleCheck(RoleCheck),
    SkillStep(SkillStep),
    /// Any producer-defined kind.
    Custom {
        kind: String,
        fields: Map<String, Value>,
    },
}

impl EventPayload {
    pub fn kind(&self) -> &str {
        match self {
            Self::RoleCheck(_) => KIND_ROLE_CHECK,
            Self::SkillStep(_) => KIND_SKILL_STEP,
            Self::Custom { kind, .. } => kind,
        }
    }

    /// Payload as a JSON object, with reserved envelope keys removed.
    pub fn to_object(&self) -> Result<Map<String, Value>, serde_json::Error> {
        let value = match self {
            Self::RoleCheck(p) => serde_json::to_value(p)?,
            Self::SkillStep(p) => serde_json::to_value(p)?,
            Self::Custom { fields, .. } => Value::Object(fields.clone()),
        };
        let mut map = match value {
            Value::Object(map) => map,
            _ => Map::new(),
        };
        for key in RESERVED_FIELDS {
            map.remove(*key);
        }
        Ok(map)
    }

    /// Rebuild a typed payload from a kind and a raw object. Known kinds whose
    /// object does not fit the typed shape come back as `Custom`.
    pub fn from_parts(kind: &str, payload: &Map<String, Value>) -> Self {
        let value = Value::Object(payload.clone());
        match kind {
            KIND_ROLE_CHECK => {
                if let Ok(p) = serde_json::from_value::<RoleCheck>(value) {
                    return Self::RoleCheck(p);
                }
            }
            KIND_SKILL_STEP => {
                if let Ok(p) = serde_json::from_value::<SkillStep>(value) {
                    return Self::SkillStep(p);
                }
            }
            _ => {}
        }
        Self::Custom {
            kind: kind.to_string(),
            fields: payload.clone(),
        }
    }
}

/// One line of a session log.
///
/// Only `timestamp` is required on read; every other envelope field falls
/// back to a default so partially-formed records from other producers still
/// count. Keys outside the envelope that a flat producer wrote at the top
/// level land in `extra`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventRecord {
    pub timestamp: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub event_id: Option<String>,
    #[serde(default)]
    pub session_id: Option<String>,
    #[serde(default)]
    pub event_kind: Option<String>,
    #[serde(default)]
    pub payload: Map<String, Value>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl EventRecord {
    pub fn new(
        timestamp: String,
        event_id: String,
        session_id: String,
        payload: &EventPayload,
    ) -> Result<Self, serde_json::Error> {
        Ok(Self {
            timestamp,
            event_id: Some(event_id),
            session_id: Some(session_id),
            event_kind: Some(payload.kind().to_string()),
            payload: payload.to_object()?,
            extra: Map::new(),
        })
    }

    /// Parse one log line. `None` for anything that is not a record.
    pub fn parse_line(line: &str) -> Option<Self> {
        serde_json::from_str::<Self>(line).ok()
    }

    pub fn to_line(&self) -> Result<String, serde_json::Error> {
        let mut line = serde_json::to_string(self)?;
        line.push('\n');
        Ok(line)
    }

    /// Look up a payload field, then a top-level field from flat producers.
    pub fn field(&self, key: &str) -> Option<&Value> {
        self.payload
            .get(key)
            .or_else(|| self.extra.get(key))
            .filter(|v| !v.is_null())
    }

    /// Field rendered as a grouping key. Strings are used literally; other
    /// scalars use their JSON text.
    pub fn field_key(&self, key: &str) -> Option<String> {
        match key {
            "event_kind" => return self.event_kind.clone(),
            "session_id" => return self.session_id.clone(),
            _ => {}
        }
        match self.field(key)? {
            Value::String(s) => Some(s.clone()),
            other => Some(other.to_string()),
        }
    }

    pub fn typed_payload(&self) -> Option<EventPayload> {
        let kind = self.event_kind.as_deref()?;
        Some(EventPayload::from_parts(kind, &self.payload))
    }
}
