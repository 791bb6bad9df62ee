use std::fmt;

use serde::{Deserialize, Serialize};

use crate::domain::{CaseId, EntityId};

/// Event names exchanged between view components. The string forms are the
/// interoperability contract with the surrounding view layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum EventName {
    ProposeRemoval,
    ConfirmRemoval,
    CancelRemoval,
    ShareDropSuccess,
    ShareDropFailure,
}

impl EventName {
    pub const ALL: [EventName; 5] = [
        EventName::ProposeRemoval,
        EventName::ConfirmRemoval,
        EventName::CancelRemoval,
        EventName::ShareDropSuccess,
        EventName::ShareDropFailure,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            EventName::ProposeRemoval => "proposeRemoval",
            EventName::ConfirmRemoval => "confirmRemoval",
            EventName::CancelRemoval => "cancelRemoval",
            EventName::ShareDropSuccess => "shareDropSuccess",
            EventName::ShareDropFailure => "shareDropFailure",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|name| name.as_str() == raw)
    }
}

impl fmt::Display for EventName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemovalTarget {
    pub case_id: CaseId,
    pub entity_id: EntityId,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShareDropFailed {
    pub case_id: CaseId,
    pub entity_id: EntityId,
    pub message: String,
}

/// A bus event with its typed payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "camelCase")]
pub enum BusEvent {
    ProposeRemoval(RemovalTarget),
    ConfirmRemoval,
    CancelRemoval,
    ShareDropSuccess(RemovalTarget),
    ShareDropFailure(ShareDropFailed),
}

impl BusEvent {
    pub fn name(&self) -> EventName {
        match self {
            BusEvent::ProposeRemoval(_) => EventName::ProposeRemoval,
            BusEvent::ConfirmRemoval => EventName::ConfirmRemoval,
            BusEvent::CancelRemoval => EventName::CancelRemoval,
            BusEvent::ShareDropSuccess(_) => EventName::ShareDropSuccess,
            BusEvent::ShareDropFailure(_) => EventName::ShareDropFailure,
        }
    }
}
