use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Flow {
    SelectService,
    Appointment,
}

impl Flow {
    pub fn as_str(&self) -> &'static str {
        match self {
            Flow::SelectService => "select_service",
            Flow::Appointment => "appointment",
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Step {
    ShowMenu,
    ConfirmService,
    GetName,
    GetPhone,
    SelectDate,
}

impl Step {
    pub fn as_str(&self) -> &'static str {
        match self {
            Step::ShowMenu => "show_menu",
            Step::ConfirmService => "confirm_service",
            Step::GetName => "get_name",
            Step::GetPhone => "get_phone",
            Step::SelectDate => "select_date",
        }
    }
}

/// Fields accumulated while walking through a booking.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ConversationData {
    pub client_name: Option<String>,
    pub phone: Option<String>,
    pub service: Option<String>,
    pub price: Option<f64>,
    pub duration_minutes: Option<i32>,
}

impl ConversationData {
    /// Overwrites every field that is set in `other`.
    pub fn merge(&mut self, other: ConversationData) {
        if other.client_name.is_some() {
            self.client_name = other.client_name;
        }
        if other.phone.is_some() {
            self.phone = other.phone;
        }
        if other.service.is_some() {
            self.service = other.service;
        }
        if other.price.is_some() {
            self.price = other.price;
        }
        if other.duration_minutes.is_some() {
            self.duration_minutes = other.duration_minutes;
        }
    }
}

/// Per-sender conversation position. `flow == None` means idle.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationState {
    pub flow: Option<Flow>,
    pub step: Option<Step>,
    pub data: ConversationData,
    pub updated_at: NaiveDateTime,
}

impl ConversationState {
    pub fn new() -> Self {
        Self {
            flow: None,
            step: None,
            data: ConversationData::default(),
            updated_at: chrono::Utc::now().naive_utc(),
        }
    }

    pub fn is_idle(&self) -> bool {
        self.flow.is_none()
    }

    pub fn apply(&mut self, patch: ConversationPatch) {
        if patch.flow.is_some() {
            self.flow = patch.flow;
        }
        if patch.step.is_some() {
            self.step = patch.step;
        }
        self.data.merge(patch.data);
        self.updated_at = chrono::Utc::now().naive_utc();
    }
}

impl Default for ConversationState {
    fn default() -> Self {
        Self::new()
    }
}

/// Partial update for a conversation; unset fields are left untouched.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ConversationPatch {
    pub flow: Option<Flow>,
    pub step: Option<Step>,
    pub data: ConversationData,
}

impl ConversationPatch {
    pub fn goto(flow: Flow, step: Step) -> Self {
        Self {
            flow: Some(flow),
            step: Some(step),
            data: ConversationData::default(),
        }
    }

    pub fn with_data(mut self, data: ConversationData) -> Self {
        self.data = data;
        self
    }
}
