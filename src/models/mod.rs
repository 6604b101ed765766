pub mod appointment;
pub mod business;
pub mod conversation;
pub mod hours;

pub use appointment::{Appointment, AppointmentSource, AppointmentStatus};
pub use business::{format_price, Business, BusinessCategory, Service};
pub use conversation::{ConversationData, ConversationPatch, ConversationState, Flow, Step};
pub use hours::{DayHours, WeeklyHours};
