//! Shared data model for the voxrelay workspace: the `Call` aggregate, the
//! notification envelope, scheduler/registry/telephony row shapes, and the
//! coarse error kinds every process crate's own error enum maps onto.

pub mod agent_message;
pub mod call;
pub mod error;
pub mod notification;
pub mod registry;
pub mod scheduler;
pub mod telephony;

pub use agent_message::AgentMessage;
pub use call::{
    Call, CallEndReason, CallEvent, CallParticipant, CallSource, CallStatus, CallTranscript,
    ConversationMessage, ParticipantId, ParticipantRole, SpeakerType,
};
pub use error::ErrorKind;
pub use notification::{Notification, NotificationPayload, PendingNotification};
pub use registry::{AppHealth, RegisteredApp};
pub use scheduler::{CalendarEvent, Reminder};
pub use telephony::{redact_phone_number, AllowedPhoneNumber};
