pub mod whatsapp;

pub use whatsapp::{
    BuildError, CallbackEvents, ConnectionResult, MessageEvent, MessageStatus, OutboundMessage,
    SendError, SendResult, StatusEvent, SyncedTemplate, TemplateSyncResult, VerificationResult,
    WhatsAppClient, WhatsAppCredentials,
};
