//! Best-effort outbound notifications.

pub mod whatsapp;

pub use whatsapp::{NotificationError, Notifier, WhatsAppNotifier};
