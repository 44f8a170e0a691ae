// Route modules for the bridge server
pub mod expand; // Text expansion capability
pub mod hooks; // Inbound repository webhooks
