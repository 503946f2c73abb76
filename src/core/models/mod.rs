pub mod audit_entry;
pub mod key_id;
pub mod stored_key;
pub mod stored_secret;
