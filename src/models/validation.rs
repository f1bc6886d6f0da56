use anyhow::{Result, anyhow};

use crate::models::notification::{MAX_TTL_MS, NotificationRequest};

const MAX_ID_LEN: usize = 128;
const MAX_DEDUP_KEY_LEN: usize = 256;

pub fn validate_notification_id(id: &str) -> Result<()> {
    if id.is_empty() {
        return Err(anyhow!("Notification id cannot be empty"));
    }

    if id.len() > MAX_ID_LEN {
        return Err(anyhow!(
            "Notification id too long (maximum {} characters)",
            MAX_ID_LEN
        ));
    }

    let valid_chars = id
        .chars()
        .all(|c| c.is_alphanumeric() || c == '_' || c == '-' || c == ':' || c == '.');

    if !valid_chars {
        return Err(anyhow!("Notification id contains invalid characters"));
    }

    Ok(())
}

pub fn validate_request(request: &NotificationRequest) -> Result<()> {
    if let Some(id) = &request.id {
        validate_notification_id(id)?;
    }

    if let Some(key) = &request.deduplication_key {
        if key.is_empty() {
            return Err(anyhow!("Deduplication key cannot be empty"));
        }

        if key.len() > MAX_DEDUP_KEY_LEN {
            return Err(anyhow!(
                "Deduplication key too long (maximum {} characters)",
                MAX_DEDUP_KEY_LEN
            ));
        }
    }

    match request.time_to_live_ms {
        Some(0) => return Err(anyhow!("Time-to-live must be greater than zero")),
        Some(ttl) if ttl > MAX_TTL_MS => {
            return Err(anyhow!("Time-to-live exceeds maximum of {} ms", MAX_TTL_MS));
        }
        _ => {}
    }

    Ok(())
}
