//! Publish decision.

use movenet_core::ContentHash;

/// True when nothing has been published yet, or the published hash differs.
pub fn should_publish(local: &ContentHash, stored: Option<&ContentHash>) -> bool {
    match stored {
        None => true,
        Some(stored) => stored != local,
    }
}
