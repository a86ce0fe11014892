//! Validation for the signaling, ice, and restart sections.

use crate::schema::ShareConfig;

use super::helpers::{validate_range, validate_scheme};

/// Validate signaling relay settings.
pub(crate) fn validate_signaling(errors: &mut Vec<String>, config: &ShareConfig) {
    let signaling = &config.signaling;
    if !signaling.url.is_empty() {
        validate_scheme(errors, "signaling.url", &signaling.url, &["ws://", "wss://"]);
    }
    validate_range(
        errors,
        "signaling.reconnect_delay_secs",
        signaling.reconnect_delay_secs,
        1,
        60,
    );
    validate_range(
        errors,
        "signaling.connect_timeout_secs",
        signaling.connect_timeout_secs,
        1,
        120,
    );
    if signaling.max_reconnect_delay_secs < signaling.reconnect_delay_secs {
        errors.push(format!(
            "signaling.max_reconnect_delay_secs = {} is below signaling.reconnect_delay_secs = {}",
            signaling.max_reconnect_delay_secs, signaling.reconnect_delay_secs
        ));
    }
}

/// Validate STUN/TURN server entries.
pub(crate) fn validate_ice(errors: &mut Vec<String>, config: &ShareConfig) {
    for (i, server) in config.ice.servers.iter().enumerate() {
        if server.urls.is_empty() {
            errors.push(format!("ice.servers[{i}].urls is empty"));
        }
        for url in &server.urls {
            validate_scheme(
                errors,
                &format!("ice.servers[{i}].urls"),
                url,
                &["stun:", "stuns:", "turn:", "turns:"],
            );
        }
        if server.is_turn() && (server.username.is_none() || server.credential.is_none()) {
            errors.push(format!(
                "ice.servers[{i}] is a TURN server and needs username and credential"
            ));
        }
    }
}

/// Validate restart bounds.
pub(crate) fn validate_restart(errors: &mut Vec<String>, config: &ShareConfig) {
    validate_range(
        errors,
        "restart.max_attempts",
        u64::from(config.restart.max_attempts),
        1,
        10,
    );
    validate_range(
        errors,
        "restart.timeout_secs",
        config.restart.timeout_secs,
        1,
        300,
    );
}
