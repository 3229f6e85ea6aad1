//! Profile records and the plaintext vault document.
//!
//! The decrypted vault is a JSON object whose `profiles` array holds the
//! user's autofill profiles.  Any other top-level keys are kept as-is so
//! that saving profiles never drops data written by a newer client.

use std::collections::HashSet;
use std::sync::atomic::{AtomicI64, Ordering};

use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::errors::{FormVaultError, Result};

/// One autofill profile.
///
/// Only `id` and `name` are required; empty optional fields are left
/// out of the serialized form.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Profile {
    /// Unique within the vault.
    pub id: String,

    /// Display name of the profile (e.g. "Work").
    pub name: String,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub full_name: String,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub email: String,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub phone: String,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub address: String,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub city: String,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub zip: String,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub country: String,
}

impl Profile {
    /// A new, otherwise empty profile with a freshly generated id.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: generate_id(),
            name: name.into(),
            ..Self::default()
        }
    }
}

/// The plaintext document stored inside the vault.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct VaultDocument {
    #[serde(default)]
    pub profiles: Vec<Profile>,

    /// Unknown top-level keys, carried through untouched.
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl VaultDocument {
    pub fn with_profiles(profiles: Vec<Profile>) -> Self {
        Self {
            profiles,
            extra: serde_json::Map::new(),
        }
    }
}

static LAST_ID: AtomicI64 = AtomicI64::new(0);

/// Generate a profile id: Unix time in milliseconds, bumped so that ids
/// handed out by this process are strictly increasing.
pub fn generate_id() -> String {
    let now = Utc::now().timestamp_millis();
    let mut prev = LAST_ID.load(Ordering::Relaxed);
    loop {
        let next = now.max(prev + 1);
        match LAST_ID.compare_exchange_weak(prev, next, Ordering::Relaxed, Ordering::Relaxed) {
            Ok(_) => return next.to_string(),
            Err(actual) => prev = actual,
        }
    }
}

/// Check a single profile.
pub fn validate_profile(profile: &Profile) -> Result<()> {
    if profile.id.trim().is_empty() {
        return Err(FormVaultError::Validation("profile id cannot be empty".into()));
    }
    if profile.name.trim().is_empty() {
        return Err(FormVaultError::Validation(format!(
            "profile '{}' has an empty name",
            profile.id
        )));
    }
    Ok(())
}

/// Check every profile and that no two share an id.
pub fn validate_profiles(profiles: &[Profile]) -> Result<()> {
    let mut seen = HashSet::with_capacity(profiles.len());
    for profile in profiles {
        validate_profile(profile)?;
        if !seen.insert(profile.id.as_str()) {
            return Err(FormVaultError::Validation(format!(
                "duplicate profile id '{}'",
                profile.id
            )));
        }
    }
    Ok(())
}

/// Replace the profile with the same id, or append it.
pub fn upsert_profile(profiles: &mut Vec<Profile>, profile: Profile) {
    match profiles.iter_mut().find(|p| p.id == profile.id) {
        Some(existing) => *existing = profile,
        None => profiles.push(profile),
    }
}

/// Remove the profile with `id`.  Returns `false` if none matched.
pub fn remove_profile(profiles: &mut Vec<Profile>, id: &str) -> bool {
    let before = profiles.len();
    profiles.retain(|p| p.id != id);
    profiles.len() != before
}
