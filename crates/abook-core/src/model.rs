use std::collections::BTreeSet;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::ValidationError;

const PROVISIONAL_PREFIX: &str = "tmp-";

/// Stable identifier of a person.
///
/// Remote-assigned ids are decimal strings. Entities created locally carry a
/// provisional `tmp-<uuid>` id until the remote confirms them.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PersonId(String);

impl PersonId {
    pub fn new(id: impl Into<String>) -> Self {
        PersonId(id.into())
    }

    /// Generate a fresh provisional id for a not-yet-confirmed entity.
    pub fn provisional() -> Self {
        PersonId(format!("{}{}", PROVISIONAL_PREFIX, uuid::Uuid::new_v4()))
    }

    pub fn from_remote(id: u64) -> Self {
        PersonId(id.to_string())
    }

    pub fn is_provisional(&self) -> bool {
        self.0.starts_with(PROVISIONAL_PREFIX)
    }

    /// The numeric remote id, if this id was assigned by the remote.
    pub fn remote_id(&self) -> Option<u64> {
        self.0.parse().ok()
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PersonId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A named label, unique by name within a collection.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Tag {
    pub name: String,
}

impl Tag {
    pub fn new(name: impl Into<String>) -> Result<Self, ValidationError> {
        let name = name.into();
        validate_tag(&name)?;
        Ok(Tag { name })
    }
}

/// The validated field set of a person, without identity.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct PersonData {
    pub name: String,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub address: Option<String>,
    #[serde(default)]
    pub tags: BTreeSet<String>,
}

impl PersonData {
    pub fn named(name: impl Into<String>) -> Self {
        PersonData {
            name: name.into(),
            ..Default::default()
        }
    }

    /// Convert back to the editable form, e.g. to prefill an edit prompt.
    pub fn to_input(&self) -> PersonInput {
        PersonInput {
            name: self.name.clone(),
            phone: self.phone.clone().unwrap_or_default(),
            email: self.email.clone().unwrap_or_default(),
            address: self.address.clone().unwrap_or_default(),
            tags: self.tags.iter().cloned().collect(),
        }
    }
}

/// A person record as the local book sees it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Person {
    pub id: PersonId,
    pub data: PersonData,
    /// Remote modification time of the state this record reflects. `None`
    /// for records the remote has never confirmed.
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
}

impl Person {
    pub fn new(id: PersonId, data: PersonData) -> Self {
        Person {
            id,
            data,
            updated_at: None,
        }
    }

    pub fn name(&self) -> &str {
        &self.data.name
    }
}

/// Raw, unvalidated answer to an input prompt. Empty strings mean "not set".
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct PersonInput {
    pub name: String,
    #[serde(default)]
    pub phone: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub address: String,
    #[serde(default)]
    pub tags: Vec<String>,
}

impl PersonInput {
    pub fn named(name: impl Into<String>) -> Self {
        PersonInput {
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn with_phone(mut self, phone: impl Into<String>) -> Self {
        self.phone = phone.into();
        self
    }

    pub fn with_email(mut self, email: impl Into<String>) -> Self {
        self.email = email.into();
        self
    }

    pub fn with_address(mut self, address: impl Into<String>) -> Self {
        self.address = address.into();
        self
    }

    pub fn with_tag(mut self, tag: impl Into<String>) -> Self {
        self.tags.push(tag.into());
        self
    }

    /// Check every field and produce the validated payload.
    pub fn validate(&self) -> Result<PersonData, ValidationError> {
        let name = self.name.trim();
        if name.is_empty() {
            return Err(ValidationError::EmptyName);
        }
        if !name
            .chars()
            .all(|c| c.is_alphanumeric() || matches!(c, ' ' | '.' | '\'' | '-'))
        {
            return Err(ValidationError::InvalidName(name.to_string()));
        }

        let phone = optional(&self.phone);
        if let Some(phone) = &phone {
            let digits = phone.chars().filter(|c| c.is_ascii_digit()).count();
            let allowed = phone
                .chars()
                .all(|c| c.is_ascii_digit() || matches!(c, ' ' | '+' | '-'));
            if digits < 3 || !allowed {
                return Err(ValidationError::InvalidPhone(phone.clone()));
            }
        }

        let email = optional(&self.email);
        if let Some(email) = &email {
            if !is_plausible_email(email) {
                return Err(ValidationError::InvalidEmail(email.clone()));
            }
        }

        let address = if self.address.is_empty() {
            None
        } else if self.address.trim().is_empty() {
            return Err(ValidationError::BlankAddress);
        } else {
            Some(self.address.trim().to_string())
        };

        let mut tags = BTreeSet::new();
        for tag in &self.tags {
            let tag = tag.trim();
            validate_tag(tag)?;
            tags.insert(tag.to_string());
        }

        Ok(PersonData {
            name: name.to_string(),
            phone,
            email,
            address,
            tags,
        })
    }
}

fn optional(value: &str) -> Option<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

fn is_plausible_email(email: &str) -> bool {
    let Some((local, domain)) = email.split_once('@') else {
        return false;
    };
    !local.is_empty()
        && !domain.is_empty()
        && !domain.starts_with('.')
        && !domain.ends_with('.')
        && !email.chars().any(char::is_whitespace)
        && !domain.contains('@')
}

fn validate_tag(tag: &str) -> Result<(), ValidationError> {
    if tag.is_empty() || !tag.chars().all(char::is_alphanumeric) {
        return Err(ValidationError::InvalidTag(tag.to_string()));
    }
    Ok(())
}
