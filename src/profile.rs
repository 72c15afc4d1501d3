//! Artisan profile model and completeness rules.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One of the nine required profile fields, in the order they are asked.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProfileField {
    Name,
    State,
    CraftType,
    Materials,
    YearsExperience,
    SalesChannels,
    PriceRange,
    Languages,
    BrandStyle,
}

impl ProfileField {
    /// All required fields in asking order.
    pub const ALL: [ProfileField; 9] = [
        ProfileField::Name,
        ProfileField::State,
        ProfileField::CraftType,
        ProfileField::Materials,
        ProfileField::YearsExperience,
        ProfileField::SalesChannels,
        ProfileField::PriceRange,
        ProfileField::Languages,
        ProfileField::BrandStyle,
    ];

    /// Stable storage / wire key.
    pub fn key(self) -> &'static str {
        match self {
            Self::Name => "name",
            Self::State => "state",
            Self::CraftType => "craft_type",
            Self::Materials => "materials",
            Self::YearsExperience => "years_experience",
            Self::SalesChannels => "sales_channels",
            Self::PriceRange => "price_range",
            Self::Languages => "languages",
            Self::BrandStyle => "brand_style",
        }
    }

    pub fn from_key(key: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|f| f.key() == key)
    }
}

impl std::fmt::Display for ProfileField {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.key())
    }
}

/// The nine profile slots. A slot is filled only by a non-empty value.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProfileFields {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub craft_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub materials: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub years_experience: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sales_channels: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub price_range: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub languages: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub brand_style: Option<String>,
}

impl ProfileFields {
    fn slot(&self, field: ProfileField) -> &Option<String> {
        match field {
            ProfileField::Name => &self.name,
            ProfileField::State => &self.state,
            ProfileField::CraftType => &self.craft_type,
            ProfileField::Materials => &self.materials,
            ProfileField::YearsExperience => &self.years_experience,
            ProfileField::SalesChannels => &self.sales_channels,
            ProfileField::PriceRange => &self.price_range,
            ProfileField::Languages => &self.languages,
            ProfileField::BrandStyle => &self.brand_style,
        }
    }

    fn slot_mut(&mut self, field: ProfileField) -> &mut Option<String> {
        match field {
            ProfileField::Name => &mut self.name,
            ProfileField::State => &mut self.state,
            ProfileField::CraftType => &mut self.craft_type,
            ProfileField::Materials => &mut self.materials,
            ProfileField::YearsExperience => &mut self.years_experience,
            ProfileField::SalesChannels => &mut self.sales_channels,
            ProfileField::PriceRange => &mut self.price_range,
            ProfileField::Languages => &mut self.languages,
            ProfileField::BrandStyle => &mut self.brand_style,
        }
    }

    /// The value of a field, if present and non-blank.
    pub fn get(&self, field: ProfileField) -> Option<&str> {
        self.slot(field)
            .as_deref()
            .map(str::trim)
            .filter(|v| !v.is_empty())
    }

    /// Set a field. Blank values are ignored, so a set never clears a slot.
    pub fn set(&mut self, field: ProfileField, value: impl Into<String>) {
        let value = value.into();
        let trimmed = value.trim();
        if !trimmed.is_empty() {
            *self.slot_mut(field) = Some(trimmed.to_string());
        }
    }

    /// Missing fields in asking order.
    pub fn missing(&self) -> Vec<ProfileField> {
        ProfileField::ALL
            .into_iter()
            .filter(|f| self.get(*f).is_none())
            .collect()
    }

    pub fn first_missing(&self) -> Option<ProfileField> {
        ProfileField::ALL.into_iter().find(|f| self.get(*f).is_none())
    }

    pub fn is_complete(&self) -> bool {
        self.first_missing().is_none()
    }

    pub fn is_empty(&self) -> bool {
        ProfileField::ALL.into_iter().all(|f| self.get(f).is_none())
    }

    /// Last-write-wins merge of extracted updates.
    pub fn merge(&mut self, updates: &ProfileFields) {
        for field in ProfileField::ALL {
            if let Some(value) = updates.get(field) {
                self.set(field, value);
            }
        }
    }

    /// Filled fields as `key -> value`, in key order.
    pub fn to_string_map(&self) -> BTreeMap<String, String> {
        ProfileField::ALL
            .into_iter()
            .filter_map(|f| self.get(f).map(|v| (f.key().to_string(), v.to_string())))
            .collect()
    }

    /// JSON view used as prompt context.
    pub fn to_json(&self) -> serde_json::Value {
        serde_json::to_value(self.to_string_map()).unwrap_or_default()
    }
}

/// A stored artisan profile.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserProfile {
    pub user_id: String,
    pub fields: ProfileFields,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub backstory: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl UserProfile {
    pub fn is_complete(&self) -> bool {
        self.fields.is_complete()
    }

    pub fn has_backstory(&self) -> bool {
        self.backstory
            .as_deref()
            .is_some_and(|b| !b.trim().is_empty())
    }

    /// Profile fields without the backstory, as handed to prompts.
    pub fn sanitized(&self) -> serde_json::Value {
        self.fields.to_json()
    }
}
