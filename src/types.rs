//! Core types for Usercast

use serde::{Deserialize, Serialize};

/// Unique identifier for a user, assigned by the directory API
pub type UserId = i64;

/// A registered user as listed by the directory API
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    /// Unique identifier
    pub id: UserId,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    /// Date of birth as submitted (ISO `YYYY-MM-DD` from the form)
    pub date_of_birth: String,
    /// When the backend confirmed downstream sync (absent until then)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub synced_at: Option<String>,
}

impl User {
    /// Record a sync confirmation.
    ///
    /// An absent timestamp never clears an existing one. Returns true if the
    /// record changed.
    pub fn record_sync(&mut self, synced_at: Option<&str>) -> bool {
        match synced_at {
            Some(ts) if self.synced_at.as_deref() != Some(ts) => {
                self.synced_at = Some(ts.to_string());
                true
            }
            _ => false,
        }
    }

    /// Fold a repeated announcement of the same user into this record.
    ///
    /// Attributes are taken from `incoming`; `synced_at` only moves forward.
    /// Returns true if the record changed.
    pub fn coalesce(&mut self, incoming: User) -> bool {
        debug_assert_eq!(self.id, incoming.id);
        let User {
            first_name,
            last_name,
            email,
            date_of_birth,
            synced_at,
            ..
        } = incoming;

        let mut changed = false;
        for (field, value) in [
            (&mut self.first_name, first_name),
            (&mut self.last_name, last_name),
            (&mut self.email, email),
            (&mut self.date_of_birth, date_of_birth),
        ] {
            if *field != value {
                *field = value;
                changed = true;
            }
        }
        self.record_sync(synced_at.as_deref()) || changed
    }

    /// Display name used in logs and the CLI
    pub fn full_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name)
    }
}

/// Sort order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum SortOrder {
    #[default]
    Asc,
    Desc,
}

impl SortOrder {
    pub fn as_str(&self) -> &'static str {
        match self {
            SortOrder::Asc => "asc",
            SortOrder::Desc => "desc",
        }
    }

    /// The opposite direction (header click toggling)
    pub fn toggled(self) -> Self {
        match self {
            SortOrder::Asc => SortOrder::Desc,
            SortOrder::Desc => SortOrder::Asc,
        }
    }
}

impl std::str::FromStr for SortOrder {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "asc" => Ok(SortOrder::Asc),
            "desc" => Ok(SortOrder::Desc),
            _ => Err(format!("Unknown sort order: {}", s)),
        }
    }
}
