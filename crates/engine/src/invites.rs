//! Single-use registration invite codes.

use chrono::{DateTime, Utc};
use sea_orm::{ActiveValue, entity::prelude::*};
use uuid::Uuid;

pub const INVITE_CODE_LEN: usize = 6;
const ALPHABET: &[u8; 36] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Invite {
    pub code: String,
    pub created_by: i64,
    pub notes: Option<String>,
    pub is_active: bool,
    pub used_by: Option<i64>,
    pub used_at: Option<DateTime<Utc>>,
    pub expires_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

impl Invite {
    /// Usable iff active, never used and not yet expired at `now`.
    pub fn is_valid(&self, now: DateTime<Utc>) -> bool {
        self.is_active && self.used_by.is_none() && self.expires_at > now
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now
    }
}

/// Random code of [`INVITE_CODE_LEN`] characters from `[A-Z0-9]`.
pub fn generate_code() -> String {
    Uuid::new_v4()
        .as_bytes()
        .iter()
        .take(INVITE_CODE_LEN)
        .map(|b| ALPHABET[usize::from(*b) % ALPHABET.len()] as char)
        .collect()
}

#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "invites")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub code: String,
    pub created_by: i64,
    pub notes: Option<String>,
    pub is_active: bool,
    pub used_by: Option<i64>,
    pub used_at: Option<DateTimeUtc>,
    pub expires_at: DateTimeUtc,
    pub created_at: DateTimeUtc,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}

impl From<&Invite> for ActiveModel {
    fn from(invite: &Invite) -> Self {
        Self {
            code: ActiveValue::Set(invite.code.clone()),
            created_by: ActiveValue::Set(invite.created_by),
            notes: ActiveValue::Set(invite.notes.clone()),
            is_active: ActiveValue::Set(invite.is_active),
            used_by: ActiveValue::Set(invite.used_by),
            used_at: ActiveValue::Set(invite.used_at),
            expires_at: ActiveValue::Set(invite.expires_at),
            created_at: ActiveValue::Set(invite.created_at),
        }
    }
}

impl From<Model> for Invite {
    fn from(model: Model) -> Self {
        Self {
            code: model.code,
            created_by: model.created_by,
            notes: model.notes,
            is_active: model.is_active,
            used_by: model.used_by,
            used_at: model.used_at,
            expires_at: model.expires_at,
            created_at: model.created_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use chrono::Duration;

    use super::*;

    fn invite(now: DateTime<Utc>) -> Invite {
        Invite {
            code: "ABC123".to_string(),
            created_by: 1,
            notes: None,
            is_active: true,
            used_by: None,
            used_at: None,
            expires_at: now + Duration::days(7),
            created_at: now,
        }
    }

    #[test]
    fn generated_codes_are_six_uppercase_alphanumerics() {
        for _ in 0..50 {
            let code = generate_code();
            assert_eq!(code.len(), INVITE_CODE_LEN);
            assert!(code.chars().all(|c| c.is_ascii_uppercase() || c.is_ascii_digit()));
        }
    }

    #[test]
    fn validity_requires_active_unused_and_unexpired() {
        let now = Utc::now();
        assert!(invite(now).is_valid(now));

        let mut used = invite(now);
        used.used_by = Some(9);
        assert!(!used.is_valid(now));

        let mut revoked = invite(now);
        revoked.is_active = false;
        assert!(!revoked.is_valid(now));

        assert!(!invite(now).is_valid(now + Duration::days(8)));
    }
}
