use chrono::{DateTime, Duration, Utc};
use sea_orm::{ActiveValue, QueryOrder, prelude::*};

use crate::{
    EngineError, Invite, ResultEngine, invites, sanitize_invite_code,
    util::normalize_optional_text,
};

use super::Engine;

impl Engine {
    /// Stores `code` as a fresh invite expiring after `invite_expiry_days`.
    pub async fn create_invite(
        &self,
        code: &str,
        created_by: i64,
        notes: Option<&str>,
        now: DateTime<Utc>,
    ) -> ResultEngine<Invite> {
        let code = sanitize_invite_code(code)
            .ok_or_else(|| EngineError::InvalidInvite(code.to_string()))?;
        if invites::Entity::find_by_id(code.clone())
            .one(&self.database)
            .await?
            .is_some()
        {
            return Err(EngineError::ExistingKey(format!("invite {code}")));
        }
        let invite = Invite {
            code,
            created_by,
            notes: normalize_optional_text(notes),
            is_active: true,
            used_by: None,
            used_at: None,
            expires_at: now + Duration::days(self.policy.invite_expiry_days),
            created_at: now,
        };
        invites::ActiveModel::from(&invite)
            .insert(&self.database)
            .await?;
        tracing::info!(code = %invite.code, created_by, "invite created");
        Ok(invite)
    }

    pub async fn invite(&self, code: &str) -> ResultEngine<Option<Invite>> {
        Ok(invites::Entity::find_by_id(code.to_string())
            .one(&self.database)
            .await?
            .map(Invite::from))
    }

    /// All invites, newest first.
    pub async fn invites(&self) -> ResultEngine<Vec<Invite>> {
        Ok(invites::Entity::find()
            .order_by_desc(invites::Column::CreatedAt)
            .all(&self.database)
            .await?
            .into_iter()
            .map(Invite::from)
            .collect())
    }

    /// Deactivates an unused invite.
    pub async fn revoke_invite(&self, code: &str) -> ResultEngine<Invite> {
        let model = invites::Entity::find_by_id(code.to_string())
            .one(&self.database)
            .await?
            .ok_or_else(|| EngineError::KeyNotFound(format!("invite {code}")))?;
        let mut active: invites::ActiveModel = model.into();
        active.is_active = ActiveValue::Set(false);
        Ok(Invite::from(active.update(&self.database).await?))
    }
}
