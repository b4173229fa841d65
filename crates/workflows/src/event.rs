//! Inbound events, already stripped of any transport detail.

/// Who sent the event, as reported by the messaging surface.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Profile {
    pub first_name: String,
    pub last_name: Option<String>,
    pub username: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum EventKind {
    Text(String),
    Photo { file_id: String },
    ButtonPress { callback_id: String, data: String },
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ActorEvent {
    pub actor_id: i64,
    pub profile: Profile,
    pub kind: EventKind,
}

impl ActorEvent {
    pub fn text(actor_id: i64, profile: Profile, text: impl Into<String>) -> Self {
        Self {
            actor_id,
            profile,
            kind: EventKind::Text(text.into()),
        }
    }

    pub fn photo(actor_id: i64, profile: Profile, file_id: impl Into<String>) -> Self {
        Self {
            actor_id,
            profile,
            kind: EventKind::Photo {
                file_id: file_id.into(),
            },
        }
    }

    pub fn button(
        actor_id: i64,
        profile: Profile,
        callback_id: impl Into<String>,
        data: impl Into<String>,
    ) -> Self {
        Self {
            actor_id,
            profile,
            kind: EventKind::ButtonPress {
                callback_id: callback_id.into(),
                data: data.into(),
            },
        }
    }
}
