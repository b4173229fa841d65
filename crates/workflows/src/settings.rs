use chrono::Duration;

/// Knobs of the conversation layer.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct WorkflowSettings {
    /// Slots idle for longer than this are evicted.
    pub idle_timeout: Duration,
    /// Period of the background sweep.
    pub reap_interval: std::time::Duration,
    /// Ask for an invite code before the card id on `/start`.
    pub invite_codes_enabled: bool,
    /// Rows per page in paginated listings.
    pub page_size: usize,
    /// Where approval prompts and admin alerts go. Without it they are only logged.
    pub admin_chat_id: Option<i64>,
}

impl Default for WorkflowSettings {
    fn default() -> Self {
        Self {
            idle_timeout: Duration::minutes(30),
            reap_interval: std::time::Duration::from_secs(60 * 60),
            invite_codes_enabled: true,
            page_size: 10,
            admin_chat_id: None,
        }
    }
}
