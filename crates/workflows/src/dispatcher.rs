//! Routing of actor events and the error boundary around every step.

use std::{collections::HashMap, sync::Arc};

use chrono::{DateTime, Utc};
use engine::{Account, AccountStatus, Engine, ErrorClass};
use tokio::sync::Mutex;

use crate::{
    Clock, FlowError, Messenger, OutboundMessage, SystemClock, WorkflowSettings,
    error::correlation_code,
    event::{ActorEvent, EventKind},
    parsing::{parse_action, parse_command},
    registry::{ActorSlots, WorkflowRegistry},
    ui,
    workflow::{Workflow, WorkflowKind},
};

/// Text shown on a button acknowledgement, if any.
pub(crate) type Ack = Option<String>;

/// What [`Dispatcher::dispatch`] did with an event.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DispatchOutcome {
    Command,
    Button,
    /// Handed to the live slot of this kind.
    Workflow(WorkflowKind),
    /// No command, no live slot: the generic reply was sent.
    Unrecognized,
    /// The step failed and the actor got an explanation.
    Failed(ErrorClass),
}

pub struct Dispatcher {
    pub(crate) engine: Arc<Engine>,
    pub(crate) messenger: Arc<dyn Messenger>,
    pub(crate) registry: Arc<WorkflowRegistry>,
    pub(crate) clock: Arc<dyn Clock>,
    pub(crate) settings: WorkflowSettings,
    /// Admin id -> account awaiting `/admin_conferma_eliminazione`.
    pub(crate) pending_deletions: Mutex<HashMap<i64, i64>>,
}

impl Dispatcher {
    /// Return a builder for `Dispatcher`.
    pub fn builder() -> DispatcherBuilder {
        DispatcherBuilder::default()
    }

    pub fn engine(&self) -> &Arc<Engine> {
        &self.engine
    }

    pub fn registry(&self) -> &Arc<WorkflowRegistry> {
        &self.registry
    }

    pub fn settings(&self) -> &WorkflowSettings {
        &self.settings
    }

    /// Runs one event to completion under the actor's lock.
    ///
    /// Order: button presses, then commands, then the highest-priority live
    /// slot, then the generic "unrecognized" reply. Never fails: errors are
    /// answered here.
    pub async fn dispatch(&self, event: ActorEvent) -> DispatchOutcome {
        let now = self.clock.now();
        let mut slots = self.registry.lock(event.actor_id).await;

        let (outcome, result) = self.route(&mut slots, &event, now).await;
        let callback_id = match &event.kind {
            EventKind::ButtonPress { callback_id, .. } => Some(callback_id.as_str()),
            _ => None,
        };

        match result {
            Ok(ack) => {
                if let Some(callback_id) = callback_id {
                    self.acknowledge(callback_id, ack.as_deref()).await;
                }
                outcome
            }
            Err(err) => self.report(event.actor_id, callback_id, err, now).await,
        }
    }

    /// Evicts idle slots. Meant for a recurring schedule.
    pub async fn reap_idle_slots(&self) -> usize {
        self.registry.reap_idle(self.clock.now()).await
    }

    async fn route(
        &self,
        slots: &mut ActorSlots,
        event: &ActorEvent,
        now: DateTime<Utc>,
    ) -> (DispatchOutcome, Result<Ack, FlowError>) {
        match &event.kind {
            EventKind::ButtonPress { data, .. } => {
                let result = match parse_action(data) {
                    Some(action) => self.handle_action(slots, event, action, now).await,
                    None => {
                        tracing::debug!(actor_id = event.actor_id, data, "unknown button payload");
                        Ok(Some(ui::INVALID_ENTRY.to_string()))
                    }
                };
                (DispatchOutcome::Button, result)
            }
            EventKind::Text(text) => {
                if let Some(command) = parse_command(text) {
                    let result = self.handle_command(slots, event, command, now).await;
                    return (DispatchOutcome::Command, result.map(|()| None));
                }
                self.route_to_slot(slots, event, now).await
            }
            EventKind::Photo { .. } => self.route_to_slot(slots, event, now).await,
        }
    }

    async fn route_to_slot(
        &self,
        slots: &mut ActorSlots,
        event: &ActorEvent,
        now: DateTime<Utc>,
    ) -> (DispatchOutcome, Result<Ack, FlowError>) {
        let Some(kind) = slots.first_live(now) else {
            let result = self
                .reply(event.actor_id, ui::UNRECOGNIZED)
                .await
                .map(|()| None);
            return (DispatchOutcome::Unrecognized, result);
        };
        let Some(workflow) = slots.get(kind, now).cloned() else {
            return (DispatchOutcome::Unrecognized, Ok(None));
        };
        tracing::debug!(
            actor_id = event.actor_id,
            kind = %kind,
            step = workflow.step_name(),
            "routing to workflow"
        );

        if matches!(&event.kind, EventKind::Text(text) if text.trim() == ui::CANCEL_LABEL) {
            slots.finish(kind);
            tracing::info!(actor_id = event.actor_id, kind = %kind, "workflow cancelled by actor");
            let result = self
                .send(
                    event.actor_id,
                    OutboundMessage::text(ui::WORKFLOW_CANCELLED).removing_keyboard(),
                )
                .await
                .map(|()| None);
            return (DispatchOutcome::Workflow(kind), result);
        }

        let result = match workflow {
            Workflow::Registration(step) => self.registration_step(slots, event, step, now).await,
            Workflow::UsageRegistration(step) => self.usage_step(slots, event, step, now).await,
            Workflow::Recharge(step) => self.recharge_step(slots, event, step, now).await,
            Workflow::InviteCode(step) => self.invite_step(slots, event, step, now).await,
            Workflow::LowBalanceSearch(step) => {
                self.low_balance_step(slots, event, step, now).await
            }
            Workflow::RechargeHistory(step) => {
                self.history_step(slots, event, engine::EntryKind::Charge, step, now)
                    .await
            }
            Workflow::UsageHistory(step) => {
                self.history_step(slots, event, engine::EntryKind::Usage, step, now)
                    .await
            }
        };
        // Only a step that went through counts as activity.
        if result.is_ok() {
            slots.touch(kind, now);
        }
        (DispatchOutcome::Workflow(kind), result.map(|()| None))
    }

    /// Turns a step failure into a reply. The slot is left as it was.
    async fn report(
        &self,
        actor_id: i64,
        callback_id: Option<&str>,
        err: FlowError,
        now: DateTime<Utc>,
    ) -> DispatchOutcome {
        let class = err.class();
        let text = match &err {
            FlowError::Validation(text) | FlowError::State(text) => text.clone(),
            FlowError::AccountStatus(status) => ui::status_reason(*status).to_string(),
            FlowError::Forbidden => ui::FORBIDDEN.to_string(),
            FlowError::Messenger(source) => {
                let code = correlation_code(now);
                tracing::error!(code = %code, actor_id, error = %source, "reply delivery failed");
                if let Some(callback_id) = callback_id {
                    self.acknowledge(callback_id, None).await;
                }
                return DispatchOutcome::Failed(class);
            }
            FlowError::Export(reason) => {
                let code = correlation_code(now);
                tracing::error!(code = %code, actor_id, reason = %reason, "export failed");
                ui::error_with_code(&code)
            }
            FlowError::Engine(source) if err.needs_code() => {
                let code = correlation_code(now);
                tracing::error!(code = %code, actor_id, error = %source, "step failed");
                ui::error_with_code(&code)
            }
            FlowError::Engine(source) => ui::engine_error_text(source),
        };
        tracing::debug!(actor_id, class = ?class, reason = %err, "step rejected");

        match callback_id {
            Some(callback_id) => {
                self.acknowledge(callback_id, Some(&text)).await;
                if class == ErrorClass::Persistence {
                    self.notify(actor_id, OutboundMessage::text(text)).await;
                }
            }
            None => self.notify(actor_id, OutboundMessage::text(text)).await,
        }
        DispatchOutcome::Failed(class)
    }

    /// Direct reply to the acting actor; failures surface as step errors.
    pub(crate) async fn send(
        &self,
        chat_id: i64,
        message: OutboundMessage,
    ) -> Result<(), FlowError> {
        self.messenger.send_text(chat_id, message).await?;
        Ok(())
    }

    pub(crate) async fn reply(
        &self,
        chat_id: i64,
        text: impl Into<String>,
    ) -> Result<(), FlowError> {
        self.send(chat_id, OutboundMessage::text(text)).await
    }

    /// Best-effort message to somebody else; failures are logged only.
    pub(crate) async fn notify(&self, chat_id: i64, message: OutboundMessage) {
        if let Err(err) = self.messenger.send_text(chat_id, message).await {
            tracing::warn!(chat_id, error = %err, "notification not delivered");
        }
    }

    pub(crate) async fn notify_admins(&self, message: OutboundMessage) {
        match self.settings.admin_chat_id {
            Some(chat_id) => self.notify(chat_id, message).await,
            None => tracing::info!(text = %message.text, "no admin chat configured"),
        }
    }

    async fn acknowledge(&self, callback_id: &str, text: Option<&str>) {
        if let Err(err) = self.messenger.answer_button(callback_id, text).await {
            tracing::warn!(callback_id, error = %err, "button not acknowledged");
        }
    }

    /// The actor's account, refused unless it exists and is usable.
    /// Disabled accounts may still read their data.
    pub(crate) async fn registered(
        &self,
        actor_id: i64,
        now: DateTime<Utc>,
    ) -> Result<Account, FlowError> {
        let account = self
            .engine
            .find_account(actor_id)
            .await?
            .ok_or_else(|| FlowError::State(ui::NOT_REGISTERED.to_string()))?;
        if matches!(
            account.status,
            AccountStatus::Pending | AccountStatus::Blocked
        ) {
            return Err(FlowError::AccountStatus(account.status));
        }
        self.engine.touch_last_seen(actor_id, now).await?;
        Ok(account)
    }

    pub(crate) async fn admin(
        &self,
        actor_id: i64,
        now: DateTime<Utc>,
    ) -> Result<Account, FlowError> {
        match self.engine.find_account(actor_id).await? {
            Some(account) if account.is_admin => {
                self.engine.touch_last_seen(actor_id, now).await?;
                Ok(account)
            }
            _ => Err(FlowError::Forbidden),
        }
    }
}

/// The builder for `Dispatcher`.
#[derive(Default)]
pub struct DispatcherBuilder {
    engine: Option<Arc<Engine>>,
    messenger: Option<Arc<dyn Messenger>>,
    clock: Option<Arc<dyn Clock>>,
    settings: WorkflowSettings,
}

impl DispatcherBuilder {
    pub fn engine(mut self, engine: Arc<Engine>) -> DispatcherBuilder {
        self.engine = Some(engine);
        self
    }

    pub fn messenger(mut self, messenger: Arc<dyn Messenger>) -> DispatcherBuilder {
        self.messenger = Some(messenger);
        self
    }

    /// Defaults to the system clock.
    pub fn clock(mut self, clock: Arc<dyn Clock>) -> DispatcherBuilder {
        self.clock = Some(clock);
        self
    }

    pub fn settings(mut self, settings: WorkflowSettings) -> DispatcherBuilder {
        self.settings = settings;
        self
    }

    pub fn build(self) -> Result<Dispatcher, String> {
        let engine = self.engine.ok_or("engine is required")?;
        let messenger = self.messenger.ok_or("messenger is required")?;
        Ok(Dispatcher {
            engine,
            messenger,
            registry: Arc::new(WorkflowRegistry::new(self.settings.idle_timeout)),
            clock: self.clock.unwrap_or_else(|| Arc::new(SystemClock)),
            settings: self.settings,
            pending_deletions: Mutex::new(HashMap::new()),
        })
    }
}
