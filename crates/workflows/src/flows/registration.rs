use chrono::{DateTime, Utc};
use engine::{AccountStatus, EngineError, NewAccount, sanitize_card_id, sanitize_invite_code};

use crate::{
    Button, Dispatcher, FlowError, OutboundMessage,
    event::{ActorEvent, EventKind},
    registry::ActorSlots,
    ui,
    workflow::{RegistrationStep, Workflow, WorkflowKind},
};

const WELCOME: &str = "👋 Benvenuto nel bot di gestione kWh di Nikola!\n\n";
const CARD_PROMPT: &str = "Per favore, inserisci il numero della tua tessera RFID:";

impl Dispatcher {
    pub(crate) async fn start_registration(
        &self,
        slots: &mut ActorSlots,
        actor_id: i64,
        now: DateTime<Utc>,
    ) -> Result<(), FlowError> {
        if let Some(account) = self.engine.find_account(actor_id).await? {
            let text = match account.status {
                AccountStatus::Active => format!(
                    "✅ Sei già registrato e il tuo account è attivo.\n\nTessera ID: {}\nSaldo kWh: {}\n\nUsa /help per visualizzare i comandi disponibili.",
                    ui::card_or_missing(account.card_id.as_deref()),
                    account.balance.decimal(),
                ),
                other => ui::status_reason(other).to_string(),
            };
            return self.reply(actor_id, text).await;
        }

        let (step, prompt) = if self.settings.invite_codes_enabled {
            (
                RegistrationStep::WaitingForInviteCode,
                "Per registrarti, hai bisogno di un codice di invito.\nPer favore, inserisci il tuo codice di invito:",
            )
        } else {
            (
                RegistrationStep::WaitingForCardId { invite_code: None },
                "Per registrarti, inserisci il numero della tua tessera RFID:",
            )
        };
        slots.start(Workflow::Registration(step), now);
        self.reply(actor_id, format!("{WELCOME}{prompt}")).await
    }

    pub(crate) async fn registration_step(
        &self,
        slots: &mut ActorSlots,
        event: &ActorEvent,
        step: RegistrationStep,
        now: DateTime<Utc>,
    ) -> Result<(), FlowError> {
        let EventKind::Text(input) = &event.kind else {
            return Err(FlowError::Validation(match step {
                RegistrationStep::WaitingForInviteCode => {
                    "Per favore, inserisci il tuo codice di invito:".to_string()
                }
                RegistrationStep::WaitingForCardId { .. } => CARD_PROMPT.to_string(),
            }));
        };

        match step {
            RegistrationStep::WaitingForInviteCode => {
                let code = sanitize_invite_code(input).ok_or_else(|| {
                    FlowError::Validation(
                        "❌ Formato codice di invito non valido. Deve essere di 6 caratteri alfanumerici.\nPer favore, inserisci un codice di invito valido:"
                            .to_string(),
                    )
                })?;
                let valid = self
                    .engine
                    .invite(&code)
                    .await?
                    .is_some_and(|invite| invite.is_valid(now));
                if !valid {
                    return Err(invalid_invite());
                }
                slots.advance(
                    Workflow::Registration(RegistrationStep::WaitingForCardId {
                        invite_code: Some(code),
                    }),
                    now,
                );
                self.reply(
                    event.actor_id,
                    "✅ Codice di invito valido!\n\nOra, inserisci il numero della tua tessera RFID:",
                )
                .await
            }
            RegistrationStep::WaitingForCardId { invite_code } => {
                let card_id = sanitize_card_id(input).ok_or_else(|| {
                    FlowError::Validation(
                        "❌ Formato tessera non valido. Per favore, inserisci un ID tessera valido:"
                            .to_string(),
                    )
                })?;
                let new = NewAccount {
                    id: event.actor_id,
                    first_name: event.profile.first_name.clone(),
                    last_name: event.profile.last_name.clone(),
                    username: event.profile.username.clone(),
                    card_id: card_id.clone(),
                    invite_code: invite_code.clone(),
                };
                let account = match self.engine.register_account(new, now).await {
                    Ok(account) => account,
                    Err(EngineError::ExistingKey(key)) if key.starts_with("card") => {
                        return Err(FlowError::Validation(
                            "❌ Questa tessera è già registrata.\nPer favore, inserisci un altro numero di tessera:"
                                .to_string(),
                        ));
                    }
                    Err(EngineError::InvalidInvite(_)) => {
                        // The code was consumed between the two steps.
                        slots.advance(
                            Workflow::Registration(RegistrationStep::WaitingForInviteCode),
                            now,
                        );
                        return Err(invalid_invite());
                    }
                    Err(err) => return Err(err.into()),
                };
                slots.finish(WorkflowKind::Registration);

                self.notify_admins(
                    OutboundMessage::text(format!(
                        "🔔 Nuova richiesta di registrazione\n\n👤 Nome: {}\n🆔 Telegram ID: {}\n👤 Username: {}\n💳 Tessera ID: {}\n🔑 Codice invito: {}\n\nVuoi approvare questa registrazione?",
                        account.display_name(),
                        account.id,
                        ui::username_or_unset(account.username.as_deref()),
                        card_id,
                        invite_code.as_deref().unwrap_or("Non utilizzato"),
                    ))
                    .with_inline(vec![vec![
                        Button::new("✅ Approva", format!("approve_registration:{}", account.id)),
                        Button::new("❌ Rifiuta", format!("reject_registration:{}", account.id)),
                    ]]),
                )
                .await;

                self.reply(
                    event.actor_id,
                    "✅ Registrazione completata con successo!\n\nLa tua richiesta è ora in attesa di approvazione da parte dell'amministratore.\nRiceverai una notifica quando la tua richiesta sarà elaborata.",
                )
                .await
            }
        }
    }
}

fn invalid_invite() -> FlowError {
    FlowError::Validation(
        "❌ Codice di invito non valido o scaduto.\nPer favore, inserisci un codice di invito valido:"
            .to_string(),
    )
}
