use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{Duration, Utc};
use sea_orm::Database;

use engine::{AccountStatus, Engine, EntryStatus, ErrorClass, Kwh, NewAccount};
use migration::MigratorTrait;
use workflows::{
    ActorEvent, DispatchOutcome, Dispatcher, Document, Keyboard, ManualClock, Messenger,
    MessengerError, OutboundMessage, Profile, RechargeStep, Workflow, WorkflowKind,
    WorkflowSettings,
};

const ADMIN: i64 = 1;
const ADMIN_CHAT: i64 = -100;
const HOLDER: i64 = 2;
const OTHER: i64 = 3;

#[derive(Debug, Clone)]
enum Sent {
    Text(i64, OutboundMessage),
    Document(i64, Document),
    Photo(i64, String),
    Ack(String, Option<String>),
}

#[derive(Default)]
struct RecordingMessenger {
    sent: Mutex<Vec<Sent>>,
}

impl RecordingMessenger {
    fn push(&self, sent: Sent) {
        self.sent.lock().unwrap().push(sent);
    }

    fn texts_to(&self, chat_id: i64) -> Vec<OutboundMessage> {
        self.sent
            .lock()
            .unwrap()
            .iter()
            .filter_map(|sent| match sent {
                Sent::Text(to, message) if *to == chat_id => Some(message.clone()),
                _ => None,
            })
            .collect()
    }

    fn last_text_to(&self, chat_id: i64) -> String {
        self.texts_to(chat_id)
            .last()
            .map(|message| message.text.clone())
            .unwrap_or_default()
    }

    fn acks(&self) -> Vec<Option<String>> {
        self.sent
            .lock()
            .unwrap()
            .iter()
            .filter_map(|sent| match sent {
                Sent::Ack(_, text) => Some(text.clone()),
                _ => None,
            })
            .collect()
    }

    fn documents(&self) -> Vec<Document> {
        self.sent
            .lock()
            .unwrap()
            .iter()
            .filter_map(|sent| match sent {
                Sent::Document(_, document) => Some(document.clone()),
                _ => None,
            })
            .collect()
    }

    fn photos(&self) -> usize {
        self.sent
            .lock()
            .unwrap()
            .iter()
            .filter(|sent| matches!(sent, Sent::Photo(..)))
            .count()
    }
}

#[async_trait]
impl Messenger for RecordingMessenger {
    async fn send_text(
        &self,
        chat_id: i64,
        message: OutboundMessage,
    ) -> Result<(), MessengerError> {
        self.push(Sent::Text(chat_id, message));
        Ok(())
    }

    async fn send_document(&self, chat_id: i64, document: Document) -> Result<(), MessengerError> {
        self.push(Sent::Document(chat_id, document));
        Ok(())
    }

    async fn send_photo(
        &self,
        chat_id: i64,
        file_id: &str,
        _caption: Option<&str>,
    ) -> Result<(), MessengerError> {
        self.push(Sent::Photo(chat_id, file_id.to_string()));
        Ok(())
    }

    async fn answer_button(
        &self,
        callback_id: &str,
        text: Option<&str>,
    ) -> Result<(), MessengerError> {
        self.push(Sent::Ack(callback_id.to_string(), text.map(str::to_string)));
        Ok(())
    }
}

struct Harness {
    dispatcher: Dispatcher,
    messenger: Arc<RecordingMessenger>,
    clock: Arc<ManualClock>,
}

impl Harness {
    async fn new() -> Self {
        let db = Database::connect("sqlite::memory:").await.unwrap();
        migration::Migrator::up(&db, None).await.unwrap();
        let engine = Engine::builder().database(db).build().await.unwrap();
        engine.ensure_admin(ADMIN, "Admin", Utc::now()).await.unwrap();

        let messenger = Arc::new(RecordingMessenger::default());
        let clock = Arc::new(ManualClock::new(Utc::now()));
        let dispatcher = Dispatcher::builder()
            .engine(Arc::new(engine))
            .messenger(messenger.clone())
            .clock(clock.clone())
            .settings(WorkflowSettings {
                admin_chat_id: Some(ADMIN_CHAT),
                ..Default::default()
            })
            .build()
            .unwrap();
        Self {
            dispatcher,
            messenger,
            clock,
        }
    }

    /// Registers, activates and charges an account.
    async fn active_account(&self, id: i64, balance: Kwh) {
        let engine = self.dispatcher.engine();
        engine
            .register_account(
                NewAccount {
                    id,
                    first_name: format!("User{id}"),
                    card_id: format!("CARD{id}"),
                    ..Default::default()
                },
                Utc::now(),
            )
            .await
            .unwrap();
        engine
            .set_account_status(id, AccountStatus::Active)
            .await
            .unwrap();
        if balance.is_positive() {
            engine.apply_charge(id, balance, ADMIN, None).await.unwrap();
        }
    }

    async fn text(&self, actor_id: i64, text: &str) -> DispatchOutcome {
        self.dispatcher
            .dispatch(ActorEvent::text(actor_id, profile(actor_id), text))
            .await
    }

    async fn press(&self, actor_id: i64, data: &str) -> DispatchOutcome {
        self.dispatcher
            .dispatch(ActorEvent::button(
                actor_id,
                profile(actor_id),
                format!("cb-{data}"),
                data,
            ))
            .await
    }

    async fn balance(&self, id: i64) -> Kwh {
        self.dispatcher.engine().account(id).await.unwrap().balance
    }

    async fn workflow(&self, actor_id: i64, kind: WorkflowKind) -> Option<Workflow> {
        self.dispatcher
            .registry()
            .workflow(actor_id, kind, self.clock_now())
            .await
    }

    fn clock_now(&self) -> chrono::DateTime<Utc> {
        use workflows::Clock;
        self.clock.now()
    }
}

fn profile(actor_id: i64) -> Profile {
    Profile {
        first_name: format!("User{actor_id}"),
        ..Default::default()
    }
}

#[tokio::test]
async fn recharge_confirmation_after_idle_timeout_is_refused() {
    let h = Harness::new().await;
    h.active_account(HOLDER, Kwh::whole(40)).await;

    assert_eq!(
        h.text(ADMIN, &format!("/admin_ricarica {HOLDER}")).await,
        DispatchOutcome::Command
    );
    assert_eq!(
        h.text(ADMIN, "10").await,
        DispatchOutcome::Workflow(WorkflowKind::Recharge)
    );

    h.clock.advance(Duration::minutes(40));
    assert_eq!(h.dispatcher.reap_idle_slots().await, 1);

    let outcome = h.press(ADMIN, &format!("confirm_recharge_{ADMIN}")).await;
    assert_eq!(outcome, DispatchOutcome::Failed(ErrorClass::State));
    assert_eq!(h.balance(HOLDER).await, Kwh::whole(40));
    assert_eq!(
        h.messenger.acks().last().cloned().flatten().as_deref(),
        Some("Nessuna ricarica in attesa di conferma.")
    );
}

#[tokio::test]
async fn expired_slot_is_refused_even_before_the_sweep() {
    let h = Harness::new().await;
    h.active_account(HOLDER, Kwh::whole(40)).await;

    h.text(ADMIN, &format!("/admin_ricarica {HOLDER}")).await;
    h.text(ADMIN, "10").await;
    h.clock.advance(Duration::minutes(31));

    let outcome = h.press(ADMIN, &format!("confirm_recharge_{ADMIN}")).await;
    assert_eq!(outcome, DispatchOutcome::Failed(ErrorClass::State));
    assert_eq!(h.balance(HOLDER).await, Kwh::whole(40));
}

#[tokio::test]
async fn recharge_confirm_uses_the_live_balance() {
    let h = Harness::new().await;
    h.active_account(HOLDER, Kwh::whole(40)).await;

    h.text(ADMIN, &format!("/admin_ricarica {HOLDER}")).await;
    h.text(ADMIN, "10").await;
    assert!(h.messenger.last_text_to(ADMIN).contains("Nuovo saldo: 50.00 kWh"));

    // Another recharge lands while the admin is looking at the summary.
    h.dispatcher
        .engine()
        .apply_charge(HOLDER, Kwh::whole(5), ADMIN, None)
        .await
        .unwrap();

    let outcome = h.press(ADMIN, &format!("confirm_recharge_{ADMIN}")).await;
    assert_eq!(outcome, DispatchOutcome::Button);
    assert_eq!(h.balance(HOLDER).await, Kwh::whole(55));
    assert!(h.workflow(ADMIN, WorkflowKind::Recharge).await.is_none());
    assert!(h.messenger.last_text_to(HOLDER).starts_with("🎉 Ricarica effettuata!"));
    assert_eq!(
        h.messenger.acks().last().cloned().flatten().as_deref(),
        Some("Ricarica confermata!")
    );
}

#[tokio::test]
async fn confirm_with_another_admins_id_is_refused() {
    let h = Harness::new().await;
    h.active_account(HOLDER, Kwh::whole(40)).await;

    h.text(ADMIN, &format!("/admin_ricarica {HOLDER}")).await;
    h.text(ADMIN, "10").await;

    let outcome = h.press(ADMIN, "confirm_recharge_99").await;
    assert_eq!(outcome, DispatchOutcome::Failed(ErrorClass::State));
    assert_eq!(h.balance(HOLDER).await, Kwh::whole(40));
    assert!(h.workflow(ADMIN, WorkflowKind::Recharge).await.is_some());
}

#[tokio::test]
async fn cancel_recharge_button_drops_the_slot() {
    let h = Harness::new().await;
    h.active_account(HOLDER, Kwh::whole(40)).await;

    h.text(ADMIN, &format!("/admin_ricarica {HOLDER}")).await;
    h.text(ADMIN, "10").await;
    assert_eq!(
        h.press(ADMIN, &format!("cancel_recharge_{ADMIN}")).await,
        DispatchOutcome::Button
    );
    assert!(h.workflow(ADMIN, WorkflowKind::Recharge).await.is_none());
    assert_eq!(h.balance(HOLDER).await, Kwh::whole(40));
}

#[tokio::test]
async fn second_recharge_start_overwrites_the_first() {
    let h = Harness::new().await;
    h.active_account(HOLDER, Kwh::whole(40)).await;
    h.active_account(OTHER, Kwh::whole(10)).await;

    h.text(ADMIN, &format!("/admin_ricarica {HOLDER}")).await;
    h.text(ADMIN, &format!("/admin_ricarica tessera:CARD{OTHER}")).await;

    match h.workflow(ADMIN, WorkflowKind::Recharge).await {
        Some(Workflow::Recharge(RechargeStep::WaitingForAmount { target })) => {
            assert_eq!(target.account_id, OTHER);
        }
        other => panic!("unexpected slot: {other:?}"),
    }
    assert_eq!(h.dispatcher.registry().live_slots(ADMIN, h.clock_now()).await, 1);
}

#[tokio::test]
async fn recharge_of_a_blocked_account_is_refused() {
    let h = Harness::new().await;
    h.active_account(HOLDER, Kwh::whole(40)).await;
    h.dispatcher
        .engine()
        .set_account_status(HOLDER, AccountStatus::Blocked)
        .await
        .unwrap();

    let outcome = h.text(ADMIN, &format!("/admin_ricarica {HOLDER}")).await;
    assert_eq!(outcome, DispatchOutcome::Failed(ErrorClass::Validation));
    assert!(h.workflow(ADMIN, WorkflowKind::Recharge).await.is_none());
}

#[tokio::test]
async fn malformed_amount_keeps_the_slot() {
    let h = Harness::new().await;
    h.active_account(HOLDER, Kwh::whole(40)).await;

    h.text(ADMIN, &format!("/admin_ricarica {HOLDER}")).await;
    for input in ["abc", "-5", "0", "12.345", "20000"] {
        assert_eq!(
            h.text(ADMIN, input).await,
            DispatchOutcome::Failed(ErrorClass::Validation),
            "{input}"
        );
    }
    assert!(matches!(
        h.workflow(ADMIN, WorkflowKind::Recharge).await,
        Some(Workflow::Recharge(RechargeStep::WaitingForAmount { .. }))
    ));
    assert!(
        h.messenger
            .last_text_to(ADMIN)
            .starts_with("⚠️ Inserisci un valore numerico positivo valido")
    );
}

#[tokio::test]
async fn failed_step_does_not_refresh_the_idle_timer() {
    let h = Harness::new().await;
    h.active_account(HOLDER, Kwh::whole(40)).await;

    h.text(ADMIN, &format!("/admin_ricarica {HOLDER}")).await;
    h.clock.advance(Duration::minutes(20));
    assert_eq!(
        h.text(ADMIN, "abc").await,
        DispatchOutcome::Failed(ErrorClass::Validation)
    );

    // 35 minutes after the last successful step.
    h.clock.advance(Duration::minutes(15));
    assert!(h.workflow(ADMIN, WorkflowKind::Recharge).await.is_none());
}

#[tokio::test]
async fn successful_step_refreshes_the_idle_timer() {
    let h = Harness::new().await;
    h.active_account(HOLDER, Kwh::whole(40)).await;

    h.text(ADMIN, &format!("/admin_ricarica {HOLDER}")).await;
    h.clock.advance(Duration::minutes(20));
    assert_eq!(
        h.text(ADMIN, "10").await,
        DispatchOutcome::Workflow(WorkflowKind::Recharge)
    );

    h.clock.advance(Duration::minutes(15));
    assert!(h.workflow(ADMIN, WorkflowKind::Recharge).await.is_some());
}

#[tokio::test]
async fn cancel_clears_every_slot_and_reports_it() {
    let h = Harness::new().await;
    h.active_account(HOLDER, Kwh::whole(40)).await;

    h.text(ADMIN, "/admin_crea_invito").await;
    h.text(ADMIN, "/admin_saldi_bassi").await;
    assert_eq!(h.dispatcher.registry().live_slots(ADMIN, h.clock_now()).await, 2);

    assert_eq!(h.text(ADMIN, "/annulla").await, DispatchOutcome::Command);
    assert_eq!(h.dispatcher.registry().live_slots(ADMIN, h.clock_now()).await, 0);
    let last = h.messenger.texts_to(ADMIN).pop().unwrap();
    assert_eq!(last.text, "🚫 Operazione corrente annullata.");
    assert_eq!(last.keyboard, Keyboard::Remove);

    h.text(ADMIN, "/annulla").await;
    assert_eq!(
        h.messenger.last_text_to(ADMIN),
        "ℹ️ Non ci sono operazioni in corso da annullare."
    );
}

#[tokio::test]
async fn cancel_label_only_ends_the_receiving_slot() {
    let h = Harness::new().await;
    h.active_account(HOLDER, Kwh::whole(40)).await;

    h.text(ADMIN, "/admin_saldi_bassi").await;
    h.text(ADMIN, &format!("/admin_ricarica {HOLDER}")).await;

    assert_eq!(
        h.text(ADMIN, "❌ Annulla").await,
        DispatchOutcome::Workflow(WorkflowKind::Recharge)
    );
    assert!(h.workflow(ADMIN, WorkflowKind::Recharge).await.is_none());
    assert!(h.workflow(ADMIN, WorkflowKind::LowBalanceSearch).await.is_some());
}

#[tokio::test]
async fn free_text_goes_to_the_highest_priority_slot() {
    let h = Harness::new().await;
    h.active_account(HOLDER, Kwh::whole(40)).await;

    h.text(ADMIN, "/admin_saldi_bassi").await;
    h.text(ADMIN, &format!("/admin_ricarica {HOLDER}")).await;

    assert_eq!(
        h.text(ADMIN, "15").await,
        DispatchOutcome::Workflow(WorkflowKind::Recharge)
    );
    assert!(matches!(
        h.workflow(ADMIN, WorkflowKind::LowBalanceSearch).await,
        Some(Workflow::LowBalanceSearch(_))
    ));
}

#[tokio::test]
async fn text_without_a_slot_gets_the_generic_reply() {
    let h = Harness::new().await;
    h.active_account(HOLDER, Kwh::whole(40)).await;

    assert_eq!(h.text(HOLDER, "ciao").await, DispatchOutcome::Unrecognized);
    assert!(h.messenger.last_text_to(HOLDER).starts_with("Comando non riconosciuto"));
}

#[tokio::test]
async fn admin_commands_are_refused_to_holders() {
    let h = Harness::new().await;
    h.active_account(HOLDER, Kwh::whole(40)).await;

    assert_eq!(
        h.text(HOLDER, "/admin_stats").await,
        DispatchOutcome::Failed(ErrorClass::AccountStatus)
    );
    assert!(h.messenger.last_text_to(HOLDER).starts_with("⛔ Accesso negato"));
}

#[tokio::test]
async fn usage_request_then_approval_by_button() {
    let h = Harness::new().await;
    h.active_account(HOLDER, Kwh::whole(40)).await;

    h.text(HOLDER, "/registra_utilizzo").await;
    h.text(HOLDER, "12,5").await;
    assert_eq!(
        h.dispatcher
            .dispatch(ActorEvent::photo(HOLDER, profile(HOLDER), "photo-1"))
            .await,
        DispatchOutcome::Workflow(WorkflowKind::UsageRegistration)
    );
    h.text(HOLDER, "Nessuna nota").await;

    let pending = h.dispatcher.engine().pending_usages().await.unwrap();
    assert_eq!(pending.len(), 1);
    let entry = &pending[0];
    assert_eq!(entry.amount, Kwh::new(12_50));
    assert_eq!(entry.notes, None);
    assert_eq!(h.balance(HOLDER).await, Kwh::whole(40));
    assert_eq!(h.messenger.photos(), 1);
    assert!(h.messenger.last_text_to(ADMIN_CHAT).contains("Vuoi approvare questo utilizzo?"));

    let approve = format!("approve_usage:{}", entry.id);
    assert_eq!(h.press(ADMIN, &approve).await, DispatchOutcome::Button);
    assert_eq!(h.balance(HOLDER).await, Kwh::new(27_50));
    let approved = h.dispatcher.engine().entry(entry.id).await.unwrap();
    assert_eq!(approved.status, EntryStatus::Approved);
    assert_eq!(approved.processed_by, Some(ADMIN));

    // Second press on the same prompt.
    assert_eq!(
        h.press(ADMIN, &approve).await,
        DispatchOutcome::Failed(ErrorClass::State)
    );
    assert_eq!(h.balance(HOLDER).await, Kwh::new(27_50));
    assert_eq!(
        h.messenger.acks().last().cloned().flatten().as_deref(),
        Some("Transazione non valida o già processata")
    );
}

#[tokio::test]
async fn rejected_usage_leaves_the_balance() {
    let h = Harness::new().await;
    h.active_account(HOLDER, Kwh::whole(40)).await;

    h.text(HOLDER, "/registra_utilizzo").await;
    h.text(HOLDER, "10").await;
    h.dispatcher
        .dispatch(ActorEvent::photo(HOLDER, profile(HOLDER), "photo-1"))
        .await;
    h.text(HOLDER, "ricarica auto").await;

    let entry = h.dispatcher.engine().pending_usages().await.unwrap().remove(0);
    assert_eq!(entry.notes.as_deref(), Some("ricarica auto"));
    assert_eq!(
        h.press(ADMIN, &format!("reject_usage:{}", entry.id)).await,
        DispatchOutcome::Button
    );
    assert_eq!(h.balance(HOLDER).await, Kwh::whole(40));
    assert!(h.messenger.last_text_to(HOLDER).contains("(invariato)"));
}

#[tokio::test]
async fn rejection_notice_reports_the_live_balance() {
    let h = Harness::new().await;
    h.active_account(HOLDER, Kwh::whole(40)).await;

    h.text(HOLDER, "/registra_utilizzo").await;
    h.text(HOLDER, "10").await;
    h.dispatcher
        .dispatch(ActorEvent::photo(HOLDER, profile(HOLDER), "photo-1"))
        .await;
    h.text(HOLDER, "Nessuna nota").await;
    let entry = h.dispatcher.engine().pending_usages().await.unwrap().remove(0);

    // A recharge lands while the request waits.
    h.dispatcher
        .engine()
        .apply_charge(HOLDER, Kwh::whole(15), ADMIN, None)
        .await
        .unwrap();

    assert_eq!(
        h.press(ADMIN, &format!("reject_usage:{}", entry.id)).await,
        DispatchOutcome::Button
    );
    let notice = h.messenger.last_text_to(HOLDER);
    assert!(
        notice.contains(&format!("Saldo attuale: {} (invariato)", Kwh::whole(55))),
        "{notice}"
    );
    assert_eq!(entry.previous_balance, Kwh::whole(40));
}

#[tokio::test]
async fn usage_over_the_balance_ends_the_workflow() {
    let h = Harness::new().await;
    h.active_account(HOLDER, Kwh::whole(5)).await;

    h.text(HOLDER, "/registra_utilizzo").await;
    h.text(HOLDER, "10").await;
    h.dispatcher
        .dispatch(ActorEvent::photo(HOLDER, profile(HOLDER), "photo-1"))
        .await;
    h.text(HOLDER, "Nessuna nota").await;

    assert!(h.dispatcher.engine().pending_usages().await.unwrap().is_empty());
    assert!(h.workflow(HOLDER, WorkflowKind::UsageRegistration).await.is_none());
    assert!(h.messenger.last_text_to(HOLDER).starts_with("⚠️ Saldo insufficiente"));
}

#[tokio::test]
async fn registration_with_invite_then_admin_approval() {
    let h = Harness::new().await;
    let engine = h.dispatcher.engine();
    engine
        .create_invite("ABC123", ADMIN, None, Utc::now())
        .await
        .unwrap();
    let newcomer = 7;

    h.text(newcomer, "/start").await;
    assert_eq!(
        h.text(newcomer, "abc123").await,
        DispatchOutcome::Workflow(WorkflowKind::Registration)
    );
    h.text(newcomer, "RFID-77").await;

    let account = engine.account(newcomer).await.unwrap();
    assert_eq!(account.status, AccountStatus::Pending);
    assert_eq!(account.invite_code_used.as_deref(), Some("ABC123"));
    assert!(h.workflow(newcomer, WorkflowKind::Registration).await.is_none());

    assert_eq!(
        h.press(ADMIN, &format!("approve_registration:{newcomer}")).await,
        DispatchOutcome::Button
    );
    assert_eq!(
        engine.account(newcomer).await.unwrap().status,
        AccountStatus::Active
    );
    assert!(
        h.messenger
            .last_text_to(newcomer)
            .starts_with("🎉 La tua registrazione è stata approvata!")
    );
}

#[tokio::test]
async fn registration_rejects_an_unknown_invite() {
    let h = Harness::new().await;

    h.text(9, "/start").await;
    assert_eq!(
        h.text(9, "ZZZ999").await,
        DispatchOutcome::Failed(ErrorClass::Validation)
    );
    assert!(h.dispatcher.engine().find_account(9).await.unwrap().is_none());
    assert!(h.workflow(9, WorkflowKind::Registration).await.is_some());
}

#[tokio::test]
async fn invite_creation_stores_the_notes() {
    let h = Harness::new().await;

    h.text(ADMIN, "/admin_crea_invito").await;
    h.text(ADMIN, "per Mario").await;

    let invites = h.dispatcher.engine().invites().await.unwrap();
    assert_eq!(invites.len(), 1);
    assert_eq!(invites[0].notes.as_deref(), Some("per Mario"));
    assert!(
        h.messenger
            .last_text_to(ADMIN)
            .starts_with("✅ Codice di invito creato con successo!")
    );
}

#[tokio::test]
async fn low_balance_search_exports_csv() {
    let h = Harness::new().await;
    h.active_account(HOLDER, Kwh::whole(10)).await;
    h.active_account(OTHER, Kwh::whole(80)).await;

    h.text(ADMIN, "/admin_saldi_bassi").await;
    h.text(ADMIN, "50").await;
    assert_eq!(h.press(ADMIN, "low_balance_show_list").await, DispatchOutcome::Button);
    assert!(h.messenger.last_text_to(ADMIN).contains("(2 utenti trovati - Pagina 1/1)"));

    assert_eq!(h.press(ADMIN, "low_balance_csv").await, DispatchOutcome::Button);
    let documents = h.messenger.documents();
    assert_eq!(documents.len(), 1);
    assert!(
        documents[0]
            .file_name
            .starts_with("saldi_bassi_inferiori_50.00_kwh_")
    );
    let csv = String::from_utf8(documents[0].content.clone()).unwrap();
    assert!(csv.starts_with("ID Telegram,Nome,Cognome,Username,Tessera ID,Saldo"));
    assert!(csv.contains(&format!("{HOLDER},User{HOLDER}")));
    assert!(h.workflow(ADMIN, WorkflowKind::LowBalanceSearch).await.is_none());

    // The search is over; its buttons are stale.
    assert_eq!(
        h.press(ADMIN, "low_balance_page_0").await,
        DispatchOutcome::Failed(ErrorClass::State)
    );
}

#[tokio::test]
async fn recharge_history_pages_and_exports() {
    let h = Harness::new().await;
    h.active_account(HOLDER, Kwh::ZERO).await;
    for _ in 0..12 {
        h.dispatcher
            .engine()
            .apply_charge(HOLDER, Kwh::whole(1), ADMIN, None)
            .await
            .unwrap();
    }

    h.text(ADMIN, "/admin_ricariche").await;
    assert_eq!(
        h.text(ADMIN, "32/13/2025").await,
        DispatchOutcome::Failed(ErrorClass::Validation)
    );
    h.text(ADMIN, "oggi").await;
    assert!(
        h.messenger
            .last_text_to(ADMIN)
            .starts_with("Usa i pulsanti sotto per navigare")
    );

    assert_eq!(
        h.press(ADMIN, "recharge_history_page_1").await,
        DispatchOutcome::Button
    );
    assert!(h.messenger.last_text_to(ADMIN).contains("Pagina 2/2"));
    assert_eq!(
        h.press(ADMIN, "recharge_history_page_7").await,
        DispatchOutcome::Failed(ErrorClass::State)
    );

    assert_eq!(
        h.press(ADMIN, "recharge_history_export").await,
        DispatchOutcome::Button
    );
    let documents = h.messenger.documents();
    assert_eq!(documents.len(), 1);
    assert!(documents[0].file_name.starts_with("ricariche_oggi_"));
    let csv = String::from_utf8(documents[0].content.clone()).unwrap();
    assert_eq!(csv.lines().count(), 13);
    assert!(h.workflow(ADMIN, WorkflowKind::RechargeHistory).await.is_none());
}

#[tokio::test]
async fn pending_holder_cannot_use_the_bot() {
    let h = Harness::new().await;
    h.dispatcher
        .engine()
        .register_account(
            NewAccount {
                id: HOLDER,
                first_name: "Mario".to_string(),
                card_id: "CARD2".to_string(),
                ..Default::default()
            },
            Utc::now(),
        )
        .await
        .unwrap();

    assert_eq!(
        h.text(HOLDER, "/saldo").await,
        DispatchOutcome::Failed(ErrorClass::AccountStatus)
    );
    assert!(h.messenger.last_text_to(HOLDER).starts_with("⏳"));
}
