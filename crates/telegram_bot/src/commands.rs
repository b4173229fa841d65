//! Command menus published to Telegram.
//!
//! Parsing of the commands themselves happens in the conversation layer;
//! these enums only describe what the client shows in its command list.

use teloxide::{
    prelude::*,
    types::{BotCommandScope, Recipient},
    utils::command::BotCommands,
};

/// Commands every holder can use.
#[derive(BotCommands, Clone)]
#[command(rename_rule = "snake_case")]
pub enum HolderCommands {
    #[command(description = "Avvia il bot / Registrazione")]
    Start,
    #[command(description = "Mostra i comandi disponibili")]
    Help,
    #[command(description = "Visualizza il tuo saldo kWh attuale")]
    Saldo,
    #[command(description = "Visualizza la cronologia delle transazioni")]
    Cronologia,
    #[command(description = "Registra un nuovo utilizzo di kWh")]
    RegistraUtilizzo,
    #[command(description = "Visualizza il tuo profilo")]
    Profilo,
    #[command(description = "Annulla l'operazione corrente")]
    Annulla,
}

/// Extra commands shown in the admin chat.
#[derive(BotCommands, Clone)]
#[command(rename_rule = "snake_case")]
pub enum AdminCommands {
    #[command(description = "Ricarica il saldo di un utente")]
    AdminRicarica,
    #[command(description = "Crea un nuovo codice di invito")]
    AdminCreaInvito,
    #[command(description = "Visualizza i codici di invito")]
    AdminInviti,
    #[command(description = "Trova utenti con saldo basso")]
    AdminSaldiBassi,
    #[command(description = "Visualizza le ultime ricariche")]
    AdminRicariche,
    #[command(description = "Visualizza gli ultimi utilizzi kWh")]
    AdminUtilizzi,
    #[command(description = "Visualizza le statistiche del bot")]
    AdminStats,
    #[command(description = "Cerca utente per numero tessera")]
    AdminTrovaTessera,
    #[command(description = "Cerca utente per nome/username")]
    AdminTrovaUtente,
    #[command(description = "Dettaglio di un utente")]
    AdminDettaglio,
    #[command(description = "Promuovi un utente ad amministratore")]
    AdminMakeAdmin,
}

/// Sets the default menu and, when known, the admin chat menu.
pub(crate) async fn publish(bot: &Bot, admin_chat_id: Option<i64>) -> ResponseResult<()> {
    bot.set_my_commands(HolderCommands::bot_commands()).await?;
    if let Some(chat_id) = admin_chat_id {
        let mut commands = HolderCommands::bot_commands();
        commands.extend(AdminCommands::bot_commands());
        bot.set_my_commands(commands)
            .scope(BotCommandScope::Chat {
                chat_id: Recipient::Id(ChatId(chat_id)),
            })
            .await?;
    }
    tracing::info!("command menus published");
    Ok(())
}
