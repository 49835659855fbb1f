use std::{collections::HashMap, sync::Arc, time::Duration};

use teloxide::{dispatching::Dispatcher, dptree, prelude::*};

use tokio::sync::{Mutex, OwnedMutexGuard};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use hdb_core::messaging::throttled::{ThrottleConfig, ThrottledMessenger};
use hdb_core::{
    audit::AuditLogger,
    config::Config,
    desk::{DeskSettings, TicketDesk},
    domain::UserId,
    drafts::DraftArena,
    messaging::port::MessagingPort,
    staff::StaffDirectory,
    store::StaffSource,
};
use hdb_sqlite::SqliteTicketStore;

use crate::handlers;
use crate::TelegramMessenger;

/// Drafts untouched for this long are dropped.
const DRAFT_MAX_IDLE: Duration = Duration::from_secs(6 * 3600);

#[derive(Clone)]
pub struct AppState {
    pub cfg: Arc<Config>,
    pub desk: Arc<TicketDesk>,
    pub drafts: Arc<DraftArena>,
    pub messenger: Arc<dyn MessagingPort>,
    pub chat_locks: Arc<ChatLocks>,
}

#[derive(Default)]
pub struct ChatLocks {
    inner: Mutex<HashMap<i64, Arc<Mutex<()>>>>,
}

impl ChatLocks {
    pub async fn lock_chat(&self, chat_id: i64) -> OwnedMutexGuard<()> {
        let lock = {
            let mut map = self.inner.lock().await;
            map.entry(chat_id)
                .or_insert_with(|| Arc::new(Mutex::new(())))
                .clone()
        };
        lock.lock_owned().await
    }
}

pub async fn run_polling(cfg: Arc<Config>) -> anyhow::Result<()> {
    let bot = Bot::new(cfg.bot_token.clone());

    match bot.get_me().await {
        Ok(me) => info!(username = %me.username(), "bot started"),
        Err(e) => warn!(error = %e, "get_me failed"),
    }
    info!(
        channel = cfg.notification_channel_id.0,
        database = %cfg.database_path.display(),
        "configuration loaded"
    );

    let store = Arc::new(SqliteTicketStore::new(&cfg.database_path)?);
    for &id in &cfg.seed_staff_ids {
        store.add_staff(UserId(id), "").await?;
    }
    let staff = Arc::new(StaffDirectory::init(store.clone()).await?);

    let shutdown = CancellationToken::new();
    tokio::spawn(Arc::clone(&staff).run_refresh_loop(
        cfg.staff_refresh_interval,
        cfg.schedule_poll,
        shutdown.clone(),
    ));

    // Throttling decorator in front of the raw adapter; the adapter keeps its own
    // single RetryAfter retry.
    let raw_messenger: Arc<dyn MessagingPort> = Arc::new(TelegramMessenger::new(bot.clone()));
    let messenger: Arc<dyn MessagingPort> = Arc::new(ThrottledMessenger::new(
        raw_messenger,
        ThrottleConfig::default(),
    ));

    let desk = Arc::new(TicketDesk::new(
        store.clone(),
        store,
        staff,
        messenger.clone(),
        AuditLogger::new(cfg.audit_log_path.clone(), cfg.audit_log_json),
        DeskSettings::from(&*cfg),
    ));

    let drafts = Arc::new(DraftArena::new());
    tokio::spawn(prune_drafts(
        Arc::clone(&drafts),
        cfg.schedule_poll,
        shutdown.clone(),
    ));

    let state = Arc::new(AppState {
        cfg,
        desk,
        drafts,
        messenger,
        chat_locks: Arc::new(ChatLocks::default()),
    });

    let handler = dptree::entry()
        .branch(Update::filter_callback_query().endpoint(handlers::handle_callback))
        .branch(Update::filter_message().endpoint(handlers::handle_message));

    Dispatcher::builder(bot, handler)
        .dependencies(dptree::deps![state])
        .build()
        .dispatch()
        .await;

    shutdown.cancel();
    info!("bot stopped");
    Ok(())
}

async fn prune_drafts(drafts: Arc<DraftArena>, every: Duration, cancel: CancellationToken) {
    let mut tick = tokio::time::interval(every);
    loop {
        tokio::select! {
            _ = cancel.cancelled() => return,
            _ = tick.tick() => {
                let dropped = drafts.prune_idle(DRAFT_MAX_IDLE).await;
                if dropped > 0 {
                    info!(dropped, "idle drafts dropped");
                }
            }
        }
    }
}
