use std::sync::Arc;

use hdb_core::config::Config;

#[tokio::main]
async fn main() -> Result<(), hdb_core::Error> {
    hdb_core::logging::init("hdb")?;

    let cfg = Arc::new(Config::load()?);
    tracing::info!(
        channel = cfg.notification_channel_id.0,
        staff_seeded = cfg.seed_staff_ids.len(),
        "starting housing desk bot"
    );

    hdb_telegram::router::run_polling(cfg)
        .await
        .map_err(|e| hdb_core::Error::External(format!("telegram bot failed: {e}")))?;

    Ok(())
}
