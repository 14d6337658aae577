use std::sync::Arc;

use tgm_core::config::Config;

#[tokio::main]
async fn main() -> Result<(), tgm_core::Error> {
    tgm_core::logging::init("tgm")?;

    let cfg = match Config::load() {
        Ok(cfg) => Arc::new(cfg),
        Err(e) => {
            tracing::error!(error = %e, "invalid configuration");
            return Err(e);
        }
    };

    tgm_telegram::router::run_polling(cfg)
        .await
        .map_err(|e| tgm_core::Error::External(format!("telegram bot failed: {e}")))?;

    Ok(())
}
