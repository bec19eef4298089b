mod app;
mod endpoints;

use anyhow::Result;
use app::App;
use launchpad_core::config::Config;

#[tokio::main]
async fn main() -> Result<()> {
    main_inner().await
}

async fn main_inner() -> Result<()> {
    let config = Config::load()?;
    config.init_tracing();

    let app = App::new(config).await?;
    let bind = app.config.http_bind;

    let mut cleanup = app.spawn_cleanup_worker();
    cleanup.start();

    let server = tokio::spawn(endpoints::launch(app, bind));

    tokio::select! {
        result = server => {
            cleanup.stop().await;
            result?
        }
        _ = shutdown_signal() => {
            tracing::info!("shutdown signal received");
            cleanup.stop().await;
            Ok(())
        }
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c().await.expect("failed to install SIGINT handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {}
        () = terminate => {}
    }
}
