use std::sync::Arc;

use anyhow::Context;

use onboarding_wizard::config::ServerConfig;
use onboarding_wizard::csrf::CsrfGuard;
use onboarding_wizard::store::{LibSqlBackend, RecordRepository};
use onboarding_wizard::wizard::{
    OnboardingState, StepValidator, SubmissionService, onboarding_routes,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    let config = ServerConfig::from_env().context("Invalid onboarding configuration")?;

    eprintln!("📝 Onboarding Wizard v{}", env!("CARGO_PKG_VERSION"));
    eprintln!("   Listening: http://{}", config.bind);
    eprintln!("   Database: {}", config.db_path.display());
    eprintln!(
        "   addressLine2 required: {}",
        config.policy.address_line2_required
    );

    // ── Database ─────────────────────────────────────────────────────────
    let repo: Arc<dyn RecordRepository> = Arc::new(
        LibSqlBackend::new_local(&config.db_path)
            .await
            .with_context(|| format!("Failed to open database at {}", config.db_path.display()))?,
    );

    // ── Services ─────────────────────────────────────────────────────────
    let validator = Arc::new(StepValidator::new(Arc::clone(&repo), config.policy));
    let submission = Arc::new(SubmissionService::new(
        Arc::clone(&validator),
        Arc::clone(&repo),
    ));
    let state = OnboardingState {
        validator,
        submission,
        csrf: Arc::new(CsrfGuard::new(config.session_ttl)),
    };

    // ── HTTP server ──────────────────────────────────────────────────────
    let listener = tokio::net::TcpListener::bind(config.bind)
        .await
        .with_context(|| format!("Failed to bind {}", config.bind))?;
    tracing::info!(addr = %config.bind, "Onboarding server started");

    axum::serve(listener, onboarding_routes(state))
        .with_graceful_shutdown(async {
            tokio::signal::ctrl_c().await.ok();
            tracing::info!("Shutdown signal received");
        })
        .await
        .context("Onboarding server failed")?;

    Ok(())
}
