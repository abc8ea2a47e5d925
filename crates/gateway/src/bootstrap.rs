//! [`AppState`] construction and tracing/telemetry setup shared by every
//! CLI command and the HTTP server — `serve`, `chat`, and `run` all boot
//! through [`build_app_state`] so there is exactly one wiring path.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;

use parley_ai::LlmRouter;
use parley_confirmation::ConfirmationCoordinator;
use parley_domain::config::{Config, ConfigSeverity};
use parley_engine::Engine;
use parley_mcp::McpManager;
use parley_planner::Planner;
use parley_registry::ToolRegistry;
use parley_sessions::SessionRepository;
use parley_tools::ProcessManager;

use crate::state::AppState;

/// Validate `config`, wire up every subsystem, and return a fully-built
/// [`AppState`]. Aborts only when validation surfaces an `Error`-severity
/// issue; `Warning`s are logged and otherwise ignored.
pub async fn build_app_state(config: Arc<Config>) -> anyhow::Result<AppState> {
    let issues = config.validate();
    for issue in &issues {
        match issue.severity {
            ConfigSeverity::Warning => tracing::warn!("config: {issue}"),
            ConfigSeverity::Error => tracing::error!("config: {issue}"),
        }
    }
    if issues.iter().any(|i| i.severity == ConfigSeverity::Error) {
        anyhow::bail!(
            "config validation failed with {} error(s)",
            issues.iter().filter(|i| i.severity == ConfigSeverity::Error).count()
        );
    }

    std::fs::create_dir_all(&config.workspace.path)
        .with_context(|| format!("creating workspace dir {}", config.workspace.path.display()))?;
    std::fs::create_dir_all(&config.workspace.state_path)
        .with_context(|| format!("creating state dir {}", config.workspace.state_path.display()))?;

    let denied_commands = Arc::new(
        regex::RegexSet::new(&config.tools.exec_security.denied_patterns)
            .context("compiling tools.exec_security.denied_patterns")?,
    );
    let process_manager = Arc::new(ProcessManager::new(config.tools.exec.clone()));

    let mcp = Arc::new(
        McpManager::from_config(
            &config.mcp,
            config.tools.max_concurrency,
            Duration::from_secs(config.tools.server_timeout_seconds),
        )
        .await,
    );
    mcp.spawn_health_loop();
    tracing::info!(
        servers = config.mcp.effective_servers().len(),
        "tool server manager ready"
    );

    let registry = Arc::new(ToolRegistry::new(
        mcp.clone(),
        process_manager,
        config.workspace.path.clone(),
        denied_commands,
        Duration::from_secs(config.tools.server_timeout_seconds),
    ));

    let router = Arc::new(LlmRouter::from_config(&config.llm).context("initializing LLM router")?);
    tracing::info!(providers = router.registry().len(), "LLM router ready");

    let planner = Arc::new(Planner::new(
        router.clone(),
        registry.clone(),
        config.react.max_tasks_per_plan,
        config.react.planner_retry_attempts,
    ));

    let confirmation = Arc::new(ConfirmationCoordinator::new());

    let session_repo = Arc::new(SessionRepository::new(config.workspace.state_path.join("sessions")));

    let engine = Arc::new(Engine::new(
        router.clone(),
        registry.clone(),
        planner.clone(),
        confirmation.clone(),
        session_repo.clone(),
        config.react.clone(),
    ));

    Ok(AppState {
        config,
        llm: router,
        mcp,
        registry,
        planner,
        confirmation,
        session_repo,
        engine,
    })
}

/// Install the `tracing-subscriber` `fmt` layer (pretty on an interactive
/// TTY, JSON otherwise) and, when `observability.otlp_endpoint` is set, an
/// OpenTelemetry OTLP exporter layer alongside it.
pub fn init_tracing(config: &Config) {
    use tracing_subscriber::prelude::*;
    use tracing_subscriber::EnvFilter;

    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info,parley_gateway=debug"));
    let fmt_layer = if std::io::IsTerminal::is_terminal(&std::io::stdout()) {
        tracing_subscriber::fmt::layer().pretty().boxed()
    } else {
        tracing_subscriber::fmt::layer().json().boxed()
    };

    let registry = tracing_subscriber::registry().with(env_filter).with(fmt_layer);

    match &config.observability.otlp_endpoint {
        Some(endpoint) if !endpoint.is_empty() => {
            match build_otel_layer(endpoint, &config.observability.service_name, config.observability.sample_rate) {
                Ok(otel_layer) => {
                    registry.with(otel_layer).init();
                    tracing::info!(endpoint = %endpoint, "OpenTelemetry OTLP export enabled");
                }
                Err(e) => {
                    registry.init();
                    tracing::warn!(error = %e, "failed to initialize OpenTelemetry exporter, continuing without it");
                }
            }
        }
        _ => registry.init(),
    }
}

fn build_otel_layer(
    endpoint: &str,
    service_name: &str,
    sample_rate: f64,
) -> anyhow::Result<tracing_opentelemetry::OpenTelemetryLayer<tracing_subscriber::Registry, opentelemetry_sdk::trace::Tracer>> {
    use opentelemetry::KeyValue;
    use opentelemetry_otlp::WithExportConfig;
    use opentelemetry_sdk::trace::{Config as TraceConfig, Sampler};
    use opentelemetry_sdk::Resource;

    let tracer = opentelemetry_otlp::new_pipeline()
        .tracing()
        .with_exporter(opentelemetry_otlp::new_exporter().tonic().with_endpoint(endpoint))
        .with_trace_config(
            TraceConfig::default()
                .with_sampler(Sampler::TraceIdRatioBased(sample_rate))
                .with_resource(Resource::new(vec![KeyValue::new("service.name", service_name.to_string())])),
        )
        .install_batch(opentelemetry_sdk::runtime::Tokio)
        .context("installing OTLP tracer pipeline")?;

    Ok(tracing_opentelemetry::layer().with_tracer(tracer))
}
