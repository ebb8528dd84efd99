mod api;

use actix_cors::Cors;
use actix_web::{middleware::Logger, web, App, HttpServer};
use anyhow::{Context, Result};
use clap::Parser;
use rollout_core::{
    evaluator_from_config, Config, DualPathResponder, FlagMode, ThreadRandom, TracingEventSink,
};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

use crate::api::AppState;

#[derive(Parser, Debug)]
#[command(name = "server")]
#[command(about = "Rollout demo server - routes each keyed request to the old or new API by flag")]
struct Args {
    /// Optional configuration file; flags below override its values
    #[arg(long)]
    config: Option<PathBuf>,

    /// Listening port
    #[arg(long, env = "PORT")]
    port: Option<u16>,

    /// Listening address
    #[arg(long)]
    bind: Option<String>,

    /// Percentage of old-path requests that fail
    #[arg(long)]
    old_error_rate: Option<f64>,

    /// Percentage of new-path requests that fail
    #[arg(long)]
    new_error_rate: Option<f64>,

    /// Flag evaluator: static, rollout or remote
    #[arg(long)]
    flag_mode: Option<String>,

    /// Variation served in static mode
    #[arg(long)]
    serve_new: Option<bool>,

    /// Share of keys served the new path in rollout mode
    #[arg(long)]
    rollout_percent: Option<u8>,

    /// Flag service base URL in remote mode
    #[arg(long)]
    flag_url: Option<String>,

    /// Flag service credential
    #[arg(long, env = "FLAG_SDK_KEY", hide_env_values = true)]
    sdk_key: Option<String>,

    /// Flag service credential under its LaunchDarkly name; used when --sdk-key is unset
    #[arg(long, env = "LD_SDK_KEY", hide = true, hide_env_values = true)]
    ld_sdk_key: Option<String>,

    /// Reply to failures with the bare marker text instead of `{msg, error}` JSON
    #[arg(long)]
    plain_errors: bool,
}

#[actix_web::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();

    // Load configuration
    let config = load_config(&args)?;

    // Create flag evaluator and responder
    let flags = evaluator_from_config(&config.flags).context("Failed to create flag evaluator")?;
    info!("Flag evaluator: {} (flag '{}')", flags.name(), config.responder.flag_key);
    info!(
        "Error rates: old={}% new={}%",
        config.responder.old_error_rate, config.responder.new_error_rate
    );

    let responder = DualPathResponder::new(
        config.responder.clone(),
        Arc::from(flags),
        Arc::new(TracingEventSink),
        Arc::new(ThreadRandom),
    );
    let state = web::Data::new(AppState { responder });

    // Start HTTP server
    let bind = (config.server.bind.clone(), config.server.port);
    let server = HttpServer::new(move || {
        App::new()
            .wrap(Cors::permissive())
            .wrap(Logger::default())
            .app_data(state.clone())
            .configure(api::configure)
    })
    .bind(bind.clone())
    .with_context(|| format!("Failed to bind {}:{}", bind.0, bind.1))?;

    info!("Server running on {}:{}", bind.0, bind.1);
    if config.flags.mode == FlagMode::Remote && config.flags.sdk_key.is_none() {
        info!("No FLAG_SDK_KEY or LD_SDK_KEY set; remote flag requests are unauthenticated");
    }

    server.run().await.context("Server terminated with an error")?;
    Ok(())
}

fn load_config(args: &Args) -> Result<Config> {
    let mut config = match &args.config {
        Some(path) => Config::from_file(path)
            .with_context(|| format!("Failed to load config from {:?}", path))?,
        None => Config::default(),
    };

    if let Some(port) = args.port {
        config.server.port = port;
    }
    if let Some(bind) = &args.bind {
        config.server.bind = bind.clone();
    }
    if let Some(rate) = args.old_error_rate {
        config.responder.old_error_rate = rate;
    }
    if let Some(rate) = args.new_error_rate {
        config.responder.new_error_rate = rate;
    }
    if let Some(mode) = args.flag_mode.as_deref() {
        config.flags.mode = match mode {
            "static" => FlagMode::Static,
            "rollout" => FlagMode::Rollout,
            "remote" => FlagMode::Remote,
            other => anyhow::bail!(
                "Invalid flag mode: {}, must be 'static', 'rollout' or 'remote'",
                other
            ),
        };
    }
    if let Some(serve_new) = args.serve_new {
        config.flags.static_value = serve_new;
    }
    if let Some(percent) = args.rollout_percent {
        config.flags.rollout_percent = percent;
    }
    if let Some(url) = &args.flag_url {
        config.flags.remote_url = Some(url.clone());
    }
    if let Some(sdk_key) = args.sdk_key.as_ref().or(args.ld_sdk_key.as_ref()) {
        config.flags.sdk_key = Some(sdk_key.clone());
    }
    if args.plain_errors {
        config.responder.structured_errors = false;
    }

    config
        .responder
        .validate()
        .context("Invalid responder configuration")?;
    Ok(config)
}
