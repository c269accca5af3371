use std::sync::Arc;

use anyhow::Context;
use axum::http::{HeaderValue, Method};
use clap::Parser;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tracing_subscriber::EnvFilter;

use reflector_domain::config::{Config, CorsConfig, ObservabilityConfig};

mod bootstrap;
mod cli;
mod event_bus;
mod router;
mod state;
mod ws;

use cli::{Cli, Command};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match &cli.command {
        None | Some(Command::Serve) => {
            let config = cli::load_config(&cli.config)?;
            init_tracing(&config.observability)?;
            run_server(Arc::new(config), &cli.state_dir).await
        }
        Some(Command::Config(sub)) => {
            let config = cli::load_config(&cli.config)?;
            match sub {
                cli::ConfigCommand::Validate => {
                    if !cli::validate(&config) {
                        std::process::exit(1);
                    }
                    Ok(())
                }
                cli::ConfigCommand::Show => {
                    cli::show(&config);
                    Ok(())
                }
            }
        }
        Some(Command::Run(args)) => {
            let config = cli::load_config(&cli.config)?;
            init_tracing(&config.observability)?;
            run_once(Arc::new(config), &cli.state_dir, args).await
        }
    }
}

/// Initializes structured JSON logging, plus OTLP/gRPC trace export when
/// `observability.otlp_endpoint` is configured (spec's ambient observability
/// stack — every `tracing` span is also forwarded to a collector).
fn init_tracing(observability: &ObservabilityConfig) -> anyhow::Result<()> {
    use tracing_subscriber::layer::SubscriberExt;
    use tracing_subscriber::util::SubscriberInitExt;

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,reflector_gateway=debug"));
    let fmt_layer = tracing_subscriber::fmt::layer().json();

    match &observability.otlp_endpoint {
        None => {
            tracing_subscriber::registry().with(env_filter).with(fmt_layer).init();
        }
        Some(endpoint) => {
            use opentelemetry::trace::TracerProvider as _;
            use opentelemetry_sdk::trace::{Sampler, SdkTracerProvider};
            use opentelemetry_sdk::Resource;

            use opentelemetry_otlp::WithExportConfig;
            let exporter = opentelemetry_otlp::SpanExporter::builder()
                .with_tonic()
                .with_endpoint(endpoint)
                .build()
                .context("building OTLP span exporter")?;

            let provider = SdkTracerProvider::builder()
                .with_batch_exporter(exporter)
                .with_sampler(Sampler::TraceIdRatioBased(observability.sample_rate))
                .with_resource(
                    Resource::builder().with_service_name(observability.service_name.clone()).build(),
                )
                .build();
            let tracer = provider.tracer("reflector-gateway");
            opentelemetry::global::set_tracer_provider(provider);

            let otel_layer = tracing_opentelemetry::layer().with_tracer(tracer);
            tracing_subscriber::registry().with(env_filter).with(fmt_layer).with(otel_layer).init();
            tracing::info!(endpoint = %endpoint, "OTLP trace export enabled");
        }
    }
    Ok(())
}

async fn run_server(config: Arc<Config>, state_dir: &std::path::Path) -> anyhow::Result<()> {
    tracing::info!("reflector gateway starting");

    let app_state = bootstrap::build_app_state(config.clone(), state_dir)?;
    bootstrap::spawn_background_tasks(&app_state);

    let cors_layer = build_cors_layer(&config.server.cors);
    let max_concurrent = std::env::var("REFLECTOR_MAX_CONCURRENT_REQUESTS")
        .ok()
        .and_then(|v| v.parse::<usize>().ok())
        .unwrap_or(256);
    tracing::info!(max_concurrent, "concurrency limit set");

    let app = router::router(app_state)
        .layer(cors_layer)
        .layer(tower::limit::ConcurrencyLimitLayer::new(max_concurrent));

    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("binding to {addr}"))?;
    tracing::info!(addr = %addr, "reflector gateway listening");

    axum::serve(listener, app).await.context("axum server error")?;
    Ok(())
}

/// Trigger a single diarization workflow from local track files without
/// starting the WebSocket server, print the resulting transcript's events,
/// and exit. Useful for smoke-testing a deployment end to end.
async fn run_once(
    config: Arc<Config>,
    state_dir: &std::path::Path,
    args: &cli::RunArgs,
) -> anyhow::Result<()> {
    let app_state = bootstrap::build_app_state(config, state_dir)?;
    let ctx = &app_state.pipeline;

    let tracks: Vec<_> = args.tracks.iter().map(|t| cli::parse_track_arg(t)).collect::<anyhow::Result<_>>()?;
    let participants: Vec<_> =
        args.participants.iter().map(|p| cli::parse_participant_arg(p)).collect::<anyhow::Result<_>>()?;

    app_state.store.create(args.transcript_id.clone(), None, args.room_id.clone());

    app_state.recordings.0.lock().insert(
        args.recording_id.clone(),
        reflector_pipeline::RecordingInfo { id: args.recording_id.clone(), duration: args.duration },
    );
    app_state.participants.0.lock().insert(
        args.recording_id.clone(),
        participants
            .iter()
            .map(|p| reflector_pipeline::ParticipantInfo {
                track_index: p.track_index,
                name: p.name.clone(),
                language: p.language.clone(),
            })
            .collect(),
    );

    let mut track_inputs = Vec::with_capacity(tracks.len());
    for track in &tracks {
        let raw_key = format!("{}/raw/{}.pcm", args.recording_id, track.track_index);
        let data = std::fs::read(&track.file)
            .with_context(|| format!("reading track file {}", track.file.display()))?;
        ctx.blobs.put(&args.bucket, &raw_key, data).await?;
        track_inputs.push(reflector_pipeline::TrackInput {
            track_index: track.track_index,
            raw_key,
            start_offset: track.start_offset,
        });
    }

    tracing::info!(
        transcript_id = %args.transcript_id,
        recording_id = %args.recording_id,
        tracks = track_inputs.len(),
        participants = participants.len(),
        "triggering diarization workflow"
    );

    let run_id = reflector_pipeline::start_workflow(
        ctx,
        reflector_pipeline::WorkflowInput {
            transcript_id: args.transcript_id.clone(),
            recording_id: args.recording_id.clone(),
            bucket: args.bucket.clone(),
            tracks: track_inputs,
            room_id: args.room_id.clone(),
            meeting_id: args.meeting_id.clone(),
            source_language: None,
            target_language: None,
        },
    )
    .await?;
    tracing::info!(run_id = %run_id, "workflow finished");

    let transcript = app_state
        .store
        .get_by_id(&args.transcript_id)
        .context("transcript vanished after workflow completion")?;
    println!("{}", serde_json::to_string_pretty(&transcript)?);
    Ok(())
}

/// Build a [`CorsLayer`] from the configured allowed origins, with a
/// trailing `:*` wildcard expanded into a host-prefix predicate.
fn build_cors_layer(cors: &CorsConfig) -> CorsLayer {
    use axum::http::header;

    if cors.allowed_origins.len() == 1 && cors.allowed_origins[0] == "*" {
        tracing::warn!("CORS configured with wildcard \"*\" — all origins allowed");
        return CorsLayer::new()
            .allow_origin(tower_http::cors::Any)
            .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
            .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION]);
    }

    let mut exact: Vec<HeaderValue> = Vec::new();
    let mut wildcard_prefixes: Vec<String> = Vec::new();

    for origin in &cors.allowed_origins {
        if origin.ends_with(":*") {
            wildcard_prefixes.push(origin.trim_end_matches('*').to_owned());
        } else if let Ok(hv) = origin.parse::<HeaderValue>() {
            exact.push(hv);
        } else {
            tracing::warn!(origin = %origin, "invalid CORS origin, skipping");
        }
    }

    let allow_origin = if wildcard_prefixes.is_empty() {
        AllowOrigin::list(exact)
    } else {
        AllowOrigin::predicate(move |origin, _| {
            let origin_str = origin.to_str().unwrap_or("");
            if exact.iter().any(|e| e.as_bytes() == origin.as_bytes()) {
                return true;
            }
            wildcard_prefixes.iter().any(|prefix| origin_str.starts_with(prefix.as_str()))
        })
    };

    CorsLayer::new()
        .allow_origin(allow_origin)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION])
}
