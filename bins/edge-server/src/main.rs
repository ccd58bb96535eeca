use split_config::EdgeConfig;
use split_core::Model;
use split_edge::Coordinator;
use split_journal::EvaluationJournal;
use split_runtime::CachedNativeRuntime;
use split_timing::TimingStore;
use split_transport::{AppState, RoutePaths, WorkerPool};
use split_variance::VarianceDetector;
use std::collections::HashMap;
use std::env;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

const DEVICE_TIMINGS_PATH: &str = "device_timings.json";
const EDGE_TIMINGS_PATH: &str = "edge_timings.json";
const LAYER_SIZES_PATH: &str = "layer_sizes.json";
const JOURNAL_PATH: &str = "evaluation_journal.bin";
const ARTEFACT_DIR: &str = "artefacts";

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("INFO")))
        .init();

    let config_path = env::args().nth(1).unwrap_or_else(|| "config.toml".to_string());
    let config = EdgeConfig::load(&config_path)?;
    config.require_supported_mode()?;

    // Per-layer activation sizes are a property of the trained model, not
    // the deployment config; loading them is out of scope for this process.
    // Sizes default to 0 here and are overwritten by `TimingStore::load`
    // below whenever a persisted `layer_sizes.json` from a previous run is
    // available.
    let entry = config.default_model_entry();
    let num_layers = entry.last_offloading_layer as usize + 1;
    let model = Model::linear_chain(&config.default_model, &vec![0u32; num_layers])?;

    let timing = match TimingStore::load(DEVICE_TIMINGS_PATH, EDGE_TIMINGS_PATH, LAYER_SIZES_PATH, num_layers)
    {
        Ok(store) => store.with_alpha(config.ewma.alpha),
        Err(_) => TimingStore::new(vec![0.0; num_layers], vec![0.0; num_layers], vec![0; num_layers])
            .with_alpha(config.ewma.alpha),
    };

    let variance = VarianceDetector::with_params(
        num_layers,
        config.variance.window_size,
        config.variance.threshold,
    );

    let journal = EvaluationJournal::open(JOURNAL_PATH)?;
    let runtime = Box::new(CachedNativeRuntime::new(&model, ARTEFACT_DIR));

    let refresh_probability =
        if config.local_inference_mode.enabled { config.local_inference_mode.probability } else { 0.0 };

    let coordinator = Arc::new(Coordinator::new(
        model,
        timing,
        variance,
        config.default_model.clone(),
        journal,
        runtime,
        refresh_probability,
        entry.last_offloading_layer,
        DEVICE_TIMINGS_PATH,
        EDGE_TIMINGS_PATH,
        LAYER_SIZES_PATH,
    ));

    let pool = Arc::new(WorkerPool::new(config.worker_pool.max_concurrent_suffix_runs));

    let mut frame_sizes = HashMap::new();
    for (name, model_entry) in &config.model {
        frame_sizes.insert(name.clone(), (model_entry.input_height, model_entry.input_width));
    }
    let default_frame_size = (entry.input_height, entry.input_width);

    let state = AppState::new(coordinator, pool, frame_sizes, default_frame_size);
    let router = split_transport::build_router(state, &RoutePaths::default());

    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!(%addr, "edge server listening");

    axum::serve(listener, router).await?;
    Ok(())
}
