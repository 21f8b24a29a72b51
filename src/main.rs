//! OCR Service - text recognition for scanned images and PDFs.
//!
//! `ocr-service` serves the HTTP API. `ocr-service <file> [lang,lang]`
//! processes one local file and prints the result JSON.

mod config;
mod error;
mod extractor;
mod languages;
mod normalize;
mod ocr;
mod pipeline;
mod rasterize;
mod reader_cache;
mod redaction;
mod schema;
mod server;
#[cfg(test)]
mod testing;

use anyhow::Context;
use config::{PipelineConfig, ServerConfig};
use languages::LanguageSet;
use ocr::tesseract::TesseractFactory;
use pipeline::DocumentProcessor;
use rasterize::PdftoppmRasterizer;
use reader_cache::ReaderCache;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file if present
    dotenvy::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| "ocr_service=debug,tower_http=debug".into()))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let pipeline_config = PipelineConfig::from_env()?;
    let server_config = ServerConfig::from_env()?;

    let factory = Arc::new(TesseractFactory::new(&server_config.tesseract_bin));
    let readers = Arc::new(ReaderCache::new(factory));
    let rasterizer = Arc::new(PdftoppmRasterizer::new(&server_config.pdftoppm_bin));
    let processor = Arc::new(DocumentProcessor::new(readers, rasterizer, pipeline_config));
    info!(
        "Pipeline ready: {:?}, engine available: {}",
        processor.config(),
        processor.readers().engine_available()
    );

    let mut args = std::env::args().skip(1);
    if let Some(file) = args.next() {
        let languages = LanguageSet::parse_list(args.next().as_deref());
        return run_once(processor, PathBuf::from(file), languages).await;
    }

    let app = server::router(server::AppState::new(processor.clone(), &server_config));

    // Run server
    let listener = tokio::net::TcpListener::bind(&server_config.bind_addr)
        .await
        .with_context(|| format!("Failed to bind {}", server_config.bind_addr))?;
    info!("Server listening on http://{}", server_config.bind_addr);
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    let readers = processor.readers();
    info!("Releasing {} cached readers", readers.len());
    readers.clear();

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
    }
    info!("Shutting down");
}

/// Process a single local file and print the result.
async fn run_once(
    processor: Arc<DocumentProcessor>,
    file: PathBuf,
    languages: LanguageSet,
) -> anyhow::Result<()> {
    anyhow::ensure!(file.is_file(), "No such file: {}", file.display());

    let result = tokio::task::spawn_blocking(move || processor.process(&file, &languages))
        .await
        .context("OCR task panicked")??;

    println!("{}", serde_json::to_string_pretty(&result)?);
    Ok(())
}
