//! Fetch points from the classification service, summarize them and write a
//! PDF snapshot of the default view.
//!
//! Run with: RUST_LOG=info cargo run --example render_snapshot --features http

use chrono::Local;
use sugarcane_map::{
    GrowthDataClient, GrowthStage, MapView, PointCache, ServiceConfig, TtlPolicy,
};

#[tokio::main]
async fn main() -> sugarcane_map::Result<()> {
    env_logger::init();

    let config = ServiceConfig::from_env();
    println!("Service: {}", config.api_url);

    let client = GrowthDataClient::new(config.clone())?;
    let cache = PointCache::new(TtlPolicy::new(config.cache_ttl));

    let mut view = MapView::default();
    view.begin_loading();
    let result = cache.get_or_fetch(|| client.fetch_all_locations()).await;
    view.finish_loading(result);

    if let Some(message) = view.error_text() {
        eprintln!("{}", message);
        return Ok(());
    }

    let points = view.points();
    println!("\nLoaded {} points", points.len());
    for stage in GrowthStage::ALL {
        let count = points.iter().filter(|p| p.stage == stage).count();
        println!("  {:<13} {}", stage.display_name(), count);
    }

    let clusters = view.clusters();
    println!("\nClusters at zoom {}: {}", view.viewport().zoom, clusters.len());
    for group in clusters.iter().take(5) {
        println!(
            "  {} points around ({:.4}, {:.4}), mostly {}",
            group.len(),
            group.center.lat,
            group.center.lng,
            group.dominant_stage()
        );
    }

    let bins = view.hexbins();
    println!("Hex-bins: {} (max {} points per bin)", bins.bins.len(), bins.max_count);

    match client.last_update().await {
        Ok(update) => println!("Last update: {}", update.readable.unwrap_or_default()),
        Err(e) => println!("Last update unavailable: {}", e),
    }

    let snapshot = view.snapshot(Local::now().naive_local())?;
    let path = snapshot.save_in(std::path::Path::new("."))?;
    println!("\nWrote {}", path.display());

    Ok(())
}
