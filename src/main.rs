use application::InventoryApp;
use config::Config;
use domain::MAX_PRODUCTS;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::from_env()?;

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_filter));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    info!("Storekeeper inventory");
    info!("Database: {}", config.database_path);

    let app = InventoryApp::start(&config.database_path).await?;
    let snapshot = app.catalog_service.snapshot();

    info!(
        "Catalog holds {}/{} products{}",
        snapshot.product_count,
        MAX_PRODUCTS,
        if snapshot.is_at_max_limit {
            " (limit reached)"
        } else {
            ""
        }
    );
    for product in &snapshot.products {
        info!(
            "  #{} {} - qty {} @ {:.2} (value {:.2}), updated {}",
            product.id.unwrap_or_default(),
            product.name,
            product.quantity,
            product.price,
            product.total_value(),
            product.updated_at.format("%Y-%m-%d %H:%M:%S")
        );
    }

    Ok(())
}
