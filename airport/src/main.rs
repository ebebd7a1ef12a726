//! The airport server binary: parses [`FlightServerConfig`], builds a small
//! demo catalog, and serves it over Flight RPC. Embedders link `airport` as a
//! library and supply their own catalog instead of running this binary
//! directly; it exists to make the crate runnable out of the box.

use std::sync::Arc;

use airport::{serve, CatalogBuilder, FlightServerConfig};
use arrow::array::{Int64Array, StringArray};
use arrow::datatypes::{DataType, Field, Schema as ArrowSchema};
use arrow::record_batch::RecordBatch;
use clap::Parser;
use data_types::RecordBatchStream;
use observability_deps::tracing::info;

fn demo_catalog() -> Arc<dyn airport::Catalog> {
    let schema = Arc::new(ArrowSchema::new(vec![
        Field::new("id", DataType::Int64, false),
        Field::new("name", DataType::Utf8, false),
    ]));

    CatalogBuilder::new()
        .schema("public")
        .simple_table("public", "greeting", Arc::clone(&schema), move |_options| {
            let schema = Arc::clone(&schema);
            Box::pin(async move {
                let batch = RecordBatch::try_new(
                    Arc::clone(&schema),
                    vec![
                        Arc::new(Int64Array::from(vec![1, 2])),
                        Arc::new(StringArray::from(vec!["hello", "airport"])),
                    ],
                )
                .expect("demo batch matches its own schema");
                let stream: RecordBatchStream = Box::pin(futures::stream::once(async { Ok(batch) }));
                Ok(stream)
            })
        })
        .build()
        .expect("demo catalog is internally consistent")
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let mut config = FlightServerConfig::parse();
    if config.default_catalog.is_empty() {
        config.default_catalog = "main".to_string();
    }

    let catalogs = vec![(config.default_catalog.clone(), demo_catalog())];

    info!(bind_address = %config.bind_address, "starting airport Flight server");
    if let Err(err) = serve(&config, catalogs, None).await {
        eprintln!("airport server error: {err}");
        std::process::exit(1);
    }
}
