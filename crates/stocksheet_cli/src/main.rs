//! CLI smoke entry point.
//!
//! # Responsibility
//! - Provide a minimal executable to verify `stocksheet_core` linkage.
//! - Optionally run one live load against an endpoint given as the first
//!   argument (or `STOCKSHEET_ENDPOINT`), printing the aggregated rows.

use stocksheet_core::{RemoteStore, ScriptEndpointStore, StockView, StoreConfig};

fn main() {
    println!("stocksheet_core version={}", stocksheet_core::core_version());

    let endpoint = std::env::args()
        .nth(1)
        .or_else(|| std::env::var("STOCKSHEET_ENDPOINT").ok());
    let Some(endpoint) = endpoint else {
        return;
    };

    match load_and_render(&endpoint) {
        Ok(rendered) => print!("{rendered}"),
        Err(message) => {
            eprintln!("load failed: {message}");
            std::process::exit(1);
        }
    }
}

fn load_and_render(endpoint: &str) -> Result<String, String> {
    let store = ScriptEndpointStore::new(&StoreConfig::new(endpoint))
        .map_err(|err| err.to_string())?;
    let records = store.load().map_err(|err| err.to_string())?;
    Ok(StockView::build(&records).format_rows())
}
