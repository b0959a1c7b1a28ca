use anyhow::{Context, Result};
use nsrdb::{Client, RequestOptions};

fn main() -> Result<()> {
    // Example program that calls the library API.
    // Configure credentials in `~/.nsrdb` (API_KEY=..., EMAIL=...).
    let client = Client::new()?;

    let location = (-93.1567288182409, 45.15793882400205);
    let options = RequestOptions::default()
        .with_names(["tmy-2020"])
        .with_attributes(["ghi", "dni", "dhi", "air_temperature"]);

    let table = client
        .typical_meteorological_year(location, options)?
        .into_table()
        .context("TMY for a single point should come back as CSV")?;

    println!(
        "{} rows at {}, {} (elevation {} m)",
        table.len(),
        table.metadata("Latitude").unwrap_or("?"),
        table.metadata("Longitude").unwrap_or("?"),
        table.metadata("Elevation").unwrap_or("?"),
    );
    if let Some(ghi) = table.floats("GHI") {
        let total: f64 = ghi.iter().sum();
        println!("annual GHI: {:.1} kWh/m2", total / 1000.0);
    }
    Ok(())
}
