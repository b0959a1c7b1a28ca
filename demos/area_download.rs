use std::path::Path;

use anyhow::{Context, Result};
use nsrdb::{Client, Dataset, Polygon, RequestOptions};

fn main() -> Result<()> {
    let client = Client::new()?;

    let area = Polygon::new(vec![
        (-93.1968498, 44.6402006),
        (-93.1961632, 44.639712),
        (-93.1939316, 44.6086792),
        (-93.1202888, 44.6084348),
        (-93.1202888, 44.6411777),
    ])?;

    let submission = client.area_aggregate(
        Dataset::Psm,
        &area,
        RequestOptions::default().with_years([2018, 2019]),
    )?;
    println!("{}", submission.message().unwrap_or("request queued"));

    // Pass `--fetch` or `--save` once the API has emailed that the archive is ready.
    let flag = |name: &str| std::env::args().any(|a| a == name);
    if flag("--save") {
        let path = client
            .download_to(&submission, Path::new(""))
            .context("archive not available yet")?;
        println!("saved {}", path.display());
    } else if flag("--fetch") {
        let tables = client
            .download_all(&submission)
            .context("archive not available yet")?;
        for table in &tables {
            println!(
                "{}: {} rows",
                table.source.as_deref().unwrap_or("?"),
                table.len()
            );
        }
    } else if let Some(url) = submission.download_url() {
        println!("archive will be at {url}");
    }
    Ok(())
}
