pub mod assemble;
pub mod config;
pub mod fetch;
pub mod history;
pub mod log;
pub mod notify;
pub mod providers;
pub mod report;
pub mod series;
pub mod store;
pub mod ui;

use anyhow::{Context, Result, ensure};
use chrono::Utc;
use tracing::{debug, info};

pub async fn run(config_path: Option<&str>) -> Result<()> {
    info!("Daily close collector starting...");

    let config = match config_path {
        Some(path) => config::AppConfig::load_from_path(path)?,
        None => config::AppConfig::load()?,
    };
    debug!("Loaded config: {config:#?}");
    ensure!(!config.instruments.is_empty(), "No instruments configured");

    let tz = config.reference_timezone()?;
    let now = Utc::now().with_timezone(&tz);
    let today = now.date_naive();
    ensure!(
        config.start_date <= today,
        "start_date {} is after today ({today} in {tz})",
        config.start_date
    );
    let axis = series::DateAxis::new(config.start_date, today);

    let csv_store = store::CsvStore::new(&config.output_file);
    let prior = csv_store
        .load()
        .context("Could not load existing output file")?;

    let base_url = config
        .providers
        .yahoo
        .as_ref()
        .map_or(providers::yahoo_finance::DEFAULT_BASE_URL, |p| {
            p.base_url.as_str()
        });
    let provider = providers::yahoo_finance::YahooHistoryProvider::new(base_url);
    let fetcher = fetch::BackoffFetcher::new(provider, config.fetch.policy());
    let assembler = assemble::Assembler::new(fetcher, config.instruments.clone());

    println!(
        "{}",
        ui::style_text(
            "🚀 Gathering data from Yahoo Finance...",
            ui::StyleType::Title
        )
    );
    let generated_at = now.format("%Y-%m-%d %H:%M:%S %Z").to_string();
    let (table, report) = assembler.assemble(&axis, prior.as_ref(), &generated_at).await;

    csv_store
        .save(&table)
        .context("Could not write output file")?;

    report
        .write_artifacts(&config.reports_dir, today)
        .context("Could not write report artifacts")?;

    println!("\n{}", report.display_as_table());
    println!(
        "\n🎉 Done. Written to {} from {} to {} 📈",
        csv_store.path().display(),
        axis.start(),
        axis.end()
    );

    if let Some(mail) = &config.mail {
        let subject = format!("Daily close report {today}");
        notify::dispatch(
            mail,
            &subject,
            &report.render_text(),
            Some(&report.render_html()),
        )
        .await;
    }

    // Individual instrument failures are reported, not fatal.
    Ok(())
}
