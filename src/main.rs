mod api;
mod cache;
mod catalog;
mod classify;
mod error;
mod http;
mod metadata;
mod models;
mod presenters;
mod query;
mod settings;
mod sheet;
mod text;

use std::sync::Arc;
use std::time::Instant;

use actix_web::{web, App, HttpServer};
use anyhow::Context;
use clap::{Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use tracing::{info, warn};

use crate::cache::SystemClock;
use crate::catalog::Catalog;
use crate::http::HttpClient;
use crate::models::ScholarshipLevel;
use crate::query::{canonical_countries, CatalogQuery, Facets, Highlights, SortOrder};
use crate::settings::Settings;

#[derive(Parser)]
#[command(name = "icuni_catalog", about = "Scholarship catalog from a published Google Sheet")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Serve the JSON API
    Serve {
        #[arg(long)]
        host: Option<String>,
        #[arg(short, long)]
        port: Option<u16>,
    },
    /// Scholarships overview table
    List {
        /// Study level slug (e.g. masters, phd, undergrad)
        #[arg(short, long)]
        level: Option<String>,
        /// Destination country (e.g. "United Kingdom")
        #[arg(short, long)]
        country: Option<String>,
        /// Case-insensitive text search
        #[arg(short, long)]
        search: Option<String>,
        /// deadline-asc, deadline-desc, name-asc or country-asc
        #[arg(long, default_value = "deadline-asc")]
        sort: String,
        /// Include expired scholarships
        #[arg(long)]
        all: bool,
        /// Max rows to display
        #[arg(short = 'n', long, default_value = "50")]
        limit: usize,
    },
    /// Full detail for one scholarship
    Show {
        id: String,
    },
    /// Catalog highlights and facet counts
    Stats,
}

#[actix_web::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let t0 = Instant::now();
    let cli = Cli::parse();
    let settings = Settings::load()?;
    let client = HttpClient::new(settings.http_timeout()).context("Failed to create HTTP client")?;
    let catalog = Catalog::new(Arc::new(client), &settings, Arc::new(SystemClock));

    let result = match cli.command {
        Commands::Serve { host, port } => {
            let host = host.unwrap_or_else(|| settings.host.clone());
            let port = port.unwrap_or(settings.port);
            let catalog = web::Data::new(catalog);

            // Warm the snapshot so the first request doesn't pay for it
            if let Err(e) = catalog.load_scholarships().await {
                warn!("Initial catalog load failed: {}", e);
            }

            info!("Server running at http://{}:{}", host, port);
            HttpServer::new(move || {
                App::new()
                    .app_data(catalog.clone())
                    .configure(api::configure::<HttpClient>)
            })
            .bind((host.as_str(), port))
            .with_context(|| format!("Failed to bind {}:{}", host, port))?
            .run()
            .await
            .context("Server error")
        }
        Commands::List {
            level,
            country,
            search,
            sort,
            all,
            limit,
        } => {
            let levels = match level.as_deref() {
                Some(slug) => vec![ScholarshipLevel::from_slug(slug)
                    .with_context(|| format!("Unknown level '{}'", slug))?],
                None => Vec::new(),
            };
            let query = CatalogQuery {
                levels,
                countries: country.into_iter().collect(),
                search,
                show_expired: all,
                sort: sort.parse::<SortOrder>().map_err(anyhow::Error::msg)?,
                ..CatalogQuery::default()
            };

            let catalog = catalog.with_progress(progress_bar());
            let items = catalog.load_scholarships().await?;
            let rows = query.apply(&items);
            if rows.is_empty() {
                println!("No scholarships match.");
                return Ok(());
            }
            print_overview(&rows, limit);
            Ok(())
        }
        Commands::Show { id } => {
            let catalog = catalog.with_progress(progress_bar());
            match catalog.detail(&id).await? {
                Some(detail) => print_detail(&detail),
                None => println!("Scholarship not found: {}", id),
            }
            Ok(())
        }
        Commands::Stats => {
            let catalog = catalog.with_progress(progress_bar());
            let items = catalog.load_scholarships().await?;
            let h = Highlights::collect(&items, catalog.now());
            let f = Facets::collect(&items);
            println!("Total:      {}", items.len());
            println!("Active:     {}", h.active);
            println!("Expired:    {}", items.len() - h.active);
            println!("Countries:  {}", h.countries);
            println!("Levels:     {}", f.levels.len());
            println!("Coverage:   {}", f.coverage.len());
            println!("Modes:      {}", f.delivery_modes.len());
            match &h.upcoming {
                Some(next) => println!(
                    "Next close: {} ({}, in {} days)",
                    next.name, next.label, next.days_left
                ),
                None => println!("Next close: -"),
            }
            Ok(())
        }
    };

    let elapsed = t0.elapsed();
    if elapsed.as_secs() >= 1 {
        println!("\nDone in {}", format_duration(elapsed));
    }

    result
}

fn progress_bar() -> ProgressBar {
    let pb = ProgressBar::new(0);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({per_sec})")
            .unwrap()
            .progress_chars("#>-"),
    );
    pb
}

fn print_overview(rows: &[models::ScholarshipPreview], limit: usize) {
    // Compact, readable table
    println!(
        "{:>3} | {:<32} | {:<20} | {:<20} | {:<24} | {:<18}",
        "#", "Scholarship", "Levels", "Countries", "Deadline", "Funding"
    );
    println!("{}", "-".repeat(132));

    let shown = &rows[..rows.len().min(limit)];
    for (i, p) in shown.iter().enumerate() {
        let s = &p.scholarship;
        let levels: Vec<&str> = s.level_tags.iter().map(|l| l.as_str()).collect();
        let countries = canonical_countries(p).join(", ");
        let funding = s
            .funding_category
            .map(|c| c.to_string())
            .unwrap_or_else(|| "-".into());
        let deadline = if s.is_expired {
            format!("{} (closed)", s.deadline_label)
        } else {
            s.deadline_label.clone()
        };

        println!(
            "{:>3} | {:<32} | {:<20} | {:<20} | {:<24} | {:<18}",
            i + 1,
            truncate(&s.name, 32),
            truncate(&levels.join(", "), 20),
            truncate(&countries, 20),
            truncate(&deadline, 24),
            funding
        );
    }

    // Ids in a separate section to keep the table narrow
    println!("\n--- Ids ---");
    for p in shown {
        println!("  {}: {}", truncate(p.name(), 32), p.id());
    }

    println!(
        "\n{} of {} scholarships | detail: show <id>",
        shown.len(),
        rows.len()
    );
}

fn print_detail(d: &models::ScholarshipDetail) {
    let s = &d.preview.scholarship;
    let levels: Vec<&str> = s.level_tags.iter().map(|l| l.as_str()).collect();
    let list = |values: &[String]| {
        if values.is_empty() {
            "-".to_string()
        } else {
            values.join(", ")
        }
    };

    println!("{}", s.name);
    println!("{}", "=".repeat(s.name.chars().count().min(80)));
    println!("Id:           {}", s.id);
    println!("Link:         {}", s.link);
    println!("Organisation: {}", s.organisation.as_deref().unwrap_or("-"));
    println!("Levels:       {}", levels.join(", "));
    println!("Countries:    {}", list(&canonical_countries(&d.preview)));
    println!("Deadline:     {}{}", s.deadline_label, if s.is_expired { " (closed)" } else { "" });
    println!("Funding:      {}", s.funding_type.as_deref().unwrap_or("-"));
    if let Some(category) = s.funding_category {
        println!("Category:     {}", category);
    }
    println!("Coverage:     {}", list(&s.coverage));
    println!("Eligibility:  {}", list(&s.eligibility));
    println!("Subjects:     {}", list(&s.subjects));
    println!("Delivery:     {}", list(&s.delivery_modes));

    if let Some(summary) = &d.summary {
        println!("\n--- Summary ---\n{}", summary);
    }
    if let Some(long) = &d.long_description {
        if d.summary.as_ref() != Some(long) {
            println!("\n--- Details ---\n{}", long);
        }
    }
    if !d.images.is_empty() {
        println!("\n--- Images ({}) ---", presenters::build_image_alt(s));
        for url in &d.images {
            println!("  {}", url);
        }
    }
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let truncated: String = s.chars().take(max).collect();
        format!("{}...", truncated)
    }
}

fn format_duration(d: std::time::Duration) -> String {
    let secs = d.as_secs();
    if secs < 60 {
        format!("{:.1}s", d.as_secs_f64())
    } else if secs < 3600 {
        format!("{}m {}s", secs / 60, secs % 60)
    } else {
        format!("{}h {}m {}s", secs / 3600, (secs % 3600) / 60, secs % 60)
    }
}
