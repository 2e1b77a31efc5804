//! Command-line interface for partscout.
//!
//! Provides commands for identifying a part from a photo, searching the
//! shopping providers for offers, and showing the resolved configuration.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};

use crate::config::Settings;
use crate::core::{Identification, Orchestrator};
use crate::domain::{AggregateReport, ProviderStatus, Signal};

/// partscout - Automotive part identification and offer search
#[derive(Parser, Debug)]
#[command(name = "partscout")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Identify the part shown in a photo
    Identify {
        /// Image file (PNG, JPEG, GIF, BMP, WebP or TIFF)
        image: PathBuf,

        /// Print the full result as JSON
        #[arg(long)]
        json: bool,
    },

    /// Search every shopping provider for a part number or name
    Offers {
        /// Part number or name
        term: String,

        /// Print the full report as JSON
        #[arg(long)]
        json: bool,
    },

    /// Show resolved configuration (debug)
    Config,
}

impl Cli {
    /// Execute the CLI command
    pub async fn execute(self) -> Result<()> {
        match self.command {
            Commands::Identify { image, json } => identify(&image, json).await,
            Commands::Offers { term, json } => offers(&term, json).await,
            Commands::Config => show_config(),
        }
    }
}

/// Identify a part from an image file
async fn identify(path: &Path, json: bool) -> Result<()> {
    let settings = Settings::load()?;
    let orchestrator = Orchestrator::from_settings(&settings)?;

    let bytes = tokio::fs::read(path)
        .await
        .with_context(|| format!("Failed to read image: {}", path.display()))?;

    let identification = orchestrator
        .identify(bytes)
        .await
        .with_context(|| format!("Rejected image: {}", path.display()))?;

    if json {
        println!("{}", serde_json::to_string_pretty(&identification)?);
    } else {
        print_identification(&identification);
    }

    Ok(())
}

/// Search offers for a term
async fn offers(term: &str, json: bool) -> Result<()> {
    let settings = Settings::load()?;
    let orchestrator = Orchestrator::from_settings(&settings)?;

    let report = orchestrator.find_offers(term).await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print_report(&report);
    }

    Ok(())
}

fn print_identification(identification: &Identification) {
    let result = &identification.result;

    println!("Request: {}", identification.request_id);
    println!(
        "Part number: {}",
        result.chosen_identifier.as_deref().unwrap_or("(not identified)")
    );
    println!("Confidence: {:.0}%", result.overall_confidence * 100.0);
    println!();

    println!("Sources:");
    for (source, status) in &result.source_status {
        match result.per_source_confidences.get(source) {
            Some(confidence) => println!("  {:<12} {:?} ({:.2})", source.to_string(), status, confidence),
            None => println!("  {:<12} {:?}", source.to_string(), status),
        }
    }

    if let Signal::Present(db) = &identification.evidence.db_match {
        println!();
        println!("Catalog: {} [{}]", db.record.name, db.record.category);
        for fitment in &db.record.compatibility {
            println!(
                "  {} {} {} ({:.0}%)",
                fitment.make,
                fitment.model,
                fitment.years,
                fitment.confidence * 100.0
            );
        }
    }

    if !identification.top_candidates.is_empty() {
        println!();
        println!("{:<24} {:>10} {:>10} {:>10}", "CANDIDATE", "LIKELIHOOD", "OCR", "COMBINED");
        println!("{}", "-".repeat(57));
        for candidate in &identification.top_candidates {
            println!(
                "{:<24} {:>10.2} {:>10.2} {:>10.2}",
                candidate.normalized_text,
                candidate.likelihood_score,
                candidate.best_confidence,
                candidate.combined_score
            );
        }
    }

    println!();
    println!(
        "{} detections in {} ms",
        identification.total_detections, identification.elapsed_ms
    );
}

fn print_report(report: &AggregateReport) {
    println!("Offers for: {}", report.search_term);
    println!();

    for (store, listings) in &report.per_provider {
        match report.statuses.get(store) {
            Some(ProviderStatus::Failed { error }) => println!("{} (failed: {})", store, error),
            Some(ProviderStatus::TimedOut) => println!("{} (timed out)", store),
            _ => println!("{}", store),
        }
        for listing in listings {
            println!("  {} | {}", listing.title, listing.price);
            println!("    {}", listing.url);
        }
    }

    println!();
    match &report.price_stats {
        Some(stats) => println!(
            "Prices: {} parsed, min ${:.2}, max ${:.2}, mean ${:.2}",
            stats.count, stats.min, stats.max, stats.mean
        ),
        None => println!("Prices: none parseable"),
    }
    println!("Total listings: {}", report.total_listings);
}

/// Show the resolved configuration (for debugging)
fn show_config() -> Result<()> {
    let cfg = Settings::load()?;

    println!("partscout configuration");
    println!();
    println!(
        "Config file: {}",
        cfg.config_file
            .as_ref()
            .map(|p| p.display().to_string())
            .unwrap_or_else(|| "(none - using defaults)".to_string())
    );
    println!();
    println!("OCR:");
    println!("  Binary:         {}", cfg.ocr.binary);
    let modes: Vec<String> = cfg.ocr.page_modes.iter().map(|m| m.psm.to_string()).collect();
    println!("  Page modes:     {}", modes.join(", "));
    println!("  Min confidence: {}", cfg.ocr.min_confidence);
    println!("  Preprocessing:  {}", cfg.preprocessing.len());
    println!();
    println!("Services:");
    println!(
        "  Classifier: {}",
        cfg.classifier_url.as_deref().unwrap_or("(none)")
    );
    println!(
        "  Vision:     {} ({}, key {})",
        cfg.vision.api_url,
        cfg.vision.model,
        if cfg.vision.api_key.is_some() { "set" } else { "missing, keyword fallback" }
    );
    println!(
        "  Catalog:    {}",
        cfg.catalog_path
            .as_ref()
            .map(|p| p.display().to_string())
            .unwrap_or_else(|| "(none)".to_string())
    );
    println!();
    println!("Shopping:");
    println!("  Provider timeout:    {}s", cfg.shopping.provider_timeout_seconds);
    println!(
        "  eBay Finding API:    {}",
        if cfg.shopping.ebay_app_id.is_some() { "enabled" } else { "disabled, scraping" }
    );
    println!(
        "  Amazon tag:          {}",
        cfg.shopping.amazon_associate_tag.as_deref().unwrap_or("(none)")
    );
    println!("  Verify storefronts:  {}", cfg.shopping.verify_storefronts);
    println!();
    println!("Limits:");
    println!("  Max image size:   {} bytes", cfg.limits.max_image_bytes);
    println!("  Service timeout:  {}s", cfg.limits.service_timeout_seconds);

    Ok(())
}
