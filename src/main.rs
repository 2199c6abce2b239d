use anyhow::Context;
use clap::Parser;
use pairgen::config::LogFormat;
use pairgen::domain::ports::ConfigProvider;
use pairgen::utils::error::ErrorSeverity;
use pairgen::utils::{logger, validation::Validate};
use pairgen::{BatchEngine, BatchSettings, CliConfig, LocalStorage, PairgenError};
use std::sync::Arc;

/// 設定錯誤視為系統錯誤
const CONFIG_EXIT_CODE: i32 = 3;

fn load_settings(cli: &CliConfig) -> anyhow::Result<BatchSettings> {
    let settings = BatchSettings::load(cli).with_context(|| match &cli.config {
        Some(path) => format!("failed to load batch config '{}'", path),
        None => "failed to build batch settings".to_string(),
    })?;
    settings.validate().context("invalid batch settings")?;
    Ok(settings)
}

fn display_settings_summary(settings: &BatchSettings) {
    println!("📋 Batch settings:");
    println!("   input:    {}", settings.input_dir());
    if settings.dry_run() {
        println!("   output:   (dry run, nothing is written)");
    } else {
        println!("   output:   {}", settings.output_dir());
    }
    println!("   ports:    from {}", settings.base_port());
    println!("   workers:  {}", settings.workers());
    println!("   missing backend route: {:?}", settings.missing_route_policy());
    if !settings.bindings.is_empty() {
        println!("   bindings: {}", settings.bindings.keys().cloned().collect::<Vec<_>>().join(", "));
    }
}

#[tokio::main]
async fn main() {
    let cli = CliConfig::parse();

    // 初始化日誌
    match cli.log_format {
        LogFormat::Text => logger::init_cli_logger(cli.verbose),
        LogFormat::Json => logger::init_json_logger(cli.verbose),
    }

    tracing::info!("Starting pairgen");
    if cli.verbose {
        tracing::debug!("CLI config: {:?}", cli);
    }

    let settings = match load_settings(&cli) {
        Ok(settings) => settings,
        Err(e) => {
            tracing::error!("❌ Configuration failed: {:#}", e);
            match e.downcast_ref::<PairgenError>() {
                Some(err) => {
                    eprintln!("❌ {}", err.user_friendly_message());
                    eprintln!("💡 建議: {}", err.recovery_suggestion());
                }
                None => eprintln!("❌ {:#}", e),
            }
            std::process::exit(CONFIG_EXIT_CODE);
        }
    };
    display_settings_summary(&settings);

    let source = Arc::new(LocalStorage::new(settings.input_dir()));
    let sink = Arc::new(LocalStorage::new(settings.output_dir()));
    let engine = BatchEngine::new(settings, source, sink);

    match engine.run().await {
        Ok(report) => {
            println!();
            print!("{}", report.summary_table());
            if !report.dry_run {
                println!("📁 Diagnostics written to diagnostics.json and summary.csv");
            }

            let code = report.exit_code();
            if code > 0 {
                tracing::warn!("⚠️ {} app(s) were not instantiated", report.totals.failed);
                std::process::exit(code);
            }
            tracing::info!("✅ All pairs instantiated");
        }
        Err(e) => {
            // 記錄詳細錯誤信息
            tracing::error!(
                "❌ Batch failed: {} (Category: {:?}, Severity: {:?})",
                e,
                e.category(),
                e.severity()
            );
            tracing::error!("💡 Recovery suggestion: {}", e.recovery_suggestion());

            eprintln!("❌ {}", e.user_friendly_message());
            eprintln!("💡 建議: {}", e.recovery_suggestion());

            // 根據錯誤嚴重程度決定退出碼
            let exit_code = match e.severity() {
                ErrorSeverity::Low => 0,
                ErrorSeverity::Medium => 2,
                ErrorSeverity::High => 1,
                ErrorSeverity::Critical => 3,
            };
            if exit_code > 0 {
                std::process::exit(exit_code);
            }
        }
    }
}
