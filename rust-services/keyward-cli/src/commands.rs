//! Subcommand implementations
// Copyright 2025 Francisco F. Pinochet
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.


use crate::{Cli, Command};
use anyhow::{bail, Context, Result};
use keyward_config::{SecurityReport, TokenConfig};
use keyward_keys::{
    generate_secret, shannon_entropy, CleanupOutcome, KeyManager, RotationPlan, RotationUrgency,
    SigningAlgorithm, MIN_SECRET_LENGTH,
};
use serde::Serialize;
use std::fs;
use std::path::Path;
use tracing::info;

/// Rotation interval used for plans
const ROTATION_INTERVAL_DAYS: u32 = 30;

pub fn run(cli: Cli) -> Result<()> {
    let storage_path = cli.storage_path;
    match cli.command {
        Command::Generate {
            length,
            output_file,
            show_info,
        } => generate(length, output_file.as_deref(), show_info),
        Command::Validate { verbose } => validate(verbose),
        Command::Rotate {
            algorithm,
            length,
            output_file,
            dry_run,
        } => rotate(&storage_path, algorithm, length, output_file.as_deref(), dry_run),
        Command::Status { verbose } => status(&storage_path, verbose),
        Command::Cleanup {
            max_age_days,
            dry_run,
        } => cleanup(&storage_path, max_age_days, dry_run),
        Command::ExportConfig { output_file } => export_config(output_file.as_deref()),
    }
}

fn write_secret(path: &Path, secret: &str) -> Result<()> {
    fs::write(path, secret).with_context(|| format!("Failed to write {}", path.display()))
}

fn load_config() -> Result<TokenConfig> {
    TokenConfig::from_env().context("Failed to load JWT configuration")
}

fn generate(length: usize, output_file: Option<&Path>, show_info: bool) -> Result<()> {
    if length < MIN_SECRET_LENGTH {
        bail!("Secret length must be at least {} characters", MIN_SECRET_LENGTH);
    }

    let secret = generate_secret(length).context("Failed to generate a secret")?;
    match output_file {
        Some(path) => {
            write_secret(path, &secret)?;
            println!("Secret written to {}", path.display());
        }
        None => {
            println!("Generated secure secret:");
            println!("{}", secret);
        }
    }

    if show_info {
        println!();
        println!("Secret info:");
        println!("  Length: {} characters", secret.chars().count());
        println!("  Entropy: {:.2} bits/char", shannon_entropy(&secret));
    }
    Ok(())
}

fn validate(verbose: bool) -> Result<()> {
    let config = load_config()?;
    let report = config.security_report();

    println!("JWT Secret Validation Report");
    println!("{}", "=".repeat(40));
    if report.valid {
        println!("✅ Secret configuration is valid");
    } else {
        println!("⚠️  Secret configuration has issues");
    }
    println!("Security Score: {}/100", report.security_score);

    if !report.recommendations.is_empty() {
        println!();
        println!("Recommendations:");
        for (i, recommendation) in report.recommendations.iter().enumerate() {
            println!("  {}. {}", i + 1, recommendation);
        }
    }

    if verbose {
        let info = &report.secret_info;
        println!();
        println!("Secret Information:");
        println!("  Key ID: {}", info.primary_secret_id);
        if let Some(previous) = &info.previous_secret_id {
            println!("  Previous Key ID: {}", previous);
        }
        println!("  Algorithm: {}", info.algorithm);
        println!("  Secret Length: {} characters", info.secret_length);
        println!("  Entropy: {:.2} bits/char", info.entropy_estimate);
        println!("  JWE Enabled: {}", info.jwe_enabled);
        println!("  Key Rotation: {}", info.key_rotation_enabled);
        println!("  Strict Mode: {}", info.strict_mode);
    }
    Ok(())
}

fn urgency_label(urgency: RotationUrgency) -> &'static str {
    match urgency {
        RotationUrgency::Low => "low",
        RotationUrgency::Medium => "medium",
        RotationUrgency::High => "high",
    }
}

fn print_plan(plan: &RotationPlan) {
    let action = match plan {
        RotationPlan::Initialize => "initialize",
        RotationPlan::Rotate { .. } => "rotate",
        RotationPlan::Wait { .. } => "wait",
    };
    println!("Action: {}", action);
    println!("Message: {}", plan.message());
    if let RotationPlan::Rotate { urgency, .. } | RotationPlan::Wait { urgency, .. } = plan {
        println!("Urgency: {}", urgency_label(*urgency));
    }
}

fn rotate(
    storage_path: &Path,
    algorithm: SigningAlgorithm,
    length: usize,
    output_file: Option<&Path>,
    dry_run: bool,
) -> Result<()> {
    let mut manager = KeyManager::open(storage_path);

    if dry_run {
        println!("Key Rotation Plan (Dry Run)");
        println!("{}", "=".repeat(30));
        print_plan(&manager.rotation_plan(ROTATION_INTERVAL_DAYS));
        return Ok(());
    }

    if length < MIN_SECRET_LENGTH {
        bail!("Key length must be at least {} characters", MIN_SECRET_LENGTH);
    }

    println!("Performing key rotation...");
    let (secret, key_id) = manager
        .rotate(algorithm, length)
        .context("Key rotation failed")?;
    info!(key_id = %key_id, store = %manager.location(), "Rotation persisted");

    println!("✅ Key rotation completed");
    println!("New Key ID: {}", key_id);
    match output_file {
        Some(path) => {
            write_secret(path, &secret)?;
            println!("New secret written to {}", path.display());
        }
        None => {
            println!("New secret:");
            println!("{}", secret);
        }
    }

    println!();
    println!("⚠️  Important: Update your JWT_SECRET environment variable!");
    println!("   Set JWT_SECRET_PREVIOUS to your old secret for graceful rotation");
    Ok(())
}

fn status(storage_path: &Path, verbose: bool) -> Result<()> {
    let manager = KeyManager::open(storage_path);
    let status = manager.status();

    println!("Key Management Status");
    println!("{}", "=".repeat(25));

    match &status.active_key_id {
        Some(key_id) => {
            println!("Active Key ID: {}", key_id);
            if let Some(hours) = status.active_key_age_hours() {
                println!("Key Age: {:.1} hours ({:.1} days)", hours, hours / 24.0);
            }
            println!("Rotation Count: {}", status.rotation_count);
            if let Some(last_used) = status.last_used {
                println!("Last Used: {}", last_used.to_rfc3339());
            }
        }
        None => println!("No active key found"),
    }
    println!("Total Keys: {}", status.total_keys);
    println!("Inactive Keys: {}", status.inactive_keys);

    if verbose {
        let keys = manager.list_keys(true);
        if !keys.is_empty() {
            println!();
            println!("All Keys:");
            for metadata in keys {
                let symbol = if metadata.is_active { "🔑" } else { "🔒" };
                println!(
                    "  {} {}: {}, created {}",
                    symbol,
                    metadata.key_id,
                    metadata.algorithm,
                    metadata.created_at.format("%Y-%m-%d %H:%M:%S")
                );
            }
        }
    }

    println!();
    println!(
        "Rotation Plan: {}",
        manager.rotation_plan(ROTATION_INTERVAL_DAYS).message()
    );
    Ok(())
}

fn cleanup(storage_path: &Path, max_age_days: u32, dry_run: bool) -> Result<()> {
    let mut manager = KeyManager::open(storage_path);

    match manager
        .cleanup(max_age_days, dry_run)
        .context("Cleanup failed")?
    {
        CleanupOutcome::Preview(candidates) if candidates.is_empty() => {
            println!("Dry run: no inactive keys older than {} days", max_age_days);
        }
        CleanupOutcome::Preview(candidates) => {
            println!(
                "Dry run: would remove {} keys older than {} days:",
                candidates.len(),
                max_age_days
            );
            for key_id in candidates {
                println!("  🔒 {}", key_id);
            }
        }
        CleanupOutcome::Removed(count) => println!("✅ Cleaned up {} old keys", count),
    }
    Ok(())
}

/// Deployment summary that never includes secret material
#[derive(Debug, Serialize)]
struct ExportedConfig {
    algorithm: SigningAlgorithm,
    jwe_enabled: bool,
    secret_length: usize,
    key_rotation_enabled: bool,
    recommendations: Vec<String>,
}

impl From<SecurityReport> for ExportedConfig {
    fn from(report: SecurityReport) -> Self {
        let info = report.secret_info;
        Self {
            algorithm: info.algorithm,
            jwe_enabled: info.jwe_enabled,
            secret_length: info.secret_length,
            key_rotation_enabled: info.key_rotation_enabled,
            recommendations: report.recommendations,
        }
    }
}

fn export_config(output_file: Option<&Path>) -> Result<()> {
    let exported = ExportedConfig::from(load_config()?.security_report());
    let json = serde_json::to_string_pretty(&exported)?;

    match output_file {
        Some(path) => {
            fs::write(path, &json)
                .with_context(|| format!("Failed to write {}", path.display()))?;
            println!("Configuration exported to {}", path.display());
        }
        None => println!("{}", json),
    }
    Ok(())
}
