//! keyward - JWT signing key management utility
//!
//! Usage:
//!   keyward generate --length 64 --output-file .env.new
//!   keyward validate --verbose
//!   keyward rotate --dry-run
//!   keyward status --verbose
//!   keyward cleanup --max-age-days 30
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


mod commands;

use clap::{Parser, Subcommand};
use keyward_keys::{
    SigningAlgorithm, DEFAULT_KEY_STORAGE_PATH, DEFAULT_SECRET_LENGTH, KEY_STORAGE_PATH_ENV,
};
use std::path::PathBuf;
use std::process::ExitCode;

/// JWT key management utility
#[derive(Parser, Debug)]
#[command(name = "keyward", version)]
pub struct Cli {
    /// Path for key metadata storage
    #[arg(long, global = true, env = KEY_STORAGE_PATH_ENV, default_value = DEFAULT_KEY_STORAGE_PATH)]
    pub storage_path: PathBuf,

    /// Log level when RUST_LOG is unset
    #[arg(long, global = true, default_value = "warn")]
    pub log_level: String,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Generate a new secure secret
    Generate {
        /// Secret length in characters
        #[arg(long, default_value_t = DEFAULT_SECRET_LENGTH)]
        length: usize,

        /// Write secret to file instead of stdout
        #[arg(long)]
        output_file: Option<PathBuf>,

        /// Show secret information
        #[arg(long)]
        show_info: bool,
    },

    /// Validate the JWT secret configuration from the environment
    Validate {
        /// Show detailed information
        #[arg(short, long)]
        verbose: bool,
    },

    /// Rotate the active signing key
    Rotate {
        /// Algorithm for the new key
        #[arg(long, default_value = "HS256")]
        algorithm: SigningAlgorithm,

        /// New key length
        #[arg(long, default_value_t = DEFAULT_SECRET_LENGTH)]
        length: usize,

        /// Write new secret to file
        #[arg(long)]
        output_file: Option<PathBuf>,

        /// Show the rotation plan without rotating
        #[arg(long)]
        dry_run: bool,
    },

    /// Show key management status
    Status {
        /// Show all keys
        #[arg(short, long)]
        verbose: bool,
    },

    /// Remove old inactive keys
    Cleanup {
        /// Maximum age for inactive keys
        #[arg(long, default_value_t = 30)]
        max_age_days: u32,

        /// List the keys that would be removed
        #[arg(long)]
        dry_run: bool,
    },

    /// Export non-sensitive configuration for deployment
    ExportConfig {
        /// Write config to file instead of stdout
        #[arg(long)]
        output_file: Option<PathBuf>,
    },
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    keyward_logging::init_console_logging("keyward", &cli.log_level);

    match commands::run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("❌ {:#}", e);
            ExitCode::FAILURE
        }
    }
}
