//! Vaultic CLI
//!
//! Command-line client for the Vaultic file server: register, log in,
//! upload files, list and remove them, and query administrative data.

use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use console::style;

use vaultic_core::session::{FileClient, UploadItem};

#[derive(Parser)]
#[command(name = "vaultic")]
#[command(version, about = "Encrypted file vault client")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Server address
    #[arg(
        long,
        global = true,
        env = "VAULTIC_SERVER",
        default_value = "127.0.0.1:5050"
    )]
    server: String,

    /// Account password (prompted when omitted)
    #[arg(long, global = true)]
    password: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Register a new account
    Register {
        /// Account email
        email: String,
    },

    /// List stored files
    Files {
        /// Account email
        email: String,
        /// Target another user's folder (administrators only)
        #[arg(long)]
        user: Option<String>,
    },

    /// Upload files
    Upload {
        /// Account email
        email: String,
        /// Files to upload
        #[arg(required = true)]
        paths: Vec<PathBuf>,
    },

    /// Remove stored files
    Remove {
        /// Account email
        email: String,
        /// Target another user's folder (administrators only)
        #[arg(long)]
        user: Option<String>,
        /// File names to remove
        #[arg(required = true)]
        names: Vec<String>,
    },

    /// Show registered users and the interaction log (administrators only)
    Admin {
        /// Account email
        email: String,
    },

    /// Check that the server answers
    Ping,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let client = FileClient::connect(&cli.server)
        .with_context(|| format!("failed to connect to {}", cli.server))?;

    match cli.command {
        Commands::Register { email } => {
            let password = read_password(cli.password)?;
            let (success, message, level) = client.register(&email, &password)?;
            report(success, &message);
            if let Some(level) = level {
                println!("Privilege level: {level:?}");
            }
            if !success {
                bail!("registration refused");
            }
        }

        Commands::Files { email, user } => {
            login(&client, &email, cli.password)?;
            let target = user.as_deref().unwrap_or(&email);
            let (success, message, files) = client.view_files(target)?;
            report(success, &message);
            if !success {
                bail!("listing refused");
            }
            if files.is_empty() {
                println!("(no files)");
            }
            for file in files {
                println!("{file}");
            }
        }

        Commands::Upload { email, paths } => {
            login(&client, &email, cli.password)?;
            let mut items = Vec::new();
            for path in &paths {
                let name = path
                    .file_name()
                    .map(|name| name.to_string_lossy().into_owned())
                    .with_context(|| format!("{} has no file name", path.display()))?;
                let bytes =
                    std::fs::read(path).with_context(|| format!("reading {}", path.display()))?;
                items.push(UploadItem { name, bytes });
            }
            let outcomes = client.upload(items)?;
            let mut failures = 0;
            for outcome in outcomes {
                report(outcome.success, &format!("{}: {}", outcome.name, outcome.message));
                if !outcome.success {
                    failures += 1;
                }
            }
            if failures > 0 {
                bail!("{failures} file(s) were not uploaded");
            }
        }

        Commands::Remove { email, user, names } => {
            login(&client, &email, cli.password)?;
            let target = user.clone().unwrap_or_else(|| email.clone());
            let (success, message) = client.remove_files(&target, names)?;
            report(success, &message);
            if !success {
                bail!("removal refused");
            }
        }

        Commands::Admin { email } => {
            login(&client, &email, cli.password)?;
            let (success, message, data) = client.admin_data()?;
            report(success, &message);
            let Some(data) = data else {
                bail!("query refused");
            };
            println!("\n{}", style("Users").bold());
            for user in data.users {
                println!("  {} ({:?})", user.email, user.privilege);
            }
            println!("\n{}", style("Interactions").bold());
            for entry in data.interactions {
                println!("  [{}] {}: {}", entry.timestamp, entry.user_email, entry.message);
            }
        }

        Commands::Ping => {
            client.ping()?;
            println!("{} server answered", style("✓").green());
        }
    }

    Ok(())
}

fn login(client: &FileClient, email: &str, password: Option<String>) -> Result<()> {
    let password = read_password(password)?;
    let (success, message, _) = client.login(email, &password)?;
    if !success {
        bail!("login failed: {message}");
    }
    Ok(())
}

fn read_password(given: Option<String>) -> Result<String> {
    match given {
        Some(password) => Ok(password),
        None => Ok(dialoguer::Password::new()
            .with_prompt("Password")
            .interact()?),
    }
}

fn report(success: bool, message: &str) {
    if success {
        println!("{} {message}", style("✓").green());
    } else {
        println!("{} {message}", style("✗").red());
    }
}
