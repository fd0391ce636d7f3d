//! Writes a starter `.env` for local runs with a freshly generated JWT secret.

use std::{fs, path::PathBuf};

use anyhow::{bail, Context, Result};
use clap::Parser;
use rand::{distributions::Alphanumeric, Rng};

const SECRET_LEN: usize = 64;

#[derive(Debug, Parser)]
#[command(
    name = "create-env",
    about = "Generate a .env file for the pharmacy API",
    version
)]
struct Cli {
    /// Where to write the file
    #[arg(short, long, default_value = ".env")]
    output: PathBuf,

    /// Database connection string
    #[arg(long, default_value = "sqlite://pharmacy.db?mode=rwc")]
    database_url: String,

    /// Runtime environment name
    #[arg(long, default_value = "development")]
    environment: String,

    /// Overwrite an existing file
    #[arg(long)]
    force: bool,
}

fn generate_secret(len: usize) -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(len)
        .map(char::from)
        .collect()
}

fn render_env(cli: &Cli, secret: &str) -> String {
    format!(
        "# Generated by create-env\n\
         APP__JWT_SECRET={secret}\n\
         APP__DATABASE_URL={}\n\
         APP__ENVIRONMENT={}\n\
         APP__AUTO_MIGRATE=true\n",
        cli.database_url, cli.environment
    )
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    if cli.output.exists() && !cli.force {
        bail!(
            "{} already exists; pass --force to overwrite it",
            cli.output.display()
        );
    }

    let contents = render_env(&cli, &generate_secret(SECRET_LEN));
    fs::write(&cli.output, contents)
        .with_context(|| format!("failed to write {}", cli.output.display()))?;

    println!("Wrote {}", cli.output.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn secret_is_alphanumeric_and_long_enough() {
        let secret = generate_secret(SECRET_LEN);
        assert_eq!(secret.len(), SECRET_LEN);
        assert!(secret.chars().all(|c| c.is_ascii_alphanumeric()));
        assert_ne!(secret, generate_secret(SECRET_LEN));
    }

    #[test]
    fn env_file_lists_every_setting() {
        let cli = Cli::parse_from(["create-env", "--environment", "staging"]);
        let rendered = render_env(&cli, "s3cr3t");
        assert!(rendered.contains("APP__JWT_SECRET=s3cr3t\n"));
        assert!(rendered.contains("APP__DATABASE_URL=sqlite://pharmacy.db?mode=rwc\n"));
        assert!(rendered.contains("APP__ENVIRONMENT=staging\n"));
        assert!(rendered.contains("APP__AUTO_MIGRATE=true\n"));
    }
}
