use anyhow::{Context, Result};
use std::fs;
use std::path::Path;

use safewatch::config::Config;
use safewatch::store::book_path;

/// Default content for .safewatch/.gitignore
const GITIGNORE_CONTENT: &str = r#"# Safewatch gitignore
# Never commit credentials (Telegram config belongs in ~/.config/safewatch/)
telegram.toml
*.secret
*.credentials
"#;

pub fn run(dir: &Path) -> Result<()> {
    if dir.exists() {
        anyhow::bail!("Safewatch already initialized at {}", dir.display());
    }

    fs::create_dir_all(dir).context("Failed to create safewatch directory")?;

    fs::write(book_path(dir), "").context("Failed to create tasks.jsonl")?;

    // Create .gitignore to protect against accidental credential commits
    fs::write(dir.join(".gitignore"), GITIGNORE_CONTENT)
        .context("Failed to create .gitignore")?;

    Config::init(dir)?;

    println!("Initialized safewatch at {}", dir.display());
    println!(
        "Edit {} to configure the watchers and the agent executable.",
        dir.join("config.toml").display()
    );
    Ok(())
}
