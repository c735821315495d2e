use anyhow::{Context, Result};

/// Puts an instance URL on the system clipboard.
pub fn copy_url(url: &str) -> Result<()> {
    let mut clipboard = arboard::Clipboard::new().context("failed to access clipboard")?;
    clipboard
        .set_text(url.to_string())
        .with_context(|| format!("failed to copy {} to clipboard", url))?;
    Ok(())
}
