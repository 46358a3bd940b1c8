//! `facegate models`: weight file integrity.

use std::path::Path;

use anyhow::{Context, Result};
use facegate_models::{pin_checksums, verify_models_dir, CHECKSUMS_FILE, MODELS};

pub fn verify(dir: &Path) -> Result<()> {
    println!("Model directory: {}", dir.display());

    for model in MODELS {
        let present = dir.join(model.name).is_file();
        println!(
            "  {:<40} {:<9} {}",
            model.name,
            if present { "present" } else { "MISSING" },
            model.purpose
        );
    }

    verify_models_dir(dir).with_context(|| format!("model check failed in {}", dir.display()))?;

    if dir.join(CHECKSUMS_FILE).is_file() {
        println!("All models present, checksums ok.");
    } else {
        println!("All models present ({CHECKSUMS_FILE} not found, run `facegate models pin`).");
    }
    Ok(())
}

pub fn pin(dir: &Path) -> Result<()> {
    println!("Model directory: {}", dir.display());

    let checksums = pin_checksums(dir)
        .with_context(|| format!("failed to pin checksums in {}", dir.display()))?;
    for (name, digest) in &checksums.files {
        println!("  {name}  {digest}");
    }
    println!("Wrote {}", dir.join(CHECKSUMS_FILE).display());
    Ok(())
}
