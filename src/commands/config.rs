use anyhow::Result;

use crate::Context;
use crate::config::MateriaConfig;
use crate::paths;
use crate::ui;

pub fn run(ctx: &Context) -> Result<()> {
    let path = paths::config_file()?;
    let config = MateriaConfig::load()?;

    if !ctx.quiet {
        ui::header("Configuration");
        ui::kv("Config file", &path.display().to_string());
        if !path.exists() {
            ui::dim("(not found, using defaults)");
        }
        match config.hostname() {
            Ok(name) => ui::kv("Hostname", &name),
            Err(e) => ui::warn(&format!("Hostname unknown: {}", e)),
        }
        println!();
    }

    // attribute values may be secrets
    let mut shown = config;
    for value in shown.attributes.values_mut() {
        *value = "<redacted>".to_string();
    }
    print!("{}", shown.to_toml()?);
    Ok(())
}
