use std::path::Path;

use serde_json::json;
use vellum_engine::{KindSettings, VersioningConfig};

use crate::{fail, OutputFormat};

pub(crate) fn cmd_check_config(path: &Path, output: OutputFormat, quiet: bool) {
    let config = match VersioningConfig::load(path) {
        Ok(c) => c,
        Err(e) => fail(&e.to_string(), output, quiet),
    };
    let registry = match config.into_registry() {
        Ok(r) => r,
        Err(e) => fail(
            &format!("invalid config '{}': {}", path.display(), e),
            output,
            quiet,
        ),
    };

    match output {
        OutputFormat::Json => {
            let kinds: Vec<_> = registry.iter().map(settings_json).collect();
            let report = json!({ "valid": true, "kinds": kinds });
            println!(
                "{}",
                serde_json::to_string_pretty(&report)
                    .unwrap_or_else(|e| format!("serialization error: {}", e))
            );
        }
        OutputFormat::Text => {
            if !quiet {
                println!(
                    "{}: ok ({} kind{})",
                    path.display(),
                    registry.len(),
                    if registry.len() == 1 { "" } else { "s" }
                );
            }
            for settings in registry.iter() {
                println!(
                    "{}: keep={} schema={} versionable=[{}] excluded=[{}]",
                    settings.kind,
                    keep_label(settings.keep),
                    settings.schema,
                    settings.versionable.join(", "),
                    settings
                        .excluded
                        .iter()
                        .map(String::as_str)
                        .collect::<Vec<_>>()
                        .join(", "),
                );
            }
        }
    }
}

fn keep_label(keep: usize) -> String {
    if keep == 0 {
        "unlimited".to_string()
    } else {
        keep.to_string()
    }
}

fn settings_json(settings: &KindSettings) -> serde_json::Value {
    json!({
        "kind": settings.kind,
        "keep": settings.keep,
        "schema": settings.schema,
        "versionable": settings.versionable,
        "excluded": settings.excluded,
    })
}
