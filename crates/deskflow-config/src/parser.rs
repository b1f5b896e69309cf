//! KDL 設定ファイルのパース

use crate::error::{ConfigError, Result};
use crate::model::DeskflowConfig;
use deskflow_cloud::{ComputeTier, IngestionProcess, WaitConfig};
use kdl::{KdlDocument, KdlNode, KdlValue};
use std::path::PathBuf;
use std::time::Duration;

/// KDL 文字列から設定を生成 (未指定の項目はデフォルト値)
pub fn parse_config(content: &str) -> Result<DeskflowConfig> {
    let doc: KdlDocument = content.parse()?;
    let mut config = DeskflowConfig::default();

    for node in doc.nodes() {
        match node.name().value() {
            "region" => config.region = Some(required_string(node)?),
            "profile" => config.profile = Some(required_string(node)?),
            "state-dir" | "state_dir" => config.state_dir = PathBuf::from(required_string(node)?),
            "cleanup-on-abort" | "cleanup_on_abort" => {
                config.cleanup_on_abort = first_value(node)
                    .and_then(|v| v.as_bool())
                    .ok_or_else(|| {
                        ConfigError::invalid("cleanup-on-abort requires #true or #false")
                    })?;
            }
            "image" => parse_image(node, &mut config)?,
            "bundle" => parse_bundle(node, &mut config)?,
            "desktop" => parse_desktop(node, &mut config)?,
            "wait" => parse_wait(node, &mut config)?,
            other => tracing::warn!("Unknown config node ignored: {}", other),
        }
    }

    validate(&config)?;
    Ok(config)
}

fn parse_image(node: &KdlNode, config: &mut DeskflowConfig) -> Result<()> {
    let image = &mut config.plan.image;
    let mut description = None;

    for child in children(node) {
        match child.name().value() {
            "source" => image.source_image_id = required_string(child)?,
            "name" => image.name = required_string(child)?,
            "description" => description = Some(required_string(child)?),
            "ingestion-process" | "ingestion_process" => {
                image.ingestion_process = required_string(child)?
                    .parse::<IngestionProcess>()
                    .map_err(ConfigError::Invalid)?;
            }
            other => tracing::warn!("Unknown image option ignored: {}", other),
        }
    }

    // 説明文を省略した場合はソースイメージ ID を使う
    image.description = description.unwrap_or_else(|| image.source_image_id.clone());
    Ok(())
}

fn parse_bundle(node: &KdlNode, config: &mut DeskflowConfig) -> Result<()> {
    let bundle = &mut config.plan.bundle;

    for child in children(node) {
        match child.name().value() {
            "name" => bundle.name = required_string(child)?,
            "description" => bundle.description = required_string(child)?,
            "compute" => {
                bundle.compute_tier = required_string(child)?
                    .parse::<ComputeTier>()
                    .map_err(ConfigError::Invalid)?;
            }
            "user-storage" | "user_storage" => {
                bundle.user_storage_gib = required_u32(child)?;
            }
            "root-storage" | "root_storage" => {
                bundle.root_storage_gib = required_u32(child)?;
            }
            other => tracing::warn!("Unknown bundle option ignored: {}", other),
        }
    }
    Ok(())
}

fn parse_desktop(node: &KdlNode, config: &mut DeskflowConfig) -> Result<()> {
    let desktop = &mut config.plan.desktop;

    for child in children(node) {
        match child.name().value() {
            "directory" => desktop.directory_id = required_string(child)?,
            "user" => desktop.user_name = required_string(child)?,
            other => tracing::warn!("Unknown desktop option ignored: {}", other),
        }
    }
    Ok(())
}

/// wait { image interval="5m" timeout="6h" max-attempts=10 }
fn parse_wait(node: &KdlNode, config: &mut DeskflowConfig) -> Result<()> {
    for child in children(node) {
        let target = match child.name().value() {
            "image" => &mut config.waits.image,
            "bundle" => &mut config.waits.bundle,
            "desktop" => &mut config.waits.desktop,
            other => {
                tracing::warn!("Unknown wait target ignored: {}", other);
                continue;
            }
        };
        apply_wait(child, target)?;
    }
    Ok(())
}

fn apply_wait(node: &KdlNode, wait: &mut WaitConfig) -> Result<()> {
    let name = node.name().value();

    if let Some(value) = node.get("interval") {
        wait.interval = parse_duration(value)
            .map_err(|e| ConfigError::invalid(format!("wait {name} interval: {e}")))?;
    }
    if let Some(value) = node.get("timeout") {
        wait.timeout = Some(
            parse_duration(value)
                .map_err(|e| ConfigError::invalid(format!("wait {name} timeout: {e}")))?,
        );
    }
    if let Some(value) = node.get("max-attempts").or_else(|| node.get("max_attempts")) {
        let attempts = value
            .as_integer()
            .and_then(|n| u32::try_from(n).ok())
            .filter(|n| *n > 0)
            .ok_or_else(|| {
                ConfigError::invalid(format!("wait {name} max-attempts must be a positive integer"))
            })?;
        wait.max_attempts = Some(attempts);
    }
    Ok(())
}

/// 整数 (秒) または "<n>s" / "<n>m" / "<n>h"
pub fn parse_duration(value: &KdlValue) -> std::result::Result<Duration, String> {
    if let Some(seconds) = value.as_integer() {
        return u64::try_from(seconds)
            .map(Duration::from_secs)
            .map_err(|_| format!("invalid duration: {seconds}"));
    }

    let text = value
        .as_string()
        .ok_or_else(|| "duration must be an integer or a string".to_string())?
        .trim();
    let (number, unit) = match text.char_indices().last() {
        Some((idx, c)) if c.is_ascii_alphabetic() => (&text[..idx], c),
        _ => (text, 's'),
    };
    let amount: u64 = number
        .trim()
        .parse()
        .map_err(|_| format!("invalid duration: {text}"))?;

    let seconds = match unit {
        's' => Some(amount),
        'm' => amount.checked_mul(60),
        'h' => amount.checked_mul(60 * 60),
        _ => return Err(format!("unknown duration unit in {text}")),
    };
    seconds
        .map(Duration::from_secs)
        .ok_or_else(|| format!("duration too large: {text}"))
}

/// 値の整合性チェック
pub fn validate(config: &DeskflowConfig) -> Result<()> {
    let plan = &config.plan;
    let required = [
        ("image source", &plan.image.source_image_id),
        ("image name", &plan.image.name),
        ("bundle name", &plan.bundle.name),
        ("desktop directory", &plan.desktop.directory_id),
        ("desktop user", &plan.desktop.user_name),
    ];
    for (field, value) in required {
        if value.trim().is_empty() {
            return Err(ConfigError::invalid(format!("{field} must not be empty")));
        }
    }

    if plan.bundle.user_storage_gib == 0 || plan.bundle.root_storage_gib == 0 {
        return Err(ConfigError::invalid("bundle storage sizes must be greater than 0"));
    }

    for (name, wait) in [
        ("image", &config.waits.image),
        ("bundle", &config.waits.bundle),
        ("desktop", &config.waits.desktop),
    ] {
        if wait.interval.is_zero() {
            return Err(ConfigError::invalid(format!(
                "wait {name} interval must be greater than 0"
            )));
        }
    }

    Ok(())
}

fn children(node: &KdlNode) -> impl Iterator<Item = &KdlNode> {
    node.children().into_iter().flat_map(|doc| doc.nodes())
}

fn first_value(node: &KdlNode) -> Option<&KdlValue> {
    node.entries()
        .iter()
        .find(|e| e.name().is_none())
        .map(|e| e.value())
}

fn required_string(node: &KdlNode) -> Result<String> {
    first_value(node)
        .and_then(|v| v.as_string())
        .map(|s| s.to_string())
        .ok_or_else(|| {
            ConfigError::invalid(format!("{} requires a string value", node.name().value()))
        })
}

fn required_u32(node: &KdlNode) -> Result<u32> {
    first_value(node)
        .and_then(|v| v.as_integer())
        .and_then(|n| u32::try_from(n).ok())
        .ok_or_else(|| {
            ConfigError::invalid(format!(
                "{} requires a non-negative integer",
                node.name().value()
            ))
        })
}
