//! Human-readable error descriptions and structured JSON error formatting.

use balancer_core::error::{BalanceError, BuildError};

/// Map an eyre::Report to a human-readable explanation with likely causes and fix hints.
pub fn humanize(err: &eyre::Report) -> String {
    // Typed matches first
    if let Some(be) = err.downcast_ref::<BuildError>() {
        return match be {
            BuildError::MissingAdc => {
                "What happened: No ADC was provided to the control loop.\nLikely causes: The ADC failed to initialize or was not wired into the builder.\nHow to fix: Ensure the MCP3008 (or sim) is created successfully and passed via with_adc(...).".to_string()
            }
            BuildError::MissingMotor => {
                "What happened: No motor drive was provided to the control loop.\nLikely causes: The motor driver failed to initialize or was not wired into the builder.\nHow to fix: Ensure the drive is created successfully and passed via with_motor(...).".to_string()
            }
            BuildError::InvalidConfig(msg) => format!(
                "What happened: Invalid configuration ({msg}).\nLikely causes: Missing or out-of-range values in the TOML.\nHow to fix: Edit the config file, then rerun. See README for a sample."
            ),
        };
    }

    if let Some(be) = err.downcast_ref::<BalanceError>() {
        return match be {
            BalanceError::Timeout => {
                "What happened: A sensor read timed out.\nLikely causes: ADC not wired correctly, no power/ground, or timeout too low.\nHow to fix: Verify the SPI wiring and power, and consider raising hardware.sensor_read_timeout_ms in the config.".to_string()
            }
            BalanceError::HardwareFault(msg) => format!(
                "What happened: A hardware fault was reported ({msg}).\nLikely causes: SPI/GPIO failure mid-run, loose wiring, or a browned-out supply.\nHow to fix: Check connections and power, then restart the run."
            ),
            BalanceError::Config(msg) => format!(
                "What happened: Invalid configuration ({msg}).\nLikely causes: Out-of-range values in the TOML.\nHow to fix: Edit the config file, then rerun."
            ),
            other => format!(
                "What happened: {other}.\nLikely causes: See logs.\nHow to fix: Re-run with --log-level=debug or set RUST_LOG for more detail."
            ),
        };
    }

    // String-based heuristics for errors coming from init or config
    let msg = err.to_string();
    let lower = msg.to_ascii_lowercase();

    if lower.contains("open mcp3008") || lower.contains("spi") {
        return "What happened: Failed to open the SPI ADC.\nLikely causes: SPI not enabled on the Pi, wrong bus, or insufficient permissions.\nHow to fix: Enable SPI (raspi-config), verify the MCP3008 wiring, and check device permissions.".to_string();
    }

    if lower.contains("open motor pins") || lower.contains("gpio") {
        return "What happened: Failed to initialize motor pins.\nLikely causes: Incorrect pin numbers or insufficient GPIO permissions.\nHow to fix: Fix the [pins] values in the config; ensure the process has permission to access GPIO.".to_string();
    }

    if lower.contains("invalid config") || lower.contains("pins:") || lower.contains("timing.") {
        return "What happened: Configuration is invalid or incomplete.\nLikely causes: Duplicate analog channels, bad pot cadence ordering, or out-of-range values.\nHow to fix: Edit the TOML config and try again.".to_string();
    }

    // Generic fallback
    let mut cause = String::new();
    if let Some(src) = err.source() {
        cause = format!(" Cause: {src}");
    }
    format!(
        "Something went wrong.{cause}\nHow to fix: Re-run with --log-level=debug for details. Original: {msg}"
    )
}

/// Stable exit codes: timeouts and hardware faults get their own, everything
/// else is 1. Clap keeps 2 for usage errors.
pub fn exit_code_for_error(err: &eyre::Report) -> i32 {
    if let Some(be) = err.downcast_ref::<BalanceError>() {
        return match be {
            BalanceError::Timeout => 3,
            BalanceError::HardwareFault(_) => 4,
            _ => 1,
        };
    }
    1
}

/// Structured JSON for errors when --json is enabled.
pub fn format_error_json(err: &eyre::Report) -> String {
    use serde_json::json;

    let reason = match err.downcast_ref::<BalanceError>() {
        Some(BalanceError::Timeout) => "Timeout",
        Some(BalanceError::HardwareFault(_)) => "HardwareFault",
        Some(BalanceError::Hardware(_)) => "Hardware",
        Some(BalanceError::Config(_)) => "Config",
        None => {
            if err.downcast_ref::<BuildError>().is_some() {
                "BuildError"
            } else {
                "Error"
            }
        }
    };
    json!({ "reason": reason, "message": humanize(err) }).to_string()
}
