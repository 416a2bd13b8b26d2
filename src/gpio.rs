//! ==============================================================================
//! gpio.rs - raspberry pi sensor primitives (dht temperature/humidity, pir motion)
//! ==============================================================================
//!
//! purpose:
//!     the REAL hardware reads behind hal.rs. nothing in here knows about
//!     settings, debouncing or retries; it just talks to the pins.
//!
//! why subprocess to python?:
//!     dht sensors require precise bit-banging timing (~microseconds).
//!     pure rust in userspace is unreliable due to lack of real-time guarantees.
//!     the adafruit driver handles this correctly with timing compensation.
//!
//! relationships:
//!     - used by: hal.rs (hardware build)
//!     - uses: python3/adafruit_dht (via subprocess), rppal (pir pin)
//!
//! ==============================================================================

use anyhow::{anyhow, Result};

use crate::config::DhtModel;

/// read a dht sensor once.
///
/// `Ok((None, None))` is a failed read (checksum, timing): the sensor is
/// there but did not answer this time. `Err` means the driver itself could
/// not run.
pub fn read_dht(model: DhtModel, pin: u8) -> Result<(Option<f32>, Option<f32>)> {
    use std::process::Command;

    let script = format!(
        r#"
import sys
try:
    import adafruit_dht
    import board
    import json

    dht = adafruit_dht.{model}(board.D{pin})
    try:
        print(json.dumps({{"t": dht.temperature, "h": dht.humidity}}))
    except RuntimeError:
        print("null")
    finally:
        dht.exit()
except Exception as e:
    print(str(e), file=sys.stderr)
    sys.exit(1)
"#,
        model = model.driver_name(),
        pin = pin,
    );

    let output = Command::new("python3")
        .arg("-c")
        .arg(&script)
        .output()
        .map_err(|e| anyhow!("Failed to run python3: {}", e))?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(anyhow!("Python error: {}", stderr.trim()));
    }

    parse_dht_output(&String::from_utf8_lossy(&output.stdout))
}

/// parse the one-line json printed by the driver script
pub fn parse_dht_output(stdout: &str) -> Result<(Option<f32>, Option<f32>)> {
    let stdout = stdout.trim();
    if stdout == "null" || stdout.is_empty() {
        return Ok((None, None));
    }

    let parsed: serde_json::Value = serde_json::from_str(stdout)
        .map_err(|e| anyhow!("JSON parse error: {} (got: {})", e, stdout))?;

    let temperature = parsed["t"].as_f64().map(|t| t as f32);
    let humidity = parsed["h"].as_f64().map(|h| h as f32);
    Ok((temperature, humidity))
}

/// read the pir motion sensor output pin. high means motion.
#[cfg(feature = "hardware")]
pub fn read_pir(pin: u8) -> Result<bool> {
    use rppal::gpio::Gpio;

    let gpio = Gpio::new()?;
    let input = gpio.get(pin)?.into_input();
    Ok(input.is_high())
}
