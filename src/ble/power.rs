//! Adapter power control
//!
//! btleplug has no power API, so on Linux the adapter is switched through
//! BlueZ with `bluer`. Other platforms manage adapter power themselves.

use crate::error::Result;

#[cfg(target_os = "linux")]
mod platform {
    use tracing::info;

    use crate::error::{BridgeError, Result};

    pub async fn set_powered(powered: bool) -> Result<()> {
        let session = bluer::Session::new()
            .await
            .map_err(|e| BridgeError::Power(format!("Failed to open BlueZ session: {}", e)))?;
        let adapter = session
            .default_adapter()
            .await
            .map_err(|e| BridgeError::Power(format!("No default adapter: {}", e)))?;

        adapter
            .set_powered(powered)
            .await
            .map_err(|e| BridgeError::Power(format!("Failed to set power on {}: {}", adapter.name(), e)))?;

        info!("Adapter {} powered {}", adapter.name(), if powered { "on" } else { "off" });
        Ok(())
    }
}

#[cfg(not(target_os = "linux"))]
mod platform {
    use tracing::debug;

    use crate::error::Result;

    pub async fn set_powered(powered: bool) -> Result<()> {
        debug!("Adapter power control unsupported on this platform (requested {})", powered);
        Ok(())
    }
}

/// Power the default adapter on
pub async fn power_on() -> Result<()> {
    platform::set_powered(true).await
}

/// Power the default adapter off
pub async fn power_off() -> Result<()> {
    platform::set_powered(false).await
}
