//! List command implementation

use saturn_ftdi::{list_devices, FtdiConfig};

use super::CliError;

/// List attached Saturn modules
pub fn run_list(config: &FtdiConfig) -> Result<(), CliError> {
    let devices = list_devices(config)?;

    if devices.is_empty() {
        println!("unable to find saturn device!");
        return Ok(());
    }

    for device in &devices {
        println!("{}", device);
        log::debug!("  bus {} address {}", device.bus, device.address);
    }
    Ok(())
}
