//! FTDI MPSSE transport implementation
//!
//! `FtdiTransport` implements the core `Transport` trait on top of the
//! FT2232H MPSSE engine, with chip select on ADBUS3 and PROGRAM_B on GPIOL3.

use std::io::{Read, Write};
use std::time::{Duration, Instant};

use ftdi::{find_by_vid_pid, BitMode, Device, Interface};
use saturn_core::error::Result as CoreResult;
use saturn_core::transport::{Level, Pin, Transport};

use crate::error::{FtdiError, Result};
use crate::protocol::*;

/// How long `recv` waits for the device to return data
const RECV_TIMEOUT: Duration = Duration::from_secs(1);

/// Configuration for opening a Saturn module
#[derive(Debug, Clone, PartialEq)]
pub struct FtdiConfig {
    /// USB vendor ID
    pub vendor_id: u16,
    /// USB product ID
    pub product_id: u16,
    /// Interface/channel to use (A, B)
    pub interface: FtdiInterface,
    /// Clock divisor (2-65534, must be even)
    /// SPI clock = 60 MHz / divisor
    pub divisor: u16,
    /// USB serial number filter (optional)
    pub serial: Option<String>,
    /// USB product description filter (optional)
    pub description: Option<String>,
}

impl Default for FtdiConfig {
    fn default() -> Self {
        FtdiConfig {
            vendor_id: SATURN_VID,
            product_id: SATURN_PID,
            interface: FtdiInterface::A,
            divisor: 2,
            serial: None,
            description: Some(SATURN_DESCRIPTION.to_string()),
        }
    }
}

impl FtdiConfig {
    /// Set the interface/channel
    pub fn interface(mut self, interface: FtdiInterface) -> Self {
        self.interface = interface;
        self
    }

    /// Set the clock divisor
    pub fn divisor(mut self, divisor: u16) -> Result<Self> {
        if divisor < 2 || divisor % 2 != 0 {
            return Err(FtdiError::InvalidParameter(format!(
                "Invalid divisor {}: must be even, between 2 and 65534",
                divisor
            )));
        }
        self.divisor = divisor;
        Ok(self)
    }

    /// Calculate the SPI clock frequency in MHz
    pub fn spi_clock_mhz(&self) -> f64 {
        BASE_CLOCK_MHZ / self.divisor as f64
    }

    /// Whether a USB device with these descriptors is a module this config
    /// selects
    fn matches(
        &self,
        vendor_id: u16,
        product_id: u16,
        product: Option<&str>,
        serial: Option<&str>,
    ) -> bool {
        if vendor_id != self.vendor_id || product_id != self.product_id {
            return false;
        }
        if let Some(description) = &self.description {
            if product != Some(description.as_str()) {
                return false;
            }
        }
        if let Some(wanted) = &self.serial {
            if serial != Some(wanted.as_str()) {
                return false;
            }
        }
        true
    }
}

/// FTDI MPSSE transport
///
/// Holds the open libftdi device for one exclusive session. Dropping it
/// tri-states the pins and closes the device.
pub struct FtdiTransport {
    /// libftdi device context
    device: Device,
    /// GPIOL state (PROGRAM_B)
    aux_bits: u8,
    /// Chip select currently asserted
    selected: bool,
}

impl FtdiTransport {
    /// Open the single Saturn module selected by `config`
    ///
    /// libftdi opens the first device with the configured VID/PID, so the
    /// module must be the only such device attached. `serial=` and
    /// `description=` narrow which one counts as a Saturn module but cannot
    /// pick between several bridges.
    ///
    /// Fails with [`FtdiError::DeviceNotFound`] if no module matches,
    /// [`FtdiError::TooManyDevices`] if more than one does and
    /// [`FtdiError::AmbiguousDevice`] if any other device shares the VID/PID.
    pub fn open(config: &FtdiConfig) -> Result<Self> {
        let (modules, bridges) = enumerate(config)?;
        check_selection(modules.len(), bridges)?;

        log::info!(
            "Opening {} channel {}",
            modules[0].product.as_deref().unwrap_or(SATURN_DESCRIPTION),
            config.interface.letter()
        );

        let interface = match config.interface {
            FtdiInterface::A => Interface::A,
            FtdiInterface::B => Interface::B,
        };

        let mut device = find_by_vid_pid(config.vendor_id, config.product_id)
            .interface(interface)
            .open()
            .map_err(|e| FtdiError::OpenFailed(format!("{}", e)))?;

        log::debug!(
            "Opened FTDI device VID={:04X} PID={:04X}",
            config.vendor_id,
            config.product_id
        );

        device
            .usb_reset()
            .map_err(|e| FtdiError::ConfigFailed(format!("USB reset failed: {}", e)))?;

        // 2ms latency timer keeps status polling responsive
        device
            .set_latency_timer(2)
            .map_err(|e| FtdiError::ConfigFailed(format!("Set latency timer failed: {}", e)))?;

        device
            .set_bitmode(0x00, BitMode::Mpsse)
            .map_err(|e| FtdiError::ConfigFailed(format!("Set MPSSE mode failed: {}", e)))?;

        let mut transport = FtdiTransport {
            device,
            aux_bits: program_b_bits(Level::RELEASE),
            selected: false,
        };

        log::debug!(
            "Setting clock divisor to {} (SPI clock: {:.2} MHz)",
            config.divisor,
            config.spi_clock_mhz()
        );
        let init = init_commands(config.divisor, transport.aux_bits);
        transport.send(&init)?;

        log::info!(
            "FTDI configured for SPI at {:.2} MHz",
            config.spi_clock_mhz()
        );

        Ok(transport)
    }

    /// Send data to the FTDI device
    fn send(&mut self, data: &[u8]) -> Result<()> {
        self.device
            .write_all(data)
            .map_err(|e| FtdiError::TransferFailed(format!("Write failed: {}", e)))?;
        log::trace!("Sent {} bytes", data.len());
        Ok(())
    }

    /// Receive exactly `buf.len()` bytes from the FTDI device
    fn recv(&mut self, buf: &mut [u8]) -> Result<()> {
        let mut total = 0;
        let mut last_data = Instant::now();

        while total < buf.len() {
            match self.device.read(&mut buf[total..]) {
                Ok(0) => {
                    if last_data.elapsed() > RECV_TIMEOUT {
                        return Err(FtdiError::TransferFailed(format!(
                            "Read timed out after {} of {} bytes",
                            total,
                            buf.len()
                        )));
                    }
                    std::thread::sleep(Duration::from_micros(100));
                }
                Ok(n) => {
                    total += n;
                    last_data = Instant::now();
                }
                Err(e) => {
                    return Err(FtdiError::TransferFailed(format!("Read failed: {}", e)));
                }
            }
        }

        log::trace!("Received {} bytes", total);
        Ok(())
    }

    /// Drive the low byte pins to the current chip select/GPIOL state
    fn update_pins(&mut self) -> Result<()> {
        let cmd = pin_state(self.selected, self.aux_bits);
        self.send(&cmd)
    }

    /// Release I/O pins (set all as inputs)
    fn release_pins(&mut self) -> Result<()> {
        self.send(&[SET_BITS_LOW, 0x00, 0x00])
    }
}

impl Drop for FtdiTransport {
    fn drop(&mut self) {
        if let Err(e) = self.release_pins() {
            log::warn!("Failed to release pins on close: {}", e);
        }
    }
}

impl Transport for FtdiTransport {
    fn begin(&mut self) -> CoreResult<()> {
        self.selected = true;
        Ok(self.update_pins()?)
    }

    fn write(&mut self, data: &[u8]) -> CoreResult<()> {
        Ok(self.send(&write_commands(data))?)
    }

    fn read(&mut self, buf: &mut [u8]) -> CoreResult<()> {
        for chunk in buf.chunks_mut(MPSSE_MAX_TRANSFER) {
            self.send(&read_command(chunk.len()))?;
            self.recv(chunk)?;
        }
        Ok(())
    }

    fn end(&mut self) -> CoreResult<()> {
        self.selected = false;
        Ok(self.update_pins()?)
    }

    fn set_pin(&mut self, pin: Pin, level: Level) -> CoreResult<()> {
        match pin {
            Pin::ProgramB => self.aux_bits = program_b_bits(level),
        }
        log::debug!("{:?} -> {:?}", pin, level);
        Ok(self.update_pins()?)
    }

    fn delay_us(&mut self, us: u32) {
        std::thread::sleep(Duration::from_micros(us as u64));
    }
}

/// GPIOL bits for a PROGRAM_B level
fn program_b_bits(level: Level) -> u8 {
    match level {
        Level::High => PIN_GPIOL3,
        Level::Low => 0,
    }
}

/// SET_BITS_LOW command for the given chip select and GPIOL state
fn pin_state(selected: bool, aux_bits: u8) -> [u8; 3] {
    let cs = if selected { 0 } else { PIN_CS };
    [SET_BITS_LOW, cs | aux_bits, PIN_DIR]
}

/// MPSSE setup: 60 MHz base clock, divisor, no loopback, idle pins
fn init_commands(divisor: u16, aux_bits: u8) -> Vec<u8> {
    // Divisor value for MPSSE is (divisor / 2 - 1)
    let divisor_val = divisor / 2 - 1;
    let mut buf = vec![
        DIS_DIV_5,
        TCK_DIVISOR,
        (divisor_val & 0xFF) as u8,
        ((divisor_val >> 8) & 0xFF) as u8,
        LOOPBACK_END,
    ];
    buf.extend_from_slice(&pin_state(false, aux_bits));
    buf
}

/// Byte-write commands for `data`, split at the MPSSE transfer limit
fn write_commands(data: &[u8]) -> Vec<u8> {
    let chunks = data.len().div_ceil(MPSSE_MAX_TRANSFER);
    let mut buf = Vec::with_capacity(data.len() + 3 * chunks);
    for chunk in data.chunks(MPSSE_MAX_TRANSFER) {
        let len = chunk.len() - 1;
        buf.push(MPSSE_DO_WRITE | MPSSE_WRITE_NEG);
        buf.push((len & 0xFF) as u8);
        buf.push(((len >> 8) & 0xFF) as u8);
        buf.extend_from_slice(chunk);
    }
    buf
}

/// Byte-read command for `len` bytes (1..=65536), flushed immediately
fn read_command(len: usize) -> [u8; 4] {
    let len = len - 1;
    [
        MPSSE_DO_READ,
        (len & 0xFF) as u8,
        ((len >> 8) & 0xFF) as u8,
        SEND_IMMEDIATE,
    ]
}

/// Information about a connected Saturn module
#[derive(Debug, Clone)]
pub struct SaturnDeviceInfo {
    /// Position among the matching modules
    pub index: usize,
    /// USB bus number
    pub bus: u8,
    /// USB device address
    pub address: u8,
    /// Manufacturer string (if available)
    pub manufacturer: Option<String>,
    /// Product string (if available)
    pub product: Option<String>,
    /// Serial number (if available)
    pub serial: Option<String>,
}

impl std::fmt::Display for SaturnDeviceInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}: {} ({}, {})",
            self.index,
            self.product.as_deref().unwrap_or(""),
            self.manufacturer.as_deref().unwrap_or(""),
            self.serial.as_deref().unwrap_or("")
        )
    }
}

/// List the Saturn modules `config` selects
pub fn list_devices(config: &FtdiConfig) -> Result<Vec<SaturnDeviceInfo>> {
    enumerate(config).map(|(modules, _)| modules)
}

/// Matching modules, plus the number of devices sharing the VID/PID
fn enumerate(config: &FtdiConfig) -> Result<(Vec<SaturnDeviceInfo>, usize)> {
    let mut modules = Vec::new();
    let mut bridges = 0;

    for dev in nusb::list_devices()? {
        let vid = dev.vendor_id();
        let pid = dev.product_id();
        if vid != config.vendor_id || pid != config.product_id {
            continue;
        }
        bridges += 1;

        if !config.matches(vid, pid, dev.product_string(), dev.serial_number()) {
            log::debug!(
                "Skipping {:04X}:{:04X} at bus {} address {} ({:?})",
                vid,
                pid,
                dev.bus_number(),
                dev.device_address(),
                dev.product_string()
            );
            continue;
        }

        modules.push(SaturnDeviceInfo {
            index: modules.len(),
            bus: dev.bus_number(),
            address: dev.device_address(),
            manufacturer: dev.manufacturer_string().map(str::to_string),
            product: dev.product_string().map(str::to_string),
            serial: dev.serial_number().map(str::to_string),
        });
    }

    Ok((modules, bridges))
}

/// Refuse to open unless exactly one module matches and nothing else on
/// the bus shares its VID/PID
fn check_selection(modules: usize, bridges: usize) -> Result<()> {
    match modules {
        0 => Err(FtdiError::DeviceNotFound),
        1 if bridges > 1 => Err(FtdiError::AmbiguousDevice(bridges)),
        1 => Ok(()),
        n => Err(FtdiError::TooManyDevices(n)),
    }
}

/// Parse programmer options
///
/// Format: "port=<A|B>,divisor=<N>,serial=<serial>,description=<text>"
pub fn parse_options(options: &[(&str, &str)]) -> Result<FtdiConfig> {
    let mut config = FtdiConfig::default();

    for (key, value) in options {
        match *key {
            "port" | "channel" => {
                let mut chars = value.chars();
                let interface = match (chars.next(), chars.next()) {
                    (Some(c), None) => FtdiInterface::from_char(c),
                    _ => None,
                }
                .ok_or_else(|| {
                    FtdiError::InvalidParameter(format!(
                        "Invalid channel '{}': must be A or B",
                        value
                    ))
                })?;
                config = config.interface(interface);
            }
            "divisor" => {
                let divisor: u16 = value.parse().map_err(|_| {
                    FtdiError::InvalidParameter(format!("Invalid divisor '{}'", value))
                })?;
                config = config.divisor(divisor)?;
            }
            "serial" => {
                config.serial = Some(value.to_string());
            }
            "description" => {
                // An empty description matches any product string
                config.description = if value.is_empty() {
                    None
                } else {
                    Some(value.to_string())
                };
            }
            _ => {
                log::warn!("Unknown FTDI option: {}={}", key, value);
            }
        }
    }

    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_check_selection_single_module() {
        assert!(check_selection(1, 1).is_ok());
    }

    #[test]
    fn test_check_selection_no_module() {
        assert!(matches!(check_selection(0, 0), Err(FtdiError::DeviceNotFound)));
        // A bridge that fails the serial/description filter is not a match
        assert!(matches!(check_selection(0, 1), Err(FtdiError::DeviceNotFound)));
    }

    #[test]
    fn test_check_selection_several_modules() {
        assert!(matches!(check_selection(2, 2), Err(FtdiError::TooManyDevices(2))));
    }

    #[test]
    fn test_check_selection_filtered_module_beside_other_bridge() {
        // libftdi would open whichever bridge enumerates first
        let err = check_selection(1, 2).unwrap_err();
        assert!(matches!(err, FtdiError::AmbiguousDevice(2)));
        assert_eq!(
            err.to_string(),
            "2 devices share the Saturn VID/PID; disconnect all but one"
        );
    }

    #[test]
    fn test_default_config_is_saturn() {
        let config = FtdiConfig::default();
        assert_eq!(config.vendor_id, 0x0403);
        assert_eq!(config.product_id, 0x6010);
        assert_eq!(config.interface, FtdiInterface::A);
        assert_eq!(config.divisor, 2);
        assert_eq!(config.description.as_deref(), Some("Saturn Spartan 6 FPGA Module"));
        assert_eq!(config.spi_clock_mhz(), 30.0);
    }

    #[test]
    fn test_parse_options() {
        let config = parse_options(&[
            ("port", "b"),
            ("divisor", "6"),
            ("serial", "FT123"),
        ])
        .unwrap();
        assert_eq!(config.interface, FtdiInterface::B);
        assert_eq!(config.divisor, 6);
        assert_eq!(config.serial.as_deref(), Some("FT123"));
        assert_eq!(config.spi_clock_mhz(), 10.0);
    }

    #[test]
    fn test_parse_options_rejects_bad_values() {
        assert!(matches!(
            parse_options(&[("port", "C")]),
            Err(FtdiError::InvalidParameter(_))
        ));
        assert!(matches!(
            parse_options(&[("port", "AB")]),
            Err(FtdiError::InvalidParameter(_))
        ));
        assert!(matches!(
            parse_options(&[("divisor", "3")]),
            Err(FtdiError::InvalidParameter(_))
        ));
        assert!(matches!(
            parse_options(&[("divisor", "0")]),
            Err(FtdiError::InvalidParameter(_))
        ));
        assert!(matches!(
            parse_options(&[("divisor", "fast")]),
            Err(FtdiError::InvalidParameter(_))
        ));
    }

    #[test]
    fn test_parse_options_ignores_unknown_keys() {
        let config = parse_options(&[("speed", "max")]).unwrap();
        assert_eq!(config, FtdiConfig::default());
    }

    #[test]
    fn test_empty_description_matches_any_product() {
        let config = parse_options(&[("description", "")]).unwrap();
        assert!(config.description.is_none());
        assert!(config.matches(0x0403, 0x6010, Some("Dual RS232-HS"), None));
    }

    #[test]
    fn test_matches_filters() {
        let config = FtdiConfig::default();
        assert!(config.matches(0x0403, 0x6010, Some(SATURN_DESCRIPTION), Some("A1")));
        assert!(!config.matches(0x0403, 0x6010, Some("Dual RS232-HS"), None));
        assert!(!config.matches(0x0403, 0x6010, None, None));
        assert!(!config.matches(0x0403, 0x6014, Some(SATURN_DESCRIPTION), None));

        let config = parse_options(&[("serial", "A1")]).unwrap();
        assert!(config.matches(0x0403, 0x6010, Some(SATURN_DESCRIPTION), Some("A1")));
        assert!(!config.matches(0x0403, 0x6010, Some(SATURN_DESCRIPTION), Some("B2")));
    }

    #[test]
    fn test_init_commands() {
        assert_eq!(
            init_commands(2, 0),
            vec![0x8A, 0x86, 0x00, 0x00, 0x85, 0x80, 0x08, 0x8B]
        );
        assert_eq!(
            init_commands(60, PIN_GPIOL3),
            vec![0x8A, 0x86, 29, 0x00, 0x85, 0x80, 0x88, 0x8B]
        );
    }

    #[test]
    fn test_pin_state() {
        assert_eq!(pin_state(true, 0), [0x80, 0x00, 0x8B]);
        assert_eq!(pin_state(false, 0), [0x80, 0x08, 0x8B]);
        assert_eq!(
            pin_state(true, program_b_bits(Level::HOLD)),
            [0x80, 0x80, 0x8B]
        );
        assert_eq!(program_b_bits(Level::RELEASE), 0);
    }

    #[test]
    fn test_write_commands() {
        assert!(write_commands(&[]).is_empty());
        assert_eq!(write_commands(&[0x9F]), vec![0x11, 0x00, 0x00, 0x9F]);
        assert_eq!(
            write_commands(&[0x02, 0x00, 0x01, 0x00]),
            vec![0x11, 0x03, 0x00, 0x02, 0x00, 0x01, 0x00]
        );
    }

    #[test]
    fn test_write_commands_split_at_transfer_limit() {
        let data = vec![0xAA; MPSSE_MAX_TRANSFER + 1];
        let buf = write_commands(&data);

        assert_eq!(buf.len(), data.len() + 6);
        assert_eq!(&buf[..3], &[0x11, 0xFF, 0xFF]);
        let second = 3 + MPSSE_MAX_TRANSFER;
        assert_eq!(&buf[second..second + 4], &[0x11, 0x00, 0x00, 0xAA]);
    }

    #[test]
    fn test_read_command() {
        assert_eq!(read_command(1), [0x20, 0x00, 0x00, 0x87]);
        assert_eq!(read_command(20), [0x20, 0x13, 0x00, 0x87]);
        assert_eq!(read_command(MPSSE_MAX_TRANSFER), [0x20, 0xFF, 0xFF, 0x87]);
    }

    #[test]
    fn test_device_info_display() {
        let info = SaturnDeviceInfo {
            index: 0,
            bus: 1,
            address: 4,
            manufacturer: Some("Saturn".to_string()),
            product: Some(SATURN_DESCRIPTION.to_string()),
            serial: Some("FT0001".to_string()),
        };
        assert_eq!(
            info.to_string(),
            "0: Saturn Spartan 6 FPGA Module (Saturn, FT0001)"
        );
    }
}
