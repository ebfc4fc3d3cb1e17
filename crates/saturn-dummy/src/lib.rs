//! saturn-dummy - In-memory N25Q128A emulator for testing
//!
//! [`DummyFlash`] implements [`Transport`] by decoding the bytes the driver
//! clocks out, the way the real chip does: commands execute when chip
//! select is released, erase and program leave the chip busy for a
//! configurable number of status reads, and the write enable latch gates
//! every mutating command.
//!
//! Faults can be injected (flag status failures, transport errors, GPIO
//! errors) and every command and PROGRAM_B transition is recorded, so tests
//! can assert on exactly what reached the chip.

use saturn_core::error::{Error, Result};
use saturn_core::protocol::opcodes;
use saturn_core::transport::{Level, Pin, Transport};

/// Flag status value reported by an idle chip
const FLAG_READY: u8 = 0x80;

/// Configuration for the dummy flash
#[derive(Debug, Clone)]
pub struct DummyConfig {
    /// Manufacturer id returned by RDID
    pub manufacturer_id: u8,
    /// Device id returned by RDID
    pub device_id: u16,
    /// Unique id returned by RDID
    pub unique_id: [u8; opcodes::UNIQUE_ID_LEN],
    /// Status reads that report write-in-progress after erase/program
    pub busy_polls: u32,
}

impl Default for DummyConfig {
    fn default() -> Self {
        Self {
            manufacturer_id: opcodes::MANUFACTURER_ID,
            device_id: opcodes::DEVICE_ID,
            unique_id: [0x5A; opcodes::UNIQUE_ID_LEN],
            busy_polls: 2,
        }
    }
}

/// A decoded command, recorded when chip select is released
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// RDID
    Identify,
    /// READ
    Read {
        /// Start address
        address: u32,
        /// Bytes read
        len: usize,
    },
    /// RDSR
    ReadStatus,
    /// RFSR
    ReadFlagStatus,
    /// WREN
    WriteEnable,
    /// WRDI
    WriteDisable,
    /// BE
    BulkErase,
    /// SE
    SectorErase {
        /// Sector base address
        address: u32,
    },
    /// PP
    PageProgram {
        /// Page base address
        address: u32,
        /// Data bytes sent
        len: usize,
    },
    /// Anything else
    Unknown(u8),
}

impl Command {
    /// Whether the command changes chip state (write latch, erase, program)
    pub fn is_mutating(&self) -> bool {
        matches!(
            self,
            Command::WriteEnable
                | Command::WriteDisable
                | Command::BulkErase
                | Command::SectorErase { .. }
                | Command::PageProgram { .. }
        )
    }
}

/// Dummy N25Q128A behind a transport
pub struct DummyFlash {
    config: DummyConfig,
    data: Vec<u8>,
    write_enabled: bool,
    busy_remaining: u32,
    flag_status: u8,

    in_transaction: bool,
    tx_out: Vec<u8>,
    tx_read: usize,

    commands: Vec<Command>,
    violations: Vec<String>,
    program_b: Level,
    pin_history: Vec<Level>,
    total_delay_us: u64,

    fail_sector: Option<(u8, u8)>,
    fail_bulk_erase: Option<u8>,
    fail_page: Option<(u16, u8)>,
    fail_opcode: Option<(u8, usize)>,
    opcode_seen: usize,
    fail_pin: Option<Level>,
}

impl DummyFlash {
    /// Create a new blank (all 0xFF) dummy flash
    pub fn new(config: DummyConfig) -> Self {
        Self {
            config,
            data: vec![0xFF; opcodes::TOTAL_SIZE],
            write_enabled: false,
            busy_remaining: 0,
            flag_status: FLAG_READY,
            in_transaction: false,
            tx_out: Vec::new(),
            tx_read: 0,
            commands: Vec::new(),
            violations: Vec::new(),
            program_b: Level::RELEASE,
            pin_history: Vec::new(),
            total_delay_us: 0,
            fail_sector: None,
            fail_bulk_erase: None,
            fail_page: None,
            fail_opcode: None,
            opcode_seen: 0,
            fail_pin: None,
        }
    }

    /// Create a blank N25Q128A with default configuration
    pub fn new_default() -> Self {
        Self::new(DummyConfig::default())
    }

    /// Create a dummy flash with pre-filled data at address 0
    pub fn with_data(config: DummyConfig, initial_data: &[u8]) -> Self {
        let mut flash = Self::new(config);
        let len = core::cmp::min(initial_data.len(), flash.data.len());
        flash.data[..len].copy_from_slice(&initial_data[..len]);
        flash
    }

    /// Report `flag_status` after erasing `sector`
    pub fn fail_sector_erase(mut self, sector: u8, flag_status: u8) -> Self {
        self.fail_sector = Some((sector, flag_status));
        self
    }

    /// Report `flag_status` after a bulk erase
    pub fn fail_bulk_erase(mut self, flag_status: u8) -> Self {
        self.fail_bulk_erase = Some(flag_status);
        self
    }

    /// Report `flag_status` after programming `page`
    pub fn fail_page_program(mut self, page: u16, flag_status: u8) -> Self {
        self.fail_page = Some((page, flag_status));
        self
    }

    /// Fail the transport write of the `occurrence`-th (1-based) command
    /// starting with `opcode`
    pub fn fail_transfer(mut self, opcode: u8, occurrence: usize) -> Self {
        self.fail_opcode = Some((opcode, occurrence));
        self
    }

    /// Fail every attempt to drive PROGRAM_B to `level`
    pub fn fail_pin(mut self, level: Level) -> Self {
        self.fail_pin = Some(level);
        self
    }

    /// Flash contents
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// Mutable flash contents
    pub fn data_mut(&mut self) -> &mut [u8] {
        &mut self.data
    }

    /// Every command received, in order
    pub fn commands(&self) -> &[Command] {
        &self.commands
    }

    /// Commands that change chip state, in order
    pub fn mutating_commands(&self) -> Vec<Command> {
        self.commands
            .iter()
            .filter(|c| c.is_mutating())
            .cloned()
            .collect()
    }

    /// Protocol rules the host broke (command while busy, program without
    /// write enable, nested transactions)
    pub fn violations(&self) -> &[String] {
        &self.violations
    }

    /// Current PROGRAM_B level
    pub fn program_b(&self) -> Level {
        self.program_b
    }

    /// Every successful PROGRAM_B change, in order
    pub fn pin_history(&self) -> &[Level] {
        &self.pin_history
    }

    /// Whether the write enable latch is set
    pub fn write_enabled(&self) -> bool {
        self.write_enabled
    }

    /// Sum of all `delay_us` calls
    pub fn total_delay_us(&self) -> u64 {
        self.total_delay_us
    }

    fn violation(&mut self, message: String) {
        log::warn!("dummy flash: {}", message);
        self.violations.push(message);
    }

    fn tx_address(&self) -> u32 {
        let mut addr = [0u8; 3];
        for (i, byte) in addr.iter_mut().enumerate() {
            *byte = self.tx_out.get(i + 1).copied().unwrap_or(0);
        }
        ((addr[0] as u32) << 16) | ((addr[1] as u32) << 8) | addr[2] as u32
    }

    fn rdid_response(&self) -> [u8; opcodes::RDID_LEN] {
        let mut resp = [0u8; opcodes::RDID_LEN];
        resp[0] = self.config.manufacturer_id;
        resp[1] = self.config.device_id as u8;
        resp[2] = (self.config.device_id >> 8) as u8;
        resp[3..].copy_from_slice(&self.config.unique_id);
        resp
    }

    fn read_status(&mut self) -> u8 {
        let mut status = 0;
        if self.write_enabled {
            status |= opcodes::Status::WRITE_ENABLE_LATCH.bits();
        }
        if self.busy_remaining > 0 {
            self.busy_remaining -= 1;
            status |= opcodes::Status::WRITE_IN_PROGRESS.bits();
        }
        status
    }

    /// Execute the buffered write-only command on chip select release
    fn execute(&mut self) -> Command {
        let Some(&opcode) = self.tx_out.first() else {
            return Command::Unknown(0);
        };

        let command = match opcode {
            opcodes::RDID => Command::Identify,
            opcodes::READ => Command::Read {
                address: self.tx_address(),
                len: self.tx_read,
            },
            opcodes::RDSR => Command::ReadStatus,
            opcodes::RFSR => Command::ReadFlagStatus,
            opcodes::WREN => Command::WriteEnable,
            opcodes::WRDI => Command::WriteDisable,
            opcodes::BE => Command::BulkErase,
            opcodes::SE => Command::SectorErase {
                address: self.tx_address(),
            },
            opcodes::PP => Command::PageProgram {
                address: self.tx_address(),
                len: self.tx_out.len().saturating_sub(4),
            },
            other => Command::Unknown(other),
        };

        let polling = matches!(command, Command::ReadStatus | Command::ReadFlagStatus);
        if self.busy_remaining > 0 && !polling {
            self.violation(format!("{:?} issued while write in progress", command));
            return command;
        }

        match &command {
            Command::WriteEnable => self.write_enabled = true,
            Command::WriteDisable => self.write_enabled = false,
            Command::BulkErase => {
                if self.begin_mutation(&command) {
                    self.data.fill(0xFF);
                    self.finish_mutation(self.fail_bulk_erase);
                }
            }
            Command::SectorErase { address } => {
                let address = *address as usize;
                if self.begin_mutation(&command) {
                    let base = address & !(opcodes::SECTOR_SIZE - 1);
                    self.data[base..base + opcodes::SECTOR_SIZE].fill(0xFF);
                    let sector = (base / opcodes::SECTOR_SIZE) as u8;
                    let fail = self
                        .fail_sector
                        .filter(|(s, _)| *s == sector)
                        .map(|(_, flag)| flag);
                    self.finish_mutation(fail);
                }
            }
            Command::PageProgram { address, .. } => {
                let address = *address as usize;
                if self.begin_mutation(&command) {
                    let base = address & !(opcodes::PAGE_SIZE - 1);
                    let start = address - base;
                    // Programming wraps within the page and only clears bits
                    let payload = self.tx_out.get(4..).unwrap_or(&[]);
                    for (i, &byte) in payload.iter().enumerate() {
                        let offset = base + (start + i) % opcodes::PAGE_SIZE;
                        self.data[offset] &= byte;
                    }
                    let page = (base / opcodes::PAGE_SIZE) as u16;
                    let fail = self
                        .fail_page
                        .filter(|(p, _)| *p == page)
                        .map(|(_, flag)| flag);
                    self.finish_mutation(fail);
                }
            }
            _ => {}
        }

        command
    }

    fn begin_mutation(&mut self, command: &Command) -> bool {
        if !self.write_enabled {
            self.violation(format!("{:?} without write enable", command));
            return false;
        }
        true
    }

    fn finish_mutation(&mut self, failure: Option<u8>) {
        self.write_enabled = false;
        self.busy_remaining = self.config.busy_polls;
        self.flag_status = match failure {
            Some(flag) => FLAG_READY | flag,
            None => FLAG_READY,
        };
    }
}

impl Transport for DummyFlash {
    fn begin(&mut self) -> Result<()> {
        if self.in_transaction {
            self.violation("begin inside an open transaction".to_string());
            return Err(Error::Transport("chip select already asserted".into()));
        }
        self.in_transaction = true;
        self.tx_out.clear();
        self.tx_read = 0;
        Ok(())
    }

    fn write(&mut self, data: &[u8]) -> Result<()> {
        if !self.in_transaction {
            self.violation("write outside a transaction".to_string());
            return Err(Error::Transport("chip select not asserted".into()));
        }
        if self.tx_out.is_empty() {
            if let (Some((opcode, occurrence)), Some(&first)) = (self.fail_opcode, data.first()) {
                if first == opcode {
                    self.opcode_seen += 1;
                    if self.opcode_seen == occurrence {
                        return Err(Error::Transport(format!(
                            "injected failure on opcode 0x{:02X}",
                            opcode
                        )));
                    }
                }
            }
        }
        self.tx_out.extend_from_slice(data);
        Ok(())
    }

    fn read(&mut self, buf: &mut [u8]) -> Result<()> {
        if !self.in_transaction {
            self.violation("read outside a transaction".to_string());
            return Err(Error::Transport("chip select not asserted".into()));
        }

        match self.tx_out.first().copied() {
            Some(opcodes::RDID) => {
                let resp = self.rdid_response();
                for (i, byte) in buf.iter_mut().enumerate() {
                    *byte = resp.get(self.tx_read + i).copied().unwrap_or(0);
                }
            }
            Some(opcodes::READ) => {
                let start = self.tx_address() as usize + self.tx_read;
                for (i, byte) in buf.iter_mut().enumerate() {
                    *byte = self.data[(start + i) % self.data.len()];
                }
            }
            Some(opcodes::RDSR) => buf.fill(self.read_status()),
            Some(opcodes::RFSR) => buf.fill(self.flag_status),
            _ => buf.fill(0xFF),
        }
        self.tx_read += buf.len();
        Ok(())
    }

    fn end(&mut self) -> Result<()> {
        if !self.in_transaction {
            self.violation("end outside a transaction".to_string());
            return Err(Error::Transport("chip select not asserted".into()));
        }
        self.in_transaction = false;
        let command = self.execute();
        self.commands.push(command);
        Ok(())
    }

    fn set_pin(&mut self, pin: Pin, level: Level) -> Result<()> {
        if self.fail_pin == Some(level) {
            return Err(Error::Transport(format!("{:?} could not be driven {:?}", pin, level)));
        }
        self.program_b = level;
        self.pin_history.push(level);
        Ok(())
    }

    fn delay_us(&mut self, us: u32) {
        self.total_delay_us += u64::from(us);
    }
}
